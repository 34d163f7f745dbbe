//! Thin wrapper around one `AF_PACKET` raw socket: ifindex resolution,
//! binding, promiscuous membership, and the `getsockopt`/`setsockopt`
//! plumbing the rest of the crate builds on (ioctl-based `IfReq`, generic
//! `setsockopt`/`getsockopt` wrappers) using TPACKET_V2 with
//! socket-scoped promiscuous membership.

use std::ffi::CString;
use std::io::Error as IoError;
use std::mem;
use std::os::unix::io::{AsRawFd, RawFd};

use libc::{
    bind, c_char, c_int, c_short, c_uint, c_void, getsockopt, if_nametoindex, ioctl, sendto,
    setsockopt, sockaddr, sockaddr_ll, socket, socklen_t, AF_PACKET, ETH_P_ALL, IF_NAMESIZE,
    SOCK_RAW, SOL_PACKET, SOL_SOCKET,
};

use crate::error::{Error, Result};
use crate::tpacket::{self, PacketMreq, ARPHRD_ETHER};

const IFREQUNIONSIZE: usize = 24;
// SIOCGIFHWADDR is architecture-independent on Linux but not re-exported by
// `libc` for every target; the digit below is from `asm-generic/sockios.h`.
const SIOCGIFHWADDR: libc::c_ulong = 0x8927;

#[repr(C)]
struct IfReqHwAddr {
    ifr_name: [c_char; IF_NAMESIZE],
    ifr_hwaddr_family: c_short,
    _ifr_hwaddr_data: [u8; IFREQUNIONSIZE - mem::size_of::<c_short>()],
}

impl IfReqHwAddr {
    fn with_if_name(if_name: &str) -> Result<Self> {
        let mut req = IfReqHwAddr {
            ifr_name: [0; IF_NAMESIZE],
            ifr_hwaddr_family: 0,
            _ifr_hwaddr_data: [0; IFREQUNIONSIZE - mem::size_of::<c_short>()],
        };
        if if_name.len() >= req.ifr_name.len() {
            return Err(Error::ConfigError(format!(
                "interface name too long: {}",
                if_name
            )));
        }
        for (dst, src) in req.ifr_name.iter_mut().zip(if_name.bytes()) {
            *dst = src as c_char;
        }
        Ok(req)
    }
}

#[derive(Debug)]
pub struct Socket {
    pub fd: c_int,
    pub if_name: String,
    pub if_index: c_uint,
}

impl Socket {
    /// Opens a raw packet socket for all Ethertypes and resolves the
    /// device's ifindex.
    pub fn open(if_name: &str) -> Result<Socket> {
        let fd = unsafe { socket(AF_PACKET, SOCK_RAW, (ETH_P_ALL as u16).to_be() as i32) };
        if fd < 0 {
            return Err(IoError::last_os_error().into());
        }
        let if_index = get_if_index(if_name)?;
        if if_index == 0 {
            unsafe { libc::close(fd) };
            return Err(Error::NoDevice(if_name.to_string()));
        }
        Ok(Socket {
            if_name: if_name.to_string(),
            if_index,
            fd,
        })
    }

    /// Binds the socket to this device's ifindex for all Ethertypes and
    /// checks for a pending socket error.
    pub fn bind(&self) -> Result<()> {
        let mut sll: sockaddr_ll = unsafe { mem::zeroed() };
        sll.sll_family = AF_PACKET as u16;
        sll.sll_protocol = (ETH_P_ALL as u16).to_be();
        sll.sll_ifindex = self.if_index as c_int;

        let res = unsafe {
            bind(
                self.fd,
                &sll as *const sockaddr_ll as *const sockaddr,
                mem::size_of::<sockaddr_ll>() as socklen_t,
            )
        };
        if res != 0 {
            return Err(IoError::last_os_error().into());
        }
        self.check_pending_error()
    }

    fn check_pending_error(&self) -> Result<()> {
        let mut err: c_int = 0;
        let mut len = mem::size_of::<c_int>() as socklen_t;
        let res = unsafe {
            getsockopt(
                self.fd,
                SOL_SOCKET,
                libc::SO_ERROR,
                &mut err as *mut _ as *mut c_void,
                &mut len,
            )
        };
        if res != 0 {
            return Err(IoError::last_os_error().into());
        }
        if err != 0 {
            return Err(IoError::from_raw_os_error(err).into());
        }
        Ok(())
    }

    /// Joins `PACKET_ADD_MEMBERSHIP`/`PACKET_MR_PROMISC` for this ifindex
    /// (socket-scoped promiscuous membership, not the global
    /// `IFF_PROMISC` interface flag).
    pub fn enable_promiscuous(&self) -> Result<()> {
        self.setsockopt(tpacket::PACKET_ADD_MEMBERSHIP, self.promisc_mreq())
    }

    fn promisc_mreq(&self) -> PacketMreq {
        PacketMreq {
            mr_ifindex: self.if_index as c_int,
            mr_type: tpacket::PACKET_MR_PROMISC as u16,
            mr_alen: 0,
            mr_address: [0; 8],
        }
    }

    /// Queries the link-layer hardware type via `SIOCGIFHWADDR` and
    /// confirms it is `ARPHRD_ETHER`.
    pub fn check_ethernet(&self) -> Result<()> {
        let mut req = IfReqHwAddr::with_if_name(&self.if_name)?;
        let res = unsafe { ioctl(self.fd, SIOCGIFHWADDR, &mut req) };
        if res == -1 {
            return Err(IoError::last_os_error().into());
        }
        if req.ifr_hwaddr_family as c_int != ARPHRD_ETHER {
            return Err(Error::ConfigError(format!(
                "{}: unsupported link type (not Ethernet)",
                self.if_name
            )));
        }
        Ok(())
    }

    /// `getsockopt(PACKET_HDRLEN)`: pass the desired ring version in,
    /// kernel overwrites it with that version's header length.
    pub fn hdrlen_for_version(&self, version: c_int) -> Result<u32> {
        let mut val: c_int = version;
        let mut len = mem::size_of::<c_int>() as socklen_t;
        let res = unsafe {
            getsockopt(
                self.fd,
                SOL_PACKET,
                tpacket::PACKET_HDRLEN,
                &mut val as *mut _ as *mut c_void,
                &mut len,
            )
        };
        if res != 0 {
            return Err(IoError::last_os_error().into());
        }
        Ok(val as u32)
    }

    pub fn setsockopt<T>(&self, opt: c_int, val: T) -> Result<()> {
        let res = unsafe {
            setsockopt(
                self.fd,
                SOL_PACKET,
                opt,
                &val as *const _ as *const c_void,
                mem::size_of_val(&val) as socklen_t,
            )
        };
        if res == 0 {
            Ok(())
        } else {
            Err(IoError::last_os_error().into())
        }
    }

    /// Negotiating a ring (`PACKET_RX_RING`/`PACKET_TX_RING`) fails with
    /// `ENOMEM` when the kernel can't allocate the requested block/frame
    /// set; the fabricator retries at a smaller order on that specific
    /// errno and treats anything else as fatal.
    pub fn setsockopt_ring<T>(&self, opt: c_int, val: T) -> Result<()> {
        match self.setsockopt(opt, val) {
            Err(Error::OsError(ref e)) if e.raw_os_error() == Some(libc::ENOMEM) => {
                Err(Error::OutOfMemory(format!(
                    "kernel rejected ring layout for {}",
                    self.if_name
                )))
            }
            other => other,
        }
    }

    pub fn get_rx_statistics(&self) -> Result<tpacket::TpacketStats> {
        let mut stats = tpacket::TpacketStats::default();
        let mut len = mem::size_of::<tpacket::TpacketStats>() as socklen_t;
        let res = unsafe {
            getsockopt(
                self.fd,
                SOL_PACKET,
                tpacket::PACKET_STATISTICS,
                &mut stats as *mut _ as *mut c_void,
                &mut len,
            )
        };
        if res == 0 {
            Ok(stats)
        } else {
            Err(IoError::last_os_error().into())
        }
    }

    /// Plain `sendto` path used when an instance has no TX ring.
    pub fn send_to(&self, data: &[u8], dest: &sockaddr_ll) -> Result<()> {
        let res = unsafe {
            sendto(
                self.fd,
                data.as_ptr() as *const c_void,
                data.len(),
                0,
                dest as *const sockaddr_ll as *const sockaddr,
                mem::size_of::<sockaddr_ll>() as socklen_t,
            )
        };
        if res >= 0 {
            Ok(())
        } else {
            Err(IoError::last_os_error().into())
        }
    }

    /// Zero-byte kick that nudges the kernel into draining
    /// `TP_STATUS_SEND_REQUEST` frames queued on the TX ring.
    pub fn kick_tx(&self) -> Result<()> {
        let res = unsafe { libc::send(self.fd, std::ptr::null(), 0, 0) };
        if res >= 0 {
            Ok(())
        } else {
            Err(IoError::last_os_error().into())
        }
    }
}

impl AsRawFd for Socket {
    fn as_raw_fd(&self) -> RawFd {
        self.fd
    }
}

impl Drop for Socket {
    fn drop(&mut self) {
        if self.fd >= 0 {
            unsafe {
                libc::close(self.fd);
            }
        }
    }
}

pub fn get_if_index(name: &str) -> Result<c_uint> {
    let cname = CString::new(name)
        .map_err(|_| Error::ConfigError(format!("interface name contains NUL: {}", name)))?;
    let index = unsafe { if_nametoindex(cname.as_ptr()) };
    Ok(index)
}
