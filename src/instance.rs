//! Interface instance: one bound NIC with its socket, mmap region, RX
//! ring, and optional TX ring.

use std::os::unix::io::AsRawFd;
use std::ptr;

use libc::{c_void, sockaddr_ll, MAP_FAILED, MAP_SHARED, PROT_READ, PROT_WRITE};

use crate::error::{Error, Result};
use crate::ring::{Ring, RingKind};
use crate::socket::Socket;
use crate::tpacket;

/// One bound interface: the kernel socket, its mapped rings, and (in
/// in-line mode) the index of its bridge peer within the owning context's
/// instance vector (indices, not reciprocal-owning back-pointers).
pub struct Instance {
    pub name: String,
    pub socket: Socket,
    pub peer: Option<usize>,
    pub hdr_len: u32,
    map_base: *mut u8,
    map_len: usize,
    pub rx: Ring,
    pub tx: Option<Ring>,
    /// Source-address template used by the plain-`sendto` transmit path
    /// the Ethertype is overwritten per outbound frame.
    pub tx_template: sockaddr_ll,
}

unsafe impl Send for Instance {}

impl Instance {
    /// Runs the full startup sequence for one device name: open, bind,
    /// join promiscuous mode, verify Ethernet, negotiate rings, map them.
    /// `needs_tx` is true when this instance has a bridge peer (in-line
    /// mode).
    pub fn start(
        name: &str,
        needs_tx: bool,
        peer: Option<usize>,
        snaplen: u32,
        ring_budget_bytes: u64,
        page_size: u32,
        fanout: Option<libc::c_int>,
    ) -> Result<Instance> {
        log::debug!("{}: opening raw packet socket", name);
        let socket = Socket::open(name)?;
        socket.bind()?;
        socket.enable_promiscuous()?;
        socket.check_ethernet()?;

        let hdr_len = socket.hdrlen_for_version(tpacket::TPACKET_V2)?;
        socket.setsockopt(tpacket::PACKET_VERSION, tpacket::TPACKET_V2)?;
        socket.setsockopt(tpacket::PACKET_RESERVE, tpacket::VLAN_TAG_LEN as libc::c_int)?;

        let (rx_layout, rx_size) = Ring::negotiate(
            &socket,
            RingKind::Rx,
            snaplen,
            ring_budget_bytes,
            hdr_len,
            page_size,
        )?;

        let tx_layout = if needs_tx {
            Some(Ring::negotiate(
                &socket,
                RingKind::Tx,
                snaplen,
                ring_budget_bytes,
                hdr_len,
                page_size,
            )?)
        } else {
            None
        };

        let tx_size = tx_layout.as_ref().map(|(_, size)| *size).unwrap_or(0);
        let map_len = (rx_size + tx_size) as usize;

        let map_base = unsafe {
            libc::mmap(
                ptr::null_mut(),
                map_len,
                PROT_READ | PROT_WRITE,
                MAP_SHARED,
                socket.as_raw_fd(),
                0,
            )
        };
        if map_base == MAP_FAILED {
            return Err(std::io::Error::last_os_error().into());
        }
        let map_base = map_base as *mut u8;

        let rx = Ring::attach(RingKind::Rx, rx_layout, map_base);
        let tx = tx_layout.map(|(layout, _)| {
            let tx_base = unsafe { map_base.add(rx_size as usize) };
            Ring::attach(RingKind::Tx, layout, tx_base)
        });

        if let Some(fanout_arg) = fanout {
            // fanout group argument: (type|flags) << 16 | ifindex-as-group-id.
            let value = ((fanout_arg as u32) << 16) | (socket.if_index & 0xffff);
            socket.setsockopt(tpacket::PACKET_FANOUT, value as libc::c_int)?;
        }

        log::info!(
            "{}: ring ready (rx frame_size={} frame_count={}, tx={})",
            name,
            rx_layout.frame_size,
            rx_layout.frame_count,
            needs_tx
        );

        let mut tx_template: sockaddr_ll = unsafe { std::mem::zeroed() };
        tx_template.sll_family = libc::AF_PACKET as u16;
        tx_template.sll_ifindex = socket.if_index as libc::c_int;
        tx_template.sll_halen = crate::tpacket::ETH_ALEN as u8;

        Ok(Instance {
            name: name.to_string(),
            socket,
            peer,
            hdr_len,
            map_base,
            map_len,
            rx,
            tx,
            tx_template,
        })
    }

    pub fn if_index(&self) -> libc::c_uint {
        self.socket.if_index
    }
}

impl Drop for Instance {
    /// Teardown in reverse order of acquisition: entry arrays are dropped
    /// along with the `Ring`s below, then munmap, then zero-sized ring
    /// teardown so the kernel releases its side, then the socket closes in
    /// `Socket`'s own `Drop`. Promiscuous membership is left set, matching
    /// most production capture tools that leave NIC mode management to
    /// the operator.
    fn drop(&mut self) {
        if !self.map_base.is_null() {
            unsafe {
                libc::munmap(self.map_base as *mut c_void, self.map_len);
            }
        }
        let _ = self
            .socket
            .setsockopt_ring(tpacket::PACKET_RX_RING, tpacket::TpacketReq::default());
        if self.tx.is_some() {
            let _ = self
                .socket
                .setsockopt_ring(tpacket::PACKET_TX_RING, tpacket::TpacketReq::default());
        }
    }
}

/// Validates that every peer index refers to an instance whose own peer
/// points back (the bridge-symmetry invariant).
pub fn check_bridge_symmetry(instances: &[Instance]) -> Result<()> {
    for (i, inst) in instances.iter().enumerate() {
        if let Some(peer_idx) = inst.peer {
            let peer = instances.get(peer_idx).ok_or_else(|| {
                Error::ConfigError(format!("instance {} has an out-of-range peer", inst.name))
            })?;
            if peer.peer != Some(i) {
                return Err(Error::ConfigError(format!(
                    "bridge asymmetry between {} and {}",
                    inst.name, peer.name
                )));
            }
        }
    }
    Ok(())
}
