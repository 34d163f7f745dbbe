//! TPACKET_V2 wire structures and kernel constants (linux/if_packet.h).
//!
//! `libc` does not export the `PACKET_*` socket-option numbers or the
//! `tpacket2_hdr`/`tpacket_req`/`tpacket_stats` layouts on every target, so
//! they are defined here as literal values with the C macro name in a
//! comment.

use libc::{c_int, c_uint};

pub const TPACKET_ALIGNMENT: u32 = 16;

#[inline]
pub const fn align(x: u32) -> u32 {
    (x + TPACKET_ALIGNMENT - 1) & !(TPACKET_ALIGNMENT - 1)
}

// sockopt levels/names (SOL_PACKET)
pub const PACKET_ADD_MEMBERSHIP: c_int = 1;
pub const PACKET_DROP_MEMBERSHIP: c_int = 2;
pub const PACKET_RX_RING: c_int = 5;
pub const PACKET_STATISTICS: c_int = 6;
pub const PACKET_VERSION: c_int = 10;
pub const PACKET_HDRLEN: c_int = 11;
pub const PACKET_RESERVE: c_int = 12;
pub const PACKET_TX_RING: c_int = 13;
pub const PACKET_FANOUT: c_int = 18;

pub const PACKET_MR_PROMISC: c_int = 1;

pub const TPACKET_V1: c_int = 0;
pub const TPACKET_V2: c_int = 1;

pub const PACKET_FANOUT_HASH: c_int = 0;
pub const PACKET_FANOUT_LB: c_int = 1;
pub const PACKET_FANOUT_CPU: c_int = 2;
pub const PACKET_FANOUT_ROLLOVER: c_int = 3;
pub const PACKET_FANOUT_RND: c_int = 4;
pub const PACKET_FANOUT_QM: c_int = 5;

pub const PACKET_FANOUT_FLAG_ROLLOVER: c_int = 0x1000;
pub const PACKET_FANOUT_FLAG_DEFRAG: c_int = 0x8000;

pub const ARPHRD_ETHER: c_int = 1;

pub const TP_STATUS_KERNEL: u32 = 0;
pub const TP_STATUS_USER: u32 = 1 << 0;
pub const TP_STATUS_VLAN_VALID: u32 = 1 << 4;

pub const TP_STATUS_AVAILABLE: u32 = 0;
pub const TP_STATUS_SEND_REQUEST: u32 = 1 << 0;

pub const ETH_HLEN: u32 = 14;
pub const ETH_ALEN: usize = 6;
pub const VLAN_TAG_LEN: u32 = 4;
pub const ETH_P_8021Q: u16 = 0x8100;

/// `struct packet_mreq`
#[repr(C)]
#[derive(Clone, Copy, Debug)]
pub struct PacketMreq {
    pub mr_ifindex: c_int,
    pub mr_type: u16,
    pub mr_alen: u16,
    pub mr_address: [u8; 8],
}

/// `struct tpacket_req` (v1/v2 ring negotiation request).
#[repr(C)]
#[derive(Clone, Copy, Debug, Default)]
pub struct TpacketReq {
    pub tp_block_size: c_uint,
    pub tp_block_nr: c_uint,
    pub tp_frame_size: c_uint,
    pub tp_frame_nr: c_uint,
}

/// `struct tpacket_stats` (v1/v2 kernel counters; get-and-reset on read).
#[repr(C)]
#[derive(Clone, Copy, Debug, Default)]
pub struct TpacketStats {
    pub tp_packets: c_uint,
    pub tp_drops: c_uint,
}

/// `struct tpacket2_hdr`, 32 bytes, followed in the frame by a
/// `sockaddr_ll`, then the reserved VLAN headroom, then the Ethernet frame.
#[repr(C)]
#[derive(Clone, Copy, Debug)]
pub struct Tpacket2Hdr {
    pub tp_status: u32,
    pub tp_len: u32,
    pub tp_snaplen: u32,
    pub tp_mac: u16,
    pub tp_net: u16,
    pub tp_sec: u32,
    pub tp_nsec: u32,
    pub tp_vlan_tci: u16,
    pub tp_vlan_tpid: u16,
    pub tp_padding: [u8; 4],
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn align_rounds_up_to_16() {
        assert_eq!(align(0), 0);
        assert_eq!(align(1), 16);
        assert_eq!(align(16), 16);
        assert_eq!(align(17), 32);
    }

    #[test]
    fn tpacket2_hdr_is_32_bytes() {
        assert_eq!(std::mem::size_of::<Tpacket2Hdr>(), 32);
    }
}
