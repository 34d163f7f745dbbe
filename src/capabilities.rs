//! Capability bitset and datalink type advertised by `get_capabilities` /
//! `get_datalink_type`.

pub const DLT_EN10MB: libc::c_int = 1;

pub const CAP_BLOCK: u32 = 1 << 0;
pub const CAP_REPLACE: u32 = 1 << 1;
pub const CAP_INJECT: u32 = 1 << 2;
pub const CAP_UNPRIV_START: u32 = 1 << 3;
pub const CAP_BREAKLOOP: u32 = 1 << 4;
pub const CAP_BPF: u32 = 1 << 5;
pub const CAP_DEVICE_INDEX: u32 = 1 << 6;

pub const CAPABILITIES: u32 =
    CAP_BLOCK | CAP_REPLACE | CAP_INJECT | CAP_UNPRIV_START | CAP_BREAKLOOP | CAP_BPF | CAP_DEVICE_INDEX;
