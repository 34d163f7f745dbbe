//! Ring layout planner: turns a snaplen and a per-ring byte budget into
//! concrete TPACKET_V2 block/frame dimensions.

use crate::error::{Error, Result};
use crate::tpacket::{align, ETH_HLEN, VLAN_TAG_LEN};
use libc::sockaddr_ll;

/// Achieved block/frame dimensions for one ring.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RingLayout {
    pub frame_size: u32,
    pub frame_count: u32,
    pub block_size: u32,
    pub block_count: u32,
}

impl RingLayout {
    pub fn total_size(&self) -> u64 {
        self.block_size as u64 * self.block_count as u64
    }
}

/// Net-data offset within a frame, after the TPACKET header, the
/// `sockaddr_ll`, and the reserved VLAN headroom.
fn net_offset(hdr_len: u32) -> u32 {
    let h_sll = align(hdr_len) + std::mem::size_of::<sockaddr_ll>() as u32;
    align(h_sll + ETH_HLEN) + VLAN_TAG_LEN
}

/// Plan one ring's dimensions for the given snaplen, byte budget, kernel
/// header length, and page order (0..=3, doubled on retry by the fabricator
/// on `OutOfMemory`). `page_size` is the host's page size.
pub fn plan(
    snaplen: u32,
    budget_bytes: u64,
    hdr_len: u32,
    order: u32,
    page_size: u32,
) -> Result<RingLayout> {
    let netoff = net_offset(hdr_len);
    let frame_size = align(netoff - ETH_HLEN + snaplen);

    let mut block_size = page_size << order;
    while block_size < frame_size {
        block_size = block_size
            .checked_mul(2)
            .ok_or_else(|| Error::ConfigError("ring layout: block size overflow".into()))?;
    }

    let frames_per_block = block_size / frame_size;
    if frames_per_block == 0 {
        return Err(Error::ConfigError(
            "ring layout: frame size exceeds block size".into(),
        ));
    }

    let mut frame_count = (budget_bytes / frame_size as u64) as u32;
    if frame_count == 0 {
        return Err(Error::ConfigError(
            "ring layout: buffer budget too small for one frame".into(),
        ));
    }
    let block_count = frame_count / frames_per_block;
    if block_count == 0 {
        return Err(Error::ConfigError(
            "ring layout: buffer budget too small for one block".into(),
        ));
    }
    frame_count = block_count * frames_per_block;

    Ok(RingLayout {
        frame_size,
        frame_count,
        block_size,
        block_count,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    // Boundary scenario: snaplen=1500, budget=1MB, page=4096.
    #[test]
    fn layout_boundary_scenario() {
        let hdr_len = 32; // size_of::<Tpacket2Hdr>()
        let layout = plan(1500, 1024 * 1024, hdr_len, 0, 4096).unwrap();

        let expected_netoff = net_offset(hdr_len);
        let expected_frame_size = align(expected_netoff - ETH_HLEN + 1500);
        assert_eq!(layout.frame_size, expected_frame_size);

        assert!(layout.block_size >= layout.frame_size);
        assert_eq!(layout.block_size % 4096, 0);
        assert!((layout.block_size / 4096).is_power_of_two());

        assert_eq!(
            layout.block_count * (layout.block_size / layout.frame_size),
            layout.frame_count
        );
    }

    #[test]
    fn zero_budget_is_an_error() {
        assert!(plan(1500, 0, 32, 0, 4096).is_err());
    }

    #[test]
    fn larger_order_doubles_block_size_until_it_fits() {
        let small = plan(1500, 1024 * 1024, 32, 0, 4096).unwrap();
        let larger_order = plan(1500, 1024 * 1024, 32, 3, 4096).unwrap();
        assert_eq!(larger_order.block_size, small.block_size << 3);
    }

    #[test]
    fn huge_snaplen_forces_block_growth_past_page_size() {
        let layout = plan(65000, 16 * 1024 * 1024, 32, 0, 4096).unwrap();
        assert!(layout.block_size > 4096);
        assert!(layout.block_size >= layout.frame_size);
    }
}
