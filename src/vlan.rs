//! VLAN-tag reconstruction: NICs that strip the 802.1Q tag report it
//! out-of-band in the TPACKET header; the module has to splice it back
//! into the captured bytes using the 4-byte headroom `PACKET_RESERVE`
//! pre-allocated ahead of the Ethernet destination MAC.

use crate::tpacket::{ETH_ALEN, ETH_P_8021Q, TP_STATUS_VLAN_VALID};

/// Shifts the destination+source MAC left by 4 bytes into the reserved
/// headroom and writes `TPID`/`TCI` (network byte order) into the gap that
/// opens up right before the Ethertype/length field.
///
/// `frame` must start 4 bytes before the Ethernet header (i.e. at the
/// reserved VLAN headroom) and be at least `4 + 2*ETH_ALEN` bytes long.
/// This is a pure function of its inputs, so it is directly
/// unit-testable without a mapped ring.
pub fn reinsert(frame: &mut [u8], tpid: u16, tci: u16) {
    debug_assert!(frame.len() >= 4 + 2 * ETH_ALEN);
    frame.copy_within(4..4 + 2 * ETH_ALEN, 0);
    let tag_offset = 2 * ETH_ALEN;
    frame[tag_offset..tag_offset + 2].copy_from_slice(&tpid.to_be_bytes());
    frame[tag_offset + 2..tag_offset + 4].copy_from_slice(&tci.to_be_bytes());
}

/// Undoes [`reinsert`]: shifts the MAC addresses back over the tag,
/// restoring the original kernel-supplied buffer.
pub fn strip(frame: &mut [u8]) {
    debug_assert!(frame.len() >= 4 + 2 * ETH_ALEN);
    frame.copy_within(0..2 * ETH_ALEN, 4);
}

/// Decides whether a captured frame carries a kernel-stripped VLAN tag
/// and, if so, which TPID to reinsert. A tag is present when
/// `tp_vlan_tci` is nonzero or the kernel set `TP_STATUS_VLAN_VALID`;
/// the TPID is trusted from `tp_vlan_tpid` only when the kernel marked
/// it valid and nonzero, defaulting to 0x8100 otherwise. Returns
/// `None` when there is nothing to reinsert or the captured bytes
/// don't leave enough room to shift the MAC addresses safely.
///
/// Pure function of the TPACKET header fields, independent of any
/// mapped ring, so the TPID-selection boundary case is directly
/// unit-testable.
pub fn resolve_tag(
    tp_vlan_tci: u16,
    tp_vlan_tpid: u16,
    tp_status: u32,
    tp_snaplen: u32,
    tp_mac: u32,
) -> Option<(u16, u16)> {
    let present = tp_vlan_tci != 0 || (tp_status & TP_STATUS_VLAN_VALID != 0);
    if !present || tp_snaplen < 2 * ETH_ALEN as u32 || tp_mac < 4 {
        return None;
    }
    let tpid = if tp_status & TP_STATUS_VLAN_VALID != 0 && tp_vlan_tpid != 0 {
        tp_vlan_tpid
    } else {
        ETH_P_8021Q
    };
    Some((tpid, tp_vlan_tci))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reinsert_places_tpid_and_tci_at_offset_12() {
        let mut frame = vec![0u8; 4 + 60];
        for (i, b) in frame[4..].iter_mut().enumerate() {
            *b = i as u8;
        }
        let original = frame[4..].to_vec();

        reinsert(&mut frame, 0x8100, 0x0064);

        assert_eq!(&frame[0..12], &original[0..12]);
        assert_eq!(&frame[12..14], &[0x81, 0x00]);
        assert_eq!(&frame[14..16], &[0x00, 0x64]);
        assert_eq!(&frame[16..], &original[12..]);
    }

    #[test]
    fn reinsert_then_strip_round_trips() {
        let mut frame = vec![0u8; 4 + 60];
        for (i, b) in frame[4..].iter_mut().enumerate() {
            *b = (i * 7) as u8;
        }
        let original = frame.clone();

        reinsert(&mut frame, 0x8100, 0x0064);
        strip(&mut frame);

        assert_eq!(frame, original);
    }

    #[test]
    fn resolve_tag_defaults_tpid_to_8021q_when_kernel_reports_zero() {
        // tp_vlan_tci set, TP_STATUS_VLAN_VALID set, tp_vlan_tpid == 0.
        let resolved = resolve_tag(0x0064, 0, TP_STATUS_VLAN_VALID, 60, 14);
        assert_eq!(resolved, Some((0x8100, 0x0064)));
    }

    #[test]
    fn resolve_tag_trusts_a_nonzero_kernel_reported_tpid() {
        let resolved = resolve_tag(0x0064, 0x88a8, TP_STATUS_VLAN_VALID, 60, 14);
        assert_eq!(resolved, Some((0x88a8, 0x0064)));
    }

    #[test]
    fn resolve_tag_ignores_tpid_when_status_bit_is_not_set() {
        // tp_vlan_tpid is only trusted alongside TP_STATUS_VLAN_VALID.
        let resolved = resolve_tag(0x0064, 0x88a8, 0, 60, 14);
        assert_eq!(resolved, Some((0x8100, 0x0064)));
    }

    #[test]
    fn resolve_tag_is_none_when_no_tag_is_present() {
        assert_eq!(resolve_tag(0, 0, 0, 60, 14), None);
    }

    #[test]
    fn resolve_tag_is_none_without_enough_captured_bytes_for_the_mac_addresses() {
        assert_eq!(resolve_tag(0x0064, 0, TP_STATUS_VLAN_VALID, 8, 14), None);
    }

    #[test]
    fn resolve_tag_is_none_without_enough_headroom_before_the_mac() {
        assert_eq!(resolve_tag(0x0064, 0, TP_STATUS_VLAN_VALID, 60, 2), None);
    }
}
