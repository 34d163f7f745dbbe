//! Transmit path: hands a frame to a peer's TX ring, or falls back to
//! plain `sendto` when the instance has no TX ring.

use crate::error::{Error, Result};
use crate::instance::Instance;
use crate::tpacket;

const ETHERTYPE_OFFSET: usize = 2 * tpacket::ETH_ALEN;

/// `transmit(egress, data)`. Returns `Error::Again` when the TX ring is
/// full; the receive engine treats that as best-effort and swallows it,
/// `inject` surfaces it to the caller.
pub fn transmit(egress: &mut Instance, data: &[u8]) -> Result<()> {
    if egress.tx.is_some() {
        transmit_via_ring(egress, data)
    } else {
        transmit_plain(egress, data)
    }
}

fn transmit_via_ring(egress: &mut Instance, data: &[u8]) -> Result<()> {
    let tx = egress.tx.as_mut().expect("checked by caller");
    let entry = tx.cursor_entry();
    if entry.status() != tpacket::TP_STATUS_AVAILABLE {
        return Err(Error::Again);
    }

    let payload_offset = tpacket::align(egress.hdr_len) as usize;
    let frame = unsafe { entry.frame_mut(tx.layout.frame_size as usize) };
    if payload_offset + data.len() > frame.len() {
        return Err(Error::CorruptFrame(
            "outbound frame exceeds TX frame size".into(),
        ));
    }
    frame[payload_offset..payload_offset + data.len()].copy_from_slice(data);

    let hdr = entry.header_mut();
    unsafe {
        (*hdr).tp_len = data.len() as u32;
        (*hdr).tp_snaplen = data.len() as u32;
    }
    entry.set_status(tpacket::TP_STATUS_SEND_REQUEST);
    tx.advance_cursor();

    egress.socket.kick_tx()
}

fn transmit_plain(egress: &mut Instance, data: &[u8]) -> Result<()> {
    if data.len() >= ETHERTYPE_OFFSET + 2 {
        let ethertype = u16::from_be_bytes([data[ETHERTYPE_OFFSET], data[ETHERTYPE_OFFSET + 1]]);
        egress.tx_template.sll_protocol = ethertype.to_be();
    }
    egress.socket.send_to(data, &egress.tx_template)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ethertype_offset_matches_two_mac_addresses() {
        assert_eq!(ETHERTYPE_OFFSET, 12);
    }
}
