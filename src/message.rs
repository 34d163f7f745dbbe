//! Message/verdict data model. `Message` is a non-owning view plus an
//! opaque loan token ("reusable current message slot"): `Context` checks
//! the token at `msg_finalize` so a mismatched or repeated finalize is a
//! detectable programming error instead of silently releasing the wrong
//! frame.

use std::slice;

use crate::ring::Entry;

/// Normalized per-frame header.
#[derive(Clone, Copy, Debug, Default)]
pub struct PacketHeader {
    pub ts_sec: u32,
    pub ts_usec: u32,
    pub caplen: u32,
    pub pktlen: u32,
    pub ingress_index: i32,
    /// `-1` when there is no peer ("unknown" egress).
    pub egress_index: i32,
}

/// Opaque identity of a loaned descriptor slot.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct MessageToken(pub(crate) u64);

/// A borrowed view of one received frame, valid until the matching
/// `msg_finalize` call. All fields are plain values over raw ring memory,
/// so the handle itself is `Copy`; `Context` relies on this to keep one
/// copy loaned internally while returning another to the host.
#[derive(Clone, Copy, Debug)]
pub struct Message {
    pub header: PacketHeader,
    pub(crate) token: MessageToken,
    pub(crate) instance_index: usize,
    pub(crate) entry: Entry,
    data_ptr: *const u8,
    data_len: usize,
}

impl Message {
    pub(crate) fn new(
        header: PacketHeader,
        token: MessageToken,
        instance_index: usize,
        entry: Entry,
        data_ptr: *const u8,
        data_len: usize,
    ) -> Self {
        Message {
            header,
            token,
            instance_index,
            entry,
            data_ptr,
            data_len,
        }
    }

    pub fn data(&self) -> &[u8] {
        unsafe { slice::from_raw_parts(self.data_ptr, self.data_len) }
    }
}

/// Outcome of `msg_receive`.
#[derive(Debug)]
pub enum ReceiveOutcome {
    Message(Message),
    Timeout,
    Interrupted,
}

/// Host-supplied disposition for a received frame, given to `msg_finalize`.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Verdict {
    Pass,
    Block,
    Replace,
    Whitelist,
    Blacklist,
    Ignore,
    Retry,
}

pub const VERDICT_COUNT: usize = 7;

impl Verdict {
    fn index(self) -> usize {
        match self {
            Verdict::Pass => 0,
            Verdict::Block => 1,
            Verdict::Replace => 2,
            Verdict::Whitelist => 3,
            Verdict::Blacklist => 4,
            Verdict::Ignore => 5,
            Verdict::Retry => 6,
        }
    }

    pub(crate) fn stats_index(self) -> usize {
        self.index()
    }

    /// Fixed translation table: everything not explicitly
    /// BLOCK/BLACKLIST/RETRY passes.
    pub fn translate(self) -> TranslatedVerdict {
        match self {
            Verdict::Block | Verdict::Blacklist | Verdict::Retry => TranslatedVerdict::Block,
            Verdict::Pass | Verdict::Replace | Verdict::Whitelist | Verdict::Ignore => {
                TranslatedVerdict::Pass
            }
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TranslatedVerdict {
    Pass,
    Block,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unknown_verdicts_translate_to_pass_or_block_per_fixed_table() {
        assert_eq!(Verdict::Pass.translate(), TranslatedVerdict::Pass);
        assert_eq!(Verdict::Replace.translate(), TranslatedVerdict::Pass);
        assert_eq!(Verdict::Whitelist.translate(), TranslatedVerdict::Pass);
        assert_eq!(Verdict::Ignore.translate(), TranslatedVerdict::Pass);
        assert_eq!(Verdict::Block.translate(), TranslatedVerdict::Block);
        assert_eq!(Verdict::Blacklist.translate(), TranslatedVerdict::Block);
        assert_eq!(Verdict::Retry.translate(), TranslatedVerdict::Block);
    }

    #[test]
    fn verdict_indices_are_distinct_and_in_range() {
        let verdicts = [
            Verdict::Pass,
            Verdict::Block,
            Verdict::Replace,
            Verdict::Whitelist,
            Verdict::Blacklist,
            Verdict::Ignore,
            Verdict::Retry,
        ];
        let mut seen = std::collections::HashSet::new();
        for v in verdicts {
            assert!(v.stats_index() < VERDICT_COUNT);
            assert!(seen.insert(v.stats_index()));
        }
    }
}
