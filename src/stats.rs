//! Statistics and control: aggregates kernel `PACKET_STATISTICS` across
//! instances and tracks the software-side counters.

use crate::message::{Verdict, VERDICT_COUNT};
use crate::socket::Socket;

#[derive(Clone, Copy, Debug, Default)]
pub struct Stats {
    pub hw_packets_received: u64,
    pub hw_packets_dropped: u64,
    pub packets_filtered: u64,
    pub packets_injected: u64,
    pub verdicts: [u64; VERDICT_COUNT],
}

impl Stats {
    pub fn record_verdict(&mut self, verdict: Verdict) {
        self.verdicts[verdict.stats_index()] += 1;
    }

    /// Folds in one instance's `PACKET_STATISTICS` read. Per kernel quirk,
    /// `tp_packets` includes `tp_drops`, so drops are subtracted before
    /// adding to the received counter.
    pub fn accumulate_hw(&mut self, tp_packets: u32, tp_drops: u32) {
        self.hw_packets_received += (tp_packets as u64).saturating_sub(tp_drops as u64);
        self.hw_packets_dropped += tp_drops as u64;
    }
}

/// Reads and folds in `PACKET_STATISTICS` from every socket, for
/// `get_stats`. The kernel atomically resets its counters on read, so
/// repeated calls reflect only events since the previous call.
pub fn collect_hw_stats<'a>(stats: &mut Stats, sockets: impl Iterator<Item = &'a Socket>) {
    for socket in sockets {
        if let Ok(s) = socket.get_rx_statistics() {
            stats.accumulate_hw(s.tp_packets, s.tp_drops);
        }
    }
}

/// Drains each socket's kernel counters by reading-and-discarding
/// `PACKET_STATISTICS`, then zeroes the software-side block, for
/// `reset_stats`.
pub fn reset<'a>(stats: &mut Stats, sockets: impl Iterator<Item = &'a Socket>) {
    for socket in sockets {
        let _ = socket.get_rx_statistics();
    }
    *stats = Stats::default();
}
