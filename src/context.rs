//! Context: the top-level aggregator and state machine, and the receive
//! engine that drives it.

use std::slice;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

use libc::{poll, pollfd, POLLERR, POLLHUP, POLLIN, POLLNVAL};

use crate::bridge::{self, Mode as BridgeMode};
use crate::config::ModuleConfig;
use crate::error::{Error, ErrorBuffer, Result};
use crate::filter::{self, CompiledFilter};
use crate::instance::{self, Instance};
use crate::message::{Message, MessageToken, PacketHeader, ReceiveOutcome, Verdict};
use crate::stats::{self, Stats};
use crate::tpacket;
use crate::transmit;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ContextState {
    Uninitialized,
    Initialized,
    Started,
    Stopped,
}

/// `initialize(config)` inputs.
pub struct InitConfig {
    pub device_spec: String,
    pub mode: BridgeMode,
    pub snaplen: u32,
    pub poll_timeout_ms: i32,
    pub options: Vec<(String, String)>,
}

/// Host page size, queried once via `sysconf` rather than assumed, since
/// the ring layout planner treats it as a kernel-given input.
fn host_page_size() -> u32 {
    let size = unsafe { libc::sysconf(libc::_SC_PAGESIZE) };
    if size > 0 {
        size as u32
    } else {
        4096
    }
}

pub struct Context {
    device_spec: String,
    mode: BridgeMode,
    snaplen: u32,
    poll_timeout_ms: i32,
    module_config: ModuleConfig,
    state: ContextState,
    instances: Vec<Instance>,
    filter: Option<Box<dyn CompiledFilter>>,
    stats: Stats,
    break_loop: AtomicBool,
    scan_cursor: usize,
    loaned: Option<Message>,
    next_token: AtomicU64,
    error_buffer: ErrorBuffer,
}

impl Context {
    /// `initialize(config)`: parses the device spec and configuration
    /// options but does not touch the network.
    pub fn initialize(config: InitConfig) -> Result<Context> {
        if config.snaplen == 0 {
            return Err(Error::ConfigError("snaplen must be nonzero".into()));
        }
        bridge::parse_device_spec(&config.device_spec, config.mode)?;
        let module_config = ModuleConfig::from_options(&config.options)?;
        if module_config.debug {
            // The `debug` key raises the module's own emitted level floor.
            // It does not install a logger — sink selection stays the
            // host's job.
            log::set_max_level(log::LevelFilter::Trace);
        }

        Ok(Context {
            device_spec: config.device_spec,
            mode: config.mode,
            snaplen: config.snaplen,
            poll_timeout_ms: config.poll_timeout_ms,
            module_config,
            state: ContextState::Initialized,
            instances: Vec::new(),
            filter: None,
            stats: Stats::default(),
            break_loop: AtomicBool::new(false),
            scan_cursor: 0,
            loaned: None,
            next_token: AtomicU64::new(1),
            error_buffer: ErrorBuffer::default(),
        })
    }

    fn fail(&mut self, err: Error) -> Error {
        self.error_buffer.set(&err);
        err
    }

    fn require_state(&self, expected: ContextState) -> Result<()> {
        self.require_one_of(&[expected])
    }

    fn require_one_of(&self, allowed: &[ContextState]) -> Result<()> {
        if allowed.contains(&self.state) {
            Ok(())
        } else {
            Err(Error::ConfigError(format!(
                "operation requires state {:?}, context is {:?}",
                allowed, self.state
            )))
        }
    }

    pub fn last_error(&self) -> &str {
        self.error_buffer.as_str()
    }

    pub fn check_status(&self) -> ContextState {
        self.state
    }

    pub fn get_snaplen(&self) -> u32 {
        self.snaplen
    }

    pub fn get_capabilities(&self) -> u32 {
        crate::capabilities::CAPABILITIES
    }

    pub fn get_datalink_type(&self) -> libc::c_int {
        crate::capabilities::DLT_EN10MB
    }

    pub fn get_device_index(&self, name: &str) -> Result<libc::c_uint> {
        let index = crate::socket::get_if_index(name)?;
        if index == 0 {
            Err(Error::NoDevice(name.to_string()))
        } else {
            Ok(index)
        }
    }

    /// `set_filter(filter_expr)`. Compiles into a local value first and
    /// only swaps it into `self.filter` on success, so a failed
    /// recompilation leaves the previously-installed filter untouched.
    pub fn set_filter(&mut self, expr: &str) -> Result<()> {
        let api = filter::host_api()?;
        let compiled = api
            .filter_compiler
            .compile_filter(self.snaplen, self.get_datalink_type(), expr)
            .map_err(|e| self.fail(e))?;
        self.filter = Some(compiled);
        Ok(())
    }

    /// `start`: binds every device, creates and maps rings, transitions to
    /// STARTED. Partial failure drops the already-created instances via
    /// `Instance`'s own teardown. Legal from `Initialized` (first start) or
    /// `Stopped` (re-arming after `stop`/`shutdown`); `start -> stop ->
    /// start` must yield an equivalent working context.
    pub fn start(&mut self) -> Result<()> {
        self.require_one_of(&[ContextState::Initialized, ContextState::Stopped])
            .map_err(|e| self.fail(e))?;

        let entries = bridge::parse_device_spec(&self.device_spec, self.mode)
            .map_err(|e| self.fail(e))?;
        let ring_count = entries
            .iter()
            .map(|e| if e.peer.is_some() { 2 } else { 1 })
            .sum::<u64>()
            .max(1);
        let per_ring_budget = self.module_config.buffer_bytes_per_ring_group / ring_count;
        if per_ring_budget == 0 {
            return Err(self.fail(Error::ConfigError(
                "buffer_size_mb too small for the configured number of rings".into(),
            )));
        }

        let fanout_arg = self.module_config.fanout.as_ref().map(|f| f.method | f.flags);

        let page_size = host_page_size();
        let mut instances = Vec::with_capacity(entries.len());
        for entry in &entries {
            let inst = Instance::start(
                &entry.name,
                entry.peer.is_some(),
                entry.peer,
                self.snaplen,
                per_ring_budget,
                page_size,
                fanout_arg,
            )
            .map_err(|e| self.fail(e))?;
            instances.push(inst);
        }

        instance::check_bridge_symmetry(&instances).map_err(|e| self.fail(e))?;

        self.instances = instances;
        self.scan_cursor = self.instances.len().saturating_sub(1);
        self.state = ContextState::Started;
        Ok(())
    }

    /// `stop`/`shutdown`: releases every instance and returns to STOPPED.
    /// `start` may be called again afterward.
    pub fn stop(&mut self) {
        self.instances.clear();
        self.loaned = None;
        self.state = ContextState::Stopped;
    }

    pub fn shutdown(&mut self) {
        self.stop();
    }

    pub fn breakloop(&self) {
        self.break_loop.store(true, Ordering::SeqCst);
    }

    fn clear_breakloop(&self) {
        self.break_loop.store(false, Ordering::SeqCst);
    }

    pub fn get_stats(&mut self) -> Stats {
        let mut stats = self.stats;
        stats::collect_hw_stats(&mut stats, self.instances.iter().map(|i| &i.socket));
        self.stats = stats;
        stats
    }

    pub fn reset_stats(&mut self) {
        stats::reset(&mut self.stats, self.instances.iter().map(|i| &i.socket));
    }

    /// `inject(pkthdr, data, reverse)`: forwards a frame as if it had just
    /// arrived on `pkthdr.ingress_index`, choosing that instance when
    /// `reverse` else its peer.
    pub fn inject(&mut self, pkthdr: &PacketHeader, data: &[u8], reverse: bool) -> Result<()> {
        self.require_state(ContextState::Started)
            .map_err(|e| self.fail(e))?;

        let ingress_idx = self
            .instances
            .iter()
            .position(|i| i.if_index() as i32 == pkthdr.ingress_index)
            .ok_or_else(|| self.fail(Error::NoDevice(format!("ifindex {}", pkthdr.ingress_index))))?;

        let egress_idx = if reverse {
            Some(ingress_idx)
        } else {
            self.instances[ingress_idx].peer
        };
        let egress_idx = egress_idx.ok_or_else(|| {
            self.fail(Error::NoDevice(format!(
                "instance at ifindex {} has no peer to inject on",
                pkthdr.ingress_index
            )))
        })?;

        transmit::transmit(&mut self.instances[egress_idx], data).map_err(|e| self.fail(e))?;
        self.stats.packets_injected += 1;
        Ok(())
    }

    fn alloc_token(&self) -> MessageToken {
        MessageToken(self.next_token.fetch_add(1, Ordering::Relaxed))
    }

    /// The find step: scans every instance once, starting just after the
    /// last instance that yielded a frame. Advances that instance's ring
    /// cursor and `self.scan_cursor` the moment a ready entry is found.
    fn find_ready_entry(&mut self) -> Option<(usize, crate::ring::Entry)> {
        let n = self.instances.len();
        if n == 0 {
            return None;
        }
        for step in 1..=n {
            let idx = (self.scan_cursor + step) % n;
            let inst = &mut self.instances[idx];
            let entry = inst.rx.cursor_entry();
            if entry.status() & tpacket::TP_STATUS_USER != 0 {
                inst.rx.advance_cursor();
                self.scan_cursor = idx;
                return Some((idx, entry));
            }
        }
        None
    }

    /// The wait step: blocks in `poll(2)` until some instance has data or
    /// the timeout elapses.
    fn wait_for_readiness(&self) -> Result<WaitOutcome> {
        let mut fds: Vec<pollfd> = self
            .instances
            .iter()
            .map(|i| pollfd {
                fd: std::os::unix::io::AsRawFd::as_raw_fd(&i.socket),
                events: POLLIN,
                revents: 0,
            })
            .collect();

        let res = unsafe { poll(fds.as_mut_ptr(), fds.len() as libc::nfds_t, self.poll_timeout_ms) };
        if res < 0 {
            let err = std::io::Error::last_os_error();
            return if err.raw_os_error() == Some(libc::EINTR) {
                Ok(WaitOutcome::Interrupted)
            } else {
                Err(err.into())
            };
        }
        if res == 0 {
            return Ok(WaitOutcome::Timeout);
        }
        for pfd in &fds {
            if pfd.revents & (POLLERR | POLLHUP | POLLNVAL) != 0 {
                return Err(Error::OsError(std::io::Error::new(
                    std::io::ErrorKind::Other,
                    "poll reported an error condition on an instance socket",
                )));
            }
        }
        Ok(WaitOutcome::Ready)
    }

    /// Frame decode, VLAN reconstruction, and BPF steps. Returns
    /// `Ok(Some(outcome))` to hand a message to the host, or `Ok(None)`
    /// when the frame was BPF-dropped and the find loop should continue.
    fn decode_and_publish(
        &mut self,
        instance_idx: usize,
        entry: crate::ring::Entry,
    ) -> Result<Option<ReceiveOutcome>> {
        let frame_size = self.instances[instance_idx].rx.layout.frame_size;
        let hdr = entry.header();
        let mut tp_len = hdr.tp_len;
        let mut tp_mac = hdr.tp_mac as u32;
        let mut tp_snaplen = hdr.tp_snaplen;
        let tp_sec = hdr.tp_sec;
        let ts_usec = hdr.tp_nsec / 1000;
        let tp_vlan_tci = hdr.tp_vlan_tci;
        let tp_vlan_tpid = hdr.tp_vlan_tpid;
        let tp_status = hdr.tp_status;

        if tp_mac + tp_snaplen > frame_size {
            return Err(Error::CorruptFrame(format!(
                "entry offsets ({} + {}) exceed frame size {}",
                tp_mac, tp_snaplen, frame_size
            )));
        }

        if let Some((tpid, tci)) =
            crate::vlan::resolve_tag(tp_vlan_tci, tp_vlan_tpid, tp_status, tp_snaplen, tp_mac)
        {
            let headroom = unsafe {
                slice::from_raw_parts_mut(
                    entry.raw().add((tp_mac - 4) as usize),
                    (tp_snaplen + 4) as usize,
                )
            };
            crate::vlan::reinsert(headroom, tpid, tci);
            tp_mac -= 4;
            tp_snaplen += 4;
            tp_len += 4;
        }

        let data_ptr = unsafe { entry.raw().add(tp_mac as usize) };

        if let Some(filter) = &self.filter {
            let data = unsafe { slice::from_raw_parts(data_ptr, tp_snaplen as usize) };
            if !filter.filter(data, tp_len, tp_snaplen) {
                self.stats.packets_filtered += 1;
                let peer_idx = self.instances[instance_idx].peer;
                if let Some(peer_idx) = peer_idx {
                    let data = unsafe { slice::from_raw_parts(data_ptr, tp_snaplen as usize) }.to_vec();
                    let _ = transmit::transmit(&mut self.instances[peer_idx], &data);
                }
                entry.set_status(tpacket::TP_STATUS_KERNEL);
                return Ok(None);
            }
        }

        let ingress_index = self.instances[instance_idx].if_index() as i32;
        let egress_index = self.instances[instance_idx]
            .peer
            .map(|idx| self.instances[idx].if_index() as i32)
            .unwrap_or(-1);

        let header = PacketHeader {
            ts_sec: tp_sec,
            ts_usec,
            caplen: tp_snaplen,
            pktlen: tp_len,
            ingress_index,
            egress_index,
        };
        let token = self.alloc_token();
        let message = Message::new(header, token, instance_idx, entry, data_ptr, tp_snaplen as usize);
        self.loaned = Some(message);
        Ok(Some(ReceiveOutcome::Message(message)))
    }

    /// `msg_receive`: the find/wait/decode/publish loop.
    pub fn msg_receive(&mut self) -> Result<ReceiveOutcome> {
        self.require_state(ContextState::Started)
            .map_err(|e| self.fail(e))?;
        if self.loaned.is_some() {
            return Err(self.fail(Error::ConfigError(
                "msg_receive called again before the previous message was finalized".into(),
            )));
        }

        loop {
            if self.break_loop.load(Ordering::SeqCst) {
                self.clear_breakloop();
                return Ok(ReceiveOutcome::Timeout);
            }

            if let Some((idx, entry)) = self.find_ready_entry() {
                match self.decode_and_publish(idx, entry) {
                    Ok(Some(outcome)) => return Ok(outcome),
                    Ok(None) => continue,
                    Err(e) => return Err(self.fail(e)),
                }
            }

            match self.wait_for_readiness() {
                Ok(WaitOutcome::Ready) => continue,
                Ok(WaitOutcome::Timeout) => return Ok(ReceiveOutcome::Timeout),
                Ok(WaitOutcome::Interrupted) => return Ok(ReceiveOutcome::Interrupted),
                Err(e) => return Err(self.fail(e)),
            }
        }
    }

    /// `msg_finalize(msg, verdict)`.
    pub fn msg_finalize(&mut self, msg: Message, verdict: Verdict) -> Result<()> {
        let loaned = self
            .loaned
            .take()
            .ok_or_else(|| self.fail(Error::ConfigError("no message is currently loaned".into())))?;
        if loaned.token != msg.token {
            self.loaned = Some(loaned);
            return Err(self.fail(Error::ConfigError(
                "msg_finalize called with a message that is not the loaned slot".into(),
            )));
        }

        self.stats.record_verdict(verdict);
        if verdict.translate() == crate::message::TranslatedVerdict::Pass {
            if let Some(peer_idx) = self.instances[msg.instance_index].peer {
                let data = msg.data().to_vec();
                let _ = transmit::transmit(&mut self.instances[peer_idx], &data);
            }
        }
        msg.entry.set_status(tpacket::TP_STATUS_KERNEL);
        Ok(())
    }
}

enum WaitOutcome {
    Ready,
    Timeout,
    Interrupted,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn base_config(spec: &str, mode: BridgeMode) -> InitConfig {
        InitConfig {
            device_spec: spec.to_string(),
            mode,
            snaplen: 1500,
            poll_timeout_ms: 1000,
            options: Vec::new(),
        }
    }

    #[test]
    fn initialize_rejects_bad_device_spec() {
        let cfg = base_config("", BridgeMode::Passive);
        assert!(Context::initialize(cfg).is_err());
    }

    #[test]
    fn initialize_rejects_zero_snaplen() {
        let mut cfg = base_config("eth0", BridgeMode::Passive);
        cfg.snaplen = 0;
        assert!(Context::initialize(cfg).is_err());
    }

    #[test]
    fn initialize_succeeds_and_starts_uninitialized_to_initialized() {
        let cfg = base_config("eth0:eth1", BridgeMode::Passive);
        let ctx = Context::initialize(cfg).unwrap();
        assert_eq!(ctx.check_status(), ContextState::Initialized);
    }

    #[test]
    fn start_before_initialize_equivalent_state_is_rejected() {
        let cfg = base_config("eth0", BridgeMode::Passive);
        let mut ctx = Context::initialize(cfg).unwrap();
        ctx.state = ContextState::Started;
        assert!(ctx.start().is_err());
    }

    #[test]
    fn start_accepts_stopped_state_to_allow_start_stop_start() {
        let cfg = base_config("eth0", BridgeMode::Passive);
        let mut ctx = Context::initialize(cfg).unwrap();
        ctx.state = ContextState::Stopped;
        // This sandbox has no "eth0" to bind, so `start` still fails, but it
        // must fail inside `Instance::start` (a `NoDevice`/`OsError`), not at
        // the state gate -- proving `Stopped` is an accepted starting state
        // alongside `Initialized`.
        let err = ctx.start().unwrap_err();
        assert!(!err.to_string().contains("operation requires state"));
    }

    #[test]
    fn set_filter_compiles_through_the_registered_host_api() {
        crate::filter::test_support::ensure_prepared();
        let cfg = base_config("eth0", BridgeMode::Passive);
        let mut ctx = Context::initialize(cfg).unwrap();
        ctx.set_filter("accept").unwrap();
        assert!(ctx.set_filter("").is_err());
    }

    #[test]
    fn inject_requires_started_state() {
        let cfg = base_config("eth0", BridgeMode::Passive);
        let mut ctx = Context::initialize(cfg).unwrap();
        let hdr = PacketHeader::default();
        assert!(ctx.inject(&hdr, &[], false).is_err());
    }

    #[test]
    fn msg_receive_requires_started_state() {
        let cfg = base_config("eth0", BridgeMode::Passive);
        let mut ctx = Context::initialize(cfg).unwrap();
        assert!(ctx.msg_receive().is_err());
    }

    #[test]
    fn msg_finalize_rejects_a_token_that_does_not_match_the_loaned_message() {
        let cfg = base_config("eth0", BridgeMode::Passive);
        let mut ctx = Context::initialize(cfg).unwrap();
        ctx.state = ContextState::Started;

        let layout = crate::layout::RingLayout {
            frame_size: 2048,
            frame_count: 2,
            block_size: 4096,
            block_count: 1,
        };
        let mut backing = vec![0u8; layout.total_size() as usize];
        let ring = crate::ring::Ring::attach(crate::ring::RingKind::Rx, layout, backing.as_mut_ptr());
        let entry = ring.entry(0);
        let header = PacketHeader::default();
        let loaned = Message::new(header, MessageToken(1), 0, entry, entry.raw(), 0);
        let wrong = Message::new(header, MessageToken(2), 0, entry, entry.raw(), 0);
        ctx.loaned = Some(loaned);

        assert!(ctx.msg_finalize(wrong, Verdict::Pass).is_err());
        // the original loan is restored, not silently consumed, on mismatch.
        assert!(ctx.loaned.is_some());
    }

    #[test]
    fn get_stats_and_reset_stats_on_an_instanceless_context() {
        let cfg = base_config("eth0", BridgeMode::Passive);
        let mut ctx = Context::initialize(cfg).unwrap();
        let stats = ctx.get_stats();
        assert_eq!(stats.hw_packets_received, 0);
        ctx.reset_stats();
    }
}
