//! Context state-machine and loaned-message invariants that don't require
//! a live NIC. Tests exercising a
//! real socket/ring are marked `#[ignore]` since they need `CAP_NET_RAW`
//! and a bound interface to run.

use afpacket_daq::bridge::Mode;
use afpacket_daq::{Context, ContextState, InitConfig};

/// Every test runs with logging enabled so a failing `#[ignore]`d
/// live-interface test leaves a trail when run explicitly. `try_init`
/// tolerates being called more than once across the binary's tests.
fn init_logging() {
    let _ = env_logger::try_init();
}

fn config(spec: &str) -> InitConfig {
    InitConfig {
        device_spec: spec.to_string(),
        mode: Mode::Passive,
        snaplen: 1500,
        poll_timeout_ms: 1000,
        options: Vec::new(),
    }
}

#[test]
fn new_context_is_initialized_not_uninitialized() {
    init_logging();
    let ctx = Context::initialize(config("eth0")).unwrap();
    assert_eq!(ctx.check_status(), ContextState::Initialized);
}

#[test]
fn operations_requiring_started_state_fail_before_start() {
    init_logging();
    let mut ctx = Context::initialize(config("eth0")).unwrap();
    assert!(ctx.msg_receive().is_err());
    let hdr = afpacket_daq::PacketHeader::default();
    assert!(ctx.inject(&hdr, &[], false).is_err());
}

#[test]
fn stop_on_a_never_started_context_is_harmless() {
    init_logging();
    let mut ctx = Context::initialize(config("eth0")).unwrap();
    ctx.stop();
    assert_eq!(ctx.check_status(), ContextState::Stopped);
}

#[test]
fn invalid_device_spec_is_rejected_at_initialize() {
    init_logging();
    // passive mode forbids '::'
    assert!(Context::initialize(config("eth0::eth1")).is_err());
    assert!(Context::initialize(config("eth0:eth1")).is_ok());
}

#[test]
fn breakloop_on_an_unstarted_context_does_not_panic() {
    init_logging();
    let ctx = Context::initialize(config("eth0")).unwrap();
    ctx.breakloop();
}

// Requires a real bound interface; run explicitly with
// `cargo test -- --ignored` on a host with CAP_NET_RAW.
#[test]
#[ignore]
fn start_stop_start_is_legal_on_a_real_interface() {
    init_logging();
    let mut ctx = Context::initialize(config("lo")).unwrap();
    ctx.start().unwrap();
    ctx.stop();
    ctx.start().unwrap();
    assert_eq!(ctx.check_status(), ContextState::Started);
}
