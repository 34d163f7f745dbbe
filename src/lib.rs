//! AF_PACKET (`PACKET_MMAP`, TPACKET_V2) packet-ring acquisition module.
//!
//! Sources and sinks raw Ethernet frames through Linux's zero-copy packet
//! ring facility for an inline IDS/IPS host: negotiate the kernel ring
//! protocol, map and structure the shared memory, poll round-robin across
//! one or more bound interfaces, reconstruct VLAN tags the NIC stripped,
//! apply a host-supplied BPF filter, and forward verdict-driven frames
//! between bridge-paired interfaces.
//!
//! The BPF compiler/evaluator, the host's module loader, generic CLI/config
//! plumbing, and logging are external collaborators: register the BPF
//! capability table with [`prepare`] before calling [`context::Context::set_filter`].

pub mod bridge;
pub mod capabilities;
pub mod config;
pub mod context;
pub mod error;
pub mod filter;
pub mod instance;
pub mod layout;
pub mod message;
pub mod ring;
pub mod socket;
pub mod stats;
pub mod tpacket;
pub mod transmit;
pub mod vlan;

pub use config::{get_variable_descs, VariableDesc};
pub use context::{Context, ContextState, InitConfig};
pub use error::{Error, Result};
pub use filter::{prepare, CompiledFilter, FilterCompiler, HostApi};
pub use message::{Message, MessageToken, PacketHeader, ReceiveOutcome, TranslatedVerdict, Verdict};
pub use stats::Stats;
