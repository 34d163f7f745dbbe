//! The BPF compiler and evaluator are external collaborators: the host
//! supplies an implementation of [`FilterCompiler`] through
//! [`crate::prepare`], and the module calls into it from `set_filter` and
//! the receive engine. The module never links a BPF compiler itself.

use std::sync::OnceLock;

use crate::error::{Error, Result};

/// A compiled filter program, produced by [`FilterCompiler::compile_filter`].
pub trait CompiledFilter: Send {
    fn filter(&self, data: &[u8], wire_len: u32, cap_len: u32) -> bool;
}

/// Compiles a textual filter expression into a program for this link type
/// and capture length.
pub trait FilterCompiler: Send + Sync {
    fn compile_filter(
        &self,
        snaplen: u32,
        dlt: libc::c_int,
        expr: &str,
    ) -> Result<Box<dyn CompiledFilter>>;
}

/// The host capability table passed to [`crate::prepare`].
pub struct HostApi {
    pub filter_compiler: Box<dyn FilterCompiler>,
}

static HOST_API: OnceLock<HostApi> = OnceLock::new();

/// `prepare(base_api)`: registers the host's capability table.
/// May only be called once per process; a second call is a `ConfigError`.
pub fn prepare(api: HostApi) -> Result<()> {
    HOST_API
        .set(api)
        .map_err(|_| Error::ConfigError("prepare() called more than once".into()))
}

pub(crate) fn host_api() -> Result<&'static HostApi> {
    HOST_API
        .get()
        .ok_or_else(|| Error::ConfigError("prepare() was not called before use".into()))
}

#[cfg(test)]
pub(crate) mod test_support {
    use super::*;

    pub struct AlwaysAccept;
    impl CompiledFilter for AlwaysAccept {
        fn filter(&self, _data: &[u8], _wire_len: u32, _cap_len: u32) -> bool {
            true
        }
    }

    pub struct AlwaysReject;
    impl CompiledFilter for AlwaysReject {
        fn filter(&self, _data: &[u8], _wire_len: u32, _cap_len: u32) -> bool {
            false
        }
    }

    /// A compiler whose programs accept iff the textual expression is
    /// `"accept"`, for exercising `set_filter`/BPF-drop paths without a
    /// real BPF backend.
    pub struct ToyCompiler;
    impl FilterCompiler for ToyCompiler {
        fn compile_filter(
            &self,
            _snaplen: u32,
            _dlt: libc::c_int,
            expr: &str,
        ) -> Result<Box<dyn CompiledFilter>> {
            match expr {
                "accept" => Ok(Box::new(AlwaysAccept)),
                "reject" => Ok(Box::new(AlwaysReject)),
                "" => Err(Error::Filter("empty filter expression".into())),
                other => Err(Error::Filter(format!("unsupported toy filter: {}", other))),
            }
        }
    }

    /// Registers [`ToyCompiler`] with [`prepare`], tolerating the
    /// already-prepared error so every test module can call this
    /// independently within the same test binary.
    pub fn ensure_prepared() {
        let _ = prepare(HostApi {
            filter_compiler: Box::new(ToyCompiler),
        });
    }
}
