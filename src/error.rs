use std::io;

/// Error taxonomy for the packet-ring acquisition module.
///
/// Every kind here formats into the bounded, last-writer-wins message the
/// host reads back through [`crate::context::Context::last_error`]; the
/// variant itself is the "discriminated code".
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("config: {0}")]
    ConfigError(String),

    #[error("no such device: {0}")]
    NoDevice(String),

    #[error("out of memory: {0}")]
    OutOfMemory(String),

    #[error("os error: {0}")]
    OsError(#[from] io::Error),

    #[error("corrupt frame: {0}")]
    CorruptFrame(String),

    #[error("resource temporarily unavailable")]
    Again,

    #[error("interrupted")]
    Interrupted,

    #[error("filter: {0}")]
    Filter(String),
}

pub type Result<T> = std::result::Result<T, Error>;

/// 256-char bounded, last-writer-wins error buffer.
#[derive(Debug, Default, Clone)]
pub struct ErrorBuffer {
    message: String,
}

const ERROR_BUFFER_CAP: usize = 256;

impl ErrorBuffer {
    pub fn set(&mut self, err: &Error) {
        let full = err.to_string();
        self.message = if full.len() > ERROR_BUFFER_CAP {
            full.chars().take(ERROR_BUFFER_CAP).collect()
        } else {
            full
        };
    }

    pub fn as_str(&self) -> &str {
        &self.message
    }
}
