//! The crate-wide error taxonomy.
//!
//! Every fallible operation in this crate returns [`CoreError`] through the
//! [`Result`] alias. Construction errors, codec errors, and I/O failures all
//! funnel through here so that the supervisor boundary (see
//! [`crate::supervisor`]) has a single place to map failures onto process
//! exit codes.

use std::fmt;
use std::io;

use crate::byte_tree::DecodeError;

/// Convenience alias used throughout the crate.
pub type Result<T> = core::result::Result<T, CoreError>;

/// The full error taxonomy for the coordination substrate.
#[derive(Debug, thiserror::Error)]
pub enum CoreError {
    /// A caller-supplied value failed validation (bad `sid`, out-of-range
    /// `k`/`j`/`rbitlen`/`cert`, wrong-length active array, ...).
    #[error("invalid argument: {0}")]
    InvalidArg(String),

    /// A filesystem operation (create, rename, read, delete) failed.
    #[error("resource error: {context}")]
    ResourceError {
        context: String,
        #[source]
        source: io::Error,
    },

    /// A configuration key was missing, unknown, or unparseable.
    #[error("configuration error: {0}")]
    ConfigError(String),

    /// A byte-tree failed to decode within the configured limits.
    #[error("decode error: {0}")]
    DecodeError(#[from] DecodeError),

    /// A `fetch_from` call passed its deadline.
    #[error("timed out waiting for {0}")]
    Timeout(String),

    /// A peer was explicitly inactive, or the transport rejected the call.
    #[error("refused: {0}")]
    Refused(String),

    /// The operation observed a cancellation signal.
    #[error("cancelled: {0}")]
    Cancelled(String),

    /// An internal invariant was broken. Never recoverable.
    #[error("fatal internal error: {0}")]
    Fatal(String),
}

impl CoreError {
    pub fn resource(context: impl Into<String>, source: io::Error) -> Self {
        Self::ResourceError {
            context: context.into(),
            source,
        }
    }

    pub fn invalid_arg(message: impl fmt::Display) -> Self {
        Self::InvalidArg(message.to_string())
    }

    pub fn config(message: impl fmt::Display) -> Self {
        Self::ConfigError(message.to_string())
    }

    pub fn fatal(message: impl fmt::Display) -> Self {
        Self::Fatal(message.to_string())
    }

    /// The process exit code this error maps to at the supervisor boundary.
    ///
    /// See `supervisor::exit_code_for` for the authoritative mapping; this
    /// is a best-effort default used by error sites that do not have
    /// supervisor context.
    pub fn default_exit_code(&self) -> i32 {
        match self {
            CoreError::InvalidArg(_) | CoreError::ConfigError(_) | CoreError::DecodeError(_) => 1,
            CoreError::ResourceError { .. } | CoreError::Timeout(_) => 2,
            CoreError::Refused(_) | CoreError::Fatal(_) => 3,
            CoreError::Cancelled(_) => 3,
        }
    }
}
