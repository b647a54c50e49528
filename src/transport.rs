//! The `Transport` capability contract.
//!
//! `Transport` is the boundary [`crate::bulletin_board::BulletinBoard`]
//! consumes to actually move bytes between parties. This crate treats any
//! concrete network transport (the default being an HTTP-based
//! point-to-point fetcher) as an external collaborator — see §4.3 of
//! `SPEC_FULL.md` — and only specifies the trait plus an in-process
//! reference implementation used by tests (see [`crate::dev::LocalTransport`]).

use std::fmt::Debug;
use std::time::Duration;

use crate::error::Result;

/// How long a `fetch` spent waiting versus transferring, once it succeeds.
///
/// Transports that can distinguish "polling because the peer hasn't
/// published yet" from "bytes are actually moving" (such as
/// [`crate::dev::LocalTransport`]'s condvar wait) report the two phases
/// separately. Transports that cannot collapse the whole duration onto
/// `network`. See the resolved split documented in §4.5 / §9 of
/// `SPEC_FULL.md`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FetchTiming {
    pub wait: Duration,
    pub network: Duration,
}

/// The bytes a successful `fetch` returned, along with the timing split
/// used to update the bulletin board's counters.
#[derive(Debug, Clone)]
pub struct FetchResult {
    pub bytes: Vec<u8>,
    pub timing: FetchTiming,
}

/// The capability [`crate::bulletin_board::BulletinBoard`] drives to
/// exchange bytes between parties.
///
/// `publish` and `fetch` may be invoked concurrently from multiple threads
/// for distinct labels; implementations are responsible for any
/// per-label serialization they need.
pub trait Transport: Debug + Send + Sync {
    /// Begins serving this party's published slots.
    fn start(&self) -> Result<()>;

    /// Advertises `bytes` under `(scope_path, label)` so that other
    /// parties' `fetch` calls for this party will succeed.
    fn publish(&self, scope_path: &str, label: &str, bytes: Vec<u8>) -> Result<()>;

    /// Retrieves `from_party`'s published bytes for `(scope_path, label)`.
    ///
    /// `deadline = None` means wait indefinitely. Returns
    /// [`crate::error::CoreError::Timeout`] if the deadline passes, or
    /// [`crate::error::CoreError::Refused`] if `from_party` is marked
    /// inactive or the transport otherwise rejects the call.
    fn fetch(
        &self,
        from_party: u32,
        scope_path: &str,
        label: &str,
        deadline: Option<Duration>,
    ) -> Result<FetchResult>;

    /// Tells the transport which parties are currently active, so it does
    /// not block `fetch` calls against inactive parties.
    fn set_active(&self, active: Vec<bool>);

    /// Drops the published slots for `scope_path` (used by
    /// `ProtocolNode::delete_state`).
    fn unpublish(&self, scope_path: &str);

    /// Drains and releases this transport. Called once, at the end of
    /// [`crate::shutdown::execute`].
    fn stop(&self);
}
