//! The OS watch primitive the engine drives.
//!
//! A queue hands out one handle per registered directory. When events
//! arrive for a directory its handle becomes ready and is returned by
//! `take`; the handle is not returned again until `rearm` is called.

use std::fmt;
use std::path::{Path, PathBuf};

use super::error::Result;
use super::kind::{EventKinds, RawEventKind};

/// Opaque token for one directory registration.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct WatchHandle(u64);

impl WatchHandle {
    pub fn from_raw(raw: u64) -> Self {
        Self(raw)
    }

    pub fn raw(self) -> u64 {
        self.0
    }
}

impl fmt::Debug for WatchHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "WatchHandle#{}", self.0)
    }
}

/// One event as reported for a handle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawEvent {
    pub kind: RawEventKind,
    /// Entry name relative to the handle's directory. `None` for overflow.
    pub context: Option<PathBuf>,
    /// Number of identical events coalesced into this one.
    pub count: u32,
}

impl RawEvent {
    pub fn new(kind: RawEventKind, context: impl Into<PathBuf>) -> Self {
        Self {
            kind,
            context: Some(context.into()),
            count: 1,
        }
    }

    pub fn overflow() -> Self {
        Self {
            kind: RawEventKind::Overflow,
            context: None,
            count: 1,
        }
    }
}

pub trait WatchQueue: Send + Sync {
    /// Start watching `dir` (non-recursively) for `kinds`.
    fn register(&self, dir: &Path, kinds: EventKinds) -> Result<WatchHandle>;

    /// Block until a handle is ready.
    ///
    /// Fails with `QueueClosed` after `close`, or `Interrupted` if the
    /// queue broke for any other reason.
    fn take(&self) -> Result<WatchHandle>;

    /// Drain all pending events for `handle`.
    fn poll_events(&self, handle: WatchHandle) -> Vec<RawEvent>;

    /// Return `handle` to the ready state. `false` if it is no longer valid.
    fn rearm(&self, handle: WatchHandle) -> bool;

    fn cancel(&self, handle: WatchHandle);

    /// Close the queue, waking any blocked `take`. Idempotent.
    fn close(&self);
}
