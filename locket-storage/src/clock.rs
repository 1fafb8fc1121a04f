//! The time source behind `last_update_on` stamps and TTL checks.

use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicI64, Ordering};

/// A unix-seconds clock shared by a storage backend and its owner.
///
/// Freshness decisions compare `now` against stored `last_update_on`
/// values, so every store attached to one engine must read the same clock
/// or the TTL arithmetic skews between them. [`Clock::system`] is the
/// default; [`Clock::manual`] freezes time under test control so TTL
/// boundaries can be crossed deterministically.
///
/// Clones share their source: advancing one handle of a manual clock
/// advances them all.
#[derive(Clone)]
pub struct Clock(Source);

#[derive(Clone)]
enum Source {
    System,
    Manual(Arc<AtomicI64>),
}

impl Clock {
    /// The real system clock.
    pub fn system() -> Self {
        Self(Source::System)
    }

    /// A manually driven clock starting at `now` seconds since the epoch.
    pub fn manual(now: i64) -> Self {
        Self(Source::Manual(Arc::new(AtomicI64::new(now))))
    }

    /// Current time in seconds since the unix epoch.
    pub fn now(&self) -> i64 {
        match &self.0 {
            Source::System => chrono::Utc::now().timestamp(),
            Source::Manual(t) => t.load(Ordering::SeqCst),
        }
    }

    /// Advance a manual clock by `secs`. Ignored on the system clock.
    pub fn advance(&self, secs: i64) {
        match &self.0 {
            Source::System => log::warn!("[locket] advance() ignored on the system clock"),
            Source::Manual(t) => {
                t.fetch_add(secs, Ordering::SeqCst);
            }
        }
    }

    /// Move a manual clock to an absolute timestamp. Ignored on the system
    /// clock.
    pub fn set(&self, secs: i64) {
        match &self.0 {
            Source::System => log::warn!("[locket] set() ignored on the system clock"),
            Source::Manual(t) => t.store(secs, Ordering::SeqCst),
        }
    }
}

impl Default for Clock {
    fn default() -> Self {
        Self::system()
    }
}

impl fmt::Debug for Clock {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.0 {
            Source::System => write!(f, "Clock::system"),
            Source::Manual(t) => write!(f, "Clock::manual({})", t.load(Ordering::SeqCst)),
        }
    }
}
