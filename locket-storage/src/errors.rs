//! Error types shared by every storage backend.

use std::fmt;

// ─── StorageError ─────────────────────────────────────────────────────────────

/// The error type returned by every [`Storage`](crate::Storage) operation.
///
/// The first three variants are logical outcomes: the protocol engine treats
/// [`NotFound`] and [`Expired`] as cache misses and falls back to a live
/// network resolution. [`Backend`] is a connectivity or driver failure and
/// is the only variant worth retrying; this layer never retries on its own.
///
/// [`NotFound`]: StorageError::NotFound
/// [`Expired`]: StorageError::Expired
/// [`Backend`]: StorageError::Backend
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StorageError {
    /// No record exists for the given key.
    NotFound(String),
    /// A record exists but its age exceeds [`USERNAME_TTL`](crate::USERNAME_TTL).
    ///
    /// Raised on the username resolution path only; id and phone lookups
    /// never expire.
    Expired(String),
    /// Malformed stored data or input: unknown peer kind, oversized auth
    /// key, undecodable session string, corrupt row.
    Invalid(String),
    /// The backing store failed: connection, I/O, serialization.
    Backend(String),
}

impl StorageError {
    /// A [`StorageError::NotFound`] naming the missing record.
    pub fn not_found(what: impl fmt::Display) -> Self {
        Self::NotFound(what.to_string())
    }

    /// A [`StorageError::Expired`] naming the stale record.
    pub fn expired(what: impl fmt::Display) -> Self {
        Self::Expired(what.to_string())
    }

    /// A [`StorageError::Invalid`] describing the malformed data.
    pub fn invalid(what: impl fmt::Display) -> Self {
        Self::Invalid(what.to_string())
    }

    /// A [`StorageError::Backend`] wrapping a driver or I/O failure.
    pub fn backend(what: impl fmt::Display) -> Self {
        Self::Backend(what.to_string())
    }

    /// Returns `true` for the outcomes callers resolve over the network
    /// (`NotFound` and `Expired`).
    pub fn is_cache_miss(&self) -> bool {
        matches!(self, Self::NotFound(_) | Self::Expired(_))
    }
}

impl fmt::Display for StorageError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NotFound(what) => write!(f, "not found: {what}"),
            Self::Expired(what)  => write!(f, "expired: {what}"),
            Self::Invalid(what)  => write!(f, "invalid: {what}"),
            Self::Backend(what)  => write!(f, "backend error: {what}"),
        }
    }
}

impl std::error::Error for StorageError {}

/// Result alias used across the workspace.
pub type Result<T> = std::result::Result<T, StorageError>;
