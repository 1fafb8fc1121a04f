//! # locket — session storage for Telegram MTProto clients
//!
//! `locket` persists the state an MTProto client cannot afford to lose
//! between runs: the authorization session, a TTL-bounded peer cache, a
//! username alias index, and update-sequence cursors. Three focused
//! sub-crates are wired together here for convenience:
//!
//! | Sub-crate         | Role                                             |
//! |-------------------|--------------------------------------------------|
//! | `locket-storage`  | The `Storage` contract, records, memory backend  |
//! | `locket-sqlite`   | SQLite backend (`feature = "sqlite"`)            |
//! | `locket-docstore` | JSON-files backend (`feature = "docstore"`)      |
//!
//! Every backend passes the same conformance suite, so swapping one for
//! another changes durability, not behavior.
//!
//! ## Quick start
//!
//! ```rust,no_run
//! use locket::{MemoryStorage, Storage};
//!
//! # async fn demo() -> locket::Result<()> {
//! let storage = MemoryStorage::new();
//! storage.open().await?;
//!
//! storage.set_dc_id(4).await?;
//! storage.set_auth_key(vec![0; 256]).await?;
//! storage.save().await?;
//!
//! // A portable string any compatible client can import.
//! println!("{}", storage.export_session_string().await?);
//! # Ok(())
//! # }
//! ```
//!
//! For a durable store, enable a backend feature and construct
//! `SqliteStorage::new("telegram.session")` or
//! `DocumentStorage::new("session-dir")` instead; the rest of the code
//! does not change.

#![deny(unsafe_code)]
#![warn(missing_docs)]

/// Re-export of [`locket_storage`]: the contract, records, errors, clock,
/// and conformance testkit.
pub use locket_storage as storage;

/// Re-export of [`locket_sqlite`] (requires `feature = "sqlite"`).
#[cfg(feature = "sqlite")]
pub use locket_sqlite as sqlite;

/// Re-export of [`locket_docstore`] (requires `feature = "docstore"`).
#[cfg(feature = "docstore")]
pub use locket_docstore as docstore;

// ─── Convenience re-exports ───────────────────────────────────────────────────

pub use locket_storage::{
    Clock,
    MemoryStorage,
    PeerKind,
    PeerRecord,
    PeerRef,
    PeerUpdate,
    Result,
    SessionData,
    SessionString,
    Storage,
    StorageError,
    UpdateState,
    UsernameRecord,
    AUTH_KEY_LEN,
    DEFAULT_DC_ID,
    MAX_CHANNEL_ID,
    SESSION_STRING_LEN,
    USERNAME_TTL,
};

#[cfg(feature = "sqlite")]
pub use locket_sqlite::SqliteStorage;

#[cfg(feature = "docstore")]
pub use locket_docstore::DocumentStorage;
