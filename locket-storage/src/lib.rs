//! Session and peer storage contract for Telegram MTProto clients.
//!
//! This crate defines:
//! * The [`Storage`] trait every backend implements
//! * The records it persists (session singleton, peer cache, username
//!   aliases, update cursor)
//! * The exported session-string codec
//! * An in-memory backend and a conformance [`testkit`] for the others
//!
//! It is intentionally backend-agnostic: adapter crates supply SQLite and
//! document-file stores that behave identically under the [`testkit`].

#![deny(unsafe_code)]
#![warn(missing_docs)]

pub mod clock;
pub mod collections;
pub mod errors;
pub mod memory;
pub mod peer;
pub mod session;
pub mod state;
pub mod storage;
pub mod testkit;

pub use clock::Clock;
pub use errors::{Result, StorageError};
pub use memory::MemoryStorage;
pub use peer::{
    PeerKind, PeerRecord, PeerRef, PeerUpdate, UsernameRecord, MAX_CHANNEL_ID, USERNAME_TTL,
};
pub use session::{SessionData, SessionString, AUTH_KEY_LEN, DEFAULT_DC_ID, SESSION_STRING_LEN};
pub use state::UpdateState;
pub use storage::Storage;
