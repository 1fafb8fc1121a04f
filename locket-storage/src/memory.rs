//! The in-memory reference backend.

use std::sync::{Mutex, MutexGuard};

use async_trait::async_trait;

use crate::clock::Clock;
use crate::collections::Collections;
use crate::errors::{Result, StorageError};
use crate::peer::{PeerRef, PeerUpdate};
use crate::session::SessionData;
use crate::state::UpdateState;
use crate::storage::Storage;

// ─── MemoryStorage ────────────────────────────────────────────────────────────

/// A [`Storage`] that lives entirely in process memory.
///
/// The reference implementation of the contract: no driver, no I/O, just
/// [`Collections`] behind a mutex. Useful for engine tests and for
/// throwaway clients that should always start fresh.
pub struct MemoryStorage {
    state:        Mutex<Option<Collections>>,
    clock:        Clock,
    remove_peers: bool,
}

impl MemoryStorage {
    /// An unopened store with the system clock.
    pub fn new() -> Self {
        Self {
            state:        Mutex::new(None),
            clock:        Clock::system(),
            remove_peers: false,
        }
    }

    /// Replace the clock used for `last_update_on` stamps and TTL checks.
    pub fn with_clock(mut self, clock: Clock) -> Self {
        self.clock = clock;
        self
    }

    /// Also drop every cached peer on [`Storage::delete`].
    pub fn remove_peers(mut self, enabled: bool) -> Self {
        self.remove_peers = enabled;
        self
    }

    fn lock(&self) -> Result<MutexGuard<'_, Option<Collections>>> {
        self.state.lock().map_err(|_| StorageError::backend("storage mutex poisoned"))
    }

    /// Run `f` on the opened collections.
    fn with<T>(&self, f: impl FnOnce(&mut Collections) -> Result<T>) -> Result<T> {
        let mut guard = self.lock()?;
        let inner = guard.as_mut().ok_or_else(|| StorageError::backend("storage is not open"))?;
        f(inner)
    }

    fn with_session<T>(&self, f: impl FnOnce(&mut SessionData) -> T) -> Result<T> {
        self.with(|inner| Ok(f(inner.session_mut()?)))
    }
}

impl Default for MemoryStorage {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Storage for MemoryStorage {
    async fn open(&self) -> Result<()> {
        let mut guard = self.lock()?;
        let inner = guard.get_or_insert_with(Collections::default);
        if inner.ensure_session() {
            log::debug!("[locket] memory storage created a fresh session record");
        }
        Ok(())
    }

    async fn save(&self) -> Result<()> {
        let now = self.clock.now();
        self.with_session(|session| session.date = now)
    }

    async fn close(&self) -> Result<()> {
        Ok(())
    }

    async fn delete(&self) -> Result<()> {
        let remove_peers = self.remove_peers;
        self.with(|inner| {
            inner.delete_session(remove_peers);
            Ok(())
        })
    }

    async fn update_peers(&self, peers: &[PeerUpdate]) -> Result<()> {
        if peers.is_empty() {
            return Ok(());
        }
        let now = self.clock.now();
        self.with(|inner| {
            inner.update_peers(peers, now);
            Ok(())
        })
    }

    async fn update_usernames(&self, usernames: &[(i64, String)]) -> Result<()> {
        if usernames.is_empty() {
            return Ok(());
        }
        let now = self.clock.now();
        self.with(|inner| {
            inner.update_usernames(usernames, now);
            Ok(())
        })
    }

    async fn peer_by_id(&self, id: i64) -> Result<PeerRef> {
        self.with(|inner| inner.peer_by_id(id))
    }

    async fn peer_by_username(&self, username: &str) -> Result<PeerRef> {
        let now = self.clock.now();
        self.with(|inner| inner.peer_by_username(username, now))
    }

    async fn peer_by_phone_number(&self, phone_number: &str) -> Result<PeerRef> {
        self.with(|inner| inner.peer_by_phone_number(phone_number))
    }

    async fn update_states(&self) -> Result<Option<Vec<UpdateState>>> {
        self.with(|inner| Ok(inner.update_states()))
    }

    async fn set_update_state(&self, state: UpdateState) -> Result<()> {
        self.with(|inner| {
            inner.set_update_state(state);
            Ok(())
        })
    }

    async fn remove_update_state(&self, id: i64) -> Result<()> {
        self.with(|inner| {
            inner.remove_update_state(id);
            Ok(())
        })
    }

    async fn dc_id(&self) -> Result<i32> {
        self.with_session(|s| s.dc_id)
    }

    async fn set_dc_id(&self, value: i32) -> Result<()> {
        self.with_session(|s| s.dc_id = value)
    }

    async fn api_id(&self) -> Result<Option<i32>> {
        self.with_session(|s| s.api_id)
    }

    async fn set_api_id(&self, value: i32) -> Result<()> {
        self.with_session(|s| s.api_id = Some(value))
    }

    async fn test_mode(&self) -> Result<Option<bool>> {
        self.with_session(|s| s.test_mode)
    }

    async fn set_test_mode(&self, value: bool) -> Result<()> {
        self.with_session(|s| s.test_mode = Some(value))
    }

    async fn auth_key(&self) -> Result<Vec<u8>> {
        self.with_session(|s| s.auth_key.clone())
    }

    async fn set_auth_key(&self, value: Vec<u8>) -> Result<()> {
        self.with_session(|s| s.auth_key = value)
    }

    async fn date(&self) -> Result<i64> {
        self.with_session(|s| s.date)
    }

    async fn set_date(&self, value: i64) -> Result<()> {
        self.with_session(|s| s.date = value)
    }

    async fn user_id(&self) -> Result<Option<i64>> {
        self.with_session(|s| s.user_id)
    }

    async fn set_user_id(&self, value: i64) -> Result<()> {
        self.with_session(|s| s.user_id = Some(value))
    }

    async fn is_bot(&self) -> Result<Option<bool>> {
        self.with_session(|s| s.is_bot)
    }

    async fn set_is_bot(&self, value: bool) -> Result<()> {
        self.with_session(|s| s.is_bot = Some(value))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn ops_fail_before_open() {
        let storage = MemoryStorage::new();
        let err = storage.dc_id().await.unwrap_err();
        assert!(matches!(err, StorageError::Backend(_)), "got {err:?}");
    }

    #[tokio::test]
    async fn reopen_does_not_reset_state() {
        let storage = MemoryStorage::new();
        storage.open().await.unwrap();
        storage.set_dc_id(5).await.unwrap();
        storage.open().await.unwrap();
        assert_eq!(storage.dc_id().await.unwrap(), 5);
    }

    #[tokio::test]
    async fn open_after_delete_recreates_the_default_record() {
        let storage = MemoryStorage::new();
        storage.open().await.unwrap();
        storage.set_dc_id(5).await.unwrap();
        storage.delete().await.unwrap();

        let err = storage.dc_id().await.unwrap_err();
        assert!(matches!(err, StorageError::NotFound(_)), "got {err:?}");

        storage.open().await.unwrap();
        assert_eq!(storage.dc_id().await.unwrap(), 2, "delete then open must yield defaults");
    }
}
