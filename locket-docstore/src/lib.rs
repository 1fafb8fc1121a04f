//! Document-file backend for the locket storage contract.
//!
//! Each logical collection lives in its own JSON file under one directory:
//! `session.json`, `peers.json`, `usernames.json`, `update_state.json`.
//! The collections are held in memory behind an async mutex and every
//! mutation rewrites the affected file through a temp-file rename, so a
//! crash mid-write never leaves a half-written collection behind.
//!
//! The semantics are exactly those of
//! [`Collections`](locket_storage::collections::Collections); this crate
//! only adds the persistence.

#![deny(unsafe_code)]
#![warn(missing_docs)]

use std::io::ErrorKind;
use std::path::PathBuf;

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::Serialize;
use tokio::sync::Mutex;

use locket_storage::clock::Clock;
use locket_storage::collections::Collections;
use locket_storage::errors::{Result, StorageError};
use locket_storage::peer::{PeerRef, PeerUpdate};
use locket_storage::session::SessionData;
use locket_storage::state::UpdateState;
use locket_storage::storage::Storage;

const SESSION_FILE: &str = "session.json";
const PEERS_FILE: &str = "peers.json";
const USERNAMES_FILE: &str = "usernames.json";
const STATES_FILE: &str = "update_state.json";

/// Directory-of-JSON-files storage.
///
/// The directory is created by `open()`; constructors never touch the
/// filesystem. Missing collection files read as empty, so a fresh
/// directory and a never-written one are indistinguishable.
pub struct DocumentStorage {
    dir:          PathBuf,
    state:        Mutex<Option<Collections>>,
    clock:        Clock,
    remove_peers: bool,
}

impl DocumentStorage {
    /// A storage rooted at `dir`.
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self {
            dir:          dir.into(),
            state:        Mutex::new(None),
            clock:        Clock::system(),
            remove_peers: false,
        }
    }

    /// Replace the clock; timestamps and TTL checks read from it.
    pub fn with_clock(mut self, clock: Clock) -> Self {
        self.clock = clock;
        self
    }

    /// Make `delete()` drop the peer cache along with the session record.
    pub fn remove_peers(mut self, enabled: bool) -> Self {
        self.remove_peers = enabled;
        self
    }

    async fn read_doc<T>(&self, name: &str) -> Result<T>
    where
        T: DeserializeOwned + Default,
    {
        match tokio::fs::read(self.dir.join(name)).await {
            Ok(bytes) => serde_json::from_slice(&bytes)
                .map_err(|err| StorageError::invalid(format!("corrupt collection {name}: {err}"))),
            Err(err) if err.kind() == ErrorKind::NotFound => Ok(T::default()),
            Err(err) => Err(StorageError::backend(format!("read {name}: {err}"))),
        }
    }

    async fn write_doc<T: Serialize>(&self, name: &str, value: &T) -> Result<()> {
        let bytes = serde_json::to_vec_pretty(value)
            .map_err(|err| StorageError::backend(format!("encode {name}: {err}")))?;
        let tmp = self.dir.join(format!("{name}.tmp"));
        tokio::fs::write(&tmp, &bytes)
            .await
            .map_err(|err| StorageError::backend(format!("write {name}: {err}")))?;
        tokio::fs::rename(&tmp, self.dir.join(name))
            .await
            .map_err(|err| StorageError::backend(format!("replace {name}: {err}")))?;
        Ok(())
    }

    async fn load(&self) -> Result<Collections> {
        let session = match tokio::fs::read(self.dir.join(SESSION_FILE)).await {
            Ok(bytes) => Some(serde_json::from_slice(&bytes).map_err(|err| {
                StorageError::invalid(format!("corrupt collection {SESSION_FILE}: {err}"))
            })?),
            Err(err) if err.kind() == ErrorKind::NotFound => None,
            Err(err) => {
                return Err(StorageError::backend(format!("read {SESSION_FILE}: {err}")));
            }
        };
        Ok(Collections {
            session,
            peers: self.read_doc(PEERS_FILE).await?,
            usernames: self.read_doc(USERNAMES_FILE).await?,
            states: self.read_doc(STATES_FILE).await?,
        })
    }

    async fn read_session<T>(&self, f: impl FnOnce(&SessionData) -> T) -> Result<T> {
        let guard = self.state.lock().await;
        let collections =
            guard.as_ref().ok_or_else(|| StorageError::backend("storage is not open"))?;
        Ok(f(collections.session()?))
    }

    async fn mutate_session<T>(&self, f: impl FnOnce(&mut SessionData) -> T) -> Result<T> {
        let mut guard = self.state.lock().await;
        let collections =
            guard.as_mut().ok_or_else(|| StorageError::backend("storage is not open"))?;
        let out = f(collections.session_mut()?);
        self.write_doc(SESSION_FILE, collections.session()?).await?;
        Ok(out)
    }
}

#[async_trait]
impl Storage for DocumentStorage {
    async fn open(&self) -> Result<()> {
        let mut guard = self.state.lock().await;
        if guard.is_none() {
            tokio::fs::create_dir_all(&self.dir).await.map_err(|err| {
                StorageError::backend(format!("create {}: {err}", self.dir.display()))
            })?;
            *guard = Some(self.load().await?);
        }
        let collections =
            guard.as_mut().ok_or_else(|| StorageError::backend("storage is not open"))?;
        if collections.ensure_session() {
            log::debug!("[locket] document storage created a fresh session record");
            self.write_doc(SESSION_FILE, collections.session()?).await?;
        }
        Ok(())
    }

    async fn save(&self) -> Result<()> {
        let now = self.clock.now();
        self.mutate_session(|session| session.date = now).await
    }

    async fn close(&self) -> Result<()> {
        Ok(())
    }

    async fn delete(&self) -> Result<()> {
        let mut guard = self.state.lock().await;
        let collections =
            guard.as_mut().ok_or_else(|| StorageError::backend("storage is not open"))?;
        collections.delete_session(self.remove_peers);
        match tokio::fs::remove_file(self.dir.join(SESSION_FILE)).await {
            Ok(()) => {}
            Err(err) if err.kind() == ErrorKind::NotFound => {}
            Err(err) => {
                return Err(StorageError::backend(format!("remove {SESSION_FILE}: {err}")));
            }
        }
        if self.remove_peers {
            self.write_doc(PEERS_FILE, &collections.peers).await?;
        }
        Ok(())
    }

    // ─── Peer cache ───────────────────────────────────────────────────────────

    async fn update_peers(&self, peers: &[PeerUpdate]) -> Result<()> {
        if peers.is_empty() {
            return Ok(());
        }
        let now = self.clock.now();
        let mut guard = self.state.lock().await;
        let collections =
            guard.as_mut().ok_or_else(|| StorageError::backend("storage is not open"))?;
        collections.update_peers(peers, now);
        self.write_doc(PEERS_FILE, &collections.peers).await
    }

    async fn update_usernames(&self, usernames: &[(i64, String)]) -> Result<()> {
        if usernames.is_empty() {
            return Ok(());
        }
        let now = self.clock.now();
        let mut guard = self.state.lock().await;
        let collections =
            guard.as_mut().ok_or_else(|| StorageError::backend("storage is not open"))?;
        collections.update_usernames(usernames, now);
        // Reassignment scrubs inline sets too, so both files change.
        self.write_doc(USERNAMES_FILE, &collections.usernames).await?;
        self.write_doc(PEERS_FILE, &collections.peers).await
    }

    async fn peer_by_id(&self, id: i64) -> Result<PeerRef> {
        let guard = self.state.lock().await;
        let collections =
            guard.as_ref().ok_or_else(|| StorageError::backend("storage is not open"))?;
        collections.peer_by_id(id)
    }

    async fn peer_by_username(&self, username: &str) -> Result<PeerRef> {
        let now = self.clock.now();
        let guard = self.state.lock().await;
        let collections =
            guard.as_ref().ok_or_else(|| StorageError::backend("storage is not open"))?;
        collections.peer_by_username(username, now)
    }

    async fn peer_by_phone_number(&self, phone_number: &str) -> Result<PeerRef> {
        let guard = self.state.lock().await;
        let collections =
            guard.as_ref().ok_or_else(|| StorageError::backend("storage is not open"))?;
        collections.peer_by_phone_number(phone_number)
    }

    // ─── Update cursor ────────────────────────────────────────────────────────

    async fn update_states(&self) -> Result<Option<Vec<UpdateState>>> {
        let guard = self.state.lock().await;
        let collections =
            guard.as_ref().ok_or_else(|| StorageError::backend("storage is not open"))?;
        Ok(collections.update_states())
    }

    async fn set_update_state(&self, state: UpdateState) -> Result<()> {
        let mut guard = self.state.lock().await;
        let collections =
            guard.as_mut().ok_or_else(|| StorageError::backend("storage is not open"))?;
        collections.set_update_state(state);
        self.write_doc(STATES_FILE, &collections.states).await
    }

    async fn remove_update_state(&self, id: i64) -> Result<()> {
        let mut guard = self.state.lock().await;
        let collections =
            guard.as_mut().ok_or_else(|| StorageError::backend("storage is not open"))?;
        collections.remove_update_state(id);
        self.write_doc(STATES_FILE, &collections.states).await
    }

    // ─── Session fields ───────────────────────────────────────────────────────

    async fn dc_id(&self) -> Result<i32> {
        self.read_session(|session| session.dc_id).await
    }

    async fn set_dc_id(&self, value: i32) -> Result<()> {
        self.mutate_session(|session| session.dc_id = value).await
    }

    async fn api_id(&self) -> Result<Option<i32>> {
        self.read_session(|session| session.api_id).await
    }

    async fn set_api_id(&self, value: i32) -> Result<()> {
        self.mutate_session(|session| session.api_id = Some(value)).await
    }

    async fn test_mode(&self) -> Result<Option<bool>> {
        self.read_session(|session| session.test_mode).await
    }

    async fn set_test_mode(&self, value: bool) -> Result<()> {
        self.mutate_session(|session| session.test_mode = Some(value)).await
    }

    async fn auth_key(&self) -> Result<Vec<u8>> {
        self.read_session(|session| session.auth_key.clone()).await
    }

    async fn set_auth_key(&self, value: Vec<u8>) -> Result<()> {
        self.mutate_session(move |session| session.auth_key = value).await
    }

    async fn date(&self) -> Result<i64> {
        self.read_session(|session| session.date).await
    }

    async fn set_date(&self, value: i64) -> Result<()> {
        self.mutate_session(|session| session.date = value).await
    }

    async fn user_id(&self) -> Result<Option<i64>> {
        self.read_session(|session| session.user_id).await
    }

    async fn set_user_id(&self, value: i64) -> Result<()> {
        self.mutate_session(|session| session.user_id = Some(value)).await
    }

    async fn is_bot(&self) -> Result<Option<bool>> {
        self.read_session(|session| session.is_bot).await
    }

    async fn set_is_bot(&self, value: bool) -> Result<()> {
        self.mutate_session(|session| session.is_bot = Some(value)).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use locket_storage::peer::PeerKind;
    use locket_storage::storage::Storage;

    #[tokio::test]
    async fn reopen_from_disk_preserves_state() {
        let dir = tempfile::tempdir().unwrap();

        let storage = DocumentStorage::new(dir.path());
        storage.open().await.unwrap();
        storage.set_dc_id(5).await.unwrap();
        storage.update_peers(&[PeerUpdate::new(100, 555, PeerKind::User)]).await.unwrap();
        storage.set_update_state(UpdateState::new(1, 10, 0, 1000, 1)).await.unwrap();
        drop(storage);

        let storage = DocumentStorage::new(dir.path());
        storage.open().await.unwrap();
        assert_eq!(storage.dc_id().await.unwrap(), 5);
        assert_eq!(
            storage.peer_by_id(100).await.unwrap(),
            PeerRef::User { user_id: 100, access_hash: 555 }
        );
        assert_eq!(
            storage.update_states().await.unwrap(),
            Some(vec![UpdateState::new(1, 10, 0, 1000, 1)])
        );
    }

    #[tokio::test]
    async fn corrupt_collection_file_is_invalid() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join(PEERS_FILE), b"{ not json").unwrap();

        let storage = DocumentStorage::new(dir.path());
        let err = storage.open().await.unwrap_err();
        assert!(matches!(err, StorageError::Invalid(_)), "expected Invalid, got {err:?}");
    }

    #[tokio::test]
    async fn delete_removes_the_session_file() {
        let dir = tempfile::tempdir().unwrap();
        let storage = DocumentStorage::new(dir.path());
        storage.open().await.unwrap();
        assert!(dir.path().join(SESSION_FILE).exists());

        storage.delete().await.unwrap();
        assert!(!dir.path().join(SESSION_FILE).exists());
        let err = storage.dc_id().await.unwrap_err();
        assert!(matches!(err, StorageError::NotFound(_)), "expected NotFound, got {err:?}");
    }
}
