//! The four logical collections and the pure operations over them.
//!
//! [`MemoryStorage`](crate::MemoryStorage) holds exactly this state behind
//! a mutex, and the document backend persists it as JSON files, so the
//! peer, username, and cursor semantics live here once instead of being
//! duplicated per backend. The relational adapter reproduces the same
//! behavior in SQL; the conformance testkit holds all of them to it.

use std::collections::BTreeMap;

use crate::errors::{Result, StorageError};
use crate::peer::{self, PeerRecord, PeerRef, PeerUpdate, UsernameRecord};
use crate::session::SessionData;
use crate::state::UpdateState;

/// Session, peer cache, username index, and update cursors.
///
/// `BTreeMap` keeps iteration deterministic, which the contract relies on
/// for id-ordered cursor listings and stable tie-breaking.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Collections {
    /// The session singleton, `None` between `delete()` and `open()`.
    pub session:   Option<SessionData>,
    /// Cached peers keyed by marked id.
    pub peers:     BTreeMap<i64, PeerRecord>,
    /// Username alias rows keyed by the unique username.
    pub usernames: BTreeMap<String, UsernameRecord>,
    /// Update cursors keyed by owner id.
    pub states:    BTreeMap<i64, UpdateState>,
}

impl Collections {
    /// Create the default session record if none exists. Returns `true`
    /// when a record was created.
    pub fn ensure_session(&mut self) -> bool {
        if self.session.is_none() {
            self.session = Some(SessionData::default());
            true
        } else {
            false
        }
    }

    /// The live session record, or [`StorageError::NotFound`] after a
    /// `delete()`.
    pub fn session(&self) -> Result<&SessionData> {
        self.session.as_ref().ok_or_else(|| StorageError::not_found("session record"))
    }

    /// Mutable access to the live session record.
    pub fn session_mut(&mut self) -> Result<&mut SessionData> {
        self.session.as_mut().ok_or_else(|| StorageError::not_found("session record"))
    }

    /// Remove the session record; with `remove_peers`, drop every cached
    /// peer too. Alias rows stay behind and simply go stale.
    pub fn delete_session(&mut self, remove_peers: bool) {
        self.session = None;
        if remove_peers {
            self.peers.clear();
        }
    }

    // ─── Peer cache ───────────────────────────────────────────────────────────

    /// Batch upsert: every record is overwritten whole with
    /// `last_update_on = now`.
    pub fn update_peers(&mut self, peers: &[PeerUpdate], now: i64) {
        for update in peers {
            self.peers.insert(update.id, PeerRecord::from_update(update, now));
        }
    }

    /// Reassign usernames, already grouped per peer by
    /// [`peer::group_usernames`] semantics.
    pub fn update_usernames(&mut self, pairs: &[(i64, String)], now: i64) {
        for (peer_id, names) in peer::group_usernames(pairs) {
            // Every alias this peer held is dropped; the new set is
            // rewritten below, so stale ones never survive.
            self.usernames.retain(|_, alias| alias.peer_id != peer_id);
            for name in names {
                // A reassigned username must not linger in another peer's
                // inline set, or direct lookup would resurrect the old
                // owner.
                for other in self.peers.values_mut() {
                    if other.id != peer_id {
                        other.usernames.retain(|u| u != &name);
                    }
                }
                self.usernames.insert(
                    name.clone(),
                    UsernameRecord { username: name, peer_id, last_update_on: now },
                );
            }
        }
    }

    /// Resolve a peer by marked id; never TTL-checked.
    pub fn peer_by_id(&self, id: i64) -> Result<PeerRef> {
        self.peers
            .get(&id)
            .map(PeerRecord::peer_ref)
            .ok_or_else(|| StorageError::not_found(format!("peer id {id}")))
    }

    /// Username resolution: inline sets first, then the alias index. The
    /// TTL is enforced on whichever peer record answers, and additionally
    /// on the alias row when the indirection is taken.
    pub fn peer_by_username(&self, username: &str, now: i64) -> Result<PeerRef> {
        let inline = self
            .peers
            .values()
            .filter(|p| p.usernames.iter().any(|u| u == username))
            .max_by_key(|p| (p.last_update_on, p.id));
        let record = match inline {
            Some(record) => record,
            None => {
                let alias = self
                    .usernames
                    .get(username)
                    .ok_or_else(|| StorageError::not_found(format!("username {username:?}")))?;
                peer::ensure_fresh(now, alias.last_update_on, format_args!("username {username:?}"))?;
                self.peers
                    .get(&alias.peer_id)
                    .ok_or_else(|| StorageError::not_found(format!("peer id {}", alias.peer_id)))?
            }
        };
        peer::ensure_fresh(now, record.last_update_on, format_args!("username {username:?}"))?;
        Ok(record.peer_ref())
    }

    /// Resolve a peer by phone number, freshest match winning; never
    /// TTL-checked.
    pub fn peer_by_phone_number(&self, phone_number: &str) -> Result<PeerRef> {
        self.peers
            .values()
            .filter(|p| p.phone_number.as_deref() == Some(phone_number))
            .max_by_key(|p| (p.last_update_on, p.id))
            .map(PeerRecord::peer_ref)
            .ok_or_else(|| StorageError::not_found(format!("phone number {phone_number:?}")))
    }

    // ─── Update cursor ────────────────────────────────────────────────────────

    /// All cursors ordered by id, or `None` when the collection is empty.
    pub fn update_states(&self) -> Option<Vec<UpdateState>> {
        if self.states.is_empty() {
            None
        } else {
            Some(self.states.values().copied().collect())
        }
    }

    /// Upsert one cursor under its id.
    pub fn set_update_state(&mut self, state: UpdateState) {
        self.states.insert(state.id, state);
    }

    /// Drop a cursor; unknown ids are ignored.
    pub fn remove_update_state(&mut self, id: i64) {
        self.states.remove(&id);
    }
}
