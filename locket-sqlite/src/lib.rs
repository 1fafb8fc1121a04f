//! SQLite backend for the locket storage contract.
//!
//! Uses bundled rusqlite behind `tokio::task::spawn_blocking`, with the
//! connection under a mutex. The connection is established lazily by
//! `open()`, which also runs migrations and seeds the session singleton;
//! constructors never touch the filesystem.

#![deny(unsafe_code)]
#![warn(missing_docs)]

use std::path::PathBuf;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use rusqlite::types::FromSql;
use rusqlite::{params, Connection, OptionalExtension, ToSql};

use locket_storage::clock::Clock;
use locket_storage::errors::{Result, StorageError};
use locket_storage::peer::{self, PeerKind, PeerRef, PeerUpdate};
use locket_storage::session::DEFAULT_DC_ID;
use locket_storage::state::UpdateState;
use locket_storage::storage::Storage;

mod migration;

pub(crate) fn db_err(err: rusqlite::Error) -> StorageError {
    StorageError::backend(err)
}

/// File-backed (or in-memory) SQLite storage.
///
/// Thread-safe via an internal mutex; every operation hops to the blocking
/// pool so the async runtime is never stalled by disk access.
pub struct SqliteStorage {
    conn:         Arc<Mutex<Option<Connection>>>,
    path:         Option<PathBuf>,
    clock:        Clock,
    remove_peers: bool,
}

impl SqliteStorage {
    /// A storage persisting to the database file at `path`. The file is
    /// created by `open()`.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            conn:         Arc::new(Mutex::new(None)),
            path:         Some(path.into()),
            clock:        Clock::system(),
            remove_peers: false,
        }
    }

    /// A private in-memory database; nothing survives the value.
    pub fn in_memory() -> Self {
        Self {
            conn:         Arc::new(Mutex::new(None)),
            path:         None,
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

    async fn with_conn<T, F>(&self, f: F) -> Result<T>
    where
        T: Send + 'static,
        F: FnOnce(&mut Connection) -> Result<T> + Send + 'static,
    {
        let conn = Arc::clone(&self.conn);
        tokio::task::spawn_blocking(move || {
            let mut guard =
                conn.lock().map_err(|_| StorageError::backend("storage mutex poisoned"))?;
            let conn =
                guard.as_mut().ok_or_else(|| StorageError::backend("storage is not open"))?;
            f(conn)
        })
        .await
        .map_err(|err| StorageError::backend(format!("spawn_blocking failed: {err}")))?
    }
}

// The column names below are fixed identifiers from this crate, never
// caller input.

fn session_get<T: FromSql>(conn: &Connection, column: &str) -> Result<T> {
    conn.query_row(&format!("SELECT {column} FROM sessions WHERE id = 0"), [], |row| row.get(0))
        .optional()
        .map_err(db_err)?
        .ok_or_else(|| StorageError::not_found("session record"))
}

fn session_set<V: ToSql>(conn: &Connection, column: &str, value: V) -> Result<()> {
    let updated = conn
        .execute(&format!("UPDATE sessions SET {column} = ?1 WHERE id = 0"), params![value])
        .map_err(db_err)?;
    if updated == 0 {
        Err(StorageError::not_found("session record"))
    } else {
        Ok(())
    }
}

fn peer_ref_from_parts(id: i64, access_hash: i64, kind: &str) -> Result<PeerRef> {
    Ok(PeerRef::from_parts(id, access_hash, kind.parse::<PeerKind>()?))
}

fn row_to_peer_parts(row: &rusqlite::Row<'_>) -> rusqlite::Result<(i64, i64, String, i64)> {
    Ok((row.get(0)?, row.get(1)?, row.get(2)?, row.get(3)?))
}

#[async_trait]
impl Storage for SqliteStorage {
    async fn open(&self) -> Result<()> {
        let conn = Arc::clone(&self.conn);
        let path = self.path.clone();
        tokio::task::spawn_blocking(move || {
            let mut guard =
                conn.lock().map_err(|_| StorageError::backend("storage mutex poisoned"))?;
            if guard.is_none() {
                let mut fresh = match &path {
                    Some(path) => Connection::open(path).map_err(db_err)?,
                    None => Connection::open_in_memory().map_err(db_err)?,
                };
                if path.is_some() {
                    // The journal_mode pragma returns a row, so it must go
                    // through query_row rather than pragma_update.
                    fresh
                        .query_row("PRAGMA journal_mode = WAL", [], |row| row.get::<_, String>(0))
                        .map_err(db_err)?;
                }
                migration::migrate(&mut fresh)?;
                *guard = Some(fresh);
            }
            let conn =
                guard.as_mut().ok_or_else(|| StorageError::backend("storage is not open"))?;
            let created = conn
                .execute(
                    "INSERT OR IGNORE INTO sessions
                         (id, dc_id, api_id, test_mode, auth_key, date, user_id, is_bot)
                     VALUES (0, ?1, NULL, NULL, X'', 0, NULL, NULL)",
                    params![DEFAULT_DC_ID],
                )
                .map_err(db_err)?;
            if created == 1 {
                log::debug!("[locket] sqlite storage created a fresh session record");
            }
            Ok(())
        })
        .await
        .map_err(|err| StorageError::backend(format!("spawn_blocking failed: {err}")))?
    }

    async fn save(&self) -> Result<()> {
        let now = self.clock.now();
        self.with_conn(move |conn| session_set(conn, "date", now)).await
    }

    async fn close(&self) -> Result<()> {
        Ok(())
    }

    async fn delete(&self) -> Result<()> {
        let remove_peers = self.remove_peers;
        self.with_conn(move |conn| {
            let tx = conn.transaction().map_err(db_err)?;
            tx.execute("DELETE FROM sessions", []).map_err(db_err)?;
            if remove_peers {
                tx.execute("DELETE FROM peer_usernames", []).map_err(db_err)?;
                tx.execute("DELETE FROM peers", []).map_err(db_err)?;
            }
            tx.commit().map_err(db_err)
        })
        .await
    }

    // ─── Peer cache ───────────────────────────────────────────────────────────

    async fn update_peers(&self, peers: &[PeerUpdate]) -> Result<()> {
        if peers.is_empty() {
            return Ok(());
        }
        let peers = peers.to_vec();
        let now = self.clock.now();
        self.with_conn(move |conn| {
            let tx = conn.transaction().map_err(db_err)?;
            for update in &peers {
                tx.execute(
                    "INSERT OR REPLACE INTO peers
                         (id, access_hash, kind, phone_number, last_update_on)
                     VALUES (?1, ?2, ?3, ?4, ?5)",
                    params![
                        update.id,
                        update.access_hash,
                        update.kind.as_str(),
                        &update.phone_number,
                        now
                    ],
                )
                .map_err(db_err)?;
                // Whole-record overwrite: the inline set is rewritten from
                // scratch, not merged.
                tx.execute("DELETE FROM peer_usernames WHERE peer_id = ?1", [update.id])
                    .map_err(db_err)?;
                for name in peer::dedup_usernames(&update.usernames) {
                    tx.execute(
                        "INSERT OR IGNORE INTO peer_usernames (peer_id, username)
                         VALUES (?1, ?2)",
                        params![update.id, name],
                    )
                    .map_err(db_err)?;
                }
            }
            tx.commit().map_err(db_err)
        })
        .await
    }

    async fn update_usernames(&self, usernames: &[(i64, String)]) -> Result<()> {
        if usernames.is_empty() {
            return Ok(());
        }
        let pairs = usernames.to_vec();
        let now = self.clock.now();
        self.with_conn(move |conn| {
            let tx = conn.transaction().map_err(db_err)?;
            for (peer_id, names) in peer::group_usernames(&pairs) {
                // Every alias this peer held is dropped; the new set is
                // rewritten below, so stale ones never survive.
                tx.execute("DELETE FROM usernames WHERE peer_id = ?1", [peer_id])
                    .map_err(db_err)?;
                for name in names {
                    // A reassigned username must not linger in another
                    // peer's inline set, or direct lookup would resurrect
                    // the old owner.
                    tx.execute(
                        "DELETE FROM peer_usernames WHERE username = ?1 AND peer_id != ?2",
                        params![name, peer_id],
                    )
                    .map_err(db_err)?;
                    tx.execute(
                        "INSERT OR REPLACE INTO usernames (username, peer_id, last_update_on)
                         VALUES (?1, ?2, ?3)",
                        params![name, peer_id, now],
                    )
                    .map_err(db_err)?;
                }
            }
            tx.commit().map_err(db_err)
        })
        .await
    }

    async fn peer_by_id(&self, id: i64) -> Result<PeerRef> {
        self.with_conn(move |conn| {
            let row = conn
                .query_row("SELECT access_hash, kind FROM peers WHERE id = ?1", [id], |row| {
                    Ok((row.get::<_, i64>(0)?, row.get::<_, String>(1)?))
                })
                .optional()
                .map_err(db_err)?;
            let (access_hash, kind) =
                row.ok_or_else(|| StorageError::not_found(format!("peer id {id}")))?;
            peer_ref_from_parts(id, access_hash, &kind)
        })
        .await
    }

    async fn peer_by_username(&self, username: &str) -> Result<PeerRef> {
        let username = username.to_string();
        let now = self.clock.now();
        self.with_conn(move |conn| {
            let inline = conn
                .query_row(
                    "SELECT p.id, p.access_hash, p.kind, p.last_update_on
                     FROM peers p JOIN peer_usernames pu ON pu.peer_id = p.id
                     WHERE pu.username = ?1
                     ORDER BY p.last_update_on DESC, p.id DESC
                     LIMIT 1",
                    params![username],
                    row_to_peer_parts,
                )
                .optional()
                .map_err(db_err)?;

            let (id, access_hash, kind, last_update_on) = match inline {
                Some(parts) => parts,
                None => {
                    let alias = conn
                        .query_row(
                            "SELECT peer_id, last_update_on FROM usernames WHERE username = ?1",
                            params![username],
                            |row| Ok((row.get::<_, i64>(0)?, row.get::<_, i64>(1)?)),
                        )
                        .optional()
                        .map_err(db_err)?;
                    let (peer_id, alias_update_on) = alias.ok_or_else(|| {
                        StorageError::not_found(format!("username {username:?}"))
                    })?;
                    peer::ensure_fresh(
                        now,
                        alias_update_on,
                        format_args!("username {username:?}"),
                    )?;
                    conn.query_row(
                        "SELECT id, access_hash, kind, last_update_on
                         FROM peers WHERE id = ?1",
                        [peer_id],
                        row_to_peer_parts,
                    )
                    .optional()
                    .map_err(db_err)?
                    .ok_or_else(|| StorageError::not_found(format!("peer id {peer_id}")))?
                }
            };

            peer::ensure_fresh(now, last_update_on, format_args!("username {username:?}"))?;
            peer_ref_from_parts(id, access_hash, &kind)
        })
        .await
    }

    async fn peer_by_phone_number(&self, phone_number: &str) -> Result<PeerRef> {
        let phone = phone_number.to_string();
        self.with_conn(move |conn| {
            let row = conn
                .query_row(
                    "SELECT id, access_hash, kind FROM peers
                     WHERE phone_number = ?1
                     ORDER BY last_update_on DESC, id DESC
                     LIMIT 1",
                    params![phone],
                    |row| {
                        Ok((row.get::<_, i64>(0)?, row.get::<_, i64>(1)?, row.get::<_, String>(2)?))
                    },
                )
                .optional()
                .map_err(db_err)?;
            let (id, access_hash, kind) =
                row.ok_or_else(|| StorageError::not_found(format!("phone number {phone:?}")))?;
            peer_ref_from_parts(id, access_hash, &kind)
        })
        .await
    }

    // ─── Update cursor ────────────────────────────────────────────────────────

    async fn update_states(&self) -> Result<Option<Vec<UpdateState>>> {
        self.with_conn(|conn| {
            let mut stmt = conn
                .prepare("SELECT id, pts, qts, date, seq FROM update_state ORDER BY id")
                .map_err(db_err)?;
            let states = stmt
                .query_map([], |row| {
                    Ok(UpdateState::new(
                        row.get(0)?,
                        row.get(1)?,
                        row.get(2)?,
                        row.get(3)?,
                        row.get(4)?,
                    ))
                })
                .map_err(db_err)?
                .collect::<rusqlite::Result<Vec<_>>>()
                .map_err(db_err)?;
            Ok(if states.is_empty() { None } else { Some(states) })
        })
        .await
    }

    async fn set_update_state(&self, state: UpdateState) -> Result<()> {
        self.with_conn(move |conn| {
            conn.execute(
                "INSERT OR REPLACE INTO update_state (id, pts, qts, date, seq)
                 VALUES (?1, ?2, ?3, ?4, ?5)",
                params![state.id, state.pts, state.qts, state.date, state.seq],
            )
            .map_err(db_err)?;
            Ok(())
        })
        .await
    }

    async fn remove_update_state(&self, id: i64) -> Result<()> {
        self.with_conn(move |conn| {
            conn.execute("DELETE FROM update_state WHERE id = ?1", [id]).map_err(db_err)?;
            Ok(())
        })
        .await
    }

    // ─── Session fields ───────────────────────────────────────────────────────

    async fn dc_id(&self) -> Result<i32> {
        self.with_conn(|conn| session_get(conn, "dc_id")).await
    }

    async fn set_dc_id(&self, value: i32) -> Result<()> {
        self.with_conn(move |conn| session_set(conn, "dc_id", value)).await
    }

    async fn api_id(&self) -> Result<Option<i32>> {
        self.with_conn(|conn| session_get(conn, "api_id")).await
    }

    async fn set_api_id(&self, value: i32) -> Result<()> {
        self.with_conn(move |conn| session_set(conn, "api_id", value)).await
    }

    async fn test_mode(&self) -> Result<Option<bool>> {
        self.with_conn(|conn| session_get(conn, "test_mode")).await
    }

    async fn set_test_mode(&self, value: bool) -> Result<()> {
        self.with_conn(move |conn| session_set(conn, "test_mode", value)).await
    }

    async fn auth_key(&self) -> Result<Vec<u8>> {
        self.with_conn(|conn| session_get(conn, "auth_key")).await
    }

    async fn set_auth_key(&self, value: Vec<u8>) -> Result<()> {
        self.with_conn(move |conn| session_set(conn, "auth_key", value)).await
    }

    async fn date(&self) -> Result<i64> {
        self.with_conn(|conn| session_get(conn, "date")).await
    }

    async fn set_date(&self, value: i64) -> Result<()> {
        self.with_conn(move |conn| session_set(conn, "date", value)).await
    }

    async fn user_id(&self) -> Result<Option<i64>> {
        self.with_conn(|conn| session_get(conn, "user_id")).await
    }

    async fn set_user_id(&self, value: i64) -> Result<()> {
        self.with_conn(move |conn| session_set(conn, "user_id", value)).await
    }

    async fn is_bot(&self) -> Result<Option<bool>> {
        self.with_conn(|conn| session_get(conn, "is_bot")).await
    }

    async fn set_is_bot(&self, value: bool) -> Result<()> {
        self.with_conn(move |conn| session_set(conn, "is_bot", value)).await
    }
}
