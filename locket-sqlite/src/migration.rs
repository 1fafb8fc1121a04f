//! Versioned schema migrations.
//!
//! Each migration is a SQL batch that moves the schema from version N to
//! N+1, recorded in `schema_migrations`. Running against a database from a
//! newer build fails instead of guessing.

use rusqlite::Connection;

use locket_storage::errors::{Result, StorageError};

use crate::db_err;

/// Schema version this build writes.
pub const CURRENT_VERSION: u32 = 1;

/// Initialize or upgrade the schema. Idempotent.
pub fn migrate(conn: &mut Connection) -> Result<()> {
    conn.execute(
        "CREATE TABLE IF NOT EXISTS schema_migrations (
            version INTEGER PRIMARY KEY,
            applied_at INTEGER NOT NULL
        )",
        [],
    )
    .map_err(db_err)?;

    let current: u32 = conn
        .query_row("SELECT COALESCE(MAX(version), 0) FROM schema_migrations", [], |row| {
            row.get(0)
        })
        .map_err(db_err)?;

    if current > CURRENT_VERSION {
        return Err(StorageError::backend(format!(
            "database schema is version {current}, this build supports up to {CURRENT_VERSION}"
        )));
    }

    if current < CURRENT_VERSION {
        let tx = conn.transaction().map_err(db_err)?;
        for version in (current + 1)..=CURRENT_VERSION {
            apply_migration(&tx, version)?;
            tx.execute(
                "INSERT INTO schema_migrations (version, applied_at)
                 VALUES (?1, strftime('%s', 'now'))",
                [version],
            )
            .map_err(db_err)?;
        }
        tx.commit().map_err(db_err)?;
    }

    Ok(())
}

fn apply_migration(conn: &Connection, version: u32) -> Result<()> {
    match version {
        1 => apply_v1(conn),
        other => Err(StorageError::backend(format!("unknown migration version {other}"))),
    }
}

/// v1: the four collections.
fn apply_v1(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        r#"
        -- The session singleton; the CHECK pins it to one row.
        CREATE TABLE sessions (
            id        INTEGER PRIMARY KEY CHECK (id = 0),
            dc_id     INTEGER NOT NULL,
            api_id    INTEGER,
            test_mode INTEGER,
            auth_key  BLOB NOT NULL,
            date      INTEGER NOT NULL,
            user_id   INTEGER,
            is_bot    INTEGER
        );

        -- Peer cache, keyed by marked id.
        CREATE TABLE peers (
            id             INTEGER PRIMARY KEY,
            access_hash    INTEGER NOT NULL,
            kind           TEXT NOT NULL,
            phone_number   TEXT,
            last_update_on INTEGER NOT NULL
        );

        -- The inline username sets, one row per (peer, name).
        CREATE TABLE peer_usernames (
            peer_id  INTEGER NOT NULL,
            username TEXT NOT NULL,
            PRIMARY KEY (peer_id, username)
        );

        -- The alias index. peer_id is deliberately not a foreign key; an
        -- alias may outlive its peer and simply go stale.
        CREATE TABLE usernames (
            username       TEXT PRIMARY KEY,
            peer_id        INTEGER NOT NULL,
            last_update_on INTEGER NOT NULL
        );

        -- Update cursors, one row per connection/shard id.
        CREATE TABLE update_state (
            id   INTEGER PRIMARY KEY,
            pts  INTEGER NOT NULL,
            qts  INTEGER NOT NULL,
            date INTEGER NOT NULL,
            seq  INTEGER NOT NULL
        );

        CREATE INDEX idx_peers_phone_number ON peers(phone_number);
        CREATE INDEX idx_peer_usernames_username ON peer_usernames(username);
        CREATE INDEX idx_usernames_peer_id ON usernames(peer_id);
        "#,
    )
    .map_err(db_err)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn migration_creates_tables() {
        let mut conn = Connection::open_in_memory().unwrap();
        migrate(&mut conn).unwrap();

        let tables: Vec<String> = conn
            .prepare("SELECT name FROM sqlite_master WHERE type = 'table' ORDER BY name")
            .unwrap()
            .query_map([], |row| row.get(0))
            .unwrap()
            .collect::<std::result::Result<Vec<_>, _>>()
            .unwrap();

        for table in ["sessions", "peers", "peer_usernames", "usernames", "update_state"] {
            assert!(tables.contains(&table.to_string()), "missing table {table}");
        }
    }

    #[test]
    fn migration_is_idempotent() {
        let mut conn = Connection::open_in_memory().unwrap();
        migrate(&mut conn).unwrap();
        migrate(&mut conn).unwrap();

        let version: u32 = conn
            .query_row("SELECT MAX(version) FROM schema_migrations", [], |row| row.get(0))
            .unwrap();
        assert_eq!(version, CURRENT_VERSION);
    }

    #[test]
    fn newer_schema_is_rejected() {
        let mut conn = Connection::open_in_memory().unwrap();
        migrate(&mut conn).unwrap();

        conn.execute(
            "INSERT INTO schema_migrations (version, applied_at) VALUES (99, 0)",
            [],
        )
        .unwrap();

        let err = migrate(&mut conn).unwrap_err();
        assert!(matches!(err, StorageError::Backend(_)), "expected Backend, got {err:?}");
    }
}
