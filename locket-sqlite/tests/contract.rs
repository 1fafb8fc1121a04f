//! Runs every conformance check against the SQLite backend.

use locket_sqlite::SqliteStorage;
use locket_storage::testkit;
use locket_storage::Clock;

fn plain() -> SqliteStorage {
    SqliteStorage::in_memory()
}

fn clocked() -> (SqliteStorage, Clock) {
    let clock = Clock::manual(1_700_000_000);
    (SqliteStorage::in_memory().with_clock(clock.clone()), clock)
}

#[tokio::test]
async fn session_singleton() {
    testkit::session_singleton(&plain()).await;
}

#[tokio::test]
async fn session_defaults() {
    testkit::session_defaults(&plain()).await;
}

#[tokio::test]
async fn session_field_round_trips() {
    testkit::session_field_round_trips(&plain()).await;
}

#[tokio::test]
async fn save_stamps_date() {
    let (storage, clock) = clocked();
    testkit::save_stamps_date(&storage, &clock).await;
}

#[tokio::test]
async fn export_session_string_layout() {
    testkit::export_session_string_layout(&plain()).await;
}

#[tokio::test]
async fn ops_before_open_fail() {
    testkit::ops_before_open_fail(&plain()).await;
}

#[tokio::test]
async fn delete_then_reopen() {
    testkit::delete_then_reopen(&plain()).await;
}

#[tokio::test]
async fn peer_round_trip() {
    testkit::peer_round_trip(&plain()).await;
}

#[tokio::test]
async fn peer_ref_transforms() {
    testkit::peer_ref_transforms(&plain()).await;
}

#[tokio::test]
async fn upsert_is_idempotent() {
    let (storage, clock) = clocked();
    testkit::upsert_is_idempotent(&storage, &clock).await;
}

#[tokio::test]
async fn empty_batches_are_noops() {
    testkit::empty_batches_are_noops(&plain()).await;
}

#[tokio::test]
async fn missing_lookups_are_not_found() {
    testkit::missing_lookups_are_not_found(&plain()).await;
}

#[tokio::test]
async fn inline_username_resolves() {
    testkit::inline_username_resolves(&plain()).await;
}

#[tokio::test]
async fn alias_username_resolves() {
    testkit::alias_username_resolves(&plain()).await;
}

#[tokio::test]
async fn contested_inline_prefers_freshest() {
    let (storage, clock) = clocked();
    testkit::contested_inline_prefers_freshest(&storage, &clock).await;
}

#[tokio::test]
async fn username_reassign_dedups() {
    testkit::username_reassign_dedups(&plain()).await;
}

#[tokio::test]
async fn multi_username_batch_resolves_all_names() {
    testkit::multi_username_batch_resolves_all_names(&plain()).await;
}

#[tokio::test]
async fn reassign_evicts_dropped_aliases() {
    testkit::reassign_evicts_dropped_aliases(&plain()).await;
}

#[tokio::test]
async fn username_ttl_boundary() {
    let (storage, clock) = clocked();
    testkit::username_ttl_boundary(&storage, &clock).await;
}

#[tokio::test]
async fn alias_ttl_boundary() {
    let (storage, clock) = clocked();
    testkit::alias_ttl_boundary(&storage, &clock).await;
}

#[tokio::test]
async fn alias_peer_staleness_also_expires() {
    let (storage, clock) = clocked();
    testkit::alias_peer_staleness_also_expires(&storage, &clock).await;
}

#[tokio::test]
async fn id_and_phone_ignore_ttl() {
    let (storage, clock) = clocked();
    testkit::id_and_phone_ignore_ttl(&storage, &clock).await;
}

#[tokio::test]
async fn phone_lookup_round_trip() {
    testkit::phone_lookup_round_trip(&plain()).await;
}

#[tokio::test]
async fn cursor_round_trip() {
    testkit::cursor_round_trip(&plain()).await;
}

#[tokio::test]
async fn cursor_sentinel() {
    testkit::cursor_sentinel(&plain()).await;
}

#[tokio::test]
async fn delete_keeps_peers_by_default() {
    testkit::delete_keeps_peers_by_default(&plain()).await;
}

#[tokio::test]
async fn delete_cascade_clears_peers() {
    testkit::delete_cascade_clears_peers(&SqliteStorage::in_memory().remove_peers(true)).await;
}
