//! Runs every conformance check against the document-file backend.

use locket_docstore::DocumentStorage;
use locket_storage::testkit;
use locket_storage::Clock;
use tempfile::TempDir;

fn plain() -> (DocumentStorage, TempDir) {
    let dir = tempfile::tempdir().unwrap();
    let storage = DocumentStorage::new(dir.path());
    (storage, dir)
}

fn clocked() -> (DocumentStorage, Clock, TempDir) {
    let dir = tempfile::tempdir().unwrap();
    let clock = Clock::manual(1_700_000_000);
    let storage = DocumentStorage::new(dir.path()).with_clock(clock.clone());
    (storage, clock, dir)
}

#[tokio::test]
async fn session_singleton() {
    let (storage, _dir) = plain();
    testkit::session_singleton(&storage).await;
}

#[tokio::test]
async fn session_defaults() {
    let (storage, _dir) = plain();
    testkit::session_defaults(&storage).await;
}

#[tokio::test]
async fn session_field_round_trips() {
    let (storage, _dir) = plain();
    testkit::session_field_round_trips(&storage).await;
}

#[tokio::test]
async fn save_stamps_date() {
    let (storage, clock, _dir) = clocked();
    testkit::save_stamps_date(&storage, &clock).await;
}

#[tokio::test]
async fn export_session_string_layout() {
    let (storage, _dir) = plain();
    testkit::export_session_string_layout(&storage).await;
}

#[tokio::test]
async fn ops_before_open_fail() {
    let (storage, _dir) = plain();
    testkit::ops_before_open_fail(&storage).await;
}

#[tokio::test]
async fn delete_then_reopen() {
    let (storage, _dir) = plain();
    testkit::delete_then_reopen(&storage).await;
}

#[tokio::test]
async fn peer_round_trip() {
    let (storage, _dir) = plain();
    testkit::peer_round_trip(&storage).await;
}

#[tokio::test]
async fn peer_ref_transforms() {
    let (storage, _dir) = plain();
    testkit::peer_ref_transforms(&storage).await;
}

#[tokio::test]
async fn upsert_is_idempotent() {
    let (storage, clock, _dir) = clocked();
    testkit::upsert_is_idempotent(&storage, &clock).await;
}

#[tokio::test]
async fn empty_batches_are_noops() {
    let (storage, _dir) = plain();
    testkit::empty_batches_are_noops(&storage).await;
}

#[tokio::test]
async fn missing_lookups_are_not_found() {
    let (storage, _dir) = plain();
    testkit::missing_lookups_are_not_found(&storage).await;
}

#[tokio::test]
async fn inline_username_resolves() {
    let (storage, _dir) = plain();
    testkit::inline_username_resolves(&storage).await;
}

#[tokio::test]
async fn alias_username_resolves() {
    let (storage, _dir) = plain();
    testkit::alias_username_resolves(&storage).await;
}

#[tokio::test]
async fn contested_inline_prefers_freshest() {
    let (storage, clock, _dir) = clocked();
    testkit::contested_inline_prefers_freshest(&storage, &clock).await;
}

#[tokio::test]
async fn username_reassign_dedups() {
    let (storage, _dir) = plain();
    testkit::username_reassign_dedups(&storage).await;
}

#[tokio::test]
async fn multi_username_batch_resolves_all_names() {
    let (storage, _dir) = plain();
    testkit::multi_username_batch_resolves_all_names(&storage).await;
}

#[tokio::test]
async fn reassign_evicts_dropped_aliases() {
    let (storage, _dir) = plain();
    testkit::reassign_evicts_dropped_aliases(&storage).await;
}

#[tokio::test]
async fn username_ttl_boundary() {
    let (storage, clock, _dir) = clocked();
    testkit::username_ttl_boundary(&storage, &clock).await;
}

#[tokio::test]
async fn alias_ttl_boundary() {
    let (storage, clock, _dir) = clocked();
    testkit::alias_ttl_boundary(&storage, &clock).await;
}

#[tokio::test]
async fn alias_peer_staleness_also_expires() {
    let (storage, clock, _dir) = clocked();
    testkit::alias_peer_staleness_also_expires(&storage, &clock).await;
}

#[tokio::test]
async fn id_and_phone_ignore_ttl() {
    let (storage, clock, _dir) = clocked();
    testkit::id_and_phone_ignore_ttl(&storage, &clock).await;
}

#[tokio::test]
async fn phone_lookup_round_trip() {
    let (storage, _dir) = plain();
    testkit::phone_lookup_round_trip(&storage).await;
}

#[tokio::test]
async fn cursor_round_trip() {
    let (storage, _dir) = plain();
    testkit::cursor_round_trip(&storage).await;
}

#[tokio::test]
async fn cursor_sentinel() {
    let (storage, _dir) = plain();
    testkit::cursor_sentinel(&storage).await;
}

#[tokio::test]
async fn delete_keeps_peers_by_default() {
    let (storage, _dir) = plain();
    testkit::delete_keeps_peers_by_default(&storage).await;
}

#[tokio::test]
async fn delete_cascade_clears_peers() {
    let dir = tempfile::tempdir().unwrap();
    let storage = DocumentStorage::new(dir.path()).remove_peers(true);
    testkit::delete_cascade_clears_peers(&storage).await;
}
