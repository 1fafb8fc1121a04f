//! Reusable conformance checks for [`Storage`] implementations.
//!
//! Backends are interchangeable only if they agree on every observable
//! detail, so each adapter crate carries an integration test that runs
//! every check here against a freshly constructed store. The checks panic
//! on violation; wrap each in its own test function for readable failures.
//!
//! Checks that cross the username TTL take a [`Clock`]: build the store
//! with a manual clock and pass the same handle, then the check can move
//! time over the boundary deterministically.

use crate::clock::Clock;
use crate::errors::StorageError;
use crate::peer::{PeerKind, PeerRef, PeerUpdate, USERNAME_TTL};
use crate::session::{SessionString, AUTH_KEY_LEN};
use crate::state::UpdateState;
use crate::storage::Storage;

// ─── Session lifecycle ────────────────────────────────────────────────────────

/// Two consecutive opens never create two session records, and a written
/// field survives a reopen.
pub async fn session_singleton(storage: &dyn Storage) {
    storage.open().await.unwrap();
    storage.open().await.unwrap();
    storage.set_dc_id(2).await.unwrap();
    assert_eq!(storage.dc_id().await.unwrap(), 2);

    storage.set_dc_id(7).await.unwrap();
    storage.open().await.unwrap();
    assert_eq!(storage.dc_id().await.unwrap(), 7, "reopen must not reset the record");
}

/// A fresh session is bound to DC 2 with nothing else set.
pub async fn session_defaults(storage: &dyn Storage) {
    storage.open().await.unwrap();
    assert_eq!(storage.dc_id().await.unwrap(), 2);
    assert_eq!(storage.api_id().await.unwrap(), None);
    assert_eq!(storage.test_mode().await.unwrap(), None);
    assert!(storage.auth_key().await.unwrap().is_empty());
    assert_eq!(storage.date().await.unwrap(), 0);
    assert_eq!(storage.user_id().await.unwrap(), None);
    assert_eq!(storage.is_bot().await.unwrap(), None);
}

/// Every field accessor writes durably and reads back what was written.
pub async fn session_field_round_trips(storage: &dyn Storage) {
    storage.open().await.unwrap();

    storage.set_dc_id(4).await.unwrap();
    assert_eq!(storage.dc_id().await.unwrap(), 4);

    storage.set_api_id(12345).await.unwrap();
    assert_eq!(storage.api_id().await.unwrap(), Some(12345));

    storage.set_test_mode(true).await.unwrap();
    assert_eq!(storage.test_mode().await.unwrap(), Some(true));

    storage.set_auth_key(vec![9; AUTH_KEY_LEN]).await.unwrap();
    assert_eq!(storage.auth_key().await.unwrap(), vec![9; AUTH_KEY_LEN]);

    storage.set_date(777).await.unwrap();
    assert_eq!(storage.date().await.unwrap(), 777);

    storage.set_user_id(4242).await.unwrap();
    assert_eq!(storage.user_id().await.unwrap(), Some(4242));

    storage.set_is_bot(false).await.unwrap();
    assert_eq!(storage.is_bot().await.unwrap(), Some(false));
}

/// `save()` stamps the session date with the storage clock's now.
pub async fn save_stamps_date(storage: &dyn Storage, clock: &Clock) {
    storage.open().await.unwrap();
    assert_eq!(storage.date().await.unwrap(), 0);

    clock.advance(50);
    storage.save().await.unwrap();
    assert_eq!(storage.date().await.unwrap(), clock.now());
}

/// The exported string carries the documented layout: a fresh session
/// exports zeroed fields, and written fields round-trip through
/// [`SessionString::parse`].
pub async fn export_session_string_layout(storage: &dyn Storage) {
    storage.open().await.unwrap();

    let fresh = SessionString::parse(&storage.export_session_string().await.unwrap()).unwrap();
    assert_eq!(fresh.dc_id, 2);
    assert_eq!(fresh.api_id, 0);
    assert!(fresh.auth_key.iter().all(|b| *b == 0), "an empty auth key exports as zeros");

    storage.set_dc_id(5).await.unwrap();
    storage.set_api_id(9999).await.unwrap();
    storage.set_test_mode(false).await.unwrap();
    storage.set_auth_key(vec![0x5A; AUTH_KEY_LEN]).await.unwrap();
    storage.set_user_id(777).await.unwrap();
    storage.set_is_bot(true).await.unwrap();

    let exported = storage.export_session_string().await.unwrap();
    assert_eq!(exported.len(), 362, "271 packed bytes must encode to 362 chars");

    let parsed = SessionString::parse(&exported).unwrap();
    assert_eq!(parsed.dc_id, 5);
    assert_eq!(parsed.api_id, 9999);
    assert!(!parsed.test_mode);
    assert_eq!(parsed.auth_key, [0x5A; AUTH_KEY_LEN]);
    assert_eq!(parsed.user_id, 777);
    assert!(parsed.is_bot);
}

/// Anything called before `open()` is a backend error, never a logical
/// outcome.
pub async fn ops_before_open_fail(storage: &dyn Storage) {
    let err = storage.dc_id().await.unwrap_err();
    assert!(matches!(err, StorageError::Backend(_)), "expected Backend, got {err:?}");

    let err = storage
        .update_peers(&[PeerUpdate::new(1, 1, PeerKind::User)])
        .await
        .unwrap_err();
    assert!(matches!(err, StorageError::Backend(_)), "expected Backend, got {err:?}");

    let err = storage.update_states().await.unwrap_err();
    assert!(matches!(err, StorageError::Backend(_)), "expected Backend, got {err:?}");
}

/// After `delete()` the accessors report the missing record, and a fresh
/// `open()` recreates the defaults.
pub async fn delete_then_reopen(storage: &dyn Storage) {
    storage.open().await.unwrap();
    storage.set_dc_id(9).await.unwrap();
    storage.delete().await.unwrap();

    let err = storage.dc_id().await.unwrap_err();
    assert!(matches!(err, StorageError::NotFound(_)), "expected NotFound, got {err:?}");
    let err = storage.set_dc_id(3).await.unwrap_err();
    assert!(matches!(err, StorageError::NotFound(_)), "expected NotFound, got {err:?}");
    let err = storage.save().await.unwrap_err();
    assert!(matches!(err, StorageError::NotFound(_)), "expected NotFound, got {err:?}");
    let err = storage.export_session_string().await.unwrap_err();
    assert!(matches!(err, StorageError::NotFound(_)), "expected NotFound, got {err:?}");

    storage.open().await.unwrap();
    assert_eq!(storage.dc_id().await.unwrap(), 2, "reopen after delete yields a default record");
}

// ─── Peer cache ───────────────────────────────────────────────────────────────

/// Upsert then lookup returns the stored id and access hash.
pub async fn peer_round_trip(storage: &dyn Storage) {
    storage.open().await.unwrap();
    storage
        .update_peers(&[PeerUpdate::new(100, 555, PeerKind::User)])
        .await
        .unwrap();
    assert_eq!(
        storage.peer_by_id(100).await.unwrap(),
        PeerRef::User { user_id: 100, access_hash: 555 }
    );
}

/// Every kind maps to its wire reference through the marked-id transforms.
pub async fn peer_ref_transforms(storage: &dyn Storage) {
    storage.open().await.unwrap();
    storage
        .update_peers(&[
            PeerUpdate::new(100, 555, PeerKind::User),
            PeerUpdate::new(200, 777, PeerKind::Bot),
            PeerUpdate::new(-400, 0, PeerKind::Group),
            PeerUpdate::new(-1_001_234_567_890, 999, PeerKind::Channel),
            PeerUpdate::new(-1_009_876_543_210, 111, PeerKind::Supergroup),
        ])
        .await
        .unwrap();

    assert_eq!(
        storage.peer_by_id(100).await.unwrap(),
        PeerRef::User { user_id: 100, access_hash: 555 }
    );
    assert_eq!(
        storage.peer_by_id(200).await.unwrap(),
        PeerRef::User { user_id: 200, access_hash: 777 }
    );
    assert_eq!(storage.peer_by_id(-400).await.unwrap(), PeerRef::Chat { chat_id: 400 });
    assert_eq!(
        storage.peer_by_id(-1_001_234_567_890).await.unwrap(),
        PeerRef::Channel { channel_id: 1_234_567_890, access_hash: 999 }
    );
    assert_eq!(
        storage.peer_by_id(-1_009_876_543_210).await.unwrap(),
        PeerRef::Channel { channel_id: 9_876_543_210, access_hash: 111 }
    );
}

/// Upserting identical data twice leaves one record carrying the second
/// call's timestamp.
pub async fn upsert_is_idempotent(storage: &dyn Storage, clock: &Clock) {
    storage.open().await.unwrap();
    let peer = PeerUpdate::new(100, 555, PeerKind::User).with_usernames(["bob"]);
    storage.update_peers(std::slice::from_ref(&peer)).await.unwrap();

    // Age the first write past the TTL, then upsert again: the refreshed
    // timestamp must make the username resolvable once more.
    clock.advance(USERNAME_TTL + 1);
    let err = storage.peer_by_username("bob").await.unwrap_err();
    assert!(matches!(err, StorageError::Expired(_)), "expected Expired, got {err:?}");

    storage.update_peers(std::slice::from_ref(&peer)).await.unwrap();
    assert_eq!(
        storage.peer_by_username("bob").await.unwrap(),
        PeerRef::User { user_id: 100, access_hash: 555 },
        "the second upsert's timestamp must win"
    );
}

/// Empty batches are accepted and change nothing.
pub async fn empty_batches_are_noops(storage: &dyn Storage) {
    storage.open().await.unwrap();
    storage.update_peers(&[]).await.unwrap();
    storage.update_usernames(&[]).await.unwrap();
    let err = storage.peer_by_id(1).await.unwrap_err();
    assert!(matches!(err, StorageError::NotFound(_)), "expected NotFound, got {err:?}");
}

/// Lookups for unknown keys are `NotFound`, never `Expired`.
pub async fn missing_lookups_are_not_found(storage: &dyn Storage) {
    storage.open().await.unwrap();
    for err in [
        storage.peer_by_id(12345).await.unwrap_err(),
        storage.peer_by_username("ghost").await.unwrap_err(),
        storage.peer_by_phone_number("000").await.unwrap_err(),
    ] {
        assert!(matches!(err, StorageError::NotFound(_)), "expected NotFound, got {err:?}");
    }
}

/// A username carried inline by a peer resolves without any alias row.
pub async fn inline_username_resolves(storage: &dyn Storage) {
    storage.open().await.unwrap();
    storage
        .update_peers(&[PeerUpdate::new(100, 555, PeerKind::User).with_usernames(["alice"])])
        .await
        .unwrap();
    assert_eq!(
        storage.peer_by_username("alice").await.unwrap(),
        PeerRef::User { user_id: 100, access_hash: 555 }
    );
}

/// A username known only to the alias index resolves through the
/// indirection.
pub async fn alias_username_resolves(storage: &dyn Storage) {
    storage.open().await.unwrap();
    storage.update_peers(&[PeerUpdate::new(300, 42, PeerKind::User)]).await.unwrap();
    storage.update_usernames(&[(300, "carol".to_string())]).await.unwrap();
    assert_eq!(
        storage.peer_by_username("carol").await.unwrap(),
        PeerRef::User { user_id: 300, access_hash: 42 }
    );
}

/// When several peers claim a username inline, the freshest claim wins.
pub async fn contested_inline_prefers_freshest(storage: &dyn Storage, clock: &Clock) {
    storage.open().await.unwrap();
    storage
        .update_peers(&[PeerUpdate::new(100, 1, PeerKind::User).with_usernames(["bob"])])
        .await
        .unwrap();
    clock.advance(10);
    storage
        .update_peers(&[PeerUpdate::new(200, 2, PeerKind::User).with_usernames(["bob"])])
        .await
        .unwrap();
    assert_eq!(
        storage.peer_by_username("bob").await.unwrap(),
        PeerRef::User { user_id: 200, access_hash: 2 }
    );
}

/// Reassigning a username moves the alias and scrubs the previous owner's
/// inline claim, so resolution flips to the new owner.
pub async fn username_reassign_dedups(storage: &dyn Storage) {
    storage.open().await.unwrap();
    storage
        .update_peers(&[PeerUpdate::new(100, 1, PeerKind::User).with_usernames(["bob"])])
        .await
        .unwrap();
    storage.update_usernames(&[(100, "bob".to_string())]).await.unwrap();
    assert_eq!(
        storage.peer_by_username("bob").await.unwrap(),
        PeerRef::User { user_id: 100, access_hash: 1 }
    );

    storage.update_peers(&[PeerUpdate::new(200, 2, PeerKind::User)]).await.unwrap();
    storage.update_usernames(&[(200, "bob".to_string())]).await.unwrap();
    assert_eq!(
        storage.peer_by_username("bob").await.unwrap(),
        PeerRef::User { user_id: 200, access_hash: 2 },
        "the old owner's inline claim must not shadow the reassignment"
    );
}

/// One batch carrying several usernames for the same peer stores all of
/// them, even interleaved with other peers' pairs; a later pair must not
/// wipe out an earlier one.
pub async fn multi_username_batch_resolves_all_names(storage: &dyn Storage) {
    storage.open().await.unwrap();
    storage
        .update_peers(&[
            PeerUpdate::new(300, 42, PeerKind::User),
            PeerUpdate::new(400, 43, PeerKind::User),
        ])
        .await
        .unwrap();
    storage
        .update_usernames(&[
            (300, "carol".to_string()),
            (400, "dora".to_string()),
            (300, "caz".to_string()),
        ])
        .await
        .unwrap();

    assert_eq!(
        storage.peer_by_username("carol").await.unwrap(),
        PeerRef::User { user_id: 300, access_hash: 42 },
        "a peer's first name must survive the rest of the batch"
    );
    assert_eq!(
        storage.peer_by_username("caz").await.unwrap(),
        PeerRef::User { user_id: 300, access_hash: 42 }
    );
    assert_eq!(
        storage.peer_by_username("dora").await.unwrap(),
        PeerRef::User { user_id: 400, access_hash: 43 }
    );
}

/// A new alias set replaces the old one whole: usernames the peer no
/// longer holds stop resolving entirely, while the kept and added ones
/// still do.
pub async fn reassign_evicts_dropped_aliases(storage: &dyn Storage) {
    storage.open().await.unwrap();
    storage.update_peers(&[PeerUpdate::new(300, 42, PeerKind::User)]).await.unwrap();
    storage
        .update_usernames(&[(300, "old".to_string()), (300, "kept".to_string())])
        .await
        .unwrap();
    storage.peer_by_username("old").await.unwrap();

    storage
        .update_usernames(&[(300, "kept".to_string()), (300, "new".to_string())])
        .await
        .unwrap();

    let err = storage.peer_by_username("old").await.unwrap_err();
    assert!(
        matches!(err, StorageError::NotFound(_)),
        "a dropped alias must stop resolving, got {err:?}"
    );
    storage.peer_by_username("kept").await.unwrap();
    storage.peer_by_username("new").await.unwrap();
}

// ─── TTL ──────────────────────────────────────────────────────────────────────

/// The inline-path TTL boundary: age `TTL - 1` and `TTL` resolve, age
/// `TTL + 1` is `Expired`.
pub async fn username_ttl_boundary(storage: &dyn Storage, clock: &Clock) {
    storage.open().await.unwrap();
    storage
        .update_peers(&[PeerUpdate::new(100, 555, PeerKind::User).with_usernames(["bob"])])
        .await
        .unwrap();

    clock.advance(USERNAME_TTL - 1);
    storage.peer_by_username("bob").await.unwrap();

    clock.advance(1);
    storage.peer_by_username("bob").await.unwrap();

    clock.advance(1);
    let err = storage.peer_by_username("bob").await.unwrap_err();
    assert!(matches!(err, StorageError::Expired(_)), "expected Expired, got {err:?}");
}

/// The alias row itself expires: once it crosses the TTL, even a freshly
/// upserted peer cannot be reached through it.
pub async fn alias_ttl_boundary(storage: &dyn Storage, clock: &Clock) {
    storage.open().await.unwrap();
    storage.update_peers(&[PeerUpdate::new(300, 42, PeerKind::User)]).await.unwrap();
    storage.update_usernames(&[(300, "carol".to_string())]).await.unwrap();
    storage.peer_by_username("carol").await.unwrap();

    clock.advance(USERNAME_TTL + 1);
    storage.update_peers(&[PeerUpdate::new(300, 42, PeerKind::User)]).await.unwrap();
    let err = storage.peer_by_username("carol").await.unwrap_err();
    assert!(matches!(err, StorageError::Expired(_)), "a stale alias row must expire, got {err:?}");

    storage.update_usernames(&[(300, "carol".to_string())]).await.unwrap();
    storage.peer_by_username("carol").await.unwrap();
}

/// The peer behind a fresh alias row is TTL-checked too (the second of
/// the two checks on the indirection path).
pub async fn alias_peer_staleness_also_expires(storage: &dyn Storage, clock: &Clock) {
    storage.open().await.unwrap();
    storage.update_peers(&[PeerUpdate::new(300, 42, PeerKind::User)]).await.unwrap();

    clock.advance(USERNAME_TTL + 1);
    storage.update_usernames(&[(300, "carol".to_string())]).await.unwrap();

    let err = storage.peer_by_username("carol").await.unwrap_err();
    assert!(matches!(err, StorageError::Expired(_)), "expected Expired, got {err:?}");
}

/// Id and phone resolution never expire; only the username path does.
pub async fn id_and_phone_ignore_ttl(storage: &dyn Storage, clock: &Clock) {
    storage.open().await.unwrap();
    storage
        .update_peers(&[PeerUpdate::new(100, 555, PeerKind::User)
            .with_usernames(["bob"])
            .with_phone_number("15550100")])
        .await
        .unwrap();

    clock.advance(USERNAME_TTL + 1);

    storage.peer_by_id(100).await.unwrap();
    storage.peer_by_phone_number("15550100").await.unwrap();
    let err = storage.peer_by_username("bob").await.unwrap_err();
    assert!(matches!(err, StorageError::Expired(_)), "expected Expired, got {err:?}");
}

/// Phone lookup returns the stored peer's reference.
pub async fn phone_lookup_round_trip(storage: &dyn Storage) {
    storage.open().await.unwrap();
    storage
        .update_peers(&[PeerUpdate::new(100, 555, PeerKind::User).with_phone_number("15550100")])
        .await
        .unwrap();
    assert_eq!(
        storage.peer_by_phone_number("15550100").await.unwrap(),
        PeerRef::User { user_id: 100, access_hash: 555 }
    );
}

// ─── Update cursor ────────────────────────────────────────────────────────────

/// A stored cursor comes back whole, and a second `set` overwrites all
/// four positions.
pub async fn cursor_round_trip(storage: &dyn Storage) {
    storage.open().await.unwrap();
    storage.set_update_state(UpdateState::new(1, 10, 0, 1000, 1)).await.unwrap();
    assert_eq!(
        storage.update_states().await.unwrap(),
        Some(vec![UpdateState::new(1, 10, 0, 1000, 1)])
    );

    storage.set_update_state(UpdateState::new(1, 20, 5, 2000, 2)).await.unwrap();
    assert_eq!(
        storage.update_states().await.unwrap(),
        Some(vec![UpdateState::new(1, 20, 5, 2000, 2)]),
        "a second set must overwrite every position"
    );
}

/// The listing is id-ordered, removal is a silent no-op for unknown ids,
/// and emptying the collection restores the `None` sentinel.
pub async fn cursor_sentinel(storage: &dyn Storage) {
    storage.open().await.unwrap();
    assert_eq!(storage.update_states().await.unwrap(), None, "never synchronized reads as None");

    storage.set_update_state(UpdateState::new(2, 1, 0, 10, 1)).await.unwrap();
    storage.set_update_state(UpdateState::new(1, 5, 0, 20, 2)).await.unwrap();
    let states = storage.update_states().await.unwrap().unwrap();
    assert_eq!(states.iter().map(|s| s.id).collect::<Vec<_>>(), vec![1, 2]);

    storage.remove_update_state(99).await.unwrap();
    storage.remove_update_state(1).await.unwrap();
    let states = storage.update_states().await.unwrap().unwrap();
    assert_eq!(states.iter().map(|s| s.id).collect::<Vec<_>>(), vec![2]);

    storage.remove_update_state(2).await.unwrap();
    assert_eq!(storage.update_states().await.unwrap(), None);
}

// ─── Delete ───────────────────────────────────────────────────────────────────

/// Without peer removal, `delete()` drops only the session record.
pub async fn delete_keeps_peers_by_default(storage: &dyn Storage) {
    storage.open().await.unwrap();
    storage.update_peers(&[PeerUpdate::new(100, 555, PeerKind::User)]).await.unwrap();
    storage.delete().await.unwrap();

    let err = storage.dc_id().await.unwrap_err();
    assert!(matches!(err, StorageError::NotFound(_)), "expected NotFound, got {err:?}");
    storage.peer_by_id(100).await.unwrap();
}

/// With peer removal enabled, `delete()` empties the peer cache too; pass
/// a storage configured accordingly.
pub async fn delete_cascade_clears_peers(storage: &dyn Storage) {
    storage.open().await.unwrap();
    storage.set_user_id(42).await.unwrap();
    storage.update_peers(&[PeerUpdate::new(100, 555, PeerKind::User)]).await.unwrap();
    storage.delete().await.unwrap();

    let err = storage.peer_by_id(100).await.unwrap_err();
    assert!(matches!(err, StorageError::NotFound(_)), "expected NotFound, got {err:?}");

    storage.open().await.unwrap();
    assert_eq!(storage.user_id().await.unwrap(), None, "the session record was emptied");
}
