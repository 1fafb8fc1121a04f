//! The uniform storage contract consumed by the protocol engine.

use async_trait::async_trait;

use crate::errors::Result;
use crate::peer::{PeerRef, PeerUpdate};
use crate::session::SessionString;
use crate::state::UpdateState;

/// Everything a protocol client persists, behind one swappable interface:
/// the session record, the TTL-bounded peer cache, the username alias
/// index, and the update cursors.
///
/// Implementations must be interchangeable: same error kinds, same TTL
/// arithmetic, same clock discipline, read-your-writes through a single
/// logical connection. The checks in [`testkit`](crate::testkit) spell the
/// contract out; run all of them against any new backend.
#[async_trait]
pub trait Storage: Send + Sync {
    /// Connect to the backing store and ensure the session record exists,
    /// creating the default one ([`SessionData::default`]) when absent.
    ///
    /// Idempotent: reopening neither duplicates the record nor resets it.
    /// A connectivity failure here is fatal to startup.
    ///
    /// [`SessionData::default`]: crate::session::SessionData
    async fn open(&self) -> Result<()>;

    /// Stamp the session's `date` with the current time and persist it.
    async fn save(&self) -> Result<()>;

    /// No-op; this layer holds no background resources. Dropping the value
    /// releases whatever handle the backend keeps.
    async fn close(&self) -> Result<()>;

    /// Remove the session record (logout). A backend configured with peer
    /// removal also drops every cached peer; alias rows stay behind and
    /// age out.
    async fn delete(&self) -> Result<()>;

    // ─── Peer cache ───────────────────────────────────────────────────────────

    /// Idempotent batch upsert of resolved peers. Existing records are
    /// overwritten whole and `last_update_on` is refreshed; an empty batch
    /// is a no-op.
    async fn update_peers(&self, peers: &[PeerUpdate]) -> Result<()>;

    /// Reassign usernames, grouped per peer: aliases the peer no longer
    /// holds are evicted, contested aliases move to it (last writer wins),
    /// and the username is scrubbed from every other peer's inline set so
    /// a stale claim cannot shadow the new owner.
    async fn update_usernames(&self, usernames: &[(i64, String)]) -> Result<()>;

    /// Resolve a peer by marked id. Never TTL-checked.
    async fn peer_by_id(&self, id: i64) -> Result<PeerRef>;

    /// Resolve a peer by username: inline username sets first, the alias
    /// index second. Fails with [`StorageError::NotFound`] when no mapping
    /// exists and [`StorageError::Expired`] when one exists but crossed
    /// [`USERNAME_TTL`]; on the alias path both the alias row and the peer
    /// it points at must be fresh.
    ///
    /// [`StorageError::NotFound`]: crate::StorageError::NotFound
    /// [`StorageError::Expired`]: crate::StorageError::Expired
    /// [`USERNAME_TTL`]: crate::USERNAME_TTL
    async fn peer_by_username(&self, username: &str) -> Result<PeerRef>;

    /// Resolve a peer by phone number. Never TTL-checked.
    async fn peer_by_phone_number(&self, phone_number: &str) -> Result<PeerRef>;

    // ─── Update cursor ────────────────────────────────────────────────────────

    /// All stored cursors ordered by id, or `None` when none exist. The
    /// caller distinguishes "never synchronized" from "synchronized with
    /// zero cursors" by this sentinel alone.
    async fn update_states(&self) -> Result<Option<Vec<UpdateState>>>;

    /// Upsert one cursor; all four positions land atomically.
    async fn set_update_state(&self, state: UpdateState) -> Result<()>;

    /// Drop one cursor; succeeds silently when the id was never stored.
    async fn remove_update_state(&self, id: i64) -> Result<()>;

    // ─── Session fields ───────────────────────────────────────────────────────
    //
    // One get/set pair per field. Each call is a single durable round
    // trip; a read-then-conditional-write dance is never needed.

    /// Datacenter the session is bound to.
    async fn dc_id(&self) -> Result<i32>;
    /// Rebind the session to another datacenter.
    async fn set_dc_id(&self, value: i32) -> Result<()>;

    /// API id recorded at authorization, if any.
    async fn api_id(&self) -> Result<Option<i32>>;
    /// Record the API id.
    async fn set_api_id(&self, value: i32) -> Result<()>;

    /// Whether the session targets the test network, if known.
    async fn test_mode(&self) -> Result<Option<bool>>;
    /// Record the test-network flag.
    async fn set_test_mode(&self, value: bool) -> Result<()>;

    /// The authorization key; empty before key exchange.
    async fn auth_key(&self) -> Result<Vec<u8>>;
    /// Store the authorization key.
    async fn set_auth_key(&self, value: Vec<u8>) -> Result<()>;

    /// Last-saved timestamp, unix seconds.
    async fn date(&self) -> Result<i64>;
    /// Overwrite the last-saved timestamp.
    async fn set_date(&self, value: i64) -> Result<()>;

    /// Logged-in account id, once authorized.
    async fn user_id(&self) -> Result<Option<i64>>;
    /// Record the logged-in account id.
    async fn set_user_id(&self, value: i64) -> Result<()>;

    /// Whether the logged-in account is a bot, once authorized.
    async fn is_bot(&self) -> Result<Option<bool>>;
    /// Record the bot flag.
    async fn set_is_bot(&self, value: bool) -> Result<()>;

    /// Export the authentication fields as a portable session string; see
    /// [`SessionString`](crate::SessionString) for the exact layout.
    async fn export_session_string(&self) -> Result<String> {
        let string = SessionString::new(
            self.dc_id().await?,
            self.api_id().await?,
            self.test_mode().await?,
            &self.auth_key().await?,
            self.user_id().await?,
            self.is_bot().await?,
        )?;
        Ok(string.encode())
    }
}
