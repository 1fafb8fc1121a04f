//! Peer records, kinds, and addressable references.
//!
//! Peers are stored under their *marked* dialog id: positive for users and
//! bots, negative for basic groups, `-100…`-prefixed for channels and
//! supergroups. [`PeerRef`] applies the wire-level id transforms when a
//! cached peer is turned back into something the protocol engine can
//! address.

use std::fmt;
use std::str::FromStr;

use crate::errors::{Result, StorageError};

/// Maximum age, in seconds, of a cached username resolution (8 hours).
///
/// Only username lookups enforce this; resolving by id or phone number
/// trusts the cache indefinitely.
pub const USERNAME_TTL: i64 = 8 * 60 * 60;

/// Base of the channel marked-id range. A marked channel id maps to its
/// bare wire id via `MAX_CHANNEL_ID - marked_id`.
pub const MAX_CHANNEL_ID: i64 = -1_000_000_000_000;

// ─── PeerKind ─────────────────────────────────────────────────────────────────

/// The five addressable entity kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "snake_case"))]
pub enum PeerKind {
    /// A human account.
    User,
    /// A bot account; addressed like a user on the wire.
    Bot,
    /// A basic (legacy) group.
    Group,
    /// A broadcast channel.
    Channel,
    /// A supergroup; addressed like a channel on the wire.
    Supergroup,
}

impl PeerKind {
    /// Stable lowercase name; this is what backends persist.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::User       => "user",
            Self::Bot        => "bot",
            Self::Group      => "group",
            Self::Channel    => "channel",
            Self::Supergroup => "supergroup",
        }
    }
}

impl fmt::Display for PeerKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PeerKind {
    type Err = StorageError;

    /// Parse a stored kind name; anything unrecognized is
    /// [`StorageError::Invalid`].
    fn from_str(s: &str) -> Result<Self> {
        match s {
            "user"       => Ok(Self::User),
            "bot"        => Ok(Self::Bot),
            "group"      => Ok(Self::Group),
            "channel"    => Ok(Self::Channel),
            "supergroup" => Ok(Self::Supergroup),
            other => Err(StorageError::invalid(format!("unknown peer kind {other:?}"))),
        }
    }
}

// ─── PeerRef ──────────────────────────────────────────────────────────────────

/// An addressable reference reconstructed from a cached peer: the
/// wire-level id after the marked-id transform, plus the access hash where
/// the wire requires one.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PeerRef {
    /// A user or bot account.
    User {
        /// Positive user id.
        user_id:     i64,
        /// Access hash bound to the current session.
        access_hash: i64,
    },
    /// A basic group; addressed by bare chat id, no access hash.
    Chat {
        /// Bare chat id, the negated marked id.
        chat_id: i64,
    },
    /// A channel or supergroup.
    Channel {
        /// Bare channel id after the marked-id transform.
        channel_id:  i64,
        /// Access hash bound to the current session.
        access_hash: i64,
    },
}

impl PeerRef {
    /// Build the wire reference for a stored peer, where `id` is the
    /// marked dialog id.
    pub fn from_parts(id: i64, access_hash: i64, kind: PeerKind) -> Self {
        match kind {
            PeerKind::User | PeerKind::Bot => Self::User { user_id: id, access_hash },
            PeerKind::Group => Self::Chat { chat_id: -id },
            PeerKind::Channel | PeerKind::Supergroup => Self::Channel {
                channel_id: MAX_CHANNEL_ID - id,
                access_hash,
            },
        }
    }
}

// ─── PeerUpdate ───────────────────────────────────────────────────────────────

/// One entry of an `update_peers` batch: everything the engine learned
/// about a peer from the network.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PeerUpdate {
    /// Marked dialog id.
    pub id:           i64,
    /// Access hash for the current session; `0` where the kind has none.
    pub access_hash:  i64,
    /// Entity kind.
    pub kind:         PeerKind,
    /// Usernames as the network reported them, possibly with duplicates.
    pub usernames:    Vec<String>,
    /// Phone number, digits only, if the peer exposes one.
    pub phone_number: Option<String>,
}

impl PeerUpdate {
    /// An update carrying no usernames and no phone number.
    pub fn new(id: i64, access_hash: i64, kind: PeerKind) -> Self {
        Self { id, access_hash, kind, usernames: Vec::new(), phone_number: None }
    }

    /// Attach usernames. Set semantics: duplicates are dropped on store.
    pub fn with_usernames<I, S>(mut self, usernames: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.usernames = usernames.into_iter().map(Into::into).collect();
        self
    }

    /// Attach a phone number.
    pub fn with_phone_number(mut self, phone: impl Into<String>) -> Self {
        self.phone_number = Some(phone.into());
        self
    }
}

// ─── PeerRecord ───────────────────────────────────────────────────────────────

/// The stored form of a peer, identical across backends.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct PeerRecord {
    /// Marked dialog id; the cache key.
    pub id:             i64,
    /// Access hash for the current session.
    pub access_hash:    i64,
    /// Entity kind.
    pub kind:           PeerKind,
    /// Deduplicated usernames in first-seen order.
    pub usernames:      Vec<String>,
    /// Phone number, if known.
    pub phone_number:   Option<String>,
    /// Unix seconds of the last whole-record write.
    pub last_update_on: i64,
}

impl PeerRecord {
    /// Materialize an upsert at time `now`, deduplicating its usernames
    /// while keeping their first-seen order.
    pub fn from_update(update: &PeerUpdate, now: i64) -> Self {
        Self {
            id:             update.id,
            access_hash:    update.access_hash,
            kind:           update.kind,
            usernames:      dedup_usernames(&update.usernames),
            phone_number:   update.phone_number.clone(),
            last_update_on: now,
        }
    }

    /// The addressable reference for this record.
    pub fn peer_ref(&self) -> PeerRef {
        PeerRef::from_parts(self.id, self.access_hash, self.kind)
    }
}

// ─── UsernameRecord ───────────────────────────────────────────────────────────

/// One alias-index row: a username claimed by a peer at a point in time.
///
/// The `peer_id` is not a foreign key; the record may legitimately outlive
/// the peer it points at, and the TTL governs staleness instead of any
/// referential cleanup.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct UsernameRecord {
    /// The unique username; the index key.
    pub username:       String,
    /// The claiming peer's marked id.
    pub peer_id:        i64,
    /// Unix seconds of the claim.
    pub last_update_on: i64,
}

// ─── Freshness & batch helpers ────────────────────────────────────────────────

/// A record written at `last_update_on` is fresh at `now` iff its age does
/// not exceed [`USERNAME_TTL`]. Age exactly equal to the TTL still counts
/// as fresh.
pub fn is_fresh(now: i64, last_update_on: i64) -> bool {
    now - last_update_on <= USERNAME_TTL
}

/// TTL guard for the username resolution path; `what` names the record in
/// the [`StorageError::Expired`] message.
pub fn ensure_fresh(now: i64, last_update_on: i64, what: impl fmt::Display) -> Result<()> {
    if is_fresh(now, last_update_on) {
        Ok(())
    } else {
        Err(StorageError::expired(what))
    }
}

/// Drop duplicate usernames, keeping first-seen order.
pub fn dedup_usernames(usernames: &[String]) -> Vec<String> {
    let mut out: Vec<String> = Vec::with_capacity(usernames.len());
    for name in usernames {
        if !out.iter().any(|seen| seen == name) {
            out.push(name.clone());
        }
    }
    out
}

/// Group an `update_usernames` batch into per-peer username sets, keeping
/// the peers in first-appearance order. A peer listed twice contributes
/// one merged set; reassignments are then applied per peer in that order,
/// so across peers a later pair still wins a contested username.
pub fn group_usernames(pairs: &[(i64, String)]) -> Vec<(i64, Vec<String>)> {
    let mut grouped: Vec<(i64, Vec<String>)> = Vec::new();
    for (peer_id, username) in pairs {
        match grouped.iter_mut().find(|(id, _)| id == peer_id) {
            Some((_, names)) => {
                if !names.iter().any(|seen| seen == username) {
                    names.push(username.clone());
                }
            }
            None => grouped.push((*peer_id, vec![username.clone()])),
        }
    }
    grouped
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kind_names_round_trip() {
        for kind in [PeerKind::User, PeerKind::Bot, PeerKind::Group, PeerKind::Channel, PeerKind::Supergroup] {
            assert_eq!(kind.as_str().parse::<PeerKind>().ok(), Some(kind));
        }
    }

    #[test]
    fn unknown_kind_is_invalid() {
        let err = "gigagroup".parse::<PeerKind>().unwrap_err();
        assert!(matches!(err, StorageError::Invalid(_)), "got {err:?}");
    }

    #[test]
    fn user_and_bot_map_to_user_refs() {
        let user = PeerRef::from_parts(100, 555, PeerKind::User);
        assert_eq!(user, PeerRef::User { user_id: 100, access_hash: 555 });
        let bot = PeerRef::from_parts(101, 777, PeerKind::Bot);
        assert_eq!(bot, PeerRef::User { user_id: 101, access_hash: 777 });
    }

    #[test]
    fn group_ref_negates_the_marked_id() {
        let chat = PeerRef::from_parts(-400, 0, PeerKind::Group);
        assert_eq!(chat, PeerRef::Chat { chat_id: 400 });
    }

    #[test]
    fn channel_ref_applies_the_marked_id_transform() {
        // -1001234567890 is the marked form of bare channel id 1234567890.
        let channel = PeerRef::from_parts(-1_001_234_567_890, 999, PeerKind::Channel);
        assert_eq!(channel, PeerRef::Channel { channel_id: 1_234_567_890, access_hash: 999 });
        let supergroup = PeerRef::from_parts(-1_001_234_567_890, 999, PeerKind::Supergroup);
        assert_eq!(supergroup, PeerRef::Channel { channel_id: 1_234_567_890, access_hash: 999 });
    }

    #[test]
    fn freshness_boundary_is_inclusive() {
        let now = 1_000_000;
        assert!(is_fresh(now, now - USERNAME_TTL), "age == TTL is still fresh");
        assert!(!is_fresh(now, now - USERNAME_TTL - 1), "age > TTL is stale");
    }

    #[test]
    fn record_from_update_dedups_usernames() {
        let update = PeerUpdate::new(1, 2, PeerKind::User)
            .with_usernames(["alice", "alice", "wonderland", "alice"]);
        let record = PeerRecord::from_update(&update, 42);
        assert_eq!(record.usernames, vec!["alice", "wonderland"]);
        assert_eq!(record.last_update_on, 42);
    }

    #[test]
    fn grouping_merges_pairs_per_peer_in_first_appearance_order() {
        let pairs = vec![
            (100, "a".to_string()),
            (200, "bob".to_string()),
            (100, "b".to_string()),
            (100, "a".to_string()),
        ];
        let groups = group_usernames(&pairs);
        assert_eq!(
            groups,
            vec![
                (100, vec!["a".to_string(), "b".to_string()]),
                (200, vec!["bob".to_string()]),
            ]
        );
    }
}
