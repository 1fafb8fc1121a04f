//! The update-sequence cursor.

/// One synchronization cursor: the resume point for incremental update
/// delivery on a connection or shard.
///
/// All four positions are written atomically by
/// [`Storage::set_update_state`](crate::Storage::set_update_state); a
/// missing row for an id means "never synchronized".
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct UpdateState {
    /// Connection/shard identifier the cursor belongs to.
    pub id:   i64,
    /// Event sequence position.
    pub pts:  i32,
    /// Secondary (secret-chat) sequence position.
    pub qts:  i32,
    /// Server date of the last applied update.
    pub date: i32,
    /// Coarse sequence number.
    pub seq:  i32,
}

impl UpdateState {
    /// A cursor with all four positions given.
    pub fn new(id: i64, pts: i32, qts: i32, date: i32, seq: i32) -> Self {
        Self { id, pts, qts, date, seq }
    }
}
