//! Persisted model of the player scheduler: session identities and the
//! per-pool assignment maps that survive from one regeneration pass to the
//! next as part of the owning playlist's durable state.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use timeline::types::{InfiniteId, PartId, PartInstanceId, PlayerId};

pub type SessionId = uuid::Uuid;
pub type PlaylistId = uuid::Uuid;

/// Stable identity of one session, persisted across regeneration passes.
///
/// Identity, not geometry, is what survives: the time range is rebuilt every
/// pass, but a piece that keeps playing (or an infinite continuation of it)
/// must resolve to the same `id` so its player does not change mid-clip.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionIdentity {
    pub id: SessionId,

    /// Fully composed session name (`"<pool>_<name>"`).
    pub name: String,

    /// Set when the session belongs to an infinite continuation chain.
    pub infinite_instance_id: Option<InfiniteId>,

    /// Part instances this identity has been seen on, in encounter order.
    pub part_instance_ids: Vec<PartInstanceId>,

    /// Set while this identity is only a lookahead placeholder scoped to a
    /// Part; cleared when a real piece promotes it.
    pub lookahead_for_part_id: Option<PartId>,

    /// Generation stamp of the last pass that referenced this identity.
    /// Transient: identities not stamped with the current generation are
    /// dropped before persisting.
    #[serde(skip)]
    pub touched: u64,
}

/// One resolved session-to-player mapping, persisted per pool.
///
/// This is the only state besides the identities that crosses passes: it is
/// read at the start of a pass to seed stability preferences and fully
/// replaced at the end.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionAssignment {
    pub session_id: SessionId,
    pub player_id: PlayerId,
    pub lookahead: bool,
}

/// Per-pool assignment map as persisted.
pub type PoolAssignments = HashMap<SessionId, SessionAssignment>;

/// The scheduler's durable state for one playlist, stored as an opaque part
/// of the playlist's aggregate document.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PlaylistAbState {
    /// pool name -> session id -> assignment
    pub assignments: HashMap<String, PoolAssignments>,
    pub identities: Vec<SessionIdentity>,
}
