//! Domain types consumed and mutated by the player scheduler: pools of
//! interchangeable players, timed pieces carrying session references, and
//! the rendered timeline fragments the assignments are applied onto.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::range::{TimeRange, Timestamp};

pub type PieceId = uuid::Uuid;
pub type PartId = uuid::Uuid;
pub type PartInstanceId = uuid::Uuid;
pub type InfiniteId = uuid::Uuid;

/// Identifier of one physical player in a pool. Pools are configured with
/// either numeric deck indexes or named tokens, so both are supported.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(untagged)]
pub enum PlayerId {
    Index(i64),
    Name(String),
}

impl fmt::Display for PlayerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PlayerId::Index(n) => write!(f, "{n}"),
            PlayerId::Name(s) => f.write_str(s),
        }
    }
}

impl From<i64> for PlayerId {
    fn from(n: i64) -> Self {
        PlayerId::Index(n)
    }
}

impl From<&str> for PlayerId {
    fn from(s: &str) -> Self {
        PlayerId::Name(s.to_owned())
    }
}

/// A named, externally-configured, ordered set of player identifiers.
/// Immutable for the duration of one resolution pass.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PoolConfig {
    pub name: String,
    pub players: Vec<PlayerId>,
}

impl PoolConfig {
    pub fn new(name: impl Into<String>, players: Vec<PlayerId>) -> Self {
        Self {
            name: name.into(),
            players,
        }
    }
}

/// A named session request attached to a piece or timeline fragment.
///
/// `exclusive` means the content asked for its own auto-named session
/// ("don't merge me with siblings"): the owner's id is substituted for the
/// raw name when the full session name is composed.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionRef {
    pub pool: String,
    pub name: String,
    pub optional: bool,
    pub exclusive: bool,
}

impl SessionRef {
    pub fn new(pool: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            pool: pool.into(),
            name: name.into(),
            optional: false,
            exclusive: false,
        }
    }

    pub fn optional(mut self) -> Self {
        self.optional = true;
        self
    }

    pub fn exclusive(mut self) -> Self {
        self.exclusive = true;
        self
    }
}

/// What a timed piece tells the identity registry about itself.
///
/// `previous_part_instance_id` is the part instance immediately preceding
/// the owning one by rank; the caller owns the ordered part-instance list
/// and fills it in, the registry only matches against it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionContentRef {
    pub piece_id: PieceId,
    pub part_id: PartId,
    pub part_instance_id: Option<PartInstanceId>,
    pub previous_part_instance_id: Option<PartInstanceId>,
    pub infinite_instance_id: Option<InfiniteId>,
}

/// A piece with an already-resolved time interval, as produced by the
/// upstream interval resolver.
///
/// `clears_layer` marks a clear/override variant: when several such
/// variants compete on one source layer, only the most recently inserted
/// one (highest `insertion_seq`) reaches the scheduler.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TimedPiece {
    pub content: SessionContentRef,
    pub range: TimeRange,
    pub sessions: Vec<SessionRef>,
    pub source_layer: String,
    pub insertion_seq: u64,
    pub clears_layer: bool,
}

/// Player-conditional control datum attached to a timeline fragment.
///
/// The applier enables the keyframe whose `for_player` matches the resolved
/// assignment and drops the ones for other players in the same pool.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Keyframe {
    pub id: String,
    pub pools: Vec<String>,
    pub for_player: PlayerId,
    pub disabled: bool,
}

/// A rendered timeline fragment that references one or more sessions.
///
/// The applier mutates `layer`, `keyframes` and (through the custom hook)
/// arbitrary other fields in place; everything else is read-only here.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TimelineFragment {
    pub id: String,
    pub layer: String,
    pub priority: f64,
    pub lookahead: bool,
    pub duration: Option<Timestamp>,
    pub sessions: Vec<SessionRef>,
    pub piece_id: Option<PieceId>,
    pub part_id: Option<PartId>,
    pub part_instance_id: Option<PartInstanceId>,
    pub infinite_instance_id: Option<InfiniteId>,
    pub keyframes: Vec<Keyframe>,
}

impl TimelineFragment {
    /// First session reference targeting the given pool, if any.
    pub fn session_for_pool(&self, pool: &str) -> Option<&SessionRef> {
        self.sessions.iter().find(|s| s.pool == pool)
    }
}
