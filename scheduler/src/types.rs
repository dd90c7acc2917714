//! Shared types used by the scheduler subsystem.

use session::model::{SessionAssignment, SessionId};
use timeline::range::TimeRange;
use timeline::types::PlayerId;

/// Default ceiling on eviction-cascade re-queues in one resolution pass.
/// Exceeding it means requests keep displacing each other without
/// converging, which is a logic bug, not an oversubscribed pool.
pub const DEFAULT_REASSIGNMENT_BUDGET: usize = 200;

/// Per-blueprint resolver tuning.
#[derive(Debug, Clone)]
pub struct ResolverOptions {
    /// Preferred idle time (ms) on a player before a session starts, so the
    /// playout hardware has room to preload.
    pub ideal_gap_before_ms: i64,

    /// Width (ms) of the window after `now` inside which reassigning a
    /// player is assumed to have no real-world effect.
    pub now_window_ms: i64,
}

impl Default for ResolverOptions {
    fn default() -> Self {
        Self {
            ideal_gap_before_ms: 1000,
            now_window_ms: 2000,
        }
    }
}

/// Configuration for one scheduler instance.
#[derive(Debug, Clone)]
pub struct SchedulerConfig {
    pub resolver: ResolverOptions,

    /// Maximum number of placements (including re-queued evictions) the
    /// resolver may perform for one pool in one pass.
    pub reassignment_budget: usize,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            resolver: ResolverOptions::default(),
            reassignment_budget: DEFAULT_REASSIGNMENT_BUDGET,
        }
    }
}

/// The resolver's unit of work: one session's need for one player during
/// one time range.
///
/// `player_id` is both input and output: it seeds the stability preference
/// from the previous pass and carries the resolved player afterwards.
#[derive(Debug, Clone)]
pub struct SessionRequest {
    pub id: SessionId,
    pub range: TimeRange,
    pub optional: bool,

    /// Set for speculative lookahead placeholders, ranked by descending
    /// priority of the content that might use them (1 = most likely next).
    pub lookahead_rank: Option<u64>,

    pub player_id: Option<PlayerId>,
}

impl SessionRequest {
    pub fn is_lookahead(&self) -> bool {
        self.lookahead_rank.is_some()
    }
}

/// Everything the resolver has to say about one pool.
#[derive(Debug, Default)]
pub struct ResolverOutcome {
    /// Required sessions the pool could not accommodate. Degraded playout,
    /// logged as warnings by the caller.
    pub failed_required: Vec<SessionId>,

    /// Optional sessions that were bumped. Informational only.
    pub failed_optional: Vec<SessionId>,

    /// All requests, with `player_id` set where a player was found.
    pub requests: Vec<SessionRequest>,
}

/// The eviction cascade exceeded its budget: a logic bug causing perpetual
/// reassignment. The whole pass is aborted and the previous timeline and
/// assignments stay in place.
#[derive(Debug, thiserror::Error)]
#[error("session placement did not converge within {budget} reassignments")]
pub struct SchedulingOverflow {
    pub budget: usize,
}

/// How a session seen on the timeline relates to the resolver's output.
/// Keeping the three cases explicit makes the applier's fallback logic
/// exhaustive instead of implied by nested conditionals.
#[derive(Debug)]
pub enum SessionLookup<'a> {
    /// The resolver produced a request for this session this pass.
    Resolved(&'a SessionRequest),
    /// Unknown to this pass, but the previous pass assigned it a player.
    PreviousOnly(&'a SessionAssignment),
    /// Nothing known about it at all.
    Unmatched,
}
