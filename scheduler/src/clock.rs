//! The dense-vs-spread time boundary.
//
//  Everything before `safe_now = now + now_window` is "already happening":
//  reassigning a player there would be visible on air, and preloading is
//  moot. Everything after it is still changeable. All staleness decisions
//  in the resolver go through this one type so the boundary is applied
//  consistently.

use timeline::range::{TimeRange, Timestamp};

use crate::types::ResolverOptions;

#[derive(Debug, Clone, Copy)]
pub struct SessionClock {
    now: Timestamp,
    safe_now: Timestamp,
}

impl SessionClock {
    pub fn new(now: Timestamp, options: &ResolverOptions) -> Self {
        Self {
            now,
            safe_now: now + options.now_window_ms,
        }
    }

    pub fn now(&self) -> Timestamp {
        self.now
    }

    pub fn safe_now(&self) -> Timestamp {
        self.safe_now
    }

    /// True when the range has effectively begun: it starts before
    /// `safe_now`, so its assignment is already committed to air.
    pub fn is_current(&self, range: &TimeRange) -> bool {
        range.start < self.safe_now
    }

    /// True when a seeded assignment carries no stability value: the
    /// predecessor on the same player already ended before `safe_now` while
    /// this range only starts at or after it. Such a seed is released back
    /// into the pending pool for re-evaluation.
    pub fn is_stale(&self, predecessor_end: Option<Timestamp>, range: &TimeRange) -> bool {
        matches!(predecessor_end, Some(end) if end < self.safe_now) && !self.is_current(range)
    }
}
