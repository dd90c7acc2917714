//! Time ranges used throughout the player scheduler.
//
//  Ranges are half-open `[start, end)` in milliseconds. An absent end means
//  the range is open-ended: the content is still playing or has no known
//  stop time yet.

use serde::{Deserialize, Serialize};

/// Milliseconds in the playout clock domain.
pub type Timestamp = i64;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimeRange {
    pub start: Timestamp,
    pub end: Option<Timestamp>,
}

impl TimeRange {
    pub fn new(start: Timestamp, end: Timestamp) -> Self {
        Self {
            start,
            end: Some(end),
        }
    }

    pub fn open_ended(start: Timestamp) -> Self {
        Self { start, end: None }
    }

    /// Strict half-open overlap. Touching ranges (`[a,b)` and `[b,c)`) do
    /// not overlap, which is what allows a zero-gap hand-off of a player.
    pub fn overlaps(&self, other: &TimeRange) -> bool {
        self.start < other.end.unwrap_or(Timestamp::MAX)
            && other.start < self.end.unwrap_or(Timestamp::MAX)
    }

    /// Widen to cover both ranges. An open end on either side wins.
    pub fn union(&self, other: &TimeRange) -> TimeRange {
        TimeRange {
            start: self.start.min(other.start),
            end: match (self.end, other.end) {
                (Some(a), Some(b)) => Some(a.max(b)),
                _ => None,
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn overlap_is_strict_half_open() {
        let a = TimeRange::new(400, 5400);
        let b = TimeRange::new(5400, 6400);
        assert!(!a.overlaps(&b));
        assert!(!b.overlaps(&a));

        let c = TimeRange::new(5399, 6400);
        assert!(a.overlaps(&c));
    }

    #[test]
    fn open_ended_overlaps_everything_after_start() {
        let open = TimeRange::open_ended(1000);
        assert!(open.overlaps(&TimeRange::new(900_000, 900_001)));
        assert!(!open.overlaps(&TimeRange::new(0, 1000)));
        assert!(open.overlaps(&TimeRange::open_ended(5)));
    }

    #[test]
    fn union_widens_and_open_end_wins() {
        let a = TimeRange::new(0, 500);
        let b = TimeRange::new(100, 6000);
        assert_eq!(a.union(&b), TimeRange::new(0, 6000));

        let c = TimeRange::open_ended(200);
        assert_eq!(a.union(&c), TimeRange::open_ended(0));
    }
}
