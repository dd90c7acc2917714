use std::fmt;

use uuid::Uuid;

/// Correlation id for one timeline-regeneration pass.
///
/// Every log line produced while resolving a playlist's player assignments
/// carries the same TraceId, so one pass can be filtered out of the worker's
/// combined output.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct TraceId(Uuid);

impl TraceId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for TraceId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for TraceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.as_hyphenated().fmt(f)
    }
}
