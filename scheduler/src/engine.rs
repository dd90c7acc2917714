//! The regeneration entry point.
//!
//! For each timeline regeneration (per playlist), it:
//!   1. Loads the playlist's persisted scheduler state.
//!   2. Per pool: calculates session requests, resolves assignments and
//!      applies them onto the timeline fragments.
//!   3. Prunes unreferenced session identities and persists the new state.
//!
//! Pool scheduling itself is synchronous and side-effect-free; this layer
//! owns the playlist lock, the store round-trip and the logging.

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::Mutex;

use common::logger::{TraceId, child_span, root_span};
use session::model::{PlaylistAbState, PlaylistId, PoolAssignments, SessionId};
use session::registry::SessionRegistry;
use session::store::PlaylistStateStore;
use timeline::range::Timestamp;
use timeline::types::{PoolConfig, TimedPiece, TimelineFragment};

use crate::applier::{ApplyRules, apply_assignments};
use crate::ranges::calculate_session_requests;
use crate::resolver::resolve_assignments;
use crate::types::{SchedulerConfig, SchedulingOverflow};

/// What one regeneration pass had to report, per pool.
#[derive(Debug)]
pub struct PoolReport {
    pub pool: String,
    pub failed_required: Vec<SessionId>,
    pub failed_optional: Vec<SessionId>,
    pub unexpected_sessions: Vec<SessionId>,
}

#[derive(Debug, Default)]
pub struct RegenerationReport {
    pub pools: Vec<PoolReport>,
}

/// Schedules player sessions for rundown playlists.
///
/// Regenerations for the same playlist are serialized on a per-playlist
/// lock; different playlists run independently.
pub struct AbScheduler<S: PlaylistStateStore> {
    cfg: SchedulerConfig,
    store: Arc<S>,
    locks: Mutex<HashMap<PlaylistId, Arc<Mutex<()>>>>,
}

impl<S: PlaylistStateStore> AbScheduler<S> {
    pub fn new(cfg: SchedulerConfig, store: Arc<S>) -> Self {
        Self {
            cfg,
            store,
            locks: Mutex::new(HashMap::new()),
        }
    }

    async fn playlist_lock(&self, playlist_id: PlaylistId) -> Arc<Mutex<()>> {
        let mut locks = self.locks.lock().await;
        locks.entry(playlist_id).or_default().clone()
    }

    /// Run one full scheduling pass for a regenerated timeline.
    ///
    /// Mutates `fragments` in place and persists the new assignment state.
    /// An eviction-cascade overflow aborts the pass before anything is
    /// persisted, leaving the previous assignments in effect.
    pub async fn on_timeline_regenerated(
        &self,
        playlist_id: PlaylistId,
        pools: &[PoolConfig],
        pieces: &[TimedPiece],
        fragments: &mut [TimelineFragment],
        rules: &ApplyRules,
        now: Timestamp,
    ) -> anyhow::Result<RegenerationReport> {
        let lock = self.playlist_lock(playlist_id).await;
        let _guard = lock.lock().await;

        let trace_id = TraceId::new();
        let span = root_span("session_scheduling", &trace_id);

        let previous = self.store.load(playlist_id).await?.unwrap_or_default();
        let (state, report) =
            span.in_scope(|| self.run_pass(pools, pieces, fragments, rules, now, previous))?;
        self.store.save(playlist_id, &state).await?;

        Ok(report)
    }

    fn run_pass(
        &self,
        pools: &[PoolConfig],
        pieces: &[TimedPiece],
        fragments: &mut [TimelineFragment],
        rules: &ApplyRules,
        now: Timestamp,
        previous: PlaylistAbState,
    ) -> Result<(PlaylistAbState, RegenerationReport), SchedulingOverflow> {
        let mut registry = SessionRegistry::from_identities(previous.identities);
        registry.begin_pass();

        let mut state = PlaylistAbState::default();
        let mut report = RegenerationReport::default();
        let empty = PoolAssignments::new();

        for pool in pools {
            let span = child_span(&pool.name);
            let _enter = span.enter();

            let seed = previous.assignments.get(&pool.name).unwrap_or(&empty);
            let requests =
                calculate_session_requests(&mut registry, pool, pieces, fragments, seed);

            let resolved = resolve_assignments(
                &self.cfg.resolver,
                &pool.players,
                requests,
                now,
                self.cfg.reassignment_budget,
            )
            .inspect_err(|e| {
                tracing::error!(budget = e.budget, "aborting scheduling pass: {e}");
            })?;

            if !resolved.failed_required.is_empty() {
                tracing::warn!(
                    sessions = ?resolved.failed_required,
                    "required sessions could not be assigned a player"
                );
            }
            if !resolved.failed_optional.is_empty() {
                tracing::info!(
                    sessions = ?resolved.failed_optional,
                    "optional sessions were bumped"
                );
            }

            let applied =
                apply_assignments(&mut registry, &pool.name, rules, fragments, &resolved, seed);

            report.pools.push(PoolReport {
                pool: pool.name.clone(),
                failed_required: resolved.failed_required,
                failed_optional: resolved.failed_optional,
                unexpected_sessions: applied.unexpected_sessions,
            });
            state.assignments.insert(pool.name.clone(), applied.assignments);
        }

        state.identities = registry.finish_pass();
        Ok((state, report))
    }
}
