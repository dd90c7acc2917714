//! The session range calculator: turns the current set of timed pieces and
//! speculative timeline fragments into one request per distinct session per
//! pool, seeded with the player the session had last pass.

use std::cmp::Ordering;
use std::collections::HashMap;

use session::model::{PoolAssignments, SessionId};
use session::registry::{compose_session_name, SessionRegistry};
use timeline::range::TimeRange;
use timeline::types::{PoolConfig, TimedPiece, TimelineFragment};

use crate::types::SessionRequest;

pub fn calculate_session_requests(
    registry: &mut SessionRegistry,
    pool: &PoolConfig,
    pieces: &[TimedPiece],
    fragments: &[TimelineFragment],
    previous: &PoolAssignments,
) -> Vec<SessionRequest> {
    // Clear/override variants are mutually exclusive per source layer: only
    // the most recently inserted one reaches the resolver.
    let mut newest_clear: HashMap<&str, u64> = HashMap::new();
    for piece in pieces.iter().filter(|p| p.clears_layer) {
        let newest = newest_clear
            .entry(piece.source_layer.as_str())
            .or_insert(piece.insertion_seq);
        if piece.insertion_seq > *newest {
            *newest = piece.insertion_seq;
        }
    }

    let mut order: Vec<SessionId> = Vec::new();
    let mut by_id: HashMap<SessionId, SessionRequest> = HashMap::new();

    for piece in pieces {
        if piece.clears_layer
            && newest_clear.get(piece.source_layer.as_str()) != Some(&piece.insertion_seq)
        {
            continue;
        }

        for session in piece.sessions.iter().filter(|s| s.pool == pool.name) {
            let name = compose_session_name(&piece.content.piece_id, session);
            let id = registry.resolve_for_content(&piece.content, &name);
            let seed = previous.get(&id).map(|a| a.player_id.clone());

            match by_id.get_mut(&id) {
                Some(existing) => {
                    existing.range = existing.range.union(&piece.range);
                    // only optional if every contributing piece says so
                    existing.optional = existing.optional && session.optional;
                    existing.player_id = seed;
                }
                None => {
                    order.push(id);
                    by_id.insert(
                        id,
                        SessionRequest {
                            id,
                            range: piece.range,
                            optional: session.optional,
                            lookahead_rank: None,
                            player_id: seed,
                        },
                    );
                }
            }
        }
    }

    // Speculative lookahead placeholders: group qualifying fragments by
    // identity, rank the groups by descending maximum priority. A group
    // whose session already has a real, time-bound request is suppressed.
    let mut group_order: Vec<SessionId> = Vec::new();
    let mut group_priority: HashMap<SessionId, f64> = HashMap::new();

    for fragment in fragments.iter().filter(|f| f.lookahead && f.duration.is_none()) {
        let Some(session) = fragment.session_for_pool(&pool.name) else {
            continue;
        };
        let owner = fragment
            .piece_id
            .map(|p| p.to_string())
            .unwrap_or_else(|| fragment.id.clone());
        let name = compose_session_name(&owner, session);
        let Some(id) = registry.resolve_for_fragment(fragment, &name) else {
            continue;
        };
        match group_priority.get_mut(&id) {
            Some(max) => {
                if fragment.priority > *max {
                    *max = fragment.priority;
                }
            }
            None => {
                group_order.push(id);
                group_priority.insert(id, fragment.priority);
            }
        }
    }

    group_order.sort_by(|a, b| {
        group_priority[b]
            .partial_cmp(&group_priority[a])
            .unwrap_or(Ordering::Equal)
    });

    for (position, id) in group_order.into_iter().enumerate() {
        if by_id.contains_key(&id) {
            continue;
        }
        order.push(id);
        by_id.insert(
            id,
            SessionRequest {
                id,
                // nominal range: lookahead placement ignores geometry
                range: TimeRange::open_ended(0),
                optional: false,
                lookahead_rank: Some(position as u64 + 1),
                player_id: previous.get(&id).map(|a| a.player_id.clone()),
            },
        );
    }

    order
        .into_iter()
        .filter_map(|id| by_id.remove(&id))
        .collect()
}
