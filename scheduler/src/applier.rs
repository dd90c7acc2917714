//! Propagates resolved assignments onto the concrete timeline fragments:
//! filters player-conditional keyframes, renames output layers per the
//! configured rule table and invokes the per-fragment custom hook.

use std::collections::HashMap;

use session::model::{PoolAssignments, SessionAssignment, SessionId};
use session::registry::{SessionRegistry, compose_session_name};
use timeline::types::{PlayerId, TimelineFragment};

use crate::types::{ResolverOutcome, SessionLookup, SessionRequest};

/// Produces the output layer name for a fragment assigned to a player.
pub type LayerNamer = Box<dyn Fn(&PlayerId) -> String + Send + Sync>;

/// How fragments on one source layer are renamed once a player is known.
pub struct LayerChangeRule {
    /// Pools this rule applies to. A fragment assigned from another pool
    /// keeps its layer.
    pub accepted_pools: Vec<String>,

    pub new_layer: LayerNamer,

    /// Naming convention for lookahead fragments on this layer. Absent
    /// means lookahead fragments keep their layer untouched.
    pub lookahead_layer: Option<LayerNamer>,
}

/// Blueprint-supplied application rules for one pool.
#[derive(Default)]
pub struct ApplyRules {
    /// Keyed by the fragment's original layer name.
    pub layer_rules: HashMap<String, LayerChangeRule>,

    /// Arbitrary extra per-fragment mutation. Returns whether it changed
    /// the fragment.
    pub custom_apply: Option<Box<dyn Fn(&mut TimelineFragment, &PlayerId) -> bool + Send + Sync>>,
}

/// What happened while applying one pool's assignments.
#[derive(Debug, Default)]
pub struct ApplyOutcome {
    /// Assignments that were actually applied to at least one fragment
    /// group; persisted to seed the next pass.
    pub assignments: PoolAssignments,

    /// Sessions seen on the timeline that the resolver was never told
    /// about. Diagnostic only.
    pub unexpected_sessions: Vec<SessionId>,

    /// Fragments an assignment should have changed but did not.
    pub failed_fragments: Vec<String>,
}

/// Apply one pool's resolved assignments to the timeline fragments, in
/// place.
///
/// Fragments whose session resolves to nothing in the registry are logged
/// and left alone. Sessions absent from the resolver's output fall back to
/// the previous pass's assignment when one exists.
pub fn apply_assignments(
    registry: &mut SessionRegistry,
    pool: &str,
    rules: &ApplyRules,
    fragments: &mut [TimelineFragment],
    resolved: &ResolverOutcome,
    previous: &PoolAssignments,
) -> ApplyOutcome {
    let mut groups: HashMap<SessionId, Vec<usize>> = HashMap::new();
    for (idx, fragment) in fragments.iter().enumerate() {
        let Some(session) = fragment.session_for_pool(pool) else {
            continue;
        };
        let owner = match fragment.piece_id {
            Some(piece_id) => piece_id.to_string(),
            None => fragment.id.clone(),
        };
        let name = compose_session_name(&owner, session);
        match registry.resolve_for_fragment(fragment, &name) {
            Some(id) => groups.entry(id).or_default().push(idx),
            None => {
                tracing::warn!(
                    fragment = %fragment.id,
                    session = %name,
                    "fragment references a session unknown to the registry, leaving it untouched"
                );
            }
        }
    }

    let by_id: HashMap<SessionId, &SessionRequest> =
        resolved.requests.iter().map(|r| (r.id, r)).collect();

    let mut outcome = ApplyOutcome::default();

    // deterministic application order for stable logs
    let mut ordered: Vec<(SessionId, Vec<usize>)> = groups.into_iter().collect();
    ordered.sort_by_key(|(id, _)| *id);

    for (id, group) in ordered {
        let lookup = match by_id.get(&id) {
            Some(&request) => SessionLookup::Resolved(request),
            None => match previous.get(&id) {
                Some(assignment) => SessionLookup::PreviousOnly(assignment),
                None => SessionLookup::Unmatched,
            },
        };

        match lookup {
            SessionLookup::Resolved(request) => {
                let Some(player) = &request.player_id else {
                    // the resolver already reported the failure
                    continue;
                };
                apply_to_group(fragments, &group, pool, player, rules, &mut outcome);
                outcome.assignments.insert(
                    id,
                    SessionAssignment {
                        session_id: id,
                        player_id: player.clone(),
                        lookahead: request.is_lookahead(),
                    },
                );
            }
            SessionLookup::PreviousOnly(assignment) => {
                tracing::warn!(
                    session = %id,
                    player = %assignment.player_id,
                    "timeline session missing from resolver output, re-applying previous assignment"
                );
                outcome.unexpected_sessions.push(id);
                apply_to_group(
                    fragments,
                    &group,
                    pool,
                    &assignment.player_id,
                    rules,
                    &mut outcome,
                );
                outcome.assignments.insert(id, assignment.clone());
            }
            SessionLookup::Unmatched => {
                tracing::warn!(
                    session = %id,
                    "timeline session missing from resolver output with no previous assignment"
                );
                outcome.unexpected_sessions.push(id);
            }
        }
    }

    outcome
}

fn apply_to_group(
    fragments: &mut [TimelineFragment],
    group: &[usize],
    pool: &str,
    player: &PlayerId,
    rules: &ApplyRules,
    outcome: &mut ApplyOutcome,
) {
    for &idx in group {
        let fragment = &mut fragments[idx];
        if !apply_player_to_fragment(fragment, pool, player, rules) {
            tracing::warn!(
                fragment = %fragment.id,
                player = %player,
                "assignment did not change the fragment"
            );
            outcome.failed_fragments.push(fragment.id.clone());
        }
    }
}

/// Returns whether anything on the fragment actually changed.
fn apply_player_to_fragment(
    fragment: &mut TimelineFragment,
    pool: &str,
    player: &PlayerId,
    rules: &ApplyRules,
) -> bool {
    let mut changed = false;

    // keyframes tagged with this pool: enable the matching player's, drop
    // the others
    fragment.keyframes.retain_mut(|keyframe| {
        if !keyframe.pools.iter().any(|p| p == pool) {
            return true;
        }
        if keyframe.for_player == *player {
            if keyframe.disabled {
                keyframe.disabled = false;
                changed = true;
            }
            true
        } else {
            changed = true;
            false
        }
    });

    if let Some(rule) = rules
        .layer_rules
        .get(&fragment.layer)
        .filter(|rule| rule.accepted_pools.iter().any(|p| p == pool))
    {
        let new_layer = if fragment.lookahead {
            rule.lookahead_layer.as_ref().map(|namer| namer(player))
        } else {
            Some((rule.new_layer)(player))
        };
        if let Some(new_layer) = new_layer {
            if new_layer != fragment.layer {
                fragment.layer = new_layer;
                changed = true;
            }
        }
    }

    if let Some(custom) = &rules.custom_apply {
        changed |= custom(fragment, player);
    }

    changed
}

#[cfg(test)]
mod tests {
    use super::*;
    use timeline::range::TimeRange;
    use timeline::types::{Keyframe, SessionContentRef, SessionRef};

    fn sample_fragment(part_instance_id: uuid::Uuid) -> TimelineFragment {
        TimelineFragment {
            id: "frag0".into(),
            layer: "clip".into(),
            priority: 1.0,
            lookahead: false,
            duration: Some(1000),
            sessions: vec![SessionRef::new("players", "main")],
            piece_id: None,
            part_id: None,
            part_instance_id: Some(part_instance_id),
            infinite_instance_id: None,
            keyframes: vec![
                Keyframe {
                    id: "kf1".into(),
                    pools: vec!["players".into()],
                    for_player: PlayerId::Index(1),
                    disabled: true,
                },
                Keyframe {
                    id: "kf2".into(),
                    pools: vec!["players".into()],
                    for_player: PlayerId::Index(2),
                    disabled: true,
                },
            ],
        }
    }

    fn player_layer_rules() -> ApplyRules {
        let mut layer_rules = HashMap::new();
        layer_rules.insert(
            "clip".to_owned(),
            LayerChangeRule {
                accepted_pools: vec!["players".to_owned()],
                new_layer: Box::new(|p| format!("clip_player{p}")),
                lookahead_layer: Some(Box::new(|p| format!("lookahead_player{p}"))),
            },
        );
        ApplyRules {
            layer_rules,
            custom_apply: None,
        }
    }

    fn resolved_request(id: SessionId, player: i64) -> ResolverOutcome {
        ResolverOutcome {
            requests: vec![SessionRequest {
                id,
                range: TimeRange::new(0, 1000),
                optional: false,
                lookahead_rank: None,
                player_id: Some(PlayerId::Index(player)),
            }],
            ..ResolverOutcome::default()
        }
    }

    #[test]
    fn applies_layer_rename_and_keyframe_filter() {
        let part_instance = uuid::Uuid::new_v4();
        let mut registry = SessionRegistry::new();
        let content = SessionContentRef {
            piece_id: uuid::Uuid::new_v4(),
            part_id: uuid::Uuid::new_v4(),
            part_instance_id: Some(part_instance),
            previous_part_instance_id: None,
            infinite_instance_id: None,
        };
        let id = registry.resolve_for_content(&content, "players_main");

        let mut fragments = vec![sample_fragment(part_instance)];
        let outcome = apply_assignments(
            &mut registry,
            "players",
            &player_layer_rules(),
            &mut fragments,
            &resolved_request(id, 2),
            &PoolAssignments::new(),
        );

        assert_eq!(fragments[0].layer, "clip_player2");
        assert_eq!(fragments[0].keyframes.len(), 1);
        assert_eq!(fragments[0].keyframes[0].id, "kf2");
        assert!(!fragments[0].keyframes[0].disabled);
        assert!(outcome.failed_fragments.is_empty());
        assert!(outcome.unexpected_sessions.is_empty());
        assert_eq!(outcome.assignments[&id].player_id, PlayerId::Index(2));
    }

    #[test]
    fn unknown_session_falls_back_to_previous_assignment() {
        let part_instance = uuid::Uuid::new_v4();
        let mut registry = SessionRegistry::new();
        let content = SessionContentRef {
            piece_id: uuid::Uuid::new_v4(),
            part_id: uuid::Uuid::new_v4(),
            part_instance_id: Some(part_instance),
            previous_part_instance_id: None,
            infinite_instance_id: None,
        };
        let id = registry.resolve_for_content(&content, "players_main");

        let mut previous = PoolAssignments::new();
        previous.insert(
            id,
            SessionAssignment {
                session_id: id,
                player_id: PlayerId::Index(1),
                lookahead: false,
            },
        );

        let mut fragments = vec![sample_fragment(part_instance)];
        let outcome = apply_assignments(
            &mut registry,
            "players",
            &player_layer_rules(),
            &mut fragments,
            &ResolverOutcome::default(),
            &previous,
        );

        assert_eq!(fragments[0].layer, "clip_player1");
        assert_eq!(outcome.unexpected_sessions, vec![id]);
        assert_eq!(outcome.assignments[&id].player_id, PlayerId::Index(1));
    }

    #[test]
    fn unassigned_session_leaves_fragments_untouched() {
        let part_instance = uuid::Uuid::new_v4();
        let mut registry = SessionRegistry::new();
        let content = SessionContentRef {
            piece_id: uuid::Uuid::new_v4(),
            part_id: uuid::Uuid::new_v4(),
            part_instance_id: Some(part_instance),
            previous_part_instance_id: None,
            infinite_instance_id: None,
        };
        let id = registry.resolve_for_content(&content, "players_main");

        let mut resolved = resolved_request(id, 1);
        resolved.requests[0].player_id = None;

        let mut fragments = vec![sample_fragment(part_instance)];
        let outcome = apply_assignments(
            &mut registry,
            "players",
            &player_layer_rules(),
            &mut fragments,
            &resolved,
            &PoolAssignments::new(),
        );

        assert_eq!(fragments[0].layer, "clip");
        assert_eq!(fragments[0].keyframes.len(), 2);
        assert!(outcome.assignments.is_empty());
    }
}
