use session::model::{PoolAssignments, SessionAssignment};
use session::registry::SessionRegistry;
use timeline::range::TimeRange;
use timeline::types::{
    PlayerId, PoolConfig, SessionContentRef, SessionRef, TimedPiece, TimelineFragment,
};
use uuid::Uuid;

use scheduler::ranges::calculate_session_requests;

fn players_pool() -> PoolConfig {
    PoolConfig::new("players", vec![PlayerId::Index(1), PlayerId::Index(2)])
}

fn content(part_instance: Uuid) -> SessionContentRef {
    SessionContentRef {
        piece_id: Uuid::new_v4(),
        part_id: Uuid::new_v4(),
        part_instance_id: Some(part_instance),
        previous_part_instance_id: None,
        infinite_instance_id: None,
    }
}

fn piece(content: SessionContentRef, range: TimeRange, session: SessionRef) -> TimedPiece {
    TimedPiece {
        content,
        range,
        sessions: vec![session],
        source_layer: "source".into(),
        insertion_seq: 0,
        clears_layer: false,
    }
}

fn lookahead_fragment(id: &str, part_id: Uuid, priority: f64) -> TimelineFragment {
    TimelineFragment {
        id: id.into(),
        layer: "clip".into(),
        priority,
        lookahead: true,
        duration: None,
        sessions: vec![SessionRef::new("players", "main")],
        piece_id: None,
        part_id: Some(part_id),
        part_instance_id: None,
        infinite_instance_id: None,
        keyframes: Vec::new(),
    }
}

#[test]
fn pieces_sharing_a_session_merge_into_one_widened_request() {
    let mut registry = SessionRegistry::new();
    registry.begin_pass();
    let part_instance = Uuid::new_v4();

    let pieces = vec![
        piece(
            content(part_instance),
            TimeRange::new(0, 6000),
            SessionRef::new("players", "abc"),
        ),
        piece(
            content(part_instance),
            TimeRange::new(0, 500),
            SessionRef::new("players", "abc").optional(),
        ),
    ];

    let requests = calculate_session_requests(
        &mut registry,
        &players_pool(),
        &pieces,
        &[],
        &PoolAssignments::new(),
    );

    assert_eq!(requests.len(), 1);
    assert_eq!(requests[0].range, TimeRange::new(0, 6000));
    // only optional if every contributing piece says so
    assert!(!requests[0].optional);
}

#[test]
fn only_the_newest_clear_variant_reaches_the_resolver() {
    let mut registry = SessionRegistry::new();
    registry.begin_pass();
    let part_instance = Uuid::new_v4();

    let mut stale = piece(
        content(part_instance),
        TimeRange::new(0, 1000),
        SessionRef::new("players", "clear"),
    );
    stale.clears_layer = true;
    stale.insertion_seq = 1;
    let mut fresh = piece(
        content(part_instance),
        TimeRange::new(2000, 3000),
        SessionRef::new("players", "clear"),
    );
    fresh.clears_layer = true;
    fresh.insertion_seq = 2;

    let requests = calculate_session_requests(
        &mut registry,
        &players_pool(),
        &[stale, fresh],
        &[],
        &PoolAssignments::new(),
    );

    assert_eq!(requests.len(), 1);
    // the stale variant was dropped before widening could happen
    assert_eq!(requests[0].range, TimeRange::new(2000, 3000));
}

#[test]
fn requests_are_seeded_from_the_previous_assignments() {
    let mut registry = SessionRegistry::new();
    registry.begin_pass();
    let part_instance = Uuid::new_v4();
    let owner = content(part_instance);

    let id = registry.resolve_for_content(&owner, "players_abc");
    let mut previous = PoolAssignments::new();
    previous.insert(
        id,
        SessionAssignment {
            session_id: id,
            player_id: PlayerId::Index(2),
            lookahead: false,
        },
    );

    let pieces = vec![piece(
        owner,
        TimeRange::new(0, 1000),
        SessionRef::new("players", "abc"),
    )];
    let requests =
        calculate_session_requests(&mut registry, &players_pool(), &pieces, &[], &previous);

    assert_eq!(requests.len(), 1);
    assert_eq!(requests[0].id, id);
    assert_eq!(requests[0].player_id, Some(PlayerId::Index(2)));
}

#[test]
fn exclusive_sessions_do_not_merge_across_pieces() {
    let mut registry = SessionRegistry::new();
    registry.begin_pass();

    let pieces = vec![
        piece(
            content(Uuid::new_v4()),
            TimeRange::new(0, 1000),
            SessionRef::new("players", "x").exclusive(),
        ),
        piece(
            content(Uuid::new_v4()),
            TimeRange::new(0, 1000),
            SessionRef::new("players", "x").exclusive(),
        ),
    ];

    let requests = calculate_session_requests(
        &mut registry,
        &players_pool(),
        &pieces,
        &[],
        &PoolAssignments::new(),
    );

    assert_eq!(requests.len(), 2);
    assert_ne!(requests[0].id, requests[1].id);
}

#[test]
fn lookahead_groups_are_ranked_by_descending_priority() {
    let mut registry = SessionRegistry::new();
    registry.begin_pass();

    let low_part = Uuid::new_v4();
    let high_part = Uuid::new_v4();
    let fragments = vec![
        lookahead_fragment("low", low_part, 1.0),
        lookahead_fragment("high", high_part, 5.0),
    ];

    let requests = calculate_session_requests(
        &mut registry,
        &players_pool(),
        &[],
        &fragments,
        &PoolAssignments::new(),
    );

    assert_eq!(requests.len(), 2);
    let high = requests
        .iter()
        .find(|r| registry.get(r.id).and_then(|i| i.lookahead_for_part_id) == Some(high_part))
        .unwrap();
    let low = requests
        .iter()
        .find(|r| registry.get(r.id).and_then(|i| i.lookahead_for_part_id) == Some(low_part))
        .unwrap();
    assert_eq!(high.lookahead_rank, Some(1));
    assert_eq!(low.lookahead_rank, Some(2));
}

#[test]
fn a_real_request_supersedes_its_own_lookahead_placeholder() {
    let mut registry = SessionRegistry::new();
    registry.begin_pass();

    let part_id = Uuid::new_v4();
    let part_instance = Uuid::new_v4();
    let mut owner = content(part_instance);
    owner.part_id = part_id;

    // the placeholder exists from an earlier pass and gets promoted when
    // the real piece shows up
    let placeholder_id = registry
        .resolve_for_fragment(&lookahead_fragment("spec", part_id, 1.0), "players_main")
        .unwrap();

    let pieces = vec![piece(
        owner,
        TimeRange::new(0, 1000),
        SessionRef::new("players", "main"),
    )];
    // once rendered, the lookahead fragment knows its part instance and
    // resolves to the promoted identity
    let mut fragment = lookahead_fragment("spec", part_id, 1.0);
    fragment.part_instance_id = Some(part_instance);
    let fragments = vec![fragment];

    let requests = calculate_session_requests(
        &mut registry,
        &players_pool(),
        &pieces,
        &fragments,
        &PoolAssignments::new(),
    );

    assert_eq!(requests.len(), 1);
    assert_eq!(requests[0].id, placeholder_id);
    assert_eq!(requests[0].lookahead_rank, None);
    assert_eq!(requests[0].range, TimeRange::new(0, 1000));
}
