//! The assignment resolver: the scheduling core.
//!
//! Given the pool's ordered players and the pass's session requests, finds
//! a conflict-free assignment that prefers each session's previous player,
//! evicts and re-queues lower-priority occupants when necessary, and
//! reports the sessions an oversubscribed pool cannot accommodate instead
//! of failing the pass.

use timeline::range::Timestamp;
use timeline::types::PlayerId;

use crate::clock::SessionClock;
use crate::types::{ResolverOptions, ResolverOutcome, SchedulingOverflow, SessionRequest};

/// One player's schedule during resolution: indices into the request list,
/// kept sorted by start time.
struct Slot {
    player: PlayerId,
    assigned: Vec<usize>,
}

impl Slot {
    fn insert_sorted(&mut self, requests: &[SessionRequest], idx: usize) {
        let key = (requests[idx].range.start, idx);
        let position = self
            .assigned
            .partition_point(|&i| (requests[i].range.start, i) <= key);
        self.assigned.insert(position, idx);
    }

    fn remove(&mut self, idx: usize) {
        self.assigned.retain(|&i| i != idx);
    }
}

/// Availability of one slot from the point of view of one pending request.
struct SlotView {
    slot: usize,
    /// End of the nearest predecessor finishing at/before the request starts.
    before_end: Option<Timestamp>,
    /// Start of the earliest non-clashing successor.
    after_start: Option<Timestamp>,
    /// Index of the successor when there is exactly one.
    single_after: Option<usize>,
    after_count: usize,
    /// Occupants whose ranges overlap the request.
    clashes: Vec<usize>,
}

fn slot_view(
    slot_idx: usize,
    slot: &Slot,
    requests: &[SessionRequest],
    req_idx: usize,
) -> SlotView {
    let range = requests[req_idx].range;
    let mut view = SlotView {
        slot: slot_idx,
        before_end: None,
        after_start: None,
        single_after: None,
        after_count: 0,
        clashes: Vec::new(),
    };

    for &i in &slot.assigned {
        let other = &requests[i].range;
        if other.overlaps(&range) {
            view.clashes.push(i);
        } else if other.start >= range.start {
            view.after_count += 1;
            if view.after_start.is_none_or(|s| other.start < s) {
                view.after_start = Some(other.start);
            }
            view.single_after = if view.after_count == 1 { Some(i) } else { None };
        } else if let Some(end) = other.end {
            // starts earlier without overlapping, so it ends at/before us
            if view.before_end.is_none_or(|b| end > b) {
                view.before_end = Some(end);
            }
        }
    }

    view
}

/// Idle time between the request's end and the next occupant. No successor
/// means the slot stays free forever from the request's point of view.
fn gap_after(view: &SlotView, request: &SessionRequest) -> i64 {
    match (view.after_start, request.range.end) {
        (None, _) => i64::MAX,
        (Some(after), Some(end)) => after - end,
        // an open-ended request clashes with every successor, so this arm
        // cannot be reached; treat as no room
        (Some(_), None) => 0,
    }
}

/// An occupant may be displaced by an equal-or-higher-priority request:
/// optionals displace optionals, required displaces anything.
fn can_evict(request: &SessionRequest, clash: &SessionRequest) -> bool {
    clash.optional || !request.optional
}

/// Dense packing, for requests that are already current: lookahead on them
/// is moot, so fill slots tightly and keep the future free.
fn choose_dense(
    request: &SessionRequest,
    requests: &[SessionRequest],
    views: &[SlotView],
    clock: &SessionClock,
    options: &ResolverOptions,
) -> Option<(usize, Vec<usize>)> {
    // 1. free slot honoring the ideal gap before us; widest gap after wins
    let mut best: Option<(usize, i64)> = None;
    for view in views.iter().filter(|v| v.clashes.is_empty()) {
        let honors_gap = view
            .before_end
            .is_none_or(|end| end + options.ideal_gap_before_ms <= request.range.start);
        if !honors_gap {
            continue;
        }
        let gap = gap_after(view, request);
        if best.is_none_or(|(_, g)| gap > g) {
            best = Some((view.slot, gap));
        }
    }
    if let Some((slot, _)) = best {
        return Some((slot, Vec::new()));
    }

    // 2. any free slot, widest gap after wins
    let mut best: Option<(usize, i64)> = None;
    for view in views.iter().filter(|v| v.clashes.is_empty()) {
        let gap = gap_after(view, request);
        if best.is_none_or(|(_, g)| gap > g) {
            best = Some((view.slot, gap));
        }
    }
    if let Some((slot, _)) = best {
        return Some((slot, Vec::new()));
    }

    // 3. a clashing slot whose occupants all start after safe-now and may
    //    be displaced
    for view in views.iter().filter(|v| !v.clashes.is_empty()) {
        let evictable = view.clashes.iter().all(|&i| {
            requests[i].range.start >= clock.safe_now() && can_evict(request, &requests[i])
        });
        if evictable {
            return Some((view.slot, view.clashes.clone()));
        }
    }

    None
}

/// Spreading, for future requests: keep slots free-going-forward so there
/// is room to preload lookahead elsewhere.
fn choose_spread(
    request: &SessionRequest,
    requests: &[SessionRequest],
    slots: &[Slot],
    views: &[SlotView],
    options: &ResolverOptions,
) -> Option<(usize, Vec<usize>)> {
    // 1. nothing ahead on the slot; closest to the ideal gap behind wins
    let mut best: Option<(usize, i64)> = None;
    for view in views
        .iter()
        .filter(|v| v.clashes.is_empty() && v.after_count == 0)
    {
        let deviation = match view.before_end {
            Some(end) => (request.range.start - end - options.ideal_gap_before_ms).abs(),
            None => i64::MAX,
        };
        if best.is_none_or(|(_, d)| deviation < d) {
            best = Some((view.slot, deviation));
        }
    }
    if let Some((slot, _)) = best {
        return Some((slot, Vec::new()));
    }

    // 2. a single future occupant that may be displaced
    for view in views
        .iter()
        .filter(|v| v.clashes.is_empty() && v.after_count == 1)
    {
        if let Some(after) = view.single_after {
            if can_evict(request, &requests[after]) {
                return Some((view.slot, vec![after]));
            }
        }
    }

    // 3. a slot free at our start whose clashes all lie ahead and may be
    //    displaced
    for view in views.iter().filter(|v| !v.clashes.is_empty()) {
        let evictable = view.clashes.iter().all(|&i| {
            requests[i].range.start > request.range.start && can_evict(request, &requests[i])
        });
        if evictable {
            return Some((view.slot, view.clashes.clone()));
        }
    }

    // 4. a required request may clear out a slot occupied only by optionals
    if !request.optional {
        for (slot_idx, slot) in slots.iter().enumerate() {
            if !slot.assigned.is_empty() && slot.assigned.iter().all(|&i| requests[i].optional) {
                return Some((slot_idx, slot.assigned.clone()));
            }
        }
    }

    None
}

/// Zero-gap hand-off: a slot whose previous occupant ends exactly when the
/// request starts. Touching ranges never clash, so the slot can be taken
/// without evicting anyone.
fn choose_handoff(request: &SessionRequest, views: &[SlotView]) -> Option<(usize, Vec<usize>)> {
    views
        .iter()
        .find(|v| v.clashes.is_empty() && v.before_end == Some(request.range.start))
        .map(|v| (v.slot, Vec::new()))
}

/// Assign a player to every request the pool can accommodate.
///
/// `requests` come in with `player_id` seeded from the previous pass where
/// one exists; they go out with `player_id` set to the resolved player, or
/// cleared for the sessions listed in the outcome's failure lists. Requests
/// with a `lookahead_rank` never fail and never displace a real assignment.
///
/// Errors only when the eviction cascade exceeds `reassignment_budget`
/// placements, which indicates non-convergence rather than an
/// oversubscribed pool.
pub fn resolve_assignments(
    options: &ResolverOptions,
    players: &[PlayerId],
    mut requests: Vec<SessionRequest>,
    now: Timestamp,
    reassignment_budget: usize,
) -> Result<ResolverOutcome, SchedulingOverflow> {
    let clock = SessionClock::new(now, options);

    // A single-player pool cannot meaningfully conflict: everything plays
    // on the one player there is.
    if let [only] = players {
        for request in &mut requests {
            request.player_id = Some(only.clone());
        }
        return Ok(ResolverOutcome {
            requests,
            ..ResolverOutcome::default()
        });
    }

    let mut slots: Vec<Slot> = players
        .iter()
        .map(|p| Slot {
            player: p.clone(),
            assigned: Vec::new(),
        })
        .collect();

    let mut pending: Vec<usize> = Vec::new();
    let mut lookaheads: Vec<usize> = Vec::new();

    // Seed slots from the previous pass. A seed naming a player that is no
    // longer in the pool is meaningless and goes back to pending.
    for idx in 0..requests.len() {
        if requests[idx].is_lookahead() {
            lookaheads.push(idx);
            continue;
        }
        let seeded_slot = requests[idx]
            .player_id
            .as_ref()
            .and_then(|p| slots.iter().position(|s| &s.player == p));
        match seeded_slot {
            Some(slot) => slots[slot].insert_sorted(&requests, idx),
            None => {
                requests[idx].player_id = None;
                pending.push(idx);
            }
        }
    }

    // Release seeds that carry no stability value: a future request whose
    // predecessor on the player already ended before safe-now, or a seed
    // overlapping an earlier seed on the same player.
    for slot in &mut slots {
        let mut kept: Vec<usize> = Vec::new();
        for &idx in &slot.assigned {
            let overlaps_kept = kept
                .iter()
                .any(|&k| requests[k].range.overlaps(&requests[idx].range));
            let predecessor_end = kept.last().and_then(|&k| requests[k].range.end);
            if overlaps_kept || clock.is_stale(predecessor_end, &requests[idx].range) {
                pending.push(idx);
            } else {
                kept.push(idx);
            }
        }
        slot.assigned = kept;
    }
    for &idx in &pending {
        requests[idx].player_id = None;
    }
    pending.sort_by_key(|&i| requests[i].range.start);

    let mut outcome = ResolverOutcome::default();
    let mut placements = 0usize;

    while !pending.is_empty() {
        let idx = pending.remove(0);
        placements += 1;
        if placements > reassignment_budget {
            return Err(SchedulingOverflow {
                budget: reassignment_budget,
            });
        }

        let views: Vec<SlotView> = slots
            .iter()
            .enumerate()
            .map(|(i, s)| slot_view(i, s, &requests, idx))
            .collect();

        let request = &requests[idx];
        let choice = if clock.is_current(&request.range) {
            choose_dense(request, &requests, &views, &clock, options)
        } else {
            choose_spread(request, &requests, &slots, &views, options)
                .or_else(|| choose_handoff(request, &views))
        };

        match choice {
            Some((slot_idx, evicted)) => {
                for e in evicted {
                    slots[slot_idx].remove(e);
                    requests[e].player_id = None;
                    tracing::debug!(
                        session = %requests[e].id,
                        player = %slots[slot_idx].player,
                        "session evicted, re-queueing"
                    );
                    pending.push(e);
                }
                requests[idx].player_id = Some(slots[slot_idx].player.clone());
                slots[slot_idx].insert_sorted(&requests, idx);
                pending.sort_by_key(|&i| requests[i].range.start);
            }
            None => {
                requests[idx].player_id = None;
                if requests[idx].optional {
                    outcome.failed_optional.push(requests[idx].id);
                } else {
                    outcome.failed_required.push(requests[idx].id);
                }
            }
        }
    }

    assign_lookaheads(&mut requests, lookaheads, &slots, &clock);

    outcome.requests = requests;
    Ok(outcome)
}

/// Hand leftover slot time to the lookahead placeholders, best-ranked
/// first. A placeholder keeps its previous player only when that player is
/// already free before safe-now; placeholders that find no slot stay
/// unassigned.
fn assign_lookaheads(
    requests: &mut [SessionRequest],
    mut lookaheads: Vec<usize>,
    slots: &[Slot],
    clock: &SessionClock,
) {
    // (slot index, earliest time the player is free for a preload)
    let mut free_slots: Vec<(usize, Timestamp)> = Vec::new();
    for (slot_idx, slot) in slots.iter().enumerate() {
        match slot.assigned.last() {
            None => free_slots.push((slot_idx, Timestamp::MIN)),
            Some(&last) => {
                if let Some(end) = requests[last].range.end {
                    free_slots.push((slot_idx, end));
                }
                // an open-ended occupant keeps the player busy indefinitely
            }
        }
    }
    free_slots.sort_by_key(|&(_, free_from)| free_from);

    lookaheads.sort_by_key(|&i| requests[i].lookahead_rank);
    let candidates: Vec<usize> = lookaheads.drain(..lookaheads.len().min(slots.len())).collect();
    for &idx in &lookaheads {
        requests[idx].player_id = None;
    }

    // Sticky pass: honor a placeholder's previous player while it is
    // genuinely free.
    let mut unplaced: Vec<usize> = Vec::new();
    for &idx in &candidates {
        let sticky = match requests[idx].player_id.take() {
            Some(seed) => free_slots.iter().position(|&(s, free_from)| {
                slots[s].player == seed && free_from < clock.safe_now()
            }),
            None => None,
        };
        match sticky {
            Some(pos) => {
                let (slot_idx, _) = free_slots.remove(pos);
                requests[idx].player_id = Some(slots[slot_idx].player.clone());
            }
            None => unplaced.push(idx),
        }
    }

    // Remainder: earliest-free players to the best remaining ranks.
    for (&idx, (slot_idx, _)) in unplaced.iter().zip(free_slots) {
        requests[idx].player_id = Some(slots[slot_idx].player.clone());
    }
}
