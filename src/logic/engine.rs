use std::cmp::Ordering;
use std::collections::{BTreeMap, HashSet};

use crate::error::{PostingError, Result};
use crate::model::{
    Assignment, AssignmentRun, AssignmentStats, EligibleSupervisor, PostingType, SlotCandidate,
    SlotKey,
};

/// Deterministic capacity-aware round-robin assignment.
///
/// Pure and synchronous: safe to call repeatedly for previews with no
/// side effects. `number_of_postings` is the highest visit number to
/// include, not a total-posting cap; pre-existing posting counts are
/// already folded into each supervisor's `remaining_capacity`.
pub fn run_assignment(
    pool: &[EligibleSupervisor],
    mut slots: Vec<SlotCandidate>,
    number_of_postings: i32,
    posting_type: PostingType,
    priority_enabled: bool,
) -> Result<AssignmentRun> {
    // Step 1: restrict to the requested visit rounds.
    slots.retain(|s| s.key.visit_number <= number_of_postings);

    // Step 2: visit number is always the primary key, so every site gets
    // one round of coverage before any site gets a second. The posting
    // type and priority flag only break ties within a round.
    slots.sort_by(|a, b| {
        a.key
            .visit_number
            .cmp(&b.key.visit_number)
            .then_with(|| match posting_type {
                PostingType::RouteBased => cmp_optional(&a.route_id, &b.route_id),
                PostingType::LgaBased => cmp_optional(&a.lga, &b.lga),
                PostingType::Random => Ordering::Equal,
            })
            .then_with(|| {
                if priority_enabled {
                    b.distance_km.total_cmp(&a.distance_km)
                } else {
                    Ordering::Equal
                }
            })
            .then_with(|| a.key.school_id.cmp(&b.key.school_id))
            .then_with(|| a.key.group_number.cmp(&b.key.group_number))
    });

    // Step 3: stable sort keeps the resolver's name tie-break intact.
    let mut order: Vec<usize> = (0..pool.len()).collect();
    if priority_enabled {
        order.sort_by_key(|&i| (pool[i].supervisor.priority_number, pool[i].current_postings));
    } else {
        order.sort_by_key(|&i| pool[i].current_postings);
    }

    // Step 4: round-robin with a circular cursor. The cursor advances by
    // exactly one position per slot whether or not the supervisor under it
    // had capacity; rotation must stay meaningful once some supervisors
    // saturate.
    let mut run_counts = vec![0_i64; pool.len()];
    let mut cursor = 0_usize;
    let mut assignments: Vec<Assignment> = Vec::new();
    let mut unassigned: Vec<SlotKey> = Vec::new();
    let mut capacity_warnings: Vec<String> = Vec::new();

    for slot in slots.iter() {
        let mut chosen = None;
        if !order.is_empty() {
            for step in 0..order.len() {
                let idx = order[(cursor + step) % order.len()];
                if run_counts[idx] < pool[idx].remaining_capacity {
                    chosen = Some(idx);
                    break;
                }
            }
            cursor = (cursor + 1) % order.len();
        }

        match chosen {
            Some(idx) => {
                run_counts[idx] += 1;
                assignments.push(Assignment {
                    supervisor_id: pool[idx].supervisor.id.clone(),
                    slot: slot.clone(),
                });
            }
            None => {
                capacity_warnings.push(format!(
                    "no supervisor capacity left for slot {}",
                    slot.key
                ));
                unassigned.push(slot.key.clone());
            }
        }
    }

    // Step 5: duplicate slot keys in the output mean the sort or cursor is
    // broken; fail loudly rather than persist a double booking.
    let mut seen: HashSet<&SlotKey> = HashSet::new();
    for assignment in &assignments {
        if !seen.insert(&assignment.slot.key) {
            return Err(PostingError::EngineInvariant(format!(
                "duplicate assignment emitted for slot {}",
                assignment.slot.key
            )));
        }
    }

    let mut warnings = Vec::new();
    if pool.is_empty() && !slots.is_empty() {
        warnings.push("no eligible supervisors with remaining capacity".to_string());
    }
    if !capacity_warnings.is_empty() {
        let idle_supervisors = run_counts.iter().filter(|&&c| c == 0).count();
        if idle_supervisors > 0 && !pool.is_empty() {
            // Slots went unassigned while some supervisors got nothing at
            // all; keep the per-slot detail so the imbalance is visible.
            warnings.extend(capacity_warnings);
        } else {
            warnings.push(format!(
                "supervisor capacity exhausted: {} slot(s) left unassigned",
                capacity_warnings.len()
            ));
        }
    }

    let stats = compute_stats(pool, &assignments, &run_counts, slots.len());
    log::debug!(
        "assignment run: {} slots, {} assigned, {} unassigned, {} warnings",
        slots.len(),
        assignments.len(),
        unassigned.len(),
        warnings.len()
    );

    Ok(AssignmentRun {
        assignments,
        unassigned,
        warnings,
        stats,
    })
}

// None sorts after any present value so unrouted schools trail their
// routed peers within a visit round.
fn cmp_optional(a: &Option<String>, b: &Option<String>) -> Ordering {
    match (a, b) {
        (Some(a), Some(b)) => a.cmp(b),
        (Some(_), None) => Ordering::Less,
        (None, Some(_)) => Ordering::Greater,
        (None, None) => Ordering::Equal,
    }
}

fn compute_stats(
    pool: &[EligibleSupervisor],
    assignments: &[Assignment],
    run_counts: &[i64],
    total_slots: usize,
) -> AssignmentStats {
    let mut by_visit: BTreeMap<i32, usize> = BTreeMap::new();
    let mut by_supervisor: BTreeMap<String, usize> = BTreeMap::new();
    let mut by_school: BTreeMap<String, usize> = BTreeMap::new();

    for assignment in assignments {
        *by_visit.entry(assignment.slot.key.visit_number).or_default() += 1;
        *by_supervisor
            .entry(assignment.supervisor_id.clone())
            .or_default() += 1;
        *by_school
            .entry(assignment.slot.key.school_id.clone())
            .or_default() += 1;
    }

    let with_assignments = run_counts.iter().filter(|&&c| c > 0).count();
    let min_per_supervisor = run_counts.iter().copied().min().unwrap_or(0) as usize;
    let max_per_supervisor = run_counts.iter().copied().max().unwrap_or(0) as usize;
    let avg_per_supervisor = if pool.is_empty() {
        0.0
    } else {
        assignments.len() as f64 / pool.len() as f64
    };

    AssignmentStats {
        total_slots,
        assigned: assignments.len(),
        unassigned: total_slots - assignments.len(),
        by_visit,
        by_supervisor,
        by_school,
        min_per_supervisor,
        max_per_supervisor,
        avg_per_supervisor,
        supervisors_with_assignments: with_assignments,
        supervisors_without_assignments: pool.len() - with_assignments,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{AllowanceRates, Supervisor};

    fn eligible(id: &str, name: &str, priority: i32, current: i64, remaining: i64) -> EligibleSupervisor {
        EligibleSupervisor {
            supervisor: Supervisor {
                id: id.to_string(),
                institution_id: "inst-1".to_string(),
                faculty_id: None,
                name: name.to_string(),
                priority_number: priority,
                active: true,
                is_staff: true,
                rates: AllowanceRates::default(),
            },
            current_postings: current,
            remaining_capacity: remaining,
        }
    }

    fn slot(school: &str, group: i32, visit: i32, distance: f64) -> SlotCandidate {
        SlotCandidate {
            key: SlotKey::new(school, group, visit),
            distance_km: distance,
            route_id: None,
            lga: None,
        }
    }

    fn routed(school: &str, visit: i32, route: &str) -> SlotCandidate {
        SlotCandidate {
            key: SlotKey::new(school, 1, visit),
            distance_km: 10.0,
            route_id: Some(route.to_string()),
            lga: None,
        }
    }

    #[test]
    fn enough_capacity_assigns_every_slot_without_warnings() {
        // Scenario: cap 2, three fresh supervisors, five visit-1 slots.
        let pool = vec![
            eligible("sup-a", "Abel", 1, 0, 2),
            eligible("sup-b", "Bola", 1, 0, 2),
            eligible("sup-c", "Chidi", 1, 0, 2),
        ];
        let slots = (1..=5).map(|i| slot(&format!("sch-{i}"), 1, 1, 5.0)).collect();

        let run = run_assignment(&pool, slots, 1, PostingType::Random, false).unwrap();
        assert_eq!(run.assignments.len(), 5);
        assert!(run.unassigned.is_empty());
        assert!(run.warnings.is_empty());
        // Round-robin over three supervisors: 2 / 2 / 1.
        let counts: Vec<_> = run.stats.by_supervisor.values().copied().collect();
        assert_eq!(counts, vec![2, 2, 1]);
    }

    #[test]
    fn visit_one_always_precedes_visit_two() {
        let pool = vec![eligible("sup-a", "Abel", 1, 0, 10)];
        let slots = vec![
            slot("sch-1", 1, 2, 5.0),
            slot("sch-2", 1, 1, 5.0),
            slot("sch-1", 1, 1, 5.0),
            slot("sch-2", 1, 2, 5.0),
        ];

        let run = run_assignment(&pool, slots, 2, PostingType::Random, false).unwrap();
        let visits: Vec<_> = run
            .assignments
            .iter()
            .map(|a| a.slot.key.visit_number)
            .collect();
        assert_eq!(visits, vec![1, 1, 2, 2]);
    }

    #[test]
    fn visit_filter_drops_later_rounds() {
        let pool = vec![eligible("sup-a", "Abel", 1, 0, 10)];
        let slots = vec![
            slot("sch-1", 1, 1, 5.0),
            slot("sch-1", 1, 2, 5.0),
            slot("sch-1", 1, 3, 5.0),
        ];

        let run = run_assignment(&pool, slots, 2, PostingType::Random, false).unwrap();
        assert_eq!(run.assignments.len(), 2);
        assert!(run
            .assignments
            .iter()
            .all(|a| a.slot.key.visit_number <= 2));
    }

    #[test]
    fn cursor_advances_even_when_the_supervisor_under_it_is_saturated() {
        // A has one unit of capacity; the cursor must still pass over A on
        // its turn rather than parking on the next free supervisor. An
        // "advance only on success" variant would end B=2, C=2 here.
        let pool = vec![
            eligible("sup-a", "Abel", 1, 0, 1),
            eligible("sup-b", "Bola", 1, 0, 5),
            eligible("sup-c", "Chidi", 1, 0, 5),
        ];
        let slots = (1..=5).map(|i| slot(&format!("sch-{i}"), 1, 1, 5.0)).collect();

        let run = run_assignment(&pool, slots, 1, PostingType::Random, false).unwrap();
        assert_eq!(run.stats.by_supervisor["sup-a"], 1);
        assert_eq!(run.stats.by_supervisor["sup-b"], 3);
        assert_eq!(run.stats.by_supervisor["sup-c"], 1);
    }

    #[test]
    fn route_based_groups_by_route_within_a_visit() {
        let pool = vec![eligible("sup-a", "Abel", 1, 0, 10)];
        let slots = vec![
            routed("sch-1", 1, "route-b"),
            routed("sch-2", 1, "route-a"),
            routed("sch-3", 1, "route-a"),
        ];

        let run = run_assignment(&pool, slots, 1, PostingType::RouteBased, false).unwrap();
        let schools: Vec<_> = run
            .assignments
            .iter()
            .map(|a| a.slot.key.school_id.as_str())
            .collect();
        assert_eq!(schools, vec!["sch-2", "sch-3", "sch-1"]);
    }

    #[test]
    fn unrouted_slots_trail_routed_ones() {
        let pool = vec![eligible("sup-a", "Abel", 1, 0, 10)];
        let slots = vec![slot("sch-0", 1, 1, 10.0), routed("sch-9", 1, "route-a")];

        let run = run_assignment(&pool, slots, 1, PostingType::RouteBased, false).unwrap();
        assert_eq!(run.assignments[0].slot.key.school_id, "sch-9");
    }

    #[test]
    fn priority_sorts_farther_schools_first_within_a_visit() {
        let pool = vec![eligible("sup-a", "Abel", 1, 0, 10)];
        let slots = vec![
            slot("sch-near", 1, 1, 3.0),
            slot("sch-far", 1, 1, 42.0),
            slot("sch-mid", 1, 1, 17.0),
        ];

        let run = run_assignment(&pool, slots, 1, PostingType::Random, true).unwrap();
        let schools: Vec<_> = run
            .assignments
            .iter()
            .map(|a| a.slot.key.school_id.as_str())
            .collect();
        assert_eq!(schools, vec!["sch-far", "sch-mid", "sch-near"]);
    }

    #[test]
    fn priority_ranks_supervisors_by_priority_number() {
        let pool = vec![
            eligible("sup-low", "Abel", 9, 0, 5),
            eligible("sup-high", "Bola", 1, 0, 5),
        ];
        let slots = vec![slot("sch-1", 1, 1, 5.0)];

        let run = run_assignment(&pool, slots, 1, PostingType::Random, true).unwrap();
        assert_eq!(run.assignments[0].supervisor_id, "sup-high");
    }

    #[test]
    fn overflow_with_everyone_served_collapses_to_one_warning() {
        let pool = vec![eligible("sup-a", "Abel", 1, 0, 1)];
        let slots = (1..=4).map(|i| slot(&format!("sch-{i}"), 1, 1, 5.0)).collect();

        let run = run_assignment(&pool, slots, 1, PostingType::Random, false).unwrap();
        assert_eq!(run.assignments.len(), 1);
        assert_eq!(run.unassigned.len(), 3);
        assert_eq!(run.warnings.len(), 1);
        assert!(run.warnings[0].contains("3 slot(s)"));
    }

    #[test]
    fn overflow_with_an_idle_supervisor_keeps_per_slot_detail() {
        // B contributes nothing, so the per-slot warnings stay visible as
        // a distribution-fairness signal.
        let pool = vec![
            eligible("sup-a", "Abel", 1, 0, 1),
            eligible("sup-b", "Bola", 1, 0, 0),
        ];
        let slots = (1..=3).map(|i| slot(&format!("sch-{i}"), 1, 1, 5.0)).collect();

        let run = run_assignment(&pool, slots, 1, PostingType::Random, false).unwrap();
        assert_eq!(run.assignments.len(), 1);
        assert_eq!(run.unassigned.len(), 2);
        assert_eq!(run.warnings.len(), 2);
        assert!(run.warnings.iter().all(|w| w.contains("sch-")));
    }

    #[test]
    fn empty_pool_leaves_everything_unassigned() {
        let slots = vec![slot("sch-1", 1, 1, 5.0), slot("sch-2", 1, 1, 5.0)];
        let run = run_assignment(&[], slots, 1, PostingType::Random, false).unwrap();
        assert!(run.assignments.is_empty());
        assert_eq!(run.unassigned.len(), 2);
        assert!(run
            .warnings
            .iter()
            .any(|w| w.contains("no eligible supervisors")));
    }

    #[test]
    fn duplicate_input_slots_trip_the_self_check() {
        let pool = vec![eligible("sup-a", "Abel", 1, 0, 10)];
        let slots = vec![slot("sch-1", 1, 1, 5.0), slot("sch-1", 1, 1, 5.0)];

        let err = run_assignment(&pool, slots, 1, PostingType::Random, false).unwrap_err();
        assert!(matches!(err, PostingError::EngineInvariant(_)));
    }

    #[test]
    fn assignment_counts_never_exceed_remaining_capacity() {
        let pool = vec![
            eligible("sup-a", "Abel", 1, 2, 1),
            eligible("sup-b", "Bola", 1, 0, 2),
        ];
        let slots = (1..=6).map(|i| slot(&format!("sch-{i}"), 1, 1, 5.0)).collect();

        let run = run_assignment(&pool, slots, 1, PostingType::Random, false).unwrap();
        assert!(run.stats.by_supervisor.get("sup-a").copied().unwrap_or(0) <= 1);
        assert!(run.stats.by_supervisor.get("sup-b").copied().unwrap_or(0) <= 2);
        assert_eq!(run.assignments.len(), 3);
    }

    #[test]
    fn stats_cover_visits_supervisors_and_schools() {
        let pool = vec![
            eligible("sup-a", "Abel", 1, 0, 4),
            eligible("sup-b", "Bola", 1, 0, 4),
        ];
        let slots = vec![
            slot("sch-1", 1, 1, 5.0),
            slot("sch-2", 1, 1, 5.0),
            slot("sch-1", 1, 2, 5.0),
        ];

        let run = run_assignment(&pool, slots, 2, PostingType::Random, false).unwrap();
        assert_eq!(run.stats.total_slots, 3);
        assert_eq!(run.stats.assigned, 3);
        assert_eq!(run.stats.by_visit[&1], 2);
        assert_eq!(run.stats.by_visit[&2], 1);
        assert_eq!(run.stats.by_school["sch-1"], 2);
        assert_eq!(run.stats.supervisors_with_assignments, 2);
        assert_eq!(run.stats.supervisors_without_assignments, 0);
        assert_eq!(run.stats.min_per_supervisor, 1);
        assert_eq!(run.stats.max_per_supervisor, 2);
        assert!((run.stats.avg_per_supervisor - 1.5).abs() < f64::EPSILON);
    }
}
