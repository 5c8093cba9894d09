use std::collections::HashMap;

use crate::model::{EligibleSupervisor, Id, SessionPolicy, Supervisor};

/// Compute the pool of assignable supervisors for a run.
///
/// Excludes inactive and non-staff accounts, anyone outside the requested
/// faculty, and anyone with no remaining capacity under the session cap.
/// The returned ordering is fully deterministic: priority runs sort by
/// priority number, then current count, then name; plain runs sort by
/// current count, then name.
pub fn resolve_eligible(
    session: &SessionPolicy,
    supervisors: Vec<Supervisor>,
    current_counts: &HashMap<Id, i64>,
    priority_enabled: bool,
    faculty_filter: Option<&Id>,
) -> Vec<EligibleSupervisor> {
    let cap = session.supervision_cap();

    let mut pool: Vec<EligibleSupervisor> = supervisors
        .into_iter()
        .filter(|s| s.active && s.is_staff)
        .filter(|s| match faculty_filter {
            Some(faculty) => s.faculty_id.as_ref() == Some(faculty),
            None => true,
        })
        .map(|s| {
            let current = current_counts.get(&s.id).copied().unwrap_or(0);
            EligibleSupervisor {
                remaining_capacity: cap - current,
                current_postings: current,
                supervisor: s,
            }
        })
        .filter(|e| e.remaining_capacity > 0)
        .collect();

    if priority_enabled {
        pool.sort_by(|a, b| {
            a.supervisor
                .priority_number
                .cmp(&b.supervisor.priority_number)
                .then(a.current_postings.cmp(&b.current_postings))
                .then_with(|| a.supervisor.name.cmp(&b.supervisor.name))
        });
    } else {
        pool.sort_by(|a, b| {
            a.current_postings
                .cmp(&b.current_postings)
                .then_with(|| a.supervisor.name.cmp(&b.supervisor.name))
        });
    }

    pool
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::AllowanceRates;

    fn session(cap: Option<i32>, visits: i32) -> SessionPolicy {
        SessionPolicy {
            id: "sess-1".to_string(),
            institution_id: "inst-1".to_string(),
            name: "2024/2025".to_string(),
            max_posting_per_supervisor: cap,
            max_supervision_visits: visits,
            inside_distance_threshold_km: 10.0,
            dsa_enabled: false,
            dsa_min_distance_km: 0.0,
            dsa_max_distance_km: 0.0,
            dsa_percentage: 0.0,
            active: true,
        }
    }

    fn supervisor(id: &str, name: &str, priority: i32) -> Supervisor {
        Supervisor {
            id: id.to_string(),
            institution_id: "inst-1".to_string(),
            faculty_id: None,
            name: name.to_string(),
            priority_number: priority,
            active: true,
            is_staff: true,
            rates: AllowanceRates::default(),
        }
    }

    #[test]
    fn excludes_inactive_non_staff_and_saturated() {
        let mut inactive = supervisor("sup-1", "Abel", 1);
        inactive.active = false;
        let mut non_staff = supervisor("sup-2", "Bola", 1);
        non_staff.is_staff = false;
        let saturated = supervisor("sup-3", "Chidi", 1);
        let available = supervisor("sup-4", "Dayo", 1);

        let counts = HashMap::from([("sup-3".to_string(), 2_i64)]);
        let pool = resolve_eligible(
            &session(Some(2), 3),
            vec![inactive, non_staff, saturated, available],
            &counts,
            false,
            None,
        );

        assert_eq!(pool.len(), 1);
        assert_eq!(pool[0].supervisor.id, "sup-4");
        assert_eq!(pool[0].remaining_capacity, 2);
    }

    #[test]
    fn faculty_filter_narrows_the_pool() {
        let mut in_faculty = supervisor("sup-1", "Abel", 1);
        in_faculty.faculty_id = Some("fac-sci".to_string());
        let mut other_faculty = supervisor("sup-2", "Bola", 1);
        other_faculty.faculty_id = Some("fac-art".to_string());
        let no_faculty = supervisor("sup-3", "Chidi", 1);

        let pool = resolve_eligible(
            &session(Some(3), 3),
            vec![in_faculty, other_faculty, no_faculty],
            &HashMap::new(),
            false,
            Some(&"fac-sci".to_string()),
        );

        assert_eq!(pool.len(), 1);
        assert_eq!(pool[0].supervisor.id, "sup-1");
    }

    #[test]
    fn priority_ordering_is_rank_then_count_then_name() {
        let a = supervisor("sup-a", "Abel", 2);
        let b = supervisor("sup-b", "Bola", 1);
        let c = supervisor("sup-c", "Chidi", 1);
        let counts = HashMap::from([("sup-c".to_string(), 1_i64)]);

        let pool = resolve_eligible(&session(Some(5), 3), vec![a, b, c], &counts, true, None);
        let ids: Vec<_> = pool.iter().map(|e| e.supervisor.id.as_str()).collect();
        // rank 1 before rank 2; within rank 1, lower count first
        assert_eq!(ids, vec!["sup-b", "sup-c", "sup-a"]);
    }

    #[test]
    fn plain_ordering_is_count_then_name() {
        let a = supervisor("sup-a", "Chidi", 9);
        let b = supervisor("sup-b", "Abel", 1);
        let c = supervisor("sup-c", "Bola", 5);
        let counts = HashMap::from([("sup-b".to_string(), 2_i64)]);

        let pool = resolve_eligible(&session(Some(5), 3), vec![a, b, c], &counts, false, None);
        let ids: Vec<_> = pool.iter().map(|e| e.supervisor.id.as_str()).collect();
        // zero-count pair sorts by name (Bola < Chidi), higher count last
        assert_eq!(ids, vec!["sup-c", "sup-a", "sup-b"]);
    }

    #[test]
    fn cap_falls_back_to_visits_then_three() {
        let pool = resolve_eligible(
            &session(None, 4),
            vec![supervisor("sup-1", "Abel", 1)],
            &HashMap::new(),
            false,
            None,
        );
        assert_eq!(pool[0].remaining_capacity, 4);

        let pool = resolve_eligible(
            &session(None, 0),
            vec![supervisor("sup-1", "Abel", 1)],
            &HashMap::new(),
            false,
            None,
        );
        assert_eq!(pool[0].remaining_capacity, 3);
    }
}
