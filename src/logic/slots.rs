use std::collections::{HashMap, HashSet};

use crate::model::{Id, MergedGroup, School, SchoolGroup, SessionPolicy, SlotCandidate, SlotKey};

/// Derive the unfilled (school, group, visit) slots for a session.
///
/// Groups flagged as an active merge secondary are never expanded; they
/// receive dependent postings at commit time instead. Slot keys already
/// covered by a non-cancelled posting are dropped, so repeated runs only
/// ever see the remaining demand.
pub fn derive_slots(
    session: &SessionPolicy,
    groups: Vec<SchoolGroup>,
    schools: &HashMap<Id, School>,
    merged: &[MergedGroup],
    existing_keys: &HashSet<SlotKey>,
) -> Vec<SlotCandidate> {
    let secondary_groups: HashSet<(&str, i32)> = merged
        .iter()
        .filter(|m| m.active)
        .map(|m| (m.secondary_school_id.as_str(), m.secondary_group_number))
        .collect();

    let mut slots = Vec::new();
    for group in groups {
        if secondary_groups.contains(&(group.school_id.as_str(), group.group_number)) {
            continue;
        }
        let Some(school) = schools.get(&group.school_id) else {
            log::debug!(
                "skipping group {}/{}: no school record",
                group.school_id,
                group.group_number
            );
            continue;
        };
        for visit in 1..=session.max_supervision_visits {
            let key = SlotKey::new(group.school_id.clone(), group.group_number, visit);
            if existing_keys.contains(&key) {
                continue;
            }
            slots.push(SlotCandidate {
                key,
                distance_km: school.distance_km,
                route_id: school.route_id.clone(),
                lga: school.lga.clone(),
            });
        }
    }

    slots
}

#[cfg(test)]
mod tests {
    use super::*;

    fn session(visits: i32) -> SessionPolicy {
        SessionPolicy {
            id: "sess-1".to_string(),
            institution_id: "inst-1".to_string(),
            name: "2024/2025".to_string(),
            max_posting_per_supervisor: Some(3),
            max_supervision_visits: visits,
            inside_distance_threshold_km: 10.0,
            dsa_enabled: false,
            dsa_min_distance_km: 0.0,
            dsa_max_distance_km: 0.0,
            dsa_percentage: 0.0,
            active: true,
        }
    }

    fn school(id: &str, distance: f64) -> School {
        School {
            id: id.to_string(),
            institution_id: "inst-1".to_string(),
            name: format!("School {id}"),
            distance_km: distance,
            route_id: None,
            lga: None,
        }
    }

    fn group(school_id: &str, number: i32) -> SchoolGroup {
        SchoolGroup {
            school_id: school_id.to_string(),
            group_number: number,
        }
    }

    #[test]
    fn expands_each_group_into_one_slot_per_visit() {
        let schools = HashMap::from([("sch-1".to_string(), school("sch-1", 12.0))]);
        let slots = derive_slots(
            &session(3),
            vec![group("sch-1", 1)],
            &schools,
            &[],
            &HashSet::new(),
        );
        assert_eq!(slots.len(), 3);
        let visits: Vec<_> = slots.iter().map(|s| s.key.visit_number).collect();
        assert_eq!(visits, vec![1, 2, 3]);
        assert!(slots.iter().all(|s| s.distance_km == 12.0));
    }

    #[test]
    fn active_merge_secondaries_are_never_expanded() {
        let schools = HashMap::from([
            ("sch-1".to_string(), school("sch-1", 12.0)),
            ("sch-2".to_string(), school("sch-2", 8.0)),
        ]);
        let merged = vec![MergedGroup {
            id: "mg-1".to_string(),
            session_id: "sess-1".to_string(),
            primary_school_id: "sch-1".to_string(),
            primary_group_number: 1,
            secondary_school_id: "sch-2".to_string(),
            secondary_group_number: 1,
            active: true,
        }];

        let slots = derive_slots(
            &session(2),
            vec![group("sch-1", 1), group("sch-2", 1)],
            &schools,
            &merged,
            &HashSet::new(),
        );
        assert!(slots.iter().all(|s| s.key.school_id == "sch-1"));
        assert_eq!(slots.len(), 2);
    }

    #[test]
    fn inactive_merge_relations_do_not_exclude() {
        let schools = HashMap::from([("sch-2".to_string(), school("sch-2", 8.0))]);
        let merged = vec![MergedGroup {
            id: "mg-1".to_string(),
            session_id: "sess-1".to_string(),
            primary_school_id: "sch-1".to_string(),
            primary_group_number: 1,
            secondary_school_id: "sch-2".to_string(),
            secondary_group_number: 1,
            active: false,
        }];

        let slots = derive_slots(
            &session(1),
            vec![group("sch-2", 1)],
            &schools,
            &merged,
            &HashSet::new(),
        );
        assert_eq!(slots.len(), 1);
    }

    #[test]
    fn already_posted_keys_are_dropped() {
        let schools = HashMap::from([("sch-1".to_string(), school("sch-1", 12.0))]);
        let existing = HashSet::from([SlotKey::new("sch-1", 1, 2)]);

        let slots = derive_slots(
            &session(3),
            vec![group("sch-1", 1)],
            &schools,
            &[],
            &existing,
        );
        let visits: Vec<_> = slots.iter().map(|s| s.key.visit_number).collect();
        assert_eq!(visits, vec![1, 3]);
    }

    #[test]
    fn groups_without_school_records_are_dropped() {
        let slots = derive_slots(
            &session(2),
            vec![group("sch-missing", 1)],
            &HashMap::new(),
            &[],
            &HashSet::new(),
        );
        assert!(slots.is_empty());
    }
}
