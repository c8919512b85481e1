//! Same-lab consistency enforcement.
//!
//! The authoritative fix for the same-lab rule: every block of one
//! practical session (group, subject, day) must sit in a single lab.
//! Minority blocks are pulled into the majority lab when it is free;
//! otherwise the whole session moves to any lab free for the full window.
//! The pass is idempotent — a second run over a consistent entry set
//! changes nothing.
//!
//! Invoked by the resolver for targeted repairs and once more as a
//! pre-save guard at the end of the pipeline.

use std::collections::HashMap;

use chrono::Weekday;
use tracing::debug;

use timetabler_core::{ScheduleProblem, ScheduledEntry};

use crate::context::AllocationContext;

/// Reassign split practical sessions to a single lab.
///
/// Returns the number of entries whose room changed (0 when already
/// consistent).
pub fn enforce_same_lab(problem: &ScheduleProblem, entries: &mut [ScheduledEntry]) -> usize {
    // Session key -> indexes of its blocks.
    let mut sessions: HashMap<(String, String, Weekday), Vec<usize>> = HashMap::new();
    for (i, e) in entries.iter().enumerate() {
        if let Some(class) = e.as_class() {
            if class.is_practical {
                sessions
                    .entry((class.group.clone(), class.subject.clone(), class.day))
                    .or_default()
                    .push(i);
            }
        }
    }

    // Deterministic processing order.
    let mut keys: Vec<_> = sessions.keys().cloned().collect();
    keys.sort_by(|a, b| {
        (a.0.as_str(), a.1.as_str(), a.2.num_days_from_monday())
            .cmp(&(b.0.as_str(), b.1.as_str(), b.2.num_days_from_monday()))
    });

    let mut changed = 0;
    for key in keys {
        let idxs = &sessions[&key];
        changed += unify_session(problem, entries, idxs);
    }
    changed
}

/// Bring one session onto a single lab; returns entries changed.
fn unify_session(problem: &ScheduleProblem, entries: &mut [ScheduledEntry], idxs: &[usize]) -> usize {
    let mut room_counts: HashMap<String, usize> = HashMap::new();
    for &i in idxs {
        if let Some(class) = entries[i].as_class() {
            *room_counts.entry(class.room.clone()).or_insert(0) += 1;
        }
    }
    if room_counts.len() <= 1 {
        return 0;
    }

    // Majority lab wins; ties break toward the lexicographically smaller
    // name so repeated runs agree.
    let majority = room_counts
        .iter()
        .max_by(|a, b| a.1.cmp(b.1).then_with(|| b.0.cmp(a.0)))
        .map(|(room, _)| room.clone())
        .expect("non-empty session");

    let day = entries[idxs[0]].day();
    let minority: Vec<usize> = idxs
        .iter()
        .copied()
        .filter(|&i| entries[i].room() != Some(majority.as_str()))
        .collect();

    // Occupancy without this session's own blocks.
    let mut ctx = AllocationContext::from_entries(entries);
    for &i in idxs {
        ctx.release(&entries[i]);
    }

    let majority_free = minority
        .iter()
        .chain(idxs.iter().filter(|&&i| entries[i].room() == Some(majority.as_str())))
        .all(|&i| ctx.is_room_free(&majority, day, entries[i].period()));
    if majority_free {
        for &i in &minority {
            if let Some(class) = entries[i].as_class_mut() {
                class.room = majority.clone();
            }
        }
        debug!(lab = %majority, moved = minority.len(), "unified practical session");
        return minority.len();
    }

    // Majority lab blocked at some period: move the whole session into any
    // lab free for the full window.
    let periods: Vec<u8> = idxs.iter().map(|&i| entries[i].period()).collect();
    let mut labs: Vec<&timetabler_core::Classroom> =
        problem.classrooms.iter().filter(|r| r.is_lab).collect();
    labs.sort_by(|a, b| b.capacity.cmp(&a.capacity).then_with(|| a.name.cmp(&b.name)));

    for lab in labs {
        if periods.iter().all(|&p| ctx.is_room_free(&lab.name, day, p)) {
            let mut moved = 0;
            for &i in idxs {
                if let Some(class) = entries[i].as_class_mut() {
                    if class.room != lab.name {
                        class.room = lab.name.clone();
                        moved += 1;
                    }
                }
            }
            debug!(lab = %lab.name, moved, "relocated split practical session");
            return moved;
        }
    }

    // No lab can host the whole session; leave it for the validator.
    0
}

#[cfg(test)]
mod tests {
    use super::*;
    use timetabler_core::{Batch, ClassEntry, Classroom, ScheduleConfig, Subject, Teacher};

    fn problem() -> ScheduleProblem {
        let config = ScheduleConfig::new("Fall 2025").batch(Batch::new("23SW", 3).size(30));
        let mut problem = ScheduleProblem::new(config);
        problem.subjects = vec![Subject::new("SW302", "DB Lab", "23SW").practical()];
        problem.teachers =
            vec![Teacher::new("Aisha Khan", "aisha@uni.edu").teaches("SW302", "23SW")];
        problem.classrooms = vec![
            Classroom::new("LAB-1").capacity(40).lab(),
            Classroom::new("LAB-2").capacity(40).lab(),
            Classroom::new("LAB-3").capacity(40).lab(),
        ];
        problem
    }

    fn block(room: &str, period: u8) -> ScheduledEntry {
        ScheduledEntry::Class(ClassEntry {
            group: "23SW".into(),
            subject: "SW302".into(),
            teacher: "aisha@uni.edu".into(),
            room: room.into(),
            day: Weekday::Mon,
            period,
            is_practical: true,
        })
    }

    #[test]
    fn minority_moves_to_majority() {
        let p = problem();
        let mut entries = vec![block("LAB-1", 1), block("LAB-1", 2), block("LAB-2", 3)];

        let changed = enforce_same_lab(&p, &mut entries);
        assert_eq!(changed, 1);
        assert!(entries.iter().all(|e| e.room() == Some("LAB-1")));
    }

    #[test]
    fn blocked_majority_moves_whole_session() {
        let p = problem();
        let mut entries = vec![
            block("LAB-1", 1),
            block("LAB-1", 2),
            block("LAB-2", 3),
            // Another cohort's class keeps LAB-1 busy at period 3.
            ScheduledEntry::Class(ClassEntry {
                group: "OTHER".into(),
                subject: "X".into(),
                teacher: "x@uni.edu".into(),
                room: "LAB-1".into(),
                day: Weekday::Mon,
                period: 3,
                is_practical: false,
            }),
        ];

        let changed = enforce_same_lab(&p, &mut entries);
        assert!(changed > 0);
        let session_rooms: Vec<_> = entries
            .iter()
            .filter(|e| e.is_practical())
            .filter_map(|e| e.room())
            .collect();
        assert!(session_rooms.windows(2).all(|w| w[0] == w[1]));
        assert_ne!(session_rooms[0], "LAB-1");
    }

    #[test]
    fn consistent_input_is_untouched() {
        let p = problem();
        let mut entries = vec![block("LAB-1", 1), block("LAB-1", 2), block("LAB-1", 3)];
        assert_eq!(enforce_same_lab(&p, &mut entries), 0);
    }

    #[test]
    fn pass_is_idempotent() {
        let p = problem();
        let mut entries = vec![block("LAB-1", 1), block("LAB-2", 2), block("LAB-2", 3)];

        let first = enforce_same_lab(&p, &mut entries);
        assert!(first > 0);
        let snapshot = entries.to_vec();

        let second = enforce_same_lab(&p, &mut entries);
        assert_eq!(second, 0);
        assert_eq!(entries, snapshot.as_slice());
    }

    #[test]
    fn unhostable_session_is_left_alone() {
        let mut p = problem();
        p.classrooms = vec![Classroom::new("LAB-1").capacity(40).lab()];
        let mut entries = vec![
            block("LAB-1", 1),
            block("LAB-9", 2), // references a room that no longer exists
            // LAB-1 is busy at period 2, so the session cannot unify there.
            ScheduledEntry::Class(ClassEntry {
                group: "OTHER".into(),
                subject: "X".into(),
                teacher: "x@uni.edu".into(),
                room: "LAB-1".into(),
                day: Weekday::Mon,
                period: 2,
                is_practical: false,
            }),
        ];

        let snapshot = entries.clone();
        assert_eq!(enforce_same_lab(&p, &mut entries), 0);
        assert_eq!(entries, snapshot);
    }
}
