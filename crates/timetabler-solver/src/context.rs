//! Allocation context: occupancy bookkeeping for one scheduling run.
//!
//! The context is owned by the caller and threaded through generator,
//! allocator and resolver by reference. It is never process-global, so
//! several runs can execute side by side in isolated contexts.
//!
//! Internally it is a set of hash indexes keyed by (entity, day, period),
//! built once per pass and updated incrementally — conflict probes are
//! O(1) instead of rescanning the entry list.

use std::collections::{HashMap, HashSet};

use chrono::Weekday;
use timetabler_core::{GroupCode, RoomId, ScheduledEntry, SubjectCode, TeacherId};

/// Occupancy index over an entry set.
#[derive(Clone, Debug, Default)]
pub struct AllocationContext {
    room_busy: HashSet<(RoomId, Weekday, u8)>,
    teacher_busy: HashSet<(TeacherId, Weekday, u8)>,
    group_busy: HashSet<(GroupCode, Weekday, u8)>,
    /// Classes a teacher already holds on a day.
    teacher_daily: HashMap<(TeacherId, Weekday), u8>,
    /// Lab chosen for a practical session, with a live entry count so the
    /// memo disappears once the whole session is released.
    lab_sessions: HashMap<(GroupCode, SubjectCode, Weekday), (RoomId, u8)>,
}

impl AllocationContext {
    pub fn new() -> Self {
        Self::default()
    }

    /// Index an existing entry set.
    pub fn from_entries(entries: &[ScheduledEntry]) -> Self {
        let mut ctx = Self::new();
        for entry in entries {
            ctx.occupy(entry);
        }
        ctx
    }

    /// Record an entry's resource usage.
    pub fn occupy(&mut self, entry: &ScheduledEntry) {
        let day = entry.day();
        let period = entry.period();
        self.group_busy
            .insert((entry.group().to_string(), day, period));

        let Some(class) = entry.as_class() else {
            return; // thesis placeholders only block the group
        };
        self.room_busy.insert((class.room.clone(), day, period));
        self.teacher_busy
            .insert((class.teacher.clone(), day, period));
        *self
            .teacher_daily
            .entry((class.teacher.clone(), day))
            .or_insert(0) += 1;

        if class.is_practical {
            let key = (class.group.clone(), class.subject.clone(), day);
            let slot = self
                .lab_sessions
                .entry(key)
                .or_insert_with(|| (class.room.clone(), 0));
            slot.1 += 1;
        }
    }

    /// Release an entry's resource usage (inverse of [`Self::occupy`]).
    pub fn release(&mut self, entry: &ScheduledEntry) {
        let day = entry.day();
        let period = entry.period();
        self.group_busy
            .remove(&(entry.group().to_string(), day, period));

        let Some(class) = entry.as_class() else {
            return;
        };
        self.room_busy.remove(&(class.room.clone(), day, period));
        self.teacher_busy
            .remove(&(class.teacher.clone(), day, period));
        if let Some(count) = self.teacher_daily.get_mut(&(class.teacher.clone(), day)) {
            *count = count.saturating_sub(1);
            if *count == 0 {
                self.teacher_daily.remove(&(class.teacher.clone(), day));
            }
        }

        if class.is_practical {
            let key = (class.group.clone(), class.subject.clone(), day);
            if let Some((_, count)) = self.lab_sessions.get_mut(&key) {
                *count = count.saturating_sub(1);
                if *count == 0 {
                    self.lab_sessions.remove(&key);
                }
            }
        }
    }

    pub fn is_room_free(&self, room: &str, day: Weekday, period: u8) -> bool {
        !self.room_busy.contains(&(room.to_string(), day, period))
    }

    pub fn is_teacher_free(&self, teacher: &str, day: Weekday, period: u8) -> bool {
        !self
            .teacher_busy
            .contains(&(teacher.to_string(), day, period))
    }

    pub fn is_group_free(&self, group: &str, day: Weekday, period: u8) -> bool {
        !self.group_busy.contains(&(group.to_string(), day, period))
    }

    /// Classes the teacher already holds on the day.
    pub fn teacher_load(&self, teacher: &str, day: Weekday) -> u8 {
        self.teacher_daily
            .get(&(teacher.to_string(), day))
            .copied()
            .unwrap_or(0)
    }

    /// Lab already recorded for a practical session, if any.
    pub fn session_lab(&self, group: &str, subject: &str, day: Weekday) -> Option<&str> {
        self.lab_sessions
            .get(&(group.to_string(), subject.to_string(), day))
            .map(|(room, _)| room.as_str())
    }

    /// Periods the group has occupied on a day, ascending.
    pub fn group_periods(&self, group: &str, day: Weekday, periods_per_day: u8) -> Vec<u8> {
        (1..=periods_per_day)
            .filter(|p| !self.is_group_free(group, day, *p))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use timetabler_core::{ClassEntry, ThesisEntry};

    fn class(group: &str, subject: &str, day: Weekday, period: u8, practical: bool) -> ScheduledEntry {
        ScheduledEntry::Class(ClassEntry {
            group: group.into(),
            subject: subject.into(),
            teacher: "t@uni.edu".into(),
            room: if practical { "LAB-1".into() } else { "CR-1".into() },
            day,
            period,
            is_practical: practical,
        })
    }

    #[test]
    fn occupy_and_release_round_trip() {
        let mut ctx = AllocationContext::new();
        let entry = class("21SW", "SW415", Weekday::Mon, 2, false);

        ctx.occupy(&entry);
        assert!(!ctx.is_room_free("CR-1", Weekday::Mon, 2));
        assert!(!ctx.is_teacher_free("t@uni.edu", Weekday::Mon, 2));
        assert!(!ctx.is_group_free("21SW", Weekday::Mon, 2));
        assert_eq!(ctx.teacher_load("t@uni.edu", Weekday::Mon), 1);

        ctx.release(&entry);
        assert!(ctx.is_room_free("CR-1", Weekday::Mon, 2));
        assert!(ctx.is_teacher_free("t@uni.edu", Weekday::Mon, 2));
        assert!(ctx.is_group_free("21SW", Weekday::Mon, 2));
        assert_eq!(ctx.teacher_load("t@uni.edu", Weekday::Mon), 0);
    }

    #[test]
    fn thesis_blocks_group_only() {
        let mut ctx = AllocationContext::new();
        ctx.occupy(&ScheduledEntry::Thesis(ThesisEntry {
            group: "21SW".into(),
            day: Weekday::Wed,
            period: 1,
        }));

        assert!(!ctx.is_group_free("21SW", Weekday::Wed, 1));
        assert!(ctx.is_teacher_free("t@uni.edu", Weekday::Wed, 1));
        assert!(ctx.is_room_free("CR-1", Weekday::Wed, 1));
    }

    #[test]
    fn lab_memo_survives_partial_release() {
        let mut ctx = AllocationContext::new();
        let block: Vec<_> = (3..=5)
            .map(|p| class("21SW", "SW416", Weekday::Tue, p, true))
            .collect();
        for e in &block {
            ctx.occupy(e);
        }
        assert_eq!(ctx.session_lab("21SW", "SW416", Weekday::Tue), Some("LAB-1"));

        ctx.release(&block[0]);
        assert_eq!(ctx.session_lab("21SW", "SW416", Weekday::Tue), Some("LAB-1"));

        ctx.release(&block[1]);
        ctx.release(&block[2]);
        assert_eq!(ctx.session_lab("21SW", "SW416", Weekday::Tue), None);
    }

    #[test]
    fn from_entries_matches_incremental() {
        let entries = vec![
            class("21SW", "SW415", Weekday::Mon, 1, false),
            class("21SW", "SW416", Weekday::Tue, 3, true),
        ];
        let ctx = AllocationContext::from_entries(&entries);

        assert!(!ctx.is_group_free("21SW", Weekday::Mon, 1));
        assert!(!ctx.is_room_free("LAB-1", Weekday::Tue, 3));
        assert_eq!(ctx.session_lab("21SW", "SW416", Weekday::Tue), Some("LAB-1"));
    }

    #[test]
    fn group_periods_are_sorted() {
        let entries = vec![
            class("21SW", "A", Weekday::Mon, 4, false),
            class("21SW", "B", Weekday::Mon, 1, false),
        ];
        let ctx = AllocationContext::from_entries(&entries);
        assert_eq!(ctx.group_periods("21SW", Weekday::Mon, 7), vec![1, 4]);
    }
}
