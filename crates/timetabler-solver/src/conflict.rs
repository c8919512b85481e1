//! Cross-semester conflict detection.
//!
//! A teacher shared between two concurrently active timetables must not
//! be double-booked across them. This module indexes the committed
//! entries of *other* scheduling runs and answers slot queries through
//! the [`ConflictOracle`] trait, for use while placing (avoid the slot)
//! and while validating (flag it if placed anyway).

use std::collections::HashMap;

use chrono::Weekday;
use timetabler_core::{CommittedEntry, ConflictOracle, TeacherId};

/// Index over committed entries from sibling timetables.
#[derive(Clone, Debug, Default)]
pub struct CrossSemesterIndex {
    /// (teacher, day, period) -> descriptions of the clashing commitments.
    busy: HashMap<(TeacherId, Weekday, u8), Vec<String>>,
}

impl CrossSemesterIndex {
    /// Build from persisted entries, ignoring those of the named config —
    /// a run never conflicts with its own previous output.
    pub fn new(committed: &[CommittedEntry], own_config: &str) -> Self {
        let mut busy: HashMap<(TeacherId, Weekday, u8), Vec<String>> = HashMap::new();
        for entry in committed.iter().filter(|e| e.config != own_config) {
            busy.entry((entry.teacher.clone(), entry.day, entry.period))
                .or_default()
                .push(format!(
                    "{}: {} for {}",
                    entry.config, entry.subject, entry.group
                ));
        }
        Self { busy }
    }

    pub fn is_empty(&self) -> bool {
        self.busy.is_empty()
    }

    /// Periods on `day` where the teacher has no committed entry, for the
    /// resolver to steer repairs toward.
    pub fn suggest_alternative_slots(
        &self,
        teacher: &str,
        day: Weekday,
        periods_per_day: u8,
    ) -> Vec<u8> {
        (1..=periods_per_day)
            .filter(|&p| !self.teacher_busy(teacher, day, p))
            .collect()
    }
}

impl ConflictOracle for CrossSemesterIndex {
    fn teacher_busy(&self, teacher: &str, day: Weekday, period: u8) -> bool {
        self.busy
            .contains_key(&(teacher.to_string(), day, period))
    }

    fn describe(&self, teacher: &str, day: Weekday, period: u8) -> Vec<String> {
        self.busy
            .get(&(teacher.to_string(), day, period))
            .cloned()
            .unwrap_or_default()
    }
}
