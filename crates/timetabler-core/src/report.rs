//! Scheduling run report.
//!
//! The report is the whole external surface of a run: the caller decides
//! from it whether to accept the timetable, regenerate, or patch by hand.

use serde::{Deserialize, Serialize};

use crate::violation::{ConstraintKind, Violation};
use crate::{GroupCode, SubjectCode};

/// A subject the generator could not place at all.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SkippedSubject {
    pub group: GroupCode,
    pub subject: SubjectCode,
    /// Why placement failed ("no qualified teacher", "no free lab window", ...).
    pub reason: String,
}

/// Per-constraint violation count.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConstraintCount {
    pub kind: ConstraintKind,
    pub count: usize,
}

/// Outcome of a full generate → validate → resolve run.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ScheduleReport {
    /// True when the resolver converged to zero violations.
    pub success: bool,
    pub entries_generated: usize,
    pub initial_violations: usize,
    pub final_violations: usize,
    pub iterations_completed: u32,
    /// Subjects left out of the timetable entirely (resource exhaustion).
    pub unscheduled: Vec<SkippedSubject>,
    /// Remaining violations per constraint, zero-count kinds omitted.
    pub breakdown: Vec<ConstraintCount>,
    /// Every remaining violation, ranked most severe first.
    pub violations: Vec<Violation>,
    /// Diagnostic 0-100 blend of violation and constraint-clash penalties.
    pub harmony_score: f32,
}

impl ScheduleReport {
    /// Violations remaining for one constraint kind.
    pub fn count_for(&self, kind: ConstraintKind) -> usize {
        self.breakdown
            .iter()
            .find(|c| c.kind == kind)
            .map_or(0, |c| c.count)
    }
}

impl std::fmt::Display for ScheduleReport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(
            f,
            "schedule {}: {} entries, {} -> {} violations in {} iterations (harmony {:.0})",
            if self.success { "complete" } else { "incomplete" },
            self.entries_generated,
            self.initial_violations,
            self.final_violations,
            self.iterations_completed,
            self.harmony_score,
        )?;
        for skipped in &self.unscheduled {
            writeln!(
                f,
                "  unscheduled: {} for {} ({})",
                skipped.subject, skipped.group, skipped.reason
            )?;
        }
        for row in &self.breakdown {
            writeln!(f, "  {} x{}", row.kind, row.count)?;
        }
        for v in &self.violations {
            writeln!(f, "  {v}")?;
        }
        Ok(())
    }
}
