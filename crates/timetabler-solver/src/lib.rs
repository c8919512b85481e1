//! # timetabler-solver
//!
//! Constraint-repair solver for the timetabler engine.
//!
//! This crate provides:
//! - Candidate generation (practical blocks first, then theory)
//! - A 19-rule constraint validator with clash detection and harmony score
//! - An iterative repair resolver with stagnation handling
//! - Room/lab allocation and the same-lab consistency pass
//! - Cross-semester conflict indexing
//!
//! The whole pipeline is exposed as [`run_schedule`]:
//! generate → validate → resolve → consistency guard → report. The caller
//! owns every piece of state; nothing here is process-global.
//!
//! ## Example
//!
//! ```rust,no_run
//! use timetabler_core::{NoCommitments, ScheduleProblem};
//! use timetabler_solver::run_schedule;
//!
//! # fn demo(problem: ScheduleProblem) -> Result<(), timetabler_core::ScheduleError> {
//! let run = run_schedule(&problem, &NoCommitments)?;
//! println!("{}", run.report);
//! # Ok(())
//! # }
//! ```

use std::collections::HashMap;

use chrono::Weekday;
use tracing::info;

use timetabler_core::{
    ConflictOracle, ScheduleProblem, ScheduleReport, ScheduledEntry, ScheduleError, TeacherId,
};

pub mod allocator;
pub mod conflict;
pub mod consistency;
pub mod context;
pub mod generator;
pub mod resolver;
pub mod validator;

pub use allocator::RoomAllocator;
pub use conflict::CrossSemesterIndex;
pub use consistency::enforce_same_lab;
pub use context::AllocationContext;
pub use generator::{GenerationResult, Generator, PlacementResult, SkipReason};
pub use resolver::{IterationRecord, RepairStrategy, Resolution, Resolver, ResolverStatus};
pub use validator::{all_checks, validate, ConstraintClash, ScheduleView, Validation};

/// Output of a full scheduling run.
#[derive(Clone, Debug)]
pub struct ScheduleRun {
    /// The final timetable, ready for bulk replace-save.
    pub entries: Vec<ScheduledEntry>,
    /// The operator-facing report.
    pub report: ScheduleReport,
    /// Per-iteration resolver log.
    pub resolution: Resolution,
}

/// Run the whole pipeline: generate → validate → resolve → guard → report.
///
/// Hard configuration errors fail fast before any scheduling work; an
/// imperfect schedule is NOT an error — the report carries the remaining
/// violations and the caller decides whether to accept it.
pub fn run_schedule(
    problem: &ScheduleProblem,
    oracle: &dyn ConflictOracle,
) -> Result<ScheduleRun, ScheduleError> {
    problem.validate()?;

    let generator = Generator::new(problem, oracle);
    let mut ctx = AllocationContext::new();
    let generated = generator.generate(&mut ctx);
    info!(
        entries = generated.entries.len(),
        skipped = generated.skipped.len(),
        "initial candidate generated"
    );

    let initial = {
        let view = ScheduleView::new(problem, &generated.entries, oracle);
        validate(&view)
    };

    let resolver = Resolver::new(problem, oracle);
    let mut resolution = resolver.resolve(generated.entries);

    // Pre-save guard: the same-lab pass is authoritative and idempotent.
    enforce_same_lab(problem, &mut resolution.entries);

    let final_validation = {
        let view = ScheduleView::new(problem, &resolution.entries, oracle);
        validate(&view)
    };

    let report = ScheduleReport {
        success: final_validation.is_clean(),
        entries_generated: resolution.entries.len(),
        initial_violations: initial.total(),
        final_violations: final_validation.total(),
        iterations_completed: resolution.iterations.len() as u32,
        unscheduled: generated.skipped,
        breakdown: final_validation.breakdown.clone(),
        violations: final_validation.violations.clone(),
        harmony_score: final_validation.harmony_score,
    };
    info!(
        success = report.success,
        initial = report.initial_violations,
        remaining = report.final_violations,
        iterations = report.iterations_completed,
        "scheduling run finished"
    );

    Ok(ScheduleRun {
        entries: resolution.entries.clone(),
        report,
        resolution,
    })
}

/// Per-teacher load over a produced timetable.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TeacherLoad {
    pub teacher: TeacherId,
    /// Classes across the whole week.
    pub total_classes: usize,
    /// Day carrying the most classes.
    pub peak_day: Weekday,
    pub peak_classes: usize,
}

/// Summarize how many classes each teacher carries, and where the load
/// peaks. Purely diagnostic.
pub fn teacher_load_summary(entries: &[ScheduledEntry]) -> Vec<TeacherLoad> {
    let mut per_day: HashMap<(&str, Weekday), usize> = HashMap::new();
    let mut totals: HashMap<&str, usize> = HashMap::new();
    for e in entries {
        if let Some(teacher) = e.teacher() {
            *per_day.entry((teacher, e.day())).or_insert(0) += 1;
            *totals.entry(teacher).or_insert(0) += 1;
        }
    }

    let mut loads: Vec<TeacherLoad> = totals
        .into_iter()
        .map(|(teacher, total_classes)| {
            let (peak_day, peak_classes) = per_day
                .iter()
                .filter(|((t, _), _)| *t == teacher)
                .map(|((_, day), count)| (*day, *count))
                .max_by_key(|(day, count)| (*count, std::cmp::Reverse(day.num_days_from_monday())))
                .unwrap_or((Weekday::Mon, 0));
            TeacherLoad {
                teacher: teacher.to_string(),
                total_classes,
                peak_day,
                peak_classes,
            }
        })
        .collect();
    loads.sort_by(|a, b| a.teacher.cmp(&b.teacher));
    loads
}

#[cfg(test)]
mod tests {
    use super::*;
    use timetabler_core::ClassEntry;

    fn class(teacher: &str, day: Weekday, period: u8) -> ScheduledEntry {
        ScheduledEntry::Class(ClassEntry {
            group: "23SW".into(),
            subject: "SW301".into(),
            teacher: teacher.into(),
            room: "CR-1".into(),
            day,
            period,
            is_practical: false,
        })
    }

    #[test]
    fn teacher_load_summary_counts_and_peaks() {
        let entries = vec![
            class("aisha@uni.edu", Weekday::Mon, 1),
            class("aisha@uni.edu", Weekday::Mon, 2),
            class("aisha@uni.edu", Weekday::Tue, 1),
            class("bilal@uni.edu", Weekday::Fri, 3),
        ];
        let loads = teacher_load_summary(&entries);

        assert_eq!(loads.len(), 2);
        assert_eq!(loads[0].teacher, "aisha@uni.edu");
        assert_eq!(loads[0].total_classes, 3);
        assert_eq!(loads[0].peak_day, Weekday::Mon);
        assert_eq!(loads[0].peak_classes, 2);
        assert_eq!(loads[1].teacher, "bilal@uni.edu");
        assert_eq!(loads[1].total_classes, 1);
    }

    #[test]
    fn thesis_entries_carry_no_teacher_load() {
        let entries = vec![ScheduledEntry::Thesis(timetabler_core::ThesisEntry {
            group: "21SW".into(),
            day: Weekday::Wed,
            period: 1,
        })];
        assert!(teacher_load_summary(&entries).is_empty());
    }
}
