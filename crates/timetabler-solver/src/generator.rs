//! Candidate generation: the initial full-week placement.
//!
//! One pass per class-group, senior cohorts first so they win the room
//! priority they are entitled to:
//!
//! 1. final-year groups get their thesis day blocked out,
//! 2. practical subjects are placed as one consecutive block in a lab,
//! 3. theory subjects get `credits` single-period classes, at most one per
//!    day, early periods first.
//!
//! "Could not place" is an ordinary value ([`PlacementResult::Skipped`]),
//! never an error: the generator logs it, reports it, and moves on. A
//! per-subject attempt bound guarantees termination on infeasible input.

use chrono::Weekday;
use tracing::{debug, warn};

use timetabler_core::{
    ClassEntry, ClassGroup, ConflictOracle, ScheduleProblem, ScheduledEntry, SkippedSubject,
    Subject, Teacher, ThesisEntry,
};

use crate::allocator::RoomAllocator;
use crate::context::AllocationContext;

/// Why a subject could not be placed.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum SkipReason {
    /// Nobody on staff is qualified for (subject, group).
    NoQualifiedTeacher,
    /// No lab was free for any consecutive window of the week.
    NoLabWindow,
    /// Placement ran out of compatible (slot, teacher, room) combinations.
    NoOpenSlot { placed: u8, wanted: u8 },
    /// The per-subject attempt bound tripped.
    AttemptsExhausted,
}

impl std::fmt::Display for SkipReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SkipReason::NoQualifiedTeacher => write!(f, "no qualified teacher"),
            SkipReason::NoLabWindow => write!(f, "no free lab window"),
            SkipReason::NoOpenSlot { placed, wanted } => {
                write!(f, "only {placed} of {wanted} classes found an open slot")
            }
            SkipReason::AttemptsExhausted => write!(f, "placement attempt bound reached"),
        }
    }
}

/// Outcome of one placement attempt.
#[derive(Clone, Debug)]
pub enum PlacementResult {
    Placed(Vec<ScheduledEntry>),
    /// Some classes landed, the rest could not; the shortfall surfaces as
    /// a subject-frequency violation downstream.
    Partial(Vec<ScheduledEntry>, SkipReason),
    Skipped(SkipReason),
}

/// Everything the generation pass produced.
#[derive(Clone, Debug, Default)]
pub struct GenerationResult {
    pub entries: Vec<ScheduledEntry>,
    /// Subjects (or parts of them) that never made it onto the timetable.
    pub skipped: Vec<SkippedSubject>,
}

/// Initial candidate builder for one scheduling run.
pub struct Generator<'a> {
    problem: &'a ScheduleProblem,
    oracle: &'a dyn ConflictOracle,
    allocator: RoomAllocator<'a>,
}

impl<'a> Generator<'a> {
    pub fn new(problem: &'a ScheduleProblem, oracle: &'a dyn ConflictOracle) -> Self {
        let allocator = RoomAllocator::new(&problem.classrooms, &problem.config.params);
        Self {
            problem,
            oracle,
            allocator,
        }
    }

    /// Build the initial candidate, recording usage into `ctx`.
    pub fn generate(&self, ctx: &mut AllocationContext) -> GenerationResult {
        let mut result = GenerationResult::default();

        for group in self.problem.config.class_groups() {
            self.generate_for_group(&group, ctx, &mut result);
        }

        debug!(
            entries = result.entries.len(),
            skipped = result.skipped.len(),
            "candidate generation finished"
        );
        result
    }

    fn generate_for_group(
        &self,
        group: &ClassGroup,
        ctx: &mut AllocationContext,
        result: &mut GenerationResult,
    ) {
        if group.is_final_year() {
            self.place_thesis_day(group, ctx, result);
        }

        let subjects = self.problem.subjects_for(group);
        let (practicals, theory): (Vec<&Subject>, Vec<&Subject>) =
            subjects.into_iter().partition(|s| s.is_practical);

        for subject in practicals.into_iter().chain(theory) {
            let placement = if subject.is_practical {
                self.place_practical(group, subject, ctx)
            } else {
                self.place_theory(group, subject, ctx)
            };
            match placement {
                PlacementResult::Placed(entries) => {
                    result.entries.extend(entries);
                }
                PlacementResult::Partial(entries, reason) => {
                    warn!(group = %group.code, subject = %subject.code, %reason, "subject left short");
                    result.entries.extend(entries);
                    result.skipped.push(SkippedSubject {
                        group: group.code.clone(),
                        subject: subject.code.clone(),
                        reason: reason.to_string(),
                    });
                }
                PlacementResult::Skipped(reason) => {
                    warn!(group = %group.code, subject = %subject.code, %reason, "subject left unscheduled");
                    result.skipped.push(SkippedSubject {
                        group: group.code.clone(),
                        subject: subject.code.clone(),
                        reason: reason.to_string(),
                    });
                }
            }
        }
    }

    /// Block out the thesis day before any class placement.
    fn place_thesis_day(
        &self,
        group: &ClassGroup,
        ctx: &mut AllocationContext,
        result: &mut GenerationResult,
    ) {
        let params = &self.problem.config.params;
        if self.problem.config.day_index(params.thesis_day).is_none() {
            return;
        }
        let last = params.thesis_periods.min(self.problem.config.periods_per_day);
        for period in 1..=last {
            let entry = ScheduledEntry::Thesis(ThesisEntry {
                group: group.code.clone(),
                day: params.thesis_day,
                period,
            });
            ctx.occupy(&entry);
            result.entries.push(entry);
        }
    }

    /// Place one practical subject as a consecutive block in a single lab.
    pub fn place_practical(
        &self,
        group: &ClassGroup,
        subject: &Subject,
        ctx: &mut AllocationContext,
    ) -> PlacementResult {
        let config = &self.problem.config;
        let block = config.params.practical_block_len;
        let teachers = self.qualified_teachers(subject, group);
        if teachers.is_empty() {
            return PlacementResult::Skipped(SkipReason::NoQualifiedTeacher);
        }
        if !self.allocator.has_labs() {
            return PlacementResult::Skipped(SkipReason::NoLabWindow);
        }

        let mut attempts = 0u32;
        for &day in &config.days {
            if self.is_thesis_day(group, day) {
                continue;
            }
            let last_start = config.periods_per_day.saturating_sub(block - 1);
            for start in 1..=last_start {
                attempts += 1;
                if attempts > config.params.max_place_attempts {
                    return PlacementResult::Skipped(SkipReason::AttemptsExhausted);
                }

                let window: Vec<u8> = (start..start + block).collect();
                if !window.iter().all(|p| ctx.is_group_free(&group.code, day, *p)) {
                    continue;
                }
                let Some(teacher) = self.pick_teacher(&teachers, ctx, day, &window) else {
                    continue;
                };
                let Some(lab) =
                    self.allocator
                        .for_practical(ctx, group, &subject.code, day, start, block)
                else {
                    continue;
                };

                let entries: Vec<ScheduledEntry> = window
                    .iter()
                    .map(|&period| {
                        ScheduledEntry::Class(ClassEntry {
                            group: group.code.clone(),
                            subject: subject.code.clone(),
                            teacher: teacher.email.clone(),
                            room: lab.name.clone(),
                            day,
                            period,
                            is_practical: true,
                        })
                    })
                    .collect();
                for e in &entries {
                    ctx.occupy(e);
                }
                return PlacementResult::Placed(entries);
            }
        }

        PlacementResult::Skipped(SkipReason::NoLabWindow)
    }

    /// Place `credits` theory classes, at most one per day, early periods
    /// first so days stay compact.
    pub fn place_theory(
        &self,
        group: &ClassGroup,
        subject: &Subject,
        ctx: &mut AllocationContext,
    ) -> PlacementResult {
        let config = &self.problem.config;
        let teachers = self.qualified_teachers(subject, group);
        if teachers.is_empty() {
            return PlacementResult::Skipped(SkipReason::NoQualifiedTeacher);
        }

        let wanted = subject.credits;
        let mut entries: Vec<ScheduledEntry> = Vec::new();
        let mut attempts = 0u32;

        'days: for &day in &config.days {
            if entries.len() as u8 >= wanted {
                break;
            }
            if self.is_thesis_day(group, day) {
                continue;
            }
            let day_cap = config.params.max_subjects_per_day;
            for period in config.periods() {
                attempts += 1;
                if attempts > config.params.max_place_attempts {
                    break 'days;
                }
                if period > self.friday_cutoff(group, day, ctx) {
                    break; // past the closing period for this day
                }
                if !ctx.is_group_free(&group.code, day, period) {
                    continue;
                }
                if ctx.group_periods(&group.code, day, config.periods_per_day).len()
                    >= usize::from(day_cap)
                {
                    break;
                }
                let Some(teacher) = self.pick_teacher(&teachers, ctx, day, &[period]) else {
                    continue;
                };
                let Some(room) = self.allocator.for_theory(ctx, group, day, period) else {
                    continue;
                };

                let entry = ScheduledEntry::Class(ClassEntry {
                    group: group.code.clone(),
                    subject: subject.code.clone(),
                    teacher: teacher.email.clone(),
                    room: room.name.clone(),
                    day,
                    period,
                    is_practical: false,
                });
                ctx.occupy(&entry);
                entries.push(entry);
                continue 'days; // one class per day per subject
            }
        }

        let placed = entries.len() as u8;
        if placed == wanted {
            PlacementResult::Placed(entries)
        } else if placed == 0 {
            PlacementResult::Skipped(SkipReason::NoOpenSlot { placed: 0, wanted })
        } else {
            PlacementResult::Partial(entries, SkipReason::NoOpenSlot { placed, wanted })
        }
    }

    /// Last period a theory class may occupy on this day.
    fn friday_cutoff(&self, group: &ClassGroup, day: Weekday, ctx: &AllocationContext) -> u8 {
        if day != Weekday::Fri || self.problem.config.day_index(Weekday::Fri).is_none() {
            return self.problem.config.periods_per_day;
        }
        let params = &self.problem.config.params;
        // Practicals are placed before theory, so the context already knows
        // whether Friday carries one for this group.
        let has_practical = self
            .problem
            .subjects_for(group)
            .iter()
            .filter(|s| s.is_practical)
            .any(|s| ctx.session_lab(&group.code, &s.code, Weekday::Fri).is_some());
        if has_practical {
            params.friday_limit_with_practical
        } else {
            params.friday_limit_without_practical
        }
    }

    fn is_thesis_day(&self, group: &ClassGroup, day: Weekday) -> bool {
        group.is_final_year() && day == self.problem.config.params.thesis_day
    }

    /// Qualified teachers in deterministic (email) order.
    fn qualified_teachers(&self, subject: &Subject, group: &ClassGroup) -> Vec<&'a Teacher> {
        let mut teachers: Vec<&Teacher> = self
            .problem
            .teachers
            .iter()
            .filter(|t| t.is_qualified(&subject.code, group))
            .collect();
        teachers.sort_by(|a, b| a.email.cmp(&b.email));
        teachers
    }

    /// First teacher free, available, under their daily cap and not
    /// committed elsewhere for every period of the window.
    fn pick_teacher(
        &self,
        teachers: &[&'a Teacher],
        ctx: &AllocationContext,
        day: Weekday,
        window: &[u8],
    ) -> Option<&'a Teacher> {
        teachers
            .iter()
            .find(|t| {
                ctx.teacher_load(&t.email, day) + window.len() as u8 <= t.max_per_day
                    && window.iter().all(|&p| {
                        ctx.is_teacher_free(&t.email, day, p)
                            && !t.is_unavailable(day, p)
                            && !self.oracle.teacher_busy(&t.email, day, p)
                    })
            })
            .copied()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use timetabler_core::{Batch, Classroom, NoCommitments, ScheduleConfig, Teacher};

    fn base_problem() -> ScheduleProblem {
        let config = ScheduleConfig::new("Fall 2025").batch(Batch::new("23SW", 3).size(30));
        let mut problem = ScheduleProblem::new(config);
        problem.teachers = vec![Teacher::new("Aisha Khan", "aisha@uni.edu")
            .teaches("SW301", "23SW")
            .teaches("SW302", "23SW")];
        problem.classrooms = vec![
            Classroom::new("CR-1").capacity(60),
            Classroom::new("LAB-1").capacity(40).lab(),
        ];
        problem
    }

    #[test]
    fn theory_lands_on_distinct_days() {
        let mut problem = base_problem();
        problem.subjects = vec![Subject::new("SW301", "Databases", "23SW").credits(3)];

        let gen = Generator::new(&problem, &NoCommitments);
        let mut ctx = AllocationContext::new();
        let result = gen.generate(&mut ctx);

        assert!(result.skipped.is_empty());
        assert_eq!(result.entries.len(), 3);
        let mut days: Vec<Weekday> = result.entries.iter().map(|e| e.day()).collect();
        days.dedup();
        assert_eq!(days.len(), 3, "one class per day");
    }

    #[test]
    fn practical_is_one_consecutive_block_in_one_lab() {
        let mut problem = base_problem();
        problem.subjects = vec![Subject::new("SW302", "DB Lab", "23SW").credits(1).practical()];

        let gen = Generator::new(&problem, &NoCommitments);
        let mut ctx = AllocationContext::new();
        let result = gen.generate(&mut ctx);

        assert_eq!(result.entries.len(), 3);
        let mut periods: Vec<u8> = result.entries.iter().map(|e| e.period()).collect();
        periods.sort_unstable();
        assert_eq!(periods, vec![1, 2, 3]);
        assert!(result.entries.iter().all(|e| e.day() == result.entries[0].day()));
        assert!(result.entries.iter().all(|e| e.room() == Some("LAB-1")));
        assert!(result.entries.iter().all(|e| e.is_practical()));
    }

    #[test]
    fn missing_teacher_is_a_skip_not_a_panic() {
        let mut problem = base_problem();
        problem.subjects = vec![Subject::new("SW999", "Orphan", "23SW")];

        let gen = Generator::new(&problem, &NoCommitments);
        let mut ctx = AllocationContext::new();
        let result = gen.generate(&mut ctx);

        assert!(result.entries.is_empty());
        assert_eq!(result.skipped.len(), 1);
        assert_eq!(result.skipped[0].reason, "no qualified teacher");
    }

    #[test]
    fn practical_without_labs_is_skipped() {
        let mut problem = base_problem();
        problem.classrooms.retain(|r| !r.is_lab);
        problem.subjects = vec![Subject::new("SW302", "DB Lab", "23SW").practical()];

        let gen = Generator::new(&problem, &NoCommitments);
        let mut ctx = AllocationContext::new();
        let result = gen.generate(&mut ctx);

        assert!(result.entries.is_empty());
        assert_eq!(result.skipped[0].reason, "no free lab window");
    }

    #[test]
    fn final_year_gets_thesis_day_first() {
        let config = ScheduleConfig::new("Fall 2025").batch(Batch::new("21SW", 7).size(30));
        let mut problem = ScheduleProblem::new(config);
        problem.subjects = vec![Subject::new("SW415", "SPM", "21SW").credits(2)];
        problem.teachers =
            vec![Teacher::new("Aisha Khan", "aisha@uni.edu").teaches("SW415", "21SW")];
        problem.classrooms = vec![Classroom::new("CR-1").capacity(60)];

        let gen = Generator::new(&problem, &NoCommitments);
        let mut ctx = AllocationContext::new();
        let result = gen.generate(&mut ctx);

        let thesis: Vec<_> = result.entries.iter().filter(|e| e.is_thesis()).collect();
        assert_eq!(thesis.len(), 3);
        assert!(thesis.iter().all(|e| e.day() == Weekday::Wed));
        // No regular class may share the thesis day.
        assert!(result
            .entries
            .iter()
            .filter(|e| !e.is_thesis())
            .all(|e| e.day() != Weekday::Wed));
    }

    #[test]
    fn teacher_time_off_is_respected() {
        let mut problem = base_problem();
        problem.subjects = vec![Subject::new("SW301", "Databases", "23SW").credits(5)];
        problem.teachers = vec![Teacher::new("Aisha Khan", "aisha@uni.edu")
            .teaches("SW301", "23SW")
            .time_off(timetabler_core::TimeOff::periods(Weekday::Mon, vec![1, 2]))];

        let gen = Generator::new(&problem, &NoCommitments);
        let mut ctx = AllocationContext::new();
        let result = gen.generate(&mut ctx);

        assert!(result
            .entries
            .iter()
            .all(|e| !(e.day() == Weekday::Mon && e.period() <= 2)));
    }

    #[test]
    fn cross_semester_commitments_block_placement() {
        struct MondayBlocked;
        impl ConflictOracle for MondayBlocked {
            fn teacher_busy(&self, _t: &str, day: Weekday, _p: u8) -> bool {
                day == Weekday::Mon
            }
        }

        let mut problem = base_problem();
        problem.subjects = vec![Subject::new("SW301", "Databases", "23SW").credits(3)];

        let gen = Generator::new(&problem, &MondayBlocked);
        let mut ctx = AllocationContext::new();
        let result = gen.generate(&mut ctx);

        assert_eq!(result.entries.len(), 3);
        assert!(result.entries.iter().all(|e| e.day() != Weekday::Mon));
    }

    #[test]
    fn friday_theory_stops_at_cutoff() {
        let mut problem = base_problem();
        // Enough credits to try every day, including Friday.
        problem.subjects = vec![Subject::new("SW301", "Databases", "23SW").credits(5)];

        let gen = Generator::new(&problem, &NoCommitments);
        let mut ctx = AllocationContext::new();
        let result = gen.generate(&mut ctx);

        for e in &result.entries {
            if e.day() == Weekday::Fri {
                assert!(e.period() <= 3, "Friday theory past period 3: {}", e.period());
            }
        }
    }
}
