//! Constraint validation.
//!
//! Each rule is a pure function `&ScheduleView -> Vec<Violation>`; the
//! registry in [`all_checks`] runs them all and aggregates. Checks are
//! independent and order-irrelevant, so they fan out on a rayon pool —
//! nothing here mutates the candidate.
//!
//! The enhanced layer on top flags pairs of constraints whose remedies
//! fight each other and condenses everything into a 0-100 harmony score.
//! Both are diagnostics; repair decisions key off the violations alone.

use std::collections::HashMap;

use chrono::Weekday;
use rayon::prelude::*;

use timetabler_core::{
    ClassEntry, ClassGroup, Classroom, ConflictOracle, ConstraintCount, ConstraintKind,
    ScheduleProblem, ScheduledEntry, Severity, Subject, Teacher, Violation,
};

// ============================================================================
// ScheduleView
// ============================================================================

/// Read-only, pre-indexed view of a candidate schedule.
///
/// Built once per validation pass; every check works off the indexes so no
/// check rescans the full entry list quadratically.
pub struct ScheduleView<'a> {
    pub problem: &'a ScheduleProblem,
    pub entries: &'a [ScheduledEntry],
    pub oracle: &'a dyn ConflictOracle,
    groups: Vec<ClassGroup>,
    subjects: HashMap<&'a str, &'a Subject>,
    teachers: HashMap<&'a str, &'a Teacher>,
    rooms: HashMap<&'a str, &'a Classroom>,
    by_group_day: HashMap<(&'a str, Weekday), Vec<&'a ScheduledEntry>>,
}

impl<'a> ScheduleView<'a> {
    pub fn new(
        problem: &'a ScheduleProblem,
        entries: &'a [ScheduledEntry],
        oracle: &'a dyn ConflictOracle,
    ) -> Self {
        let subjects = problem.subjects.iter().map(|s| (s.code.as_str(), s)).collect();
        let teachers = problem.teachers.iter().map(|t| (t.email.as_str(), t)).collect();
        let rooms = problem
            .classrooms
            .iter()
            .map(|r| (r.name.as_str(), r))
            .collect();

        let mut by_group_day: HashMap<(&str, Weekday), Vec<&ScheduledEntry>> = HashMap::new();
        for entry in entries {
            by_group_day
                .entry((entry.group(), entry.day()))
                .or_default()
                .push(entry);
        }
        for day_entries in by_group_day.values_mut() {
            day_entries.sort_by_key(|e| e.period());
        }

        Self {
            problem,
            entries,
            oracle,
            groups: problem.config.class_groups(),
            subjects,
            teachers,
            rooms,
            by_group_day,
        }
    }

    pub fn groups(&self) -> &[ClassGroup] {
        &self.groups
    }

    pub fn group(&self, code: &str) -> Option<&ClassGroup> {
        self.groups.iter().find(|g| g.code == code)
    }

    pub fn subject(&self, code: &str) -> Option<&'a Subject> {
        self.subjects.get(code).copied()
    }

    pub fn teacher(&self, email: &str) -> Option<&'a Teacher> {
        self.teachers.get(email).copied()
    }

    pub fn room(&self, name: &str) -> Option<&'a Classroom> {
        self.rooms.get(name).copied()
    }

    /// Entries of a group on a day, period-ascending.
    pub fn group_day<'b>(&'b self, group: &'b str, day: Weekday) -> &'b [&'a ScheduledEntry] {
        self.by_group_day
            .get(&(group, day))
            .map_or(&[], Vec::as_slice)
    }

    /// Class entries only (thesis placeholders filtered out).
    pub fn class_entries(&self) -> impl Iterator<Item = &'a ClassEntry> + '_ {
        self.entries.iter().filter_map(ScheduledEntry::as_class)
    }

    fn params(&self) -> &timetabler_core::ConstraintParams {
        &self.problem.config.params
    }
}

// ============================================================================
// Validation result
// ============================================================================

/// Two constraints whose remedies work against each other.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ConstraintClash {
    pub a: ConstraintKind,
    pub b: ConstraintKind,
    pub description: String,
}

/// Aggregated result of one validation pass.
#[derive(Clone, Debug)]
pub struct Validation {
    /// All violations, most severe first.
    pub violations: Vec<Violation>,
    /// Non-zero per-constraint counts, registry order.
    pub breakdown: Vec<ConstraintCount>,
    pub clashes: Vec<ConstraintClash>,
    pub harmony_score: f32,
}

impl Validation {
    pub fn total(&self) -> usize {
        self.violations.len()
    }

    pub fn is_clean(&self) -> bool {
        self.violations.is_empty()
    }

    pub fn count_for(&self, kind: ConstraintKind) -> usize {
        self.breakdown
            .iter()
            .find(|c| c.kind == kind)
            .map_or(0, |c| c.count)
    }
}

type CheckFn = fn(&ScheduleView) -> Vec<Violation>;

/// The full check registry, one entry per constraint kind.
pub fn all_checks() -> Vec<(ConstraintKind, CheckFn)> {
    vec![
        (ConstraintKind::SubjectFrequency, check_subject_frequency),
        (ConstraintKind::PracticalBlockIntegrity, check_practical_blocks),
        (ConstraintKind::SameLabRule, check_same_lab),
        (ConstraintKind::TeacherDoubleBooking, check_teacher_double_booking),
        (ConstraintKind::RoomDoubleBooking, check_room_double_booking),
        (ConstraintKind::GroupDoubleBooking, check_group_double_booking),
        (ConstraintKind::TeacherUnavailability, check_teacher_unavailability),
        (ConstraintKind::TeacherQualification, check_teacher_qualification),
        (ConstraintKind::TeacherDailyLimit, check_teacher_daily_limit),
        (ConstraintKind::TeacherConsecutiveTheory, check_teacher_consecutive_theory),
        (ConstraintKind::CrossSemesterConflict, check_cross_semester),
        (ConstraintKind::FridayTimeLimit, check_friday_limit),
        (ConstraintKind::MinimumDailyClasses, check_minimum_daily),
        (ConstraintKind::TheoryPracticalMix, check_theory_practical_mix),
        (ConstraintKind::ThesisDay, check_thesis_day),
        (ConstraintKind::CompactSchedule, check_compact_schedule),
        (ConstraintKind::TheoryDistribution, check_theory_distribution),
        (ConstraintKind::RoomCapacity, check_room_capacity),
        (ConstraintKind::RoomTypeRule, check_room_type),
    ]
}

/// Run every check and aggregate.
pub fn validate(view: &ScheduleView) -> Validation {
    let checks = all_checks();
    let per_check: Vec<(ConstraintKind, Vec<Violation>)> = checks
        .par_iter()
        .map(|(kind, check)| (*kind, check(view)))
        .collect();

    let breakdown: Vec<ConstraintCount> = per_check
        .iter()
        .filter(|(_, vs)| !vs.is_empty())
        .map(|(kind, vs)| ConstraintCount {
            kind: *kind,
            count: vs.len(),
        })
        .collect();

    let mut violations: Vec<Violation> =
        per_check.into_iter().flat_map(|(_, vs)| vs).collect();
    violations.sort_by(|a, b| {
        b.severity
            .cmp(&a.severity)
            .then_with(|| a.description.cmp(&b.description))
    });

    let clashes = detect_clashes(&breakdown);
    let harmony_score = harmony(&violations, &clashes);

    Validation {
        violations,
        breakdown,
        clashes,
        harmony_score,
    }
}

/// Pairs of active constraints whose standard remedies fight each other.
fn detect_clashes(breakdown: &[ConstraintCount]) -> Vec<ConstraintClash> {
    const FIGHTS: [(ConstraintKind, ConstraintKind, &str); 4] = [
        (
            ConstraintKind::PracticalBlockIntegrity,
            ConstraintKind::TeacherConsecutiveTheory,
            "practical blocks demand consecutive periods while teacher breaks split them",
        ),
        (
            ConstraintKind::CompactSchedule,
            ConstraintKind::TeacherConsecutiveTheory,
            "closing schedule gaps lengthens a teacher's consecutive run",
        ),
        (
            ConstraintKind::MinimumDailyClasses,
            ConstraintKind::FridayTimeLimit,
            "filling a thin Friday pushes classes past the closing period",
        ),
        (
            ConstraintKind::MinimumDailyClasses,
            ConstraintKind::TheoryDistribution,
            "padding a thin day can double up a subject already taught that day",
        ),
    ];

    let active = |kind: ConstraintKind| breakdown.iter().any(|c| c.kind == kind);
    FIGHTS
        .iter()
        .filter(|(a, b, _)| active(*a) && active(*b))
        .map(|(a, b, description)| ConstraintClash {
            a: *a,
            b: *b,
            description: (*description).to_string(),
        })
        .collect()
}

/// 100 minus violation and clash penalties, clamped to 0-100.
fn harmony(violations: &[Violation], clashes: &[ConstraintClash]) -> f32 {
    let violation_penalty: f32 = violations
        .iter()
        .map(|v| match v.severity {
            Severity::Critical => 10.0,
            Severity::High => 6.0,
            Severity::Medium => 3.0,
            Severity::Low => 1.0,
        })
        .sum::<f32>()
        .min(80.0);
    let clash_penalty = (clashes.len() as f32 * 5.0).min(20.0);
    (100.0 - violation_penalty - clash_penalty).max(0.0)
}

// ============================================================================
// Checks
// ============================================================================

/// Scheduled class count per (group, subject) must match demand.
fn check_subject_frequency(view: &ScheduleView) -> Vec<Violation> {
    let mut out = Vec::new();
    let block = view.params().practical_block_len;

    let mut counts: HashMap<(&str, &str), u8> = HashMap::new();
    for e in view.class_entries() {
        *counts.entry((e.group.as_str(), e.subject.as_str())).or_insert(0) += 1;
    }

    for group in view.groups() {
        for subject in view.problem.subjects_for(group) {
            let have = counts
                .get(&(group.code.as_str(), subject.code.as_str()))
                .copied()
                .unwrap_or(0);
            let want = if subject.is_practical { block } else { subject.credits };
            if have != want {
                let what = if subject.is_practical {
                    format!("one {block}-period session")
                } else {
                    format!("{want} weekly classes")
                };
                out.push(
                    Violation::new(
                        ConstraintKind::SubjectFrequency,
                        format!(
                            "{} has {have} of {want} periods for {} (expected {what})",
                            group.code, subject.code
                        ),
                    )
                    .group(group.code.clone())
                    .subject(subject.code.clone()),
                );
            }
        }
    }
    out
}

/// The periods of one practical session must be truly consecutive.
fn check_practical_blocks(view: &ScheduleView) -> Vec<Violation> {
    let mut out = Vec::new();
    let block = view.params().practical_block_len;

    for ((group, subject, day), mut periods) in practical_sessions(view) {
        periods.sort_unstable();
        let consecutive = periods.windows(2).all(|w| w[1] == w[0] + 1);
        if periods.len() != usize::from(block) || !consecutive {
            out.push(
                Violation::new(
                    ConstraintKind::PracticalBlockIntegrity,
                    format!(
                        "{group} practical {subject} on {day} occupies periods {periods:?}, \
                         expected {block} consecutive",
                    ),
                )
                .group(group)
                .subject(subject)
                .on(day),
            );
        }
    }
    out
}

/// All blocks of one practical session must share a single lab.
fn check_same_lab(view: &ScheduleView) -> Vec<Violation> {
    let mut rooms_by_session: HashMap<(String, String, Weekday), Vec<&str>> = HashMap::new();
    for e in view.class_entries().filter(|e| e.is_practical) {
        rooms_by_session
            .entry((e.group.clone(), e.subject.clone(), e.day))
            .or_default()
            .push(e.room.as_str());
    }

    let mut out = Vec::new();
    for ((group, subject, day), mut rooms) in rooms_by_session {
        rooms.sort_unstable();
        rooms.dedup();
        if rooms.len() > 1 {
            out.push(
                Violation::new(
                    ConstraintKind::SameLabRule,
                    format!(
                        "{group} practical {subject} on {day} is split across labs {rooms:?}"
                    ),
                )
                .group(group)
                .subject(subject)
                .on(day),
            );
        }
    }
    out
}

fn check_teacher_double_booking(view: &ScheduleView) -> Vec<Violation> {
    let mut by_slot: HashMap<(&str, Weekday, u8), Vec<&ClassEntry>> = HashMap::new();
    for e in view.class_entries() {
        by_slot.entry((e.teacher.as_str(), e.day, e.period)).or_default().push(e);
    }

    let mut out = Vec::new();
    for ((teacher, day, period), entries) in by_slot {
        if entries.len() > 1 {
            let groups: Vec<&str> = entries.iter().map(|e| e.group.as_str()).collect();
            out.push(
                Violation::new(
                    ConstraintKind::TeacherDoubleBooking,
                    format!("{teacher} teaches {} classes at once ({groups:?})", entries.len()),
                )
                .teacher(teacher)
                .at(day, period),
            );
        }
    }
    out
}

fn check_room_double_booking(view: &ScheduleView) -> Vec<Violation> {
    let mut by_slot: HashMap<(&str, Weekday, u8), Vec<&ClassEntry>> = HashMap::new();
    for e in view.class_entries() {
        by_slot.entry((e.room.as_str(), e.day, e.period)).or_default().push(e);
    }

    let mut out = Vec::new();
    for ((room, day, period), entries) in by_slot {
        if entries.len() > 1 {
            let groups: Vec<&str> = entries.iter().map(|e| e.group.as_str()).collect();
            out.push(
                Violation::new(
                    ConstraintKind::RoomDoubleBooking,
                    format!("{room} hosts {} classes at once ({groups:?})", entries.len()),
                )
                .room(room)
                .at(day, period),
            );
        }
    }
    out
}

fn check_group_double_booking(view: &ScheduleView) -> Vec<Violation> {
    let mut by_slot: HashMap<(&str, Weekday, u8), usize> = HashMap::new();
    for e in view.entries {
        *by_slot.entry((e.group(), e.day(), e.period())).or_insert(0) += 1;
    }

    let mut out = Vec::new();
    for ((group, day, period), count) in by_slot {
        if count > 1 {
            out.push(
                Violation::new(
                    ConstraintKind::GroupDoubleBooking,
                    format!("{group} sits in {count} classes at once"),
                )
                .group(group)
                .at(day, period),
            );
        }
    }
    out
}

/// Zero tolerance: any entry inside a teacher's declared time off.
fn check_teacher_unavailability(view: &ScheduleView) -> Vec<Violation> {
    view.class_entries()
        .filter_map(|e| {
            let teacher = view.teacher(&e.teacher)?;
            teacher.is_unavailable(e.day, e.period).then(|| {
                Violation::new(
                    ConstraintKind::TeacherUnavailability,
                    format!(
                        "{} is scheduled for {} during declared time off",
                        teacher.email, e.subject
                    ),
                )
                .teacher(teacher.email.clone())
                .group(e.group.clone())
                .subject(e.subject.clone())
                .at(e.day, e.period)
            })
        })
        .collect()
}

/// Entries must reference an existing, qualified teacher.
fn check_teacher_qualification(view: &ScheduleView) -> Vec<Violation> {
    let mut out = Vec::new();
    for e in view.class_entries() {
        let Some(group) = view.group(&e.group) else {
            continue; // unknown group means a stale entry; frequency reports it
        };
        match view.teacher(&e.teacher) {
            None => out.push(
                Violation::new(
                    ConstraintKind::TeacherQualification,
                    format!("entry references unknown teacher {}", e.teacher),
                )
                .teacher(e.teacher.clone())
                .subject(e.subject.clone())
                .at(e.day, e.period),
            ),
            Some(t) if !t.is_qualified(&e.subject, group) => out.push(
                Violation::new(
                    ConstraintKind::TeacherQualification,
                    format!(
                        "{} is not assigned to teach {} for {}",
                        t.email, e.subject, e.group
                    ),
                )
                .teacher(t.email.clone())
                .group(e.group.clone())
                .subject(e.subject.clone())
                .at(e.day, e.period),
            ),
            Some(_) => {}
        }
    }
    out
}

fn check_teacher_daily_limit(view: &ScheduleView) -> Vec<Violation> {
    let mut per_day: HashMap<(&str, Weekday), u8> = HashMap::new();
    for e in view.class_entries() {
        *per_day.entry((e.teacher.as_str(), e.day)).or_insert(0) += 1;
    }

    let mut out = Vec::new();
    for ((email, day), count) in per_day {
        let Some(teacher) = view.teacher(email) else {
            continue;
        };
        if count > teacher.max_per_day {
            out.push(
                Violation::new(
                    ConstraintKind::TeacherDailyLimit,
                    format!(
                        "{email} holds {count} classes on {day}, limit is {}",
                        teacher.max_per_day
                    ),
                )
                .teacher(email)
                .on(day),
            );
        }
    }
    out
}

/// A teacher needs a break after `teacher_max_consecutive` theory periods.
fn check_teacher_consecutive_theory(view: &ScheduleView) -> Vec<Violation> {
    let limit = view.params().teacher_max_consecutive;
    let mut per_day: HashMap<(&str, Weekday), Vec<u8>> = HashMap::new();
    for e in view.class_entries().filter(|e| !e.is_practical) {
        per_day.entry((e.teacher.as_str(), e.day)).or_default().push(e.period);
    }

    let mut out = Vec::new();
    for ((email, day), mut periods) in per_day {
        periods.sort_unstable();
        let mut run = 1u8;
        for w in periods.windows(2) {
            run = if w[1] == w[0] + 1 { run + 1 } else { 1 };
            if run == limit + 1 {
                out.push(
                    Violation::new(
                        ConstraintKind::TeacherConsecutiveTheory,
                        format!(
                            "{email} teaches more than {limit} consecutive theory periods on {day}"
                        ),
                    )
                    .teacher(email)
                    .at(day, w[1]),
                );
            }
        }
    }
    out
}

/// Teacher already committed in another active timetable.
fn check_cross_semester(view: &ScheduleView) -> Vec<Violation> {
    view.class_entries()
        .filter(|e| view.oracle.teacher_busy(&e.teacher, e.day, e.period))
        .map(|e| {
            let clashes = view.oracle.describe(&e.teacher, e.day, e.period);
            let detail = if clashes.is_empty() {
                String::from("committed in another timetable")
            } else {
                clashes.join("; ")
            };
            Violation::new(
                ConstraintKind::CrossSemesterConflict,
                format!("{} double-booked across semesters: {detail}", e.teacher),
            )
            .teacher(e.teacher.clone())
            .group(e.group.clone())
            .subject(e.subject.clone())
            .at(e.day, e.period)
        })
        .collect()
}

/// Friday theory must close by period 4 with a practical, 3 without.
fn check_friday_limit(view: &ScheduleView) -> Vec<Violation> {
    let params = view.params();
    let mut out = Vec::new();

    for group in view.groups() {
        let friday = view.group_day(&group.code, Weekday::Fri);
        if friday.is_empty() {
            continue;
        }
        let has_practical = friday.iter().any(|e| e.is_practical());
        let limit = if has_practical {
            params.friday_limit_with_practical
        } else {
            params.friday_limit_without_practical
        };
        for e in friday {
            let Some(class) = e.as_class() else { continue };
            if !class.is_practical && class.period > limit {
                out.push(
                    Violation::new(
                        ConstraintKind::FridayTimeLimit,
                        format!(
                            "{} has {} at Friday period {}, past the period-{limit} close",
                            group.code, class.subject, class.period
                        ),
                    )
                    .group(group.code.clone())
                    .subject(class.subject.clone())
                    .at(Weekday::Fri, class.period),
                );
            }
        }
    }
    out
}

/// No day may carry exactly one class (thin days waste a commute).
fn check_minimum_daily(view: &ScheduleView) -> Vec<Violation> {
    let params = view.params();
    let mut out = Vec::new();

    for group in view.groups() {
        for &day in &view.problem.config.days {
            if group.is_final_year() && day == params.thesis_day {
                continue;
            }
            let count = view.group_day(&group.code, day).len();
            if count > 0 && count < usize::from(params.min_daily_classes) {
                out.push(
                    Violation::new(
                        ConstraintKind::MinimumDailyClasses,
                        format!(
                            "{} has only {count} class(es) on {day}, minimum is {}",
                            group.code, params.min_daily_classes
                        ),
                    )
                    .group(group.code.clone())
                    .on(day),
                );
            }
        }
    }
    out
}

/// A day must never consist of practical classes alone.
fn check_theory_practical_mix(view: &ScheduleView) -> Vec<Violation> {
    let mut out = Vec::new();
    for group in view.groups() {
        for &day in &view.problem.config.days {
            let entries = view.group_day(&group.code, day);
            if !entries.is_empty() && entries.iter().all(|e| e.is_practical()) {
                out.push(
                    Violation::new(
                        ConstraintKind::TheoryPracticalMix,
                        format!("{} spends all of {day} in practicals", group.code),
                    )
                    .group(group.code.clone())
                    .on(day),
                );
            }
        }
    }
    out
}

/// Final-year thesis day is exclusive, and only final-year groups have one.
fn check_thesis_day(view: &ScheduleView) -> Vec<Violation> {
    let params = view.params();
    let mut out = Vec::new();

    for group in view.groups() {
        if group.is_final_year() {
            if view.problem.config.day_index(params.thesis_day).is_none() {
                continue;
            }
            let entries = view.group_day(&group.code, params.thesis_day);
            let intruders = entries.iter().filter(|e| !e.is_thesis()).count();
            if intruders > 0 {
                out.push(
                    Violation::new(
                        ConstraintKind::ThesisDay,
                        format!(
                            "{} has {intruders} regular class(es) on thesis day {}",
                            group.code, params.thesis_day
                        ),
                    )
                    .group(group.code.clone())
                    .on(params.thesis_day),
                );
            }
            if entries.iter().all(|e| !e.is_thesis()) {
                out.push(
                    Violation::new(
                        ConstraintKind::ThesisDay,
                        format!("{} has no thesis time on {}", group.code, params.thesis_day),
                    )
                    .group(group.code.clone())
                    .on(params.thesis_day),
                );
            }
        } else {
            let stray = view
                .entries
                .iter()
                .filter(|e| e.is_thesis() && e.group() == group.code)
                .count();
            if stray > 0 {
                out.push(
                    Violation::new(
                        ConstraintKind::ThesisDay,
                        format!("{} is not final-year but carries thesis entries", group.code),
                    )
                    .group(group.code.clone()),
                );
            }
        }
    }
    out
}

/// Soft compactness rule: no wide idle stretch inside a day.
fn check_compact_schedule(view: &ScheduleView) -> Vec<Violation> {
    let max_gap = view.params().max_gap_periods;
    let mut out = Vec::new();

    for group in view.groups() {
        for &day in &view.problem.config.days {
            let entries = view.group_day(&group.code, day);
            for w in entries.windows(2) {
                let gap = w[1].period().saturating_sub(w[0].period()).saturating_sub(1);
                if gap > max_gap {
                    out.push(
                        Violation::new(
                            ConstraintKind::CompactSchedule,
                            format!(
                                "{} idles for {gap} periods on {day} between periods {} and {}",
                                group.code,
                                w[0].period(),
                                w[1].period()
                            ),
                        )
                        .group(group.code.clone())
                        .on(day),
                    );
                }
            }
        }
    }
    out
}

/// The same theory subject at most once per day.
fn check_theory_distribution(view: &ScheduleView) -> Vec<Violation> {
    let mut per_day: HashMap<(&str, &str, Weekday), u8> = HashMap::new();
    for e in view.class_entries().filter(|e| !e.is_practical) {
        *per_day
            .entry((e.group.as_str(), e.subject.as_str(), e.day))
            .or_insert(0) += 1;
    }

    let mut out = Vec::new();
    for ((group, subject, day), count) in per_day {
        if count > 1 {
            out.push(
                Violation::new(
                    ConstraintKind::TheoryDistribution,
                    format!("{group} takes {subject} {count} times on {day}"),
                )
                .group(group)
                .subject(subject)
                .on(day),
            );
        }
    }
    out
}

fn check_room_capacity(view: &ScheduleView) -> Vec<Violation> {
    let mut out = Vec::new();
    for e in view.class_entries() {
        let (Some(room), Some(group)) = (view.room(&e.room), view.group(&e.group)) else {
            continue;
        };
        if room.capacity < group.size {
            out.push(
                Violation::new(
                    ConstraintKind::RoomCapacity,
                    format!(
                        "{} seats {} but {} brings {} students",
                        room.name, room.capacity, group.code, group.size
                    ),
                )
                .group(e.group.clone())
                .room(e.room.clone())
                .at(e.day, e.period),
            );
        }
    }
    out
}

/// Practicals belong in labs; junior theory should stay out of them.
fn check_room_type(view: &ScheduleView) -> Vec<Violation> {
    let mut out = Vec::new();
    for e in view.class_entries() {
        let (Some(room), Some(group)) = (view.room(&e.room), view.group(&e.group)) else {
            continue;
        };
        if e.is_practical && !room.is_lab {
            out.push(
                Violation::new(
                    ConstraintKind::RoomTypeRule,
                    format!("practical {} runs in non-lab room {}", e.subject, room.name),
                )
                .severity(Severity::High)
                .group(e.group.clone())
                .subject(e.subject.clone())
                .room(e.room.clone())
                .at(e.day, e.period),
            );
        } else if !e.is_practical && room.is_lab && !group.is_senior() {
            out.push(
                Violation::new(
                    ConstraintKind::RoomTypeRule,
                    format!(
                        "junior group {} holds theory {} in lab {}",
                        group.code, e.subject, room.name
                    ),
                )
                .severity(Severity::Low)
                .group(e.group.clone())
                .subject(e.subject.clone())
                .room(e.room.clone())
                .at(e.day, e.period),
            );
        }
    }
    out
}

/// Practical entries keyed by session, values are the occupied periods.
fn practical_sessions(view: &ScheduleView) -> HashMap<(String, String, Weekday), Vec<u8>> {
    let mut sessions: HashMap<(String, String, Weekday), Vec<u8>> = HashMap::new();
    for e in view.class_entries().filter(|e| e.is_practical) {
        sessions
            .entry((e.group.clone(), e.subject.clone(), e.day))
            .or_default()
            .push(e.period);
    }
    sessions
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use timetabler_core::{Batch, NoCommitments, ScheduleConfig, TimeOff};

    fn problem() -> ScheduleProblem {
        let config = ScheduleConfig::new("Fall 2025").batch(Batch::new("23SW", 3).size(30));
        let mut problem = ScheduleProblem::new(config);
        problem.subjects = vec![
            Subject::new("SW301", "Databases", "23SW").credits(2),
            Subject::new("SW302", "DB Lab", "23SW").credits(1).practical(),
        ];
        problem.teachers = vec![Teacher::new("Aisha Khan", "aisha@uni.edu")
            .teaches("SW301", "23SW")
            .teaches("SW302", "23SW")];
        problem.classrooms = vec![
            Classroom::new("CR-1").capacity(60),
            Classroom::new("LAB-1").capacity(40).lab(),
        ];
        problem
    }

    fn class(subject: &str, room: &str, day: Weekday, period: u8, practical: bool) -> ScheduledEntry {
        ScheduledEntry::Class(ClassEntry {
            group: "23SW".into(),
            subject: subject.into(),
            teacher: "aisha@uni.edu".into(),
            room: room.into(),
            day,
            period,
            is_practical: practical,
        })
    }

    /// A fully consistent week for the fixture problem.
    fn clean_entries() -> Vec<ScheduledEntry> {
        vec![
            class("SW301", "CR-1", Weekday::Mon, 1, false),
            class("SW302", "LAB-1", Weekday::Mon, 2, true),
            class("SW302", "LAB-1", Weekday::Mon, 3, true),
            class("SW302", "LAB-1", Weekday::Mon, 4, true),
            class("SW301", "CR-1", Weekday::Tue, 1, false),
            // Second Tuesday class so the day is not a singleton.
            ScheduledEntry::Class(ClassEntry {
                group: "23SW".into(),
                subject: "SW301".into(),
                teacher: "aisha@uni.edu".into(),
                room: "CR-1".into(),
                day: Weekday::Tue,
                period: 2,
                is_practical: false,
            }),
        ]
    }

    #[test]
    fn clean_schedule_mostly_validates() {
        // The deliberately doubled Tuesday SW301 trips distribution and
        // frequency; everything else is quiet.
        let p = problem();
        let entries = clean_entries();
        let view = ScheduleView::new(&p, &entries, &NoCommitments);
        let v = validate(&view);

        assert_eq!(v.count_for(ConstraintKind::TeacherDoubleBooking), 0);
        assert_eq!(v.count_for(ConstraintKind::RoomDoubleBooking), 0);
        assert_eq!(v.count_for(ConstraintKind::SameLabRule), 0);
        assert_eq!(v.count_for(ConstraintKind::PracticalBlockIntegrity), 0);
        assert_eq!(v.count_for(ConstraintKind::TheoryDistribution), 1);
        assert_eq!(v.count_for(ConstraintKind::SubjectFrequency), 1);
    }

    #[test]
    fn detects_teacher_double_booking() {
        let p = problem();
        let entries = vec![
            class("SW301", "CR-1", Weekday::Mon, 1, false),
            class("SW302", "LAB-1", Weekday::Mon, 1, false),
        ];
        let view = ScheduleView::new(&p, &entries, &NoCommitments);
        let out = check_teacher_double_booking(&view);
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].severity, Severity::Critical);
        assert_eq!(out[0].period, Some(1));
    }

    #[test]
    fn detects_room_double_booking() {
        let mut p = problem();
        p.config.batches.push(Batch::new("24SW", 1).size(30));
        p.subjects.push(Subject::new("CS101", "Intro", "24SW"));
        p.teachers
            .push(Teacher::new("Bilal Shah", "bilal@uni.edu").teaches("CS101", "24SW"));

        let mut entries = vec![class("SW301", "CR-1", Weekday::Mon, 1, false)];
        entries.push(ScheduledEntry::Class(ClassEntry {
            group: "24SW".into(),
            subject: "CS101".into(),
            teacher: "bilal@uni.edu".into(),
            room: "CR-1".into(),
            day: Weekday::Mon,
            period: 1,
            is_practical: false,
        }));
        let view = ScheduleView::new(&p, &entries, &NoCommitments);
        assert_eq!(check_room_double_booking(&view).len(), 1);
    }

    #[test]
    fn detects_unavailability_as_critical() {
        let mut p = problem();
        p.teachers[0] = Teacher::new("Aisha Khan", "aisha@uni.edu")
            .teaches("SW301", "23SW")
            .time_off(TimeOff::periods(Weekday::Mon, vec![1, 2]));

        let entries = vec![class("SW301", "CR-1", Weekday::Mon, 2, false)];
        let view = ScheduleView::new(&p, &entries, &NoCommitments);
        let out = check_teacher_unavailability(&view);
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].severity, Severity::Critical);
    }

    #[test]
    fn detects_split_lab_session() {
        let p = problem();
        let entries = vec![
            class("SW302", "LAB-1", Weekday::Mon, 1, true),
            class("SW302", "LAB-1", Weekday::Mon, 2, true),
            class("SW302", "CR-1", Weekday::Mon, 3, true),
        ];
        let view = ScheduleView::new(&p, &entries, &NoCommitments);
        assert_eq!(check_same_lab(&view).len(), 1);
        // CR-1 is also the wrong room type for a practical.
        assert_eq!(check_room_type(&view).len(), 1);
    }

    #[test]
    fn detects_broken_block() {
        let p = problem();
        let entries = vec![
            class("SW302", "LAB-1", Weekday::Mon, 1, true),
            class("SW302", "LAB-1", Weekday::Mon, 2, true),
            class("SW302", "LAB-1", Weekday::Mon, 5, true),
        ];
        let view = ScheduleView::new(&p, &entries, &NoCommitments);
        assert_eq!(check_practical_blocks(&view).len(), 1);
    }

    #[test]
    fn detects_friday_overrun_without_practical() {
        let p = problem();
        let entries = vec![
            class("SW301", "CR-1", Weekday::Fri, 1, false),
            class("SW301", "CR-1", Weekday::Fri, 4, false),
        ];
        let view = ScheduleView::new(&p, &entries, &NoCommitments);
        let out = check_friday_limit(&view);
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].period, Some(4));
    }

    #[test]
    fn friday_limit_relaxes_with_practical() {
        let p = problem();
        let entries = vec![
            class("SW302", "LAB-1", Weekday::Fri, 1, true),
            class("SW302", "LAB-1", Weekday::Fri, 2, true),
            class("SW302", "LAB-1", Weekday::Fri, 3, true),
            class("SW301", "CR-1", Weekday::Fri, 4, false),
        ];
        let view = ScheduleView::new(&p, &entries, &NoCommitments);
        assert!(check_friday_limit(&view).is_empty());
    }

    #[test]
    fn detects_singleton_day() {
        let p = problem();
        let entries = vec![class("SW301", "CR-1", Weekday::Mon, 1, false)];
        let view = ScheduleView::new(&p, &entries, &NoCommitments);
        assert_eq!(check_minimum_daily(&view).len(), 1);
    }

    #[test]
    fn detects_practical_only_day() {
        let p = problem();
        let entries = vec![
            class("SW302", "LAB-1", Weekday::Mon, 1, true),
            class("SW302", "LAB-1", Weekday::Mon, 2, true),
            class("SW302", "LAB-1", Weekday::Mon, 3, true),
        ];
        let view = ScheduleView::new(&p, &entries, &NoCommitments);
        assert_eq!(check_theory_practical_mix(&view).len(), 1);
    }

    #[test]
    fn detects_wide_gap() {
        let p = problem();
        let entries = vec![
            class("SW301", "CR-1", Weekday::Mon, 1, false),
            class("SW302", "CR-1", Weekday::Mon, 4, false),
        ];
        let view = ScheduleView::new(&p, &entries, &NoCommitments);
        let out = check_compact_schedule(&view);
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].severity, Severity::Low);
    }

    #[test]
    fn thesis_day_rules() {
        let config = ScheduleConfig::new("Fall 2025").batch(Batch::new("21SW", 7).size(30));
        let mut p = ScheduleProblem::new(config);
        p.subjects = vec![Subject::new("SW415", "SPM", "21SW")];
        p.teachers = vec![Teacher::new("Aisha Khan", "aisha@uni.edu").teaches("SW415", "21SW")];
        p.classrooms = vec![Classroom::new("CR-1").capacity(60)];

        // Regular class on Wednesday, no thesis entries at all.
        let entries = vec![ScheduledEntry::Class(ClassEntry {
            group: "21SW".into(),
            subject: "SW415".into(),
            teacher: "aisha@uni.edu".into(),
            room: "CR-1".into(),
            day: Weekday::Wed,
            period: 1,
            is_practical: false,
        })];
        let view = ScheduleView::new(&p, &entries, &NoCommitments);
        let out = check_thesis_day(&view);
        assert_eq!(out.len(), 2, "intruder + missing thesis");
    }

    #[test]
    fn cross_semester_conflicts_are_flagged() {
        struct Busy;
        impl ConflictOracle for Busy {
            fn teacher_busy(&self, _t: &str, day: Weekday, period: u8) -> bool {
                day == Weekday::Mon && period == 1
            }
            fn describe(&self, _t: &str, _d: Weekday, _p: u8) -> Vec<String> {
                vec!["Spring 2025: CS101 for 24CS".into()]
            }
        }

        let p = problem();
        let entries = vec![class("SW301", "CR-1", Weekday::Mon, 1, false)];
        let view = ScheduleView::new(&p, &entries, &Busy);
        let out = check_cross_semester(&view);
        assert_eq!(out.len(), 1);
        assert!(out[0].description.contains("Spring 2025"));
    }

    #[test]
    fn harmony_drops_with_violations() {
        let p = problem();
        let clean: Vec<ScheduledEntry> = Vec::new();
        let view = ScheduleView::new(&p, &clean, &NoCommitments);
        let v = validate(&view);
        // Nothing scheduled: frequency violations for both subjects.
        assert_eq!(v.count_for(ConstraintKind::SubjectFrequency), 2);
        assert!(v.harmony_score < 100.0);

        let entries = clean_entries();
        let view = ScheduleView::new(&p, &entries, &NoCommitments);
        let better = validate(&view);
        assert!(better.harmony_score > v.harmony_score);
    }

    #[test]
    fn clash_detection_needs_both_sides() {
        let breakdown = vec![
            ConstraintCount {
                kind: ConstraintKind::MinimumDailyClasses,
                count: 2,
            },
            ConstraintCount {
                kind: ConstraintKind::FridayTimeLimit,
                count: 1,
            },
        ];
        let clashes = detect_clashes(&breakdown);
        assert_eq!(clashes.len(), 1);
        assert_eq!(clashes[0].a, ConstraintKind::MinimumDailyClasses);

        let one_sided = vec![ConstraintCount {
            kind: ConstraintKind::FridayTimeLimit,
            count: 1,
        }];
        assert!(detect_clashes(&one_sided).is_empty());
    }

    #[test]
    fn consecutive_theory_run_is_flagged_once() {
        let p = problem();
        let entries = vec![
            class("SW301", "CR-1", Weekday::Mon, 1, false),
            class("SW301", "CR-1", Weekday::Mon, 2, false),
            class("SW302", "CR-1", Weekday::Mon, 3, false),
        ];
        let view = ScheduleView::new(&p, &entries, &NoCommitments);
        let out = check_teacher_consecutive_theory(&view);
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].period, Some(3));
    }

    #[test]
    fn capacity_overflow_is_flagged() {
        let mut p = problem();
        p.classrooms[0] = Classroom::new("CR-1").capacity(10);
        let entries = vec![class("SW301", "CR-1", Weekday::Mon, 1, false)];
        let view = ScheduleView::new(&p, &entries, &NoCommitments);
        assert_eq!(check_room_capacity(&view).len(), 1);
    }
}
