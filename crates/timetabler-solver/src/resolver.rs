//! Iterative constraint repair.
//!
//! The resolver re-validates, picks violations in a fixed priority order,
//! applies one targeted repair per violation and re-validates again. A
//! repair is only kept when the re-check shows no new violation of a
//! higher-priority constraint and some actual progress — otherwise the
//! mutation is rolled back, so a fix can never merely relocate its own
//! problem upward.
//!
//! State machine: ITERATING → CONVERGED (zero violations) or CAPPED
//! (iteration bound). A stalled or oscillating violation count escalates
//! the strategy first to gap-filling, then to aggressive repairs that may
//! swap sibling entries around. Hitting the cap is a normal terminal
//! state, not an error.

use std::cmp::Reverse;
use std::collections::HashMap;

use chrono::Weekday;
use tracing::{debug, info};

use timetabler_core::{
    ClassEntry, ClassGroup, ConflictOracle, ConstraintKind, ScheduleProblem, ScheduledEntry,
    Subject, Teacher, ThesisEntry, Violation,
};

use crate::allocator::RoomAllocator;
use crate::consistency;
use crate::context::AllocationContext;
use crate::generator::{Generator, PlacementResult};
use crate::validator::{validate, ScheduleView, Validation};

// ============================================================================
// Outcome types
// ============================================================================

/// Terminal state of a resolution run.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ResolverStatus {
    /// Zero violations remain.
    Converged,
    /// The iteration cap was reached with violations outstanding.
    Capped,
}

/// Escalation ladder for repair passes.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord)]
pub enum RepairStrategy {
    Targeted,
    GapFill,
    Aggressive,
}

impl std::fmt::Display for RepairStrategy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RepairStrategy::Targeted => write!(f, "targeted"),
            RepairStrategy::GapFill => write!(f, "gap-fill"),
            RepairStrategy::Aggressive => write!(f, "aggressive"),
        }
    }
}

/// One validate → prioritize → repair pass.
#[derive(Clone, Debug)]
pub struct IterationRecord {
    pub iteration: u32,
    pub strategy: RepairStrategy,
    pub violations_before: usize,
    pub violations_after: usize,
    pub repairs_attempted: usize,
    pub repairs_applied: usize,
}

/// Result of a resolution run.
#[derive(Clone, Debug)]
pub struct Resolution {
    pub entries: Vec<ScheduledEntry>,
    pub status: ResolverStatus,
    pub initial_violations: usize,
    pub final_violations: usize,
    pub iterations: Vec<IterationRecord>,
}

impl Resolution {
    pub fn converged(&self) -> bool {
        self.status == ResolverStatus::Converged
    }
}

/// Repair order: spatial conflicts first, then structural rules, then
/// teacher conflicts, then policy rules, remainder by severity.
const REPAIR_PRIORITY: [ConstraintKind; 19] = [
    ConstraintKind::RoomDoubleBooking,
    ConstraintKind::SameLabRule,
    ConstraintKind::PracticalBlockIntegrity,
    ConstraintKind::SubjectFrequency,
    ConstraintKind::TeacherDoubleBooking,
    ConstraintKind::TeacherUnavailability,
    ConstraintKind::CrossSemesterConflict,
    ConstraintKind::GroupDoubleBooking,
    ConstraintKind::FridayTimeLimit,
    ConstraintKind::MinimumDailyClasses,
    ConstraintKind::TheoryPracticalMix,
    ConstraintKind::TeacherQualification,
    ConstraintKind::ThesisDay,
    ConstraintKind::RoomTypeRule,
    ConstraintKind::RoomCapacity,
    ConstraintKind::TeacherDailyLimit,
    ConstraintKind::TheoryDistribution,
    ConstraintKind::CompactSchedule,
    ConstraintKind::TeacherConsecutiveTheory,
];

fn rank(kind: ConstraintKind) -> usize {
    REPAIR_PRIORITY
        .iter()
        .position(|k| *k == kind)
        .unwrap_or(REPAIR_PRIORITY.len())
}

// ============================================================================
// Resolver
// ============================================================================

/// The repair loop for one scheduling run.
pub struct Resolver<'a> {
    problem: &'a ScheduleProblem,
    oracle: &'a dyn ConflictOracle,
    allocator: RoomAllocator<'a>,
    groups: Vec<ClassGroup>,
}

impl<'a> Resolver<'a> {
    pub fn new(problem: &'a ScheduleProblem, oracle: &'a dyn ConflictOracle) -> Self {
        Self {
            problem,
            oracle,
            allocator: RoomAllocator::new(&problem.classrooms, &problem.config.params),
            groups: problem.config.class_groups(),
        }
    }

    /// Run the repair loop to convergence or the iteration cap.
    pub fn resolve(&self, mut entries: Vec<ScheduledEntry>) -> Resolution {
        let max_iterations = self.problem.config.params.max_iterations;
        let initial_violations = self.validation(&entries).total();
        let mut history = vec![initial_violations];
        let mut strategy = RepairStrategy::Targeted;
        let mut iterations = Vec::new();
        let mut status = ResolverStatus::Capped;

        for iteration in 1..=max_iterations {
            let validation = self.validation(&entries);
            if validation.is_clean() {
                status = ResolverStatus::Converged;
                break;
            }
            let violations_before = validation.total();

            if is_stalled(&history) {
                strategy = escalate(strategy);
                info!(%strategy, iteration, "no progress, escalating repair strategy");
            }
            if strategy >= RepairStrategy::GapFill {
                self.gap_fill_pass(&mut entries);
            }

            let ordered = order_violations(self.problem, validation.violations);
            let mut repairs_attempted = 0;
            let mut repairs_applied = 0;
            for violation in &ordered {
                repairs_attempted += 1;
                if self.try_repair(&mut entries, violation, strategy) {
                    repairs_applied += 1;
                }
            }

            let violations_after = self.validation(&entries).total();
            debug!(
                iteration,
                violations_before, violations_after, repairs_applied, "resolver iteration"
            );
            history.push(violations_after);
            iterations.push(IterationRecord {
                iteration,
                strategy,
                violations_before,
                violations_after,
                repairs_attempted,
                repairs_applied,
            });
        }

        let final_violations = self.validation(&entries).total();
        if final_violations == 0 {
            status = ResolverStatus::Converged;
        }
        Resolution {
            entries,
            status,
            initial_violations,
            final_violations,
            iterations,
        }
    }

    fn validation(&self, entries: &[ScheduledEntry]) -> Validation {
        let view = ScheduleView::new(self.problem, entries, self.oracle);
        validate(&view)
    }

    /// Apply one repair; keep it only if re-validation shows progress and
    /// no higher-priority constraint got worse.
    fn try_repair(
        &self,
        entries: &mut Vec<ScheduledEntry>,
        violation: &Violation,
        strategy: RepairStrategy,
    ) -> bool {
        let before = self.counts_by_kind(entries);
        let snapshot = entries.clone();

        if !self.apply_repair(entries, violation, strategy) {
            return false;
        }

        let after = self.counts_by_kind(entries);
        let own_rank = rank(violation.kind);
        let regressed_above = REPAIR_PRIORITY.iter().take(own_rank).any(|kind| {
            after.get(kind).copied().unwrap_or(0) > before.get(kind).copied().unwrap_or(0)
        });
        let own_improved = after.get(&violation.kind).copied().unwrap_or(0)
            < before.get(&violation.kind).copied().unwrap_or(0);
        let total_before: usize = before.values().sum();
        let total_after: usize = after.values().sum();

        if regressed_above || (!own_improved && total_after >= total_before) {
            *entries = snapshot;
            return false;
        }
        true
    }

    fn counts_by_kind(&self, entries: &[ScheduledEntry]) -> HashMap<ConstraintKind, usize> {
        self.validation(entries)
            .breakdown
            .iter()
            .map(|c| (c.kind, c.count))
            .collect()
    }

    fn apply_repair(
        &self,
        entries: &mut Vec<ScheduledEntry>,
        v: &Violation,
        strategy: RepairStrategy,
    ) -> bool {
        match v.kind {
            ConstraintKind::RoomDoubleBooking => self.fix_room_conflict(entries, v, strategy),
            ConstraintKind::SameLabRule => {
                consistency::enforce_same_lab(self.problem, entries) > 0
            }
            ConstraintKind::PracticalBlockIntegrity => self.rebuild_practical(entries, v),
            ConstraintKind::SubjectFrequency => self.fix_frequency(entries, v),
            ConstraintKind::TeacherDoubleBooking
            | ConstraintKind::TeacherUnavailability
            | ConstraintKind::CrossSemesterConflict
            | ConstraintKind::TeacherQualification => {
                self.fix_teacher_conflict(entries, v, strategy)
            }
            ConstraintKind::GroupDoubleBooking => self.fix_group_conflict(entries, v, strategy),
            ConstraintKind::FridayTimeLimit => self.fix_friday(entries, v, strategy),
            ConstraintKind::MinimumDailyClasses | ConstraintKind::TheoryPracticalMix => {
                self.fix_thin_day(entries, v, strategy)
            }
            ConstraintKind::ThesisDay => self.fix_thesis(entries, v, strategy),
            ConstraintKind::CompactSchedule => self.fix_gap(entries, v),
            ConstraintKind::TheoryDistribution => self.fix_distribution(entries, v, strategy),
            ConstraintKind::RoomCapacity | ConstraintKind::RoomTypeRule => {
                self.fix_room_assignment(entries, v, strategy)
            }
            ConstraintKind::TeacherDailyLimit | ConstraintKind::TeacherConsecutiveTheory => {
                self.fix_teacher_load(entries, v, strategy)
            }
        }
    }

    // ------------------------------------------------------------------
    // Individual repairs
    // ------------------------------------------------------------------

    /// Two classes in one room: keep the practical (or the senior group),
    /// rehouse or move the other.
    fn fix_room_conflict(
        &self,
        entries: &mut Vec<ScheduledEntry>,
        v: &Violation,
        strategy: RepairStrategy,
    ) -> bool {
        let (Some(room), Some(day), Some(period)) = (v.room.as_deref(), v.day, v.period) else {
            return false;
        };
        let mut idxs: Vec<usize> = entries
            .iter()
            .enumerate()
            .filter(|(_, e)| {
                e.room() == Some(room) && e.day() == day && e.period() == period
            })
            .map(|(i, _)| i)
            .collect();
        if idxs.len() < 2 {
            return false;
        }
        // Keep practicals and senior groups in place; evict the rest.
        idxs.sort_by_key(|&i| {
            let practical = entries[i].is_practical();
            let senior = self
                .group_of(entries[i].group())
                .is_some_and(ClassGroup::is_senior);
            Reverse((practical, senior))
        });
        for &idx in &idxs[1..] {
            if entries[idx].is_practical() {
                if self.relocate_session_room(entries, idx) {
                    return true;
                }
            } else if self.rehouse_theory(entries, idx)
                || self.move_theory_entry(entries, idx, strategy)
            {
                return true;
            }
        }
        false
    }

    /// Tear the session down and place it again as one block.
    fn rebuild_practical(&self, entries: &mut Vec<ScheduledEntry>, v: &Violation) -> bool {
        let (Some(group_code), Some(subject_code)) = (v.group.as_deref(), v.subject.as_deref())
        else {
            return false;
        };
        let (Some(group), Some(subject)) =
            (self.group_of(group_code), self.subject_of(subject_code))
        else {
            return false;
        };

        let removed: Vec<ScheduledEntry> = extract(entries, |e| {
            e.group() == group_code && e.subject() == Some(subject_code)
        });
        let mut ctx = AllocationContext::from_entries(entries);
        let generator = Generator::new(self.problem, self.oracle);
        match generator.place_practical(group, subject, &mut ctx) {
            PlacementResult::Placed(new_entries) => {
                entries.extend(new_entries);
                true
            }
            _ => {
                entries.extend(removed);
                false
            }
        }
    }

    /// Add the missing classes or drop the surplus.
    fn fix_frequency(&self, entries: &mut Vec<ScheduledEntry>, v: &Violation) -> bool {
        let (Some(group_code), Some(subject_code)) = (v.group.as_deref(), v.subject.as_deref())
        else {
            return false;
        };
        let (Some(group), Some(subject)) =
            (self.group_of(group_code), self.subject_of(subject_code))
        else {
            return false;
        };

        if subject.is_practical {
            // Wrong period count for a block only has one honest fix.
            return self.rebuild_practical(entries, v);
        }

        let have = entries
            .iter()
            .filter(|e| e.group() == group_code && e.subject() == Some(subject_code))
            .count();
        let want = usize::from(subject.credits);

        if have < want {
            self.place_one_theory(entries, group, subject)
        } else if have > want {
            // Drop a duplicate-day class first, otherwise the week's last.
            let idx = self
                .duplicate_day_entry(entries, group_code, subject_code)
                .or_else(|| self.last_entry_of(entries, group_code, subject_code));
            match idx {
                Some(idx) => {
                    entries.remove(idx);
                    true
                }
                None => false,
            }
        } else {
            false
        }
    }

    /// Swap in another qualified teacher, otherwise move the class.
    fn fix_teacher_conflict(
        &self,
        entries: &mut Vec<ScheduledEntry>,
        v: &Violation,
        strategy: RepairStrategy,
    ) -> bool {
        let Some(teacher) = v.teacher.as_deref() else {
            return false;
        };
        let (Some(day), Some(period)) = (v.day, v.period) else {
            return false;
        };
        let mut idxs: Vec<usize> = entries
            .iter()
            .enumerate()
            .filter(|(_, e)| {
                e.teacher() == Some(teacher) && e.day() == day && e.period() == period
            })
            .map(|(i, _)| i)
            .collect();
        if idxs.is_empty() {
            return false;
        }
        // For a double-booking leave the practical (or first) entry alone.
        idxs.sort_by_key(|&i| Reverse(entries[i].is_practical()));
        let fix_idxs: Vec<usize> = if v.kind == ConstraintKind::TeacherDoubleBooking {
            idxs[1..].to_vec()
        } else {
            idxs
        };

        for idx in fix_idxs {
            if entries[idx].is_practical() {
                if self.reassign_session_teacher(entries, idx)
                    || self.relocate_whole_session(entries, idx)
                {
                    return true;
                }
            } else if self.reassign_teacher(entries, idx)
                || self.move_theory_entry(entries, idx, strategy)
            {
                return true;
            }
        }
        false
    }

    fn fix_group_conflict(
        &self,
        entries: &mut Vec<ScheduledEntry>,
        v: &Violation,
        strategy: RepairStrategy,
    ) -> bool {
        let (Some(group), Some(day), Some(period)) = (v.group.as_deref(), v.day, v.period) else {
            return false;
        };
        let idxs: Vec<usize> = entries
            .iter()
            .enumerate()
            .filter(|(_, e)| e.group() == group && e.day() == day && e.period() == period)
            .map(|(i, _)| i)
            .collect();
        // Move the first movable theory entry; thesis and practicals stay.
        for idx in idxs {
            if !entries[idx].is_practical() && !entries[idx].is_thesis() {
                if self.move_theory_entry(entries, idx, strategy) {
                    return true;
                }
            }
        }
        false
    }

    /// Pull the offending Friday class back before the closing period, or
    /// off Friday entirely.
    fn fix_friday(
        &self,
        entries: &mut Vec<ScheduledEntry>,
        v: &Violation,
        strategy: RepairStrategy,
    ) -> bool {
        let (Some(group), Some(subject), Some(period)) =
            (v.group.as_deref(), v.subject.as_deref(), v.period)
        else {
            return false;
        };
        let Some(idx) = entries.iter().position(|e| {
            e.group() == group
                && e.subject() == Some(subject)
                && e.day() == Weekday::Fri
                && e.period() == period
        }) else {
            return false;
        };
        self.move_theory_entry(entries, idx, strategy)
    }

    /// A day with a lone class (or practicals only): pull a theory class in
    /// from a denser day, or move the lone class away.
    fn fix_thin_day(
        &self,
        entries: &mut Vec<ScheduledEntry>,
        v: &Violation,
        strategy: RepairStrategy,
    ) -> bool {
        let (Some(group_code), Some(day)) = (v.group.as_deref(), v.day) else {
            return false;
        };
        if self.group_of(group_code).is_none() {
            return false;
        }
        let min_daily = usize::from(self.problem.config.params.min_daily_classes);

        // Donor days keep at least the daily minimum after giving one up.
        let mut day_counts: HashMap<Weekday, usize> = HashMap::new();
        for e in entries.iter().filter(|e| e.group() == group_code) {
            *day_counts.entry(e.day()).or_insert(0) += 1;
        }
        let donor_idxs: Vec<usize> = entries
            .iter()
            .enumerate()
            .filter(|(_, e)| {
                e.group() == group_code
                    && !e.is_practical()
                    && !e.is_thesis()
                    && e.day() != day
                    && day_counts.get(&e.day()).copied().unwrap_or(0) > min_daily
            })
            .map(|(i, _)| i)
            .collect();

        for idx in donor_idxs {
            if self.move_theory_entry_to_day(entries, idx, day) {
                return true;
            }
        }

        // No donor worked: move the lone class somewhere better.
        if let Some(idx) = entries.iter().position(|e| {
            e.group() == group_code && e.day() == day && !e.is_practical() && !e.is_thesis()
        }) {
            return self.move_theory_entry(entries, idx, strategy);
        }
        false
    }

    /// Clear the thesis day and backfill missing thesis entries.
    fn fix_thesis(
        &self,
        entries: &mut Vec<ScheduledEntry>,
        v: &Violation,
        strategy: RepairStrategy,
    ) -> bool {
        let Some(group_code) = v.group.as_deref() else {
            return false;
        };
        let Some(group) = self.group_of(group_code) else {
            return false;
        };
        let params = &self.problem.config.params;

        if !group.is_final_year() {
            // Stray thesis entries on a non-final-year group: drop them.
            let before = entries.len();
            entries.retain(|e| !(e.is_thesis() && e.group() == group_code));
            return entries.len() != before;
        }

        // Evict intruding regular classes first.
        if let Some(idx) = entries.iter().position(|e| {
            e.group() == group_code && e.day() == params.thesis_day && !e.is_thesis()
        }) {
            if entries[idx].is_practical() {
                return self.relocate_whole_session(entries, idx);
            }
            return self.move_theory_entry(entries, idx, strategy);
        }

        // Backfill thesis periods.
        let have: Vec<u8> = entries
            .iter()
            .filter(|e| e.group() == group_code && e.is_thesis())
            .map(|e| e.period())
            .collect();
        let mut added = false;
        for period in 1..=params.thesis_periods.min(self.problem.config.periods_per_day) {
            if !have.contains(&period) {
                entries.push(ScheduledEntry::Thesis(ThesisEntry {
                    group: group_code.to_string(),
                    day: params.thesis_day,
                    period,
                }));
                added = true;
            }
        }
        added
    }

    /// Close one gap by pulling the day's last class into it.
    fn fix_gap(&self, entries: &mut Vec<ScheduledEntry>, v: &Violation) -> bool {
        let (Some(group), Some(day)) = (v.group.as_deref(), v.day) else {
            return false;
        };
        self.close_gap_on(entries, group, day)
    }

    /// Same theory subject twice on a day: move one occurrence elsewhere.
    fn fix_distribution(
        &self,
        entries: &mut Vec<ScheduledEntry>,
        v: &Violation,
        strategy: RepairStrategy,
    ) -> bool {
        let (Some(group), Some(subject), Some(day)) =
            (v.group.as_deref(), v.subject.as_deref(), v.day)
        else {
            return false;
        };
        let idxs: Vec<usize> = entries
            .iter()
            .enumerate()
            .filter(|(_, e)| {
                e.group() == group && e.subject() == Some(subject) && e.day() == day
            })
            .map(|(i, _)| i)
            .collect();
        if idxs.len() < 2 {
            return false;
        }
        // Move the later occurrence.
        let idx = *idxs.iter().max_by_key(|&&i| entries[i].period()).unwrap();
        self.move_theory_entry(entries, idx, strategy)
    }

    /// Wrong or overflowing room: rehouse in place, else move.
    fn fix_room_assignment(
        &self,
        entries: &mut Vec<ScheduledEntry>,
        v: &Violation,
        strategy: RepairStrategy,
    ) -> bool {
        let (Some(room), Some(day), Some(period)) = (v.room.as_deref(), v.day, v.period) else {
            return false;
        };
        let Some(idx) = entries.iter().position(|e| {
            e.room() == Some(room)
                && e.day() == day
                && e.period() == period
                && v.group.as_deref().map_or(true, |g| e.group() == g)
        }) else {
            return false;
        };
        if entries[idx].is_practical() {
            return self.relocate_session_room(entries, idx)
                || self.relocate_whole_session(entries, idx);
        }
        self.rehouse_theory(entries, idx) || self.move_theory_entry(entries, idx, strategy)
    }

    /// Teacher over daily cap or too many consecutive periods: hand one
    /// class to a colleague, else move it.
    fn fix_teacher_load(
        &self,
        entries: &mut Vec<ScheduledEntry>,
        v: &Violation,
        strategy: RepairStrategy,
    ) -> bool {
        let (Some(teacher), Some(day)) = (v.teacher.as_deref(), v.day) else {
            return false;
        };
        let mut idxs: Vec<usize> = entries
            .iter()
            .enumerate()
            .filter(|(_, e)| {
                e.teacher() == Some(teacher) && e.day() == day && !e.is_practical()
            })
            .map(|(i, _)| i)
            .collect();
        // Prefer the entry the violation points at, otherwise the latest.
        idxs.sort_by_key(|&i| Reverse(entries[i].period()));
        if let Some(period) = v.period {
            if let Some(pos) = idxs.iter().position(|&i| entries[i].period() == period) {
                idxs.swap(0, pos);
            }
        }
        for idx in idxs {
            if self.reassign_teacher(entries, idx) || self.move_theory_entry(entries, idx, strategy)
            {
                return true;
            }
        }
        false
    }

    // ------------------------------------------------------------------
    // Movement primitives
    // ------------------------------------------------------------------

    /// Find a new conflict-free slot for a theory class.
    fn move_theory_entry(
        &self,
        entries: &mut Vec<ScheduledEntry>,
        idx: usize,
        strategy: RepairStrategy,
    ) -> bool {
        let Some(class) = entries[idx].as_class().cloned() else {
            return false;
        };
        let Some(group) = self.group_of(&class.group) else {
            return false;
        };
        let mut ctx = AllocationContext::from_entries(entries);
        ctx.release(&entries[idx]);

        // Days already teaching this subject are out (distribution rule).
        let busy_days: Vec<Weekday> = entries
            .iter()
            .enumerate()
            .filter(|(i, e)| {
                *i != idx && e.group() == class.group && e.subject() == Some(&*class.subject)
            })
            .map(|(_, e)| e.day())
            .collect();

        for &day in &self.problem.config.days {
            if self.is_thesis_day(group, day) || busy_days.contains(&day) {
                continue;
            }
            let cutoff = self.day_cutoff(group, day, &ctx);
            for period in 1..=cutoff {
                if day == class.day && period == class.period {
                    continue;
                }
                if !ctx.is_group_free(&class.group, day, period) {
                    continue;
                }
                let Some(teacher) = self.usable_teacher(&class, group, &ctx, day, period) else {
                    continue;
                };
                let Some(room) = self.allocator.for_theory(&ctx, group, day, period) else {
                    continue;
                };
                let moved = ClassEntry {
                    day,
                    period,
                    teacher: teacher.email.clone(),
                    room: room.name.clone(),
                    ..class
                };
                entries[idx] = ScheduledEntry::Class(moved);
                return true;
            }
        }

        if strategy == RepairStrategy::Aggressive {
            return self.swap_with_sibling(entries, idx);
        }
        false
    }

    /// Move a theory class onto a specific day.
    fn move_theory_entry_to_day(
        &self,
        entries: &mut Vec<ScheduledEntry>,
        idx: usize,
        day: Weekday,
    ) -> bool {
        let Some(class) = entries[idx].as_class().cloned() else {
            return false;
        };
        let Some(group) = self.group_of(&class.group) else {
            return false;
        };
        if self.is_thesis_day(group, day) {
            return false;
        }
        // Respect the one-class-per-day spread for the subject.
        if entries.iter().enumerate().any(|(i, e)| {
            i != idx
                && e.group() == class.group
                && e.subject() == Some(&*class.subject)
                && e.day() == day
        }) {
            return false;
        }

        let mut ctx = AllocationContext::from_entries(entries);
        ctx.release(&entries[idx]);

        // Adjacent-to-existing periods first so the day stays compact.
        let occupied = ctx.group_periods(&class.group, day, self.problem.config.periods_per_day);
        let cutoff = self.day_cutoff(group, day, &ctx);
        let mut candidates: Vec<u8> = Vec::new();
        for &p in &occupied {
            for adjacent in [p.saturating_sub(1), p + 1] {
                if adjacent >= 1 && adjacent <= cutoff && !candidates.contains(&adjacent) {
                    candidates.push(adjacent);
                }
            }
        }
        for p in 1..=cutoff {
            if !candidates.contains(&p) {
                candidates.push(p);
            }
        }

        for period in candidates {
            if !ctx.is_group_free(&class.group, day, period) {
                continue;
            }
            let Some(teacher) = self.usable_teacher(&class, group, &ctx, day, period) else {
                continue;
            };
            let Some(room) = self.allocator.for_theory(&ctx, group, day, period) else {
                continue;
            };
            entries[idx] = ScheduledEntry::Class(ClassEntry {
                day,
                period,
                teacher: teacher.email.clone(),
                room: room.name.clone(),
                ..class
            });
            return true;
        }
        false
    }

    /// Give the class a different room at the same slot.
    fn rehouse_theory(&self, entries: &mut Vec<ScheduledEntry>, idx: usize) -> bool {
        let Some(class) = entries[idx].as_class().cloned() else {
            return false;
        };
        let Some(group) = self.group_of(&class.group) else {
            return false;
        };
        let mut ctx = AllocationContext::from_entries(entries);
        ctx.release(&entries[idx]);
        let Some(room) = self.allocator.for_theory(&ctx, group, class.day, class.period) else {
            return false;
        };
        if room.name == class.room {
            return false;
        }
        entries[idx].as_class_mut().expect("checked above").room = room.name.clone();
        true
    }

    /// Move every block of a practical session into a different lab at the
    /// same periods.
    fn relocate_session_room(&self, entries: &mut Vec<ScheduledEntry>, idx: usize) -> bool {
        let Some(class) = entries[idx].as_class().cloned() else {
            return false;
        };
        let session: Vec<usize> = entries
            .iter()
            .enumerate()
            .filter(|(_, e)| {
                e.group() == class.group
                    && e.subject() == Some(&*class.subject)
                    && e.day() == class.day
                    && e.is_practical()
            })
            .map(|(i, _)| i)
            .collect();
        let periods: Vec<u8> = session.iter().map(|&i| entries[i].period()).collect();
        let Some(group) = self.group_of(&class.group) else {
            return false;
        };

        let mut ctx = AllocationContext::from_entries(entries);
        for &i in &session {
            ctx.release(&entries[i]);
        }
        let start = periods.iter().copied().min().unwrap_or(1);
        let len = periods.len() as u8;
        let Some(lab) = self
            .allocator
            .for_practical(&ctx, group, &class.subject, class.day, start, len)
        else {
            return false;
        };
        if lab.name == class.room {
            return false;
        }
        for i in session {
            if let Some(c) = entries[i].as_class_mut() {
                c.room = lab.name.clone();
            }
        }
        true
    }

    /// Tear down and re-place a practical session anywhere in the week.
    fn relocate_whole_session(&self, entries: &mut Vec<ScheduledEntry>, idx: usize) -> bool {
        let Some(class) = entries[idx].as_class().cloned() else {
            return false;
        };
        let v = Violation::new(ConstraintKind::PracticalBlockIntegrity, "")
            .group(class.group)
            .subject(class.subject);
        self.rebuild_practical(entries, &v)
    }

    /// Hand a single theory class to a different qualified teacher.
    fn reassign_teacher(&self, entries: &mut Vec<ScheduledEntry>, idx: usize) -> bool {
        let Some(class) = entries[idx].as_class().cloned() else {
            return false;
        };
        let Some(group) = self.group_of(&class.group) else {
            return false;
        };
        let mut ctx = AllocationContext::from_entries(entries);
        ctx.release(&entries[idx]);

        let replacement = self
            .qualified_teachers(&class.subject, group)
            .into_iter()
            .find(|t| {
                t.email != class.teacher
                    && self.teacher_fits(t, &ctx, class.day, &[class.period])
            });
        match replacement {
            Some(t) => {
                entries[idx].as_class_mut().expect("checked above").teacher = t.email.clone();
                true
            }
            None => false,
        }
    }

    /// Hand a whole practical session to a different qualified teacher.
    fn reassign_session_teacher(&self, entries: &mut Vec<ScheduledEntry>, idx: usize) -> bool {
        let Some(class) = entries[idx].as_class().cloned() else {
            return false;
        };
        let session: Vec<usize> = entries
            .iter()
            .enumerate()
            .filter(|(_, e)| {
                e.group() == class.group
                    && e.subject() == Some(&*class.subject)
                    && e.day() == class.day
                    && e.is_practical()
            })
            .map(|(i, _)| i)
            .collect();
        let periods: Vec<u8> = session.iter().map(|&i| entries[i].period()).collect();
        let Some(group) = self.group_of(&class.group) else {
            return false;
        };

        let mut ctx = AllocationContext::from_entries(entries);
        for &i in &session {
            ctx.release(&entries[i]);
        }
        let replacement = self
            .qualified_teachers(&class.subject, group)
            .into_iter()
            .find(|t| t.email != class.teacher && self.teacher_fits(t, &ctx, class.day, &periods));
        match replacement {
            Some(t) => {
                for i in session {
                    if let Some(c) = entries[i].as_class_mut() {
                        c.teacher = t.email.clone();
                    }
                }
                true
            }
            None => false,
        }
    }

    /// Aggressive fallback: trade slots with a sibling class of the same
    /// group when both teachers fit the exchanged slots.
    fn swap_with_sibling(&self, entries: &mut Vec<ScheduledEntry>, idx: usize) -> bool {
        let Some(a) = entries[idx].as_class().cloned() else {
            return false;
        };
        let sibling_idxs: Vec<usize> = entries
            .iter()
            .enumerate()
            .filter(|(i, e)| {
                *i != idx
                    && e.group() == a.group
                    && !e.is_practical()
                    && !e.is_thesis()
                    && e.subject() != Some(&*a.subject)
            })
            .map(|(i, _)| i)
            .collect();

        for other in sibling_idxs {
            let Some(b) = entries[other].as_class().cloned() else {
                continue;
            };
            let mut ctx = AllocationContext::from_entries(entries);
            ctx.release(&entries[idx]);
            ctx.release(&entries[other]);

            let a_teacher_ok = self.teacher_by_email(&a.teacher).is_some_and(|t| {
                self.teacher_fits(t, &ctx, b.day, &[b.period])
            });
            let b_teacher_ok = self.teacher_by_email(&b.teacher).is_some_and(|t| {
                self.teacher_fits(t, &ctx, a.day, &[a.period])
            });
            let a_room_ok = a.room == b.room || ctx.is_room_free(&a.room, b.day, b.period);
            let b_room_ok = a.room == b.room || ctx.is_room_free(&b.room, a.day, a.period);
            if a_teacher_ok && b_teacher_ok && a_room_ok && b_room_ok {
                let (a_day, a_period) = (a.day, a.period);
                let (b_day, b_period) = (b.day, b.period);
                if let Some(c) = entries[idx].as_class_mut() {
                    c.day = b_day;
                    c.period = b_period;
                }
                if let Some(c) = entries[other].as_class_mut() {
                    c.day = a_day;
                    c.period = a_period;
                }
                return true;
            }
        }
        false
    }

    /// Place one additional theory class on a day not yet teaching it.
    fn place_one_theory(
        &self,
        entries: &mut Vec<ScheduledEntry>,
        group: &ClassGroup,
        subject: &Subject,
    ) -> bool {
        let busy_days: Vec<Weekday> = entries
            .iter()
            .filter(|e| e.group() == group.code && e.subject() == Some(&*subject.code))
            .map(|e| e.day())
            .collect();
        let ctx = AllocationContext::from_entries(entries);

        for &day in &self.problem.config.days {
            if self.is_thesis_day(group, day) || busy_days.contains(&day) {
                continue;
            }
            let cutoff = self.day_cutoff(group, day, &ctx);
            for period in 1..=cutoff {
                if !ctx.is_group_free(&group.code, day, period) {
                    continue;
                }
                let template = ClassEntry {
                    group: group.code.clone(),
                    subject: subject.code.clone(),
                    teacher: String::new(),
                    room: String::new(),
                    day,
                    period,
                    is_practical: false,
                };
                let Some(teacher) = self.usable_teacher(&template, group, &ctx, day, period)
                else {
                    continue;
                };
                let Some(room) = self.allocator.for_theory(&ctx, group, day, period) else {
                    continue;
                };
                entries.push(ScheduledEntry::Class(ClassEntry {
                    teacher: teacher.email.clone(),
                    room: room.name.clone(),
                    ..template
                }));
                return true;
            }
        }
        false
    }

    /// Shift classes left to close every closable gap for one group/day.
    fn close_gap_on(&self, entries: &mut Vec<ScheduledEntry>, group: &str, day: Weekday) -> bool {
        let mut changed = false;
        loop {
            let mut day_idxs: Vec<usize> = entries
                .iter()
                .enumerate()
                .filter(|(_, e)| e.group() == group && e.day() == day)
                .map(|(i, _)| i)
                .collect();
            day_idxs.sort_by_key(|&i| entries[i].period());

            let periods: Vec<u8> = day_idxs.iter().map(|&i| entries[i].period()).collect();
            let gap = periods
                .windows(2)
                .find(|w| w[1] - w[0] > self.problem.config.params.max_gap_periods + 1)
                .map(|w| w[0] + 1);
            let Some(target) = gap else {
                return changed;
            };

            // Pull the last class of the day into the gap.
            let &last = day_idxs.last().expect("gap implies entries");
            if !self.move_class_to_period(entries, last, target) {
                return changed;
            }
            changed = true;
        }
    }

    /// Gap-filling escalation pass over every group and day.
    fn gap_fill_pass(&self, entries: &mut Vec<ScheduledEntry>) -> usize {
        let mut moved = 0;
        let groups: Vec<String> = self.groups.iter().map(|g| g.code.clone()).collect();
        for group in groups {
            for &day in &self.problem.config.days {
                if self.close_gap_on(entries, &group, day) {
                    moved += 1;
                }
            }
        }
        moved
    }

    /// Move one class (theory only) to a specific period on its own day.
    fn move_class_to_period(
        &self,
        entries: &mut Vec<ScheduledEntry>,
        idx: usize,
        period: u8,
    ) -> bool {
        let Some(class) = entries[idx].as_class().cloned() else {
            return false;
        };
        if class.is_practical {
            return false;
        }
        let Some(group) = self.group_of(&class.group) else {
            return false;
        };
        let mut ctx = AllocationContext::from_entries(entries);
        ctx.release(&entries[idx]);

        if !ctx.is_group_free(&class.group, class.day, period) {
            return false;
        }
        let Some(teacher) = self.usable_teacher(&class, group, &ctx, class.day, period) else {
            return false;
        };
        let Some(room) = self.allocator.for_theory(&ctx, group, class.day, period) else {
            return false;
        };
        entries[idx] = ScheduledEntry::Class(ClassEntry {
            period,
            teacher: teacher.email.clone(),
            room: room.name.clone(),
            ..class
        });
        true
    }

    // ------------------------------------------------------------------
    // Lookups
    // ------------------------------------------------------------------

    fn group_of(&self, code: &str) -> Option<&ClassGroup> {
        self.groups.iter().find(|g| g.code == code)
    }

    fn subject_of(&self, code: &str) -> Option<&Subject> {
        self.problem.subject(code)
    }

    fn teacher_by_email(&self, email: &str) -> Option<&Teacher> {
        self.problem.teacher(email)
    }

    fn qualified_teachers(&self, subject: &str, group: &ClassGroup) -> Vec<&'a Teacher> {
        let mut teachers: Vec<&Teacher> = self
            .problem
            .teachers
            .iter()
            .filter(|t| t.is_qualified(subject, group))
            .collect();
        teachers.sort_by(|a, b| a.email.cmp(&b.email));
        teachers
    }

    /// The entry's current teacher if they fit the slot, else the first
    /// qualified colleague who does.
    fn usable_teacher(
        &self,
        class: &ClassEntry,
        group: &ClassGroup,
        ctx: &AllocationContext,
        day: Weekday,
        period: u8,
    ) -> Option<&'a Teacher> {
        if let Some(current) = self.problem.teacher(&class.teacher) {
            if current.is_qualified(&class.subject, group)
                && self.teacher_fits(current, ctx, day, &[period])
            {
                return Some(current);
            }
        }
        self.qualified_teachers(&class.subject, group)
            .into_iter()
            .find(|t| self.teacher_fits(t, ctx, day, &[period]))
    }

    fn teacher_fits(
        &self,
        teacher: &Teacher,
        ctx: &AllocationContext,
        day: Weekday,
        periods: &[u8],
    ) -> bool {
        ctx.teacher_load(&teacher.email, day) + periods.len() as u8 <= teacher.max_per_day
            && periods.iter().all(|&p| {
                ctx.is_teacher_free(&teacher.email, day, p)
                    && !teacher.is_unavailable(day, p)
                    && !self.oracle.teacher_busy(&teacher.email, day, p)
            })
    }

    fn is_thesis_day(&self, group: &ClassGroup, day: Weekday) -> bool {
        group.is_final_year() && day == self.problem.config.params.thesis_day
    }

    /// Last period a theory class may take on the day (Friday policy).
    fn day_cutoff(&self, group: &ClassGroup, day: Weekday, ctx: &AllocationContext) -> u8 {
        if day != Weekday::Fri {
            return self.problem.config.periods_per_day;
        }
        let params = &self.problem.config.params;
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

    fn duplicate_day_entry(
        &self,
        entries: &[ScheduledEntry],
        group: &str,
        subject: &str,
    ) -> Option<usize> {
        let mut seen: HashMap<Weekday, usize> = HashMap::new();
        let mut duplicate = None;
        for (i, e) in entries.iter().enumerate() {
            if e.group() == group && e.subject() == Some(subject) {
                if seen.contains_key(&e.day()) {
                    // Keep the earlier period, drop the later one.
                    let first = seen[&e.day()];
                    duplicate = Some(if entries[first].period() <= e.period() {
                        i
                    } else {
                        first
                    });
                    break;
                }
                seen.insert(e.day(), i);
            }
        }
        duplicate
    }

    fn last_entry_of(
        &self,
        entries: &[ScheduledEntry],
        group: &str,
        subject: &str,
    ) -> Option<usize> {
        entries
            .iter()
            .enumerate()
            .filter(|(_, e)| e.group() == group && e.subject() == Some(subject))
            .max_by_key(|(_, e)| {
                (
                    self.problem.config.day_index(e.day()).unwrap_or(usize::MAX),
                    e.period(),
                )
            })
            .map(|(i, _)| i)
    }
}

// ============================================================================
// Loop helpers
// ============================================================================

/// Unchanged count, or an a/b/a oscillation, means the loop is stuck.
fn is_stalled(history: &[usize]) -> bool {
    let n = history.len();
    if n >= 2 && history[n - 1] >= history[n - 2] {
        return true;
    }
    n >= 3 && history[n - 1] == history[n - 3]
}

fn escalate(strategy: RepairStrategy) -> RepairStrategy {
    match strategy {
        RepairStrategy::Targeted => RepairStrategy::GapFill,
        RepairStrategy::GapFill | RepairStrategy::Aggressive => RepairStrategy::Aggressive,
    }
}

/// Priority order, then severity, then a stable entity key so repeated
/// runs repair in the same sequence.
fn order_violations(problem: &ScheduleProblem, mut violations: Vec<Violation>) -> Vec<Violation> {
    violations.sort_by(|a, b| {
        rank(a.kind)
            .cmp(&rank(b.kind))
            .then_with(|| b.severity.cmp(&a.severity))
            .then_with(|| a.group.cmp(&b.group))
            .then_with(|| a.subject.cmp(&b.subject))
            .then_with(|| a.teacher.cmp(&b.teacher))
            .then_with(|| {
                let da = a.day.and_then(|d| problem.config.day_index(d));
                let db = b.day.and_then(|d| problem.config.day_index(d));
                da.cmp(&db)
            })
            .then_with(|| a.period.cmp(&b.period))
    });
    violations
}

/// Remove matching entries, returning them in original order.
fn extract<F>(entries: &mut Vec<ScheduledEntry>, predicate: F) -> Vec<ScheduledEntry>
where
    F: Fn(&ScheduledEntry) -> bool,
{
    let mut removed = Vec::new();
    let mut i = 0;
    while i < entries.len() {
        if predicate(&entries[i]) {
            removed.push(entries.remove(i));
        } else {
            i += 1;
        }
    }
    removed
}

// ============================================================================
// Tests
// ============================================================================
