//! # timetabler-core
//!
//! Core domain model and traits for the timetabler scheduling engine.
//!
//! This crate provides:
//! - Domain types: `Subject`, `Teacher`, `Classroom`, `Batch`, `ClassGroup`
//! - The scheduling request: `ScheduleConfig` + `ConstraintParams`
//! - The output unit: `ScheduledEntry` (regular class or thesis placeholder)
//! - Violation and report types consumed by the solver
//! - The `ConflictOracle` trait for cross-semester lookups
//! - Error types and result aliases
//!
//! ## Example
//!
//! ```rust
//! use timetabler_core::{Batch, Classroom, ScheduleConfig, Subject, Teacher};
//!
//! let config = ScheduleConfig::new("Fall 2025")
//!     .batch(Batch::new("21SW", 7).sections(2).size(35));
//! let subjects = vec![
//!     Subject::new("SW415", "Software Project Management", "21SW").credits(3),
//!     Subject::new("SW416", "Data Mining", "21SW").credits(1).practical(),
//! ];
//! let teachers = vec![
//!     Teacher::new("Aisha Khan", "aisha.khan@uni.edu").teaches("SW415", "21SW"),
//! ];
//! let rooms = vec![Classroom::new("LAB-2").capacity(40).lab()];
//! # let _ = (config, subjects, teachers, rooms);
//! ```

use chrono::{NaiveTime, Weekday};
use serde::{Deserialize, Serialize};
use thiserror::Error;

pub mod report;
pub mod violation;

pub use report::{ConstraintCount, ScheduleReport, SkippedSubject};
pub use violation::{ConstraintKind, Severity, Violation};

// ============================================================================
// Type Aliases
// ============================================================================

/// Unique identifier for a subject (course code, e.g. "SW415")
pub type SubjectCode = String;

/// Unique identifier for a teacher (institutional email)
pub type TeacherId = String;

/// Unique identifier for a classroom
pub type RoomId = String;

/// Unique identifier for a class-group (e.g. "21SW-II")
pub type GroupCode = String;

/// One timetable cell: a weekday plus a 1-based period number.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Slot {
    pub day: Weekday,
    pub period: u8,
}

impl Slot {
    pub const fn new(day: Weekday, period: u8) -> Self {
        Self { day, period }
    }
}

impl std::fmt::Display for Slot {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} period {}", self.day, self.period)
    }
}

// ============================================================================
// Subject
// ============================================================================

/// A course offered to one batch.
///
/// Theory subjects demand `credits` single-period classes per week, at most
/// one per day, spread over distinct weekdays. Practical subjects demand
/// exactly one weekly block of consecutive periods in a single lab,
/// regardless of credit value.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Subject {
    /// Unique course code
    pub code: SubjectCode,
    /// Human-readable name
    pub name: String,
    /// Weekly class count for theory subjects
    pub credits: u8,
    /// True for lab subjects scheduled as one consecutive block
    pub is_practical: bool,
    /// Owning batch code (applies to every section of the batch)
    pub batch: GroupCode,
}

impl Subject {
    pub fn new(
        code: impl Into<String>,
        name: impl Into<String>,
        batch: impl Into<String>,
    ) -> Self {
        Self {
            code: code.into(),
            name: name.into(),
            credits: 3,
            is_practical: false,
            batch: batch.into(),
        }
    }

    pub fn credits(mut self, credits: u8) -> Self {
        self.credits = credits;
        self
    }

    /// Mark as a practical (lab) subject.
    pub fn practical(mut self) -> Self {
        self.is_practical = true;
        self
    }
}

// ============================================================================
// Teacher
// ============================================================================

/// Which periods of a day a teacher cannot take.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum TimeOffScope {
    /// The whole day is blocked.
    AllDay,
    /// Only the listed periods are blocked.
    Periods(Vec<u8>),
}

/// A declared unavailability window.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimeOff {
    pub day: Weekday,
    pub scope: TimeOffScope,
}

impl TimeOff {
    pub fn all_day(day: Weekday) -> Self {
        Self {
            day,
            scope: TimeOffScope::AllDay,
        }
    }

    pub fn periods(day: Weekday, periods: Vec<u8>) -> Self {
        Self {
            day,
            scope: TimeOffScope::Periods(periods),
        }
    }

    /// Does this window block the given slot?
    pub fn blocks(&self, day: Weekday, period: u8) -> bool {
        if self.day != day {
            return false;
        }
        match &self.scope {
            TimeOffScope::AllDay => true,
            TimeOffScope::Periods(ps) => ps.contains(&period),
        }
    }
}

/// A (subject, batch, section) tuple a teacher may be assigned to.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Qualification {
    pub subject: SubjectCode,
    pub batch: GroupCode,
    /// None means every section of the batch.
    pub section: Option<String>,
}

/// A member of the teaching staff.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Teacher {
    pub name: String,
    /// Unique identifier
    pub email: TeacherId,
    /// Hard cap on classes per day
    pub max_per_day: u8,
    /// Subjects this teacher may be assigned to
    pub subjects: Vec<Qualification>,
    /// Declared unavailability, zero-tolerance during scheduling
    pub unavailable: Vec<TimeOff>,
}

impl Teacher {
    pub fn new(name: impl Into<String>, email: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            email: email.into(),
            max_per_day: 4,
            subjects: Vec::new(),
            unavailable: Vec::new(),
        }
    }

    pub fn max_per_day(mut self, max: u8) -> Self {
        self.max_per_day = max;
        self
    }

    /// Qualify for a subject across all sections of a batch.
    pub fn teaches(mut self, subject: impl Into<String>, batch: impl Into<String>) -> Self {
        self.subjects.push(Qualification {
            subject: subject.into(),
            batch: batch.into(),
            section: None,
        });
        self
    }

    /// Qualify for a subject in one specific section.
    pub fn teaches_section(
        mut self,
        subject: impl Into<String>,
        batch: impl Into<String>,
        section: impl Into<String>,
    ) -> Self {
        self.subjects.push(Qualification {
            subject: subject.into(),
            batch: batch.into(),
            section: Some(section.into()),
        });
        self
    }

    /// Declare an unavailability window.
    pub fn time_off(mut self, off: TimeOff) -> Self {
        self.unavailable.push(off);
        self
    }

    /// May this teacher take the subject for the given class-group?
    pub fn is_qualified(&self, subject: &str, group: &ClassGroup) -> bool {
        self.subjects.iter().any(|q| {
            q.subject == subject
                && q.batch == group.batch
                && q.section
                    .as_deref()
                    .map_or(true, |s| Some(s) == group.section.as_deref())
        })
    }

    /// Is the slot inside a declared unavailability window?
    pub fn is_unavailable(&self, day: Weekday, period: u8) -> bool {
        self.unavailable.iter().any(|off| off.blocks(day, period))
    }
}

// ============================================================================
// Classroom
// ============================================================================

/// A room or laboratory.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Classroom {
    /// Unique identifier
    pub name: RoomId,
    pub capacity: u16,
    pub building: String,
    /// Labs host practicals; regular rooms never do.
    pub is_lab: bool,
}

impl Classroom {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            capacity: 50,
            building: String::new(),
            is_lab: false,
        }
    }

    pub fn capacity(mut self, capacity: u16) -> Self {
        self.capacity = capacity;
        self
    }

    pub fn in_building(mut self, building: impl Into<String>) -> Self {
        self.building = building.into();
        self
    }

    /// Mark as a laboratory.
    pub fn lab(mut self) -> Self {
        self.is_lab = true;
        self
    }
}

// ============================================================================
// Batch / ClassGroup
// ============================================================================

/// Section labels in expansion order.
const SECTION_LABELS: [&str; 6] = ["I", "II", "III", "IV", "V", "VI"];

/// A student cohort as configured, before section expansion.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Batch {
    /// Cohort code, e.g. "21SW"
    pub code: GroupCode,
    /// Current semester, 1-8; drives seniority rules
    pub semester: u8,
    /// Number of sections the cohort splits into (0 or 1 = unsplit)
    pub sections: u8,
    /// Students per section
    pub size: u16,
}

impl Batch {
    pub fn new(code: impl Into<String>, semester: u8) -> Self {
        Self {
            code: code.into(),
            semester,
            sections: 1,
            size: 40,
        }
    }

    pub fn sections(mut self, sections: u8) -> Self {
        self.sections = sections;
        self
    }

    pub fn size(mut self, size: u16) -> Self {
        self.size = size;
        self
    }

    /// Expand into independently scheduled class-groups.
    ///
    /// "21SW" with 2 sections becomes "21SW-I" and "21SW-II"; an unsplit
    /// batch yields a single group under its own code.
    pub fn expand(&self) -> Vec<ClassGroup> {
        if self.sections <= 1 {
            return vec![ClassGroup {
                code: self.code.clone(),
                batch: self.code.clone(),
                section: None,
                semester: self.semester,
                size: self.size,
            }];
        }
        (0..self.sections as usize)
            .map(|i| {
                let label = SECTION_LABELS
                    .get(i)
                    .map_or_else(|| format!("S{}", i + 1), |l| (*l).to_string());
                ClassGroup {
                    code: format!("{}-{}", self.code, label),
                    batch: self.code.clone(),
                    section: Some(label),
                    semester: self.semester,
                    size: self.size,
                }
            })
            .collect()
    }
}

/// One cohort section with its own timetable.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClassGroup {
    /// Full group code ("21SW-II", or the batch code when unsplit)
    pub code: GroupCode,
    /// Owning batch code
    pub batch: GroupCode,
    /// Section label, None when the batch is unsplit
    pub section: Option<String>,
    pub semester: u8,
    /// Student head count, checked against room capacity
    pub size: u16,
}

impl ClassGroup {
    /// Senior cohorts get room-allocation priority (labs for theory).
    pub fn is_senior(&self) -> bool {
        self.semester >= 5
    }

    /// Final-year cohorts carry a dedicated thesis day.
    pub fn is_final_year(&self) -> bool {
        self.semester >= 7
    }
}

// ============================================================================
// ScheduleConfig
// ============================================================================

/// Closed set of tunable constraint parameters.
///
/// Validated once at config-load time; the algorithms never re-interpret
/// free-form keys.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ConstraintParams {
    /// Most classes a class-group may sit per day
    pub max_subjects_per_day: u8,
    /// Last allowed theory period on a Friday that carries a practical
    pub friday_limit_with_practical: u8,
    /// Last allowed theory period on a Friday without a practical
    pub friday_limit_without_practical: u8,
    /// A day with fewer (but more than zero) classes is flagged
    pub min_daily_classes: u8,
    /// Consecutive periods in one practical session
    pub practical_block_len: u8,
    /// Consecutive theory periods a teacher may take without a break
    pub teacher_max_consecutive: u8,
    /// Widest tolerated idle stretch inside a class-group's day
    pub max_gap_periods: u8,
    /// Labs held back for senior theory; effective reserve is
    /// `min(senior_lab_reserve, total_labs - 2)`
    pub senior_lab_reserve: u8,
    /// Weekday reserved for final-year thesis work
    pub thesis_day: Weekday,
    /// Thesis entries generated on the thesis day
    pub thesis_periods: u8,
    /// Resolver iteration cap
    pub max_iterations: u32,
    /// Per-subject placement attempt bound in the generator
    pub max_place_attempts: u32,
}

impl Default for ConstraintParams {
    fn default() -> Self {
        Self {
            max_subjects_per_day: 6,
            friday_limit_with_practical: 4,
            friday_limit_without_practical: 3,
            min_daily_classes: 2,
            practical_block_len: 3,
            teacher_max_consecutive: 2,
            max_gap_periods: 1,
            senior_lab_reserve: 4,
            thesis_day: Weekday::Wed,
            thesis_periods: 3,
            max_iterations: 40,
            max_place_attempts: 60,
        }
    }
}

impl ConstraintParams {
    /// Reject parameter combinations no schedule could satisfy.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.practical_block_len == 0 {
            return Err(ConfigError::InvalidParam(
                "practical_block_len must be at least 1".into(),
            ));
        }
        if self.max_iterations == 0 {
            return Err(ConfigError::InvalidParam(
                "max_iterations must be at least 1".into(),
            ));
        }
        if self.min_daily_classes == 0 {
            return Err(ConfigError::InvalidParam(
                "min_daily_classes must be at least 1".into(),
            ));
        }
        if self.friday_limit_with_practical < self.friday_limit_without_practical {
            return Err(ConfigError::InvalidParam(
                "friday limit with a practical cannot be tighter than without".into(),
            ));
        }
        Ok(())
    }
}

/// The immutable scheduling request.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ScheduleConfig {
    /// Display name ("Fall 2025")
    pub name: String,
    /// Teaching days, in timetable order
    pub days: Vec<Weekday>,
    /// Periods per day, numbered 1..=periods_per_day
    pub periods_per_day: u8,
    /// Wall-clock start of period 1
    pub day_start: NaiveTime,
    /// Minutes per period
    pub period_minutes: u32,
    /// Cohorts to schedule
    pub batches: Vec<Batch>,
    #[serde(default)]
    pub params: ConstraintParams,
}

impl ScheduleConfig {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            days: vec![
                Weekday::Mon,
                Weekday::Tue,
                Weekday::Wed,
                Weekday::Thu,
                Weekday::Fri,
            ],
            periods_per_day: 7,
            day_start: NaiveTime::from_hms_opt(8, 30, 0).expect("valid literal time"),
            period_minutes: 60,
            batches: Vec::new(),
            params: ConstraintParams::default(),
        }
    }

    pub fn batch(mut self, batch: Batch) -> Self {
        self.batches.push(batch);
        self
    }

    pub fn days(mut self, days: Vec<Weekday>) -> Self {
        self.days = days;
        self
    }

    pub fn periods_per_day(mut self, periods: u8) -> Self {
        self.periods_per_day = periods;
        self
    }

    pub fn params(mut self, params: ConstraintParams) -> Self {
        self.params = params;
        self
    }

    /// Fail fast on a request no scheduling attempt could satisfy.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.days.is_empty() {
            return Err(ConfigError::NoDays);
        }
        if self.periods_per_day == 0 {
            return Err(ConfigError::NoPeriods);
        }
        if self.period_minutes == 0 {
            return Err(ConfigError::ZeroPeriodLength);
        }
        if self.batches.is_empty() {
            return Err(ConfigError::NoBatches);
        }
        self.params.validate()
    }

    /// Position of a weekday in timetable order.
    pub fn day_index(&self, day: Weekday) -> Option<usize> {
        self.days.iter().position(|d| *d == day)
    }

    /// Period numbers in order, 1-based.
    pub fn periods(&self) -> impl Iterator<Item = u8> {
        1..=self.periods_per_day
    }

    /// Wall-clock span of a period.
    pub fn period_span(&self, period: u8) -> (NaiveTime, NaiveTime) {
        let offset = i64::from(self.period_minutes) * i64::from(period.saturating_sub(1));
        let start = self.day_start + chrono::Duration::minutes(offset);
        let end = start + chrono::Duration::minutes(i64::from(self.period_minutes));
        (start, end)
    }

    /// Every class-group across all batches, senior cohorts first.
    pub fn class_groups(&self) -> Vec<ClassGroup> {
        let mut groups: Vec<ClassGroup> = self.batches.iter().flat_map(Batch::expand).collect();
        groups.sort_by(|a, b| b.semester.cmp(&a.semester).then(a.code.cmp(&b.code)));
        groups
    }
}

// ============================================================================
// ScheduledEntry
// ============================================================================

/// One regular class placement.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClassEntry {
    pub group: GroupCode,
    pub subject: SubjectCode,
    pub teacher: TeacherId,
    pub room: RoomId,
    pub day: Weekday,
    pub period: u8,
    pub is_practical: bool,
}

/// A thesis-day placeholder; carries no teacher and no room.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ThesisEntry {
    pub group: GroupCode,
    pub day: Weekday,
    pub period: u8,
}

/// One cell of the produced timetable.
///
/// Thesis placeholders are a distinct variant rather than a class with
/// nullable teacher/room, so downstream code matches instead of
/// null-checking.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ScheduledEntry {
    Class(ClassEntry),
    Thesis(ThesisEntry),
}

impl ScheduledEntry {
    pub fn group(&self) -> &str {
        match self {
            ScheduledEntry::Class(e) => &e.group,
            ScheduledEntry::Thesis(e) => &e.group,
        }
    }

    pub fn day(&self) -> Weekday {
        match self {
            ScheduledEntry::Class(e) => e.day,
            ScheduledEntry::Thesis(e) => e.day,
        }
    }

    pub fn period(&self) -> u8 {
        match self {
            ScheduledEntry::Class(e) => e.period,
            ScheduledEntry::Thesis(e) => e.period,
        }
    }

    pub fn slot(&self) -> Slot {
        Slot::new(self.day(), self.period())
    }

    pub fn subject(&self) -> Option<&str> {
        match self {
            ScheduledEntry::Class(e) => Some(&e.subject),
            ScheduledEntry::Thesis(_) => None,
        }
    }

    pub fn teacher(&self) -> Option<&str> {
        match self {
            ScheduledEntry::Class(e) => Some(&e.teacher),
            ScheduledEntry::Thesis(_) => None,
        }
    }

    pub fn room(&self) -> Option<&str> {
        match self {
            ScheduledEntry::Class(e) => Some(&e.room),
            ScheduledEntry::Thesis(_) => None,
        }
    }

    pub fn is_practical(&self) -> bool {
        matches!(self, ScheduledEntry::Class(e) if e.is_practical)
    }

    pub fn is_thesis(&self) -> bool {
        matches!(self, ScheduledEntry::Thesis(_))
    }

    pub fn as_class(&self) -> Option<&ClassEntry> {
        match self {
            ScheduledEntry::Class(e) => Some(e),
            ScheduledEntry::Thesis(_) => None,
        }
    }

    pub fn as_class_mut(&mut self) -> Option<&mut ClassEntry> {
        match self {
            ScheduledEntry::Class(e) => Some(e),
            ScheduledEntry::Thesis(_) => None,
        }
    }
}

/// An entry already persisted by another scheduling run.
///
/// Only the fields needed for cross-semester conflict checks survive
/// persistence; `config` names the owning run.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommittedEntry {
    pub config: String,
    pub teacher: TeacherId,
    pub group: GroupCode,
    pub subject: SubjectCode,
    pub day: Weekday,
    pub period: u8,
}

// ============================================================================
// ScheduleProblem
// ============================================================================

/// The full input snapshot for one scheduling run.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ScheduleProblem {
    pub config: ScheduleConfig,
    pub subjects: Vec<Subject>,
    pub teachers: Vec<Teacher>,
    pub classrooms: Vec<Classroom>,
}

impl ScheduleProblem {
    pub fn new(config: ScheduleConfig) -> Self {
        Self {
            config,
            subjects: Vec::new(),
            teachers: Vec::new(),
            classrooms: Vec::new(),
        }
    }

    /// Hard pre-flight validation.
    ///
    /// Rejects malformed configuration and broken references. Resource
    /// exhaustion (no qualified teacher, no lab anywhere) is deliberately
    /// NOT an error here: the generator reports it per subject and the
    /// schedule proceeds for everything else.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.config.validate()?;

        let mut subject_codes = std::collections::HashSet::new();
        for s in &self.subjects {
            if !subject_codes.insert(s.code.as_str()) {
                return Err(ConfigError::DuplicateId {
                    kind: "subject",
                    id: s.code.clone(),
                });
            }
        }
        let mut teacher_ids = std::collections::HashSet::new();
        for t in &self.teachers {
            if !teacher_ids.insert(t.email.as_str()) {
                return Err(ConfigError::DuplicateId {
                    kind: "teacher",
                    id: t.email.clone(),
                });
            }
        }
        let mut room_ids = std::collections::HashSet::new();
        for r in &self.classrooms {
            if !room_ids.insert(r.name.as_str()) {
                return Err(ConfigError::DuplicateId {
                    kind: "classroom",
                    id: r.name.clone(),
                });
            }
        }

        for s in &self.subjects {
            if !self.config.batches.iter().any(|b| b.code == s.batch) {
                return Err(ConfigError::UnknownBatch {
                    subject: s.code.clone(),
                    batch: s.batch.clone(),
                });
            }
        }

        let block = self.config.params.practical_block_len;
        if self.subjects.iter().any(|s| s.is_practical) && self.config.periods_per_day < block {
            return Err(ConfigError::DayTooShort {
                needed: block,
                available: self.config.periods_per_day,
            });
        }

        Ok(())
    }

    pub fn subject(&self, code: &str) -> Option<&Subject> {
        self.subjects.iter().find(|s| s.code == code)
    }

    pub fn teacher(&self, email: &str) -> Option<&Teacher> {
        self.teachers.iter().find(|t| t.email == email)
    }

    pub fn classroom(&self, name: &str) -> Option<&Classroom> {
        self.classrooms.iter().find(|r| r.name == name)
    }

    /// Subjects owned by a class-group's batch.
    pub fn subjects_for(&self, group: &ClassGroup) -> Vec<&Subject> {
        self.subjects
            .iter()
            .filter(|s| s.batch == group.batch)
            .collect()
    }
}

// ============================================================================
// Traits
// ============================================================================

/// Lookup of teacher commitments made by *other* active scheduling runs.
///
/// The engine consults this both while placing (avoid the slot) and while
/// validating (flag the slot if placed anyway). Implementations wrap
/// whatever persistence the host system uses.
pub trait ConflictOracle: Send + Sync {
    /// Is the teacher already committed elsewhere at this slot?
    fn teacher_busy(&self, teacher: &str, day: Weekday, period: u8) -> bool;

    /// Human-readable descriptions of the clashing commitments.
    fn describe(&self, _teacher: &str, _day: Weekday, _period: u8) -> Vec<String> {
        Vec::new()
    }
}

/// Oracle for standalone runs with no sibling timetables.
#[derive(Clone, Copy, Debug, Default)]
pub struct NoCommitments;

impl ConflictOracle for NoCommitments {
    fn teacher_busy(&self, _teacher: &str, _day: Weekday, _period: u8) -> bool {
        false
    }
}

// ============================================================================
// Errors
// ============================================================================

/// Hard configuration failure; no scheduling attempt is made.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("schedule has no teaching days configured")]
    NoDays,

    #[error("schedule has no periods configured")]
    NoPeriods,

    #[error("period duration must be non-zero")]
    ZeroPeriodLength,

    #[error("no batches to schedule")]
    NoBatches,

    #[error("duplicate {kind} identifier: {id}")]
    DuplicateId { kind: &'static str, id: String },

    #[error("subject '{subject}' references unknown batch '{batch}'")]
    UnknownBatch { subject: String, batch: String },

    #[error("practicals need {needed} consecutive periods but days have only {available}")]
    DayTooShort { needed: u8, available: u8 },

    #[error("invalid constraint parameter: {0}")]
    InvalidParam(String),
}

/// Exceptional scheduling failure.
///
/// Ordinary constraint violations never take this path; they are reported
/// as [`Violation`] values.
#[derive(Debug, Error)]
pub enum ScheduleError {
    #[error("invalid configuration: {0}")]
    Config(#[from] ConfigError),

    #[error("entry references unknown subject: {0}")]
    UnknownSubject(SubjectCode),

    #[error("entry references unknown teacher: {0}")]
    UnknownTeacher(TeacherId),

    #[error("entry references unknown classroom: {0}")]
    UnknownRoom(RoomId),

    #[error("internal error: {0}")]
    Internal(String),
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn subject_builder() {
        let s = Subject::new("SW415", "Software Project Management", "21SW")
            .credits(2)
            .practical();

        assert_eq!(s.code, "SW415");
        assert_eq!(s.credits, 2);
        assert!(s.is_practical);
        assert_eq!(s.batch, "21SW");
    }

    #[test]
    fn teacher_qualification_covers_all_sections() {
        let t = Teacher::new("Aisha Khan", "aisha@uni.edu").teaches("SW415", "21SW");
        let batch = Batch::new("21SW", 7).sections(2);
        let groups = batch.expand();

        assert!(t.is_qualified("SW415", &groups[0]));
        assert!(t.is_qualified("SW415", &groups[1]));
        assert!(!t.is_qualified("SW999", &groups[0]));
    }

    #[test]
    fn teacher_qualification_pins_section() {
        let t = Teacher::new("Bilal Shah", "bilal@uni.edu").teaches_section("SW415", "21SW", "II");
        let groups = Batch::new("21SW", 7).sections(2).expand();

        assert!(!t.is_qualified("SW415", &groups[0]));
        assert!(t.is_qualified("SW415", &groups[1]));
    }

    #[test]
    fn qualification_requires_matching_batch() {
        let t = Teacher::new("Aisha Khan", "aisha@uni.edu").teaches("SW415", "21SW");
        let other = Batch::new("22SW", 5).expand();
        assert!(!t.is_qualified("SW415", &other[0]));
    }

    #[test]
    fn time_off_all_day_blocks_every_period() {
        let t = Teacher::new("X", "x@uni.edu").time_off(TimeOff::all_day(Weekday::Mon));
        assert!(t.is_unavailable(Weekday::Mon, 1));
        assert!(t.is_unavailable(Weekday::Mon, 7));
        assert!(!t.is_unavailable(Weekday::Tue, 1));
    }

    #[test]
    fn time_off_periods_block_only_listed() {
        let t =
            Teacher::new("X", "x@uni.edu").time_off(TimeOff::periods(Weekday::Mon, vec![1, 2]));
        assert!(t.is_unavailable(Weekday::Mon, 1));
        assert!(t.is_unavailable(Weekday::Mon, 2));
        assert!(!t.is_unavailable(Weekday::Mon, 3));
    }

    #[test]
    fn batch_expansion_unsplit() {
        let groups = Batch::new("21SW", 7).expand();
        assert_eq!(groups.len(), 1);
        assert_eq!(groups[0].code, "21SW");
        assert_eq!(groups[0].section, None);
    }

    #[test]
    fn batch_expansion_sections() {
        let groups = Batch::new("21SW", 7).sections(2).size(30).expand();
        assert_eq!(groups.len(), 2);
        assert_eq!(groups[0].code, "21SW-I");
        assert_eq!(groups[1].code, "21SW-II");
        assert_eq!(groups[1].section.as_deref(), Some("II"));
        assert_eq!(groups[1].size, 30);
    }

    #[test]
    fn seniority_thresholds() {
        let junior = Batch::new("24SW", 2).expand().remove(0);
        let senior = Batch::new("22SW", 5).expand().remove(0);
        let finalist = Batch::new("21SW", 7).expand().remove(0);

        assert!(!junior.is_senior());
        assert!(senior.is_senior());
        assert!(!senior.is_final_year());
        assert!(finalist.is_senior());
        assert!(finalist.is_final_year());
    }

    #[test]
    fn config_defaults_are_valid() {
        let config = ScheduleConfig::new("Fall 2025").batch(Batch::new("21SW", 7));
        assert_eq!(config.validate(), Ok(()));
        assert_eq!(config.days.len(), 5);
        assert_eq!(config.periods_per_day, 7);
    }

    #[test]
    fn config_rejects_empty_days() {
        let config = ScheduleConfig::new("bad")
            .days(Vec::new())
            .batch(Batch::new("21SW", 7));
        assert_eq!(config.validate(), Err(ConfigError::NoDays));
    }

    #[test]
    fn config_rejects_missing_batches() {
        let config = ScheduleConfig::new("bad");
        assert_eq!(config.validate(), Err(ConfigError::NoBatches));
    }

    #[test]
    fn params_reject_inverted_friday_limits() {
        let params = ConstraintParams {
            friday_limit_with_practical: 2,
            friday_limit_without_practical: 3,
            ..ConstraintParams::default()
        };
        assert!(params.validate().is_err());
    }

    #[test]
    fn period_span_derivation() {
        let config = ScheduleConfig::new("Fall 2025").batch(Batch::new("21SW", 7));
        let (start, end) = config.period_span(1);
        assert_eq!(start, NaiveTime::from_hms_opt(8, 30, 0).unwrap());
        assert_eq!(end, NaiveTime::from_hms_opt(9, 30, 0).unwrap());

        let (start3, end3) = config.period_span(3);
        assert_eq!(start3, NaiveTime::from_hms_opt(10, 30, 0).unwrap());
        assert_eq!(end3, NaiveTime::from_hms_opt(11, 30, 0).unwrap());
    }

    #[test]
    fn class_groups_order_seniors_first() {
        let config = ScheduleConfig::new("Fall 2025")
            .batch(Batch::new("23SW", 3))
            .batch(Batch::new("21SW", 7).sections(2));
        let groups = config.class_groups();

        assert_eq!(groups[0].code, "21SW-I");
        assert_eq!(groups[1].code, "21SW-II");
        assert_eq!(groups[2].code, "23SW");
    }

    #[test]
    fn entry_accessors() {
        let class = ScheduledEntry::Class(ClassEntry {
            group: "21SW".into(),
            subject: "SW415".into(),
            teacher: "aisha@uni.edu".into(),
            room: "CR-1".into(),
            day: Weekday::Mon,
            period: 2,
            is_practical: false,
        });
        let thesis = ScheduledEntry::Thesis(ThesisEntry {
            group: "21SW".into(),
            day: Weekday::Wed,
            period: 1,
        });

        assert_eq!(class.subject(), Some("SW415"));
        assert_eq!(class.teacher(), Some("aisha@uni.edu"));
        assert_eq!(class.slot(), Slot::new(Weekday::Mon, 2));
        assert!(!class.is_thesis());

        assert_eq!(thesis.subject(), None);
        assert_eq!(thesis.teacher(), None);
        assert_eq!(thesis.room(), None);
        assert!(thesis.is_thesis());
        assert!(!thesis.is_practical());
    }

    #[test]
    fn entry_serde_is_tagged() {
        let thesis = ScheduledEntry::Thesis(ThesisEntry {
            group: "21SW".into(),
            day: Weekday::Wed,
            period: 1,
        });
        let json = serde_json::to_string(&thesis).unwrap();
        assert!(json.contains("\"type\":\"thesis\""));

        let back: ScheduledEntry = serde_json::from_str(&json).unwrap();
        assert_eq!(back, thesis);
    }

    fn sample_problem() -> ScheduleProblem {
        let config = ScheduleConfig::new("Fall 2025").batch(Batch::new("21SW", 7));
        let mut problem = ScheduleProblem::new(config);
        problem.subjects = vec![
            Subject::new("SW415", "Software Project Management", "21SW"),
            Subject::new("SW416", "Data Mining", "21SW").practical(),
        ];
        problem.teachers = vec![Teacher::new("Aisha Khan", "aisha@uni.edu")
            .teaches("SW415", "21SW")
            .teaches("SW416", "21SW")];
        problem.classrooms = vec![
            Classroom::new("CR-1").capacity(50),
            Classroom::new("LAB-2").capacity(40).lab(),
        ];
        problem
    }

    #[test]
    fn problem_validates() {
        assert_eq!(sample_problem().validate(), Ok(()));
    }

    #[test]
    fn problem_rejects_duplicate_subject() {
        let mut problem = sample_problem();
        problem
            .subjects
            .push(Subject::new("SW415", "Duplicate", "21SW"));
        assert!(matches!(
            problem.validate(),
            Err(ConfigError::DuplicateId { kind: "subject", .. })
        ));
    }

    #[test]
    fn problem_rejects_unknown_batch() {
        let mut problem = sample_problem();
        problem
            .subjects
            .push(Subject::new("CS101", "Intro", "99XX"));
        assert!(matches!(
            problem.validate(),
            Err(ConfigError::UnknownBatch { .. })
        ));
    }

    #[test]
    fn problem_rejects_short_day_with_practicals() {
        let mut problem = sample_problem();
        problem.config.periods_per_day = 2;
        assert_eq!(
            problem.validate(),
            Err(ConfigError::DayTooShort {
                needed: 3,
                available: 2
            })
        );
    }

    #[test]
    fn no_commitments_oracle_is_always_free() {
        let oracle = NoCommitments;
        assert!(!oracle.teacher_busy("aisha@uni.edu", Weekday::Mon, 1));
        assert!(oracle.describe("aisha@uni.edu", Weekday::Mon, 1).is_empty());
    }

    #[test]
    fn subjects_for_filters_by_batch() {
        let problem = sample_problem();
        let group = &problem.config.class_groups()[0];
        assert_eq!(problem.subjects_for(group).len(), 2);
    }
}
