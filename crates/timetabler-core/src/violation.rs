//! Constraint violations.
//!
//! A violation is *data*, not an error: the validator enumerates them, the
//! resolver consumes them, and the final report carries whatever is left.
//! Only malformed input ever surfaces as a Rust error.

use chrono::Weekday;
use serde::{Deserialize, Serialize};

use crate::{GroupCode, RoomId, SubjectCode, TeacherId};

/// How bad a violation is.
///
/// Ordering matters: `Critical` sorts above `High` and so on, so violation
/// lists can be ranked with a plain sort.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Severity {
    Low,
    Medium,
    High,
    Critical,
}

impl std::fmt::Display for Severity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Severity::Low => write!(f, "LOW"),
            Severity::Medium => write!(f, "MEDIUM"),
            Severity::High => write!(f, "HIGH"),
            Severity::Critical => write!(f, "CRITICAL"),
        }
    }
}

/// The constraint a violation belongs to.
///
/// One variant per independent validator check. The set is closed on
/// purpose: repair routines dispatch on it.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ConstraintKind {
    /// Scheduled class count does not match the subject's credit demand.
    SubjectFrequency,
    /// A practical session is not a contiguous block in one room.
    PracticalBlockIntegrity,
    /// Blocks of one practical session use more than one lab.
    SameLabRule,
    /// A teacher holds two classes in the same slot.
    TeacherDoubleBooking,
    /// A room hosts two classes in the same slot.
    RoomDoubleBooking,
    /// A class-group sits in two classes in the same slot.
    GroupDoubleBooking,
    /// An entry falls inside a teacher's declared time off.
    TeacherUnavailability,
    /// The assigned teacher is not qualified for the subject/group.
    TeacherQualification,
    /// A teacher exceeds their daily class limit.
    TeacherDailyLimit,
    /// A teacher runs more consecutive theory periods than allowed.
    TeacherConsecutiveTheory,
    /// The teacher is already committed in another active timetable.
    CrossSemesterConflict,
    /// Friday theory runs past the allowed closing period.
    FridayTimeLimit,
    /// A class-group day holds exactly one class.
    MinimumDailyClasses,
    /// A class-group day holds practicals only.
    TheoryPracticalMix,
    /// A final-year thesis day carries non-thesis classes (or none at all).
    ThesisDay,
    /// A class-group day has a gap wider than allowed.
    CompactSchedule,
    /// The same theory subject appears twice on one day.
    TheoryDistribution,
    /// A room is smaller than the class-group using it.
    RoomCapacity,
    /// Wrong room type (practical outside a lab, junior theory in one).
    RoomTypeRule,
}

impl ConstraintKind {
    /// Every check kind, in validator registry order.
    pub const ALL: [ConstraintKind; 19] = [
        ConstraintKind::SubjectFrequency,
        ConstraintKind::PracticalBlockIntegrity,
        ConstraintKind::SameLabRule,
        ConstraintKind::TeacherDoubleBooking,
        ConstraintKind::RoomDoubleBooking,
        ConstraintKind::GroupDoubleBooking,
        ConstraintKind::TeacherUnavailability,
        ConstraintKind::TeacherQualification,
        ConstraintKind::TeacherDailyLimit,
        ConstraintKind::TeacherConsecutiveTheory,
        ConstraintKind::CrossSemesterConflict,
        ConstraintKind::FridayTimeLimit,
        ConstraintKind::MinimumDailyClasses,
        ConstraintKind::TheoryPracticalMix,
        ConstraintKind::ThesisDay,
        ConstraintKind::CompactSchedule,
        ConstraintKind::TheoryDistribution,
        ConstraintKind::RoomCapacity,
        ConstraintKind::RoomTypeRule,
    ];

    /// Canonical severity for violations of this kind.
    ///
    /// Individual checks may override (e.g. a junior cohort borrowing a lab
    /// is reported below the canonical `RoomTypeRule` level).
    pub fn default_severity(self) -> Severity {
        match self {
            ConstraintKind::TeacherUnavailability
            | ConstraintKind::SameLabRule
            | ConstraintKind::TeacherDoubleBooking
            | ConstraintKind::RoomDoubleBooking
            | ConstraintKind::GroupDoubleBooking => Severity::Critical,
            ConstraintKind::PracticalBlockIntegrity
            | ConstraintKind::SubjectFrequency
            | ConstraintKind::CrossSemesterConflict
            | ConstraintKind::TeacherQualification
            | ConstraintKind::ThesisDay => Severity::High,
            ConstraintKind::FridayTimeLimit
            | ConstraintKind::MinimumDailyClasses
            | ConstraintKind::TheoryPracticalMix
            | ConstraintKind::TheoryDistribution
            | ConstraintKind::TeacherDailyLimit
            | ConstraintKind::RoomTypeRule
            | ConstraintKind::RoomCapacity => Severity::Medium,
            ConstraintKind::CompactSchedule | ConstraintKind::TeacherConsecutiveTheory => {
                Severity::Low
            }
        }
    }
}

impl std::fmt::Display for ConstraintKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            ConstraintKind::SubjectFrequency => "subject-frequency",
            ConstraintKind::PracticalBlockIntegrity => "practical-block-integrity",
            ConstraintKind::SameLabRule => "same-lab-rule",
            ConstraintKind::TeacherDoubleBooking => "teacher-double-booking",
            ConstraintKind::RoomDoubleBooking => "room-double-booking",
            ConstraintKind::GroupDoubleBooking => "group-double-booking",
            ConstraintKind::TeacherUnavailability => "teacher-unavailability",
            ConstraintKind::TeacherQualification => "teacher-qualification",
            ConstraintKind::TeacherDailyLimit => "teacher-daily-limit",
            ConstraintKind::TeacherConsecutiveTheory => "teacher-consecutive-theory",
            ConstraintKind::CrossSemesterConflict => "cross-semester-conflict",
            ConstraintKind::FridayTimeLimit => "friday-time-limit",
            ConstraintKind::MinimumDailyClasses => "minimum-daily-classes",
            ConstraintKind::TheoryPracticalMix => "theory-practical-mix",
            ConstraintKind::ThesisDay => "thesis-day",
            ConstraintKind::CompactSchedule => "compact-schedule",
            ConstraintKind::TheoryDistribution => "theory-distribution",
            ConstraintKind::RoomCapacity => "room-capacity",
            ConstraintKind::RoomTypeRule => "room-type-rule",
        };
        f.write_str(name)
    }
}

/// One broken constraint instance.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Violation {
    pub kind: ConstraintKind,
    pub severity: Severity,
    /// Affected class-group, if one is identifiable.
    pub group: Option<GroupCode>,
    pub subject: Option<SubjectCode>,
    pub teacher: Option<TeacherId>,
    pub room: Option<RoomId>,
    pub day: Option<Weekday>,
    pub period: Option<u8>,
    /// Human-readable description for the operator.
    pub description: String,
}

impl Violation {
    /// Create a violation with the kind's canonical severity.
    pub fn new(kind: ConstraintKind, description: impl Into<String>) -> Self {
        Self {
            kind,
            severity: kind.default_severity(),
            group: None,
            subject: None,
            teacher: None,
            room: None,
            day: None,
            period: None,
            description: description.into(),
        }
    }

    pub fn severity(mut self, severity: Severity) -> Self {
        self.severity = severity;
        self
    }

    pub fn group(mut self, group: impl Into<GroupCode>) -> Self {
        self.group = Some(group.into());
        self
    }

    pub fn subject(mut self, subject: impl Into<SubjectCode>) -> Self {
        self.subject = Some(subject.into());
        self
    }

    pub fn teacher(mut self, teacher: impl Into<TeacherId>) -> Self {
        self.teacher = Some(teacher.into());
        self
    }

    pub fn room(mut self, room: impl Into<RoomId>) -> Self {
        self.room = Some(room.into());
        self
    }

    /// Pin the violation to a slot.
    pub fn at(mut self, day: Weekday, period: u8) -> Self {
        self.day = Some(day);
        self.period = Some(period);
        self
    }

    /// Pin the violation to a day only (whole-day rules).
    pub fn on(mut self, day: Weekday) -> Self {
        self.day = Some(day);
        self
    }
}

impl std::fmt::Display for Violation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "[{}] {}: {}", self.severity, self.kind, self.description)
    }
}
