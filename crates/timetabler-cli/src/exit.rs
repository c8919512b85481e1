//! Exit code semantics for CLI operations.
//!
//! | Exit Code | Meaning |
//! |-----------|---------|
//! | 0 | Success: problem valid / schedule converged |
//! | 1 | Hard failure: bad input, bad configuration, I/O error |
//! | 2 | Soft failure: schedule produced, violations remain |
//!
//! An imperfect schedule is deliberately NOT exit 1 — the operator may
//! still accept it. Scripts can branch on 2 to trigger a regenerate.

use std::process;

/// Stable exit codes for the timetabler binary.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExitCode {
    /// Valid input and, for scheduling, zero remaining violations.
    Success = 0,
    /// Hard failure before or during the run.
    Failure = 1,
    /// The run finished but violations remain in the report.
    Incomplete = 2,
}

impl ExitCode {
    /// Map a finished run's violation count to an exit code.
    pub fn from_remaining_violations(count: usize) -> Self {
        if count == 0 {
            ExitCode::Success
        } else {
            ExitCode::Incomplete
        }
    }

    pub fn is_success(self) -> bool {
        matches!(self, ExitCode::Success)
    }

    pub fn code(self) -> i32 {
        self as i32
    }
}

impl From<ExitCode> for process::ExitCode {
    fn from(code: ExitCode) -> Self {
        process::ExitCode::from(code as u8)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn zero_violations_is_success() {
        assert_eq!(ExitCode::from_remaining_violations(0), ExitCode::Success);
        assert!(ExitCode::from_remaining_violations(0).is_success());
    }

    #[test]
    fn remaining_violations_are_incomplete_not_failure() {
        let code = ExitCode::from_remaining_violations(3);
        assert_eq!(code, ExitCode::Incomplete);
        assert_eq!(code.code(), 2);
        assert!(!code.is_success());
    }
}
