use std::fmt;
use std::path::Path;

use anyhow::Result;

/// Checks the recorded exit codes of every task
mod exit_code;
pub use exit_code::ExitCodeVerifier;

/// Whole-file comparison against an expected file
mod comparison;
pub use comparison::{ComparedFiles, ComparisonVerifier};

/// Line-based unified diff
mod diff;

/// Rule-based comparison of matching lines
mod line;
pub use line::{key_and_float_rule, LineVerifier, MatchedLines, Rule};

#[derive(thiserror::Error, Debug, PartialEq)]
pub enum Error {
    #[error("Expected one exit code per task ({expected}), got {found}")]
    WrongExitCodeCount { expected: usize, found: usize },
    #[error("Cannot update expected file: source file {0} is missing")]
    MissingSource(String),
}

/// How a verifier status counts towards a test result.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatusCategory {
    Pass,
    Fail,
    /// Passed, with something worth a look.
    Warn,
}

/// Outcome of one verification.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VerifierStatus {
    Ok,
    NotOk,
    JobNotRun,
    DependentJobFailed,
    ParentAndDepjobFailed,
    ExpectedFileNotFound,
    OutputFileNotFound,
}

impl VerifierStatus {
    pub fn name(self) -> &'static str {
        match self {
            Self::Ok => "ok",
            Self::NotOk => "not_ok",
            Self::JobNotRun => "job_not_run",
            Self::DependentJobFailed => "dependent_job_failed",
            Self::ParentAndDepjobFailed => "parent_and_depjob_failed",
            Self::ExpectedFileNotFound => "expected_file_not_found",
            Self::OutputFileNotFound => "output_file_not_found",
        }
    }

    pub fn category(self) -> StatusCategory {
        match self {
            Self::Ok => StatusCategory::Pass,
            Self::DependentJobFailed => StatusCategory::Warn,
            _ => StatusCategory::Fail,
        }
    }

    pub fn description(self) -> &'static str {
        match self {
            Self::Ok => "verification was successful",
            Self::NotOk => "verification failed",
            Self::JobNotRun => "job has not executed; exit code file not found",
            Self::DependentJobFailed => {
                "test passed, but at least one dependent job returned a non-success exit code"
            }
            Self::ParentAndDepjobFailed => "test failed, and at least one dependent job failed",
            Self::ExpectedFileNotFound => "expected/comparison file not found",
            Self::OutputFileNotFound => "output file not found",
        }
    }
}

impl fmt::Display for VerifierStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// A status plus the human-readable lines explaining it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VerifierReport {
    pub status: VerifierStatus,
    pub lines: Vec<String>,
}

impl VerifierReport {
    pub fn new(status: VerifierStatus, lines: Vec<String>) -> Self {
        Self { status, lines }
    }

    pub fn ok() -> Self {
        Self::new(VerifierStatus::Ok, Vec::new())
    }

    pub fn is_pass(&self) -> bool {
        self.status.category() != StatusCategory::Fail
    }
}

/// Judges the output of a job that has run.
///
/// Output files are looked up in `output_path`; files written by the
/// commands themselves are looked up in `exec_path`, which defaults to
/// `output_path`. Implementations keep no state between calls.
pub trait Verifier {
    fn execute(&self, output_path: &Path, exec_path: Option<&Path>) -> VerifierReport;

    /// Overwrite reference data with the current output.
    /// Verifiers without reference data do nothing.
    fn update_expected(&self, _output_path: &Path, _exec_path: Option<&Path>) -> Result<()> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_categories() {
        assert_eq!(VerifierStatus::Ok.category(), StatusCategory::Pass);
        assert_eq!(VerifierStatus::DependentJobFailed.category(), StatusCategory::Warn);
        for status in [
            VerifierStatus::NotOk,
            VerifierStatus::JobNotRun,
            VerifierStatus::ParentAndDepjobFailed,
            VerifierStatus::ExpectedFileNotFound,
            VerifierStatus::OutputFileNotFound,
        ] {
            assert_eq!(status.category(), StatusCategory::Fail, "{}", status);
        }
        assert!(VerifierReport::new(VerifierStatus::DependentJobFailed, vec![]).is_pass());
    }
}
