use std::fs;
use std::path::Path;

use job::Job;

use super::{Error, Verifier, VerifierReport, VerifierStatus};
use crate::launcher::files;

/// Compares the exit codes the launcher recorded with each task's
/// expected code. The root's code is always the last line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExitCodeVerifier {
    exitcode_file: String,
    exit_codes_success: Vec<i32>,
}

impl ExitCodeVerifier {
    pub fn new(job: &Job) -> Result<Self, job::Error> {
        let plan = job.resolve()?;
        Ok(Self {
            exitcode_file: files::exitcode_filename(job.name()),
            exit_codes_success: plan.exit_codes_success(),
        })
    }

    pub fn exit_codes_success(&self) -> &[i32] {
        &self.exit_codes_success
    }

    /// Override the expected codes, one per task in execution order.
    pub fn set_exit_codes_success(&mut self, codes: Vec<i32>) -> Result<(), Error> {
        if codes.len() != self.exit_codes_success.len() {
            return Err(Error::WrongExitCodeCount {
                expected: self.exit_codes_success.len(),
                found: codes.len(),
            });
        }
        self.exit_codes_success = codes;
        Ok(())
    }

    fn mismatch_report(&self, codes: &[i32]) -> Vec<String> {
        vec![
            format!(
                "[ExitCode] Expected exit code(s): {:?}",
                self.exit_codes_success
            ),
            format!("[ExitCode] Output exit code(s)  : {:?}", codes),
        ]
    }
}

impl Verifier for ExitCodeVerifier {
    fn execute(&self, output_path: &Path, _exec_path: Option<&Path>) -> VerifierReport {
        let path = output_path.join(&self.exitcode_file);
        let text = match fs::read_to_string(&path) {
            Ok(text) => text,
            Err(e) => {
                log::debug!("reading {:?}: {}", path, e);
                return VerifierReport::new(
                    VerifierStatus::JobNotRun,
                    vec![format!("[ExitCode] File {} not found", path.display())],
                );
            }
        };

        let mut codes = Vec::with_capacity(self.exit_codes_success.len());
        for (i, line) in text.lines().enumerate() {
            let line = line.trim();
            if line.is_empty() {
                continue;
            }
            match line.parse::<i32>() {
                Ok(code) => codes.push(code),
                Err(_) => {
                    return VerifierReport::new(
                        VerifierStatus::NotOk,
                        vec![format!(
                            "[ExitCode] Line {} of {} is not an exit code: \"{}\"",
                            i + 1,
                            path.display(),
                            line
                        )],
                    )
                }
            }
        }

        if codes.len() != self.exit_codes_success.len() {
            let mut lines = vec![format!(
                "[ExitCode] Expected {} exit code(s), found {}",
                self.exit_codes_success.len(),
                codes.len()
            )];
            lines.extend(self.mismatch_report(&codes));
            return VerifierReport::new(VerifierStatus::NotOk, lines);
        }

        let n = codes.len();
        let root_ok = codes[n - 1] == self.exit_codes_success[n - 1];
        let deps_ok = codes[..n - 1] == self.exit_codes_success[..n - 1];
        let status = match (root_ok, deps_ok) {
            (true, true) => return VerifierReport::ok(),
            (false, true) => VerifierStatus::NotOk,
            (true, false) => VerifierStatus::DependentJobFailed,
            (false, false) => VerifierStatus::ParentAndDepjobFailed,
        };
        VerifierReport::new(status, self.mismatch_report(&codes))
    }
}
