use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};

use job::Job;

use super::diff::unified_diff;
use super::{Error, Verifier, VerifierReport, VerifierStatus};
use crate::launcher::files;

#[derive(Debug, Clone, PartialEq, Eq)]
enum Source {
    /// A file the launcher wrote into the output directory.
    Output(String),
    /// A file the job wrote, relative to the exec directory.
    Comparison(PathBuf),
}

/// An expected file and where to find the output it is checked against.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ComparedFiles {
    expected: PathBuf,
    source: Source,
}

impl ComparedFiles {
    /// Compare `expected` with the root task's captured stdout.
    pub fn new(job: &Job, expected: impl Into<PathBuf>) -> Self {
        Self {
            expected: expected.into(),
            source: Source::Output(files::stdout_filename(job.name())),
        }
    }

    /// Compare with a file the job writes, relative to the exec directory, instead.
    pub fn with_comparison_file(mut self, file: impl Into<PathBuf>) -> Self {
        self.source = Source::Comparison(file.into());
        self
    }

    pub fn expected(&self) -> &Path {
        &self.expected
    }

    /// Path of the file compared with the expected one.
    pub fn output_file(&self, output_path: &Path, exec_path: Option<&Path>) -> PathBuf {
        match &self.source {
            Source::Output(name) => output_path.join(name),
            Source::Comparison(file) => exec_path.unwrap_or(output_path).join(file),
        }
    }

    /// (expected, output) when both exist, otherwise the failing report.
    pub(super) fn locate(
        &self,
        output_path: &Path,
        exec_path: Option<&Path>,
    ) -> Result<(&Path, PathBuf), VerifierReport> {
        if !self.expected.is_file() {
            return Err(VerifierReport::new(
                VerifierStatus::ExpectedFileNotFound,
                vec![format!(
                    "[Comparison] Expected file missing: {}",
                    self.expected.display()
                )],
            ));
        }
        let output = self.output_file(output_path, exec_path);
        if !output.is_file() {
            return Err(VerifierReport::new(
                VerifierStatus::OutputFileNotFound,
                vec![format!("[Comparison] Output file missing: {}", output.display())],
            ));
        }
        Ok((&self.expected, output))
    }

    /// Copy the current output over the expected file, creating its directory.
    pub fn update_expected(&self, output_path: &Path, exec_path: Option<&Path>) -> Result<()> {
        let output = self.output_file(output_path, exec_path);
        if !output.is_file() {
            return Err(Error::MissingSource(output.display().to_string()).into());
        }
        if let Some(dir) = self.expected.parent() {
            if !dir.as_os_str().is_empty() && !dir.exists() {
                fs::create_dir_all(dir).with_context(|| format!("creating dir {:?}", dir))?;
            }
        }
        fs::copy(&output, &self.expected)
            .with_context(|| format!("copying {:?} to {:?}", output, self.expected))?;
        log::info!("updated {:?} from {:?}", self.expected, output);
        Ok(())
    }
}

/// Requires the output to be byte-identical to the expected file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ComparisonVerifier {
    files: ComparedFiles,
}

impl ComparisonVerifier {
    pub fn new(files: ComparedFiles) -> Self {
        Self { files }
    }

    pub fn files(&self) -> &ComparedFiles {
        &self.files
    }
}

impl Verifier for ComparisonVerifier {
    fn execute(&self, output_path: &Path, exec_path: Option<&Path>) -> VerifierReport {
        let (expected, output) = match self.files.locate(output_path, exec_path) {
            Ok(found) => found,
            Err(report) => return report,
        };
        let (from, to) = match (fs::read(expected), fs::read(&output)) {
            (Ok(from), Ok(to)) => (from, to),
            (Err(e), _) | (_, Err(e)) => {
                return VerifierReport::new(
                    VerifierStatus::NotOk,
                    vec![format!("[Comparison] Could not read files: {}", e)],
                )
            }
        };
        if from == to {
            return VerifierReport::ok();
        }

        let expected_name = expected.display().to_string();
        let output_name = output.display().to_string();
        let mut lines = unified_diff(
            &String::from_utf8_lossy(&from),
            &String::from_utf8_lossy(&to),
            &expected_name,
            &output_name,
        );
        if lines.is_empty() {
            lines.push(format!("--- {}", expected_name));
            lines.push(format!("+++ {}", output_name));
            lines.push(String::from("[Comparison] Files differ only in line endings"));
        }
        VerifierReport::new(VerifierStatus::NotOk, lines)
    }

    fn update_expected(&self, output_path: &Path, exec_path: Option<&Path>) -> Result<()> {
        self.files.update_expected(output_path, exec_path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::Result;
    use job::Task;
    use tempfile::tempdir;

    fn job() -> Job {
        Job::leaf("cmp", Task::new(["./cmp"]).unwrap())
    }

    #[test]
    fn test_identical_and_different() -> Result<()> {
        let dir = tempdir()?;
        let expected = dir.path().join("cmp.expected");
        fs::write(&expected, "one\ntwo\n")?;
        let out = dir.path().join("sciath.job-cmp.stdout");
        fs::write(&out, "one\ntwo\n")?;

        let verifier = ComparisonVerifier::new(ComparedFiles::new(&job(), &expected));
        assert_eq!(verifier.execute(dir.path(), None), VerifierReport::ok());

        fs::write(&out, "one\n2\n")?;
        let report = verifier.execute(dir.path(), None);
        assert_eq!(report.status, VerifierStatus::NotOk);
        assert!(report.lines[0].starts_with("--- ") && report.lines[0].ends_with("cmp.expected"));
        assert!(report.lines[1].starts_with("+++ "));
        assert!(report.lines.contains(&"-two".to_owned()));
        assert!(report.lines.contains(&"+2".to_owned()));
        Ok(())
    }

    #[test]
    fn test_missing_files() -> Result<()> {
        let dir = tempdir()?;
        let expected = dir.path().join("cmp.expected");
        let verifier = ComparisonVerifier::new(ComparedFiles::new(&job(), &expected));
        assert_eq!(
            verifier.execute(dir.path(), None).status,
            VerifierStatus::ExpectedFileNotFound
        );
        fs::write(&expected, "x\n")?;
        assert_eq!(
            verifier.execute(dir.path(), None).status,
            VerifierStatus::OutputFileNotFound
        );
        Ok(())
    }

    #[test]
    fn test_comparison_file_is_relative_to_exec_path() -> Result<()> {
        let out = tempdir()?;
        let exec = tempdir()?;
        let expected = out.path().join("expected.txt");
        fs::write(&expected, "42\n")?;
        fs::write(exec.path().join("result.txt"), "42\n")?;

        let files = ComparedFiles::new(&job(), &expected).with_comparison_file("result.txt");
        let verifier = ComparisonVerifier::new(files);
        assert_eq!(verifier.execute(out.path(), Some(exec.path())).status, VerifierStatus::Ok);
        assert_eq!(
            verifier.execute(out.path(), None).status,
            VerifierStatus::OutputFileNotFound
        );
        Ok(())
    }

    #[test]
    fn test_update_expected_creates_dir() -> Result<()> {
        let dir = tempdir()?;
        let expected = dir.path().join("ref").join("cmp.expected");
        fs::write(dir.path().join("sciath.job-cmp.stdout"), "new\n")?;
        let verifier = ComparisonVerifier::new(ComparedFiles::new(&job(), &expected));
        verifier.update_expected(dir.path(), None)?;
        assert_eq!(fs::read_to_string(&expected)?, "new\n");
        assert_eq!(verifier.execute(dir.path(), None).status, VerifierStatus::Ok);
        Ok(())
    }

    #[test]
    fn test_update_expected_without_output() -> Result<()> {
        let dir = tempdir()?;
        let verifier =
            ComparisonVerifier::new(ComparedFiles::new(&job(), dir.path().join("e")));
        assert!(verifier.update_expected(dir.path(), None).is_err());
        Ok(())
    }
}
