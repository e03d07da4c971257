use std::fmt;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};

use job::Job;
use util::HashSet;

use crate::fs::Fs;
use crate::launcher::{LaunchOutcome, Launcher};
use crate::verifier::{ExitCodeVerifier, StatusCategory, Verifier, VerifierReport, VerifierStatus};

/// Creating tests from a suite file
pub mod suite_file;

/// Text and TAP reports
pub mod report;

#[derive(thiserror::Error, Debug)]
pub enum Error {
    #[error("Duplicate test name \"{0}\"")]
    DuplicateTest(String),
    #[error("Unexpected sandbox sentinel file {0}; clean the output first")]
    UnexpectedSentinel(String),
    #[error("Did not find expected sandbox sentinel file {0}; refusing to delete the directory")]
    MissingSentinel(String),
    #[error("Output directory \"{0}\" must be absolute")]
    RelativeOutput(String),
}

/// A named job, plus how to judge its output.
pub struct Test {
    name: String,
    job: Job,
    verifier: Box<dyn Verifier>,
    groups: Vec<String>,
}

impl Test {
    /// A test named after its job.
    pub fn new(job: Job, verifier: Box<dyn Verifier>) -> Self {
        Self {
            name: job.name().to_owned(),
            job,
            verifier,
            groups: Vec::new(),
        }
    }

    /// A test which only checks exit codes.
    pub fn exit_code(job: Job) -> Result<Self, job::Error> {
        let verifier = ExitCodeVerifier::new(&job)?;
        Ok(Self::new(job, Box::new(verifier)))
    }

    pub fn add_group<S: Into<String>>(&mut self, group: S) {
        let group = group.into();
        if !self.groups.contains(&group) {
            self.groups.push(group);
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn job(&self) -> &Job {
        &self.job
    }

    pub fn groups(&self) -> &[String] {
        &self.groups
    }

    pub fn verify(&self, output_path: &Path, exec_path: Option<&Path>) -> VerifierReport {
        self.verifier.execute(output_path, exec_path)
    }
}

impl fmt::Debug for Test {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Test")
            .field("name", &self.name)
            .field("job", &self.job)
            .field("groups", &self.groups)
            .finish_non_exhaustive()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TestRunStatus {
    /// Neither executed nor verified yet.
    Unknown,
    /// Couldn't be launched, e.g. for lack of MPI.
    Skipped,
    /// The launcher didn't run it.
    NotLaunched,
    /// No exit codes yet; possibly still queued.
    Incomplete,
    Pass,
    Fail,
    /// Left out on purpose.
    Deactivated,
}

impl fmt::Display for TestRunStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Unknown => "unknown",
            Self::Skipped => "skipped",
            Self::NotLaunched => "not launched",
            Self::Incomplete => "incomplete",
            Self::Pass => "pass",
            Self::Fail => "fail",
            Self::Deactivated => "deactivated",
        };
        f.write_str(s)
    }
}

/// One test plus the state of running it: where, and with what result.
#[derive(Debug)]
pub struct TestRun {
    pub test: Test,
    pub output_path: PathBuf,
    pub exec_path: PathBuf,
    /// Whether `exec_path` is a sandbox we create and delete.
    pub sandbox: bool,
    pub active: bool,
    pub status: TestRunStatus,
    pub status_info: String,
    pub report: Vec<String>,
}

impl TestRun {
    /// Output goes to `$ROOT/<name>_output`; commands run in its `sandbox` subdirectory.
    fn new(test: Test, output_root: &Path) -> Self {
        let output_path = output_root.join(format!("{}_output", test.name()));
        let exec_path = output_path.join("sandbox");
        Self {
            test,
            output_path,
            exec_path,
            sandbox: true,
            active: true,
            status: TestRunStatus::Unknown,
            status_info: String::new(),
            report: Vec::new(),
        }
    }

    /// Run commands in `exec_path` directly; it is never created or deleted.
    pub fn set_exec_path(&mut self, exec_path: PathBuf) {
        self.exec_path = exec_path;
        self.sandbox = false;
    }

    fn record_verification(&mut self, report: VerifierReport) {
        let VerifierReport { status, lines } = report;
        self.report = lines;
        self.status_info = match status {
            VerifierStatus::Ok => String::new(),
            _ => status.description().to_owned(),
        };
        self.status = match (status, status.category()) {
            (VerifierStatus::JobNotRun, _) => TestRunStatus::Incomplete,
            (_, StatusCategory::Pass | StatusCategory::Warn) => TestRunStatus::Pass,
            (_, StatusCategory::Fail) => TestRunStatus::Fail,
        };
    }
}

/// Manages a set of uniquely named tests: runs them with a launcher,
/// verifies them, and cleans up after them.
pub struct Harness {
    launcher: Launcher,
    /// Whitelists every output directory.
    fs: Fs,
    runs: Vec<TestRun>,
    names: HashSet<String>,
}

impl Harness {
    /// `output_root` must be absolute; each test writes into a subdirectory.
    pub fn new(launcher: Launcher, output_root: &Path) -> Result<Self> {
        if !output_root.is_absolute() {
            return Err(Error::RelativeOutput(output_root.display().to_string()).into());
        }
        Ok(Self {
            launcher,
            fs: Fs::new(output_root)?,
            runs: Vec::new(),
            names: HashSet::default(),
        })
    }

    pub fn launcher(&self) -> &Launcher {
        &self.launcher
    }

    pub fn runs(&self) -> &[TestRun] {
        &self.runs
    }

    pub fn runs_mut(&mut self) -> &mut [TestRun] {
        &mut self.runs
    }

    pub fn add_test(&mut self, test: Test) -> Result<()> {
        if !self.names.insert(test.name().to_owned()) {
            return Err(Error::DuplicateTest(test.name().to_owned()).into());
        }
        let run = TestRun::new(test, self.fs.output_prefix());
        self.runs.push(run);
        Ok(())
    }

    pub fn add_tests_from_file(&mut self, path: &Path) -> Result<()> {
        for test in suite_file::load(path)? {
            self.add_test(test)
                .with_context(|| format!("while adding tests from {:?}", path))?;
        }
        Ok(())
    }

    /// Deactivate every test not named in `names`.
    pub fn select_by_names(&mut self, names: &[String]) {
        for name in names {
            if !self.names.contains(name) {
                log::warn!("no test named \"{}\"", name);
            }
        }
        for run in &mut self.runs {
            if !names.iter().any(|n| n == run.test.name()) {
                run.active = false;
            }
        }
    }

    /// Deactivate tests in none of `only` (when given) and tests in any of `exclude`.
    pub fn select_by_groups(&mut self, only: &[String], exclude: &[String]) {
        for run in &mut self.runs {
            let groups = run.test.groups();
            let in_any = |wanted: &[String]| groups.iter().any(|g| wanted.contains(g));
            if (!only.is_empty() && !in_any(only)) || in_any(exclude) {
                run.active = false;
            }
        }
    }

    /// Launch every active test. Sandboxes must be clean: finding a
    /// sentinel from an earlier run is an error. A test whose launch fails
    /// is recorded as not launched and the rest still run.
    pub fn execute(&mut self) -> Result<()> {
        let mut buf = PathBuf::with_capacity(256);
        for run in self.runs.iter_mut().filter(|r| r.active) {
            self.fs.create_dir(&run.output_path)?;
            if run.sandbox {
                let sentinel = self.fs.sentinel(&run.exec_path, &mut buf);
                if self.fs.exists(sentinel) {
                    return Err(Error::UnexpectedSentinel(sentinel.display().to_string()).into());
                }
                self.fs.create_dir(&run.exec_path)?;
                self.fs.create_file(sentinel)?;
            }

            log::info!("launching test \"{}\"", run.test.name());
            let outcome = self
                .launcher
                .submit(&run.test.job, &run.output_path, Some(&run.exec_path))
                .with_context(|| format!("while launching test \"{}\"", run.test.name()))
                .unwrap_or_else(|e| {
                    log::error!("{:#}", e);
                    LaunchOutcome::NotLaunched {
                        info: String::from("launch failed"),
                        report: vec![format!("[Launcher] {:#}", e)],
                    }
                });
            match outcome {
                LaunchOutcome::Completed | LaunchOutcome::Submitted => {
                    run.status = TestRunStatus::Unknown;
                    run.status_info.clear();
                    run.report.clear();
                }
                LaunchOutcome::NotLaunched { info, report } => {
                    run.status = TestRunStatus::NotLaunched;
                    run.status_info = info;
                    run.report = report;
                }
            }
        }
        Ok(())
    }

    /// Give every test run a final status.
    pub fn verify(&mut self) {
        for run in &mut self.runs {
            if !run.active {
                run.status = TestRunStatus::Deactivated;
            } else if run.status == TestRunStatus::NotLaunched {
                run.status = TestRunStatus::Skipped;
            } else {
                let report = run.test.verify(&run.output_path, Some(&run.exec_path));
                log::debug!("test \"{}\": {}", run.test.name(), report.status);
                run.record_verification(report);
            }
        }
    }

    /// Remove launcher output and sandboxes of active tests. A sandbox is
    /// only deleted if its sentinel is present.
    pub fn clean(&mut self) -> Result<()> {
        let mut buf = PathBuf::with_capacity(256);
        for run in self.runs.iter().filter(|r| r.active) {
            log::info!("removing output for test \"{}\"", run.test.name());
            self.launcher.clean(&run.test.job, &run.output_path)?;
            if run.sandbox && self.fs.exists(&run.exec_path) {
                let sentinel = self.fs.sentinel(&run.exec_path, &mut buf);
                if !self.fs.exists(sentinel) {
                    return Err(Error::MissingSentinel(sentinel.display().to_string()).into());
                }
                self.fs.delete_dir(&run.exec_path)?;
            }
        }
        for run in &mut self.runs {
            if run.active {
                run.status = TestRunStatus::Unknown;
                run.status_info.clear();
                run.report.clear();
            }
        }
        Ok(())
    }

    /// Let each active test's verifier overwrite its reference data with
    /// the current output. Returns one result per active test.
    pub fn update_expected(&self) -> Vec<(&str, Result<()>)> {
        self.runs
            .iter()
            .filter(|r| r.active)
            .map(|run| {
                let result = run
                    .test
                    .verifier
                    .update_expected(&run.output_path, Some(&run.exec_path));
                (run.test.name(), result)
            })
            .collect()
    }

    /// True if every test passed or was deactivated.
    pub fn overall_success(&self) -> bool {
        self.runs.iter().all(|r| {
            matches!(
                r.status,
                TestRunStatus::Pass | TestRunStatus::Deactivated
            )
        })
    }

    pub fn report(&self) -> Vec<report::ReportLine<'_>> {
        report::lines(&self.runs)
    }

    pub fn tap_report(&self) -> String {
        report::tap(&self.runs)
    }

    pub fn list(&self) -> Vec<String> {
        report::list(&self.runs)
    }

    pub fn any_active(&self) -> bool {
        self.runs.iter().any(|r| r.active)
    }

    /// Names of tests which failed verification.
    pub fn failed_names(&self) -> Vec<&str> {
        self.runs
            .iter()
            .filter(|r| r.status == TestRunStatus::Fail)
            .map(|r| r.test.name())
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::launcher::LauncherConfig;
    use anyhow::Result;
    use job::Task;
    use tempfile::tempdir;

    fn harness(root: &Path) -> Harness {
        Harness::new(Launcher::new(LauncherConfig::default()).unwrap(), root).unwrap()
    }

    fn sh_test(name: &str, script: &str) -> Test {
        Test::exit_code(Job::leaf(name, Task::new(["sh", "-c", script]).unwrap())).unwrap()
    }

    #[test]
    fn test_duplicate_names() {
        let dir = tempdir().unwrap();
        let mut h = harness(dir.path());
        h.add_test(sh_test("a", "true")).unwrap();
        let err = h.add_test(sh_test("a", "true")).unwrap_err();
        assert!(matches!(err.downcast_ref::<Error>(), Some(Error::DuplicateTest(_))));
    }

    #[test]
    fn test_execute_verify_clean() -> Result<()> {
        let dir = tempdir()?;
        let mut h = harness(dir.path());
        h.add_test(sh_test("good", "echo ok > result.txt"))?;
        h.add_test(sh_test("bad", "exit 4"))?;

        h.execute()?;
        let sandbox = dir.path().join("good_output").join("sandbox");
        assert!(sandbox.join(".sciath_sandbox").exists());
        assert!(sandbox.join("result.txt").exists(), "ran in the sandbox");

        h.verify();
        assert_eq!(h.runs()[0].status, TestRunStatus::Pass);
        assert_eq!(h.runs()[1].status, TestRunStatus::Fail);
        assert!(!h.overall_success());
        assert_eq!(h.failed_names(), ["bad"]);

        h.clean()?;
        assert!(!sandbox.exists());
        assert!(!dir.path().join("good_output").join("sciath.job-good.exitcode").exists());
        Ok(())
    }

    #[test]
    fn test_execute_into_dirty_sandbox_fails() -> Result<()> {
        let dir = tempdir()?;
        let mut h = harness(dir.path());
        h.add_test(sh_test("t", "true"))?;
        h.execute()?;
        let err = h.execute().unwrap_err();
        assert!(matches!(
            err.downcast_ref::<Error>(),
            Some(Error::UnexpectedSentinel(_))
        ));
        Ok(())
    }

    #[test]
    fn test_clean_refuses_without_sentinel() -> Result<()> {
        let dir = tempdir()?;
        let mut h = harness(dir.path());
        h.add_test(sh_test("t", "true"))?;
        std::fs::create_dir_all(dir.path().join("t_output").join("sandbox"))?;
        let err = h.clean().unwrap_err();
        assert!(matches!(
            err.downcast_ref::<Error>(),
            Some(Error::MissingSentinel(_))
        ));
        Ok(())
    }

    #[test]
    fn test_selection() -> Result<()> {
        let dir = tempdir()?;
        let mut h = harness(dir.path());
        for (name, groups) in [("a", vec!["fast"]), ("b", vec!["slow"]), ("c", vec!["fast", "mpi"])] {
            let mut t = sh_test(name, "true");
            for g in groups {
                t.add_group(g);
            }
            h.add_test(t)?;
        }

        h.select_by_groups(&["fast".into()], &["mpi".into()]);
        let active: Vec<_> = h.runs().iter().filter(|r| r.active).map(|r| r.test.name()).collect();
        assert_eq!(active, ["a"]);

        for run in h.runs_mut() {
            run.active = true;
        }
        h.select_by_names(&["b".into(), "c".into()]);
        h.verify();
        assert_eq!(h.runs()[0].status, TestRunStatus::Deactivated);
        // not executed, so no exit code file yet:
        assert_eq!(h.runs()[1].status, TestRunStatus::Incomplete);
        Ok(())
    }

    #[test]
    fn test_not_launched_becomes_skipped() -> Result<()> {
        let dir = tempdir()?;
        let mut h = harness(dir.path());
        let req = job::ResourceRequest::new().with_ranks(2)?;
        let job = Job::leaf("par", Task::new(["./par"])?.with_resources(&req));
        h.add_test(Test::exit_code(job)?)?;
        h.execute()?;
        assert_eq!(h.runs()[0].status, TestRunStatus::NotLaunched);
        h.verify();
        assert_eq!(h.runs()[0].status, TestRunStatus::Skipped);
        assert!(!h.overall_success());
        Ok(())
    }

    #[test]
    fn test_launch_error_does_not_stop_suite() -> Result<()> {
        let dir = tempdir()?;
        let mut h = harness(dir.path());
        h.add_test(sh_test("broken", "true"))?;
        h.add_test(sh_test("fine", "true"))?;
        h.runs_mut()[0].set_exec_path(PathBuf::from("relative/exec"));

        h.execute()?;
        assert_eq!(h.runs()[0].status, TestRunStatus::NotLaunched);
        assert_eq!(h.runs()[0].status_info, "launch failed");
        assert!(h.runs()[0].report[0].contains("relative/exec"));

        h.verify();
        assert_eq!(h.runs()[0].status, TestRunStatus::Skipped);
        assert_eq!(h.runs()[1].status, TestRunStatus::Pass);
        assert!(!h.overall_success());
        Ok(())
    }

    #[test]
    fn test_warn_maps_to_pass() -> Result<()> {
        let dir = tempdir()?;
        let mut h = harness(dir.path());
        let mut job = Job::sequence("seq", Task::new(["true"])?);
        job.append(Job::leaf("dep", Task::new(["false"])?))?;
        h.add_test(Test::exit_code(job)?)?;
        h.execute()?;
        h.verify();
        let run = &h.runs()[0];
        assert_eq!(run.status, TestRunStatus::Pass);
        assert_eq!(run.status_info, VerifierStatus::DependentJobFailed.description());
        Ok(())
    }
}
