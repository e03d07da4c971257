use std::fmt::{self, Write};

use super::{TestRun, TestRunStatus};

/// One line of the human-readable report. The UI decides how to color it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReportLine<'a> {
    /// A section header, like `[ *** Summary *** ]`.
    Header(&'static str),
    /// `[Report for <name>]`
    TestHeader(&'a str),
    /// A line of a verifier report.
    Detail(&'a str),
    /// `[<name>]  <status> (<info>)`
    Status {
        name: &'a str,
        status: TestRunStatus,
        info: &'a str,
    },
    Blank,
    Success,
    Failure,
    /// Names of failed tests, for re-running them with `-t`.
    RerunHint(String),
    NoTestsActive,
    NoTests,
}

impl fmt::Display for ReportLine<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Header(text) => write!(f, "[ *** {} *** ]", text),
            Self::TestHeader(name) => write!(f, "[Report for {}]", name),
            Self::Detail(line) => f.write_str(line),
            Self::Status { name, status, info } => {
                write!(f, "[{}]  {}", name, status)?;
                if !info.is_empty() {
                    write!(f, " ({})", info)?;
                }
                Ok(())
            }
            Self::Blank => Ok(()),
            Self::Success => f.write_str("SUCCESS"),
            Self::Failure => f.write_str("FAILURE"),
            Self::RerunHint(names) => write!(f, "To re-run failed tests, use e.g.\n  -t {}", names),
            Self::NoTestsActive => f.write_str("No tests active"),
            Self::NoTests => f.write_str("No tests"),
        }
    }
}

/// Verifier reports of every test that has one, then a status line per test
/// and the overall result.
pub fn lines(runs: &[TestRun]) -> Vec<ReportLine<'_>> {
    if runs.is_empty() {
        return vec![ReportLine::NoTests];
    }

    let mut out = Vec::new();
    let mut header_printed = false;
    for run in runs.iter().filter(|r| !r.report.is_empty()) {
        if !header_printed {
            out.push(ReportLine::Header("Verification Reports"));
            header_printed = true;
        }
        out.push(ReportLine::TestHeader(run.test.name()));
        out.extend(run.report.iter().map(|l| ReportLine::Detail(l)));
    }

    out.push(ReportLine::Header("Summary"));
    for run in runs {
        out.push(ReportLine::Status {
            name: run.test.name(),
            status: run.status,
            info: &run.status_info,
        });
    }
    out.push(ReportLine::Blank);

    if !runs.iter().any(|r| r.active) {
        out.push(ReportLine::NoTestsActive);
        return out;
    }
    let success = runs
        .iter()
        .all(|r| matches!(r.status, TestRunStatus::Pass | TestRunStatus::Deactivated));
    if success {
        out.push(ReportLine::Success);
    } else {
        out.push(ReportLine::Failure);
        let failed: Vec<&str> = runs
            .iter()
            .filter(|r| r.status == TestRunStatus::Fail)
            .map(|r| r.test.name())
            .collect();
        if !failed.is_empty() {
            out.push(ReportLine::RerunHint(failed.join(",")));
        }
    }
    out
}

/// `name (group1, group2)` for every test.
pub fn list(runs: &[TestRun]) -> Vec<String> {
    runs.iter()
        .map(|run| {
            let groups = run.test.groups();
            if groups.is_empty() {
                run.test.name().to_owned()
            } else {
                format!("{} ({})", run.test.name(), groups.join(", "))
            }
        })
        .collect()
}

/// A report in the Test Anything Protocol. Deactivated tests are TAP skips;
/// tests which could not run count as failures.
pub fn tap(runs: &[TestRun]) -> String {
    let mut out = String::with_capacity(32 * (runs.len() + 2));
    out.push_str("TAP version 13\n");
    // writing to a String can't fail:
    let _ = writeln!(out, "1..{}", runs.len());
    for (i, run) in runs.iter().enumerate() {
        let (ok, directive) = match run.status {
            TestRunStatus::Deactivated => ("ok", "# SKIP deactivated"),
            TestRunStatus::Pass => ("ok", ""),
            TestRunStatus::Fail => ("not ok", ""),
            TestRunStatus::Incomplete => ("not ok", "(incomplete)"),
            TestRunStatus::NotLaunched => ("not ok", "(not launched)"),
            TestRunStatus::Unknown => ("not ok", "(unknown)"),
            TestRunStatus::Skipped => ("not ok", "(skipped but not deactivated)"),
        };
        let _ = write!(out, "{} {} - {}", ok, i + 1, run.test.name());
        if !directive.is_empty() {
            let _ = write!(out, " {}", directive);
        }
        out.push('\n');
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::harness::Test;
    use job::{Job, Task};
    use std::path::Path;

    fn run(name: &str, status: TestRunStatus) -> TestRun {
        let job = Job::leaf(name, Task::new(["true"]).unwrap());
        let mut run = TestRun::new(Test::exit_code(job).unwrap(), Path::new("/tmp/out"));
        run.status = status;
        run.active = status != TestRunStatus::Deactivated;
        run
    }

    fn render(lines: &[ReportLine]) -> Vec<String> {
        lines.iter().map(ToString::to_string).collect()
    }

    #[test]
    fn test_no_tests() {
        assert_eq!(render(&lines(&[])), ["No tests"]);
        assert_eq!(tap(&[]), "TAP version 13\n1..0\n");
    }

    #[test]
    fn test_failure_report() {
        let mut runs = vec![
            run("a", TestRunStatus::Pass),
            run("b", TestRunStatus::Fail),
            run("c", TestRunStatus::Deactivated),
            run("d", TestRunStatus::Fail),
        ];
        runs[1].report = vec!["[ExitCode] Output exit code(s)  : [3]".into()];
        runs[1].status_info = "verification failed".into();

        assert_eq!(
            render(&lines(&runs)),
            [
                "[ *** Verification Reports *** ]",
                "[Report for b]",
                "[ExitCode] Output exit code(s)  : [3]",
                "[ *** Summary *** ]",
                "[a]  pass",
                "[b]  fail (verification failed)",
                "[c]  deactivated",
                "[d]  fail",
                "",
                "FAILURE",
                "To re-run failed tests, use e.g.\n  -t b,d",
            ]
        );
    }

    #[test]
    fn test_success_and_inactive() {
        let runs = vec![run("a", TestRunStatus::Pass), run("b", TestRunStatus::Deactivated)];
        assert_eq!(lines(&runs).last(), Some(&ReportLine::Success));

        let runs = vec![run("b", TestRunStatus::Deactivated)];
        assert_eq!(lines(&runs).last(), Some(&ReportLine::NoTestsActive));
    }

    #[test]
    fn test_tap() {
        let runs = vec![
            run("a", TestRunStatus::Pass),
            run("b", TestRunStatus::Deactivated),
            run("c", TestRunStatus::Skipped),
            run("d", TestRunStatus::Fail),
        ];
        assert_eq!(
            tap(&runs),
            "TAP version 13\n1..4\n\
             ok 1 - a\n\
             ok 2 - b # SKIP deactivated\n\
             not ok 3 - c (skipped but not deactivated)\n\
             not ok 4 - d\n"
        );
    }

    #[test]
    fn test_list() {
        let mut runs = vec![run("a", TestRunStatus::Unknown), run("b", TestRunStatus::Unknown)];
        runs[1].test.add_group("fast");
        runs[1].test.add_group("mpi");
        assert_eq!(list(&runs), ["a", "b (fast, mpi)"]);
    }
}
