use std::fmt;
use std::fs;
use std::path::Path;
use std::sync::OnceLock;

use anyhow::Result;
use regex::Regex;

use super::comparison::ComparedFiles;
use super::{Verifier, VerifierReport, VerifierStatus};

/// (1-based line number, line text) for every line a rule matched, in file order.
pub type MatchedLines = Vec<(usize, String)>;

type CompareFn = dyn Fn(&MatchedLines, &MatchedLines) -> (bool, Vec<String>);

/// At most this many mismatching lines are reported per rule.
const MAX_LINE_ERRORS: usize = 100;

const DEFAULT_RTOL: f64 = 1e-6;

/// Selects lines with a regex, then judges expected vs. actual selections.
pub struct Rule {
    pattern: Regex,
    compare: Box<CompareFn>,
}

impl Rule {
    /// `compare` gets the expected file's matches first, then the output's,
    /// and returns whether they agree plus report lines.
    pub fn new<F>(pattern: &str, compare: F) -> Result<Self, regex::Error>
    where
        F: Fn(&MatchedLines, &MatchedLines) -> (bool, Vec<String>) + 'static,
    {
        Ok(Self {
            pattern: Regex::new(pattern)?,
            compare: Box::new(compare),
        })
    }

    pub fn pattern(&self) -> &str {
        self.pattern.as_str()
    }

    /// Lines where the pattern matches at the very start.
    fn matches(&self, text: &str) -> MatchedLines {
        text.lines()
            .enumerate()
            .filter(|(_, line)| self.pattern.find(line).is_some_and(|m| m.start() == 0))
            .map(|(i, line)| (i + 1, line.to_owned()))
            .collect()
    }
}

impl fmt::Debug for Rule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Rule")
            .field("pattern", &self.pattern.as_str())
            .finish_non_exhaustive()
    }
}

/// Compares an output file with an expected one, rule by rule.
/// Passes only if every rule passes.
#[derive(Debug)]
pub struct LineVerifier {
    files: ComparedFiles,
    rules: Vec<Rule>,
}

impl LineVerifier {
    pub fn new(files: ComparedFiles) -> Self {
        Self {
            files,
            rules: Vec::new(),
        }
    }

    pub fn with_rule(mut self, rule: Rule) -> Self {
        self.rules.push(rule);
        self
    }

    pub fn add_rule(&mut self, rule: Rule) {
        self.rules.push(rule);
    }

    pub fn rules(&self) -> &[Rule] {
        &self.rules
    }

    pub fn files(&self) -> &ComparedFiles {
        &self.files
    }
}

impl Verifier for LineVerifier {
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
                    vec![format!("[Line] Could not read files: {}", e)],
                )
            }
        };
        let from = String::from_utf8_lossy(&from);
        let to = String::from_utf8_lossy(&to);

        let mut passing = true;
        let mut lines = Vec::new();
        for rule in &self.rules {
            let (rule_passing, rule_report) =
                (rule.compare)(&rule.matches(&from), &rule.matches(&to));
            if passing && !rule_passing {
                passing = false;
                lines.push(format!("--- {}", expected.display()));
                lines.push(format!("+++ {}", output.display()));
            }
            if !rule_report.is_empty() {
                lines.push(format!("Report for lines matching: '{}'", rule.pattern()));
                lines.extend(rule_report);
            }
        }

        let status = if passing {
            VerifierStatus::Ok
        } else {
            VerifierStatus::NotOk
        };
        VerifierReport::new(status, lines)
    }

    fn update_expected(&self, output_path: &Path, exec_path: Option<&Path>) -> Result<()> {
        self.files.update_expected(output_path, exec_path)
    }
}

/// A rule matching lines that start with `key` (after optional
/// whitespace), or every line, comparing all numbers on them as floats.
///
/// A value passes if it is within `atol` or within `rtol`; an expected
/// 0.0 only passes the relative check when matched exactly. With neither
/// tolerance given, `rtol` is 1e-6.
pub fn key_and_float_rule(
    key: Option<&str>,
    rtol: Option<f64>,
    atol: Option<f64>,
) -> Result<Rule, regex::Error> {
    let tol = Tolerance {
        rtol: match (rtol, atol) {
            (None, None) => Some(DEFAULT_RTOL),
            _ => rtol,
        },
        atol,
    };
    let pattern = match key {
        Some(key) if !key.is_empty() => format!(r"^\s*{}", regex::escape(key)),
        _ => String::from("^"),
    };
    Rule::new(&pattern, move |expected, output| float_pairs(expected, output, tol))
}

#[derive(Debug, Clone, Copy)]
struct Tolerance {
    rtol: Option<f64>,
    atol: Option<f64>,
}

fn float_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"[+-]?(?:\d+\.?\d*|\.\d+)(?:[eE][+-]?\d+)?").expect("float regex is valid")
    })
}

/// The first number in each whitespace-separated word.
fn line_floats(line: &str) -> Vec<f64> {
    line.split_whitespace()
        .filter_map(|word| float_regex().find(word))
        .filter_map(|m| m.as_str().parse().ok())
        .collect()
}

fn float_pairs(expected: &MatchedLines, output: &MatchedLines, tol: Tolerance) -> (bool, Vec<String>) {
    if expected.is_empty() {
        return (
            false,
            vec![String::from("Expected file had no matches, so declaring failure")],
        );
    }

    let mut passing = true;
    let mut report = Vec::new();
    let mut errors = 0;
    for ((lineno_expected, line_expected), (lineno_out, line_out)) in expected.iter().zip(output) {
        let line_report = compare_line(line_expected, line_out, tol);
        if line_report.is_empty() {
            continue;
        }
        passing = false;
        errors += 1;
        if errors > MAX_LINE_ERRORS {
            report.push(format!(
                "Not checking any more lines after the first {}",
                MAX_LINE_ERRORS
            ));
            break;
        }
        report.push(format!(
            "Output line {} did not match line {} in expected output:",
            lineno_out, lineno_expected
        ));
        report.extend(line_report);
    }

    if expected.len() != output.len() {
        passing = false;
        report.push(format!(
            "Wrong number of matched lines: {} instead of {}",
            output.len(),
            expected.len()
        ));
    }
    (passing, report)
}

/// Report lines for every value out of tolerance; empty if the lines agree.
fn compare_line(expected: &str, output: &str, tol: Tolerance) -> Vec<String> {
    let floats_expected = line_floats(expected);
    let floats_out = line_floats(output);
    if floats_expected.len() != floats_out.len() {
        return vec![format!(
            "Wrong number of values found: {} instead of {}",
            floats_out.len(),
            floats_expected.len()
        )];
    }

    let mut report = Vec::new();
    for (&exp, &out) in floats_expected.iter().zip(&floats_out) {
        let abs_err = (out - exp).abs();
        let passing_abs = tol.atol.map_or(false, |atol| abs_err <= atol);
        // an expected zero passes the relative check only if matched exactly:
        let rel_err = if exp == 0.0 {
            if out == 0.0 {
                0.0
            } else {
                f64::INFINITY
            }
        } else {
            ((out - exp) / exp).abs()
        };
        let passing_rel = tol.rtol.map_or(false, |rtol| rel_err <= rtol);
        if passing_abs || passing_rel {
            continue;
        }
        report.push(match (tol.atol, tol.rtol) {
            (Some(atol), Some(rtol)) => format!(
                "{} != {} to abs. tol. {} (abs. err {}) or rel. tol {} (rel. err {})",
                out, exp, atol, abs_err, rtol, rel_err
            ),
            (Some(atol), None) => format!(
                "{} != {} to abs. tol. {} (abs. err {})",
                out, exp, atol, abs_err
            ),
            (None, rtol) => format!(
                "{} != {} to rel. tol. {} (rel. err. {})",
                out,
                exp,
                rtol.unwrap_or(DEFAULT_RTOL),
                rel_err
            ),
        });
    }
    report
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::Result;
    use job::{Job, Task};
    use tempfile::tempdir;

    fn matched(lines: &[(usize, &str)]) -> MatchedLines {
        lines.iter().map(|(n, l)| (*n, l.to_string())).collect()
    }

    fn run(expected: &str, output: &str, rule: Rule) -> Result<VerifierReport> {
        let dir = tempdir()?;
        let job = Job::leaf("lines", Task::new(["./lines"])?);
        let expected_file = dir.path().join("lines.expected");
        fs::write(&expected_file, expected)?;
        fs::write(dir.path().join("sciath.job-lines.stdout"), output)?;
        let verifier = LineVerifier::new(ComparedFiles::new(&job, expected_file)).with_rule(rule);
        Ok(verifier.execute(dir.path(), None))
    }

    #[test]
    fn test_rule_matches_at_line_start_only() -> Result<()> {
        let rule = Rule::new("residual", |_, _| (true, Vec::new()))?;
        assert!(rule.matches("step 1\nfinal residual 3.0\n").is_empty());
        assert_eq!(
            rule.matches("residual 1.0\nfinal residual 3.0\nresidual 2.0\n"),
            matched(&[(1, "residual 1.0"), (3, "residual 2.0")])
        );
        Ok(())
    }

    #[test]
    fn test_line_floats() {
        assert_eq!(line_floats("key 1.0 -2.5e3 x=.5 none"), [1.0, -2500.0, 0.5]);
        assert!(line_floats("no numbers here").is_empty());
    }

    #[test]
    fn test_within_default_tolerance() -> Result<()> {
        let report = run("key 1.0 2.0\n", "key 1.0000001 2.0\n", key_and_float_rule(Some("key"), None, None)?)?;
        assert_eq!(report.status, VerifierStatus::Ok);
        assert!(report.lines.is_empty());
        Ok(())
    }

    #[test]
    fn test_out_of_tolerance() -> Result<()> {
        let report = run(
            "header\nkey 1.0 2.0\n",
            "key 1.1 2.0\n",
            key_and_float_rule(Some("key"), Some(1e-6), None)?,
        )?;
        assert_eq!(report.status, VerifierStatus::NotOk);
        assert!(report
            .lines
            .contains(&"Output line 1 did not match line 2 in expected output:".to_owned()));
        assert!(report.lines.iter().any(|l| l.starts_with("1.1 != 1 to rel. tol.")));
        Ok(())
    }

    #[test]
    fn test_expected_zero_needs_exact_match() {
        let tol = Tolerance { rtol: Some(1e-6), atol: None };
        assert!(compare_line("v 0.0", "v 0", tol).is_empty());
        assert_eq!(compare_line("v 0.0", "v 1e-30", tol).len(), 1);
        let tol = Tolerance { rtol: Some(1e-6), atol: Some(1e-20) };
        assert!(compare_line("v 0.0", "v 1e-30", tol).is_empty());
    }

    #[test]
    fn test_absolute_tolerance_only() {
        let tol = Tolerance { rtol: None, atol: Some(0.5) };
        assert!(compare_line("x 10", "x 10.4", tol).is_empty());
        let report = compare_line("x 10", "x 11", tol);
        assert_eq!(report, ["11 != 10 to abs. tol. 0.5 (abs. err 1)"]);
    }

    #[test]
    fn test_line_count_mismatch() {
        let tol = Tolerance { rtol: Some(1e-6), atol: None };
        let (ok, report) = float_pairs(
            &matched(&[(1, "k 1"), (2, "k 2")]),
            &matched(&[(1, "k 1")]),
            tol,
        );
        assert!(!ok);
        assert_eq!(report, ["Wrong number of matched lines: 1 instead of 2"]);
    }

    #[test]
    fn test_no_expected_matches_fails() {
        let tol = Tolerance { rtol: Some(1e-6), atol: None };
        let (ok, _) = float_pairs(&Vec::new(), &Vec::new(), tol);
        assert!(!ok);
    }

    #[test]
    fn test_error_cap() {
        let tol = Tolerance { rtol: Some(1e-6), atol: None };
        let expected: MatchedLines = (1..=150).map(|i| (i, "k 1".to_owned())).collect();
        let output: MatchedLines = (1..=150).map(|i| (i, "k 2".to_owned())).collect();
        let (ok, report) = float_pairs(&expected, &output, tol);
        assert!(!ok);
        assert_eq!(
            report.last().map(String::as_str),
            Some("Not checking any more lines after the first 100")
        );
        assert_eq!(report.len(), 2 * MAX_LINE_ERRORS + 1);
    }

    #[test]
    fn test_custom_rule_and_unmatched_lines_ignored() -> Result<()> {
        let rule = Rule::new(r"^residual", |exp, out| (exp.len() == out.len(), Vec::new()))?;
        let report = run("residual 1\nnoise a\n", "noise b\nresidual 9\n", rule)?;
        assert_eq!(report.status, VerifierStatus::Ok);
        Ok(())
    }
}
