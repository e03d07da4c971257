use std::path::{Path, PathBuf};
use std::sync::OnceLock;

use anyhow::{Context, Result};
use regex::{Captures, Regex};

use job::{Job, ResourceRequest, Task};
use syntax::{shell, Mapping, Value};

use super::Test;
use crate::verifier::{
    key_and_float_rule, ComparedFiles, ComparisonVerifier, ExitCodeVerifier, LineVerifier, Rule,
    Verifier,
};

/// Replaced by the absolute directory of the suite file.
pub const HERE_MARKER: &str = "HERE";

const KNOWN_KEYS: &[&str] = &[
    "name",
    "command",
    "commands",
    "ranks",
    "threads",
    "wall_time",
    "type",
    "expected",
    "comparison",
    "group",
    "groups",
    "rules",
];

#[derive(thiserror::Error, Debug, PartialEq)]
pub enum Error {
    #[error("{0} needs \"tests:\" containing a sequence of test entries")]
    NotASuite(String),
    #[error("Test entry {0} must be a mapping")]
    EntryNotMapping(usize),
    #[error("Test entry {0} must have a non-empty name")]
    MissingName(usize),
    #[error("Test \"{0}\" cannot specify both command: and commands:")]
    CommandConflict(String),
    #[error("Test \"{0}\" must specify command: or commands:")]
    MissingCommand(String),
    #[error("Test \"{0}\": command: or commands: must be a string or a sequence of strings")]
    InvalidCommand(String),
    #[error("Test \"{0}\" has an empty command")]
    EmptyCommand(String),
    #[error("Test \"{test}\" of type {kind} must define an expected file")]
    MissingExpected { test: String, kind: String },
    #[error("Test \"{test}\" has unrecognized type \"{kind}\"; expected text_diff, exit_code or float_lines")]
    UnknownType { test: String, kind: String },
    #[error("Test \"{0}\" of type float_lines must have a sequence of rules:")]
    MissingRules(String),
    #[error("Test \"{0}\": each rule must be a mapping with a key:")]
    InvalidRule(String),
    #[error("Test \"{test}\": invalid value \"{value}\" for {key}")]
    InvalidValue {
        test: String,
        key: String,
        value: String,
    },
    #[error("Test \"{0}\" cannot specify both group: and groups:")]
    GroupConflict(String),
}

/// Kinds of verification a suite entry can ask for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum VerifierKind {
    TextDiff,
    ExitCode,
    FloatLines,
}

impl VerifierKind {
    fn parse(s: &str, test: &str) -> Result<Self, Error> {
        match s {
            "text_diff" => Ok(Self::TextDiff),
            "exit_code" => Ok(Self::ExitCode),
            "float_lines" => Ok(Self::FloatLines),
            _ => Err(Error::UnknownType {
                test: test.to_owned(),
                kind: s.to_owned(),
            }),
        }
    }
}

/// Read a suite file and create its tests, in file order.
pub fn load(path: &Path) -> Result<Vec<Test>> {
    let path = path
        .canonicalize()
        .with_context(|| format!("while looking for suite file {:?}", path))?;
    let dir = path.parent().unwrap_or_else(|| Path::new("/")).to_path_buf();
    let doc = syntax::parse_file(&path)?;
    let loader = SuiteLoader {
        file: path.display().to_string(),
        dir,
        env: |name: &str| std::env::var(name).ok(),
    };
    loader
        .tests(&doc)
        .with_context(|| format!("while loading tests from {:?}", path))
}

/// Builds tests from a parsed suite document.
struct SuiteLoader<F> {
    file: String,
    /// Absolute directory of the suite file.
    dir: PathBuf,
    /// Environment lookup.
    env: F,
}

impl<F: Fn(&str) -> Option<String>> SuiteLoader<F> {
    fn tests(&self, doc: &Value) -> Result<Vec<Test>> {
        let entries = doc
            .as_map()
            .and_then(|map| map.get("tests"))
            .and_then(Value::as_seq)
            .ok_or_else(|| Error::NotASuite(self.file.clone()))?;

        let mut tests = Vec::with_capacity(entries.len());
        for (i, entry) in entries.iter().enumerate() {
            let entry = entry.as_map().ok_or(Error::EntryNotMapping(i + 1))?;
            let test = self
                .test(i + 1, entry)
                .with_context(|| format!("in test entry {}", i + 1))?;
            tests.push(test);
        }
        log::debug!("loaded {} tests from {}", tests.len(), self.file);
        Ok(tests)
    }

    fn test(&self, index: usize, entry: &Mapping) -> Result<Test> {
        let name = match entry.get("name").and_then(Value::as_str) {
            Some(name) if !name.is_empty() => name,
            _ => return Err(Error::MissingName(index).into()),
        };
        for key in entry.keys() {
            if !KNOWN_KEYS.contains(&key) {
                log::warn!("test \"{}\": ignoring unknown key \"{}\"", name, key);
            }
        }

        let job = self.job(name, entry)?;
        let verifier = self.verifier(name, &job, entry)?;
        let mut test = Test::new(job, verifier);
        for group in self.groups(name, entry)? {
            test.add_group(group);
        }
        Ok(test)
    }

    fn job(&self, name: &str, entry: &Mapping) -> Result<Job> {
        let raw = match (entry.get("command"), entry.get("commands")) {
            (Some(_), Some(_)) => return Err(Error::CommandConflict(name.to_owned()).into()),
            (None, None) => return Err(Error::MissingCommand(name.to_owned()).into()),
            (Some(v), None) | (None, Some(v)) => v,
        };
        let commands: Vec<&str> = match raw {
            Value::Scalar(s) => vec![s.as_str()],
            Value::Seq(items) => items
                .iter()
                .map(|v| v.as_str())
                .collect::<Option<_>>()
                .ok_or_else(|| Error::InvalidCommand(name.to_owned()))?,
            Value::Map(_) => return Err(Error::InvalidCommand(name.to_owned()).into()),
        };
        if commands.is_empty() {
            return Err(Error::EmptyCommand(name.to_owned()).into());
        }

        let mut request = ResourceRequest::new();
        if let Some(ranks) = self.number::<u32>(name, entry, "ranks")? {
            request = request.with_ranks(ranks)?;
        }
        if let Some(threads) = self.number::<u32>(name, entry, "threads")? {
            request = request.with_threads(threads)?;
        }
        let wall_time = self.number::<f64>(name, entry, "wall_time")?;

        let mut tasks = Vec::with_capacity(commands.len());
        for command in commands {
            let argv = shell::split(&self.substitute(command))?;
            if argv.is_empty() {
                return Err(Error::EmptyCommand(name.to_owned()).into());
            }
            let mut task = Task::new(argv)?.with_resources(&request);
            if let Some(minutes) = wall_time {
                task = task.with_wall_time(minutes)?;
            }
            tasks.push(task);
        }

        // the last command is the test's own; the others run first, in listed order:
        let root = tasks.pop().context("no commands")?;
        if tasks.is_empty() {
            return Ok(Job::leaf(name, root));
        }
        let mut job = Job::sequence(name, root);
        for (i, task) in tasks.into_iter().enumerate().rev() {
            job.append(Job::leaf(&format!("{}-{}", name, i), task))?;
        }
        Ok(job)
    }

    fn verifier(&self, name: &str, job: &Job, entry: &Mapping) -> Result<Box<dyn Verifier>> {
        let kind = match entry.get("type").and_then(Value::as_str) {
            Some(s) => VerifierKind::parse(s, name)?,
            None => VerifierKind::TextDiff,
        };
        if kind == VerifierKind::ExitCode {
            return Ok(Box::new(ExitCodeVerifier::new(job)?));
        }

        let expected = match entry.get("expected").and_then(Value::as_str) {
            Some(e) if !e.is_empty() => self.resolve(e),
            _ => {
                let kind = entry.get("type").and_then(Value::as_str).unwrap_or("text_diff");
                return Err(Error::MissingExpected {
                    test: name.to_owned(),
                    kind: kind.to_owned(),
                }
                .into());
            }
        };
        let mut files = ComparedFiles::new(job, expected);
        if let Some(comparison) = entry.get("comparison").and_then(Value::as_str) {
            files = files.with_comparison_file(self.substitute(comparison));
        }

        if kind == VerifierKind::TextDiff {
            return Ok(Box::new(ComparisonVerifier::new(files)));
        }

        let mut verifier = LineVerifier::new(files);
        for rule in self.rules(name, entry)? {
            verifier.add_rule(rule);
        }
        Ok(Box::new(verifier))
    }

    /// One key-and-float rule per `rules:` item, with its own tolerances.
    fn rules(&self, name: &str, entry: &Mapping) -> Result<Vec<Rule>> {
        let items = entry
            .get("rules")
            .and_then(Value::as_seq)
            .ok_or_else(|| Error::MissingRules(name.to_owned()))?;
        let mut rules = Vec::with_capacity(items.len());
        for item in items {
            let item = item
                .as_map()
                .ok_or_else(|| Error::InvalidRule(name.to_owned()))?;
            let key = item
                .get("key")
                .and_then(Value::as_str)
                .ok_or_else(|| Error::InvalidRule(name.to_owned()))?;
            let rtol = self.number::<f64>(name, item, "rtol")?;
            let atol = self.number::<f64>(name, item, "atol")?;
            rules.push(key_and_float_rule(Some(key), rtol, atol)?);
        }
        Ok(rules)
    }

    fn groups(&self, name: &str, entry: &Mapping) -> Result<Vec<String>> {
        let raw = match (entry.get("group"), entry.get("groups")) {
            (Some(_), Some(_)) => return Err(Error::GroupConflict(name.to_owned()).into()),
            (None, None) => return Ok(Vec::new()),
            (Some(v), None) | (None, Some(v)) => v,
        };
        let invalid = || Error::InvalidValue {
            test: name.to_owned(),
            key: String::from("groups"),
            value: format!("<{}>", raw.kind()),
        };
        match raw {
            Value::Scalar(s) => Ok(vec![s.clone()]),
            Value::Seq(items) => items
                .iter()
                .map(|v| v.as_str().map(str::to_owned).ok_or_else(|| invalid()))
                .collect::<Result<_, _>>()
                .map_err(Into::into),
            Value::Map(_) => Err(invalid().into()),
        }
    }

    /// An optional numeric field; empty means unset.
    fn number<T: std::str::FromStr>(
        &self,
        name: &str,
        map: &Mapping,
        key: &str,
    ) -> Result<Option<T>, Error> {
        let invalid = |value: String| Error::InvalidValue {
            test: name.to_owned(),
            key: key.to_owned(),
            value,
        };
        match map.get(key) {
            None => Ok(None),
            Some(Value::Scalar(s)) if s.is_empty() => Ok(None),
            Some(Value::Scalar(s)) => s.trim().parse().map(Some).map_err(|_| invalid(s.clone())),
            Some(other) => Err(invalid(format!("<{}>", other.kind()))),
        }
    }

    /// Substitute then make relative paths relative to the suite file.
    fn resolve(&self, path: &str) -> PathBuf {
        let path = PathBuf::from(self.substitute(path));
        if path.is_absolute() {
            path
        } else {
            self.dir.join(path)
        }
    }

    fn substitute(&self, text: &str) -> String {
        let here = self.dir.to_string_lossy();
        substitute_env(text, &self.env).replace(HERE_MARKER, &here)
    }
}

fn env_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"\$(?:\{([A-Za-z_][A-Za-z0-9_]*)\}|([A-Za-z_][A-Za-z0-9_]*))")
            .expect("env regex is valid")
    })
}

/// Replace `$VAR` and `${VAR}`; undefined variables are left as written.
fn substitute_env<F: Fn(&str) -> Option<String>>(text: &str, env: &F) -> String {
    env_regex()
        .replace_all(text, |caps: &Captures| {
            let name = caps.get(1).or_else(|| caps.get(2)).map_or("", |m| m.as_str());
            env(name).unwrap_or_else(|| caps[0].to_owned())
        })
        .into_owned()
}
