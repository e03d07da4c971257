use std::fmt;
use std::path::Path;
use std::str::FromStr;

use anyhow::{Context, Result};

use syntax::{shell, Mapping, Value};

/// Default launcher configuration file, looked up in the working directory.
pub const CONF_FILENAME: &str = "SciATH_launcher.conf";

/// Placeholder replaced by the rank count in an MPI launch string.
pub const RANKS_PLACEHOLDER: &str = "<ranks>";

#[derive(thiserror::Error, Debug, PartialEq)]
pub enum Error {
    #[error("Unknown queuing system \"{0}\"; expected one of none, pbs, slurm, lsf")]
    UnknownQueue(String),
    #[error("Queuing system \"{0}\" is not supported")]
    UnsupportedQueue(QueueSystem),
    #[error("MPI launch command \"{0}\" must contain the keyword \"<ranks>\"")]
    MissingRanksPlaceholder(String),
    #[error("A hardware constraint can only be used with SLURM, not \"{0}\"")]
    ConstraintUnsupported(QueueSystem),
    #[error("Configuration file {0} is missing version information; delete it and reconfigure")]
    MissingVersion(String),
    #[error("Configuration file {file} was written by version {found}, which is older than {current}; delete it and reconfigure")]
    OutdatedConfig {
        file: String,
        found: String,
        current: String,
    },
    #[error("Invalid value \"{value}\" for \"{key}\" in configuration file")]
    InvalidValue { key: String, value: String },
    #[error("Configuration file {0} must contain \"key: value\" entries")]
    NotAMapping(String),
}

/// Queuing system dialects. `LoadLeveler` is recognised only so that it
/// can be rejected with a clear message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueueSystem {
    Local,
    Pbs,
    Slurm,
    Lsf,
    LoadLeveler,
}

impl FromStr for QueueSystem {
    type Err = Error;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "none" | "local" => Ok(Self::Local),
            "pbs" => Ok(Self::Pbs),
            "slurm" => Ok(Self::Slurm),
            "lsf" => Ok(Self::Lsf),
            "loadleveler" | "load_leveler" | "ll" => Ok(Self::LoadLeveler),
            _ => Err(Error::UnknownQueue(s.to_owned())),
        }
    }
}

impl fmt::Display for QueueSystem {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Local => "none",
            Self::Pbs => "pbs",
            Self::Slurm => "slurm",
            Self::Lsf => "lsf",
            Self::LoadLeveler => "loadleveler",
        };
        f.write_str(name)
    }
}

impl QueueSystem {
    pub fn is_batch(self) -> bool {
        !matches!(self, Self::Local)
    }

    /// Extension of the generated submission script.
    pub fn script_extension(self) -> &'static str {
        match self {
            Self::Local => "sh",
            Self::Pbs => "pbs",
            Self::Slurm => "slurm",
            Self::Lsf => "lsf",
            Self::LoadLeveler => "llq",
        }
    }

    /// Default submission command; the script path is passed as the last argument,
    /// except for LSF where the script is fed on stdin.
    pub fn default_submit_command(self) -> &'static [&'static str] {
        match self {
            Self::Local => &["sh"],
            Self::Pbs => &["qsub"],
            Self::Slurm => &["sbatch"],
            Self::Lsf => &["bsub"],
            Self::LoadLeveler => &["llsubmit"],
        }
    }

    pub fn script_on_stdin(self) -> bool {
        matches!(self, Self::Lsf)
    }
}

/// Settings for a `Launcher`, normally read from `SciATH_launcher.conf`.
#[derive(Debug, Clone, PartialEq)]
pub struct LauncherConfig {
    pub queue: QueueSystem,
    /// e.g. `mpiexec -n <ranks>`; `None` when MPI is unavailable.
    pub mpi_launch: Option<String>,
    pub account: Option<String>,
    pub queue_name: Option<String>,
    /// SLURM only.
    pub constraint: Option<String>,
    /// Overrides the queue's default submission command.
    pub submit_command: Option<Vec<String>>,
}

impl Default for LauncherConfig {
    fn default() -> Self {
        Self {
            queue: QueueSystem::Local,
            mpi_launch: None,
            account: None,
            queue_name: None,
            constraint: None,
            submit_command: None,
        }
    }
}

impl LauncherConfig {
    /// Check that the settings can be used to launch anything at all.
    pub fn validate(&self) -> Result<(), Error> {
        if self.queue == QueueSystem::LoadLeveler {
            return Err(Error::UnsupportedQueue(self.queue));
        }
        if self.constraint.is_some() && self.queue != QueueSystem::Slurm {
            return Err(Error::ConstraintUnsupported(self.queue));
        }
        if let Some(launch) = &self.mpi_launch {
            if !launch.contains(RANKS_PLACEHOLDER) {
                return Err(Error::MissingRanksPlaceholder(launch.clone()));
            }
        }
        Ok(())
    }

    /// Set the MPI launch string; `none` or an empty string means no MPI.
    pub fn set_mpi_launch(&mut self, launch: &str) -> Result<(), Error> {
        let launch = launch.trim();
        if launch.is_empty() || launch.eq_ignore_ascii_case("none") {
            self.mpi_launch = None;
        } else if !launch.contains(RANKS_PLACEHOLDER) {
            return Err(Error::MissingRanksPlaceholder(launch.to_owned()));
        } else {
            self.mpi_launch = Some(launch.to_owned());
        }
        Ok(())
    }

    /// The MPI launch prefix for a task with `ranks` ranks, if MPI is configured.
    pub fn mpi_prefix(&self, ranks: u32) -> Result<Option<Vec<String>>> {
        match &self.mpi_launch {
            None => Ok(None),
            Some(launch) => {
                let launch = launch.replace(RANKS_PLACEHOLDER, &ranks.to_string());
                Ok(Some(shell::split(&launch)?))
            }
        }
    }

    pub fn submit_command(&self) -> Vec<String> {
        match &self.submit_command {
            Some(cmd) => cmd.clone(),
            None => self
                .queue
                .default_submit_command()
                .iter()
                .map(|s| s.to_string())
                .collect(),
        }
    }

    /// Load and validate a configuration file.
    pub fn load(path: &Path) -> Result<Self> {
        let doc = syntax::parse_file(path)?;
        let file = path.display().to_string();
        Self::from_document(&doc, &file)
            .with_context(|| format!("while loading launcher configuration {}", file))
    }

    fn from_document(doc: &Value, file: &str) -> Result<Self> {
        let map = doc
            .as_map()
            .ok_or_else(|| Error::NotAMapping(file.to_owned()))?;
        let get = |key: &'static str| get_str(map, key);

        let mut version = [0u32; 3];
        for (slot, key) in version
            .iter_mut()
            .zip(["majorVersion", "minorVersion", "patchVersion"])
        {
            let text = get(key)?.ok_or_else(|| Error::MissingVersion(file.to_owned()))?;
            *slot = parse_value(key, text)?;
        }
        let current = current_version();
        if (version[0], version[1]) < (current[0], current[1]) {
            return Err(Error::OutdatedConfig {
                file: file.to_owned(),
                found: format_version(version),
                current: format_version(current),
            }
            .into());
        }

        let mut config = Self::default();
        if let Some(queue) = get("queuingSystemType")? {
            config.queue = queue.parse()?;
        }
        if let Some(launch) = get("mpiLaunch")? {
            config.set_mpi_launch(launch)?;
        }
        config.account = get("accountName")?.and_then(non_empty);
        config.queue_name = get("queueName")?.and_then(non_empty);
        config.constraint = get("constraint")?.and_then(non_empty);
        if let Some(cmd) = get("submitCommand")?.and_then(non_empty) {
            config.submit_command = Some(shell::split(&cmd)?);
        }
        for key in map.keys() {
            if !KNOWN_KEYS.contains(&key) {
                log::warn!("ignoring unknown key \"{}\" in {}", key, file);
            }
        }

        config.validate()?;
        Ok(config)
    }

    /// Render as a configuration file.
    pub fn to_conf_string(&self) -> String {
        let [major, minor, patch] = current_version();
        let mut text = String::with_capacity(256);
        text.push_str(&format!("majorVersion: {}\n", major));
        text.push_str(&format!("minorVersion: {}\n", minor));
        text.push_str(&format!("patchVersion: {}\n", patch));
        text.push_str(&format!("queuingSystemType: {}\n", self.queue));
        text.push_str(&format!(
            "mpiLaunch: {}\n",
            self.mpi_launch.as_deref().unwrap_or("none")
        ));
        let optional = [
            ("accountName", self.account.clone()),
            ("queueName", self.queue_name.clone()),
            ("constraint", self.constraint.clone()),
            ("submitCommand", self.submit_command.as_deref().map(shell::join)),
        ];
        for (key, value) in optional {
            if let Some(value) = value {
                text.push_str(&format!("{}: {}\n", key, value));
            }
        }
        text
    }
}

impl fmt::Display for LauncherConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "  Version:           {}", format_version(current_version()))?;
        writeln!(f, "  Queuing system:    {}", self.queue)?;
        writeln!(
            f,
            "  MPI launcher:      {}",
            self.mpi_launch.as_deref().unwrap_or("none")
        )?;
        write!(f, "  Submit command:    {}", shell::join(&self.submit_command()))?;
        if let Some(account) = &self.account {
            write!(f, "\n  Account:           {}", account)?;
        }
        if let Some(queue) = &self.queue_name {
            write!(f, "\n  Queue:             {}", queue)?;
        }
        if let Some(constraint) = &self.constraint {
            write!(f, "\n  Constraint:        {}", constraint)?;
        }
        Ok(())
    }
}

const KNOWN_KEYS: &[&str] = &[
    "majorVersion",
    "minorVersion",
    "patchVersion",
    "queuingSystemType",
    "mpiLaunch",
    "accountName",
    "queueName",
    "constraint",
    "submitCommand",
];

fn get_str<'a>(map: &'a Mapping, key: &str) -> Result<Option<&'a str>, Error> {
    match map.get(key) {
        None => Ok(None),
        Some(v) => v.as_str().map(Some).ok_or_else(|| Error::InvalidValue {
            key: key.to_owned(),
            value: format!("<{}>", v.kind()),
        }),
    }
}

fn parse_value(key: &str, text: &str) -> Result<u32, Error> {
    text.parse().map_err(|_| Error::InvalidValue {
        key: key.to_owned(),
        value: text.to_owned(),
    })
}

// "None" is what an unset field looked like in older files:
fn non_empty(s: &str) -> Option<String> {
    match s {
        "" | "None" => None,
        _ => Some(s.to_owned()),
    }
}

fn current_version() -> [u32; 3] {
    [
        env!("CARGO_PKG_VERSION_MAJOR"),
        env!("CARGO_PKG_VERSION_MINOR"),
        env!("CARGO_PKG_VERSION_PATCH"),
    ]
    .map(|part| part.parse().unwrap_or(0))
}

fn format_version(v: [u32; 3]) -> String {
    format!("{}.{}.{}", v[0], v[1], v[2])
}

#[cfg(test)]
mod tests {
    use super::*;

    fn versioned(body: &str) -> Value {
        let [major, minor, patch] = current_version();
        let text = format!(
            "majorVersion: {}\nminorVersion: {}\npatchVersion: {}\n{}",
            major, minor, patch, body
        );
        syntax::parse(&text, "conf").unwrap()
    }

    fn load(body: &str) -> Result<LauncherConfig> {
        LauncherConfig::from_document(&versioned(body), "conf")
    }

    #[test]
    fn test_round_trip_default() {
        let text = LauncherConfig::default().to_conf_string();
        let doc = syntax::parse(&text, "conf").unwrap();
        let config = LauncherConfig::from_document(&doc, "conf").unwrap();
        assert_eq!(config, LauncherConfig::default());
    }

    #[test]
    fn test_slurm_with_constraint() {
        let mut config = LauncherConfig {
            queue: QueueSystem::Slurm,
            account: Some("proj42".into()),
            constraint: Some("gpu".into()),
            ..Default::default()
        };
        config.set_mpi_launch("srun -n <ranks>").unwrap();
        let doc = syntax::parse(&config.to_conf_string(), "conf").unwrap();
        let loaded = LauncherConfig::from_document(&doc, "conf").unwrap();
        assert_eq!(loaded, config);
        assert_eq!(loaded.mpi_prefix(4).unwrap().unwrap(), ["srun", "-n", "4"]);
        assert_eq!(loaded.submit_command(), ["sbatch"]);
    }

    #[test]
    fn test_submit_command_override() {
        let config = load("queuingSystemType: lsf\nsubmitCommand: bsub -G grp\n").unwrap();
        assert_eq!(config.submit_command(), ["bsub", "-G", "grp"]);
        assert!(config.queue.script_on_stdin());
    }

    #[test]
    fn test_constraint_requires_slurm() {
        let err = load("queuingSystemType: pbs\nconstraint: knl\n").unwrap_err();
        assert_eq!(
            err.downcast_ref::<Error>(),
            Some(&Error::ConstraintUnsupported(QueueSystem::Pbs))
        );
    }

    #[test]
    fn test_load_leveler_rejected() {
        let err = load("queuingSystemType: LoadLeveler\n").unwrap_err();
        assert_eq!(
            err.downcast_ref::<Error>(),
            Some(&Error::UnsupportedQueue(QueueSystem::LoadLeveler))
        );
    }

    #[test]
    fn test_mpi_launch_needs_placeholder() {
        assert!(load("mpiLaunch: mpiexec -n 4\n").is_err());
        let config = load("mpiLaunch: None\naccountName: None\n").unwrap();
        assert_eq!(config.mpi_launch, None);
        assert_eq!(config.account, None);
        assert_eq!(config.mpi_prefix(2).unwrap(), None);
    }

    #[test]
    fn test_missing_version() {
        let doc = syntax::parse("mpiLaunch: none\n", "conf").unwrap();
        let err = LauncherConfig::from_document(&doc, "conf").unwrap_err();
        assert_eq!(
            err.downcast_ref::<Error>(),
            Some(&Error::MissingVersion("conf".into()))
        );
    }

    #[test]
    fn test_outdated_version() {
        let doc = syntax::parse("majorVersion: 0\nminorVersion: 0\npatchVersion: 1\n", "conf").unwrap();
        let err = LauncherConfig::from_document(&doc, "conf").unwrap_err();
        assert!(matches!(
            err.downcast_ref::<Error>(),
            Some(Error::OutdatedConfig { .. })
        ));
    }

    #[test]
    fn test_unknown_queue() {
        assert_eq!(
            "condor".parse::<QueueSystem>(),
            Err(Error::UnknownQueue("condor".into()))
        );
        assert_eq!("SLURM".parse::<QueueSystem>(), Ok(QueueSystem::Slurm));
    }
}
