use std::path::PathBuf;

use anyhow::{Context, Result};

use crate::args::Args;
use crate::launcher::{LauncherConfig, QueueSystem};

#[derive(thiserror::Error, Debug)]
pub enum Error {
    #[error("--configure and --configure-default can't be used together")]
    ConflictingConfigure,
}

/// What the app has been asked to do, in the order it does it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    /// Write a launcher configuration file and exit.
    Configure,
    /// List tests and exit.
    List,
    /// Delete output and exit.
    Purge,
    /// Execute and/or verify.
    Run { execute: bool, verify: bool },
}

/// Settings are like Args, except all the logic has
/// been applied so e.g. defaults are added in.
#[derive(Debug)]
pub struct Settings {
    pub input_file: Option<PathBuf>,
    /// Absolute.
    pub output: PathBuf,
    pub conf_file: PathBuf,
    /// Set by `-c` or `-d`: the configuration to write.
    pub write_config: Option<LauncherConfig>,
    pub action: Action,
    pub test_subset: Vec<String>,
    pub groups: Vec<String>,
    pub exclude_groups: Vec<String>,
    pub error_on_test_failure: bool,
    pub update_expected: bool,
    pub yes: bool,
    pub tap: bool,
    pub colors: bool,
    pub verbose: u8,
}

impl TryFrom<Args> for Settings {
    type Error = anyhow::Error;
    fn try_from(args: Args) -> Result<Self, Self::Error> {
        if args.configure && args.configure_default {
            return Err(Error::ConflictingConfigure.into());
        }

        let write_config = if args.configure {
            Some(config_from_args(&args)?)
        } else if args.configure_default {
            Some(LauncherConfig::default())
        } else {
            None
        };

        let action = if write_config.is_some() {
            Action::Configure
        } else if args.list {
            Action::List
        } else if args.purge_output {
            Action::Purge
        } else {
            Action::Run {
                execute: !args.verify,
                verify: !args.execute,
            }
        };

        let mut output = PathBuf::from(&args.output);
        if !output.is_absolute() {
            let cwd = std::env::current_dir().context("getting current directory")?;
            output = cwd.join(output);
        }

        Ok(Self {
            input_file: args.input_file.map(PathBuf::from),
            output,
            conf_file: PathBuf::from(&args.conf_file),
            write_config,
            action,
            test_subset: split_list(args.test_subset.as_deref()),
            groups: split_list(args.groups.as_deref()),
            exclude_groups: split_list(args.exclude_groups.as_deref()),
            error_on_test_failure: args.error_on_test_failure,
            update_expected: args.update_expected,
            yes: args.yes,
            tap: args.tap,
            colors: !args.no_colors,
            verbose: args.verbose,
        })
    }
}

/// Build a launcher configuration from the `--queue-type`, `--mpi-launch`,
/// `--account`, `--queue` and `--constraint` flags.
fn config_from_args(args: &Args) -> Result<LauncherConfig> {
    let mut config = LauncherConfig::default();
    if let Some(queue) = &args.queue_type {
        config.queue = queue.parse::<QueueSystem>()?;
    }
    if let Some(launch) = &args.mpi_launch {
        config.set_mpi_launch(launch)?;
    }
    config.account = args.account.clone();
    config.queue_name = args.queue.clone();
    config.constraint = args.constraint.clone();
    config.validate()?;
    Ok(config)
}

/// Split a comma-separated flag value, trimming each item and dropping empty ones.
fn split_list(value: Option<&str>) -> Vec<String> {
    value
        .map(|v| {
            v.split(',')
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(String::from)
                .collect()
        })
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args() -> Args {
        Args {
            output: String::from("/tmp/sciath-out"),
            conf_file: String::from("SciATH_launcher.conf"),
            ..Default::default()
        }
    }

    #[test]
    fn test_split_list() {
        assert_eq!(split_list(Some(" a, b ,,c")), ["a", "b", "c"]);
        assert!(split_list(None).is_empty());
    }

    #[test]
    fn test_stages() -> Result<()> {
        let settings: Settings = args().try_into()?;
        assert_eq!(settings.action, Action::Run { execute: true, verify: true });

        let settings: Settings = Args { verify: true, ..args() }.try_into()?;
        assert_eq!(settings.action, Action::Run { execute: false, verify: true });

        let settings: Settings = Args { execute: true, ..args() }.try_into()?;
        assert_eq!(settings.action, Action::Run { execute: true, verify: false });
        Ok(())
    }

    #[test]
    fn test_relative_output_is_made_absolute() -> Result<()> {
        let settings: Settings = Args { output: String::from("out"), ..args() }.try_into()?;
        assert!(settings.output.is_absolute());
        assert!(settings.output.ends_with("out"));
        Ok(())
    }

    #[test]
    fn test_configure_from_flags() -> Result<()> {
        let settings: Settings = Args {
            configure: true,
            queue_type: Some(String::from("SLURM")),
            mpi_launch: Some(String::from("srun -n <ranks>")),
            constraint: Some(String::from("gpu")),
            ..args()
        }
        .try_into()?;
        assert_eq!(settings.action, Action::Configure);
        let config = settings.write_config.unwrap();
        assert_eq!(config.queue, QueueSystem::Slurm);
        assert_eq!(config.mpi_launch.as_deref(), Some("srun -n <ranks>"));

        let bad = Args {
            configure: true,
            queue_type: Some(String::from("pbs")),
            constraint: Some(String::from("gpu")),
            ..args()
        };
        assert!(Settings::try_from(bad).is_err());
        Ok(())
    }
}
