use std::path::{Path, PathBuf};

use anyhow::{Context, Result};

use job::{ExecutionPlan, Job};
use util::PathEncodingError;

use crate::fs::Fs;

/// Launcher settings and the configuration file
mod config;
pub use config::{LauncherConfig, QueueSystem, CONF_FILENAME};

/// Deterministic names of the files a launch produces
pub mod files;
use files::JobFiles;

/// Batch script templates and their rendering
mod template;

/// Running a plan as local subprocesses
mod local;

/// Generating and submitting a batch script
mod batch;

#[derive(thiserror::Error, Debug)]
pub enum Error {
    #[error("Output path \"{0}\" must be absolute")]
    RelativeOutputPath(String),
    #[error("Exec path \"{0}\" must be absolute")]
    RelativeExecPath(String),
    #[error("Queuing system \"{queue}\" needs a wall time for every task of job \"{job}\"")]
    MissingWallTime { queue: QueueSystem, job: String },
    #[error("The submission command is empty")]
    EmptySubmitCommand,
}

/// Result of asking the launcher to run a job.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LaunchOutcome {
    /// Every task ran locally; exit codes are recorded.
    Completed,
    /// The script was accepted by the queue; output will appear later.
    Submitted,
    /// Nothing was run.
    NotLaunched { info: String, report: Vec<String> },
}

/// Runs jobs, locally or through a batch queue, capturing each task's
/// stdout, stderr and exit code in an output directory.
#[derive(Debug, Clone)]
pub struct Launcher {
    config: LauncherConfig,
}

impl Launcher {
    pub fn new(config: LauncherConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self { config })
    }

    /// Load the configuration file at `path`.
    pub fn from_conf_file(path: &Path) -> Result<Self> {
        Self::new(LauncherConfig::load(path)?)
    }

    pub fn config(&self) -> &LauncherConfig {
        &self.config
    }

    /// Run `job`, writing captured output to `output_path`. Commands run in
    /// `exec_path`, which defaults to `output_path`. Both must be absolute.
    ///
    /// Locally, this returns once every task has finished. With a batch
    /// queue, it returns as soon as the submission command exits.
    pub fn submit(
        &self,
        job: &Job,
        output_path: &Path,
        exec_path: Option<&Path>,
    ) -> Result<LaunchOutcome> {
        if !output_path.is_absolute() {
            return Err(Error::RelativeOutputPath(path_str(output_path)?.to_owned()).into());
        }
        let exec_path = exec_path.unwrap_or(output_path);
        if !exec_path.is_absolute() {
            return Err(Error::RelativeExecPath(path_str(exec_path)?.to_owned()).into());
        }

        let plan = job.resolve()?;
        if let Some(report) = self.check_mpi(&plan) {
            return Ok(LaunchOutcome::NotLaunched {
                info: String::from("MPI required"),
                report,
            });
        }

        let files = JobFiles::for_plan(job.name(), &plan);
        let fs = Fs::new(output_path)?;
        fs.ensure_output_dir_exists()?;
        let mut buf = PathBuf::with_capacity(256);

        if self.config.queue.is_batch() {
            let batch = batch::BatchLaunch {
                job,
                plan: &plan,
                files: &files,
                config: &self.config,
                exec_path,
            };
            batch
                .submit(&fs, &mut buf)
                .with_context(|| format!("while submitting job \"{}\"", job.name()))
        } else {
            local::run_plan(&plan, &files, &self.config, &fs, exec_path, &mut buf)
                .with_context(|| format!("while running job \"{}\"", job.name()))?;
            Ok(LaunchOutcome::Completed)
        }
    }

    /// Delete the files `submit` writes for `job` in `output_path`, and nothing else.
    pub fn clean(&self, job: &Job, output_path: &Path) -> Result<()> {
        if !output_path.is_absolute() {
            return Err(Error::RelativeOutputPath(path_str(output_path)?.to_owned()).into());
        }
        let plan = job.resolve()?;
        let files = JobFiles::for_plan(job.name(), &plan);
        let script = files::script_filename(job.name(), self.config.queue.script_extension());
        let fs = Fs::new(output_path)?;
        let mut buf = PathBuf::with_capacity(256);
        for name in files.all().chain(std::iter::once(script.as_str())) {
            if fs.delete_file_if_exists(fs.output_file(name, &mut buf))? {
                log::debug!("deleted {:?}", buf);
            }
        }
        Ok(())
    }

    /// Report why the plan can't run, if a task needs several ranks and
    /// there is no MPI launcher.
    fn check_mpi(&self, plan: &ExecutionPlan<'_>) -> Option<Vec<String>> {
        if self.config.mpi_launch.is_some() {
            return None;
        }
        let report: Vec<String> = plan
            .iter()
            .filter(|e| e.task.resources().mpiranks > 1)
            .map(|e| {
                format!(
                    "Not launched: \"{}\" requires {} MPI ranks but no MPI launcher is configured",
                    e.name,
                    e.task.resources().mpiranks
                )
            })
            .collect();
        if report.is_empty() {
            None
        } else {
            Some(report)
        }
    }
}

fn path_str(path: &Path) -> Result<&str, PathEncodingError> {
    path.to_str().ok_or(PathEncodingError)
}
