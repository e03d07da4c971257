use std::io::Write;
use std::path::{Path, PathBuf};
use std::process::{Command, ExitStatus, Stdio};

use anyhow::{Context, Result};

use job::{ExecutionPlan, PlanEntry};
use syntax::shell;

use super::config::LauncherConfig;
use super::files::{JobFiles, StreamFiles};
use crate::fs::Fs;

/// Recorded when a command can't be started at all, as a shell would.
pub const SPAWN_FAILURE_EXIT_CODE: i32 = 127;

/// Run every plan entry in order, each to completion, appending its
/// exit code to the job's exit-code file.
pub fn run_plan(
    plan: &ExecutionPlan<'_>,
    files: &JobFiles,
    config: &LauncherConfig,
    fs: &Fs,
    exec_path: &Path,
    pathbuf: &mut PathBuf,
) -> Result<()> {
    let exitcode = fs.output_file(&files.exitcode, pathbuf).to_path_buf();
    // start from an empty file, so lines match this run's tasks:
    fs.create_file(&exitcode)
        .context("creating exit code file")?;

    for (entry, streams) in plan.iter().zip(&files.streams) {
        let code = run_entry(entry, streams, config, fs, exec_path, pathbuf)?;
        log::debug!("\"{}\" exited with {}", entry.name, code);
        fs.append_line(&exitcode, &code.to_string())?;
    }
    Ok(())
}

fn run_entry(
    entry: &PlanEntry<'_>,
    streams: &StreamFiles,
    config: &LauncherConfig,
    fs: &Fs,
    exec_path: &Path,
    pathbuf: &mut PathBuf,
) -> Result<i32> {
    let (command, resources) = entry.task.execute_command();
    let mut argv = config.mpi_prefix(resources.mpiranks)?.unwrap_or_default();
    argv.extend_from_slice(command);

    let out_file = fs
        .create_file(fs.output_file(&streams.stdout, pathbuf))
        .context("creating stdout file")?;
    let mut err_file = fs
        .create_file(fs.output_file(&streams.stderr, pathbuf))
        .context("creating stderr file")?;

    let (program, args) = match argv.split_first() {
        Some(split) => split,
        None => return Ok(SPAWN_FAILURE_EXIT_CODE),
    };
    log::info!("running {} in {:?}", shell::join(&argv), exec_path);

    let mut cmd = Command::new(program);
    cmd.args(args)
        .current_dir(exec_path)
        .env("OMP_NUM_THREADS", resources.threads.to_string())
        .stdin(Stdio::null())
        .stdout(Stdio::from(out_file))
        .stderr(Stdio::from(err_file.try_clone()?));

    match cmd.status() {
        Ok(status) => Ok(exit_code(status)),
        Err(e) => {
            log::warn!("failed to execute {}: {}", shell::join(&argv), e);
            writeln!(err_file, "[sciath] failed to execute {}: {}", shell::join(&argv), e)?;
            Ok(SPAWN_FAILURE_EXIT_CODE)
        }
    }
}

/// The process's exit code, or 128 + the signal number if it was killed.
fn exit_code(status: ExitStatus) -> i32 {
    if let Some(code) = status.code() {
        return code;
    }
    #[cfg(unix)]
    {
        use std::os::unix::process::ExitStatusExt;
        if let Some(signal) = status.signal() {
            return 128 + signal;
        }
    }
    -1
}
