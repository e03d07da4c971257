use std::fs::File;
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};

use anyhow::{Context, Result};

use job::{ExecutionPlan, Job, Resources};
use syntax::shell;
use util::PathEncodingError;

use super::config::{self, LauncherConfig};
use super::files::{self, JobFiles};
use super::template::{self, Substitutions};
use super::{Error, LaunchOutcome};
use crate::fs::Fs;

/// Utility for building the command block of a batch script.
/// Note that it modifies a String reference held internally;
/// read that String to get the block's contents.
#[derive(Debug)]
pub struct CommandBlockBuilder<'a> {
    strbuf: &'a mut String,
}

impl<'a> CommandBlockBuilder<'a> {
    pub fn new(strbuf: &'a mut String) -> Self {
        strbuf.clear();
        Self { strbuf }
    }
}

impl CommandBlockBuilder<'_> {
    /// A dependency writes its own stdout and stderr files.
    pub fn write_dependency(
        &mut self,
        argv: &[String],
        threads: u32,
        stdout: &str,
        stderr: &str,
        exitcode: &str,
    ) {
        self.write_threads(threads);
        self.strbuf.push_str(&shell::join(argv));
        self.strbuf.push_str(" 1>");
        self.strbuf.push_str(&shell::quote(stdout));
        self.strbuf.push_str(" 2>");
        self.strbuf.push_str(&shell::quote(stderr));
        self.write_record_exit(exitcode);
    }

    /// The root task's output goes to the queue's own stdout/stderr files.
    pub fn write_root(&mut self, argv: &[String], threads: u32, exitcode: &str) {
        self.write_threads(threads);
        self.strbuf.push_str(&shell::join(argv));
        self.write_record_exit(exitcode);
    }

    fn write_threads(&mut self, threads: u32) {
        self.strbuf.push_str("export OMP_NUM_THREADS=");
        self.strbuf.push_str(&threads.to_string());
        self.strbuf.push('\n');
    }

    fn write_record_exit(&mut self, exitcode: &str) {
        self.strbuf.push_str("; echo $? >> ");
        self.strbuf.push_str(&shell::quote(exitcode));
        self.strbuf.push('\n');
    }
}

/// Everything needed to write and submit one job's batch script.
pub struct BatchLaunch<'a> {
    pub job: &'a Job,
    pub plan: &'a ExecutionPlan<'a>,
    pub files: &'a JobFiles,
    pub config: &'a LauncherConfig,
    pub exec_path: &'a Path,
}

impl BatchLaunch<'_> {
    /// Write the script into the output directory and hand it to the queue.
    pub fn submit(&self, fs: &Fs, pathbuf: &mut PathBuf) -> Result<LaunchOutcome> {
        let script = self.render(fs, pathbuf)?;
        let filename = files::script_filename(self.job.name(), self.config.queue.script_extension());
        let script_path = fs.output_file(&filename, pathbuf).to_path_buf();

        // the script appends exit codes, so stale ones must go:
        let exitcode = fs.output_file(&self.files.exitcode, pathbuf).to_path_buf();
        fs.delete_file_if_exists(&exitcode)?;
        fs.write_file(&script_path, &script)?;
        log::debug!("wrote batch script {:?}", script_path);

        self.run_submit_command(&script_path)
    }

    fn render(&self, fs: &Fs, pathbuf: &mut PathBuf) -> Result<String> {
        let queue = self.config.queue;
        let template =
            template::for_queue(queue).ok_or(config::Error::UnsupportedQueue(queue))?;
        let wall_time = self.plan.total_wall_time().ok_or_else(|| Error::MissingWallTime {
            queue,
            job: self.job.name().to_owned(),
        })?;
        let Resources { mpiranks, threads } = self.plan.max_resources();

        let exitcode = path_string(fs.output_file(&self.files.exitcode, pathbuf))?;
        let mut commands = String::with_capacity(512);
        let mut builder = CommandBlockBuilder::new(&mut commands);
        let last = self.plan.len() - 1;
        for (i, (entry, streams)) in self.plan.iter().zip(&self.files.streams).enumerate() {
            let (command, resources) = entry.task.execute_command();
            let mut argv = self
                .config
                .mpi_prefix(resources.mpiranks)?
                .unwrap_or_default();
            argv.extend_from_slice(command);
            if i == last {
                builder.write_root(&argv, resources.threads, &exitcode);
            } else {
                let stdout = path_string(fs.output_file(&streams.stdout, pathbuf))?;
                let stderr = path_string(fs.output_file(&streams.stderr, pathbuf))?;
                builder.write_dependency(&argv, resources.threads, &stdout, &stderr, &exitcode);
            }
        }

        let root = self.files.root().context("execution plan has no root task")?;
        let mut subs = Substitutions::default();
        subs.set(template::JOB_NAME, self.job.name());
        subs.set(
            template::JOB_STDOUT,
            path_string(fs.output_file(&root.stdout, pathbuf))?,
        );
        subs.set(
            template::JOB_STDERR,
            path_string(fs.output_file(&root.stderr, pathbuf))?,
        );
        subs.set(template::MAX_RANKS, mpiranks.to_string());
        subs.set_or_remove_line(
            template::MAX_THREADS,
            (threads > 1).then(|| threads.to_string()),
        );
        subs.set(template::WALLTIME_HMS, template::wall_time_hms(wall_time));
        subs.set(template::WALLTIME_HM, template::wall_time_hm(wall_time));
        subs.set_or_remove_line(template::ACCOUNT, self.config.account.clone());
        subs.set_or_remove_line(template::QUEUE, self.config.queue_name.clone());
        subs.set_or_remove_line(template::CONSTRAINT, self.config.constraint.clone());
        let exec_path = self.exec_path.to_str().ok_or(PathEncodingError)?;
        subs.set(template::EXEC_PATH, shell::quote(exec_path));
        subs.set(template::COMMANDS, commands.trim_end());

        Ok(template::render(template, &subs)?)
    }

    fn run_submit_command(&self, script_path: &Path) -> Result<LaunchOutcome> {
        let submit = self.config.submit_command();
        let (program, args) = submit.split_first().ok_or(Error::EmptySubmitCommand)?;

        let mut cmd = Command::new(program);
        cmd.args(args).current_dir(self.exec_path);
        if self.config.queue.script_on_stdin() {
            let script = File::open(script_path)
                .with_context(|| format!("opening {:?}", script_path))?;
            cmd.stdin(Stdio::from(script));
        } else {
            cmd.arg(script_path);
        }
        log::info!("submitting {:?} with {}", script_path, shell::join(&submit));

        let report = match cmd.status() {
            Ok(status) if status.success() => return Ok(LaunchOutcome::Submitted),
            Ok(status) => format!("{} {:?} {}", shell::join(&submit), script_path, status),
            Err(e) => format!("could not run {}: {}", shell::join(&submit), e),
        };
        log::warn!("submission of job \"{}\" failed: {}", self.job.name(), report);
        Ok(LaunchOutcome::NotLaunched {
            info: String::from("submission failed"),
            report: vec![report],
        })
    }
}

fn path_string(path: &Path) -> Result<String, PathEncodingError> {
    Ok(path.to_str().ok_or(PathEncodingError)?.to_owned())
}
