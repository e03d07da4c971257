use job::ExecutionPlan;

/// Name of the file collecting one exit code per executed task.
pub fn exitcode_filename(job_name: &str) -> String {
    format!("sciath.job-{}.exitcode", job_name)
}

/// Name of the root task's captured stdout.
pub fn stdout_filename(job_name: &str) -> String {
    format!("sciath.job-{}.stdout", job_name)
}

/// Name of the root task's captured stderr.
pub fn stderr_filename(job_name: &str) -> String {
    format!("sciath.job-{}.stderr", job_name)
}

/// Name of the generated submission script.
pub fn script_filename(job_name: &str, extension: &str) -> String {
    format!("sciath.job-{}-launch.{}", job_name, extension)
}

/// Captured output files of a single plan entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StreamFiles {
    pub stdout: String,
    pub stderr: String,
}

/// Every file the launcher writes for one job, computed from the job name and
/// the names in its execution plan only.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JobFiles {
    pub exitcode: String,
    /// One per plan entry, in execution order; the last is the root's.
    pub streams: Vec<StreamFiles>,
}

impl JobFiles {
    /// Dependency `i` of `n` plan entries is numbered `n - 1 - i`,
    /// so numbers count down to 1 just before the root.
    pub fn new(job_name: &str, plan_names: &[&str]) -> Self {
        let n = plan_names.len();
        let streams = plan_names
            .iter()
            .enumerate()
            .map(|(i, child)| {
                if i + 1 == n {
                    StreamFiles {
                        stdout: stdout_filename(job_name),
                        stderr: stderr_filename(job_name),
                    }
                } else {
                    let k = n - 1 - i;
                    StreamFiles {
                        stdout: format!("sciath.depjob-{}-{}.stdout", k, child),
                        stderr: format!("sciath.depjob-{}-{}.stderr", k, child),
                    }
                }
            })
            .collect();
        Self {
            exitcode: exitcode_filename(job_name),
            streams,
        }
    }

    pub fn for_plan(job_name: &str, plan: &ExecutionPlan<'_>) -> Self {
        Self::new(job_name, &plan.names())
    }

    pub fn root(&self) -> Option<&StreamFiles> {
        self.streams.last()
    }

    /// Exit-code file plus every stdout/stderr file.
    pub fn all(&self) -> impl Iterator<Item = &str> {
        std::iter::once(self.exitcode.as_str()).chain(
            self.streams
                .iter()
                .flat_map(|s| [s.stdout.as_str(), s.stderr.as_str()]),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_leaf_names() {
        let files = JobFiles::new("t1", &["t1"]);
        assert_eq!(files.exitcode, "sciath.job-t1.exitcode");
        assert_eq!(
            files.root(),
            Some(&StreamFiles {
                stdout: "sciath.job-t1.stdout".into(),
                stderr: "sciath.job-t1.stderr".into(),
            })
        );
        assert_eq!(files.all().count(), 3);
    }

    #[test]
    fn test_dependency_numbering() {
        let files = JobFiles::new("p", &["c", "b", "p"]);
        let stdouts: Vec<_> = files.streams.iter().map(|s| s.stdout.as_str()).collect();
        assert_eq!(
            stdouts,
            [
                "sciath.depjob-2-c.stdout",
                "sciath.depjob-1-b.stdout",
                "sciath.job-p.stdout"
            ]
        );
        assert_eq!(script_filename("p", "slurm"), "sciath.job-p-launch.slurm");
    }
}
