use regex::{Captures, Regex};

use super::config::QueueSystem;

pub const JOB_NAME: &str = "$SCIATH_JOB_NAME";
pub const JOB_STDOUT: &str = "$SCIATH_JOB_STDOUT";
pub const JOB_STDERR: &str = "$SCIATH_JOB_STDERR";
pub const MAX_RANKS: &str = "$SCIATH_JOB_MAX_RANKS_OR_REMOVE_LINE";
pub const MAX_THREADS: &str = "$SCIATH_JOB_MAX_THREADS_OR_REMOVE_LINE";
pub const WALLTIME_HM: &str = "$SCIATH_JOB_WALLTIME_HM_OR_REMOVE_LINE";
pub const WALLTIME_HMS: &str = "$SCIATH_JOB_WALLTIME_HMS_OR_REMOVE_LINE";
pub const ACCOUNT: &str = "$SCIATH_ACCOUNT_OR_REMOVE_LINE";
pub const QUEUE: &str = "$SCIATH_QUEUE_OR_REMOVE_LINE";
pub const CONSTRAINT: &str = "$SCIATH_CONSTRAINT_OR_REMOVE_LINE";
pub const EXEC_PATH: &str = "$SCIATH_EXEC_PATH";
pub const COMMANDS: &str = "$SCIATH_COMMANDS";

const PBS: &str = "\
#!/bin/bash
#PBS -N $SCIATH_JOB_NAME
#PBS -o $SCIATH_JOB_STDOUT
#PBS -e $SCIATH_JOB_STDERR
#PBS -A $SCIATH_ACCOUNT_OR_REMOVE_LINE
#PBS -q $SCIATH_QUEUE_OR_REMOVE_LINE
#PBS -l mppwidth=$SCIATH_JOB_MAX_RANKS_OR_REMOVE_LINE
#PBS -l walltime=$SCIATH_JOB_WALLTIME_HMS_OR_REMOVE_LINE

cd $SCIATH_EXEC_PATH

$SCIATH_COMMANDS
";

const SLURM: &str = "\
#!/bin/bash -l
#SBATCH --job-name=$SCIATH_JOB_NAME
#SBATCH --output=$SCIATH_JOB_STDOUT
#SBATCH --error=$SCIATH_JOB_STDERR
#SBATCH --ntasks=$SCIATH_JOB_MAX_RANKS_OR_REMOVE_LINE
#SBATCH --cpus-per-task=$SCIATH_JOB_MAX_THREADS_OR_REMOVE_LINE
#SBATCH --time=$SCIATH_JOB_WALLTIME_HMS_OR_REMOVE_LINE
#SBATCH --account=$SCIATH_ACCOUNT_OR_REMOVE_LINE
#SBATCH --partition=$SCIATH_QUEUE_OR_REMOVE_LINE
#SBATCH --constraint=$SCIATH_CONSTRAINT_OR_REMOVE_LINE

cd $SCIATH_EXEC_PATH

$SCIATH_COMMANDS
";

const LSF: &str = "\
#!/bin/sh
#BSUB -J $SCIATH_JOB_NAME
#BSUB -o $SCIATH_JOB_STDOUT
#BSUB -e $SCIATH_JOB_STDERR
#BSUB -n $SCIATH_JOB_MAX_RANKS_OR_REMOVE_LINE
#BSUB -W $SCIATH_JOB_WALLTIME_HM_OR_REMOVE_LINE
#BSUB -P $SCIATH_ACCOUNT_OR_REMOVE_LINE
#BSUB -q $SCIATH_QUEUE_OR_REMOVE_LINE

cd $SCIATH_EXEC_PATH

$SCIATH_COMMANDS
";

/// Template for a batch queue, if it has one.
pub fn for_queue(queue: QueueSystem) -> Option<&'static str> {
    match queue {
        QueueSystem::Pbs => Some(PBS),
        QueueSystem::Slurm => Some(SLURM),
        QueueSystem::Lsf => Some(LSF),
        QueueSystem::Local | QueueSystem::LoadLeveler => None,
    }
}

/// Placeholder values for one rendering.
#[derive(Debug, Default)]
pub struct Substitutions {
    replace: Vec<(&'static str, String)>,
    delete: Vec<&'static str>,
}

impl Substitutions {
    pub fn set<S: Into<String>>(&mut self, key: &'static str, value: S) {
        self.replace.push((key, value.into()));
    }

    /// Lines holding `key` are dropped when `value` is `None`.
    pub fn set_or_remove_line(&mut self, key: &'static str, value: Option<String>) {
        match value {
            Some(v) => self.set(key, v),
            None => self.delete.push(key),
        }
    }

    fn lookup(&self, key: &str) -> &str {
        self.replace
            .iter()
            .find(|(k, _)| *k == key)
            .map_or("", |(_, v)| v.as_str())
    }
}

/// Substitute placeholders in a single pass, so substituted text is never
/// scanned again, and drop lines holding a placeholder without a value.
pub fn render(template: &str, subs: &Substitutions) -> Result<String, regex::Error> {
    let pattern = subs
        .replace
        .iter()
        .map(|(k, _)| regex::escape(k))
        .collect::<Vec<_>>()
        .join("|");
    let re = if pattern.is_empty() {
        None
    } else {
        Some(Regex::new(&pattern)?)
    };

    let mut out = String::with_capacity(template.len() * 2);
    for line in template.lines() {
        if subs.delete.iter().any(|key| line.contains(key)) {
            continue;
        }
        match &re {
            Some(re) => {
                let line = re.replace_all(line, |caps: &Captures| subs.lookup(&caps[0]).to_owned());
                out.push_str(&line);
            }
            None => out.push_str(line),
        }
        out.push('\n');
    }
    Ok(out)
}

fn split_minutes(minutes: f64) -> (u64, u64, u64) {
    let seconds = (minutes * 60.0).ceil() as u64;
    (seconds / 3600, (seconds / 60) % 60, seconds % 60)
}

/// `HH:MM:SS`, as used by PBS and SLURM.
pub fn wall_time_hms(minutes: f64) -> String {
    let (h, m, s) = split_minutes(minutes);
    format!("{:02}:{:02}:{:02}", h, m, s)
}

/// `HH:MM`, as used by LSF; partial minutes round up.
pub fn wall_time_hm(minutes: f64) -> String {
    let (h, m, s) = split_minutes(minutes);
    let (h, m) = match (m, s) {
        (59, 1..) => (h + 1, 0),
        (m, 1..) => (h, m + 1),
        (m, _) => (h, m),
    };
    format!("{:02}:{:02}", h, m)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_wall_time() {
        assert_eq!(wall_time_hms(90.5), "01:30:30");
        assert_eq!(wall_time_hm(90.5), "01:31");
        assert_eq!(wall_time_hm(59.5), "01:00");
        assert_eq!(wall_time_hm(5.0), "00:05");
        assert_eq!(wall_time_hms(0.25), "00:00:15");
    }

    #[test]
    fn test_render_removes_unset_lines() {
        let mut subs = Substitutions::default();
        subs.set(JOB_NAME, "t1");
        subs.set_or_remove_line(ACCOUNT, None);
        subs.set_or_remove_line(QUEUE, Some("debug".into()));
        let template = "#X -N $SCIATH_JOB_NAME\n#X -A $SCIATH_ACCOUNT_OR_REMOVE_LINE\n#X -q $SCIATH_QUEUE_OR_REMOVE_LINE\n";
        assert_eq!(render(template, &subs).unwrap(), "#X -N t1\n#X -q debug\n");
    }

    #[test]
    fn test_render_is_single_pass() {
        let mut subs = Substitutions::default();
        subs.set(JOB_NAME, "$SCIATH_EXEC_PATH");
        subs.set(EXEC_PATH, "/should/not/appear");
        assert_eq!(
            render("name=$SCIATH_JOB_NAME\n", &subs).unwrap(),
            "name=$SCIATH_EXEC_PATH\n"
        );
    }

    #[test]
    fn test_every_batch_queue_has_a_template() {
        for queue in [QueueSystem::Pbs, QueueSystem::Slurm, QueueSystem::Lsf] {
            let template = for_queue(queue).unwrap();
            assert!(template.contains(COMMANDS));
            assert!(template.contains(EXEC_PATH));
        }
        assert!(for_queue(QueueSystem::Local).is_none());
        assert!(for_queue(QueueSystem::LoadLeveler).is_none());
    }
}
