use crate::resources::Resources;
use crate::task::Task;

/// One step of an execution plan.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PlanEntry<'a> {
    /// Name of the job this task belongs to.
    pub name: &'a str,
    pub task: &'a Task,
}

/// The ordered list of tasks a job resolves to. Dependencies come first;
/// the job's own task is always last.
#[derive(Debug, Clone, PartialEq)]
pub struct ExecutionPlan<'a> {
    entries: Vec<PlanEntry<'a>>,
}

impl<'a> ExecutionPlan<'a> {
    pub(crate) fn new(entries: Vec<PlanEntry<'a>>) -> Self {
        debug_assert!(!entries.is_empty());
        Self { entries }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Always false; a plan holds at least the root task.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn entries(&self) -> &[PlanEntry<'a>] {
        &self.entries
    }

    pub fn iter(&self) -> impl Iterator<Item = &PlanEntry<'a>> {
        self.entries.iter()
    }

    /// Job names in execution order.
    pub fn names(&self) -> Vec<&'a str> {
        self.entries.iter().map(|e| e.name).collect()
    }

    /// (command, resources) pairs in execution order.
    pub fn commands(&self) -> Vec<(&'a [String], Resources)> {
        self.entries.iter().map(|e| e.task.execute_command()).collect()
    }

    pub fn max_resources(&self) -> Resources {
        self.entries
            .iter()
            .fold(Resources::default(), |acc, e| acc.max(e.task.max_resources()))
    }

    /// Sum of all wall times, or `None` if any task has none.
    pub fn total_wall_time(&self) -> Option<f64> {
        self.entries.iter().map(|e| e.task.wall_time()).sum()
    }

    /// Expected exit code of every task, in execution order.
    pub fn exit_codes_success(&self) -> Vec<i32> {
        self.entries.iter().map(|e| e.task.exit_code_success()).collect()
    }
}
