use crate::resources::{ResourceRequest, Resources};
use crate::Error;

/// One external command plus the resources it needs.
#[derive(Debug, Clone, PartialEq)]
pub struct Task {
    command: Vec<String>,
    resources: Resources,
    exit_code_success: i32,
    /// minutes
    wall_time: Option<f64>,
}

impl Task {
    /// Create a task running `command` (program followed by its arguments)
    /// with one rank, one thread and an expected exit code of 0.
    pub fn new<I, S>(command: I) -> Result<Self, Error>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let command: Vec<String> = command.into_iter().map(Into::into).collect();
        if command.is_empty() {
            return Err(Error::EmptyCommand);
        }
        Ok(Self {
            command,
            resources: Resources::default(),
            exit_code_success: 0,
            wall_time: None,
        })
    }

    pub fn with_resources(mut self, request: &ResourceRequest) -> Self {
        self.set_resources(request);
        self
    }

    /// Overwrite the categories named in `request`, leaving the others as they are.
    pub fn set_resources(&mut self, request: &ResourceRequest) {
        request.apply(&mut self.resources);
    }

    pub fn with_exit_code(mut self, exit_code_success: i32) -> Self {
        self.exit_code_success = exit_code_success;
        self
    }

    pub fn with_wall_time(mut self, minutes: f64) -> Result<Self, Error> {
        if !minutes.is_finite() || minutes <= 0.0 {
            return Err(Error::InvalidWallTime(minutes));
        }
        self.wall_time = Some(minutes);
        Ok(self)
    }

    pub fn command(&self) -> &[String] {
        &self.command
    }

    pub fn resources(&self) -> Resources {
        self.resources
    }

    pub fn exit_code_success(&self) -> i32 {
        self.exit_code_success
    }

    pub fn wall_time(&self) -> Option<f64> {
        self.wall_time
    }

    /// Same as `resources()`; a single task is its own maximum.
    pub fn max_resources(&self) -> Resources {
        self.resources
    }

    /// What the launcher needs to run this task.
    pub fn execute_command(&self) -> (&[String], Resources) {
        (&self.command, self.resources)
    }
}
