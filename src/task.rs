use std::any::Any;
use thiserror::Error;

/// Result returned by a task body.
pub type TaskResult = Result<(), TaskFailure>;

/// Owned task body.
///
/// Jobs take no arguments and communicate only through side effects. They
/// must terminate in bounded time and must not call back into the scheduler
/// that runs them. A job may run on any worker thread, and the same job runs
/// once per cycle when a graph is reused.
pub type Job = Box<dyn Fn() -> TaskResult + Send + Sync + 'static>;

/// Failure reported by a task body, or synthesized from a panic inside it.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{message}")]
pub struct TaskFailure {
    message: String,
}

impl TaskFailure {
    /// Create a failure carrying `message`.
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }

    /// Human-readable failure description.
    #[must_use]
    pub fn message(&self) -> &str {
        &self.message
    }

    pub(crate) fn from_panic(payload: &(dyn Any + Send)) -> Self {
        let detail = payload
            .downcast_ref::<&str>()
            .copied()
            .or_else(|| payload.downcast_ref::<String>().map(String::as_str))
            .unwrap_or("non-string panic payload");
        Self::new(format!("task panicked: {detail}"))
    }
}

impl From<&str> for TaskFailure {
    fn from(message: &str) -> Self {
        Self::new(message)
    }
}

impl From<String> for TaskFailure {
    fn from(message: String) -> Self {
        Self::new(message)
    }
}

/// Lifecycle of a task within one cycle.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum TaskState {
    /// Not yet handed to a worker.
    Pending = 0,
    /// Sitting in a ready queue.
    Queued = 1,
    /// Claimed by a worker.
    Running = 2,
    /// The job returned `Ok`.
    Succeeded = 3,
    /// The job returned an error or panicked.
    Failed = 4,
    /// Not run because a prerequisite did not succeed.
    Skipped = 5,
}

impl TaskState {
    pub(crate) const fn from_u8(raw: u8) -> Self {
        match raw {
            0 => Self::Pending,
            1 => Self::Queued,
            2 => Self::Running,
            3 => Self::Succeeded,
            4 => Self::Failed,
            5 => Self::Skipped,
            _ => panic!("TaskState::from_u8: invalid state"),
        }
    }

    /// Whether the task has finished for this cycle, one way or another.
    #[must_use]
    pub const fn is_finished(self) -> bool {
        matches!(self, Self::Succeeded | Self::Failed | Self::Skipped)
    }
}

/// What happened when a task was executed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TaskOutcome {
    /// The job ran and returned `Ok`.
    Succeeded,
    /// The job ran and failed.
    Failed(TaskFailure),
    /// The job was not run because a prerequisite did not succeed.
    Skipped,
}

impl TaskOutcome {
    pub(crate) const fn state(&self) -> TaskState {
        match self {
            Self::Succeeded => TaskState::Succeeded,
            Self::Failed(_) => TaskState::Failed,
            Self::Skipped => TaskState::Skipped,
        }
    }
}
