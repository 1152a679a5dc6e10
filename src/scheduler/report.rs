use crate::{
    graph::TaskGraph,
    task::{TaskFailure, TaskState},
};
use std::time::Duration;
use tracing::{debug, warn};

/// How a cycle ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CycleStatus {
    /// Every task ran and succeeded.
    Completed,
    /// The cycle drained, but at least one task failed and its dependents
    /// were skipped.
    Failed,
    /// The run flag was cleared before the barrier completed. Some tasks may
    /// not have run.
    Interrupted,
}

/// A task whose job returned an error or panicked.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FailedTask {
    /// Name the task was registered with.
    pub name: String,
    /// What the job reported.
    pub failure: TaskFailure,
}

/// Summary of one cycle over a graph. The barrier is not counted.
#[derive(Debug, Clone)]
pub struct CycleReport {
    /// 1-based number of the cycle on the scheduler that ran it.
    pub cycle: u64,
    /// How the cycle ended.
    pub status: CycleStatus,
    /// Number of tasks that ran successfully.
    pub succeeded: usize,
    /// Tasks that failed, in insertion order.
    pub failed: Vec<FailedTask>,
    /// Tasks not run because a prerequisite failed or was skipped.
    pub skipped: Vec<String>,
    /// Tasks that had not finished when the cycle returned. Only non-empty
    /// for interrupted cycles.
    pub unexecuted: Vec<String>,
    /// Items moved between ready queues by work stealing during the cycle.
    pub steals: u64,
    /// Wall-clock time from dispatch start to teardown.
    pub elapsed: Duration,
}

impl CycleReport {
    pub(crate) fn collect(
        cycle: u64,
        graph: &TaskGraph,
        drained: bool,
        steals: u64,
        elapsed: Duration,
    ) -> Self {
        let mut succeeded = 0;
        let mut failed = Vec::new();
        let mut skipped = Vec::new();
        let mut unexecuted = Vec::new();
        for id in graph.task_ids() {
            let name = graph.name(id).to_owned();
            match graph.state(id) {
                TaskState::Succeeded => succeeded += 1,
                TaskState::Failed => failed.push(FailedTask {
                    name,
                    failure: graph
                        .failure(id)
                        .unwrap_or_else(|| TaskFailure::new("failure was not recorded")),
                }),
                TaskState::Skipped => skipped.push(name),
                TaskState::Pending | TaskState::Queued | TaskState::Running => {
                    unexecuted.push(name);
                }
            }
        }
        let status = if !drained {
            CycleStatus::Interrupted
        } else if failed.is_empty() {
            CycleStatus::Completed
        } else {
            CycleStatus::Failed
        };
        Self {
            cycle,
            status,
            succeeded,
            failed,
            skipped,
            unexecuted,
            steals,
            elapsed,
        }
    }

    /// Whether every task ran and succeeded.
    #[must_use]
    pub fn is_complete(&self) -> bool {
        self.status == CycleStatus::Completed
    }

    /// Number of tasks whose job was actually invoked.
    #[must_use]
    pub fn executed(&self) -> usize {
        self.succeeded + self.failed.len()
    }

    pub(crate) fn log(&self) {
        let elapsed_us = u64::try_from(self.elapsed.as_micros()).unwrap_or(u64::MAX);
        match self.status {
            CycleStatus::Completed => debug!(
                cycle = self.cycle,
                elapsed_us,
                steals = self.steals,
                "cycle completed"
            ),
            CycleStatus::Failed => warn!(
                cycle = self.cycle,
                failed = ?self.failed.iter().map(|task| task.name.as_str()).collect::<Vec<_>>(),
                skipped = self.skipped.len(),
                "cycle finished with failed tasks"
            ),
            CycleStatus::Interrupted => warn!(
                cycle = self.cycle,
                unexecuted = ?self.unexecuted,
                "cycle interrupted by shutdown before draining"
            ),
        }
    }
}
