use crate::{
    config::DriverOptions,
    graph::TaskGraph,
    scheduler::{CycleReport, CycleStatus, Scheduler, SchedulerError},
    sync::Arc,
};
use std::time::Duration;
use tracing::{info, warn};

/// Totals over every cycle a [`CycleDriver`] ran.
#[derive(Debug, Clone, Default)]
pub struct DriverSummary {
    /// Cycles in which every task succeeded.
    pub completed: u64,
    /// Cycles that drained with at least one failed task.
    pub failed: u64,
    /// Cycles cut short by the run flag.
    pub interrupted: u64,
    /// Jobs invoked across all cycles.
    pub tasks_executed: u64,
    /// Work-stealing transfers across all cycles.
    pub steals: u64,
    /// Sum of cycle wall-clock times.
    pub busy: Duration,
    /// Report of the most recent failed cycle.
    pub last_failure: Option<CycleReport>,
}

impl DriverSummary {
    /// Total number of cycles run.
    #[must_use]
    pub fn cycles(&self) -> u64 {
        self.completed + self.failed + self.interrupted
    }

    fn record(&mut self, report: &CycleReport) {
        match report.status {
            CycleStatus::Completed => self.completed += 1,
            CycleStatus::Failed => {
                self.failed += 1;
                self.last_failure = Some(report.clone());
            }
            CycleStatus::Interrupted => self.interrupted += 1,
        }
        self.tasks_executed += report.executed() as u64;
        self.steals += report.steals;
        self.busy += report.elapsed;
    }
}

/// Repeats cycles of one graph on a scheduler while the run flag holds.
///
/// The graph is built once and reused: every cycle resets its counters
/// instead of reallocating the nodes.
#[must_use]
#[derive(Debug)]
pub struct CycleDriver {
    scheduler: Scheduler,
    graph: Arc<TaskGraph>,
    options: DriverOptions,
}

impl CycleDriver {
    /// Drive `graph` on `scheduler`.
    pub fn new(scheduler: Scheduler, graph: TaskGraph, options: DriverOptions) -> Self {
        Self {
            scheduler,
            graph: Arc::new(graph),
            options,
        }
    }

    /// The graph being driven.
    pub fn graph(&self) -> &TaskGraph {
        &self.graph
    }

    /// Run cycles until the run flag clears, the cycle limit is reached, or a
    /// cycle fails while `halt_on_failure` is set.
    ///
    /// # Errors
    /// If a worker panicked.
    pub fn run(&mut self) -> Result<DriverSummary, SchedulerError> {
        let mut summary = DriverSummary::default();
        while self.scheduler.run_flag().is_running() {
            if self
                .options
                .max_cycles
                .is_some_and(|limit| summary.cycles() >= limit)
            {
                break;
            }
            let report = match self.scheduler.run_cycle(&self.graph) {
                Ok(report) => report,
                // The flag cleared between the check above and the call.
                Err(SchedulerError::Stopped) => break,
                Err(err) => return Err(err),
            };
            summary.record(&report);
            if report.status == CycleStatus::Failed && self.options.halt_on_failure {
                warn!(cycle = report.cycle, "halting after failed cycle");
                break;
            }
        }
        info!(
            cycles = summary.cycles(),
            completed = summary.completed,
            failed = summary.failed,
            interrupted = summary.interrupted,
            steals = summary.steals,
            "driver finished"
        );
        Ok(summary)
    }

    /// Stop the scheduler's workers and wait for them.
    ///
    /// # Errors
    /// If a worker panicked.
    pub fn shutdown(self) -> Result<(), SchedulerError> {
        self.scheduler.shutdown()
    }
}
