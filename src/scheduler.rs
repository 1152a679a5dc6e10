mod report;
mod worker;

pub use crate::scheduler::report::{CycleReport, CycleStatus, FailedTask};
use crate::{
    config::SchedulerConfig,
    control::RunFlag,
    graph::TaskGraph,
    queue::{ReadyQueue, ReadyQueues},
    semaphore::Semaphore,
    sync::{Arc, AtomicBool, AtomicU64, Mutex, Ordering, lock},
    types::TaskId,
};
use derive_more::Debug;
use std::{
    thread::{self, JoinHandle},
    time::{Duration, Instant},
};
use thiserror::Error;
use tracing::{debug, trace};

/// Error returned by [`Scheduler`] operations.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum SchedulerError {
    /// A worker thread could not be spawned.
    #[error("failed to spawn worker thread: {0}")]
    Spawn(#[source] std::io::Error),
    /// The run flag was already cleared, so no new cycle is started.
    #[error("scheduler is stopped")]
    Stopped,
    /// A worker thread panicked on an internal invariant violation.
    #[error("worker {worker} panicked")]
    WorkerPanicked {
        /// Index of the worker that panicked first.
        worker: usize,
    },
}

/// Context shared by the scheduler loop and all workers for the lifetime of
/// the scheduler.
#[derive(Debug)]
pub(crate) struct Shared {
    queues: ReadyQueues<QueuedTask>,
    /// One signal per completed task.
    progress: Semaphore,
    /// Signalled by the worker that completes the barrier.
    cycle_finished: Semaphore,
    run: RunFlag,
    /// Set by this scheduler's own shutdown. The external run flag is only
    /// ever read.
    stopping: AtomicBool,
    poll_interval: Duration,
    steals: AtomicU64,
    /// First worker that panicked, if any.
    fault: Mutex<Option<usize>>,
}

/// A ready task as it sits in a worker queue.
#[derive(Debug)]
pub(crate) struct QueuedTask {
    #[debug(skip)]
    graph: Arc<TaskGraph>,
    id: TaskId,
}

/// Dependency-graph scheduler over a fixed pool of work-stealing workers.
///
/// [`start`](Self::start) spawns one worker thread per configured worker,
/// each owning a ready queue. [`run_cycle`](Self::run_cycle) then drives one
/// graph to completion from the calling thread:
/// - Scans the pending tasks in insertion order and hands the first ready one
///   to each worker queue in round-robin order,
/// - Waits for one completion signal and rescans, until nothing is pending,
/// - Waits for the barrier task, which completes only after every other task,
/// - Drains the queues and reports the outcome.
///
/// Workers that run dry steal from the other queues, so the round-robin
/// dispatch does not need to know how busy each worker is.
///
/// Clearing the [`RunFlag`] ends the current cycle within one poll interval
/// and stops the workers once their current job returns. The scheduler never
/// writes the flag itself, so several schedulers and other loops can share
/// one.
#[must_use]
#[derive(Debug)]
pub struct Scheduler {
    shared: Arc<Shared>,
    #[debug(skip)]
    workers: Vec<JoinHandle<()>>,
    config: SchedulerConfig,
    cycles: u64,
}

impl Scheduler {
    /// Spawn the worker pool.
    ///
    /// # Errors
    /// If a worker thread cannot be spawned. Workers spawned before the
    /// failure are stopped and joined.
    pub fn start(config: SchedulerConfig, run: RunFlag) -> Result<Self, SchedulerError> {
        let workers = config.workers.get();
        let shared = Arc::new(Shared {
            queues: ReadyQueues::new(workers),
            progress: Semaphore::new(),
            cycle_finished: Semaphore::new(),
            run,
            stopping: AtomicBool::new(false),
            poll_interval: config.poll_interval,
            steals: AtomicU64::new(0),
            fault: Mutex::new(None),
        });
        let mut scheduler = Self {
            shared,
            workers: Vec::with_capacity(workers),
            config,
            cycles: 0,
        };
        for index in 0..workers {
            let shared = Arc::clone(&scheduler.shared);
            let handle = thread::Builder::new()
                .name(format!("jobgraph-worker-{index}"))
                .spawn(move || worker::run(&shared, index))
                .map_err(SchedulerError::Spawn)?;
            scheduler.workers.push(handle);
        }
        debug!(workers, poll_interval = ?config.poll_interval, "scheduler started");
        Ok(scheduler)
    }

    /// Configuration the scheduler was started with.
    pub fn config(&self) -> &SchedulerConfig {
        &self.config
    }

    /// Flag observed by the scheduler and its workers.
    pub fn run_flag(&self) -> &RunFlag {
        &self.shared.run
    }

    /// Number of cycles started so far.
    #[must_use]
    pub fn cycles(&self) -> u64 {
        self.cycles
    }

    /// Run every task of `graph` once, respecting dependencies.
    ///
    /// The graph's per-cycle state is reset first, so the same graph can be
    /// passed again for the next cycle. Task failures do not make this return
    /// an error; they are listed in the report and their dependents are
    /// skipped. A cleared run flag ends the cycle early with
    /// [`CycleStatus::Interrupted`].
    ///
    /// # Errors
    /// If the run flag was cleared before the call, or a worker panicked.
    pub fn run_cycle(&mut self, graph: &Arc<TaskGraph>) -> Result<CycleReport, SchedulerError> {
        if !self.shared.run.is_running() {
            return Err(SchedulerError::Stopped);
        }
        self.cycles += 1;
        let cycle = self.cycles;
        let started = Instant::now();
        let steals_before = self.shared.steals.load(Ordering::Relaxed);

        graph.reset();
        let mut pending: Vec<TaskId> = graph.all_ids().collect();
        let outcome = self.drive(graph, &mut pending);
        let discarded = self.teardown();
        let drained = outcome?;
        debug!(cycle, discarded, pending = pending.len(), "cycle torn down");

        let steals = self.shared.steals.load(Ordering::Relaxed) - steals_before;
        let report = CycleReport::collect(cycle, graph, drained, steals, started.elapsed());
        report.log();
        Ok(report)
    }

    /// Stop the workers and wait for them to exit.
    ///
    /// Only this scheduler's workers are stopped; the run flag is left as is.
    ///
    /// # Errors
    /// If a worker panicked.
    pub fn shutdown(mut self) -> Result<(), SchedulerError> {
        self.shared.stopping.store(true, Ordering::Release);
        self.join_workers()
    }

    /// Dispatch everything, then wait for the barrier. Returns `Ok(false)` if
    /// the run flag was cleared before the barrier completed.
    fn drive(
        &self,
        graph: &Arc<TaskGraph>,
        pending: &mut Vec<TaskId>,
    ) -> Result<bool, SchedulerError> {
        Ok(self.dispatch(graph, pending)? && self.await_signal(&self.shared.cycle_finished)?)
    }

    /// Dispatch loop: returns `Ok(false)` if the run flag was cleared before
    /// every task had been handed to a worker.
    fn dispatch(
        &self,
        graph: &Arc<TaskGraph>,
        pending: &mut Vec<TaskId>,
    ) -> Result<bool, SchedulerError> {
        let shared = &*self.shared;
        while !pending.is_empty() {
            for worker in 0..shared.queues.len() {
                let Some(position) = pending.iter().position(|&id| graph.is_ready(id)) else {
                    break;
                };
                let id = pending.remove(position);
                graph.dispatch(id);
                trace!(task = graph.name(id), worker, "dispatched");
                shared.queues.get(worker).push(QueuedTask {
                    graph: Arc::clone(graph),
                    id,
                });
            }
            if !shared.run.is_running() || !self.await_signal(&shared.progress)? {
                return Ok(false);
            }
        }
        Ok(true)
    }

    /// Wait for one signal, polling so that a cleared run flag or a panicked
    /// worker is noticed within one poll interval. Returns `Ok(false)` if the
    /// run flag was cleared first.
    fn await_signal(&self, signal: &Semaphore) -> Result<bool, SchedulerError> {
        let shared = &*self.shared;
        loop {
            let signalled = signal.wait_for(shared.poll_interval);
            if let Some(worker) = *lock(&shared.fault) {
                return Err(SchedulerError::WorkerPanicked { worker });
            }
            if signalled {
                return Ok(true);
            }
            if !shared.run.is_running() {
                return Ok(false);
            }
        }
    }

    /// Discard whatever an interrupted cycle left queued and clear the
    /// scheduler's own signals. Late signals from workers still finishing a
    /// job only cost the next cycle one extra scan.
    fn teardown(&self) -> usize {
        let shared = &*self.shared;
        let discarded = shared.queues.drain_all();
        shared.progress.reset();
        shared.cycle_finished.reset();
        discarded
    }

    fn join_workers(&mut self) -> Result<(), SchedulerError> {
        let mut result = Ok(());
        for (worker, handle) in self.workers.drain(..).enumerate() {
            if handle.join().is_err() && result.is_ok() {
                result = Err(SchedulerError::WorkerPanicked { worker });
            }
        }
        self.shared.queues.iter().for_each(ReadyQueue::clear);
        debug!("scheduler stopped");
        result
    }
}

impl Shared {
    /// Whether workers should keep looping: the run flag holds and the
    /// owning scheduler has not shut down.
    fn is_active(&self) -> bool {
        self.run.is_running() && !self.stopping.load(Ordering::Acquire)
    }
}

impl Drop for Scheduler {
    fn drop(&mut self) {
        if !self.workers.is_empty() {
            self.shared.stopping.store(true, Ordering::Release);
            let _ = self.join_workers();
        }
    }
}
