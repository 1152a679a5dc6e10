mod setup;

/// Error returned by [`TaskGraph::build`] and the [`GraphSpec`] builders when
/// the dependency specification is malformed.
pub use crate::graph::setup::GraphError;
/// Mutable dependency specification that [`TaskGraph::build`] turns into an
/// executable graph.
pub use crate::graph::setup::GraphSpec;
use crate::{
    sync::{AtomicBool, AtomicU8, AtomicU32, Mutex, Ordering, lock},
    task::{Job, TaskFailure, TaskOutcome, TaskState},
    types::TaskId,
};
use derive_more::Debug;
use std::panic::{AssertUnwindSafe, catch_unwind};
use tracing::error;

/// Arena holding every task of one dependency graph plus its barrier.
///
/// Tasks reference each other by index, never by pointer, and the arena owns
/// all of them. The last slot is always the barrier: a job-less task that
/// depends on every terminal task of the [`GraphSpec`], so its completion
/// marks the end of a cycle.
///
/// Per-cycle bookkeeping (remaining prerequisite counters, states, failure
/// records) lives in atomics next to the immutable layout, which lets the same
/// graph be run again after [`reset`](Self::reset) without reallocating.
#[must_use]
#[derive(Debug)]
pub struct TaskGraph {
    tasks: Vec<TaskLayout>,
    prerequisites: Vec<PrereqSlot>,
    outcomes: Vec<OutcomeSlot>,
    topo_order: Vec<u32>,
    barrier: u32,
}

#[must_use]
#[derive(Debug)]
pub(crate) struct TaskLayout {
    name: String,
    /// `None` only for the barrier.
    #[debug(skip)]
    job: Option<Job>,
    /// Indexes of the tasks that depend on this one, in insertion order.
    dependents: Vec<u32>,
}

#[must_use]
#[derive(Debug)]
#[repr(align(128))]
pub(crate) struct PrereqSlot {
    /// Number of distinct prerequisites registered at construction.
    prerequisites_total: u32,
    /// Number of prerequisites that haven't completed yet in this cycle.
    remaining: AtomicU32,
    /// Set when at least one prerequisite did not succeed.
    poisoned: AtomicBool,
}

#[must_use]
#[derive(Debug)]
pub(crate) struct OutcomeSlot {
    state: AtomicU8,
    failure: Mutex<Option<TaskFailure>>,
}

impl PrereqSlot {
    fn new(prerequisites_total: u32) -> Self {
        Self {
            prerequisites_total,
            remaining: AtomicU32::new(prerequisites_total),
            poisoned: AtomicBool::new(false),
        }
    }
}

impl OutcomeSlot {
    fn new() -> Self {
        Self {
            state: AtomicU8::new(TaskState::Pending as u8),
            failure: Mutex::new(None),
        }
    }
}

impl TaskGraph {
    /// Number of tasks from the [`GraphSpec`], not counting the barrier.
    #[must_use]
    pub fn len(&self) -> usize {
        self.tasks.len() - 1
    }

    /// Whether the [`GraphSpec`] contained no tasks at all.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Id of the barrier task appended by [`build`](Self::build).
    pub fn barrier(&self) -> TaskId {
        TaskId(self.barrier)
    }

    /// Whether `id` is this graph's barrier.
    #[must_use]
    pub fn is_barrier(&self, id: TaskId) -> bool {
        id.0 == self.barrier
    }

    /// Ids of all tasks from the [`GraphSpec`], in insertion order.
    pub fn task_ids(&self) -> impl Iterator<Item = TaskId> + '_ {
        (0..self.barrier).map(TaskId)
    }

    /// Every slot including the barrier, in insertion order.
    pub(crate) fn all_ids(&self) -> impl Iterator<Item = TaskId> + '_ {
        (0..=self.barrier).map(TaskId)
    }

    /// Ids in a topological order, barrier last.
    pub fn topological_order(&self) -> impl Iterator<Item = TaskId> + '_ {
        self.topo_order.iter().copied().map(TaskId)
    }

    /// Name the task was registered with.
    #[must_use]
    pub fn name(&self, id: TaskId) -> &str {
        &self.tasks[id.index()].name
    }

    /// Tasks that list `id` as a prerequisite.
    pub fn dependents(&self, id: TaskId) -> impl Iterator<Item = TaskId> + '_ {
        self.tasks[id.index()].dependents.iter().copied().map(TaskId)
    }

    /// Number of distinct prerequisites registered for `id`.
    #[must_use]
    pub fn prerequisite_count(&self, id: TaskId) -> u32 {
        self.prerequisites[id.index()].prerequisites_total
    }

    /// Number of prerequisites of `id` that have not completed in the current
    /// cycle.
    #[must_use]
    pub fn remaining_prerequisites(&self, id: TaskId) -> u32 {
        self.prerequisites[id.index()]
            .remaining
            .load(Ordering::Acquire)
    }

    /// Whether every prerequisite of `id` has completed.
    #[must_use]
    pub fn is_ready(&self, id: TaskId) -> bool {
        self.remaining_prerequisites(id) == 0
    }

    /// Current lifecycle state of `id`.
    pub fn state(&self, id: TaskId) -> TaskState {
        TaskState::from_u8(self.outcomes[id.index()].state.load(Ordering::Acquire))
    }

    /// Failure recorded for `id` in the current cycle, if any.
    #[must_use]
    pub fn failure(&self, id: TaskId) -> Option<TaskFailure> {
        lock(&self.outcomes[id.index()].failure).clone()
    }

    /// Mark a ready task as handed to a worker queue.
    ///
    /// # Panics
    /// If the task is not ready or has already been dispatched in this cycle.
    /// Either case means the scheduling protocol is broken.
    pub fn dispatch(&self, id: TaskId) {
        assert!(
            self.is_ready(id),
            "TaskGraph::dispatch: task `{}` dispatched before its prerequisites completed",
            self.name(id)
        );
        self.transition(id, TaskState::Pending, TaskState::Queued);
    }

    /// Run the task's job to completion on the calling thread.
    ///
    /// A task with a failed or skipped prerequisite is not run and reports
    /// [`TaskOutcome::Skipped`]. A panic inside the job is caught and reported
    /// as a failure. The outcome is recorded before returning, so a subsequent
    /// [`complete`](Self::complete) knows whether to poison the dependents.
    ///
    /// # Panics
    /// If the task was not dispatched, or is executed twice in one cycle.
    pub fn execute(&self, id: TaskId) -> TaskOutcome {
        self.transition(id, TaskState::Queued, TaskState::Running);
        let idx = id.index();
        let outcome = if self.prerequisites[idx].poisoned.load(Ordering::Acquire) {
            TaskOutcome::Skipped
        } else {
            match &self.tasks[idx].job {
                None => TaskOutcome::Succeeded,
                Some(job) => match catch_unwind(AssertUnwindSafe(|| job())) {
                    Ok(Ok(())) => TaskOutcome::Succeeded,
                    Ok(Err(failure)) => TaskOutcome::Failed(failure),
                    Err(payload) => TaskOutcome::Failed(TaskFailure::from_panic(payload.as_ref())),
                },
            }
        };
        let slot = &self.outcomes[idx];
        if let TaskOutcome::Failed(failure) = &outcome {
            *lock(&slot.failure) = Some(failure.clone());
        }
        slot.state.store(outcome.state() as u8, Ordering::Release);
        outcome
    }

    /// Release every dependent of a finished task.
    ///
    /// Each dependent's remaining-prerequisite counter is decremented once,
    /// with a floor at zero. When this task did not succeed its dependents are
    /// poisoned before the decrement, so they are skipped instead of run.
    /// Newly ready dependents are not reported; the scheduler finds them by
    /// re-scanning its pending set.
    ///
    /// # Panics
    /// If the task has not finished executing.
    pub fn complete(&self, id: TaskId) {
        let state = self.state(id);
        assert!(
            state.is_finished(),
            "TaskGraph::complete: task `{}` completed in state {state:?}",
            self.name(id)
        );
        let poison = state != TaskState::Succeeded;
        for &dependent in &self.tasks[id.index()].dependents {
            let slot = &self.prerequisites[dependent as usize];
            if poison {
                slot.poisoned.store(true, Ordering::Release);
            }
            self.release_one(TaskId(dependent), slot);
        }
    }

    /// Restore every counter, state and failure record for a new cycle.
    ///
    /// Must not be called while a cycle over this graph is in flight.
    pub fn reset(&self) {
        for (prerequisites, outcome) in self.prerequisites.iter().zip(&self.outcomes) {
            prerequisites
                .remaining
                .store(prerequisites.prerequisites_total, Ordering::Relaxed);
            prerequisites.poisoned.store(false, Ordering::Relaxed);
            *lock(&outcome.failure) = None;
            outcome
                .state
                .store(TaskState::Pending as u8, Ordering::Release);
        }
    }

    fn release_one(&self, dependent: TaskId, slot: &PrereqSlot) {
        let mut current = slot.remaining.load(Ordering::Relaxed);
        loop {
            if current == 0 {
                // More completions than registered prerequisites: the graph
                // was completed twice or built wrong. Keep the floor.
                error!(
                    task = self.name(dependent),
                    "prerequisite counter already at zero on completion"
                );
                if cfg!(debug_assertions) {
                    panic!("TaskGraph::complete: counter underflow");
                }
                return;
            }
            match slot.remaining.compare_exchange(
                current,
                current - 1,
                Ordering::AcqRel,
                Ordering::Relaxed,
            ) {
                Ok(_) => return,
                Err(actual) => current = actual,
            }
        }
    }

    fn transition(&self, id: TaskId, from: TaskState, to: TaskState) {
        let result = self.outcomes[id.index()].state.compare_exchange(
            from as u8,
            to as u8,
            Ordering::AcqRel,
            Ordering::Acquire,
        );
        if let Err(actual) = result {
            panic!(
                "TaskGraph: task `{}` expected state {from:?} but found {:?}",
                self.name(id),
                TaskState::from_u8(actual)
            );
        }
    }
}
