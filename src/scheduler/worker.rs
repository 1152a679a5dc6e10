use crate::{
    scheduler::{QueuedTask, Shared},
    sync::{Ordering, lock},
    task::TaskOutcome,
};
use tracing::{debug, trace, warn};

/// Body of worker thread `worker`.
///
/// Each iteration waits up to one poll interval for the worker's own queue.
/// A claimed item is executed and completed here; a timeout turns into one
/// stealing pass over the other queues. The run flag and the scheduler's own
/// stop are only checked between iterations, so a job that already started
/// always runs to completion.
pub(super) fn run(shared: &Shared, worker: usize) {
    let _guard = FaultGuard { shared, worker };
    let own = shared.queues.get(worker);
    debug!(worker, "worker started");
    while shared.is_active() {
        if own.signal().wait_for(shared.poll_interval) {
            execute(shared, worker, own.pop_claimed());
        } else {
            let stolen = shared.queues.steal_into(worker);
            if stolen > 0 {
                shared.steals.fetch_add(stolen as u64, Ordering::Relaxed);
                trace!(worker, stolen, "stole ready tasks");
            }
        }
    }
    debug!(worker, "worker stopped");
}

fn execute(shared: &Shared, worker: usize, task: QueuedTask) {
    let QueuedTask { graph, id } = task;
    trace!(worker, task = graph.name(id), "executing");
    if let TaskOutcome::Failed(failure) = graph.execute(id) {
        warn!(
            worker,
            task = graph.name(id),
            %failure,
            "task failed; its dependents will be skipped"
        );
    }
    graph.complete(id);
    if graph.is_barrier(id) {
        shared.cycle_finished.notify();
    }
    shared.progress.notify();
}

/// Records a worker panic so the scheduler loop stops waiting for progress
/// that will never come.
struct FaultGuard<'a> {
    shared: &'a Shared,
    worker: usize,
}

impl Drop for FaultGuard<'_> {
    fn drop(&mut self) {
        if std::thread::panicking() {
            lock(&self.shared.fault).get_or_insert(self.worker);
            self.shared.progress.notify();
        }
    }
}
