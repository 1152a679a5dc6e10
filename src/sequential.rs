use crate::{
    control::RunFlag,
    graph::TaskGraph,
    scheduler::CycleReport,
    task::TaskOutcome,
};
use std::time::Instant;
use tracing::warn;

/// Run one cycle of `graph` on the calling thread, in topological order.
///
/// This is the baseline the parallel scheduler is compared against. It uses
/// the same execute/complete protocol, so failures skip dependents exactly as
/// they do on the worker pool. The run flag is checked between tasks; a
/// cleared flag interrupts the cycle.
pub fn run_sequential(graph: &TaskGraph, cycle: u64, run: &RunFlag) -> CycleReport {
    let started = Instant::now();
    graph.reset();
    let mut drained = true;
    for id in graph.topological_order() {
        if !run.is_running() {
            drained = false;
            break;
        }
        graph.dispatch(id);
        if let TaskOutcome::Failed(failure) = graph.execute(id) {
            warn!(
                task = graph.name(id),
                %failure,
                "task failed; its dependents will be skipped"
            );
        }
        graph.complete(id);
    }
    let report = CycleReport::collect(cycle, graph, drained, 0, started.elapsed());
    report.log();
    report
}

/// Repeat [`run_sequential`] until the run flag clears, returning the number
/// of cycles run.
pub fn run_sequential_loop(graph: &TaskGraph, run: &RunFlag) -> u64 {
    let mut cycles = 0;
    while run.is_running() {
        cycles += 1;
        run_sequential(graph, cycles, run);
    }
    cycles
}
