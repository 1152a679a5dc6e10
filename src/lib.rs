//! Dependency-graph job scheduler over a pool of work-stealing workers.
//!
//! This crate runs a Directed Acyclic Graph (DAG) of jobs repeatedly, one
//! cycle at a time, on a fixed set of worker threads. It:
//! - Validates the graph at build time (unknown tasks, self edges, cycles)
//!   and appends a barrier task that depends on every terminal task.
//! - Counts outstanding prerequisites per task with atomics, so a task
//!   becomes ready the moment its last prerequisite completes.
//! - Hands ready tasks to per-worker queues in round-robin order and lets idle
//!   workers steal from busy ones.
//! - Treats a failed or panicking job as a task outcome: its dependents are
//!   skipped, the cycle still drains, and the failure is reported.
//!
//! Key modules:
//! - `graph`: graph construction (`GraphSpec`) and the per-cycle node
//!   protocol (`TaskGraph::dispatch`, `execute`, `complete`).
//! - `scheduler`: the worker pool and the per-cycle dispatch loop.
//! - `driver`: repeats cycles until stopped, with per-cycle statistics.
//! - `queue` and `semaphore`: the synchronization primitives workers use.
//! - `frame`: a reference eight-stage pipeline with placeholder jobs.
//!
//! Quick start:
//! 1. Add tasks to a `GraphSpec` with `add_task` / `add_task_after`.
//! 2. Call `TaskGraph::build`.
//! 3. `Scheduler::start` a pool and either call `run_cycle` yourself or hand
//!    both to a `CycleDriver`.

/// Command-line interface of the `jobgraph` binary.
pub mod cli;
/// Scheduler and driver configuration, with TOML loading.
pub mod config;
/// Cooperative stop flag shared by every loop in the crate.
pub mod control;
/// Repeats scheduler cycles and aggregates their reports.
pub mod driver;
/// Reference frame pipeline with spinning placeholder jobs.
pub mod frame;
/// Task graph construction and the per-cycle node protocol.
///
/// Building validates the graph, computes a topological order, and appends
/// the barrier. At run time every node moves through
/// `Pending -> Queued -> Running -> (Succeeded | Failed | Skipped)` once per
/// cycle.
pub mod graph;
/// Log subscriber setup.
pub mod logging;
/// Per-worker ready queues and work stealing between them.
pub mod queue;
/// The worker pool and the dispatch loop.
pub mod scheduler;
/// Counting semaphore with timed waits.
pub mod semaphore;
/// Single-threaded baseline runner.
pub mod sequential;
mod sync;
/// Jobs, job failures, and task states.
pub mod task;
/// Identifiers and collection aliases.
pub mod types;
