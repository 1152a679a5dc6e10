#![allow(missing_docs)]
#![cfg(not(feature = "loom"))]

mod common;

use common::Recorder;
use jobgraph::{
    config::{DriverOptions, SchedulerConfig},
    control::RunFlag,
    driver::CycleDriver,
    frame::{Stage, frame_graph},
    graph::{GraphSpec, TaskGraph},
    scheduler::{CycleStatus, Scheduler, SchedulerError},
    task::{TaskFailure, TaskState},
};
use std::{
    sync::{
        Arc,
        atomic::{AtomicBool, AtomicUsize, Ordering},
    },
    thread,
    time::{Duration, Instant},
};

fn config(workers: usize) -> SchedulerConfig {
    SchedulerConfig::new(workers, Duration::from_micros(200)).unwrap()
}

fn position(stage: Stage) -> usize {
    Stage::ALL.iter().position(|&s| s == stage).unwrap()
}

#[test]
fn frame_pipeline_runs_each_stage_once_per_cycle_in_order() {
    let recorder = Recorder::new(Stage::ALL.len());
    let graph = frame_graph(|stage| Box::new(recorder.job(position(stage)))).unwrap();
    let graph = Arc::new(graph);
    let mut scheduler = Scheduler::start(config(3), RunFlag::new()).unwrap();

    for cycle in 1..=5 {
        let report = scheduler.run_cycle(&graph).unwrap();
        assert_eq!(report.cycle, cycle);
        assert!(report.is_complete(), "{report:?}");
        assert_eq!(report.succeeded, Stage::ALL.len());
        assert!(report.unexecuted.is_empty());
    }
    assert_eq!(scheduler.cycles(), 5);
    scheduler.shutdown().unwrap();

    let edges: Vec<(usize, usize)> = Stage::ALL
        .iter()
        .flat_map(|&stage| {
            stage
                .prerequisites()
                .iter()
                .map(move |&pre| (position(pre), position(stage)))
        })
        .collect();
    recorder.assert_causal(&edges, 5);
}

#[test]
fn single_worker_still_drains_the_graph() {
    let recorder = Recorder::new(Stage::ALL.len());
    let graph = Arc::new(frame_graph(|stage| Box::new(recorder.job(position(stage)))).unwrap());
    let mut scheduler = Scheduler::start(config(1), RunFlag::new()).unwrap();
    assert!(scheduler.run_cycle(&graph).unwrap().is_complete());
    for index in 0..Stage::ALL.len() {
        assert_eq!(recorder.runs(index).len(), 1);
    }
}

#[test]
fn failure_skips_dependents_but_the_cycle_drains() {
    let fail_once = Arc::new(AtomicBool::new(true));
    let ran = Arc::new(AtomicUsize::new(0));
    let mut spec = GraphSpec::new();
    let a = {
        let fail_once = Arc::clone(&fail_once);
        spec.add_task("a", move || {
            if fail_once.swap(false, Ordering::SeqCst) {
                Err(TaskFailure::new("first frame only"))
            } else {
                Ok(())
            }
        })
        .unwrap()
    };
    let b = {
        let ran = Arc::clone(&ran);
        spec.add_task_after("b", &[a], move || {
            ran.fetch_add(1, Ordering::SeqCst);
            Ok(())
        })
        .unwrap()
    };
    spec.add_task_after("c", &[b], || Ok(())).unwrap();
    spec.add_task("d", || Ok(())).unwrap();
    let graph = Arc::new(TaskGraph::build(spec).unwrap());
    let mut scheduler = Scheduler::start(config(2), RunFlag::new()).unwrap();

    let report = scheduler.run_cycle(&graph).unwrap();
    assert_eq!(report.status, CycleStatus::Failed);
    assert_eq!(report.succeeded, 1);
    assert_eq!(report.failed.len(), 1);
    assert_eq!(report.failed[0].name, "a");
    assert_eq!(report.failed[0].failure.message(), "first frame only");
    assert_eq!(report.skipped, ["b", "c"]);
    assert_eq!(ran.load(Ordering::SeqCst), 0);
    assert_eq!(graph.state(b), TaskState::Skipped);

    // The same graph runs clean on the next cycle.
    let report = scheduler.run_cycle(&graph).unwrap();
    assert!(report.is_complete());
    assert_eq!(report.succeeded, 4);
    assert_eq!(ran.load(Ordering::SeqCst), 1);
}

#[test]
fn panicking_job_is_reported_as_failure() {
    let mut spec = GraphSpec::new();
    let boom = spec.add_task("boom", || panic!("kaboom")).unwrap();
    spec.add_task_after("after", &[boom], || Ok(())).unwrap();
    let graph = Arc::new(TaskGraph::build(spec).unwrap());
    let mut scheduler = Scheduler::start(config(2), RunFlag::new()).unwrap();

    let report = scheduler.run_cycle(&graph).unwrap();
    assert_eq!(report.status, CycleStatus::Failed);
    assert!(report.failed[0].failure.message().contains("kaboom"));
    assert_eq!(report.skipped, ["after"]);
    // Workers survived the panic.
    scheduler.shutdown().unwrap();
}

#[test]
fn empty_graph_completes_immediately() {
    let graph = Arc::new(TaskGraph::build(GraphSpec::new()).unwrap());
    let mut scheduler = Scheduler::start(config(2), RunFlag::new()).unwrap();
    let report = scheduler.run_cycle(&graph).unwrap();
    assert!(report.is_complete());
    assert_eq!(report.executed(), 0);
}

#[test]
fn stopping_mid_cycle_interrupts_within_bounded_time() {
    const JOB: Duration = Duration::from_millis(100);
    const SLACK: Duration = Duration::from_millis(50);

    let mut spec = GraphSpec::new();
    let slow = spec
        .add_task("slow", || {
            thread::sleep(JOB);
            Ok(())
        })
        .unwrap();
    spec.add_task_after("after", &[slow], || Ok(())).unwrap();
    let graph = Arc::new(TaskGraph::build(spec).unwrap());
    let run = RunFlag::new();
    let mut scheduler = Scheduler::start(config(2), run.clone()).unwrap();

    let stopper = {
        let run = run.clone();
        thread::spawn(move || {
            thread::sleep(Duration::from_millis(20));
            run.stop();
            Instant::now()
        })
    };
    let report = scheduler.run_cycle(&graph).unwrap();
    let returned = Instant::now();
    let stopped = stopper.join().unwrap();
    // The scheduler loop does not wait for the in-flight job.
    assert!(returned.saturating_duration_since(stopped) < SLACK);
    assert_eq!(report.status, CycleStatus::Interrupted);
    assert!(report.unexecuted.contains(&"after".to_owned()));

    assert!(matches!(
        scheduler.run_cycle(&graph),
        Err(SchedulerError::Stopped)
    ));
    // Joining waits for at most the one job still running.
    let joining = Instant::now();
    scheduler.shutdown().unwrap();
    assert!(joining.elapsed() < JOB + SLACK);
}

#[test]
fn idle_pool_shuts_down_within_a_few_poll_intervals() {
    let scheduler = Scheduler::start(config(4), RunFlag::new()).unwrap();
    let joining = Instant::now();
    scheduler.shutdown().unwrap();
    assert!(joining.elapsed() < Duration::from_millis(50));
}

#[test]
fn dropping_a_scheduler_leaves_the_shared_flag_alone() {
    let run = RunFlag::new();
    let mut spec = GraphSpec::new();
    spec.add_task("only", || Ok(())).unwrap();
    let graph = Arc::new(TaskGraph::build(spec).unwrap());
    let mut kept = Scheduler::start(config(2), run.clone()).unwrap();
    let dropped = Scheduler::start(config(2), run.clone()).unwrap();

    let joining = Instant::now();
    drop(dropped);
    assert!(joining.elapsed() < Duration::from_millis(50));
    assert!(run.is_running());
    assert!(kept.run_cycle(&graph).unwrap().is_complete());

    kept.shutdown().unwrap();
    assert!(run.is_running());
}

#[test]
fn driver_honours_cycle_limit() {
    let recorder = Recorder::new(Stage::ALL.len());
    let graph = frame_graph(|stage| Box::new(recorder.job(position(stage)))).unwrap();
    let scheduler = Scheduler::start(config(3), RunFlag::new()).unwrap();
    let mut driver = CycleDriver::new(
        scheduler,
        graph,
        DriverOptions {
            max_cycles: Some(4),
            halt_on_failure: false,
        },
    );
    let summary = driver.run().unwrap();
    assert_eq!(summary.cycles(), 4);
    assert_eq!(summary.completed, 4);
    assert_eq!(summary.tasks_executed, 4 * Stage::ALL.len() as u64);
    assert!(summary.last_failure.is_none());
    driver.shutdown().unwrap();
    for index in 0..Stage::ALL.len() {
        assert_eq!(recorder.runs(index).len(), 4);
    }
}

#[test]
fn driver_halts_on_first_failed_cycle() {
    let calls = Arc::new(AtomicUsize::new(0));
    let mut spec = GraphSpec::new();
    {
        let calls = Arc::clone(&calls);
        spec.add_task("flaky", move || {
            if calls.fetch_add(1, Ordering::SeqCst) == 2 {
                Err("third call fails".into())
            } else {
                Ok(())
            }
        })
        .unwrap();
    }
    let graph = TaskGraph::build(spec).unwrap();
    let scheduler = Scheduler::start(config(2), RunFlag::new()).unwrap();
    let mut driver = CycleDriver::new(
        scheduler,
        graph,
        DriverOptions {
            max_cycles: Some(10),
            halt_on_failure: true,
        },
    );
    let summary = driver.run().unwrap();
    assert_eq!(summary.completed, 2);
    assert_eq!(summary.failed, 1);
    assert_eq!(summary.cycles(), 3);
    let last = summary.last_failure.unwrap();
    assert_eq!(last.cycle, 3);
    assert_eq!(last.failed[0].failure.message(), "third call fails");
}

#[test]
fn driver_stops_when_flag_clears() {
    let run = RunFlag::new();
    let mut spec = GraphSpec::new();
    spec.add_task("tick", || {
        thread::sleep(Duration::from_millis(1));
        Ok(())
    })
    .unwrap();
    let graph = TaskGraph::build(spec).unwrap();
    let scheduler = Scheduler::start(config(2), run.clone()).unwrap();
    let mut driver = CycleDriver::new(scheduler, graph, DriverOptions::default());

    let stopper = {
        let run = run.clone();
        thread::spawn(move || {
            thread::sleep(Duration::from_millis(30));
            run.stop();
        })
    };
    let summary = driver.run().unwrap();
    stopper.join().unwrap();
    assert!(summary.cycles() >= 1);
    driver.shutdown().unwrap();
}
