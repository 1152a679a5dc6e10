//! CLI argument parsing using `clap`, and the `jobgraph` program itself.

use crate::{
    config::{ConfigFile, SchedulerConfig},
    control::RunFlag,
    driver::{CycleDriver, DriverSummary},
    frame::spinning_frame_graph,
    scheduler::Scheduler,
    sequential::run_sequential_loop,
};
use anyhow::{Context, Result, ensure};
use clap::{Parser, ValueEnum};
use std::{io, path::PathBuf, thread, time::Duration};
use tracing::info;

/// Command-line arguments for `jobgraph`.
#[derive(Debug, Clone, Parser)]
#[command(
    name = "jobgraph",
    version,
    about = "Run the reference frame pipeline on a work-stealing job scheduler.",
    long_about = None
)]
pub struct CliArgs {
    /// Path to a config file (TOML). Flags override its values.
    #[arg(long, value_name = "PATH")]
    pub config: Option<PathBuf>,

    /// Number of worker threads.
    #[arg(long, value_name = "N")]
    pub workers: Option<usize>,

    /// Idle-poll timeout in microseconds.
    #[arg(long, value_name = "MICROS")]
    pub poll_interval_us: Option<u64>,

    /// Stop after this many frames.
    ///
    /// If omitted, frames run until a line is entered on stdin.
    #[arg(long, value_name = "N")]
    pub cycles: Option<u64>,

    /// Multiplier applied to every stage's nominal busy time.
    #[arg(long, value_name = "FACTOR", default_value_t = 1.0)]
    pub scale: f64,

    /// Also run the pipeline sequentially on its own thread, for comparison.
    #[arg(long)]
    pub baseline: bool,

    /// Stop after the first frame in which a stage failed.
    #[arg(long)]
    pub halt_on_failure: bool,

    /// Logging level (error, warn, info, debug, trace).
    ///
    /// If omitted, `JOBGRAPH_LOG` or a default level will be used.
    #[arg(long, value_enum, value_name = "LEVEL")]
    pub log_level: Option<LogLevel>,
}

/// Log level as exposed on the CLI.
#[allow(missing_docs)]
#[derive(Debug, Copy, Clone, PartialEq, Eq, ValueEnum)]
pub enum LogLevel {
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

/// Convenience wrapper around `CliArgs::parse()`.
#[must_use]
pub fn parse() -> CliArgs {
    CliArgs::parse()
}

impl CliArgs {
    /// Merge the config file (if any) with the flags.
    ///
    /// # Errors
    /// If the file cannot be loaded or a flag carries an invalid value.
    pub fn resolve_config(&self) -> Result<ConfigFile> {
        let mut config = match &self.config {
            Some(path) => ConfigFile::load(path)
                .with_context(|| format!("loading config from {}", path.display()))?,
            None => ConfigFile::default(),
        };
        if self.workers.is_some() || self.poll_interval_us.is_some() {
            config.scheduler = SchedulerConfig::new(
                self.workers.unwrap_or(config.scheduler.workers.get()),
                self.poll_interval_us
                    .map_or(config.scheduler.poll_interval, Duration::from_micros),
            )?;
        }
        if self.cycles.is_some() {
            config.driver.max_cycles = self.cycles;
        }
        config.driver.halt_on_failure |= self.halt_on_failure;
        Ok(config)
    }
}

/// Run the frame pipeline until the cycle limit or a line on stdin.
///
/// # Errors
/// On invalid configuration, if the worker pool cannot start, or if a worker
/// panicked.
pub fn run(args: &CliArgs) -> Result<()> {
    ensure!(
        args.scale.is_finite() && args.scale >= 0.0,
        "--scale must be a non-negative number, got {}",
        args.scale
    );
    let config = args.resolve_config()?;
    let run = RunFlag::new();

    if config.driver.max_cycles.is_none() {
        spawn_quit_listener(run.clone())?;
        println!("press Enter to stop");
    }
    let baseline = if args.baseline {
        let graph = spinning_frame_graph(args.scale)?;
        let run = run.clone();
        let handle = thread::Builder::new()
            .name("jobgraph-baseline".into())
            .spawn(move || run_sequential_loop(&graph, &run))
            .context("spawning baseline thread")?;
        Some(handle)
    } else {
        None
    };

    let scheduler = Scheduler::start(config.scheduler, run.clone())?;
    info!(
        workers = config.scheduler.workers.get(),
        max_cycles = ?config.driver.max_cycles,
        baseline = args.baseline,
        "running frame pipeline"
    );
    let mut driver = CycleDriver::new(scheduler, spinning_frame_graph(args.scale)?, config.driver);
    let summary = driver.run();
    // Ends the baseline loop and the quit listener's purpose.
    run.stop();
    driver.shutdown()?;
    let summary = summary?;

    print_summary("scheduled", &summary);
    if let Some(handle) = baseline {
        let cycles = handle
            .join()
            .map_err(|_| anyhow::anyhow!("baseline thread panicked"))?;
        println!("baseline: {cycles} frame(s)");
    }
    Ok(())
}

fn spawn_quit_listener(run: RunFlag) -> Result<()> {
    // Never joined: the thread may still be blocked on stdin at exit.
    thread::Builder::new()
        .name("jobgraph-quit".into())
        .spawn(move || {
            let mut line = String::new();
            let _ = io::stdin().read_line(&mut line);
            run.stop();
        })
        .context("spawning stdin listener")?;
    Ok(())
}

fn print_summary(label: &str, summary: &DriverSummary) {
    let cycles = summary.cycles();
    let mean = u32::try_from(cycles)
        .ok()
        .filter(|&n| n > 0)
        .map_or(Duration::ZERO, |n| summary.busy / n);
    println!(
        "{label}: {cycles} frame(s), {} completed, {} failed, {} interrupted",
        summary.completed, summary.failed, summary.interrupted
    );
    println!(
        "{label}: {} task(s) executed, {} steal(s), mean frame {mean:?}",
        summary.tasks_executed, summary.steals
    );
    if let Some(report) = &summary.last_failure {
        for failed in &report.failed {
            println!(
                "{label}: frame {} stage {} failed: {}",
                report.cycle, failed.name, failed.failure
            );
        }
    }
}
