//! Reference pipeline: one frame of a game-style simulation.
//!
//! ```text
//!   Input        Sound
//!     |            |
//!   Physics        |
//!    |     \       |
//! Collision  GameElements
//!   |     \        |
//! Animation Particles
//!      \    |     /
//!      Rendering  |
//!           \     |
//!           <barrier>
//! ```
//!
//! The stage bodies are placeholders: each one spins the CPU for a nominal
//! duration, which is enough to show how much of a frame the scheduler can
//! overlap.

use crate::{
    graph::{GraphError, GraphSpec, TaskGraph},
    task::{Job, TaskResult},
    types::TaskId,
};
use derive_more::Display;
use std::{
    hint,
    time::{Duration, Instant},
};
use thiserror::Error;

/// One update stage of a frame.
#[derive(Debug, Display, Copy, Clone, PartialEq, Eq, Hash)]
pub enum Stage {
    /// Read player input.
    Input,
    /// Integrate motion.
    Physics,
    /// Resolve contacts.
    Collision,
    /// Advance skeletal animation.
    Animation,
    /// Advance particle systems.
    Particles,
    /// Update gameplay entities.
    GameElements,
    /// Build and submit the frame.
    Rendering,
    /// Mix audio.
    Sound,
}

impl Stage {
    /// Every stage, in the order they are added to the graph. Prerequisites
    /// always come first.
    pub const ALL: [Self; 8] = [
        Self::Input,
        Self::Sound,
        Self::Physics,
        Self::Collision,
        Self::GameElements,
        Self::Animation,
        Self::Particles,
        Self::Rendering,
    ];

    /// Stages that must finish before this one starts.
    #[must_use]
    pub const fn prerequisites(self) -> &'static [Self] {
        match self {
            Self::Input | Self::Sound => &[],
            Self::Physics => &[Self::Input],
            Self::Collision | Self::GameElements => &[Self::Physics],
            Self::Animation | Self::Particles => &[Self::Collision],
            Self::Rendering => &[Self::Animation, Self::Particles, Self::GameElements],
        }
    }

    /// Busy time of the placeholder body at scale 1.0.
    #[must_use]
    pub const fn nominal_cost(self) -> Duration {
        Duration::from_micros(match self {
            Self::Input => 2_000,
            Self::Physics | Self::Sound => 10_000,
            Self::Collision => 12_000,
            Self::Animation => 6_000,
            Self::Particles => 8_000,
            Self::GameElements => 24_000,
            Self::Rendering => 20_000,
        })
    }
}

/// Build the frame graph with the job `job_for` returns for each stage.
///
/// Tasks are named after their stage.
///
/// # Errors
/// Never for the fixed stage table; the result type follows [`TaskGraph::build`].
pub fn frame_graph(mut job_for: impl FnMut(Stage) -> Job) -> Result<TaskGraph, GraphError> {
    let mut spec = GraphSpec::new();
    let mut ids: Vec<(Stage, TaskId)> = Vec::with_capacity(Stage::ALL.len());
    for stage in Stage::ALL {
        let prerequisites: Vec<TaskId> = stage
            .prerequisites()
            .iter()
            .map(|prerequisite| {
                ids.iter()
                    .find(|(known, _)| known == prerequisite)
                    .map(|&(_, id)| id)
                    .expect("frame_graph: stages are listed after their prerequisites")
            })
            .collect();
        let id = spec.add_job_after(stage.to_string(), &prerequisites, job_for(stage))?;
        ids.push((stage, id));
    }
    TaskGraph::build(spec)
}

/// Error returned by [`spinning_frame_graph`].
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum FrameError {
    /// The scaled busy time of a stage is not a valid [`Duration`].
    #[error("cost scale {scale} gives stage {stage} an invalid busy time")]
    InvalidScale {
        /// The rejected multiplier.
        scale: f64,
        /// First stage whose scaled cost was invalid.
        stage: Stage,
    },
    /// The graph could not be built.
    #[error(transparent)]
    Graph(#[from] GraphError),
}

/// Frame graph whose stages spin for `scale` times their nominal cost.
///
/// # Errors
/// If `scale` is negative, not finite, or large enough to overflow a stage's
/// busy time. Otherwise see [`frame_graph`].
pub fn spinning_frame_graph(scale: f64) -> Result<TaskGraph, FrameError> {
    let mut costs = Vec::with_capacity(Stage::ALL.len());
    for stage in Stage::ALL {
        let cost = Duration::try_from_secs_f64(stage.nominal_cost().as_secs_f64() * scale)
            .map_err(|_| FrameError::InvalidScale { scale, stage })?;
        costs.push((stage, cost));
    }
    let graph = frame_graph(|stage| {
        let cost = costs
            .iter()
            .find(|&&(known, _)| known == stage)
            .map_or(Duration::ZERO, |&(_, cost)| cost);
        Box::new(spin_for(cost))
    })?;
    Ok(graph)
}

/// Placeholder job that keeps a core busy for `duration`.
#[must_use]
pub fn spin_for(duration: Duration) -> impl Fn() -> TaskResult + Send + Sync + 'static {
    move || {
        let started = Instant::now();
        while started.elapsed() < duration {
            hint::spin_loop();
        }
        Ok(())
    }
}

#[cfg(all(test, not(feature = "loom")))]
mod tests {
    use super::*;

    #[test]
    fn graph_mirrors_the_stage_table() {
        let graph = frame_graph(|_| Box::new(|| Ok(()))).unwrap();
        assert_eq!(graph.len(), Stage::ALL.len());
        for (stage, id) in Stage::ALL.into_iter().zip(graph.task_ids()) {
            assert_eq!(graph.name(id), stage.to_string());
            assert_eq!(graph.prerequisite_count(id) as usize, stage.prerequisites().len());
        }
        // Rendering and Sound are the only terminal stages.
        assert_eq!(graph.prerequisite_count(graph.barrier()), 2);
    }

    #[test]
    fn out_of_range_scales_are_rejected() {
        for scale in [-1.0, f64::NAN, f64::INFINITY, 1e30] {
            assert!(
                matches!(
                    spinning_frame_graph(scale),
                    Err(FrameError::InvalidScale { stage: Stage::Input, .. })
                ),
                "scale {scale}"
            );
        }
        assert_eq!(spinning_frame_graph(0.0).unwrap().len(), Stage::ALL.len());
    }

    #[test]
    fn spin_for_takes_at_least_its_duration() {
        let job = spin_for(Duration::from_millis(2));
        let started = Instant::now();
        job().unwrap();
        assert!(started.elapsed() >= Duration::from_millis(2));
    }
}
