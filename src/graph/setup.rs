use crate::{
    graph::{OutcomeSlot, PrereqSlot, TaskGraph, TaskLayout},
    task::{Job, TaskResult},
    types::{HashMap, IndexSet, TaskId},
};
use derive_more::Debug;
use std::collections::VecDeque;
use thiserror::Error;
use unzip3::Unzip3;

/// Name given to the barrier task appended by [`TaskGraph::build`].
const BARRIER_NAME: &str = "<barrier>";

/// Error kind for graph construction failures.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum GraphError {
    /// An id that was not issued by this specification was referenced.
    #[error("task {0} is not part of this graph")]
    UnknownTask(TaskId),
    /// A task was registered as its own prerequisite.
    #[error("task `{name}` depends on itself")]
    SelfDependency {
        /// Name of the offending task.
        name: String,
    },
    /// Two tasks were registered under the same name.
    #[error("task name `{0}` is used more than once")]
    DuplicateName(String),
    /// The specification has more tasks than ids can address.
    #[error("graph exceeds the maximum of {max} tasks")]
    TooManyTasks {
        /// Largest accepted number of tasks.
        max: usize,
    },
    /// The dependency graph contains cycle(s).
    #[error("graph contains cycle(s); unresolved tasks: {}", tasks.join(", "))]
    Cycle {
        /// Tasks that could not be ordered: members of a cycle and everything
        /// downstream of one.
        tasks: Vec<String>,
    },
}

#[derive(Debug)]
struct TaskSpec {
    name: String,
    #[debug(skip)]
    job: Job,
    prerequisites: IndexSet<TaskId>,
}

/// Dependency specification for one graph.
///
/// Tasks are added with a name and a job; dependencies are registered between
/// ids this specification issued. Forward references are allowed through
/// [`add_dependency`](Self::add_dependency), so the graph spec itself may
/// contain cycles; [`TaskGraph::build`] rejects them.
#[derive(Debug, Default)]
pub struct GraphSpec {
    tasks: Vec<TaskSpec>,
    names: HashMap<String, TaskId>,
}

impl GraphSpec {
    /// Largest number of tasks a specification may hold. One id is reserved
    /// for the barrier.
    pub const MAX_TASKS: usize = u32::MAX as usize - 1;

    /// Create an empty specification.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of tasks added so far.
    #[must_use]
    pub fn len(&self) -> usize {
        self.tasks.len()
    }

    /// Whether no task has been added.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }

    /// Id of the task registered under `name`.
    #[must_use]
    pub fn id_of(&self, name: &str) -> Option<TaskId> {
        self.names.get(name).copied()
    }

    /// Add a task without prerequisites.
    ///
    /// # Errors
    /// If the name is taken or the graph spec is full.
    pub fn add_task<F>(&mut self, name: impl Into<String>, job: F) -> Result<TaskId, GraphError>
    where
        F: Fn() -> TaskResult + Send + Sync + 'static,
    {
        self.add_job_after(name, &[], Box::new(job))
    }

    /// Add a task that runs only after every task in `prerequisites`.
    ///
    /// # Errors
    /// If a prerequisite is unknown, the name is taken or the graph spec
    /// is full. Nothing is added on error.
    pub fn add_task_after<F>(
        &mut self,
        name: impl Into<String>,
        prerequisites: &[TaskId],
        job: F,
    ) -> Result<TaskId, GraphError>
    where
        F: Fn() -> TaskResult + Send + Sync + 'static,
    {
        self.add_job_after(name, prerequisites, Box::new(job))
    }

    /// [`add_task_after`](Self::add_task_after) for a job that is already
    /// boxed.
    ///
    /// # Errors
    /// See [`add_task_after`](Self::add_task_after).
    pub fn add_job_after(
        &mut self,
        name: impl Into<String>,
        prerequisites: &[TaskId],
        job: Job,
    ) -> Result<TaskId, GraphError> {
        let name = name.into();
        for &prerequisite in prerequisites {
            self.check(prerequisite)?;
        }
        if self.names.contains_key(&name) {
            return Err(GraphError::DuplicateName(name));
        }
        let too_many = || GraphError::TooManyTasks {
            max: Self::MAX_TASKS,
        };
        if self.tasks.len() >= Self::MAX_TASKS {
            return Err(too_many());
        }
        let id = TaskId(self.tasks.len().try_into().map_err(|_| too_many())?);
        self.names.insert(name.clone(), id);
        self.tasks.push(TaskSpec {
            name,
            job,
            prerequisites: prerequisites.iter().copied().collect(),
        });
        Ok(id)
    }

    /// Register `prerequisite` as something `task` has to wait for.
    ///
    /// Registering the same edge twice has no further effect.
    ///
    /// # Errors
    /// If either id is unknown or both are the same task.
    pub fn add_dependency(&mut self, task: TaskId, prerequisite: TaskId) -> Result<(), GraphError> {
        self.check(task)?;
        self.check(prerequisite)?;
        if task == prerequisite {
            return Err(GraphError::SelfDependency {
                name: self.tasks[task.index()].name.clone(),
            });
        }
        self.tasks[task.index()].prerequisites.insert(prerequisite);
        Ok(())
    }

    fn check(&self, id: TaskId) -> Result<(), GraphError> {
        if id.index() < self.tasks.len() {
            Ok(())
        } else {
            Err(GraphError::UnknownTask(id))
        }
    }
}

impl TaskGraph {
    /// Validate a specification and lay it out as an executable graph.
    ///
    /// - Registers every task as a dependent of each of its prerequisites,
    /// - Orders the tasks topologically with Kahn's algorithm, failing if some
    ///   of them can never become ready,
    /// - Appends the barrier task, depending on every terminal task,
    /// - Materializes layout, counter and outcome slots in insertion order.
    ///
    /// # Errors
    /// If the graph spec contains cycle(s).
    ///
    /// # Panics
    /// In case of internal invariant violations. Impossible if there are no
    /// bugs in the code.
    pub fn build(spec: GraphSpec) -> Result<Self, GraphError> {
        let GraphSpec { tasks, names: _ } = spec;
        let barrier = u32::try_from(tasks.len()).expect("TaskGraph::build: [1]");

        // Phase 1: invert prerequisite lists into dependent lists. Dependents
        // are recorded in insertion order of the dependent task.
        let mut dependents = vec![Vec::<u32>::new(); tasks.len() + 1];
        for (idx, task) in tasks.iter().enumerate() {
            let idx = u32::try_from(idx).expect("TaskGraph::build: [2]");
            for prerequisite in &task.prerequisites {
                dependents[prerequisite.index()].push(idx);
            }
        }

        // Phase 2: Kahn's algorithm. A task enters the order once all of its
        // prerequisites have; whatever is left over sits on or behind a cycle.
        let mut in_degree: Vec<usize> = tasks.iter().map(|task| task.prerequisites.len()).collect();
        let mut ready: VecDeque<u32> = (0..barrier)
            .filter(|&idx| in_degree[idx as usize] == 0)
            .collect();
        let mut topo_order = Vec::with_capacity(tasks.len() + 1);
        while let Some(idx) = ready.pop_front() {
            topo_order.push(idx);
            for &dependent in &dependents[idx as usize] {
                let degree = &mut in_degree[dependent as usize];
                *degree = degree.checked_sub(1).expect("TaskGraph::build: [3]");
                if *degree == 0 {
                    ready.push_back(dependent);
                }
            }
        }
        if topo_order.len() != tasks.len() {
            let tasks = tasks
                .iter()
                .zip(&in_degree)
                .filter(|(_, degree)| **degree > 0)
                .map(|(task, _)| task.name.clone())
                .collect();
            return Err(GraphError::Cycle { tasks });
        }

        // Phase 3: the barrier waits for every terminal task. With an empty
        // specification it has no prerequisites and is ready immediately.
        let mut barrier_prerequisites = 0_u32;
        for task_dependents in &mut dependents[..tasks.len()] {
            if task_dependents.is_empty() {
                task_dependents.push(barrier);
                barrier_prerequisites += 1;
            }
        }
        topo_order.push(barrier);

        // Phase 4: materialize the arena. The barrier occupies the last slot.
        let barrier_layout = (
            TaskLayout {
                name: BARRIER_NAME.to_owned(),
                job: None,
                dependents: Vec::new(),
            },
            PrereqSlot::new(barrier_prerequisites),
            OutcomeSlot::new(),
        );
        let (task_slots, prerequisite_slots, outcome_slots): (Vec<_>, Vec<_>, Vec<_>) = tasks
            .into_iter()
            .zip(dependents)
            .map(|(task, dependents)| {
                let TaskSpec {
                    name,
                    job,
                    prerequisites,
                } = task;
                let total = u32::try_from(prerequisites.len()).expect("TaskGraph::build: [4]");
                (
                    TaskLayout {
                        name,
                        job: Some(job),
                        dependents,
                    },
                    PrereqSlot::new(total),
                    OutcomeSlot::new(),
                )
            })
            .chain(std::iter::once(barrier_layout))
            .unzip3();

        let result = Self {
            tasks: task_slots,
            prerequisites: prerequisite_slots,
            outcomes: outcome_slots,
            topo_order,
            barrier,
        };
        assert_eq!(
            result.tasks.len(),
            result.prerequisites.len(),
            "TaskGraph::build: [5]"
        );
        assert_eq!(
            result.tasks.len(),
            result.outcomes.len(),
            "TaskGraph::build: [6]"
        );
        assert_eq!(
            result.tasks.len(),
            result.topo_order.len(),
            "TaskGraph::build: [7]"
        );
        Ok(result)
    }
}

#[cfg(all(test, not(feature = "loom")))]
mod tests {
    use super::*;

    fn ok() -> TaskResult {
        Ok(())
    }

    #[test]
    fn two_node_cycle_is_rejected() {
        let mut spec = GraphSpec::new();
        let a = spec.add_task("a", ok).unwrap();
        let b = spec.add_task_after("b", &[a], ok).unwrap();
        spec.add_dependency(a, b).unwrap();
        let err = TaskGraph::build(spec).unwrap_err();
        assert_eq!(
            err,
            GraphError::Cycle {
                tasks: vec!["a".into(), "b".into()]
            }
        );
    }

    #[test]
    fn cycle_reports_downstream_tasks_but_not_upstream_ones() {
        //  root -> x <-> y -> tail
        let mut spec = GraphSpec::new();
        let root = spec.add_task("root", ok).unwrap();
        let x = spec.add_task_after("x", &[root], ok).unwrap();
        let y = spec.add_task_after("y", &[x], ok).unwrap();
        spec.add_task_after("tail", &[y], ok).unwrap();
        spec.add_dependency(x, y).unwrap();
        let GraphError::Cycle { tasks } = TaskGraph::build(spec).unwrap_err() else {
            panic!("expected a cycle error");
        };
        assert_eq!(tasks, ["x", "y", "tail"]);
    }

    #[test]
    fn construction_errors_are_reported_eagerly() {
        let mut spec = GraphSpec::new();
        let a = spec.add_task("a", ok).unwrap();
        assert_eq!(
            spec.add_task("a", ok).unwrap_err(),
            GraphError::DuplicateName("a".into())
        );
        assert_eq!(
            spec.add_dependency(a, a).unwrap_err(),
            GraphError::SelfDependency { name: "a".into() }
        );
        assert_eq!(
            spec.add_task_after("b", &[TaskId(9)], ok).unwrap_err(),
            GraphError::UnknownTask(TaskId(9))
        );
        assert_eq!(spec.len(), 1, "failed additions must not leave tasks behind");
        assert_eq!(spec.id_of("a"), Some(a));
        assert_eq!(spec.id_of("b"), None);
    }

    #[test]
    fn duplicate_edges_count_once() {
        let mut spec = GraphSpec::new();
        let a = spec.add_task("a", ok).unwrap();
        let b = spec.add_task_after("b", &[a, a], ok).unwrap();
        spec.add_dependency(b, a).unwrap();
        let graph = TaskGraph::build(spec).unwrap();
        assert_eq!(graph.prerequisite_count(b), 1);
        assert_eq!(graph.dependents(a).collect::<Vec<_>>(), [b]);
    }

    #[test]
    fn empty_spec_builds_a_lone_ready_barrier() {
        let graph = TaskGraph::build(GraphSpec::new()).unwrap();
        assert!(graph.is_empty());
        assert_eq!(graph.barrier(), TaskId(0));
        assert!(graph.is_ready(graph.barrier()));
    }

    #[test]
    fn forward_references_are_ordered_topologically() {
        let mut spec = GraphSpec::new();
        let late = spec.add_task("late", ok).unwrap();
        let early = spec.add_task("early", ok).unwrap();
        spec.add_dependency(late, early).unwrap();
        let graph = TaskGraph::build(spec).unwrap();
        let order: Vec<_> = graph.topological_order().collect();
        assert_eq!(order, [early, late, graph.barrier()]);
    }
}
