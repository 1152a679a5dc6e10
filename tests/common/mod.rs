#![allow(dead_code)]

use jobgraph::task::TaskResult;
use std::sync::{
    Arc, Mutex,
    atomic::{AtomicUsize, Ordering},
};

/// Logical clock plus, per task, the `(start, end)` stamps of every run.
#[derive(Debug, Default)]
pub struct Recorder {
    clock: AtomicUsize,
    spans: Vec<Mutex<Vec<(usize, usize)>>>,
}

impl Recorder {
    pub fn new(tasks: usize) -> Arc<Self> {
        Arc::new(Self {
            clock: AtomicUsize::new(0),
            spans: (0..tasks).map(|_| Mutex::new(Vec::new())).collect(),
        })
    }

    /// Job for task slot `index` that stamps its start and end.
    pub fn job(self: &Arc<Self>, index: usize) -> impl Fn() -> TaskResult + Send + Sync + 'static {
        let recorder = Arc::clone(self);
        move || {
            let start = recorder.clock.fetch_add(1, Ordering::SeqCst);
            let end = recorder.clock.fetch_add(1, Ordering::SeqCst);
            recorder.spans[index].lock().unwrap().push((start, end));
            Ok(())
        }
    }

    pub fn runs(&self, index: usize) -> Vec<(usize, usize)> {
        self.spans[index].lock().unwrap().clone()
    }

    /// Panics unless every task ran `cycles` times and, within each cycle,
    /// every prerequisite ended before its dependent started.
    pub fn assert_causal(&self, edges: &[(usize, usize)], cycles: usize) {
        for index in 0..self.spans.len() {
            assert_eq!(self.runs(index).len(), cycles, "task {index} run count");
        }
        for &(prerequisite, task) in edges {
            let before = self.runs(prerequisite);
            let after = self.runs(task);
            for cycle in 0..cycles {
                assert!(
                    before[cycle].1 < after[cycle].0,
                    "cycle {cycle}: task {task} started before prerequisite {prerequisite} ended"
                );
            }
        }
    }
}
