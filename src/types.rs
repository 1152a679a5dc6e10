use derive_more::Display;
use indexmap::IndexSet as _IndexSet;
use rustc_hash::FxBuildHasher;
use std::collections::HashMap as _HashMap;

/// Identifier of a task inside one graph.
///
/// Ids are handed out by [`GraphSpec`](crate::graph::GraphSpec) in insertion
/// order and double as the task's index in the graph's arena, so they are
/// only meaningful for the graph they were issued for.
#[derive(Debug, Display, Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[display("#{_0}")]
#[repr(transparent)]
pub struct TaskId(pub(crate) u32);

impl TaskId {
    /// Position of the task in the graph's arena.
    #[must_use]
    pub const fn index(self) -> usize {
        self.0 as usize
    }
}

pub(crate) type HashMap<K, V> = _HashMap<K, V, FxBuildHasher>;
/// `IndexSet` type with fast hasher.
pub type IndexSet<T> = _IndexSet<T, FxBuildHasher>;
