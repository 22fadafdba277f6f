//! Per-worker task deque
//!
//! Each worker owns one deque. The owner pushes and pops at the top; peers
//! steal from the bottom. Every operation takes the deque's own lock for its
//! duration and none of them wait for work: an empty deque answers `None`
//! immediately.
//!
//! Steals honour a depth floor inside the critical section. Tasks shallower
//! than the floor stay where they are, in order, so work near the root keeps
//! its locality and is never lost.

use parking_lot::Mutex;
use std::collections::VecDeque;

/// A unit of work: a node and its depth in the traversal
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Task<N> {
    /// Node to process
    pub node: N,

    /// Depth from root (0 = root)
    pub depth: usize,
}

impl<N> Task<N> {
    /// Create a new task
    pub fn new(node: N, depth: usize) -> Self {
        Self { node, depth }
    }

    /// Create the root task
    pub fn root(node: N) -> Self {
        Self { node, depth: 0 }
    }

    /// Task for a child of this task's node
    pub fn child(&self, node: N) -> Self {
        Self {
            node,
            depth: self.depth + 1,
        }
    }
}

/// Lock-guarded double-ended task queue
#[derive(Debug)]
pub struct WorkDeque<N> {
    items: Mutex<VecDeque<Task<N>>>,
}

impl<N> Default for WorkDeque<N> {
    fn default() -> Self {
        Self::new()
    }
}

impl<N> WorkDeque<N> {
    /// Create an empty deque
    pub fn new() -> Self {
        Self {
            items: Mutex::new(VecDeque::with_capacity(64)),
        }
    }

    /// Push a task at the owner's end
    pub fn push(&self, task: Task<N>) {
        self.items.lock().push_back(task);
    }

    /// Push several tasks at the owner's end under one lock
    ///
    /// The last task pushed is the first one popped.
    pub fn push_all(&self, tasks: impl IntoIterator<Item = Task<N>>) {
        self.items.lock().extend(tasks);
    }

    /// Pop the most recently pushed task
    pub fn pop(&self) -> Option<Task<N>> {
        self.items.lock().pop_back()
    }

    /// Steal the oldest task at or below the depth floor
    pub fn steal(&self, min_depth: usize) -> Option<Task<N>> {
        let mut items = self.items.lock();
        let index = items.iter().position(|t| t.depth >= min_depth)?;
        items.remove(index)
    }

    /// Steal up to `k` of the oldest tasks at or below the depth floor
    ///
    /// Returns an empty vector when nothing qualifies. Stolen tasks keep
    /// their relative order, oldest first.
    pub fn steal_chunk(&self, k: usize, min_depth: usize) -> Vec<Task<N>> {
        if k <= 1 {
            return self.steal(min_depth).into_iter().collect();
        }

        let mut items = self.items.lock();
        if items.is_empty() {
            return Vec::new();
        }

        let mut stolen = Vec::with_capacity(k.min(items.len()));
        let mut kept = VecDeque::with_capacity(items.len());
        for task in items.drain(..) {
            if stolen.len() < k && task.depth >= min_depth {
                stolen.push(task);
            } else {
                kept.push_back(task);
            }
        }
        *items = kept;
        stolen
    }

    /// Current number of queued tasks
    pub fn len(&self) -> usize {
        self.items.lock().len()
    }

    /// Check if the deque is empty
    pub fn is_empty(&self) -> bool {
        self.items.lock().is_empty()
    }

    /// Drop every queued task, returning how many were discarded
    pub fn clear(&self) -> usize {
        let mut items = self.items.lock();
        let n = items.len();
        items.clear();
        n
    }
}
