//! Work-stealing traversal engine
//!
//! Explores a tree-shaped search space with a fixed pool of worker threads.
//! Each worker owns a deque; when it runs dry it steals from its peers, and
//! when nothing can be stolen it backs off briefly.
//!
//! # Architecture
//!
//! ```text
//!                     ┌─────────────────────────┐
//!                     │       Traversal         │
//!                     │  - seeds worker 0       │
//!                     │  - watches ctx/deadline │
//!                     │  - samples metrics      │
//!                     └───────────┬─────────────┘
//!                                 │
//!       ┌─────────────────────────┼─────────────────────────┐
//!       │                         │                         │
//! ┌─────▼─────┐  steal      ┌─────▼─────┐  steal      ┌─────▼─────┐
//! │  Worker 0 │◄───────────►│  Worker 1 │◄───────────►│  Worker N │
//! │  deque    │             │  deque    │             │  deque    │
//! │  backlog  │             │  backlog  │             │  backlog  │
//! └─────┬─────┘             └─────┬─────┘             └─────┬─────┘
//!       │     (two-stage mode)    │                         │
//!       └─────────────────────────┼─────────────────────────┘
//!                           ┌─────▼─────┐
//!                           │ Evaluators│
//!                           └───────────┘
//! ```
//!
//! Termination uses a single outstanding-task counter: children are counted
//! before their parent completes, and whichever worker takes the counter to
//! zero broadcasts completion.

pub mod cancel;
pub mod coordinator;
pub mod governor;
pub mod heuristics;
pub mod metrics;
pub mod pipeline;
pub mod queue;
pub mod serial;
pub mod worker;

pub use cancel::{CancelReason, CancelToken, Context};
pub use coordinator::{traverse, Traversal, TraversalReport, Visitor};
pub use governor::{Decision, Governor, Publish, Split};
pub use heuristics::Heuristics;
pub use metrics::{Metrics, MetricsSink, MetricsSnapshot};
pub use queue::{Task, WorkDeque};
pub use serial::{serial_traverse, SerialStats};

use crate::error::{ConfigError, ExpandError};

/// A search space the engine can traverse
///
/// Implementations must be shareable across worker threads. `mark_visited`
/// is the idempotency guard: it returns true exactly once per node per run.
pub trait SearchSpace: Sync {
    /// Node handle passed between workers
    type Node: Clone + Send + Sync;

    /// Enumerate the children of `node`, which sits at `depth`
    fn expand(&self, node: &Self::Node, depth: usize) -> Result<Vec<Self::Node>, ExpandError>;

    /// Claim a node for processing
    fn mark_visited(&self, node: &Self::Node) -> bool;

    /// Human-readable label used in logs and error messages
    fn label(&self, node: &Self::Node) -> String;

    /// Nodes that can never have children
    ///
    /// Leaf children stay on the expanding worker and never count toward its
    /// queue length, so queue pressure measures only expandable work.
    fn is_leaf(&self, _node: &Self::Node) -> bool {
        false
    }

    /// Reject a root the space cannot start from; checked before any
    /// thread starts
    fn check_root(&self, _root: &Self::Node) -> Result<(), ConfigError> {
        Ok(())
    }
}
