//! dfs-walker - Concurrent Work-Stealing Traversal Engine
//!
//! A scheduler that explores tree-shaped search spaces in parallel, with a
//! parallel find/grep/count front end for directory trees.
//!
//! # Features
//!
//! - **Work Stealing**: Each worker owns a deque; idle workers steal the
//!   oldest work from their peers, never below a configurable depth floor.
//!
//! - **Queue-Pressure Throttling**: Workers under load keep children on a
//!   private backlog instead of flooding their deque.
//!
//! - **Pluggable Heuristics**: Prune, goal, ordering, scoring, beam width
//!   and limited discrepancy, supplied as plain closures.
//!
//! - **Two-Stage Pipeline**: Optional evaluator pool so expensive per-node
//!   work (reading a file) does not stall expansion.
//!
//! - **Live Metrics**: Atomic counters sampled on an interval into a
//!   caller-supplied sink.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────┐
//! │                 SearchSpace (tree, filesystem)                   │
//! └─────────────────────────────┬───────────────────────────────────┘
//!                               │ expand / mark_visited
//!                               ▼
//! ┌─────────────────────────────────────────────────────────────────┐
//! │                      Worker Threads                              │
//! │  ┌─────────┐  ┌─────────┐  ┌─────────┐         ┌─────────┐     │
//! │  │Worker 0 │  │Worker 1 │  │Worker 2 │  ...    │Worker N │     │
//! │  │ deque   │◄─┤ deque   │◄─┤ deque   │         │ deque   │     │
//! │  └────┬────┘  └────┬────┘  └────┬────┘         └────┬────┘     │
//! │       └────────────┴─────┬──────┴────────────────────┘          │
//! │                          ▼                                      │
//! │            ┌──────────────────────────┐                         │
//! │            │  Evaluation queue        │  (two-stage only)       │
//! │            │  (crossbeam bounded)     │                         │
//! │            └────────────┬─────────────┘                         │
//! │                         ▼                                       │
//! │            ┌──────────────────────────┐                         │
//! │            │     Evaluator pool       │                         │
//! │            └──────────────────────────┘                         │
//! └─────────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Example
//!
//! ```no_run
//! use dfs_walker::tree::BinaryTree;
//! use dfs_walker::walker::{Context, Traversal};
//! use dfs_walker::Options;
//!
//! let tree = BinaryTree::balanced(1023);
//! let report = Traversal::new(&tree, Options::default())
//!     .visitor(|_node| Ok(()))
//!     .run(&Context::background(), 0)
//!     .unwrap();
//! assert_eq!(report.metrics.tasks_processed, 1023);
//! ```

pub mod config;
pub mod error;
pub mod fs;
pub mod progress;
pub mod tree;
pub mod walker;

pub use config::{CliArgs, Options, SearchConfig, SearchMode};
pub use error::{Result, TraverseError, WalkerError};
pub use fs::{FsWalker, SearchResult};
pub use walker::{Context, Heuristics, SearchSpace, Traversal, TraversalReport};
