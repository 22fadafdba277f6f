//! In-memory binary tree used to exercise the scheduler
//!
//! Nodes live in a contiguous arena and link to their children by index, so
//! workers on different threads share the tree without any ownership
//! ambiguity. Each node carries an atomic visited flag that the engine's
//! idempotency guard flips exactly once per run.

use crate::error::{ConfigError, ExpandError};
use crate::walker::SearchSpace;
use rand::rngs::SmallRng;
use rand::{Rng, SeedableRng};
use std::sync::atomic::{AtomicBool, Ordering};

/// Index of a node in the arena
pub type NodeId = usize;

/// Shape of a generated tree
#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum TreeShape {
    /// Complete binary tree filled level by level
    Balanced,
    /// Keys `0..n` inserted in order
    Sequential,
    /// Random keys in `0..n*10`
    Random,
}

/// A single arena node
#[derive(Debug)]
pub struct TreeNode {
    key: i64,
    left: Option<NodeId>,
    right: Option<NodeId>,
    depth: u32,
    subtree_size: u32,
    visited: AtomicBool,
}

impl TreeNode {
    fn new(key: i64, depth: u32) -> Self {
        Self {
            key,
            left: None,
            right: None,
            depth,
            subtree_size: 1,
            visited: AtomicBool::new(false),
        }
    }
}

/// Arena-backed binary tree
#[derive(Debug, Default)]
pub struct BinaryTree {
    nodes: Vec<TreeNode>,
    root: Option<NodeId>,
}

impl BinaryTree {
    /// Create an empty tree
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a tree of `size` nodes with the given shape
    pub fn generate(shape: TreeShape, size: usize, seed: u64) -> Self {
        match shape {
            TreeShape::Balanced => Self::balanced(size),
            TreeShape::Sequential => Self::sequential(size),
            TreeShape::Random => Self::random(size, seed),
        }
    }

    /// Complete binary tree: node `i` has children `2i+1` and `2i+2`
    pub fn balanced(size: usize) -> Self {
        let mut nodes = Vec::with_capacity(size);
        for i in 0..size {
            let depth = usize::BITS - (i + 1).leading_zeros() - 1;
            let mut node = TreeNode::new(i as i64, depth);
            node.left = Some(2 * i + 1).filter(|&c| c < size);
            node.right = Some(2 * i + 2).filter(|&c| c < size);
            nodes.push(node);
        }

        let mut tree = Self {
            root: if size > 0 { Some(0) } else { None },
            nodes,
        };
        tree.compute_subtree_sizes();
        tree
    }

    /// Insert keys `0..size` in order
    pub fn sequential(size: usize) -> Self {
        let mut tree = Self::new();
        for key in 0..size {
            tree.insert(key as i64);
        }
        tree.compute_subtree_sizes();
        tree
    }

    /// Insert `size` random keys drawn from `0..size*10`
    pub fn random(size: usize, seed: u64) -> Self {
        let mut rng = SmallRng::seed_from_u64(seed.wrapping_add(size as u64));
        let upper = (size as i64 * 10).max(1);
        let mut tree = Self::new();
        for _ in 0..size {
            tree.insert(rng.random_range(0..upper));
        }
        tree.compute_subtree_sizes();
        tree
    }

    /// Insert a key
    ///
    /// Free child slots fill left then right. Once both are taken, even keys
    /// go under an even left child and odd keys under an odd right child when
    /// that child has room; otherwise the key descends into the opposite
    /// subtree.
    pub fn insert(&mut self, key: i64) {
        let Some(mut current) = self.root else {
            self.nodes.push(TreeNode::new(key, 0));
            self.root = Some(self.nodes.len() - 1);
            return;
        };

        loop {
            let depth = self.nodes[current].depth;
            let (left, right) = match (self.nodes[current].left, self.nodes[current].right) {
                (Some(l), Some(r)) => (l, r),
                (left, _) => {
                    let id = self.push_node(key, depth + 1);
                    if left.is_none() {
                        self.nodes[current].left = Some(id);
                    } else {
                        self.nodes[current].right = Some(id);
                    }
                    return;
                }
            };

            let (near, far) = if key % 2 == 0 { (left, right) } else { (right, left) };
            let near_parity_ok = (self.nodes[near].key % 2 == 0) == (key % 2 == 0);

            if near_parity_ok && self.nodes[near].left.is_none() {
                let id = self.push_node(key, depth + 2);
                self.nodes[near].left = Some(id);
                return;
            }
            if near_parity_ok && self.nodes[near].right.is_none() {
                let id = self.push_node(key, depth + 2);
                self.nodes[near].right = Some(id);
                return;
            }
            current = far;
        }
    }

    fn push_node(&mut self, key: i64, depth: u32) -> NodeId {
        self.nodes.push(TreeNode::new(key, depth));
        self.nodes.len() - 1
    }

    /// Recalculate cached subtree sizes bottom-up; returns the root's size
    pub fn compute_subtree_sizes(&mut self) -> usize {
        let Some(root) = self.root else {
            return 0;
        };

        // Post-order without recursion: skewed trees can be very deep.
        let mut order = Vec::with_capacity(self.nodes.len());
        let mut stack = vec![root];
        while let Some(id) = stack.pop() {
            order.push(id);
            stack.extend(self.nodes[id].left);
            stack.extend(self.nodes[id].right);
        }
        for &id in order.iter().rev() {
            let node = &self.nodes[id];
            let size = 1
                + node.left.map_or(0, |c| self.nodes[c].subtree_size)
                + node.right.map_or(0, |c| self.nodes[c].subtree_size);
            self.nodes[id].subtree_size = size;
        }
        self.nodes[root].subtree_size as usize
    }

    /// Root node, if any
    pub fn root(&self) -> Option<NodeId> {
        self.root
    }

    /// Number of nodes
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    /// Check if the tree is empty
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Key of a node
    pub fn key(&self, id: NodeId) -> i64 {
        self.nodes[id].key
    }

    /// Depth of a node (root = 0)
    pub fn depth(&self, id: NodeId) -> usize {
        self.nodes[id].depth as usize
    }

    /// Cached subtree size including the node itself
    pub fn subtree_size(&self, id: NodeId) -> usize {
        self.nodes[id].subtree_size as usize
    }

    /// Children of a node, left first
    pub fn children(&self, id: NodeId) -> Vec<NodeId> {
        let node = &self.nodes[id];
        node.left.into_iter().chain(node.right).collect()
    }

    /// Deepest node depth
    pub fn max_depth(&self) -> usize {
        self.nodes.iter().map(|n| n.depth as usize).max().unwrap_or(0)
    }

    /// Check whether a node has been visited in the current run
    pub fn is_visited(&self, id: NodeId) -> bool {
        self.nodes[id].visited.load(Ordering::Acquire)
    }

    /// Number of nodes visited in the current run
    pub fn visited_count(&self) -> usize {
        self.nodes
            .iter()
            .filter(|n| n.visited.load(Ordering::Acquire))
            .count()
    }

    /// Clear visited flags before another run
    pub fn reset_visited(&self) {
        for node in &self.nodes {
            node.visited.store(false, Ordering::Release);
        }
    }
}

impl SearchSpace for BinaryTree {
    type Node = NodeId;

    fn expand(&self, node: &NodeId, _depth: usize) -> Result<Vec<NodeId>, ExpandError> {
        Ok(self.children(*node))
    }

    fn mark_visited(&self, node: &NodeId) -> bool {
        self.nodes[*node]
            .visited
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }

    fn label(&self, node: &NodeId) -> String {
        match self.nodes.get(*node) {
            Some(n) => format!("node {} (key {})", node, n.key),
            None => format!("node {}", node),
        }
    }

    fn check_root(&self, root: &NodeId) -> Result<(), ConfigError> {
        if *root < self.nodes.len() {
            return Ok(());
        }
        Err(ConfigError::UnknownRoot {
            root: root.to_string(),
            reason: format!("tree has {} nodes", self.nodes.len()),
        })
    }
}
