//! Single-threaded reference traversal
//!
//! Plain depth-first walk with an explicit stack. No heuristics, no
//! governor, no stealing. Used to check the parallel engine's results and
//! as the baseline in benchmarks.

use crate::error::BoxError;
use crate::walker::SearchSpace;

/// Totals from a serial walk
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SerialStats {
    pub visited: u64,
    pub duplicates: u64,
    pub errors: Vec<String>,
}

/// Depth-first traversal on the calling thread
///
/// Stops at the first visitor error.
pub fn serial_traverse<S, F>(space: &S, root: S::Node, mut visitor: F) -> Result<SerialStats, BoxError>
where
    S: SearchSpace,
    F: FnMut(&S::Node) -> Result<(), BoxError>,
{
    let mut stats = SerialStats::default();
    let mut stack = vec![(root, 0usize)];

    while let Some((node, depth)) = stack.pop() {
        if !space.mark_visited(&node) {
            stats.duplicates += 1;
            continue;
        }
        visitor(&node)?;
        stats.visited += 1;

        match space.expand(&node, depth) {
            Ok(children) => stack.extend(children.into_iter().rev().map(|c| (c, depth + 1))),
            Err(e) => stats.errors.push(e.to_string()),
        }
    }

    Ok(stats)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tree::BinaryTree;

    #[test]
    fn test_preorder_on_balanced_tree() {
        let tree = BinaryTree::balanced(7);
        let mut order = Vec::new();
        let stats = serial_traverse(&tree, 0, |n| {
            order.push(*n);
            Ok(())
        })
        .unwrap();

        assert_eq!(order, vec![0, 1, 3, 4, 2, 5, 6]);
        assert_eq!(stats.visited, 7);
        assert_eq!(stats.duplicates, 0);
    }

    #[test]
    fn test_stops_on_visitor_error() {
        let tree = BinaryTree::balanced(7);
        let err = serial_traverse(&tree, 0, |n| {
            if *n == 3 {
                Err("boom".into())
            } else {
                Ok(())
            }
        })
        .unwrap_err();
        assert_eq!(err.to_string(), "boom");
    }
}
