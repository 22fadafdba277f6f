//! Queue-pressure governor
//!
//! Decides how many of a node's children go to the worker's shared deque,
//! where peers can steal them, and how many stay on the worker's private
//! backlog. Nothing the governor holds back is dropped; it only changes who
//! is allowed to run it.

use crate::config::Options;
use crate::walker::heuristics::Heuristics;

/// How much of an expansion to publish
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Publish {
    /// Every eligible child
    All,
    /// Only the highest-priority child
    FirstOnly,
}

/// Outcome of one governor check
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Decision {
    pub publish: Publish,

    /// The high watermark forced throttling
    pub queue_high_hit: bool,
}

/// Children split between the shared deque and the private backlog
#[derive(Debug, PartialEq, Eq)]
pub struct Split<N> {
    /// Published children, highest priority first
    pub published: Vec<N>,

    /// Children the expanding worker keeps, highest priority first
    pub retained: Vec<N>,

    /// How many of `retained` were held back for being too small
    pub coarsened: usize,
}

/// Per-traversal watermarks, read by every worker
#[derive(Debug, Clone, Copy)]
pub struct Governor {
    low: usize,
    high: usize,
    depth_threshold: usize,
    min_work: usize,
}

impl Governor {
    pub fn new(options: &Options) -> Self {
        Self {
            low: options.queue_pressure_low,
            high: options.queue_pressure_high,
            depth_threshold: options.depth_parallel_threshold,
            min_work: options.min_work_to_parallelize,
        }
    }

    /// Decide how much to publish for `children` at `depth` given the
    /// current local queue length
    pub fn decide(&self, queue_len: usize, depth: usize, children: usize) -> Decision {
        if queue_len >= self.high && children > 1 {
            return Decision {
                publish: Publish::FirstOnly,
                queue_high_hit: true,
            };
        }

        let publish = if queue_len <= self.low || depth >= self.depth_threshold {
            Publish::All
        } else {
            Publish::FirstOnly
        };
        Decision {
            publish,
            queue_high_hit: false,
        }
    }

    /// Split ordered children according to a decision
    ///
    /// The first child is always published. With an estimator and a positive
    /// `min_work`, later siblings below the threshold are retained.
    pub fn split<N>(&self, decision: Decision, children: Vec<N>, heuristics: &Heuristics<N>) -> Split<N> {
        let mut published = Vec::with_capacity(children.len());
        let mut retained = Vec::new();
        let mut coarsened = 0;
        let coarsen = self.min_work > 0 && heuristics.has_estimator();

        for (i, child) in children.into_iter().enumerate() {
            if i == 0 {
                published.push(child);
            } else if decision.publish == Publish::FirstOnly {
                retained.push(child);
            } else if coarsen && heuristics.estimate(&child).map_or(false, |w| w < self.min_work) {
                coarsened += 1;
                retained.push(child);
            } else {
                published.push(child);
            }
        }

        Split {
            published,
            retained,
            coarsened,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn governor(low: usize, high: usize, threshold: usize) -> Governor {
        Governor::new(&Options {
            queue_pressure_low: low,
            queue_pressure_high: high,
            depth_parallel_threshold: threshold,
            ..Options::default()
        })
    }

    #[test]
    fn test_high_watermark_throttles() {
        let g = governor(1, 2, 0);
        let d = g.decide(3, 10, 5);
        assert_eq!(d.publish, Publish::FirstOnly);
        assert!(d.queue_high_hit);

        let split = g.split(d, vec![1, 2, 3, 4, 5], &Heuristics::new());
        assert_eq!(split.published, vec![1]);
        assert_eq!(split.retained, vec![2, 3, 4, 5]);
        assert_eq!(split.coarsened, 0);
    }

    #[test]
    fn test_single_child_is_not_a_high_hit() {
        let g = governor(1, 2, 0);
        let d = g.decide(9, 0, 1);
        assert!(!d.queue_high_hit);
        assert_eq!(d.publish, Publish::All);
    }

    #[test]
    fn test_low_watermark_publishes_all() {
        let g = governor(2, 64, 12);
        assert_eq!(g.decide(0, 0, 2).publish, Publish::All);
        assert_eq!(g.decide(2, 0, 2).publish, Publish::All);
    }

    #[test]
    fn test_between_watermarks_uses_depth() {
        let g = governor(2, 64, 12);
        assert_eq!(g.decide(10, 3, 2).publish, Publish::FirstOnly);
        assert_eq!(g.decide(10, 12, 2).publish, Publish::All);
    }

    #[test]
    fn test_coarsening_retains_small_siblings() {
        let g = Governor::new(&Options {
            min_work_to_parallelize: 10,
            ..Options::default()
        });
        let h = Heuristics::<usize>::new().estimate_work(|n| *n);
        let d = g.decide(0, 0, 4);

        // The first child is published even when it is small
        let split = g.split(d, vec![1, 50, 3, 20], &h);
        assert_eq!(split.published, vec![1, 50, 20]);
        assert_eq!(split.retained, vec![3]);
        assert_eq!(split.coarsened, 1);

        // Without an estimator nothing is coarsened
        let split = g.split(d, vec![1, 50, 3], &Heuristics::new());
        assert_eq!(split.published, vec![1, 50, 3]);
        assert!(split.retained.is_empty());
    }
}
