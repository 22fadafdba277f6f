//! Pluggable search heuristics
//!
//! Every callback is optional and must be safe to call from any worker at the
//! same time. The engine never serializes calls.

use crate::walker::metrics::Metrics;
use std::cmp::Ordering;
use std::fmt;

/// Reorder a parent's surviving children, highest priority first
pub type OrderFn<N> = Box<dyn Fn(&N, Vec<N>) -> Vec<N> + Send + Sync>;

/// Pairwise child comparison, `Less` sorts first
pub type CompareFn<N> = Box<dyn Fn(&N, &N) -> Ordering + Send + Sync>;

/// Child score, higher is explored first
pub type ScoreFn<N> = Box<dyn Fn(&N) -> f64 + Send + Sync>;

/// Node predicate (goal and prune tests)
pub type PredicateFn<N> = Box<dyn Fn(&N) -> bool + Send + Sync>;

/// Estimated amount of work below a node
pub type EstimateFn<N> = Box<dyn Fn(&N) -> usize + Send + Sync>;

/// Bundle of caller-supplied heuristics
pub struct Heuristics<N> {
    order_children: Option<OrderFn<N>>,
    compare_children: Option<CompareFn<N>>,
    score: Option<ScoreFn<N>>,
    goal: Option<PredicateFn<N>>,
    prune: Option<PredicateFn<N>>,
    estimate_work: Option<EstimateFn<N>>,
    beam_width: usize,
    limited_discrepancy: usize,
}

impl<N> Default for Heuristics<N> {
    fn default() -> Self {
        Self {
            order_children: None,
            compare_children: None,
            score: None,
            goal: None,
            prune: None,
            estimate_work: None,
            beam_width: 0,
            limited_discrepancy: 0,
        }
    }
}

impl<N> fmt::Debug for Heuristics<N> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Heuristics")
            .field("order_children", &self.order_children.is_some())
            .field("compare_children", &self.compare_children.is_some())
            .field("score", &self.score.is_some())
            .field("goal", &self.goal.is_some())
            .field("prune", &self.prune.is_some())
            .field("estimate_work", &self.estimate_work.is_some())
            .field("beam_width", &self.beam_width)
            .field("limited_discrepancy", &self.limited_discrepancy)
            .finish()
    }
}

impl<N> Heuristics<N> {
    /// No heuristics: every child is kept in expansion order
    pub fn new() -> Self {
        Self::default()
    }

    pub fn order_children(mut self, f: impl Fn(&N, Vec<N>) -> Vec<N> + Send + Sync + 'static) -> Self {
        self.order_children = Some(Box::new(f));
        self
    }

    pub fn compare_children(mut self, f: impl Fn(&N, &N) -> Ordering + Send + Sync + 'static) -> Self {
        self.compare_children = Some(Box::new(f));
        self
    }

    pub fn score(mut self, f: impl Fn(&N) -> f64 + Send + Sync + 'static) -> Self {
        self.score = Some(Box::new(f));
        self
    }

    pub fn goal(mut self, f: impl Fn(&N) -> bool + Send + Sync + 'static) -> Self {
        self.goal = Some(Box::new(f));
        self
    }

    pub fn prune(mut self, f: impl Fn(&N) -> bool + Send + Sync + 'static) -> Self {
        self.prune = Some(Box::new(f));
        self
    }

    pub fn estimate_work(mut self, f: impl Fn(&N) -> usize + Send + Sync + 'static) -> Self {
        self.estimate_work = Some(Box::new(f));
        self
    }

    /// Keep at most `width` children per expansion (0 = unlimited)
    pub fn beam_width(mut self, width: usize) -> Self {
        self.beam_width = width;
        self
    }

    /// Allow this many lower-ranked children past the beam
    pub fn limited_discrepancy(mut self, extra: usize) -> Self {
        self.limited_discrepancy = extra;
        self
    }

    /// Check whether a node satisfies the goal test
    pub fn is_goal(&self, node: &N) -> bool {
        self.goal.as_ref().map_or(false, |f| f(node))
    }

    /// Work estimate for a node, if an estimator was supplied
    pub fn estimate(&self, node: &N) -> Option<usize> {
        self.estimate_work.as_ref().map(|f| f(node))
    }

    pub fn has_estimator(&self) -> bool {
        self.estimate_work.is_some()
    }

    /// Maximum number of children kept per expansion, if capped
    pub fn child_limit(&self) -> Option<usize> {
        (self.beam_width > 0).then(|| self.beam_width.saturating_add(self.limited_discrepancy))
    }

    /// Prune, order and cap a node's children
    ///
    /// Ordering uses the first available of `order_children`,
    /// `compare_children` and descending `score`; without any of them the
    /// expansion order is kept.
    pub fn select(&self, parent: &N, mut children: Vec<N>, metrics: &Metrics) -> Vec<N> {
        if let Some(prune) = &self.prune {
            let before = children.len();
            children.retain(|c| !prune(c));
            Metrics::add(&metrics.pruned, (before - children.len()) as u64);
        }

        if children.len() > 1 {
            if let Some(order) = &self.order_children {
                children = order(parent, children);
            } else if let Some(cmp) = &self.compare_children {
                children.sort_by(|a, b| cmp(a, b));
            } else if let Some(score) = &self.score {
                let mut scored: Vec<(f64, N)> = children.into_iter().map(|c| (score(&c), c)).collect();
                scored.sort_by(|a, b| b.0.total_cmp(&a.0));
                children = scored.into_iter().map(|(_, c)| c).collect();
            }
        }

        if let Some(limit) = self.child_limit() {
            if children.len() > limit {
                Metrics::add(&metrics.beam_cut, (children.len() - limit) as u64);
                children.truncate(limit);
            }
        }

        children
    }
}
