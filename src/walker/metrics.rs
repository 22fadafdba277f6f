//! Scheduler metrics
//!
//! Counters are plain atomics updated with relaxed ordering on the hot path.
//! A snapshot reads each counter once, so fields are individually accurate
//! but not guaranteed to be mutually consistent while a run is in flight.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

/// Callback receiving point-in-time metrics
pub type MetricsSink = Arc<dyn Fn(&MetricsSnapshot) + Send + Sync>;

/// Live counters shared by every worker of one traversal
#[derive(Debug)]
pub struct Metrics {
    /// Tasks fully processed (visited and expanded)
    pub tasks_processed: AtomicU64,

    /// Child tasks created
    pub pushes: AtomicU64,

    /// Tasks taken by their owner, deque or private backlog
    pub pops: AtomicU64,

    /// Tasks moved between workers
    pub steals: AtomicU64,

    /// Successful chunked steals
    pub steal_chunks: AtomicU64,

    /// Expansions throttled by the high watermark
    pub queue_high_hits: AtomicU64,

    /// Largest local deque length observed
    pub queue_len_max: AtomicU64,

    /// Idle backoff rounds
    pub idle_yields: AtomicU64,

    /// Child tasks kept on the expanding worker instead of its deque
    pub inline_tasks: AtomicU64,

    /// Tasks discarded because their node was already visited
    pub duplicates: AtomicU64,

    /// Children removed by the prune heuristic
    pub pruned: AtomicU64,

    /// Children cut by beam width
    pub beam_cut: AtomicU64,

    /// Siblings kept local because their estimated work was too small
    pub coarsened: AtomicU64,

    /// Nodes whose expansion failed
    pub expand_errors: AtomicU64,

    /// Visitor calls made by the evaluator pool
    pub evaluations: AtomicU64,

    /// Dispatched evaluations dropped after an abort
    pub evaluations_skipped: AtomicU64,

    /// Shallowest depth ever stolen (`u64::MAX` if nothing was stolen)
    pub min_stolen_depth: AtomicU64,
}

impl Default for Metrics {
    fn default() -> Self {
        Self {
            tasks_processed: AtomicU64::new(0),
            pushes: AtomicU64::new(0),
            pops: AtomicU64::new(0),
            steals: AtomicU64::new(0),
            steal_chunks: AtomicU64::new(0),
            queue_high_hits: AtomicU64::new(0),
            queue_len_max: AtomicU64::new(0),
            idle_yields: AtomicU64::new(0),
            inline_tasks: AtomicU64::new(0),
            duplicates: AtomicU64::new(0),
            pruned: AtomicU64::new(0),
            beam_cut: AtomicU64::new(0),
            coarsened: AtomicU64::new(0),
            expand_errors: AtomicU64::new(0),
            evaluations: AtomicU64::new(0),
            evaluations_skipped: AtomicU64::new(0),
            min_stolen_depth: AtomicU64::new(u64::MAX),
        }
    }
}

impl Metrics {
    pub(crate) fn add(counter: &AtomicU64, n: u64) {
        if n > 0 {
            counter.fetch_add(n, Ordering::Relaxed);
        }
    }

    pub(crate) fn incr(counter: &AtomicU64) {
        counter.fetch_add(1, Ordering::Relaxed);
    }

    /// Record an observed local queue length
    pub fn observe_queue_len(&self, len: usize) {
        self.queue_len_max.fetch_max(len as u64, Ordering::Relaxed);
    }

    /// Record a successful steal of `count` tasks, the shallowest at `depth`
    pub fn record_steal(&self, count: usize, depth: usize, chunked: bool) {
        Self::add(&self.steals, count as u64);
        if chunked {
            Self::incr(&self.steal_chunks);
        }
        self.min_stolen_depth.fetch_min(depth as u64, Ordering::Relaxed);
    }

    /// Take a point-in-time copy of every counter
    pub fn snapshot(&self, elapsed: Duration) -> MetricsSnapshot {
        let load = |c: &AtomicU64| c.load(Ordering::Relaxed);
        let min_stolen = load(&self.min_stolen_depth);

        MetricsSnapshot {
            tasks_processed: load(&self.tasks_processed),
            pushes: load(&self.pushes),
            pops: load(&self.pops),
            steals: load(&self.steals),
            steal_chunks: load(&self.steal_chunks),
            queue_high_hits: load(&self.queue_high_hits),
            queue_len_max: load(&self.queue_len_max),
            idle_yields: load(&self.idle_yields),
            inline_tasks: load(&self.inline_tasks),
            duplicates: load(&self.duplicates),
            pruned: load(&self.pruned),
            beam_cut: load(&self.beam_cut),
            coarsened: load(&self.coarsened),
            expand_errors: load(&self.expand_errors),
            evaluations: load(&self.evaluations),
            evaluations_skipped: load(&self.evaluations_skipped),
            min_stolen_depth: (min_stolen != u64::MAX).then_some(min_stolen),
            elapsed,
        }
    }
}

/// Plain copy of the counters at one point in time
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MetricsSnapshot {
    pub tasks_processed: u64,
    pub pushes: u64,
    pub pops: u64,
    pub steals: u64,
    pub steal_chunks: u64,
    pub queue_high_hits: u64,
    pub queue_len_max: u64,
    pub idle_yields: u64,
    pub inline_tasks: u64,
    pub duplicates: u64,
    pub pruned: u64,
    pub beam_cut: u64,
    pub coarsened: u64,
    pub expand_errors: u64,
    pub evaluations: u64,
    pub evaluations_skipped: u64,
    pub min_stolen_depth: Option<u64>,
    pub elapsed: Duration,
}

impl MetricsSnapshot {
    /// Tasks processed per second
    pub fn tasks_per_second(&self) -> f64 {
        let secs = self.elapsed.as_secs_f64();
        if secs > 0.0 {
            self.tasks_processed as f64 / secs
        } else {
            0.0
        }
    }

    /// Share of child tasks published to a stealable deque
    pub fn publish_ratio(&self) -> f64 {
        if self.pushes == 0 {
            return 0.0;
        }
        (self.pushes - self.inline_tasks.min(self.pushes)) as f64 / self.pushes as f64
    }
}
