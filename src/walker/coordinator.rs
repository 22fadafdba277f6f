//! Traversal coordinator
//!
//! Wires the worker pool together for one run:
//! - Validates options before any thread starts
//! - Seeds worker 0 with the root and spawns workers (and evaluators)
//! - Watches the caller's context and deadline, samples metrics
//! - Joins every thread and folds the outcome into one result

use crate::config::Options;
use crate::error::{BoxError, TraverseError, WorkerError};
use crate::walker::cancel::{CancelReason, Context};
use crate::walker::heuristics::Heuristics;
use crate::walker::metrics::{MetricsSink, MetricsSnapshot};
use crate::walker::pipeline::{eval_channel, Dispatcher, Evaluator};
use crate::walker::worker::{Shared, Worker};
use crate::walker::SearchSpace;
use std::thread::{self, Scope};
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

/// Poll period of the coordinating thread
const WATCH_INTERVAL: Duration = Duration::from_millis(1);

/// Callback run once per visited node
pub type Visitor<'v, N> = dyn Fn(&N) -> Result<(), BoxError> + Send + Sync + 'v;

/// What a finished traversal hands back
#[derive(Debug, Clone)]
pub struct TraversalReport<N> {
    /// Why the run stopped (`Completed` or `GoalReached`)
    pub outcome: CancelReason,

    /// Final metrics
    pub metrics: MetricsSnapshot,

    /// Every recorded expansion and visitor error, in arrival order
    pub errors: Vec<String>,

    /// Node that satisfied the goal heuristic
    pub goal: Option<N>,
}

impl<N> TraversalReport<N> {
    /// Check if the run stopped on a goal
    pub fn goal_reached(&self) -> bool {
        self.outcome == CancelReason::GoalReached
    }
}

/// A configured traversal over one search space
pub struct Traversal<'a, S: SearchSpace> {
    space: &'a S,
    options: Options,
    heuristics: Heuristics<S::Node>,
    visitor: Option<Box<Visitor<'a, S::Node>>>,
    sink: Option<MetricsSink>,
}

impl<'a, S: SearchSpace> Traversal<'a, S> {
    pub fn new(space: &'a S, options: Options) -> Self {
        Self {
            space,
            options,
            heuristics: Heuristics::default(),
            visitor: None,
            sink: None,
        }
    }

    pub fn heuristics(mut self, heuristics: Heuristics<S::Node>) -> Self {
        self.heuristics = heuristics;
        self
    }

    /// Run `f` on every node; without a visitor the run only expands
    pub fn visitor(mut self, f: impl Fn(&S::Node) -> Result<(), BoxError> + Send + Sync + 'a) -> Self {
        self.visitor = Some(Box::new(f));
        self
    }

    /// Receive metrics every `metrics_interval` and once at the end
    pub fn metrics_sink(mut self, sink: MetricsSink) -> Self {
        self.sink = Some(sink);
        self
    }

    /// Traverse everything reachable from `root`
    ///
    /// Returns the first visitor error if there was one, even if the run
    /// otherwise completed. Caller cancellation and deadline expiry come back
    /// as their own errors. The metrics sink, if any, sees the final
    /// snapshot in every case except invalid options or root.
    pub fn run(&self, ctx: &Context, root: S::Node) -> Result<TraversalReport<S::Node>, TraverseError> {
        self.options.validate()?;
        self.space.check_root(&root)?;
        if let Some(reason) = ctx.stop_reason() {
            debug!(?reason, "Context already stopped, not starting traversal");
            self.emit(&MetricsSnapshot::default());
            return Err(stop_error(reason));
        }

        let start = Instant::now();
        let shared = Shared::new(self.space, &self.options, &self.heuristics, self.visitor.as_deref());
        let seed = self.options.seed.unwrap_or_else(rand::random);

        info!(
            root = %self.space.label(&root),
            workers = self.options.max_workers,
            two_stage = self.options.two_stage,
            deterministic = self.options.deterministic,
            "Traversal starting"
        );
        shared.seed(root);

        let failure = thread::scope(|scope| self.drive(scope, ctx, &shared, seed, start));

        let snapshot = shared.metrics.snapshot(start.elapsed());
        self.emit(&snapshot);

        let outcome = shared.token.reason().unwrap_or(CancelReason::Completed);
        info!(
            ?outcome,
            tasks = snapshot.tasks_processed,
            steals = snapshot.steals,
            errors = shared.errors.lock().len(),
            elapsed_ms = snapshot.elapsed.as_millis() as u64,
            "Traversal finished"
        );

        if let Some(failure) = failure {
            return Err(failure.into());
        }
        if let Some(err) = shared.first_error.into_inner() {
            return Err(TraverseError::Visit(err));
        }
        match outcome {
            CancelReason::External | CancelReason::DeadlineExceeded => Err(stop_error(outcome)),
            _ => Ok(TraversalReport {
                outcome,
                metrics: snapshot,
                errors: shared.errors.into_inner(),
                goal: shared.goal.into_inner(),
            }),
        }
    }

    /// Spawn the pools, watch until cancelled, join
    fn drive<'scope>(
        &self,
        scope: &'scope Scope<'scope, '_>,
        ctx: &Context,
        shared: &'scope Shared<'_, S>,
        seed: u64,
        start: Instant,
    ) -> Option<WorkerError> {
        let mut failure = None;
        let (tx, rx) = if self.options.two_stage {
            let (tx, rx) = eval_channel(self.options.eval_capacity());
            (Some(tx), Some(rx))
        } else {
            (None, None)
        };

        let mut evaluators = Vec::new();
        if let Some(rx) = rx {
            for id in 0..self.options.evaluator_count() {
                let rx = rx.clone();
                let name = format!("evaluator-{}", id);
                match thread::Builder::new()
                    .name(name.clone())
                    .spawn_scoped(scope, move || Evaluator::new(id, shared, rx).run())
                {
                    Ok(handle) => evaluators.push((id, handle)),
                    Err(e) => {
                        failure = Some(spawn_failed(name, e, shared));
                        break;
                    }
                }
            }
        }

        let mut workers = Vec::with_capacity(self.options.max_workers);
        if failure.is_none() {
            for id in 0..self.options.max_workers {
                let dispatcher = tx.as_ref().map(|tx| Dispatcher::new(tx.clone()));
                let name = format!("walker-{}", id);
                match thread::Builder::new()
                    .name(name.clone())
                    .spawn_scoped(scope, move || Worker::new(id, shared, seed, dispatcher).run())
                {
                    Ok(handle) => workers.push((id, handle)),
                    Err(e) => {
                        failure = Some(spawn_failed(name, e, shared));
                        break;
                    }
                }
            }
        }
        // Evaluators see the queue close once the last worker exits
        drop(tx);

        debug!(workers = workers.len(), evaluators = evaluators.len(), "Threads spawned");
        self.watch(ctx, shared, start);

        for (id, handle) in workers {
            if handle.join().is_err() {
                failure.get_or_insert(WorkerError::Panicked { id });
            }
        }
        for (id, handle) in evaluators {
            if handle.join().is_err() {
                failure.get_or_insert(WorkerError::EvaluatorPanicked { id });
            }
        }
        failure
    }

    /// Forward caller cancellation and deadlines, sample metrics
    fn watch(&self, ctx: &Context, shared: &Shared<'_, S>, start: Instant) {
        let interval = self.sink.as_ref().and(self.options.metrics_interval);
        let mut next_sample = interval.map(|i| start + i);

        while !shared.token.wait_timeout(WATCH_INTERVAL) {
            if let Some(reason) = ctx.stop_reason() {
                info!(?reason, "Stopping traversal");
                shared.token.cancel(reason);
                break;
            }

            if let (Some(at), Some(every)) = (next_sample, interval) {
                if Instant::now() >= at {
                    self.emit(&shared.metrics.snapshot(start.elapsed()));
                    next_sample = Some(at + every);
                }
            }
        }
    }

    fn emit(&self, snapshot: &MetricsSnapshot) {
        if let Some(sink) = &self.sink {
            sink(snapshot);
        }
    }
}

fn spawn_failed<S: SearchSpace>(name: String, err: std::io::Error, shared: &Shared<'_, S>) -> WorkerError {
    warn!(thread = %name, error = %err, "Failed to spawn thread");
    shared.token.cancel(CancelReason::Error);
    WorkerError::SpawnFailed {
        name,
        reason: err.to_string(),
    }
}

fn stop_error(reason: CancelReason) -> TraverseError {
    match reason {
        CancelReason::DeadlineExceeded => TraverseError::DeadlineExceeded,
        _ => TraverseError::Cancelled,
    }
}

/// Traverse `space` from `root`, calling `visitor` on every node
pub fn traverse<S, F>(
    ctx: &Context,
    space: &S,
    root: S::Node,
    options: Options,
    visitor: F,
) -> Result<TraversalReport<S::Node>, TraverseError>
where
    S: SearchSpace,
    F: Fn(&S::Node) -> Result<(), BoxError> + Send + Sync,
{
    Traversal::new(space, options).visitor(visitor).run(ctx, root)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ConfigError;
    use crate::tree::BinaryTree;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn opts(workers: usize) -> Options {
        Options {
            max_workers: workers,
            deterministic: true,
            ..Options::default()
        }
    }

    #[test]
    fn test_invalid_options_rejected_before_start() {
        let tree = BinaryTree::balanced(7);
        let err = Traversal::new(&tree, opts(0)).run(&Context::background(), 0).unwrap_err();
        assert!(matches!(err, TraverseError::Config(_)));
        assert_eq!(tree.visited_count(), 0);
    }

    #[test]
    fn test_root_outside_tree_rejected() {
        let tree = BinaryTree::balanced(7);
        let err = Traversal::new(&tree, opts(2)).run(&Context::background(), 7).unwrap_err();
        assert!(matches!(
            err,
            TraverseError::Config(ConfigError::UnknownRoot { .. })
        ));
        assert_eq!(tree.visited_count(), 0);

        let empty = BinaryTree::new();
        let err = Traversal::new(&empty, opts(1)).run(&Context::background(), 0).unwrap_err();
        assert!(matches!(err, TraverseError::Config(_)));
    }

    #[test]
    fn test_single_worker_visits_everything() {
        let tree = BinaryTree::balanced(15);
        let visits = AtomicUsize::new(0);
        let report = traverse(&Context::background(), &tree, 0, opts(1), |_| {
            visits.fetch_add(1, Ordering::Relaxed);
            Ok(())
        })
        .unwrap();

        assert_eq!(report.outcome, CancelReason::Completed);
        assert_eq!(report.metrics.tasks_processed, 15);
        assert_eq!(report.metrics.pushes, 14);
        assert_eq!(visits.load(Ordering::Relaxed), 15);
        assert!(report.errors.is_empty());
        assert!(report.goal.is_none());
    }

    #[test]
    fn test_cancelled_context_does_not_start() {
        let tree = BinaryTree::balanced(7);
        let ctx = Context::background();
        ctx.cancel();
        let err = Traversal::new(&tree, opts(2)).run(&ctx, 0).unwrap_err();
        assert!(matches!(err, TraverseError::Cancelled));
        assert_eq!(tree.visited_count(), 0);
    }

    #[test]
    fn test_goal_reported() {
        let tree = BinaryTree::balanced(63);
        let report = Traversal::new(&tree, opts(1))
            .heuristics(Heuristics::new().goal(|n: &usize| *n == 5))
            .run(&Context::background(), 0)
            .unwrap();
        assert!(report.goal_reached());
        assert_eq!(report.goal, Some(5));
        assert!(report.metrics.tasks_processed < 63);
    }
}
