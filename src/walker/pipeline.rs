//! Two-stage evaluation pipeline
//!
//! Workers hand visited nodes to a bounded channel instead of calling the
//! visitor themselves; a fixed evaluator pool consumes it. The channel
//! closes when the last worker drops its sender, at which point evaluators
//! drain what is left and exit.

use crate::walker::cancel::CancelToken;
use crate::walker::metrics::Metrics;
use crate::walker::worker::{PanicGuard, Shared};
use crate::walker::SearchSpace;
use crossbeam_channel::{bounded, Receiver, SendTimeoutError, Sender};
use std::time::Duration;
use tracing::debug;

/// How long a blocked dispatch waits before re-checking cancellation
const DISPATCH_POLL: Duration = Duration::from_millis(1);

/// Create the evaluation queue
pub(crate) fn eval_channel<N>(capacity: usize) -> (Sender<N>, Receiver<N>) {
    bounded(capacity)
}

/// A worker's handle on the evaluation queue
pub(crate) struct Dispatcher<N> {
    tx: Sender<N>,
}

impl<N> Dispatcher<N> {
    pub fn new(tx: Sender<N>) -> Self {
        Self { tx }
    }

    /// Queue a node for evaluation, waiting while the queue is full
    ///
    /// Gives up if the traversal is cancelled or every evaluator is gone;
    /// the node then counts as skipped.
    pub fn dispatch(&self, node: N, token: &CancelToken, metrics: &Metrics) -> bool {
        let mut node = node;
        loop {
            match self.tx.send_timeout(node, DISPATCH_POLL) {
                Ok(()) => return true,
                Err(SendTimeoutError::Timeout(back)) => {
                    if token.is_cancelled() {
                        Metrics::incr(&metrics.evaluations_skipped);
                        return false;
                    }
                    node = back;
                }
                Err(SendTimeoutError::Disconnected(_)) => {
                    Metrics::incr(&metrics.evaluations_skipped);
                    return false;
                }
            }
        }
    }
}

/// One member of the evaluator pool
pub(crate) struct Evaluator<'s, 'a, S: SearchSpace> {
    id: usize,
    shared: &'s Shared<'a, S>,
    rx: Receiver<S::Node>,
}

impl<'s, 'a, S: SearchSpace> Evaluator<'s, 'a, S> {
    pub fn new(id: usize, shared: &'s Shared<'a, S>, rx: Receiver<S::Node>) -> Self {
        Self { id, shared, rx }
    }

    /// Evaluate nodes until the queue closes
    ///
    /// After completion or a goal, queued nodes are still evaluated. After
    /// an error, caller cancellation or deadline they are skipped.
    pub fn run(self) {
        let _guard = PanicGuard::new("evaluator", self.id, &self.shared.token);
        debug!(evaluator = self.id, "Evaluator starting");

        let mut evaluated = 0u64;
        let mut skipped = 0u64;
        for node in self.rx.iter() {
            if self.shared.token.reason().map_or(false, |r| !r.drains()) {
                skipped += 1;
                continue;
            }
            Metrics::incr(&self.shared.metrics.evaluations);
            self.shared.visit(&node);
            evaluated += 1;
        }

        Metrics::add(&self.shared.metrics.evaluations_skipped, skipped);
        debug!(evaluator = self.id, evaluated, skipped, "Evaluator exiting");
    }
}
