//! Worker thread logic
//!
//! Each worker:
//! - Takes work from its private backlog, then from its own deque
//! - Claims the node through the idempotency guard and visits it
//! - Expands children, keeps leaves on its backlog, and lets the governor
//!   split the rest between its deque and its backlog
//! - Steals from peers when it has nothing left, and backs off when that
//!   fails too

use crate::config::Options;
use crate::error::{BoxError, ExpandError};
use crate::walker::cancel::{CancelReason, CancelToken};
use crate::walker::governor::Governor;
use crate::walker::heuristics::Heuristics;
use crate::walker::metrics::Metrics;
use crate::walker::pipeline::Dispatcher;
use crate::walker::queue::{Task, WorkDeque};
use crate::walker::{SearchSpace, Visitor};
use parking_lot::Mutex;
use rand::rngs::SmallRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::thread;
use std::time::Duration;
use tracing::{debug, error, trace, warn};

/// Sleep between failed steal rounds
pub const IDLE_BACKOFF: Duration = Duration::from_micros(100);

/// State shared by every worker and evaluator of one traversal
pub(crate) struct Shared<'a, S: SearchSpace> {
    pub space: &'a S,
    pub options: &'a Options,
    pub heuristics: &'a Heuristics<S::Node>,
    pub visitor: Option<&'a Visitor<'a, S::Node>>,
    pub governor: Governor,
    pub deques: Vec<WorkDeque<S::Node>>,
    pub token: CancelToken,
    pub outstanding: AtomicUsize,
    pub metrics: Metrics,
    pub errors: Mutex<Vec<String>>,
    pub first_error: Mutex<Option<BoxError>>,
    pub goal: Mutex<Option<S::Node>>,
}

impl<'a, S: SearchSpace> Shared<'a, S> {
    pub fn new(
        space: &'a S,
        options: &'a Options,
        heuristics: &'a Heuristics<S::Node>,
        visitor: Option<&'a Visitor<'a, S::Node>>,
    ) -> Self {
        Self {
            space,
            options,
            heuristics,
            visitor,
            governor: Governor::new(options),
            deques: (0..options.max_workers).map(|_| WorkDeque::new()).collect(),
            token: CancelToken::new(),
            outstanding: AtomicUsize::new(0),
            metrics: Metrics::default(),
            errors: Mutex::new(Vec::new()),
            first_error: Mutex::new(None),
            goal: Mutex::new(None),
        }
    }

    /// Queue the root on worker 0
    pub fn seed(&self, root: S::Node) {
        self.outstanding.fetch_add(1, Ordering::AcqRel);
        self.deques[0].push(Task::root(root));
    }

    /// Mark one task done; the last one broadcasts completion
    pub fn complete_one(&self) {
        if self.outstanding.fetch_sub(1, Ordering::AcqRel) == 1 {
            self.token.cancel(CancelReason::Completed);
        }
    }

    /// Run the visitor on a node, recording any failure
    pub fn visit(&self, node: &S::Node) -> bool {
        let Some(visitor) = self.visitor else {
            return true;
        };
        match visitor(node) {
            Ok(()) => true,
            Err(e) => {
                self.record_visit_error(node, e);
                false
            }
        }
    }

    fn record_visit_error(&self, node: &S::Node, err: BoxError) {
        debug!(node = %self.space.label(node), error = %err, "Visitor failed");
        self.errors.lock().push(err.to_string());
        {
            let mut first = self.first_error.lock();
            if first.is_none() {
                *first = Some(err);
            }
        }
        if self.options.cancel_on_error {
            self.token.cancel(CancelReason::Error);
        }
    }

    /// Record a node whose children could not be enumerated
    pub fn record_expand_error(&self, err: ExpandError) {
        if err.is_not_found() {
            debug!(error = %err, "Node vanished during expansion");
        } else {
            warn!(error = %err, "Expansion failed");
        }
        Metrics::incr(&self.metrics.expand_errors);
        self.errors.lock().push(err.to_string());
    }

    /// Record a goal node if this call is the one that stops the traversal
    pub fn reach_goal(&self, node: &S::Node) {
        let mut goal = self.goal.lock();
        if self.token.cancel(CancelReason::GoalReached) {
            debug!(node = %self.space.label(node), "Goal reached");
            *goal = Some(node.clone());
        }
    }
}

/// Cancels the traversal if the owning thread unwinds
pub(crate) struct PanicGuard<'t> {
    role: &'static str,
    id: usize,
    token: &'t CancelToken,
}

impl<'t> PanicGuard<'t> {
    pub fn new(role: &'static str, id: usize, token: &'t CancelToken) -> Self {
        Self { role, id, token }
    }
}

impl Drop for PanicGuard<'_> {
    fn drop(&mut self) {
        if thread::panicking() {
            error!(role = self.role, id = self.id, "Thread panicked, cancelling traversal");
            self.token.cancel(CancelReason::Error);
        }
    }
}

/// One worker of the pool
pub(crate) struct Worker<'s, 'a, S: SearchSpace> {
    id: usize,
    shared: &'s Shared<'a, S>,
    backlog: Vec<Task<S::Node>>,
    victims: Vec<usize>,
    rng: Option<SmallRng>,
    dispatcher: Option<Dispatcher<S::Node>>,
}

impl<'s, 'a, S: SearchSpace> Worker<'s, 'a, S> {
    pub fn new(id: usize, shared: &'s Shared<'a, S>, seed: u64, dispatcher: Option<Dispatcher<S::Node>>) -> Self {
        let n = shared.deques.len();
        // Round-robin order starting at the next worker
        let victims = (1..n).map(|offset| (id + offset) % n).collect();
        let rng = (!shared.options.deterministic).then(|| SmallRng::seed_from_u64(seed ^ id as u64));

        Self {
            id,
            shared,
            backlog: Vec::new(),
            victims,
            rng,
            dispatcher,
        }
    }

    /// Main worker loop
    pub fn run(mut self) {
        let _guard = PanicGuard::new("worker", self.id, &self.shared.token);
        debug!(worker = self.id, "Worker starting");

        let mut processed = 0u64;
        while !self.shared.token.is_cancelled() {
            match self.next_task() {
                Some(task) => {
                    self.process(task);
                    processed += 1;
                }
                None => {
                    if self.steal() {
                        continue;
                    }
                    Metrics::incr(&self.shared.metrics.idle_yields);
                    self.shared.token.wait_timeout(IDLE_BACKOFF);
                }
            }
        }

        debug!(
            worker = self.id,
            processed,
            abandoned = self.backlog.len(),
            "Worker exiting"
        );
    }

    fn next_task(&mut self) -> Option<Task<S::Node>> {
        let task = self.backlog.pop().or_else(|| self.shared.deques[self.id].pop())?;
        Metrics::incr(&self.shared.metrics.pops);
        Some(task)
    }

    /// Visit one task and expand its children
    pub fn process(&mut self, task: Task<S::Node>) {
        let shared = self.shared;

        if !shared.space.mark_visited(&task.node) {
            Metrics::incr(&shared.metrics.duplicates);
            shared.complete_one();
            return;
        }
        if shared.token.is_cancelled() {
            return;
        }

        match &self.dispatcher {
            Some(dispatcher) => {
                dispatcher.dispatch(task.node.clone(), &shared.token, &shared.metrics);
            }
            None => {
                shared.visit(&task.node);
            }
        }
        if shared.token.is_cancelled() {
            return;
        }

        if shared.heuristics.is_goal(&task.node) {
            Metrics::incr(&shared.metrics.tasks_processed);
            shared.reach_goal(&task.node);
            return;
        }

        self.expand(&task);
        Metrics::incr(&shared.metrics.tasks_processed);
        shared.complete_one();
    }

    fn expand(&mut self, task: &Task<S::Node>) {
        let shared = self.shared;
        let children = match shared.space.expand(&task.node, task.depth) {
            Ok(children) => children,
            Err(e) => {
                shared.record_expand_error(e);
                return;
            }
        };
        if children.is_empty() {
            return;
        }

        let children = shared.heuristics.select(&task.node, children, &shared.metrics);
        if children.is_empty() {
            return;
        }

        let (leaves, branches): (Vec<_>, Vec<_>) = children.into_iter().partition(|n| shared.space.is_leaf(n));
        let created = leaves.len() + branches.len();
        shared.outstanding.fetch_add(created, Ordering::AcqRel);
        Metrics::add(&shared.metrics.pushes, created as u64);
        Metrics::add(&shared.metrics.inline_tasks, leaves.len() as u64);

        if !branches.is_empty() {
            self.publish(task, branches);
        }
        // Leaves sit on top of the backlog and run next
        self.backlog.extend(leaves.into_iter().rev().map(|n| task.child(n)));
    }

    /// Let the governor split expandable children between deque and backlog
    fn publish(&mut self, task: &Task<S::Node>, branches: Vec<S::Node>) {
        let shared = self.shared;
        let deque = &shared.deques[self.id];
        let queue_len = deque.len();
        shared.metrics.observe_queue_len(queue_len);

        let decision = shared.governor.decide(queue_len, task.depth, branches.len());
        if decision.queue_high_hit {
            Metrics::incr(&shared.metrics.queue_high_hits);
        }
        let split = shared.governor.split(decision, branches, shared.heuristics);
        Metrics::add(&shared.metrics.inline_tasks, split.retained.len() as u64);
        Metrics::add(&shared.metrics.coarsened, split.coarsened as u64);

        // Lowest priority first so the best child is popped next
        let published = split.published.len();
        if published > 0 {
            deque.push_all(split.published.into_iter().rev().map(|n| task.child(n)));
            shared.metrics.observe_queue_len(queue_len + published);
        }
        self.backlog
            .extend(split.retained.into_iter().rev().map(|n| task.child(n)));
    }

    /// Try every peer once; stolen work goes onto our own deque
    fn steal(&mut self) -> bool {
        if self.victims.is_empty() {
            return false;
        }
        if let Some(rng) = self.rng.as_mut() {
            self.victims.shuffle(rng);
        }

        let shared = self.shared;
        let k = shared.options.chunk_steal_size;
        let floor = shared.options.steal_depth_min;

        for &victim in &self.victims {
            let stolen = shared.deques[victim].steal_chunk(k, floor);
            let Some(shallowest) = stolen.iter().map(|t| t.depth).min() else {
                continue;
            };

            trace!(worker = self.id, victim, count = stolen.len(), depth = shallowest, "Stole tasks");
            shared.metrics.record_steal(stolen.len(), shallowest, k > 1);
            shared.deques[self.id].push_all(stolen);
            return true;
        }
        false
    }
}
