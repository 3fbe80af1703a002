//! Queue-backed collaborators.
//!
//! Each one replays responses in the order they were queued and records the
//! calls it received. Used by tests and by the CLI to replay a recorded run.

use std::collections::VecDeque;
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;

use super::{Evaluator, PlanGenerator, ResearchProvider, ResearchRequest};
use crate::brief::{Brief, Evaluation, NodeUpdate, Plan};
use crate::error::CollaboratorError;

fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// Returns a queued plan (or error) for each subject requested.
pub struct ScriptedPlanGenerator {
    responses: Mutex<VecDeque<Result<Plan, CollaboratorError>>>,
    subjects: Mutex<Vec<String>>,
}

impl ScriptedPlanGenerator {
    pub fn new() -> Self {
        Self {
            responses: Mutex::new(VecDeque::new()),
            subjects: Mutex::new(Vec::new()),
        }
    }

    pub fn with_plan(plan: Plan) -> Self {
        let generator = Self::new();
        generator.queue_plan(plan);
        generator
    }

    pub fn queue_plan(&self, plan: Plan) {
        lock(&self.responses).push_back(Ok(plan));
    }

    pub fn queue_error(&self, error: CollaboratorError) {
        lock(&self.responses).push_back(Err(error));
    }

    pub fn subjects(&self) -> Vec<String> {
        lock(&self.subjects).clone()
    }
}

impl Default for ScriptedPlanGenerator {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait::async_trait]
impl PlanGenerator for ScriptedPlanGenerator {
    async fn generate(&self, subject: &str) -> Result<Plan, CollaboratorError> {
        lock(&self.subjects).push(subject.to_string());
        lock(&self.responses)
            .pop_front()
            .unwrap_or_else(|| Err(CollaboratorError::unavailable("plan generator", "script exhausted")))
    }
}

/// Returns queued updates in order. Once the script runs out it reports that
/// nothing new was found.
pub struct ScriptedResearchProvider {
    responses: Mutex<VecDeque<Result<NodeUpdate, CollaboratorError>>>,
    requests: Mutex<Vec<ResearchRequest>>,
    delay: Option<Duration>,
}

impl ScriptedResearchProvider {
    pub fn new() -> Self {
        Self {
            responses: Mutex::new(VecDeque::new()),
            requests: Mutex::new(Vec::new()),
            delay: None,
        }
    }

    /// Sleep this long before answering each call.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub fn queue_update(&self, update: NodeUpdate) {
        lock(&self.responses).push_back(Ok(update));
    }

    pub fn queue_error(&self, error: CollaboratorError) {
        lock(&self.responses).push_back(Err(error));
    }

    /// Requests received so far, in call order.
    pub fn requests(&self) -> Vec<ResearchRequest> {
        lock(&self.requests).clone()
    }

    pub fn remaining(&self) -> usize {
        lock(&self.responses).len()
    }
}

impl Default for ScriptedResearchProvider {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait::async_trait]
impl ResearchProvider for ScriptedResearchProvider {
    async fn research(&self, request: &ResearchRequest) -> Result<NodeUpdate, CollaboratorError> {
        lock(&self.requests).push(request.clone());
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        let next = lock(&self.responses).pop_front();
        next.unwrap_or_else(|| Ok(NodeUpdate::empty(request.node_title.clone())))
    }
}

/// Returns queued evaluations in order. A brief with no ACTIVE node gets
/// `NoActiveNode` without consuming the queue.
pub struct ScriptedEvaluator {
    responses: Mutex<VecDeque<Result<Evaluation, CollaboratorError>>>,
    calls: Mutex<usize>,
}

impl ScriptedEvaluator {
    pub fn new() -> Self {
        Self {
            responses: Mutex::new(VecDeque::new()),
            calls: Mutex::new(0),
        }
    }

    pub fn queue_evaluation(&self, evaluation: Evaluation) {
        lock(&self.responses).push_back(Ok(evaluation));
    }

    pub fn queue_error(&self, error: CollaboratorError) {
        lock(&self.responses).push_back(Err(error));
    }

    pub fn calls(&self) -> usize {
        *lock(&self.calls)
    }
}

impl Default for ScriptedEvaluator {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait::async_trait]
impl Evaluator for ScriptedEvaluator {
    async fn evaluate(&self, brief: &Brief) -> Result<Evaluation, CollaboratorError> {
        *lock(&self.calls) += 1;
        if brief.active_nodes().next().is_none() {
            return Err(CollaboratorError::NoActiveNode);
        }
        lock(&self.responses)
            .pop_front()
            .unwrap_or_else(|| Err(CollaboratorError::unavailable("evaluator", "script exhausted")))
    }
}
