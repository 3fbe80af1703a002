//! The refinement loop.
//!
//! Each iteration selects a target node, researches it, merges the result,
//! evaluates the brief and applies the verdict. Iterations are strictly
//! sequential and the brief and registry are owned by the loop for the whole
//! run; collaborator calls are the only suspension points.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::callback::{NoOpRefinementCallback, RefinementCallback};
use super::diagnostic::{Diagnostic, DiagnosticKind};
use super::escalation::{StatusChange, escalate};
use super::merge::merge_update;
use super::selector::{ResearchMode, Target, select_target};
use crate::brief::{Brief, Evaluation, Grade, NodeId, NodeUpdate, ResearchStatus};
use crate::collaborators::{Evaluator, ResearchProvider, ResearchRequest};
use crate::error::{CollaboratorError, MergeError, RunError};
use crate::registry::SourceRegistry;

/// How a run ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunOutcome {
    /// Every node reached a terminal status.
    Converged,
    /// The iteration ceiling was reached first; the brief is partial.
    BudgetExhausted,
    /// Cancellation was observed; the brief is from the last completed iteration.
    Cancelled,
}

impl RunOutcome {
    pub fn is_partial(self) -> bool {
        !matches!(self, RunOutcome::Converged)
    }
}

impl fmt::Display for RunOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RunOutcome::Converged => f.write_str("converged"),
            RunOutcome::BudgetExhausted => f.write_str("budget_exhausted"),
            RunOutcome::Cancelled => f.write_str("cancelled"),
        }
    }
}

/// Result of a run that did not hit a fatal collaborator error.
#[derive(Debug, Clone)]
pub struct RefinementRun {
    pub brief: Brief,
    pub registry: SourceRegistry,
    pub outcome: RunOutcome,
    /// Completed iterations.
    pub iterations: usize,
    pub diagnostics: Vec<Diagnostic>,
}

/// Drives a brief to convergence within a fixed iteration ceiling.
pub struct RefinementLoop {
    research: Arc<dyn ResearchProvider>,
    evaluator: Arc<dyn Evaluator>,
    max_iterations: usize,
    call_timeout: Option<Duration>,
}

/// Mutable state owned by a single run.
struct RunState<'a> {
    brief: Brief,
    registry: SourceRegistry,
    iterations: usize,
    diagnostics: Vec<Diagnostic>,
    /// Follow-up queries from the last valid FAIL, keyed by the node it graded.
    /// Kept until a newer evaluation replaces them or the node leaves ACTIVE.
    follow_ups: HashMap<NodeId, Vec<String>>,
    callback: &'a dyn RefinementCallback,
}

impl RunState<'_> {
    async fn diagnose(&mut self, node_id: Option<NodeId>, kind: DiagnosticKind, message: String) {
        let diagnostic = Diagnostic::new(self.iterations + 1, node_id, kind, message);
        warn!(
            iteration = diagnostic.iteration,
            kind = %diagnostic.kind,
            node_id = diagnostic.node_id.as_ref().map(|n| n.as_str()).unwrap_or("-"),
            "{}",
            diagnostic.message
        );
        self.callback.on_diagnostic(&diagnostic).await;
        self.diagnostics.push(diagnostic);
    }

    fn abort(self, source: CollaboratorError, budget: usize) -> RunError {
        warn!(iterations = self.iterations, error = %source, "Refinement run aborted");
        RunError {
            source,
            iterations: self.iterations,
            budget,
            brief: Box::new(self.brief),
            registry: Box::new(self.registry),
            diagnostics: self.diagnostics,
        }
    }

    async fn finish(self, outcome: RunOutcome) -> RefinementRun {
        info!(
            outcome = %outcome,
            iterations = self.iterations,
            saturated = self.brief.count_with_status(ResearchStatus::Saturated),
            stalled = self.brief.count_with_status(ResearchStatus::Stalled),
            diagnostics = self.diagnostics.len(),
            "Refinement run finished"
        );
        self.callback.on_finish(outcome, self.iterations).await;
        RefinementRun {
            brief: self.brief,
            registry: self.registry,
            outcome,
            iterations: self.iterations,
            diagnostics: self.diagnostics,
        }
    }
}

/// What a research call produced once cancellation is taken into account.
enum ResearchResult {
    Update(NodeUpdate),
    Failed(CollaboratorError),
    Cancelled,
}

impl RefinementLoop {
    /// `max_iterations` is the ceiling computed by the budget controller.
    pub fn new(
        research: Arc<dyn ResearchProvider>,
        evaluator: Arc<dyn Evaluator>,
        max_iterations: usize,
    ) -> Self {
        Self {
            research,
            evaluator,
            max_iterations,
            call_timeout: None,
        }
    }

    /// Bound every collaborator call. A call exceeding it aborts the run.
    pub fn with_call_timeout(mut self, timeout: Duration) -> Self {
        self.call_timeout = Some(timeout);
        self
    }

    pub fn max_iterations(&self) -> usize {
        self.max_iterations
    }

    pub async fn run(
        &self,
        brief: Brief,
        registry: SourceRegistry,
        cancel: CancellationToken,
    ) -> Result<RefinementRun, RunError> {
        self.run_with_callback(brief, registry, cancel, &NoOpRefinementCallback)
            .await
    }

    pub async fn run_with_callback(
        &self,
        brief: Brief,
        registry: SourceRegistry,
        cancel: CancellationToken,
        callback: &dyn RefinementCallback,
    ) -> Result<RefinementRun, RunError> {
        let mut state = RunState {
            brief,
            registry,
            iterations: 0,
            diagnostics: Vec::new(),
            follow_ups: HashMap::new(),
            callback,
        };

        info!(
            reference_id = %state.brief.reference_id,
            nodes = state.brief.knowledge_nodes.len(),
            max_iterations = self.max_iterations,
            "Starting refinement run"
        );

        loop {
            if cancel.is_cancelled() {
                return Ok(state.finish(RunOutcome::Cancelled).await);
            }

            let Some(target) = select_target(&state.brief) else {
                return Ok(state.finish(RunOutcome::Converged).await);
            };

            if state.iterations >= self.max_iterations {
                warn!(
                    iterations = state.iterations,
                    max_iterations = self.max_iterations,
                    "Iteration budget exhausted"
                );
                return Ok(state.finish(RunOutcome::BudgetExhausted).await);
            }

            let iteration = state.iterations + 1;
            callback
                .on_iteration_start(iteration, self.max_iterations)
                .await;
            debug!(
                iteration,
                node_id = %target.node_id,
                node_title = %target.node_title,
                mode = %target.mode,
                "Refinement iteration"
            );

            let active = state.brief.active_nodes().count();
            if active > 1 {
                state
                    .diagnose(
                        Some(target.node_id.clone()),
                        DiagnosticKind::MultipleActiveNodes,
                        format!("{active} nodes are active; refining the first"),
                    )
                    .await;
            }
            callback.on_target_selected(&target).await;

            let queries = self.queries_for(&mut state, &target).await;
            let request = ResearchRequest {
                node_id: target.node_id.clone(),
                node_title: target.node_title.clone(),
                queries,
                mode: target.mode,
            };

            match self.research_step(&request, &cancel).await {
                ResearchResult::Cancelled => {
                    info!(iteration, "Cancellation observed during research; discarding");
                    return Ok(state.finish(RunOutcome::Cancelled).await);
                }
                ResearchResult::Failed(e) if e.is_fatal() => return Err(state.abort(e, self.max_iterations)),
                ResearchResult::Failed(e) => {
                    state
                        .diagnose(
                            Some(target.node_id.clone()),
                            DiagnosticKind::MalformedResearch,
                            e.to_string(),
                        )
                        .await;
                    state.iterations += 1;
                    continue;
                }
                ResearchResult::Update(update) => {
                    if !self.fold_update(&mut state, &target, &update).await {
                        state.iterations += 1;
                        continue;
                    }
                }
            }

            let evaluation = match self.evaluate_step(&state.brief).await {
                Ok(evaluation) => evaluation,
                Err(e) if e.is_fatal() => return Err(state.abort(e, self.max_iterations)),
                Err(CollaboratorError::NoActiveNode) => {
                    state
                        .diagnose(
                            Some(target.node_id.clone()),
                            DiagnosticKind::NoActiveNode,
                            "evaluator found no active node".to_string(),
                        )
                        .await;
                    None
                }
                Err(e) => {
                    state
                        .diagnose(
                            Some(target.node_id.clone()),
                            DiagnosticKind::MalformedEvaluation,
                            e.to_string(),
                        )
                        .await;
                    None
                }
            };

            let evaluation = match evaluation.map(|e| e.validate().map(|_| e)) {
                Some(Ok(e)) => Some(e),
                Some(Err(schema)) => {
                    state
                        .diagnose(
                            Some(target.node_id.clone()),
                            DiagnosticKind::MalformedEvaluation,
                            schema.to_string(),
                        )
                        .await;
                    None
                }
                None => None,
            };

            if let Some(ref eval) = evaluation
                && let Some(graded) = state.brief.active_nodes().next().map(|n| n.node_id.clone())
            {
                debug!(node_id = %graded, grade = ?eval.grade, comment = %eval.comment, "Evaluation");
                callback.on_evaluation(&graded, eval).await;
                if eval.grade == Grade::Fail {
                    state
                        .follow_ups
                        .insert(graded, eval.follow_up_queries.clone());
                }
            }

            let escalation = escalate(&mut state.brief, evaluation.as_ref());
            if let Some(ref change) = escalation.change {
                state.follow_ups.remove(&change.node_id);
                callback.on_status_change(change).await;
            }

            state.iterations += 1;
            if escalation.complete {
                return Ok(state.finish(RunOutcome::Converged).await);
            }
        }
    }

    /// Seed queries for an initial pass, stored follow-ups for a refinement.
    async fn queries_for(&self, state: &mut RunState<'_>, target: &Target) -> Vec<String> {
        let seeds = state
            .brief
            .node(&target.node_id)
            .map(|n| n.search_queries.clone())
            .unwrap_or_default();
        match target.mode {
            ResearchMode::Initial => seeds,
            ResearchMode::Refinement => match state.follow_ups.get(&target.node_id).cloned() {
                Some(follow_ups) if !follow_ups.is_empty() => follow_ups,
                _ => {
                    state
                        .diagnose(
                            Some(target.node_id.clone()),
                            DiagnosticKind::MissingFollowUps,
                            "no follow-up queries stored; reusing seed queries".to_string(),
                        )
                        .await;
                    seeds
                }
            },
        }
    }

    /// Register the update's URLs and merge it into the target node. Returns
    /// false when the pass was voided.
    async fn fold_update(
        &self,
        state: &mut RunState<'_>,
        target: &Target,
        update: &NodeUpdate,
    ) -> bool {
        let registered = state.registry.register_update(update);
        if registered > 0 {
            debug!(registered, total = state.registry.len(), "Registered new sources");
        }

        if update.node_title.trim() != target.node_title {
            state
                .diagnose(
                    Some(target.node_id.clone()),
                    DiagnosticKind::TargetMismatch,
                    format!(
                        "update names '{}' but '{}' was selected; merge skipped",
                        update.node_title, target.node_title
                    ),
                )
                .await;
            return false;
        }

        match merge_update(&mut state.brief, update) {
            Ok(report) => {
                debug!(
                    node_id = %report.node_id,
                    sources_added = report.sources_added,
                    facts_added = report.facts_added,
                    "Merged update"
                );
                state.callback.on_merge(&report).await;
                if report.activated {
                    let change = StatusChange {
                        node_id: report.node_id.clone(),
                        from: ResearchStatus::Pending,
                        to: ResearchStatus::Active,
                    };
                    info!(node_id = %change.node_id, from = %change.from, to = %change.to, "Node status changed");
                    state.callback.on_status_change(&change).await;
                }
                true
            }
            Err(e) => {
                let kind = match e {
                    MergeError::NodeNotFound { .. } => DiagnosticKind::NodeNotFound,
                    MergeError::InvalidUpdate(_) => DiagnosticKind::InvalidUpdate,
                };
                state
                    .diagnose(Some(target.node_id.clone()), kind, e.to_string())
                    .await;
                false
            }
        }
    }

    /// Call the research provider; cancellation cuts the call short.
    async fn research_step(
        &self,
        request: &ResearchRequest,
        cancel: &CancellationToken,
    ) -> ResearchResult {
        let call = self.bounded("research provider", self.research.research(request));
        tokio::select! {
            biased;
            _ = cancel.cancelled() => ResearchResult::Cancelled,
            result = call => match result {
                Ok(update) if cancel.is_cancelled() => {
                    debug!(node_title = %update.node_title, "Discarding update received after cancellation");
                    ResearchResult::Cancelled
                }
                Ok(update) => ResearchResult::Update(update),
                Err(e) => ResearchResult::Failed(e),
            },
        }
    }

    /// Call the evaluator. It is allowed to finish so the merged pass completes.
    async fn evaluate_step(&self, brief: &Brief) -> Result<Option<Evaluation>, CollaboratorError> {
        self.bounded("evaluator", self.evaluator.evaluate(brief))
            .await
            .map(Some)
    }

    async fn bounded<T, F>(&self, collaborator: &str, call: F) -> Result<T, CollaboratorError>
    where
        F: Future<Output = Result<T, CollaboratorError>>,
    {
        match self.call_timeout {
            Some(limit) => tokio::time::timeout(limit, call).await.map_err(|_| {
                CollaboratorError::Timeout {
                    collaborator: collaborator.to_string(),
                    timeout_secs: limit.as_secs(),
                }
            })?,
            None => call.await,
        }
    }
}
