//! Observer hooks for the refinement loop.

use super::diagnostic::Diagnostic;
use super::engine::RunOutcome;
use super::escalation::StatusChange;
use super::merge::MergeReport;
use super::selector::Target;
use crate::brief::{Evaluation, NodeId};

/// Receives progress events from a running refinement loop.
///
/// Every method defaults to a no-op so observers only implement what they need.
#[async_trait::async_trait]
pub trait RefinementCallback: Send + Sync {
    /// Called at the start of each iteration with the 1-based iteration number.
    async fn on_iteration_start(&self, _iteration: usize, _max_iterations: usize) {}

    async fn on_target_selected(&self, _target: &Target) {}

    async fn on_merge(&self, _report: &MergeReport) {}

    async fn on_evaluation(&self, _node_id: &NodeId, _evaluation: &Evaluation) {}

    async fn on_status_change(&self, _change: &StatusChange) {}

    async fn on_diagnostic(&self, _diagnostic: &Diagnostic) {}

    async fn on_finish(&self, _outcome: RunOutcome, _iterations: usize) {}
}

/// A callback that ignores every event.
pub struct NoOpRefinementCallback;

#[async_trait::async_trait]
impl RefinementCallback for NoOpRefinementCallback {}

/// A callback that records all events for test assertions.
pub struct RecordingRefinementCallback {
    iterations: tokio::sync::Mutex<Vec<usize>>,
    targets: tokio::sync::Mutex<Vec<Target>>,
    merges: tokio::sync::Mutex<Vec<MergeReport>>,
    evaluations: tokio::sync::Mutex<Vec<(NodeId, Evaluation)>>,
    status_changes: tokio::sync::Mutex<Vec<StatusChange>>,
    diagnostics: tokio::sync::Mutex<Vec<Diagnostic>>,
    finish: tokio::sync::Mutex<Option<(RunOutcome, usize)>>,
}

impl RecordingRefinementCallback {
    pub fn new() -> Self {
        Self {
            iterations: tokio::sync::Mutex::new(Vec::new()),
            targets: tokio::sync::Mutex::new(Vec::new()),
            merges: tokio::sync::Mutex::new(Vec::new()),
            evaluations: tokio::sync::Mutex::new(Vec::new()),
            status_changes: tokio::sync::Mutex::new(Vec::new()),
            diagnostics: tokio::sync::Mutex::new(Vec::new()),
            finish: tokio::sync::Mutex::new(None),
        }
    }

    pub async fn iterations(&self) -> Vec<usize> {
        self.iterations.lock().await.clone()
    }

    pub async fn targets(&self) -> Vec<Target> {
        self.targets.lock().await.clone()
    }

    pub async fn merges(&self) -> Vec<MergeReport> {
        self.merges.lock().await.clone()
    }

    pub async fn evaluations(&self) -> Vec<(NodeId, Evaluation)> {
        self.evaluations.lock().await.clone()
    }

    pub async fn status_changes(&self) -> Vec<StatusChange> {
        self.status_changes.lock().await.clone()
    }

    pub async fn diagnostics(&self) -> Vec<Diagnostic> {
        self.diagnostics.lock().await.clone()
    }

    pub async fn finish(&self) -> Option<(RunOutcome, usize)> {
        *self.finish.lock().await
    }
}

impl Default for RecordingRefinementCallback {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait::async_trait]
impl RefinementCallback for RecordingRefinementCallback {
    async fn on_iteration_start(&self, iteration: usize, _max_iterations: usize) {
        self.iterations.lock().await.push(iteration);
    }

    async fn on_target_selected(&self, target: &Target) {
        self.targets.lock().await.push(target.clone());
    }

    async fn on_merge(&self, report: &MergeReport) {
        self.merges.lock().await.push(report.clone());
    }

    async fn on_evaluation(&self, node_id: &NodeId, evaluation: &Evaluation) {
        self.evaluations
            .lock()
            .await
            .push((node_id.clone(), evaluation.clone()));
    }

    async fn on_status_change(&self, change: &StatusChange) {
        self.status_changes.lock().await.push(change.clone());
    }

    async fn on_diagnostic(&self, diagnostic: &Diagnostic) {
        self.diagnostics.lock().await.push(diagnostic.clone());
    }

    async fn on_finish(&self, outcome: RunOutcome, iterations: usize) {
        *self.finish.lock().await = Some((outcome, iterations));
    }
}
