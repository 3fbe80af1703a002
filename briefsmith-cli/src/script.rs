//! Replay scripts for `briefsmith run`.
//!
//! A script records everything the collaborators would have said during a run:
//! the plan, the research updates in call order, and either the evaluations
//! in call order or a request to use the built-in saturation evaluator.
//!
//! Instead of `updates`, a script may record the raw text a search backend
//! returned for each query under `responses`. Those runs go through the
//! fan-out provider, which researches every query of a node concurrently and
//! pulls the JSON update out of each response.
//!
//! ```json
//! {
//!   "subject": "Ford Motor Company",
//!   "plan": { "narrative_summary": "...", "knowledge_nodes": [ ... ] },
//!   "updates": [ { "node_title": "Origins", "top_sources": [], "fact_points": [] } ],
//!   "evaluator": "scripted",
//!   "evaluations": [ { "grade": "pass", "comment": "..." } ],
//!   "report": "Founded in 1903 <cite source=\"src-1\"/>."
//! }
//! ```

use anyhow::Context;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Arc;

use briefsmith_core::collaborators::{
    FanOutResearchProvider, QueryResearcher, SaturationEvaluator, SaturationSettings,
    ScriptedEvaluator, ScriptedPlanGenerator, ScriptedResearchProvider, parse_json_response,
};
use briefsmith_core::config::BriefsmithConfig;
use briefsmith_core::{
    Brief, CollaboratorError, Evaluation, Evaluator, NodeUpdate, Pipeline, Plan, ReportComposer,
    ResearchMode, ResearchProvider, SourceRegistry,
};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EvaluatorMode {
    #[default]
    Scripted,
    Saturation,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Script {
    pub subject: String,
    pub plan: Plan,
    #[serde(default)]
    pub updates: Vec<NodeUpdate>,
    /// Raw backend text per query. Takes precedence over `updates`.
    #[serde(default)]
    pub responses: BTreeMap<String, String>,
    #[serde(default)]
    pub evaluator: EvaluatorMode,
    #[serde(default)]
    pub evaluations: Vec<Evaluation>,
    /// Narrative text with citation markers, resolved after the run.
    #[serde(default)]
    pub report: Option<String>,
}

/// Composer that returns fixed text.
struct FixedReport(String);

#[async_trait::async_trait]
impl ReportComposer for FixedReport {
    async fn compose(
        &self,
        _brief: &Brief,
        _registry: &SourceRegistry,
    ) -> Result<String, CollaboratorError> {
        Ok(self.0.clone())
    }
}

/// Answers each query from its recorded response text.
struct RecordedResponses(BTreeMap<String, String>);

#[async_trait::async_trait]
impl QueryResearcher for RecordedResponses {
    async fn research_query(
        &self,
        node_title: &str,
        query: &str,
        _mode: ResearchMode,
    ) -> Result<NodeUpdate, CollaboratorError> {
        match self.0.get(query) {
            Some(text) => parse_json_response("research provider", text),
            None => {
                tracing::debug!(query, "No recorded response");
                Ok(NodeUpdate::empty(node_title))
            }
        }
    }
}

impl Script {
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read script {}", path.display()))?;
        serde_json::from_str(&text)
            .with_context(|| format!("Failed to parse script {}", path.display()))
    }

    /// Build a pipeline that replays this script under `config`.
    pub fn into_pipeline(self, config: &BriefsmithConfig) -> Pipeline {
        let planner = Arc::new(ScriptedPlanGenerator::with_plan(self.plan));

        let research: Arc<dyn ResearchProvider> = if self.responses.is_empty() {
            let scripted = ScriptedResearchProvider::new();
            for update in self.updates {
                scripted.queue_update(update);
            }
            Arc::new(scripted)
        } else {
            Arc::new(FanOutResearchProvider::from_config(
                Arc::new(RecordedResponses(self.responses)),
                &config.refinement,
            ))
        };

        let evaluator: Arc<dyn Evaluator> = match self.evaluator {
            EvaluatorMode::Saturation => Arc::new(SaturationEvaluator::new(
                SaturationSettings::from(&config.evaluation),
            )),
            EvaluatorMode::Scripted => {
                let scripted = ScriptedEvaluator::new();
                for evaluation in self.evaluations {
                    scripted.queue_evaluation(evaluation);
                }
                Arc::new(scripted)
            }
        };

        let pipeline = Pipeline::new(planner, research, evaluator).with_config(&config.refinement);
        match self.report {
            Some(text) => pipeline.with_composer(Arc::new(FixedReport(text))),
            None => pipeline,
        }
    }
}
