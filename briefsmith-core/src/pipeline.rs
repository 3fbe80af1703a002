//! End-to-end pipeline: plan, skeleton, budget, refinement, finalization and
//! optional report composition with citation resolution.

use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::brief::Brief;
use crate::citation::{Resolution, resolve_citations};
use crate::collaborators::{Evaluator, PlanGenerator, ReportComposer, ResearchProvider};
use crate::config::RefinementConfig;
use crate::error::{CollaboratorError, PlanError, Result};
use crate::finalize::link_related_facts;
use crate::refinement::{
    BudgetPolicy, Diagnostic, NoOpRefinementCallback, RefinementCallback, RefinementLoop,
    RunOutcome,
};
use crate::registry::SourceRegistry;

/// Everything a pipeline run produced.
#[derive(Debug, Clone)]
pub struct PipelineOutput {
    pub brief: Brief,
    pub registry: SourceRegistry,
    pub outcome: RunOutcome,
    pub iterations: usize,
    /// The iteration ceiling the loop ran under.
    pub budget: usize,
    /// Composed narrative with citations resolved, when a composer is configured.
    pub report: Option<Resolution>,
    pub diagnostics: Vec<Diagnostic>,
}

impl PipelineOutput {
    /// True when the brief did not converge and should be treated as incomplete.
    pub fn is_partial(&self) -> bool {
        self.outcome.is_partial()
    }
}

pub struct Pipeline {
    planner: Arc<dyn PlanGenerator>,
    research: Arc<dyn ResearchProvider>,
    evaluator: Arc<dyn Evaluator>,
    composer: Option<Arc<dyn ReportComposer>>,
    budget: BudgetPolicy,
    call_timeout: Option<Duration>,
}

impl Pipeline {
    pub fn new(
        planner: Arc<dyn PlanGenerator>,
        research: Arc<dyn ResearchProvider>,
        evaluator: Arc<dyn Evaluator>,
    ) -> Self {
        Self {
            planner,
            research,
            evaluator,
            composer: None,
            budget: BudgetPolicy::default(),
            call_timeout: None,
        }
    }

    pub fn with_composer(mut self, composer: Arc<dyn ReportComposer>) -> Self {
        self.composer = Some(composer);
        self
    }

    /// Apply budget and deadline settings.
    pub fn with_config(mut self, config: &RefinementConfig) -> Self {
        self.budget = BudgetPolicy::from(config);
        self.call_timeout = config.call_timeout();
        self
    }

    /// Generate and validate a plan, then build the pending skeleton brief.
    pub async fn plan(&self, subject: &str) -> std::result::Result<Brief, PlanError> {
        let generate = self.planner.generate(subject);
        let plan = match self.call_timeout {
            Some(limit) => tokio::time::timeout(limit, generate).await.map_err(|_| {
                CollaboratorError::Timeout {
                    collaborator: "plan generator".to_string(),
                    timeout_secs: limit.as_secs(),
                }
            }),
            None => Ok(generate.await),
        }
        .and_then(|r| r)
        .map_err(PlanError::Generation)?;

        plan.validate()?;
        let brief = Brief::from_plan(subject, &plan);
        info!(
            subject = %subject,
            reference_id = %brief.reference_id,
            nodes = brief.knowledge_nodes.len(),
            "Plan approved"
        );
        Ok(brief)
    }

    pub async fn run(&self, subject: &str, cancel: CancellationToken) -> Result<PipelineOutput> {
        self.run_with_callback(subject, cancel, &NoOpRefinementCallback)
            .await
    }

    pub async fn run_with_callback(
        &self,
        subject: &str,
        cancel: CancellationToken,
        callback: &dyn RefinementCallback,
    ) -> Result<PipelineOutput> {
        let brief = self.plan(subject).await?;
        let budget = self.budget.for_brief(Some(&brief));

        let mut refinement = RefinementLoop::new(
            Arc::clone(&self.research),
            Arc::clone(&self.evaluator),
            budget,
        );
        if let Some(limit) = self.call_timeout {
            refinement = refinement.with_call_timeout(limit);
        }

        let run = refinement
            .run_with_callback(brief, SourceRegistry::new(), cancel, callback)
            .await?;

        let mut brief = run.brief;
        link_related_facts(&mut brief);
        if run.outcome.is_partial() {
            warn!(outcome = %run.outcome, "Brief is partial");
        }

        let report = match &self.composer {
            Some(composer) => match composer.compose(&brief, &run.registry).await {
                Ok(text) => {
                    let resolution = resolve_citations(&text, &run.registry);
                    info!(
                        resolved = resolution.resolved.len(),
                        unresolved = resolution.unresolved.len(),
                        "Report composed"
                    );
                    Some(resolution)
                }
                Err(e) => {
                    warn!(error = %e, "Report composition failed; returning brief only");
                    None
                }
            },
            None => None,
        };

        Ok(PipelineOutput {
            brief,
            registry: run.registry,
            outcome: run.outcome,
            iterations: run.iterations,
            budget,
            report,
            diagnostics: run.diagnostics,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::brief::fixtures::{fact, plan, source};
    use crate::brief::{Evaluation, NodeUpdate, ResearchStatus};
    use crate::collaborators::{ScriptedEvaluator, ScriptedPlanGenerator, ScriptedResearchProvider};
    use crate::error::BriefsmithError;

    struct CitingComposer;

    #[async_trait::async_trait]
    impl ReportComposer for CitingComposer {
        async fn compose(
            &self,
            brief: &Brief,
            _registry: &SourceRegistry,
        ) -> std::result::Result<String, CollaboratorError> {
            Ok(format!(
                "{} began early <cite source=\"src-1\"/>, or so says <cite source=\"src-42\"/>.",
                brief.subject
            ))
        }
    }

    fn update(title: &str) -> NodeUpdate {
        let mut f = fact("fp_1", &format!("{title} fact"), "https://a.example");
        f.related_entities = vec!["Ford".into()];
        NodeUpdate {
            node_title: title.to_string(),
            top_sources: vec![source("https://a.example")],
            fact_points: vec![f],
            supports: vec![],
        }
    }

    fn pipeline(titles: &[&str]) -> (Pipeline, Arc<ScriptedResearchProvider>) {
        let research = Arc::new(ScriptedResearchProvider::new());
        let evaluator = Arc::new(ScriptedEvaluator::new());
        for t in titles {
            research.queue_update(update(t));
            evaluator.queue_evaluation(Evaluation::pass("ok"));
        }
        let planner = Arc::new(ScriptedPlanGenerator::with_plan(plan(titles)));
        (Pipeline::new(planner, research.clone(), evaluator), research)
    }

    #[tokio::test]
    async fn test_pipeline_converges_and_finalizes() {
        let (p, _) = pipeline(&["Origins", "Legacy"]);
        let out = p
            .with_composer(Arc::new(CitingComposer))
            .run("Ford", CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(out.outcome, RunOutcome::Converged);
        assert!(!out.is_partial());
        assert_eq!(out.budget, 6);
        assert_eq!(out.iterations, 2);
        assert!(
            out.brief
                .knowledge_nodes
                .iter()
                .all(|n| n.research_status == ResearchStatus::Saturated)
        );
        // Both facts mention Ford; the second was re-keyed on merge.
        assert_eq!(
            out.brief.knowledge_nodes[0].fact_points[0].related_fact_ids,
            vec!["fp_1-2"]
        );

        let report = out.report.unwrap();
        assert_eq!(
            report.text,
            "Ford began early [Title of https://a.example](https://a.example), or so says."
        );
        assert_eq!(report.unresolved, vec!["src-42"]);
    }

    #[tokio::test]
    async fn test_invalid_plan_never_starts_loop() {
        let research = Arc::new(ScriptedResearchProvider::new());
        let planner = Arc::new(ScriptedPlanGenerator::with_plan(plan(&["A", "A"])));
        let p = Pipeline::new(planner, research.clone(), Arc::new(ScriptedEvaluator::new()));

        let err = p.run("Dupes", CancellationToken::new()).await.unwrap_err();
        assert!(matches!(err, BriefsmithError::Plan(PlanError::Invalid(_))));
        assert!(research.requests().is_empty());
    }

    #[tokio::test]
    async fn test_plan_generation_failure() {
        let planner = Arc::new(ScriptedPlanGenerator::new());
        let p = Pipeline::new(
            planner,
            Arc::new(ScriptedResearchProvider::new()),
            Arc::new(ScriptedEvaluator::new()),
        );
        let err = p.plan("Nothing").await.unwrap_err();
        assert!(matches!(err, PlanError::Generation(_)));
    }

    #[tokio::test]
    async fn test_configured_budget_applies() {
        let (p, research) = pipeline(&["Origins"]);
        let config = RefinementConfig {
            iterations_per_node: 0,
            ..RefinementConfig::default()
        };
        let out = p.with_config(&config).run("Ford", CancellationToken::new()).await.unwrap();
        assert_eq!(out.budget, 0);
        assert_eq!(out.outcome, RunOutcome::BudgetExhausted);
        assert!(out.is_partial());
        assert!(research.requests().is_empty());
    }
}
