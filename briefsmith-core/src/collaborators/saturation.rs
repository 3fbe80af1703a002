//! Diminishing-returns evaluator.
//!
//! A node is saturated once a refinement pass stops producing significant new
//! facts, or once it already holds plenty of them. Otherwise the node fails
//! with follow-up queries aimed at what it is missing: fact categories it has
//! no coverage for and entities mentioned only once.

use std::collections::{HashMap, HashSet};
use std::sync::Mutex;

use super::Evaluator;
use crate::brief::{Brief, Evaluation, FactCategory, KnowledgeNode, NodeId};
use crate::config::EvaluationConfig;
use crate::error::CollaboratorError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SaturationSettings {
    /// Facts scoring strictly above this are significant.
    pub significance_threshold: u8,
    /// A pass adding fewer significant facts than this saturates the node.
    pub min_new_significant: usize,
    /// A node holding this many significant facts is saturated outright.
    pub saturation_fact_count: usize,
    pub max_follow_up_queries: usize,
}

impl Default for SaturationSettings {
    fn default() -> Self {
        Self {
            significance_threshold: 5,
            min_new_significant: 2,
            saturation_fact_count: 12,
            max_follow_up_queries: 6,
        }
    }
}

impl From<&EvaluationConfig> for SaturationSettings {
    fn from(config: &EvaluationConfig) -> Self {
        Self {
            significance_threshold: config.significance_threshold,
            min_new_significant: config.min_new_significant,
            saturation_fact_count: config.saturation_fact_count,
            max_follow_up_queries: config.max_follow_up_queries,
        }
    }
}

pub struct SaturationEvaluator {
    settings: SaturationSettings,
    /// Significant-fact count of each node at its previous evaluation.
    seen: Mutex<HashMap<NodeId, usize>>,
}

impl SaturationEvaluator {
    pub fn new(settings: SaturationSettings) -> Self {
        Self {
            settings,
            seen: Mutex::new(HashMap::new()),
        }
    }

    pub fn settings(&self) -> &SaturationSettings {
        &self.settings
    }

    fn grade(&self, subject: &str, node: &KnowledgeNode) -> Evaluation {
        let s = &self.settings;
        let significant = node.significant_fact_count(s.significance_threshold);
        let previous = {
            let mut seen = self.seen.lock().unwrap_or_else(|p| p.into_inner());
            seen.insert(node.node_id.clone(), significant)
        };

        if let Some(previous) = previous {
            let added = significant.saturating_sub(previous);
            if added < s.min_new_significant {
                return Evaluation::pass(format!(
                    "Diminishing returns: last pass added {added} significant fact(s)"
                ));
            }
        }
        if significant >= s.saturation_fact_count {
            return Evaluation::pass(format!(
                "Coverage complete with {significant} significant facts"
            ));
        }

        Evaluation::fail(
            format!(
                "{significant} significant fact(s) so far; gaps remain in '{}'",
                node.node_title
            ),
            self.follow_ups(subject, node),
        )
    }

    fn follow_ups(&self, subject: &str, node: &KnowledgeNode) -> Vec<String> {
        let title = node.node_title.as_str();
        let covered: HashSet<FactCategory> = node.fact_points.iter().map(|f| f.category).collect();

        let mut mentions: Vec<(String, usize)> = Vec::new();
        for entity in node.fact_points.iter().flat_map(|f| &f.related_entities) {
            let entity = entity.trim();
            if entity.is_empty() {
                continue;
            }
            match mentions
                .iter_mut()
                .find(|(e, _)| e.eq_ignore_ascii_case(entity))
            {
                Some((_, n)) => *n += 1,
                None => mentions.push((entity.to_string(), 1)),
            }
        }

        let missing_categories = CATEGORY_TOPICS
            .iter()
            .filter(|(c, _)| !covered.contains(c))
            .map(|(_, topic)| format!("{subject} {title} {topic}"));
        let thin_entities = mentions
            .into_iter()
            .filter(|(_, n)| *n == 1)
            .map(|(entity, _)| format!("{entity} {title}"));
        let fallback = [
            format!("{subject} {title}"),
            format!("{title} {}", node.rationale),
        ];

        let mut queries: Vec<String> = Vec::new();
        for q in missing_categories.chain(thin_entities).chain(fallback) {
            let q = q.split_whitespace().collect::<Vec<_>>().join(" ");
            if !q.is_empty() && !queries.contains(&q) {
                queries.push(q);
            }
            if queries.len() >= self.settings.max_follow_up_queries.max(1) {
                break;
            }
        }
        queries
    }
}

impl Default for SaturationEvaluator {
    fn default() -> Self {
        Self::new(SaturationSettings::default())
    }
}

const CATEGORY_TOPICS: [(FactCategory, &str); 5] = [
    (FactCategory::KeyEvent, "key events and turning points"),
    (FactCategory::KeyFigure, "key people involved"),
    (FactCategory::QuirkyAnecdote, "anecdotes and lesser-known stories"),
    (FactCategory::TechnicalDetail, "technical details"),
    (FactCategory::WorldBuilding, "historical and social context"),
];

#[async_trait::async_trait]
impl Evaluator for SaturationEvaluator {
    async fn evaluate(&self, brief: &Brief) -> Result<Evaluation, CollaboratorError> {
        let node = brief
            .active_nodes()
            .next()
            .ok_or(CollaboratorError::NoActiveNode)?;
        let evaluation = self.grade(&brief.subject, node);
        tracing::debug!(
            node_id = %node.node_id,
            grade = ?evaluation.grade,
            follow_ups = evaluation.follow_up_queries.len(),
            "Saturation evaluation"
        );
        Ok(evaluation)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::brief::fixtures::{brief, fact};
    use crate::brief::{Grade, ResearchStatus};

    fn active_brief(facts: usize, significance: u8) -> Brief {
        let mut b = brief(&["Origins"]);
        b.knowledge_nodes[0].set_status(ResearchStatus::Active);
        add_facts(&mut b, 0, facts, significance);
        b
    }

    fn add_facts(b: &mut Brief, from: usize, count: usize, significance: u8) {
        for i in from..from + count {
            let mut f = fact(&format!("fp_{i}"), &format!("Fact {i}"), "https://a.example");
            f.narrative_significance = significance;
            b.knowledge_nodes[0].fact_points.push(f);
        }
    }

    #[tokio::test]
    async fn test_first_evaluation_fails_with_follow_ups() {
        let evaluator = SaturationEvaluator::default();
        let eval = evaluator.evaluate(&active_brief(3, 8)).await.unwrap();
        assert_eq!(eval.grade, Grade::Fail);
        assert!(eval.validate().is_ok());
        assert!(eval.follow_up_queries.len() <= 6);
        assert!(
            eval.follow_up_queries
                .iter()
                .any(|q| q.contains("anecdotes and lesser-known stories"))
        );
        assert!(!eval.follow_up_queries.iter().any(|q| q.contains("key events")));
    }

    #[tokio::test]
    async fn test_diminishing_returns_pass() {
        let evaluator = SaturationEvaluator::default();
        let mut b = active_brief(3, 8);
        assert_eq!(evaluator.evaluate(&b).await.unwrap().grade, Grade::Fail);

        add_facts(&mut b, 3, 3, 8);
        assert_eq!(evaluator.evaluate(&b).await.unwrap().grade, Grade::Fail);

        // One significant and several minor facts is not enough progress.
        add_facts(&mut b, 6, 1, 9);
        add_facts(&mut b, 7, 4, 2);
        let eval = evaluator.evaluate(&b).await.unwrap();
        assert_eq!(eval.grade, Grade::Pass);
        assert!(eval.comment.contains("Diminishing returns"));
    }

    #[tokio::test]
    async fn test_plenty_of_facts_pass_immediately() {
        let evaluator = SaturationEvaluator::default();
        let eval = evaluator.evaluate(&active_brief(12, 6)).await.unwrap();
        assert_eq!(eval.grade, Grade::Pass);
    }

    #[tokio::test]
    async fn test_under_covered_entities_become_queries() {
        let evaluator = SaturationEvaluator::new(SaturationSettings {
            max_follow_up_queries: 10,
            ..SaturationSettings::default()
        });
        let mut b = active_brief(2, 8);
        b.knowledge_nodes[0].fact_points[0].related_entities = vec!["Henry Ford".into(), "Detroit".into()];
        b.knowledge_nodes[0].fact_points[1].related_entities = vec!["detroit".into()];
        let eval = evaluator.evaluate(&b).await.unwrap();
        assert!(eval.follow_up_queries.contains(&"Henry Ford Origins".to_string()));
        assert!(!eval.follow_up_queries.iter().any(|q| q.starts_with("Detroit")));
    }

    #[tokio::test]
    async fn test_no_active_node() {
        let evaluator = SaturationEvaluator::default();
        let err = evaluator.evaluate(&brief(&["Origins"])).await.unwrap_err();
        assert_eq!(err, CollaboratorError::NoActiveNode);
    }
}
