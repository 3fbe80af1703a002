//! The brief: the shared document the refinement loop fills in.
//!
//! A [`Brief`] is an ordered list of [`KnowledgeNode`]s, each tracking its own
//! research status, sources and extracted facts. The serialized field names and
//! the four-valued [`ResearchStatus`] are the exchange format for finalized
//! briefs, so renames here are breaking changes.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use std::collections::HashSet;
use std::fmt;
use uuid::Uuid;

use crate::error::SchemaError;

/// Lowest narrative-significance score a fact may carry.
pub const MIN_SIGNIFICANCE: u8 = 1;
/// Highest narrative-significance score a fact may carry.
pub const MAX_SIGNIFICANCE: u8 = 10;

/// Stable identifier of a node within a brief (`node-1`, `node-2`, ...).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct NodeId(String);

impl NodeId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// The id assigned to the node at `index` (0-based) of a freshly planned brief.
    pub fn for_index(index: usize) -> Self {
        Self(format!("node-{}", index + 1))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Research status of a knowledge node.
///
/// Transitions: `Pending -> Active -> {Active | Saturated | Stalled}`, plus the
/// external override `Pending -> Stalled`. Saturated and Stalled are terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResearchStatus {
    #[default]
    Pending,
    Active,
    Saturated,
    Stalled,
}

impl ResearchStatus {
    /// The closed set of statuses the termination predicate accepts.
    pub const TERMINAL: [ResearchStatus; 2] = [ResearchStatus::Saturated, ResearchStatus::Stalled];

    pub fn is_terminal(self) -> bool {
        Self::TERMINAL.contains(&self)
    }

    /// Whether moving from `self` to `next` respects the monotonic state machine.
    pub fn can_transition_to(self, next: ResearchStatus) -> bool {
        use ResearchStatus::*;
        match (self, next) {
            (Pending, Active) | (Pending, Stalled) => true,
            (Active, Active) | (Active, Saturated) | (Active, Stalled) => true,
            (a, b) => a == b && a.is_terminal(),
        }
    }
}

impl fmt::Display for ResearchStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ResearchStatus::Pending => "pending",
            ResearchStatus::Active => "active",
            ResearchStatus::Saturated => "saturated",
            ResearchStatus::Stalled => "stalled",
        };
        f.write_str(s)
    }
}

/// The narrative axis a node belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Axis {
    Chronological,
    Thematic,
    #[serde(alias = "entity_centric")]
    KeyFiguresAndEntities,
    Contextual,
}

/// Classification of a fact, used to balance the eventual narrative.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum FactCategory {
    #[serde(rename = "Key Event")]
    KeyEvent,
    #[serde(rename = "Key Figure")]
    KeyFigure,
    #[serde(rename = "Quirky Anecdote")]
    QuirkyAnecdote,
    #[serde(rename = "Technical Detail")]
    TechnicalDetail,
    #[serde(rename = "World-Building")]
    WorldBuilding,
}

/// A source selected for a node. The URL is its identity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Source {
    pub url: String,
    pub title: String,
    /// One sentence on why the source was kept.
    #[serde(default)]
    pub rationale: String,
}

/// A single extracted fact.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Fact {
    pub fact_id: String,
    pub description: String,
    pub category: FactCategory,
    /// Story impact, 1-10.
    pub narrative_significance: u8,
    #[serde(default)]
    pub visual_suggestion: String,
    #[serde(default)]
    pub related_entities: Vec<String>,
    /// Cross-links to other facts; only populated by finalization.
    #[serde(default)]
    pub related_fact_ids: Vec<String>,
    pub source_url: String,
}

/// One trackable unit of research.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct KnowledgeNode {
    pub node_id: NodeId,
    pub node_title: String,
    pub rationale: String,
    pub axis: Axis,
    #[serde(default)]
    pub research_status: ResearchStatus,
    /// Seed queries from the plan, used for the initial pass.
    #[serde(default)]
    pub search_queries: Vec<String>,
    #[serde(default)]
    pub top_sources: Vec<Source>,
    #[serde(default)]
    pub fact_points: Vec<Fact>,
}

impl KnowledgeNode {
    /// A pending node built from a plan seed.
    pub fn from_seed(node_id: NodeId, seed: &NodeSeed) -> Self {
        Self {
            node_id,
            node_title: seed.node_title.trim().to_string(),
            rationale: seed.rationale.clone(),
            axis: seed.axis,
            research_status: ResearchStatus::Pending,
            search_queries: seed.search_queries.clone(),
            top_sources: Vec::new(),
            fact_points: Vec::new(),
        }
    }

    /// Move to `next` if the state machine allows it. Returns whether the status changed.
    pub fn set_status(&mut self, next: ResearchStatus) -> bool {
        if self.research_status == next || !self.research_status.can_transition_to(next) {
            return false;
        }
        self.research_status = next;
        true
    }

    /// Abandon the node. Terminal nodes are left as they are.
    pub fn stall(&mut self) -> bool {
        self.set_status(ResearchStatus::Stalled)
    }

    /// Number of facts scoring strictly above `threshold`.
    pub fn significant_fact_count(&self, threshold: u8) -> usize {
        self.fact_points
            .iter()
            .filter(|f| f.narrative_significance > threshold)
            .count()
    }
}

/// The shared document under incremental construction.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Brief {
    pub reference_id: String,
    pub subject: String,
    pub generation_date: DateTime<Utc>,
    pub narrative_summary: String,
    pub knowledge_nodes: Vec<KnowledgeNode>,
}

impl Brief {
    /// A brief with no nodes.
    pub fn empty(subject: impl Into<String>) -> Self {
        Self {
            reference_id: Uuid::new_v4().to_string(),
            subject: subject.into(),
            generation_date: Utc::now(),
            narrative_summary: String::new(),
            knowledge_nodes: Vec::new(),
        }
    }

    /// Build the skeleton brief for an approved plan: every node pending and empty.
    pub fn from_plan(subject: impl Into<String>, plan: &Plan) -> Self {
        let knowledge_nodes = plan
            .knowledge_nodes
            .iter()
            .enumerate()
            .map(|(i, seed)| KnowledgeNode::from_seed(NodeId::for_index(i), seed))
            .collect();
        Self {
            narrative_summary: plan.narrative_summary.clone(),
            knowledge_nodes,
            ..Self::empty(subject)
        }
    }

    pub fn node(&self, id: &NodeId) -> Option<&KnowledgeNode> {
        self.knowledge_nodes.iter().find(|n| &n.node_id == id)
    }

    pub fn node_mut(&mut self, id: &NodeId) -> Option<&mut KnowledgeNode> {
        self.knowledge_nodes.iter_mut().find(|n| &n.node_id == id)
    }

    pub fn node_by_title(&self, title: &str) -> Option<&KnowledgeNode> {
        self.knowledge_nodes.iter().find(|n| n.node_title == title)
    }

    pub fn node_by_title_mut(&mut self, title: &str) -> Option<&mut KnowledgeNode> {
        self.knowledge_nodes
            .iter_mut()
            .find(|n| n.node_title == title)
    }

    /// Nodes currently ACTIVE, in brief order.
    pub fn active_nodes(&self) -> impl Iterator<Item = &KnowledgeNode> {
        self.knowledge_nodes
            .iter()
            .filter(|n| n.research_status == ResearchStatus::Active)
    }

    pub fn count_with_status(&self, status: ResearchStatus) -> usize {
        self.knowledge_nodes
            .iter()
            .filter(|n| n.research_status == status)
            .count()
    }

    pub fn fact_count(&self) -> usize {
        self.knowledge_nodes.iter().map(|n| n.fact_points.len()).sum()
    }

    pub fn source_count(&self) -> usize {
        self.knowledge_nodes.iter().map(|n| n.top_sources.len()).sum()
    }

    /// Check the structural invariants of the brief. Any violation makes the
    /// brief unusable for budget computation.
    pub fn validate(&self) -> Result<(), SchemaError> {
        let mut ids = HashSet::new();
        let mut titles = HashSet::new();
        for node in &self.knowledge_nodes {
            if !ids.insert(&node.node_id) {
                return Err(SchemaError::new(
                    "brief",
                    format!("duplicate node id '{}'", node.node_id),
                ));
            }
            if node.node_title.trim().is_empty() {
                return Err(SchemaError::new(
                    "brief",
                    format!("node '{}' has an empty title", node.node_id),
                ));
            }
            if !titles.insert(node.node_title.as_str()) {
                return Err(SchemaError::new(
                    "brief",
                    format!("duplicate node title '{}'", node.node_title),
                ));
            }
            let mut fact_ids = HashSet::new();
            for fact in &node.fact_points {
                if !fact_ids.insert(fact.fact_id.as_str()) {
                    return Err(SchemaError::new(
                        "brief",
                        format!(
                            "duplicate fact id '{}' in node '{}'",
                            fact.fact_id, node.node_title
                        ),
                    ));
                }
                check_significance("brief", fact)?;
            }
        }
        if self.active_nodes().count() > 1 {
            return Err(SchemaError::new("brief", "more than one active node"));
        }
        Ok(())
    }
}

/// A node as proposed by the plan generator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NodeSeed {
    pub node_title: String,
    pub rationale: String,
    pub axis: Axis,
    #[serde(default)]
    pub search_queries: Vec<String>,
}

/// Output of the plan generator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Plan {
    pub narrative_summary: String,
    pub knowledge_nodes: Vec<NodeSeed>,
}

impl Plan {
    /// A plan needs at least one node and unique, non-empty titles.
    pub fn validate(&self) -> Result<(), SchemaError> {
        if self.knowledge_nodes.is_empty() {
            return Err(SchemaError::new("plan", "no knowledge nodes"));
        }
        let mut titles = HashSet::new();
        for seed in &self.knowledge_nodes {
            let title = seed.node_title.trim();
            if title.is_empty() {
                return Err(SchemaError::new("plan", "node with an empty title"));
            }
            if !titles.insert(title) {
                return Err(SchemaError::new(
                    "plan",
                    format!("duplicate node title '{title}'"),
                ));
            }
        }
        Ok(())
    }
}

/// A grounding record from the research provider: a text segment backed by a URL.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GroundingSupport {
    pub url: String,
    #[serde(default)]
    pub text_segment: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub confidence: Option<f64>,
}

/// Newly discovered sources and facts for one node. Consumed by the merge engine.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct NodeUpdate {
    pub node_title: String,
    #[serde(default)]
    pub top_sources: Vec<Source>,
    #[serde(default)]
    pub fact_points: Vec<Fact>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub supports: Vec<GroundingSupport>,
}

impl NodeUpdate {
    /// An update that found nothing. Valid: queries may exhaust what is available.
    pub fn empty(node_title: impl Into<String>) -> Self {
        Self {
            node_title: node_title.into(),
            ..Self::default()
        }
    }

    pub fn is_empty(&self) -> bool {
        self.top_sources.is_empty() && self.fact_points.is_empty()
    }

    pub fn validate(&self) -> Result<(), SchemaError> {
        const RECORD: &str = "node update";
        if self.node_title.trim().is_empty() {
            return Err(SchemaError::new(RECORD, "empty node title"));
        }
        if let Some(source) = self.top_sources.iter().find(|s| s.url.trim().is_empty()) {
            return Err(SchemaError::new(
                RECORD,
                format!("source '{}' has an empty url", source.title),
            ));
        }
        for fact in &self.fact_points {
            if fact.fact_id.trim().is_empty() {
                return Err(SchemaError::new(RECORD, "fact with an empty id"));
            }
            if fact.description.trim().is_empty() {
                return Err(SchemaError::new(
                    RECORD,
                    format!("fact '{}' has an empty description", fact.fact_id),
                ));
            }
            check_significance(RECORD, fact)?;
        }
        if let Some(support) = self
            .supports
            .iter()
            .find(|s| s.confidence.is_some_and(|c| !(0.0..=1.0).contains(&c)))
        {
            return Err(SchemaError::new(
                RECORD,
                format!("support for '{}' has confidence out of range", support.url),
            ));
        }
        Ok(())
    }
}

fn check_significance(record: &'static str, fact: &Fact) -> Result<(), SchemaError> {
    if (MIN_SIGNIFICANCE..=MAX_SIGNIFICANCE).contains(&fact.narrative_significance) {
        Ok(())
    } else {
        Err(SchemaError::new(
            record,
            format!(
                "fact '{}' has significance {} outside {}-{}",
                fact.fact_id, fact.narrative_significance, MIN_SIGNIFICANCE, MAX_SIGNIFICANCE
            ),
        ))
    }
}

/// Evaluator verdict on the ACTIVE node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Grade {
    Pass,
    Fail,
}

/// Evaluator output for one iteration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Evaluation {
    pub grade: Grade,
    #[serde(default)]
    pub comment: String,
    /// Only meaningful on FAIL, where it must be non-empty.
    #[serde(default, deserialize_with = "deserialize_follow_ups")]
    pub follow_up_queries: Vec<String>,
}

impl Evaluation {
    pub fn pass(comment: impl Into<String>) -> Self {
        Self {
            grade: Grade::Pass,
            comment: comment.into(),
            follow_up_queries: Vec::new(),
        }
    }

    pub fn fail<I, Q>(comment: impl Into<String>, queries: I) -> Self
    where
        I: IntoIterator<Item = Q>,
        Q: Into<String>,
    {
        Self {
            grade: Grade::Fail,
            comment: comment.into(),
            follow_up_queries: queries.into_iter().map(Into::into).collect(),
        }
    }

    pub fn validate(&self) -> Result<(), SchemaError> {
        if self.grade == Grade::Fail {
            if self.follow_up_queries.is_empty() {
                return Err(SchemaError::new(
                    "evaluation",
                    "fail grade without follow-up queries",
                ));
            }
            if self.follow_up_queries.iter().any(|q| q.trim().is_empty()) {
                return Err(SchemaError::new("evaluation", "blank follow-up query"));
            }
        }
        Ok(())
    }
}

/// Follow-ups arrive either as plain strings or as `{"search_query": "..."}`
/// objects, and may be `null`.
fn deserialize_follow_ups<'de, D>(deserializer: D) -> Result<Vec<String>, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum FollowUp {
        Text(String),
        Query { search_query: String },
    }

    let raw: Option<Vec<FollowUp>> = Option::deserialize(deserializer)?;
    Ok(raw
        .unwrap_or_default()
        .into_iter()
        .map(|f| match f {
            FollowUp::Text(q) => q,
            FollowUp::Query { search_query } => search_query,
        })
        .collect())
}

#[cfg(test)]
pub(crate) mod fixtures {
    use super::*;

    pub fn seed(title: &str) -> NodeSeed {
        NodeSeed {
            node_title: title.to_string(),
            rationale: format!("Why {title} matters"),
            axis: Axis::Chronological,
            search_queries: vec![format!("{title} history")],
        }
    }

    pub fn plan(titles: &[&str]) -> Plan {
        Plan {
            narrative_summary: "A short story".to_string(),
            knowledge_nodes: titles.iter().map(|t| seed(t)).collect(),
        }
    }

    pub fn brief(titles: &[&str]) -> Brief {
        Brief::from_plan("Test subject", &plan(titles))
    }

    pub fn source(url: &str) -> Source {
        Source {
            url: url.to_string(),
            title: format!("Title of {url}"),
            rationale: "Primary account".to_string(),
        }
    }

    pub fn fact(id: &str, description: &str, url: &str) -> Fact {
        Fact {
            fact_id: id.to_string(),
            description: description.to_string(),
            category: FactCategory::KeyEvent,
            narrative_significance: 7,
            visual_suggestion: "Archival footage".to_string(),
            related_entities: Vec::new(),
            related_fact_ids: Vec::new(),
            source_url: url.to_string(),
        }
    }
}
