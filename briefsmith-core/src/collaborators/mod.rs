//! External collaborators the refinement engine depends on.
//!
//! The engine only sees these traits. How a plan is generated, how queries are
//! searched and how a node is graded belong to the implementations: scripted
//! queues for tests and replays, a fan-out researcher over a per-query backend,
//! and a diminishing-returns evaluator.

pub mod extract;
pub mod fan_out;
pub mod saturation;
pub mod scripted;

pub use extract::{extract_json_block, parse_json_response};
pub use fan_out::{FanOutResearchProvider, QueryResearcher};
pub use saturation::{SaturationEvaluator, SaturationSettings};
pub use scripted::{ScriptedEvaluator, ScriptedPlanGenerator, ScriptedResearchProvider};

use serde::{Deserialize, Serialize};

use crate::brief::{Brief, Evaluation, NodeId, NodeUpdate, Plan};
use crate::error::CollaboratorError;
use crate::refinement::ResearchMode;
use crate::registry::SourceRegistry;

/// One research call: the queries to run for a node.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResearchRequest {
    pub node_id: NodeId,
    /// Must be echoed back in the returned `NodeUpdate`.
    pub node_title: String,
    pub queries: Vec<String>,
    pub mode: ResearchMode,
}

/// Turns a subject into a plan of knowledge nodes.
#[async_trait::async_trait]
pub trait PlanGenerator: Send + Sync {
    async fn generate(&self, subject: &str) -> Result<Plan, CollaboratorError>;
}

/// Runs queries for one node and reports what it found. Finding nothing is a
/// valid, empty update.
#[async_trait::async_trait]
pub trait ResearchProvider: Send + Sync {
    async fn research(&self, request: &ResearchRequest) -> Result<NodeUpdate, CollaboratorError>;
}

/// Grades the ACTIVE node of a brief.
#[async_trait::async_trait]
pub trait Evaluator: Send + Sync {
    /// Returns [`CollaboratorError::NoActiveNode`] when there is nothing to grade.
    async fn evaluate(&self, brief: &Brief) -> Result<Evaluation, CollaboratorError>;
}

/// Writes a narrative from a finished brief, citing sources with
/// `<cite source="src-N"/>` markers.
#[async_trait::async_trait]
pub trait ReportComposer: Send + Sync {
    async fn compose(
        &self,
        brief: &Brief,
        registry: &SourceRegistry,
    ) -> Result<String, CollaboratorError>;
}
