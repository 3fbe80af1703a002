//! Non-fatal problems recorded during a refinement run.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::brief::NodeId;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DiagnosticKind {
    /// More than one node was ACTIVE; the first one was used.
    MultipleActiveNodes,
    /// The update named a node that does not exist; the merge was skipped.
    NodeNotFound,
    /// The update named a node other than the selected target.
    TargetMismatch,
    /// The update failed schema validation.
    InvalidUpdate,
    /// The research provider returned something unusable.
    MalformedResearch,
    /// The evaluator returned something unusable.
    MalformedEvaluation,
    /// The evaluator found no ACTIVE node to grade.
    NoActiveNode,
    /// A refinement pass had no stored follow-ups and reused the seed queries.
    MissingFollowUps,
}

impl fmt::Display for DiagnosticKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            DiagnosticKind::MultipleActiveNodes => "multiple_active_nodes",
            DiagnosticKind::NodeNotFound => "node_not_found",
            DiagnosticKind::TargetMismatch => "target_mismatch",
            DiagnosticKind::InvalidUpdate => "invalid_update",
            DiagnosticKind::MalformedResearch => "malformed_research",
            DiagnosticKind::MalformedEvaluation => "malformed_evaluation",
            DiagnosticKind::NoActiveNode => "no_active_node",
            DiagnosticKind::MissingFollowUps => "missing_follow_ups",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Diagnostic {
    /// 1-based iteration in which the problem was seen.
    pub iteration: usize,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub node_id: Option<NodeId>,
    pub kind: DiagnosticKind,
    pub message: String,
}

impl Diagnostic {
    pub fn new(
        iteration: usize,
        node_id: Option<NodeId>,
        kind: DiagnosticKind,
        message: impl Into<String>,
    ) -> Self {
        Self {
            iteration,
            node_id,
            kind,
            message: message.into(),
        }
    }
}
