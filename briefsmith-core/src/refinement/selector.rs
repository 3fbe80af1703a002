//! Node selector: which node the next iteration works on.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::brief::{Brief, NodeId, ResearchStatus};

/// Whether a node is being researched for the first time or refined.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResearchMode {
    Initial,
    Refinement,
}

impl fmt::Display for ResearchMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ResearchMode::Initial => f.write_str("initial"),
            ResearchMode::Refinement => f.write_str("refinement"),
        }
    }
}

/// The node chosen for an iteration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Target {
    pub node_id: NodeId,
    pub node_title: String,
    pub mode: ResearchMode,
}

/// Pick the next target.
///
/// The first ACTIVE node is refined; otherwise the first PENDING node in brief
/// order gets its initial pass. `None` means every node is terminal.
pub fn select_target(brief: &Brief) -> Option<Target> {
    let pick = |status: ResearchStatus, mode: ResearchMode| {
        brief
            .knowledge_nodes
            .iter()
            .find(|n| n.research_status == status)
            .map(|n| Target {
                node_id: n.node_id.clone(),
                node_title: n.node_title.clone(),
                mode,
            })
    };
    pick(ResearchStatus::Active, ResearchMode::Refinement)
        .or_else(|| pick(ResearchStatus::Pending, ResearchMode::Initial))
}
