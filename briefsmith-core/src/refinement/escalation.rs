//! Escalation and termination checker.
//!
//! Applies an evaluation to the ACTIVE node and decides whether the whole
//! brief is done. The checker only ever promotes ACTIVE to SATURATED; STALLED
//! is reserved for external overrides.

use crate::brief::{Brief, Evaluation, Grade, NodeId, ResearchStatus};

/// A status change made by the checker.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatusChange {
    pub node_id: NodeId,
    pub from: ResearchStatus,
    pub to: ResearchStatus,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Escalation {
    pub change: Option<StatusChange>,
    pub complete: bool,
}

/// Every node is in the terminal set `{SATURATED, STALLED}`.
pub fn is_complete(brief: &Brief) -> bool {
    brief
        .knowledge_nodes
        .iter()
        .all(|n| n.research_status.is_terminal())
}

/// Apply `evaluation` to the first ACTIVE node: PASS saturates it, FAIL leaves
/// it ACTIVE for another refinement. Nodes that are not ACTIVE are never touched.
pub fn escalate(brief: &mut Brief, evaluation: Option<&Evaluation>) -> Escalation {
    let change = evaluation
        .filter(|e| e.grade == Grade::Pass)
        .and_then(|_| {
            brief
                .knowledge_nodes
                .iter_mut()
                .find(|n| n.research_status == ResearchStatus::Active)
        })
        .and_then(|node| {
            let from = node.research_status;
            node.set_status(ResearchStatus::Saturated)
                .then(|| StatusChange {
                    node_id: node.node_id.clone(),
                    from,
                    to: ResearchStatus::Saturated,
                })
        });

    if let Some(ref c) = change {
        tracing::info!(node_id = %c.node_id, from = %c.from, to = %c.to, "Node status changed");
    }

    Escalation {
        change,
        complete: is_complete(brief),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::brief::fixtures::brief;

    #[test]
    fn test_pass_saturates_active_node() {
        let mut b = brief(&["Origins", "Legacy"]);
        b.knowledge_nodes[0].set_status(ResearchStatus::Active);
        let out = escalate(&mut b, Some(&Evaluation::pass("done")));
        assert_eq!(
            out.change,
            Some(StatusChange {
                node_id: NodeId::new("node-1"),
                from: ResearchStatus::Active,
                to: ResearchStatus::Saturated,
            })
        );
        assert!(!out.complete);
    }

    #[test]
    fn test_fail_keeps_node_active() {
        let mut b = brief(&["Origins"]);
        b.knowledge_nodes[0].set_status(ResearchStatus::Active);
        let out = escalate(&mut b, Some(&Evaluation::fail("thin", ["more"])));
        assert_eq!(out.change, None);
        assert_eq!(b.knowledge_nodes[0].research_status, ResearchStatus::Active);
    }

    #[test]
    fn test_pass_without_active_node_changes_nothing() {
        let mut b = brief(&["Origins"]);
        let out = escalate(&mut b, Some(&Evaluation::pass("done")));
        assert_eq!(out.change, None);
        assert_eq!(b.knowledge_nodes[0].research_status, ResearchStatus::Pending);
    }

    #[test]
    fn test_completion_accepts_stalled_and_saturated() {
        let mut b = brief(&["Origins", "Legacy"]);
        b.knowledge_nodes[0].stall();
        b.knowledge_nodes[1].set_status(ResearchStatus::Active);
        let out = escalate(&mut b, Some(&Evaluation::pass("done")));
        assert!(out.complete);
    }

    #[test]
    fn test_no_evaluation_only_checks_completion() {
        let mut b = brief(&["Origins"]);
        b.knowledge_nodes[0].stall();
        let out = escalate(&mut b, None);
        assert_eq!(out.change, None);
        assert!(out.complete);
    }
}
