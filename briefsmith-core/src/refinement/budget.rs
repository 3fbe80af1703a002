//! Iteration budget controller.
//!
//! The ceiling scales with the workload: three passes per node is enough for an
//! initial pass plus two refinements. A missing or malformed brief falls back
//! to a fixed ceiling.

use crate::brief::Brief;
use crate::config::RefinementConfig;

pub const ITERATIONS_PER_NODE: usize = 3;
pub const FALLBACK_MAX_ITERATIONS: usize = 50;

/// `3n` for a brief with `n` nodes.
pub fn compute_budget(node_count: usize) -> usize {
    node_count.saturating_mul(ITERATIONS_PER_NODE)
}

/// Budget parameters, usually taken from [`RefinementConfig`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BudgetPolicy {
    pub iterations_per_node: usize,
    pub fallback_max_iterations: usize,
}

impl Default for BudgetPolicy {
    fn default() -> Self {
        Self {
            iterations_per_node: ITERATIONS_PER_NODE,
            fallback_max_iterations: FALLBACK_MAX_ITERATIONS,
        }
    }
}

impl From<&RefinementConfig> for BudgetPolicy {
    fn from(config: &RefinementConfig) -> Self {
        Self {
            iterations_per_node: config.iterations_per_node,
            fallback_max_iterations: config.fallback_max_iterations,
        }
    }
}

impl BudgetPolicy {
    /// Ceiling for `brief`. An absent brief, one with no nodes, or one failing
    /// validation gets the fallback.
    pub fn for_brief(&self, brief: Option<&Brief>) -> usize {
        match brief {
            Some(b) if !b.knowledge_nodes.is_empty() && b.validate().is_ok() => b
                .knowledge_nodes
                .len()
                .saturating_mul(self.iterations_per_node),
            Some(_) => {
                tracing::warn!(
                    fallback = self.fallback_max_iterations,
                    "Brief is malformed; using fallback iteration budget"
                );
                self.fallback_max_iterations
            }
            None => self.fallback_max_iterations,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::brief::fixtures::brief;

    #[test]
    fn test_compute_budget_is_three_per_node() {
        assert_eq!(compute_budget(0), 0);
        assert_eq!(compute_budget(2), 6);
        assert_eq!(compute_budget(7), 21);
    }

    #[test]
    fn test_policy_matches_pure_function_by_default() {
        let b = brief(&["Origins", "Legacy"]);
        assert_eq!(BudgetPolicy::default().for_brief(Some(&b)), compute_budget(2));
    }

    #[test]
    fn test_fallback_for_missing_or_malformed_brief() {
        let policy = BudgetPolicy::default();
        assert_eq!(policy.for_brief(None), FALLBACK_MAX_ITERATIONS);

        let mut b = brief(&["Origins", "Legacy"]);
        b.knowledge_nodes[1].node_title = "Origins".into();
        assert_eq!(policy.for_brief(Some(&b)), FALLBACK_MAX_ITERATIONS);

        let empty = brief(&[]);
        assert_eq!(policy.for_brief(Some(&empty)), FALLBACK_MAX_ITERATIONS);
    }

    #[test]
    fn test_configured_policy() {
        let policy = BudgetPolicy {
            iterations_per_node: 5,
            fallback_max_iterations: 10,
        };
        assert_eq!(policy.for_brief(Some(&brief(&["A"]))), 5);
        assert_eq!(policy.for_brief(None), 10);
    }
}
