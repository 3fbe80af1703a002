//! Merge engine: folds a `NodeUpdate` into the brief without duplication.

use std::collections::HashSet;

use crate::brief::{Brief, NodeId, NodeUpdate, ResearchStatus};
use crate::error::MergeError;

/// What a merge changed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MergeReport {
    pub node_id: NodeId,
    pub sources_added: usize,
    pub facts_added: usize,
    /// Whether the merge moved the node from PENDING to ACTIVE.
    pub activated: bool,
}

impl MergeReport {
    pub fn added_anything(&self) -> bool {
        self.sources_added > 0 || self.facts_added > 0
    }
}

/// Canonical form of a fact description used for duplicate detection.
pub fn normalize_description(description: &str) -> String {
    description
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .to_lowercase()
}

/// Merge `update` into the node whose title it names.
///
/// Sources are appended when their URL is new to the node, facts when their
/// normalized description is new to the node. Incoming fact ids already used
/// anywhere in the brief are re-keyed. A PENDING node becomes ACTIVE once at
/// least one item is added. Merging the same update twice changes nothing the
/// second time, and no other node is touched.
///
/// The caller must only name the node chosen by [`select_target`]: merging
/// into a PENDING node while another node is ACTIVE would leave two ACTIVE
/// nodes, which [`Brief::validate`] rejects.
///
/// [`select_target`]: super::select_target
pub fn merge_update(brief: &mut Brief, update: &NodeUpdate) -> Result<MergeReport, MergeError> {
    update.validate()?;

    let title = update.node_title.trim();
    let mut used_fact_ids: HashSet<String> = brief
        .knowledge_nodes
        .iter()
        .flat_map(|n| n.fact_points.iter().map(|f| f.fact_id.clone()))
        .collect();

    let node = brief
        .node_by_title_mut(title)
        .ok_or_else(|| MergeError::NodeNotFound {
            title: title.to_string(),
        })?;

    let mut known_urls: HashSet<String> = node
        .top_sources
        .iter()
        .map(|s| s.url.trim().to_string())
        .collect();
    let mut sources_added = 0;
    for source in &update.top_sources {
        if known_urls.insert(source.url.trim().to_string()) {
            let mut source = source.clone();
            source.url = source.url.trim().to_string();
            node.top_sources.push(source);
            sources_added += 1;
        }
    }

    let mut known_descriptions: HashSet<String> = node
        .fact_points
        .iter()
        .map(|f| normalize_description(&f.description))
        .collect();
    let mut facts_added = 0;
    for fact in &update.fact_points {
        if !known_descriptions.insert(normalize_description(&fact.description)) {
            continue;
        }
        let mut fact = fact.clone();
        fact.fact_id = unique_fact_id(fact.fact_id.trim(), &used_fact_ids);
        used_fact_ids.insert(fact.fact_id.clone());
        node.fact_points.push(fact);
        facts_added += 1;
    }

    let activated = (sources_added > 0 || facts_added > 0)
        && node.research_status == ResearchStatus::Pending
        && node.set_status(ResearchStatus::Active);

    Ok(MergeReport {
        node_id: node.node_id.clone(),
        sources_added,
        facts_added,
        activated,
    })
}

/// `id` if unused, otherwise `id-n` for the smallest free `n >= 2`.
fn unique_fact_id(id: &str, used: &HashSet<String>) -> String {
    if !used.contains(id) {
        return id.to_string();
    }
    (2..)
        .map(|n| format!("{id}-{n}"))
        .find(|candidate| !used.contains(candidate))
        .unwrap_or_else(|| id.to_string())
}
