//! Finalization: cross-linking facts once research is over.

use std::collections::{BTreeSet, HashMap};

use crate::brief::Brief;

/// Populate `related_fact_ids` on every fact.
///
/// Two facts are related when they share a related-entity label, compared
/// case-insensitively. Links follow brief order, never point at the fact
/// itself and are recomputed from scratch, so running this twice gives the
/// same result. Returns the number of links written.
pub fn link_related_facts(brief: &mut Brief) -> usize {
    let mut by_entity: HashMap<String, Vec<usize>> = HashMap::new();
    let mut fact_ids: Vec<String> = Vec::new();
    for fact in brief.knowledge_nodes.iter().flat_map(|n| &n.fact_points) {
        let idx = fact_ids.len();
        fact_ids.push(fact.fact_id.clone());
        let labels: BTreeSet<String> = fact
            .related_entities
            .iter()
            .map(|e| e.trim().to_lowercase())
            .filter(|e| !e.is_empty())
            .collect();
        for label in labels {
            by_entity.entry(label).or_default().push(idx);
        }
    }

    let mut links = 0;
    let mut idx = 0;
    for fact in brief
        .knowledge_nodes
        .iter_mut()
        .flat_map(|n| n.fact_points.iter_mut())
    {
        let mut related: BTreeSet<usize> = BTreeSet::new();
        for label in &fact.related_entities {
            if let Some(others) = by_entity.get(&label.trim().to_lowercase()) {
                related.extend(others.iter().copied().filter(|&o| o != idx));
            }
        }
        fact.related_fact_ids = related.iter().map(|&o| fact_ids[o].clone()).collect();
        links += fact.related_fact_ids.len();
        idx += 1;
    }

    tracing::debug!(links, "Linked related facts");
    links
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::brief::fixtures::{brief, fact};
    use pretty_assertions::assert_eq;

    fn linked_brief() -> Brief {
        let mut b = brief(&["Origins", "Legacy"]);
        let mut a = fact("fp_1", "Ford founded the company", "https://a.example");
        a.related_entities = vec!["Henry Ford".into(), "Detroit".into()];
        let mut c = fact("fp_2", "Plant opened", "https://a.example");
        c.related_entities = vec!["detroit".into()];
        let mut d = fact("fp_3", "Museum named after him", "https://b.example");
        d.related_entities = vec!["HENRY FORD ".into()];
        let e = fact("fp_4", "Unrelated", "https://b.example");
        b.knowledge_nodes[0].fact_points = vec![a, c];
        b.knowledge_nodes[1].fact_points = vec![d, e];
        b
    }

    #[test]
    fn test_facts_sharing_entities_are_linked() {
        let mut b = linked_brief();
        let links = link_related_facts(&mut b);
        let ids = |n: usize, f: usize| b.knowledge_nodes[n].fact_points[f].related_fact_ids.clone();

        assert_eq!(ids(0, 0), vec!["fp_2", "fp_3"]);
        assert_eq!(ids(0, 1), vec!["fp_1"]);
        assert_eq!(ids(1, 0), vec!["fp_1"]);
        assert!(ids(1, 1).is_empty());
        assert_eq!(links, 4);
    }

    #[test]
    fn test_linking_is_repeatable() {
        let mut b = linked_brief();
        link_related_facts(&mut b);
        let once = b.clone();
        link_related_facts(&mut b);
        assert_eq!(b, once);
    }
}
