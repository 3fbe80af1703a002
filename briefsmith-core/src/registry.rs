//! Source registry: every URL seen during a run, keyed by a short citation id.
//!
//! Ids are assigned `src-1`, `src-2`, ... on first sight of a URL and are never
//! reused or reassigned. Entries are never removed; their supported-claim
//! lists only grow.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::brief::{NodeUpdate, Source};

/// Confidence recorded for a grounding support that did not carry one.
pub const DEFAULT_CLAIM_CONFIDENCE: f64 = 0.5;

/// A text segment a source was used to support.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SupportedClaim {
    pub text_segment: String,
    pub confidence: f64,
}

/// One registered source.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RegistryEntry {
    pub short_id: String,
    pub url: String,
    pub title: String,
    pub domain: String,
    #[serde(default)]
    pub supported_claims: Vec<SupportedClaim>,
}

/// Append-only map from URL to citation id.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(from = "Vec<RegistryEntry>", into = "Vec<RegistryEntry>")]
pub struct SourceRegistry {
    entries: Vec<RegistryEntry>,
    by_url: HashMap<String, usize>,
}

impl From<Vec<RegistryEntry>> for SourceRegistry {
    fn from(entries: Vec<RegistryEntry>) -> Self {
        let by_url = entries
            .iter()
            .enumerate()
            .map(|(i, e)| (e.url.clone(), i))
            .collect();
        Self { entries, by_url }
    }
}

impl From<SourceRegistry> for Vec<RegistryEntry> {
    fn from(registry: SourceRegistry) -> Self {
        registry.entries
    }
}

impl SourceRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `url`, returning its short id. An existing entry keeps its id
    /// and title; a blank `title` falls back to the domain.
    pub fn register(&mut self, url: &str, title: &str) -> String {
        let url = url.trim();
        if let Some(&idx) = self.by_url.get(url) {
            return self.entries[idx].short_id.clone();
        }

        let short_id = format!("src-{}", self.entries.len() + 1);
        let domain = domain_of(url);
        let title = match title.trim() {
            "" if !domain.is_empty() => domain.clone(),
            "" => short_id.clone(),
            t => t.to_string(),
        };
        tracing::debug!(short_id = %short_id, url = %url, "Registered source");

        self.by_url.insert(url.to_string(), self.entries.len());
        self.entries.push(RegistryEntry {
            short_id: short_id.clone(),
            url: url.to_string(),
            title,
            domain,
            supported_claims: Vec::new(),
        });
        short_id
    }

    pub fn register_source(&mut self, source: &Source) -> String {
        self.register(&source.url, &source.title)
    }

    /// Record that `url` supports `text_segment`, registering the URL if needed.
    /// Repeated segments are recorded once.
    pub fn add_claim(&mut self, url: &str, text_segment: &str, confidence: Option<f64>) {
        let short_id = self.register(url, "");
        let Some(entry) = self.get_mut(&short_id) else {
            return;
        };
        let text_segment = text_segment.trim();
        if text_segment.is_empty()
            || entry
                .supported_claims
                .iter()
                .any(|c| c.text_segment == text_segment)
        {
            return;
        }
        entry.supported_claims.push(SupportedClaim {
            text_segment: text_segment.to_string(),
            confidence: confidence.unwrap_or(DEFAULT_CLAIM_CONFIDENCE),
        });
    }

    /// Register every URL an update mentions: sources first so their titles
    /// win, then fact source URLs, then grounding supports. Returns how many
    /// entries were created.
    pub fn register_update(&mut self, update: &NodeUpdate) -> usize {
        let before = self.entries.len();
        for source in &update.top_sources {
            if !source.url.trim().is_empty() {
                self.register_source(source);
            }
        }
        for fact in &update.fact_points {
            if !fact.source_url.trim().is_empty() {
                self.register(&fact.source_url, "");
            }
        }
        for support in &update.supports {
            if !support.url.trim().is_empty() {
                self.add_claim(&support.url, &support.text_segment, support.confidence);
            }
        }
        self.entries.len() - before
    }

    pub fn get(&self, short_id: &str) -> Option<&RegistryEntry> {
        self.entries.iter().find(|e| e.short_id == short_id)
    }

    fn get_mut(&mut self, short_id: &str) -> Option<&mut RegistryEntry> {
        self.entries.iter_mut().find(|e| e.short_id == short_id)
    }

    pub fn get_by_url(&self, url: &str) -> Option<&RegistryEntry> {
        self.by_url.get(url.trim()).map(|&i| &self.entries[i])
    }

    /// Entries in assignment order.
    pub fn entries(&self) -> &[RegistryEntry] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Render the registry as an annotated Markdown source list.
    pub fn bibliography_markdown(&self) -> String {
        let mut out = "# Sources\n\n".to_string();

        for entry in &self.entries {
            out.push_str(&format!("## [{}] {}\n", entry.short_id, entry.title));
            out.push_str(&format!("**URL:** {}\n", entry.url));
            if !entry.domain.is_empty() {
                out.push_str(&format!("**Domain:** {}\n", entry.domain));
            }
            if !entry.supported_claims.is_empty() {
                out.push_str("**Supports:**\n");
                for claim in &entry.supported_claims {
                    out.push_str(&format!(
                        "  - {} ({:.0}%)\n",
                        claim.text_segment,
                        claim.confidence * 100.0
                    ));
                }
            }
            out.push('\n');
        }

        out
    }
}

/// Host of `url` without a leading `www.`; empty when the URL does not parse.
fn domain_of(url: &str) -> String {
    url::Url::parse(url)
        .ok()
        .and_then(|u| u.host_str().map(|h| h.trim_start_matches("www.").to_string()))
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::brief::fixtures::{fact, source};
    use crate::brief::GroundingSupport;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_ids_are_monotonic_and_stable() {
        let mut reg = SourceRegistry::new();
        assert_eq!(reg.register("https://a.example/x", "A"), "src-1");
        assert_eq!(reg.register("https://b.example/y", "B"), "src-2");
        assert_eq!(reg.register("https://a.example/x", "Other title"), "src-1");
        assert_eq!(reg.len(), 2);
        assert_eq!(reg.get("src-1").unwrap().title, "A");
    }

    #[test]
    fn test_title_falls_back_to_domain() {
        let mut reg = SourceRegistry::new();
        let id = reg.register("https://www.history.example/page", "");
        let entry = reg.get(&id).unwrap();
        assert_eq!(entry.domain, "history.example");
        assert_eq!(entry.title, "history.example");

        let id = reg.register("not a url", " ");
        assert_eq!(reg.get(&id).unwrap().title, id);
    }

    #[test]
    fn test_register_update_prefers_source_titles() {
        let mut reg = SourceRegistry::new();
        let mut update = NodeUpdate::empty("Origins");
        update
            .fact_points
            .push(fact("fp_1", "Founded", "https://a.example"));
        update.top_sources.push(source("https://a.example"));
        update.supports.push(GroundingSupport {
            url: "https://c.example".into(),
            text_segment: "Founded in 1901".into(),
            confidence: None,
        });

        assert_eq!(reg.register_update(&update), 2);
        assert_eq!(reg.get("src-1").unwrap().title, "Title of https://a.example");
        let c = reg.get_by_url("https://c.example").unwrap();
        assert_eq!(c.short_id, "src-2");
        assert_eq!(c.supported_claims[0].confidence, DEFAULT_CLAIM_CONFIDENCE);

        assert_eq!(reg.register_update(&update), 0);
        assert_eq!(
            reg.get_by_url("https://c.example").unwrap().supported_claims.len(),
            1
        );
    }

    #[test]
    fn test_serde_rebuilds_url_index() {
        let mut reg = SourceRegistry::new();
        reg.register("https://a.example", "A");
        reg.register("https://b.example", "B");
        let json = serde_json::to_string(&reg).unwrap();
        let mut back: SourceRegistry = serde_json::from_str(&json).unwrap();
        assert_eq!(back, reg);
        assert_eq!(back.register("https://b.example", ""), "src-2");
        assert_eq!(back.register("https://c.example", ""), "src-3");
    }

    #[test]
    fn test_bibliography_lists_entries_in_order() {
        let mut reg = SourceRegistry::new();
        reg.register("https://a.example", "Alpha");
        reg.add_claim("https://a.example", "A claim", Some(0.9));
        reg.register("https://b.example", "Beta");
        let md = reg.bibliography_markdown();
        let alpha = md.find("[src-1] Alpha").unwrap();
        let beta = md.find("[src-2] Beta").unwrap();
        assert!(alpha < beta);
        assert!(md.contains("A claim (90%)"));
    }
}
