//! Citation resolver.
//!
//! Rewrites `<cite source="src-N"/>` markers into Markdown links using the
//! source registry. Markers for ids the registry does not know are dropped
//! with a warning.

use regex::{Captures, Regex};
use std::sync::LazyLock;

use crate::registry::SourceRegistry;

/// A marker with the horizontal whitespace before it, plus any whitespace and
/// punctuation mark directly after it.
static CITE_MARKER: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"[ \t]*<cite\s+source\s*=\s*["']?\s*(src-\d+)\s*["']?\s*/>(?:[ \t]*([.,;:]))?"#)
        .unwrap_or_else(|e| panic!("invalid citation pattern: {e}"))
});

/// Output of a resolution pass.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Resolution {
    pub text: String,
    /// Short ids replaced with links, in order of appearance.
    pub resolved: Vec<String>,
    /// Short ids removed because the registry did not know them.
    pub unresolved: Vec<String>,
}

/// Replace citation markers in `text` with ` [title](url)` links.
///
/// Whitespace between a marker and a following `. , ; :` is dropped, so a
/// removed marker never leaves a space before punctuation. Nothing outside
/// the markers is touched, including the spliced-in titles, so running the
/// pass again on its own output is a no-op.
pub fn resolve_citations(text: &str, registry: &SourceRegistry) -> Resolution {
    let mut resolved = Vec::new();
    let mut unresolved = Vec::new();

    let text = CITE_MARKER
        .replace_all(text, |caps: &Captures| {
            let id = &caps[1];
            let punct = caps.get(2).map_or("", |m| m.as_str());
            match registry.get(id) {
                Some(entry) => {
                    resolved.push(id.to_string());
                    format!(" [{}]({}){punct}", entry.title, entry.url)
                }
                None => {
                    tracing::warn!(short_id = %id, "Removing citation for unknown source");
                    unresolved.push(id.to_string());
                    punct.to_string()
                }
            }
        })
        .into_owned();

    Resolution {
        text,
        resolved,
        unresolved,
    }
}
