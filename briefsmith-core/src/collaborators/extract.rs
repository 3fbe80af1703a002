//! Pulling structured records out of free-text responses.
//!
//! Text-channel providers often wrap their JSON in prose or code fences. These
//! helpers belong on the provider side of the trait boundary; the engine only
//! ever receives typed records.

use serde::de::DeserializeOwned;

use crate::error::CollaboratorError;

/// The first balanced `{...}` block in `text`, if any. Braces inside JSON
/// strings are ignored.
pub fn extract_json_block(text: &str) -> Option<&str> {
    let start = text.find('{')?;
    let mut depth = 0usize;
    let mut in_string = false;
    let mut escaped = false;

    for (offset, ch) in text[start..].char_indices() {
        if in_string {
            match ch {
                _ if escaped => escaped = false,
                '\\' => escaped = true,
                '"' => in_string = false,
                _ => {}
            }
            continue;
        }
        match ch {
            '"' => in_string = true,
            '{' => depth += 1,
            '}' => {
                depth -= 1;
                if depth == 0 {
                    return Some(&text[start..start + offset + 1]);
                }
            }
            _ => {}
        }
    }
    None
}

/// Deserialize the first JSON object found in `text`.
pub fn parse_json_response<T: DeserializeOwned>(
    collaborator: &str,
    text: &str,
) -> Result<T, CollaboratorError> {
    let block = extract_json_block(text)
        .ok_or_else(|| CollaboratorError::malformed(collaborator, "no JSON object in response"))?;
    serde_json::from_str(block).map_err(|e| CollaboratorError::malformed(collaborator, e.to_string()))
}
