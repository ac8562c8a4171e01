//! Source citations attached to answers, with trimmed excerpts.

use crate::parser::FragmentMetadata;
use serde::Serialize;

const EXCERPT_CHARS: usize = 200;
const ELLIPSIS: &str = "...";
const UNKNOWN_FILE: &str = "Unknown";
const UNKNOWN_PAGE: &str = "N/A";

/// Source reference returned alongside an answer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Citation {
    /// Originating file name, or `Unknown`.
    pub file: String,
    /// Page label, or `N/A`.
    pub page: String,
    /// First 200 characters of the node text, always followed by `...`.
    pub text: String,
}

impl Citation {
    /// Build a citation from a retrieved node's text and metadata.
    pub fn from_node(text: &str, metadata: &FragmentMetadata) -> Self {
        Self {
            file: metadata
                .file_name
                .clone()
                .unwrap_or_else(|| UNKNOWN_FILE.to_string()),
            page: metadata
                .page_label
                .clone()
                .unwrap_or_else(|| UNKNOWN_PAGE.to_string()),
            text: excerpt(text),
        }
    }
}

/// Truncate to [`EXCERPT_CHARS`] characters and append the ellipsis unconditionally.
pub fn excerpt(text: &str) -> String {
    let end = text
        .char_indices()
        .nth(EXCERPT_CHARS)
        .map(|(offset, _)| offset)
        .unwrap_or(text.len());
    let mut excerpt = String::with_capacity(end + ELLIPSIS.len());
    excerpt.push_str(&text[..end]);
    excerpt.push_str(ELLIPSIS);
    excerpt
}
