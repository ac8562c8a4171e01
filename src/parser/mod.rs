//! Document parsing: turning a stored upload into ordered text fragments.
//!
//! Parsing is delegated to collaborators behind [`DocumentParser`]. The remote
//! [`LlamaParseClient`] handles rich formats (PDF by default) and is rate limited upstream, so
//! callers must pace their requests; [`PlainTextParser`] reads everything else locally.
//! [`RoutingParser`] picks between them by file extension.

mod llama_parse;
mod text;

pub use llama_parse::{LlamaParseClient, LlamaParseSettings};
pub use text::PlainTextParser;

use async_trait::async_trait;
use serde::Serialize;
use std::path::Path;
use thiserror::Error;

/// Metadata attached to every fragment and inherited by the index nodes cut from it.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct FragmentMetadata {
    /// Client-supplied name of the originating file.
    pub file_name: Option<String>,
    /// Page label within the originating file, when the format has pages.
    pub page_label: Option<String>,
    /// Location of the stored upload on disk.
    pub file_path: Option<String>,
}

/// One unit of parser output.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Fragment {
    /// Extracted text content.
    pub text: String,
    /// Provenance of the text.
    pub metadata: FragmentMetadata,
}

/// Errors raised while parsing a single file.
#[derive(Debug, Error)]
pub enum ParserError {
    /// The stored upload could not be read.
    #[error("Failed to read {path}: {source}")]
    Io {
        /// Path that failed to read.
        path: String,
        /// Underlying I/O error.
        #[source]
        source: std::io::Error,
    },
    /// The file content is not in a format this parser understands.
    #[error("Unsupported content in {0}")]
    Unsupported(String),
    /// Remote parsing service could not be reached or rejected the request.
    #[error("Parsing service request failed: {0}")]
    Service(String),
    /// Remote parse job finished unsuccessfully.
    #[error("Parse job {job_id} ended with status {status}")]
    JobFailed {
        /// Identifier assigned by the parsing service.
        job_id: String,
        /// Terminal status reported by the service.
        status: String,
    },
    /// Remote parse job did not finish within the polling budget.
    #[error("Parse job {job_id} did not finish after {polls} polls")]
    Timeout {
        /// Identifier assigned by the parsing service.
        job_id: String,
        /// Number of status polls performed.
        polls: u32,
    },
    /// Parsing service response could not be decoded.
    #[error("Malformed parsing service response: {0}")]
    InvalidResponse(String),
}

/// Interface implemented by document parsers.
#[async_trait]
pub trait DocumentParser: Send + Sync {
    /// Parse the file stored at `path`, tagging fragments with the client-facing `file_name`.
    async fn parse(&self, path: &Path, file_name: &str) -> Result<Vec<Fragment>, ParserError>;
}

/// Routes files to the remote parser by extension and reads the rest locally.
pub struct RoutingParser {
    remote: Box<dyn DocumentParser>,
    local: Box<dyn DocumentParser>,
    remote_extensions: Vec<String>,
}

impl RoutingParser {
    /// Build a router sending `remote_extensions` (lowercase, without dots) to `remote`.
    pub fn new(
        remote: Box<dyn DocumentParser>,
        local: Box<dyn DocumentParser>,
        remote_extensions: Vec<String>,
    ) -> Self {
        Self {
            remote,
            local,
            remote_extensions,
        }
    }

    fn is_remote(&self, path: &Path) -> bool {
        path.extension()
            .and_then(|ext| ext.to_str())
            .map(|ext| {
                self.remote_extensions
                    .iter()
                    .any(|candidate| candidate.eq_ignore_ascii_case(ext))
            })
            .unwrap_or(false)
    }
}

#[async_trait]
impl DocumentParser for RoutingParser {
    async fn parse(&self, path: &Path, file_name: &str) -> Result<Vec<Fragment>, ParserError> {
        if self.is_remote(path) {
            tracing::debug!(file = file_name, "Routing to remote parser");
            self.remote.parse(path, file_name).await
        } else {
            tracing::debug!(file = file_name, "Routing to local text parser");
            self.local.parse(path, file_name).await
        }
    }
}
