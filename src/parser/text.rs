//! Local parser reading uploads as UTF-8 text.

use super::{DocumentParser, Fragment, FragmentMetadata, ParserError};
use async_trait::async_trait;
use std::path::Path;

/// Reads UTF-8 text files into a single fragment.
#[derive(Debug, Default, Clone, Copy)]
pub struct PlainTextParser;

#[async_trait]
impl DocumentParser for PlainTextParser {
    async fn parse(&self, path: &Path, file_name: &str) -> Result<Vec<Fragment>, ParserError> {
        let bytes = tokio::fs::read(path).await.map_err(|source| ParserError::Io {
            path: path.display().to_string(),
            source,
        })?;
        let text =
            String::from_utf8(bytes).map_err(|_| ParserError::Unsupported(file_name.to_string()))?;

        // Whitespace-only files parse successfully but contribute nothing.
        if text.trim().is_empty() {
            return Ok(Vec::new());
        }

        Ok(vec![Fragment {
            text,
            metadata: FragmentMetadata {
                file_name: Some(file_name.to_string()),
                page_label: None,
                file_path: Some(path.display().to_string()),
            },
        }])
    }
}
