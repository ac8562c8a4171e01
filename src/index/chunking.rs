//! Node splitting: cutting parsed fragments into token-bounded segments for embedding.
//!
//! - Automatic sizing: derive a budget from the embedding model's context window (a quarter of
//!   it) and clamp to `[256, 1024]`; `TEXT_SPLITTER_CHUNK_SIZE` overrides.
//! - Overlap: `TEXT_SPLITTER_CHUNK_OVERLAP` carries the tail of each node into the next so that
//!   spans around boundaries stay retrievable.
//! - Token counting: `tiktoken-rs` for OpenAI and known encodings, whitespace counting when the
//!   model's tokenizer is unknown (common for Ollama and the hashing client).

use crate::config::EmbeddingProvider;
use anyhow::Error as TokenizerError;
use semchunk_rs::Chunker;
use std::sync::Arc;
use thiserror::Error;
use tiktoken_rs::{
    CoreBPE, cl100k_base, get_bpe_from_model, model::get_context_size, o200k_base, p50k_base,
    p50k_edit, r50k_base,
};

type TokenCounter = Arc<dyn Fn(&str) -> usize + Send + Sync>;

const MIN_AUTOMATIC_CHUNK_SIZE: usize = 256;
const MAX_AUTOMATIC_CHUNK_SIZE: usize = 1024;

/// Errors produced while preparing the node splitter.
#[derive(Debug, Error)]
pub enum ChunkingError {
    /// Splitter configured with an impossible token budget.
    #[error("chunk size must be greater than zero")]
    InvalidChunkSize,
    /// Tokenizer resources were unavailable for the configured model.
    #[error("failed to initialize tokenizer for model '{model}': {source}")]
    Tokenizer {
        /// Embedding model we attempted to load.
        model: String,
        /// Underlying error raised by the tokenizer library.
        #[source]
        source: TokenizerError,
    },
}

/// Splits fragment text into nodes no longer than `chunk_size` tokens.
#[derive(Clone)]
pub struct NodeSplitter {
    chunk_size: usize,
    overlap: usize,
    token_counter: TokenCounter,
}

impl std::fmt::Debug for NodeSplitter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NodeSplitter")
            .field("chunk_size", &self.chunk_size)
            .field("overlap", &self.overlap)
            .finish_non_exhaustive()
    }
}

impl NodeSplitter {
    /// Build a splitter for the embedding provider/model, honoring explicit overrides.
    pub fn for_model(
        provider: EmbeddingProvider,
        model: &str,
        chunk_size_override: Option<usize>,
        overlap: Option<usize>,
    ) -> Result<Self, ChunkingError> {
        let chunk_size = determine_chunk_size(chunk_size_override, provider, model);
        let overlap = overlap.unwrap_or(0);
        tracing::debug!(
            chunk_size,
            override = chunk_size_override,
            provider = ?provider,
            model,
            overlap,
            "Derived node size"
        );
        Ok(Self {
            chunk_size,
            overlap,
            token_counter: build_token_counter(provider, model)?,
        })
    }

    /// Build a splitter that counts whitespace-separated words.
    pub fn whitespace(chunk_size: usize, overlap: usize) -> Result<Self, ChunkingError> {
        if chunk_size == 0 {
            return Err(ChunkingError::InvalidChunkSize);
        }
        Ok(Self {
            chunk_size,
            overlap,
            token_counter: default_token_counter(),
        })
    }

    /// Token budget per node.
    pub fn chunk_size(&self) -> usize {
        self.chunk_size
    }

    /// Split `text` into nodes. Returns an empty vector when the text is all whitespace.
    pub fn split(&self, text: &str) -> Vec<String> {
        if text.trim().is_empty() {
            return Vec::new();
        }
        chunk_text_with_counter(
            text,
            self.chunk_size,
            self.overlap,
            self.token_counter.clone(),
        )
    }
}

/// Determine the node size, respecting an explicit override.
pub(crate) fn determine_chunk_size(
    override_size: Option<usize>,
    provider: EmbeddingProvider,
    model: &str,
) -> usize {
    if let Some(explicit) = override_size {
        return explicit.max(1);
    }

    let window = embedding_context_window(provider, model);
    let base = (window / 4).max(1);
    base.clamp(MIN_AUTOMATIC_CHUNK_SIZE, MAX_AUTOMATIC_CHUNK_SIZE)
}

fn embedding_context_window(provider: EmbeddingProvider, model: &str) -> usize {
    match provider {
        EmbeddingProvider::OpenAI => openai_embedding_context_window(model),
        EmbeddingProvider::Ollama => ollama_embedding_context_window(model),
        EmbeddingProvider::Hash => 4096,
    }
}

fn openai_embedding_context_window(model: &str) -> usize {
    if model.starts_with("text-embedding-3") || model.starts_with("text-embedding-ada-002") {
        return 8192;
    }

    let size = get_context_size(model);
    if size == 4096 && model.contains("embedding") {
        tracing::debug!(model, "Using default embedding context window fallback");
    }
    size
}

fn ollama_embedding_context_window(model: &str) -> usize {
    let normalized = model.to_lowercase();
    match normalized.as_str() {
        "nomic-embed-text" | "mxbai-embed-large" | "mxbai-embed-large-v1" => 8192,
        value if value.contains("all-minilm") || value.contains("bge-small") => 512,
        value if value.contains("e5-large") => 4096,
        _ => {
            tracing::trace!(model, "Using default Ollama context window estimate");
            4096
        }
    }
}

fn build_token_counter(
    provider: EmbeddingProvider,
    model: &str,
) -> Result<TokenCounter, ChunkingError> {
    match provider {
        EmbeddingProvider::OpenAI => build_tiktoken_counter(model),
        EmbeddingProvider::Hash => Ok(default_token_counter()),
        EmbeddingProvider::Ollama => match build_tiktoken_counter(model) {
            Ok(counter) => Ok(counter),
            Err(error) => {
                tracing::warn!(
                    model,
                    error = %error,
                    "Tokenizer unavailable for Ollama model; falling back to whitespace counter"
                );
                Ok(default_token_counter())
            }
        },
    }
}

fn build_tiktoken_counter(model: &str) -> Result<TokenCounter, ChunkingError> {
    let normalized = model.trim();
    let target = if normalized.is_empty() {
        "cl100k_base"
    } else {
        normalized
    };
    let encoding = resolve_encoding(target).map_err(|source| ChunkingError::Tokenizer {
        model: target.to_string(),
        source,
    })?;
    let encoding = Arc::new(encoding);

    Ok(Arc::new(move |segment: &str| {
        encoding.encode_ordinary(segment).len()
    }))
}

fn resolve_encoding(model: &str) -> Result<CoreBPE, TokenizerError> {
    match get_bpe_from_model(model) {
        Ok(encoding) => Ok(encoding),
        Err(model_err) => {
            tracing::debug!(
                model,
                error = %model_err,
                "Tokenizer model lookup failed; trying encoding name"
            );
            if let Some(candidate) = encoding_from_name(model) {
                candidate
            } else {
                tracing::warn!(
                    model,
                    "Falling back to 'cl100k_base' encoding for token counting"
                );
                cl100k_base()
            }
        }
    }
}

fn encoding_from_name(name: &str) -> Option<Result<CoreBPE, TokenizerError>> {
    match name {
        "cl100k_base" => Some(cl100k_base()),
        "o200k_base" => Some(o200k_base()),
        "p50k_base" => Some(p50k_base()),
        "p50k_edit" => Some(p50k_edit()),
        "r50k_base" | "gpt2" => Some(r50k_base()),
        _ => None,
    }
}

fn default_token_counter() -> TokenCounter {
    Arc::new(|segment: &str| {
        let tokens = segment.split_whitespace().count();
        if tokens == 0 && !segment.is_empty() {
            1
        } else {
            tokens
        }
    })
}

fn chunk_text_with_counter(
    text: &str,
    chunk_size: usize,
    overlap: usize,
    token_counter: TokenCounter,
) -> Vec<String> {
    let counter_for_chunker = token_counter.clone();
    let chunker = Chunker::new(
        chunk_size,
        Box::new(move |segment: &str| counter_for_chunker.as_ref()(segment)),
    );
    let base_chunks = chunker.chunk(text);
    apply_overlap(base_chunks, chunk_size, overlap, &token_counter)
}

/// Prefix each node with a token-limited tail of its predecessor, trimming to stay in budget.
fn apply_overlap(
    chunks: Vec<String>,
    chunk_size: usize,
    overlap: usize,
    token_counter: &TokenCounter,
) -> Vec<String> {
    let effective_overlap = overlap.min(chunk_size.saturating_sub(1));
    if chunks.len() < 2 || effective_overlap == 0 {
        return chunks;
    }

    let mut overlapped = Vec::with_capacity(chunks.len());
    let mut previous: Option<String> = None;

    for current in chunks {
        let node = match previous.as_deref() {
            Some(prior) => build_overlapped_chunk(
                prior,
                &current,
                effective_overlap,
                chunk_size,
                token_counter,
            ),
            None => current.clone(),
        };
        overlapped.push(node);
        previous = Some(current);
    }

    overlapped
}

fn build_overlapped_chunk(
    previous: &str,
    current: &str,
    overlap: usize,
    chunk_size: usize,
    token_counter: &TokenCounter,
) -> String {
    let tail = suffix_within_budget(previous, overlap, token_counter);
    let mut combined = String::with_capacity(tail.len() + current.len() + 1);

    if !tail.is_empty() {
        combined.push_str(tail);
        if !tail.ends_with(char::is_whitespace) && !current.starts_with(char::is_whitespace) {
            combined.push(' ');
        }
    }

    combined.push_str(current);
    suffix_within_budget(&combined, chunk_size, token_counter).to_string()
}

/// Longest whitespace-trimmed suffix of `text` whose token count fits `budget`.
fn suffix_within_budget<'a>(text: &'a str, budget: usize, token_counter: &TokenCounter) -> &'a str {
    if budget == 0 {
        return "";
    }

    for (start, _) in text.char_indices() {
        let candidate = text[start..].trim_start();
        if token_counter.as_ref()(candidate) <= budget {
            return candidate;
        }
    }

    ""
}
