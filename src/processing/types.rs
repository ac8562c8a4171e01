//! Request, outcome, and error types for the ingestion and query pipelines.

use super::chat::ChatMessage;
use super::citations::Citation;
use crate::{
    embedding::EmbeddingClientError,
    index::{ChunkingError, IndexError},
    llm::LanguageModelError,
    parser::ParserError,
    storage::StorageError,
};
use thiserror::Error;

/// Errors raised while wiring the service from configuration.
#[derive(Debug, Error)]
pub enum InitError {
    /// The remote parser client could not be constructed.
    #[error("Failed to initialize document parser: {0}")]
    Parser(#[from] ParserError),
    /// The embedding client could not be constructed.
    #[error("Failed to initialize embedding client: {0}")]
    Embedding(#[from] EmbeddingClientError),
    /// The language model client could not be constructed.
    #[error("Failed to initialize language model: {0}")]
    LanguageModel(#[from] LanguageModelError),
    /// No splitter could be built for the configured embedding model.
    #[error("Failed to initialize text splitter: {0}")]
    Chunking(#[from] ChunkingError),
}

/// Errors that abort an ingestion request. Per-file parse failures never appear here.
#[derive(Debug, Error)]
pub enum IngestError {
    /// The request carried no files.
    #[error("No files were uploaded")]
    NoFiles,
    /// An upload could not be written to local storage.
    #[error(transparent)]
    Storage(#[from] StorageError),
    /// Building the index from the recovered fragments failed.
    #[error(transparent)]
    Index(#[from] IndexError),
}

/// Errors emitted while answering a query.
#[derive(Debug, Error)]
pub enum QueryError {
    /// No index has been built yet.
    #[error("Index not built. Upload documents first.")]
    IndexNotBuilt,
    /// Embedding the question failed.
    #[error(transparent)]
    Embedding(#[from] EmbeddingClientError),
    /// Embedding provider returned no vector for the question.
    #[error("Embedding provider returned no vector for the query")]
    EmptyEmbedding,
    /// Retrieval against the index failed.
    #[error(transparent)]
    Index(#[from] IndexError),
    /// Condensing or answering failed.
    #[error(transparent)]
    LanguageModel(#[from] LanguageModelError),
}

/// Summary of a completed ingestion.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IngestOutcome {
    /// Files presented in the batch, whether or not they parsed.
    pub processed_count: usize,
    /// Fragments recovered from the files that parsed.
    pub total_chunks: usize,
    /// Files whose parse failed and were skipped.
    pub failed_count: usize,
}

/// Parameters for a question against the current index.
#[derive(Debug, Clone, Default)]
pub struct QueryRequest {
    /// Natural-language question.
    pub question: String,
    /// Retrieval breadth; the service default applies when absent.
    pub top_k: Option<usize>,
    /// Prior conversation turns, oldest first.
    pub history: Vec<ChatMessage>,
}

/// Generated answer and the sources it was grounded on.
#[derive(Debug, Clone, PartialEq)]
pub struct QueryResult {
    /// Generated answer text.
    pub answer: String,
    /// Citations in retrieval order.
    pub sources: Vec<Citation>,
}
