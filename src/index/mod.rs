//! In-memory vector index and the single-slot manager that holds the current one.

pub mod chunking;
mod manager;
mod vector;

pub use chunking::{ChunkingError, NodeSplitter};
pub use manager::IndexManager;
pub use vector::{IndexedNode, ScoredNode, VectorIndex};

use crate::embedding::EmbeddingClientError;
use thiserror::Error;

/// Errors raised while building or searching the index.
#[derive(Debug, Error)]
pub enum IndexError {
    /// No fragment produced a non-blank node.
    #[error("Cannot build an index from an empty corpus: no document content was recovered")]
    EmptyCorpus,
    /// Embedding provider failed.
    #[error(transparent)]
    Embedding(#[from] EmbeddingClientError),
    /// Embedding provider returned the wrong number of vectors.
    #[error("Embedding count mismatch: expected {expected}, got {actual}")]
    EmbeddingCountMismatch {
        /// Number of texts submitted.
        expected: usize,
        /// Number of vectors returned.
        actual: usize,
    },
    /// A vector did not match the index dimension.
    #[error("Embedding dimension mismatch: expected {expected}, got {actual}")]
    DimensionMismatch {
        /// Dimension shared by indexed nodes.
        expected: usize,
        /// Dimension of the offending vector.
        actual: usize,
    },
}
