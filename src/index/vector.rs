//! Immutable in-memory vector index with cosine top-k retrieval.

use super::IndexError;
use super::chunking::NodeSplitter;
use crate::embedding::EmbeddingClient;
use crate::parser::{Fragment, FragmentMetadata};
use std::cmp::Ordering;

/// A node stored in the index: a slice of one fragment plus its embedding.
#[derive(Debug, Clone)]
pub struct IndexedNode {
    /// Node text.
    pub text: String,
    /// Metadata inherited from the originating fragment.
    pub metadata: FragmentMetadata,
    vector: Vec<f32>,
}

/// A retrieved node and its cosine similarity to the query.
#[derive(Debug, Clone)]
pub struct ScoredNode {
    /// Matched node.
    pub node: IndexedNode,
    /// Cosine similarity, higher is more relevant.
    pub score: f32,
}

/// Immutable in-memory vector index over embedded nodes.
///
/// Built once from a complete fragment set and never mutated afterwards; replacing the corpus
/// means building a new index.
#[derive(Debug)]
pub struct VectorIndex {
    nodes: Vec<IndexedNode>,
    dimension: usize,
    fragment_count: usize,
}

impl VectorIndex {
    /// Split, embed and index `fragments`.
    ///
    /// Node texts are sent to `embedder` at most `batch_size` at a time, in order. Fails with
    /// [`IndexError::EmptyCorpus`] when no fragment yields a non-blank node, and with embedding
    /// errors when the provider misbehaves. Nothing is returned partially.
    pub async fn build(
        fragments: Vec<Fragment>,
        splitter: &NodeSplitter,
        embedder: &dyn EmbeddingClient,
        batch_size: usize,
    ) -> Result<Self, IndexError> {
        let fragment_count = fragments.len();
        let mut pending: Vec<(String, FragmentMetadata)> = Vec::new();
        for fragment in fragments {
            for text in splitter.split(&fragment.text) {
                if !text.trim().is_empty() {
                    pending.push((text, fragment.metadata.clone()));
                }
            }
        }

        if pending.is_empty() {
            return Err(IndexError::EmptyCorpus);
        }

        let batch_size = batch_size.max(1);
        let mut vectors = Vec::with_capacity(pending.len());
        for (batch_number, batch) in pending.chunks(batch_size).enumerate() {
            let texts: Vec<String> = batch.iter().map(|(text, _)| text.clone()).collect();
            let embedded = embedder.generate_embeddings(texts).await?;
            if embedded.len() != batch.len() {
                return Err(IndexError::EmbeddingCountMismatch {
                    expected: batch.len(),
                    actual: embedded.len(),
                });
            }
            tracing::trace!(batch = batch_number, size = batch.len(), "Embedded node batch");
            vectors.extend(embedded);
        }

        let dimension = vectors.first().map(Vec::len).unwrap_or_default();
        if dimension == 0 {
            return Err(IndexError::DimensionMismatch {
                expected: 1,
                actual: 0,
            });
        }

        let mut nodes = Vec::with_capacity(pending.len());
        for ((text, metadata), vector) in pending.into_iter().zip(vectors) {
            if vector.len() != dimension {
                return Err(IndexError::DimensionMismatch {
                    expected: dimension,
                    actual: vector.len(),
                });
            }
            nodes.push(IndexedNode {
                text,
                metadata,
                vector,
            });
        }

        tracing::debug!(
            fragments = fragment_count,
            nodes = nodes.len(),
            dimension,
            "Vector index built"
        );

        Ok(Self {
            nodes,
            dimension,
            fragment_count,
        })
    }

    /// Return up to `top_k` nodes ranked by descending similarity; ties keep insertion order.
    pub fn retrieve(&self, query: &[f32], top_k: usize) -> Result<Vec<ScoredNode>, IndexError> {
        if query.len() != self.dimension {
            return Err(IndexError::DimensionMismatch {
                expected: self.dimension,
                actual: query.len(),
            });
        }

        let mut scored: Vec<(usize, f32)> = self
            .nodes
            .iter()
            .enumerate()
            .map(|(position, node)| (position, cosine_similarity(query, &node.vector)))
            .collect();
        scored.sort_by(|left, right| right.1.partial_cmp(&left.1).unwrap_or(Ordering::Equal));
        scored.truncate(top_k);

        Ok(scored
            .into_iter()
            .map(|(position, score)| ScoredNode {
                node: self.nodes[position].clone(),
                score,
            })
            .collect())
    }

    /// Number of embedded nodes.
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    /// Whether the index holds no nodes. Always false for a successfully built index.
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Number of fragments the index was built from.
    pub fn fragment_count(&self) -> usize {
        self.fragment_count
    }

    /// Embedding dimension shared by all nodes.
    pub fn dimension(&self) -> usize {
        self.dimension
    }
}

fn cosine_similarity(left: &[f32], right: &[f32]) -> f32 {
    let dot: f32 = left.iter().zip(right).map(|(a, b)| a * b).sum();
    let left_norm = left.iter().map(|value| value * value).sum::<f32>().sqrt();
    let right_norm = right.iter().map(|value| value * value).sum::<f32>().sqrt();
    if left_norm == 0.0 || right_norm == 0.0 {
        return 0.0;
    }
    dot / (left_norm * right_norm)
}
