//! Service coordinating upload storage, paced parsing, index rebuilds and question answering.

use crate::{
    config::Config,
    embedding::{EmbeddingClient, embedding_client_from_config},
    index::{IndexManager, NodeSplitter, VectorIndex},
    llm::{LanguageModel, language_model_from_config},
    metrics::{MetricsSnapshot, ServiceMetrics},
    parser::{DocumentParser, LlamaParseClient, LlamaParseSettings, PlainTextParser, RoutingParser},
    processing::{
        chat::{answer_prompt, condense_question},
        citations::Citation,
        cooldown::{CooldownGate, CooldownPolicy},
        types::{InitError, IngestError, IngestOutcome, QueryError, QueryRequest, QueryResult},
    },
    storage::{UploadStore, UploadedFile},
};
use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;

/// Abstraction over the question-answering pipeline used by the HTTP surface.
#[async_trait]
pub trait RagApi: Send + Sync {
    /// Store, parse and index a batch of files, replacing the current index.
    async fn ingest(&self, files: Vec<UploadedFile>) -> Result<IngestOutcome, IngestError>;

    /// Answer a question against the current index.
    async fn query(&self, request: QueryRequest) -> Result<QueryResult, QueryError>;

    /// Retrieve the current metrics snapshot for diagnostics.
    fn metrics_snapshot(&self) -> MetricsSnapshot;
}

/// Collaborators and settings a [`RagService`] is assembled from.
pub struct RagComponents {
    /// Destination for uploaded bytes.
    pub store: UploadStore,
    /// Parser turning stored uploads into fragments.
    pub parser: Box<dyn DocumentParser>,
    /// Embedding client shared by index builds and queries.
    pub embedding_client: Box<dyn EmbeddingClient>,
    /// Model used to condense questions and write answers.
    pub language_model: Box<dyn LanguageModel>,
    /// Splitter cutting fragments into nodes.
    pub splitter: NodeSplitter,
    /// Upper bound on texts per embedding request during index builds.
    pub embedding_batch_size: usize,
    /// Parser pacing.
    pub cooldown: CooldownPolicy,
    /// Retrieval breadth when a query does not specify one.
    pub default_top_k: usize,
}

/// Owns the long-lived collaborators, the current index, and the ingestion lane.
///
/// Construct once near process start and share through an `Arc`. Ingestion runs one batch
/// at a time through a lock that also owns the parser cooldown gate; queries only touch the
/// index slot and never wait on ingestion.
pub struct RagService {
    store: UploadStore,
    parser: Box<dyn DocumentParser>,
    embedding_client: Box<dyn EmbeddingClient>,
    language_model: Box<dyn LanguageModel>,
    splitter: NodeSplitter,
    embedding_batch_size: usize,
    indexes: IndexManager,
    ingestion_lane: Mutex<CooldownGate>,
    metrics: Arc<ServiceMetrics>,
    default_top_k: usize,
}

impl RagService {
    /// Assemble a service from explicit components.
    pub fn new(components: RagComponents) -> Self {
        let RagComponents {
            store,
            parser,
            embedding_client,
            language_model,
            splitter,
            embedding_batch_size,
            cooldown,
            default_top_k,
        } = components;

        Self {
            store,
            parser,
            embedding_client,
            language_model,
            splitter,
            embedding_batch_size: embedding_batch_size.max(1),
            indexes: IndexManager::new(),
            ingestion_lane: Mutex::new(CooldownGate::new(cooldown)),
            metrics: Arc::new(ServiceMetrics::new()),
            default_top_k: default_top_k.max(1),
        }
    }

    /// Build a service wired to the providers selected by configuration.
    pub fn from_config(config: &Config) -> Result<Self, InitError> {
        if config.parser_api_key.is_none() {
            tracing::warn!("PARSER_API_KEY is not set; remote parsing requests will be unauthenticated");
        }
        let remote = LlamaParseClient::new(LlamaParseSettings {
            base_url: config.parser_url.clone(),
            api_key: config.parser_api_key.clone(),
            poll_interval: Duration::from_millis(config.parser_poll_interval_ms),
            max_polls: config.parser_max_polls,
            language: "en".to_string(),
        })?;
        let parser = RoutingParser::new(
            Box::new(remote),
            Box::new(PlainTextParser),
            config.remote_parser_extensions.clone(),
        );

        tracing::info!("Initializing embedding client");
        let embedding_client = embedding_client_from_config(config)?;
        tracing::info!("Initializing language model");
        let language_model = language_model_from_config(config)?;
        let splitter = NodeSplitter::for_model(
            config.embedding_provider,
            &config.embedding_model,
            config.text_splitter_chunk_size,
            config.text_splitter_chunk_overlap,
        )?;
        tracing::info!(
            node_size = splitter.chunk_size(),
            embedding_batch_size = config.embedding_batch_size,
            "Index settings resolved"
        );

        Ok(Self::new(RagComponents {
            store: UploadStore::new(config.data_dir.clone()),
            parser: Box::new(parser),
            embedding_client,
            language_model,
            splitter,
            embedding_batch_size: config.embedding_batch_size,
            cooldown: CooldownPolicy {
                after_success: config.parse_cooldown(),
                after_failure: config.parse_failure_cooldown(),
            },
            default_top_k: config.query_default_top_k,
        }))
    }

    /// Store, parse and index `files`.
    ///
    /// Files are parsed one at a time behind the cooldown gate. A file that fails to parse is
    /// logged and skipped. The index is only replaced after a successful build, so a failed or
    /// cancelled ingestion leaves the previous index current.
    pub async fn ingest(&self, files: Vec<UploadedFile>) -> Result<IngestOutcome, IngestError> {
        if files.is_empty() {
            return Err(IngestError::NoFiles);
        }

        let mut gate = self.ingestion_lane.lock().await;
        tracing::info!(files = files.len(), "Ingestion started");

        let mut stored = Vec::with_capacity(files.len());
        for file in &files {
            stored.push(self.store.persist(file).await?);
        }

        let mut fragments = Vec::new();
        let mut failed_count = 0;
        for upload in &stored {
            gate.ready().await;
            match self.parser.parse(&upload.path, &upload.original_name).await {
                Ok(parsed) => {
                    tracing::info!(
                        file = %upload.original_name,
                        fragments = parsed.len(),
                        "Parsed file"
                    );
                    fragments.extend(parsed);
                    gate.record(true);
                    self.metrics.record_parse(false);
                }
                Err(error) => {
                    tracing::warn!(
                        file = %upload.original_name,
                        error = %error,
                        "Failed to parse file; skipping"
                    );
                    failed_count += 1;
                    gate.record(false);
                    self.metrics.record_parse(true);
                }
            }
        }

        let total_chunks = fragments.len();
        let index = VectorIndex::build(
            fragments,
            &self.splitter,
            self.embedding_client.as_ref(),
            self.embedding_batch_size,
        )
        .await
        .inspect_err(|error| tracing::error!(error = %error, "Index build failed"))?;
        let nodes = index.len();
        self.indexes.replace(index).await;
        self.metrics.record_index_build(total_chunks as u64);

        tracing::info!(
            processed = stored.len(),
            failed = failed_count,
            chunks = total_chunks,
            nodes,
            "Index rebuilt"
        );

        Ok(IngestOutcome {
            processed_count: stored.len(),
            total_chunks,
            failed_count,
        })
    }

    /// Answer a question against the current index.
    pub async fn query(&self, request: QueryRequest) -> Result<QueryResult, QueryError> {
        let index = self
            .indexes
            .current()
            .await
            .ok_or(QueryError::IndexNotBuilt)?;
        let QueryRequest {
            question,
            top_k,
            history,
        } = request;
        let top_k = top_k.unwrap_or(self.default_top_k).max(1);

        let standalone =
            condense_question(self.language_model.as_ref(), &history, &question).await?;
        let mut vectors = self
            .embedding_client
            .generate_embeddings(vec![standalone.clone()])
            .await?;
        let vector = vectors.pop().ok_or(QueryError::EmptyEmbedding)?;
        let hits = index.retrieve(&vector, top_k)?;

        let answer = self
            .language_model
            .complete(&answer_prompt(&standalone, &hits))
            .await?;
        let sources = hits
            .iter()
            .map(|hit| Citation::from_node(&hit.node.text, &hit.node.metadata))
            .collect::<Vec<_>>();

        self.metrics.record_query();
        tracing::info!(
            top_k,
            sources = sources.len(),
            history_turns = history.len(),
            "Query answered"
        );

        Ok(QueryResult { answer, sources })
    }

    /// Return the current metrics snapshot.
    pub fn metrics_snapshot(&self) -> MetricsSnapshot {
        self.metrics.snapshot()
    }

    /// Whether an index is available for queries.
    pub async fn is_ready(&self) -> bool {
        self.indexes.is_ready().await
    }
}

#[async_trait]
impl RagApi for RagService {
    async fn ingest(&self, files: Vec<UploadedFile>) -> Result<IngestOutcome, IngestError> {
        RagService::ingest(self, files).await
    }

    async fn query(&self, request: QueryRequest) -> Result<QueryResult, QueryError> {
        RagService::query(self, request).await
    }

    fn metrics_snapshot(&self) -> MetricsSnapshot {
        RagService::metrics_snapshot(self)
    }
}
