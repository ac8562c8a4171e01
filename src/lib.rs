#![deny(missing_docs)]

//! Core library for the document question-answering server.

/// HTTP routing and REST handlers.
pub mod api;
/// Environment-driven configuration management.
pub mod config;
/// Embedding client abstraction and adapters.
pub mod embedding;
/// Node splitting, vector index, and the current-index slot.
pub mod index;
/// Language model abstraction and adapters.
pub mod llm;
/// Structured logging and tracing setup.
pub mod logging;
/// Ingestion and query metrics helpers.
pub mod metrics;
/// Document parsers turning uploads into fragments.
pub mod parser;
/// Ingestion and question-answering pipeline.
pub mod processing;
/// Local persistence for uploaded files.
pub mod storage;
