//! Question-answering pipeline: paced ingestion, index rebuilds, and condense-question chat.

mod chat;
mod citations;
pub mod cooldown;
mod service;
pub mod types;

pub use chat::{ChatMessage, ChatRole};
pub use citations::Citation;
pub use cooldown::{CooldownGate, CooldownPolicy};
pub use service::{RagApi, RagComponents, RagService};
pub use types::{InitError, IngestError, IngestOutcome, QueryError, QueryRequest, QueryResult};
