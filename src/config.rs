use serde::Deserialize;
use std::env;
use std::path::PathBuf;
use std::sync::OnceLock;
use std::time::Duration;
use thiserror::Error;

const DEFAULT_DATA_DIR: &str = "./data";
const DEFAULT_MAX_UPLOAD_BYTES: usize = 50 * 1024 * 1024;
const DEFAULT_PARSER_URL: &str = "https://api.cloud.llamaindex.ai";
const DEFAULT_PARSER_POLL_INTERVAL_MS: u64 = 1_000;
const DEFAULT_PARSER_MAX_POLLS: u32 = 300;
const DEFAULT_PARSE_COOLDOWN_SECS: u64 = 10;
const DEFAULT_PARSE_FAILURE_COOLDOWN_SECS: u64 = 5;
const DEFAULT_EMBEDDING_MODEL: &str = "bge-small-en-v1.5";
const DEFAULT_EMBEDDING_DIMENSION: usize = 384;
const DEFAULT_EMBEDDING_BATCH_SIZE: usize = 64;
const DEFAULT_LLM_MODEL: &str = "gemini-2.5-flash";
const DEFAULT_TOP_K: usize = 15;

/// Errors encountered while loading configuration from environment variables.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Required environment variable was not provided.
    #[error("Missing environment variable: {0}")]
    MissingVariable(String),
    /// Environment variable contained a value that could not be parsed.
    #[error("Invalid value for environment variable: {0}")]
    InvalidValue(String),
}

/// Runtime configuration for the document question-answering server.
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    /// Optional override for the HTTP server port.
    pub server_port: Option<u16>,
    /// Directory receiving uploaded files.
    pub data_dir: PathBuf,
    /// Upper bound on a single upload request body.
    pub max_upload_bytes: usize,
    /// Base URL of the remote parsing service.
    pub parser_url: String,
    /// API key presented to the remote parsing service.
    pub parser_api_key: Option<String>,
    /// Delay between job status polls against the parsing service.
    pub parser_poll_interval_ms: u64,
    /// Maximum number of status polls before a parse job is abandoned.
    pub parser_max_polls: u32,
    /// Lowercase file extensions routed to the remote parser.
    pub remote_parser_extensions: Vec<String>,
    /// Cooldown enforced after a successful parse.
    pub parse_cooldown_secs: u64,
    /// Cooldown enforced after a failed parse.
    pub parse_failure_cooldown_secs: u64,
    /// Embedding provider used to generate vector representations.
    pub embedding_provider: EmbeddingProvider,
    /// Embedding model identifier passed to the provider.
    pub embedding_model: String,
    /// Dimensionality of the produced vectors.
    pub embedding_dimension: usize,
    /// Largest number of texts sent to the embedding provider in one request.
    pub embedding_batch_size: usize,
    /// Optional override for the embedding endpoint base URL.
    pub embedding_url: Option<String>,
    /// API key for the hosted OpenAI embeddings API.
    pub openai_api_key: Option<String>,
    /// Base URL of a local Ollama runtime.
    pub ollama_url: Option<String>,
    /// Language model provider used to answer questions.
    pub llm_provider: LlmProvider,
    /// Language model identifier passed to the provider.
    pub llm_model: String,
    /// API key for the Gemini API.
    pub gemini_api_key: Option<String>,
    /// Optional override for the Gemini API base URL.
    pub gemini_url: Option<String>,
    /// Optional override for the automatic node size selection.
    pub text_splitter_chunk_size: Option<usize>,
    /// Optional token overlap between adjacent nodes.
    pub text_splitter_chunk_overlap: Option<usize>,
    /// Retrieval breadth used when a query omits `top_k`.
    pub query_default_top_k: usize,
}

/// Supported embedding backends for the indexing pipeline.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EmbeddingProvider {
    /// Local Ollama runtime.
    Ollama,
    /// Hosted OpenAI embeddings API.
    OpenAI,
    /// Deterministic in-process hashing, for offline use and tests.
    Hash,
}

/// Supported language model backends for answer generation.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LlmProvider {
    /// Google Gemini `generateContent` API.
    Gemini,
    /// Local Ollama runtime.
    Ollama,
}

impl Config {
    /// Load configuration from environment variables, performing validation along the way.
    pub fn from_env() -> Result<Self, ConfigError> {
        Ok(Self {
            server_port: parse_optional("SERVER_PORT")?,
            data_dir: load_env_optional("DATA_DIR")
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from(DEFAULT_DATA_DIR)),
            max_upload_bytes: parse_optional("MAX_UPLOAD_BYTES")?
                .unwrap_or(DEFAULT_MAX_UPLOAD_BYTES),
            parser_url: load_env_optional("PARSER_URL")
                .unwrap_or_else(|| DEFAULT_PARSER_URL.to_string()),
            parser_api_key: load_env_optional("PARSER_API_KEY")
                .or_else(|| load_env_optional("LLAMA_CLOUD_API_KEY")),
            parser_poll_interval_ms: parse_optional("PARSER_POLL_INTERVAL_MS")?
                .unwrap_or(DEFAULT_PARSER_POLL_INTERVAL_MS),
            parser_max_polls: parse_optional("PARSER_MAX_POLLS")?
                .unwrap_or(DEFAULT_PARSER_MAX_POLLS),
            remote_parser_extensions: load_env_optional("REMOTE_PARSER_EXTENSIONS")
                .map(|value| parse_extension_list(&value))
                .unwrap_or_else(|| vec!["pdf".to_string()]),
            parse_cooldown_secs: parse_optional("PARSE_COOLDOWN_SECS")?
                .unwrap_or(DEFAULT_PARSE_COOLDOWN_SECS),
            parse_failure_cooldown_secs: parse_optional("PARSE_FAILURE_COOLDOWN_SECS")?
                .unwrap_or(DEFAULT_PARSE_FAILURE_COOLDOWN_SECS),
            embedding_provider: load_env("EMBEDDING_PROVIDER")?.parse().map_err(|()| {
                ConfigError::InvalidValue("EMBEDDING_PROVIDER".to_string())
            })?,
            embedding_model: load_env_optional("EMBEDDING_MODEL")
                .unwrap_or_else(|| DEFAULT_EMBEDDING_MODEL.to_string()),
            embedding_dimension: parse_optional("EMBEDDING_DIMENSION")?
                .unwrap_or(DEFAULT_EMBEDDING_DIMENSION),
            embedding_batch_size: parse_optional("EMBEDDING_BATCH_SIZE")?
                .unwrap_or(DEFAULT_EMBEDDING_BATCH_SIZE),
            embedding_url: load_env_optional("EMBEDDING_URL"),
            openai_api_key: load_env_optional("OPENAI_API_KEY"),
            ollama_url: load_env_optional("OLLAMA_URL"),
            llm_provider: load_env_optional("LLM_PROVIDER")
                .map(|value| {
                    value
                        .parse()
                        .map_err(|()| ConfigError::InvalidValue("LLM_PROVIDER".to_string()))
                })
                .transpose()?
                .unwrap_or(LlmProvider::Gemini),
            llm_model: load_env_optional("LLM_MODEL")
                .unwrap_or_else(|| DEFAULT_LLM_MODEL.to_string()),
            gemini_api_key: load_env_optional("GEMINI_API_KEY")
                .or_else(|| load_env_optional("GOOGLE_API_KEY")),
            gemini_url: load_env_optional("GEMINI_URL"),
            text_splitter_chunk_size: parse_optional("TEXT_SPLITTER_CHUNK_SIZE")?,
            text_splitter_chunk_overlap: parse_optional("TEXT_SPLITTER_CHUNK_OVERLAP")?,
            query_default_top_k: parse_optional("QUERY_DEFAULT_TOP_K")?.unwrap_or(DEFAULT_TOP_K),
        })
    }

    /// Cooldown enforced after a successful parse.
    pub fn parse_cooldown(&self) -> Duration {
        Duration::from_secs(self.parse_cooldown_secs)
    }

    /// Cooldown enforced after a failed parse.
    pub fn parse_failure_cooldown(&self) -> Duration {
        Duration::from_secs(self.parse_failure_cooldown_secs)
    }
}

fn load_env(key: &str) -> Result<String, ConfigError> {
    env::var(key).map_err(|_| ConfigError::MissingVariable(key.to_string()))
}

fn load_env_optional(key: &str) -> Option<String> {
    env::var(key).ok().filter(|value| !value.trim().is_empty())
}

fn parse_optional<T: std::str::FromStr>(key: &str) -> Result<Option<T>, ConfigError> {
    load_env_optional(key)
        .map(|value| {
            value
                .trim()
                .parse()
                .map_err(|_| ConfigError::InvalidValue(key.to_string()))
        })
        .transpose()
}

fn parse_extension_list(value: &str) -> Vec<String> {
    value
        .split(',')
        .map(|item| item.trim().trim_start_matches('.').to_lowercase())
        .filter(|item| !item.is_empty())
        .collect()
}

impl std::str::FromStr for EmbeddingProvider {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "ollama" => Ok(Self::Ollama),
            "openai" => Ok(Self::OpenAI),
            "hash" => Ok(Self::Hash),
            _ => Err(()),
        }
    }
}

impl std::str::FromStr for LlmProvider {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "gemini" => Ok(Self::Gemini),
            "ollama" => Ok(Self::Ollama),
            _ => Err(()),
        }
    }
}

/// Global configuration cache populated during process start.
pub static CONFIG: OnceLock<Config> = OnceLock::new();

/// Retrieve the loaded configuration, panicking if initialization has not occurred.
pub fn get_config() -> &'static Config {
    CONFIG.get().expect("Config not initialized")
}

/// Load configuration from the environment and install it in the global cache.
pub fn init_config() {
    dotenvy::dotenv().ok();
    let config = Config::from_env().expect("Failed to load config from environment");
    install_config(config);
}

/// Install an already-built configuration in the global cache.
pub fn install_config(config: Config) {
    tracing::debug!(
        data_dir = %config.data_dir.display(),
        server_port = ?config.server_port,
        embedding_provider = ?config.embedding_provider,
        llm_provider = ?config.llm_provider,
        "Loaded configuration"
    );
    if CONFIG.set(config).is_err() {
        tracing::warn!("Configuration already installed; keeping the existing one");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn providers_parse_case_insensitively() {
        assert_eq!("OpenAI".parse(), Ok(EmbeddingProvider::OpenAI));
        assert_eq!("hash".parse(), Ok(EmbeddingProvider::Hash));
        assert_eq!("GEMINI".parse(), Ok(LlmProvider::Gemini));
        assert!("cohere".parse::<EmbeddingProvider>().is_err());
    }

    #[test]
    fn extension_list_normalizes_entries() {
        let extensions = parse_extension_list(" .PDF, docx ,,txt");
        assert_eq!(extensions, vec!["pdf", "docx", "txt"]);
    }
}
