use serde::Deserialize;
use std::env;
use std::sync::OnceLock;
use std::time::Duration;
use thiserror::Error;

/// Default REST API version sent to the search service.
pub const DEFAULT_SEARCH_API_VERSION: &str = "2024-07-01";
/// Default number of sentences folded into one embedding chunk.
pub const DEFAULT_SENTENCES_PER_EMBEDDING: usize = 4;
/// Default pause applied after a vector query before results are consumed.
pub const DEFAULT_POST_QUERY_DELAY: Duration = Duration::from_millis(1000);

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

/// Runtime configuration for the Rusty RAG tooling.
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    /// Base URL of the vector + semantic search service.
    pub search_endpoint: String,
    /// Name of the index to create, reuse, or delete.
    pub search_index_name: String,
    /// Admin or query key for the search service.
    pub search_api_key: Option<String>,
    /// Bearer token used when no API key is configured.
    pub search_bearer_token: Option<String>,
    /// REST API version appended to every search request.
    pub search_api_version: String,
    /// Embedding provider used to build the corpus and embed queries.
    pub embedding_provider: EmbeddingProvider,
    /// Base URL of the embedding service.
    pub embedding_endpoint: Option<String>,
    /// Key used by both this client and the index vectorizer.
    pub embedding_api_key: Option<String>,
    /// Embedding model identifier passed to the provider.
    pub embedding_model: String,
    /// Deployment name of the embedding model (Azure OpenAI).
    pub embedding_deployment: String,
    /// Dimensionality requested from the provider and declared on the index.
    pub embedding_dimensions: Option<usize>,
    /// Pause applied after a vector search before reading results.
    pub post_query_delay: Duration,
    /// Number of sentences folded into each corpus chunk.
    pub sentences_per_embedding: usize,
}

/// Supported embedding backends.
#[derive(Clone, Copy, Debug, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum EmbeddingProvider {
    /// Hosted OpenAI embeddings API.
    OpenAI,
    /// Azure OpenAI deployment.
    Azure,
    /// Deterministic offline hashing embeddings.
    Hashing,
}

impl Config {
    /// Load configuration from environment variables, performing validation along the way.
    pub fn from_env() -> Result<Self, ConfigError> {
        let embedding_model = load_env("EMBEDDING_MODEL")?;
        Ok(Self {
            search_endpoint: load_env("SEARCH_ENDPOINT")?,
            search_index_name: load_env("SEARCH_INDEX_NAME")?,
            search_api_key: load_env_optional("SEARCH_API_KEY"),
            search_bearer_token: load_env_optional("SEARCH_BEARER_TOKEN"),
            search_api_version: load_env_optional("SEARCH_API_VERSION")
                .unwrap_or_else(|| DEFAULT_SEARCH_API_VERSION.to_string()),
            embedding_provider: load_env_optional("EMBEDDING_PROVIDER")
                .map(|value| {
                    value
                        .parse()
                        .map_err(|()| ConfigError::InvalidValue("EMBEDDING_PROVIDER".to_string()))
                })
                .transpose()?
                .unwrap_or(EmbeddingProvider::Azure),
            embedding_endpoint: load_env_optional("EMBEDDING_ENDPOINT"),
            embedding_api_key: load_env_optional("EMBEDDING_API_KEY"),
            embedding_deployment: load_env_optional("EMBEDDING_DEPLOYMENT")
                .unwrap_or_else(|| embedding_model.clone()),
            embedding_model,
            embedding_dimensions: parse_optional("EMBEDDING_DIMENSIONS")?,
            post_query_delay: parse_optional::<u64>("SEARCH_POST_QUERY_DELAY_MS")?
                .map(Duration::from_millis)
                .unwrap_or(DEFAULT_POST_QUERY_DELAY),
            sentences_per_embedding: match parse_optional::<usize>("SEARCH_SENTENCES_PER_EMBEDDING")?
            {
                Some(0) => {
                    return Err(ConfigError::InvalidValue(
                        "SEARCH_SENTENCES_PER_EMBEDDING".to_string(),
                    ));
                }
                Some(value) => value,
                None => DEFAULT_SENTENCES_PER_EMBEDDING,
            },
        })
    }
}

fn load_env(key: &str) -> Result<String, ConfigError> {
    load_env_optional(key).ok_or_else(|| ConfigError::MissingVariable(key.to_string()))
}

fn load_env_optional(key: &str) -> Option<String> {
    env::var(key).ok().filter(|value| !value.trim().is_empty())
}

fn parse_optional<T: std::str::FromStr>(key: &str) -> Result<Option<T>, ConfigError> {
    parse_value(key, env::var(key).ok().as_deref())
}

fn parse_value<T: std::str::FromStr>(
    key: &str,
    raw: Option<&str>,
) -> Result<Option<T>, ConfigError> {
    raw.map(str::trim)
        .filter(|value| !value.is_empty())
        .map(|value| {
            value
                .parse()
                .map_err(|_| ConfigError::InvalidValue(key.to_string()))
        })
        .transpose()
}

impl std::str::FromStr for EmbeddingProvider {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "openai" => Ok(Self::OpenAI),
            "azure" | "azure-openai" | "azureopenai" => Ok(Self::Azure),
            "hashing" => Ok(Self::Hashing),
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
pub fn init_config() -> Result<&'static Config, ConfigError> {
    dotenvy::dotenv().ok();
    let config = Config::from_env()?;
    tracing::debug!(
        search_endpoint = %config.search_endpoint,
        index = %config.search_index_name,
        embedding_provider = ?config.embedding_provider,
        embedding_model = %config.embedding_model,
        dimensions = ?config.embedding_dimensions,
        "Loaded configuration"
    );
    Ok(CONFIG.get_or_init(|| config))
}
