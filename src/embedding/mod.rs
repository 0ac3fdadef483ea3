//! Embedding provider abstraction and adapters.
//!
//! The corpus builder and the vector query path both talk to an [`EmbeddingClient`]. The
//! contract is positional: the returned vectors line up with the request inputs, and adapters
//! verify the count before handing vectors back so a short response can never silently
//! misalign chunks and embeddings.

use crate::config::{Config, EmbeddingProvider};
use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;

const DEFAULT_RETRY_ATTEMPTS: u32 = 3;
const EXPONENTIAL_BACKOFF_BASE: u32 = 2;
const DEFAULT_BACKOFF: Duration = Duration::from_millis(500);
const AZURE_OPENAI_API_VERSION: &str = "2024-02-01";
const DEFAULT_HASHING_DIMENSIONS: usize = 256;

/// Errors raised by embedding providers.
#[derive(Debug, Error)]
pub enum EmbeddingClientError {
    /// Provider settings are incomplete.
    #[error("Embedding provider not configured: {0}")]
    NotConfigured(String),
    /// Provider could not be reached.
    #[error("Embedding request failed: {0}")]
    RequestFailed(#[from] reqwest::Error),
    /// Provider answered with a non-success status.
    #[error("Unexpected embedding response ({status}): {body}")]
    UnexpectedStatus {
        /// HTTP status returned by the provider.
        status: StatusCode,
        /// Body payload associated with the failing response.
        body: String,
    },
    /// Provider response could not be interpreted.
    #[error("Malformed embedding response: {0}")]
    InvalidResponse(String),
    /// Provider returned a different number of vectors than inputs.
    #[error("Embedding provider returned {actual} vectors for {expected} inputs")]
    CountMismatch {
        /// Number of inputs sent.
        expected: usize,
        /// Number of vectors received.
        actual: usize,
    },
}

/// One embedding call: a batch of texts plus the model parameters.
#[derive(Debug, Clone)]
pub struct EmbeddingRequest {
    /// Texts to embed, in order.
    pub input: Vec<String>,
    /// Requested vector size, when the model accepts one.
    pub dimensions: Option<usize>,
    /// Model identifier.
    pub model: String,
}

/// Interface implemented by embedding backends.
#[async_trait]
pub trait EmbeddingClient: Send + Sync {
    /// Produce one vector per input, in request order.
    async fn embed(
        &self,
        request: EmbeddingRequest,
    ) -> Result<Vec<Vec<f32>>, EmbeddingClientError>;
}

#[derive(Serialize)]
struct EmbeddingsBody<'a> {
    input: &'a [String],
    model: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    dimensions: Option<usize>,
}

#[derive(Deserialize)]
struct EmbeddingsResponse {
    data: Vec<EmbeddingDatum>,
}

#[derive(Deserialize)]
struct EmbeddingDatum {
    embedding: Vec<f32>,
    #[serde(default)]
    index: Option<usize>,
}

/// HTTP client for OpenAI and Azure OpenAI embedding endpoints.
pub struct OpenAiEmbeddingClient {
    http: Client,
    url: String,
    api_key: Option<String>,
    provider: EmbeddingProvider,
    retry_attempts: u32,
    backoff: Duration,
}

impl OpenAiEmbeddingClient {
    /// Client for the public OpenAI API (or any compatible `/embeddings` endpoint).
    pub fn openai(endpoint: &str, api_key: Option<String>) -> Result<Self, EmbeddingClientError> {
        let url = format!("{}/embeddings", endpoint.trim_end_matches('/'));
        Self::build(url, api_key, EmbeddingProvider::OpenAI)
    }

    /// Client for an Azure OpenAI deployment.
    pub fn azure(
        endpoint: &str,
        deployment: &str,
        api_key: Option<String>,
    ) -> Result<Self, EmbeddingClientError> {
        let url = format!(
            "{}/openai/deployments/{deployment}/embeddings?api-version={AZURE_OPENAI_API_VERSION}",
            endpoint.trim_end_matches('/')
        );
        Self::build(url, api_key, EmbeddingProvider::Azure)
    }

    fn build(
        url: String,
        api_key: Option<String>,
        provider: EmbeddingProvider,
    ) -> Result<Self, EmbeddingClientError> {
        let http = Client::builder().user_agent("rusty-rag/embed").build()?;
        Ok(Self {
            http,
            url,
            api_key,
            provider,
            retry_attempts: DEFAULT_RETRY_ATTEMPTS,
            backoff: DEFAULT_BACKOFF,
        })
    }

    /// Override the retry policy for transient failures.
    pub fn with_retry(mut self, attempts: u32, backoff: Duration) -> Self {
        self.retry_attempts = attempts.max(1);
        self.backoff = backoff;
        self
    }

    async fn send_once(
        &self,
        body: &EmbeddingsBody<'_>,
    ) -> Result<EmbeddingsResponse, EmbeddingClientError> {
        let mut request = self.http.post(&self.url).json(body);
        if let Some(key) = self.api_key.as_deref().filter(|key| !key.is_empty()) {
            request = match self.provider {
                EmbeddingProvider::Azure => request.header("api-key", key),
                _ => request.bearer_auth(key),
            };
        }

        let response = request.send().await?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(EmbeddingClientError::UnexpectedStatus { status, body });
        }
        response
            .json::<EmbeddingsResponse>()
            .await
            .map_err(|error| EmbeddingClientError::InvalidResponse(error.to_string()))
    }
}

fn is_transient(error: &EmbeddingClientError) -> bool {
    match error {
        EmbeddingClientError::RequestFailed(_) => true,
        EmbeddingClientError::UnexpectedStatus { status, .. } => {
            *status == StatusCode::TOO_MANY_REQUESTS || status.is_server_error()
        }
        _ => false,
    }
}

/// Put vectors back into request order using the provider's `index` field when present.
fn order_embeddings(
    mut data: Vec<EmbeddingDatum>,
    expected: usize,
) -> Result<Vec<Vec<f32>>, EmbeddingClientError> {
    if data.len() != expected {
        return Err(EmbeddingClientError::CountMismatch {
            expected,
            actual: data.len(),
        });
    }
    if data.iter().all(|datum| datum.index.is_some()) {
        data.sort_by_key(|datum| datum.index);
        let contiguous = data
            .iter()
            .enumerate()
            .all(|(position, datum)| datum.index == Some(position));
        if !contiguous {
            return Err(EmbeddingClientError::InvalidResponse(
                "embedding indexes do not cover the request".to_string(),
            ));
        }
    }
    Ok(data.into_iter().map(|datum| datum.embedding).collect())
}

#[async_trait]
impl EmbeddingClient for OpenAiEmbeddingClient {
    async fn embed(
        &self,
        request: EmbeddingRequest,
    ) -> Result<Vec<Vec<f32>>, EmbeddingClientError> {
        let expected = request.input.len();
        if expected == 0 {
            return Ok(Vec::new());
        }
        let body = EmbeddingsBody {
            input: &request.input,
            model: &request.model,
            dimensions: request.dimensions,
        };

        let mut attempt = 1;
        loop {
            tracing::debug!(
                attempt,
                inputs = expected,
                model = %request.model,
                dimensions = ?request.dimensions,
                "Requesting embeddings"
            );
            match self.send_once(&body).await {
                Ok(response) => return order_embeddings(response.data, expected),
                Err(error) if attempt < self.retry_attempts && is_transient(&error) => {
                    let delay = self.backoff * EXPONENTIAL_BACKOFF_BASE.pow(attempt - 1);
                    tracing::warn!(
                        attempt,
                        max_attempts = self.retry_attempts,
                        error = %error,
                        ?delay,
                        "Transient embedding failure; retrying"
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                Err(error) => {
                    tracing::error!(attempt, error = %error, "Embedding request failed");
                    return Err(error);
                }
            }
        }
    }
}

/// Deterministic offline embedding client.
///
/// Hashes word tokens into a fixed-size vector and normalizes it. Similar texts land near each other
/// only by accident; it exists for dry runs and tests, not for retrieval quality.
pub struct HashingEmbeddingClient {
    default_dimensions: usize,
}

impl HashingEmbeddingClient {
    /// Construct a client that falls back to `default_dimensions` when a request names none.
    pub const fn new(default_dimensions: usize) -> Self {
        Self { default_dimensions }
    }

    /// Signed feature hashing of lowercase word tokens, then L2 normalisation.
    fn encode(text: &str, dimension: usize) -> Vec<f32> {
        let mut embedding = vec![0.0_f32; dimension];
        let tokens = text
            .split(|c: char| !c.is_alphanumeric())
            .filter(|token| !token.is_empty());
        for token in tokens {
            let hash = fnv1a(&token.to_lowercase());
            let bucket = (hash % dimension as u64) as usize;
            let sign = if hash >> 63 == 0 { 1.0 } else { -1.0 };
            embedding[bucket] += sign;
        }

        let norm = embedding.iter().map(|value| value * value).sum::<f32>().sqrt();
        if norm > 0.0 {
            embedding.iter_mut().for_each(|value| *value /= norm);
        }
        embedding
    }
}

fn fnv1a(token: &str) -> u64 {
    const OFFSET: u64 = 0xcbf2_9ce4_8422_2325;
    const PRIME: u64 = 0x0000_0100_0000_01b3;
    token
        .bytes()
        .fold(OFFSET, |hash, byte| (hash ^ u64::from(byte)).wrapping_mul(PRIME))
}

impl Default for HashingEmbeddingClient {
    fn default() -> Self {
        Self::new(DEFAULT_HASHING_DIMENSIONS)
    }
}

#[async_trait]
impl EmbeddingClient for HashingEmbeddingClient {
    async fn embed(
        &self,
        request: EmbeddingRequest,
    ) -> Result<Vec<Vec<f32>>, EmbeddingClientError> {
        let dimension = request.dimensions.unwrap_or(self.default_dimensions);
        if dimension == 0 {
            return Err(EmbeddingClientError::InvalidResponse(
                "embedding dimension must be greater than zero".to_string(),
            ));
        }

        Ok(request
            .input
            .iter()
            .map(|text| Self::encode(text, dimension))
            .collect())
    }
}

/// Build an embedding client suitable for the supplied configuration.
pub fn get_embedding_client(
    config: &Config,
) -> Result<Box<dyn EmbeddingClient>, EmbeddingClientError> {
    let endpoint = || {
        config.embedding_endpoint.as_deref().ok_or_else(|| {
            EmbeddingClientError::NotConfigured("EMBEDDING_ENDPOINT is not set".to_string())
        })
    };
    let client: Box<dyn EmbeddingClient> = match config.embedding_provider {
        EmbeddingProvider::OpenAI => Box::new(OpenAiEmbeddingClient::openai(
            endpoint()?,
            config.embedding_api_key.clone(),
        )?),
        EmbeddingProvider::Azure => Box::new(OpenAiEmbeddingClient::azure(
            endpoint()?,
            &config.embedding_deployment,
            config.embedding_api_key.clone(),
        )?),
        EmbeddingProvider::Hashing => Box::new(HashingEmbeddingClient::new(
            config
                .embedding_dimensions
                .unwrap_or(DEFAULT_HASHING_DIMENSIONS),
        )),
    };
    tracing::debug!(provider = ?config.embedding_provider, "Embedding client initialized");
    Ok(client)
}

#[cfg(test)]
mod tests {
    use super::*;
    use httpmock::{Method::POST, MockServer};
    use serde_json::json;

    fn request(texts: &[&str]) -> EmbeddingRequest {
        EmbeddingRequest {
            input: texts.iter().map(|text| text.to_string()).collect(),
            dimensions: Some(2),
            model: "text-embedding-3-small".to_string(),
        }
    }

    #[tokio::test]
    async fn azure_client_sends_deployment_request_and_orders_by_index() {
        let server = MockServer::start_async().await;
        let mock = server
            .mock_async(|when, then| {
                when.method(POST)
                    .path("/openai/deployments/embed/embeddings")
                    .query_param("api-version", AZURE_OPENAI_API_VERSION)
                    .header("api-key", "secret")
                    .json_body(json!({
                        "input": ["first", "second"],
                        "model": "text-embedding-3-small",
                        "dimensions": 2
                    }));
                then.status(200).json_body(json!({
                    "data": [
                        { "index": 1, "embedding": [1.0, 1.0] },
                        { "index": 0, "embedding": [0.0, 0.0] }
                    ]
                }));
            })
            .await;

        let client =
            OpenAiEmbeddingClient::azure(&server.base_url(), "embed", Some("secret".into()))
                .expect("client");
        let vectors = client
            .embed(request(&["first", "second"]))
            .await
            .expect("embeddings");

        mock.assert_async().await;
        assert_eq!(vectors, vec![vec![0.0, 0.0], vec![1.0, 1.0]]);
    }

    #[tokio::test]
    async fn short_response_is_rejected() {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(POST).path("/embeddings");
                then.status(200)
                    .json_body(json!({ "data": [ { "embedding": [0.5, 0.5] } ] }));
            })
            .await;

        let client = OpenAiEmbeddingClient::openai(&server.base_url(), None).expect("client");
        let error = client.embed(request(&["a", "b"])).await.unwrap_err();
        assert!(matches!(
            error,
            EmbeddingClientError::CountMismatch {
                expected: 2,
                actual: 1
            }
        ));
    }

    #[tokio::test]
    async fn client_errors_are_not_retried() {
        let server = MockServer::start_async().await;
        let mock = server
            .mock_async(|when, then| {
                when.method(POST).path("/embeddings");
                then.status(401).body("unauthorized");
            })
            .await;

        let client = OpenAiEmbeddingClient::openai(&server.base_url(), Some("bad".into()))
            .expect("client")
            .with_retry(3, Duration::ZERO);
        let error = client.embed(request(&["a"])).await.unwrap_err();

        mock.assert_hits_async(1).await;
        assert!(matches!(
            error,
            EmbeddingClientError::UnexpectedStatus { status, .. } if status == StatusCode::UNAUTHORIZED
        ));
    }

    #[tokio::test]
    async fn server_errors_are_retried_until_attempts_run_out() {
        let server = MockServer::start_async().await;
        let mock = server
            .mock_async(|when, then| {
                when.method(POST).path("/embeddings");
                then.status(503).body("busy");
            })
            .await;

        let client = OpenAiEmbeddingClient::openai(&server.base_url(), None)
            .expect("client")
            .with_retry(3, Duration::ZERO);
        let error = client.embed(request(&["a"])).await.unwrap_err();

        mock.assert_hits_async(3).await;
        assert!(is_transient(&error));
    }

    #[tokio::test]
    async fn hashing_client_honors_requested_dimensions() {
        let client = HashingEmbeddingClient::default();
        let vectors = client
            .embed(EmbeddingRequest {
                input: vec!["alpha".into(), "beta".into()],
                dimensions: Some(8),
                model: "hashing".into(),
            })
            .await
            .expect("embeddings");
        assert_eq!(vectors.len(), 2);
        assert!(vectors.iter().all(|vector| vector.len() == 8));
        let norm: f32 = vectors[0].iter().map(|value| value * value).sum();
        assert!((norm - 1.0).abs() < 1e-5);
    }

    #[test]
    fn hashing_depends_on_words_not_case_or_punctuation() {
        let plain = HashingEmbeddingClient::encode("Tents sleep four", 16);
        assert_eq!(plain, HashingEmbeddingClient::encode("tents, SLEEP four!", 16));
        assert_eq!(plain, HashingEmbeddingClient::encode("four sleep tents", 16));
        assert_ne!(plain, HashingEmbeddingClient::encode("tents sleep four adults", 16));
        assert!(HashingEmbeddingClient::encode("-- ..", 16).iter().all(|value| *value == 0.0));
    }
}
