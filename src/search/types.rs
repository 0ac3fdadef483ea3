//! Shared types used by the search client and the index manager.

use reqwest::StatusCode;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::time::Duration;
use thiserror::Error;

/// Errors returned while interacting with the search service.
#[derive(Debug, Error)]
pub enum SearchBackendError {
    /// Base URL failed to parse or normalize.
    #[error("Invalid search endpoint: {0}")]
    InvalidUrl(String),
    /// HTTP layer failed before receiving a response.
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),
    /// The resource already exists (HTTP 409 / 412).
    #[error("{resource} already exists: {body}")]
    Conflict {
        /// Resource that collided, e.g. `index 'docs'`.
        resource: String,
        /// Body payload associated with the failing response.
        body: String,
    },
    /// The resource is absent (HTTP 404).
    #[error("{resource} not found: {body}")]
    NotFound {
        /// Resource that was looked up.
        resource: String,
        /// Body payload associated with the failing response.
        body: String,
    },
    /// The service responded with an unexpected status code.
    #[error("Unexpected search response ({status}): {body}")]
    UnexpectedStatus {
        /// HTTP status returned from the service.
        status: StatusCode,
        /// Body payload associated with the failing response.
        body: String,
    },
    /// A document could not be encoded as JSON.
    #[error("Failed to encode document: {0}")]
    Encode(#[from] serde_json::Error),
    /// A success response could not be interpreted.
    #[error("Malformed search response: {0}")]
    InvalidResponse(String),
}

impl SearchBackendError {
    /// Whether the error signals that the resource already exists.
    pub fn is_conflict(&self) -> bool {
        matches!(self, Self::Conflict { .. })
    }

    /// Whether the error signals that the resource is absent.
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }
}

/// One record pushed into the index.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SearchDocument {
    /// Stable key, `"0"`, `"1"`, ... in corpus order.
    #[serde(rename = "embedId")]
    pub id: String,
    /// Chunk text.
    pub token: String,
    /// Chunk embedding.
    pub embedding: Vec<f32>,
    /// File the chunk came from, when the corpus tracks it.
    #[serde(rename = "title", skip_serializing_if = "Option::is_none")]
    pub source_document: Option<String>,
}

/// A document the service refused during an upload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FailedDocument {
    /// Key of the rejected document.
    pub key: String,
    /// Per-document status code reported by the service.
    pub status_code: u16,
    /// Service-provided reason, if any.
    pub message: Option<String>,
}

/// Summary describing how the service applied an upload.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UploadSummary {
    /// Documents accepted.
    pub succeeded: usize,
    /// Documents rejected.
    pub failed: Vec<FailedDocument>,
}

impl UploadSummary {
    /// Fold another batch result into this one.
    pub fn merge(&mut self, other: UploadSummary) {
        self.succeeded += other.succeeded;
        self.failed.extend(other.failed);
    }
}

/// Query kinds the index understands.
#[derive(Debug, Clone, PartialEq)]
pub enum QueryKind {
    /// k-nearest-neighbour search with a locally computed vector.
    Vector {
        /// Query embedding.
        vector: Vec<f32>,
        /// Number of neighbours to return.
        k: usize,
    },
    /// k-nearest-neighbour search vectorized by the index's own vectorizer.
    VectorizableText {
        /// Query text.
        text: String,
        /// Number of neighbours to return.
        k: usize,
    },
    /// Full-text query reranked by a semantic configuration.
    Semantic {
        /// Query text.
        text: String,
        /// Semantic configuration to rank with.
        configuration: String,
    },
}

/// A search request against one index.
#[derive(Debug, Clone, PartialEq)]
pub struct SearchQuery {
    /// What to search for.
    pub kind: QueryKind,
    /// Fields to project into each row.
    pub select: Vec<String>,
    /// Wait between sending the first request and reading its results.
    pub settle: Duration,
}

impl SearchQuery {
    /// Render the REST request body.
    pub(crate) fn to_body(&self, vector_field: &str, search_fields: &[&str]) -> Value {
        let mut body = Map::new();
        match &self.kind {
            QueryKind::Vector { vector, k } => {
                body.insert(
                    "vectorQueries".into(),
                    serde_json::json!([{
                        "kind": "vector",
                        "vector": vector,
                        "k": k,
                        "fields": vector_field,
                    }]),
                );
            }
            QueryKind::VectorizableText { text, k } => {
                body.insert(
                    "vectorQueries".into(),
                    serde_json::json!([{
                        "kind": "text",
                        "text": text,
                        "k": k,
                        "fields": vector_field,
                    }]),
                );
            }
            QueryKind::Semantic {
                text,
                configuration,
            } => {
                body.insert("search".into(), Value::String(text.clone()));
                body.insert("queryType".into(), Value::String("semantic".into()));
                body.insert(
                    "semanticConfiguration".into(),
                    Value::String(configuration.clone()),
                );
                body.insert(
                    "searchFields".into(),
                    Value::String(search_fields.join(",")),
                );
            }
        }
        if !self.select.is_empty() {
            body.insert("select".into(), Value::String(self.select.join(",")));
        }
        Value::Object(body)
    }
}

/// One matched document, projected to the selected fields.
#[derive(Debug, Clone, PartialEq)]
pub struct SearchRow {
    /// Chunk text.
    pub token: String,
    /// Source document, when the index stores one.
    pub source_document: Option<String>,
}

impl SearchRow {
    /// Build a row from a raw result object.
    pub(crate) fn from_payload(payload: &Map<String, Value>, source_field: &str) -> Option<Self> {
        let token = payload.get("token")?.as_str()?.to_string();
        let source_document = payload
            .get(source_field)
            .and_then(Value::as_str)
            .map(str::to_string);
        Some(Self {
            token,
            source_document,
        })
    }
}

#[derive(Deserialize)]
pub(crate) struct SearchPage {
    #[serde(default)]
    pub(crate) value: Vec<Map<String, Value>>,
    #[serde(rename = "@search.nextPageParameters", default)]
    pub(crate) next_page_parameters: Option<Value>,
}

#[derive(Deserialize)]
pub(crate) struct IndexingResponse {
    #[serde(default)]
    pub(crate) value: Vec<IndexingResult>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct IndexingResult {
    pub(crate) key: String,
    pub(crate) status: bool,
    #[serde(default)]
    pub(crate) error_message: Option<String>,
    pub(crate) status_code: u16,
}
