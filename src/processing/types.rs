//! Core data types and error definitions for chunking, corpus building, and index management.

use crate::{embedding::EmbeddingClientError, search::SearchBackendError};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// A unit of text embedded as one vector.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Chunk {
    /// Space-joined sentences.
    pub text: String,
    /// File name of the document the sentences came from.
    pub source_document: String,
}

/// One row of the embeddings corpus file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CorpusRow {
    /// Chunk text.
    pub token: String,
    /// JSON-encoded float array.
    pub embedding: String,
    /// Source document; legacy corpora call it `title` or `document_reference`, or omit it.
    #[serde(
        rename = "sourceDocument",
        alias = "title",
        alias = "document_reference",
        default
    )]
    pub source_document: Option<String>,
}

/// A decoded corpus row with its upload id.
#[derive(Debug, Clone, PartialEq)]
pub struct EmbeddingRecord {
    /// Stable incrementing id, `"0"`, `"1"`, ...
    pub id: String,
    /// Chunk text.
    pub token: String,
    /// Chunk embedding.
    pub embedding: Vec<f32>,
    /// Source document, when the corpus tracks it.
    pub source_document: Option<String>,
}

/// Errors produced while reading documents or reading/writing the corpus file.
#[derive(Debug, Error)]
pub enum CorpusError {
    /// Filesystem access failed.
    #[error("I/O error on '{path}': {source}")]
    Io {
        /// Path being read or written.
        path: String,
        /// Underlying error.
        #[source]
        source: std::io::Error,
    },
    /// Walking the input directory failed.
    #[error("Failed to list input documents: {0}")]
    Walk(#[from] walkdir::Error),
    /// CSV encoding or decoding failed.
    #[error("Corpus CSV error: {0}")]
    Csv(#[from] csv::Error),
    /// An embedding column was not a JSON float array.
    #[error("Row {row} has an invalid embedding: {source}")]
    Json {
        /// Zero-based data row.
        row: usize,
        /// Underlying error.
        #[source]
        source: serde_json::Error,
    },
    /// The embedding provider failed.
    #[error("Failed to generate embeddings: {0}")]
    Embedding(#[from] EmbeddingClientError),
    /// A vector had the wrong length.
    #[error("Row {row} has {actual} dimensions, expected {expected}")]
    DimensionMismatch {
        /// Zero-based data row.
        row: usize,
        /// Expected vector length.
        expected: usize,
        /// Actual vector length.
        actual: usize,
    },
    /// Batch size of zero.
    #[error("batch size must be greater than zero")]
    InvalidBatchSize,
}

/// Errors emitted by the index manager.
#[derive(Debug, Error)]
pub enum IndexManagerError {
    /// Neither the manager nor the call supplied dimensions.
    #[error(
        "no embedding dimensions were provided; set dimensions on the manager or pass them to the call"
    )]
    MissingDimensions,
    /// The call's dimensions disagree with the manager's.
    #[error("dimensions mismatch: requested {requested}, manager configured with {configured}")]
    DimensionMismatch {
        /// Dimensions passed to the call.
        requested: usize,
        /// Dimensions the manager was built with.
        configured: usize,
    },
    /// The operation needs a bound index.
    #[error("index absent: create or ensure the index before calling this operation")]
    IndexAbsent,
    /// The search service failed.
    #[error("Search backend request failed: {0}")]
    Backend(#[from] SearchBackendError),
    /// Reading or writing the corpus failed.
    #[error("Corpus error: {0}")]
    Corpus(#[from] CorpusError),
    /// The embedding provider failed while embedding a query.
    #[error("Failed to generate embeddings: {0}")]
    Embedding(#[from] EmbeddingClientError),
    /// The embedding provider returned no vector for a query.
    #[error("Embedding provider returned no vectors for the query")]
    EmptyEmbedding,
    /// The operation needs an embedding client and none is configured.
    #[error("no embedding client configured")]
    MissingEmbeddingClient,
    /// The query needs an embedding client or an index vectorizer, and neither is available.
    #[error("no embedding client configured and the index has no vectorizer")]
    NoVectorizer,
}
