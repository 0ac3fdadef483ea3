//! Vector + semantic search service integration.

pub mod backend;
pub mod client;
/// Streaming helpers for paged search results.
pub mod pager;
pub mod schema;
pub mod types;

pub use backend::{IndexDocuments, SearchIndexAdmin};
pub use client::{AzureSearchService, SearchCredential};
pub use schema::{IndexDescriptor, IndexSchema, SchemaOptions, VectorizerSettings};
pub use types::{
    FailedDocument, QueryKind, SearchBackendError, SearchDocument, SearchQuery, SearchRow,
    UploadSummary,
};
