//! Capability seams between the index manager and the search service.

use async_trait::async_trait;
use std::sync::Arc;

use super::schema::IndexSchema;
use super::types::{SearchBackendError, SearchDocument, SearchQuery, SearchRow, UploadSummary};

/// Index-level administration: create, fetch, and delete index definitions.
#[async_trait]
pub trait SearchIndexAdmin: Send + Sync {
    /// Create a new index. Fails with [`SearchBackendError::Conflict`] when it already exists.
    async fn create_index(&self, schema: &IndexSchema) -> Result<IndexSchema, SearchBackendError>;

    /// Fetch an index definition. Fails with [`SearchBackendError::NotFound`] when absent.
    async fn get_index(&self, name: &str) -> Result<IndexSchema, SearchBackendError>;

    /// Delete an index and everything in it.
    async fn delete_index(&self, name: &str) -> Result<(), SearchBackendError>;

    /// Open a document client bound to one index.
    fn documents(&self, index_name: &str) -> Arc<dyn IndexDocuments>;
}

/// Document-level operations on one bound index.
#[async_trait]
pub trait IndexDocuments: Send + Sync {
    /// Upsert documents, reporting per-document outcomes.
    async fn upload_documents(
        &self,
        documents: Vec<SearchDocument>,
    ) -> Result<UploadSummary, SearchBackendError>;

    /// Run a query and return every matching row in service order.
    async fn search(&self, query: SearchQuery) -> Result<Vec<SearchRow>, SearchBackendError>;

    /// Number of documents currently stored.
    async fn document_count(&self) -> Result<u64, SearchBackendError>;
}
