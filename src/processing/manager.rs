//! Index lifecycle, upload, and query orchestration.
//!
//! [`SearchIndexManager`] owns the handle to one remote index. The handle is either absent or
//! bound to an [`IndexDescriptor`]; every operation that touches documents requires a bound
//! index and fails with [`IndexManagerError::IndexAbsent`] otherwise. Creation is idempotent
//! across processes: an "already exists" answer from the service is turned into reuse of the
//! existing index rather than an error, unless the caller asks for strict behaviour.

use std::path::Path;
use std::sync::{Arc, OnceLock};
use std::time::Duration;

use crate::{
    config::{Config, DEFAULT_POST_QUERY_DELAY, EmbeddingProvider},
    embedding::{EmbeddingClient, EmbeddingClientError, EmbeddingRequest, get_embedding_client},
    metrics::{IndexMetrics, MetricsSnapshot},
    processing::{
        chunking::{chunk_documents, load_documents},
        corpus::{DEFAULT_BATCH_SIZE, build_corpus_file, read_corpus_file},
        query::{DEFAULT_K_NEAREST_NEIGHBORS, format_search_results},
        types::{CorpusError, IndexManagerError},
    },
    search::{
        AzureSearchService, IndexDescriptor, IndexDocuments, IndexSchema, QueryKind,
        SchemaOptions, SearchDocument, SearchIndexAdmin, SearchQuery, UploadSummary,
        VectorizerSettings, schema::SEMANTIC_CONFIG,
    },
};

/// Documents sent to the service per upload request.
pub const DEFAULT_UPLOAD_BATCH_SIZE: usize = 1000;

/// Static settings of one manager instance.
#[derive(Debug, Clone)]
pub struct ManagerSettings {
    /// Index to create, reuse, or delete.
    pub index_name: String,
    /// Embedding dimensions fixed for this manager, if known up front.
    pub dimensions: Option<usize>,
    /// Embedding model used for the corpus and for queries.
    pub model: String,
    /// Options applied when this manager creates the index.
    pub schema: SchemaOptions,
    /// Pause between sending a vector query and reading its results.
    ///
    /// The service has been observed to need it; drop to zero once read-after-write
    /// consistency is confirmed.
    pub post_query_delay: Duration,
    /// Documents per upload request.
    pub upload_batch_size: usize,
}

impl ManagerSettings {
    /// Settings for `index_name` with defaults everywhere else.
    pub fn new(index_name: impl Into<String>, model: impl Into<String>) -> Self {
        Self {
            index_name: index_name.into(),
            dimensions: None,
            model: model.into(),
            schema: SchemaOptions::default(),
            post_query_delay: DEFAULT_POST_QUERY_DELAY,
            upload_batch_size: DEFAULT_UPLOAD_BATCH_SIZE,
        }
    }

    /// Derive settings from the loaded configuration.
    pub fn from_config(config: &Config) -> Self {
        let vectorizer = match (config.embedding_provider, &config.embedding_endpoint) {
            (EmbeddingProvider::Azure, Some(endpoint)) => Some(VectorizerSettings {
                resource_url: endpoint.clone(),
                deployment: config.embedding_deployment.clone(),
                api_key: config.embedding_api_key.clone(),
                model: config.embedding_model.clone(),
            }),
            _ => None,
        };

        Self {
            index_name: config.search_index_name.clone(),
            dimensions: config.embedding_dimensions,
            model: config.embedding_model.clone(),
            schema: SchemaOptions {
                vectorizer,
                semantic: true,
            },
            post_query_delay: config.post_query_delay,
            upload_batch_size: DEFAULT_UPLOAD_BATCH_SIZE,
        }
    }
}

struct BoundIndex {
    descriptor: IndexDescriptor,
    documents: OnceLock<Arc<dyn IndexDocuments>>,
}

enum IndexState {
    Absent,
    Bound(BoundIndex),
}

/// Creates, reuses, fills, queries, and deletes one search index.
pub struct SearchIndexManager {
    admin: Box<dyn SearchIndexAdmin>,
    embedding_client: Option<Box<dyn EmbeddingClient>>,
    settings: ManagerSettings,
    state: IndexState,
    metrics: Arc<IndexMetrics>,
}

impl SearchIndexManager {
    /// Build a manager over explicit collaborators. No remote call is made.
    pub fn new(
        admin: Box<dyn SearchIndexAdmin>,
        embedding_client: Option<Box<dyn EmbeddingClient>>,
        settings: ManagerSettings,
    ) -> Self {
        Self {
            admin,
            embedding_client,
            settings,
            state: IndexState::Absent,
            metrics: Arc::new(IndexMetrics::new()),
        }
    }

    /// Build a manager from configuration.
    ///
    /// A missing embedding endpoint leaves the manager without an embedding client; vector
    /// queries then rely on the index vectorizer and corpus building is unavailable.
    pub fn from_config(config: &Config) -> Result<Self, IndexManagerError> {
        let admin = AzureSearchService::from_config(config)?;
        let embedding_client = match get_embedding_client(config) {
            Ok(client) => Some(client),
            Err(EmbeddingClientError::NotConfigured(reason)) => {
                tracing::warn!(reason = %reason, "Embedding client unavailable");
                None
            }
            Err(error) => return Err(error.into()),
        };
        Ok(Self::new(
            Box::new(admin),
            embedding_client,
            ManagerSettings::from_config(config),
        ))
    }

    /// Settings this manager was built with.
    pub fn settings(&self) -> &ManagerSettings {
        &self.settings
    }

    /// Descriptor of the bound index, if any.
    pub fn descriptor(&self) -> Option<&IndexDescriptor> {
        match &self.state {
            IndexState::Bound(bound) => Some(&bound.descriptor),
            IndexState::Absent => None,
        }
    }

    /// Return the current index metrics snapshot.
    pub fn metrics_snapshot(&self) -> MetricsSnapshot {
        self.metrics.snapshot()
    }

    /// Resolve the dimensions to build the index with.
    ///
    /// Uses whichever of the manager's and the call's dimensions is set; fails when neither is
    /// set or when both are set and differ.
    pub fn check_dimensions(&self, requested: Option<usize>) -> Result<usize, IndexManagerError> {
        match (requested, self.settings.dimensions) {
            (None, None) => Err(IndexManagerError::MissingDimensions),
            (Some(requested), Some(configured)) if requested != configured => {
                Err(IndexManagerError::DimensionMismatch {
                    requested,
                    configured,
                })
            }
            (Some(dimensions), _) | (None, Some(dimensions)) => Ok(dimensions),
        }
    }

    /// Create the index, or reuse it when the service reports it already exists.
    ///
    /// Returns `true` only when the index was newly created. With `raise_on_error` the
    /// "already exists" error is returned instead of falling back to reuse.
    pub async fn create_index(
        &mut self,
        vector_index_dimensions: Option<usize>,
        raise_on_error: bool,
    ) -> Result<bool, IndexManagerError> {
        let dimensions = self.check_dimensions(vector_index_dimensions)?;
        let schema = IndexSchema::build(&self.settings.index_name, dimensions, &self.settings.schema);

        match self.admin.create_index(&schema).await {
            Ok(created) => {
                self.bind(&created, Some(dimensions), true);
                Ok(true)
            }
            Err(error) if error.is_conflict() && !raise_on_error => {
                tracing::info!(index = %self.settings.index_name, "Index already exists; reusing");
                let existing = self.admin.get_index(&self.settings.index_name).await?;
                self.bind(&existing, Some(dimensions), false);
                Ok(false)
            }
            Err(error) => Err(error.into()),
        }
    }

    /// Bind the index, fetching it first and creating it only when it is absent.
    ///
    /// A no-op when an index is already bound. Returns `true` only when the index was newly
    /// created.
    pub async fn ensure_index_created(
        &mut self,
        vector_index_dimensions: Option<usize>,
    ) -> Result<bool, IndexManagerError> {
        let dimensions = self.check_dimensions(vector_index_dimensions)?;
        if matches!(self.state, IndexState::Bound(_)) {
            return Ok(false);
        }

        let name = self.settings.index_name.clone();
        match self.admin.get_index(&name).await {
            Ok(existing) => {
                self.bind(&existing, Some(dimensions), false);
                return Ok(false);
            }
            Err(error) if error.is_not_found() => {
                tracing::debug!(index = %name, "Index not found; creating");
            }
            Err(error) => return Err(error.into()),
        }

        let schema = IndexSchema::build(&name, dimensions, &self.settings.schema);
        match self.admin.create_index(&schema).await {
            Ok(created) => {
                self.bind(&created, Some(dimensions), true);
                Ok(true)
            }
            Err(error) if error.is_conflict() => {
                tracing::info!(index = %name, "Index created concurrently; reusing");
                let existing = self.admin.get_index(&name).await?;
                self.bind(&existing, Some(dimensions), false);
                Ok(false)
            }
            Err(error) => Err(error.into()),
        }
    }

    /// Bind an index that must already exist, without creating it.
    ///
    /// Needs no dimensions. A no-op when an index is already bound; an absent index is an error.
    pub async fn bind_existing_index(&mut self) -> Result<(), IndexManagerError> {
        if matches!(self.state, IndexState::Bound(_)) {
            return Ok(());
        }
        let existing = self.admin.get_index(&self.settings.index_name).await?;
        self.bind(&existing, self.settings.dimensions, false);
        Ok(())
    }

    /// Delete the bound index and release the handle.
    pub async fn delete_index(&mut self) -> Result<(), IndexManagerError> {
        let name = self.bound_descriptor()?.name.clone();
        self.admin.delete_index(&name).await?;
        self.state = IndexState::Absent;
        tracing::info!(index = %name, "Index deleted");
        Ok(())
    }

    /// Chunk every markdown file in `input_dir`, embed the chunks, and write the corpus file.
    ///
    /// Returns the number of rows written.
    pub async fn build_embeddings_file(
        &self,
        input_dir: &Path,
        output_file: &Path,
        sentences_per_embedding: usize,
    ) -> Result<usize, IndexManagerError> {
        let client = self
            .embedding_client
            .as_deref()
            .ok_or(IndexManagerError::MissingEmbeddingClient)?;
        let documents = load_documents(input_dir)?;
        let chunks = chunk_documents(&documents, sentences_per_embedding);
        tracing::info!(
            documents = documents.len(),
            chunks = chunks.len(),
            sentences_per_embedding,
            "Documents chunked"
        );
        let rows = build_corpus_file(
            &chunks,
            client,
            &self.settings.model,
            self.settings.dimensions,
            DEFAULT_BATCH_SIZE,
            output_file,
        )
        .await?;
        Ok(rows)
    }

    /// Upload every row of a corpus file into the bound index.
    ///
    /// Rows get ids `"0"`, `"1"`, ... in file order and are sent in batches. Documents the
    /// service rejects are logged and reported in the summary rather than failing the call.
    pub async fn upload_documents(
        &self,
        embeddings_file: &Path,
    ) -> Result<UploadSummary, IndexManagerError> {
        let (descriptor, documents) = self.bound()?;
        let records = read_corpus_file(embeddings_file)?;

        if let Some(expected) = descriptor.vector_dimensions {
            if let Some((row, record)) = records
                .iter()
                .enumerate()
                .find(|(_, record)| record.embedding.len() != expected)
            {
                return Err(CorpusError::DimensionMismatch {
                    row,
                    expected,
                    actual: record.embedding.len(),
                }
                .into());
            }
        }

        let total = records.len();
        let mut pending = records.into_iter().map(|record| SearchDocument {
            id: record.id,
            token: record.token,
            embedding: record.embedding,
            source_document: record.source_document,
        });
        let batch_size = self.settings.upload_batch_size.max(1);
        let mut summary = UploadSummary::default();
        loop {
            let batch: Vec<SearchDocument> = pending.by_ref().take(batch_size).collect();
            if batch.is_empty() {
                break;
            }
            summary.merge(documents.upload_documents(batch).await?);
        }

        if let Some(first) = summary.failed.first() {
            tracing::warn!(
                index = %descriptor.name,
                failed = summary.failed.len(),
                first_key = %first.key,
                first_error = ?first.message,
                "Some documents were rejected"
            );
        }
        self.metrics.record_upload(summary.succeeded as u64);
        tracing::info!(
            index = %descriptor.name,
            documents = total,
            succeeded = summary.succeeded,
            "Documents uploaded"
        );
        Ok(summary)
    }

    /// Vector search: embed `message` and return the formatted nearest neighbours.
    ///
    /// Without an embedding client the query text is handed to the index vectorizer instead.
    pub async fn search(&self, message: &str) -> Result<String, IndexManagerError> {
        let (descriptor, documents) = self.bound()?;
        let kind = match self.embedding_client.as_deref() {
            Some(client) => {
                let vector = self.embed_query(client, descriptor, message).await?;
                QueryKind::Vector {
                    vector,
                    k: DEFAULT_K_NEAREST_NEIGHBORS,
                }
            }
            None if descriptor.vectorizer.is_some() => QueryKind::VectorizableText {
                text: message.to_string(),
                k: DEFAULT_K_NEAREST_NEIGHBORS,
            },
            None => return Err(IndexManagerError::NoVectorizer),
        };

        let rows = documents
            .search(SearchQuery {
                kind,
                select: descriptor.select_fields(),
                settle: self.settings.post_query_delay,
            })
            .await?;
        self.metrics.record_query();
        tracing::debug!(index = %descriptor.name, rows = rows.len(), "Vector search completed");
        Ok(format_search_results(&rows))
    }

    /// Semantic search: rank `message` with the index's semantic configuration.
    pub async fn semantic_search(&self, message: &str) -> Result<String, IndexManagerError> {
        let (descriptor, documents) = self.bound()?;
        let configuration = descriptor
            .semantic_config
            .clone()
            .unwrap_or_else(|| SEMANTIC_CONFIG.to_string());

        let rows = documents
            .search(SearchQuery {
                kind: QueryKind::Semantic {
                    text: message.to_string(),
                    configuration,
                },
                select: descriptor.select_fields(),
                settle: Duration::ZERO,
            })
            .await?;
        self.metrics.record_query();
        tracing::debug!(index = %descriptor.name, rows = rows.len(), "Semantic search completed");
        Ok(format_search_results(&rows))
    }

    /// Number of documents in the bound index.
    pub async fn document_count(&self) -> Result<u64, IndexManagerError> {
        let (_, documents) = self.bound()?;
        Ok(documents.document_count().await?)
    }

    /// Whether the bound index holds no documents.
    pub async fn is_index_empty(&self) -> Result<bool, IndexManagerError> {
        Ok(self.document_count().await? == 0)
    }

    async fn embed_query(
        &self,
        client: &dyn EmbeddingClient,
        descriptor: &IndexDescriptor,
        message: &str,
    ) -> Result<Vec<f32>, IndexManagerError> {
        let mut vectors = client
            .embed(EmbeddingRequest {
                input: vec![message.to_string()],
                dimensions: self.settings.dimensions.or(descriptor.vector_dimensions),
                model: self.settings.model.clone(),
            })
            .await?;
        let vector = vectors.pop().ok_or(IndexManagerError::EmptyEmbedding)?;
        match descriptor.vector_dimensions {
            Some(configured) if configured != vector.len() => {
                Err(IndexManagerError::DimensionMismatch {
                    requested: vector.len(),
                    configured,
                })
            }
            _ => Ok(vector),
        }
    }

    fn bind(&mut self, schema: &IndexSchema, requested: Option<usize>, created: bool) {
        let descriptor = IndexDescriptor::from_schema(schema);
        if let (Some(existing), Some(requested)) = (descriptor.vector_dimensions, requested)
            && existing != requested
        {
            tracing::warn!(
                index = %descriptor.name,
                existing,
                requested,
                "Bound index has different vector dimensions; schema left unchanged"
            );
        }
        tracing::info!(
            index = %descriptor.name,
            created,
            dimensions = ?descriptor.vector_dimensions,
            semantic = ?descriptor.semantic_config,
            vectorizer = ?descriptor.vectorizer,
            "Index bound"
        );
        self.metrics.record_index(created);
        self.state = IndexState::Bound(BoundIndex {
            descriptor,
            documents: OnceLock::new(),
        });
    }

    fn bound_descriptor(&self) -> Result<&IndexDescriptor, IndexManagerError> {
        self.descriptor().ok_or(IndexManagerError::IndexAbsent)
    }

    fn bound(&self) -> Result<(&IndexDescriptor, Arc<dyn IndexDocuments>), IndexManagerError> {
        match &self.state {
            IndexState::Bound(bound) => {
                let documents = bound
                    .documents
                    .get_or_init(|| self.admin.documents(&bound.descriptor.name))
                    .clone();
                Ok((&bound.descriptor, documents))
            }
            IndexState::Absent => Err(IndexManagerError::IndexAbsent),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::search::SearchCredential;

    fn manager(dimensions: Option<usize>) -> SearchIndexManager {
        let admin = AzureSearchService::new(
            "http://127.0.0.1:9",
            "2024-07-01",
            SearchCredential::Anonymous,
        )
        .expect("client");
        let mut settings = ManagerSettings::new("test_index", "text-embedding-3-small");
        settings.dimensions = dimensions;
        SearchIndexManager::new(Box::new(admin), None, settings)
    }

    #[test]
    fn missing_dimensions_are_rejected() {
        let error = manager(None).check_dimensions(None).unwrap_err();
        assert!(matches!(error, IndexManagerError::MissingDimensions));
        assert!(error.to_string().starts_with("no embedding dimensions were provided"));
    }

    #[test]
    fn differing_dimensions_are_rejected() {
        let error = manager(Some(41)).check_dimensions(Some(42)).unwrap_err();
        assert!(matches!(
            error,
            IndexManagerError::DimensionMismatch {
                requested: 42,
                configured: 41
            }
        ));
        assert!(error.to_string().starts_with("dimensions mismatch"));
    }

    #[test]
    fn either_source_of_dimensions_is_accepted() {
        assert_eq!(manager(Some(42)).check_dimensions(Some(42)).unwrap(), 42);
        assert_eq!(manager(Some(42)).check_dimensions(None).unwrap(), 42);
        assert_eq!(manager(None).check_dimensions(Some(7)).unwrap(), 7);
    }

    #[tokio::test]
    async fn create_without_dimensions_fails_before_any_request() {
        let mut manager = manager(None);
        let error = manager.create_index(None, false).await.unwrap_err();
        assert!(matches!(error, IndexManagerError::MissingDimensions));
        assert!(manager.descriptor().is_none());
    }

    #[tokio::test]
    async fn document_operations_require_a_bound_index() {
        let mut manager = manager(Some(4));
        assert!(matches!(
            manager.delete_index().await,
            Err(IndexManagerError::IndexAbsent)
        ));
        assert!(matches!(
            manager.search("tent").await,
            Err(IndexManagerError::IndexAbsent)
        ));
        assert!(matches!(
            manager.semantic_search("tent").await,
            Err(IndexManagerError::IndexAbsent)
        ));
        assert!(matches!(
            manager.is_index_empty().await,
            Err(IndexManagerError::IndexAbsent)
        ));
        assert!(matches!(
            manager.upload_documents(Path::new("missing.csv")).await,
            Err(IndexManagerError::IndexAbsent)
        ));
    }

    #[tokio::test]
    async fn building_a_corpus_needs_an_embedding_client() {
        let error = manager(Some(4))
            .build_embeddings_file(Path::new("."), Path::new("out.csv"), 4)
            .await
            .unwrap_err();
        assert!(matches!(error, IndexManagerError::MissingEmbeddingClient));
    }
}
