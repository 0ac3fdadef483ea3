//! HTTP client wrapper for the vector + semantic search service.

use crate::config::Config;
use crate::search::{
    backend::{IndexDocuments, SearchIndexAdmin},
    pager::stream_search_results,
    schema::{IndexSchema, SEMANTIC_SEARCH_FIELDS, SOURCE_FIELD, VECTOR_FIELD},
    types::{
        FailedDocument, IndexingResponse, SearchBackendError, SearchDocument, SearchQuery,
        SearchRow, UploadSummary,
    },
};
use async_trait::async_trait;
use futures_util::TryStreamExt;
use reqwest::{Client, Method, StatusCode};
use serde_json::{Value, json};
use std::sync::Arc;

/// How requests authenticate against the search service.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SearchCredential {
    /// `api-key` header.
    ApiKey(String),
    /// `Authorization: Bearer` header.
    BearerToken(String),
    /// No credential (local emulators, tests).
    Anonymous,
}

impl SearchCredential {
    /// Pick the credential from configuration, preferring the API key.
    pub fn from_config(config: &Config) -> Self {
        match (&config.search_api_key, &config.search_bearer_token) {
            (Some(key), _) => Self::ApiKey(key.clone()),
            (None, Some(token)) => Self::BearerToken(token.clone()),
            (None, None) => Self::Anonymous,
        }
    }
}

/// Lightweight HTTP client for index and document operations.
#[derive(Clone)]
pub struct AzureSearchService {
    pub(crate) client: Client,
    pub(crate) base_url: String,
    pub(crate) api_version: String,
    pub(crate) credential: SearchCredential,
}

impl AzureSearchService {
    /// Construct a client for `endpoint`.
    pub fn new(
        endpoint: &str,
        api_version: &str,
        credential: SearchCredential,
    ) -> Result<Self, SearchBackendError> {
        let client = Client::builder().user_agent("rusty-rag/0.1").build()?;
        let base_url = normalize_base_url(endpoint).map_err(SearchBackendError::InvalidUrl)?;
        tracing::debug!(
            url = %base_url,
            api_version,
            has_credential = !matches!(credential, SearchCredential::Anonymous),
            "Initialized search HTTP client"
        );

        Ok(Self {
            client,
            base_url,
            api_version: api_version.to_string(),
            credential,
        })
    }

    /// Construct a client using configuration derived from the environment.
    pub fn from_config(config: &Config) -> Result<Self, SearchBackendError> {
        Self::new(
            &config.search_endpoint,
            &config.search_api_version,
            SearchCredential::from_config(config),
        )
    }

    pub(crate) fn request(
        &self,
        method: Method,
        path: &str,
    ) -> Result<reqwest::RequestBuilder, SearchBackendError> {
        let url = format_endpoint(&self.base_url, path);
        let mut req = self
            .client
            .request(method, url)
            .query(&[("api-version", self.api_version.as_str())]);
        match &self.credential {
            SearchCredential::ApiKey(key) if !key.is_empty() => {
                req = req.header("api-key", key);
            }
            SearchCredential::BearerToken(token) if !token.is_empty() => {
                req = req.bearer_auth(token);
            }
            _ => {}
        }
        Ok(req)
    }

    async fn fail(&self, response: reqwest::Response, resource: String) -> SearchBackendError {
        let status = response.status();
        let body = response.text().await.unwrap_or_default();
        let error = classify_status(status, resource, body);
        if !error.is_conflict() && !error.is_not_found() {
            tracing::error!(error = %error, "Search request failed");
        }
        error
    }

    async fn upload_batch(
        &self,
        index_name: &str,
        documents: Vec<SearchDocument>,
    ) -> Result<UploadSummary, SearchBackendError> {
        if documents.is_empty() {
            return Ok(UploadSummary::default());
        }

        let actions: Vec<Value> = documents
            .into_iter()
            .map(|document| -> Result<Value, SearchBackendError> {
                let mut value = serde_json::to_value(document)?;
                if let Some(object) = value.as_object_mut() {
                    object.insert("@search.action".into(), Value::String("mergeOrUpload".into()));
                }
                Ok(value)
            })
            .collect::<Result<_, _>>()?;
        let count = actions.len();

        let response = self
            .request(Method::POST, &format!("indexes/{index_name}/docs/index"))?
            .json(&json!({ "value": actions }))
            .send()
            .await?;

        let status = response.status();
        if status != StatusCode::OK && status != StatusCode::MULTI_STATUS {
            return Err(self.fail(response, format!("index '{index_name}'")).await);
        }

        let IndexingResponse { value } = response
            .json()
            .await
            .map_err(|error| SearchBackendError::InvalidResponse(error.to_string()))?;
        let mut summary = UploadSummary::default();
        for result in value {
            if result.status {
                summary.succeeded += 1;
            } else {
                summary.failed.push(FailedDocument {
                    key: result.key,
                    status_code: result.status_code,
                    message: result.error_message,
                });
            }
        }
        tracing::debug!(
            index = index_name,
            sent = count,
            succeeded = summary.succeeded,
            failed = summary.failed.len(),
            "Document batch indexed"
        );
        Ok(summary)
    }
}

#[async_trait]
impl SearchIndexAdmin for AzureSearchService {
    async fn create_index(&self, schema: &IndexSchema) -> Result<IndexSchema, SearchBackendError> {
        let response = self
            .request(Method::POST, "indexes")?
            .json(schema)
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(self.fail(response, format!("index '{}'", schema.name)).await);
        }
        tracing::debug!(index = %schema.name, "Index created");
        response
            .json()
            .await
            .map_err(|error| SearchBackendError::InvalidResponse(error.to_string()))
    }

    async fn get_index(&self, name: &str) -> Result<IndexSchema, SearchBackendError> {
        let response = self
            .request(Method::GET, &format!("indexes/{name}"))?
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(self.fail(response, format!("index '{name}'")).await);
        }
        response
            .json()
            .await
            .map_err(|error| SearchBackendError::InvalidResponse(error.to_string()))
    }

    async fn delete_index(&self, name: &str) -> Result<(), SearchBackendError> {
        let response = self
            .request(Method::DELETE, &format!("indexes/{name}"))?
            .send()
            .await?;

        if response.status().is_success() {
            tracing::debug!(index = name, "Index deleted");
            Ok(())
        } else {
            Err(self.fail(response, format!("index '{name}'")).await)
        }
    }

    fn documents(&self, index_name: &str) -> Arc<dyn IndexDocuments> {
        Arc::new(IndexDocumentsClient {
            service: self.clone(),
            index_name: index_name.to_string(),
        })
    }
}

/// Document client bound to one index.
pub struct IndexDocumentsClient {
    service: AzureSearchService,
    index_name: String,
}

#[async_trait]
impl IndexDocuments for IndexDocumentsClient {
    async fn upload_documents(
        &self,
        documents: Vec<SearchDocument>,
    ) -> Result<UploadSummary, SearchBackendError> {
        self.service.upload_batch(&self.index_name, documents).await
    }

    async fn search(&self, query: SearchQuery) -> Result<Vec<SearchRow>, SearchBackendError> {
        let body = query.to_body(VECTOR_FIELD, SEMANTIC_SEARCH_FIELDS);
        let payloads: Vec<_> = stream_search_results(&self.service, &self.index_name, body, query.settle)
            .try_collect()
            .await?;

        let rows: Vec<SearchRow> = payloads
            .iter()
            .filter_map(|payload| SearchRow::from_payload(payload, SOURCE_FIELD))
            .collect();
        if rows.len() < payloads.len() {
            tracing::warn!(
                index = %self.index_name,
                dropped = payloads.len() - rows.len(),
                "Search rows without a token field were skipped"
            );
        }
        Ok(rows)
    }

    async fn document_count(&self) -> Result<u64, SearchBackendError> {
        let response = self
            .service
            .request(Method::GET, &format!("indexes/{}/docs/$count", self.index_name))?
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(self
                .service
                .fail(response, format!("index '{}'", self.index_name))
                .await);
        }
        let text = response.text().await?;
        let text = text.trim().trim_start_matches('\u{feff}');
        text.parse()
            .map_err(|_| SearchBackendError::InvalidResponse(format!("document count '{text}'")))
    }
}

/// Map a failing status onto the error taxonomy.
pub(crate) fn classify_status(
    status: StatusCode,
    resource: String,
    body: String,
) -> SearchBackendError {
    match status {
        StatusCode::CONFLICT | StatusCode::PRECONDITION_FAILED => {
            SearchBackendError::Conflict { resource, body }
        }
        StatusCode::NOT_FOUND => SearchBackendError::NotFound { resource, body },
        status => SearchBackendError::UnexpectedStatus { status, body },
    }
}

fn normalize_base_url(url: &str) -> Result<String, String> {
    let mut parsed = reqwest::Url::parse(url).map_err(|err| err.to_string())?;
    let path = parsed.path().trim_end_matches('/').to_string();
    parsed.set_path(&path);
    Ok(parsed.to_string())
}

fn format_endpoint(base: &str, path: &str) -> String {
    let base = base.trim_end_matches('/');
    let path = path.trim_start_matches('/');
    format!("{base}/{path}")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::search::schema::SchemaOptions;
    use crate::search::types::QueryKind;
    use httpmock::{
        Method::{GET, POST},
        MockServer,
    };
    use std::time::Duration;

    fn service(server: &MockServer) -> AzureSearchService {
        AzureSearchService::new(
            &server.base_url(),
            "2024-07-01",
            SearchCredential::ApiKey("admin-key".into()),
        )
        .expect("client")
    }

    #[tokio::test]
    async fn create_index_maps_conflict() {
        let server = MockServer::start_async().await;
        let mock = server
            .mock_async(|when, then| {
                when.method(POST)
                    .path("/indexes")
                    .query_param("api-version", "2024-07-01")
                    .header("api-key", "admin-key");
                then.status(409).body("CannotCreateExistingIndex");
            })
            .await;

        let schema = IndexSchema::build("docs", 4, &SchemaOptions::default());
        let error = service(&server).create_index(&schema).await.unwrap_err();

        mock.assert_async().await;
        assert!(error.is_conflict(), "{error}");
    }

    #[tokio::test]
    async fn get_index_maps_not_found() {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(GET).path("/indexes/missing");
                then.status(404).body("No index with the name 'missing'");
            })
            .await;

        let error = service(&server).get_index("missing").await.unwrap_err();
        assert!(error.is_not_found(), "{error}");
    }

    #[tokio::test]
    async fn search_follows_next_page_parameters() {
        let server = MockServer::start_async().await;
        let second = server
            .mock_async(|when, then| {
                when.method(POST)
                    .path("/indexes/docs/docs/search")
                    .json_body_partial(r#"{ "skip": 2 }"#);
                then.status(200).json_body(json!({
                    "value": [ { "token": "c", "title": "c.md" } ]
                }));
            })
            .await;
        let first = server
            .mock_async(|when, then| {
                when.method(POST)
                    .path("/indexes/docs/docs/search")
                    .json_body_partial(r#"{ "queryType": "semantic" }"#);
                then.status(200).json_body(json!({
                    "value": [
                        { "token": "a", "title": "a.md", "@search.score": 2.0 },
                        { "token": "b", "title": "b.md", "@search.score": 1.0 }
                    ],
                    "@search.nextPageParameters": { "search": "q", "skip": 2 }
                }));
            })
            .await;

        let rows = service(&server)
            .documents("docs")
            .search(SearchQuery {
                kind: QueryKind::Semantic {
                    text: "q".into(),
                    configuration: "semantic_search".into(),
                },
                select: vec!["token".into(), "title".into()],
                settle: Duration::ZERO,
            })
            .await
            .expect("search");

        first.assert_async().await;
        second.assert_async().await;
        let tokens: Vec<_> = rows.iter().map(|row| row.token.as_str()).collect();
        assert_eq!(tokens, vec!["a", "b", "c"]);
        assert_eq!(rows[2].source_document.as_deref(), Some("c.md"));
    }

    #[tokio::test]
    async fn settle_delay_runs_after_the_request_is_sent() {
        let server = MockServer::start_async().await;
        let searched = server
            .mock_async(|when, then| {
                when.method(POST).path("/indexes/docs/docs/search");
                then.status(200).json_body(json!({
                    "value": [ { "token": "a", "title": "a.md" } ]
                }));
            })
            .await;

        let documents = service(&server).documents("docs");
        let settle = Duration::from_millis(600);
        let started = std::time::Instant::now();
        let pending = tokio::spawn(async move {
            documents
                .search(SearchQuery {
                    kind: QueryKind::Vector {
                        vector: vec![0.5; 4],
                        k: 5,
                    },
                    select: vec!["token".into(), "title".into()],
                    settle,
                })
                .await
        });

        tokio::time::sleep(Duration::from_millis(200)).await;
        assert_eq!(searched.hits_async().await, 1, "request is sent before the wait");
        assert!(!pending.is_finished(), "results are not read until the wait ends");

        let rows = pending.await.expect("join").expect("search");
        assert!(started.elapsed() >= settle);
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].token, "a");
    }

    #[tokio::test]
    async fn upload_surfaces_partial_failures() {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(POST)
                    .path("/indexes/docs/docs/index")
                    .body_contains("\"@search.action\":\"mergeOrUpload\"");
                then.status(207).json_body(json!({
                    "value": [
                        { "key": "0", "status": true, "errorMessage": null, "statusCode": 201 },
                        { "key": "1", "status": false, "errorMessage": "too large", "statusCode": 400 }
                    ]
                }));
            })
            .await;

        let documents = vec![
            SearchDocument {
                id: "0".into(),
                token: "a".into(),
                embedding: vec![0.0],
                source_document: Some("a.md".into()),
            },
            SearchDocument {
                id: "1".into(),
                token: "b".into(),
                embedding: vec![1.0],
                source_document: None,
            },
        ];
        let summary = service(&server)
            .documents("docs")
            .upload_documents(documents)
            .await
            .expect("upload");

        assert_eq!(summary.succeeded, 1);
        assert_eq!(
            summary.failed,
            vec![FailedDocument {
                key: "1".into(),
                status_code: 400,
                message: Some("too large".into()),
            }]
        );
    }

    #[tokio::test]
    async fn document_count_parses_plain_text() {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(GET).path("/indexes/docs/docs/$count");
                then.status(200).body("\u{feff}17");
            })
            .await;

        let count = service(&server)
            .documents("docs")
            .document_count()
            .await
            .expect("count");
        assert_eq!(count, 17);
    }
}
