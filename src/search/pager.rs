//! Streaming helpers for following search result pages without manual loops.

use async_stream::try_stream;
use futures_core::Stream;
use reqwest::Method;
use serde_json::{Map, Value};
use std::time::Duration;

use super::client::AzureSearchService;
use super::types::{SearchBackendError, SearchPage};

/// Stream raw result objects for a search request, following `@search.nextPageParameters`.
///
/// A non-zero `settle` is awaited once, after the first request is sent and before its
/// response is read.
pub fn stream_search_results<'a>(
    service: &'a AzureSearchService,
    index_name: &'a str,
    body: Value,
    settle: Duration,
) -> impl Stream<Item = Result<Map<String, Value>, SearchBackendError>> + 'a {
    try_stream! {
        let mut next_body = Some(body);
        let mut page = 0usize;

        while let Some(body) = next_body.take() {
            page += 1;
            let response = service
                .request(Method::POST, &format!("indexes/{index_name}/docs/search"))?
                .json(&body)
                .send()
                .await?;
            if page == 1 && !settle.is_zero() {
                tracing::trace!(index = index_name, ?settle, "Letting search results settle");
                tokio::time::sleep(settle).await;
            }

            let status = response.status();
            if status.is_success() {
                let SearchPage { value, next_page_parameters } = response
                    .json()
                    .await
                    .map_err(|error| SearchBackendError::InvalidResponse(error.to_string()))?;
                tracing::trace!(index = index_name, page, rows = value.len(), "Search page received");
                for row in value {
                    yield row;
                }
                next_body = next_page_parameters;
            } else {
                let body = response.text().await.unwrap_or_default();
                tracing::error!(index = index_name, status = %status, "Search request failed");
                let resource = format!("index '{index_name}'");
                Err::<(), _>(super::client::classify_status(status, resource, body))?;
            }
        }
    }
}
