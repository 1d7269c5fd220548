//! Preview-data collaborator: maps a document identifier to the location of
//! its cached HTML rendition.

use crate::config::{FetchConfig, ServiceConfig};
use crate::fetcher::build_client;
use crate::{Error, QueryContext, Result};
use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::debug;
use url::Url;

/// Preview metadata returned by the search server.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PreviewData {
    /// Server-relative (or absolute) URL of the cached rendition.
    #[serde(default)]
    pub document_cached_content_url: String,
}

/// Source of preview metadata for documents in the search index.
#[async_trait]
pub trait PreviewDataService: Send + Sync {
    /// Look up preview metadata for a document within a query context.
    async fn get_preview_data(&self, document_id: &str, query: &QueryContext)
    -> Result<PreviewData>;

    /// Turn a cached content URL into an absolute download URL.
    fn make_download_url(&self, cached_content_url: &str) -> Option<String>;
}

#[derive(Serialize)]
struct PreviewDataRequest<'a> {
    action: &'static str,
    id: &'a str,
    query: &'a QueryContext,
}

/// [`PreviewDataService`] backed by the search server's JSON preview endpoint.
#[derive(Debug, Clone)]
pub struct HttpPreviewDataService {
    client: Client,
    origin: Url,
    endpoint: Url,
}

impl HttpPreviewDataService {
    /// Create a service client for the configured origin.
    pub fn new(service: &ServiceConfig, fetch: &FetchConfig) -> Result<Self> {
        let origin = Url::parse(&format!("{}/", service.origin.trim_end_matches('/')))
            .map_err(|e| Error::InvalidUrl(format!("{}: {e}", service.origin)))?;
        let endpoint = origin
            .join(service.preview_endpoint.trim_start_matches('/'))
            .map_err(|e| Error::InvalidUrl(format!("{}: {e}", service.preview_endpoint)))?;

        Ok(Self {
            client: build_client(fetch)?,
            origin,
            endpoint,
        })
    }

    /// Absolute URL of the preview endpoint.
    pub fn endpoint(&self) -> &str {
        self.endpoint.as_str()
    }
}

#[async_trait]
impl PreviewDataService for HttpPreviewDataService {
    async fn get_preview_data(
        &self,
        document_id: &str,
        query: &QueryContext,
    ) -> Result<PreviewData> {
        debug!(document_id, endpoint = %self.endpoint, "requesting preview data");

        let response = self
            .client
            .post(self.endpoint.clone())
            .json(&PreviewDataRequest {
                action: "getData",
                id: document_id,
                query,
            })
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            return Err(Error::PreviewData(format!(
                "HTTP {} from preview service for '{document_id}'",
                status.as_u16()
            )));
        }

        response
            .json::<PreviewData>()
            .await
            .map_err(|e| Error::PreviewData(format!("Invalid preview data: {e}")))
    }

    fn make_download_url(&self, cached_content_url: &str) -> Option<String> {
        let cached = cached_content_url.trim();
        if cached.is_empty() {
            return None;
        }
        self.origin.join(cached).ok().map(String::from)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use wiremock::{
        Mock, MockServer, ResponseTemplate,
        matchers::{body_partial_json, method, path},
    };

    fn service_for(origin: &str) -> HttpPreviewDataService {
        HttpPreviewDataService::new(
            &ServiceConfig {
                origin: origin.to_string(),
                preview_endpoint: "/api/v1/preview".to_string(),
            },
            &FetchConfig::default(),
        )
        .unwrap()
    }

    #[test]
    fn test_endpoint_joins_origin() {
        let service = service_for("https://search.example.com/");
        assert_eq!(service.endpoint(), "https://search.example.com/api/v1/preview");
    }

    #[test]
    fn test_make_download_url() {
        let service = service_for("https://search.example.com");
        assert_eq!(
            service.make_download_url("/cache/1/file.htm").as_deref(),
            Some("https://search.example.com/cache/1/file.htm")
        );
        assert_eq!(
            service
                .make_download_url("https://cdn.example.com/file.htm")
                .as_deref(),
            Some("https://cdn.example.com/file.htm")
        );
        assert_eq!(service.make_download_url("  "), None);
    }

    #[tokio::test]
    async fn test_get_preview_data_posts_query() -> anyhow::Result<()> {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/v1/preview"))
            .and(body_partial_json(serde_json::json!({
                "action": "getData",
                "id": "doc-42",
                "query": { "name": "_search", "text": "invoices" }
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "documentCachedContentUrl": "/cache/42/file.htm",
                "highlightsPerCategory": {}
            })))
            .mount(&server)
            .await;

        let service = service_for(&server.uri());
        let data = service
            .get_preview_data("doc-42", &QueryContext::new("_search", "invoices"))
            .await?;

        assert_eq!(data.document_cached_content_url, "/cache/42/file.htm");
        Ok(())
    }

    #[tokio::test]
    async fn test_get_preview_data_surfaces_status() -> anyhow::Result<()> {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/v1/preview"))
            .respond_with(ResponseTemplate::new(403))
            .mount(&server)
            .await;

        let result = service_for(&server.uri())
            .get_preview_data("doc-1", &QueryContext::default())
            .await;
        assert!(matches!(result, Err(Error::PreviewData(ref m)) if m.contains("403")));
        Ok(())
    }
}
