use crate::config::FetchConfig;
use crate::preview_data::PreviewDataService;
use crate::{Error, QueryContext, RawPreview, Result};
use reqwest::header::CONTENT_TYPE;
use reqwest::{Client, Response, StatusCode};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info};

/// Content type assumed for raw fetches when the server sends none.
const FALLBACK_CONTENT_TYPE: &str = "application/octet-stream";

/// Build the HTTP client shared by the fetcher and the preview-data service.
pub(crate) fn build_client(config: &FetchConfig) -> Result<Client> {
    let user_agent = config
        .user_agent
        .clone()
        .unwrap_or_else(|| concat!("docframe/", env!("CARGO_PKG_VERSION")).to_string());

    Client::builder()
        .timeout(Duration::from_secs(config.timeout_secs.max(1)))
        .user_agent(user_agent)
        .gzip(true)
        .brotli(true)
        .build()
        .map_err(Error::Network)
}

/// HTTP client retrieving cached preview renditions.
#[derive(Debug, Clone)]
pub struct Fetcher {
    client: Client,
}

impl Fetcher {
    /// Creates a new fetcher with default settings.
    pub fn new() -> Result<Self> {
        Self::with_config(&FetchConfig::default())
    }

    /// Creates a new fetcher from configuration.
    pub fn with_config(config: &FetchConfig) -> Result<Self> {
        Ok(Self {
            client: build_client(config)?,
        })
    }

    /// Fetches an HTML rendition.
    ///
    /// Fails with [`Error::FetchFailed`] on non-success statuses and when the
    /// response carries no textual content type.
    pub async fn fetch_html(&self, url: &str) -> Result<RawPreview> {
        let response = self.send(url).await?;

        let content_type = header_content_type(&response).ok_or_else(|| {
            Error::FetchFailed(format!("No content type returned for '{url}'"))
        })?;

        if !is_textual(&content_type) {
            return Err(Error::FetchFailed(format!(
                "Unexpected content type '{content_type}' for '{url}'"
            )));
        }

        let html = response.text().await?;
        info!("Fetched {} bytes from {}", html.len(), url);

        Ok(RawPreview {
            html,
            content_type,
            source_url: url.to_string(),
        })
    }

    /// Fetches a resource without inspecting its content type.
    pub async fn fetch_bytes(&self, url: &str) -> Result<(Vec<u8>, String)> {
        let response = self.send(url).await?;
        let content_type = header_content_type(&response)
            .unwrap_or_else(|| FALLBACK_CONTENT_TYPE.to_string());
        let bytes = response.bytes().await?;
        info!("Fetched {} raw bytes from {}", bytes.len(), url);
        Ok((bytes.to_vec(), content_type))
    }

    async fn send(&self, url: &str) -> Result<Response> {
        debug!(%url, "GET");
        let response = self.client.get(url).send().await?;
        let status = response.status();

        if !status.is_success() {
            if status == StatusCode::NOT_FOUND {
                return Err(Error::FetchFailed(format!(
                    "Document not found at '{url}'"
                )));
            }
            return Err(Error::FetchFailed(format!(
                "HTTP {} while fetching '{url}'",
                status.as_u16()
            )));
        }

        Ok(response)
    }
}

fn header_content_type(response: &Response) -> Option<String> {
    response
        .headers()
        .get(CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(ToString::to_string)
}

/// Whether a `Content-Type` value denotes a textual document.
pub(crate) fn is_textual(content_type: &str) -> bool {
    let essence = content_type
        .split(';')
        .next()
        .unwrap_or_default()
        .trim()
        .to_ascii_lowercase();
    essence.starts_with("text/") || essence == "application/xhtml+xml"
}

/// Resolves document identifiers to cached renditions and retrieves them.
pub struct PreviewFetcher {
    service: Arc<dyn PreviewDataService>,
    fetcher: Fetcher,
    query: QueryContext,
}

impl PreviewFetcher {
    /// Combine a preview-data service with an HTTP fetcher.
    pub fn new(service: Arc<dyn PreviewDataService>, fetcher: Fetcher) -> Self {
        Self {
            service,
            fetcher,
            query: QueryContext::default(),
        }
    }

    /// Replace the query context used to scope preview-data lookups.
    pub fn set_query(&mut self, query: QueryContext) {
        self.query = query;
    }

    /// Active query context.
    pub const fn query(&self) -> &QueryContext {
        &self.query
    }

    /// Underlying HTTP fetcher, for follow-up requests on resolved URLs.
    pub const fn fetcher(&self) -> &Fetcher {
        &self.fetcher
    }

    /// Ask the preview-data service where the cached rendition lives.
    pub async fn resolve_download_url(&self, document_id: &str) -> Result<String> {
        let data = self
            .service
            .get_preview_data(document_id, &self.query)
            .await?;

        self.service
            .make_download_url(&data.document_cached_content_url)
            .ok_or_else(|| {
                Error::PreviewData(format!(
                    "No download URL for cached content of '{document_id}'"
                ))
            })
    }

    /// Resolve and retrieve the HTML rendition of a document.
    ///
    /// `page` only tags the diagnostics; page selection happens when the
    /// rendition is rewritten.
    pub async fn fetch_preview(&self, document_id: &str, page: u32) -> Result<RawPreview> {
        debug!(document_id, page, "fetching preview");
        let url = self.resolve_download_url(document_id).await?;
        self.fetcher.fetch_html(&url).await
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::panic)]
mod tests {
    use super::*;
    use crate::preview_data::PreviewData;
    use async_trait::async_trait;
    use wiremock::{
        Mock, MockServer, ResponseTemplate,
        matchers::{method, path},
    };

    struct FixedService {
        cached: String,
        origin: String,
    }

    #[async_trait]
    impl PreviewDataService for FixedService {
        async fn get_preview_data(
            &self,
            _document_id: &str,
            _query: &QueryContext,
        ) -> Result<PreviewData> {
            Ok(PreviewData {
                document_cached_content_url: self.cached.clone(),
            })
        }

        fn make_download_url(&self, cached_content_url: &str) -> Option<String> {
            (!cached_content_url.is_empty()).then(|| format!("{}{cached_content_url}", self.origin))
        }
    }

    #[test]
    fn test_is_textual() {
        assert!(is_textual("text/html"));
        assert!(is_textual("text/html; charset=utf-8"));
        assert!(is_textual("TEXT/PLAIN"));
        assert!(is_textual("application/xhtml+xml"));
        assert!(!is_textual("application/pdf"));
        assert!(!is_textual(""));
    }

    #[tokio::test]
    async fn test_fetch_html_returns_body_and_type() -> anyhow::Result<()> {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/cache/file.htm"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_raw("<html><body>hi</body></html>", "text/html; charset=utf-8"),
            )
            .mount(&server)
            .await;

        let url = format!("{}/cache/file.htm", server.uri());
        let raw = Fetcher::new()?.fetch_html(&url).await?;

        assert_eq!(raw.html, "<html><body>hi</body></html>");
        assert_eq!(raw.content_type, "text/html; charset=utf-8");
        assert_eq!(raw.source_url, url);
        Ok(())
    }

    #[tokio::test]
    async fn test_fetch_html_rejects_binary_content() -> anyhow::Result<()> {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/doc.pdf"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_raw(vec![0x25_u8, 0x50, 0x44, 0x46], "application/pdf"),
            )
            .mount(&server)
            .await;

        let result = Fetcher::new()?
            .fetch_html(&format!("{}/doc.pdf", server.uri()))
            .await;

        match result {
            Err(Error::FetchFailed(msg)) => assert!(msg.contains("application/pdf")),
            other => panic!("expected FetchFailed, got {other:?}"),
        }
        Ok(())
    }

    #[tokio::test]
    async fn test_fetch_html_maps_status_errors() -> anyhow::Result<()> {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/missing.htm"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/broken.htm"))
            .respond_with(ResponseTemplate::new(500))
            .mount(&server)
            .await;

        let fetcher = Fetcher::new()?;
        let missing = fetcher
            .fetch_html(&format!("{}/missing.htm", server.uri()))
            .await;
        assert!(matches!(missing, Err(Error::FetchFailed(ref m)) if m.contains("not found")));

        let broken = fetcher
            .fetch_html(&format!("{}/broken.htm", server.uri()))
            .await;
        assert!(matches!(broken, Err(Error::FetchFailed(ref m)) if m.contains("500")));
        Ok(())
    }

    #[tokio::test]
    async fn test_fetch_bytes_defaults_content_type() -> anyhow::Result<()> {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/blob"))
            .respond_with(ResponseTemplate::new(200).set_body_bytes(vec![1, 2, 3]))
            .mount(&server)
            .await;

        let (bytes, content_type) = Fetcher::new()?
            .fetch_bytes(&format!("{}/blob", server.uri()))
            .await?;
        assert_eq!(bytes, vec![1, 2, 3]);
        assert!(!content_type.is_empty());
        Ok(())
    }

    #[tokio::test]
    async fn test_preview_fetcher_resolves_then_fetches() -> anyhow::Result<()> {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/cache/7/file.htm"))
            .respond_with(
                ResponseTemplate::new(200).set_body_raw("<p>cached</p>", "text/html"),
            )
            .mount(&server)
            .await;

        let service = Arc::new(FixedService {
            cached: "/cache/7/file.htm".into(),
            origin: server.uri(),
        });
        let preview = PreviewFetcher::new(service, Fetcher::new()?);

        let raw = preview.fetch_preview("doc-7", 1).await?;
        assert_eq!(raw.html, "<p>cached</p>");
        assert!(raw.source_url.ends_with("/cache/7/file.htm"));
        Ok(())
    }

    #[tokio::test]
    async fn test_preview_fetcher_without_download_url() -> anyhow::Result<()> {
        let service = Arc::new(FixedService {
            cached: String::new(),
            origin: "http://unused".into(),
        });
        let preview = PreviewFetcher::new(service, Fetcher::new()?);

        let result = preview.fetch_preview("doc-0", 1).await;
        assert!(matches!(result, Err(Error::PreviewData(_))));
        Ok(())
    }
}
