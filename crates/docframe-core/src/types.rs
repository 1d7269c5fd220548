//! Core data types shared by the fetcher, rewriter and bridge.

use crate::{Error, Result};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::LazyLock;
use url::Url;

/// Splits a document path into its directory prefix and the converter's
/// `file….htm…` page name.
///
/// SAFETY: Pattern is a compile-time constant that is known to be valid.
#[allow(clippy::unwrap_used)]
static PAGE_FILE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^(.*)(file.*\.htm.*)$").unwrap());

/// How a preview request is turned into displayable content.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PreviewMode {
    /// Publish the download URL as-is, without fetching.
    Default,
    /// Fetch the document and publish its bytes untouched.
    RawFetch,
    /// Fetch, rewrite for sandboxed display, and publish.
    #[default]
    Transform,
}

impl fmt::Display for PreviewMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Default => "default",
            Self::RawFetch => "fetch",
            Self::Transform => "transform",
        };
        f.write_str(name)
    }
}

/// A single request to display a document, issued by the user or by page
/// navigation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PreviewRequest {
    /// Identifier of the document in the search index.
    pub document_id: String,
    /// 1-based page the pagination control should select.
    pub page: u32,
    /// Processing mode.
    pub mode: PreviewMode,
}

impl PreviewRequest {
    /// Transform request for the first page of a document.
    pub fn new(document_id: impl Into<String>) -> Self {
        Self {
            document_id: document_id.into(),
            page: 1,
            mode: PreviewMode::Transform,
        }
    }

    /// Select the target page (clamped to at least 1).
    #[must_use]
    pub fn with_page(mut self, page: u32) -> Self {
        self.page = page.max(1);
        self
    }

    /// Select the processing mode.
    #[must_use]
    pub const fn with_mode(mut self, mode: PreviewMode) -> Self {
        self.mode = mode;
        self
    }
}

/// Active search query, scoping preview-data lookups.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueryContext {
    /// Name of the query definition on the search server.
    pub name: String,
    /// Full-text query entered by the user.
    pub text: String,
}

impl QueryContext {
    /// Build a query context from its name and text.
    pub fn new(name: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            text: text.into(),
        }
    }
}

/// Raw HTML retrieved for a preview, before any rewriting.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawPreview {
    /// Response body decoded as text.
    pub html: String,
    /// `Content-Type` reported by the server.
    pub content_type: String,
    /// Absolute URL the document was retrieved from.
    pub source_url: String,
}

/// HTML ready for display in a sandboxed, origin-less frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RewrittenDocument {
    /// Serialized document.
    pub html: String,
    /// Content type to declare on the published resource.
    pub content_type: String,
}

/// Where relative page-navigation targets are resolved from.
///
/// Derived from the last successfully rewritten document; replaced as a
/// whole, never merged.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BaseContext {
    /// Scheme, host and port of the source document, without trailing slash.
    pub origin_url: String,
    /// Directory prefix of the source document's path.
    pub base_path: String,
}

impl BaseContext {
    /// Derive the context for a document served from `source_url`.
    ///
    /// The base path is the part of the path preceding the converter's
    /// `file….htm` page name, or the path's directory when the URL does not
    /// follow that naming.
    pub fn from_source_url(source_url: &str) -> Result<Self> {
        let url = Url::parse(source_url)
            .map_err(|e| Error::InvalidUrl(format!("{source_url}: {e}")))?;

        let base_path = split_page_path(&url).map_or_else(
            || directory_of(url.path()).to_string(),
            |(prefix, _)| prefix,
        );

        Ok(Self {
            origin_url: origin_of(&url),
            base_path,
        })
    }

    /// Absolute URL of the base directory (`origin_url + base_path`).
    pub fn base_href(&self) -> String {
        format!("{}{}", self.origin_url, self.base_path)
    }

    /// Resolve a navigation target against this context.
    ///
    /// Targets must stay under the base directory: absolute URLs,
    /// scheme-relative (`//host`) and root-relative paths, and `..` segments
    /// climbing above `base_path` are rejected as
    /// [`Error::MalformedMessage`].
    pub fn resolve(&self, target: &str) -> Result<String> {
        let base = Url::parse(&self.base_href())
            .map_err(|e| Error::InvalidUrl(format!("{}: {e}", self.base_href())))?;

        let trimmed = target.trim();
        if trimmed.starts_with(['/', '\\']) || Url::parse(trimmed).is_ok() {
            return Err(Error::MalformedMessage(format!(
                "navigation target '{target}' is not relative to the base"
            )));
        }

        let resolved = base
            .join(trimmed)
            .map_err(|e| Error::InvalidUrl(format!("{target}: {e}")))?;
        if !resolved.as_str().starts_with(base.as_str()) {
            return Err(Error::MalformedMessage(format!(
                "navigation target '{target}' leaves {base}"
            )));
        }
        Ok(resolved.into())
    }
}

/// Split a URL's path (and query) into `(prefix, page_name)` when it names a
/// converter page such as `/cache/42/file_0003.htm`.
pub(crate) fn split_page_path(url: &Url) -> Option<(String, String)> {
    let mut path = url.path().to_string();
    if let Some(query) = url.query() {
        path.push('?');
        path.push_str(query);
    }

    PAGE_FILE_RE
        .captures(&path)
        .map(|caps| (caps[1].to_string(), caps[2].to_string()))
}

/// Serialized origin of a URL, usable as a string prefix for absolute paths.
pub(crate) fn origin_of(url: &Url) -> String {
    let origin = url.origin();
    if origin.is_tuple() {
        origin.ascii_serialization()
    } else {
        format!("{}://{}", url.scheme(), url.host_str().unwrap_or_default())
    }
}

fn directory_of(path: &str) -> &str {
    path.rfind('/').map_or("/", |idx| &path[..=idx])
}
