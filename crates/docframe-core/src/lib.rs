//! # docframe-core
//!
//! Preview pipeline for cached HTML renditions of search-index documents,
//! displayed inside a sandboxed, origin-less frame.
//!
//! The crate is organized around three cooperating components:
//!
//! - **Preview Fetcher**: maps a document id to the download URL of its
//!   cached rendition through a [`PreviewDataService`] and retrieves it
//! - **HTML Rewriter**: makes every reference absolute, swaps SVG embeds,
//!   and replaces the converter's page-select script with one that talks to
//!   the host
//! - **Frame Navigation Bridge**: turns `page-navigation` messages from the
//!   frame into new fetch/rewrite cycles and publishes the results as
//!   revocable resource handles
//!
//! ## Quick Start
//!
//! ```rust
//! use docframe_core::{Config, Rewriter};
//!
//! let config = Config::default();
//! let rewriter = Rewriter::new(config.rewrite);
//!
//! let mut context = None;
//! let doc = rewriter.rewrite(
//!     r#"<html><head></head><body><img src="p1.png"></body></html>"#,
//!     "https://search.example.com/cache/1/file.htm",
//!     1,
//!     &mut context,
//! );
//!
//! assert!(doc.html.contains(r#"src="https://search.example.com/cache/1/p1.png""#));
//! assert!(doc.html.contains(r#"<base href="https://search.example.com/cache/1/">"#));
//! ```
//!
//! ## Error Handling
//!
//! Fetch and protocol operations return [`Result<T, Error>`]; rewriting never
//! fails and reports skipped steps through [`RewriteReport`] instead.

/// Frame navigation bridge and its message protocol
pub mod bridge;
/// Configuration loading and defaults
pub mod config;
/// Error types and result aliases
pub mod error;
/// HTTP retrieval of cached renditions
pub mod fetcher;
/// Revocable in-memory resource handles
pub mod handle;
/// Preview-data collaborator
pub mod preview_data;
/// HTML rewriting pipeline
pub mod rewrite;
/// Core data types and structures
pub mod types;

// Re-export commonly used types
pub use bridge::{
    Bridge, BridgeEvent, BridgeHandle, BridgeState, FrameMessage, NAVIGATION_MESSAGE_TYPE,
    PageNavigationMessage, PreviewFailure, Published,
};
pub use config::{BridgeConfig, Config, EmbedPolicy, FetchConfig, RewriteConfig, ServiceConfig};
pub use error::{Error, Result};
pub use fetcher::{Fetcher, PreviewFetcher};
pub use handle::{Blob, BlobStore, HandleId, HandleSlot, ResourceHandle};
pub use preview_data::{HttpPreviewDataService, PreviewData, PreviewDataService};
pub use rewrite::{RewriteReport, RewriteStep, Rewriter};
pub use types::*;
