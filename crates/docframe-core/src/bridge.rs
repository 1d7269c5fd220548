//! Frame navigation bridge.
//!
//! The displayed document runs inside a sandboxed frame with no usable
//! origin, so it cannot navigate itself. Its page-select control posts a
//! [`PageNavigationMessage`] to the host instead; the bridge resolves that
//! message against the [`BaseContext`] of the last rewrite, fetches and
//! rewrites the target, and publishes the result as a fresh resource handle.
//!
//! The bridge is a single-consumer actor. Every interaction goes through its
//! mailbox, so preview cycles complete in the order they were requested and
//! no two rewrites ever race on the base context.
//!
//! ```rust,no_run
//! use docframe_core::{Bridge, Config, PreviewRequest};
//!
//! # async fn demo() -> docframe_core::Result<()> {
//! let config = Config::load()?;
//! let (bridge, handle) = Bridge::from_config(&config)?;
//! let task = bridge.spawn();
//!
//! let mut published = handle.published();
//! handle.open(PreviewRequest::new("doc-42")).await?;
//! published.changed().await.ok();
//! if let Some(doc) = published.borrow().as_ref() {
//!     println!("display {}", doc.url);
//! }
//!
//! handle.shutdown().await?;
//! task.await.ok();
//! # Ok(())
//! # }
//! ```

use crate::config::{BridgeConfig, Config};
use crate::fetcher::{Fetcher, PreviewFetcher};
use crate::handle::{BlobStore, HandleId, HandleSlot, ResourceHandle};
use crate::preview_data::{HttpPreviewDataService, PreviewDataService};
use crate::rewrite::Rewriter;
use crate::{BaseContext, Error, PreviewMode, PreviewRequest, QueryContext, Result};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::Arc;
use tokio::sync::{broadcast, mpsc, oneshot, watch};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

/// `type` tag of navigation messages posted by the page-select control.
pub const NAVIGATION_MESSAGE_TYPE: &str = "page-navigation";

const FAILURE_CAPACITY: usize = 16;

/// "Go to page" request posted from inside the displayed document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PageNavigationMessage {
    /// Target document, usually relative to the current base.
    pub url: String,
    /// 1-based page to select once the target is displayed.
    pub page: u32,
}

impl PageNavigationMessage {
    /// Create a navigation message.
    pub fn new(url: impl Into<String>, page: u32) -> Self {
        Self {
            url: url.into(),
            page,
        }
    }

    /// Validate a posted message payload.
    ///
    /// The payload must be an object with `type == "page-navigation"`, a
    /// non-empty string `url` and a positive integral `page`.
    pub fn parse(data: &Value) -> Result<Self> {
        let object = data
            .as_object()
            .ok_or_else(|| Error::MalformedMessage("payload is not an object".into()))?;

        match object.get("type").and_then(Value::as_str) {
            Some(NAVIGATION_MESSAGE_TYPE) => {},
            Some(other) => {
                return Err(Error::MalformedMessage(format!(
                    "unexpected message type '{other}'"
                )));
            },
            None => return Err(Error::MalformedMessage("missing message type".into())),
        }

        let url = object
            .get("url")
            .and_then(Value::as_str)
            .map(str::trim)
            .filter(|url| !url.is_empty())
            .ok_or_else(|| Error::MalformedMessage("missing navigation url".into()))?;

        let page = object
            .get("page")
            .and_then(Value::as_u64)
            .filter(|page| *page > 0)
            .and_then(|page| u32::try_from(page).ok())
            .ok_or_else(|| Error::MalformedMessage("page must be a positive integer".into()))?;

        Ok(Self::new(url, page))
    }

    /// Wire form, as posted by the control script.
    pub fn to_value(&self) -> Value {
        serde_json::json!({
            "type": NAVIGATION_MESSAGE_TYPE,
            "url": self.url,
            "page": self.page,
        })
    }
}

/// Message received from the displayed frame.
#[derive(Debug, Clone, PartialEq)]
pub struct FrameMessage {
    /// Origin reported for the sender; `None` when unknown.
    pub origin: Option<String>,
    /// Posted payload.
    pub data: Value,
}

impl FrameMessage {
    /// Message with an unknown origin.
    pub const fn new(data: Value) -> Self {
        Self { origin: None, data }
    }

    /// Attach the sender's origin.
    #[must_use]
    pub fn with_origin(mut self, origin: impl Into<String>) -> Self {
        self.origin = Some(origin.into());
        self
    }
}

/// Mailbox entries processed by the bridge, strictly in order.
#[derive(Debug)]
pub enum BridgeEvent {
    /// User-initiated preview.
    Open(PreviewRequest),
    /// Message posted by the displayed frame.
    Frame(FrameMessage),
    /// The frame finished loading a handle.
    FrameLoaded(HandleId),
    /// Replace the query context scoping preview-data lookups.
    SetQuery(QueryContext),
    /// Acknowledged once every earlier event has been processed.
    Sync(oneshot::Sender<()>),
    /// Revoke the live handle and stop.
    Shutdown,
}

/// Whether a preview cycle is in flight.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum BridgeState {
    /// Waiting for events.
    #[default]
    Idle,
    /// Fetching and rewriting a document.
    Resolving,
}

/// Content currently handed to the frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Published {
    /// URL the frame should display.
    pub url: String,
    /// Handle backing `url`, absent when the download URL is displayed directly.
    ///
    /// Cleared once the frame acknowledges loading the content; the handle is
    /// revoked at that point and `url` no longer resolves.
    pub handle: Option<ResourceHandle>,
    /// Where the content was retrieved from.
    pub source_url: String,
    /// Page the pagination control selects.
    pub page: u32,
    /// Mode the content was produced with.
    pub mode: PreviewMode,
}

/// A preview cycle that ended without publishing anything.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PreviewFailure {
    /// Document id or navigation URL the cycle was for.
    pub target: String,
    /// Requested page.
    pub page: u32,
    /// [`Error::category`] of the cause.
    pub category: &'static str,
    /// Human-readable cause.
    pub message: String,
}

/// Sender side of a running [`Bridge`].
#[derive(Debug, Clone)]
pub struct BridgeHandle {
    tx: mpsc::Sender<BridgeEvent>,
    state: watch::Receiver<BridgeState>,
    published: watch::Receiver<Option<Published>>,
    failures: broadcast::Sender<PreviewFailure>,
    store: BlobStore,
}

impl BridgeHandle {
    /// Queue a user-initiated preview.
    pub async fn open(&self, request: PreviewRequest) -> Result<()> {
        self.send(BridgeEvent::Open(request)).await
    }

    /// Deliver a message posted by the displayed frame.
    pub async fn post_message(&self, message: FrameMessage) -> Result<()> {
        self.send(BridgeEvent::Frame(message)).await
    }

    /// Report that the frame finished loading `id`.
    pub async fn frame_loaded(&self, id: HandleId) -> Result<()> {
        self.send(BridgeEvent::FrameLoaded(id)).await
    }

    /// Replace the query context for subsequent previews.
    pub async fn set_query(&self, query: QueryContext) -> Result<()> {
        self.send(BridgeEvent::SetQuery(query)).await
    }

    /// Wait until every event queued so far has been processed.
    pub async fn settle(&self) -> Result<()> {
        let (tx, rx) = oneshot::channel();
        self.send(BridgeEvent::Sync(tx)).await?;
        rx.await.map_err(|_| Error::SessionClosed)
    }

    /// Ask the bridge to revoke its live handle and stop.
    pub async fn shutdown(&self) -> Result<()> {
        self.send(BridgeEvent::Shutdown).await
    }

    /// Observe the cycle state.
    pub fn state(&self) -> watch::Receiver<BridgeState> {
        self.state.clone()
    }

    /// Observe published content.
    pub fn published(&self) -> watch::Receiver<Option<Published>> {
        self.published.clone()
    }

    /// Receive failures from now on.
    pub fn failures(&self) -> broadcast::Receiver<PreviewFailure> {
        self.failures.subscribe()
    }

    /// Store holding published content.
    pub const fn store(&self) -> &BlobStore {
        &self.store
    }

    async fn send(&self, event: BridgeEvent) -> Result<()> {
        self.tx.send(event).await.map_err(|_| Error::SessionClosed)
    }
}

/// Preview session actor owning the fetcher, the rewriter, the base context
/// and the live resource handle.
pub struct Bridge {
    fetcher: PreviewFetcher,
    rewriter: Rewriter,
    context: Option<BaseContext>,
    slot: HandleSlot,
    allowed_origins: Vec<String>,
    mailbox: mpsc::Receiver<BridgeEvent>,
    state_tx: watch::Sender<BridgeState>,
    published_tx: watch::Sender<Option<Published>>,
    failures_tx: broadcast::Sender<PreviewFailure>,
}

impl Bridge {
    /// Assemble a bridge from its collaborators, returning it with the
    /// handle used to drive it.
    pub fn new(
        fetcher: PreviewFetcher,
        rewriter: Rewriter,
        config: &BridgeConfig,
    ) -> (Self, BridgeHandle) {
        let (tx, mailbox) = mpsc::channel(config.mailbox_capacity.max(1));
        let (state_tx, state) = watch::channel(BridgeState::Idle);
        let (published_tx, published) = watch::channel(None);
        let (failures_tx, _) = broadcast::channel(FAILURE_CAPACITY);
        let store = BlobStore::new();

        let handle = BridgeHandle {
            tx,
            state,
            published,
            failures: failures_tx.clone(),
            store: store.clone(),
        };

        let bridge = Self {
            fetcher,
            rewriter,
            context: None,
            slot: HandleSlot::new(store),
            allowed_origins: config.allowed_origins.clone(),
            mailbox,
            state_tx,
            published_tx,
            failures_tx,
        };

        (bridge, handle)
    }

    /// Build a bridge talking to the configured preview service.
    pub fn from_config(config: &Config) -> Result<(Self, BridgeHandle)> {
        let service: Arc<dyn PreviewDataService> =
            Arc::new(HttpPreviewDataService::new(&config.service, &config.fetch)?);
        let fetcher = PreviewFetcher::new(service, Fetcher::with_config(&config.fetch)?);
        Ok(Self::new(
            fetcher,
            Rewriter::new(config.rewrite.clone()),
            &config.bridge,
        ))
    }

    /// Run the actor on the current tokio runtime.
    pub fn spawn(self) -> JoinHandle<()> {
        tokio::spawn(self.run())
    }

    /// Process mailbox events until shutdown or until every handle is dropped.
    pub async fn run(mut self) {
        while let Some(event) = self.mailbox.recv().await {
            match event {
                BridgeEvent::Open(request) => self.open(request).await,
                BridgeEvent::Frame(message) => self.on_frame_message(message).await,
                BridgeEvent::FrameLoaded(id) => self.on_frame_loaded(id),
                BridgeEvent::SetQuery(query) => self.fetcher.set_query(query),
                BridgeEvent::Sync(ack) => {
                    let _ = ack.send(());
                },
                BridgeEvent::Shutdown => break,
            }
        }

        self.slot.clear();
        self.published_tx.send_replace(None);
        info!("preview session closed");
    }

    async fn open(&mut self, request: PreviewRequest) {
        info!(document_id = %request.document_id, page = request.page, mode = %request.mode, "opening preview");
        self.set_state(BridgeState::Resolving);

        let result = self.produce(&request).await;
        match result {
            Ok(published) => self.publish(published),
            Err(err) => self.fail(&request.document_id, request.page, &err),
        }

        self.set_state(BridgeState::Idle);
    }

    async fn produce(&mut self, request: &PreviewRequest) -> Result<Published> {
        match request.mode {
            PreviewMode::Default => {
                let url = self
                    .fetcher
                    .resolve_download_url(&request.document_id)
                    .await?;
                Ok(Published {
                    source_url: url.clone(),
                    url,
                    handle: None,
                    page: request.page,
                    mode: request.mode,
                })
            },
            PreviewMode::RawFetch => {
                let url = self
                    .fetcher
                    .resolve_download_url(&request.document_id)
                    .await?;
                let (bytes, content_type) = self.fetcher.fetcher().fetch_bytes(&url).await?;
                let handle = self.slot.store().create(bytes, content_type);
                Ok(Published {
                    url: handle.url.clone(),
                    handle: Some(handle),
                    source_url: url,
                    page: request.page,
                    mode: request.mode,
                })
            },
            PreviewMode::Transform => {
                let raw = self
                    .fetcher
                    .fetch_preview(&request.document_id, request.page)
                    .await?;
                Ok(self.transform(&raw.html, raw.source_url, request.page))
            },
        }
    }

    async fn on_frame_message(&mut self, message: FrameMessage) {
        if !self.origin_allowed(message.origin.as_deref()) {
            debug!(origin = ?message.origin, "ignoring message from disallowed origin");
            return;
        }

        let navigation = match PageNavigationMessage::parse(&message.data) {
            Ok(navigation) => navigation,
            Err(err) => {
                debug!(error = %err, "ignoring frame message");
                return;
            },
        };

        let Some(context) = &self.context else {
            warn!(url = %navigation.url, "navigation before any document was rewritten");
            return;
        };

        let target = match context.resolve(&navigation.url) {
            Ok(target) => target,
            Err(err @ Error::MalformedMessage(_)) => {
                warn!(url = %navigation.url, error = %err, "dropping navigation outside the base");
                return;
            },
            Err(err) => {
                self.fail(&navigation.url, navigation.page, &err);
                return;
            },
        };

        info!(url = %target, page = navigation.page, "page navigation");
        self.set_state(BridgeState::Resolving);

        match self.fetcher.fetcher().fetch_html(&target).await {
            Ok(raw) => {
                let published = self.transform(&raw.html, raw.source_url, navigation.page);
                self.publish(published);
            },
            Err(err) => self.fail(&target, navigation.page, &err),
        }

        self.set_state(BridgeState::Idle);
    }

    fn on_frame_loaded(&mut self, id: HandleId) {
        if !self.slot.mark_loaded(id) {
            return;
        }
        self.published_tx.send_if_modified(|published| match published {
            Some(current) if current.handle.as_ref().is_some_and(|h| h.id == id) => {
                current.handle = None;
                true
            },
            _ => false,
        });
    }

    fn transform(&mut self, html: &str, source_url: String, page: u32) -> Published {
        let document = self
            .rewriter
            .rewrite(html, &source_url, page, &mut self.context);
        let handle = self
            .slot
            .store()
            .create(document.html.into_bytes(), document.content_type);

        Published {
            url: handle.url.clone(),
            handle: Some(handle),
            source_url,
            page,
            mode: PreviewMode::Transform,
        }
    }

    fn publish(&mut self, published: Published) {
        match &published.handle {
            Some(handle) => self.slot.publish(handle),
            None => self.slot.clear(),
        }
        debug!(url = %published.url, source = %published.source_url, "published");
        self.published_tx.send_replace(Some(published));
    }

    fn fail(&self, target: &str, page: u32, err: &Error) {
        if err.is_recoverable() {
            warn!(subject = target, page, error = %err, "preview failed");
        } else {
            error!(subject = target, page, error = %err, "preview failed");
        }

        // No subscribers is fine; the failure is logged either way.
        let _ = self.failures_tx.send(PreviewFailure {
            target: target.to_string(),
            page,
            category: err.category(),
            message: err.to_string(),
        });
    }

    fn set_state(&self, state: BridgeState) {
        self.state_tx.send_replace(state);
    }

    fn origin_allowed(&self, origin: Option<&str>) -> bool {
        if self.allowed_origins.is_empty() {
            return true;
        }
        origin.is_some_and(|origin| self.allowed_origins.iter().any(|allowed| allowed == origin))
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::panic)]
mod tests {
    use super::*;
    use crate::RewriteConfig;
    use crate::preview_data::PreviewData;
    use async_trait::async_trait;
    use proptest::prelude::*;
    use serde_json::json;

    struct UnreachableService;

    #[async_trait]
    impl PreviewDataService for UnreachableService {
        async fn get_preview_data(
            &self,
            document_id: &str,
            _query: &QueryContext,
        ) -> Result<PreviewData> {
            Err(Error::PreviewData(format!("no preview for '{document_id}'")))
        }

        fn make_download_url(&self, _cached_content_url: &str) -> Option<String> {
            None
        }
    }

    fn offline_bridge(config: &BridgeConfig) -> (Bridge, BridgeHandle) {
        let fetcher = PreviewFetcher::new(Arc::new(UnreachableService), Fetcher::new().unwrap());
        Bridge::new(fetcher, Rewriter::new(RewriteConfig::default()), config)
    }

    #[test]
    fn test_parse_valid_message() {
        let message = PageNavigationMessage::parse(&json!({
            "type": "page-navigation",
            "url": "file_0005.htm",
            "page": 5
        }))
        .unwrap();
        assert_eq!(message, PageNavigationMessage::new("file_0005.htm", 5));
        assert_eq!(PageNavigationMessage::parse(&message.to_value()).unwrap(), message);
    }

    #[test]
    fn test_parse_rejects_wrong_shapes() {
        let cases = [
            json!({"foo": "bar"}),
            json!("page-navigation"),
            json!({"type": "resize", "url": "a.htm", "page": 1}),
            json!({"type": "page-navigation", "page": 1}),
            json!({"type": "page-navigation", "url": "", "page": 1}),
            json!({"type": "page-navigation", "url": "a.htm", "page": 0}),
            json!({"type": "page-navigation", "url": "a.htm", "page": -3}),
            json!({"type": "page-navigation", "url": "a.htm", "page": 1.5}),
            json!({"type": "page-navigation", "url": "a.htm", "page": "2"}),
            json!({"type": "page-navigation", "url": "a.htm", "page": 5_000_000_000_u64}),
        ];
        for case in cases {
            assert!(
                matches!(
                    PageNavigationMessage::parse(&case),
                    Err(Error::MalformedMessage(_))
                ),
                "accepted {case}"
            );
        }
    }

    proptest! {
        #[test]
        fn prop_other_message_types_rejected(kind in "[a-z-]{0,24}", url in ".*", page in any::<u32>()) {
            prop_assume!(kind != NAVIGATION_MESSAGE_TYPE);
            let data = json!({"type": kind, "url": url, "page": page});
            prop_assert!(PageNavigationMessage::parse(&data).is_err());
        }

        #[test]
        fn prop_well_formed_messages_accepted(url in "[a-zA-Z0-9_./#-]{1,40}", page in 1..=u32::MAX) {
            let message = PageNavigationMessage::new(url.clone(), page);
            let parsed = PageNavigationMessage::parse(&message.to_value()).unwrap();
            prop_assert_eq!(parsed.url, url);
            prop_assert_eq!(parsed.page, page);
        }
    }

    #[test]
    fn test_origin_allow_list() {
        let (open, _handle) = offline_bridge(&BridgeConfig::default());
        assert!(open.origin_allowed(None));
        assert!(open.origin_allowed(Some("null")));

        let (restricted, _handle) = offline_bridge(&BridgeConfig {
            allowed_origins: vec!["null".into()],
            ..BridgeConfig::default()
        });
        assert!(restricted.origin_allowed(Some("null")));
        assert!(!restricted.origin_allowed(Some("https://evil.example")));
        assert!(!restricted.origin_allowed(None));
    }

    #[tokio::test]
    async fn test_navigation_without_context_is_dropped() -> anyhow::Result<()> {
        let (bridge, handle) = offline_bridge(&BridgeConfig::default());
        let task = bridge.spawn();
        let mut failures = handle.failures();

        handle
            .post_message(FrameMessage::new(
                PageNavigationMessage::new("p2.htm", 2).to_value(),
            ))
            .await?;
        handle.settle().await?;

        assert!(handle.published().borrow().is_none());
        assert_eq!(*handle.state().borrow(), BridgeState::Idle);
        assert!(failures.try_recv().is_err());

        handle.shutdown().await?;
        task.await?;
        Ok(())
    }

    #[tokio::test]
    async fn test_open_failure_is_broadcast() -> anyhow::Result<()> {
        let (bridge, handle) = offline_bridge(&BridgeConfig::default());
        let task = bridge.spawn();
        let mut failures = handle.failures();

        handle.open(PreviewRequest::new("doc-9").with_page(3)).await?;
        handle.settle().await?;

        let failure = failures.try_recv()?;
        assert_eq!(failure.target, "doc-9");
        assert_eq!(failure.page, 3);
        assert_eq!(failure.category, "fetch");
        assert!(handle.published().borrow().is_none());

        handle.shutdown().await?;
        task.await?;
        Ok(())
    }

    #[tokio::test]
    async fn test_events_after_shutdown_fail() -> anyhow::Result<()> {
        let (bridge, handle) = offline_bridge(&BridgeConfig::default());
        let task = bridge.spawn();
        handle.shutdown().await?;
        task.await?;

        assert!(matches!(
            handle.open(PreviewRequest::new("doc-1")).await,
            Err(Error::SessionClosed)
        ));
        Ok(())
    }
}
