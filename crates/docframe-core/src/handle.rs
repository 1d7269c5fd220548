//! Revocable in-memory resource handles.
//!
//! A rewritten document is never written anywhere; it is registered in a
//! [`BlobStore`] and displayed through the `blob:` URL of the returned
//! [`ResourceHandle`]. Each handle is revoked exactly once, after which its
//! URL no longer resolves.

use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use tracing::{debug, trace};

/// URL scheme prefix used for handles.
pub const BLOB_URL_PREFIX: &str = "blob:docframe/";

/// Identifier of a handle within its store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct HandleId(u64);

impl HandleId {
    /// Raw numeric identifier.
    pub const fn get(self) -> u64 {
        self.0
    }
}

impl fmt::Display for HandleId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Reference to bytes held by a [`BlobStore`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResourceHandle {
    /// Store-local identifier.
    pub id: HandleId,
    /// `blob:` URL under which the content is displayed.
    pub url: String,
}

/// Content registered behind a handle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Blob {
    /// Raw bytes.
    pub bytes: Arc<[u8]>,
    /// Declared content type.
    pub content_type: String,
}

#[derive(Debug, Default)]
struct StoreInner {
    blobs: HashMap<HandleId, Blob>,
}

/// Thread-safe registry of live blobs.
///
/// Cloning shares the same registry.
#[derive(Debug, Clone, Default)]
pub struct BlobStore {
    inner: Arc<Mutex<StoreInner>>,
    next_id: Arc<AtomicU64>,
}

impl BlobStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `bytes` and return a handle to them.
    pub fn create(
        &self,
        bytes: impl Into<Arc<[u8]>>,
        content_type: impl Into<String>,
    ) -> ResourceHandle {
        let id = HandleId(self.next_id.fetch_add(1, Ordering::Relaxed) + 1);
        let blob = Blob {
            bytes: bytes.into(),
            content_type: content_type.into(),
        };
        trace!(%id, len = blob.bytes.len(), "blob created");

        self.inner
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .blobs
            .insert(id, blob);

        ResourceHandle {
            id,
            url: format!("{BLOB_URL_PREFIX}{id}"),
        }
    }

    /// Content behind a live handle URL.
    pub fn resolve(&self, url: &str) -> Option<Blob> {
        let id = url
            .strip_prefix(BLOB_URL_PREFIX)
            .and_then(|raw| raw.parse().ok())
            .map(HandleId)?;
        self.get(id)
    }

    /// Content behind a live handle.
    pub fn get(&self, id: HandleId) -> Option<Blob> {
        self.inner
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .blobs
            .get(&id)
            .cloned()
    }

    /// Release a handle. Returns `false` when it was already revoked.
    pub fn revoke(&self, id: HandleId) -> bool {
        let removed = self
            .inner
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .blobs
            .remove(&id)
            .is_some();
        if removed {
            debug!(%id, "blob revoked");
        }
        removed
    }

    /// Number of handles not yet revoked.
    pub fn live_count(&self) -> usize {
        self.inner
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .blobs
            .len()
    }
}

/// Holds the single handle currently on display.
///
/// Publishing a new handle revokes the previous one first, so at most one
/// handle from this slot is live at any time.
#[derive(Debug)]
pub struct HandleSlot {
    store: BlobStore,
    current: Option<HandleId>,
}

impl HandleSlot {
    /// Empty slot backed by `store`.
    pub const fn new(store: BlobStore) -> Self {
        Self {
            store,
            current: None,
        }
    }

    /// Store the slot revokes from.
    pub const fn store(&self) -> &BlobStore {
        &self.store
    }

    /// Handle currently held, if any.
    pub const fn current(&self) -> Option<HandleId> {
        self.current
    }

    /// Revoke the held handle (if any) and hold `handle` instead.
    pub fn publish(&mut self, handle: &ResourceHandle) {
        self.release();
        self.current = Some(handle.id);
    }

    /// Revoke the held handle and clear the slot without holding a new one.
    pub fn clear(&mut self) {
        self.release();
    }

    /// The frame finished loading `id`; its bytes are no longer needed.
    ///
    /// Acknowledgements for handles the slot no longer holds are ignored.
    pub fn mark_loaded(&mut self, id: HandleId) -> bool {
        if self.current != Some(id) {
            trace!(%id, "stale load acknowledgement");
            return false;
        }
        self.current = None;
        self.store.revoke(id)
    }

    fn release(&mut self) {
        if let Some(previous) = self.current.take() {
            self.store.revoke(previous);
        }
    }
}

impl Drop for HandleSlot {
    fn drop(&mut self) {
        self.release();
    }
}
