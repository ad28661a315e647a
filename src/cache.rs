//! In-memory thumbnail cache.
//!
//! A lookup miss inserts a pending [`ImageHandle`] before any network work
//! starts, so every caller asking for the same key while the fetch is in
//! flight shares that one handle. The fill task later moves the handle to
//! `Ready` or `Missing` in place and announces the key on the refresh channel.

use image::DynamicImage;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{mpsc, watch};
use tracing::{debug, warn};

use crate::mirror::FailoverClient;
use crate::thumbnail::{Quality, resolve_thumbnail_url};

// --- Image handle ---

#[derive(Debug, Clone)]
pub enum ImageState {
  /// Fetch in flight.
  Pending,
  Ready(Arc<DynamicImage>),
  /// Nothing to show; the fetch failed or was never attempted.
  Missing,
}

/// Shared, fill-in-place thumbnail slot.
#[derive(Clone)]
pub struct ImageHandle {
  key: Arc<str>,
  state: Arc<watch::Sender<ImageState>>,
}

impl std::fmt::Debug for ImageHandle {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    f.debug_struct("ImageHandle").field("key", &self.key).field("state", &*self.state.borrow()).finish()
  }
}

impl ImageHandle {
  fn new(key: &str, state: ImageState) -> Self {
    let (tx, _) = watch::channel(state);
    Self { key: Arc::from(key), state: Arc::new(tx) }
  }

  pub fn key(&self) -> &str {
    &self.key
  }

  pub fn state(&self) -> ImageState {
    self.state.borrow().clone()
  }

  fn set(&self, state: ImageState) {
    self.state.send_replace(state);
  }
}

#[cfg(test)]
impl ImageHandle {
  pub(crate) fn image(&self) -> Option<Arc<DynamicImage>> {
    match &*self.state.borrow() {
      ImageState::Ready(image) => Some(image.clone()),
      _ => None,
    }
  }

  pub(crate) fn is_pending(&self) -> bool {
    matches!(*self.state.borrow(), ImageState::Pending)
  }

  /// Whether both handles are the same cache slot.
  pub(crate) fn same_slot(&self, other: &ImageHandle) -> bool {
    Arc::ptr_eq(&self.state, &other.state)
  }

  pub(crate) fn subscribe(&self) -> watch::Receiver<ImageState> {
    self.state.subscribe()
  }

  /// Wait until the handle leaves `Pending` and return the final state.
  pub(crate) async fn settled(&self) -> ImageState {
    let mut rx = self.subscribe();
    match rx.wait_for(|s| !matches!(s, ImageState::Pending)).await {
      Ok(state) => state.clone(),
      Err(_) => ImageState::Missing,
    }
  }
}

// --- Cache ---

struct Inner {
  client: FailoverClient,
  quality: Quality,
  online: bool,
  entries: Mutex<HashMap<String, ImageHandle>>,
  refresh_tx: Option<mpsc::UnboundedSender<String>>,
}

#[derive(Clone)]
pub struct ThumbnailCache {
  inner: Arc<Inner>,
}

impl ThumbnailCache {
  pub fn new(client: FailoverClient, quality: Quality, refresh_tx: Option<mpsc::UnboundedSender<String>>) -> Self {
    Self { inner: Arc::new(Inner { client, quality, online: true, entries: Mutex::new(HashMap::new()), refresh_tx }) }
  }

  /// A cache that never touches the network: every key memoizes to a
  /// `Missing` handle. Used when output is plain text.
  pub fn offline(client: FailoverClient, quality: Quality) -> Self {
    Self {
      inner: Arc::new(Inner {
        client,
        quality,
        online: false,
        entries: Mutex::new(HashMap::new()),
        refresh_tx: None,
      }),
    }
  }

  /// Return the handle for `id_or_url`, starting a background fill on a miss.
  ///
  /// Must be called from within a tokio runtime when the cache is online.
  pub fn get_image(&self, id_or_url: &str) -> ImageHandle {
    let handle = {
      let mut entries = self.inner.entries.lock();
      if let Some(handle) = entries.get(id_or_url) {
        return handle.clone();
      }
      let initial = if self.inner.online { ImageState::Pending } else { ImageState::Missing };
      let handle = ImageHandle::new(id_or_url, initial);
      entries.insert(id_or_url.to_string(), handle.clone());
      handle
    };

    if self.inner.online {
      let inner = self.inner.clone();
      let fill = handle.clone();
      tokio::spawn(async move { inner.fill(fill).await });
    }
    handle
  }

  /// Drop every entry. Handles already given out keep their state.
  pub fn clear(&self) {
    let dropped = {
      let mut entries = self.inner.entries.lock();
      let n = entries.len();
      entries.clear();
      n
    };
    debug!(dropped, "cache: cleared");
  }
}

#[cfg(test)]
impl ThumbnailCache {
  pub(crate) fn quality(&self) -> Quality {
    self.inner.quality
  }

  pub(crate) fn len(&self) -> usize {
    self.inner.entries.lock().len()
  }
}

impl Inner {
  async fn fill(&self, handle: ImageHandle) {
    let key = handle.key().to_string();
    let state = match self.fetch(&key).await {
      Ok(image) => ImageState::Ready(Arc::new(image)),
      Err(reason) => {
        warn!(key = %key, reason = %reason, "cache: thumbnail unavailable");
        ImageState::Missing
      }
    };
    handle.set(state);
    if let Some(tx) = &self.refresh_tx {
      let _ = tx.send(key);
    }
  }

  async fn fetch(&self, key: &str) -> Result<DynamicImage, String> {
    let url = resolve_thumbnail_url(&self.client, key, self.quality)
      .await
      .ok_or_else(|| format!("no {} thumbnail", self.quality.label()))?;
    let bytes = self.client.transport().bytes(&url).await.map_err(|e| format!("fetching {}: {}", url, e))?;
    image::load_from_memory(&bytes).map_err(|e| format!("decoding {}: {}", url, e))
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::mirror::testing::{Reply, ScriptedTransport, client_for, png_bytes};
  use serde_json::json;
  use std::time::Duration;

  fn metadata(thumb_url: &str) -> Reply {
    Reply::Json(json!({ "videoThumbnails": [{ "quality": "default", "url": thumb_url, "width": 4, "height": 3 }] }))
  }

  #[tokio::test]
  async fn concurrent_lookups_share_one_placeholder() {
    let transport = ScriptedTransport::new();
    transport.on("https://m/api/v1/videos/a", metadata("https://img/a.png"));
    transport.on("https://img/a.png", Reply::Delayed(Duration::from_millis(30), Box::new(Reply::Bytes(png_bytes()))));
    let cache = ThumbnailCache::new(client_for(&transport, &["m"]), Quality::Default, None);

    let first = cache.get_image("a");
    let second = cache.get_image("a");
    assert!(first.same_slot(&second));
    assert!(second.is_pending());

    assert!(matches!(first.settled().await, ImageState::Ready(_)));
    assert_eq!(transport.calls_to("https://img/a.png"), 1);
    assert_eq!(transport.calls_to("https://m/api/v1/videos/a"), 1);
    assert_eq!(second.image().map(|i| i.width()), Some(4));
    assert_eq!(cache.len(), 1);
  }

  #[tokio::test]
  async fn clear_forces_a_fresh_fetch() {
    let transport = ScriptedTransport::new();
    transport.on("https://img/x.png", Reply::Bytes(png_bytes()));
    let cache = ThumbnailCache::new(client_for(&transport, &["m"]), Quality::Default, None);

    let before = cache.get_image("https://img/x.png");
    before.settled().await;
    cache.clear();
    assert_eq!(cache.len(), 0);

    let after = cache.get_image("https://img/x.png");
    assert!(!after.same_slot(&before));
    after.settled().await;
    assert_eq!(transport.calls_to("https://img/x.png"), 2);
  }

  #[tokio::test]
  async fn failed_fetch_leaves_handle_empty() {
    let transport = ScriptedTransport::new();
    transport.on("https://m/api/v1/videos/a", metadata("https://img/broken.png"));
    transport.on("https://img/broken.png", Reply::Bytes(b"not an image".to_vec()));
    let cache = ThumbnailCache::new(client_for(&transport, &["m"]), Quality::Default, None);

    let handle = cache.get_image("a");
    assert!(matches!(handle.settled().await, ImageState::Missing));
    // Not evicted, not retried.
    assert!(cache.get_image("a").same_slot(&handle));
    assert_eq!(transport.calls_to("https://img/broken.png"), 1);
  }

  #[tokio::test]
  async fn absent_tier_still_yields_a_handle() {
    let transport = ScriptedTransport::new();
    transport.on(
      "https://m/api/v1/videos/a",
      Reply::Json(json!({ "videoThumbnails": [{ "quality": "high", "url": "https://img/h.png" }] })),
    );
    let cache = ThumbnailCache::new(client_for(&transport, &["m"]), Quality::Default, None);

    let handle = cache.get_image("a");
    assert_eq!(handle.key(), "a");
    assert!(matches!(handle.settled().await, ImageState::Missing));
    assert_eq!(transport.calls_to("https://img/h.png"), 0);
  }

  #[tokio::test]
  async fn ready_keys_are_announced() {
    let transport = ScriptedTransport::new();
    transport.on("https://img/x.png", Reply::Bytes(png_bytes()));
    let (tx, mut rx) = mpsc::unbounded_channel();
    let cache = ThumbnailCache::new(client_for(&transport, &["m"]), Quality::Default, Some(tx));

    cache.get_image("https://img/x.png");
    assert_eq!(rx.recv().await.as_deref(), Some("https://img/x.png"));
  }

  #[tokio::test]
  async fn offline_cache_never_fetches() {
    let transport = ScriptedTransport::new();
    let cache = ThumbnailCache::offline(client_for(&transport, &["m"]), Quality::Default);

    let handle = cache.get_image("a");
    assert!(matches!(handle.state(), ImageState::Missing));
    assert!(cache.get_image("a").same_slot(&handle));
    tokio::task::yield_now().await;
    assert!(transport.calls().is_empty());
  }
}
