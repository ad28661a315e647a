//! Result rendering.
//!
//! A render pass clears its surface, then walks the records strictly in
//! input order: each video's thumbnail handle is obtained from the cache and
//! the entry appended before the next record is looked at. Thumbnail bytes
//! arrive later and fill the handles in place, so late images never reorder
//! the listing.

use chrono::DateTime;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::cache::{ImageHandle, ThumbnailCache};
use crate::constants::constants;
use crate::invidious::{Channel, SearchItem, Video};

// --- Entries ---

/// Something the user can trigger on an entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Action {
  Watch { url: String },
  OpenChannel { author_id: String },
  CopyUrl { url: String },
  Describe { video_id: String },
}

impl Action {
  pub fn label(&self) -> &'static str {
    match self {
      Action::Watch { .. } => "watch",
      Action::OpenChannel { .. } => "open channel",
      Action::CopyUrl { .. } => "copy url",
      Action::Describe { .. } => "description",
    }
  }
}

#[derive(Debug, Clone)]
pub struct VideoEntry {
  pub title: String,
  pub author: String,
  pub author_id: String,
  pub view_count_text: Option<String>,
  pub image: ImageHandle,
  pub actions: Vec<Action>,
  /// Output of the extra-fields hook, in hook order.
  pub extra: Vec<String>,
}

#[derive(Debug, Clone)]
pub struct ChannelEntry {
  pub author_id: String,
  pub author: String,
  pub subscribers: Option<u64>,
  pub actions: Vec<Action>,
}

#[derive(Debug, Clone)]
pub enum Entry {
  Video(VideoEntry),
  Channel(ChannelEntry),
}

impl Entry {
  pub fn title(&self) -> &str {
    match self {
      Entry::Video(v) => &v.title,
      Entry::Channel(c) => &c.author,
    }
  }

  pub fn actions(&self) -> &[Action] {
    match self {
      Entry::Video(v) => &v.actions,
      Entry::Channel(c) => &c.actions,
    }
  }

  /// The action bound to Enter: watch a video, open a channel.
  pub fn primary_action(&self) -> Option<&Action> {
    self.actions().first()
  }

  pub fn find_action(&self, pred: impl Fn(&Action) -> bool) -> Option<&Action> {
    self.actions().iter().find(|a| pred(a))
  }

  /// Second line of the entry: author/views/extras for videos, subscriber
  /// count for channels.
  pub fn subtitle(&self) -> String {
    match self {
      Entry::Video(v) => {
        let mut parts = vec![v.author.clone()];
        parts.extend(v.view_count_text.clone());
        parts.extend(v.extra.iter().cloned());
        parts.join(" · ")
      }
      Entry::Channel(c) => match c.subscribers {
        Some(n) => format!("{} subscribers", format_count(n)),
        None => String::new(),
      },
    }
  }

  /// Plain-text rendition used by the command line printer.
  pub fn text_lines(&self) -> Vec<String> {
    let link = self
      .find_action(|a| matches!(a, Action::CopyUrl { .. }))
      .and_then(|a| match a {
        Action::CopyUrl { url } => Some(url.clone()),
        _ => None,
      })
      .unwrap_or_default();
    let marker = match self {
      Entry::Video(_) => "▶",
      Entry::Channel(_) => "◉",
    };
    let mut lines = vec![format!("{} {}", marker, self.title())];
    let subtitle = self.subtitle();
    if !subtitle.is_empty() {
      lines.push(format!("  {}", subtitle));
    }
    lines.push(format!("  {}", link));
    lines
  }
}

// --- Surfaces ---

/// Where a render pass puts its entries.
pub trait Surface {
  fn clear(&mut self);
  fn append(&mut self, entry: Entry);
  /// Called once after the last entry; resets the read position to the top.
  fn present(&mut self);
}

/// Surface that keeps entries in memory.
#[derive(Debug, Default)]
pub struct BufferSurface {
  pub name: String,
  pub entries: Vec<Entry>,
  pub scroll: usize,
  pub presented: bool,
}

impl BufferSurface {
  pub fn named(name: &str) -> Self {
    Self { name: name.to_string(), ..Self::default() }
  }

  pub fn to_text(&self) -> String {
    let mut out = format!("== {} ({} entries) ==\n", self.name, self.entries.len());
    for entry in &self.entries {
      for line in entry.text_lines() {
        out.push_str(&line);
        out.push('\n');
      }
      out.push('\n');
    }
    out
  }
}

impl Surface for BufferSurface {
  fn clear(&mut self) {
    self.entries.clear();
    self.scroll = 0;
    self.presented = false;
  }

  fn append(&mut self, entry: Entry) {
    self.entries.push(entry);
  }

  fn present(&mut self) {
    self.scroll = 0;
    self.presented = true;
  }
}

pub enum SurfaceEvent {
  Cleared,
  Appended(Entry),
  Presented,
  /// The records could not be fetched at all.
  Failed(String),
}

/// Surface that forwards every operation to the UI loop. If the receiving
/// side is gone the events are dropped.
pub struct StreamSurface {
  tx: mpsc::UnboundedSender<SurfaceEvent>,
}

impl StreamSurface {
  pub fn new(tx: mpsc::UnboundedSender<SurfaceEvent>) -> Self {
    Self { tx }
  }

  pub fn fail(&mut self, message: String) {
    let _ = self.tx.send(SurfaceEvent::Failed(message));
  }
}

impl Surface for StreamSurface {
  fn clear(&mut self) {
    let _ = self.tx.send(SurfaceEvent::Cleared);
  }

  fn append(&mut self, entry: Entry) {
    let _ = self.tx.send(SurfaceEvent::Appended(entry));
  }

  fn present(&mut self) {
    let _ = self.tx.send(SurfaceEvent::Presented);
  }
}

// --- Extra fields ---

/// Per-video hook producing additional text fields for an entry.
pub type ExtraFields = Arc<dyn Fn(&Video) -> Vec<String> + Send + Sync>;

/// Built-in extra fields selectable from the config file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExtraField {
  Length,
  Published,
  Views,
}

impl ExtraField {
  fn render(self, video: &Video) -> Option<String> {
    match self {
      ExtraField::Length => video.length_seconds.filter(|s| *s > 0).map(format_duration),
      ExtraField::Published => video
        .published
        .and_then(|ts| DateTime::from_timestamp(ts, 0))
        .map(|d| d.format("%Y-%m-%d").to_string())
        .or_else(|| video.published_text.clone()),
      ExtraField::Views => video.view_count.map(|n| format!("{} views", format_count(n))),
    }
  }
}

/// Build a hook that renders `fields` in order, skipping the ones a video
/// has no data for.
pub fn extra_fields_hook(fields: Vec<ExtraField>) -> ExtraFields {
  Arc::new(move |video: &Video| fields.iter().filter_map(|f| f.render(video)).collect())
}

pub fn format_duration(secs: u64) -> String {
  let (h, m, s) = (secs / 3600, (secs % 3600) / 60, secs % 60);
  if h > 0 { format!("{}:{:02}:{:02}", h, m, s) } else { format!("{}:{:02}", m, s) }
}

/// `1234567` → `1,234,567`
pub fn format_count(n: u64) -> String {
  let digits = n.to_string();
  let mut out = String::with_capacity(digits.len() + digits.len() / 3);
  for (i, c) in digits.chars().enumerate() {
    if i > 0 && (digits.len() - i) % 3 == 0 {
      out.push(',');
    }
    out.push(c);
  }
  out
}

// --- Renderer ---

#[derive(Clone)]
pub struct Renderer {
  cache: ThumbnailCache,
  extra_fields: Option<ExtraFields>,
  describe_action: bool,
}

impl Renderer {
  pub fn new(cache: ThumbnailCache) -> Self {
    Self { cache, extra_fields: None, describe_action: true }
  }

  pub fn with_extra_fields(mut self, hook: ExtraFields) -> Self {
    self.extra_fields = Some(hook);
    self
  }

  pub fn with_describe_action(mut self, enabled: bool) -> Self {
    self.describe_action = enabled;
    self
  }

  pub fn cache(&self) -> &ThumbnailCache {
    &self.cache
  }

  /// Render the video records of `items` onto `surface` in order.
  /// Returns `false` if the pass was cancelled before it was presented.
  pub async fn render_videos<S: Surface>(
    &self,
    items: &[SearchItem],
    surface: &mut S,
    cancel: &CancellationToken,
  ) -> bool {
    surface.clear();
    for item in items {
      if cancel.is_cancelled() {
        debug!("render: video pass cancelled");
        return false;
      }
      let SearchItem::Video(video) = item else { continue };
      let image = self.cache.get_image(&video.video_id);
      surface.append(Entry::Video(self.video_entry(video, image)));
      tokio::task::yield_now().await;
    }
    surface.present();
    true
  }

  /// Render the channel records of `items` onto `surface` in order.
  pub async fn render_channels<S: Surface>(
    &self,
    items: &[SearchItem],
    surface: &mut S,
    cancel: &CancellationToken,
  ) -> bool {
    surface.clear();
    for item in items {
      if cancel.is_cancelled() {
        debug!("render: channel pass cancelled");
        return false;
      }
      let SearchItem::Channel(channel) = item else { continue };
      surface.append(Entry::Channel(channel_entry(channel)));
      tokio::task::yield_now().await;
    }
    surface.present();
    true
  }

  fn video_entry(&self, video: &Video, image: ImageHandle) -> VideoEntry {
    let url = constants().watch_url(&video.video_id);
    let mut actions = vec![
      Action::Watch { url: url.clone() },
      Action::OpenChannel { author_id: video.author_id.clone() },
      Action::CopyUrl { url },
    ];
    if self.describe_action {
      actions.push(Action::Describe { video_id: video.video_id.clone() });
    }
    let extra = self.extra_fields.as_ref().map(|hook| hook(video)).unwrap_or_default();
    VideoEntry {
      title: video.title.clone(),
      author: video.author.clone(),
      author_id: video.author_id.clone(),
      view_count_text: video.view_count_text.clone(),
      image,
      actions,
      extra,
    }
  }
}

fn channel_entry(channel: &Channel) -> ChannelEntry {
  let url = constants().channel_url(&channel.author_id);
  ChannelEntry {
    author_id: channel.author_id.clone(),
    author: channel.author.clone(),
    subscribers: channel.sub_count,
    actions: vec![Action::OpenChannel { author_id: channel.author_id.clone() }, Action::CopyUrl { url }],
  }
}
