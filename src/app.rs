use anyhow::{Context, Result};
use image::DynamicImage;
use ratatui::{layout::Rect, widgets::ListState};
use serde_json::Value;
use std::process::{Command, Stdio};
use std::time::{Duration, Instant};
use tokio::sync::{mpsc, oneshot};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::display::DisplayMode;
use crate::instances;
use crate::invidious::{self, VideoDetails};
use crate::render::{Action, Entry, StreamSurface, SurfaceEvent, format_count, format_duration};
use crate::session::{Query, Session};

// --- Types ---

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AppMode {
  Input,
  Results,
  Details,
}

/// Everything the description view shows for one video.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DetailsView {
  pub video_id: String,
  pub title: String,
  pub author: String,
  pub description: String,
  pub views: Option<u64>,
  pub length_seconds: Option<u64>,
  pub published_text: Option<String>,
  pub likes: Option<u64>,
  pub dislikes: Option<u64>,
}

impl DetailsView {
  /// Merge the mirror's video record with the (optional) vote counts.
  /// Vote counts win over the mirror's like count when present.
  pub fn from_parts(details: VideoDetails, votes: Option<&Value>) -> Self {
    let vote = |field: &str| votes.and_then(|v| v.get(field)).and_then(Value::as_u64);
    Self {
      likes: vote("likes").or(details.like_count),
      dislikes: vote("dislikes"),
      views: details.view_count.or_else(|| vote("viewCount")),
      video_id: details.video_id,
      title: details.title,
      author: details.author,
      description: details.description,
      length_seconds: details.length_seconds,
      published_text: details.published_text,
    }
  }

  /// One-line summary of the numbers, e.g. `12:03 · 1,204 views · 👍 40 · 👎 1`.
  pub fn stats_line(&self) -> String {
    let mut parts = Vec::new();
    if let Some(secs) = self.length_seconds {
      parts.push(format_duration(secs));
    }
    if let Some(views) = self.views {
      parts.push(format!("{} views", format_count(views)));
    }
    if let Some(published) = &self.published_text {
      parts.push(published.clone());
    }
    if let Some(likes) = self.likes {
      parts.push(format!("👍 {}", format_count(likes)));
    }
    if let Some(dislikes) = self.dislikes {
      parts.push(format!("👎 {}", format_count(dislikes)));
    }
    parts.join(" · ")
  }

  pub fn text_lines(&self) -> Vec<String> {
    let mut lines = vec![self.title.clone(), self.author.clone(), self.stats_line(), String::new()];
    lines.extend(self.description.lines().map(str::to_string));
    lines
  }
}

/// Fetch the video record and its vote counts side by side. Missing votes
/// are not an error.
pub async fn fetch_details(session: &Session, video_id: &str) -> Result<DetailsView> {
  let (details, votes) =
    tokio::join!(invidious::video(&session.client, video_id), invidious::votes(session.transport.as_ref(), video_id));
  let votes = match votes {
    Ok(v) => Some(v),
    Err(e) => {
      debug!(video_id = %video_id, err = %e, "details: no vote counts");
      None
    }
  };
  Ok(DetailsView::from_parts(details?, votes.as_ref()))
}

/// Resized copy of the selected thumbnail, so the image is only scaled when
/// the selection, the panel size or the image itself changes.
#[derive(Default)]
pub struct GraphicsCache {
  pub resized_thumb: Option<(String, Rect, DynamicImage)>,
}

/// In-flight background work.
#[derive(Default)]
pub(crate) struct AsyncTasks {
  pub(crate) surface_rx: Option<mpsc::UnboundedReceiver<SurfaceEvent>>,
  pub(crate) render_cancel: Option<CancellationToken>,
  pub(crate) details_rx: Option<oneshot::Receiver<Result<DetailsView>>>,
  pub(crate) refresh_rx: Option<oneshot::Receiver<Result<usize>>>,
}

pub struct App {
  pub input: String,
  pub cursor_position: usize,
  pub input_scroll: usize,
  pub mode: AppMode,
  pub session: Session,
  pub display_mode: DisplayMode,
  /// Entries of the current listing, in render order.
  pub entries: Vec<Entry>,
  pub surface_title: String,
  /// Whether the current listing has been presented.
  pub listing_done: bool,
  pub list_state: ListState,
  pub details: Option<DetailsView>,
  pub details_scroll: u16,
  pub last_error: Option<String>,
  pub status_message: Option<String>,
  /// Informational message, lower priority than status/error.
  pub info_message: Option<String>,
  pub should_quit: bool,
  pub gfx: GraphicsCache,
  pub(crate) tasks: AsyncTasks,
  /// Keys of thumbnails that finished loading.
  thumb_rx: mpsc::UnboundedReceiver<String>,
  /// When the last error was set, for auto-dismiss after 5 seconds.
  error_time: Option<Instant>,
}

impl App {
  pub fn new(session: Session, thumb_rx: mpsc::UnboundedReceiver<String>, display_mode: DisplayMode) -> Self {
    let surface_title = session.config.surfaces.videos.clone();
    Self {
      input: String::new(),
      cursor_position: 0,
      input_scroll: 0,
      mode: AppMode::Input,
      session,
      display_mode,
      entries: Vec::new(),
      surface_title,
      listing_done: false,
      list_state: ListState::default(),
      details: None,
      details_scroll: 0,
      last_error: None,
      status_message: None,
      info_message: None,
      should_quit: false,
      gfx: GraphicsCache::default(),
      tasks: AsyncTasks::default(),
      thumb_rx,
      error_time: None,
    }
  }

  /// Set an error message with auto-dismiss tracking.
  pub fn set_error(&mut self, msg: String) {
    self.last_error = Some(msg);
    self.error_time = Some(Instant::now());
  }

  pub fn clear_error(&mut self) {
    self.last_error = None;
    self.error_time = None;
  }

  /// Clear stale error messages after 5 seconds.
  pub fn expire_error(&mut self) {
    if let Some(t) = self.error_time
      && t.elapsed() >= Duration::from_secs(5)
    {
      self.clear_error();
    }
  }

  pub fn selected_entry(&self) -> Option<&Entry> {
    self.list_state.selected().and_then(|i| self.entries.get(i))
  }

  // --- Polling ---

  pub fn check_pending(&mut self) {
    let mut events = Vec::new();
    if let Some(rx) = self.tasks.surface_rx.as_mut() {
      while let Ok(event) = rx.try_recv() {
        events.push(event);
      }
    }
    for event in events {
      self.apply_surface_event(event);
    }

    if let Some(mut rx) = self.tasks.details_rx.take() {
      match rx.try_recv() {
        Ok(result) => {
          self.status_message = None;
          match result {
            Ok(details) => {
              self.details = Some(details);
              self.details_scroll = 0;
              self.mode = AppMode::Details;
            }
            Err(e) => self.set_error(format!("Failed to load description: {:#}", e)),
          }
        }
        Err(oneshot::error::TryRecvError::Empty) => {
          self.tasks.details_rx = Some(rx);
        }
        Err(oneshot::error::TryRecvError::Closed) => {
          self.status_message = None;
          self.set_error("Description task failed.".to_string());
        }
      }
    }

    if let Some(mut rx) = self.tasks.refresh_rx.take() {
      match rx.try_recv() {
        Ok(result) => {
          self.status_message = None;
          match result {
            Ok(count) => self.info_message = Some(format!("Mirror list refreshed: {} instances", count)),
            Err(e) => self.set_error(format!("Refreshing instances failed: {:#}", e)),
          }
        }
        Err(oneshot::error::TryRecvError::Empty) => {
          self.tasks.refresh_rx = Some(rx);
        }
        Err(oneshot::error::TryRecvError::Closed) => {
          self.status_message = None;
        }
      }
    }

    // A refilled slot invalidates the resized copy of that image.
    while let Ok(key) = self.thumb_rx.try_recv() {
      if self.gfx.resized_thumb.as_ref().is_some_and(|(k, _, _)| *k == key) {
        self.gfx.resized_thumb = None;
      }
    }
  }

  fn apply_surface_event(&mut self, event: SurfaceEvent) {
    match event {
      SurfaceEvent::Cleared => {
        self.entries.clear();
        self.list_state.select(None);
        self.listing_done = false;
      }
      SurfaceEvent::Appended(entry) => {
        self.entries.push(entry);
        if self.list_state.selected().is_none() {
          self.list_state.select(Some(0));
        }
      }
      SurfaceEvent::Presented => {
        self.status_message = None;
        self.listing_done = true;
        if self.entries.is_empty() {
          self.list_state.select(None);
          self.set_error("No results found.".to_string());
        } else {
          self.list_state.select(Some(0));
          self.mode = AppMode::Results;
        }
        debug!(entries = self.entries.len(), "app: listing presented");
      }
      SurfaceEvent::Failed(msg) => {
        self.status_message = None;
        self.set_error(format!("Search failed: {}", msg));
      }
    }
  }

  // --- Listings ---

  pub fn trigger_search(&mut self) {
    match Query::parse(&self.input) {
      Some(query) => self.start_listing(query),
      None => self.set_error("Enter a search term.".to_string()),
    }
  }

  /// Start a new listing, cancelling the render pass of the previous one.
  pub fn start_listing(&mut self, query: Query) {
    info!(query = ?query, "listing triggered");
    self.cancel_listing();
    self.clear_error();
    self.info_message = None;
    self.status_message = Some(query.describe());
    self.surface_title = query.surface_name(&self.session.config.surfaces).to_string();

    let (tx, rx) = mpsc::unbounded_channel();
    let cancel = CancellationToken::new();
    let session = self.session.clone();
    let token = cancel.clone();
    tokio::spawn(async move {
      let mut surface = StreamSurface::new(tx);
      match session.run_query(&query, &mut surface, &token).await {
        Ok(true) => {}
        Ok(false) => debug!(query = ?query, "listing cancelled"),
        Err(e) => {
          warn!(err = %e, "listing failed");
          surface.fail(format!("{:#}", e));
        }
      }
    });
    self.tasks.surface_rx = Some(rx);
    self.tasks.render_cancel = Some(cancel);
  }

  fn cancel_listing(&mut self) {
    if let Some(cancel) = self.tasks.render_cancel.take() {
      cancel.cancel();
    }
    self.tasks.surface_rx = None;
  }

  // --- Entry actions ---

  pub fn run_action(&mut self, action: Action) {
    match action {
      Action::Watch { url } => self.watch(&url),
      Action::OpenChannel { author_id } => self.start_listing(Query::ChannelVideos(author_id)),
      Action::CopyUrl { url } => self.info_message = Some(url),
      Action::Describe { video_id } => self.trigger_details(video_id),
    }
  }

  /// Enter on an entry: watch a video, open a channel.
  pub fn trigger_primary(&mut self) {
    if let Some(action) = self.selected_entry().and_then(Entry::primary_action).cloned() {
      self.run_action(action);
    }
  }

  /// List the uploads of the selected entry's channel.
  pub fn trigger_author_channel(&mut self) {
    let author_id = match self.selected_entry() {
      Some(Entry::Video(v)) => v.author_id.clone(),
      Some(Entry::Channel(c)) => c.author_id.clone(),
      None => return,
    };
    if author_id.is_empty() {
      self.set_error("No channel for this entry.".to_string());
      return;
    }
    self.start_listing(Query::ChannelVideos(author_id));
  }

  pub fn trigger_copy_url(&mut self) {
    let action = self.selected_entry().and_then(|e| e.find_action(|a| matches!(a, Action::CopyUrl { .. }))).cloned();
    if let Some(action) = action {
      self.run_action(action);
    }
  }

  pub fn trigger_describe(&mut self) {
    let action = self.selected_entry().and_then(|e| e.find_action(|a| matches!(a, Action::Describe { .. }))).cloned();
    if let Some(action) = action {
      self.run_action(action);
    }
  }

  fn trigger_details(&mut self, video_id: String) {
    self.clear_error();
    self.status_message = Some("Loading description…".to_string());
    let session = self.session.clone();
    let (tx, rx) = oneshot::channel();
    tokio::spawn(async move {
      let _ = tx.send(fetch_details(&session, &video_id).await);
    });
    self.tasks.details_rx = Some(rx);
  }

  /// Hand the URL to the configured watch command.
  fn watch(&mut self, url: &str) {
    let command = self.session.config.watch_command();
    let mut parts = command.split_whitespace();
    let Some(program) = parts.next() else {
      self.set_error("No watch command configured.".to_string());
      return;
    };
    let spawned = Command::new(program)
      .args(parts)
      .arg(url)
      .stdin(Stdio::null())
      .stdout(Stdio::null())
      .stderr(Stdio::null())
      .spawn();
    match spawned {
      Ok(mut child) => {
        info!(program = %program, url = %url, "watch: launched");
        // Reap the child so it does not linger as a zombie.
        std::thread::spawn(move || {
          let _ = child.wait();
        });
        self.info_message = Some(format!("Opened in {}", program));
      }
      Err(e) => {
        warn!(program = %program, err = %e, "watch: launch failed");
        self.set_error(format!("Failed to launch {}: {}", program, e));
      }
    }
  }

  // --- Global actions ---

  /// Replace the mirror list from the public directory and save it.
  pub fn trigger_refresh_instances(&mut self) {
    if self.tasks.refresh_rx.is_some() {
      return;
    }
    self.status_message = Some("Refreshing instances…".to_string());
    let session = self.session.clone();
    let (tx, rx) = oneshot::channel();
    tokio::spawn(async move {
      let result = match instances::refresh_instances(session.transport.as_ref(), session.hosts()).await {
        Ok(hosts) => session.persist_hosts().map(|()| hosts.len()).context("Mirror list updated but not saved"),
        Err(e) => Err(e),
      };
      let _ = tx.send(result);
    });
    self.tasks.refresh_rx = Some(rx);
  }

  pub fn clear_thumbnails(&mut self) {
    self.session.cache().clear();
    self.gfx.resized_thumb = None;
    self.info_message = Some("Thumbnail cache cleared".to_string());
  }
}
