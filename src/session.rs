use anyhow::{Context, Result};
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::cache::ThumbnailCache;
use crate::config::{Config, SurfaceNames, config_file};
use crate::constants::constants;
use crate::invidious::{self, SearchItem};
use crate::mirror::{FailoverClient, FailoverError, HttpTransport, MirrorHosts, Transport};
use crate::render::{Renderer, Surface, extra_fields_hook};

/// A listing the user can ask for.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Query {
  Videos(String),
  Channels(String),
  ChannelVideos(String),
}

impl Query {
  /// Interpret a line of user input.
  ///
  /// - `/channel <query>` searches channels
  /// - `/videos <channel id>` lists a channel's uploads
  /// - anything else is a video search
  pub fn parse(input: &str) -> Option<Self> {
    let trimmed = input.trim();
    if trimmed.is_empty() {
      return None;
    }
    let prefixed = |prefix: &str| {
      trimmed
        .strip_prefix(prefix)
        .filter(|rest| rest.is_empty() || rest.starts_with(char::is_whitespace))
        .map(str::trim)
        .filter(|rest| !rest.is_empty())
        .map(str::to_string)
    };
    if let Some(rest) = prefixed("/channel") {
      return Some(Query::Channels(rest));
    }
    if let Some(rest) = prefixed("/videos") {
      return Some(Query::ChannelVideos(rest));
    }
    Some(Query::Videos(trimmed.to_string()))
  }

  pub fn lists_channels(&self) -> bool {
    matches!(self, Query::Channels(_))
  }

  pub fn surface_name<'a>(&self, names: &'a SurfaceNames) -> &'a str {
    if self.lists_channels() { &names.channels } else { &names.videos }
  }

  pub fn describe(&self) -> String {
    match self {
      Query::Videos(q) => format!("Searching '{}'…", q),
      Query::Channels(q) => format!("Searching channels '{}'…", q),
      Query::ChannelVideos(id) => format!("Loading channel {}…", id),
    }
  }

  pub async fn fetch(&self, client: &FailoverClient, cancel: &CancellationToken) -> Result<Vec<SearchItem>> {
    match self {
      Query::Videos(q) => invidious::search(client, q, cancel).await,
      Query::Channels(q) => invidious::search_channels(client, q, cancel).await,
      Query::ChannelVideos(id) => invidious::channel_videos(client, id, cancel).await,
    }
  }
}

/// Process-scoped state shared by the front ends: one mirror list, one
/// failover client, one thumbnail cache and the renderer built on it.
#[derive(Clone)]
pub struct Session {
  pub config: Arc<Config>,
  pub transport: Arc<dyn Transport>,
  pub client: FailoverClient,
  pub renderer: Renderer,
}

/// How thumbnails are handled for a session.
pub enum Thumbnails {
  /// Fetch in the background, announcing ready keys on the channel.
  Fetch(mpsc::UnboundedSender<String>),
  /// Never fetch (plain-text output).
  Skip,
}

impl Session {
  pub fn new(config: Config, thumbnails: Thumbnails) -> Result<Self> {
    let transport: Arc<dyn Transport> = Arc::new(HttpTransport::new(constants().image_timeout())?);
    Ok(Self::with_transport(config, transport, thumbnails))
  }

  pub fn with_transport(config: Config, transport: Arc<dyn Transport>, thumbnails: Thumbnails) -> Self {
    let hosts = MirrorHosts::new(config.instances());
    let client = FailoverClient::new(transport.clone(), hosts, config.timeout());
    let cache = match thumbnails {
      Thumbnails::Fetch(tx) => ThumbnailCache::new(client.clone(), config.quality(), Some(tx)),
      Thumbnails::Skip => ThumbnailCache::offline(client.clone(), config.quality()),
    };
    let mut renderer = Renderer::new(cache).with_describe_action(config.describe_action());
    if let Some(fields) = config.extra_fields.clone().filter(|f| !f.is_empty()) {
      renderer = renderer.with_extra_fields(extra_fields_hook(fields));
    }
    Self { config: Arc::new(config), transport, client, renderer }
  }

  pub fn hosts(&self) -> &MirrorHosts {
    self.client.hosts()
  }

  pub fn cache(&self) -> &ThumbnailCache {
    self.renderer.cache()
  }

  /// Fetch the records for `query` and render them onto `surface`.
  /// Returns whether the pass ran to completion.
  pub async fn run_query<S: Surface>(
    &self,
    query: &Query,
    surface: &mut S,
    cancel: &CancellationToken,
  ) -> Result<bool> {
    let items = match query.fetch(&self.client, cancel).await {
      Ok(items) => items,
      Err(e) if e.downcast_ref::<FailoverError>() == Some(&FailoverError::Cancelled) => return Ok(false),
      Err(e) => return Err(e),
    };
    let completed = if query.lists_channels() {
      self.renderer.render_channels(&items, surface, cancel).await
    } else {
      self.renderer.render_videos(&items, surface, cancel).await
    };
    Ok(completed)
  }

  /// Store the current mirror list in the config file. Other settings are
  /// re-read from disk so command line overrides are not persisted.
  pub fn persist_hosts(&self) -> Result<()> {
    let path = config_file().context("No config directory on this system")?;
    Config::store_instances(&path, self.hosts().snapshot())
  }
}
