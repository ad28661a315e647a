use anyhow::{Context, Result, anyhow};
use percent_encoding::{AsciiSet, NON_ALPHANUMERIC, utf8_percent_encode};
use serde::Deserialize;
use serde_json::Value;
use tokio_util::sync::CancellationToken;
use tracing::warn;

use crate::constants::constants;
use crate::mirror::{FailoverClient, Transport, fetch_json};

// --- Records ---

/// Raw thumbnail variant as listed by the API.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct ThumbnailInfo {
  #[serde(default)]
  pub quality: String,
  #[serde(default)]
  pub url: String,
  #[serde(default)]
  pub width: u32,
  #[serde(default)]
  pub height: u32,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Video {
  #[serde(default)]
  pub video_id: String,
  #[serde(default)]
  pub title: String,
  #[serde(default)]
  pub author: String,
  #[serde(default)]
  pub author_id: String,
  #[serde(default)]
  pub video_thumbnails: Vec<ThumbnailInfo>,
  pub view_count_text: Option<String>,
  pub view_count: Option<u64>,
  pub length_seconds: Option<u64>,
  /// Unix timestamp (seconds).
  pub published: Option<i64>,
  pub published_text: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Channel {
  #[serde(default)]
  pub author_id: String,
  #[serde(default)]
  pub author: String,
  pub author_url: Option<String>,
  pub sub_count: Option<u64>,
}

/// One entry of a search or listing response, discriminated by its `type`.
/// Playlists and anything newer than this client decode to `Other`.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum SearchItem {
  Video(Video),
  Channel(Channel),
  #[serde(other)]
  Other,
}

/// Full metadata of a single video (`/api/v1/videos/<id>`).
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VideoDetails {
  #[serde(default)]
  pub video_id: String,
  #[serde(default)]
  pub title: String,
  #[serde(default)]
  pub description: String,
  #[serde(default)]
  pub author: String,
  #[serde(default)]
  pub author_id: String,
  pub view_count: Option<u64>,
  pub like_count: Option<u64>,
  pub published_text: Option<String>,
  pub length_seconds: Option<u64>,
  #[serde(default)]
  pub video_thumbnails: Vec<ThumbnailInfo>,
}

// --- Decoding ---

/// Everything except RFC 3986 unreserved characters.
const COMPONENT: &AsciiSet = &NON_ALPHANUMERIC.remove(b'-').remove(b'.').remove(b'_').remove(b'~');

fn encode(s: &str) -> String {
  utf8_percent_encode(s, COMPONENT).to_string()
}

/// Decode a result array item by item. An item that fails to decode is
/// logged and kept as `Other` so one odd entry never sinks a listing.
pub fn decode_items(body: Value) -> Result<Vec<SearchItem>> {
  let Value::Array(items) = body else {
    return Err(anyhow!("Expected a JSON array of results"));
  };
  Ok(
    items
      .into_iter()
      .map(|item| {
        serde_json::from_value(item).unwrap_or_else(|e| {
          warn!(err = %e, "invidious: undecodable result item");
          SearchItem::Other
        })
      })
      .collect(),
  )
}

/// Channel listings come either as a bare array or, on newer servers, as a
/// `{"videos": [...], "continuation": ...}` page.
pub fn decode_channel_videos(body: Value) -> Result<Vec<SearchItem>> {
  let items = match body {
    Value::Array(items) => items,
    Value::Object(mut page) => match page.remove("videos") {
      Some(Value::Array(items)) => items,
      _ => return Err(anyhow!("Channel page has no video list")),
    },
    _ => return Err(anyhow!("Unexpected channel videos response")),
  };
  Ok(
    items
      .into_iter()
      .filter_map(|item| match serde_json::from_value::<Video>(item) {
        Ok(video) => Some(SearchItem::Video(video)),
        Err(e) => {
          warn!(err = %e, "invidious: undecodable channel video");
          None
        }
      })
      .collect(),
  )
}

// --- Endpoints ---

// Listings stop walking the mirrors as soon as `cancel` fires.

pub async fn search(client: &FailoverClient, query: &str, cancel: &CancellationToken) -> Result<Vec<SearchItem>> {
  let path = format!("/api/v1/search?q={}", encode(query));
  let body =
    client.request_until(&path, None, cancel).await.with_context(|| format!("Search for '{}' failed", query))?;
  decode_items(body)
}

pub async fn search_channels(
  client: &FailoverClient,
  query: &str,
  cancel: &CancellationToken,
) -> Result<Vec<SearchItem>> {
  let path = format!("/api/v1/search?type=channel&q={}", encode(query));
  let body = client
    .request_until(&path, None, cancel)
    .await
    .with_context(|| format!("Channel search for '{}' failed", query))?;
  decode_items(body)
}

pub async fn channel_videos(
  client: &FailoverClient,
  channel_id: &str,
  cancel: &CancellationToken,
) -> Result<Vec<SearchItem>> {
  let path = format!("/api/v1/channels/{}/videos", encode(channel_id));
  let body = client
    .request_until(&path, None, cancel)
    .await
    .with_context(|| format!("Listing videos of channel {} failed", channel_id))?;
  decode_channel_videos(body)
}

pub async fn video(client: &FailoverClient, video_id: &str) -> Result<VideoDetails> {
  let path = format!("/api/v1/videos/{}", encode(video_id));
  let body = client.request(&path, None).await.with_context(|| format!("Fetching video {} failed", video_id))?;
  serde_json::from_value(body).with_context(|| format!("Malformed metadata for video {}", video_id))
}

/// Vote counts from the dislike statistics service, passed through as-is.
pub async fn votes(transport: &dyn Transport, video_id: &str) -> Result<Value> {
  let url = format!("{}?videoId={}", constants().votes_url, encode(video_id));
  fetch_json(transport, &url, constants().service_timeout())
    .await
    .with_context(|| format!("Fetching votes for {} failed", video_id))
}
