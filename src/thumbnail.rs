use clap::ValueEnum;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tracing::debug;

use crate::invidious::{self, ThumbnailInfo};
use crate::mirror::FailoverClient;

/// Named thumbnail tier as reported by Invidious.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum Quality {
  Maxres,
  Sddefault,
  High,
  Medium,
  #[default]
  Default,
  Start,
  Middle,
  End,
}

impl Quality {
  pub const ALL: [Quality; 8] = [
    Quality::Maxres,
    Quality::Sddefault,
    Quality::High,
    Quality::Medium,
    Quality::Default,
    Quality::Start,
    Quality::Middle,
    Quality::End,
  ];

  pub fn label(self) -> &'static str {
    match self {
      Quality::Maxres => "maxres",
      Quality::Sddefault => "sddefault",
      Quality::High => "high",
      Quality::Medium => "medium",
      Quality::Default => "default",
      Quality::Start => "start",
      Quality::Middle => "middle",
      Quality::End => "end",
    }
  }

  /// Map an upstream tier name onto a known tier. Unknown names yield `None`.
  pub fn from_label(s: &str) -> Option<Self> {
    match s {
      "maxresdefault" => Some(Quality::Maxres),
      other => Self::ALL.into_iter().find(|q| q.label() == other),
    }
  }
}

/// One resolved thumbnail variant.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Thumbnail {
  pub url: String,
  pub width: u32,
  pub height: u32,
}

/// Index a raw thumbnail list by tier. The first entry of a tier wins, so a
/// real `maxres` listed before `maxresdefault` is kept.
pub fn parse_thumbnails(raw: &[ThumbnailInfo]) -> HashMap<Quality, Thumbnail> {
  let mut tiers = HashMap::new();
  for info in raw {
    let Some(quality) = Quality::from_label(&info.quality) else { continue };
    tiers
      .entry(quality)
      .or_insert_with(|| Thumbnail { url: info.url.clone(), width: info.width, height: info.height });
  }
  tiers
}

/// Whether `s` is already a direct URL rather than a video id.
pub fn is_url(s: &str) -> bool {
  s.starts_with("http://") || s.starts_with("https://")
}

/// Resolve a video id (or pass through a URL) to the image URL of `quality`.
///
/// Returns `None` when the metadata lookup fails or the tier is absent;
/// callers treat that as "no thumbnail".
pub async fn resolve_thumbnail_url(client: &FailoverClient, id_or_url: &str, quality: Quality) -> Option<String> {
  if is_url(id_or_url) {
    return Some(id_or_url.to_string());
  }
  let details = match invidious::video(client, id_or_url).await {
    Ok(details) => details,
    Err(e) => {
      debug!(video_id = %id_or_url, err = %format!("{:#}", e), "thumbnail: metadata lookup failed");
      return None;
    }
  };
  let url = parse_thumbnails(&details.video_thumbnails).remove(&quality).map(|t| t.url);
  if url.is_none() {
    debug!(video_id = %id_or_url, quality = quality.label(), "thumbnail: tier not offered");
  }
  url
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::mirror::testing::{Reply, ScriptedTransport, client_for};
  use serde_json::json;

  fn info(quality: &str, url: &str) -> ThumbnailInfo {
    ThumbnailInfo { quality: quality.to_string(), url: url.to_string(), width: 120, height: 90 }
  }

  #[test]
  fn quality_labels_round_trip() {
    for q in Quality::ALL {
      assert_eq!(Quality::from_label(q.label()), Some(q));
    }
    assert_eq!(Quality::from_label("maxresdefault"), Some(Quality::Maxres));
    assert_eq!(Quality::from_label("huge"), None);
  }

  #[test]
  fn parse_indexes_by_tier() {
    let tiers = parse_thumbnails(&[info("default", "https://x/d.jpg"), info("high", "https://x/h.jpg")]);
    assert_eq!(tiers.len(), 2);
    assert_eq!(tiers[&Quality::Default].url, "https://x/d.jpg");
    assert_eq!(tiers[&Quality::High].width, 120);
  }

  #[test]
  fn parse_skips_unknown_and_keeps_first() {
    let tiers = parse_thumbnails(&[
      info("maxres", "https://x/m.jpg"),
      info("maxresdefault", "https://x/md.jpg"),
      info("storyboard", "https://x/s.jpg"),
    ]);
    assert_eq!(tiers.len(), 1);
    assert_eq!(tiers[&Quality::Maxres].url, "https://x/m.jpg");
  }

  #[tokio::test]
  async fn url_input_passes_through() {
    let transport = ScriptedTransport::new();
    let client = client_for(&transport, &["m"]);
    let url = resolve_thumbnail_url(&client, "https://img/x.jpg", Quality::High).await;
    assert_eq!(url.as_deref(), Some("https://img/x.jpg"));
    assert!(transport.calls().is_empty());
  }

  #[tokio::test]
  async fn resolves_configured_tier_from_metadata() {
    let transport = ScriptedTransport::new();
    transport.on(
      "https://m/api/v1/videos/dQw4w9WgXcQ",
      Reply::Json(json!({
        "videoId": "dQw4w9WgXcQ",
        "title": "Never Gonna Give You Up",
        "videoThumbnails": [
          { "quality": "default", "url": "https://x/d.jpg", "width": 120, "height": 90 },
          { "quality": "high", "url": "https://x/h.jpg", "width": 480, "height": 360 }
        ]
      })),
    );
    let client = client_for(&transport, &["m"]);

    let url = resolve_thumbnail_url(&client, "dQw4w9WgXcQ", Quality::Default).await;
    assert_eq!(url.as_deref(), Some("https://x/d.jpg"));
  }

  #[tokio::test]
  async fn absent_tier_resolves_to_none() {
    let transport = ScriptedTransport::new();
    transport.on(
      "https://m/api/v1/videos/abc",
      Reply::Json(json!({ "videoThumbnails": [{ "quality": "high", "url": "https://x/h.jpg" }] })),
    );
    let client = client_for(&transport, &["m"]);

    assert_eq!(resolve_thumbnail_url(&client, "abc", Quality::Maxres).await, None);
  }

  #[tokio::test]
  async fn failed_lookup_resolves_to_none() {
    let transport = ScriptedTransport::new();
    let client = client_for(&transport, &["m"]);
    assert_eq!(resolve_thumbnail_url(&client, "abc", Quality::Default).await, None);
  }
}
