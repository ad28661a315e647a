//! Application constants loaded from `constants.ron` at compile time.
//!
//! The RON file is embedded via `include_str!` so it's always available,
//! with no runtime file I/O. Parsed once on first access via `LazyLock`.

use serde::Deserialize;
use std::sync::LazyLock;
use std::time::Duration;

/// All tuneable application constants.
#[derive(Debug, Deserialize)]
pub struct Constants {
  // Upstream services
  pub directory_url: String,
  pub votes_url: String,
  pub watch_url_base: String,
  pub channel_url_base: String,

  // Mirrors
  pub default_instances: Vec<String>,
  pub anonymity_suffixes: Vec<String>,

  // Timeouts
  pub request_timeout_secs: f64,
  pub image_timeout_secs: f64,
  /// Directory and vote lookups.
  pub service_timeout_secs: f64,
}

impl Constants {
  pub fn request_timeout(&self) -> Duration {
    Duration::from_secs_f64(self.request_timeout_secs)
  }

  pub fn image_timeout(&self) -> Duration {
    Duration::from_secs_f64(self.image_timeout_secs)
  }

  pub fn service_timeout(&self) -> Duration {
    Duration::from_secs_f64(self.service_timeout_secs)
  }

  pub fn watch_url(&self, video_id: &str) -> String {
    format!("{}{}", self.watch_url_base, video_id)
  }

  pub fn channel_url(&self, author_id: &str) -> String {
    format!("{}{}", self.channel_url_base, author_id)
  }
}

static CONSTANTS: LazyLock<Constants> = LazyLock::new(|| {
  // Safety: the RON file is embedded at compile time; if it's malformed this is a build-time error.
  ron::from_str(include_str!("../constants.ron")).expect("constants.ron must be valid RON (embedded at compile time)")
});

/// Returns a reference to the parsed application constants.
pub fn constants() -> &'static Constants {
  &CONSTANTS
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn embedded_constants_parse() {
    let c = constants();
    assert!(!c.default_instances.is_empty());
    assert_eq!(c.request_timeout(), Duration::from_secs(3));
    assert!(c.image_timeout() > c.request_timeout());
    assert!(c.service_timeout() > Duration::ZERO);
  }

  #[test]
  fn urls_are_built_from_bases() {
    let c = constants();
    assert_eq!(c.watch_url("abc"), "https://www.youtube.com/watch?v=abc");
    assert_eq!(c.channel_url("UC1"), "https://www.youtube.com/channel/UC1");
  }
}
