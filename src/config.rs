use anyhow::{Context, Result};
use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, warn};

use crate::constants::constants;
use crate::render::ExtraField;
use crate::thumbnail::Quality;

/// User preferences, read from `<config dir>/invid/config.toml`.
/// Every field is optional; unset fields fall back to built-in defaults.
#[derive(Serialize, Deserialize, Default, Debug, Clone, PartialEq)]
pub struct Config {
  /// Mirror hostnames. Replaced by `refresh-instances`.
  pub instances: Option<Vec<String>>,
  pub timeout_secs: Option<f64>,
  pub thumbnail_quality: Option<Quality>,
  /// Command the watch URL is handed to, e.g. `mpv`.
  pub watch_command: Option<String>,
  pub describe_action: Option<bool>,
  pub extra_fields: Option<Vec<ExtraField>>,
  #[serde(default)]
  pub surfaces: SurfaceNames,
}

/// Titles of the display surfaces.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(default)]
pub struct SurfaceNames {
  pub videos: String,
  pub channels: String,
  pub details: String,
}

impl Default for SurfaceNames {
  fn default() -> Self {
    Self { videos: "Videos".to_string(), channels: "Channels".to_string(), details: "Description".to_string() }
  }
}

pub fn config_file() -> Option<PathBuf> {
  ProjectDirs::from("", "", "invid").map(|dirs| dirs.config_dir().join("config.toml"))
}

impl Config {
  /// Settings from the user's config file. A missing or malformed file
  /// yields the defaults.
  pub fn load() -> Self {
    let Some(config_file) = config_file() else { return Self::default() };
    Self::read(&config_file).unwrap_or_else(|e| {
      warn!(path = %config_file.display(), err = %format!("{:#}", e), "config: ignoring malformed file");
      Self::default()
    })
  }

  /// Parse the file at `path`. A missing file is an empty config.
  pub fn read(path: &Path) -> Result<Self> {
    let content = match std::fs::read_to_string(path) {
      Ok(content) => content,
      Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Self::default()),
      Err(e) => return Err(e).with_context(|| format!("Failed to read {}", path.display())),
    };
    toml::from_str(&content).with_context(|| format!("Malformed config file {}", path.display()))
  }

  pub fn write(&self, path: &Path) -> Result<()> {
    if let Some(dir) = path.parent() {
      std::fs::create_dir_all(dir).with_context(|| format!("Failed to create {}", dir.display()))?;
    }
    let content = toml::to_string(self).context("Failed to serialize config")?;
    std::fs::write(path, content).with_context(|| format!("Failed to write {}", path.display()))?;
    debug!(path = %path.display(), "config: saved");
    Ok(())
  }

  /// Set the mirror list stored at `path`, keeping the file's other
  /// settings. A file that does not parse is left untouched.
  pub fn store_instances(path: &Path, hosts: Vec<String>) -> Result<()> {
    let mut config = Self::read(path).context("Not overwriting the config file")?;
    config.instances = Some(hosts);
    config.write(path)
  }

  pub fn instances(&self) -> Vec<String> {
    match &self.instances {
      Some(hosts) if !hosts.is_empty() => hosts.clone(),
      _ => constants().default_instances.clone(),
    }
  }

  pub fn timeout(&self) -> Duration {
    match self.timeout_secs {
      Some(secs) if secs.is_finite() && secs > 0.0 => Duration::from_secs_f64(secs),
      _ => constants().request_timeout(),
    }
  }

  pub fn quality(&self) -> Quality {
    self.thumbnail_quality.unwrap_or_default()
  }

  pub fn watch_command(&self) -> String {
    self.watch_command.clone().unwrap_or_else(|| {
      #[cfg(target_os = "macos")]
      let cmd = "open";
      #[cfg(not(target_os = "macos"))]
      let cmd = "xdg-open";
      cmd.to_string()
    })
  }

  pub fn describe_action(&self) -> bool {
    self.describe_action.unwrap_or(true)
  }
}
