use anyhow::{Context, Result, anyhow};
use serde_json::Value;
use tracing::info;

use crate::constants::constants;
use crate::mirror::{MirrorHosts, Transport, fetch_json};

/// Extract hostnames from the directory's `[[hostname, metadata], ...]` list.
pub fn parse_directory(body: &Value) -> Result<Vec<String>> {
  let entries = body.as_array().ok_or_else(|| anyhow!("Instance directory is not a JSON array"))?;
  Ok(
    entries
      .iter()
      .filter_map(|entry| entry.get(0).and_then(Value::as_str))
      .map(str::trim)
      .filter(|host| !host.is_empty())
      .map(str::to_string)
      .collect(),
  )
}

/// Whether `host` lives on an anonymity network (Tor, I2P).
pub fn is_anonymity_host(host: &str) -> bool {
  let host = host.to_ascii_lowercase();
  constants().anonymity_suffixes.iter().any(|suffix| host.ends_with(suffix.as_str()))
}

/// Every host known to the public directory.
pub async fn list_instances(transport: &dyn Transport) -> Result<Vec<String>> {
  let url = &constants().directory_url;
  let body = fetch_json(transport, url, constants().service_timeout())
    .await
    .with_context(|| format!("Fetching instance directory {} failed", url))?;
  parse_directory(&body)
}

/// Directory hosts reachable without an anonymity network.
pub async fn list_clearnet_instances(transport: &dyn Transport) -> Result<Vec<String>> {
  let hosts = list_instances(transport).await?;
  Ok(hosts.into_iter().filter(|h| !is_anonymity_host(h)).collect())
}

/// Replace the mirror list with the directory's clearnet hosts.
/// Returns the new list. An empty result leaves the current list alone.
pub async fn refresh_instances(transport: &dyn Transport, hosts: &MirrorHosts) -> Result<Vec<String>> {
  let fresh = list_clearnet_instances(transport).await?;
  if fresh.is_empty() {
    return Err(anyhow!("Instance directory listed no clearnet hosts"));
  }
  info!(count = fresh.len(), "instances: mirror list refreshed");
  hosts.replace(fresh.clone());
  Ok(fresh)
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::mirror::AttemptError;
  use crate::mirror::testing::{Reply, ScriptedTransport};
  use serde_json::json;

  fn directory() -> Value {
    json!([
      ["yewtu.be", { "type": "https", "uri": "https://yewtu.be" }],
      ["inv.example.onion", { "type": "onion" }],
      ["inv.example.i2p", { "type": "i2p" }],
      ["invidious.example.org", { "type": "https" }],
      "garbage",
      [42, {}]
    ])
  }

  #[test]
  fn parse_takes_hostnames_only() {
    assert_eq!(
      parse_directory(&directory()).unwrap(),
      vec!["yewtu.be", "inv.example.onion", "inv.example.i2p", "invidious.example.org"]
    );
    assert!(parse_directory(&json!({})).is_err());
  }

  #[test]
  fn anonymity_suffixes() {
    assert!(is_anonymity_host("abc.onion"));
    assert!(is_anonymity_host("ABC.I2P"));
    assert!(!is_anonymity_host("onion.example.com"));
  }

  #[tokio::test]
  async fn clearnet_listing_filters_anonymity_hosts() {
    let transport = ScriptedTransport::new();
    transport.on(&constants().directory_url, Reply::Json(directory()));

    let all = list_instances(transport.as_ref()).await.unwrap();
    let clear = list_clearnet_instances(transport.as_ref()).await.unwrap();
    assert_eq!(all.len(), 4);
    assert_eq!(clear, vec!["yewtu.be", "invidious.example.org"]);
  }

  #[tokio::test]
  async fn refresh_replaces_mirror_list() {
    let transport = ScriptedTransport::new();
    transport.on(&constants().directory_url, Reply::Json(directory()));
    let hosts = MirrorHosts::new(vec!["old.example".into()]);

    let fresh = refresh_instances(transport.as_ref(), &hosts).await.unwrap();
    assert_eq!(fresh.len(), 2);
    assert_eq!(hosts.snapshot(), vec!["yewtu.be", "invidious.example.org"]);
  }

  #[tokio::test]
  async fn failed_refresh_keeps_old_list() {
    let transport = ScriptedTransport::new();
    transport.on(&constants().directory_url, Reply::Fail(AttemptError::Status(502)));
    let hosts = MirrorHosts::new(vec!["old.example".into()]);

    assert!(refresh_instances(transport.as_ref(), &hosts).await.is_err());
    assert_eq!(hosts.snapshot(), vec!["old.example"]);
  }
}
