//! Mirror host list and the failover request client.
//!
//! Every logical request shuffles its own snapshot of the mirror list and
//! walks it until one host answers with a usable JSON body. A host counts as
//! failed on transport errors, timeouts, non-2xx statuses, unparseable bodies
//! and on Invidious' own `{"error": "..."}` envelope.

use anyhow::Context;
use futures::FutureExt;
use futures::future::BoxFuture;
use parking_lot::RwLock;
use rand::Rng;
use rand::seq::SliceRandom;
use reqwest::Client;
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

// --- Errors ---

/// Why a single host attempt was abandoned.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum AttemptError {
  #[error("transport error: {0}")]
  Transport(String),
  #[error("timed out")]
  Timeout,
  #[error("HTTP status {0}")]
  Status(u16),
  #[error("invalid JSON body: {0}")]
  Decode(String),
  #[error("upstream error: {0}")]
  Upstream(String),
}

/// Outcome of a logical request that did not produce a body.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum FailoverError {
  #[error("all {attempts} mirror(s) failed")]
  Exhausted { attempts: usize },
  #[error("request cancelled")]
  Cancelled,
}

// --- Transport ---

/// HTTP access used by the failover client, the instance directory and the
/// thumbnail cache.
pub trait Transport: Send + Sync {
  /// GET `url` (or POST `body` as JSON) and parse the response as JSON.
  fn json<'a>(&'a self, url: &'a str, body: Option<&'a Value>) -> BoxFuture<'a, Result<Value, AttemptError>>;

  /// GET `url` and return the raw response bytes.
  fn bytes<'a>(&'a self, url: &'a str) -> BoxFuture<'a, Result<Vec<u8>, AttemptError>>;
}

/// reqwest-backed transport. API calls carry no client-side deadline; the
/// failover loop bounds each attempt with its own configured timeout.
/// Image downloads are bounded by `image_timeout`.
pub struct HttpTransport {
  client: Client,
  image_timeout: Duration,
}

impl HttpTransport {
  pub fn new(image_timeout: Duration) -> anyhow::Result<Self> {
    let client = Client::builder()
      .user_agent(concat!("invid/", env!("CARGO_PKG_VERSION")))
      .build()
      .context("Failed to build HTTP client")?;
    Ok(Self { client, image_timeout })
  }
}

impl Transport for HttpTransport {
  fn json<'a>(&'a self, url: &'a str, body: Option<&'a Value>) -> BoxFuture<'a, Result<Value, AttemptError>> {
    async move {
      let request = match body {
        Some(body) => self.client.post(url).json(body),
        None => self.client.get(url),
      };
      let response = request.send().await.map_err(|e| transport_error(&e))?;
      let status = response.status();
      if !status.is_success() {
        return Err(AttemptError::Status(status.as_u16()));
      }
      response.json::<Value>().await.map_err(|e| AttemptError::Decode(e.to_string()))
    }
    .boxed()
  }

  fn bytes<'a>(&'a self, url: &'a str) -> BoxFuture<'a, Result<Vec<u8>, AttemptError>> {
    async move {
      let response = self.client.get(url).timeout(self.image_timeout).send().await.map_err(|e| transport_error(&e))?;
      let status = response.status();
      if !status.is_success() {
        return Err(AttemptError::Status(status.as_u16()));
      }
      let bytes = response.bytes().await.map_err(|e| transport_error(&e))?;
      Ok(bytes.to_vec())
    }
    .boxed()
  }
}

fn transport_error(e: &reqwest::Error) -> AttemptError {
  if e.is_timeout() { AttemptError::Timeout } else { AttemptError::Transport(e.to_string()) }
}

/// One JSON GET against a fixed service rather than a mirror, bounded by `limit`.
pub async fn fetch_json(transport: &dyn Transport, url: &str, limit: Duration) -> Result<Value, AttemptError> {
  tokio::time::timeout(limit, transport.json(url, None)).await.unwrap_or(Err(AttemptError::Timeout))
}

// --- Mirror hosts ---

/// Process-wide list of mirror hostnames, shared by every component that
/// issues API requests.
#[derive(Clone, Debug, Default)]
pub struct MirrorHosts(Arc<RwLock<Vec<String>>>);

impl MirrorHosts {
  pub fn new(hosts: Vec<String>) -> Self {
    Self(Arc::new(RwLock::new(hosts)))
  }

  pub fn snapshot(&self) -> Vec<String> {
    self.0.read().clone()
  }

  pub fn replace(&self, hosts: Vec<String>) {
    *self.0.write() = hosts;
  }

  pub fn len(&self) -> usize {
    self.0.read().len()
  }
}

/// Uniformly permute `hosts` in place (Fisher-Yates).
pub fn shuffle_hosts<R: Rng + ?Sized>(hosts: &mut [String], rng: &mut R) {
  hosts.shuffle(rng);
}

// --- Failover client ---

#[derive(Clone)]
pub struct FailoverClient {
  transport: Arc<dyn Transport>,
  hosts: MirrorHosts,
  timeout: Duration,
}

impl FailoverClient {
  pub fn new(transport: Arc<dyn Transport>, hosts: MirrorHosts, timeout: Duration) -> Self {
    Self { transport, hosts, timeout }
  }

  pub fn transport(&self) -> &Arc<dyn Transport> {
    &self.transport
  }

  pub fn hosts(&self) -> &MirrorHosts {
    &self.hosts
  }

  /// Issue `path_and_query` against the mirrors until one succeeds.
  pub async fn request(&self, path_and_query: &str, body: Option<&Value>) -> Result<Value, FailoverError> {
    self.request_until(path_and_query, body, &CancellationToken::new()).await
  }

  /// Like [`request`](Self::request), but gives up with
  /// [`FailoverError::Cancelled`] as soon as `cancel` fires.
  pub async fn request_until(
    &self,
    path_and_query: &str,
    body: Option<&Value>,
    cancel: &CancellationToken,
  ) -> Result<Value, FailoverError> {
    let mut pending = self.hosts.snapshot();
    shuffle_hosts(&mut pending, &mut rand::thread_rng());
    let mut attempts = 0;

    while let Some(host) = pending.pop() {
      if cancel.is_cancelled() {
        return Err(FailoverError::Cancelled);
      }
      attempts += 1;
      let url = format!("https://{}{}", host, path_and_query);
      let outcome = tokio::select! {
        _ = cancel.cancelled() => return Err(FailoverError::Cancelled),
        outcome = tokio::time::timeout(self.timeout, self.transport.json(&url, body)) => outcome,
      };
      match outcome.unwrap_or(Err(AttemptError::Timeout)).and_then(check_envelope) {
        Ok(value) => {
          debug!(host = %host, path = %path_and_query, attempts, "mirror: request succeeded");
          return Ok(value);
        }
        Err(e) => {
          warn!(host = %host, path = %path_and_query, err = %e, "mirror: attempt failed, trying next host");
        }
      }
    }

    warn!(path = %path_and_query, attempts, "mirror: all hosts failed");
    Err(FailoverError::Exhausted { attempts })
  }
}

/// Reject bodies carrying the upstream's own error envelope.
fn check_envelope(value: Value) -> Result<Value, AttemptError> {
  match value.get("error") {
    Some(Value::String(msg)) => Err(AttemptError::Upstream(msg.clone())),
    Some(other) => Err(AttemptError::Upstream(other.to_string())),
    None => Ok(value),
  }
}

// --- Scripted transport for tests ---

#[cfg(test)]
pub(crate) mod testing {
  use super::*;
  use parking_lot::Mutex;
  use std::collections::HashMap;

  /// Canned response for one URL.
  #[derive(Clone)]
  pub enum Reply {
    Json(Value),
    Bytes(Vec<u8>),
    Fail(AttemptError),
    /// Sleep first, then answer.
    Delayed(Duration, Box<Reply>),
  }

  /// In-memory transport answering from a URL → reply table and recording
  /// every URL it was asked for. URLs without an entry fail with a
  /// transport error.
  #[derive(Default)]
  pub struct ScriptedTransport {
    replies: Mutex<HashMap<String, Reply>>,
    calls: Mutex<Vec<String>>,
  }

  impl ScriptedTransport {
    pub fn new() -> Arc<Self> {
      Arc::new(Self::default())
    }

    pub fn on(&self, url: &str, reply: Reply) {
      self.replies.lock().insert(url.to_string(), reply);
    }

    pub fn calls(&self) -> Vec<String> {
      self.calls.lock().clone()
    }

    pub fn calls_to(&self, url: &str) -> usize {
      self.calls.lock().iter().filter(|c| c.as_str() == url).count()
    }

    async fn answer(&self, url: &str) -> Reply {
      self.calls.lock().push(url.to_string());
      let mut reply = self.replies.lock().get(url).cloned();
      while let Some(Reply::Delayed(delay, inner)) = reply {
        tokio::time::sleep(delay).await;
        reply = Some(*inner);
      }
      reply.unwrap_or(Reply::Fail(AttemptError::Transport("connection refused".into())))
    }
  }

  impl Transport for ScriptedTransport {
    fn json<'a>(&'a self, url: &'a str, _body: Option<&'a Value>) -> BoxFuture<'a, Result<Value, AttemptError>> {
      async move {
        match self.answer(url).await {
          Reply::Json(v) => Ok(v),
          Reply::Bytes(_) => Err(AttemptError::Decode("not JSON".into())),
          Reply::Fail(e) => Err(e),
          Reply::Delayed(..) => unreachable!(),
        }
      }
      .boxed()
    }

    fn bytes<'a>(&'a self, url: &'a str) -> BoxFuture<'a, Result<Vec<u8>, AttemptError>> {
      async move {
        match self.answer(url).await {
          Reply::Bytes(b) => Ok(b),
          Reply::Json(v) => Ok(v.to_string().into_bytes()),
          Reply::Fail(e) => Err(e),
          Reply::Delayed(..) => unreachable!(),
        }
      }
      .boxed()
    }
  }

  /// A 4x3 PNG.
  pub fn png_bytes() -> Vec<u8> {
    use image::{DynamicImage, ImageFormat};
    let mut buf = Vec::new();
    DynamicImage::new_rgb8(4, 3).write_to(&mut std::io::Cursor::new(&mut buf), ImageFormat::Png).unwrap();
    buf
  }

  pub fn client_for(transport: &Arc<ScriptedTransport>, hosts: &[&str]) -> FailoverClient {
    let hosts = MirrorHosts::new(hosts.iter().map(|h| h.to_string()).collect());
    FailoverClient::new(transport.clone(), hosts, Duration::from_secs(2))
  }
}
