//! WebSocket feed of server-side changes, republished on a
//! [`LiveEventChannel`].
//!
//! The server pushes one JSON message per change:
//!
//! ```json
//! { "type": "updated", "resource": "spool", "date": "...", "payload": { "id": 4, ... } }
//! ```

use std::time::Duration;

use anyhow::{Context, Result, anyhow};
use chrono::{DateTime, NaiveDateTime, Utc};
use futures_util::StreamExt;
use serde::Deserialize;
use serde_json::Value;
use spool_core::{ChangeEvent, ChangeKind, EntityType, LiveEventChannel};
use tokio::task::JoinHandle;
use tokio_tungstenite::{connect_async, tungstenite::Message};
use tracing::{debug, info, warn};

const INITIAL_BACKOFF: Duration = Duration::from_secs(1);
const MAX_BACKOFF: Duration = Duration::from_secs(30);

#[derive(Debug, Deserialize)]
#[serde(rename_all = "lowercase")]
enum WireKind {
  Added,
  Updated,
  Deleted,
}

#[derive(Debug, Deserialize)]
struct WireEvent {
  #[serde(rename = "type")]
  kind:     WireKind,
  resource: String,
  #[serde(default)]
  date:     Option<String>,
  #[serde(default)]
  payload:  Option<Value>,
}

/// Server timestamps may or may not carry an offset; offset-less ones are UTC.
fn parse_date(raw: &str) -> Option<DateTime<Utc>> {
  DateTime::parse_from_rfc3339(raw)
    .map(|d| d.with_timezone(&Utc))
    .or_else(|_| NaiveDateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M:%S%.f").map(|n| n.and_utc()))
    .ok()
}

/// Decode one text frame into a [`ChangeEvent`].
pub fn decode(text: &str) -> Result<ChangeEvent<Value>> {
  let wire: WireEvent = serde_json::from_str(text).context("decoding live event")?;
  let kind = match wire.kind {
    WireKind::Added => ChangeKind::Created,
    WireKind::Updated => ChangeKind::Updated,
    WireKind::Deleted => ChangeKind::Deleted,
  };
  let entity_id = match wire.payload.as_ref().and_then(|p| p.get("id")) {
    Some(Value::Number(n)) => n.to_string(),
    Some(Value::String(s)) => s.clone(),
    _ => return Err(anyhow!("live {} event without an id", wire.resource)),
  };

  let mut event = ChangeEvent::new(kind, EntityType::new(wire.resource), entity_id);
  if let Some(at) = wire.date.as_deref().and_then(parse_date) {
    event = event.at(at);
  }
  if let Some(payload) = wire.payload {
    event = event.with_payload(payload);
  }
  Ok(event)
}

/// `http(s)://host/...` → `ws(s)://host/.../api/v1/`
pub fn feed_url(base_url: &str) -> String {
  let base = base_url.trim_end_matches('/');
  let ws = if let Some(rest) = base.strip_prefix("https://") {
    format!("wss://{rest}")
  } else if let Some(rest) = base.strip_prefix("http://") {
    format!("ws://{rest}")
  } else {
    base.to_string()
  };
  format!("{ws}/api/v1/")
}

/// Reconnect delay: doubles after every failure up to [`MAX_BACKOFF`].
#[derive(Debug)]
struct Backoff {
  next: Duration,
}

impl Backoff {
  fn new() -> Self { Self { next: INITIAL_BACKOFF } }

  /// Delay after a failed attempt.
  fn failed(&mut self) -> Duration {
    let delay = self.next;
    self.next = (self.next * 2).min(MAX_BACKOFF);
    delay
  }

  /// Delay after a clean close; the next failure starts over.
  fn closed(&mut self) -> Duration {
    self.next = INITIAL_BACKOFF;
    INITIAL_BACKOFF
  }
}

/// Run the feed until the task is aborted, reconnecting with back-off.
pub fn spawn(base_url: &str, channel: LiveEventChannel<Value>) -> JoinHandle<()> {
  let url = feed_url(base_url);
  tokio::spawn(async move {
    let mut backoff = Backoff::new();
    loop {
      let delay = match connect(&url, &channel).await {
        Ok(()) => {
          info!(%url, "live feed closed by server");
          backoff.closed()
        }
        Err(e) => {
          warn!(%url, "live feed error: {e:#}");
          backoff.failed()
        }
      };
      tokio::time::sleep(delay).await;
    }
  })
}

async fn connect(url: &str, channel: &LiveEventChannel<Value>) -> Result<()> {
  let (mut stream, _) = connect_async(url)
    .await
    .with_context(|| format!("connecting to {url}"))?;
  info!(%url, "live feed connected");

  while let Some(message) = stream.next().await {
    match message.context("reading live feed")? {
      Message::Text(text) => match decode(&text) {
        Ok(event) => {
          debug!(
            kind = ?event.kind,
            entity_type = %event.entity_type,
            id = %event.entity_id,
            "live event"
          );
          channel.publish(event);
        }
        Err(e) => warn!("ignoring live message: {e:#}"),
      },
      Message::Close(_) => break,
      _ => {}
    }
  }
  Ok(())
}
