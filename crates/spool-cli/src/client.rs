//! Async HTTP client for the inventory JSON API, and the page fetchers built
//! on it.

use std::{future::Future, time::Duration};

use anyhow::{Context, Result, anyhow};
use reqwest::Client;
use serde_json::Value;
use spool_core::{FetchError, Page, PageFetcher, PageRequest};

/// Header carrying the total number of matching records.
const TOTAL_COUNT_HEADER: &str = "x-total-count";

/// Connection settings for the inventory API.
#[derive(Debug, Clone)]
pub struct ApiConfig {
  pub base_url: String,
  pub timeout:  Duration,
}

/// Async HTTP client for the `/api/v1` REST API.
///
/// Cheap to clone: the inner [`reqwest::Client`] is `Arc`-based.
#[derive(Clone)]
pub struct ApiClient {
  client: Client,
  config: ApiConfig,
}

impl ApiClient {
  pub fn new(config: ApiConfig) -> Result<Self> {
    let client = Client::builder()
      .timeout(config.timeout)
      .build()
      .context("failed to build HTTP client")?;
    Ok(Self { client, config })
  }

  pub fn base_url(&self) -> &str { self.config.base_url.trim_end_matches('/') }

  fn url(&self, path: &str) -> String { format!("{}/api/v1{}", self.base_url(), path) }

  /// `GET /api/v1/<resource>?limit=<n>&offset=<m>[&sort=<field:dir,...>][&<field>=<v,...>]`
  pub async fn list_page(&self, resource: &str, request: &PageRequest) -> Result<Page<Value>> {
    let path = format!("/{resource}");
    let resp = self
      .client
      .get(self.url(&path))
      .query(&page_params(request))
      .send()
      .await
      .with_context(|| format!("GET {path} failed"))?;

    if !resp.status().is_success() {
      return Err(anyhow!("GET {path} → {}", resp.status()));
    }

    let header_total = resp
      .headers()
      .get(TOTAL_COUNT_HEADER)
      .and_then(|v| v.to_str().ok())
      .and_then(|v| v.parse::<u64>().ok());

    let records: Vec<Value> = resp
      .json()
      .await
      .with_context(|| format!("deserialising {resource} page"))?;

    // Without the header the best available bound is what has been served so
    // far, plus one more page if this one came back full.
    let total = header_total.unwrap_or_else(|| {
      let served = request.offset() + records.len() as u64;
      if records.len() as u32 == request.page_size {
        served + 1
      } else {
        served
      }
    });

    Ok(Page { records, total })
  }
}

/// Query parameters for one page request.
fn page_params(request: &PageRequest) -> Vec<(String, String)> {
  let mut params = vec![
    ("limit".to_string(), request.page_size.to_string()),
    ("offset".to_string(), request.offset().to_string()),
  ];
  if !request.sorter.is_empty() {
    let sort = request
      .sorter
      .iter()
      .map(|s| format!("{}:{}", s.field, s.direction.as_str()))
      .collect::<Vec<_>>()
      .join(",");
    params.push(("sort".to_string(), sort));
  }
  for condition in &request.filter {
    params.push((condition.field.clone(), condition.values.join(",")));
  }
  params
}

// ─── Page fetcher ─────────────────────────────────────────────────────────────

/// [`PageFetcher`] for one API resource (`spool`, `filament`, `vendor`).
#[derive(Clone)]
pub struct HttpPageFetcher {
  client:   ApiClient,
  resource: &'static str,
}

impl HttpPageFetcher {
  pub fn new(client: ApiClient, resource: &'static str) -> Self { Self { client, resource } }
}

impl PageFetcher for HttpPageFetcher {
  type Raw = Value;

  fn fetch<'a>(
    &'a self,
    request: &'a PageRequest,
  ) -> impl Future<Output = Result<Page<Value>, FetchError>> + Send + 'a {
    async move {
      self
        .client
        .list_page(self.resource, request)
        .await
        .map_err(|e| FetchError::Transient(format!("{e:#}")))
    }
  }
}
