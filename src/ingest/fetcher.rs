// src/ingest/fetcher.rs
//! HTTP fetcher: one source per call, bounded retries, conditional GET,
//! randomized mirror fallback for handle sources. Never returns an error.
use anyhow::{Context, Result};
use async_trait::async_trait;
use rand::seq::SliceRandom;
use reqwest::header::{ETAG, IF_MODIFIED_SINCE, IF_NONE_MATCH, LAST_MODIFIED};
use reqwest::{Client, StatusCode};
use serde::Deserialize;
use std::sync::Arc;
use std::time::Duration;

use crate::ingest::feed::parse_feed;
use crate::ingest::mirrors::{MirrorExpander, TemplateMirrors, DEFAULT_MIRROR_TEMPLATES};
use crate::ingest::types::{CacheTokens, FetchOutcome, Fetcher, SourceDescriptor};

/// Some feeds refuse default client identifiers.
pub const BROWSER_USER_AGENT: &str =
    "Mozilla/5.0 (X11; Linux x86_64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/124.0 Safari/537.36";

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct FetchConfig {
    /// Concurrent fetches per topic.
    pub pool_size: usize,
    /// Per-attempt request timeout.
    pub timeout_secs: u64,
    /// Extra attempts after a 5xx or transport failure.
    pub retries: u32,
    pub backoff_ms: u64,
    /// Wall-clock budget for all fetches of one topic.
    pub topic_deadline_secs: u64,
    pub max_entries_per_source: usize,
    pub user_agent: String,
    /// Mirror URL templates for handle sources (`{handle}` placeholder).
    pub mirrors: Vec<String>,
}

impl Default for FetchConfig {
    fn default() -> Self {
        Self {
            pool_size: 10,
            timeout_secs: 12,
            retries: 2,
            backoff_ms: 500,
            topic_deadline_secs: 25,
            max_entries_per_source: 50,
            user_agent: BROWSER_USER_AGENT.to_string(),
            mirrors: DEFAULT_MIRROR_TEMPLATES.iter().map(|s| s.to_string()).collect(),
        }
    }
}

pub struct HttpFetcher {
    client: Client,
    expander: Arc<dyn MirrorExpander>,
    retries: u32,
    backoff: Duration,
    max_entries: usize,
}

impl HttpFetcher {
    pub fn new(cfg: &FetchConfig, expander: Arc<dyn MirrorExpander>) -> Result<Self> {
        let client = Client::builder()
            .user_agent(cfg.user_agent.as_str())
            .connect_timeout(Duration::from_secs(cfg.timeout_secs.clamp(1, 10)))
            .timeout(Duration::from_secs(cfg.timeout_secs.max(1)))
            .build()
            .context("failed to build reqwest client")?;
        Ok(Self {
            client,
            expander,
            retries: cfg.retries,
            backoff: Duration::from_millis(cfg.backoff_ms),
            max_entries: cfg.max_entries_per_source.max(1),
        })
    }

    /// Fetcher whose handle expansion uses the configured templates.
    pub fn from_config(cfg: &FetchConfig) -> Result<Self> {
        let mirrors = Arc::new(TemplateMirrors::new(cfg.mirrors.clone()));
        Self::new(cfg, mirrors)
    }

    async fn fetch_url(&self, url: &str, tokens: Option<&CacheTokens>) -> FetchOutcome {
        let attempts = self.retries + 1;
        let mut last_error = String::from("no attempt made");

        for attempt in 1..=attempts {
            if attempt > 1 {
                tracing::debug!(%url, attempt, "retrying feed fetch");
                tokio::time::sleep(self.backoff).await;
            }

            let mut req = self.client.get(url);
            if let Some(t) = tokens {
                if let Some(etag) = &t.etag {
                    req = req.header(IF_NONE_MATCH, etag);
                }
                if let Some(modified) = &t.last_modified {
                    req = req.header(IF_MODIFIED_SINCE, modified);
                }
            }

            let resp = match req.send().await {
                Ok(r) => r,
                Err(e) => {
                    // timeouts and connection resets are worth another try
                    last_error = format!("network error: {e}");
                    continue;
                }
            };

            let status = resp.status();
            if status == StatusCode::NOT_MODIFIED {
                return FetchOutcome::NotModified;
            }
            if status.is_server_error() {
                last_error = format!("server error: {status}");
                continue;
            }
            if !status.is_success() {
                return FetchOutcome::Failed(format!("http status {status}"));
            }

            let new_tokens = CacheTokens {
                etag: header_string(&resp, ETAG),
                last_modified: header_string(&resp, LAST_MODIFIED),
            };
            let body = match resp.text().await {
                Ok(b) => b,
                Err(e) => {
                    last_error = format!("reading body: {e}");
                    continue;
                }
            };
            return match parse_feed(&body, self.max_entries) {
                Ok(entries) if entries.is_empty() => FetchOutcome::Empty,
                Ok(entries) => FetchOutcome::Fetched {
                    entries,
                    tokens: new_tokens,
                },
                Err(e) => FetchOutcome::Failed(format!("malformed feed: {e}")),
            };
        }

        FetchOutcome::Failed(last_error)
    }

    async fn fetch_handle(&self, handle: &str) -> FetchOutcome {
        let mut mirrors = self.expander.expand(handle);
        mirrors.shuffle(&mut rand::rng());

        for url in mirrors {
            match self.fetch_url(&url, None).await {
                FetchOutcome::Fetched { entries, .. } if !entries.is_empty() => {
                    tracing::debug!(%handle, mirror = %url, entries = entries.len(), "mirror hit");
                    // handle sources are ephemeral: no conditional tokens kept
                    return FetchOutcome::Fetched {
                        entries,
                        tokens: CacheTokens::default(),
                    };
                }
                other => {
                    tracing::debug!(%handle, mirror = %url, outcome = ?other, "mirror miss");
                }
            }
        }
        FetchOutcome::Empty
    }
}

fn header_string(resp: &reqwest::Response, name: reqwest::header::HeaderName) -> Option<String> {
    resp.headers()
        .get(name)
        .and_then(|v| v.to_str().ok())
        .map(|s| s.to_string())
}

#[async_trait]
impl Fetcher for HttpFetcher {
    async fn fetch(
        &self,
        source: &SourceDescriptor,
        tokens: Option<&CacheTokens>,
    ) -> FetchOutcome {
        match source {
            SourceDescriptor::Feed(url) => self.fetch_url(url, tokens).await,
            SourceDescriptor::Handle(handle) => self.fetch_handle(handle).await,
        }
    }
}
