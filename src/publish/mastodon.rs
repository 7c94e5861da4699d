use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::Deserialize;
use std::time::Duration;

use super::{PublishConfig, PublishOutcome, Publisher, Visibility};

/// Posts statuses to a Mastodon instance.
#[derive(Clone)]
pub struct MastodonPublisher {
    instance: String,
    token: String,
    client: Client,
    timeout: Duration,
    max_retries: u8,
    fallback_max_chars: usize,
}

#[derive(Deserialize)]
struct StatusResponse {
    id: Option<String>,
    url: Option<String>,
}

#[derive(Deserialize, Default)]
struct InstanceInfo {
    #[serde(default)]
    configuration: InstanceConfiguration,
}

#[derive(Deserialize, Default)]
struct InstanceConfiguration {
    #[serde(default)]
    statuses: StatusLimits,
}

#[derive(Deserialize, Default)]
struct StatusLimits {
    max_characters: Option<usize>,
}

impl MastodonPublisher {
    pub fn new(instance: impl Into<String>, token: impl Into<String>) -> Self {
        Self {
            instance: instance.into().trim_end_matches('/').to_string(),
            token: token.into().trim().to_string(),
            client: Client::new(),
            timeout: Duration::from_secs(30),
            max_retries: 3,
            fallback_max_chars: super::DEFAULT_MAX_CHARS,
        }
    }

    pub fn from_config(cfg: &PublishConfig) -> Self {
        Self::new(cfg.instance.clone(), cfg.token.clone())
            .with_timeout(cfg.timeout_secs)
            .with_retries(cfg.retries)
            .with_fallback_max_chars(cfg.fallback_max_chars)
    }

    pub fn with_timeout(mut self, secs: u64) -> Self {
        self.timeout = Duration::from_secs(secs);
        self
    }

    pub fn with_retries(mut self, retries: u8) -> Self {
        self.max_retries = retries.max(1);
        self
    }

    pub fn with_fallback_max_chars(mut self, n: usize) -> Self {
        self.fallback_max_chars = n;
        self
    }

    pub fn has_token(&self) -> bool {
        !self.token.is_empty()
    }

    async fn backoff(attempt: u8) {
        tokio::time::sleep(backoff_delay(attempt)).await;
    }
}

/// 500 ms doubling per attempt, capped at 32 s.
fn backoff_delay(attempt: u8) -> Duration {
    let exp = attempt.saturating_sub(1).min(6);
    Duration::from_millis(500u64 << exp)
}

fn retryable(status: StatusCode) -> bool {
    status.is_server_error() || status == StatusCode::TOO_MANY_REQUESTS
}

#[async_trait]
impl Publisher for MastodonPublisher {
    async fn post(&self, text: &str, visibility: Visibility, idempotency_key: &str) -> PublishOutcome {
        if !self.has_token() {
            return PublishOutcome::Skipped("no access token".to_string());
        }
        let url = format!("{}/api/v1/statuses", self.instance);
        let form = [("status", text), ("visibility", visibility.as_str())];

        let mut attempt: u8 = 0;
        loop {
            attempt += 1;
            let res = self
                .client
                .post(&url)
                .timeout(self.timeout)
                .bearer_auth(&self.token)
                .header("Idempotency-Key", idempotency_key)
                .form(&form)
                .send()
                .await;

            match res {
                Ok(rsp) if rsp.status().is_success() => {
                    return match rsp.json::<StatusResponse>().await {
                        Ok(body) => PublishOutcome::Posted {
                            id: body.id,
                            url: body.url,
                        },
                        Err(e) => {
                            tracing::debug!(error = ?e, "status posted, response body unreadable");
                            PublishOutcome::Posted { id: None, url: None }
                        }
                    };
                }
                Ok(rsp) => {
                    let status = rsp.status();
                    if retryable(status) && attempt < self.max_retries {
                        tracing::warn!(%status, attempt, "mastodon post failed, retrying");
                        Self::backoff(attempt).await;
                        continue;
                    }
                    let body = rsp.text().await.unwrap_or_default();
                    let snippet: String = body.chars().take(200).collect();
                    return PublishOutcome::Failed(format!("HTTP {status}: {snippet}"));
                }
                Err(e) => {
                    if attempt < self.max_retries {
                        tracing::warn!(error = ?e, attempt, "mastodon request error, retrying");
                        Self::backoff(attempt).await;
                        continue;
                    }
                    return PublishOutcome::Failed(format!("request failed: {e}"));
                }
            }
        }
    }

    /// `configuration.statuses.max_characters` of `/api/v2/instance`, or the fallback.
    async fn max_chars(&self) -> usize {
        let url = format!("{}/api/v2/instance", self.instance);
        let mut req = self.client.get(&url).timeout(self.timeout);
        if self.has_token() {
            req = req.bearer_auth(&self.token);
        }
        let limit = match req.send().await {
            Ok(rsp) if rsp.status().is_success() => rsp
                .json::<InstanceInfo>()
                .await
                .ok()
                .and_then(|i| i.configuration.statuses.max_characters),
            Ok(rsp) => {
                tracing::debug!(status = %rsp.status(), "instance info unavailable");
                None
            }
            Err(e) => {
                tracing::debug!(error = ?e, "instance info request failed");
                None
            }
        };
        limit.filter(|n| *n > 0).unwrap_or(self.fallback_max_chars)
    }
}
