// src/summarize.rs
//! Item summaries for published statuses.
//!
//! - [`LocalSummarizer`]: extractive, zero cost (title + leading sentences).
//! - [`ChatSummarizer`]: OpenAI-compatible chat completions (Groq by default),
//!   falling back to the local summary on any failure.
//! - [`build_summarizer`] picks one from [`SummarizerConfig`].

use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;

use crate::config::SummarizerConfig;
use crate::ingest::normalize_text;
use crate::ingest::types::Item;

/// Context handed to remote models is capped at this many characters.
const MAX_CONTEXT_CHARS: usize = 4000;

#[async_trait]
pub trait Summarizer: Send + Sync {
    /// Never fails; implementations degrade to an extractive summary.
    async fn summarize(&self, item: &Item) -> String;
    fn name(&self) -> &'static str;
}

/// Prompt text for one item: title, summary and link on separate lines.
pub fn item_context(item: &Item) -> String {
    let mut s = normalize_text(&item.title, 300);
    let summary = normalize_text(&item.summary, MAX_CONTEXT_CHARS);
    if !summary.is_empty() {
        s.push('\n');
        s.push_str(&summary);
    }
    if item.has_link() {
        s.push('\n');
        s.push_str(&item.link);
    }
    s.chars().take(MAX_CONTEXT_CHARS).collect()
}

pub struct LocalSummarizer {
    max_chars: usize,
}

impl LocalSummarizer {
    pub fn new(max_chars: usize) -> Self {
        Self {
            max_chars: max_chars.max(1),
        }
    }

    pub fn summarize_now(&self, item: &Item) -> String {
        let title = normalize_text(&item.title, self.max_chars);
        let summary = normalize_text(&item.summary, 2000);

        let mut out = String::new();
        if !title.is_empty() {
            out.push_str(title.trim_end_matches('.'));
            out.push('.');
        }
        for sentence in sentences(&summary) {
            // skip a summary that merely repeats the title
            if sentence.trim_end_matches('.').eq_ignore_ascii_case(title.trim_end_matches('.')) {
                continue;
            }
            let candidate_len = out.chars().count() + 1 + sentence.chars().count();
            if !out.is_empty() && candidate_len > self.max_chars {
                break;
            }
            if !out.is_empty() {
                out.push(' ');
            }
            out.push_str(sentence);
        }
        cap_chars(&out, self.max_chars)
    }
}

impl Default for LocalSummarizer {
    fn default() -> Self {
        Self::new(280)
    }
}

#[async_trait]
impl Summarizer for LocalSummarizer {
    async fn summarize(&self, item: &Item) -> String {
        self.summarize_now(item)
    }

    fn name(&self) -> &'static str {
        "local"
    }
}

/// Split after `.`, `!` or `?` followed by whitespace.
fn sentences(text: &str) -> Vec<&str> {
    let mut out = Vec::new();
    let mut start = 0;
    let mut chars = text.char_indices().peekable();
    while let Some((i, c)) = chars.next() {
        if matches!(c, '.' | '!' | '?') {
            let end = i + c.len_utf8();
            if chars.peek().map_or(true, |(_, n)| n.is_whitespace()) {
                let s = text[start..end].trim();
                if !s.is_empty() {
                    out.push(s);
                }
                start = end;
            }
        }
    }
    let rest = text[start..].trim();
    if !rest.is_empty() {
        out.push(rest);
    }
    out
}

fn cap_chars(s: &str, max: usize) -> String {
    if s.chars().count() <= max {
        return s.to_string();
    }
    let cut: String = s.chars().take(max.saturating_sub(1)).collect();
    format!("{}…", cut.trim_end())
}

pub struct ChatSummarizer {
    http: Client,
    endpoint: String,
    api_key: String,
    model: String,
    system_prompt: String,
    max_output_tokens: u32,
    max_retries: u32,
    fallback: LocalSummarizer,
}

#[derive(Serialize)]
struct Msg<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<Msg<'a>>,
    temperature: f32,
    max_completion_tokens: u32,
}

#[derive(Deserialize)]
struct ChatResponse {
    #[serde(default)]
    choices: Vec<Choice>,
}

#[derive(Deserialize)]
struct Choice {
    message: ChoiceMsg,
}

#[derive(Deserialize)]
struct ChoiceMsg {
    #[serde(default)]
    content: String,
}

impl ChatSummarizer {
    pub fn new(cfg: &SummarizerConfig) -> anyhow::Result<Self> {
        use anyhow::Context;
        let http = Client::builder()
            .connect_timeout(Duration::from_secs(5))
            .timeout(Duration::from_secs(cfg.timeout_secs.max(1)))
            .build()
            .context("building summarizer http client")?;
        Ok(Self {
            http,
            endpoint: cfg.endpoint.clone(),
            api_key: cfg.api_key.clone(),
            model: cfg.model.clone(),
            system_prompt: cfg.system_prompt.clone(),
            max_output_tokens: cfg.max_output_tokens,
            max_retries: cfg.max_retries.max(1),
            fallback: LocalSummarizer::new(cfg.local_max_chars),
        })
    }

    async fn remote(&self, context: &str) -> Option<String> {
        let req = ChatRequest {
            model: &self.model,
            messages: vec![
                Msg {
                    role: "system",
                    content: &self.system_prompt,
                },
                Msg {
                    role: "user",
                    content: context,
                },
            ],
            temperature: 0.0,
            max_completion_tokens: self.max_output_tokens,
        };

        for attempt in 1..=self.max_retries {
            let res = self
                .http
                .post(&self.endpoint)
                .bearer_auth(&self.api_key)
                .json(&req)
                .send()
                .await;
            let rsp = match res {
                Ok(r) => r,
                Err(e) => {
                    tracing::warn!(error = ?e, attempt, "summarizer request failed");
                    if attempt < self.max_retries {
                        tokio::time::sleep(Duration::from_millis(500)).await;
                    }
                    continue;
                }
            };
            if rsp.status() == StatusCode::TOO_MANY_REQUESTS {
                let wait = retry_after_secs(rsp.headers());
                tracing::warn!(attempt, wait, "summarizer rate limited");
                if attempt < self.max_retries {
                    tokio::time::sleep(Duration::from_secs(wait)).await;
                }
                continue;
            }
            if !rsp.status().is_success() {
                let status = rsp.status();
                let body = rsp.text().await.unwrap_or_default();
                let snippet: String = body.chars().take(200).collect();
                tracing::warn!(%status, body = %snippet, "summarizer error response");
                return None;
            }
            let body: ChatResponse = match rsp.json().await {
                Ok(b) => b,
                Err(e) => {
                    tracing::warn!(error = ?e, "summarizer response unreadable");
                    return None;
                }
            };
            let text = body
                .choices
                .into_iter()
                .next()
                .map(|c| c.message.content.trim().to_string())
                .unwrap_or_default();
            return (!text.is_empty()).then_some(text);
        }
        None
    }
}

/// `Retry-After` seconds clamped to 1..=5; 2 when absent or unparsable.
fn retry_after_secs(headers: &reqwest::header::HeaderMap) -> u64 {
    headers
        .get(reqwest::header::RETRY_AFTER)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.trim().parse::<u64>().ok())
        .unwrap_or(2)
        .clamp(1, 5)
}

#[async_trait]
impl Summarizer for ChatSummarizer {
    async fn summarize(&self, item: &Item) -> String {
        match self.remote(&item_context(item)).await {
            Some(text) => text,
            None => {
                tracing::info!(title = %item.title, "using local summary");
                self.fallback.summarize_now(item)
            }
        }
    }

    fn name(&self) -> &'static str {
        "chat"
    }
}

/// Remote summarizer when a key is configured, local otherwise.
pub fn build_summarizer(cfg: &SummarizerConfig) -> Arc<dyn Summarizer> {
    if cfg.has_remote() {
        match ChatSummarizer::new(cfg) {
            Ok(s) => return Arc::new(s),
            Err(e) => tracing::warn!(error = ?e, "remote summarizer unavailable"),
        }
    }
    Arc::new(LocalSummarizer::new(cfg.local_max_chars))
}
