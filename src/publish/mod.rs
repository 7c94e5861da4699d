// src/publish/mod.rs
//! Publishing selected items: status composition, idempotency keys, publisher seam.
pub mod mastodon;

use async_trait::async_trait;
use chrono::{DateTime, FixedOffset, Offset, Utc};
use serde::{Deserialize, Serialize};

use crate::dedup::short_hash;

pub use mastodon::MastodonPublisher;

pub const DEFAULT_MAX_CHARS: usize = 500;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Visibility {
    Public,
    #[default]
    Unlisted,
    Private,
    Direct,
}

impl Visibility {
    pub fn as_str(self) -> &'static str {
        match self {
            Visibility::Public => "public",
            Visibility::Unlisted => "unlisted",
            Visibility::Private => "private",
            Visibility::Direct => "direct",
        }
    }

    /// Unknown values fall back to `unlisted`.
    pub fn parse(s: &str) -> Self {
        match s.trim().to_ascii_lowercase().as_str() {
            "public" => Visibility::Public,
            "private" => Visibility::Private,
            "direct" => Visibility::Direct,
            _ => Visibility::Unlisted,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct PublishConfig {
    pub instance: String,
    /// Usually supplied through `MASTODON_TOKEN`; empty disables posting.
    pub token: String,
    pub visibility: Visibility,
    /// Pause between consecutive posts of one run.
    pub post_delay_secs: u64,
    /// Offset used for the timestamp in the header and for topic rotation.
    pub utc_offset_hours: i32,
    /// `{topic}` and `{time}` are substituted.
    pub header: String,
    pub time_format: String,
    pub hashtags: Vec<String>,
    /// Used when the instance does not report its limit.
    pub fallback_max_chars: usize,
    /// Failed publishes after which an item is given up on.
    pub max_attempts: u32,
    pub timeout_secs: u64,
    pub retries: u8,
}

impl Default for PublishConfig {
    fn default() -> Self {
        Self {
            instance: "https://mastodon.social".to_string(),
            token: String::new(),
            visibility: Visibility::Unlisted,
            post_delay_secs: 3,
            utc_offset_hours: 3,
            header: "📰 {topic} — {time}".to_string(),
            time_format: "%d.%m.%Y %H:%M".to_string(),
            hashtags: vec!["news".to_string(), "digest".to_string()],
            fallback_max_chars: DEFAULT_MAX_CHARS,
            max_attempts: 3,
            timeout_secs: 30,
            retries: 3,
        }
    }
}

impl PublishConfig {
    pub fn offset(&self) -> FixedOffset {
        FixedOffset::east_opt(self.utc_offset_hours.clamp(-23, 23) * 3600)
            .unwrap_or_else(|| Utc.fix())
    }

    pub fn local_time(&self, now: DateTime<Utc>) -> String {
        now.with_timezone(&self.offset())
            .format(&self.time_format)
            .to_string()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PublishOutcome {
    Posted {
        id: Option<String>,
        url: Option<String>,
    },
    /// Nothing was sent on purpose (no credentials, dry run).
    Skipped(String),
    Failed(String),
}

#[async_trait]
pub trait Publisher: Send + Sync {
    async fn post(&self, text: &str, visibility: Visibility, idempotency_key: &str)
        -> PublishOutcome;

    /// Status length limit of the target instance.
    async fn max_chars(&self) -> usize {
        DEFAULT_MAX_CHARS
    }
}

/// Logs statuses instead of sending them.
pub struct DryRunPublisher {
    pub max_chars: usize,
}

#[async_trait]
impl Publisher for DryRunPublisher {
    async fn post(&self, text: &str, visibility: Visibility, idempotency_key: &str) -> PublishOutcome {
        tracing::info!(visibility = visibility.as_str(), key = %idempotency_key, chars = text.chars().count(), "dry run status:\n{text}");
        PublishOutcome::Skipped("dry run".to_string())
    }

    async fn max_chars(&self) -> usize {
        self.max_chars
    }
}

/// Deterministic key so a rerun after partial failure cannot double-post.
/// `identity` must not depend on the run (no timestamps): the item's primary
/// dedup key, or its summary when it has none.
pub fn idempotency_key(topic: &str, identity: &str) -> String {
    short_hash(&format!("{topic}|{identity}"))
}

fn topic_hashtag(topic: &str) -> String {
    topic.chars().filter(|c| c.is_alphanumeric()).collect()
}

/// Header, summary, link and hashtags; the summary is cut with `…` so the
/// whole status stays within `max_chars` characters.
pub fn compose_status(
    cfg: &PublishConfig,
    topic: &str,
    summary: &str,
    link: &str,
    now: DateTime<Utc>,
    max_chars: usize,
) -> String {
    let header = format!(
        "{}\n\n",
        cfg.header
            .replace("{topic}", topic)
            .replace("{time}", &cfg.local_time(now))
    );

    let mut tags: Vec<String> = Vec::new();
    let own = topic_hashtag(topic);
    if !own.is_empty() {
        tags.push(format!("#{own}"));
    }
    for t in &cfg.hashtags {
        let t = t.trim().trim_start_matches('#');
        if !t.is_empty() && !t.eq_ignore_ascii_case(&own) {
            tags.push(format!("#{t}"));
        }
    }

    let mut footer = String::new();
    if !link.is_empty() {
        footer.push_str("\n\n");
        footer.push_str(link);
    }
    if !tags.is_empty() {
        footer.push_str("\n\n");
        footer.push_str(&tags.join(" "));
    }

    let body = summary.trim();
    let fixed = header.chars().count() + footer.chars().count();
    if fixed + body.chars().count() <= max_chars {
        return format!("{header}{body}{footer}");
    }

    let allowed = max_chars.saturating_sub(fixed + 1);
    let core = if allowed > 0 {
        let cut: String = body.chars().take(allowed).collect();
        format!("{}…", cut.trim_end())
    } else {
        String::new()
    };
    format!("{header}{core}{footer}")
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 6, 10, 9, 30, 0).unwrap()
    }

    #[test]
    fn header_uses_offset_time() {
        let cfg = PublishConfig::default();
        let s = compose_status(&cfg, "markets", "Body.", "https://a.test/x", now(), 500);
        assert!(s.starts_with("📰 markets — 10.06.2025 12:30\n\nBody."));
        assert!(s.contains("\n\nhttps://a.test/x\n\n#markets #news #digest"));
    }

    #[test]
    fn long_summary_is_truncated_to_limit() {
        let cfg = PublishConfig::default();
        let body = "word ".repeat(200);
        let s = compose_status(&cfg, "geo", &body, "https://a.test/x", now(), 300);
        assert!(s.chars().count() <= 300);
        assert!(s.contains('…'));
        assert!(s.ends_with("#geo #news #digest"));
    }

    #[test]
    fn idempotency_key_is_stable() {
        let a = idempotency_key("t", "https://a.test/x");
        assert_eq!(a, idempotency_key("t", "https://a.test/x"));
        assert_ne!(a, idempotency_key("u", "https://a.test/x"));
        assert_eq!(a.len(), 16);
    }

    #[test]
    fn visibility_parse_defaults_to_unlisted() {
        assert_eq!(Visibility::parse("PUBLIC"), Visibility::Public);
        assert_eq!(Visibility::parse("weird"), Visibility::Unlisted);
    }
}
