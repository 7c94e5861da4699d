// src/ingest/types.rs
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::ingest::canonical::{canonicalize, host_of};

/// One entry as the source delivered it, before topic tagging and canonicalization.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RawEntry {
    pub title: String,
    pub link: String,
    pub summary: String,
    pub published: Option<DateTime<Utc>>,
    pub id: Option<String>,
}

/// Candidate unit of content for one topic.
///
/// `link` is always canonical (see [`canonicalize`]); build items through
/// [`Item::from_entry`] to keep that true.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Item {
    pub title: String,
    pub link: String, // canonical, empty when the source had none
    pub summary: String,
    pub topic: String,
    pub timestamp: Option<DateTime<Utc>>,
    pub source_weight_key: String,
    pub channel: String,
    pub entry_id: Option<String>,
}

impl Item {
    /// Tag a raw entry with its topic and derive channel / weight key from the source.
    pub fn from_entry(entry: RawEntry, topic: &str, source: &SourceDescriptor) -> Self {
        let link = canonicalize(&entry.link);
        let (channel, weight_key) = match source {
            SourceDescriptor::Handle(h) => (h.clone(), HANDLE_WEIGHT_KEY.to_string()),
            SourceDescriptor::Feed(url) => {
                let host = host_of(&link)
                    .or_else(|| host_of(url))
                    .unwrap_or_else(|| url.clone());
                (host.clone(), host)
            }
        };
        Self {
            title: entry.title,
            link,
            summary: entry.summary,
            topic: topic.to_string(),
            timestamp: entry.published,
            source_weight_key: weight_key,
            channel,
            entry_id: entry.id.filter(|s| !s.trim().is_empty()),
        }
    }

    pub fn has_link(&self) -> bool {
        !self.link.is_empty()
    }
}

/// Weight-table key shared by every handle-based (Telegram mirror) source.
pub const HANDLE_WEIGHT_KEY: &str = "telegram";

/// Where items come from: a direct feed URL, or a channel handle that a
/// [`MirrorExpander`](crate::ingest::mirrors::MirrorExpander) turns into mirror URLs.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum SourceDescriptor {
    Feed(String),
    Handle(String),
}

impl SourceDescriptor {
    /// `@name` and `tg:name` are handles; anything else is a feed URL.
    pub fn parse(raw: &str) -> Self {
        let s = raw.trim();
        if let Some(h) = s.strip_prefix('@').or_else(|| s.strip_prefix("tg:")) {
            SourceDescriptor::Handle(h.trim().to_ascii_lowercase())
        } else {
            SourceDescriptor::Feed(s.to_string())
        }
    }

    /// Key into the fetch cache. Handle sources are ephemeral and have none.
    pub fn cache_key(&self) -> Option<&str> {
        match self {
            SourceDescriptor::Feed(url) => Some(url.as_str()),
            SourceDescriptor::Handle(_) => None,
        }
    }

    pub fn label(&self) -> &str {
        match self {
            SourceDescriptor::Feed(url) => url,
            SourceDescriptor::Handle(h) => h,
        }
    }
}

/// Conditional-fetch tokens remembered per feed (etag / last-modified).
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheTokens {
    #[serde(default)]
    pub etag: Option<String>,
    #[serde(default, rename = "modified")]
    pub last_modified: Option<String>,
}

impl CacheTokens {
    pub fn is_empty(&self) -> bool {
        self.etag.is_none() && self.last_modified.is_none()
    }
}

/// Result of fetching one source. Fetchers never return errors; they return one of these.
#[derive(Debug, Clone, PartialEq)]
pub enum FetchOutcome {
    Fetched {
        entries: Vec<RawEntry>,
        tokens: CacheTokens,
    },
    NotModified,
    Empty,
    Failed(String),
}

#[async_trait::async_trait]
pub trait Fetcher: Send + Sync {
    async fn fetch(&self, source: &SourceDescriptor, tokens: Option<&CacheTokens>)
        -> FetchOutcome;
}
