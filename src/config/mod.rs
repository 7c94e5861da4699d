// src/config/mod.rs
//! Application configuration: TOML file + environment overlay.
pub mod ai;

use anyhow::{anyhow, Context, Result};
use chrono::{DateTime, Timelike, Utc};
use serde::Deserialize;
use std::collections::{BTreeMap, HashMap};
use std::fs;
use std::path::{Path, PathBuf};

use crate::analyze::{ScoringConfig, SelectionConfig};
use crate::ingest::fetcher::FetchConfig;
use crate::ingest::types::SourceDescriptor;
use crate::publish::{PublishConfig, Visibility};
use crate::source_weights::SourceWeightsConfig;

pub use ai::SummarizerConfig;

const ENV_PATH: &str = "DIGEST_CONFIG";
const DEFAULT_PATH: &str = "config/digest.toml";

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct TopicConfig {
    pub name: String,
    /// Items per run when no rotation slot overrides it.
    pub quota: usize,
    pub sources: Vec<String>,
    /// Fetched only when the primary sources left the topic thin.
    pub reserve_sources: Vec<String>,
    pub keywords: BTreeMap<String, f32>,
}

impl TopicConfig {
    pub fn primary(&self) -> Vec<SourceDescriptor> {
        parse_sources(&self.sources)
    }

    pub fn reserve(&self) -> Vec<SourceDescriptor> {
        parse_sources(&self.reserve_sources)
    }
}

fn parse_sources(raw: &[String]) -> Vec<SourceDescriptor> {
    raw.iter()
        .map(|s| s.trim())
        .filter(|s| !s.is_empty())
        .map(SourceDescriptor::parse)
        .collect()
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub state_path: PathBuf,
    pub seen_ttl_hours: u64,
    pub fetch: FetchConfig,
    pub selection: SelectionConfig,
    pub scoring: ScoringConfig,
    pub source_weights: SourceWeightsConfig,
    pub topics: Vec<TopicConfig>,
    /// Slots of topic → quota; the active slot is `local_hour % len`.
    pub rotation: Vec<BTreeMap<String, usize>>,
    pub publish: PublishConfig,
    pub summarizer: SummarizerConfig,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            state_path: PathBuf::from("data/state.json"),
            seen_ttl_hours: 72,
            fetch: FetchConfig::default(),
            selection: SelectionConfig::default(),
            scoring: ScoringConfig::default(),
            source_weights: SourceWeightsConfig::default(),
            topics: default_topics(),
            rotation: Vec::new(),
            publish: PublishConfig::default(),
            summarizer: SummarizerConfig::default(),
        }
    }
}

fn default_topics() -> Vec<TopicConfig> {
    let kw = |pairs: &[(&str, f32)]| {
        pairs
            .iter()
            .map(|(k, w)| (k.to_string(), *w))
            .collect::<BTreeMap<_, _>>()
    };
    vec![
        TopicConfig {
            name: "geopolitics".into(),
            quota: 2,
            sources: vec![
                "https://thediplomat.com/feed/".into(),
                "https://rss.nytimes.com/services/xml/rss/nyt/World.xml".into(),
            ],
            reserve_sources: vec!["https://feeds.bbci.co.uk/news/world/rss.xml".into()],
            keywords: kw(&[("sanctions", 0.6), ("summit", 0.5), ("ceasefire", 0.7)]),
        },
        TopicConfig {
            name: "markets".into(),
            quota: 2,
            sources: vec![
                "https://feeds.reuters.com/reuters/businessNews".into(),
                "https://feeds.marketwatch.com/marketwatch/topstories/".into(),
            ],
            reserve_sources: vec!["https://www.cnbc.com/id/100003114/device/rss/rss.html".into()],
            keywords: kw(&[("rates", 0.5), ("inflation", 0.6), ("earnings", 0.4)]),
        },
    ]
}

impl AppConfig {
    /// Load from an explicit TOML path; missing keys take their defaults.
    pub fn load_from(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)
            .with_context(|| format!("reading config from {}", path.display()))?;
        let cfg: AppConfig = toml::from_str(&content)
            .with_context(|| format!("parsing config {}", path.display()))?;
        Ok(cfg)
    }

    /// Load using env var + fallbacks:
    /// 1) $DIGEST_CONFIG
    /// 2) config/digest.toml
    /// 3) built-in defaults
    pub fn load_default() -> Result<Self> {
        if let Ok(p) = std::env::var(ENV_PATH) {
            let pb = PathBuf::from(p);
            if pb.exists() {
                return Self::load_from(&pb);
            }
            return Err(anyhow!("{ENV_PATH} points to non-existent path"));
        }
        let p = PathBuf::from(DEFAULT_PATH);
        if p.exists() {
            return Self::load_from(&p);
        }
        Ok(Self::default())
    }

    /// Overlay deployment settings and secrets from the environment.
    pub fn apply_env(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        let get = |k: &str| lookup(k).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());

        if let Some(v) = get("MASTODON_INSTANCE") {
            self.publish.instance = v;
        }
        if let Some(v) = get("MASTODON_TOKEN") {
            self.publish.token = v;
        }
        if let Some(v) = get("MASTODON_VISIBILITY") {
            self.publish.visibility = Visibility::parse(&v);
        }
        if let Some(v) = get("STATE_PATH") {
            self.state_path = PathBuf::from(v);
        }
        if let Some(v) = get("GROQ_MODEL") {
            self.summarizer.model = v;
        }
        if let Some(v) = get("GROQ_MAX_OUTPUT_TOKENS") {
            match v.parse::<u32>() {
                Ok(n) if n > 0 => self.summarizer.max_output_tokens = n,
                _ => tracing::warn!(value = %v, "ignoring invalid GROQ_MAX_OUTPUT_TOKENS"),
            }
        }
        self.summarizer.resolve_api_key(&lookup);
    }

    /// Topic quotas for the run starting at `now`, in topic order, zero quotas dropped.
    pub fn resolve_quotas(&self, now: DateTime<Utc>) -> Vec<(String, usize)> {
        let slot = if self.rotation.is_empty() {
            None
        } else {
            let hour = now.with_timezone(&self.publish.offset()).hour() as usize;
            Some(&self.rotation[hour % self.rotation.len()])
        };
        self.topics
            .iter()
            .map(|t| {
                let quota = slot
                    .map(|s| s.get(&t.name).copied().unwrap_or(0))
                    .unwrap_or(t.quota);
                (t.name.clone(), quota)
            })
            .filter(|(_, q)| *q > 0)
            .collect()
    }

    pub fn topic(&self, name: &str) -> Option<&TopicConfig> {
        self.topics.iter().find(|t| t.name == name)
    }

    /// Topic → keyword weights, in the shape the scorer takes.
    pub fn keyword_map(&self) -> HashMap<String, Vec<(String, f32)>> {
        self.topics
            .iter()
            .map(|t| {
                let kws = t.keywords.iter().map(|(k, w)| (k.clone(), *w)).collect();
                (t.name.clone(), kws)
            })
            .collect()
    }
}
