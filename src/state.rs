// src/state.rs
//! Persisted run state: the seen-key map and per-feed conditional-fetch tokens.
//!
//! JSON shape:
//! {
//!   "feeds": { "<feed url>": { "etag": "...", "modified": "..." } },
//!   "seen":  { "<dedup key>": "2025-06-10T08:00:00Z" },
//!   "attempts": { "<dedup key>": { "count": 1, "since": "2025-06-10T08:00:00Z" } }
//! }
//!
//! Loading never fails: a missing, empty, truncated or otherwise invalid file
//! yields the empty state. Saving writes a temp file and renames it over the target.

use anyhow::{Context, Result};
use chrono::{DateTime, NaiveDateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::io::Write;
use std::path::Path;

use crate::ingest::types::CacheTokens;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RunState {
    #[serde(default)]
    pub feeds: BTreeMap<String, CacheTokens>,
    #[serde(default, deserialize_with = "de_seen")]
    pub seen: BTreeMap<String, DateTime<Utc>>,
    /// Failed publish attempts per selected item (keyed by its primary dedup key).
    #[serde(
        default,
        skip_serializing_if = "BTreeMap::is_empty",
        deserialize_with = "de_attempts"
    )]
    pub attempts: BTreeMap<String, Attempts>,
}

/// Publish failures of one item. `since` is the first failure; counters
/// expire with the seen TTL like seen keys do.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Attempts {
    pub count: u32,
    pub since: DateTime<Utc>,
}

impl Attempts {
    pub fn first(now: DateTime<Utc>) -> Self {
        Self {
            count: 1,
            since: now,
        }
    }
}

impl RunState {
    /// Permissive load; see module docs.
    pub fn load(path: &Path) -> Self {
        let raw = match fs::read_to_string(path) {
            Ok(s) => s,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::info!(path = %path.display(), "no existing state, starting fresh");
                return Self::default();
            }
            Err(e) => {
                tracing::warn!(path = %path.display(), error = ?e, "state unreadable; reinitializing");
                return Self::default();
            }
        };
        if raw.trim().is_empty() {
            tracing::warn!(path = %path.display(), "state file empty; reinitializing");
            return Self::default();
        }
        match serde_json::from_str::<RunState>(&raw) {
            Ok(st) => st,
            Err(e) => {
                tracing::warn!(path = %path.display(), error = %e, "state corrupted; reinitializing");
                Self::default()
            }
        }
    }

    /// Atomic save: write `<path>.tmp`, fsync, rename.
    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(dir) = path.parent().filter(|d| !d.as_os_str().is_empty()) {
            fs::create_dir_all(dir)
                .with_context(|| format!("creating state dir {}", dir.display()))?;
        }
        let json = serde_json::to_string_pretty(self).context("serializing state")?;
        let tmp = path.with_extension("json.tmp");
        {
            let mut f = fs::File::create(&tmp)
                .with_context(|| format!("creating {}", tmp.display()))?;
            f.write_all(json.as_bytes())?;
            f.sync_all()?;
        }
        fs::rename(&tmp, path).with_context(|| format!("renaming into {}", path.display()))?;
        tracing::debug!(path = %path.display(), seen = self.seen.len(), "state saved");
        Ok(())
    }
}

/// Seen timestamps are RFC 3339; naive ISO strings (no offset) are read as UTC.
/// Entries that parse as neither are dropped rather than failing the whole document.
fn de_seen<'de, D>(d: D) -> Result<BTreeMap<String, DateTime<Utc>>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw: BTreeMap<String, serde_json::Value> = BTreeMap::deserialize(d)?;
    Ok(raw
        .into_iter()
        .filter_map(|(k, v)| {
            let s = v.as_str()?;
            parse_seen_ts(s).map(|ts| (k, ts))
        })
        .collect())
}

/// Entries without a readable first-failure time are dropped.
fn de_attempts<'de, D>(d: D) -> Result<BTreeMap<String, Attempts>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw: BTreeMap<String, serde_json::Value> = BTreeMap::deserialize(d)?;
    Ok(raw
        .into_iter()
        .filter_map(|(k, v)| {
            let count = u32::try_from(v.get("count")?.as_u64()?).ok()?;
            let since = parse_seen_ts(v.get("since")?.as_str()?)?;
            Some((k, Attempts { count, since }))
        })
        .collect())
}

fn parse_seen_ts(s: &str) -> Option<DateTime<Utc>> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Some(dt.with_timezone(&Utc));
    }
    NaiveDateTime::parse_from_str(s, "%Y-%m-%dT%H:%M:%S%.f")
        .ok()
        .map(|n| n.and_utc())
}
