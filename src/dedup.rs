// src/dedup.rs
//! Time-bounded seen-key store over [`RunState::seen`].
//!
//! Every item maps to up to three keys: its canonical link, a key derived
//! from the source-native entry id, and a hash of channel + lower-cased
//! title. A hit on any key suppresses the item.

use chrono::{DateTime, Duration, Utc};
use metrics::counter;
use sha2::{Digest, Sha256};

use crate::ingest::types::Item;
use crate::state::RunState;

/// Title prefix length that participates in the title key.
const TITLE_KEY_CHARS: usize = 140;

/// First 16 hex chars of SHA-256.
pub fn short_hash(text: &str) -> String {
    let digest = Sha256::digest(text.as_bytes());
    let mut out = String::with_capacity(16);
    for b in digest.iter().take(8) {
        use std::fmt::Write as _;
        let _ = write!(&mut out, "{:02x}", b);
    }
    out
}

/// Candidate dedup keys, most specific first.
pub fn candidate_keys(item: &Item) -> Vec<String> {
    let mut keys = Vec::with_capacity(3);
    if item.has_link() {
        keys.push(item.link.clone());
    }
    if let Some(id) = item.entry_id.as_deref() {
        keys.push(format!("id:{}", short_hash(&format!("{}|{}", item.channel, id))));
    }
    let title: String = item
        .title
        .trim()
        .to_lowercase()
        .chars()
        .take(TITLE_KEY_CHARS)
        .collect();
    if !title.is_empty() {
        keys.push(format!(
            "t:{}",
            short_hash(&format!("{}|{}", item.channel.to_lowercase(), title))
        ));
    }
    keys
}

/// The most specific key of `item`, used to track per-item publish attempts.
pub fn primary_key(item: &Item) -> Option<String> {
    candidate_keys(item).into_iter().next()
}

/// True when any key of `item` is already registered.
pub fn is_seen(item: &Item, state: &RunState) -> bool {
    candidate_keys(item)
        .iter()
        .any(|k| state.seen.contains_key(k))
}

/// Items that would survive [`dedupe`] against the current state; registers nothing.
pub fn unseen_count(items: &[Item], state: &RunState) -> usize {
    items.iter().filter(|it| !is_seen(it, state)).count()
}

/// Drop items with any already-seen key; register all keys of the survivors at `now`.
/// Processes in input order, so an earlier item wins over a later duplicate.
pub fn dedupe(items: Vec<Item>, state: &mut RunState, now: DateTime<Utc>) -> Vec<Item> {
    let total = items.len();
    let mut out = Vec::with_capacity(total);
    for item in items {
        let keys = candidate_keys(&item);
        if keys.iter().any(|k| state.seen.contains_key(k)) {
            tracing::debug!(title = %item.title, channel = %item.channel, "already seen");
            continue;
        }
        for k in keys {
            state.seen.insert(k, now);
        }
        out.push(item);
    }
    counter!("dedup_suppressed_total").increment((total - out.len()) as u64);
    out
}

/// Withdraw an item's keys so it can be reconsidered on a later run.
pub fn forget(item: &Item, state: &mut RunState) {
    for k in candidate_keys(item) {
        state.seen.remove(&k);
    }
}

/// TTL as a duration; values beyond what `Duration` can hold never expire.
fn ttl_duration(ttl_hours: u64) -> Duration {
    i64::try_from(ttl_hours)
        .ok()
        .and_then(Duration::try_hours)
        .unwrap_or(Duration::MAX)
}

/// Remove seen entries and publish-attempt counters older than `ttl_hours`.
/// Returns how many seen entries were removed.
pub fn prune(state: &mut RunState, now: DateTime<Utc>, ttl_hours: u64) -> usize {
    let ttl = ttl_duration(ttl_hours);
    let before = state.seen.len();
    state
        .seen
        .retain(|_, first_seen| now.signed_duration_since(*first_seen) <= ttl);
    let removed = before - state.seen.len();

    let counters = state.attempts.len();
    state
        .attempts
        .retain(|_, a| now.signed_duration_since(a.since) <= ttl);
    let expired = counters - state.attempts.len();

    if removed > 0 || expired > 0 {
        tracing::debug!(removed, expired, "pruned expired seen keys and attempt counters");
    }
    removed
}
