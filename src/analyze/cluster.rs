//! Near-duplicate title clustering.
//!
//! Items are sorted by score (descending, stable); walking the list, each
//! surviving item suppresses every later item whose title similarity is at
//! least the threshold. Survivors keep descending score order.
//!
//! Similarity is the indel ratio `2·LCS / (|a| + |b|)` over normalized titles,
//! so an inserted word costs its length once rather than per substituted char.

use crate::ingest::types::Item;

pub const DEFAULT_SIMILARITY_THRESHOLD: f32 = 0.86;

/// An item with its score for the current selection pass.
#[derive(Debug, Clone, PartialEq)]
pub struct ScoredItem {
    pub item: Item,
    pub score: f32,
}

/// Sort descending by score; equal scores keep their input order.
pub fn sort_by_score(items: &mut [ScoredItem]) {
    items.sort_by(|a, b| b.score.total_cmp(&a.score));
}

pub fn cluster(mut items: Vec<ScoredItem>, threshold: f32) -> Vec<ScoredItem> {
    sort_by_score(&mut items);
    let titles: Vec<Vec<char>> = items
        .iter()
        .map(|s| normalize(&s.item.title).chars().collect())
        .collect();
    let mut claimed = vec![false; items.len()];

    for i in 0..items.len() {
        if claimed[i] || titles[i].is_empty() {
            continue;
        }
        for j in (i + 1)..items.len() {
            if claimed[j] || length_bound(titles[i].len(), titles[j].len()) < threshold {
                continue;
            }
            if char_similarity(&titles[i], &titles[j]) >= threshold {
                tracing::debug!(kept = %items[i].item.title, dropped = %items[j].item.title, "near-duplicate");
                claimed[j] = true;
            }
        }
    }

    items
        .into_iter()
        .zip(claimed)
        .filter_map(|(it, c)| (!c).then_some(it))
        .collect()
}

/// Lower-case and collapse whitespace before comparing.
fn normalize(s: &str) -> String {
    s.split_whitespace()
        .map(|w| w.to_lowercase())
        .collect::<Vec<_>>()
        .join(" ")
}

/// Similarity in [0.0, 1.0] of two raw titles.
pub fn similarity(a: &str, b: &str) -> f32 {
    let a: Vec<char> = normalize(a).chars().collect();
    let b: Vec<char> = normalize(b).chars().collect();
    char_similarity(&a, &b)
}

/// Highest similarity two titles of these lengths can reach (LCS ≤ shorter).
fn length_bound(a: usize, b: usize) -> f32 {
    if a + b == 0 {
        return 1.0;
    }
    2.0 * a.min(b) as f32 / (a + b) as f32
}

fn char_similarity(a: &[char], b: &[char]) -> f32 {
    if a == b {
        return 1.0;
    }
    2.0 * lcs_len(a, b) as f32 / (a.len() + b.len()) as f32
}

/// Longest common subsequence length, two-row DP.
fn lcs_len(a: &[char], b: &[char]) -> usize {
    if a.is_empty() || b.is_empty() {
        return 0;
    }
    let mut prev = vec![0usize; b.len() + 1];
    let mut curr = vec![0usize; b.len() + 1];
    for ca in a {
        for (j, cb) in b.iter().enumerate() {
            curr[j + 1] = if ca == cb {
                prev[j] + 1
            } else {
                prev[j + 1].max(curr[j])
            };
        }
        std::mem::swap(&mut prev, &mut curr);
    }
    prev[b.len()]
}
