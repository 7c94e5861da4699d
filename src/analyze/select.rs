//! Diverse per-topic selection.
//!
//! 1. Filter to the topic, score, cluster near-duplicates.
//! 2. Group survivors by channel; channels ordered by their best score.
//! 3. Round-robin one item per channel per pass under a per-channel cap.
//! 4. Relax the cap one step at a time (up to `n`) until the pick is both
//!    full and spans `min_distinct` channels; otherwise take the most diverse
//!    full pick.
//! 5. If no cap fills the quota, fall back to a flat score-ranked list.

use serde::Deserialize;
use std::collections::{BTreeSet, HashMap};

use crate::analyze::cluster::{cluster, sort_by_score, ScoredItem, DEFAULT_SIMILARITY_THRESHOLD};
use crate::analyze::scoring::Scorer;
use crate::ingest::types::Item;

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SelectionConfig {
    /// Per-channel cap for the first round-robin attempt.
    pub base_cap: usize,
    /// Distinct channels a pick should span before relaxation stops.
    pub min_distinct: usize,
    pub similarity_threshold: f32,
    /// A topic is thin when fresh supply < quota × this factor.
    pub thin_supply_factor: usize,
}

impl Default for SelectionConfig {
    fn default() -> Self {
        Self {
            base_cap: 1,
            min_distinct: 3,
            similarity_threshold: DEFAULT_SIMILARITY_THRESHOLD,
            thin_supply_factor: 2,
        }
    }
}

/// Outcome of [`select`]; `cap` is `None` when the flat fallback was used.
#[derive(Debug, Clone, PartialEq)]
pub struct Selection {
    pub items: Vec<ScoredItem>,
    pub cap: Option<usize>,
}

impl Selection {
    pub fn is_flat(&self) -> bool {
        self.cap.is_none()
    }

    pub fn distinct_channels(&self) -> usize {
        distinct_channels(&self.items)
    }
}

fn distinct_channels(items: &[ScoredItem]) -> usize {
    items
        .iter()
        .map(|s| s.item.channel.as_str())
        .collect::<BTreeSet<_>>()
        .len()
}

/// Channel groups, each sorted by score, groups ordered by their best item.
fn group_by_channel(ranked: &[ScoredItem]) -> Vec<Vec<ScoredItem>> {
    let mut index: HashMap<&str, usize> = HashMap::new();
    let mut groups: Vec<Vec<ScoredItem>> = Vec::new();
    // `ranked` is already score-descending, so first appearance = best score
    for s in ranked {
        let gi = *index.entry(s.item.channel.as_str()).or_insert_with(|| {
            groups.push(Vec::new());
            groups.len() - 1
        });
        groups[gi].push(s.clone());
    }
    groups
}

fn round_robin(groups: &[Vec<ScoredItem>], cap: usize, n: usize) -> Vec<ScoredItem> {
    let mut picks = Vec::with_capacity(n);
    let mut taken = vec![0usize; groups.len()];
    while picks.len() < n {
        let mut progressed = false;
        for (gi, group) in groups.iter().enumerate() {
            if picks.len() == n {
                break;
            }
            if taken[gi] < cap && taken[gi] < group.len() {
                picks.push(group[taken[gi]].clone());
                taken[gi] += 1;
                progressed = true;
            }
        }
        if !progressed {
            break;
        }
    }
    picks
}

/// Pick at most `n` items of `topic`, spread across channels.
pub fn select(
    items: &[Item],
    topic: &str,
    n: usize,
    scorer: &Scorer,
    cfg: &SelectionConfig,
) -> Selection {
    if n == 0 {
        return Selection {
            items: Vec::new(),
            cap: Some(cfg.base_cap.max(1)),
        };
    }

    let scored: Vec<ScoredItem> = items
        .iter()
        .filter(|it| it.topic == topic)
        .map(|it| ScoredItem {
            score: scorer.score(it),
            item: it.clone(),
        })
        .collect();
    let ranked = cluster(scored, cfg.similarity_threshold);
    let groups = group_by_channel(&ranked);

    let base = cfg.base_cap.max(1);
    let mut best_full: Option<(usize, Vec<ScoredItem>)> = None;
    for cap in base..=n.max(base) {
        let attempt = round_robin(&groups, cap, n);
        if attempt.len() < n {
            continue;
        }
        let distinct = distinct_channels(&attempt);
        if distinct >= cfg.min_distinct {
            tracing::debug!(%topic, cap, distinct, "diverse selection satisfied");
            return finish(attempt, Some(cap));
        }
        let better = best_full
            .as_ref()
            .map_or(true, |(_, prev)| distinct > distinct_channels(prev));
        if better {
            best_full = Some((cap, attempt));
        }
    }

    if let Some((cap, attempt)) = best_full {
        tracing::debug!(%topic, cap, "full selection without distinctness target");
        return finish(attempt, Some(cap));
    }

    tracing::debug!(%topic, supply = ranked.len(), n, "thin supply; flat score fallback");
    let mut flat = ranked;
    flat.truncate(n);
    finish(flat, None)
}

fn finish(mut items: Vec<ScoredItem>, cap: Option<usize>) -> Selection {
    sort_by_score(&mut items);
    Selection { items, cap }
}

/// Run [`select`] per topic, concatenate, re-cluster across topics, truncate to the total quota.
pub fn select_many(
    items: &[Item],
    quotas: &[(String, usize)],
    scorer: &Scorer,
    cfg: &SelectionConfig,
) -> Vec<ScoredItem> {
    let total: usize = quotas.iter().map(|(_, q)| *q).sum();
    let mut all = Vec::with_capacity(total);
    for (topic, quota) in quotas {
        let sel = select(items, topic, *quota, scorer, cfg);
        tracing::info!(
            %topic,
            quota,
            picked = sel.items.len(),
            channels = sel.distinct_channels(),
            flat = sel.is_flat(),
            "topic selection"
        );
        all.extend(sel.items);
    }
    let mut out = cluster(all, cfg.similarity_threshold);
    out.truncate(total);
    out
}
