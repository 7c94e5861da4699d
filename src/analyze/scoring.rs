//! Additive relevance score for one item within its topic.
//!
//! score = source weight
//!       + recency bonus (linear decay to zero at `max_age_hours`)
//!       + Σ keyword weights found in `title + " " + summary`
//!       − `negative_penalty` per matched negative phrase
//!       + `headline_bonus` when the title length is headline-shaped
//!
//! Scores are only compared within one topic's candidates.

use chrono::{DateTime, Utc};
use serde::Deserialize;
use std::collections::HashMap;

use crate::ingest::types::Item;
use crate::source_weights::SourceWeightsConfig;

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ScoringConfig {
    pub max_age_hours: f32,
    pub recency_scale: f32,
    pub negative_penalty: f32,
    /// Promotional boilerplate; matched case-insensitively.
    pub negative_phrases: Vec<String>,
    pub headline_bonus: f32,
    pub headline_min_chars: usize,
    pub headline_max_chars: usize,
}

impl Default for ScoringConfig {
    fn default() -> Self {
        Self {
            max_age_hours: 36.0,
            recency_scale: 2.0,
            negative_penalty: 1.5,
            negative_phrases: [
                "sponsored",
                "advertisement",
                "promo code",
                "subscribe now",
                "sign up for our newsletter",
                "limited time offer",
                "partner content",
            ]
            .iter()
            .map(|s| s.to_string())
            .collect(),
            headline_bonus: 0.3,
            headline_min_chars: 30,
            headline_max_chars: 140,
        }
    }
}

/// Scores items against the keyword table of their own topic.
#[derive(Debug, Clone)]
pub struct Scorer {
    cfg: ScoringConfig,
    weights: SourceWeightsConfig,
    keywords: HashMap<String, Vec<(String, f32)>>,
    negative: Vec<String>,
    now: DateTime<Utc>,
}

impl Scorer {
    /// `keywords`: topic → (keyword, weight) pairs.
    pub fn new(
        cfg: ScoringConfig,
        weights: SourceWeightsConfig,
        keywords: HashMap<String, Vec<(String, f32)>>,
        now: DateTime<Utc>,
    ) -> Self {
        let keywords = keywords
            .into_iter()
            .map(|(topic, kws)| {
                let kws = kws
                    .into_iter()
                    .map(|(k, w)| (k.trim().to_lowercase(), w))
                    .filter(|(k, _)| !k.is_empty())
                    .collect();
                (topic, kws)
            })
            .collect();
        let negative = cfg
            .negative_phrases
            .iter()
            .map(|p| p.trim().to_lowercase())
            .filter(|p| !p.is_empty())
            .collect();
        Self {
            cfg,
            weights,
            keywords,
            negative,
            now,
        }
    }

    pub fn score(&self, item: &Item) -> f32 {
        let base = self.weights.weight_for(&item.source_weight_key);
        let text = format!("{} {}", item.title, item.summary).to_lowercase();

        let keyword_bonus: f32 = self
            .keywords
            .get(&item.topic)
            .map(|kws| {
                kws.iter()
                    .filter(|(k, _)| text.contains(k.as_str()))
                    .map(|(_, w)| *w)
                    .sum()
            })
            .unwrap_or(0.0);

        let hits = self
            .negative
            .iter()
            .filter(|p| text.contains(p.as_str()))
            .count();
        let penalty = hits as f32 * self.cfg.negative_penalty;

        let title_len = item.title.chars().count();
        let shape = if (self.cfg.headline_min_chars..=self.cfg.headline_max_chars)
            .contains(&title_len)
        {
            self.cfg.headline_bonus
        } else {
            0.0
        };

        base + self.recency_bonus(item) + keyword_bonus - penalty + shape
    }

    /// Linear decay; unknown timestamps count as older than the cutoff.
    pub fn recency_bonus(&self, item: &Item) -> f32 {
        let max_age = self.cfg.max_age_hours.max(f32::EPSILON);
        let age_hours = match item.timestamp {
            Some(ts) => (self.now.signed_duration_since(ts).num_seconds() as f32 / 3600.0).max(0.0),
            None => max_age + 1.0,
        };
        (max_age - age_hours.min(max_age)).max(0.0) / max_age * self.cfg.recency_scale
    }
}
