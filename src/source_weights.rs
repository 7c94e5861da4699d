//! # Source Weights
//!
//! Static trust weights per source key (a feed domain such as `reuters.com`,
//! or a platform key such as `telegram`). The weight is the additive base of
//! an item's score; unknown sources get `default_weight` (1.0).
//!
//! - Loaded from the `[source_weights]` config table, or `default_seed()`.
//! - Case-insensitive lookup; a leading `www.` is ignored.
//! - Aliases map alternative hosts (feed subdomains, country domains) to a canonical key.
//! - Fallback order: alias → exact → parent-domain suffix → default.

use serde::Deserialize;
use std::collections::HashMap;

#[derive(Debug, Clone, Deserialize)]
pub struct SourceWeightsConfig {
    /// Weight when no key matches.
    #[serde(default = "default_default_weight")]
    pub default_weight: f32,
    /// Explicit weights for canonical source keys.
    #[serde(default)]
    pub weights: HashMap<String, f32>,
    /// Non-canonical key → canonical key.
    #[serde(default)]
    pub aliases: HashMap<String, String>,
}

fn default_default_weight() -> f32 {
    1.0
}

impl Default for SourceWeightsConfig {
    fn default() -> Self {
        Self::default_seed()
    }
}

impl SourceWeightsConfig {
    /// Weight for a source key.
    ///
    /// Steps:
    /// 1. Alias lookup → canonical → weight.
    /// 2. Exact weight match.
    /// 3. Parent-domain fallback (`feeds.reuters.com` → `reuters.com`).
    /// 4. Default weight.
    pub fn weight_for(&self, source_key: &str) -> f32 {
        let s = normalize(source_key);

        if let Some(canon) = self.aliases.get(&s) {
            if let Some(&w) = self.weights.get(&normalize(canon)) {
                return w.max(0.0);
            }
        }

        if let Some(&w) = self.weights.get(&s) {
            return w.max(0.0);
        }

        // Longest matching parent domain wins.
        let mut best: Option<(usize, f32)> = None;
        for (k, &w) in &self.weights {
            if s.ends_with(&format!(".{k}")) && best.map_or(true, |(len, _)| k.len() > len) {
                best = Some((k.len(), w));
            }
        }
        if let Some((_, w)) = best {
            return w.max(0.0);
        }

        self.default_weight.max(0.0)
    }

    /// Built-in seed with common wire services, papers and platforms.
    pub fn default_seed() -> Self {
        let mut weights = HashMap::new();
        let mut aliases = HashMap::new();

        for (k, v) in [
            ("reuters.com", 1.6),
            ("apnews.com", 1.5),
            ("bbc.co.uk", 1.4),
            ("ft.com", 1.4),
            ("nytimes.com", 1.3),
            ("theguardian.com", 1.3),
            ("wsj.com", 1.3),
            ("bloomberg.com", 1.3),
            ("thediplomat.com", 1.2),
            ("foreignpolicy.com", 1.2),
            ("marketwatch.com", 1.1),
            ("cnbc.com", 1.1),
            ("telegram", 0.8),
            ("twitter.com", 0.7),
        ] {
            weights.insert(k.to_string(), v);
        }

        for (a, c) in [
            ("bbc.com", "bbc.co.uk"),
            ("bbci.co.uk", "bbc.co.uk"),
            ("feeds.bbci.co.uk", "bbc.co.uk"),
            ("ap.org", "apnews.com"),
            ("t.me", "telegram"),
            ("reuters", "reuters.com"),
            ("nyt", "nytimes.com"),
            ("guardian.co.uk", "theguardian.com"),
        ] {
            aliases.insert(a.to_string(), c.to_string());
        }

        Self {
            default_weight: 1.0,
            weights,
            aliases,
        }
    }
}

fn normalize(s: &str) -> String {
    let out = s.trim().trim_end_matches('.').to_ascii_lowercase();
    out.strip_prefix("www.").map(str::to_string).unwrap_or(out)
}
