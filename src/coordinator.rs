// src/coordinator.rs
//! One scheduled run:
//! load state → prune → quotas → fetch (reserve sources if thin) → dedup →
//! select → summarize + post each, paced → save state.
//!
//! Nothing in a run is fatal. Per-item summarize/post failures are logged and
//! the batch continues; an empty selection is an early exit that still
//! persists the pruned state.
use anyhow::Result;
use chrono::{DateTime, Utc};
use metrics::counter;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;

use crate::analyze::{select_many, ScoredItem, Scorer};
use crate::config::AppConfig;
use crate::dedup;
use crate::ingest::types::{Fetcher, Item};
use crate::ingest::{fetch_topic, HttpFetcher};
use crate::publish::{
    compose_status, idempotency_key, DryRunPublisher, MastodonPublisher, PublishOutcome,
    Publisher,
};
use crate::state::{Attempts, RunState};
use crate::summarize::{build_summarizer, Summarizer};

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RunReport {
    pub quotas: Vec<(String, usize)>,
    pub pruned: usize,
    pub fetched: usize,
    pub fresh: usize,
    pub selected: usize,
    pub posted: usize,
    pub skipped: usize,
    pub failed: usize,
}

pub struct Coordinator {
    cfg: AppConfig,
    fetcher: Arc<dyn Fetcher>,
    summarizer: Arc<dyn Summarizer>,
    publisher: Arc<dyn Publisher>,
}

impl Coordinator {
    pub fn new(
        cfg: AppConfig,
        fetcher: Arc<dyn Fetcher>,
        summarizer: Arc<dyn Summarizer>,
        publisher: Arc<dyn Publisher>,
    ) -> Self {
        Self {
            cfg,
            fetcher,
            summarizer,
            publisher,
        }
    }

    /// HTTP fetcher, configured summarizer, and Mastodon (or dry-run) publisher.
    pub fn from_config(cfg: AppConfig, dry_run: bool) -> Result<Self> {
        let fetcher: Arc<dyn Fetcher> = Arc::new(HttpFetcher::from_config(&cfg.fetch)?);
        let summarizer = build_summarizer(&cfg.summarizer);
        let publisher: Arc<dyn Publisher> = if dry_run {
            Arc::new(DryRunPublisher {
                max_chars: cfg.publish.fallback_max_chars,
            })
        } else {
            Arc::new(MastodonPublisher::from_config(&cfg.publish))
        };
        tracing::info!(summarizer = summarizer.name(), dry_run, "coordinator ready");
        Ok(Self::new(cfg, fetcher, summarizer, publisher))
    }

    /// Load state (or start empty when `reset`), run once, save atomically.
    pub async fn run(&self, reset: bool) -> Result<RunReport> {
        let path = &self.cfg.state_path;
        let mut state = if reset {
            tracing::info!(path = %path.display(), "state reset requested");
            RunState::default()
        } else {
            RunState::load(path)
        };
        let report = self.run_once(&mut state, Utc::now()).await;
        state.save(path)?;
        Ok(report)
    }

    pub async fn run_once(&self, state: &mut RunState, now: DateTime<Utc>) -> RunReport {
        let mut report = RunReport {
            pruned: dedup::prune(state, now, self.cfg.seen_ttl_hours),
            quotas: self.cfg.resolve_quotas(now),
            ..Default::default()
        };
        if report.quotas.is_empty() {
            tracing::info!("no topic has a quota in this slot");
            return report;
        }
        tracing::info!(quotas = ?report.quotas, pruned = report.pruned, "run started");

        let items = self.gather(&report.quotas, state).await;
        report.fetched = items.len();

        let fresh = dedup::dedupe(items, state, now);
        report.fresh = fresh.len();

        let scorer = Scorer::new(
            self.cfg.scoring.clone(),
            self.cfg.source_weights.clone(),
            self.cfg.keyword_map(),
            now,
        );
        let selection = select_many(&fresh, &report.quotas, &scorer, &self.cfg.selection);
        report.selected = selection.len();
        if selection.is_empty() {
            tracing::info!(fetched = report.fetched, fresh = report.fresh, "nothing new to publish");
            return report;
        }

        self.publish_all(&selection, state, now, &mut report).await;
        tracing::info!(
            selected = report.selected,
            posted = report.posted,
            skipped = report.skipped,
            failed = report.failed,
            "run finished"
        );
        report
    }

    async fn gather(&self, quotas: &[(String, usize)], state: &mut RunState) -> Vec<Item> {
        let fetch = &self.cfg.fetch;
        let window = Duration::from_secs(fetch.topic_deadline_secs);
        let mut all = Vec::new();

        for (topic, quota) in quotas {
            let Some(tc) = self.cfg.topic(topic) else {
                continue;
            };
            let deadline = Instant::now() + window;
            let mut items = fetch_topic(
                Arc::clone(&self.fetcher),
                topic,
                &tc.primary(),
                state,
                deadline,
                fetch.pool_size,
            )
            .await;

            let unseen = dedup::unseen_count(&items, state);
            let wanted = quota.saturating_mul(self.cfg.selection.thin_supply_factor);
            let reserve = tc.reserve();
            if unseen < wanted && !reserve.is_empty() {
                tracing::info!(%topic, unseen, wanted, reserve = reserve.len(), "thin supply; fetching reserve sources");
                let deadline = Instant::now() + window;
                let extra = fetch_topic(
                    Arc::clone(&self.fetcher),
                    topic,
                    &reserve,
                    state,
                    deadline,
                    fetch.pool_size,
                )
                .await;
                items.extend(extra);
            }
            tracing::info!(%topic, items = items.len(), "topic fetched");
            all.extend(items);
        }
        all
    }

    async fn publish_all(
        &self,
        selection: &[ScoredItem],
        state: &mut RunState,
        now: DateTime<Utc>,
        report: &mut RunReport,
    ) {
        let pc = &self.cfg.publish;
        let max_chars = self.publisher.max_chars().await;
        let mut first = true;

        for s in selection {
            let item = &s.item;
            let summary = self.summarizer.summarize(item).await;
            let summary = if summary.trim().is_empty() {
                item.title.trim().to_string()
            } else {
                summary
            };
            if summary.is_empty() {
                tracing::debug!(link = %item.link, "no text to publish; skipping");
                report.skipped += 1;
                continue;
            }

            if !first && pc.post_delay_secs > 0 {
                tokio::time::sleep(Duration::from_secs(pc.post_delay_secs)).await;
            }
            first = false;

            let attempt_key = dedup::primary_key(item);
            let text = compose_status(pc, &item.topic, &summary, &item.link, now, max_chars);
            let key = idempotency_key(&item.topic, attempt_key.as_deref().unwrap_or(&summary));
            let outcome = self.publisher.post(&text, pc.visibility, &key).await;

            match outcome {
                PublishOutcome::Posted { id, url } => {
                    tracing::info!(topic = %item.topic, id = ?id, url = ?url, "posted");
                    report.posted += 1;
                    if let Some(k) = attempt_key {
                        state.attempts.remove(&k);
                    }
                }
                PublishOutcome::Skipped(reason) => {
                    tracing::info!(topic = %item.topic, %reason, "post skipped");
                    report.skipped += 1;
                    if let Some(k) = attempt_key {
                        state.attempts.remove(&k);
                    }
                }
                PublishOutcome::Failed(error) => {
                    tracing::warn!(topic = %item.topic, link = %item.link, %error, "publish failed");
                    counter!("publish_failures_total").increment(1);
                    report.failed += 1;
                    self.record_failure(item, attempt_key, state, now);
                }
            }
        }
    }

    /// Withdraw the item's seen keys so a later run retries it, until
    /// `max_attempts` failures; after that the keys stay registered.
    fn record_failure(
        &self,
        item: &Item,
        attempt_key: Option<String>,
        state: &mut RunState,
        now: DateTime<Utc>,
    ) {
        let Some(k) = attempt_key else {
            return;
        };
        let count = match state.attempts.get_mut(&k) {
            Some(a) => {
                a.count += 1;
                a.count
            }
            None => {
                state.attempts.insert(k.clone(), Attempts::first(now));
                1
            }
        };
        if count < self.cfg.publish.max_attempts {
            dedup::forget(item, state);
            tracing::debug!(key = %k, count, "item released for retry");
        } else {
            state.attempts.remove(&k);
            tracing::warn!(key = %k, count, "giving up on item after repeated publish failures");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ingest::types::{CacheTokens, FetchOutcome, RawEntry, SourceDescriptor};
    use crate::publish::Visibility;
    use crate::summarize::LocalSummarizer;
    use async_trait::async_trait;
    use chrono::TimeZone;
    use std::sync::Mutex;

    struct OneFeed;

    #[async_trait]
    impl Fetcher for OneFeed {
        async fn fetch(&self, source: &SourceDescriptor, _t: Option<&CacheTokens>) -> FetchOutcome {
            FetchOutcome::Fetched {
                entries: vec![RawEntry {
                    title: format!("Headline from {}", source.label()),
                    link: format!("{}/story", source.label()),
                    summary: "Details.".into(),
                    ..Default::default()
                }],
                tokens: CacheTokens::default(),
            }
        }
    }

    /// A new story on every fetch.
    struct Rolling(Mutex<usize>);

    #[async_trait]
    impl Fetcher for Rolling {
        async fn fetch(&self, _s: &SourceDescriptor, _t: Option<&CacheTokens>) -> FetchOutcome {
            let mut n = self.0.lock().unwrap();
            *n += 1;
            FetchOutcome::Fetched {
                entries: vec![RawEntry {
                    title: format!("Story number {n}"),
                    link: format!("https://one.test/story/{n}"),
                    ..Default::default()
                }],
                tokens: CacheTokens::default(),
            }
        }
    }

    /// Fails every post, remembering text and key of each.
    #[derive(Default)]
    struct Failing(Mutex<Vec<(String, String)>>);

    impl Failing {
        fn calls(&self) -> usize {
            self.0.lock().unwrap().len()
        }
    }

    #[async_trait]
    impl Publisher for Failing {
        async fn post(&self, text: &str, _v: Visibility, key: &str) -> PublishOutcome {
            self.0.lock().unwrap().push((text.to_string(), key.to_string()));
            PublishOutcome::Failed("HTTP 503".into())
        }
    }

    fn cfg() -> AppConfig {
        let mut cfg = AppConfig::default();
        cfg.topics.truncate(1);
        cfg.topics[0].quota = 1;
        cfg.topics[0].sources = vec!["https://one.test/feed".into()];
        cfg.topics[0].reserve_sources.clear();
        cfg.publish.post_delay_secs = 0;
        cfg.publish.max_attempts = 2;
        cfg
    }

    #[tokio::test]
    async fn failed_publish_releases_item_until_max_attempts() {
        let publisher = Arc::new(Failing::default());
        let c = Coordinator::new(
            cfg(),
            Arc::new(OneFeed),
            Arc::new(LocalSummarizer::default()),
            publisher.clone(),
        );
        let mut state = RunState::default();
        let now = Utc::now();

        let r1 = c.run_once(&mut state, now).await;
        assert_eq!((r1.selected, r1.failed), (1, 1));
        assert!(state.seen.is_empty());
        assert_eq!(state.attempts.values().map(|a| a.count).collect::<Vec<_>>(), vec![1]);

        let r2 = c.run_once(&mut state, now).await;
        assert_eq!(r2.failed, 1);
        assert!(!state.seen.is_empty());
        assert!(state.attempts.is_empty());

        let r3 = c.run_once(&mut state, now).await;
        assert_eq!(r3.selected, 0);
        assert_eq!(publisher.calls(), 2);
    }

    #[tokio::test]
    async fn retried_post_reuses_key_across_runs() {
        let publisher = Arc::new(Failing::default());
        let mut cfg = cfg();
        cfg.publish.max_attempts = 3;
        let c = Coordinator::new(
            cfg,
            Arc::new(OneFeed),
            Arc::new(LocalSummarizer::default()),
            publisher.clone(),
        );
        let mut state = RunState::default();
        let nine = Utc.with_ymd_and_hms(2025, 6, 10, 9, 0, 0).unwrap();

        c.run_once(&mut state, nine).await;
        c.run_once(&mut state, nine + chrono::Duration::hours(1)).await;

        let calls = publisher.0.lock().unwrap().clone();
        assert_eq!(calls.len(), 2);
        assert_ne!(calls[0].0, calls[1].0, "header time differs between runs");
        assert_eq!(calls[0].1, calls[1].1);
    }

    #[tokio::test]
    async fn stale_attempt_counters_expire() {
        let c = Coordinator::new(
            cfg(),
            Arc::new(Rolling(Mutex::new(0))),
            Arc::new(LocalSummarizer::default()),
            Arc::new(Failing::default()),
        );
        let mut state = RunState::default();
        let start = Utc.with_ymd_and_hms(2025, 6, 1, 9, 0, 0).unwrap();

        for day in 0..20 {
            let r = c.run_once(&mut state, start + chrono::Duration::days(day)).await;
            assert_eq!(r.failed, 1);
        }
        // 72 h TTL: only the last four daily counters survive
        assert_eq!(state.attempts.len(), 4);
        assert!(state.seen.is_empty());
    }
}
