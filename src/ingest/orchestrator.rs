// src/ingest/orchestrator.rs
//! Parallel fetch of one topic's sources under a single wall-clock deadline.
//!
//! Lossy by policy: a source whose fetch has not completed when the deadline
//! passes is dropped from this run. Its task is detached, not awaited; the
//! client timeout bounds how long it can linger.
use metrics::counter;
use rand::seq::SliceRandom;
use std::sync::Arc;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tokio::time::{timeout_at, Instant};

use crate::ingest::ensure_metrics_described;
use crate::ingest::types::{FetchOutcome, Fetcher, Item, SourceDescriptor};
use crate::state::RunState;

/// Fetch every source of `topic` on a pool of `pool_size` workers, merging what
/// completes before `deadline`. Fetch-cache tokens are read from and written
/// back to `state` on this task only, never from a worker.
pub async fn fetch_topic(
    fetcher: Arc<dyn Fetcher>,
    topic: &str,
    sources: &[SourceDescriptor],
    state: &mut RunState,
    deadline: Instant,
    pool_size: usize,
) -> Vec<Item> {
    ensure_metrics_described();

    let mut order = sources.to_vec();
    order.shuffle(&mut rand::rng());

    let permits = Arc::new(Semaphore::new(pool_size.max(1)));
    let mut set = JoinSet::new();
    for source in order {
        let tokens = source
            .cache_key()
            .and_then(|k| state.feeds.get(k).cloned());
        let fetcher = Arc::clone(&fetcher);
        let permits = Arc::clone(&permits);
        set.spawn(async move {
            let _permit = permits.acquire_owned().await.ok();
            // a task still queued when the deadline passes is already detached
            if Instant::now() >= deadline {
                return (source, FetchOutcome::Failed("deadline passed".to_string()));
            }
            let outcome = fetcher.fetch(&source, tokens.as_ref()).await;
            (source, outcome)
        });
    }

    let mut completed: Vec<(SourceDescriptor, FetchOutcome)> = Vec::with_capacity(sources.len());
    loop {
        match timeout_at(deadline, set.join_next()).await {
            Ok(Some(Ok(done))) => completed.push(done),
            Ok(Some(Err(e))) => {
                tracing::warn!(%topic, error = ?e, "fetch worker panicked or was cancelled");
            }
            Ok(None) => break,
            Err(_) => {
                let dropped = set.len();
                tracing::warn!(%topic, dropped, "topic deadline passed; dropping unfinished sources");
                counter!("ingest_deadline_dropped_total").increment(dropped as u64);
                set.detach_all();
                break;
            }
        }
    }

    let mut items = Vec::new();
    for (source, outcome) in completed {
        match outcome {
            FetchOutcome::Fetched { entries, tokens } => {
                if let Some(key) = source.cache_key() {
                    state.feeds.insert(key.to_string(), tokens);
                }
                tracing::debug!(%topic, source = %source.label(), entries = entries.len(), "fetched");
                items.extend(
                    entries
                        .into_iter()
                        .map(|e| Item::from_entry(e, topic, &source)),
                );
            }
            FetchOutcome::NotModified => {
                tracing::debug!(%topic, source = %source.label(), "not modified");
            }
            FetchOutcome::Empty => {
                tracing::debug!(%topic, source = %source.label(), "no entries");
            }
            FetchOutcome::Failed(reason) => {
                tracing::warn!(%topic, source = %source.label(), %reason, "source fetch failed");
                counter!("ingest_source_errors_total").increment(1);
            }
        }
    }

    counter!("ingest_items_total").increment(items.len() as u64);
    items
}
