// tests/orchestrator_deadline.rs
use async_trait::async_trait;
use digest_bot::ingest::fetch_topic;
use digest_bot::ingest::types::{CacheTokens, FetchOutcome, Fetcher, RawEntry, SourceDescriptor};
use digest_bot::RunState;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;

/// Sources whose URL contains "slow" take far longer than the deadline.
struct Delayed;

#[async_trait]
impl Fetcher for Delayed {
    async fn fetch(&self, source: &SourceDescriptor, _tokens: Option<&CacheTokens>) -> FetchOutcome {
        let url = source.label().to_string();
        let delay = if url.contains("slow") {
            Duration::from_secs(10)
        } else {
            Duration::from_millis(20)
        };
        tokio::time::sleep(delay).await;
        FetchOutcome::Fetched {
            entries: vec![RawEntry {
                title: format!("Story from {url}"),
                link: format!("{url}/story"),
                ..Default::default()
            }],
            tokens: CacheTokens {
                etag: Some(format!("\"{url}\"")),
                last_modified: None,
            },
        }
    }
}

#[tokio::test]
async fn slow_sources_are_dropped_at_the_deadline() {
    let sources: Vec<SourceDescriptor> = [
        "https://fast1.test/rss",
        "https://slow1.test/rss",
        "https://fast2.test/rss",
        "https://slow2.test/rss",
        "https://fast3.test/rss",
    ]
    .iter()
    .map(|s| SourceDescriptor::parse(s))
    .collect();

    let mut state = RunState::default();
    let budget = Duration::from_millis(300);
    let started = Instant::now();
    let items = fetch_topic(
        Arc::new(Delayed),
        "world",
        &sources,
        &mut state,
        started + budget,
        5,
    )
    .await;
    let elapsed = started.elapsed();

    assert!(elapsed < budget + Duration::from_millis(500), "took {elapsed:?}");
    assert_eq!(items.len(), 3);
    assert!(items.iter().all(|it| it.channel.starts_with("fast")));
    assert!(items.iter().all(|it| it.topic == "world"));

    // only completed feeds leave conditional-fetch tokens behind
    assert_eq!(state.feeds.len(), 3);
    assert!(state.feeds.keys().all(|k| k.contains("fast")));
}

#[tokio::test]
async fn failed_and_unchanged_sources_contribute_nothing() {
    struct Mixed;

    #[async_trait]
    impl Fetcher for Mixed {
        async fn fetch(&self, source: &SourceDescriptor, _t: Option<&CacheTokens>) -> FetchOutcome {
            match source.label() {
                "https://ok.test/rss" => FetchOutcome::Fetched {
                    entries: vec![RawEntry {
                        title: "Only story".into(),
                        link: "https://ok.test/only".into(),
                        ..Default::default()
                    }],
                    tokens: CacheTokens::default(),
                },
                "https://same.test/rss" => FetchOutcome::NotModified,
                "https://none.test/rss" => FetchOutcome::Empty,
                _ => FetchOutcome::Failed("server error: 502".into()),
            }
        }
    }

    let sources: Vec<SourceDescriptor> = [
        "https://ok.test/rss",
        "https://same.test/rss",
        "https://none.test/rss",
        "https://broken.test/rss",
    ]
    .iter()
    .map(|s| SourceDescriptor::parse(s))
    .collect();

    let mut state = RunState::default();
    state.feeds.insert(
        "https://same.test/rss".into(),
        CacheTokens {
            etag: Some("\"v1\"".into()),
            last_modified: None,
        },
    );
    let items = fetch_topic(
        Arc::new(Mixed),
        "world",
        &sources,
        &mut state,
        Instant::now() + Duration::from_secs(5),
        2,
    )
    .await;

    assert_eq!(items.len(), 1);
    assert_eq!(items[0].link, "https://ok.test/only");
    // a 304 keeps the stored tokens untouched
    assert_eq!(
        state.feeds["https://same.test/rss"].etag.as_deref(),
        Some("\"v1\"")
    );
}
