// tests/dedup_store.rs
use chrono::{DateTime, Duration, TimeZone, Utc};
use digest_bot::dedup::{candidate_keys, dedupe, prune, unseen_count};
use digest_bot::ingest::types::{Item, RawEntry, SourceDescriptor};
use digest_bot::RunState;

fn t0() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2025, 6, 10, 8, 0, 0).unwrap()
}

fn feed_item(feed: &str, title: &str, link: &str) -> Item {
    Item::from_entry(
        RawEntry {
            title: title.into(),
            link: link.into(),
            ..Default::default()
        },
        "world",
        &SourceDescriptor::parse(feed),
    )
}

#[test]
fn same_canonical_link_is_kept_once() {
    let mut state = RunState::default();
    let items = vec![
        feed_item(
            "https://a.test/rss",
            "Storm hits northern coast",
            "https://www.news.test/storm/?utm_source=rss",
        ),
        feed_item(
            "https://b.test/rss",
            "Coastal towns brace as storm arrives",
            "https://news.test/storm#top",
        ),
    ];
    let kept = dedupe(items, &mut state, t0());
    assert_eq!(kept.len(), 1);
    assert_eq!(kept[0].title, "Storm hits northern coast");
}

#[test]
fn linkless_item_with_seen_channel_and_title_is_suppressed() {
    let mut state = RunState::default();
    let first = Item::from_entry(
        RawEntry {
            title: "Parliament passes budget bill".into(),
            link: "https://t.me/politics_now/811".into(),
            ..Default::default()
        },
        "world",
        &SourceDescriptor::parse("@politics_now"),
    );
    assert_eq!(dedupe(vec![first], &mut state, t0()).len(), 1);

    // same channel arriving through another mirror, without a link
    let again = Item::from_entry(
        RawEntry {
            title: "  PARLIAMENT passes budget bill".into(),
            ..Default::default()
        },
        "world",
        &SourceDescriptor::parse("tg:politics_now"),
    );
    assert!(!again.has_link());
    assert_eq!(unseen_count(std::slice::from_ref(&again), &state), 0);
    assert!(dedupe(vec![again], &mut state, t0()).is_empty());
}

#[test]
fn entry_id_keys_are_scoped_to_channel() {
    let a = Item::from_entry(
        RawEntry {
            title: "One".into(),
            id: Some("42".into()),
            ..Default::default()
        },
        "world",
        &SourceDescriptor::parse("@alpha"),
    );
    let b = Item::from_entry(
        RawEntry {
            title: "Two".into(),
            id: Some("42".into()),
            ..Default::default()
        },
        "world",
        &SourceDescriptor::parse("@beta"),
    );
    let mut state = RunState::default();
    assert_eq!(dedupe(vec![a, b], &mut state, t0()).len(), 2);
}

#[test]
fn seen_entry_expires_after_ttl() {
    let ttl_hours = 72;
    let mut state = RunState::default();
    let item = feed_item("https://a.test/rss", "Wildfire spreads", "https://a.test/fire");
    dedupe(vec![item.clone()], &mut state, t0());
    let keys = candidate_keys(&item);
    assert!(!keys.is_empty());

    let just_before = t0() + Duration::hours(ttl_hours) - Duration::seconds(1);
    assert_eq!(prune(&mut state, just_before, ttl_hours as u64), 0);
    assert!(keys.iter().all(|k| state.seen.contains_key(k)));

    let just_after = t0() + Duration::hours(ttl_hours) + Duration::seconds(1);
    assert_eq!(prune(&mut state, just_after, ttl_hours as u64), keys.len());
    assert!(state.seen.is_empty());
}
