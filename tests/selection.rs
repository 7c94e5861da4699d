// tests/selection.rs
use chrono::Utc;
use digest_bot::analyze::{select, select_many, Scorer, ScoringConfig, SelectionConfig};
use digest_bot::ingest::types::Item;
use digest_bot::source_weights::SourceWeightsConfig;
use std::collections::HashMap;

const TOPIC: &str = "world";

const TITLES: [&str; 12] = [
    "Oil prices fall sharply",
    "Election results announced today",
    "Storm hits northern coast",
    "Tech giant unveils new phone",
    "Parliament passes budget bill",
    "Wildfire spreads across valley",
    "Central bank holds rates steady",
    "Football club signs striker",
    "Drought threatens wheat harvest",
    "Museum reopens after renovation",
    "Airline cancels hundreds of flights",
    "Scientists map deep ocean floor",
];

/// Item whose score is decided by the keyword `marker` in its summary.
fn item(channel: &str, title: &str, marker: &str) -> Item {
    Item {
        title: title.into(),
        link: format!("https://{channel}/{marker}"),
        summary: marker.into(),
        topic: TOPIC.into(),
        timestamp: None,
        source_weight_key: channel.into(),
        channel: channel.into(),
        entry_id: None,
    }
}

/// Flat source weights, no shape bonus: score = 1.0 + marker weight.
fn scorer(markers: &[(&str, f32)]) -> Scorer {
    let cfg = ScoringConfig {
        headline_bonus: 0.0,
        negative_phrases: Vec::new(),
        ..Default::default()
    };
    let weights = SourceWeightsConfig {
        default_weight: 1.0,
        weights: HashMap::new(),
        aliases: HashMap::new(),
    };
    let mut kws = HashMap::new();
    kws.insert(
        TOPIC.to_string(),
        markers.iter().map(|(m, w)| (m.to_string(), *w)).collect(),
    );
    Scorer::new(cfg, weights, kws, Utc::now())
}

fn sel_cfg(base_cap: usize, min_distinct: usize) -> SelectionConfig {
    SelectionConfig {
        base_cap,
        min_distinct,
        ..Default::default()
    }
}

fn count_channel(items: &[digest_bot::analyze::ScoredItem], channel: &str) -> usize {
    items.iter().filter(|s| s.item.channel == channel).count()
}

#[test]
fn per_channel_cap_is_respected() {
    // one crowded channel with the best five items, two channels with one each
    let items = vec![
        item("big.test", TITLES[0], "m01"),
        item("big.test", TITLES[1], "m02"),
        item("big.test", TITLES[2], "m03"),
        item("big.test", TITLES[3], "m04"),
        item("big.test", TITLES[4], "m05"),
        item("b.test", TITLES[5], "m06"),
        item("c.test", TITLES[6], "m07"),
    ];
    let sc = scorer(&[
        ("m01", 0.9),
        ("m02", 0.8),
        ("m03", 0.7),
        ("m04", 0.6),
        ("m05", 0.5),
        ("m06", 0.1),
        ("m07", 0.1),
    ]);

    let sel = select(&items, TOPIC, 3, &sc, &sel_cfg(1, 3));
    assert_eq!(sel.cap, Some(1));
    assert_eq!(sel.items.len(), 3);
    assert!(count_channel(&sel.items, "big.test") <= 1);

    // n = 4 needs cap 2: big.test may contribute two, never more
    let sel = select(&items, TOPIC, 4, &sc, &sel_cfg(1, 3));
    assert_eq!(sel.cap, Some(2));
    assert_eq!(sel.items.len(), 4);
    assert_eq!(count_channel(&sel.items, "big.test"), 2);
    assert_eq!(sel.distinct_channels(), 3);
}

#[test]
fn count_never_exceeds_quota_and_fills_when_supply_allows() {
    let channels = ["a.test", "b.test", "c.test"];
    let items: Vec<Item> = TITLES
        .iter()
        .enumerate()
        .map(|(i, t)| item(channels[i % 3], t, &format!("m{:02}", i + 1)))
        .collect();
    let sc = scorer(&[]);
    for n in 0..=15 {
        let sel = select(&items, TOPIC, n, &sc, &SelectionConfig::default());
        assert!(sel.items.len() <= n);
        assert_eq!(sel.items.len(), n.min(items.len()), "n = {n}");
    }
}

#[test]
fn thin_supply_falls_back_to_flat_score_order() {
    let items = vec![
        item("a.test", TITLES[0], "m01"),
        item("b.test", TITLES[1], "m02"),
        item("c.test", TITLES[2], "m03"),
    ];
    let sc = scorer(&[("m01", 0.2), ("m02", 0.9), ("m03", 0.5)]);
    let sel = select(&items, TOPIC, 5, &sc, &sel_cfg(2, 3));

    assert!(sel.is_flat());
    assert_eq!(sel.items.len(), 3);
    assert!(sel.items.windows(2).all(|w| w[0].score >= w[1].score));
    let order: Vec<&str> = sel.items.iter().map(|s| s.item.channel.as_str()).collect();
    assert_eq!(order, vec!["b.test", "c.test", "a.test"]);
}

#[test]
fn balanced_supply_takes_top_item_of_each_channel() {
    let channels = ["a.test", "b.test", "c.test", "d.test"];
    let mut items = Vec::new();
    let mut markers = Vec::new();
    for (ci, ch) in channels.iter().enumerate() {
        for k in 0..3 {
            let idx = ci * 3 + k;
            let marker = format!("m{:02}", idx + 1);
            // k = 1 is the channel's best item
            let weight = match k {
                1 => 0.9,
                0 => 0.5,
                _ => 0.1,
            } + ci as f32 * 0.01;
            markers.push((marker.clone(), weight));
            items.push(item(ch, TITLES[idx], &marker));
        }
    }
    let marker_refs: Vec<(&str, f32)> = markers.iter().map(|(m, w)| (m.as_str(), *w)).collect();
    let sc = scorer(&marker_refs);

    let sel = select(&items, TOPIC, 4, &sc, &sel_cfg(1, 4));
    assert_eq!(sel.cap, Some(1));
    assert_eq!(sel.items.len(), 4);
    for (ci, ch) in channels.iter().enumerate() {
        assert_eq!(count_channel(&sel.items, ch), 1);
        let picked = sel.items.iter().find(|s| s.item.channel == *ch).unwrap();
        assert_eq!(picked.item.title, TITLES[ci * 3 + 1]);
    }
}

#[test]
fn near_duplicates_keep_the_higher_scored_item() {
    let items = vec![
        item("a.test", "Central bank raises interest rates to 5%", "m01"),
        item("b.test", "Central Bank Raises Rates to 5%", "m02"),
        item("c.test", TITLES[0], "m03"),
    ];
    let sc = scorer(&[("m01", 0.1), ("m02", 0.8)]);
    let sel = select(&items, TOPIC, 3, &sc, &SelectionConfig::default());
    assert_eq!(sel.items.len(), 2);
    assert_eq!(sel.items[0].item.channel, "b.test");
    assert!(sel.items.iter().all(|s| s.item.channel != "a.test"));
}

#[test]
fn select_many_respects_each_quota_and_total() {
    let mut items = vec![
        item("a.test", TITLES[0], "m01"),
        item("b.test", TITLES[1], "m02"),
        item("c.test", TITLES[2], "m03"),
    ];
    let mut other = item("d.test", TITLES[3], "m04");
    other.topic = "markets".into();
    items.push(other);

    let quotas = vec![(TOPIC.to_string(), 2), ("markets".to_string(), 1)];
    let out = select_many(&items, &quotas, &scorer(&[]), &SelectionConfig::default());
    assert_eq!(out.len(), 3);
    assert_eq!(out.iter().filter(|s| s.item.topic == TOPIC).count(), 2);
    assert_eq!(out.iter().filter(|s| s.item.topic == "markets").count(), 1);
}
