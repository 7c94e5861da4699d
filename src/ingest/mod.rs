// src/ingest/mod.rs
pub mod canonical;
pub mod feed;
pub mod fetcher;
pub mod mirrors;
pub mod orchestrator;
pub mod types;

use metrics::{describe_counter, describe_histogram};
use once_cell::sync::OnceCell;

pub use canonical::canonicalize;
pub use fetcher::HttpFetcher;
pub use mirrors::{MirrorExpander, TemplateMirrors};
pub use orchestrator::fetch_topic;
pub use types::{CacheTokens, FetchOutcome, Fetcher, Item, RawEntry, SourceDescriptor};

/// One-time metrics registration so series carry descriptions once a recorder is installed.
pub(crate) fn ensure_metrics_described() {
    static ONCE: OnceCell<()> = OnceCell::new();
    ONCE.get_or_init(|| {
        describe_counter!("ingest_items_total", "Items merged from completed fetches.");
        describe_counter!(
            "ingest_source_errors_total",
            "Sources whose fetch ended in a failed outcome."
        );
        describe_counter!(
            "ingest_deadline_dropped_total",
            "Sources abandoned because the topic deadline passed."
        );
        describe_counter!(
            "dedup_suppressed_total",
            "Items dropped because one of their keys was already seen."
        );
        describe_counter!("publish_failures_total", "Statuses the publisher rejected.");
        describe_histogram!("ingest_parse_ms", "Feed parse time in milliseconds.");
    });
}

/// Normalize feed text: decode entities, strip tags, fold typographic quotes,
/// collapse whitespace, cap at `max_chars` characters.
pub fn normalize_text(s: &str, max_chars: usize) -> String {
    // 1) HTML entity decode
    let mut out = html_escape::decode_html_entities(s).to_string();

    // 2) Strip HTML tags
    static RE_TAGS: OnceCell<regex::Regex> = OnceCell::new();
    let re_tags = RE_TAGS.get_or_init(|| regex::Regex::new(r"(?is)</?[^>]+>").unwrap());
    out = re_tags.replace_all(&out, " ").to_string();

    // 3) “ ” « » → ", ‘ ’ → '
    out = out
        .replace(['\u{201C}', '\u{201D}', '\u{00AB}', '\u{00BB}'], "\"")
        .replace(['\u{2018}', '\u{2019}'], "'");

    // 4) Collapse whitespace (incl. NBSP)
    static RE_WS: OnceCell<regex::Regex> = OnceCell::new();
    let re_ws = RE_WS.get_or_init(|| regex::Regex::new(r"[\s\u{00A0}]+").unwrap());
    out = re_ws.replace_all(&out, " ").trim().to_string();

    // 5) Length cap
    if out.chars().count() > max_chars {
        out = out.chars().take(max_chars).collect::<String>().trim_end().to_string();
    }

    out
}
