// src/ingest/feed.rs
//! RSS 2.0 / Atom parsing into [`RawEntry`] values.
use anyhow::{anyhow, Result};
use chrono::{DateTime, Utc};
use metrics::histogram;
use quick_xml::de::from_str;
use serde::Deserialize;
use time::format_description::well_known::{Rfc2822, Rfc3339};
use time::OffsetDateTime;

use crate::ingest::normalize_text;
use crate::ingest::types::RawEntry;

const TITLE_MAX_CHARS: usize = 300;
const SUMMARY_MAX_CHARS: usize = 1500;

#[derive(Debug, Deserialize)]
struct Rss {
    channel: Channel,
}

#[derive(Debug, Deserialize)]
struct Channel {
    #[serde(rename = "item", default)]
    items: Vec<RssItem>,
}

#[derive(Debug, Deserialize)]
struct RssItem {
    title: Option<String>,
    link: Option<String>,
    description: Option<String>,
    #[serde(rename = "pubDate")]
    pub_date: Option<String>,
    guid: Option<Text>,
}

#[derive(Debug, Deserialize)]
struct AtomFeed {
    #[serde(rename = "entry", default)]
    entries: Vec<AtomEntry>,
}

#[derive(Debug, Deserialize)]
struct AtomEntry {
    title: Option<Text>,
    #[serde(rename = "link", default)]
    links: Vec<AtomLink>,
    summary: Option<Text>,
    content: Option<Text>,
    published: Option<String>,
    updated: Option<String>,
    id: Option<String>,
}

#[derive(Debug, Deserialize)]
struct AtomLink {
    #[serde(rename = "@href")]
    href: Option<String>,
    #[serde(rename = "@rel")]
    rel: Option<String>,
}

/// Element whose text we want regardless of attributes (`<guid isPermaLink=..>`, `<title type=..>`).
#[derive(Debug, Deserialize)]
struct Text {
    #[serde(rename = "$text", default)]
    value: String,
}

/// Parse a feed document. RSS is tried first; Atom second.
/// Entries with no title, summary and link are skipped; at most `max_entries` are returned.
pub fn parse_feed(body: &str, max_entries: usize) -> Result<Vec<RawEntry>> {
    let t0 = std::time::Instant::now();
    let xml = scrub_html_entities_for_xml(body);

    let entries = if let Ok(rss) = from_str::<Rss>(&xml) {
        rss.channel.items.into_iter().map(from_rss).collect::<Vec<_>>()
    } else if xml.contains("<feed") {
        let atom: AtomFeed = from_str(&xml).map_err(|e| anyhow!("parsing atom xml: {e}"))?;
        atom.entries.into_iter().map(from_atom).collect()
    } else {
        return Err(anyhow!("unrecognized feed format"));
    };

    let out: Vec<RawEntry> = entries
        .into_iter()
        .filter(|e| !(e.title.is_empty() && e.summary.is_empty() && e.link.is_empty()))
        .take(max_entries)
        .collect();

    histogram!("ingest_parse_ms").record(t0.elapsed().as_secs_f64() * 1_000.0);
    Ok(out)
}

fn from_rss(it: RssItem) -> RawEntry {
    RawEntry {
        title: normalize_text(it.title.as_deref().unwrap_or_default(), TITLE_MAX_CHARS),
        link: it.link.unwrap_or_default().trim().to_string(),
        summary: normalize_text(
            it.description.as_deref().unwrap_or_default(),
            SUMMARY_MAX_CHARS,
        ),
        published: it.pub_date.as_deref().and_then(parse_date),
        id: it
            .guid
            .map(|g| g.value.trim().to_string())
            .filter(|s| !s.is_empty()),
    }
}

fn from_atom(e: AtomEntry) -> RawEntry {
    // rel="alternate" (or no rel) is the article link
    let link = e
        .links
        .iter()
        .find(|l| matches!(l.rel.as_deref(), None | Some("alternate")))
        .or_else(|| e.links.first())
        .and_then(|l| l.href.clone())
        .unwrap_or_default();
    let body = e.summary.or(e.content).map(|t| t.value).unwrap_or_default();
    RawEntry {
        title: normalize_text(
            e.title.map(|t| t.value).as_deref().unwrap_or_default(),
            TITLE_MAX_CHARS,
        ),
        link: link.trim().to_string(),
        summary: normalize_text(&body, SUMMARY_MAX_CHARS),
        published: e
            .published
            .as_deref()
            .or(e.updated.as_deref())
            .and_then(parse_date),
        id: e.id.map(|s| s.trim().to_string()).filter(|s| !s.is_empty()),
    }
}

/// RFC 2822 (RSS) or RFC 3339 (Atom); chrono picks up zone names `time` rejects.
pub fn parse_date(ts: &str) -> Option<DateTime<Utc>> {
    let ts = ts.trim();
    let unix = OffsetDateTime::parse(ts, &Rfc2822)
        .or_else(|_| OffsetDateTime::parse(ts, &Rfc3339))
        .map(|dt| dt.unix_timestamp())
        .ok()
        .or_else(|| {
            DateTime::parse_from_rfc2822(ts)
                .or_else(|_| DateTime::parse_from_rfc3339(ts))
                .map(|dt| dt.timestamp())
                .ok()
        })?;
    DateTime::<Utc>::from_timestamp(unix, 0)
}

fn scrub_html_entities_for_xml(s: &str) -> String {
    s.replace("&nbsp;", " ")
        .replace("&ndash;", "-")
        .replace("&mdash;", "-")
        .replace("&laquo;", "\"")
        .replace("&raquo;", "\"")
        .replace("&ldquo;", "\"")
        .replace("&rdquo;", "\"")
        .replace("&lsquo;", "'")
        .replace("&rsquo;", "'")
        .replace("&hellip;", "...")
}
