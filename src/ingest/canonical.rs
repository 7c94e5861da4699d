// src/ingest/canonical.rs
//! URL canonicalization used as the primary dedup key.
//!
//! Rules, in order: lower-case host, strip leading `www.`, fold known mirror
//! hosts into one canonical host, drop tracking parameters (remaining params
//! sorted by key), drop the fragment, trim the trailing slash of non-root
//! paths. Telegram links lose their whole query string.
//!
//! Malformed input is returned unchanged so dedup degrades to "unique".

use url::Url;

/// Query keys removed outright. Anything starting with `utm_` goes too.
const TRACKING_PARAMS: &[&str] = &[
    "fbclid", "gclid", "dclid", "yclid", "msclkid", "mc_cid", "mc_eid", "igshid", "_hsenc",
    "_hsmi", "mkt_tok", "ref", "ref_src", "ref_url", "cmpid", "spm", "smid", "ito",
];

/// Mirror host → canonical host for the same platform.
const MIRROR_HOSTS: &[(&str, &str)] = &[
    ("mobile.twitter.com", "twitter.com"),
    ("x.com", "twitter.com"),
    ("mobile.x.com", "twitter.com"),
    ("nitter.net", "twitter.com"),
    ("m.youtube.com", "youtube.com"),
    ("m.facebook.com", "facebook.com"),
    ("telegram.me", "t.me"),
    ("telegram.dog", "t.me"),
    ("amp.theguardian.com", "theguardian.com"),
    ("mobile.reuters.com", "reuters.com"),
];

/// Hosts whose CDN appends volatile query parameters: the query is dropped entirely.
const QUERYLESS_HOSTS: &[&str] = &["t.me"];

fn is_tracking_param(key: &str) -> bool {
    let k = key.to_ascii_lowercase();
    k.starts_with("utm_") || TRACKING_PARAMS.contains(&k.as_str())
}

fn canonical_host(raw_host: &str) -> String {
    let mut host = raw_host.trim_end_matches('.').to_ascii_lowercase();
    while let Some(rest) = host.strip_prefix("www.") {
        host = rest.to_string();
    }
    MIRROR_HOSTS
        .iter()
        .find(|(mirror, _)| *mirror == host)
        .map(|(_, canon)| canon.to_string())
        .unwrap_or(host)
}

/// Canonicalize a URL; returns `""` for blank input and the input itself when unparsable.
pub fn canonicalize(raw: &str) -> String {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return String::new();
    }
    let Ok(mut url) = Url::parse(trimmed) else {
        return raw.to_string();
    };
    if url.cannot_be_a_base() {
        return raw.to_string();
    }
    let Some(host) = url.host_str().map(canonical_host) else {
        return raw.to_string();
    };
    if url.set_host(Some(&host)).is_err() {
        return raw.to_string();
    }

    if QUERYLESS_HOSTS.contains(&host.as_str()) {
        url.set_query(None);
    } else if url.query().is_some() {
        let mut pairs: Vec<(String, String)> = url
            .query_pairs()
            .filter(|(k, _)| !is_tracking_param(k))
            .map(|(k, v)| (k.into_owned(), v.into_owned()))
            .collect();
        // stable: repeated keys keep their relative order
        pairs.sort_by(|a, b| a.0.cmp(&b.0));
        if pairs.is_empty() {
            url.set_query(None);
        } else {
            let q = url::form_urlencoded::Serializer::new(String::new())
                .extend_pairs(&pairs)
                .finish();
            url.set_query(Some(&q));
        }
    }

    url.set_fragment(None);

    let path = url.path().to_string();
    if path.len() > 1 && path.ends_with('/') {
        let t = path.trim_end_matches('/');
        url.set_path(if t.is_empty() { "/" } else { t });
    }

    url.to_string()
}

/// Canonical host of a URL (lower-cased, `www.` stripped, mirrors folded).
pub fn host_of(raw: &str) -> Option<String> {
    let url = Url::parse(raw.trim()).ok()?;
    url.host_str()
        .map(canonical_host)
        .filter(|h| !h.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strips_tracking_and_sorts_remaining_params() {
        let u = "https://Example.com/a/b/?utm_source=x&z=1&fbclid=abc&a=2#frag";
        assert_eq!(canonicalize(u), "https://example.com/a/b?a=2&z=1");
    }

    #[test]
    fn folds_www_and_mirrors() {
        assert_eq!(
            canonicalize("https://www.x.com/user/status/1"),
            "https://twitter.com/user/status/1"
        );
        assert_eq!(
            canonicalize("https://mobile.twitter.com/user/status/1"),
            "https://twitter.com/user/status/1"
        );
    }

    #[test]
    fn telegram_links_lose_query() {
        assert_eq!(
            canonicalize("https://telegram.me/chan/123?single&cdn=9"),
            "https://t.me/chan/123"
        );
    }

    #[test]
    fn root_path_keeps_slash() {
        assert_eq!(canonicalize("https://example.com"), "https://example.com/");
        assert_eq!(canonicalize("https://example.com/"), "https://example.com/");
    }

    #[test]
    fn malformed_is_returned_unchanged() {
        assert_eq!(canonicalize("not a url"), "not a url");
        assert_eq!(canonicalize("   "), "");
    }

    #[test]
    fn host_of_strips_www() {
        assert_eq!(host_of("https://WWW.BBC.co.uk/news").as_deref(), Some("bbc.co.uk"));
        assert_eq!(host_of(""), None);
    }
}
