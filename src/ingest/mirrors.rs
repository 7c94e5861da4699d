// src/ingest/mirrors.rs
//! Expansion of channel handles into candidate mirror feed URLs.

/// Turns a channel handle into the feed URLs that may serve it.
pub trait MirrorExpander: Send + Sync {
    fn expand(&self, handle: &str) -> Vec<String>;
}

/// Expands `{handle}` in each configured URL template.
#[derive(Debug, Clone)]
pub struct TemplateMirrors {
    templates: Vec<String>,
}

pub const DEFAULT_MIRROR_TEMPLATES: &[&str] = &[
    "https://rsshub.app/telegram/channel/{handle}",
    "https://tg.i-c-a.su/rss/{handle}",
];

impl TemplateMirrors {
    pub fn new(templates: Vec<String>) -> Self {
        let templates = templates
            .into_iter()
            .map(|t| t.trim().to_string())
            .filter(|t| t.contains("{handle}"))
            .collect();
        Self { templates }
    }
}

impl MirrorExpander for TemplateMirrors {
    fn expand(&self, handle: &str) -> Vec<String> {
        let h = handle.trim().trim_start_matches('@');
        if h.is_empty() {
            return Vec::new();
        }
        self.templates
            .iter()
            .map(|t| t.replace("{handle}", h))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn expands_every_template() {
        let m = TemplateMirrors::new(vec![
            "https://a.test/{handle}".into(),
            "https://b.test/rss/{handle}.xml".into(),
            "https://no-placeholder.test/".into(),
        ]);
        assert_eq!(
            m.expand("@chan"),
            vec!["https://a.test/chan", "https://b.test/rss/chan.xml"]
        );
        assert!(m.expand("  ").is_empty());
    }
}
