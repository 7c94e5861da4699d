// src/config/ai.rs
use serde::{Deserialize, Serialize};

pub const DEFAULT_CHAT_ENDPOINT: &str = "https://api.groq.com/openai/v1/chat/completions";
pub const DEFAULT_MODEL: &str = "llama-3.1-8b-instant";

fn default_system_prompt() -> String {
    "You are a concise, factual news editor. Summarize the item in 2-3 sentences, \
     strictly from the facts given, no speculation, no links, no hashtags."
        .to_string()
}

/// Remote summarizer settings. An empty `api_key` means "local summaries only".
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SummarizerConfig {
    pub enabled: bool,
    /// `"ENV"` is replaced by `GROQ_API_KEY` at startup.
    pub api_key: String,
    pub endpoint: String,
    pub model: String,
    pub max_output_tokens: u32,
    /// Attempts on 429 / transport errors before falling back to the local summary.
    pub max_retries: u32,
    pub timeout_secs: u64,
    pub system_prompt: String,
    /// Cap for the local extractive summary.
    pub local_max_chars: usize,
}

impl Default for SummarizerConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            api_key: "ENV".to_string(),
            endpoint: DEFAULT_CHAT_ENDPOINT.to_string(),
            model: DEFAULT_MODEL.to_string(),
            max_output_tokens: 320,
            max_retries: 3,
            timeout_secs: 60,
            system_prompt: default_system_prompt(),
            local_max_chars: 280,
        }
    }
}

impl SummarizerConfig {
    /// Resolve `"ENV"` against the given lookup; an unset variable leaves the key empty.
    pub fn resolve_api_key(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if self.api_key.trim().eq_ignore_ascii_case("env") {
            self.api_key = lookup("GROQ_API_KEY").unwrap_or_default();
        }
        self.api_key = self.api_key.trim().to_string();
    }

    pub fn has_remote(&self) -> bool {
        self.enabled && !self.api_key.is_empty()
    }
}
