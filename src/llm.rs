//! One-shot completions against an OpenAI-compatible chat endpoint.
//!
//! Two operations cover every LLM use in the pipeline: [`LlmClient::chat_once`]
//! for a plain text reply (topic labels, summaries) and
//! [`LlmClient::chat_json`] for structured output (segmentation). Both are
//! soft: a missing key, an HTTP failure, or an unparseable body yields an
//! empty string / [`JsonOutcome::Malformed`], never an error. The
//! orchestrator decides what degradation means; these helpers just report.
//!
//! Keys rotate statelessly: [`resolve_key`] scans an ordered list of env
//! var names and the first non-empty value wins, per call.

use std::time::Duration;

use anyhow::Result;
use serde_json::Value;

use crate::config::{LlmConfig, LLM_KEY_ENV_VARS};

/// Model tier, resolved to a concrete model name from config.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ModelClass {
    Small,
    Large,
}

#[derive(Debug, Clone, Copy)]
pub struct ChatOpts {
    pub model: ModelClass,
    pub max_tokens: u32,
    pub temperature: f32,
}

impl ChatOpts {
    pub fn small(max_tokens: u32, temperature: f32) -> ChatOpts {
        ChatOpts {
            model: ModelClass::Small,
            max_tokens,
            temperature,
        }
    }

    pub fn large(max_tokens: u32, temperature: f32) -> ChatOpts {
        ChatOpts {
            model: ModelClass::Large,
            max_tokens,
            temperature,
        }
    }
}

/// Result of asking for JSON: either a parsed value or the raw reply that
/// refused to parse through every extraction tier.
#[derive(Debug, Clone)]
pub enum JsonOutcome {
    Parsed(Value),
    Malformed(String),
}

impl JsonOutcome {
    pub fn parsed(self) -> Option<Value> {
        match self {
            JsonOutcome::Parsed(v) => Some(v),
            JsonOutcome::Malformed(_) => None,
        }
    }
}

pub struct LlmClient {
    http: reqwest::Client,
    config: LlmConfig,
}

impl LlmClient {
    pub fn new(config: &LlmConfig) -> Result<LlmClient> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;
        Ok(LlmClient {
            http,
            config: config.clone(),
        })
    }

    /// Whether any API key is currently configured. Callers use this to
    /// skip prompt construction entirely when the LLM is absent.
    pub fn has_key(&self) -> bool {
        resolve_key(LLM_KEY_ENV_VARS).is_some()
    }

    /// One-shot text completion. Returns a normalized single-line string,
    /// or an empty string on missing key / HTTP failure / empty reply.
    pub async fn chat_once(&self, system: &str, user: &str, opts: ChatOpts) -> String {
        match self.chat_raw(system, user, opts).await {
            Some(raw) => normalize_reply(&raw),
            None => String::new(),
        }
    }

    /// One-shot completion parsed as JSON through tiered extraction:
    /// strict parse, then fenced code block, then first bracketed span.
    pub async fn chat_json(&self, system: &str, user: &str, opts: ChatOpts) -> JsonOutcome {
        match self.chat_raw(system, user, opts).await {
            Some(raw) => extract_json(&raw),
            None => JsonOutcome::Malformed(String::new()),
        }
    }

    /// [`chat_json`] with one escalation: on a malformed reply, retry on
    /// the large model with double the token budget before giving up.
    pub async fn chat_json_robust(&self, system: &str, user: &str, opts: ChatOpts) -> Option<Value> {
        match self.chat_json(system, user, opts).await {
            JsonOutcome::Parsed(v) => Some(v),
            JsonOutcome::Malformed(raw) => {
                if !raw.is_empty() {
                    tracing::debug!(reply_len = raw.len(), "retrying malformed JSON on large model");
                }
                let retry = ChatOpts {
                    model: ModelClass::Large,
                    max_tokens: opts.max_tokens.saturating_mul(2),
                    temperature: opts.temperature,
                };
                self.chat_json(system, user, retry).await.parsed()
            }
        }
    }

    async fn chat_raw(&self, system: &str, user: &str, opts: ChatOpts) -> Option<String> {
        let key = resolve_key(LLM_KEY_ENV_VARS)?;
        let model = match opts.model {
            ModelClass::Small => &self.config.model_small,
            ModelClass::Large => &self.config.model_large,
        };
        let body = serde_json::json!({
            "model": model,
            "messages": [
                { "role": "system", "content": system },
                { "role": "user", "content": user },
            ],
            "max_tokens": opts.max_tokens,
            "temperature": opts.temperature,
        });
        let url = format!(
            "{}/chat/completions",
            self.config.base_url.trim_end_matches('/')
        );
        let response = self
            .http
            .post(&url)
            .header("Authorization", format!("Bearer {}", key))
            .json(&body)
            .send()
            .await
            .ok()?;
        if !response.status().is_success() {
            tracing::debug!(status = %response.status(), "chat completion returned non-OK");
            return None;
        }
        let json: Value = response.json().await.ok()?;
        let content = json
            .get("choices")?
            .get(0)?
            .get("message")?
            .get("content")?
            .as_str()?;
        Some(content.to_string())
    }
}

/// First usable key from an ordered list of env var names. A variable
/// that is set but blank does not shadow a later usable one.
pub fn resolve_key(names: &[&str]) -> Option<String> {
    names
        .iter()
        .find_map(|name| std::env::var(name).ok().filter(|v| !v.trim().is_empty()))
}

/// Tiered JSON extraction: strict parse, fenced ```…``` block, then the
/// widest `[…]` or `{…}` span.
pub fn extract_json(raw: &str) -> JsonOutcome {
    let trimmed = raw.trim();
    if let Ok(v) = serde_json::from_str::<Value>(trimmed) {
        return JsonOutcome::Parsed(v);
    }
    if let Some(inner) = fenced_block(trimmed) {
        if let Ok(v) = serde_json::from_str::<Value>(inner.trim()) {
            return JsonOutcome::Parsed(v);
        }
    }
    for (open, close) in [('[', ']'), ('{', '}')] {
        if let Some(span) = widest_span(trimmed, open, close) {
            if let Ok(v) = serde_json::from_str::<Value>(span) {
                return JsonOutcome::Parsed(v);
            }
        }
    }
    JsonOutcome::Malformed(raw.to_string())
}

fn fenced_block(text: &str) -> Option<&str> {
    let start = text.find("```")?;
    let after = &text[start + 3..];
    // skip an optional language tag on the opening fence
    let body_start = after.find('\n').map(|i| i + 1).unwrap_or(0);
    let body = &after[body_start..];
    let end = body.find("```")?;
    Some(&body[..end])
}

fn widest_span(text: &str, open: char, close: char) -> Option<&str> {
    let start = text.find(open)?;
    let end = text.rfind(close)?;
    if end <= start {
        return None;
    }
    Some(&text[start..=end])
}

/// Clean a conversational reply into a usable label or summary: strip
/// preface phrases, list markers, and wrapping quotes, and collapse
/// whitespace to single spaces.
pub fn normalize_reply(raw: &str) -> String {
    const PREFIXES: &[&str] = &[
        "sure,",
        "sure!",
        "sure:",
        "certainly,",
        "certainly!",
        "of course,",
        "here is",
        "here's",
        "here are",
        "this image shows",
        "the image shows",
        "caption:",
        "topic:",
        "title:",
        "summary:",
    ];

    let mut s = raw.trim();
    let mut changed = true;
    while changed {
        changed = false;
        for prefix in PREFIXES {
            if let Some(head) = s.get(..prefix.len()) {
                if head.eq_ignore_ascii_case(prefix) {
                    s = s[prefix.len()..].trim_start_matches([':', ',', '.', '-', ' ']);
                    changed = true;
                }
            }
        }
        for marker in ["- ", "* ", "• "] {
            if let Some(rest) = s.strip_prefix(marker) {
                s = rest.trim_start();
                changed = true;
            }
        }
    }

    let mut s = s.trim().to_string();
    for (open, close) in [('"', '"'), ('\'', '\''), ('“', '”')] {
        if s.len() >= 2 && s.starts_with(open) && s.ends_with(close) {
            s = s[open.len_utf8()..s.len() - close.len_utf8()].trim().to_string();
        }
    }

    s.split_whitespace().collect::<Vec<_>>().join(" ")
}
