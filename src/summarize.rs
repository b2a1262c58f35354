//! Short summaries and chunk cleaning.
//!
//! [`cheap_summarize`] prefers the small LLM and falls back to naive
//! sentence truncation, so ingestion always produces a summary even with no
//! key configured. [`clean_chunk_text`] is pure and deterministic; it is
//! applied to every chunk before enrichment and storage.

use std::sync::OnceLock;

use regex::Regex;

use crate::llm::{ChatOpts, LlmClient};

/// Characters of input handed to the LLM; anything beyond is truncated.
/// Summaries of the head of a document are good enough for file cards.
const SUMMARY_INPUT_CAP: usize = 6000;

fn page_marker() -> &'static Regex {
    static PAGE_MARKER: OnceLock<Regex> = OnceLock::new();
    PAGE_MARKER.get_or_init(|| Regex::new(r"\[\[Page\s+\d+\]\]").unwrap())
}

/// Summarize `text` in at most `max_sentences` sentences. LLM-backed when a
/// key is available; otherwise the first `max_sentences` sentences of the
/// input, terminal punctuation preserved.
pub async fn cheap_summarize(llm: &LlmClient, text: &str, max_sentences: usize) -> String {
    let trimmed = text.trim();
    if trimmed.is_empty() {
        return String::new();
    }

    if llm.has_key() {
        let input = truncate_chars(trimmed, SUMMARY_INPUT_CAP);
        let system =
            "You are a precise summarizer. Reply with the summary only, no preface or commentary.";
        let user = format!(
            "Summarize the following in at most {} sentences:\n\n{}",
            max_sentences, input
        );
        let reply = llm
            .chat_once(system, &user, ChatOpts::small(220, 0.3))
            .await;
        if !reply.is_empty() {
            return reply;
        }
    }

    first_sentences(trimmed, max_sentences)
}

/// Normalize whitespace and strip the `[[Page N]]` markers the parser and
/// chunker insert between pages.
pub fn clean_chunk_text(text: &str) -> String {
    let without_markers = page_marker().replace_all(text, " ");
    without_markers
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
}

/// First `n` sentences of `text`, split on `.`, `!`, `?`. Input without
/// terminal punctuation comes back whole.
pub fn first_sentences(text: &str, n: usize) -> String {
    if n == 0 {
        return String::new();
    }
    let mut sentences = Vec::new();
    let mut start = 0usize;
    let mut iter = text.char_indices().peekable();
    while let Some((i, c)) = iter.next() {
        if matches!(c, '.' | '!' | '?') {
            let boundary = iter
                .peek()
                .map(|(_, next)| next.is_whitespace())
                .unwrap_or(true);
            if boundary {
                let sentence = text[start..i + c.len_utf8()].trim();
                if !sentence.is_empty() {
                    sentences.push(sentence);
                    if sentences.len() == n {
                        return sentences.join(" ");
                    }
                }
                start = i + c.len_utf8();
            }
        }
    }
    let tail = text[start..].trim();
    if !tail.is_empty() {
        sentences.push(tail);
    }
    sentences.join(" ")
}

fn truncate_chars(text: &str, cap: usize) -> &str {
    match text.char_indices().nth(cap) {
        Some((i, _)) => &text[..i],
        None => text,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn first_sentences_takes_n_and_keeps_punctuation() {
        let text = "One fish. Two fish! Red fish? Blue fish.";
        assert_eq!(first_sentences(text, 2), "One fish. Two fish!");
        assert_eq!(first_sentences(text, 3), "One fish. Two fish! Red fish?");
    }

    #[test]
    fn first_sentences_short_input_returned_whole() {
        assert_eq!(first_sentences("Just one sentence.", 3), "Just one sentence.");
        assert_eq!(first_sentences("no punctuation at all", 3), "no punctuation at all");
    }

    #[test]
    fn first_sentences_ignores_inline_dots() {
        let text = "Version 1.2 is out. It works.";
        assert_eq!(first_sentences(text, 1), "Version 1.2 is out.");
    }

    #[test]
    fn clean_strips_page_markers() {
        let text = "[[Page 1]] Hello   world [[Page 2]] again";
        assert_eq!(clean_chunk_text(text), "Hello world again");
    }

    #[test]
    fn clean_collapses_whitespace() {
        assert_eq!(clean_chunk_text("a\n\n b\t c"), "a b c");
    }

    #[test]
    fn truncate_respects_char_boundaries() {
        assert_eq!(truncate_chars("héllo", 2), "hé");
        assert_eq!(truncate_chars("ab", 10), "ab");
    }
}
