//! Semantic chunking: pages in, retrieval-ready cards out.
//!
//! The page texts are assembled into one working document with `[[Page N]]`
//! markers, then segmented by the first strategy that works:
//!
//! 1. **LLM-assisted**: ask for a JSON array of coherent ~150-400 word
//!    chunks (large model past [`LLM_SEGMENT_THRESHOLD`] characters,
//!    small otherwise). Accepted only if the reply parses to a non-empty
//!    array of non-empty strings.
//! 2. **Deterministic fallback**: split at heading boundaries (Markdown
//!    ATX, numbered sections, underlined titles, `Chapter`/`Section`,
//!    common academic section names), then window each block to
//!    `CHUNK_MAX_WORDS` with `CHUNK_OVERLAP_WORDS` carried over from the
//!    end of the previous chunk. A terminal remainder shorter than
//!    `CHUNK_MIN_WORDS` is folded into the previous window rather than
//!    emitted as an undersized fragment.
//!
//! Each chunk is then cleaned, labeled with a topic, and summarized, with
//! at most [`ENRICH_CONCURRENCY`] LLM calls in flight and output order
//! preserved. Embeddings are assigned later by the orchestrator; cards
//! leave here with an empty vector.

use futures::stream::{self, StreamExt};
use regex::Regex;

use crate::config::ChunkingConfig;
use crate::llm::{ChatOpts, LlmClient};
use crate::models::{Card, Page};
use crate::summarize::{cheap_summarize, clean_chunk_text};

/// Documents longer than this go to the large model for segmentation.
const LLM_SEGMENT_THRESHOLD: usize = 200_000;

/// Concurrent topic/summary calls per file.
const ENRICH_CONCURRENCY: usize = 4;

/// Topic labels are truncated to this many characters.
const TOPIC_MAX_CHARS: usize = 120;

/// Build the ordered card list for one file.
pub async fn build_cards(
    llm: &LlmClient,
    chunking: &ChunkingConfig,
    user_id: &str,
    project_id: &str,
    filename: &str,
    pages: &[Page],
) -> Vec<Card> {
    let document = assemble_document(pages);
    if document.trim().is_empty() {
        return Vec::new();
    }

    let segments = match llm_segments(llm, &document).await {
        Some(segments) => segments,
        None => deterministic_segments(&document, chunking),
    };
    // Clean before numbering: a segment that is only page markers must not
    // consume a card id.
    let contents: Vec<String> = segments
        .iter()
        .map(|s| clean_chunk_text(s))
        .filter(|s| !s.is_empty())
        .collect();
    if contents.is_empty() {
        return Vec::new();
    }

    let page_span = [
        pages.first().map(|p| p.number).unwrap_or(1),
        pages.last().map(|p| p.number).unwrap_or(1),
    ];
    let slug = slugify(filename);

    stream::iter(contents.into_iter().enumerate())
        .map(|(i, content)| {
            let slug = slug.clone();
            async move {
                let topic = topic_label(llm, &content).await;
                let summary = cheap_summarize(llm, &content, 3).await;
                Card {
                    user_id: user_id.to_string(),
                    project_id: project_id.to_string(),
                    filename: filename.to_string(),
                    topic,
                    summary,
                    content,
                    page_span,
                    card_id: format!("{}-c{:04}", slug, i + 1),
                    embedding: Vec::new(),
                }
            }
        })
        .buffered(ENRICH_CONCURRENCY)
        .collect::<Vec<_>>()
        .await
}

/// Concatenate page texts, each prefixed with its `[[Page N]]` marker.
fn assemble_document(pages: &[Page]) -> String {
    let mut out = String::new();
    for page in pages {
        if page.text.trim().is_empty() {
            continue;
        }
        out.push_str(&format!("[[Page {}]]\n", page.number));
        out.push_str(page.text.trim_end());
        out.push('\n');
    }
    out
}

/// Ask the LLM for a JSON array of chunk strings. `None` on missing key,
/// malformed reply, or an empty/invalid array.
async fn llm_segments(llm: &LlmClient, document: &str) -> Option<Vec<String>> {
    if !llm.has_key() {
        return None;
    }
    let opts = if document.len() > LLM_SEGMENT_THRESHOLD {
        ChatOpts::large(4096, 0.2)
    } else {
        ChatOpts::small(4096, 0.2)
    };
    let system = "You segment documents for retrieval. Reply with a JSON array of strings \
                  only, no commentary.";
    let user = format!(
        "Split this document into self-contained chunks of roughly 150 to 400 words. \
         Keep sentences intact. Return a JSON array of strings.\n\n{}",
        document
    );
    let value = llm.chat_json_robust(system, &user, opts).await?;
    let array = value.as_array()?;
    if array.is_empty() {
        return None;
    }
    let mut segments = Vec::with_capacity(array.len());
    for item in array {
        let s = item.as_str()?.trim();
        if s.is_empty() {
            return None;
        }
        segments.push(s.to_string());
    }
    tracing::debug!(segments = segments.len(), "LLM segmentation accepted");
    Some(segments)
}

/// Heading-aware split followed by fixed-size sliding windows.
pub fn deterministic_segments(document: &str, chunking: &ChunkingConfig) -> Vec<String> {
    let mut chunks = Vec::new();
    for block in split_heading_blocks(document) {
        window_block(&block, chunking, &mut chunks);
    }
    chunks
}

/// Split at every recognized heading position, preserving the spans in
/// between. Text before the first heading is its own block.
fn split_heading_blocks(document: &str) -> Vec<String> {
    let patterns = [
        r"(?m)^#{1,6}\s+\S",
        r"(?m)^\d+(?:\.\d+)*[.)]?\s+\S",
        r"(?m)^[^\s][^\n]*\n(?:={3,}|-{3,})\s*$",
        r"(?mi)^(?:chapter|section)\s+\d+",
        r"(?mi)^(?:abstract|introduction|conclusion|references|bibliography)\s*:?\s*$",
    ];

    let mut boundaries: Vec<usize> = Vec::new();
    for pattern in patterns {
        let re = Regex::new(pattern).expect("heading pattern");
        boundaries.extend(re.find_iter(document).map(|m| m.start()));
    }
    boundaries.sort_unstable();
    boundaries.dedup();
    if boundaries.first() != Some(&0) {
        boundaries.insert(0, 0);
    }
    boundaries.push(document.len());

    boundaries
        .windows(2)
        .map(|w| document[w[0]..w[1]].trim())
        .filter(|block| !block.is_empty())
        .map(|block| block.to_string())
        .collect()
}

/// Emit `block` as chunks of at most `max_words`, each chunk after the
/// first prefixed with the last `overlap_words` words of its predecessor.
/// A block of exactly `max_words` stays one chunk. A terminal remainder
/// shorter than `min_words` is folded into the last window instead of
/// becoming its own fragment.
fn window_block(block: &str, chunking: &ChunkingConfig, out: &mut Vec<String>) {
    let words: Vec<&str> = block.split_whitespace().collect();
    if words.is_empty() {
        return;
    }
    if words.len() <= chunking.max_words {
        out.push(words.join(" "));
        return;
    }

    let mut start = 0usize;
    let mut prev_tail: Vec<&str> = Vec::new();
    while start < words.len() {
        let mut end = (start + chunking.max_words).min(words.len());
        if end < words.len() && words.len() - end < chunking.min_words {
            end = words.len();
        }
        let mut chunk_words = prev_tail.clone();
        chunk_words.extend_from_slice(&words[start..end]);
        out.push(chunk_words.join(" "));
        if end == words.len() {
            break;
        }
        let tail_start = end.saturating_sub(chunking.overlap_words);
        prev_tail = words[tail_start..end].to_vec();
        start = end;
    }
}

async fn topic_label(llm: &LlmClient, content: &str) -> String {
    if llm.has_key() {
        let head = truncate_chars(content, 2000);
        let reply = llm
            .chat_once(
                "You title document excerpts.",
                &format!(
                    "Provide a short topic title for this text. Reply with the title only, \
                     no preface:\n\n{}",
                    head
                ),
                ChatOpts::small(24, 0.2),
            )
            .await;
        if !reply.is_empty() {
            return truncate_chars(&reply, TOPIC_MAX_CHARS).to_string();
        }
    }
    let head = truncate_chars(content, 80);
    if head.len() < content.len() {
        format!("{}…", head)
    } else {
        head.to_string()
    }
}

/// Lowercased filename with every non-alphanumeric run collapsed to one
/// dash: `Lecture 3.PDF` becomes `lecture-3-pdf`.
pub fn slugify(filename: &str) -> String {
    let mut slug = String::with_capacity(filename.len());
    let mut prev_dash = true;
    for c in filename.chars() {
        if c.is_ascii_alphanumeric() {
            slug.push(c.to_ascii_lowercase());
            prev_dash = false;
        } else if !prev_dash {
            slug.push('-');
            prev_dash = true;
        }
    }
    while slug.ends_with('-') {
        slug.pop();
    }
    if slug.is_empty() {
        slug.push_str("file");
    }
    slug
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
    use crate::config::LlmConfig;

    fn chunking(max: usize, min: usize, overlap: usize) -> ChunkingConfig {
        ChunkingConfig {
            max_words: max,
            min_words: min,
            overlap_words: overlap,
        }
    }

    fn offline_llm() -> LlmClient {
        LlmClient::new(&LlmConfig {
            base_url: "http://localhost:0".into(),
            model_small: "small".into(),
            model_large: "large".into(),
            timeout_secs: 1,
        })
        .unwrap()
    }

    fn words(n: usize) -> String {
        (0..n).map(|i| format!("w{}", i)).collect::<Vec<_>>().join(" ")
    }

    #[test]
    fn slugify_examples() {
        assert_eq!(slugify("T.pdf"), "t-pdf");
        assert_eq!(slugify("Lecture 3.PDF"), "lecture-3-pdf");
        assert_eq!(slugify("___"), "file");
    }

    #[test]
    fn assemble_prefixes_page_markers() {
        let pages = vec![
            Page {
                number: 1,
                text: "alpha".into(),
            },
            Page {
                number: 2,
                text: "beta".into(),
            },
        ];
        let doc = assemble_document(&pages);
        assert!(doc.contains("[[Page 1]]\nalpha"));
        assert!(doc.contains("[[Page 2]]\nbeta"));
    }

    #[test]
    fn heading_blocks_split_on_atx_and_academic() {
        let doc = "preamble text\n# First\nbody one\nIntroduction\nbody two";
        let blocks = split_heading_blocks(doc);
        assert_eq!(blocks.len(), 3);
        assert!(blocks[0].starts_with("preamble"));
        assert!(blocks[1].starts_with("# First"));
        assert!(blocks[2].starts_with("Introduction"));
    }

    #[test]
    fn heading_blocks_split_on_underlines_and_numbers() {
        let doc = "Title\n====\nintro body\n1. Scope\nscope body\n2.1 Detail\ndetail body";
        let blocks = split_heading_blocks(doc);
        assert_eq!(blocks.len(), 3);
        assert!(blocks[0].starts_with("Title"));
        assert!(blocks[1].starts_with("1. Scope"));
        assert!(blocks[2].starts_with("2.1 Detail"));
    }

    #[test]
    fn block_at_exactly_max_words_is_one_chunk() {
        let mut out = Vec::new();
        window_block(&words(10), &chunking(10, 3, 2), &mut out);
        assert_eq!(out.len(), 1);
    }

    #[test]
    fn windows_carry_overlap_from_previous_chunk() {
        let mut out = Vec::new();
        window_block(&words(25), &chunking(10, 3, 2), &mut out);
        assert_eq!(out.len(), 3);
        let first: Vec<&str> = out[0].split_whitespace().collect();
        let second: Vec<&str> = out[1].split_whitespace().collect();
        assert_eq!(first.len(), 10);
        // second = 2 overlap words + next 10
        assert_eq!(second.len(), 12);
        assert_eq!(&second[..2], &first[8..]);
        // last chunk: 2 overlap + 5 remaining
        assert_eq!(out[2].split_whitespace().count(), 7);
    }

    #[test]
    fn windows_stay_within_max_overlap_and_folded_tail() {
        // 1900 words: three full windows, then 450 + a folded 100-word
        // remainder. Bound is max + overlap + (min - 1).
        let mut out = Vec::new();
        window_block(&words(1900), &chunking(450, 150, 50), &mut out);
        assert_eq!(out.len(), 4);
        for chunk in &out {
            assert!(chunk.split_whitespace().count() <= 450 + 50 + 149);
        }
        assert_eq!(out[3].split_whitespace().count(), 50 + 450 + 100);
    }

    #[test]
    fn terminal_remainder_below_min_folds_into_previous_window() {
        // 21 words at max 10 / min 5: the one-word tail joins the second
        // window instead of standing alone.
        let mut out = Vec::new();
        window_block(&words(21), &chunking(10, 5, 2), &mut out);
        assert_eq!(out.len(), 2);
        assert_eq!(out[0].split_whitespace().count(), 10);
        assert_eq!(out[1].split_whitespace().count(), 2 + 11);
        for chunk in &out {
            assert!(chunk.split_whitespace().count() >= 5);
        }
    }

    #[test]
    fn coverage_every_word_appears() {
        let block = words(1234);
        let mut out = Vec::new();
        window_block(&block, &chunking(450, 150, 50), &mut out);
        let emitted = out.join(" ");
        for w in block.split_whitespace() {
            assert!(emitted.contains(w));
        }
    }

    #[tokio::test]
    async fn build_cards_offline_uses_deterministic_path() {
        let llm = offline_llm();
        let pages = vec![Page {
            number: 1,
            text: "Abstract\nHello world. This covers the basics of testing.".into(),
        }];
        let cards = build_cards(
            &llm,
            &chunking(450, 150, 50),
            "u1",
            "p1",
            "T.pdf",
            &pages,
        )
        .await;
        assert_eq!(cards.len(), 1);
        let card = &cards[0];
        assert_eq!(card.card_id, "t-pdf-c0001");
        assert_eq!(card.page_span, [1, 1]);
        assert!(!card.topic.is_empty());
        assert!(!card.summary.is_empty());
        assert!(card.embedding.is_empty());
        assert!(!card.content.contains("[[Page"));
    }

    #[tokio::test]
    async fn build_cards_empty_pages_yield_nothing() {
        let llm = offline_llm();
        let cards = build_cards(
            &llm,
            &chunking(450, 150, 50),
            "u1",
            "p1",
            "empty.pdf",
            &[],
        )
        .await;
        assert!(cards.is_empty());

        let blank = vec![Page {
            number: 1,
            text: "   ".into(),
        }];
        let cards = build_cards(
            &llm,
            &chunking(450, 150, 50),
            "u1",
            "p1",
            "blank.pdf",
            &blank,
        )
        .await;
        assert!(cards.is_empty());
    }

    #[tokio::test]
    async fn card_ids_follow_emission_order() {
        let llm = offline_llm();
        let text = format!("# One\n{}\n# Two\n{}", words(30), words(40));
        let pages = vec![Page {
            number: 1,
            text,
        }];
        let cards = build_cards(&llm, &chunking(20, 5, 3), "u1", "p1", "n.pdf", &pages).await;
        assert!(cards.len() >= 2);
        let mut ids: Vec<String> = cards.iter().map(|c| c.card_id.clone()).collect();
        let emitted = ids.clone();
        ids.sort();
        assert_eq!(ids, emitted);
    }
}
