//! Per-page text extraction for PDF and DOCX uploads.
//!
//! MIME is inferred from the filename suffix; anything except PDF/DOCX is
//! rejected before parsing. PDF has two strategies:
//!
//! - **byte scan** (default): walk `BT…ET` text objects in the raw bytes
//!   and collect literal strings. Works on uncompressed content streams
//!   and needs no PDF object model. Multi-page documents are split
//!   proportionally across the declared page count, so page boundaries are
//!   approximate.
//! - **rich** (`PARSER_USE_RICH_PDF=true`): `pdf_extract` with real
//!   per-page enumeration.
//!
//! DOCX is a ZIP member walk over `word/document.xml`, emitted as a single
//! page. A parse failure never propagates: the file degrades to one
//! placeholder page carrying the diagnostic, and the rest of the pipeline
//! proceeds so the upload still gets a summary record.

use std::io::Read;

use thiserror::Error;

use crate::config::ParserConfig;
use crate::error::IngestError;
use crate::models::Page;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Mime {
    Pdf,
    Docx,
}

impl Mime {
    fn label(self) -> &'static str {
        match self {
            Mime::Pdf => "PDF",
            Mime::Docx => "DOCX",
        }
    }
}

#[derive(Debug, Error)]
enum ExtractError {
    #[error("PDF extraction failed: {0}")]
    Pdf(String),
    #[error("DOCX extraction failed: {0}")]
    Docx(String),
}

/// Extract the ordered page sequence for one uploaded file.
///
/// Returns `UnsupportedType` for unknown suffixes. Parse failures are
/// absorbed into a single placeholder page.
pub fn extract_pages(
    filename: &str,
    bytes: &[u8],
    parser: &ParserConfig,
) -> Result<Vec<Page>, IngestError> {
    let mime = infer_mime(filename)
        .ok_or_else(|| IngestError::UnsupportedType(filename.to_string()))?;

    let result = match mime {
        Mime::Pdf if parser.use_rich_pdf => extract_pdf_rich(bytes),
        Mime::Pdf => extract_pdf_scan(bytes),
        Mime::Docx => extract_docx(bytes).map(|text| {
            vec![Page {
                number: 1,
                text,
            }]
        }),
    };

    match result {
        Ok(pages) => Ok(pages),
        Err(e) => {
            tracing::warn!(filename, error = %e, "parse failed, emitting placeholder page");
            Ok(vec![Page {
                number: 1,
                text: format!(
                    "[{} Content - {} bytes - Parse error: {}]",
                    mime.label(),
                    bytes.len(),
                    e
                ),
            }])
        }
    }
}

fn infer_mime(filename: &str) -> Option<Mime> {
    let lower = filename.to_ascii_lowercase();
    if lower.ends_with(".pdf") {
        Some(Mime::Pdf)
    } else if lower.ends_with(".docx") {
        Some(Mime::Docx)
    } else {
        None
    }
}

// ============ PDF: rich strategy ============

fn extract_pdf_rich(bytes: &[u8]) -> Result<Vec<Page>, ExtractError> {
    let texts = pdf_extract::extract_text_from_mem_by_pages(bytes)
        .map_err(|e| ExtractError::Pdf(e.to_string()))?;
    Ok(texts
        .into_iter()
        .enumerate()
        .map(|(i, text)| Page {
            number: i as u32 + 1,
            text: collapse_whitespace(&text),
        })
        .collect())
}

// ============ PDF: byte-scan strategy ============

fn extract_pdf_scan(bytes: &[u8]) -> Result<Vec<Page>, ExtractError> {
    if !bytes.starts_with(b"%PDF") {
        return Err(ExtractError::Pdf("missing %PDF header".to_string()));
    }
    let text = scan_text_objects(bytes);
    let page_count = count_pages(bytes).max(1);
    Ok(split_proportionally(&text, page_count))
}

/// Collect literal strings inside `BT…ET` text objects. Strings outside a
/// text object are operands of other operators and skipped.
fn scan_text_objects(bytes: &[u8]) -> String {
    let mut out = String::new();
    let mut in_text_object = false;
    let mut i = 0usize;
    while i < bytes.len() {
        if !in_text_object {
            if matches_operator(bytes, i, b"BT") {
                in_text_object = true;
                i += 2;
            } else {
                i += 1;
            }
        } else if matches_operator(bytes, i, b"ET") {
            in_text_object = false;
            i += 2;
        } else if bytes[i] == b'(' {
            let (s, next) = read_literal_string(bytes, i);
            if !s.is_empty() {
                out.push_str(&s);
                out.push(' ');
            }
            i = next;
        } else {
            i += 1;
        }
    }
    collapse_whitespace(&out)
}

/// Operator tokens are delimited by whitespace or stream boundaries.
fn matches_operator(bytes: &[u8], i: usize, op: &[u8]) -> bool {
    if !bytes[i..].starts_with(op) {
        return false;
    }
    let before_ok = i == 0 || bytes[i - 1].is_ascii_whitespace();
    let after = i + op.len();
    let after_ok = after >= bytes.len() || bytes[after].is_ascii_whitespace();
    before_ok && after_ok
}

/// Read a PDF literal string starting at the `(` at `start`. Handles
/// backslash escapes, octal codes, and balanced nested parentheses.
/// Returns the decoded text and the index just past the closing `)`.
fn read_literal_string(bytes: &[u8], start: usize) -> (String, usize) {
    let mut out = String::new();
    let mut depth = 1usize;
    let mut i = start + 1;
    while i < bytes.len() && depth > 0 {
        match bytes[i] {
            b'\\' if i + 1 < bytes.len() => {
                let escaped = bytes[i + 1];
                i += 2;
                match escaped {
                    b'n' => out.push('\n'),
                    b'r' => out.push('\r'),
                    b't' => out.push('\t'),
                    b'(' => out.push('('),
                    b')' => out.push(')'),
                    b'\\' => out.push('\\'),
                    b'0'..=b'7' => {
                        let mut code = (escaped - b'0') as u32;
                        let mut digits = 1;
                        while digits < 3 && i < bytes.len() && bytes[i].is_ascii_digit() && bytes[i] < b'8' {
                            code = code * 8 + (bytes[i] - b'0') as u32;
                            i += 1;
                            digits += 1;
                        }
                        out.push((code.min(255) as u8) as char);
                    }
                    _ => out.push(escaped as char),
                }
            }
            b'(' => {
                depth += 1;
                out.push('(');
                i += 1;
            }
            b')' => {
                depth -= 1;
                if depth > 0 {
                    out.push(')');
                }
                i += 1;
            }
            b => {
                out.push(b as char);
                i += 1;
            }
        }
    }
    (out, i)
}

/// Count `/Type /Page` entries, excluding the `/Type /Pages` tree node.
fn count_pages(bytes: &[u8]) -> usize {
    let mut count = 0usize;
    for pattern in [b"/Type /Page" as &[u8], b"/Type/Page"] {
        let mut i = 0usize;
        while i + pattern.len() <= bytes.len() {
            if bytes[i..].starts_with(pattern) {
                let after = i + pattern.len();
                if after >= bytes.len() || bytes[after] != b's' {
                    count += 1;
                }
                i = after;
            } else {
                i += 1;
            }
        }
    }
    count
}

/// Divide the scanned text into `page_count` word groups of near-equal
/// size. The byte scan has no real page boundaries, so this keeps page
/// numbers monotone and spans plausible.
fn split_proportionally(text: &str, page_count: usize) -> Vec<Page> {
    if page_count <= 1 {
        return vec![Page {
            number: 1,
            text: text.to_string(),
        }];
    }
    let words: Vec<&str> = text.split_whitespace().collect();
    let base = words.len() / page_count;
    let remainder = words.len() % page_count;
    let mut pages = Vec::with_capacity(page_count);
    let mut cursor = 0usize;
    for number in 1..=page_count {
        let take = base + usize::from(number <= remainder);
        let slice = &words[cursor..cursor + take];
        cursor += take;
        pages.push(Page {
            number: number as u32,
            text: slice.join(" "),
        });
    }
    pages
}

// ============ DOCX ============

fn extract_docx(bytes: &[u8]) -> Result<String, ExtractError> {
    let mut archive = zip::ZipArchive::new(std::io::Cursor::new(bytes))
        .map_err(|e| ExtractError::Docx(e.to_string()))?;
    let mut xml = Vec::new();
    {
        let mut entry = archive
            .by_name("word/document.xml")
            .map_err(|_| ExtractError::Docx("word/document.xml not found".to_string()))?;
        entry
            .read_to_end(&mut xml)
            .map_err(|e| ExtractError::Docx(e.to_string()))?;
    }
    extract_w_t_elements(&xml)
}

/// Walk `w:t` text runs, inserting a newline at each paragraph end so the
/// chunker's heading heuristics still see line structure.
fn extract_w_t_elements(xml: &[u8]) -> Result<String, ExtractError> {
    use quick_xml::events::Event;

    let mut out = String::new();
    let mut reader = quick_xml::Reader::from_reader(xml);
    reader.config_mut().trim_text(false);
    let mut buf = Vec::new();
    let mut in_text_run = false;
    loop {
        match reader.read_event_into(&mut buf) {
            Ok(Event::Start(e)) if e.local_name().as_ref() == b"t" => in_text_run = true,
            Ok(Event::Text(t)) if in_text_run => {
                out.push_str(t.unescape().unwrap_or_default().as_ref());
            }
            Ok(Event::End(e)) => match e.local_name().as_ref() {
                b"t" => in_text_run = false,
                b"p" => out.push('\n'),
                _ => {}
            },
            Ok(Event::Eof) => break,
            Err(e) => return Err(ExtractError::Docx(e.to_string())),
            _ => {}
        }
        buf.clear();
    }
    Ok(out.trim().to_string())
}

fn collapse_whitespace(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn default_parser() -> ParserConfig {
        ParserConfig { use_rich_pdf: false }
    }

    fn single_page_pdf(text: &str) -> Vec<u8> {
        let mut out = Vec::new();
        out.extend_from_slice(b"%PDF-1.4\n");
        out.extend_from_slice(b"1 0 obj << /Type /Catalog /Pages 2 0 R >> endobj\n");
        out.extend_from_slice(b"2 0 obj << /Type /Pages /Kids [3 0 R] /Count 1 >> endobj\n");
        out.extend_from_slice(b"3 0 obj << /Type /Page /Parent 2 0 R >> endobj\n");
        out.extend_from_slice(
            format!("4 0 obj << >> stream\nBT ({}) Tj ET\nendstream endobj\n", text).as_bytes(),
        );
        out.extend_from_slice(b"%%EOF\n");
        out
    }

    #[test]
    fn infer_mime_by_suffix() {
        assert_eq!(infer_mime("a.pdf"), Some(Mime::Pdf));
        assert_eq!(infer_mime("A.PDF"), Some(Mime::Pdf));
        assert_eq!(infer_mime("notes.docx"), Some(Mime::Docx));
        assert_eq!(infer_mime("image.png"), None);
        assert_eq!(infer_mime("noext"), None);
    }

    #[test]
    fn unsupported_type_is_an_error() {
        let err = extract_pages("image.png", b"x", &default_parser()).unwrap_err();
        assert!(matches!(err, IngestError::UnsupportedType(_)));
    }

    #[test]
    fn scan_extracts_text_from_text_objects() {
        let pdf = single_page_pdf("Hello world");
        let pages = extract_pages("t.pdf", &pdf, &default_parser()).unwrap();
        assert_eq!(pages.len(), 1);
        assert_eq!(pages[0].number, 1);
        assert_eq!(pages[0].text, "Hello world");
    }

    #[test]
    fn scan_handles_escapes_and_nested_parens() {
        let (s, next) = read_literal_string(br"(a \(b\) (c) \\ d)", 0);
        assert_eq!(s, r"a (b) (c) \ d");
        assert_eq!(next, 18);
    }

    #[test]
    fn scan_decodes_octal_escapes() {
        let (s, _) = read_literal_string(br"(\101\102)", 0);
        assert_eq!(s, "AB");
    }

    #[test]
    fn count_pages_ignores_pages_tree_node() {
        let pdf = single_page_pdf("x");
        assert_eq!(count_pages(&pdf), 1);
    }

    #[test]
    fn multi_page_scan_splits_proportionally() {
        let pages = split_proportionally("a b c d e", 2);
        assert_eq!(pages.len(), 2);
        assert_eq!(pages[0].number, 1);
        assert_eq!(pages[0].text, "a b c");
        assert_eq!(pages[1].text, "d e");
    }

    #[test]
    fn bad_pdf_degrades_to_placeholder_page() {
        let pages = extract_pages("bad.pdf", b"not a pdf", &default_parser()).unwrap();
        assert_eq!(pages.len(), 1);
        assert!(pages[0].text.starts_with("[PDF Content - 9 bytes - Parse error:"));
    }

    #[test]
    fn docx_extracts_single_page_with_paragraphs() {
        use std::io::Write;
        let mut buf = Vec::new();
        {
            let mut zip = zip::ZipWriter::new(std::io::Cursor::new(&mut buf));
            zip.start_file("word/document.xml", zip::write::SimpleFileOptions::default())
                .unwrap();
            zip.write_all(
                b"<?xml version=\"1.0\"?><w:document xmlns:w=\"http://schemas.openxmlformats.org/wordprocessingml/2006/main\"><w:body><w:p><w:r><w:t>First para</w:t></w:r></w:p><w:p><w:r><w:t>Second para</w:t></w:r></w:p></w:body></w:document>",
            )
            .unwrap();
            zip.finish().unwrap();
        }
        let pages = extract_pages("doc.docx", &buf, &default_parser()).unwrap();
        assert_eq!(pages.len(), 1);
        assert_eq!(pages[0].number, 1);
        assert_eq!(pages[0].text, "First para\nSecond para");
    }

    #[test]
    fn bad_docx_degrades_to_placeholder_page() {
        let pages = extract_pages("bad.docx", b"not a zip", &default_parser()).unwrap();
        assert_eq!(pages.len(), 1);
        assert!(pages[0].text.contains("Parse error"));
        assert!(pages[0].text.starts_with("[DOCX Content"));
    }
}
