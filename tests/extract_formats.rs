//! Integration tests for PDF and DOCX page extraction.
//!
//! Documents are built in-test: PDF bytes by hand (uncompressed content
//! streams, which the default byte-scan strategy reads), DOCX as a minimal
//! ZIP archive.

use studybuddy_ingest::config::ParserConfig;
use studybuddy_ingest::extract::extract_pages;

fn parser() -> ParserConfig {
    ParserConfig { use_rich_pdf: false }
}

/// Minimal single-page PDF with one text object.
fn one_page_pdf(text: &str) -> Vec<u8> {
    let mut out = Vec::new();
    out.extend_from_slice(b"%PDF-1.4\n");
    out.extend_from_slice(b"1 0 obj << /Type /Catalog /Pages 2 0 R >> endobj\n");
    out.extend_from_slice(b"2 0 obj << /Type /Pages /Kids [3 0 R] /Count 1 >> endobj\n");
    out.extend_from_slice(b"3 0 obj << /Type /Page /Parent 2 0 R /MediaBox [0 0 612 792] /Contents 4 0 R >> endobj\n");
    out.extend_from_slice(
        format!(
            "4 0 obj << /Length {} >> stream\nBT /F1 12 Tf 100 700 Td ({}) Tj ET\nendstream endobj\n",
            text.len() + 34,
            text
        )
        .as_bytes(),
    );
    out.extend_from_slice(b"%%EOF\n");
    out
}

/// Two-page PDF with a text object per page.
fn two_page_pdf(first: &str, second: &str) -> Vec<u8> {
    let mut out = Vec::new();
    out.extend_from_slice(b"%PDF-1.4\n");
    out.extend_from_slice(b"1 0 obj << /Type /Catalog /Pages 2 0 R >> endobj\n");
    out.extend_from_slice(b"2 0 obj << /Type /Pages /Kids [3 0 R 4 0 R] /Count 2 >> endobj\n");
    out.extend_from_slice(b"3 0 obj << /Type /Page /Parent 2 0 R /Contents 5 0 R >> endobj\n");
    out.extend_from_slice(b"4 0 obj << /Type /Page /Parent 2 0 R /Contents 6 0 R >> endobj\n");
    out.extend_from_slice(
        format!("5 0 obj << >> stream\nBT ({}) Tj ET\nendstream endobj\n", first).as_bytes(),
    );
    out.extend_from_slice(
        format!("6 0 obj << >> stream\nBT ({}) Tj ET\nendstream endobj\n", second).as_bytes(),
    );
    out.extend_from_slice(b"%%EOF\n");
    out
}

fn minimal_docx(paragraphs: &[&str]) -> Vec<u8> {
    use std::io::Write;
    let body: String = paragraphs
        .iter()
        .map(|p| format!("<w:p><w:r><w:t>{}</w:t></w:r></w:p>", p))
        .collect();
    let xml = format!(
        "<?xml version=\"1.0\"?><w:document xmlns:w=\"http://schemas.openxmlformats.org/wordprocessingml/2006/main\"><w:body>{}</w:body></w:document>",
        body
    );
    let mut buf = Vec::new();
    {
        let mut zip = zip::ZipWriter::new(std::io::Cursor::new(&mut buf));
        zip.start_file("word/document.xml", zip::write::SimpleFileOptions::default())
            .unwrap();
        zip.write_all(xml.as_bytes()).unwrap();
        zip.finish().unwrap();
    }
    buf
}

#[test]
fn pdf_single_page_text() {
    let pdf = one_page_pdf("Abstract Hello world.");
    let pages = extract_pages("T.pdf", &pdf, &parser()).unwrap();
    assert_eq!(pages.len(), 1);
    assert_eq!(pages[0].number, 1);
    assert_eq!(pages[0].text, "Abstract Hello world.");
}

#[test]
fn pdf_two_pages_split_with_monotone_numbers() {
    let pdf = two_page_pdf("alpha beta gamma", "delta epsilon zeta");
    let pages = extract_pages("two.pdf", &pdf, &parser()).unwrap();
    assert_eq!(pages.len(), 2);
    assert_eq!(pages[0].number, 1);
    assert_eq!(pages[1].number, 2);
    // Proportional split: six words over two pages.
    assert_eq!(pages[0].text.split_whitespace().count(), 3);
    assert_eq!(pages[1].text.split_whitespace().count(), 3);
    let all = format!("{} {}", pages[0].text, pages[1].text);
    assert_eq!(all, "alpha beta gamma delta epsilon zeta");
}

#[test]
fn docx_is_one_page_with_paragraph_breaks() {
    let docx = minimal_docx(&["Heading", "Body text here."]);
    let pages = extract_pages("notes.docx", &docx, &parser()).unwrap();
    assert_eq!(pages.len(), 1);
    assert_eq!(pages[0].text, "Heading\nBody text here.");
}

#[test]
fn corrupt_input_degrades_to_placeholder() {
    let pages = extract_pages("broken.pdf", b"garbage bytes", &parser()).unwrap();
    assert_eq!(pages.len(), 1);
    assert!(pages[0].text.contains("Parse error"));

    let pages = extract_pages("broken.docx", b"garbage bytes", &parser()).unwrap();
    assert_eq!(pages.len(), 1);
    assert!(pages[0].text.contains("Parse error"));
}

#[test]
fn unknown_suffix_is_rejected() {
    assert!(extract_pages("photo.png", b"\x89PNG", &parser()).is_err());
}
