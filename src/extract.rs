//! Format conversion: raw bytes in, UTF-8 text out.
//!
//! Every converter keeps the page structure of its input by separating pages
//! with a form feed (`\x0c`): PDF pages, PowerPoint slides and Excel
//! worksheets each become one page. Word paragraphs styled as headings are
//! rendered as Markdown headings and spreadsheet rows as Markdown table
//! lines, so the structure analyser and the Markdown splitter can see them.

use quick_xml::events::Event;
use std::io::Read;
use thiserror::Error;

use crate::models::SourceFormat;

pub const MIME_PDF: &str = "application/pdf";
pub const MIME_DOCX: &str =
    "application/vnd.openxmlformats-officedocument.wordprocessingml.document";
pub const MIME_PPTX: &str =
    "application/vnd.openxmlformats-officedocument.presentationml.presentation";
pub const MIME_XLSX: &str = "application/vnd.openxmlformats-officedocument.spreadsheetml.sheet";

/// Page separator in extracted text.
pub const PAGE_BREAK: char = '\x0c';

const XLSX_MAX_SHEETS: usize = 100;
const XLSX_MAX_CELLS_PER_SHEET: usize = 100_000;
/// Zip-bomb guard for a single decompressed XML entry.
const MAX_XML_ENTRY_BYTES: u64 = 50 * 1024 * 1024;

#[derive(Debug, Error)]
pub enum ExtractError {
    #[error("text is not valid UTF-8: {0}")]
    Utf8(#[from] std::string::FromUtf8Error),
    #[error("PDF extraction failed: {0}")]
    Pdf(String),
    #[error("OOXML extraction failed: {0}")]
    Ooxml(String),
}

fn ooxml<E: ToString>(e: E) -> ExtractError {
    ExtractError::Ooxml(e.to_string())
}

/// Converted text plus the number of pages it spans.
#[derive(Debug, Clone, PartialEq)]
pub struct Extracted {
    pub text: String,
    pub page_count: usize,
}

impl Extracted {
    fn from_pages(pages: Vec<String>) -> Self {
        let page_count = pages.len().max(1);
        Self {
            text: pages.join(&PAGE_BREAK.to_string()),
            page_count,
        }
    }

    fn from_text(text: String) -> Self {
        let page_count = text.matches(PAGE_BREAK).count() + 1;
        Self { text, page_count }
    }
}

pub fn extract(bytes: &[u8], format: SourceFormat) -> Result<Extracted, ExtractError> {
    match format {
        SourceFormat::Markdown | SourceFormat::Text => {
            Ok(Extracted::from_text(String::from_utf8(bytes.to_vec())?))
        }
        SourceFormat::Pdf => extract_pdf(bytes).map(Extracted::from_pages),
        SourceFormat::Docx => extract_docx(bytes).map(Extracted::from_text),
        SourceFormat::Pptx => extract_pptx(bytes).map(Extracted::from_pages),
        SourceFormat::Xlsx => extract_xlsx(bytes).map(Extracted::from_pages),
    }
}

fn extract_pdf(bytes: &[u8]) -> Result<Vec<String>, ExtractError> {
    // pdf-extract panics on some malformed inputs instead of returning an error.
    let pages = std::panic::catch_unwind(|| pdf_extract::extract_text_from_mem_by_pages(bytes))
        .map_err(|_| ExtractError::Pdf("parser panicked on malformed input".to_string()))?
        .map_err(|e| ExtractError::Pdf(e.to_string()))?;
    Ok(pages
        .into_iter()
        .map(|p| p.replace(PAGE_BREAK, "\n"))
        .collect())
}

fn read_zip_entry_bounded(
    archive: &mut zip::ZipArchive<std::io::Cursor<&[u8]>>,
    name: &str,
    max_bytes: u64,
) -> Result<Vec<u8>, ExtractError> {
    let entry = archive.by_name(name).map_err(ooxml)?;
    let mut out = Vec::new();
    entry.take(max_bytes).read_to_end(&mut out).map_err(ooxml)?;
    if out.len() as u64 >= max_bytes {
        return Err(ExtractError::Ooxml(format!(
            "ZIP entry {} exceeds size limit ({} bytes)",
            name, max_bytes
        )));
    }
    Ok(out)
}

/// Entries matching `prefix<N>.xml`, ordered by `N`.
fn numbered_entries(
    archive: &zip::ZipArchive<std::io::Cursor<&[u8]>>,
    prefix: &str,
) -> Vec<String> {
    let mut names: Vec<String> = archive
        .file_names()
        .filter(|n| n.starts_with(prefix) && n.ends_with(".xml"))
        .map(|s| s.to_string())
        .collect();
    names.sort_by_key(|name| {
        name.trim_start_matches(prefix)
            .trim_end_matches(".xml")
            .parse::<u32>()
            .unwrap_or(u32::MAX)
    });
    names
}

fn extract_docx(bytes: &[u8]) -> Result<String, ExtractError> {
    let mut archive = zip::ZipArchive::new(std::io::Cursor::new(bytes)).map_err(ooxml)?;
    if !archive.file_names().any(|n| n == "word/document.xml") {
        return Err(ExtractError::Ooxml(
            "word/document.xml not found".to_string(),
        ));
    }
    let xml = read_zip_entry_bounded(&mut archive, "word/document.xml", MAX_XML_ENTRY_BYTES)?;
    docx_paragraphs(&xml)
}

/// Heading level for a Word paragraph style id (`Title`, `Heading2`, ...).
fn heading_level(style: &str) -> Option<u8> {
    let lower = style.to_ascii_lowercase().replace(' ', "");
    if lower == "title" {
        return Some(1);
    }
    if lower == "subtitle" {
        return Some(2);
    }
    lower
        .strip_prefix("heading")
        .and_then(|n| n.parse::<u8>().ok())
        .filter(|n| (1..=6).contains(n))
}

fn docx_paragraphs(xml: &[u8]) -> Result<String, ExtractError> {
    let mut reader = quick_xml::Reader::from_reader(xml);
    let mut buf = Vec::new();
    let mut out = String::new();
    let mut para = String::new();
    let mut heading: Option<u8> = None;
    let mut in_t = false;

    loop {
        match reader.read_event_into(&mut buf) {
            Ok(Event::Start(e)) => match e.local_name().as_ref() {
                b"p" => {
                    para.clear();
                    heading = None;
                }
                b"t" => in_t = true,
                _ => {}
            },
            Ok(Event::Empty(e)) => match e.local_name().as_ref() {
                b"pStyle" => {
                    for attr in e.attributes().flatten() {
                        if attr.key.local_name().as_ref() == b"val" {
                            let val = attr.unescape_value().map_err(ooxml)?;
                            heading = heading_level(&val);
                        }
                    }
                }
                b"tab" => para.push('\t'),
                b"br" => para.push('\n'),
                _ => {}
            },
            Ok(Event::Text(te)) if in_t => {
                para.push_str(te.unescape().map_err(ooxml)?.as_ref());
            }
            Ok(Event::End(e)) => match e.local_name().as_ref() {
                b"t" => in_t = false,
                b"p" => {
                    let text = para.trim();
                    if !text.is_empty() {
                        if !out.is_empty() {
                            out.push_str("\n\n");
                        }
                        if let Some(level) = heading {
                            out.push_str(&"#".repeat(level as usize));
                            out.push(' ');
                        }
                        out.push_str(text);
                    }
                    para.clear();
                }
                _ => {}
            },
            Ok(Event::Eof) => break,
            Err(e) => return Err(ooxml(e)),
            _ => {}
        }
        buf.clear();
    }
    Ok(out)
}

fn extract_pptx(bytes: &[u8]) -> Result<Vec<String>, ExtractError> {
    let mut archive = zip::ZipArchive::new(std::io::Cursor::new(bytes)).map_err(ooxml)?;
    let slides = numbered_entries(&archive, "ppt/slides/slide");
    if slides.is_empty() {
        return Err(ExtractError::Ooxml("no slides found".to_string()));
    }
    let mut pages = Vec::with_capacity(slides.len());
    for name in slides {
        let xml = read_zip_entry_bounded(&mut archive, &name, MAX_XML_ENTRY_BYTES)?;
        pages.push(slide_text(&xml)?);
    }
    Ok(pages)
}

/// One line per `a:p`, a blank line between shapes.
fn slide_text(xml: &[u8]) -> Result<String, ExtractError> {
    let mut reader = quick_xml::Reader::from_reader(xml);
    let mut buf = Vec::new();
    let mut shapes: Vec<String> = Vec::new();
    let mut lines: Vec<String> = Vec::new();
    let mut line = String::new();
    let mut in_t = false;

    loop {
        match reader.read_event_into(&mut buf) {
            Ok(Event::Start(e)) if e.local_name().as_ref() == b"t" => in_t = true,
            Ok(Event::Text(te)) if in_t => {
                line.push_str(te.unescape().map_err(ooxml)?.as_ref());
            }
            Ok(Event::End(e)) => match e.local_name().as_ref() {
                b"t" => in_t = false,
                b"p" => {
                    let text = line.trim();
                    if !text.is_empty() {
                        lines.push(text.to_string());
                    }
                    line.clear();
                }
                b"sp" => {
                    if !lines.is_empty() {
                        shapes.push(lines.join("\n"));
                        lines.clear();
                    }
                }
                _ => {}
            },
            Ok(Event::Eof) => break,
            Err(e) => return Err(ooxml(e)),
            _ => {}
        }
        buf.clear();
    }
    if !lines.is_empty() {
        shapes.push(lines.join("\n"));
    }
    Ok(shapes.join("\n\n"))
}

fn extract_xlsx(bytes: &[u8]) -> Result<Vec<String>, ExtractError> {
    let mut archive = zip::ZipArchive::new(std::io::Cursor::new(bytes)).map_err(ooxml)?;
    let shared_strings = if archive
        .file_names()
        .any(|n| n == "xl/sharedStrings.xml")
    {
        let xml = read_zip_entry_bounded(&mut archive, "xl/sharedStrings.xml", MAX_XML_ENTRY_BYTES)?;
        read_shared_strings(&xml)?
    } else {
        Vec::new()
    };
    let sheets = numbered_entries(&archive, "xl/worksheets/sheet");
    if sheets.is_empty() {
        return Err(ExtractError::Ooxml("no worksheets found".to_string()));
    }
    let mut pages = Vec::new();
    for name in sheets.into_iter().take(XLSX_MAX_SHEETS) {
        let xml = read_zip_entry_bounded(&mut archive, &name, MAX_XML_ENTRY_BYTES)?;
        pages.push(sheet_rows(&xml, &shared_strings)?);
    }
    Ok(pages)
}

/// Shared string table; rich-text runs inside one `si` are concatenated.
fn read_shared_strings(xml: &[u8]) -> Result<Vec<String>, ExtractError> {
    let mut reader = quick_xml::Reader::from_reader(xml);
    let mut buf = Vec::new();
    let mut strings = Vec::new();
    let mut current = String::new();
    let mut in_t = false;
    loop {
        match reader.read_event_into(&mut buf) {
            Ok(Event::Start(e)) => match e.local_name().as_ref() {
                b"si" => current.clear(),
                b"t" => in_t = true,
                _ => {}
            },
            Ok(Event::Text(te)) if in_t => {
                current.push_str(te.unescape().map_err(ooxml)?.as_ref());
            }
            Ok(Event::End(e)) => match e.local_name().as_ref() {
                b"t" => in_t = false,
                b"si" => strings.push(std::mem::take(&mut current)),
                _ => {}
            },
            Ok(Event::Eof) => break,
            Err(e) => return Err(ooxml(e)),
            _ => {}
        }
        buf.clear();
    }
    Ok(strings)
}

#[derive(Clone, Copy, PartialEq)]
enum CellType {
    Shared,
    Inline,
    Value,
}

/// Renders each non-empty row as `| a | b |`.
fn sheet_rows(xml: &[u8], shared_strings: &[String]) -> Result<String, ExtractError> {
    let mut reader = quick_xml::Reader::from_reader(xml);
    reader.config_mut().trim_text(true);
    let mut buf = Vec::new();
    let mut rows: Vec<String> = Vec::new();
    let mut cells: Vec<String> = Vec::new();
    let mut cell_type = CellType::Value;
    let mut in_value = false;
    let mut cell_count = 0usize;

    loop {
        if cell_count >= XLSX_MAX_CELLS_PER_SHEET {
            break;
        }
        match reader.read_event_into(&mut buf) {
            Ok(Event::Start(e)) => match e.local_name().as_ref() {
                b"row" => cells.clear(),
                b"c" => {
                    cell_type = CellType::Value;
                    for attr in e.attributes().flatten() {
                        if attr.key.local_name().as_ref() == b"t" {
                            cell_type = match attr.value.as_ref() {
                                b"s" => CellType::Shared,
                                b"inlineStr" => CellType::Inline,
                                _ => CellType::Value,
                            };
                        }
                    }
                }
                b"v" => in_value = true,
                b"t" if cell_type == CellType::Inline => in_value = true,
                _ => {}
            },
            Ok(Event::Text(te)) if in_value => {
                let raw = te.unescape().map_err(ooxml)?;
                let value = raw.trim();
                let resolved = match cell_type {
                    CellType::Shared => value
                        .parse::<usize>()
                        .ok()
                        .and_then(|i| shared_strings.get(i))
                        .cloned(),
                    CellType::Inline | CellType::Value => Some(value.to_string()),
                };
                if let Some(text) = resolved.filter(|t| !t.is_empty()) {
                    cells.push(text);
                    cell_count += 1;
                }
            }
            Ok(Event::End(e)) => match e.local_name().as_ref() {
                b"v" | b"t" => in_value = false,
                b"row" => {
                    if !cells.is_empty() {
                        rows.push(format!("| {} |", cells.join(" | ")));
                    }
                    cells.clear();
                }
                _ => {}
            },
            Ok(Event::Eof) => break,
            Err(e) => return Err(ooxml(e)),
            _ => {}
        }
        buf.clear();
    }
    Ok(rows.join("\n"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn zip_with(entries: &[(&str, &str)]) -> Vec<u8> {
        let mut buf = Vec::new();
        {
            let mut zip = zip::ZipWriter::new(std::io::Cursor::new(&mut buf));
            for (name, body) in entries {
                zip.start_file(*name, zip::write::SimpleFileOptions::default())
                    .unwrap();
                zip.write_all(body.as_bytes()).unwrap();
            }
            zip.finish().unwrap();
        }
        buf
    }

    const W_NS: &str = "xmlns:w=\"http://schemas.openxmlformats.org/wordprocessingml/2006/main\"";

    #[test]
    fn text_counts_form_feed_pages() {
        let out = extract(b"one\x0ctwo\x0cthree", SourceFormat::Text).unwrap();
        assert_eq!(out.page_count, 3);
        assert_eq!(out.text, "one\x0ctwo\x0cthree");
    }

    #[test]
    fn invalid_utf8_is_an_error() {
        let err = extract(&[0xff, 0xfe, 0x00], SourceFormat::Markdown).unwrap_err();
        assert!(matches!(err, ExtractError::Utf8(_)));
    }

    #[test]
    fn invalid_pdf_returns_error() {
        let err = extract(b"not a pdf", SourceFormat::Pdf).unwrap_err();
        assert!(matches!(err, ExtractError::Pdf(_)));
    }

    #[test]
    fn invalid_zip_returns_error_for_docx() {
        let err = extract(b"not a zip", SourceFormat::Docx).unwrap_err();
        assert!(matches!(err, ExtractError::Ooxml(_)));
    }

    #[test]
    fn docx_headings_become_markdown() {
        let xml = format!(
            "<?xml version=\"1.0\"?><w:document {W_NS}><w:body>\
             <w:p><w:pPr><w:pStyle w:val=\"Heading1\"/></w:pPr><w:r><w:t>Overview</w:t></w:r></w:p>\
             <w:p><w:r><w:t xml:space=\"preserve\">Rust is </w:t></w:r><w:r><w:t>fast.</w:t></w:r></w:p>\
             <w:p></w:p>\
             <w:p><w:r><w:t>Second paragraph.</w:t></w:r></w:p>\
             </w:body></w:document>"
        );
        let bytes = zip_with(&[("word/document.xml", &xml)]);
        let out = extract(&bytes, SourceFormat::Docx).unwrap();
        assert_eq!(out.text, "# Overview\n\nRust is fast.\n\nSecond paragraph.");
        assert_eq!(out.page_count, 1);
    }

    #[test]
    fn docx_without_body_is_an_error() {
        let bytes = zip_with(&[("word/other.xml", "<x/>")]);
        let err = extract(&bytes, SourceFormat::Docx).unwrap_err();
        assert!(err.to_string().contains("word/document.xml"));
    }

    #[test]
    fn pptx_slides_become_pages_in_order() {
        let slide = |text: &str| {
            format!(
                "<p:sld xmlns:p=\"p\" xmlns:a=\"a\"><p:cSld><p:spTree><p:sp><p:txBody>\
                 <a:p><a:r><a:t>{text}</a:t></a:r></a:p></p:txBody></p:sp></p:spTree></p:cSld></p:sld>"
            )
        };
        let s1 = slide("First slide");
        let s2 = slide("Second slide");
        let s10 = slide("Tenth slide");
        let bytes = zip_with(&[
            ("ppt/slides/slide10.xml", &s10),
            ("ppt/slides/slide2.xml", &s2),
            ("ppt/slides/slide1.xml", &s1),
        ]);
        let out = extract(&bytes, SourceFormat::Pptx).unwrap();
        assert_eq!(out.page_count, 3);
        assert_eq!(out.text, "First slide\x0cSecond slide\x0cTenth slide");
    }

    #[test]
    fn xlsx_rows_become_table_lines() {
        let shared = "<sst><si><t>city</t></si><si><t>country</t></si>\
                      <si><r><t>Par</t></r><r><t>is</t></r></si><si><t>France</t></si></sst>";
        let sheet = "<worksheet><sheetData>\
                     <row r=\"1\"><c r=\"A1\" t=\"s\"><v>0</v></c><c r=\"B1\" t=\"s\"><v>1</v></c><c r=\"C1\"><v>42</v></c></row>\
                     <row r=\"2\"><c r=\"A2\" t=\"s\"><v>2</v></c><c r=\"B2\" t=\"s\"><v>3</v></c></row>\
                     </sheetData></worksheet>";
        let bytes = zip_with(&[
            ("xl/sharedStrings.xml", shared),
            ("xl/worksheets/sheet1.xml", sheet),
        ]);
        let out = extract(&bytes, SourceFormat::Xlsx).unwrap();
        assert_eq!(out.text, "| city | country | 42 |\n| Paris | France |");
    }

    #[test]
    fn heading_styles() {
        assert_eq!(heading_level("Heading3"), Some(3));
        assert_eq!(heading_level("heading 2"), Some(2));
        assert_eq!(heading_level("Title"), Some(1));
        assert_eq!(heading_level("Normal"), None);
        assert_eq!(heading_level("Heading9"), None);
    }
}
