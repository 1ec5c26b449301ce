//! Structured export: derives pages and typed blocks from converted text.
//!
//! Pages are delimited by form feeds. Within a page, blocks are runs of
//! non-blank lines, with Markdown headings, fenced code, table rows and list
//! items recognised as their own kinds. Every block span points into the
//! document content, so chunks built from blocks can be traced back exactly.

use crate::extract::PAGE_BREAK;
use crate::models::{Block, BlockKind, CharSpan, DocumentStructure, PageSpan};

/// Parses a Markdown ATX heading line into `(level, title)`.
pub fn markdown_heading(line: &str) -> Option<(u8, &str)> {
    let trimmed = line.trim_start();
    let hashes = trimmed.bytes().take_while(|b| *b == b'#').count();
    if hashes == 0 || hashes > 6 {
        return None;
    }
    let rest = &trimmed[hashes..];
    if !rest.is_empty() && !rest.starts_with(' ') && !rest.starts_with('\t') {
        return None;
    }
    let title = rest.trim().trim_end_matches('#').trim_end();
    Some((hashes as u8, title))
}

pub fn is_fence(line: &str) -> bool {
    let t = line.trim_start();
    t.starts_with("```") || t.starts_with("~~~")
}

fn is_table_line(line: &str) -> bool {
    line.trim_start().starts_with('|')
}

fn is_list_item(line: &str) -> bool {
    let t = line.trim_start();
    if t.starts_with("- ") || t.starts_with("* ") || t.starts_with("+ ") {
        return true;
    }
    let digits = t.bytes().take_while(|b| b.is_ascii_digit()).count();
    digits > 0 && (t[digits..].starts_with(". ") || t[digits..].starts_with(") "))
}

/// Yields `(start, content)` per line of `text`, without the line terminator.
pub(crate) fn lines_with_offsets(text: &str) -> impl Iterator<Item = (usize, &str)> {
    let mut offset = 0;
    text.split_inclusive('\n').map(move |raw| {
        let start = offset;
        offset += raw.len();
        (start, raw.trim_end_matches(['\n', '\r']))
    })
}

struct OpenBlock {
    kind: BlockKind,
    start: usize,
    end: usize,
}

struct PageScanner {
    page: u32,
    blocks: Vec<Block>,
    current: Option<OpenBlock>,
}

impl PageScanner {
    fn flush(&mut self) {
        if let Some(open) = self.current.take() {
            self.blocks.push(Block {
                kind: open.kind,
                page: self.page,
                span: CharSpan::new(open.start, open.end),
                bbox: None,
            });
        }
    }

    fn open(&mut self, kind: BlockKind, start: usize, end: usize) {
        self.flush();
        self.current = Some(OpenBlock { kind, start, end });
    }

    fn extend(&mut self, end: usize) {
        if let Some(open) = self.current.as_mut() {
            open.end = open.end.max(end);
        }
    }

    fn current_kind(&self) -> Option<BlockKind> {
        self.current.as_ref().map(|b| b.kind)
    }
}

fn scan_page(content: &str, page: u32, page_start: usize, blocks: &mut Vec<Block>) {
    let mut scanner = PageScanner {
        page,
        blocks: Vec::new(),
        current: None,
    };
    let mut in_fence = false;

    for (offset, line) in lines_with_offsets(content) {
        let trimmed = line.trim();
        let start = page_start + offset + (line.len() - line.trim_start().len());
        let end = page_start + offset + line.trim_end().len();

        if in_fence {
            scanner.extend(end);
            if is_fence(trimmed) {
                scanner.flush();
                in_fence = false;
            }
            continue;
        }

        if trimmed.is_empty() {
            scanner.flush();
            continue;
        }

        if is_fence(trimmed) {
            scanner.open(BlockKind::Code, start, end);
            in_fence = true;
            continue;
        }

        if let Some((level, _)) = markdown_heading(line) {
            scanner.open(BlockKind::Heading { level }, start, end);
            scanner.flush();
            continue;
        }

        if is_table_line(line) {
            if scanner.current_kind() == Some(BlockKind::Table) {
                scanner.extend(end);
            } else {
                scanner.open(BlockKind::Table, start, end);
            }
            continue;
        }

        if is_list_item(line) {
            scanner.open(BlockKind::ListItem, start, end);
            continue;
        }

        match scanner.current_kind() {
            Some(BlockKind::Paragraph) | Some(BlockKind::ListItem) => scanner.extend(end),
            _ => scanner.open(BlockKind::Paragraph, start, end),
        }
    }
    scanner.flush();
    blocks.append(&mut scanner.blocks);
}

/// Builds the page and block layout of `content`.
pub fn analyze(content: &str) -> DocumentStructure {
    let mut pages = Vec::new();
    let mut blocks = Vec::new();
    let mut start = 0;

    for (index, page_text) in content.split(PAGE_BREAK).enumerate() {
        let number = index as u32 + 1;
        let end = start + page_text.len();
        pages.push(PageSpan {
            number,
            span: CharSpan::new(start, end),
        });
        scan_page(page_text, number, start, &mut blocks);
        start = end + PAGE_BREAK.len_utf8();
    }

    DocumentStructure { pages, blocks }
}
