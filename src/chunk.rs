//! Lossless document splitters.
//!
//! Two strategies turn a [`Document`] into [`Chunk`]s:
//!
//! - [`split_markdown`] cuts plain-text exports at Markdown headings and, when
//!   a chunk would exceed `max_tokens`, at paragraph starts.
//! - [`split_structured`] emits one chunk per block group (heading blocks plus
//!   the content block they introduce) and keeps page and span provenance.
//!
//! Both partition the content: concatenating the chunk texts in order yields
//! `Document::content` byte for byte. Blank lines and page breaks between
//! units stay attached to the preceding chunk.
//!
//! Each chunk gets a random UUID and a SHA-256 hash of its text.

use sha2::{Digest, Sha256};
use tracing::warn;
use uuid::Uuid;

use crate::models::{Block, BlockKind, BoundingBox, CharSpan, Chunk, ChunkMetadata, Document};
use crate::structure::{self, is_fence, lines_with_offsets, markdown_heading};

/// Approximate chars-per-token ratio.
const CHARS_PER_TOKEN: usize = 4;

/// A contiguous byte range of the content plus the metadata its chunk carries.
#[derive(Debug)]
struct Piece {
    start: usize,
    end: usize,
    meta: ChunkMetadata,
}

/// Splits `doc` with the strategy matching how it was exported: documents
/// carrying a structure use the block splitter, the rest the Markdown one.
pub fn split(doc: &Document, max_tokens: usize) -> Vec<Chunk> {
    let chunks = if doc.structure.is_some() {
        split_structured(doc, max_tokens)
    } else {
        split_markdown(doc, max_tokens)
    };
    if chunks.is_empty() {
        warn!(source = %doc.source, "document has no text; no chunks produced");
    }
    chunks
}

/// Generic-structure splitter for plain-text exports.
pub fn split_markdown(doc: &Document, max_tokens: usize) -> Vec<Chunk> {
    let content = doc.content.as_str();
    if content.trim().is_empty() {
        return Vec::new();
    }
    let max_chars = max_tokens.max(1) * CHARS_PER_TOKEN;

    let units = markdown_units(content);
    let mut trail: Vec<(u8, String)> = Vec::new();
    let mut pieces: Vec<Piece> = Vec::new();
    let mut current: Option<Piece> = None;

    for (i, unit) in units.iter().enumerate() {
        let end = units.get(i + 1).map_or(content.len(), |next| next.start);
        if let Some((level, title)) = &unit.heading {
            push_heading(&mut trail, *level, title);
        }
        match current.as_mut() {
            Some(open) if unit.heading.is_none() && end - open.start <= max_chars => {
                open.end = end;
            }
            _ => {
                if let Some(done) = current.take() {
                    pieces.push(done);
                }
                current = Some(Piece {
                    start: unit.start,
                    end,
                    meta: ChunkMetadata {
                        source: doc.source.clone(),
                        file_name: doc.file_name.clone(),
                        headings: trail_titles(&trail),
                        ..Default::default()
                    },
                });
            }
        }
    }
    if let Some(done) = current.take() {
        pieces.push(done);
    }

    let pieces = fold_whitespace(content, enforce_limit(content, pieces, max_chars));
    into_chunks(doc, pieces)
}

/// Format-native splitter for structured exports.
///
/// Falls back to analysing the content when the document has no structure.
pub fn split_structured(doc: &Document, max_tokens: usize) -> Vec<Chunk> {
    let content = doc.content.as_str();
    if content.trim().is_empty() {
        return Vec::new();
    }
    let max_chars = max_tokens.max(1) * CHARS_PER_TOKEN;

    let analyzed;
    let structure = match &doc.structure {
        Some(s) => s,
        None => {
            analyzed = structure::analyze(content);
            &analyzed
        }
    };

    let blocks: Vec<&Block> = structure
        .blocks
        .iter()
        .filter(|b| b.span.end <= content.len() && content.get(b.span.start..b.span.end).is_some())
        .collect();
    if blocks.is_empty() {
        // Text without recognisable blocks still has to be covered.
        let piece = Piece {
            start: 0,
            end: content.len(),
            meta: ChunkMetadata {
                source: doc.source.clone(),
                file_name: doc.file_name.clone(),
                page: structure.pages.first().map(|p| p.number),
                ..Default::default()
            },
        };
        return finish_structured(doc, vec![piece], max_chars);
    }

    let mut trail: Vec<(u8, String)> = Vec::new();
    let mut groups: Vec<(Vec<&Block>, Vec<String>)> = Vec::new();
    let mut pending: Vec<&Block> = Vec::new();

    for block in blocks {
        let page_changed = pending.last().is_some_and(|last| last.page != block.page);
        if page_changed {
            groups.push((std::mem::take(&mut pending), trail_titles(&trail)));
        }
        if let BlockKind::Heading { level } = block.kind {
            let line = &content[block.span.start..block.span.end];
            let title = markdown_heading(line).map_or(line.trim(), |(_, t)| t);
            push_heading(&mut trail, level, title);
            pending.push(block);
            continue;
        }
        pending.push(block);
        groups.push((std::mem::take(&mut pending), trail_titles(&trail)));
    }
    if !pending.is_empty() {
        groups.push((pending, trail_titles(&trail)));
    }

    let mut pieces = Vec::with_capacity(groups.len());
    for (i, (group, headings)) in groups.iter().enumerate() {
        let start = if i == 0 { 0 } else { group[0].span.start };
        let end = groups
            .get(i + 1)
            .map_or(content.len(), |(next, _)| next[0].span.start);
        pieces.push(Piece {
            start,
            end,
            meta: ChunkMetadata {
                source: doc.source.clone(),
                file_name: doc.file_name.clone(),
                headings: headings.clone(),
                page: Some(group[0].page),
                bbox: union_bbox(group),
                char_span: None,
                kinds: group.iter().map(|b| b.kind).collect(),
            },
        });
    }

    finish_structured(doc, pieces, max_chars)
}

fn finish_structured(doc: &Document, pieces: Vec<Piece>, max_chars: usize) -> Vec<Chunk> {
    let content = doc.content.as_str();
    let mut pieces = fold_whitespace(content, enforce_limit(content, pieces, max_chars));
    for piece in &mut pieces {
        piece.meta.char_span = Some(CharSpan::new(piece.start, piece.end));
    }
    into_chunks(doc, pieces)
}

struct Unit {
    start: usize,
    heading: Option<(u8, String)>,
}

/// Unit starts for the Markdown splitter: every heading line and every
/// paragraph that follows a blank line. The first unit always starts at 0.
fn markdown_units(content: &str) -> Vec<Unit> {
    let mut units = Vec::new();
    let mut prev_blank = true;
    let mut in_fence = false;

    for (offset, line) in lines_with_offsets(content) {
        let blank = line.trim().is_empty();
        if in_fence {
            if is_fence(line) {
                in_fence = false;
            }
            prev_blank = false;
            continue;
        }
        if is_fence(line) {
            in_fence = true;
            if prev_blank {
                units.push(Unit { start: offset, heading: None });
            }
            prev_blank = false;
            continue;
        }
        if !blank {
            if let Some((level, title)) = markdown_heading(line) {
                units.push(Unit {
                    start: offset,
                    heading: Some((level, title.to_string())),
                });
            } else if prev_blank {
                units.push(Unit { start: offset, heading: None });
            }
        }
        prev_blank = blank;
    }

    if let Some(first) = units.first_mut() {
        first.start = 0;
    }
    units
}

fn push_heading(trail: &mut Vec<(u8, String)>, level: u8, title: &str) {
    trail.retain(|(l, _)| *l < level);
    trail.push((level, title.to_string()));
}

fn trail_titles(trail: &[(u8, String)]) -> Vec<String> {
    trail.iter().map(|(_, t)| t.clone()).collect()
}

fn union_bbox(blocks: &[&Block]) -> Option<BoundingBox> {
    let mut boxes = blocks.iter().map(|b| b.bbox);
    let first = boxes.next()??;
    boxes.try_fold(first, |acc, b| b.map(|b| acc.union(&b)))
}

/// Hard-splits pieces longer than `max_chars`, preferring whitespace.
fn enforce_limit(content: &str, pieces: Vec<Piece>, max_chars: usize) -> Vec<Piece> {
    let mut out = Vec::with_capacity(pieces.len());
    for piece in pieces {
        if piece.end - piece.start <= max_chars {
            out.push(piece);
            continue;
        }
        for (start, end) in hard_split(content, piece.start, piece.end, max_chars) {
            out.push(Piece {
                start,
                end,
                meta: piece.meta.clone(),
            });
        }
    }
    out
}

/// Cuts `content[start..end]` into ranges of at most `max_chars` bytes.
///
/// Each cut lands just after the last whitespace character inside the
/// window; without whitespace it falls back to the last char boundary.
pub(crate) fn hard_split(content: &str, start: usize, end: usize, max_chars: usize) -> Vec<(usize, usize)> {
    let mut ranges = Vec::new();
    let mut pos = start;

    while end - pos > max_chars {
        let mut limit = pos + max_chars;
        while !content.is_char_boundary(limit) {
            limit -= 1;
        }
        let window = &content[pos..limit];
        let cut = window
            .char_indices()
            .rev()
            .find(|(_, c)| c.is_whitespace())
            .map(|(i, c)| pos + i + c.len_utf8())
            .filter(|cut| *cut > pos)
            .unwrap_or(limit);
        let cut = if cut > pos {
            cut
        } else {
            // A single char wider than the window.
            pos + content[pos..].chars().next().map_or(1, char::len_utf8)
        };
        ranges.push((pos, cut));
        pos = cut;
    }
    if pos < end {
        ranges.push((pos, end));
    }
    ranges
}

/// Merges whitespace-only pieces into the previous piece, or the next one
/// when they lead the document.
fn fold_whitespace(content: &str, pieces: Vec<Piece>) -> Vec<Piece> {
    let mut out: Vec<Piece> = Vec::with_capacity(pieces.len());
    let mut carry: Option<usize> = None;

    for mut piece in pieces {
        if content[piece.start..piece.end].trim().is_empty() {
            match out.last_mut() {
                Some(prev) => prev.end = piece.end,
                None => carry = Some(carry.unwrap_or(piece.start)),
            }
            continue;
        }
        if let Some(start) = carry.take() {
            piece.start = start;
        }
        out.push(piece);
    }
    out
}

fn into_chunks(doc: &Document, pieces: Vec<Piece>) -> Vec<Chunk> {
    pieces
        .into_iter()
        .enumerate()
        .map(|(index, piece)| {
            make_chunk(
                &doc.id,
                index as i64,
                &doc.content[piece.start..piece.end],
                piece.meta,
            )
        })
        .collect()
}

fn make_chunk(document_id: &str, index: i64, text: &str, metadata: ChunkMetadata) -> Chunk {
    let mut hasher = Sha256::new();
    hasher.update(text.as_bytes());
    let hash = format!("{:x}", hasher.finalize());

    Chunk {
        id: Uuid::new_v4().to_string(),
        document_id: document_id.to_string(),
        chunk_index: index,
        text: text.to_string(),
        hash,
        metadata,
    }
}
