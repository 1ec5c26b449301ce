//! Core data models used throughout docrag.
//!
//! These types represent the documents, chunks, and query results that flow
//! through the load → split → index → query pipeline.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// How the loader exports converted content for the splitter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExportMode {
    /// Generic text only; chunked on headings and paragraphs.
    PlainText,
    /// Attach format-native structure for block-level splitting with provenance.
    #[default]
    Structured,
}

impl FromStr for ExportMode {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "plain_text" | "plain-text" | "markdown" => Ok(ExportMode::PlainText),
            "structured" | "json" => Ok(ExportMode::Structured),
            other => anyhow::bail!(
                "Unknown export mode: '{}'. Use plain_text or structured.",
                other
            ),
        }
    }
}

impl fmt::Display for ExportMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ExportMode::PlainText => f.write_str("plain_text"),
            ExportMode::Structured => f.write_str("structured"),
        }
    }
}

/// Converter selected for a source, by extension or content type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SourceFormat {
    Markdown,
    Text,
    Pdf,
    Docx,
    Pptx,
    Xlsx,
}

impl SourceFormat {
    pub fn mime_type(self) -> &'static str {
        match self {
            SourceFormat::Markdown => "text/markdown",
            SourceFormat::Text => "text/plain",
            SourceFormat::Pdf => crate::extract::MIME_PDF,
            SourceFormat::Docx => crate::extract::MIME_DOCX,
            SourceFormat::Pptx => crate::extract::MIME_PPTX,
            SourceFormat::Xlsx => crate::extract::MIME_XLSX,
        }
    }

    /// Maps a `Content-Type` value (parameters ignored) back to a format.
    pub fn from_mime(content_type: &str) -> Option<Self> {
        let essence = content_type
            .split(';')
            .next()
            .unwrap_or("")
            .trim()
            .to_ascii_lowercase();
        match essence.as_str() {
            "text/markdown" | "text/x-markdown" => Some(SourceFormat::Markdown),
            "text/plain" => Some(SourceFormat::Text),
            crate::extract::MIME_PDF => Some(SourceFormat::Pdf),
            crate::extract::MIME_DOCX => Some(SourceFormat::Docx),
            crate::extract::MIME_PPTX => Some(SourceFormat::Pptx),
            crate::extract::MIME_XLSX => Some(SourceFormat::Xlsx),
            _ => None,
        }
    }
}

/// Byte range into a document's `content`, end exclusive.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CharSpan {
    pub start: usize,
    pub end: usize,
}

impl CharSpan {
    pub fn new(start: usize, end: usize) -> Self {
        Self { start, end }
    }
}

/// Page-space rectangle, in the converter's units.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BoundingBox {
    pub left: f32,
    pub top: f32,
    pub right: f32,
    pub bottom: f32,
}

impl BoundingBox {
    pub fn union(&self, other: &BoundingBox) -> BoundingBox {
        BoundingBox {
            left: self.left.min(other.left),
            top: self.top.min(other.top),
            right: self.right.max(other.right),
            bottom: self.bottom.max(other.bottom),
        }
    }
}

/// Structural unit kinds recognised in structured export.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "type")]
pub enum BlockKind {
    Heading { level: u8 },
    Paragraph,
    ListItem,
    Table,
    Code,
}

/// A semantic unit of a converted document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Block {
    pub kind: BlockKind,
    /// 1-based page number.
    pub page: u32,
    pub span: CharSpan,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bbox: Option<BoundingBox>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PageSpan {
    pub number: u32,
    pub span: CharSpan,
}

/// Format-native layout of a document, produced in structured export mode.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DocumentStructure {
    pub pages: Vec<PageSpan>,
    pub blocks: Vec<Block>,
}

/// A converted source document.
#[derive(Debug, Clone)]
pub struct Document {
    pub id: String,
    /// Path or URI the document was loaded from.
    pub source: String,
    pub file_name: String,
    pub format: SourceFormat,
    pub mime_type: String,
    /// Extracted text; pages are separated by a form feed.
    pub content: String,
    pub metadata: serde_json::Map<String, serde_json::Value>,
    pub structure: Option<DocumentStructure>,
}

/// Provenance and context carried by every chunk.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ChunkMetadata {
    pub source: String,
    pub file_name: String,
    /// Heading trail, outermost first.
    #[serde(default)]
    pub headings: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub page: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bbox: Option<BoundingBox>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub char_span: Option<CharSpan>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub kinds: Vec<BlockKind>,
}

/// A chunk of a document's content.
#[derive(Debug, Clone)]
pub struct Chunk {
    pub id: String,
    pub document_id: String,
    pub chunk_index: i64,
    pub text: String,
    pub hash: String,
    pub metadata: ChunkMetadata,
}

/// A chunk returned as evidence for an answer.
#[derive(Debug, Clone, Serialize)]
pub struct RetrievedChunk {
    pub id: String,
    pub document_id: String,
    pub text: String,
    pub metadata: ChunkMetadata,
    /// Cosine similarity to the question.
    pub score: f32,
}

/// Answer plus the evidence it was generated from.
#[derive(Debug, Clone, Serialize)]
pub struct QueryResult {
    pub answer: String,
    pub sources: Vec<RetrievedChunk>,
}
