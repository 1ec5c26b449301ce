//! Document loader: resolves a source reference and converts it to text.
//!
//! A source reference is a local file, a local directory (walked
//! recursively), or an `http(s)` URI fetched once. Each input is converted by
//! [`crate::extract`]; in structured export mode the document also carries
//! the block layout from [`crate::structure::analyze`].
//!
//! Failures surface as [`RagError::UnreachableSource`] when the input cannot
//! be read or fetched and [`RagError::Conversion`] when its bytes cannot be
//! turned into text.

use anyhow::Result;
use globset::{Glob, GlobSet, GlobSetBuilder};
use std::path::Path;
use std::time::Duration;
use tracing::{debug, info, warn};
use uuid::Uuid;
use walkdir::WalkDir;

use crate::config::LoaderConfig;
use crate::error::RagError;
use crate::extract;
use crate::models::{Document, ExportMode, SourceFormat};
use crate::structure;

/// Loads every document reachable from `source_ref`.
pub async fn load(
    source_ref: &str,
    export_mode: ExportMode,
    config: &LoaderConfig,
) -> Result<Vec<Document>> {
    if is_remote(source_ref) {
        let doc = fetch_uri(source_ref, export_mode, config).await?;
        return Ok(vec![doc]);
    }

    let path = Path::new(source_ref);
    let meta = std::fs::metadata(path).map_err(|e| RagError::unreachable(source_ref, e))?;

    let docs = if meta.is_dir() {
        load_directory(path, export_mode, config)?
    } else {
        let ext = extension_of(path);
        let format = config.format_for_extension(&ext).ok_or_else(|| {
            RagError::conversion(
                source_ref,
                format!("unsupported file extension '{}'", ext),
            )
        })?;
        vec![load_file(path, format, export_mode, config)?]
    };

    info!(
        source = source_ref,
        documents = docs.len(),
        mode = %export_mode,
        "loaded documents"
    );
    Ok(docs)
}

fn is_remote(source_ref: &str) -> bool {
    let lower = source_ref.to_ascii_lowercase();
    lower.starts_with("http://") || lower.starts_with("https://")
}

fn extension_of(path: &Path) -> String {
    path.extension()
        .map(|e| e.to_string_lossy().to_string())
        .unwrap_or_default()
}

fn load_directory(root: &Path, export_mode: ExportMode, config: &LoaderConfig) -> Result<Vec<Document>> {
    let mut excludes = vec![
        "**/.git/**".to_string(),
        "**/target/**".to_string(),
        "**/node_modules/**".to_string(),
    ];
    excludes.extend(config.exclude_globs.iter().cloned());
    let exclude_set = build_globset(&excludes)?;

    let mut files = Vec::new();
    for entry in WalkDir::new(root).follow_links(config.follow_symlinks) {
        let entry = entry.map_err(|e| RagError::unreachable(root.display().to_string(), e))?;
        if !entry.file_type().is_file() {
            continue;
        }
        let path = entry.path();
        let relative = path.strip_prefix(root).unwrap_or(path);
        let rel_str = relative.to_string_lossy().to_string();

        if exclude_set.is_match(&rel_str) {
            debug!(path = %rel_str, "excluded");
            continue;
        }
        match config.format_for_extension(&extension_of(path)) {
            Some(format) => files.push((path.to_path_buf(), format)),
            None => debug!(path = %rel_str, "skipping unmapped extension"),
        }
    }

    // Deterministic ordering
    files.sort_by(|a, b| a.0.cmp(&b.0));

    if files.is_empty() {
        warn!(root = %root.display(), "no convertible files found");
    }

    files
        .iter()
        .map(|(path, format)| load_file(path, *format, export_mode, config))
        .collect()
}

fn load_file(
    path: &Path,
    format: SourceFormat,
    export_mode: ExportMode,
    config: &LoaderConfig,
) -> Result<Document> {
    let source = path.display().to_string();
    let size = std::fs::metadata(path)
        .map_err(|e| RagError::unreachable(&source, e))?
        .len();
    if size > config.max_file_bytes {
        return Err(RagError::conversion(
            &source,
            format!("file is {} bytes, limit is {}", size, config.max_file_bytes),
        )
        .into());
    }
    let bytes = std::fs::read(path).map_err(|e| RagError::unreachable(&source, e))?;

    let file_name = path
        .file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_else(|| source.clone());

    debug!(path = %source, format = ?format, bytes = bytes.len(), "converting");
    convert(source, file_name, format, &bytes, export_mode)
}

async fn fetch_uri(uri: &str, export_mode: ExportMode, config: &LoaderConfig) -> Result<Document> {
    let url = reqwest::Url::parse(uri).map_err(|e| RagError::unreachable(uri, e))?;
    let client = reqwest::Client::builder()
        .timeout(Duration::from_secs(config.timeout_secs))
        .build()?;

    let resp = client
        .get(url.clone())
        .send()
        .await
        .map_err(|e| RagError::unreachable(uri, e))?;
    let status = resp.status();
    if !status.is_success() {
        return Err(RagError::unreachable(uri, format!("HTTP {}", status)).into());
    }

    let content_type = resp
        .headers()
        .get(reqwest::header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .map(str::to_string);

    let bytes = read_limited(uri, resp, config.max_file_bytes).await?;

    let file_name = url
        .path_segments()
        .and_then(|mut segs| segs.next_back())
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .or_else(|| url.host_str().map(str::to_string))
        .unwrap_or_else(|| uri.to_string());

    let format = content_type
        .as_deref()
        .and_then(SourceFormat::from_mime)
        .or_else(|| {
            Path::new(&file_name)
                .extension()
                .and_then(|e| config.format_for_extension(&e.to_string_lossy()))
        })
        .ok_or_else(|| {
            RagError::conversion(
                uri,
                format!(
                    "cannot determine format (content type {})",
                    content_type.as_deref().unwrap_or("missing")
                ),
            )
        })?;

    info!(uri, format = ?format, bytes = bytes.len(), "fetched");
    convert(uri.to_string(), file_name, format, &bytes, export_mode)
}

/// Reads the response body, failing as soon as it is known to exceed
/// `max_bytes`: from `Content-Length` when sent, otherwise while streaming.
async fn read_limited(uri: &str, mut resp: reqwest::Response, max_bytes: u64) -> Result<Vec<u8>> {
    let too_large = |size: u64| {
        RagError::conversion(
            uri,
            format!("response is over {} bytes, limit is {}", size, max_bytes),
        )
    };
    if let Some(declared) = resp.content_length() {
        if declared > max_bytes {
            return Err(too_large(declared).into());
        }
    }

    let mut body = Vec::new();
    while let Some(chunk) = resp
        .chunk()
        .await
        .map_err(|e| RagError::unreachable(uri, e))?
    {
        if (body.len() + chunk.len()) as u64 > max_bytes {
            return Err(too_large(max_bytes).into());
        }
        body.extend_from_slice(&chunk);
    }
    Ok(body)
}

fn convert(
    source: String,
    file_name: String,
    format: SourceFormat,
    bytes: &[u8],
    export_mode: ExportMode,
) -> Result<Document> {
    let extracted =
        extract::extract(bytes, format).map_err(|e| RagError::conversion(&source, e))?;

    let mut metadata = serde_json::Map::new();
    metadata.insert("file_name".into(), file_name.clone().into());
    metadata.insert("mime_type".into(), format.mime_type().into());
    metadata.insert("page_count".into(), extracted.page_count.into());
    metadata.insert("size_bytes".into(), (bytes.len() as u64).into());
    metadata.insert("export_mode".into(), export_mode.to_string().into());
    if let Some(title) = first_heading(&extracted.text) {
        metadata.insert("title".into(), title.into());
    }

    let structure = match export_mode {
        ExportMode::Structured => Some(structure::analyze(&extracted.text)),
        ExportMode::PlainText => None,
    };

    Ok(Document {
        id: Uuid::new_v4().to_string(),
        source,
        file_name,
        format,
        mime_type: format.mime_type().to_string(),
        content: extracted.text,
        metadata,
        structure,
    })
}

fn first_heading(text: &str) -> Option<String> {
    text.lines()
        .filter_map(structure::markdown_heading)
        .map(|(_, title)| title)
        .find(|title| !title.is_empty())
        .map(str::to_string)
}

fn build_globset(patterns: &[String]) -> Result<GlobSet> {
    let mut builder = GlobSetBuilder::new();
    for pattern in patterns {
        builder.add(Glob::new(pattern)?);
    }
    Ok(builder.build()?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::kind_of;
    use tempfile::TempDir;

    fn write(dir: &Path, rel: &str, content: &[u8]) {
        let path = dir.join(rel);
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).unwrap();
        }
        std::fs::write(path, content).unwrap();
    }

    #[tokio::test]
    async fn loads_single_markdown_file() {
        let tmp = TempDir::new().unwrap();
        write(tmp.path(), "guide.md", b"# Guide\n\nHello.\x0cPage two.");
        let path = tmp.path().join("guide.md");

        let docs = load(path.to_str().unwrap(), ExportMode::Structured, &LoaderConfig::default())
            .await
            .unwrap();
        assert_eq!(docs.len(), 1);
        let doc = &docs[0];
        assert_eq!(doc.file_name, "guide.md");
        assert_eq!(doc.format, SourceFormat::Markdown);
        assert_eq!(doc.metadata["page_count"], 2);
        assert_eq!(doc.metadata["title"], "Guide");
        assert_eq!(doc.metadata["export_mode"], "structured");
        assert_eq!(doc.structure.as_ref().unwrap().pages.len(), 2);
    }

    #[tokio::test]
    async fn plain_text_mode_has_no_structure() {
        let tmp = TempDir::new().unwrap();
        write(tmp.path(), "a.txt", b"just text");
        let path = tmp.path().join("a.txt");
        let docs = load(path.to_str().unwrap(), ExportMode::PlainText, &LoaderConfig::default())
            .await
            .unwrap();
        assert!(docs[0].structure.is_none());
        assert!(docs[0].metadata.get("title").is_none());
    }

    #[tokio::test]
    async fn missing_path_is_unreachable() {
        let err = load("/definitely/not/here.pdf", ExportMode::Structured, &LoaderConfig::default())
            .await
            .unwrap_err();
        assert!(matches!(kind_of(&err), Some(RagError::UnreachableSource { .. })));
    }

    #[tokio::test]
    async fn unmapped_extension_is_conversion_error() {
        let tmp = TempDir::new().unwrap();
        write(tmp.path(), "image.png", b"\x89PNG");
        let path = tmp.path().join("image.png");
        let err = load(path.to_str().unwrap(), ExportMode::Structured, &LoaderConfig::default())
            .await
            .unwrap_err();
        assert!(matches!(kind_of(&err), Some(RagError::Conversion { .. })));
    }

    #[tokio::test]
    async fn corrupt_pdf_is_conversion_error() {
        let tmp = TempDir::new().unwrap();
        write(tmp.path(), "broken.pdf", b"not a pdf at all");
        let path = tmp.path().join("broken.pdf");
        let err = load(path.to_str().unwrap(), ExportMode::Structured, &LoaderConfig::default())
            .await
            .unwrap_err();
        assert!(matches!(kind_of(&err), Some(RagError::Conversion { .. })));
    }

    #[tokio::test]
    async fn oversized_file_is_rejected() {
        let tmp = TempDir::new().unwrap();
        write(tmp.path(), "big.txt", &[b'a'; 64]);
        let config = LoaderConfig {
            max_file_bytes: 16,
            ..Default::default()
        };
        let path = tmp.path().join("big.txt");
        let err = load(path.to_str().unwrap(), ExportMode::PlainText, &config)
            .await
            .unwrap_err();
        assert!(matches!(kind_of(&err), Some(RagError::Conversion { .. })));
    }

    #[tokio::test]
    async fn directory_walk_is_sorted_and_filtered() {
        let tmp = TempDir::new().unwrap();
        write(tmp.path(), "b.md", b"B");
        write(tmp.path(), "a.txt", b"A");
        write(tmp.path(), "sub/c.md", b"C");
        write(tmp.path(), "drafts/d.md", b"D");
        write(tmp.path(), ".git/HEAD.md", b"ref");
        write(tmp.path(), "notes.rst", b"skipped");
        let config = LoaderConfig {
            exclude_globs: vec!["drafts/**".into()],
            ..Default::default()
        };

        let docs = load(tmp.path().to_str().unwrap(), ExportMode::PlainText, &config)
            .await
            .unwrap();
        let names: Vec<&str> = docs.iter().map(|d| d.content.as_str()).collect();
        assert_eq!(names, vec!["A", "B", "C"]);
    }

    #[tokio::test]
    async fn empty_directory_loads_nothing() {
        let tmp = TempDir::new().unwrap();
        let docs = load(tmp.path().to_str().unwrap(), ExportMode::Structured, &LoaderConfig::default())
            .await
            .unwrap();
        assert!(docs.is_empty());
    }
}
