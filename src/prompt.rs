//! Prompt assembly for answer generation.
//!
//! The default template is the classic question-answering prompt: the
//! retrieved context between separator lines, then the question. Custom
//! templates use the `{context}` and `{question}` placeholders.

use crate::models::RetrievedChunk;

pub const DEFAULT_QA_TEMPLATE: &str = "Context information is below.\n\
---------------------\n\
{context}\n\
---------------------\n\
Given the context information and not prior knowledge, answer the query.\n\
Query: {question}\n\
Answer: ";

/// Formats retrieved chunks as the prompt's context block.
///
/// Each chunk is preceded by its provenance lines (`file_name`, `page`,
/// `headings`, as available) and separated from the next by a blank line.
pub fn format_context(chunks: &[RetrievedChunk]) -> String {
    chunks
        .iter()
        .map(|chunk| {
            let meta = &chunk.metadata;
            let mut header = vec![format!("file_name: {}", meta.file_name)];
            if let Some(page) = meta.page {
                header.push(format!("page: {}", page));
            }
            if !meta.headings.is_empty() {
                header.push(format!("headings: {}", meta.headings.join(" > ")));
            }
            format!("{}\n\n{}", header.join("\n"), chunk.text.trim())
        })
        .collect::<Vec<_>>()
        .join("\n\n")
}

/// Substitutes `{context}` and `{question}` in one pass, so placeholder-like
/// text inside either value is left alone.
pub fn render(template: &str, context: &str, question: &str) -> String {
    let mut out = String::with_capacity(template.len() + context.len() + question.len());
    let mut rest = template;

    while let Some(open) = rest.find('{') {
        out.push_str(&rest[..open]);
        let tail = &rest[open..];
        if let Some(after) = tail.strip_prefix("{context}") {
            out.push_str(context);
            rest = after;
        } else if let Some(after) = tail.strip_prefix("{question}") {
            out.push_str(question);
            rest = after;
        } else {
            out.push('{');
            rest = &tail[1..];
        }
    }
    out.push_str(rest);
    out
}

/// Builds the full prompt for `question` from `chunks`.
pub fn build_prompt(template: Option<&str>, chunks: &[RetrievedChunk], question: &str) -> String {
    render(
        template.unwrap_or(DEFAULT_QA_TEMPLATE),
        &format_context(chunks),
        question,
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::ChunkMetadata;

    fn retrieved(text: &str, page: Option<u32>) -> RetrievedChunk {
        RetrievedChunk {
            id: "c1".into(),
            document_id: "d1".into(),
            text: text.into(),
            metadata: ChunkMetadata {
                source: "/docs/atlas.pdf".into(),
                file_name: "atlas.pdf".into(),
                headings: vec!["Europe".into()],
                page,
                ..Default::default()
            },
            score: 0.9,
        }
    }

    #[test]
    fn default_template_wraps_context_and_query() {
        let prompt = build_prompt(
            None,
            &[retrieved("Paris is the capital of France.\n", Some(2))],
            "What is the capital of France?",
        );
        assert!(prompt.starts_with("Context information is below.\n---------------------\n"));
        assert!(prompt.contains(
            "file_name: atlas.pdf\npage: 2\nheadings: Europe\n\nParis is the capital of France.\n---"
        ));
        assert!(prompt.ends_with("Query: What is the capital of France?\nAnswer: "));
    }

    #[test]
    fn chunks_are_blank_line_separated() {
        let ctx = format_context(&[retrieved("one", None), retrieved("two", None)]);
        assert_eq!(
            ctx,
            "file_name: atlas.pdf\nheadings: Europe\n\none\n\nfile_name: atlas.pdf\nheadings: Europe\n\ntwo"
        );
    }

    #[test]
    fn render_is_single_pass() {
        let out = render("Q={question} C={context} {other}", "has {question}", "asks {context}?");
        assert_eq!(out, "Q=asks {context}? C=has {question} {other}");
    }
}
