//! Built-in document parsers
//!
//! `CompositeParser` covers the formats the pipeline can parse without
//! external services: PDF (via `pdf-extract`), HTML (tag stripping), and
//! Markdown/plain text (passthrough). Office formats are recognized but
//! require a caller-supplied [`DocumentParser`] implementation.

use std::collections::BTreeMap;

use async_trait::async_trait;
use chrono::Utc;
use serde_json::Value;

use mnemo_core::{DocumentParser, MemoryError, ParsedDocument, Result};

/// Supported document formats, detected from the file extension
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DocumentFormat {
    /// Portable Document Format
    Pdf,
    /// Word (modern)
    Docx,
    /// Word (legacy)
    Doc,
    /// HTML page
    Html,
    /// Markdown
    Markdown,
    /// Plain text
    Txt,
    /// Rich Text Format
    Rtf,
    /// Excel (modern / legacy)
    Xlsx,
    /// PowerPoint (modern / legacy)
    Pptx,
}

impl DocumentFormat {
    /// Lowercase format tag, e.g. `"pdf"`
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Pdf => "pdf",
            Self::Docx => "docx",
            Self::Doc => "doc",
            Self::Html => "html",
            Self::Markdown => "md",
            Self::Txt => "txt",
            Self::Rtf => "rtf",
            Self::Xlsx => "xlsx",
            Self::Pptx => "pptx",
        }
    }
}

/// Detect a document format from its file name
///
/// # Errors
///
/// `Validation` for unknown extensions.
pub fn detect_format(filename: &str) -> Result<DocumentFormat> {
    let extension = filename
        .rsplit('.')
        .next()
        .map(str::to_ascii_lowercase)
        .unwrap_or_default();

    match extension.as_str() {
        "pdf" => Ok(DocumentFormat::Pdf),
        "docx" => Ok(DocumentFormat::Docx),
        "doc" => Ok(DocumentFormat::Doc),
        "html" | "htm" => Ok(DocumentFormat::Html),
        "md" | "markdown" => Ok(DocumentFormat::Markdown),
        "txt" | "text" => Ok(DocumentFormat::Txt),
        "rtf" => Ok(DocumentFormat::Rtf),
        "xlsx" | "xls" => Ok(DocumentFormat::Xlsx),
        "pptx" | "ppt" => Ok(DocumentFormat::Pptx),
        other => Err(MemoryError::Validation(format!(
            "unsupported document format {other:?} for {filename:?}"
        ))),
    }
}

/// Built-in parser for PDF, HTML, Markdown, and plain text
#[derive(Debug, Clone, Copy, Default)]
pub struct CompositeParser;

impl CompositeParser {
    /// Create the parser
    #[must_use]
    pub const fn new() -> Self {
        Self
    }

    fn base_metadata(bytes: &[u8], filename: &str, format: DocumentFormat) -> BTreeMap<String, Value> {
        let mut metadata = BTreeMap::new();
        metadata.insert("byte_size".to_string(), Value::from(bytes.len()));
        metadata.insert("format".to_string(), Value::from(format.as_str()));
        metadata.insert(
            "parsed_at".to_string(),
            Value::from(Utc::now().to_rfc3339()),
        );
        if let Some(mime) = mime_guess::from_path(filename).first_raw() {
            metadata.insert("mime_type".to_string(), Value::from(mime));
        }
        metadata
    }

    fn parse_pdf(bytes: &[u8]) -> Result<(String, usize)> {
        let content = pdf_extract::extract_text_from_mem(bytes)
            .map_err(|e| MemoryError::Validation(format!("PDF parse failed: {e}")))?;
        // Extracted pages are separated by form feeds.
        let page_count = if content.trim().is_empty() {
            0
        } else {
            content.matches('\u{c}').count() + 1
        };
        Ok((content, page_count))
    }

    fn parse_html(bytes: &[u8]) -> String {
        let raw = String::from_utf8_lossy(bytes);
        strip_html(&raw)
    }
}

#[async_trait]
impl DocumentParser for CompositeParser {
    async fn parse(&self, bytes: &[u8], filename: &str) -> Result<ParsedDocument> {
        let format = detect_format(filename)?;
        let mut metadata = Self::base_metadata(bytes, filename, format);

        let content = match format {
            DocumentFormat::Pdf => {
                let (content, page_count) = Self::parse_pdf(bytes)?;
                metadata.insert("page_count".to_string(), Value::from(page_count));
                content
            }
            DocumentFormat::Html => Self::parse_html(bytes),
            DocumentFormat::Markdown | DocumentFormat::Txt => {
                String::from_utf8_lossy(bytes).into_owned()
            }
            other => {
                return Err(MemoryError::Validation(format!(
                    "no built-in parser for {} documents; supply a DocumentParser implementation",
                    other.as_str()
                )))
            }
        };

        if content.trim().is_empty() {
            return Err(MemoryError::Validation(format!(
                "parsed document {filename:?} is empty"
            )));
        }

        Ok(ParsedDocument {
            content,
            format: format.as_str().to_string(),
            metadata,
            file_name: filename.to_string(),
        })
    }
}

/// Drop script/style blocks and tags, unescape common entities
fn strip_html(html: &str) -> String {
    let script = regex::Regex::new(r"(?is)<(script|style)[^>]*>.*?</(script|style)>")
        .expect("static regex");
    let tag = regex::Regex::new(r"(?s)<[^>]+>").expect("static regex");

    let without_blocks = script.replace_all(html, " ");
    let without_tags = tag.replace_all(&without_blocks, " ");

    let unescaped = without_tags
        .replace("&nbsp;", " ")
        .replace("&amp;", "&")
        .replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&quot;", "\"")
        .replace("&#39;", "'");

    // Collapse runs of whitespace introduced by tag removal.
    let spaces = regex::Regex::new(r"[ \t]{2,}").expect("static regex");
    spaces.replace_all(unescaped.trim(), " ").into_owned()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn plain_text_round_trips() {
        let parser = CompositeParser::new();
        let doc = parser
            .parse(b"He received the Nobel Prize.", "bio.txt")
            .await
            .unwrap();
        assert_eq!(doc.content, "He received the Nobel Prize.");
        assert_eq!(doc.format, "txt");
        assert_eq!(doc.metadata["byte_size"], Value::from(28));
        assert_eq!(doc.file_name, "bio.txt");
    }

    #[tokio::test]
    async fn metadata_carries_a_parse_timestamp() {
        let before = Utc::now();
        let parser = CompositeParser::new();
        let doc = parser.parse(b"timestamped content", "note.txt").await.unwrap();

        let stamp = doc.metadata["parsed_at"]
            .as_str()
            .expect("parsed_at is a string");
        let parsed_at = chrono::DateTime::parse_from_rfc3339(stamp)
            .expect("parsed_at is RFC 3339")
            .with_timezone(&Utc);
        assert!(parsed_at >= before && parsed_at <= Utc::now());
    }

    #[tokio::test]
    async fn markdown_is_passed_through() {
        let parser = CompositeParser::new();
        let doc = parser
            .parse(b"# Title\n\nBody text.", "notes.md")
            .await
            .unwrap();
        assert_eq!(doc.format, "md");
        assert!(doc.content.contains("# Title"));
    }

    #[tokio::test]
    async fn html_tags_are_stripped() {
        let parser = CompositeParser::new();
        let html = b"<html><head><style>p{color:red}</style></head>\
                     <body><p>Hello &amp; welcome</p></body></html>";
        let doc = parser.parse(html, "page.html").await.unwrap();
        assert!(doc.content.contains("Hello & welcome"));
        assert!(!doc.content.contains('<'));
        assert!(!doc.content.contains("color:red"));
    }

    #[tokio::test]
    async fn unknown_extension_is_rejected() {
        let parser = CompositeParser::new();
        let err = parser.parse(b"data", "archive.zip").await.unwrap_err();
        assert!(err.to_string().contains("unsupported"));
    }

    #[tokio::test]
    async fn office_formats_need_a_pluggable_parser() {
        let parser = CompositeParser::new();
        let err = parser.parse(b"data", "report.docx").await.unwrap_err();
        assert!(err.to_string().contains("DocumentParser"));
    }

    #[tokio::test]
    async fn empty_document_is_rejected() {
        let parser = CompositeParser::new();
        let err = parser.parse(b"   \n  ", "blank.txt").await.unwrap_err();
        assert!(err.to_string().contains("empty"));
    }

    #[test]
    fn format_detection_is_case_insensitive() {
        assert_eq!(detect_format("A.PDF").unwrap(), DocumentFormat::Pdf);
        assert_eq!(detect_format("b.HTM").unwrap(), DocumentFormat::Html);
        assert_eq!(detect_format("c.markdown").unwrap(), DocumentFormat::Markdown);
    }
}
