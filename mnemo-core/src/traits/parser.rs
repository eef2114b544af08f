//! Document parser trait

use std::collections::BTreeMap;

use async_trait::async_trait;
use serde_json::Value;

use crate::error::Result;

/// Output of a document parse: Markdown-like plain text plus metadata
#[derive(Debug, Clone)]
pub struct ParsedDocument {
    /// Parsed content
    pub content: String,
    /// Original format tag, e.g. `"pdf"`, `"md"`
    pub format: String,
    /// Extracted metadata: byte size, MIME, page count for PDFs, timestamps
    pub metadata: BTreeMap<String, Value>,
    /// Original file name
    pub file_name: String,
}

/// Converts raw document bytes into parsed text
#[async_trait]
pub trait DocumentParser: Send + Sync {
    /// Parse `bytes` into text, detecting format from `filename`
    ///
    /// # Errors
    ///
    /// `Validation` for unsupported formats or oversized input, `Store`/`Io`
    /// for parse failures.
    async fn parse(&self, bytes: &[u8], filename: &str) -> Result<ParsedDocument>;
}
