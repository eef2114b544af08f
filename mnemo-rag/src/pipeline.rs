//! Document ingestion pipeline
//!
//! Parse → chunk → domain-tag → embed → store. Each document is
//! all-or-nothing: the semantic store writes every record of the document
//! in one transaction, so a failed ingest leaves no partial state behind.

use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use serde_json::Value;
use sha2::{Digest, Sha256};
use tracing::{debug, info};

use mnemo_core::{DocumentParser, MemoryError, MemoryRecord, Result, SemanticMemoryStore};

use crate::chunking::{create_chunker, ChunkStrategy, ChunkerConfig, DocumentChunk};
use crate::tagging::DomainTagger;

/// Default byte-stream size cap (20 MB)
pub const DEFAULT_MAX_FILE_BYTES: usize = 20 * 1024 * 1024;
/// Default per-document ingestion deadline
pub const DEFAULT_DOCUMENT_DEADLINE: Duration = Duration::from_secs(120);

/// Pipeline configuration
#[derive(Debug, Clone)]
pub struct IngestionConfig {
    /// Chunking strategy for parsed documents
    pub strategy: ChunkStrategy,
    /// Chunker tuning
    pub chunker: ChunkerConfig,
    /// Whether domain tagging runs by default
    pub auto_tag: bool,
    /// Tags applied to every produced record
    pub base_tags: Vec<String>,
    /// Reject byte streams larger than this
    pub max_file_bytes: usize,
    /// Deadline for one document end to end
    pub document_deadline: Duration,
}

impl Default for IngestionConfig {
    fn default() -> Self {
        Self {
            strategy: ChunkStrategy::Semantic,
            chunker: ChunkerConfig::default(),
            auto_tag: true,
            base_tags: vec!["document".to_string()],
            max_file_bytes: DEFAULT_MAX_FILE_BYTES,
            document_deadline: DEFAULT_DOCUMENT_DEADLINE,
        }
    }
}

/// Per-call ingestion options
#[derive(Debug, Clone)]
pub struct IngestOptions {
    /// Owner of the produced records
    pub user_id: String,
    /// Optional case scoping key
    pub case_id: Option<String>,
    /// Override the configured auto-tagging default
    pub auto_tag: Option<bool>,
    /// Extra tags applied to every record of this document
    pub extra_tags: Vec<String>,
}

impl IngestOptions {
    /// Options for `user_id` with everything else defaulted
    #[must_use]
    pub fn for_user(user_id: impl Into<String>) -> Self {
        Self {
            user_id: user_id.into(),
            case_id: None,
            auto_tag: None,
            extra_tags: Vec::new(),
        }
    }

    /// Scope records to a case
    #[must_use]
    pub fn with_case(mut self, case_id: impl Into<String>) -> Self {
        self.case_id = Some(case_id.into());
        self
    }
}

/// Outcome of one document ingestion
#[derive(Debug, Clone)]
pub struct IngestionResult {
    /// Content-derived document identifier
    pub document_id: String,
    /// Original file name
    pub file_name: String,
    /// Page count (PDFs; zero elsewhere)
    pub page_count: usize,
    /// Chunks produced by the chunker
    pub chunks_count: usize,
    /// Memory records written
    pub records_created: usize,
    /// Sorted set of domain tags detected across all chunks
    pub detected_tags: Vec<String>,
    /// Tag to number of chunks it hit
    pub tag_counts: BTreeMap<String, usize>,
    /// Non-fatal notes collected along the way
    pub errors: Vec<String>,
}

/// Parse-chunk-tag-embed-store pipeline over a pluggable parser and store
pub struct IngestionService {
    parser: Arc<dyn DocumentParser>,
    store: Arc<dyn SemanticMemoryStore>,
    tagger: DomainTagger,
    config: IngestionConfig,
}

impl IngestionService {
    /// Assemble the pipeline
    pub fn new(
        parser: Arc<dyn DocumentParser>,
        store: Arc<dyn SemanticMemoryStore>,
        config: IngestionConfig,
    ) -> Self {
        Self {
            parser,
            store,
            tagger: DomainTagger::new(),
            config,
        }
    }

    /// Replace the domain tagger catalog
    #[must_use]
    pub fn with_tagger(mut self, tagger: DomainTagger) -> Self {
        self.tagger = tagger;
        self
    }

    /// Ingest a file from disk
    ///
    /// # Errors
    ///
    /// As [`IngestionService::ingest_bytes`], plus `Io` when the file
    /// cannot be read.
    pub async fn ingest_path(&self, path: impl AsRef<Path>, options: IngestOptions) -> Result<IngestionResult> {
        let path = path.as_ref();
        let bytes = tokio::fs::read(path).await?;
        let filename = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "document".to_string());
        self.ingest_bytes(&bytes, &filename, options).await
    }

    /// Ingest a document from bytes
    ///
    /// All records of the document are written in one store transaction;
    /// on any failure no record with this `document_id` exists afterwards.
    ///
    /// # Errors
    ///
    /// `Validation` for oversized input, unsupported or empty documents;
    /// `Embedding`/`Store` from the downstream stages; `Cancelled` when
    /// the per-document deadline expires.
    pub async fn ingest_bytes(
        &self,
        bytes: &[u8],
        filename: &str,
        options: IngestOptions,
    ) -> Result<IngestionResult> {
        tokio::time::timeout(
            self.config.document_deadline,
            self.ingest_inner(bytes, filename, options),
        )
        .await
        .map_err(|_| {
            MemoryError::Cancelled(format!(
                "ingestion of {filename:?} exceeded {:?}",
                self.config.document_deadline
            ))
        })?
    }

    async fn ingest_inner(
        &self,
        bytes: &[u8],
        filename: &str,
        options: IngestOptions,
    ) -> Result<IngestionResult> {
        if bytes.len() > self.config.max_file_bytes {
            return Err(MemoryError::Validation(format!(
                "document {filename:?} is {} bytes, over the {} byte cap",
                bytes.len(),
                self.config.max_file_bytes
            )));
        }

        let document_id = derive_document_id(bytes);
        info!(document_id = %document_id, filename, "ingestion started");

        // Stage 1: parse.
        let parsed = self.parser.parse(bytes, filename).await?;
        let page_count = parsed
            .metadata
            .get("page_count")
            .and_then(Value::as_u64)
            .unwrap_or(0) as usize;

        // Stage 2: chunk.
        let mut base_metadata = BTreeMap::new();
        base_metadata.insert("source".to_string(), Value::from(filename));
        base_metadata.insert("format".to_string(), Value::from(parsed.format.clone()));
        let chunker = create_chunker(self.config.strategy, &self.config.chunker);
        let chunks = chunker.chunk_text(&parsed.content, &document_id, &base_metadata);
        debug!(chunks = chunks.len(), "document chunked");

        // Stage 3: domain-tag and build records.
        let auto_tag = options.auto_tag.unwrap_or(self.config.auto_tag);
        let mut detected: Vec<String> = Vec::new();
        let mut tag_counts: BTreeMap<String, usize> = BTreeMap::new();

        let records: Vec<MemoryRecord> = chunks
            .iter()
            .map(|chunk| {
                let mut tags = self.config.base_tags.clone();
                tags.push(parsed.format.clone());
                tags.extend(options.extra_tags.iter().cloned());

                if auto_tag {
                    for tag in self.tagger.classify(&chunk.content) {
                        *tag_counts.entry(tag.clone()).or_default() += 1;
                        if !detected.contains(&tag) {
                            detected.push(tag.clone());
                        }
                        tags.push(tag);
                    }
                }

                self.chunk_to_record(chunk, &parsed.metadata, &document_id, filename, &options, tags)
            })
            .collect();

        // Stage 4: embed and upsert (one transaction in the store).
        let records_created = self.store.insert(records).await?;

        detected.sort();
        let result = IngestionResult {
            document_id: document_id.clone(),
            file_name: filename.to_string(),
            page_count,
            chunks_count: chunks.len(),
            records_created,
            detected_tags: detected,
            tag_counts,
            errors: Vec::new(),
        };
        info!(
            document_id = %document_id,
            records = result.records_created,
            tags = result.detected_tags.len(),
            "ingestion complete"
        );
        Ok(result)
    }

    fn chunk_to_record(
        &self,
        chunk: &DocumentChunk,
        parser_metadata: &BTreeMap<String, Value>,
        document_id: &str,
        filename: &str,
        options: &IngestOptions,
        mut tags: Vec<String>,
    ) -> MemoryRecord {
        let mut seen: Vec<String> = Vec::new();
        tags.retain(|tag| {
            if seen.contains(tag) {
                false
            } else {
                seen.push(tag.clone());
                true
            }
        });

        let mut record = MemoryRecord::new(options.user_id.clone(), chunk.content.clone())
            .with_source(format!("{}://{}", parser_format(parser_metadata), filename))
            .with_tags(tags);
        if let Some(case_id) = &options.case_id {
            record.case_id = Some(case_id.clone());
        }

        record
            .metadata
            .insert("document_id".to_string(), Value::from(document_id));
        record
            .metadata
            .insert("chunk_id".to_string(), Value::from(chunk.chunk_id.clone()));
        if let Some(index) = chunk.metadata.get("chunk_index") {
            record.metadata.insert("chunk_index".to_string(), index.clone());
        }
        record
            .metadata
            .insert("start_pos".to_string(), Value::from(chunk.start_pos));
        record
            .metadata
            .insert("end_pos".to_string(), Value::from(chunk.end_pos));
        record
            .metadata
            .insert("original_filename".to_string(), Value::from(filename));
        record.metadata.insert(
            "parser_metadata".to_string(),
            Value::Object(parser_metadata.clone().into_iter().collect()),
        );

        record
    }
}

fn parser_format(parser_metadata: &BTreeMap<String, Value>) -> &str {
    parser_metadata
        .get("format")
        .and_then(Value::as_str)
        .unwrap_or("doc")
}

/// Content-derived document id: `doc_` + first 12 hex chars of SHA-256
#[must_use]
pub fn derive_document_id(bytes: &[u8]) -> String {
    let digest = Sha256::digest(bytes);
    let hex: String = digest.iter().map(|b| format!("{b:02x}")).collect();
    format!("doc_{}", &hex[..12])
}
