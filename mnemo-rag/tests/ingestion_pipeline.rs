//! End-to-end ingestion and hybrid retrieval over the in-memory store

use std::sync::Arc;

use async_trait::async_trait;
use mnemo_core::traits::semantic::SearchFilters;
use mnemo_core::{MemoryError, Result, SemanticMemoryStore};
use mnemo_rag::{
    Bm25Index, ChunkStrategy, ChunkerConfig, CompositeParser, CrossEncoderReranker,
    DeterministicEmbedder, HybridRetriever, HybridRetrieverWithReranking, IngestOptions,
    IngestionConfig, IngestionService, SemanticStoreAdapter,
};
use mnemo_storage::InMemorySemanticStore;

fn service(store: Arc<InMemorySemanticStore>) -> IngestionService {
    let config = IngestionConfig {
        strategy: ChunkStrategy::Semantic,
        chunker: ChunkerConfig {
            chunk_size: 500,
            min_chunk_size: 10,
            ..ChunkerConfig::default()
        },
        ..IngestionConfig::default()
    };
    IngestionService::new(Arc::new(CompositeParser::new()), store, config)
}

fn store() -> Arc<InMemorySemanticStore> {
    Arc::new(InMemorySemanticStore::new(
        Arc::new(DeterministicEmbedder::new(128)),
        "test",
    ))
}

#[tokio::test]
async fn ingested_document_is_tagged_and_stored() {
    let store = store();
    let result = service(store.clone())
        .ingest_bytes(
            b"He received the Nobel Prize for his work on retrieval systems.",
            "bio.txt",
            IngestOptions::for_user("u1"),
        )
        .await
        .unwrap();

    assert_eq!(result.records_created, result.chunks_count);
    assert!(result.chunks_count >= 1);
    assert!(result
        .detected_tags
        .contains(&"eb1a_awards".to_string()));
    assert!(result.tag_counts["eb1a_awards"] >= 1);

    let records = store.list(Some("u1")).await.unwrap();
    assert_eq!(records.len(), result.records_created);
    let record = &records[0];
    assert!(record.tags.contains(&"eb1a_awards".to_string()));
    assert!(record.tags.contains(&"document".to_string()));
    assert_eq!(
        record.metadata["document_id"].as_str().unwrap(),
        result.document_id
    );
    assert!(record.metadata.contains_key("start_pos"));
    assert!(record.metadata.contains_key("end_pos"));

    // Parse-stage metadata (byte size, MIME, timestamp) rides along.
    let parser_metadata = record.metadata["parser_metadata"]
        .as_object()
        .expect("parser metadata object");
    assert!(parser_metadata.contains_key("byte_size"));
    assert!(parser_metadata.contains_key("mime_type"));
    assert!(
        parser_metadata["parsed_at"].as_str().is_some(),
        "ingested records must carry the parse timestamp"
    );
}

#[tokio::test]
async fn ingest_records_are_retrievable() {
    let store = store();
    service(store.clone())
        .ingest_bytes(
            b"EB-1A petitions require evidence of extraordinary ability.",
            "criteria.txt",
            IngestOptions::for_user("u1"),
        )
        .await
        .unwrap();

    let results = store
        .search("extraordinary ability", Some("u1"), 1, &SearchFilters::default())
        .await
        .unwrap();
    assert_eq!(results.len(), 1);
    assert!(results[0].score > 0.0);
}

#[tokio::test]
async fn case_scoping_and_extra_tags_apply() {
    let store = store();
    let mut options = IngestOptions::for_user("u1").with_case("case-7");
    options.extra_tags = vec!["evidence".to_string()];

    service(store.clone())
        .ingest_bytes(b"Exhibit list for the petition.", "exhibits.txt", options)
        .await
        .unwrap();

    let records = store.list(Some("u1")).await.unwrap();
    assert_eq!(records[0].case_id.as_deref(), Some("case-7"));
    assert!(records[0].tags.contains(&"evidence".to_string()));
}

#[tokio::test]
async fn ingest_path_reads_from_disk() {
    use std::io::Write;

    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("notes.md");
    let mut file = std::fs::File::create(&path).unwrap();
    writeln!(file, "# Notes\n\nShe won a distinguished award.").unwrap();

    let store = store();
    let result = service(store.clone())
        .ingest_path(&path, IngestOptions::for_user("u1"))
        .await
        .unwrap();

    assert_eq!(result.file_name, "notes.md");
    assert!(result.detected_tags.contains(&"eb1a_awards".to_string()));
    assert_eq!(store.count().await.unwrap() as usize, result.records_created);
}

#[tokio::test]
async fn oversized_documents_are_rejected() {
    let store = store();
    let config = IngestionConfig {
        max_file_bytes: 16,
        ..IngestionConfig::default()
    };
    let service = IngestionService::new(Arc::new(CompositeParser::new()), store, config);

    let err = service
        .ingest_bytes(
            b"this byte stream is longer than sixteen bytes",
            "big.txt",
            IngestOptions::for_user("u1"),
        )
        .await
        .unwrap_err();
    assert!(err.to_string().contains("cap"));
}

/// Store wrapper that fails every insert, for the all-or-nothing property.
struct FailingStore(Arc<InMemorySemanticStore>);

#[async_trait]
impl SemanticMemoryStore for FailingStore {
    async fn insert(&self, _records: Vec<mnemo_core::MemoryRecord>) -> Result<usize> {
        Err(MemoryError::store("simulated write failure"))
    }

    async fn search(
        &self,
        query: &str,
        user_id: Option<&str>,
        top_k: usize,
        filters: &SearchFilters,
    ) -> Result<Vec<mnemo_core::traits::semantic::ScoredRecord>> {
        self.0.search(query, user_id, top_k, filters).await
    }

    async fn list(&self, user_id: Option<&str>) -> Result<Vec<mnemo_core::MemoryRecord>> {
        self.0.list(user_id).await
    }

    async fn count(&self) -> Result<u64> {
        self.0.count().await
    }

    async fn delete_by_user(&self, user_id: &str) -> Result<u64> {
        self.0.delete_by_user(user_id).await
    }

    async fn delete_by_ids(&self, ids: &[String]) -> Result<u64> {
        self.0.delete_by_ids(ids).await
    }

    async fn stats(&self) -> Result<mnemo_core::traits::semantic::StoreStats> {
        self.0.stats().await
    }

    async fn health_check(&self) -> bool {
        self.0.health_check().await
    }
}

#[tokio::test]
async fn failed_ingest_leaves_no_records() {
    let inner = store();
    let failing = Arc::new(FailingStore(inner.clone()));
    let service = IngestionService::new(
        Arc::new(CompositeParser::new()),
        failing,
        IngestionConfig::default(),
    );

    let err = service
        .ingest_bytes(
            b"Document whose ingestion fails at the store.",
            "doomed.txt",
            IngestOptions::for_user("u1"),
        )
        .await
        .unwrap_err();
    assert!(err.to_string().contains("simulated"));
    assert_eq!(inner.count().await.unwrap(), 0);
}

#[tokio::test]
async fn hybrid_retrieval_over_ingested_corpus() {
    let store = store();
    let service = service(store.clone());

    service
        .ingest_bytes(
            b"Contract law governs agreements between private parties.",
            "contracts.txt",
            IngestOptions::for_user("u1"),
        )
        .await
        .unwrap();
    service
        .ingest_bytes(
            b"Immigration law deals with visas and petitions.",
            "immigration.txt",
            IngestOptions::for_user("u1"),
        )
        .await
        .unwrap();

    let texts: Vec<String> = store
        .list(Some("u1"))
        .await
        .unwrap()
        .into_iter()
        .map(|r| r.text)
        .collect();
    let sparse = Arc::new(Bm25Index::build(texts));
    let dense = Arc::new(SemanticStoreAdapter::new(store.clone()).with_user("u1"));

    let hybrid = HybridRetriever::new(sparse, dense, 0.5, 0.5).unwrap();
    let results = hybrid.search("visas and petitions", 1).await.unwrap();

    assert_eq!(results.len(), 1);
    assert!(results[0].0.contains("Immigration"));
}

#[tokio::test]
async fn reranked_hybrid_flow_returns_ranked_ids() {
    use mnemo_core::RerankModel;

    struct LengthModel;
    #[async_trait]
    impl RerankModel for LengthModel {
        async fn score(&self, pairs: &[(String, String)]) -> Result<Vec<f32>> {
            Ok(pairs.iter().map(|(_, text)| text.len() as f32).collect())
        }
        fn model_id(&self) -> &str {
            "length"
        }
    }

    let store = store();
    let service = service(store.clone());
    service
        .ingest_bytes(
            b"Short note about petitions.",
            "short.txt",
            IngestOptions::for_user("u1"),
        )
        .await
        .unwrap();
    service
        .ingest_bytes(
            b"A much longer discussion about petitions, visas, and the rest.",
            "long.txt",
            IngestOptions::for_user("u1"),
        )
        .await
        .unwrap();

    let texts: Vec<String> = store
        .list(Some("u1"))
        .await
        .unwrap()
        .into_iter()
        .map(|r| r.text)
        .collect();
    let content_map: std::collections::HashMap<String, String> =
        texts.iter().map(|t| (t.clone(), t.clone())).collect();

    let sparse = Arc::new(Bm25Index::build(texts));
    let dense = Arc::new(SemanticStoreAdapter::new(store).with_user("u1"));
    let hybrid = HybridRetriever::new(sparse, dense, 0.5, 0.5).unwrap();
    let flow = HybridRetrieverWithReranking::new(
        hybrid,
        CrossEncoderReranker::new(Arc::new(LengthModel)),
    );

    let results = flow.search("petitions", 2, &content_map).await.unwrap();
    assert_eq!(results.len(), 2);
    // The length-based model ranks the longer document first.
    assert!(results[0].0.contains("longer"));
}
