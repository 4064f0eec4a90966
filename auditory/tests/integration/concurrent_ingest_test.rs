//! Integration Test: 並行取り込み
//!
//! 同じキーへの同時書き込みでレコードが失われないことを確認する。

use std::sync::Arc;

use auditory::audit::IngestService;
use auditory::common::error::AuditError;
use auditory::common::types::{AuditMetadata, AuditRecord};
use auditory::lock::KeyedLocks;
use auditory::store::file::FileAuditLog;
use auditory::store::idempotency::IdempotencyWindow;
use auditory::store::AuditLogStore;
use chrono::Utc;
use serde_json::json;

fn record(key: &str, request_id: &str) -> AuditRecord {
    AuditRecord {
        metadata: AuditMetadata {
            key: key.to_string(),
            event_name: "page.viewed".to_string(),
            request_id: request_id.to_string(),
            correlation_id: "c1".to_string(),
            event_at: Utc::now(),
        },
        data: json!({}),
    }
}

fn service(dir: &tempfile::TempDir) -> (IngestService, Arc<FileAuditLog>) {
    let locks = KeyedLocks::new();
    let log = Arc::new(FileAuditLog::new(dir.path(), locks.clone()));
    let window = Arc::new(IdempotencyWindow::new(std::time::Duration::from_secs(60)));
    (IngestService::new(log.clone(), window, locks), log)
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_ingestion_keeps_every_record() {
    let dir = tempfile::tempdir().unwrap();
    let (ingest, log) = service(&dir);

    let tasks: Vec<_> = (0..100)
        .map(|i| {
            let ingest = ingest.clone();
            tokio::spawn(async move {
                let key = format!("key-{}", i % 5);
                ingest.save(&record(&key, &format!("r{}", i))).await
            })
        })
        .collect();
    for task in tasks {
        task.await.unwrap().expect("ingest failed");
    }

    let all = log.get_all().await.unwrap();
    assert_eq!(all.len(), 5);
    for (key, partitions) in all {
        let count: usize = partitions.values().map(Vec::len).sum();
        assert_eq!(count, 20, "key {} lost records", key);
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_duplicates_are_ingested_once() {
    let dir = tempfile::tempdir().unwrap();
    let (ingest, log) = service(&dir);

    let tasks: Vec<_> = (0..20)
        .map(|_| {
            let ingest = ingest.clone();
            tokio::spawn(async move { ingest.save(&record("same", "r1")).await })
        })
        .collect();

    let mut accepted = 0;
    let mut duplicates = 0;
    for task in tasks {
        match task.await.unwrap() {
            Ok(_) => accepted += 1,
            Err(AuditError::DuplicateIngestion(_)) => duplicates += 1,
            Err(e) => panic!("unexpected error: {}", e),
        }
    }
    assert_eq!(accepted, 1);
    assert_eq!(duplicates, 19);

    let partitions = log.get("same").await.unwrap();
    assert_eq!(partitions.values().map(Vec::len).sum::<usize>(), 1);
}
