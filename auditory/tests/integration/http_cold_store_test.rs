//! Integration Test: HTTPオブジェクトストア
//!
//! S3互換エンドポイントへのPUTと、失敗時にローカルログを残すことを確認する。

use std::sync::Arc;

use auditory::archive::{Archiver, RetentionConfig};
use auditory::common::error::{AuditError, ColdStoreError};
use auditory::common::types::{AuditMetadata, AuditRecord};
use auditory::lock::KeyedLocks;
use auditory::store::cold::HttpColdStore;
use auditory::store::file::FileAuditLog;
use auditory::store::{AuditLogStore, ColdStore};
use chrono::{Duration, TimeZone, Utc};
use serde_json::json;
use wiremock::matchers::{body_json, header, header_exists, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn store_for(server: &MockServer, token: Option<&str>) -> HttpColdStore {
    HttpColdStore::new(
        reqwest::Client::new(),
        reqwest::Url::parse(&server.uri()).unwrap(),
        "audit-bucket",
        token.map(str::to_string),
    )
}

#[tokio::test]
async fn test_put_sends_object_with_expiry_and_token() {
    let server = MockServer::start().await;
    Mock::given(method("PUT"))
        .and(path("/audit-bucket/audits/2026-05-10.json"))
        .and(header("authorization", "Bearer s3cret"))
        .and(header("content-type", "application/json"))
        .and(header_exists("expires"))
        .and(body_json(json!({"k": 1})))
        .respond_with(ResponseTemplate::new(200))
        .expect(1)
        .mount(&server)
        .await;

    let store = store_for(&server, Some("s3cret"));
    let expires_at = Utc.with_ymd_and_hms(2026, 5, 12, 0, 0, 0).unwrap();
    store
        .put(
            "audits/2026-05-10.json",
            br#"{"k":1}"#.to_vec(),
            expires_at,
        )
        .await
        .expect("upload failed");

    let requests = server.received_requests().await.unwrap();
    let expires = requests[0].headers.get("expires").unwrap().to_str().unwrap();
    assert_eq!(expires, "Tue, 12 May 2026 00:00:00 GMT");
}

#[tokio::test]
async fn test_put_reports_error_status() {
    let server = MockServer::start().await;
    Mock::given(method("PUT"))
        .respond_with(ResponseTemplate::new(500))
        .mount(&server)
        .await;

    let store = store_for(&server, None);
    let err = store
        .put("audits/x.json", b"{}".to_vec(), Utc::now())
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        ColdStoreError::Status { status: 500, ref object_key } if object_key == "audits/x.json"
    ));
}

#[tokio::test]
async fn test_failed_upload_skips_local_prune() {
    let server = MockServer::start().await;
    Mock::given(method("PUT"))
        .and(path("/audit-bucket/audits/bad/2026-05-09.json"))
        .respond_with(ResponseTemplate::new(503))
        .with_priority(1)
        .mount(&server)
        .await;
    Mock::given(method("PUT"))
        .respond_with(ResponseTemplate::new(200))
        .mount(&server)
        .await;

    let dir = tempfile::tempdir().unwrap();
    let log = Arc::new(FileAuditLog::new(dir.path(), KeyedLocks::new()));
    let archiver = Archiver::new(
        log.clone(),
        Arc::new(store_for(&server, None)),
        RetentionConfig::default(),
    );

    let now = Utc.with_ymd_and_hms(2026, 5, 10, 0, 0, 0).unwrap();
    let old = now - Duration::hours(48);
    for key in ["bad", "good"] {
        let record = AuditRecord {
            metadata: AuditMetadata {
                key: key.to_string(),
                event_name: "e".to_string(),
                request_id: "r".to_string(),
                correlation_id: "c".to_string(),
                event_at: old,
            },
            data: json!(null),
        };
        log.upsert_at(&record, old).await.unwrap();
    }

    let err = archiver.store_at(now).await.unwrap_err();
    match err {
        AuditError::ArchivalUpload(message) => {
            assert!(message.starts_with("1 of 2 keys failed"));
            assert!(message.contains("bad"));
        }
        other => panic!("unexpected error: {}", other),
    }
    // どちらも前日分を持たないが、アップロード失敗のため削除されない
    assert_eq!(log.keys().await.unwrap().len(), 2);
}
