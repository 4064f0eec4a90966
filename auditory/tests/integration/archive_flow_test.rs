//! Integration Test: バックアップとコンパクション
//!
//! ファイルシステムのコールドストアへアーカイブし、前日分を持たないキーが
//! ローカルから削除されることを確認する。

use std::sync::Arc;

use auditory::archive::{backup_object_key, store_object_key, Archiver, RetentionConfig};
use auditory::common::types::{AuditMetadata, AuditRecord};
use auditory::lock::KeyedLocks;
use auditory::store::cold::FsColdStore;
use auditory::store::file::FileAuditLog;
use auditory::store::AuditLogStore;
use chrono::{DateTime, Duration, TimeZone, Utc};
use serde_json::{json, Value};

fn record(key: &str, request_id: &str, at: DateTime<Utc>) -> AuditRecord {
    AuditRecord {
        metadata: AuditMetadata {
            key: key.to_string(),
            event_name: "order.placed".to_string(),
            request_id: request_id.to_string(),
            correlation_id: "c1".to_string(),
            event_at: at,
        },
        data: json!({"request": request_id}),
    }
}

fn t0() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2026, 5, 10, 0, 0, 0).unwrap()
}

#[tokio::test]
async fn test_compaction_archives_every_key_and_prunes_stale_ones() {
    let dir = tempfile::tempdir().unwrap();
    let log = Arc::new(FileAuditLog::new(dir.path().join("logs"), KeyedLocks::new()));
    let cold_root = dir.path().join("cold");
    let cold = Arc::new(FsColdStore::new(&cold_root));
    let archiver = Archiver::new(log.clone(), cold.clone(), RetentionConfig::default());

    let now = t0();
    let two_days_ago = now - Duration::hours(48);
    let yesterday = now - Duration::hours(24);
    log.upsert_at(&record("stale", "r1", two_days_ago), two_days_ago)
        .await
        .unwrap();
    log.upsert_at(&record("active", "r2", two_days_ago), two_days_ago)
        .await
        .unwrap();
    log.upsert_at(&record("active", "r3", yesterday), yesterday)
        .await
        .unwrap();

    let report = archiver.store_at(now).await.expect("compaction failed");
    assert_eq!(report.archived, 2);
    assert_eq!(report.pruned, 1);

    assert_eq!(log.keys().await.unwrap(), vec!["active".to_string()]);
    assert!(log.get("stale").await.unwrap().is_empty());

    // 削除されたキーもアーカイブ済み
    for key in ["stale", "active"] {
        let path = cold.object_path(&store_object_key(key, yesterday)).unwrap();
        let archived: Value =
            serde_json::from_slice(&std::fs::read(&path).unwrap()).unwrap();
        assert!(archived.as_object().unwrap().contains_key("2026-5-8"));
        let expires = std::fs::read_to_string(FsColdStore::expires_path(&path)).unwrap();
        assert_eq!(expires, "2027-05-09T00:00:00Z");
    }
}

#[tokio::test]
async fn test_backup_snapshots_all_keys() {
    let dir = tempfile::tempdir().unwrap();
    let log = Arc::new(FileAuditLog::new(dir.path().join("logs"), KeyedLocks::new()));
    let cold = Arc::new(FsColdStore::new(dir.path().join("cold")));
    let archiver = Archiver::new(log.clone(), cold.clone(), RetentionConfig::default());

    let now = t0();
    log.upsert_at(&record("a", "r1", now), now).await.unwrap();
    log.upsert_at(&record("b", "r2", now), now).await.unwrap();

    let object_key = archiver.backup_at(now).await.expect("backup failed");
    assert_eq!(object_key, backup_object_key(now));
    assert_eq!(object_key, "audits/2026-05-10.json");

    let path = cold.object_path(&object_key).unwrap();
    let snapshot: Value = serde_json::from_slice(&std::fs::read(&path).unwrap()).unwrap();
    assert_eq!(
        snapshot["a"]["2026-5-10"][0]["metadata"]["request_id"],
        "r1"
    );
    assert_eq!(
        snapshot["b"]["2026-5-10"][0]["metadata"]["request_id"],
        "r2"
    );
    let expires = std::fs::read_to_string(FsColdStore::expires_path(&path)).unwrap();
    assert_eq!(expires, "2026-05-12T00:00:00Z");

    // バックアップはローカルログを変更しない
    assert_eq!(log.keys().await.unwrap().len(), 2);
}

#[tokio::test]
async fn test_manual_endpoints_run_archival() {
    let server = crate::support::auditory::spawn_auditory(None).await;
    let client = reqwest::Client::new();

    let response = client
        .post(format!("{}/manual-backup", server.control.url()))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status().as_u16(), 200);
    let body: Value = response.json().await.unwrap();
    assert_eq!(body["message"], "data backed up to storage");

    let response = client
        .post(format!("{}/manual-store", server.control.url()))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status().as_u16(), 200);
    let body: Value = response.json().await.unwrap();
    assert_eq!(body["message"], "data saved to storage");

    let backups = std::fs::read_dir(server.cold_root().join("audits"))
        .unwrap()
        .count();
    // バックアップ本体と有効期限サイドカー
    assert_eq!(backups, 2);

    server.stop().await;
}
