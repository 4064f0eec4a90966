//! アーカイブジョブ本体
//!
//! - バックアップ: 全キーのログを1つのJSONにまとめ `audits/YYYY-MM-DD.json` へ
//! - 日次コンパクション: キーごとに `audits/{key}/YYYY-MM-DD.json`（前日分）へ書き出し、
//!   全件成功した場合のみ前日パーティションを持たないローカルログを削除する
//!
//! 定期実行は `schedule` を参照。

use crate::common::error::AuditError;
use crate::store::file::encode_key;
use crate::store::{AuditLogStore, ColdStore};
use chrono::{DateTime, Duration, Utc};
use std::sync::Arc;
use tracing::{error, info};

/// 定期実行ループ
pub mod schedule;

/// オブジェクトキーの接頭辞
pub const OBJECT_PREFIX: &str = "audits";

/// コールドストレージ上の保持日数
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetentionConfig {
    /// バックアップの保持日数
    pub backup_days: u32,
    /// コンパクション結果の保持日数
    pub store_days: u32,
}

impl Default for RetentionConfig {
    fn default() -> Self {
        Self {
            backup_days: 2,
            store_days: 365,
        }
    }
}

/// バックアップのオブジェクトキー
pub fn backup_object_key(at: DateTime<Utc>) -> String {
    format!("{}/{}.json", OBJECT_PREFIX, at.format("%Y-%m-%d"))
}

/// コンパクションのオブジェクトキー
///
/// 集約キーはローカルのファイル名と同じ規則でエンコードし、1セグメントに収める。
pub fn store_object_key(key: &str, at: DateTime<Utc>) -> String {
    format!(
        "{}/{}/{}.json",
        OBJECT_PREFIX,
        encode_key(key),
        at.format("%Y-%m-%d")
    )
}

/// コンパクション結果
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StoreReport {
    /// アップロードしたキー数
    pub archived: usize,
    /// 削除したローカルログ数
    pub pruned: usize,
}

/// アーカイブ処理
#[derive(Clone)]
pub struct Archiver {
    log: Arc<dyn AuditLogStore>,
    cold: Arc<dyn ColdStore>,
    retention: RetentionConfig,
}

impl Archiver {
    /// 新しいアーカイバを作成
    pub fn new(
        log: Arc<dyn AuditLogStore>,
        cold: Arc<dyn ColdStore>,
        retention: RetentionConfig,
    ) -> Self {
        Self {
            log,
            cold,
            retention,
        }
    }

    /// 保持日数設定
    pub fn retention(&self) -> RetentionConfig {
        self.retention
    }

    /// 全ログのスナップショットをアップロードする
    pub async fn backup(&self) -> Result<String, AuditError> {
        self.backup_at(Utc::now()).await
    }

    /// 基準時刻を指定してバックアップする
    pub async fn backup_at(&self, now: DateTime<Utc>) -> Result<String, AuditError> {
        let all = self.log.get_all().await?;
        let body = serde_json::to_vec(&all)?;
        let object_key = backup_object_key(now);
        let expires_at = now + Duration::days(i64::from(self.retention.backup_days));

        self.cold.put(&object_key, body, expires_at).await?;
        info!(object_key = %object_key, keys = all.len(), "Backed up audit logs");
        Ok(object_key)
    }

    /// 前日分をキーごとにアップロードし、成功したら古いローカルログを削除する
    pub async fn store(&self) -> Result<StoreReport, AuditError> {
        self.store_at(Utc::now()).await
    }

    /// 基準時刻を指定してコンパクションする
    ///
    /// 1件でもアップロードに失敗した場合は削除を行わない。
    pub async fn store_at(&self, now: DateTime<Utc>) -> Result<StoreReport, AuditError> {
        let reference = now - Duration::hours(24);
        let expires_at = reference + Duration::days(i64::from(self.retention.store_days));
        let keys = self.log.keys().await?;

        let mut archived = 0;
        let mut failures = Vec::new();
        for key in &keys {
            let log = self.log.get(key).await?;
            let object_key = store_object_key(key, reference);
            let body = serde_json::to_vec(&log)?;
            match self.cold.put(&object_key, body, expires_at).await {
                Ok(()) => archived += 1,
                Err(e) => {
                    error!(
                        key = %key,
                        object_key = %object_key,
                        error = %e,
                        "Failed to archive audit log"
                    );
                    failures.push(key.clone());
                }
            }
        }

        if !failures.is_empty() {
            error!(
                failed = failures.len(),
                total = keys.len(),
                reference_day = %reference.format("%Y-%m-%d"),
                "ALERT: audit archival incomplete, skipping local prune"
            );
            return Err(AuditError::ArchivalUpload(format!(
                "{} of {} keys failed: {}",
                failures.len(),
                keys.len(),
                failures.join(", ")
            )));
        }

        let pruned = self.log.prune_stale(reference).await?;
        info!(archived, pruned, "Compacted audit logs");
        Ok(StoreReport { archived, pruned })
    }
}
