//! ストレージ層
//!
//! - `idempotency`: 冪等性ウィンドウ（インメモリ）
//! - `file`: 集約キーごとの日別パーティション監査ログ（ローカルディスク）
//! - `cold`: コールドストレージ（HTTPオブジェクトストア / ファイルシステム）

use crate::common::error::{ColdStoreError, StorageError};
use crate::common::types::AuditRecord;
use async_trait::async_trait;
use chrono::{DateTime, Datelike, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// ローカル監査ログ
pub mod file;

/// コールドストレージ
pub mod cold;

/// 冪等性ウィンドウ
pub mod idempotency;

/// 日別パーティションキー（`YYYY-M-D`、ゼロ埋めなし、UTC）
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DayPartition(String);

impl DayPartition {
    /// 時刻が属する日のパーティション
    pub fn of(at: DateTime<Utc>) -> Self {
        Self(format!("{}-{}-{}", at.year(), at.month(), at.day()))
    }

    /// 文字列表現
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for DayPartition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// 1集約キー分の監査ログ（パーティション → event_at降順のレコード列）
pub type AuditLog = BTreeMap<DayPartition, Vec<AuditRecord>>;

/// パーティション内をevent_at降順に並べ替える（同時刻は挿入順を保持）
pub fn sort_partition(records: &mut [AuditRecord]) {
    records.sort_by(|a, b| b.metadata.event_at.cmp(&a.metadata.event_at));
}

/// ローカル監査ログのストレージ抽象
///
/// 実装は各操作の間、対象キーのロックを保持すること。
#[async_trait]
pub trait AuditLogStore: Send + Sync {
    /// 当日パーティションにレコードを追加し、並べ替えて全体を保存する
    async fn upsert(&self, record: &AuditRecord) -> Result<(), StorageError>;

    /// 1キー分のログを返す（未作成・空なら空ログ）
    async fn get(&self, key: &str) -> Result<AuditLog, StorageError>;

    /// 既知の集約キー一覧
    async fn keys(&self) -> Result<Vec<String>, StorageError>;

    /// 全キーのログ
    async fn get_all(&self) -> Result<BTreeMap<String, AuditLog>, StorageError> {
        let mut all = BTreeMap::new();
        for key in self.keys().await? {
            let log = self.get(&key).await?;
            all.insert(key, log);
        }
        Ok(all)
    }

    /// `as_of` の日のパーティションを持たないキーのログを丸ごと削除し、削除数を返す
    async fn prune_stale(&self, as_of: DateTime<Utc>) -> Result<usize, StorageError>;
}

/// コールドストレージ抽象
///
/// `put` は上書きまたは作成（冪等）。
#[async_trait]
pub trait ColdStore: Send + Sync {
    /// オブジェクトを書き込む
    async fn put(
        &self,
        object_key: &str,
        body: Vec<u8>,
        expires_at: DateTime<Utc>,
    ) -> Result<(), ColdStoreError>;
}

/// 定期スイープ対象
pub trait Sweepable: Send + Sync {
    /// ログ出力用の名前
    fn name(&self) -> &'static str;

    /// `now` 時点で期限切れのエントリを削除し、削除数を返す
    fn sweep(&self, now: DateTime<Utc>) -> usize;
}
