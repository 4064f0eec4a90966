//! 取り込みサービス
//!
//! 冪等性キーで重複を弾き、初回のみローカルログへ保存して冪等性ウィンドウに記録する。
//! 同じ集約キーへの確認・保存・記録は直列化されるため、同一の提出が並行しても
//! 保存されるのは1件だけ。
//!
//! ウィンドウのエントリがスイープされた後は同じ冪等性キーでも再度保存される。

use crate::common::error::AuditError;
use crate::common::types::AuditRecord;
use crate::lock::{self, KeyedLocks};
use crate::store::idempotency::IdempotencyWindow;
use crate::store::AuditLogStore;
use std::sync::Arc;
use tracing::{debug, warn};

/// ロック名前空間
const LOCK_SCOPE: &str = "ingest";

/// 取り込みサービス
#[derive(Clone)]
pub struct IngestService {
    store: Arc<dyn AuditLogStore>,
    window: Arc<IdempotencyWindow>,
    locks: KeyedLocks,
}

impl IngestService {
    /// 新しいサービスを作成
    pub fn new(
        store: Arc<dyn AuditLogStore>,
        window: Arc<IdempotencyWindow>,
        locks: KeyedLocks,
    ) -> Self {
        Self {
            store,
            window,
            locks,
        }
    }

    /// 冪等性ウィンドウ
    pub fn window(&self) -> &Arc<IdempotencyWindow> {
        &self.window
    }

    /// レコードを保存し、冪等性キーを返す
    ///
    /// メタデータの検証は呼び出し側の責務。
    pub async fn save(&self, record: &AuditRecord) -> Result<String, AuditError> {
        let idempotency_key = record.idempotency_key();
        let _guard = self
            .locks
            .write(&lock::scoped(LOCK_SCOPE, record.key()))
            .await;

        if self.window.get(&idempotency_key).is_some() {
            debug!(idempotency_key = %idempotency_key, "Duplicate ingestion rejected");
            return Err(AuditError::DuplicateIngestion(idempotency_key));
        }

        if let Err(e) = self.store.upsert(record).await {
            warn!(key = %record.key(), error = %e, "Failed to persist audit record");
            return Err(AuditError::Persistence(e));
        }

        self.window.set(&idempotency_key);
        debug!(idempotency_key = %idempotency_key, "Audit record ingested");
        Ok(idempotency_key)
    }
}
