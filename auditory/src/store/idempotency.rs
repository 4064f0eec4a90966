//! 冪等性ウィンドウ
//!
//! 冪等性キー → 有効期限 のインメモリマップ。
//!
//! `get` は期限を確認しない（遅延失効）。期限切れでもスイープされるまでは
//! 「見つかった」と答える。つまり `get` が答えるのは
//! 「このキーは設定済みで、まだスイープされていないか」であり、
//! 「現在有効か」ではない。

use crate::store::Sweepable;
use chrono::{DateTime, Duration, Utc};
use std::collections::HashMap;
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};
use tracing::debug;

/// 冪等性ウィンドウ
#[derive(Debug)]
pub struct IdempotencyWindow {
    ttl: Duration,
    entries: RwLock<HashMap<String, DateTime<Utc>>>,
}

impl IdempotencyWindow {
    /// 指定TTLでウィンドウを作成
    pub fn new(ttl: std::time::Duration) -> Self {
        Self {
            ttl: Duration::from_std(ttl).unwrap_or_else(|_| Duration::days(36_500)),
            entries: RwLock::new(HashMap::new()),
        }
    }

    /// 設定されたTTL
    pub fn ttl(&self) -> std::time::Duration {
        self.ttl.to_std().unwrap_or_default()
    }

    fn read_entries(&self) -> RwLockReadGuard<'_, HashMap<String, DateTime<Utc>>> {
        self.entries.read().unwrap_or_else(|p| p.into_inner())
    }

    fn write_entries(&self) -> RwLockWriteGuard<'_, HashMap<String, DateTime<Utc>>> {
        self.entries.write().unwrap_or_else(|p| p.into_inner())
    }

    /// `key → now + ttl` を挿入（既存なら上書き）
    pub fn set(&self, key: &str) {
        self.set_at(key, Utc::now());
    }

    /// 基準時刻を指定して挿入
    pub fn set_at(&self, key: &str, now: DateTime<Utc>) {
        let expires_at = now
            .checked_add_signed(self.ttl)
            .unwrap_or(DateTime::<Utc>::MAX_UTC);
        self.write_entries().insert(key.to_string(), expires_at);
    }

    /// 有効期限を返す（スイープ済みなら `None`）
    pub fn get(&self, key: &str) -> Option<DateTime<Utc>> {
        self.read_entries().get(key).copied()
    }

    /// 期限切れ（`expiry < now`）のエントリを削除し、削除数を返す
    pub fn sweep(&self) -> usize {
        self.sweep_at(Utc::now())
    }

    /// 基準時刻を指定してスイープ
    pub fn sweep_at(&self, now: DateTime<Utc>) -> usize {
        let mut entries = self.write_entries();
        let before = entries.len();
        entries.retain(|_, expires_at| *expires_at >= now);
        let removed = before - entries.len();
        if removed > 0 {
            debug!(removed, remaining = entries.len(), "Swept idempotency window");
        }
        removed
    }

    /// 保持中のエントリ数
    pub fn len(&self) -> usize {
        self.read_entries().len()
    }

    /// 空か
    pub fn is_empty(&self) -> bool {
        self.read_entries().is_empty()
    }
}

impl Sweepable for IdempotencyWindow {
    fn name(&self) -> &'static str {
        "idempotency_window"
    }

    fn sweep(&self, now: DateTime<Utc>) -> usize {
        self.sweep_at(now)
    }
}
