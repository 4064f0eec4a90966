//! 集約キー単位の読み書きロックレジストリ
//!
//! 同じキーには常に同じロックを返す。取り込み処理とバックグラウンドジョブが
//! 同一キーのロックを共有するため、ログファイルの部分書き込みが他の操作から
//! 見えることはない。
//!
//! 誰も保持していないエントリは `evict_idle()` で取り除ける。

use crate::store::Sweepable;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};
use tokio::sync::{OwnedRwLockReadGuard, OwnedRwLockWriteGuard, RwLock};

/// キーごとのロックハンドル
pub type KeyLock = Arc<RwLock<()>>;

/// 用途別の名前空間付きロックキー
///
/// tokioのRwLockは再入不可のため、ストア内部のロックを保持したまま呼び出す
/// 上位の処理（取り込みの確認・保存・記録、相関バッファ）は別名のキーを使う。
pub fn scoped(scope: &str, key: &str) -> String {
    format!("{}/{}", scope, key)
}

/// 集約キー単位のロックレジストリ
///
/// Cloneはレジストリ本体を共有する。
#[derive(Clone, Debug, Default)]
pub struct KeyedLocks {
    inner: Arc<Mutex<HashMap<String, KeyLock>>>,
}

impl KeyedLocks {
    /// 空のレジストリを作成
    pub fn new() -> Self {
        Self::default()
    }

    fn entries(&self) -> MutexGuard<'_, HashMap<String, KeyLock>> {
        // 保護対象はマップ構造のみで、パニック時も整合性は崩れない
        self.inner.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// キーに対応するロックを取得する（初回は作成）
    pub fn acquire(&self, key: &str) -> KeyLock {
        let mut entries = self.entries();
        if let Some(lock) = entries.get(key) {
            return lock.clone();
        }
        let lock = KeyLock::default();
        entries.insert(key.to_string(), lock.clone());
        lock
    }

    /// 共有ロックを取得して待機する
    pub async fn read(&self, key: &str) -> OwnedRwLockReadGuard<()> {
        self.acquire(key).read_owned().await
    }

    /// 排他ロックを取得して待機する
    pub async fn write(&self, key: &str) -> OwnedRwLockWriteGuard<()> {
        self.acquire(key).write_owned().await
    }

    /// 登録済みキー数
    pub fn len(&self) -> usize {
        self.entries().len()
    }

    /// レジストリが空か
    pub fn is_empty(&self) -> bool {
        self.entries().is_empty()
    }

    /// 誰も参照していないロックを削除し、削除数を返す
    ///
    /// レジストリ以外がハンドルやガードを保持しているエントリは残る。
    /// 削除後に同じキーで `acquire` すると新しいロックが作られる。
    pub fn evict_idle(&self) -> usize {
        let mut entries = self.entries();
        let before = entries.len();
        entries.retain(|_, lock| Arc::strong_count(lock) > 1);
        before - entries.len()
    }
}

impl Sweepable for KeyedLocks {
    fn name(&self) -> &'static str {
        "keyed_locks"
    }

    fn sweep(&self, _now: DateTime<Utc>) -> usize {
        self.evict_idle()
    }
}
