//! ファイルベースの監査ログ
//!
//! 集約キーごとに `{dir}/{エンコード済みキー}.json` を1ファイル持つ。
//! 書き込みは常にログ全体を一時ファイルへ書いてからrenameで置き換える。

use crate::common::error::StorageError;
use crate::common::types::AuditRecord;
use crate::lock::KeyedLocks;
use crate::store::{sort_partition, AuditLog, AuditLogStore, DayPartition};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

const EXTENSION: &str = "json";

/// ローカルディスク上の日別パーティション監査ログ
#[derive(Debug, Clone)]
pub struct FileAuditLog {
    dir: PathBuf,
    locks: KeyedLocks,
}

impl FileAuditLog {
    /// 指定ディレクトリを保存先として作成
    ///
    /// `locks` はアーカイブジョブ・取り込み処理と共有するレジストリ。
    pub fn new(dir: impl Into<PathBuf>, locks: KeyedLocks) -> Self {
        Self {
            dir: dir.into(),
            locks,
        }
    }

    /// 保存先ディレクトリ
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// キーに対応するファイルパス
    pub fn path_for(&self, key: &str) -> PathBuf {
        self.dir.join(format!("{}.{}", encode_key(key), EXTENSION))
    }

    /// 基準時刻を指定して追加する
    pub async fn upsert_at(
        &self,
        record: &AuditRecord,
        now: DateTime<Utc>,
    ) -> Result<(), StorageError> {
        let key = record.key();
        let _guard = self.locks.write(key).await;
        let path = self.path_for(key);

        let mut log = read_log(&path).await?;
        let partition = DayPartition::of(now);
        let records = log.entry(partition.clone()).or_default();
        records.push(record.clone());
        sort_partition(records);
        let count = records.len();

        write_log(&path, &log).await?;
        debug!(key = %key, partition = %partition, records = count, "Upserted audit record");
        Ok(())
    }

    /// キーのログを削除する（存在しなければ何もしない）
    async fn remove(&self, path: &Path) -> Result<(), StorageError> {
        match tokio::fs::remove_file(path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => Err(StorageError::io(path, e)),
        }
    }
}

#[async_trait]
impl AuditLogStore for FileAuditLog {
    async fn upsert(&self, record: &AuditRecord) -> Result<(), StorageError> {
        self.upsert_at(record, Utc::now()).await
    }

    async fn get(&self, key: &str) -> Result<AuditLog, StorageError> {
        let _guard = self.locks.read(key).await;
        read_log(&self.path_for(key)).await
    }

    async fn keys(&self) -> Result<Vec<String>, StorageError> {
        let mut entries = match tokio::fs::read_dir(&self.dir).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(StorageError::io(&self.dir, e)),
        };

        let mut keys = Vec::new();
        while let Some(entry) = entries
            .next_entry()
            .await
            .map_err(|e| StorageError::io(&self.dir, e))?
        {
            let path = entry.path();
            if path.extension().and_then(|ext| ext.to_str()) != Some(EXTENSION) {
                continue;
            }
            let Some(stem) = path.file_stem().and_then(|stem| stem.to_str()) else {
                continue;
            };
            match decode_key(stem) {
                Some(key) => keys.push(key),
                None => warn!(path = %path.display(), "Skipping audit log with undecodable name"),
            }
        }
        keys.sort();
        Ok(keys)
    }

    async fn prune_stale(&self, as_of: DateTime<Utc>) -> Result<usize, StorageError> {
        let partition = DayPartition::of(as_of);
        let mut removed = 0;
        for key in self.keys().await? {
            let _guard = self.locks.write(&key).await;
            let path = self.path_for(&key);
            let log = read_log(&path).await?;
            if log.contains_key(&partition) {
                continue;
            }
            self.remove(&path).await?;
            removed += 1;
            info!(key = %key, partition = %partition, "Pruned stale audit log");
        }
        Ok(removed)
    }
}

async fn read_log(path: &Path) -> Result<AuditLog, StorageError> {
    let bytes = match tokio::fs::read(path).await {
        Ok(bytes) => bytes,
        Err(e) if e.kind() == ErrorKind::NotFound => return Ok(AuditLog::new()),
        Err(e) => return Err(StorageError::io(path, e)),
    };
    if bytes.iter().all(u8::is_ascii_whitespace) {
        return Ok(AuditLog::new());
    }
    serde_json::from_slice(&bytes).map_err(|source| StorageError::Malformed {
        path: path.to_path_buf(),
        source,
    })
}

async fn write_log(path: &Path, log: &AuditLog) -> Result<(), StorageError> {
    let body = serde_json::to_vec(log)?;
    if let Some(parent) = path.parent() {
        tokio::fs::create_dir_all(parent)
            .await
            .map_err(|e| StorageError::io(parent, e))?;
    }
    let tmp = path.with_extension("json.tmp");
    tokio::fs::write(&tmp, &body)
        .await
        .map_err(|e| StorageError::io(&tmp, e))?;
    tokio::fs::rename(&tmp, path)
        .await
        .map_err(|e| StorageError::io(path, e))
}

fn is_plain(byte: u8) -> bool {
    byte.is_ascii_alphanumeric() || matches!(byte, b'-' | b'_' | b'@' | b'+' | b'.')
}

/// 集約キーをファイル名に使える形へパーセントエンコードする
///
/// 先頭の `.` もエンコードするため `..` や隠しファイルにはならない。
pub fn encode_key(key: &str) -> String {
    let mut out = String::with_capacity(key.len());
    for (i, byte) in key.bytes().enumerate() {
        if is_plain(byte) && !(i == 0 && byte == b'.') {
            out.push(byte as char);
        } else {
            out.push_str(&format!("%{:02X}", byte));
        }
    }
    out
}

/// `encode_key` の逆変換
pub fn decode_key(name: &str) -> Option<String> {
    let bytes = name.as_bytes();
    let mut out = Vec::with_capacity(bytes.len());
    let mut i = 0;
    while i < bytes.len() {
        if bytes[i] == b'%' {
            let hex = name.get(i + 1..i + 3)?;
            out.push(u8::from_str_radix(hex, 16).ok()?);
            i += 3;
        } else {
            out.push(bytes[i]);
            i += 1;
        }
    }
    String::from_utf8(out).ok()
}
