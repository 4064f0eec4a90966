//! 監査レコード・HTTPキャプチャの型定義

use crate::common::error::AuditError;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// 識別ヘッダーが無い場合の既定値
pub const UNKNOWN: &str = "unknown";

/// プロキシ経由で記録される監査イベント名
pub const HTTP_AUDIT_EVENT: &str = "http_audit";

/// HTTPヘッダー（名前 → 値の列）
///
/// JSON出力を安定させるためBTreeMapを使う。
pub type HttpHeaders = BTreeMap<String, Vec<String>>;

/// 監査レコードのメタデータ
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuditMetadata {
    /// 集約キー（例: "user:123"）
    pub key: String,
    /// イベント名
    pub event_name: String,
    /// リクエストID
    #[serde(default)]
    pub request_id: String,
    /// 相関ID
    #[serde(default)]
    pub correlation_id: String,
    /// イベント発生時刻
    #[serde(default = "Utc::now")]
    pub event_at: DateTime<Utc>,
}

impl AuditMetadata {
    /// 必須フィールドが空でないことを検証する
    pub fn validate(&self) -> Result<(), AuditError> {
        let fields = [
            ("key", &self.key),
            ("event_name", &self.event_name),
            ("request_id", &self.request_id),
            ("correlation_id", &self.correlation_id),
        ];
        for (name, value) in fields {
            if value.trim().is_empty() {
                return Err(AuditError::Validation(format!("field {} is required", name)));
            }
        }
        Ok(())
    }

    /// 冪等性キーを導出する
    ///
    /// `key-event_name-request_id-correlation_id`
    pub fn idempotency_key(&self) -> String {
        format!(
            "{}-{}-{}-{}",
            self.key, self.event_name, self.request_id, self.correlation_id
        )
    }
}

/// 監査レコード（作成後は不変）
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuditRecord {
    /// メタデータ
    pub metadata: AuditMetadata,
    /// 任意の構造化ペイロード
    #[serde(default)]
    pub data: serde_json::Value,
}

impl AuditRecord {
    /// 集約キー
    pub fn key(&self) -> &str {
        &self.metadata.key
    }

    /// 冪等性キー
    pub fn idempotency_key(&self) -> String {
        self.metadata.idempotency_key()
    }
}

/// キャプチャしたリクエスト
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RequestAudit {
    /// リクエストヘッダー（機密値はマスク済み）
    pub headers: HttpHeaders,
    /// リクエストボディ（base64）
    #[serde(with = "base64_bytes")]
    pub body: Vec<u8>,
    /// HTTPメソッド
    pub method: String,
    /// リクエストパス
    pub path: String,
    /// クエリ文字列（機密値はマスク済み）
    pub query: String,
}

/// キャプチャしたレスポンス
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ResponseAudit {
    /// ステータスコード
    pub status_code: u16,
    /// レスポンスヘッダー
    pub headers: HttpHeaders,
    /// レスポンスボディ（base64）
    #[serde(with = "base64_bytes")]
    pub body: Vec<u8>,
}

/// リクエストとレスポンスを対応付けた監査ペイロード
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HttpAudit {
    /// リクエスト
    pub request: RequestAudit,
    /// レスポンス
    pub response: ResponseAudit,
}

/// ヘッダー名を大文字小文字を区別せずに検索し、最初の値を返す
pub fn header_value<'a>(headers: &'a HttpHeaders, name: &str) -> Option<&'a str> {
    headers
        .iter()
        .find(|(key, _)| key.eq_ignore_ascii_case(name))
        .and_then(|(_, values)| values.first())
        .map(String::as_str)
}

/// (名前, 値バイト列) の列から `HttpHeaders` を組み立てる
///
/// UTF-8でない値は置換文字で表現する。
pub fn collect_headers<'a, I>(pairs: I) -> HttpHeaders
where
    I: IntoIterator<Item = (&'a str, &'a [u8])>,
{
    let mut headers = HttpHeaders::new();
    for (name, value) in pairs {
        headers
            .entry(name.to_string())
            .or_default()
            .push(String::from_utf8_lossy(value).into_owned());
    }
    headers
}

mod base64_bytes {
    use base64::{engine::general_purpose::STANDARD, Engine};
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(bytes: &[u8], serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&STANDARD.encode(bytes))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<u8>, D::Error> {
        let encoded = Option::<String>::deserialize(deserializer)?.unwrap_or_default();
        STANDARD
            .decode(encoded.as_bytes())
            .map_err(serde::de::Error::custom)
    }
}
