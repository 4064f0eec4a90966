//! エラー型定義
//!
//! 統一エラー型（thiserror使用）
//!
//! `AuditError`は`status_code()`と`external_message()`を提供し、
//! 取り込みAPIのエラーレスポンスを生成できます。

use axum::http::StatusCode;
use std::path::PathBuf;
use thiserror::Error;

/// ローカル監査ログの読み書きエラー
#[derive(Debug, Error)]
pub enum StorageError {
    /// ファイルI/Oエラー
    #[error("I/O error on {path}: {source}")]
    Io {
        /// 対象ファイル
        path: PathBuf,
        /// 元のエラー
        #[source]
        source: std::io::Error,
    },

    /// 既存ファイルのJSONが壊れている
    #[error("Malformed audit log {path}: {source}")]
    Malformed {
        /// 対象ファイル
        path: PathBuf,
        /// 元のエラー
        #[source]
        source: serde_json::Error,
    },

    /// シリアライズエラー
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl StorageError {
    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }
}

/// コールドストレージへのアップロードエラー
#[derive(Debug, Error)]
pub enum ColdStoreError {
    /// オブジェクトストアが失敗ステータスを返した
    #[error("Upload of {object_key} rejected with status {status}")]
    Status {
        /// オブジェクトキー
        object_key: String,
        /// HTTPステータスコード
        status: u16,
    },

    /// 通信エラー
    #[error("Upload of {object_key} failed: {message}")]
    Transport {
        /// オブジェクトキー
        object_key: String,
        /// エラー内容
        message: String,
    },

    /// 不正なオブジェクトキー
    #[error("Invalid object key: {0}")]
    InvalidKey(String),

    /// ファイルシステムバックエンドのI/Oエラー
    #[error("I/O error on {path}: {source}")]
    Io {
        /// 対象ファイル
        path: PathBuf,
        /// 元のエラー
        #[source]
        source: std::io::Error,
    },
}

/// 監査パイプラインのエラー型
#[derive(Debug, Error)]
pub enum AuditError {
    /// 必須メタデータの欠落
    #[error("Validation error: {0}")]
    Validation(String),

    /// 冪等性キーが既に記録済み
    #[error("Idempotency key already exists: {0}")]
    DuplicateIngestion(String),

    /// レスポンスに対応するリクエストがバッファに無い
    #[error("Request not found for response: {0}")]
    UnmatchedResponse(String),

    /// ローカルストレージの読み書き失敗
    #[error("Persistence failure: {0}")]
    Persistence(#[from] StorageError),

    /// コールドストレージへのアップロード失敗
    #[error("Archival upload failure: {0}")]
    ArchivalUpload(String),

    /// アーカイブ用シリアライズ失敗
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl From<ColdStoreError> for AuditError {
    fn from(err: ColdStoreError) -> Self {
        Self::ArchivalUpload(err.to_string())
    }
}

impl AuditError {
    /// 外部クライアント向けの安全なエラーメッセージ
    ///
    /// ファイルパスやオブジェクトストアの詳細は含めない。
    /// 詳細は `Display` でサーバーログにのみ出力する。
    pub fn external_message(&self) -> &'static str {
        match self {
            Self::Validation(_) => "Invalid audit submission",
            Self::DuplicateIngestion(_) => "idempotency key already exists",
            Self::UnmatchedResponse(_) => "Request not found",
            Self::Persistence(_) => "Failed to save data",
            Self::ArchivalUpload(_) => "Failed to upload data to storage",
            Self::Serialization(_) => "Internal server error",
        }
    }

    /// エラー種別文字列
    pub fn error_type(&self) -> &'static str {
        match self {
            Self::Validation(_) => "validation_error",
            Self::DuplicateIngestion(_) => "duplicate_ingestion",
            Self::UnmatchedResponse(_) => "unmatched_response",
            Self::Persistence(_) => "persistence_failure",
            Self::ArchivalUpload(_) => "archival_upload_failure",
            Self::Serialization(_) => "server_error",
        }
    }

    /// HTTPステータスコード
    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::Validation(_) => StatusCode::BAD_REQUEST,
            Self::DuplicateIngestion(_) => StatusCode::CONFLICT,
            Self::UnmatchedResponse(_) => StatusCode::NOT_FOUND,
            Self::Persistence(_) => StatusCode::INTERNAL_SERVER_ERROR,
            Self::ArchivalUpload(_) => StatusCode::BAD_GATEWAY,
            Self::Serialization(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// 送信者に詳細を返してよいエラーか
    ///
    /// 入力起因のエラーのみ詳細（欠落フィールド名、冪等性キー）を返す。
    pub fn is_client_error(&self) -> bool {
        self.status_code().is_client_error()
    }
}

/// Result型エイリアス
pub type AuditResult<T> = Result<T, AuditError>;
