//! 管理APIハンドラー
//!
//! - `POST /audit`: 監査レコードの取り込み
//! - `GET /audit/:key`: 1キー分のローカルログ
//! - `POST /manual-backup` / `POST /manual-store`: アーカイブジョブの即時実行
//! - `GET /ping`

use crate::api::error::AppError;
use crate::audit::correlator::{CORRELATION_ID_HEADER, REQUEST_ID_HEADER};
use crate::common::error::AuditError;
use crate::common::types::AuditRecord;
use crate::store::AuditLog;
use crate::AppState;
use axum::{
    extract::{rejection::JsonRejection, Path, State},
    http::{HeaderMap, StatusCode},
    Json,
};
use serde::Serialize;
use tracing::info;

/// 取り込み成功レスポンス
#[derive(Debug, Serialize)]
pub struct IngestResponse {
    /// 冪等性キー
    pub idempotency_key: String,
    /// 冪等性ウィンドウのTTL（例: "1m"）
    pub ttl: String,
}

/// 手動ジョブのレスポンス
#[derive(Debug, Serialize)]
pub struct MessageResponse {
    /// 結果メッセージ
    pub message: String,
}

fn header_override(headers: &HeaderMap, name: &str) -> Option<String> {
    headers
        .get(name)
        .and_then(|value| value.to_str().ok())
        .map(str::trim)
        .filter(|value| !value.is_empty())
        .map(str::to_string)
}

/// POST /audit
///
/// `X-Request-ID` / `X-Correlation-ID` ヘッダーがあればボディの値より優先する。
pub async fn ingest(
    State(state): State<AppState>,
    headers: HeaderMap,
    payload: Result<Json<AuditRecord>, JsonRejection>,
) -> Result<(StatusCode, Json<IngestResponse>), AppError> {
    let Json(mut record) =
        payload.map_err(|rejection| AuditError::Validation(rejection.body_text()))?;

    if let Some(request_id) = header_override(&headers, REQUEST_ID_HEADER) {
        record.metadata.request_id = request_id;
    }
    if let Some(correlation_id) = header_override(&headers, CORRELATION_ID_HEADER) {
        record.metadata.correlation_id = correlation_id;
    }
    record.metadata.validate()?;

    let idempotency_key = state.ingest.save(&record).await?;
    let ttl = humantime::format_duration(state.ingest.window().ttl()).to_string();

    Ok((
        StatusCode::CREATED,
        Json(IngestResponse {
            idempotency_key,
            ttl,
        }),
    ))
}

/// GET /audit/:key
pub async fn get_log(
    State(state): State<AppState>,
    Path(key): Path<String>,
) -> Result<Json<AuditLog>, AppError> {
    let log = state
        .audit_log
        .get(&key)
        .await
        .map_err(AuditError::Persistence)?;
    Ok(Json(log))
}

/// POST /manual-backup
pub async fn manual_backup(
    State(state): State<AppState>,
) -> Result<Json<MessageResponse>, AppError> {
    let object_key = state.archiver.backup().await?;
    info!(object_key = %object_key, "Manual backup finished");
    Ok(Json(MessageResponse {
        message: "data backed up to storage".to_string(),
    }))
}

/// POST /manual-store
pub async fn manual_store(
    State(state): State<AppState>,
) -> Result<Json<MessageResponse>, AppError> {
    let report = state.archiver.store().await?;
    info!(
        archived = report.archived,
        pruned = report.pruned,
        "Manual compaction finished"
    );
    Ok(Json(MessageResponse {
        message: "data saved to storage".to_string(),
    }))
}

/// GET /ping
pub async fn ping() -> &'static str {
    "pong"
}
