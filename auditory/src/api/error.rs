//! APIエラーレスポンス型
//!
//! axum用の共通エラーハンドリング

use crate::common::error::AuditError;
use axum::{response::IntoResponse, Json};
use serde_json::json;
use tracing::error;

/// Axum用のエラーレスポンス型
#[derive(Debug)]
pub struct AppError(pub AuditError);

impl From<AuditError> for AppError {
    fn from(err: AuditError) -> Self {
        AppError(err)
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> axum::response::Response {
        let status = self.0.status_code();
        // 入力起因のエラーは詳細（欠落フィールド名・冪等性キー）を返す
        // それ以外は内部情報（パス等）を出さず、詳細はログにのみ残す
        let message = if self.0.is_client_error() {
            self.0.to_string()
        } else {
            error!(error = %self.0, "Request failed");
            self.0.external_message().to_string()
        };

        let payload = json!({
            "error": {
                "message": message,
                "type": self.0.error_type(),
            }
        });

        (status, Json(payload)).into_response()
    }
}
