//! HTTP API
//!
//! 管理API（取り込み・手動ジョブ・ログ参照）とデータプレーンのプロキシ

/// 管理APIハンドラー
pub mod audit;

/// エラーレスポンス
pub mod error;

/// リバースプロキシ
pub mod proxy;

use crate::AppState;
use axum::{
    routing::{get, post},
    Router,
};
use tower_http::trace::TraceLayer;

/// 管理API用Routerを作成
pub fn create_app(state: AppState) -> Router {
    Router::new()
        .route("/audit", post(audit::ingest))
        .route("/audit/:key", get(audit::get_log))
        .route("/manual-backup", post(audit::manual_backup))
        .route("/manual-store", post(audit::manual_store))
        .route("/ping", get(audit::ping))
        .with_state(state)
        .layer(TraceLayer::new_for_http())
}
