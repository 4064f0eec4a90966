//! Auditory
//!
//! リバースプロキシを通過するHTTPリクエスト/レスポンスを監査レコードとして記録し、
//! 集約キーごとの日別パーティションログに冪等に保存して、
//! 定期的にコールドストレージへアーカイブする。

#![warn(missing_docs)]

/// 共通型定義
pub mod common;

/// 集約キー単位のロックレジストリ
pub mod lock;

/// ストレージ（冪等性ウィンドウ・ローカルログ・コールドストレージ）
pub mod store;

/// 監査パイプライン（取り込み・相関・マスク）
pub mod audit;

/// アーカイブジョブと定期実行
pub mod archive;

/// HTTP API（管理API・プロキシ）
pub mod api;

/// 設定管理（環境変数ヘルパー）
pub mod config;

/// ロギング初期化ユーティリティ
pub mod logging;

/// Shutdown controller
pub mod shutdown;

/// コンポーネント初期化
pub mod bootstrap;

/// サーバー起動・シャットダウン
pub mod server;

/// CLIインターフェース
pub mod cli;

use std::sync::Arc;

/// アプリケーション状態（管理API用）
#[derive(Clone)]
pub struct AppState {
    /// 取り込みサービス
    pub ingest: audit::IngestService,
    /// アーカイブ処理
    pub archiver: archive::Archiver,
    /// ローカル監査ログ
    pub audit_log: Arc<dyn store::AuditLogStore>,
    /// Cooperative shutdown controller
    pub shutdown: shutdown::ShutdownController,
}
