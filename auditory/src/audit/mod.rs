//! 監査パイプライン
//!
//! プロキシ → 相関（リクエストをバッファしレスポンスと組にする）
//! → 取り込み（重複排除と保存）→ ローカルログ

/// リクエスト/レスポンス相関
pub mod correlator;

/// 取り込みサービス
pub mod ingest;

/// 機密値マスク
pub mod redact;

pub use correlator::HttpCorrelator;
pub use ingest::IngestService;
pub use redact::Redactor;
