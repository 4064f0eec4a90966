//! 共通型定義
//!
//! 監査レコードの型とエラー型

/// エラー型
pub mod error;

/// 監査レコード・HTTPキャプチャの型
pub mod types;
