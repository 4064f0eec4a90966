//! ログ初期化
//!
//! - フィルタ: `AUDITORY_LOG_LEVEL`（旧: `RUST_LOG`）、既定は `info`
//! - 形式: `AUDITORY_LOG_FORMAT=json` でJSON、それ以外はテキスト
//! - 出力: tracing-appenderのノンブロッキングstdout

use crate::config::get_env_with_fallback;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer};

/// ログ出力形式
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    /// 人間向けテキスト
    Text,
    /// 1行1JSON
    Json,
}

impl LogFormat {
    /// 環境変数から判定する
    pub fn from_env() -> Self {
        match std::env::var("AUDITORY_LOG_FORMAT") {
            Ok(value) if value.eq_ignore_ascii_case("json") => Self::Json,
            _ => Self::Text,
        }
    }
}

/// フィルタ文字列を返す
pub fn filter_directive() -> String {
    get_env_with_fallback("AUDITORY_LOG_LEVEL", "RUST_LOG")
        .filter(|value| !value.trim().is_empty())
        .unwrap_or_else(|| "info".to_string())
}

/// グローバルsubscriberを設定する
///
/// 返り値の `WorkerGuard` はプロセス終了まで保持すること（Dropで残りをフラッシュ）。
pub fn init() -> anyhow::Result<WorkerGuard> {
    let filter = EnvFilter::try_new(filter_directive())?;
    let (writer, guard) = tracing_appender::non_blocking(std::io::stdout());

    let layer = match LogFormat::from_env() {
        LogFormat::Json => fmt::layer()
            .json()
            .with_target(true)
            .with_current_span(true)
            .with_writer(writer)
            .boxed(),
        LogFormat::Text => fmt::layer().with_target(true).with_writer(writer).boxed(),
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(layer)
        .try_init()?;
    Ok(guard)
}
