//! Configuration management via environment variables
//!
//! Every setting has a preferred `AUDITORY_*` name and, where one existed, a legacy
//! name that is still honoured with a deprecation warning. The resulting
//! [`AuditoryConfig`] is read once at start-up and passed explicitly to the
//! components that need it.

use crate::archive::schedule::CompactionTrigger;
use crate::archive::RetentionConfig;
use std::path::PathBuf;
use std::time::Duration;

/// 既定のマスク対象
pub const DEFAULT_REDACT: &str =
    "authorization,proxy-authorization,cookie,set-cookie,x-api-key,api_key,token,password";

/// 既定の最大キャプチャボディサイズ（10 MiB）
pub const DEFAULT_MAX_BODY_BYTES: usize = 10 * 1024 * 1024;

/// Get an environment variable with fallback to a deprecated name
///
/// If the new variable name is set, returns its value.
/// If only the old (deprecated) variable name is set, returns its value
/// and logs a deprecation warning.
///
/// # Example
/// ```
/// use auditory::config::get_env_with_fallback;
///
/// let ttl = get_env_with_fallback("AUDITORY_IDEMPOTENCY_TTL", "APP_IDEMPOTENCY_TTL");
/// ```
pub fn get_env_with_fallback(new_name: &str, old_name: &str) -> Option<String> {
    if let Ok(val) = std::env::var(new_name) {
        return Some(val);
    }
    if old_name.is_empty() {
        return None;
    }
    if let Ok(val) = std::env::var(old_name) {
        tracing::warn!(
            "Environment variable '{}' is deprecated, use '{}' instead",
            old_name,
            new_name
        );
        return Some(val);
    }
    None
}

/// Get an environment variable with fallback and default value
pub fn get_env_with_fallback_or(new_name: &str, old_name: &str, default: &str) -> String {
    get_env_with_fallback(new_name, old_name).unwrap_or_else(|| default.to_string())
}

/// Get an environment variable with fallback, parsing to a specific type
///
/// Returns `default` if neither is set or parsing fails.
pub fn get_env_with_fallback_parse<T: std::str::FromStr>(
    new_name: &str,
    old_name: &str,
    default: T,
) -> T {
    match get_env_with_fallback(new_name, old_name) {
        Some(raw) => raw.trim().parse().unwrap_or_else(|_| {
            tracing::warn!("Invalid value '{}' for '{}', using default", raw, new_name);
            default
        }),
        None => default,
    }
}

/// Get a duration (`"1m"`, `"30s"`, `"1h 30m"`) with fallback
///
/// Invalid values log a warning and return `default`.
pub fn get_env_duration(new_name: &str, old_name: &str, default: Duration) -> Duration {
    match get_env_with_fallback(new_name, old_name) {
        Some(raw) => humantime::parse_duration(raw.trim()).unwrap_or_else(|e| {
            tracing::warn!(
                "Invalid duration '{}' for '{}' ({}), using default",
                raw,
                new_name,
                e
            );
            default
        }),
        None => default,
    }
}

/// ポート番号だけの指定を `0.0.0.0:{port}` に正規化する
pub fn normalize_bind_addr(value: &str) -> String {
    let value = value.trim();
    if value.parse::<u16>().is_ok() {
        format!("0.0.0.0:{}", value)
    } else if let Some(port) = value.strip_prefix(':') {
        format!("0.0.0.0:{}", port)
    } else {
        value.to_string()
    }
}

/// コールドストレージの接続先
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ColdStoreConfig {
    /// S3/MinIO互換のHTTPオブジェクトストア
    Http {
        /// エンドポイントURL
        endpoint: String,
        /// バケット名
        bucket: String,
        /// Bearerトークン
        token: Option<String>,
    },
    /// ローカルディレクトリ
    Filesystem {
        /// ルートディレクトリ
        root: PathBuf,
    },
}

impl ColdStoreConfig {
    /// 環境変数から読み込む（エンドポイント未設定ならファイルシステム）
    pub fn from_env() -> Self {
        match get_env_with_fallback("AUDITORY_BUCKET_ENDPOINT", "BUCKET_ENDPOINT") {
            Some(endpoint) if !endpoint.trim().is_empty() => Self::Http {
                endpoint: endpoint.trim().to_string(),
                bucket: get_env_with_fallback_or(
                    "AUDITORY_BUCKET_NAME",
                    "BUCKET_NAME",
                    "auditory-bucket",
                ),
                token: get_env_with_fallback("AUDITORY_BUCKET_TOKEN", "")
                    .filter(|token| !token.is_empty()),
            },
            _ => Self::Filesystem {
                root: PathBuf::from(get_env_with_fallback_or("AUDITORY_COLD_DIR", "", "cold")),
            },
        }
    }
}

/// 定期ジョブの設定
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TasksConfig {
    /// 冪等性ウィンドウ・保留リクエスト・アイドルロックのスイープ周期
    pub sweep_period: Duration,
    /// バックアップ周期
    pub backup_period: Duration,
    /// コンパクション判定の周期
    pub store_period: Duration,
    /// コンパクションの起動条件
    pub compaction_trigger: CompactionTrigger,
}

impl Default for TasksConfig {
    fn default() -> Self {
        Self {
            sweep_period: Duration::from_secs(60),
            backup_period: Duration::from_secs(30 * 60),
            store_period: Duration::from_secs(60),
            compaction_trigger: CompactionTrigger::default(),
        }
    }
}

impl TasksConfig {
    /// 環境変数から読み込む
    pub fn from_env() -> Self {
        let defaults = Self::default();
        let compaction_trigger = match std::env::var("AUDITORY_COMPACTION_TRIGGER") {
            Ok(raw) => raw.parse().unwrap_or_else(|e| {
                tracing::warn!("{}, using default", e);
                defaults.compaction_trigger
            }),
            Err(_) => defaults.compaction_trigger,
        };
        Self {
            sweep_period: get_env_duration(
                "AUDITORY_IDEMPOTENCY_SWEEP_PERIOD",
                "TASKS_IDEMPOTENCY_CLEAR_PERIOD",
                defaults.sweep_period,
            ),
            backup_period: get_env_duration(
                "AUDITORY_BACKUP_PERIOD",
                "TASKS_BACKUP_PERIOD",
                defaults.backup_period,
            ),
            store_period: get_env_duration(
                "AUDITORY_STORE_PERIOD",
                "TASKS_STORE_PERIOD",
                defaults.store_period,
            ),
            compaction_trigger,
        }
    }
}

/// アプリケーション設定
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuditoryConfig {
    /// 管理APIの待ち受けアドレス
    pub control_addr: String,
    /// プロキシの待ち受けアドレス
    pub proxy_addr: String,
    /// プロキシ転送先（未設定ならプロキシを起動しない）
    pub target_url: Option<String>,
    /// ローカル監査ログのディレクトリ
    pub data_dir: PathBuf,
    /// 冪等性ウィンドウのTTL
    pub idempotency_ttl: Duration,
    /// マスク対象のヘッダー名・クエリパラメータ名
    pub redact: Vec<String>,
    /// 保留リクエストのTTL（`None` なら破棄しない）
    pub pending_ttl: Option<Duration>,
    /// キャプチャするボディの上限
    pub max_body_bytes: usize,
    /// コールドストレージ
    pub cold_store: ColdStoreConfig,
    /// 保持日数
    pub retention: RetentionConfig,
    /// 定期ジョブ
    pub tasks: TasksConfig,
}

impl Default for AuditoryConfig {
    fn default() -> Self {
        Self {
            control_addr: "0.0.0.0:8080".to_string(),
            proxy_addr: "0.0.0.0:8081".to_string(),
            target_url: None,
            data_dir: PathBuf::from("tmp"),
            idempotency_ttl: Duration::from_secs(60),
            redact: split_csv(DEFAULT_REDACT),
            pending_ttl: Some(Duration::from_secs(5 * 60)),
            max_body_bytes: DEFAULT_MAX_BODY_BYTES,
            cold_store: ColdStoreConfig::Filesystem {
                root: PathBuf::from("cold"),
            },
            retention: RetentionConfig::default(),
            tasks: TasksConfig::default(),
        }
    }
}

impl AuditoryConfig {
    /// 環境変数から読み込む
    pub fn from_env() -> Self {
        let defaults = Self::default();

        let control_addr = get_env_with_fallback("AUDITORY_CONTROL_ADDR", "APP_PORT")
            .map(|value| normalize_bind_addr(&value))
            .unwrap_or(defaults.control_addr);
        let proxy_addr = get_env_with_fallback("AUDITORY_PROXY_ADDR", "PORT")
            .map(|value| normalize_bind_addr(&value))
            .unwrap_or(defaults.proxy_addr);
        let target_url = get_env_with_fallback("AUDITORY_TARGET_URL", "TARGET_URL")
            .map(|value| value.trim().to_string())
            .filter(|value| !value.is_empty());

        let pending_ttl = get_env_duration(
            "AUDITORY_PENDING_TTL",
            "",
            defaults.pending_ttl.unwrap_or_default(),
        );

        Self {
            control_addr,
            proxy_addr,
            target_url,
            data_dir: PathBuf::from(get_env_with_fallback_or(
                "AUDITORY_DATA_DIR",
                "DATA_DIR",
                "tmp",
            )),
            idempotency_ttl: get_env_duration(
                "AUDITORY_IDEMPOTENCY_TTL",
                "APP_IDEMPOTENCY_TTL",
                defaults.idempotency_ttl,
            ),
            redact: get_env_with_fallback("AUDITORY_REDACT", "APP_REPLACED_AUDIT")
                .map(|csv| split_csv(&csv))
                .unwrap_or(defaults.redact),
            pending_ttl: (!pending_ttl.is_zero()).then_some(pending_ttl),
            max_body_bytes: get_env_with_fallback_parse(
                "AUDITORY_MAX_BODY_BYTES",
                "",
                defaults.max_body_bytes,
            ),
            cold_store: ColdStoreConfig::from_env(),
            retention: RetentionConfig {
                backup_days: get_env_with_fallback_parse(
                    "AUDITORY_BACKUP_RETENTION_DAYS",
                    "BUCKET_EXPIRES_BACKUP_DAYS",
                    defaults.retention.backup_days,
                ),
                store_days: get_env_with_fallback_parse(
                    "AUDITORY_STORE_RETENTION_DAYS",
                    "BUCKET_EXPIRES_STORE_DAYS",
                    defaults.retention.store_days,
                ),
            },
            tasks: TasksConfig::from_env(),
        }
    }
}

fn split_csv(csv: &str) -> Vec<String> {
    csv.split(',')
        .map(str::trim)
        .filter(|name| !name.is_empty())
        .map(str::to_string)
        .collect()
}
