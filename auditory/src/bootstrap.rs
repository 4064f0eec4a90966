//! サーバー初期化ロジック
//!
//! 設定値からロックレジストリ・ストレージ・取り込みサービス・相関器を組み立て、
//! 定期ジョブを起動する。

use crate::api::proxy::ProxyState;
use crate::archive::schedule::{
    spawn_backup_task, spawn_store_task, spawn_sweep_task, CompactionSchedule,
};
use crate::archive::Archiver;
use crate::audit::{HttpCorrelator, IngestService, Redactor};
use crate::config::{AuditoryConfig, ColdStoreConfig};
use crate::lock::KeyedLocks;
use crate::shutdown::ShutdownController;
use crate::store::cold::{FsColdStore, HttpColdStore};
use crate::store::file::FileAuditLog;
use crate::store::idempotency::IdempotencyWindow;
use crate::store::{ColdStore, Sweepable};
use crate::AppState;
use anyhow::Context;
use chrono::Utc;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::info;

/// サーバー初期化結果
pub struct InitContext {
    /// 管理API用の状態
    pub state: AppState,
    /// プロキシ用の状態（転送先未設定なら `None`）
    pub proxy: Option<ProxyState>,
    /// スイープ対象（冪等性ウィンドウ・保留リクエスト・アイドルロック）
    pub sweepables: Vec<Arc<dyn Sweepable>>,
}

fn build_cold_store(
    config: &ColdStoreConfig,
    client: &reqwest::Client,
) -> anyhow::Result<Arc<dyn ColdStore>> {
    Ok(match config {
        ColdStoreConfig::Http {
            endpoint,
            bucket,
            token,
        } => {
            let endpoint = reqwest::Url::parse(endpoint)
                .with_context(|| format!("invalid bucket endpoint '{}'", endpoint))?;
            info!(endpoint = %endpoint, bucket = %bucket, "Using HTTP object store");
            Arc::new(HttpColdStore::new(
                client.clone(),
                endpoint,
                bucket.clone(),
                token.clone(),
            ))
        }
        ColdStoreConfig::Filesystem { root } => {
            info!(root = %root.display(), "Using filesystem cold store");
            Arc::new(FsColdStore::new(root.clone()))
        }
    })
}

/// 設定値から全コンポーネントを組み立てる
pub fn initialize(
    config: &AuditoryConfig,
    shutdown: ShutdownController,
) -> anyhow::Result<InitContext> {
    info!("Auditory v{}", env!("CARGO_PKG_VERSION"));

    let http_client = reqwest::Client::builder()
        .pool_idle_timeout(Duration::from_secs(60))
        .tcp_keepalive(Duration::from_secs(30))
        .build()
        .context("failed to create HTTP client")?;

    let locks = KeyedLocks::new();
    let audit_log = Arc::new(FileAuditLog::new(config.data_dir.clone(), locks.clone()));
    info!(dir = %config.data_dir.display(), "Audit log storage initialized");

    let window = Arc::new(IdempotencyWindow::new(config.idempotency_ttl));
    let ingest = IngestService::new(audit_log.clone(), window.clone(), locks.clone());

    let cold = build_cold_store(&config.cold_store, &http_client)?;
    let archiver = Archiver::new(audit_log.clone(), cold, config.retention);

    let correlator = Arc::new(HttpCorrelator::new(
        ingest.clone(),
        Redactor::new(&config.redact),
        config.pending_ttl,
        locks.clone(),
    ));

    let proxy = match &config.target_url {
        Some(target) => {
            let target = reqwest::Url::parse(target)
                .with_context(|| format!("invalid target url '{}'", target))?;
            info!(target = %target, "Proxy target configured");
            Some(ProxyState {
                target,
                client: http_client,
                correlator: correlator.clone(),
                max_body_bytes: config.max_body_bytes,
            })
        }
        None => {
            info!("No target url configured, proxy disabled");
            None
        }
    };

    let sweepables: Vec<Arc<dyn Sweepable>> = vec![window, correlator, Arc::new(locks)];

    Ok(InitContext {
        state: AppState {
            ingest,
            archiver,
            audit_log,
            shutdown,
        },
        proxy,
        sweepables,
    })
}

/// 定期ジョブ（バックアップ・コンパクション・スイープ）を起動する
pub fn spawn_background_tasks(ctx: &InitContext, config: &AuditoryConfig) -> Vec<JoinHandle<()>> {
    let shutdown = ctx.state.shutdown.clone();
    let tasks = &config.tasks;
    let schedule = CompactionSchedule::new(tasks.compaction_trigger, Utc::now());
    info!(
        trigger = ?tasks.compaction_trigger,
        backup_period = ?tasks.backup_period,
        store_period = ?tasks.store_period,
        sweep_period = ?tasks.sweep_period,
        "Starting background tasks"
    );

    vec![
        spawn_backup_task(
            ctx.state.archiver.clone(),
            tasks.backup_period,
            shutdown.clone(),
        ),
        spawn_store_task(
            ctx.state.archiver.clone(),
            tasks.store_period,
            schedule,
            shutdown.clone(),
        ),
        spawn_sweep_task(ctx.sweepables.clone(), tasks.sweep_period, shutdown),
    ]
}
