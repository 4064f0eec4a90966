//! アーカイブ・スイープの定期実行
//!
//! 各ジョブは独立したtokioタスクとして動き、共通の `ShutdownController` を監視する。
//! シャットダウンはtick境界でのみ観測し、実行中のジョブは中断しない。
//! ジョブの失敗はログに残してそのtickを諦め、ループは継続する。

use crate::archive::Archiver;
use crate::shutdown::ShutdownController;
use crate::store::Sweepable;
use chrono::{DateTime, NaiveDate, Timelike, Utc};
use std::future::Future;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, error, info};

/// 周期の下限
const MIN_PERIOD: Duration = Duration::from_millis(10);

/// 日次コンパクションの起動条件（日付の境界はUTC）
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CompactionTrigger {
    /// tickが00:00:00ちょうどに当たった場合のみ実行（周期1秒で使う）
    ExactMidnight,
    /// 日付が変わった後の最初のtickで1日1回実行
    #[default]
    FirstTickAfterMidnight,
}

impl FromStr for CompactionTrigger {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "exact" => Ok(Self::ExactMidnight),
            "daily" => Ok(Self::FirstTickAfterMidnight),
            other => Err(format!(
                "unknown compaction trigger '{}', expected 'daily' or 'exact'",
                other
            )),
        }
    }
}

/// 日次コンパクションの実行判定
#[derive(Debug, Clone)]
pub struct CompactionSchedule {
    trigger: CompactionTrigger,
    last_run: NaiveDate,
}

impl CompactionSchedule {
    /// 起動時刻を基準に作成（起動した日には実行しない）
    pub fn new(trigger: CompactionTrigger, started_at: DateTime<Utc>) -> Self {
        Self {
            trigger,
            last_run: started_at.date_naive(),
        }
    }

    /// 起動条件
    pub fn trigger(&self) -> CompactionTrigger {
        self.trigger
    }

    /// このtickで実行すべきか
    ///
    /// `FirstTickAfterMidnight` では真を返した時点で当日を実行済みとする。
    pub fn should_run(&mut self, now: DateTime<Utc>) -> bool {
        match self.trigger {
            CompactionTrigger::ExactMidnight => {
                now.hour() == 0 && now.minute() == 0 && now.second() == 0
            }
            CompactionTrigger::FirstTickAfterMidnight => {
                let today = now.date_naive();
                if today > self.last_run {
                    self.last_run = today;
                    true
                } else {
                    false
                }
            }
        }
    }
}

/// 周期ジョブの共通ループ
async fn run_periodic<F, Fut>(
    name: &'static str,
    period: Duration,
    shutdown: ShutdownController,
    mut job: F,
) where
    F: FnMut() -> Fut,
    Fut: Future<Output = ()>,
{
    let mut interval = tokio::time::interval(period.max(MIN_PERIOD));
    interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
    // 最初のtickはすぐに発火するのでスキップ
    interval.tick().await;

    info!(task = name, period = ?period, "Background task started");
    loop {
        tokio::select! {
            biased;
            _ = shutdown.wait() => {
                info!(task = name, "Background task stopped");
                return;
            }
            _ = interval.tick() => {
                job().await;
            }
        }
    }
}

/// スナップショットバックアップを定期実行する
pub fn spawn_backup_task(
    archiver: Archiver,
    period: Duration,
    shutdown: ShutdownController,
) -> JoinHandle<()> {
    tokio::spawn(run_periodic("backup", period, shutdown, move || {
        let archiver = archiver.clone();
        async move {
            if let Err(e) = archiver.backup().await {
                error!(error = %e, "Scheduled backup failed, skipping this tick");
            }
        }
    }))
}

/// 日次コンパクションを定期実行する
pub fn spawn_store_task(
    archiver: Archiver,
    period: Duration,
    mut schedule: CompactionSchedule,
    shutdown: ShutdownController,
) -> JoinHandle<()> {
    tokio::spawn(run_periodic("store", period, shutdown, move || {
        let archiver = archiver.clone();
        let due = schedule.should_run(Utc::now());
        async move {
            if !due {
                return;
            }
            match archiver.store().await {
                Ok(report) => info!(
                    archived = report.archived,
                    pruned = report.pruned,
                    "Scheduled compaction finished"
                ),
                Err(e) => error!(error = %e, "Scheduled compaction failed, skipping this tick"),
            }
        }
    }))
}

/// 期限切れエントリのスイープを定期実行する
pub fn spawn_sweep_task(
    targets: Vec<Arc<dyn Sweepable>>,
    period: Duration,
    shutdown: ShutdownController,
) -> JoinHandle<()> {
    tokio::spawn(run_periodic("sweep", period, shutdown, move || {
        let now = Utc::now();
        for target in &targets {
            let removed = target.sweep(now);
            if removed > 0 {
                debug!(sweeper = target.name(), removed, "Swept expired entries");
            }
        }
        std::future::ready(())
    }))
}
