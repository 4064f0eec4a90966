//! serve サブコマンド
//!
//! 管理API・プロキシ・定期ジョブを起動します。

use crate::config::{normalize_bind_addr, AuditoryConfig};
use clap::Args;
use std::path::PathBuf;

/// serve サブコマンドの引数
///
/// 指定した値は環境変数の設定より優先する。
#[derive(Args, Debug, Clone, Default)]
pub struct ServeArgs {
    /// Control plane bind address (or port)
    #[arg(long)]
    pub control_addr: Option<String>,

    /// Proxy bind address (or port)
    #[arg(long)]
    pub proxy_addr: Option<String>,

    /// Upstream the proxy forwards to
    #[arg(long)]
    pub target_url: Option<String>,

    /// Local audit log directory
    #[arg(long)]
    pub data_dir: Option<PathBuf>,
}

impl ServeArgs {
    /// 引数で設定を上書きする
    pub fn apply(self, mut config: AuditoryConfig) -> AuditoryConfig {
        if let Some(addr) = self.control_addr {
            config.control_addr = normalize_bind_addr(&addr);
        }
        if let Some(addr) = self.proxy_addr {
            config.proxy_addr = normalize_bind_addr(&addr);
        }
        if let Some(target) = self.target_url {
            config.target_url = Some(target);
        }
        if let Some(dir) = self.data_dir {
            config.data_dir = dir;
        }
        config
    }
}
