use std::path::PathBuf;

use auditory::bootstrap::{initialize, InitContext};
use auditory::config::{AuditoryConfig, ColdStoreConfig};
use auditory::shutdown::ShutdownController;
use auditory::AppState;
use tempfile::TempDir;

use super::http::{spawn_router, TestServer};

/// テスト用に起動した管理API（とプロキシ）
#[allow(dead_code)]
pub struct TestAuditory {
    pub control: TestServer,
    pub proxy: Option<TestServer>,
    pub state: AppState,
    pub dir: TempDir,
}

#[allow(dead_code)]
impl TestAuditory {
    /// コールドストアのルート
    pub fn cold_root(&self) -> PathBuf {
        self.dir.path().join("cold")
    }

    /// プロキシのベースURL
    pub fn proxy_url(&self) -> String {
        self.proxy
            .as_ref()
            .expect("proxy was not started")
            .url()
    }

    pub async fn stop(self) {
        self.state.shutdown.request_shutdown();
        self.control.stop().await;
        if let Some(proxy) = self.proxy {
            proxy.stop().await;
        }
    }
}

/// 一時ディレクトリを使うテスト設定
pub fn test_config(dir: &TempDir, target_url: Option<String>) -> AuditoryConfig {
    AuditoryConfig {
        control_addr: "127.0.0.1:0".to_string(),
        proxy_addr: "127.0.0.1:0".to_string(),
        target_url,
        data_dir: dir.path().join("logs"),
        cold_store: ColdStoreConfig::Filesystem {
            root: dir.path().join("cold"),
        },
        ..AuditoryConfig::default()
    }
}

/// 管理APIを起動する（`target_url` を渡すとプロキシも起動する）
pub async fn spawn_auditory(target_url: Option<String>) -> TestAuditory {
    let dir = tempfile::tempdir().expect("failed to create temp dir");
    let config = test_config(&dir, target_url);
    let InitContext { state, proxy, .. } =
        initialize(&config, ShutdownController::default()).expect("initialize failed");

    let control = spawn_router(auditory::api::create_app(state.clone())).await;
    let proxy = match proxy {
        Some(proxy_state) => {
            Some(spawn_router(auditory::api::proxy::create_proxy_app(proxy_state)).await)
        }
        None => None,
    };

    TestAuditory {
        control,
        proxy,
        state,
        dir,
    }
}
