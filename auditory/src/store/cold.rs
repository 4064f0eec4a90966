//! コールドストレージ実装
//!
//! - `HttpColdStore`: S3/MinIO互換のパススタイルPUT
//! - `FsColdStore`: ローカルディレクトリ（有効期限はサイドカーファイル）

use crate::common::error::ColdStoreError;
use crate::store::ColdStore;
use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use reqwest::header::{AUTHORIZATION, CONTENT_TYPE, EXPIRES};
use std::path::{Component, Path, PathBuf};
use std::time::Duration;
use tracing::debug;

/// アップロードのタイムアウト
const UPLOAD_TIMEOUT: Duration = Duration::from_secs(60);

/// HTTPオブジェクトストア
///
/// `PUT {endpoint}/{bucket}/{object_key}` を送る。
#[derive(Debug, Clone)]
pub struct HttpColdStore {
    client: reqwest::Client,
    endpoint: reqwest::Url,
    bucket: String,
    token: Option<String>,
}

impl HttpColdStore {
    /// 新しいストアを作成
    pub fn new(
        client: reqwest::Client,
        endpoint: reqwest::Url,
        bucket: impl Into<String>,
        token: Option<String>,
    ) -> Self {
        Self {
            client,
            endpoint,
            bucket: bucket.into(),
            token,
        }
    }

    /// オブジェクトのURL
    ///
    /// `.` / `..` / 空のセグメントはURL正規化で消えて別のオブジェクトを指すため拒否する。
    pub fn object_url(&self, object_key: &str) -> Result<reqwest::Url, ColdStoreError> {
        if object_key
            .split('/')
            .any(|segment| segment.is_empty() || segment == "." || segment == "..")
        {
            return Err(ColdStoreError::InvalidKey(object_key.to_string()));
        }
        let mut url = self.endpoint.clone();
        url.path_segments_mut()
            .map_err(|_| {
                ColdStoreError::InvalidKey(format!("endpoint {} cannot be a base", self.endpoint))
            })?
            .pop_if_empty()
            .push(&self.bucket)
            .extend(object_key.split('/'));
        Ok(url)
    }
}

/// HTTP-date形式（RFC 7231）
fn http_date(at: DateTime<Utc>) -> String {
    at.format("%a, %d %b %Y %H:%M:%S GMT").to_string()
}

#[async_trait]
impl ColdStore for HttpColdStore {
    async fn put(
        &self,
        object_key: &str,
        body: Vec<u8>,
        expires_at: DateTime<Utc>,
    ) -> Result<(), ColdStoreError> {
        let url = self.object_url(object_key)?;
        let size = body.len();

        let mut request = self
            .client
            .put(url)
            .timeout(UPLOAD_TIMEOUT)
            .header(CONTENT_TYPE, "application/json")
            .header(EXPIRES, http_date(expires_at))
            .body(body);
        if let Some(token) = &self.token {
            request = request.header(AUTHORIZATION, format!("Bearer {}", token));
        }

        let response = request.send().await.map_err(|e| ColdStoreError::Transport {
            object_key: object_key.to_string(),
            message: e.to_string(),
        })?;

        let status = response.status();
        if !status.is_success() {
            return Err(ColdStoreError::Status {
                object_key: object_key.to_string(),
                status: status.as_u16(),
            });
        }

        debug!(object_key = %object_key, bytes = size, "Uploaded object");
        Ok(())
    }
}

/// ファイルシステム上のコールドストア
#[derive(Debug, Clone)]
pub struct FsColdStore {
    root: PathBuf,
}

impl FsColdStore {
    /// ルートディレクトリを指定して作成
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// オブジェクトキーをルート配下のパスへ変換（`..` や絶対パスは拒否）
    pub fn object_path(&self, object_key: &str) -> Result<PathBuf, ColdStoreError> {
        let relative = Path::new(object_key);
        let valid = !object_key.is_empty()
            && relative
                .components()
                .all(|component| matches!(component, Component::Normal(_)));
        if !valid {
            return Err(ColdStoreError::InvalidKey(object_key.to_string()));
        }
        Ok(self.root.join(relative))
    }

    /// 有効期限サイドカーのパス
    pub fn expires_path(object_path: &Path) -> PathBuf {
        let mut name = object_path.as_os_str().to_owned();
        name.push(".expires");
        PathBuf::from(name)
    }
}

async fn write_atomic(path: &Path, body: &[u8]) -> Result<(), ColdStoreError> {
    let io_err = |path: &Path| {
        let path = path.to_path_buf();
        move |source| ColdStoreError::Io { path, source }
    };
    let mut tmp = path.as_os_str().to_owned();
    tmp.push(".tmp");
    let tmp = PathBuf::from(tmp);
    tokio::fs::write(&tmp, body).await.map_err(io_err(&tmp))?;
    tokio::fs::rename(&tmp, path).await.map_err(io_err(path))
}

#[async_trait]
impl ColdStore for FsColdStore {
    async fn put(
        &self,
        object_key: &str,
        body: Vec<u8>,
        expires_at: DateTime<Utc>,
    ) -> Result<(), ColdStoreError> {
        let path = self.object_path(object_key)?;
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|source| ColdStoreError::Io {
                    path: parent.to_path_buf(),
                    source,
                })?;
        }

        write_atomic(&path, &body).await?;
        let expires = expires_at.to_rfc3339_opts(SecondsFormat::Secs, true);
        write_atomic(&Self::expires_path(&path), expires.as_bytes()).await?;

        debug!(object_key = %object_key, path = %path.display(), "Stored object");
        Ok(())
    }
}
