//! リクエスト/レスポンス相関
//!
//! プロキシがリクエストを転送する前に `observe_request` でバッファし、
//! 上流のレスポンス受信後に `pair_response` で対応付けて1件の監査レコードにする。
//!
//! - 集約キー: `X-Client-ID`（無ければ `"unknown"`）
//! - リクエストID: `X-Request-ID`（無ければ空文字列。識別子の無いリクエスト同士は同じ枠を奪い合う）
//! - 相関ID: `X-Correlation-ID`（無ければ `"unknown"`、メタデータにのみ使う）
//!
//! レスポンスが届かないリクエストは `pending_ttl` を過ぎるとスイープで破棄される。
//! TTL未設定なら無期限に残る。

use crate::audit::ingest::IngestService;
use crate::audit::redact::Redactor;
use crate::common::error::AuditError;
use crate::common::types::{
    header_value, AuditMetadata, AuditRecord, HttpAudit, HttpHeaders, RequestAudit,
    ResponseAudit, HTTP_AUDIT_EVENT, UNKNOWN,
};
use crate::lock::{self, KeyedLocks};
use crate::store::Sweepable;
use chrono::{DateTime, Duration, Utc};
use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};
use tracing::{debug, warn};

/// クライアント識別ヘッダー
pub const CLIENT_ID_HEADER: &str = "X-Client-ID";
/// リクエスト識別ヘッダー
pub const REQUEST_ID_HEADER: &str = "X-Request-ID";
/// 相関識別ヘッダー
pub const CORRELATION_ID_HEADER: &str = "X-Correlation-ID";

const LOCK_SCOPE: &str = "correlate";

/// リクエストヘッダーから取り出した識別子
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Identity {
    /// 集約キー
    pub client_id: String,
    /// リクエストID
    pub request_id: String,
    /// 相関ID
    pub correlation_id: String,
}

impl Identity {
    /// ヘッダーから識別子を取り出す
    pub fn from_headers(headers: &HttpHeaders) -> Self {
        let non_empty =
            |name: &str| header_value(headers, name).filter(|value| !value.is_empty());
        Self {
            client_id: non_empty(CLIENT_ID_HEADER).unwrap_or(UNKNOWN).to_string(),
            request_id: non_empty(REQUEST_ID_HEADER).unwrap_or_default().to_string(),
            correlation_id: non_empty(CORRELATION_ID_HEADER)
                .unwrap_or(UNKNOWN)
                .to_string(),
        }
    }
}

#[derive(Debug, Clone)]
struct PendingRequest {
    request: RequestAudit,
    observed_at: DateTime<Utc>,
}

type PendingMap = HashMap<String, HashMap<String, PendingRequest>>;

/// リクエスト/レスポンス相関器
pub struct HttpCorrelator {
    ingest: IngestService,
    redactor: Redactor,
    pending_ttl: Option<Duration>,
    locks: KeyedLocks,
    pending: Mutex<PendingMap>,
}

impl HttpCorrelator {
    /// 新しい相関器を作成
    ///
    /// `pending_ttl` が `None` またはゼロなら未対応リクエストを破棄しない。
    pub fn new(
        ingest: IngestService,
        redactor: Redactor,
        pending_ttl: Option<std::time::Duration>,
        locks: KeyedLocks,
    ) -> Self {
        let pending_ttl = pending_ttl
            .filter(|ttl| !ttl.is_zero())
            .and_then(|ttl| Duration::from_std(ttl).ok());
        Self {
            ingest,
            redactor,
            pending_ttl,
            locks,
            pending: Mutex::new(HashMap::new()),
        }
    }

    fn pending(&self) -> MutexGuard<'_, PendingMap> {
        self.pending.lock().unwrap_or_else(|p| p.into_inner())
    }

    /// 転送前のリクエストを記録する
    pub async fn observe_request(&self, request: RequestAudit) -> Result<(), AuditError> {
        self.observe_request_at(request, Utc::now()).await
    }

    /// 観測時刻を指定してリクエストを記録する
    pub async fn observe_request_at(
        &self,
        mut request: RequestAudit,
        now: DateTime<Utc>,
    ) -> Result<(), AuditError> {
        let identity = Identity::from_headers(&request.headers);
        self.redactor.redact_headers(&mut request.headers);
        request.query = self.redactor.redact_query(&request.query);

        let _guard = self
            .locks
            .write(&lock::scoped(LOCK_SCOPE, &identity.client_id))
            .await;
        let replaced = self
            .pending()
            .entry(identity.client_id.clone())
            .or_default()
            .insert(
                identity.request_id.clone(),
                PendingRequest {
                    request,
                    observed_at: now,
                },
            );
        if replaced.is_some() {
            warn!(
                client_id = %identity.client_id,
                request_id = %identity.request_id,
                "Pending request replaced by a newer request with the same id"
            );
        }
        Ok(())
    }

    /// 上流レスポンスを対応するリクエストと組にして取り込む
    ///
    /// `request_headers` は元のリクエストのヘッダー（マスク前）。
    /// 成功時は取り込まれたレコードの冪等性キーを返す。
    pub async fn pair_response(
        &self,
        mut response: ResponseAudit,
        request_headers: &HttpHeaders,
    ) -> Result<String, AuditError> {
        let identity = Identity::from_headers(request_headers);
        let _guard = self
            .locks
            .write(&lock::scoped(LOCK_SCOPE, &identity.client_id))
            .await;

        let pending = self.take_pending(&identity.client_id, &identity.request_id);
        let Some(pending) = pending else {
            return Err(AuditError::UnmatchedResponse(format!(
                "client {} request {:?}",
                identity.client_id, identity.request_id
            )));
        };

        // Set-Cookie等のレスポンス側ヘッダーも同じ一覧でマスクする
        self.redactor.redact_headers(&mut response.headers);
        let payload = HttpAudit {
            request: pending.request,
            response,
        };
        let record = AuditRecord {
            metadata: AuditMetadata {
                key: identity.client_id,
                event_name: HTTP_AUDIT_EVENT.to_string(),
                request_id: identity.request_id,
                correlation_id: identity.correlation_id,
                event_at: Utc::now(),
            },
            data: serde_json::to_value(&payload)?,
        };
        self.ingest.save(&record).await
    }

    fn take_pending(&self, client_id: &str, request_id: &str) -> Option<PendingRequest> {
        let mut pending = self.pending();
        let requests = pending.get_mut(client_id)?;
        let taken = requests.remove(request_id);
        if requests.is_empty() {
            pending.remove(client_id);
        }
        taken
    }

    /// バッファ中のリクエスト数
    pub fn pending_count(&self) -> usize {
        self.pending().values().map(HashMap::len).sum()
    }

    /// TTLを過ぎた未対応リクエストを破棄し、破棄数を返す
    pub fn sweep_pending_at(&self, now: DateTime<Utc>) -> usize {
        let Some(ttl) = self.pending_ttl else {
            return 0;
        };
        let mut removed = 0;
        let mut pending = self.pending();
        for (client_id, requests) in pending.iter_mut() {
            requests.retain(|request_id, entry| {
                let expired = entry.observed_at + ttl < now;
                if expired {
                    warn!(
                        client_id = %client_id,
                        request_id = %request_id,
                        observed_at = %entry.observed_at,
                        "Dropping request that never received a response"
                    );
                    removed += 1;
                }
                !expired
            });
        }
        pending.retain(|_, requests| !requests.is_empty());
        if removed > 0 {
            debug!(removed, "Swept pending correlations");
        }
        removed
    }
}

impl Sweepable for HttpCorrelator {
    fn name(&self) -> &'static str {
        "pending_correlations"
    }

    fn sweep(&self, now: DateTime<Utc>) -> usize {
        self.sweep_pending_at(now)
    }
}
