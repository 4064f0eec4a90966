//! データプレーンのリバースプロキシ
//!
//! すべてのメソッド・パスを転送先へ中継し、転送前にリクエストを、
//! 上流の応答後にレスポンスを相関器へ渡す。
//! 監査側の失敗はログに残すだけで、中継される応答には影響しない。

use crate::audit::HttpCorrelator;
use crate::common::types::{collect_headers, HttpHeaders, RequestAudit, ResponseAudit};
use axum::{
    body::{to_bytes, Body},
    extract::{Request, State},
    http::{HeaderMap, HeaderName, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
    Router,
};
use std::sync::Arc;
use tower_http::trace::TraceLayer;
use tracing::{debug, warn};

/// 中継しないヘッダー（hop-by-hop と、再計算されるもの）
const SKIPPED_HEADERS: &[&str] = &[
    "connection",
    "keep-alive",
    "proxy-authenticate",
    "proxy-authorization",
    "te",
    "trailer",
    "trailers",
    "transfer-encoding",
    "upgrade",
    "host",
    "content-length",
];

fn is_skipped(name: &str) -> bool {
    SKIPPED_HEADERS
        .iter()
        .any(|skipped| skipped.eq_ignore_ascii_case(name))
}

/// プロキシの状態
#[derive(Clone)]
pub struct ProxyState {
    /// 転送先
    pub target: reqwest::Url,
    /// 上流HTTPクライアント
    pub client: reqwest::Client,
    /// 相関器
    pub correlator: Arc<HttpCorrelator>,
    /// 受け付けるリクエストボディの上限
    pub max_body_bytes: usize,
}

/// プロキシ用Routerを作成
pub fn create_proxy_app(state: ProxyState) -> Router {
    Router::new()
        .fallback(forward)
        .with_state(state)
        .layer(TraceLayer::new_for_http())
}

/// 転送先URL（転送先のベースパスにリクエストパスを連結）
pub fn upstream_url(target: &reqwest::Url, path: &str, query: Option<&str>) -> reqwest::Url {
    let mut url = target.clone();
    let base = target.path().trim_end_matches('/');
    url.set_path(&format!("{}{}", base, path));
    url.set_query(query.filter(|q| !q.is_empty()));
    url
}

fn header_map_to_audit(headers: &HeaderMap) -> HttpHeaders {
    collect_headers(
        headers
            .iter()
            .map(|(name, value)| (name.as_str(), value.as_bytes())),
    )
}

async fn forward(State(state): State<ProxyState>, request: Request) -> Response {
    let (parts, body) = request.into_parts();
    let body = match to_bytes(body, state.max_body_bytes).await {
        Ok(body) => body,
        Err(e) => {
            warn!(error = %e, "Failed to read request body");
            return (StatusCode::PAYLOAD_TOO_LARGE, "request body too large").into_response();
        }
    };

    let request_headers = header_map_to_audit(&parts.headers);
    let capture = RequestAudit {
        headers: request_headers.clone(),
        body: body.to_vec(),
        method: parts.method.to_string(),
        path: parts.uri.path().to_string(),
        query: parts.uri.query().unwrap_or_default().to_string(),
    };
    if let Err(e) = state.correlator.observe_request(capture).await {
        warn!(error = %e, "Failed to capture request");
    }

    let url = upstream_url(&state.target, parts.uri.path(), parts.uri.query());
    let method = match reqwest::Method::from_bytes(parts.method.as_str().as_bytes()) {
        Ok(method) => method,
        Err(_) => return (StatusCode::BAD_REQUEST, "unsupported method").into_response(),
    };

    let mut upstream = state.client.request(method, url.clone());
    for (name, value) in parts.headers.iter() {
        if is_skipped(name.as_str()) {
            continue;
        }
        upstream = upstream.header(name.as_str(), value.as_bytes());
    }

    let upstream_response = match upstream.body(body).send().await {
        Ok(response) => response,
        Err(e) => {
            warn!(url = %url, error = %e, "Upstream request failed");
            return (StatusCode::BAD_GATEWAY, "upstream unavailable").into_response();
        }
    };

    let status = upstream_response.status().as_u16();
    let mut response_headers = HeaderMap::new();
    for (name, value) in upstream_response.headers().iter() {
        if let (Ok(header_name), Ok(header_value)) = (
            HeaderName::from_bytes(name.as_str().as_bytes()),
            HeaderValue::from_bytes(value.as_bytes()),
        ) {
            response_headers.append(header_name, header_value);
        }
    }
    let response_body = match upstream_response.bytes().await {
        Ok(bytes) => bytes,
        Err(e) => {
            warn!(url = %url, error = %e, "Failed to read upstream response body");
            return (StatusCode::BAD_GATEWAY, "upstream response interrupted").into_response();
        }
    };

    let capture = ResponseAudit {
        status_code: status,
        headers: header_map_to_audit(&response_headers),
        body: response_body.to_vec(),
    };
    match state.correlator.pair_response(capture, &request_headers).await {
        Ok(idempotency_key) => debug!(idempotency_key = %idempotency_key, "Exchange audited"),
        Err(e) => warn!(error = %e, "Failed to audit exchange"),
    }

    let mut response = Response::new(Body::from(response_body));
    *response.status_mut() = StatusCode::from_u16(status).unwrap_or(StatusCode::BAD_GATEWAY);
    for (name, value) in response_headers.iter() {
        if !is_skipped(name.as_str()) {
            response.headers_mut().append(name.clone(), value.clone());
        }
    }
    response
}
