//! Integration Test: プロキシ経由のキャプチャ
//!
//! プロキシを通したリクエスト/レスポンスが1件の監査レコードとして
//! クライアントIDのログに保存され、機密値がマスクされることを確認する。

use reqwest::Client;
use serde_json::Value;
use wiremock::matchers::{header, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

use crate::support::auditory::spawn_auditory;

#[tokio::test]
async fn test_proxy_records_paired_exchange() {
    let upstream = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/items"))
        .and(query_param("page", "2"))
        .and(header("x-client-id", "client-7"))
        .respond_with(
            ResponseTemplate::new(200)
                .insert_header("set-cookie", "session=abc")
                .set_body_string("hello"),
        )
        .expect(1)
        .mount(&upstream)
        .await;

    let server = spawn_auditory(Some(upstream.uri())).await;
    let client = Client::new();

    let response = client
        .post(format!(
            "{}/api/items?token=abc&page=2",
            server.proxy_url()
        ))
        .header("X-Client-ID", "client-7")
        .header("X-Request-ID", "req-1")
        .header("X-Correlation-ID", "corr-1")
        .header("Authorization", "Bearer secret")
        .body("payload")
        .send()
        .await
        .expect("proxy request failed");
    assert_eq!(response.status().as_u16(), 200);
    assert_eq!(response.text().await.unwrap(), "hello");

    let log: Value = client
        .get(format!("{}/audit/client-7", server.control.url()))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    let records: Vec<&Value> = log
        .as_object()
        .unwrap()
        .values()
        .flat_map(|records| records.as_array().unwrap())
        .collect();
    assert_eq!(records.len(), 1);

    let record = records[0];
    assert_eq!(record["metadata"]["event_name"], "http_audit");
    assert_eq!(record["metadata"]["request_id"], "req-1");
    assert_eq!(record["metadata"]["correlation_id"], "corr-1");

    let request = &record["data"]["request"];
    assert_eq!(request["method"], "POST");
    assert_eq!(request["path"], "/api/items");
    assert_eq!(request["headers"]["authorization"][0], "*".repeat(13));
    let query = request["query"].as_str().unwrap();
    assert!(query.contains("page=2"));
    assert!(!query.contains("abc"));
    // "payload"
    assert_eq!(request["body"], "cGF5bG9hZA==");

    let response = &record["data"]["response"];
    assert_eq!(response["status_code"], 200);
    assert_eq!(response["body"], "aGVsbG8=");
    assert_eq!(response["headers"]["set-cookie"][0], "*".repeat(11));

    server.stop().await;
}

/// 監査側が失敗しても中継した応答はそのまま返る
#[tokio::test]
async fn test_proxy_delivers_response_when_audit_is_rejected() {
    let upstream = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/status"))
        .respond_with(ResponseTemplate::new(200).set_body_string("ok"))
        .expect(2)
        .mount(&upstream)
        .await;

    let server = spawn_auditory(Some(upstream.uri())).await;
    let client = Client::new();

    // X-Request-IDなしの同一リクエストは同じ冪等性キーになり、2件目は重複で弾かれる
    for _ in 0..2 {
        let response = client
            .get(format!("{}/status", server.proxy_url()))
            .header("X-Client-ID", "dup-client")
            .send()
            .await
            .expect("proxy request failed");
        assert_eq!(response.status().as_u16(), 200);
        assert_eq!(response.text().await.unwrap(), "ok");
    }

    let log: Value = client
        .get(format!("{}/audit/dup-client", server.control.url()))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    let count: usize = log
        .as_object()
        .unwrap()
        .values()
        .map(|records| records.as_array().unwrap().len())
        .sum();
    assert_eq!(count, 1);

    server.stop().await;
}

#[tokio::test]
async fn test_proxy_returns_bad_gateway_when_upstream_is_down() {
    let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    let dead = format!("http://{}", listener.local_addr().unwrap());
    drop(listener);

    let server = spawn_auditory(Some(dead)).await;
    let response = Client::new()
        .get(format!("{}/anything", server.proxy_url()))
        .header("X-Client-ID", "client-9")
        .header("X-Request-ID", "req-9")
        .send()
        .await
        .unwrap();
    assert_eq!(response.status().as_u16(), 502);

    let log: Value = Client::new()
        .get(format!("{}/audit/client-9", server.control.url()))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(log, serde_json::json!({}));

    server.stop().await;
}
