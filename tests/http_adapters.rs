//! HTTP adapter tests against a local mock server.

use async_trait::async_trait;
use fundwatch::domain::entities::{RecordKind, TimeWindow};
use fundwatch::domain::errors::{LedgerError, NotifyError};
use fundwatch::domain::repositories::{fetch_all, BusinessRecordSource, LedgerSource, Notifier};
use fundwatch::infrastructure::binance_client::{sign_query, BinanceClient, BinanceConfig};
use fundwatch::infrastructure::metabase_client::{MetabaseClient, MetabaseConfig};
use fundwatch::infrastructure::telegram_notifier::{TelegramConfig, TelegramNotifier};
use fundwatch::retry::{RetryPolicy, Sleeper};
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;
use wiremock::matchers::{body_json, body_string_contains, header, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};
use zeroize::Zeroizing;

const SECRET: &str = "test-secret";

struct NoSleep;

#[async_trait]
impl Sleeper for NoSleep {
    async fn sleep(&self, _duration: Duration) {}
}

fn binance(server: &MockServer, attempts: u32) -> BinanceClient {
    let mut config = BinanceConfig::new(
        Zeroizing::new("test-key".to_string()),
        Zeroizing::new(SECRET.to_string()),
    )
    .with_api_base(server.uri());
    config.timeout = Duration::from_millis(300);
    config.retry = RetryPolicy::fixed(attempts, Duration::from_secs(3));

    BinanceClient::new(config).unwrap().with_sleeper(Arc::new(NoSleep))
}

fn deposit_json(id: u64) -> serde_json::Value {
    json!({
        "depositId": id,
        "subAccountId": "555",
        "address": "TDeposit",
        "amount": "10",
        "coin": "USDT",
        "network": "TRX",
        "status": 0,
        "txId": format!("tx-{}", id),
        "insertTime": 1746102600000i64,
        "travelRuleStatus": 1
    })
}

const WINDOW: TimeWindow = TimeWindow {
    start_ms: 1_745_971_200_000,
    end_ms: 1_746_576_000_000,
};

#[tokio::test]
async fn test_requests_are_signed_with_api_key_header() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/sapi/v1/broker/subAccount/depositHist"))
        .and(header("X-MBX-APIKEY", "test-key"))
        .and(query_param("startTime", "1745971200000"))
        .and(query_param("endTime", "1746575999999"))
        .and(query_param("limit", "500"))
        .and(query_param("offset", "0"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([deposit_json(1)])))
        .expect(1)
        .mount(&server)
        .await;

    let client = binance(&server, 1);
    let page = client
        .fetch_page(RecordKind::Deposit, WINDOW, 0, 500)
        .await
        .unwrap();
    assert_eq!(page.len(), 1);
    assert_eq!(page[0].id, "1");

    let requests = server.received_requests().await.unwrap();
    let query = requests[0].url.query().unwrap().to_string();
    let (signed_part, signature) = query.split_once("&signature=").unwrap();
    assert!(signed_part.contains("&timestamp="));
    assert_eq!(sign_query(SECRET, signed_part).unwrap(), signature);
}

#[tokio::test]
async fn test_pagination_follows_full_pages() {
    let server = MockServer::start().await;
    let full: Vec<_> = (0..2).map(deposit_json).collect();
    let short = vec![deposit_json(2)];

    for (offset, body) in [("0", full.clone()), ("2", full), ("4", short)] {
        Mock::given(method("GET"))
            .and(path("/sapi/v1/broker/subAccount/depositHist"))
            .and(query_param("offset", offset))
            .respond_with(ResponseTemplate::new(200).set_body_json(body))
            .expect(1)
            .mount(&server)
            .await;
    }

    let client = binance(&server, 1);
    let records = fetch_all(&client, RecordKind::Deposit, WINDOW, 2).await.unwrap();
    assert_eq!(records.len(), 5);
}

#[tokio::test]
async fn test_error_status_is_not_retried() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/sapi/v1/capital/withdraw/history"))
        .respond_with(
            ResponseTemplate::new(400)
                .set_body_json(json!({"code": -1022, "msg": "Signature for this request is not valid."})),
        )
        .expect(1)
        .mount(&server)
        .await;

    let client = binance(&server, 5);
    let result = client.fetch_page(RecordKind::Withdrawal, WINDOW, 0, 1000).await;

    match result {
        Err(LedgerError::Status { status, body }) => {
            assert_eq!(status, 400);
            assert!(body.contains("-1022"));
        }
        other => panic!("expected status error, got {:?}", other),
    }
}

#[tokio::test]
async fn test_timeouts_are_retried_until_exhausted() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/sapi/v1/capital/withdraw/history"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(json!([]))
                .set_delay(Duration::from_secs(2)),
        )
        .expect(3)
        .mount(&server)
        .await;

    let client = binance(&server, 3);
    let result = client.fetch_page(RecordKind::Withdrawal, WINDOW, 0, 1000).await;

    assert!(matches!(
        result,
        Err(LedgerError::RetriesExhausted { attempts: 3, .. })
    ));
}

#[tokio::test]
async fn test_retry_recovers_with_fresh_signature() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/sapi/v1/capital/withdraw/history"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(json!([]))
                .set_delay(Duration::from_secs(2)),
        )
        .up_to_n_times(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/sapi/v1/capital/withdraw/history"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([{
            "id": "w-1",
            "amount": "8.91",
            "coin": "USDT",
            "address": "0xabc",
            "network": "ETH",
            "applyTime": "2025-05-01 12:30:00",
            "status": 6
        }])))
        .mount(&server)
        .await;

    let client = binance(&server, 3);
    let records = client
        .fetch_page(RecordKind::Withdrawal, WINDOW, 0, 1000)
        .await
        .unwrap();
    assert_eq!(records.len(), 1);

    let requests = server.received_requests().await.unwrap();
    assert_eq!(requests.len(), 2);
    for request in &requests {
        let query = request.url.query().unwrap();
        let (signed_part, signature) = query.split_once("&signature=").unwrap();
        assert_eq!(sign_query(SECRET, signed_part).unwrap(), signature);
    }
}

#[tokio::test]
async fn test_sub_account_listing() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/sapi/v1/broker/subAccount"))
        .and(query_param("page", "1"))
        .and(query_param("limit", "500"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([
            {"subaccountId": "555", "email": "sub555@broker.io", "makerCommission": "0.001"},
            {"subaccountId": 556, "email": null}
        ])))
        .mount(&server)
        .await;

    let client = binance(&server, 1);
    let accounts = client.fetch_sub_accounts(1, 500).await.unwrap();
    assert_eq!(accounts.len(), 2);
    assert_eq!(accounts[0].email.as_deref(), Some("sub555@broker.io"));
    assert_eq!(accounts[1].id, "556");
    assert_eq!(accounts[1].email, None);
}

fn metabase(server: &MockServer) -> MetabaseClient {
    MetabaseClient::new(MetabaseConfig {
        host: server.uri(),
        api_key: Zeroizing::new("mb-token".to_string()),
        outgoing_card_id: 892,
        client_card_id: Some(901),
        timeout: Duration::from_secs(5),
    })
    .unwrap()
}

#[tokio::test]
async fn test_metabase_outgoing_card() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/card/892/query/json"))
        .and(header("X-API-KEY", "mb-token"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([
            {"id": 1, "amount": "100.0", "token": "USDT", "to": "0xabc", "blockchain": "ETH"},
            {"id": 2, "amount": "5", "token": "BTC", "blockchain": "BTC"}
        ])))
        .expect(1)
        .mount(&server)
        .await;

    let records = metabase(&server).fetch_outgoing().await.unwrap();
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].address, "0xabc");
}

#[tokio::test]
async fn test_metabase_non_array_is_empty() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/card/892/query/json"))
        .respond_with(ResponseTemplate::new(202).set_body_json(json!({"status": "running"})))
        .mount(&server)
        .await;

    let records = metabase(&server).fetch_outgoing().await.unwrap();
    assert!(records.is_empty());
}

#[tokio::test]
async fn test_metabase_client_lookup_sends_parameters_and_degrades() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/card/901/query/json"))
        .and(body_string_contains("parameters="))
        .and(body_string_contains("template-tag"))
        .and(body_string_contains("555"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([
            {"email": "client@example.com", "full_name": "Jane Client", "type": "individual"}
        ])))
        .mount(&server)
        .await;

    let client = metabase(&server);
    let info = client.fetch_client_info("555").await;
    assert_eq!(info.email.as_deref(), Some("client@example.com"));
    assert_eq!(info.account_type.as_deref(), Some("individual"));

    // No mock for this id: the server answers 404 and identity degrades
    let unknown = client.fetch_client_info("999").await;
    assert!(unknown.is_unknown());
}

fn telegram(server: &MockServer) -> TelegramNotifier {
    TelegramNotifier::new(TelegramConfig {
        api_base: server.uri(),
        bot_token: Zeroizing::new("123:abc".to_string()),
        chat_id: "-1001".to_string(),
        timeout: Duration::from_secs(5),
    })
    .unwrap()
}

#[tokio::test]
async fn test_telegram_send_message() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/bot123:abc/sendMessage"))
        .and(body_json(json!({"chat_id": "-1001", "text": "hello"})))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"ok": true})))
        .expect(1)
        .mount(&server)
        .await;

    assert!(telegram(&server).send("hello").await.is_ok());
}

#[tokio::test]
async fn test_telegram_rejection_is_reported_once() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/bot123:abc/sendMessage"))
        .respond_with(
            ResponseTemplate::new(400)
                .set_body_json(json!({"ok": false, "description": "Bad Request: chat not found"})),
        )
        .expect(1)
        .mount(&server)
        .await;

    match telegram(&server).send("hello").await {
        Err(NotifyError::Rejected { status, body }) => {
            assert_eq!(status, 400);
            assert!(body.contains("chat not found"));
        }
        other => panic!("expected rejection, got {:?}", other),
    }
}
