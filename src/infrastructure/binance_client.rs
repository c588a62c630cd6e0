use crate::domain::entities::{LedgerRecord, RecordKind, SubAccount, TimeWindow};
use crate::domain::errors::{LedgerError, LedgerResult};
use crate::domain::repositories::LedgerSource;
use crate::infrastructure::wire;
use crate::retry::{run_with_retry, Attempt, RetryError, RetryPolicy, Sleeper, TokioSleeper};
use async_trait::async_trait;
use hmac::{Hmac, Mac};
use reqwest::Client;
use serde::Deserialize;
use serde_json::Value;
use sha2::Sha256;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};
use zeroize::Zeroizing;

/// Binance REST API endpoints
pub const BINANCE_API_BASE: &str = "https://api.binance.com";
const DEPOSIT_HISTORY_PATH: &str = "/sapi/v1/broker/subAccount/depositHist";
const WITHDRAW_HISTORY_PATH: &str = "/sapi/v1/capital/withdraw/history";
const SUB_ACCOUNT_PATH: &str = "/sapi/v1/broker/subAccount";

type HmacSha256 = Hmac<Sha256>;

/// Binance connection configuration
#[derive(Clone)]
pub struct BinanceConfig {
    pub api_base: String,
    pub api_key: Zeroizing<String>,
    pub api_secret: Zeroizing<String>,
    pub timeout: Duration,
    pub retry: RetryPolicy,
}

impl BinanceConfig {
    pub fn new(api_key: Zeroizing<String>, api_secret: Zeroizing<String>) -> Self {
        Self {
            api_base: BINANCE_API_BASE.to_string(),
            api_key,
            api_secret,
            timeout: Duration::from_secs(10),
            retry: RetryPolicy::default(),
        }
    }

    pub fn with_api_base(mut self, api_base: impl Into<String>) -> Self {
        self.api_base = api_base.into();
        self
    }
}

impl fmt::Debug for BinanceConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BinanceConfig")
            .field("api_base", &self.api_base)
            .field("api_key", &"<redacted>")
            .field("api_secret", &"<redacted>")
            .field("timeout", &self.timeout)
            .field("retry", &self.retry)
            .finish()
    }
}

/// Deterministic URL-encoded query, parameters kept in insertion order
pub fn canonical_query(params: &[(&str, String)]) -> String {
    url::form_urlencoded::Serializer::new(String::new())
        .extend_pairs(params.iter().map(|(k, v)| (*k, v.as_str())))
        .finish()
}

/// Hex HMAC-SHA256 of `query` keyed with the API secret
pub fn sign_query(secret: &str, query: &str) -> LedgerResult<String> {
    let mut mac = HmacSha256::new_from_slice(secret.as_bytes())
        .map_err(|e| LedgerError::Signing(format!("HMAC error: {}", e)))?;
    mac.update(query.as_bytes());
    Ok(hex::encode(mac.finalize().into_bytes()))
}

/// Sub-account deposit as returned by the broker deposit history
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct DepositRow {
    deposit_id: Option<Value>,
    sub_account_id: Option<Value>,
    address: Option<Value>,
    amount: Option<Value>,
    coin: Option<Value>,
    network: Option<Value>,
    status: Option<Value>,
    tx_id: Option<Value>,
    insert_time: Option<Value>,
    travel_rule_status: Option<Value>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct WithdrawalRow {
    id: Option<Value>,
    amount: Option<Value>,
    coin: Option<Value>,
    address: Option<Value>,
    network: Option<Value>,
    status: Option<Value>,
    tx_id: Option<Value>,
    apply_time: Option<Value>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SubAccountRow {
    subaccount_id: Option<Value>,
    email: Option<Value>,
}

fn required<T>(field: Option<T>, name: &str, kind: RecordKind) -> LedgerResult<T> {
    field.ok_or_else(|| LedgerError::Decode(format!("{} record without a valid '{}'", kind, name)))
}

impl TryFrom<DepositRow> for LedgerRecord {
    type Error = LedgerError;

    fn try_from(row: DepositRow) -> LedgerResult<Self> {
        let kind = RecordKind::Deposit;
        Ok(LedgerRecord {
            kind,
            id: required(wire::text(row.deposit_id.as_ref()), "depositId", kind)?,
            amount: required(wire::decimal(row.amount.as_ref()), "amount", kind)?,
            asset: required(wire::text(row.coin.as_ref()), "coin", kind)?,
            network: wire::text(row.network.as_ref()).unwrap_or_default(),
            address: wire::text(row.address.as_ref()),
            sub_account_id: wire::text(row.sub_account_id.as_ref()),
            tx_id: wire::text(row.tx_id.as_ref()),
            status: wire::integer(row.status.as_ref()),
            travel_rule_status: wire::integer(row.travel_rule_status.as_ref()),
            inserted_at: wire::timestamp(row.insert_time.as_ref()),
        })
    }
}

impl TryFrom<WithdrawalRow> for LedgerRecord {
    type Error = LedgerError;

    fn try_from(row: WithdrawalRow) -> LedgerResult<Self> {
        let kind = RecordKind::Withdrawal;
        Ok(LedgerRecord {
            kind,
            id: required(wire::text(row.id.as_ref()), "id", kind)?,
            amount: required(wire::decimal(row.amount.as_ref()), "amount", kind)?,
            asset: required(wire::text(row.coin.as_ref()), "coin", kind)?,
            network: wire::text(row.network.as_ref()).unwrap_or_default(),
            address: wire::text(row.address.as_ref()),
            sub_account_id: None,
            tx_id: wire::text(row.tx_id.as_ref()),
            status: wire::integer(row.status.as_ref()),
            travel_rule_status: None,
            inserted_at: wire::timestamp(row.apply_time.as_ref()),
        })
    }
}

/// Decode a page body; one invalid record rejects the whole page so a short
/// page is never mistaken for the end of the data
fn decode_records<R>(body: Value) -> LedgerResult<Vec<LedgerRecord>>
where
    R: for<'de> Deserialize<'de>,
    LedgerRecord: TryFrom<R, Error = LedgerError>,
{
    let rows: Vec<R> = serde_json::from_value(body)
        .map_err(|e| LedgerError::Decode(format!("expected a JSON array of records: {}", e)))?;
    rows.into_iter().map(LedgerRecord::try_from).collect()
}

fn classify(e: reqwest::Error) -> Attempt<LedgerError> {
    let error = LedgerError::Transport(e.to_string());
    if e.is_timeout() || e.is_connect() || e.is_request() {
        Attempt::Retry(error)
    } else {
        Attempt::Abort(error)
    }
}

/// Signed Binance client for the broker ledger endpoints
pub struct BinanceClient {
    client: Client,
    config: BinanceConfig,
    sleeper: Arc<dyn Sleeper>,
}

impl BinanceClient {
    pub fn new(config: BinanceConfig) -> LedgerResult<Self> {
        let client = Client::builder()
            .timeout(config.timeout)
            .user_agent(concat!("fundwatch/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| LedgerError::Transport(format!("Failed to build HTTP client: {}", e)))?;

        info!("Binance client configured for {}", config.api_base);
        Ok(Self {
            client,
            config,
            sleeper: Arc::new(TokioSleeper),
        })
    }

    pub fn with_sleeper(mut self, sleeper: Arc<dyn Sleeper>) -> Self {
        self.sleeper = sleeper;
        self
    }

    /// Signed GET; timestamp and signature are rebuilt for every attempt
    async fn signed_get(&self, path: &str, params: &[(&str, String)]) -> LedgerResult<Value> {
        let url = format!("{}{}", self.config.api_base.trim_end_matches('/'), path);
        let label = format!("GET {}", path);

        let result = run_with_retry(&label, &self.config.retry, self.sleeper.as_ref(), |attempt| {
            let url = &url;
            async move {
                let mut signed = params.to_vec();
                signed.push(("timestamp", chrono::Utc::now().timestamp_millis().to_string()));
                let query = canonical_query(&signed);
                let signature = sign_query(&self.config.api_secret, &query).map_err(Attempt::Abort)?;

                debug!("{} attempt {} ?{}", path, attempt, query);
                let response = self
                    .client
                    .get(format!("{}?{}&signature={}", url, query, signature))
                    .header("X-MBX-APIKEY", self.config.api_key.as_str())
                    .send()
                    .await
                    .map_err(classify)?;

                let status = response.status();
                if !status.is_success() {
                    let body = response.text().await.unwrap_or_default();
                    warn!("Binance {} returned {}: {}", path, status, body);
                    return Err(Attempt::Abort(LedgerError::Status {
                        status: status.as_u16(),
                        body,
                    }));
                }

                let body = response.text().await.map_err(classify)?;
                serde_json::from_str::<Value>(&body).map_err(|e| {
                    Attempt::Abort(LedgerError::Decode(format!("invalid JSON from {}: {}", path, e)))
                })
            }
        })
        .await;

        match result {
            Ok(body) => Ok(body),
            Err(RetryError::Aborted(e)) => Err(e),
            Err(RetryError::Exhausted { attempts, last }) => Err(LedgerError::RetriesExhausted {
                attempts,
                reason: last.to_string(),
            }),
        }
    }
}

#[async_trait]
impl LedgerSource for BinanceClient {
    fn name(&self) -> &str {
        "binance"
    }

    async fn fetch_page(
        &self,
        kind: RecordKind,
        window: TimeWindow,
        offset: u32,
        limit: u32,
    ) -> LedgerResult<Vec<LedgerRecord>> {
        let params = [
            ("startTime", window.start_ms.to_string()),
            ("endTime", window.inclusive_end_ms().to_string()),
            ("limit", limit.to_string()),
            ("offset", offset.to_string()),
        ];

        let records = match kind {
            RecordKind::Deposit => {
                let body = self.signed_get(DEPOSIT_HISTORY_PATH, &params).await?;
                decode_records::<DepositRow>(body)?
            }
            RecordKind::Withdrawal => {
                let body = self.signed_get(WITHDRAW_HISTORY_PATH, &params).await?;
                decode_records::<WithdrawalRow>(body)?
            }
        };

        debug!(
            "Fetched {} {} records for {} (offset {})",
            records.len(),
            kind,
            window,
            offset
        );
        Ok(records)
    }

    async fn fetch_sub_accounts(&self, page: u32, limit: u32) -> LedgerResult<Vec<SubAccount>> {
        let params = [("page", page.to_string()), ("limit", limit.to_string())];
        let body = self.signed_get(SUB_ACCOUNT_PATH, &params).await?;

        let rows: Vec<SubAccountRow> = serde_json::from_value(body)
            .map_err(|e| LedgerError::Decode(format!("expected a JSON array of sub-accounts: {}", e)))?;

        Ok(rows
            .into_iter()
            .filter_map(|row| {
                let id = wire::text(row.subaccount_id.as_ref());
                if id.is_none() {
                    warn!("Skipping sub-account entry without an id");
                }
                id.map(|id| SubAccount {
                    id,
                    email: wire::text(row.email.as_ref()),
                })
            })
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;
    use serde_json::json;

    #[test]
    fn test_signature_matches_published_example() {
        let secret = "NhqPtmdSJYdKjVHjA7PZj4Mge3R5YNiP1e3UZjInClVN65XAbvqqM6A7H5fATj0j";
        let query = canonical_query(&[
            ("symbol", "LTCBTC".to_string()),
            ("side", "BUY".to_string()),
            ("type", "LIMIT".to_string()),
            ("timeInForce", "GTC".to_string()),
            ("quantity", "1".to_string()),
            ("price", "0.1".to_string()),
            ("recvWindow", "5000".to_string()),
            ("timestamp", "1499827319559".to_string()),
        ]);

        assert_eq!(
            query,
            "symbol=LTCBTC&side=BUY&type=LIMIT&timeInForce=GTC&quantity=1&price=0.1&recvWindow=5000&timestamp=1499827319559"
        );
        assert_eq!(
            sign_query(secret, &query).unwrap(),
            "c8db56825ae71d6d79447849e617115f4a920fa2acdcab2b053c4b2838bd6b71"
        );
    }

    #[test]
    fn test_canonical_query_encodes_values() {
        let query = canonical_query(&[("email", "a+b@x.io".to_string()), ("page", "1".to_string())]);
        assert_eq!(query, "email=a%2Bb%40x.io&page=1");
    }

    #[test]
    fn test_deposit_row_conversion() {
        let body = json!([{
            "depositId": 123456789,
            "subAccountId": "555",
            "address": "0xabc",
            "amount": "250.5",
            "coin": "USDT",
            "network": "ETH",
            "status": 0,
            "txId": "0xhash",
            "insertTime": 1746102600000i64,
            "travelRuleStatus": 1
        }]);

        let records = decode_records::<DepositRow>(body).unwrap();
        assert_eq!(records.len(), 1);
        let deposit = &records[0];
        assert_eq!(deposit.id, "123456789");
        assert_eq!(deposit.amount, dec!(250.5));
        assert_eq!(deposit.sub_account_id.as_deref(), Some("555"));
        assert!(deposit.is_travel_rule_flagged(1));
        assert!(deposit.inserted_at.is_some());
    }

    #[test]
    fn test_withdrawal_row_conversion() {
        let body = json!([{
            "id": "b6ae22b3aa844210a7041aee7589627c",
            "amount": "8.91000000",
            "coin": "USDT",
            "address": "TXyz",
            "network": "TRX",
            "txId": "hash",
            "applyTime": "2025-05-01 12:30:00",
            "status": 6
        }]);

        let records = decode_records::<WithdrawalRow>(body).unwrap();
        assert_eq!(records[0].kind, RecordKind::Withdrawal);
        assert_eq!(records[0].amount, dec!(8.91));
        assert_eq!(records[0].address.as_deref(), Some("TXyz"));
        assert!(records[0].inserted_at.is_some());
    }

    #[test]
    fn test_record_without_amount_rejects_page() {
        let body = json!([
            {"depositId": 1, "amount": "1", "coin": "BTC"},
            {"depositId": 2, "coin": "BTC"}
        ]);

        match decode_records::<DepositRow>(body) {
            Err(LedgerError::Decode(msg)) => assert!(msg.contains("amount")),
            other => panic!("expected decode error, got {:?}", other),
        }
    }

    #[test]
    fn test_error_object_is_decode_error() {
        let body = json!({"code": -1022, "msg": "Signature for this request is not valid."});
        assert!(matches!(
            decode_records::<WithdrawalRow>(body),
            Err(LedgerError::Decode(_))
        ));
    }

    #[test]
    fn test_debug_redacts_credentials() {
        let config = BinanceConfig::new(
            Zeroizing::new("my-key".to_string()),
            Zeroizing::new("my-secret".to_string()),
        );
        let rendered = format!("{:?}", config);
        assert!(!rendered.contains("my-key"));
        assert!(!rendered.contains("my-secret"));
    }
}
