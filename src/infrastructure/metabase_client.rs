use crate::domain::entities::{BusinessRecord, ClientInfo};
use crate::domain::errors::{SourceError, SourceResult};
use crate::domain::repositories::BusinessRecordSource;
use crate::infrastructure::wire;
use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use serde_json::{json, Value};
use std::fmt;
use std::time::Duration;
use tracing::{debug, info, warn};
use zeroize::Zeroizing;

/// Saved question listing outgoing client transactions
pub const DEFAULT_OUTGOING_CARD_ID: u32 = 892;

#[derive(Clone)]
pub struct MetabaseConfig {
    pub host: String,
    pub api_key: Zeroizing<String>,
    pub outgoing_card_id: u32,
    /// Card taking a `sub_account_id` template tag, for identity lookups
    pub client_card_id: Option<u32>,
    pub timeout: Duration,
}

impl fmt::Debug for MetabaseConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MetabaseConfig")
            .field("host", &self.host)
            .field("api_key", &"<redacted>")
            .field("outgoing_card_id", &self.outgoing_card_id)
            .field("client_card_id", &self.client_card_id)
            .field("timeout", &self.timeout)
            .finish()
    }
}

/// One row of a card export; columns beyond these are ignored
#[derive(Debug, Default, Deserialize)]
struct CardRow {
    id: Option<Value>,
    amount: Option<Value>,
    token: Option<Value>,
    to: Option<Value>,
    blockchain: Option<Value>,
    sub_account_id: Option<Value>,
    binance_email: Option<Value>,
    email: Option<Value>,
    full_name: Option<Value>,
    #[serde(rename = "type")]
    account_type: Option<Value>,
    created_at: Option<Value>,
}

impl CardRow {
    fn client_info(&self) -> ClientInfo {
        ClientInfo {
            email: wire::text(self.email.as_ref()),
            name: wire::text(self.full_name.as_ref()),
            account_type: wire::text(self.account_type.as_ref()),
        }
    }

    fn into_business_record(self) -> Result<BusinessRecord, String> {
        let id = wire::text(self.id.as_ref()).ok_or("missing id")?;
        let missing = |field: &str| format!("row {} missing {}", id, field);

        Ok(BusinessRecord {
            amount: wire::decimal(self.amount.as_ref()).ok_or_else(|| missing("amount"))?,
            asset: wire::text(self.token.as_ref()).ok_or_else(|| missing("token"))?,
            address: wire::text(self.to.as_ref()).ok_or_else(|| missing("to"))?,
            network: wire::text(self.blockchain.as_ref()).ok_or_else(|| missing("blockchain"))?,
            sub_account_id: wire::text(self.sub_account_id.as_ref()),
            exchange_email: wire::text(self.binance_email.as_ref()),
            client: self.client_info(),
            created_at: wire::timestamp(self.created_at.as_ref()),
            id,
        })
    }
}

/// Card rows, or nothing when the body is not a JSON array
fn parse_rows(body: Value) -> SourceResult<Vec<CardRow>> {
    match body {
        Value::Array(items) => items
            .into_iter()
            .map(|item| {
                serde_json::from_value(item)
                    .map_err(|e| SourceError::Decode(format!("unexpected card row: {}", e)))
            })
            .collect(),
        other => {
            debug!("Card returned a non-array body, treating as no data: {}", other);
            Ok(Vec::new())
        }
    }
}

fn to_business_records(rows: Vec<CardRow>) -> Vec<BusinessRecord> {
    let total = rows.len();
    let records: Vec<BusinessRecord> = rows
        .into_iter()
        .filter_map(|row| match row.into_business_record() {
            Ok(record) => Some(record),
            Err(reason) => {
                warn!("Rejected outgoing transaction row: {}", reason);
                None
            }
        })
        .collect();

    if records.len() < total {
        warn!(
            "Rejected {} of {} outgoing transaction rows",
            total - records.len(),
            total
        );
    }
    records
}

/// Metabase card API client
pub struct MetabaseClient {
    client: Client,
    config: MetabaseConfig,
}

impl MetabaseClient {
    pub fn new(config: MetabaseConfig) -> SourceResult<Self> {
        let client = Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|e| SourceError::Transport(format!("Failed to build HTTP client: {}", e)))?;

        info!("Metabase client configured for {}", config.host);
        Ok(Self { client, config })
    }

    /// Run a saved card, optionally with template parameters
    async fn query_card(&self, card_id: u32, parameters: Option<Value>) -> SourceResult<Value> {
        let url = format!(
            "{}/api/card/{}/query/json",
            self.config.host.trim_end_matches('/'),
            card_id
        );

        let mut request = self
            .client
            .post(&url)
            .header("X-API-KEY", self.config.api_key.as_str());
        if let Some(parameters) = parameters {
            request = request.form(&[("parameters", parameters.to_string())]);
        }

        let response = request
            .send()
            .await
            .map_err(|e| SourceError::Transport(format!("card {}: {}", card_id, e)))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            warn!("Metabase card {} returned {}: {}", card_id, status, body);
            return Err(SourceError::Status {
                status: status.as_u16(),
                body,
            });
        }

        response
            .json()
            .await
            .map_err(|e| SourceError::Decode(format!("card {}: {}", card_id, e)))
    }
}

#[async_trait]
impl BusinessRecordSource for MetabaseClient {
    async fn fetch_outgoing(&self) -> SourceResult<Vec<BusinessRecord>> {
        let body = self.query_card(self.config.outgoing_card_id, None).await?;
        let records = to_business_records(parse_rows(body)?);
        info!("Fetched {} outgoing transactions from BI", records.len());
        Ok(records)
    }

    async fn fetch_client_info(&self, sub_account_id: &str) -> ClientInfo {
        let Some(card_id) = self.config.client_card_id else {
            warn!("No client card configured, identity for {} unknown", sub_account_id);
            return ClientInfo::unknown();
        };

        let parameters = json!([{
            "type": "category",
            "target": ["variable", ["template-tag", "sub_account_id"]],
            "value": sub_account_id,
        }]);

        let rows = match self.query_card(card_id, Some(parameters)).await.and_then(parse_rows) {
            Ok(rows) => rows,
            Err(e) => {
                warn!("Client lookup for {} failed: {}", sub_account_id, e);
                return ClientInfo::unknown();
            }
        };

        match rows.first() {
            Some(row) => row.client_info(),
            None => {
                debug!("No BI client row for sub-account {}", sub_account_id);
                ClientInfo::unknown()
            }
        }
    }
}
