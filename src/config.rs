use crate::domain::entities::window::{millis_to_utc, MILLIS_PER_DAY, MILLIS_PER_HOUR};
use crate::domain::services::reconciliation::{
    DepositFlowConfig, NotifyFailurePolicy, WithdrawalFlowConfig,
};
use crate::infrastructure::binance_client::{BinanceConfig, BINANCE_API_BASE};
use crate::infrastructure::metabase_client::{MetabaseConfig, DEFAULT_OUTGOING_CARD_ID};
use crate::infrastructure::telegram_notifier::{TelegramConfig, TELEGRAM_API_BASE};
use crate::persistence::DatabaseConfig;
use crate::retry::RetryPolicy;
use crate::secrets::{self, SecretError};
use chrono::NaiveDate;
use rust_decimal::Decimal;
use std::fmt::Display;
use std::str::FromStr;
use std::time::Duration;
use tracing::{info, warn};

/// Cap for exponential retry backoff
const MAX_RETRY_DELAY: Duration = Duration::from_secs(60);

/// Longest accepted withdrawal lookback, 90 days
const MAX_LOOKBACK_HOURS: i64 = 24 * 90;

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing credential: {0}")]
    MissingSecret(#[from] SecretError),

    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FlowSelection {
    Deposits,
    Withdrawals,
    All,
}

impl FlowSelection {
    pub fn runs_deposits(&self) -> bool {
        matches!(self, Self::Deposits | Self::All)
    }

    pub fn runs_withdrawals(&self) -> bool {
        matches!(self, Self::Withdrawals | Self::All)
    }
}

/// Per-invocation choices made on the command line
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunOptions {
    pub flows: FlowSelection,
    pub dry_run: bool,
    pub since: Option<NaiveDate>,
    pub lookback_hours: Option<u32>,
}

impl RunOptions {
    pub fn new(flows: FlowSelection) -> Self {
        Self {
            flows,
            dry_run: false,
            since: None,
            lookback_hours: None,
        }
    }
}

/// Where deposit alerts get their client identity from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum IdentitySource {
    /// Broker sub-account list, fetched once per run
    #[default]
    Directory,
    /// BI client card, queried per flagged deposit
    Bi,
}

impl FromStr for IdentitySource {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "directory" | "subaccounts" => Ok(Self::Directory),
            "bi" | "metabase" => Ok(Self::Bi),
            other => Err(format!("unknown identity source '{}'", other)),
        }
    }
}

/// Everything the binary needs, resolved once at startup
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub run: RunOptions,
    pub database: DatabaseConfig,
    pub binance: BinanceConfig,
    /// Present when a selected flow needs the BI system
    pub metabase: Option<MetabaseConfig>,
    /// Absent in dry runs
    pub telegram: Option<TelegramConfig>,
    pub identity_source: IdentitySource,
    pub sub_account_page_limit: u32,
    pub amount_tolerance: Decimal,
    pub deposits: DepositFlowConfig,
    pub withdrawals: WithdrawalFlowConfig,
}

/// Read `key`, falling back to `default` (with a warning) when the value does
/// not parse or fails `valid`
fn setting<T, F>(lookup: &F, key: &str, default: T, valid: impl Fn(&T) -> bool) -> T
where
    T: FromStr + Display,
    T::Err: Display,
    F: Fn(&str) -> Option<String>,
{
    let Some(raw) = lookup(key) else {
        return default;
    };

    match raw.trim().parse::<T>() {
        Ok(value) if valid(&value) => value,
        Ok(value) => {
            warn!("Invalid {} value: {}, using default: {}", key, value, default);
            default
        }
        Err(e) => {
            warn!(
                "Failed to parse {} '{}': {}, using default: {}",
                key, raw, e, default
            );
            default
        }
    }
}

fn start_of_day_ms(date: NaiveDate) -> i64 {
    date.and_hms_opt(0, 0, 0)
        .map(|dt| dt.and_utc().timestamp_millis())
        .unwrap_or_default()
}

impl AppConfig {
    /// Load configuration from environment variables
    pub fn from_env(run: RunOptions) -> Result<Self, ConfigError> {
        Self::from_lookup(run, |key| std::env::var(key).ok())
    }

    /// Load configuration from any key/value source
    ///
    /// Required credentials fail fast; optional settings fall back to their defaults.
    pub fn from_lookup<F>(run: RunOptions, lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let text = |key: &str, default: &str| {
            lookup(key)
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
                .unwrap_or_else(|| default.to_string())
        };

        let timeout = Duration::from_secs(setting(&lookup, "HTTP_TIMEOUT_SECONDS", 10u64, |v| *v > 0));

        let max_attempts = setting(&lookup, "RETRY_MAX_ATTEMPTS", 5u32, |v| (1..=20).contains(v));
        let delay = Duration::from_millis(setting(&lookup, "RETRY_DELAY_MILLIS", 3000u64, |v| {
            *v <= 60_000
        }));
        let retry = match text("RETRY_BACKOFF", "fixed").to_lowercase().as_str() {
            "fixed" => RetryPolicy::fixed(max_attempts, delay),
            "exponential" => RetryPolicy::exponential(max_attempts, delay, MAX_RETRY_DELAY),
            other => {
                warn!("Invalid RETRY_BACKOFF value: {}, using default: fixed", other);
                RetryPolicy::fixed(max_attempts, delay)
            }
        };

        let binance = BinanceConfig {
            api_base: text("EXCHANGE_API_BASE", BINANCE_API_BASE),
            api_key: secrets::require("API_KEY", lookup("API_KEY"))?,
            api_secret: secrets::require("API_SECRET", lookup("API_SECRET"))?,
            timeout,
            retry,
        };

        let telegram = if run.dry_run {
            None
        } else {
            Some(TelegramConfig {
                api_base: text("TELEGRAM_API_BASE", TELEGRAM_API_BASE),
                bot_token: secrets::require("TG_BOT_TOKEN", lookup("TG_BOT_TOKEN"))?,
                chat_id: secrets::require("TG_CHAT_ID", lookup("TG_CHAT_ID"))?.to_string(),
                timeout,
            })
        };

        let identity_source = setting(
            &lookup,
            "DEPOSIT_IDENTITY_SOURCE",
            IdentitySourceSetting(IdentitySource::Directory),
            |_| true,
        )
        .0;

        let needs_bi_identity = run.flows.runs_deposits() && identity_source == IdentitySource::Bi;
        let metabase = if run.flows.runs_withdrawals() || needs_bi_identity {
            let client_card_id = lookup("METABASE_CLIENT_CARD_ID")
                .map(|raw| {
                    raw.trim().parse::<u32>().map_err(|e| {
                        ConfigError::Invalid(format!("METABASE_CLIENT_CARD_ID '{}': {}", raw, e))
                    })
                })
                .transpose()?;
            if needs_bi_identity && client_card_id.is_none() {
                return Err(ConfigError::Invalid(
                    "DEPOSIT_IDENTITY_SOURCE=bi requires METABASE_CLIENT_CARD_ID".to_string(),
                ));
            }

            Some(MetabaseConfig {
                host: secrets::require("METABASE_HOST", lookup("METABASE_HOST"))?.to_string(),
                api_key: secrets::require("METABASE_TOKEN", lookup("METABASE_TOKEN"))?,
                outgoing_card_id: setting(
                    &lookup,
                    "METABASE_OUTGOING_CARD_ID",
                    DEFAULT_OUTGOING_CARD_ID,
                    |v| *v > 0,
                ),
                client_card_id,
                timeout,
            })
        } else {
            None
        };

        let database = DatabaseConfig {
            url: text("DATABASE_URL", crate::persistence::DEFAULT_DATABASE_URL),
            max_connections: setting(&lookup, "DATABASE_MAX_CONNECTIONS", 1u32, |v| *v > 0),
            log_queries: setting(&lookup, "DATABASE_LOG_QUERIES", cfg!(debug_assertions), |_| true),
        };

        let notify_failure_policy = setting(
            &lookup,
            "NOTIFY_FAILURE_POLICY",
            PolicySetting(NotifyFailurePolicy::MarkProcessed),
            |_| true,
        )
        .0;

        let default_start = NaiveDate::from_ymd_opt(2025, 4, 30).unwrap_or_default();
        let start_date = match run.since {
            Some(since) => since,
            None => setting(&lookup, "DEPOSIT_START_DATE", default_start, |_| true),
        };

        let mut deposits = DepositFlowConfig {
            start_ms: start_of_day_ms(start_date),
            window_span_ms: setting(&lookup, "DEPOSIT_WINDOW_DAYS", 7i64, |v| (1..=90).contains(v))
                * MILLIS_PER_DAY,
            page_limit: setting(&lookup, "DEPOSIT_PAGE_LIMIT", 500u32, |v| (1..=500).contains(v)),
            travel_rule_flag: setting(&lookup, "TRAVEL_RULE_FLAG", 1i64, |_| true),
            ..DepositFlowConfig::default()
        };
        deposits.notify_failure_policy = notify_failure_policy;

        let lookback_hours = match run.lookback_hours {
            Some(hours) if (1..=MAX_LOOKBACK_HOURS).contains(&i64::from(hours)) => i64::from(hours),
            Some(_) => {
                return Err(ConfigError::Invalid(format!(
                    "--lookback-hours must be between 1 and {}",
                    MAX_LOOKBACK_HOURS
                )))
            }
            None => setting(&lookup, "WITHDRAWAL_LOOKBACK_HOURS", 48i64, |v| {
                (1..=MAX_LOOKBACK_HOURS).contains(v)
            }),
        };
        let withdrawals = WithdrawalFlowConfig {
            lookback_ms: lookback_hours * MILLIS_PER_HOUR,
            page_limit: setting(&lookup, "WITHDRAWAL_PAGE_LIMIT", 1000u32, |v| {
                (1..=1000).contains(v)
            }),
            notify_failure_policy,
            ..WithdrawalFlowConfig::default()
        };

        Ok(Self {
            run,
            database,
            binance,
            metabase,
            telegram,
            identity_source,
            sub_account_page_limit: setting(&lookup, "SUB_ACCOUNT_PAGE_LIMIT", 500u32, |v| {
                (1..=500).contains(v)
            }),
            amount_tolerance: setting(&lookup, "AMOUNT_TOLERANCE", Decimal::new(1, 2), |v| {
                !v.is_sign_negative() && *v < Decimal::ONE
            }),
            deposits,
            withdrawals,
        })
    }

    /// Log the effective settings, without credentials
    pub fn log_summary(&self) {
        info!(
            "Configuration: flows={:?} dry_run={} database={} exchange={}",
            self.run.flows, self.run.dry_run, self.database.url, self.binance.api_base
        );
        if self.run.flows.runs_deposits() {
            info!(
                "  deposits: start={} window={}d page_limit={} travel_rule_flag={} identity={:?}",
                millis_to_utc(self.deposits.start_ms)
                    .map(|dt| dt.format("%Y-%m-%d").to_string())
                    .unwrap_or_default(),
                self.deposits.window_span_ms / MILLIS_PER_DAY,
                self.deposits.page_limit,
                self.deposits.travel_rule_flag,
                self.identity_source
            );
        }
        if self.run.flows.runs_withdrawals() {
            info!(
                "  withdrawals: lookback={}h page_limit={} tolerance={}",
                self.withdrawals.lookback_ms / MILLIS_PER_HOUR,
                self.withdrawals.page_limit,
                self.amount_tolerance
            );
        }
        info!(
            "  retry: {} attempts, {:?} delay, {:?}; notify failure policy {:?}",
            self.binance.retry.max_attempts,
            self.binance.retry.delay,
            self.binance.retry.backoff,
            self.deposits.notify_failure_policy
        );
    }
}

// `setting` needs `Display` for its warnings; these wrappers lend it to enums
// that only implement `FromStr`.
struct IdentitySourceSetting(IdentitySource);

impl FromStr for IdentitySourceSetting {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        s.parse().map(Self)
    }
}

impl Display for IdentitySourceSetting {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:?}", self.0)
    }
}

struct PolicySetting(NotifyFailurePolicy);

impl FromStr for PolicySetting {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        s.parse().map(Self)
    }
}

impl Display for PolicySetting {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:?}", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;
    use std::collections::HashMap;

    fn env(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    const CREDENTIALS: [(&str, &str); 6] = [
        ("API_KEY", "key"),
        ("API_SECRET", "secret"),
        ("TG_BOT_TOKEN", "123:abc"),
        ("TG_CHAT_ID", "-1001"),
        ("METABASE_HOST", "https://bi.example.com"),
        ("METABASE_TOKEN", "mb-token"),
    ];

    #[test]
    fn test_defaults() {
        let config = AppConfig::from_lookup(RunOptions::new(FlowSelection::All), env(&CREDENTIALS)).unwrap();

        assert_eq!(config.binance.api_base, "https://api.binance.com");
        assert_eq!(config.binance.retry, RetryPolicy::fixed(5, Duration::from_secs(3)));
        assert_eq!(config.deposits.start_ms, 1_745_971_200_000);
        assert_eq!(config.deposits.window_span_ms, 7 * MILLIS_PER_DAY);
        assert_eq!(config.deposits.page_limit, 500);
        assert_eq!(config.withdrawals.lookback_ms, 48 * MILLIS_PER_HOUR);
        assert_eq!(config.withdrawals.page_limit, 1000);
        assert_eq!(config.amount_tolerance, dec!(0.01));
        assert_eq!(config.identity_source, IdentitySource::Directory);
        assert_eq!(config.metabase.as_ref().unwrap().outgoing_card_id, 892);
        assert_eq!(config.database.url, "sqlite://data/fundwatch.db");
        assert!(config.telegram.is_some());
    }

    #[test]
    fn test_missing_exchange_credentials_fail() {
        let result = AppConfig::from_lookup(
            RunOptions::new(FlowSelection::Deposits),
            env(&[("API_KEY", "key"), ("TG_BOT_TOKEN", "t"), ("TG_CHAT_ID", "1")]),
        );
        assert!(matches!(
            result,
            Err(ConfigError::MissingSecret(SecretError::EnvVarNotSet(ref name))) if name == "API_SECRET"
        ));
    }

    #[test]
    fn test_dry_run_needs_no_telegram() {
        let mut run = RunOptions::new(FlowSelection::Deposits);
        run.dry_run = true;
        let config =
            AppConfig::from_lookup(run, env(&[("API_KEY", "key"), ("API_SECRET", "secret")])).unwrap();

        assert!(config.telegram.is_none());
        // deposits with the directory identity never touch the BI system
        assert!(config.metabase.is_none());
    }

    #[test]
    fn test_withdrawals_require_metabase() {
        let result = AppConfig::from_lookup(
            RunOptions::new(FlowSelection::Withdrawals),
            env(&CREDENTIALS[..4]),
        );
        assert!(matches!(result, Err(ConfigError::MissingSecret(_))));
    }

    #[test]
    fn test_bi_identity_requires_client_card() {
        let mut pairs = CREDENTIALS.to_vec();
        pairs.push(("DEPOSIT_IDENTITY_SOURCE", "bi"));
        let result = AppConfig::from_lookup(RunOptions::new(FlowSelection::Deposits), env(&pairs));
        assert!(matches!(result, Err(ConfigError::Invalid(_))));

        pairs.push(("METABASE_CLIENT_CARD_ID", "901"));
        let config = AppConfig::from_lookup(RunOptions::new(FlowSelection::Deposits), env(&pairs)).unwrap();
        assert_eq!(config.identity_source, IdentitySource::Bi);
        assert_eq!(config.metabase.unwrap().client_card_id, Some(901));
    }

    #[test]
    fn test_invalid_optional_values_fall_back() {
        let mut pairs = CREDENTIALS.to_vec();
        pairs.extend([
            ("DEPOSIT_WINDOW_DAYS", "0"),
            ("DEPOSIT_PAGE_LIMIT", "lots"),
            ("AMOUNT_TOLERANCE", "-0.5"),
            ("RETRY_BACKOFF", "jittered"),
            ("NOTIFY_FAILURE_POLICY", "sometimes"),
            ("DEPOSIT_START_DATE", "30.04.2025"),
        ]);
        let config = AppConfig::from_lookup(RunOptions::new(FlowSelection::All), env(&pairs)).unwrap();

        assert_eq!(config.deposits.window_span_ms, 7 * MILLIS_PER_DAY);
        assert_eq!(config.deposits.page_limit, 500);
        assert_eq!(config.amount_tolerance, dec!(0.01));
        assert_eq!(config.binance.retry.backoff, crate::retry::Backoff::Fixed);
        assert_eq!(config.deposits.notify_failure_policy, NotifyFailurePolicy::MarkProcessed);
        assert_eq!(config.deposits.start_ms, 1_745_971_200_000);
    }

    #[test]
    fn test_out_of_range_lookback_falls_back() {
        for raw in ["9000000000000000", "0", "2161"] {
            let mut pairs = CREDENTIALS.to_vec();
            pairs.push(("WITHDRAWAL_LOOKBACK_HOURS", raw));
            let config =
                AppConfig::from_lookup(RunOptions::new(FlowSelection::All), env(&pairs)).unwrap();
            assert_eq!(config.withdrawals.lookback_ms, 48 * MILLIS_PER_HOUR, "{}", raw);
        }

        let mut pairs = CREDENTIALS.to_vec();
        pairs.push(("WITHDRAWAL_LOOKBACK_HOURS", "2160"));
        let config = AppConfig::from_lookup(RunOptions::new(FlowSelection::All), env(&pairs)).unwrap();
        assert_eq!(config.withdrawals.lookback_ms, 90 * MILLIS_PER_DAY);
    }

    #[test]
    fn test_cli_lookback_out_of_range_is_rejected() {
        let mut run = RunOptions::new(FlowSelection::Withdrawals);
        run.lookback_hours = Some(u32::MAX);
        let result = AppConfig::from_lookup(run, env(&CREDENTIALS));
        assert!(matches!(result, Err(ConfigError::Invalid(_))));
    }

    #[test]
    fn test_overrides_from_env_and_cli() {
        let mut pairs = CREDENTIALS.to_vec();
        pairs.extend([
            ("DEPOSIT_START_DATE", "2025-01-01"),
            ("WITHDRAWAL_LOOKBACK_HOURS", "24"),
            ("NOTIFY_FAILURE_POLICY", "retry"),
            ("RETRY_BACKOFF", "exponential"),
            ("AMOUNT_TOLERANCE", "0.005"),
        ]);

        let mut run = RunOptions::new(FlowSelection::All);
        run.since = NaiveDate::from_ymd_opt(2025, 4, 30);
        run.lookback_hours = Some(72);
        let config = AppConfig::from_lookup(run, env(&pairs)).unwrap();

        assert_eq!(config.deposits.start_ms, 1_745_971_200_000);
        assert_eq!(config.withdrawals.lookback_ms, 72 * MILLIS_PER_HOUR);
        assert_eq!(config.withdrawals.notify_failure_policy, NotifyFailurePolicy::RetryNextRun);
        assert_eq!(config.amount_tolerance, dec!(0.005));
        assert!(matches!(
            config.binance.retry.backoff,
            crate::retry::Backoff::Exponential { .. }
        ));
    }

    #[test]
    fn test_debug_output_hides_secrets() {
        let config = AppConfig::from_lookup(RunOptions::new(FlowSelection::All), env(&CREDENTIALS)).unwrap();
        let rendered = format!("{:?}", config);
        assert!(!rendered.contains("mb-token"));
        assert!(!rendered.contains("123:abc"));
    }
}
