pub mod binance_client;
pub mod metabase_client;
pub mod telegram_notifier;
pub mod wire;

pub use binance_client::{BinanceClient, BinanceConfig};
pub use metabase_client::{MetabaseClient, MetabaseConfig};
pub use telegram_notifier::{LogNotifier, TelegramConfig, TelegramNotifier};
