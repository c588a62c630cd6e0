pub mod record;
pub mod window;

pub use record::{BusinessRecord, ClientInfo, LedgerRecord, RecordKind, SubAccount, UNKNOWN};
pub use window::TimeWindow;
