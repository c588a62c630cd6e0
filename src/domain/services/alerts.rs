//! Alert texts sent to the operators' chat.

use crate::domain::entities::{BusinessRecord, ClientInfo, LedgerRecord, TimeWindow, UNKNOWN};

/// Deposit held by the travel-rule check and not credited
pub fn deposit_alert(deposit: &LedgerRecord, client: &ClientInfo) -> String {
    let inserted_at = deposit
        .inserted_at
        .map(|ts| ts.format("%Y-%m-%d %H:%M:%S UTC").to_string())
        .unwrap_or_else(|| UNKNOWN.to_string());

    format!(
        "❗️ Deposit NOT credited (travel rule)\n\
         {} {}\n\
         subAccountId: {}\n\
         email: {}\n\
         txId: {}\n\
         insertTime: {}\n\
         depositId: {}",
        deposit.amount.normalize(),
        deposit.asset,
        deposit.sub_account_id.as_deref().unwrap_or(UNKNOWN),
        client.email_or_unknown(),
        deposit.tx_id.as_deref().unwrap_or(UNKNOWN),
        inserted_at,
        deposit.id
    )
}

/// Business withdrawal with no corroborating ledger entry
pub fn missing_withdrawal_alert(
    withdrawal: &BusinessRecord,
    searched: usize,
    window: &TimeWindow,
) -> String {
    let created_at = withdrawal
        .created_at
        .map(|ts| ts.format("%Y-%m-%d %H:%M:%S UTC").to_string())
        .unwrap_or_else(|| UNKNOWN.to_string());

    format!(
        "📤 Withdrawal NOT found on the exchange\n\n\
         ID: {}\n\
         sub_account_id: {}\n\
         exchange email: {}\n\n\
         {} {} → {} via {}\n\n\
         email: {}\n\
         name: {}\n\
         type: {}\n\n\
         created_at: {}\n\
         checked against {} exchange withdrawals in {}",
        withdrawal.id,
        withdrawal.sub_account_id.as_deref().unwrap_or(UNKNOWN),
        withdrawal.exchange_email.as_deref().unwrap_or(UNKNOWN),
        withdrawal.amount.normalize(),
        withdrawal.asset,
        withdrawal.address,
        withdrawal.network,
        withdrawal.client.email_or_unknown(),
        withdrawal.client.name_or_unknown(),
        withdrawal.client.account_type_or_unknown(),
        created_at,
        searched,
        window
    )
}
