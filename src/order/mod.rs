pub mod service;
pub mod store;

use std::time::{SystemTime, UNIX_EPOCH};

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::bridge::{NetworkKind, Secret, TxStatus};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OrderStatus {
    InsufficientFunds,
    Pending,
    SufficientFunds,
    Completed,
    Canceled,
    Expired,
    NotFound,
}

impl OrderStatus {
    /// Terminal statuses never change on later balance checks.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            OrderStatus::Completed | OrderStatus::Canceled | OrderStatus::Expired
        )
    }
}

impl From<TxStatus> for OrderStatus {
    fn from(status: TxStatus) -> Self {
        match status {
            TxStatus::NotFound => OrderStatus::NotFound,
            TxStatus::Pending => OrderStatus::Pending,
            TxStatus::SufficientFunds => OrderStatus::SufficientFunds,
            TxStatus::InsufficientFunds | TxStatus::InsufficientFundsForFee => {
                OrderStatus::InsufficientFunds
            }
            TxStatus::Completed => OrderStatus::Completed,
            TxStatus::Canceled => OrderStatus::Canceled,
            TxStatus::Expired => OrderStatus::Expired,
        }
    }
}

/// Custodial deposit account for one (user, network) pair. At most one row
/// exists per pair; rows are never deleted because funds may arrive at the
/// address at any time. Key material stays out of serde on purpose.
#[derive(Debug, Clone)]
pub struct VirtualAccount {
    pub user_id: String,
    pub network: NetworkKind,
    pub public_key: String,
    pub secret_key: Secret,
    pub seed_phrase: Option<Secret>,
    pub address: String,
    pub created_at: i64,
}

/// One swap intent and its execution record. `converted_amount` and
/// `rate_id` are frozen at creation; the rate is a snapshot, not a live
/// pointer. `version` is the optimistic-concurrency token bumped on every
/// status persist.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Order {
    pub order_id: String,
    pub user_id: String,
    pub from_token: String,
    pub to_token: String,
    pub from_network: NetworkKind,
    pub to_network: NetworkKind,
    pub amount: Decimal,
    pub converted_amount: Decimal,
    pub destination_address: String,
    pub rate_id: Option<String>,
    pub status: OrderStatus,
    pub tx_hash: Option<String>,
    pub created_at: i64,
    pub version: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExchangeRate {
    pub rate_id: String,
    pub from_token: String,
    pub to_token: String,
    pub rate: Decimal,
    pub quoted_at: i64,
}

pub fn unix_now() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs() as i64)
        .unwrap_or(0)
}
