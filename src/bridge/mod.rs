pub mod slip10;
pub mod units;

use std::fmt;
use std::str::FromStr;

use async_trait::async_trait;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use zeroize::{Zeroize, ZeroizeOnDrop};

/// The two chain families an order can move value between.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NetworkKind {
    Solana,
    Radix,
}

impl NetworkKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            NetworkKind::Solana => "solana",
            NetworkKind::Radix => "radix",
        }
    }

    /// Native token of the network, in the registry the external
    /// Networks/NetworkTokens tables would otherwise provide.
    pub fn native_token(&self) -> &'static str {
        match self {
            NetworkKind::Solana => "SOL",
            NetworkKind::Radix => "XRD",
        }
    }

    pub fn for_token(token: &str) -> Option<NetworkKind> {
        match token {
            "SOL" => Some(NetworkKind::Solana),
            "XRD" => Some(NetworkKind::Radix),
            _ => None,
        }
    }
}

impl FromStr for NetworkKind {
    type Err = BridgeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "solana" => Ok(NetworkKind::Solana),
            "radix" => Ok(NetworkKind::Radix),
            other => Err(BridgeError::InvalidInput(format!(
                "unknown network: {other}"
            ))),
        }
    }
}

impl fmt::Display for NetworkKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Opaque secret material (private keys, seed phrases). Hex or phrase text
/// inside; wiped on drop and redacted in Debug so it cannot reach a log line
/// through field formatting.
#[derive(Clone, Zeroize, ZeroizeOnDrop)]
pub struct Secret(String);

impl Secret {
    pub fn new(value: String) -> Self {
        Self(value)
    }

    pub fn expose(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for Secret {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Secret(<redacted>)")
    }
}

/// Failures a bridge reports. `InsufficientFunds` and `NotFound` are expected
/// control-flow outcomes the orchestrator branches on; `Rpc` is transient.
#[derive(Debug, Error)]
pub enum BridgeError {
    #[error("invalid input: {0}")]
    InvalidInput(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("insufficient funds: {0}")]
    InsufficientFunds(String),

    #[error("rpc: {0}")]
    Rpc(String),
}

/// Chain-agnostic transaction status vocabulary. Both bridges translate their
/// native commit/confirmation states into this enum.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TxStatus {
    NotFound,
    Pending,
    SufficientFunds,
    InsufficientFunds,
    InsufficientFundsForFee,
    Completed,
    Canceled,
    Expired,
}

/// Outcome of a withdraw/deposit attempt. A pre-flight balance failure is a
/// response with the matching status and no hash, not an error, because the
/// order state machine treats it as a normal branch.
#[derive(Debug, Clone)]
pub struct TransactionResponse {
    pub status: TxStatus,
    pub tx_hash: Option<String>,
    pub detail: Option<String>,
}

impl TransactionResponse {
    pub fn submitted(tx_hash: String) -> Self {
        Self {
            status: TxStatus::Pending,
            tx_hash: Some(tx_hash),
            detail: None,
        }
    }

    pub fn rejected(status: TxStatus, detail: String) -> Self {
        Self {
            status,
            tx_hash: None,
            detail: Some(detail),
        }
    }

    pub fn is_submitted(&self) -> bool {
        self.tx_hash.is_some()
    }
}

/// Keys for a freshly generated custodial account. Reproducible only via the
/// seed phrase.
pub struct GeneratedKeys {
    pub public_key: String,
    pub secret_key: Secret,
    pub seed_phrase: Secret,
}

/// Keys restored from an existing seed phrase.
pub struct RestoredKeys {
    pub public_key: String,
    pub secret_key: Secret,
}

/// Uniform capability over one blockchain: key management, balance queries,
/// custodial transfers against the treasury account, and status translation.
///
/// Withdraw and deposit broadcast real, irreversible transactions; there is
/// no chain-level rollback. "Abort" is the orchestrator issuing a second,
/// opposite-direction transfer.
#[async_trait]
pub trait ChainBridge: Send + Sync {
    fn network(&self) -> NetworkKind;

    /// Generate a fresh keypair from a fresh OS-entropy mnemonic.
    fn create_account(&self) -> Result<GeneratedKeys, BridgeError>;

    /// Recover the keypair for a previously generated mnemonic. Fails with
    /// `InvalidInput` on checksum/wordlist/word-count violations.
    fn restore_account(&self, seed_phrase: &str) -> Result<RestoredKeys, BridgeError>;

    /// Deterministic address derivation from hex-encoded public key bytes.
    /// Pure, no I/O.
    fn derive_address(&self, public_key_hex: &str) -> Result<String, BridgeError>;

    /// Chain-specific address format rule.
    fn validate_address(&self, address: &str) -> bool;

    /// Confirmed balance in the chain's display unit.
    async fn account_balance(&self, address: &str) -> Result<Decimal, BridgeError>;

    /// Transfer `amount` from the custodial account at `source_address` to
    /// the treasury. Pre-flight checks the source balance; an insufficient
    /// balance comes back as a response status, not an error.
    async fn withdraw(
        &self,
        amount: Decimal,
        source_address: &str,
        source_key: &Secret,
    ) -> Result<TransactionResponse, BridgeError>;

    /// Transfer `amount` from the treasury to `destination_address`, with the
    /// same pre-flight discipline against the treasury's own balance.
    async fn deposit(
        &self,
        amount: Decimal,
        destination_address: &str,
    ) -> Result<TransactionResponse, BridgeError>;

    /// Translate the chain-native status of a broadcast transaction. A
    /// not-yet-observed hash is `NotFound`, not an error.
    async fn transaction_status(&self, tx_hash: &str) -> Result<TxStatus, BridgeError>;
}

/// Shared pre-flight check for withdraw/deposit: the available balance must
/// strictly exceed the transfer amount, and the remainder must cover the
/// chain's fee reserve. Returns the rejection status, or `None` when the
/// transfer may proceed.
pub fn preflight_reject(balance: Decimal, amount: Decimal, fee_reserve: Decimal) -> Option<TxStatus> {
    if balance <= amount {
        return Some(TxStatus::InsufficientFunds);
    }
    if balance - amount < fee_reserve {
        return Some(TxStatus::InsufficientFundsForFee);
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal::Decimal;

    #[test]
    fn secret_debug_is_redacted() {
        let s = Secret::new("correct horse battery staple".to_string());
        assert_eq!(format!("{s:?}"), "Secret(<redacted>)");
    }

    #[test]
    fn preflight_requires_strict_excess() {
        let fee = Decimal::new(1, 2); // 0.01
        assert_eq!(
            preflight_reject(Decimal::from(5), Decimal::from(5), fee),
            Some(TxStatus::InsufficientFunds)
        );
        assert_eq!(
            preflight_reject(Decimal::from(4), Decimal::from(5), fee),
            Some(TxStatus::InsufficientFunds)
        );
        assert_eq!(
            preflight_reject(Decimal::new(5005, 3), Decimal::from(5), fee),
            Some(TxStatus::InsufficientFundsForFee)
        );
        assert_eq!(
            preflight_reject(Decimal::from(6), Decimal::from(5), fee),
            None
        );
    }

    #[test]
    fn network_token_registry() {
        assert_eq!(NetworkKind::for_token("SOL"), Some(NetworkKind::Solana));
        assert_eq!(NetworkKind::for_token("XRD"), Some(NetworkKind::Radix));
        assert_eq!(NetworkKind::for_token("BTC"), None);
        assert_eq!("radix".parse::<NetworkKind>().unwrap(), NetworkKind::Radix);
        assert!("cosmos".parse::<NetworkKind>().is_err());
    }
}
