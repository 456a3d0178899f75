//! In-memory chain double with its own ledger, call counters, and failure
//! switches, so orchestrator behavior is observable without a node.

use std::collections::HashMap;
use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

use async_trait::async_trait;
use rust_decimal::Decimal;

use sol_radix_swap::bridge::{
    BridgeError, ChainBridge, GeneratedKeys, NetworkKind, RestoredKeys, Secret,
    TransactionResponse, TxStatus, preflight_reject,
};

pub struct FakeBridge {
    network: NetworkKind,
    treasury_address: String,
    ledger: Mutex<HashMap<String, Decimal>>,
    statuses: Mutex<HashMap<String, TxStatus>>,
    counter: AtomicU64,
    pub created_accounts: AtomicU64,
    pub withdraw_calls: AtomicU64,
    pub deposit_calls: AtomicU64,
    pub fail_deposits: AtomicBool,
    deposit_status: Mutex<TxStatus>,
}

impl FakeBridge {
    pub fn new(network: NetworkKind) -> Self {
        let treasury_address = format!("{}-treasury", network.as_str());
        let bridge = Self {
            network,
            treasury_address: treasury_address.clone(),
            ledger: Mutex::new(HashMap::new()),
            statuses: Mutex::new(HashMap::new()),
            counter: AtomicU64::new(0),
            created_accounts: AtomicU64::new(0),
            withdraw_calls: AtomicU64::new(0),
            deposit_calls: AtomicU64::new(0),
            fail_deposits: AtomicBool::new(false),
            deposit_status: Mutex::new(TxStatus::Completed),
        };
        bridge.fund(&treasury_address, Decimal::from(1_000_000));
        bridge
    }

    pub fn fund(&self, address: &str, amount: Decimal) {
        let mut ledger = self.ledger.lock().expect("ledger mutex poisoned");
        *ledger.entry(address.to_string()).or_insert(Decimal::ZERO) += amount;
    }

    pub fn balance(&self, address: &str) -> Decimal {
        let ledger = self.ledger.lock().expect("ledger mutex poisoned");
        ledger.get(address).copied().unwrap_or(Decimal::ZERO)
    }

    pub fn treasury_balance(&self) -> Decimal {
        self.balance(&self.treasury_address)
    }

    /// What broadcast deposits report when their status is first polled.
    pub fn set_deposit_status(&self, status: TxStatus) {
        *self.deposit_status.lock().expect("status mutex poisoned") = status;
    }

    /// Move an already broadcast transaction to a new status, as a later
    /// confirmation would.
    pub fn set_tx_status(&self, tx_hash: &str, status: TxStatus) {
        self.statuses
            .lock()
            .expect("statuses mutex poisoned")
            .insert(tx_hash.to_string(), status);
    }

    fn next_id(&self) -> u64 {
        self.counter.fetch_add(1, Ordering::SeqCst)
    }

    fn transfer(&self, from: &str, to: &str, amount: Decimal, kind: &str) -> TransactionResponse {
        let mut ledger = self.ledger.lock().expect("ledger mutex poisoned");
        let balance = ledger.get(from).copied().unwrap_or(Decimal::ZERO);
        if let Some(status) = preflight_reject(balance, amount, Decimal::ZERO) {
            return TransactionResponse::rejected(
                status,
                format!("balance {balance} cannot cover {kind} of {amount}"),
            );
        }

        *ledger.entry(from.to_string()).or_insert(Decimal::ZERO) -= amount;
        *ledger.entry(to.to_string()).or_insert(Decimal::ZERO) += amount;

        let tx_hash = format!("{}-{}-{}", self.network.as_str(), kind, self.next_id());
        let status = *self.deposit_status.lock().expect("status mutex poisoned");
        self.statuses
            .lock()
            .expect("statuses mutex poisoned")
            .insert(tx_hash.clone(), status);
        TransactionResponse::submitted(tx_hash)
    }
}

#[async_trait]
impl ChainBridge for FakeBridge {
    fn network(&self) -> NetworkKind {
        self.network
    }

    fn create_account(&self) -> Result<GeneratedKeys, BridgeError> {
        self.created_accounts.fetch_add(1, Ordering::SeqCst);
        let id = self.next_id();
        let public_key = hex::encode(id.to_be_bytes());
        Ok(GeneratedKeys {
            public_key: public_key.clone(),
            secret_key: Secret::new(format!("secret-{public_key}")),
            seed_phrase: Secret::new(format!("{} fake seed {id}", self.network.as_str())),
        })
    }

    fn restore_account(&self, seed_phrase: &str) -> Result<RestoredKeys, BridgeError> {
        let id = seed_phrase
            .rsplit(' ')
            .next()
            .and_then(|s| s.parse::<u64>().ok())
            .ok_or_else(|| BridgeError::InvalidInput("invalid seed phrase".to_string()))?;
        let public_key = hex::encode(id.to_be_bytes());
        Ok(RestoredKeys {
            public_key: public_key.clone(),
            secret_key: Secret::new(format!("secret-{public_key}")),
        })
    }

    fn derive_address(&self, public_key_hex: &str) -> Result<String, BridgeError> {
        Ok(format!("{}-{}", self.network.as_str(), public_key_hex))
    }

    fn validate_address(&self, address: &str) -> bool {
        address.starts_with(&format!("{}-", self.network.as_str()))
    }

    async fn account_balance(&self, address: &str) -> Result<Decimal, BridgeError> {
        let ledger = self.ledger.lock().expect("ledger mutex poisoned");
        ledger
            .get(address)
            .copied()
            .ok_or_else(|| BridgeError::NotFound(format!("account not on ledger: {address}")))
    }

    async fn withdraw(
        &self,
        amount: Decimal,
        source_address: &str,
        _source_key: &Secret,
    ) -> Result<TransactionResponse, BridgeError> {
        self.withdraw_calls.fetch_add(1, Ordering::SeqCst);
        Ok(self.transfer(source_address, &self.treasury_address, amount, "withdraw"))
    }

    async fn deposit(
        &self,
        amount: Decimal,
        destination_address: &str,
    ) -> Result<TransactionResponse, BridgeError> {
        self.deposit_calls.fetch_add(1, Ordering::SeqCst);
        if self.fail_deposits.load(Ordering::SeqCst) {
            return Err(BridgeError::Rpc("simulated deposit outage".to_string()));
        }
        Ok(self.transfer(&self.treasury_address, destination_address, amount, "deposit"))
    }

    async fn transaction_status(&self, tx_hash: &str) -> Result<TxStatus, BridgeError> {
        let statuses = self.statuses.lock().expect("statuses mutex poisoned");
        Ok(statuses.get(tx_hash).copied().unwrap_or(TxStatus::NotFound))
    }
}
