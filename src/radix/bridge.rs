use std::time::Duration;

use async_trait::async_trait;
use ed25519_dalek::Signer as _;
use rust_decimal::Decimal;

use crate::bridge::units::to_base_units;
use crate::bridge::{
    BridgeError, ChainBridge, GeneratedKeys, NetworkKind, RestoredKeys, Secret,
    TransactionResponse, TxStatus, preflight_reject,
};
use crate::radix::RadixNetwork;
use crate::radix::gateway::{RadixGatewayClient, TransferIntent, TransferSubmission};
use crate::radix::keys;

pub const XRD_DECIMALS: u32 = 18;

// Headroom kept for the transaction fee when pre-checking balances, in XRD.
const FEE_RESERVE_XRD: Decimal = Decimal::ONE;

#[derive(Debug, Clone)]
pub struct RadixBridgeConfig {
    pub gateway_url: String,
    pub network: RadixNetwork,
    pub xrd_resource_address: String,
    pub treasury_address: String,
    pub treasury_public_key: String,
    pub treasury_key: Secret,
    pub http_timeout: Duration,
}

pub struct RadixBridge {
    cfg: RadixBridgeConfig,
    gateway: RadixGatewayClient,
}

impl RadixBridge {
    pub fn new(cfg: RadixBridgeConfig) -> Result<Self, BridgeError> {
        if !keys::is_valid_address(&cfg.treasury_address, cfg.network) {
            return Err(BridgeError::InvalidInput(format!(
                "treasury address does not match {} network",
                match cfg.network {
                    RadixNetwork::Mainnet => "mainnet",
                    RadixNetwork::Stokenet => "stokenet",
                }
            )));
        }
        let signing_key = keys::signing_key_from_secret(&cfg.treasury_key)?;
        if hex::encode(signing_key.verifying_key().to_bytes()) != cfg.treasury_public_key {
            return Err(BridgeError::InvalidInput(
                "treasury key does not match treasury public key".to_string(),
            ));
        }

        let gateway = RadixGatewayClient::new(cfg.gateway_url.clone(), cfg.http_timeout)?;
        Ok(Self { cfg, gateway })
    }

    /// Balance for transfer pre-flight: an account the ledger has never seen
    /// holds nothing.
    async fn spendable_balance(&self, address: &str) -> Result<Decimal, BridgeError> {
        Ok(self
            .gateway
            .fungible_balance(address, &self.cfg.xrd_resource_address)
            .await?
            .unwrap_or(Decimal::ZERO))
    }

    async fn signed_transfer(
        &self,
        from_address: &str,
        to_address: &str,
        amount: Decimal,
        signing_key: &ed25519_dalek::SigningKey,
    ) -> Result<String, BridgeError> {
        let attos = to_base_units(amount, XRD_DECIMALS)?;

        let mut nonce_bytes = [0u8; 8];
        {
            use rand_core::{OsRng, RngCore as _};
            OsRng.fill_bytes(&mut nonce_bytes);
        }

        let intent = TransferIntent {
            from_address: from_address.to_string(),
            to_address: to_address.to_string(),
            amount_attos: attos.to_string(),
            nonce: u64::from_be_bytes(nonce_bytes),
        };
        let intent_bytes = serde_json::to_vec(&intent)
            .map_err(|e| BridgeError::Rpc(format!("encode transfer intent: {e}")))?;
        let signature = signing_key.sign(&intent_bytes);

        let submission = TransferSubmission {
            from_address: intent.from_address,
            to_address: intent.to_address,
            amount_attos: intent.amount_attos,
            nonce: intent.nonce,
            public_key_hex: hex::encode(signing_key.verifying_key().to_bytes()),
            signature_hex: hex::encode(signature.to_bytes()),
        };

        self.gateway.submit_transfer(&submission).await
    }
}

#[async_trait]
impl ChainBridge for RadixBridge {
    fn network(&self) -> NetworkKind {
        NetworkKind::Radix
    }

    fn create_account(&self) -> Result<GeneratedKeys, BridgeError> {
        keys::generate()
    }

    fn restore_account(&self, seed_phrase: &str) -> Result<RestoredKeys, BridgeError> {
        keys::restore(seed_phrase)
    }

    fn derive_address(&self, public_key_hex: &str) -> Result<String, BridgeError> {
        keys::address_from_public_key(public_key_hex, self.cfg.network)
    }

    fn validate_address(&self, address: &str) -> bool {
        keys::is_valid_address(address, self.cfg.network)
    }

    // Unlike Solana, the gateway distinguishes "no ledger entry" from a zero
    // balance; that distinction is surfaced as `NotFound` here and collapsed
    // to zero by the orchestrator.
    async fn account_balance(&self, address: &str) -> Result<Decimal, BridgeError> {
        if !self.validate_address(address) {
            return Err(BridgeError::InvalidInput(format!(
                "malformed radix address: {address}"
            )));
        }
        self.gateway
            .fungible_balance(address, &self.cfg.xrd_resource_address)
            .await?
            .ok_or_else(|| BridgeError::NotFound(format!("account not on ledger: {address}")))
    }

    async fn withdraw(
        &self,
        amount: Decimal,
        source_address: &str,
        source_key: &Secret,
    ) -> Result<TransactionResponse, BridgeError> {
        if !self.validate_address(source_address) {
            return Err(BridgeError::InvalidInput(format!(
                "malformed radix address: {source_address}"
            )));
        }

        let signing_key = keys::signing_key_from_secret(source_key)?;
        let derived = keys::address_from_public_key(
            &hex::encode(signing_key.verifying_key().to_bytes()),
            self.cfg.network,
        )?;
        if derived != source_address {
            return Err(BridgeError::InvalidInput(
                "source key does not match source address".to_string(),
            ));
        }

        let balance = self.spendable_balance(source_address).await?;
        if let Some(status) = preflight_reject(balance, amount, FEE_RESERVE_XRD) {
            return Ok(TransactionResponse::rejected(
                status,
                format!("source balance {balance} cannot cover withdraw of {amount}"),
            ));
        }

        let intent_hash = self
            .signed_transfer(source_address, &self.cfg.treasury_address, amount, &signing_key)
            .await?;
        tracing::info!(%intent_hash, %amount, source = %source_address, "radix withdraw broadcast");
        Ok(TransactionResponse::submitted(intent_hash))
    }

    async fn deposit(
        &self,
        amount: Decimal,
        destination_address: &str,
    ) -> Result<TransactionResponse, BridgeError> {
        if !self.validate_address(destination_address) {
            return Err(BridgeError::InvalidInput(format!(
                "malformed radix address: {destination_address}"
            )));
        }

        let balance = self.spendable_balance(&self.cfg.treasury_address).await?;
        if let Some(status) = preflight_reject(balance, amount, FEE_RESERVE_XRD) {
            return Ok(TransactionResponse::rejected(
                status,
                format!("treasury balance {balance} cannot cover deposit of {amount}"),
            ));
        }

        let signing_key = keys::signing_key_from_secret(&self.cfg.treasury_key)?;
        let intent_hash = self
            .signed_transfer(
                &self.cfg.treasury_address,
                destination_address,
                amount,
                &signing_key,
            )
            .await?;
        tracing::info!(%intent_hash, %amount, destination = %destination_address, "radix deposit broadcast");
        Ok(TransactionResponse::submitted(intent_hash))
    }

    async fn transaction_status(&self, tx_hash: &str) -> Result<TxStatus, BridgeError> {
        self.gateway.transaction_status(tx_hash).await
    }
}
