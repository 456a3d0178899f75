use std::str::FromStr as _;
use std::time::Duration;

use async_trait::async_trait;
use rust_decimal::Decimal;
use solana_client::nonblocking::rpc_client::RpcClient;
use solana_sdk::commitment_config::CommitmentConfig;
use solana_sdk::pubkey::Pubkey;
use solana_sdk::signature::{Keypair, Signature};
use solana_sdk::signer::Signer as _;
use solana_sdk::system_instruction;
use solana_sdk::transaction::Transaction;
use solana_transaction_status::TransactionConfirmationStatus;

use crate::bridge::units::{from_base_units, to_base_units};
use crate::bridge::{
    BridgeError, ChainBridge, GeneratedKeys, NetworkKind, RestoredKeys, Secret,
    TransactionResponse, TxStatus, preflight_reject,
};
use crate::solana::keys;

pub const SOL_DECIMALS: u32 = 9;

// Flat headroom kept for the transfer fee when pre-checking balances.
const FEE_RESERVE_LAMPORTS: u64 = 5_000;

#[derive(Debug, Clone)]
pub struct SolanaBridgeConfig {
    pub rpc_url: String,
    pub treasury_address: String,
    pub treasury_key: Secret,
    pub rpc_timeout: Duration,
}

pub struct SolanaBridge {
    rpc: RpcClient,
    treasury: Pubkey,
    treasury_key: Secret,
}

impl SolanaBridge {
    pub fn new(cfg: SolanaBridgeConfig) -> Result<Self, BridgeError> {
        let treasury = Pubkey::from_str(&cfg.treasury_address).map_err(|e| {
            BridgeError::InvalidInput(format!("treasury address: {e}"))
        })?;
        let rpc = RpcClient::new_with_timeout_and_commitment(
            cfg.rpc_url,
            cfg.rpc_timeout,
            CommitmentConfig::confirmed(),
        );
        Ok(Self {
            rpc,
            treasury,
            treasury_key: cfg.treasury_key,
        })
    }

    fn fee_reserve() -> Decimal {
        Decimal::new(FEE_RESERVE_LAMPORTS as i64, SOL_DECIMALS)
    }

    async fn balance_of(&self, pubkey: &Pubkey) -> Result<Decimal, BridgeError> {
        let lamports = self
            .rpc
            .get_balance(pubkey)
            .await
            .map_err(|e| BridgeError::Rpc(format!("getBalance: {e}")))?;
        from_base_units(u128::from(lamports), SOL_DECIMALS)
    }

    async fn transfer(
        &self,
        from: &Keypair,
        to: &Pubkey,
        amount: Decimal,
    ) -> Result<Signature, BridgeError> {
        let lamports = u64::try_from(to_base_units(amount, SOL_DECIMALS)?)
            .map_err(|_| BridgeError::InvalidInput(format!("amount out of range: {amount}")))?;

        let blockhash = self
            .rpc
            .get_latest_blockhash()
            .await
            .map_err(|e| BridgeError::Rpc(format!("getLatestBlockhash: {e}")))?;

        let instruction = system_instruction::transfer(&from.pubkey(), to, lamports);
        let tx = Transaction::new_signed_with_payer(
            &[instruction],
            Some(&from.pubkey()),
            &[from],
            blockhash,
        );

        self.rpc
            .send_transaction(&tx)
            .await
            .map_err(|e| BridgeError::Rpc(format!("sendTransaction: {e}")))
    }
}

#[async_trait]
impl ChainBridge for SolanaBridge {
    fn network(&self) -> NetworkKind {
        NetworkKind::Solana
    }

    fn create_account(&self) -> Result<GeneratedKeys, BridgeError> {
        keys::generate()
    }

    fn restore_account(&self, seed_phrase: &str) -> Result<RestoredKeys, BridgeError> {
        keys::restore(seed_phrase)
    }

    fn derive_address(&self, public_key_hex: &str) -> Result<String, BridgeError> {
        keys::address_from_public_key(public_key_hex)
    }

    fn validate_address(&self, address: &str) -> bool {
        keys::is_valid_address(address)
    }

    // Solana reports a zero balance for accounts it has never seen, so an
    // unfunded account and a nonexistent one are indistinguishable here. The
    // orchestrator reads both as zero.
    async fn account_balance(&self, address: &str) -> Result<Decimal, BridgeError> {
        let pubkey = Pubkey::from_str(address)
            .map_err(|e| BridgeError::InvalidInput(format!("address: {e}")))?;
        self.balance_of(&pubkey).await
    }

    async fn withdraw(
        &self,
        amount: Decimal,
        source_address: &str,
        source_key: &Secret,
    ) -> Result<TransactionResponse, BridgeError> {
        let source = Pubkey::from_str(source_address)
            .map_err(|e| BridgeError::InvalidInput(format!("source address: {e}")))?;
        let keypair = keys::keypair_from_secret(source_key)?;
        if keypair.pubkey() != source {
            return Err(BridgeError::InvalidInput(
                "source key does not match source address".to_string(),
            ));
        }

        let balance = self.balance_of(&source).await?;
        if let Some(status) = preflight_reject(balance, amount, Self::fee_reserve()) {
            return Ok(TransactionResponse::rejected(
                status,
                format!("source balance {balance} cannot cover withdraw of {amount}"),
            ));
        }

        let signature = self.transfer(&keypair, &self.treasury, amount).await?;
        tracing::info!(%signature, %amount, source = %source, "solana withdraw broadcast");
        Ok(TransactionResponse::submitted(signature.to_string()))
    }

    async fn deposit(
        &self,
        amount: Decimal,
        destination_address: &str,
    ) -> Result<TransactionResponse, BridgeError> {
        let destination = Pubkey::from_str(destination_address)
            .map_err(|e| BridgeError::InvalidInput(format!("destination address: {e}")))?;
        let treasury_keypair = keys::keypair_from_secret(&self.treasury_key)?;

        let balance = self.balance_of(&self.treasury).await?;
        if let Some(status) = preflight_reject(balance, amount, Self::fee_reserve()) {
            return Ok(TransactionResponse::rejected(
                status,
                format!("treasury balance {balance} cannot cover deposit of {amount}"),
            ));
        }

        let signature = self.transfer(&treasury_keypair, &destination, amount).await?;
        tracing::info!(%signature, %amount, destination = %destination, "solana deposit broadcast");
        Ok(TransactionResponse::submitted(signature.to_string()))
    }

    async fn transaction_status(&self, tx_hash: &str) -> Result<TxStatus, BridgeError> {
        let signature = Signature::from_str(tx_hash)
            .map_err(|e| BridgeError::InvalidInput(format!("transaction hash: {e}")))?;

        let statuses = self
            .rpc
            .get_signature_statuses(&[signature])
            .await
            .map_err(|e| BridgeError::Rpc(format!("getSignatureStatuses: {e}")))?;

        match statuses.value.into_iter().next().flatten() {
            None => Ok(TxStatus::NotFound),
            Some(status) if status.err.is_some() => Ok(TxStatus::Canceled),
            Some(status) => match status.confirmation_status {
                Some(TransactionConfirmationStatus::Finalized) => Ok(TxStatus::Completed),
                _ => Ok(TxStatus::Pending),
            },
        }
    }
}
