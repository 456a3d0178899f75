//! REST client for the Radix gateway service the bridge is pointed at. The
//! gateway owns transaction construction; this client only carries balances,
//! signed transfer submissions, and status lookups.

use std::str::FromStr as _;
use std::time::Duration;

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use serde_json::json;

use crate::bridge::{BridgeError, TxStatus};

pub struct RadixGatewayClient {
    base_url: String,
    http: reqwest::Client,
}

/// Signed transfer handed to the gateway for broadcast. The signature covers
/// the JSON encoding of the intent fields (everything except the key and the
/// signature itself).
#[derive(Debug, Serialize)]
pub struct TransferSubmission {
    pub from_address: String,
    pub to_address: String,
    pub amount_attos: String,
    pub nonce: u64,
    pub public_key_hex: String,
    pub signature_hex: String,
}

#[derive(Debug, Serialize)]
pub struct TransferIntent {
    pub from_address: String,
    pub to_address: String,
    pub amount_attos: String,
    pub nonce: u64,
}

#[derive(Deserialize)]
struct EntityDetailsResponse {
    items: Vec<EntityItem>,
}

#[derive(Deserialize)]
struct EntityItem {
    address: String,
    fungible_resources: FungibleResources,
}

#[derive(Deserialize)]
struct FungibleResources {
    items: Vec<FungibleResource>,
}

#[derive(Deserialize)]
struct FungibleResource {
    resource_address: String,
    amount: String,
}

#[derive(Deserialize)]
struct SubmitResponse {
    intent_hash: String,
}

#[derive(Deserialize)]
struct StatusResponse {
    status: String,
}

impl RadixGatewayClient {
    pub fn new(base_url: String, timeout: Duration) -> Result<Self, BridgeError> {
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| BridgeError::Rpc(format!("build http client: {e}")))?;
        Ok(Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            http,
        })
    }

    /// Fungible balance of one resource under an account. `None` means the
    /// ledger has no entry for the account at all; an account that exists but
    /// holds none of the resource reports zero.
    pub async fn fungible_balance(
        &self,
        address: &str,
        resource_address: &str,
    ) -> Result<Option<Decimal>, BridgeError> {
        let url = format!("{}/state/entity/details", self.base_url);
        let response = self
            .http
            .post(&url)
            .json(&json!({ "addresses": [address] }))
            .send()
            .await
            .map_err(|e| BridgeError::Rpc(format!("entity details request: {e}")))?;

        if response.status() == reqwest::StatusCode::NOT_FOUND {
            return Ok(None);
        }
        if !response.status().is_success() {
            let status = response.status().as_u16();
            let body = response.text().await.unwrap_or_default();
            return Err(BridgeError::Rpc(format!("entity details {status}: {body}")));
        }

        let details: EntityDetailsResponse = response
            .json()
            .await
            .map_err(|e| BridgeError::Rpc(format!("parse entity details: {e}")))?;

        let Some(entity) = details.items.into_iter().find(|i| i.address == address) else {
            return Ok(None);
        };

        let amount = entity
            .fungible_resources
            .items
            .into_iter()
            .find(|r| r.resource_address == resource_address)
            .map(|r| Decimal::from_str(&r.amount))
            .transpose()
            .map_err(|e| BridgeError::Rpc(format!("parse balance amount: {e}")))?
            .unwrap_or(Decimal::ZERO);

        Ok(Some(amount))
    }

    /// Broadcast a signed transfer. Returns the intent hash used for status
    /// polling.
    pub async fn submit_transfer(
        &self,
        submission: &TransferSubmission,
    ) -> Result<String, BridgeError> {
        let url = format!("{}/transaction/submit", self.base_url);
        let response = self
            .http
            .post(&url)
            .json(submission)
            .send()
            .await
            .map_err(|e| BridgeError::Rpc(format!("submit request: {e}")))?;

        if !response.status().is_success() {
            let status = response.status().as_u16();
            let body = response.text().await.unwrap_or_default();
            return Err(BridgeError::Rpc(format!("submit {status}: {body}")));
        }

        let submitted: SubmitResponse = response
            .json()
            .await
            .map_err(|e| BridgeError::Rpc(format!("parse submit response: {e}")))?;
        Ok(submitted.intent_hash)
    }

    pub async fn transaction_status(&self, intent_hash: &str) -> Result<TxStatus, BridgeError> {
        let url = format!("{}/transaction/status", self.base_url);
        let response = self
            .http
            .post(&url)
            .json(&json!({ "intent_hash": intent_hash }))
            .send()
            .await
            .map_err(|e| BridgeError::Rpc(format!("status request: {e}")))?;

        if !response.status().is_success() {
            let status = response.status().as_u16();
            let body = response.text().await.unwrap_or_default();
            return Err(BridgeError::Rpc(format!("status {status}: {body}")));
        }

        let status: StatusResponse = response
            .json()
            .await
            .map_err(|e| BridgeError::Rpc(format!("parse status response: {e}")))?;

        match status.status.as_str() {
            "Unknown" => Ok(TxStatus::NotFound),
            "Pending" => Ok(TxStatus::Pending),
            "CommittedSuccess" => Ok(TxStatus::Completed),
            "CommittedFailure" | "Rejected" => Ok(TxStatus::Canceled),
            other => Err(BridgeError::Rpc(format!(
                "unexpected transaction status: {other}"
            ))),
        }
    }
}
