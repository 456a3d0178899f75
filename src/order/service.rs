use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use rust_decimal::Decimal;
use serde::Serialize;
use thiserror::Error;
use uuid::Uuid;

use crate::bridge::{BridgeError, ChainBridge, NetworkKind, TxStatus};
use crate::order::store::SqliteStore;
use crate::retry::{self, RetryPolicy};

use super::{Order, OrderStatus, VirtualAccount, unix_now};

#[derive(Debug, Clone)]
pub struct OrderServiceConfig {
    /// Funding window: a non-terminal order older than this expires on the
    /// next balance check.
    pub order_ttl: Duration,
    /// Retry policy for the compensating deposit after a broken deposit leg.
    pub compensation_retry: RetryPolicy,
}

impl Default for OrderServiceConfig {
    fn default() -> Self {
        Self {
            order_ttl: Duration::from_secs(600),
            compensation_retry: RetryPolicy::default(),
        }
    }
}

#[derive(Debug, Error)]
pub enum OrderError {
    #[error("validation: {0}")]
    Validation(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("bridge: {0}")]
    Bridge(#[from] BridgeError),

    #[error("storage: {0}")]
    Storage(#[from] anyhow::Error),

    /// The deposit leg failed after a broadcast withdraw and the
    /// compensating deposit also failed: funds sit in the treasury
    /// attributed to no order. Alarm-worthy, distinct from ordinary RPC
    /// failure.
    #[error(
        "compensation failed for order {order_id}: {amount} stranded in treasury \
         (deposit leg: {deposit_failure}; compensation: {compensation_failure})"
    )]
    CompensationFailed {
        order_id: String,
        amount: Decimal,
        deposit_failure: String,
        compensation_failure: String,
    },
}

#[derive(Debug, Clone)]
pub struct CreateOrderRequest {
    pub from_token: String,
    pub to_token: String,
    pub from_network: String,
    pub to_network: String,
    pub amount: Decimal,
    pub destination_address: String,
}

/// What a balance check reports back to the polling client. `status` is the
/// caller-facing view: an order stored as `Canceled` by the TTL path is
/// reported as `Expired`.
#[derive(Debug, Clone, Serialize)]
pub struct CheckBalanceOutcome {
    pub order_id: String,
    pub status: OrderStatus,
    pub balance: Decimal,
    pub tx_hash: Option<String>,
}

/// The order state machine: validates swap requests, provisions custodial
/// virtual accounts, runs the two-leg withdraw/deposit transfer with
/// compensating-abort semantics, and reconciles funding state on client
/// polls.
#[derive(Clone)]
pub struct OrderService {
    cfg: OrderServiceConfig,
    solana: Arc<dyn ChainBridge>,
    radix: Arc<dyn ChainBridge>,
    store: Arc<Mutex<SqliteStore>>,
    locks: Arc<Mutex<HashMap<String, Arc<tokio::sync::Mutex<()>>>>>,
}

impl OrderService {
    pub fn new(
        cfg: OrderServiceConfig,
        solana: Arc<dyn ChainBridge>,
        radix: Arc<dyn ChainBridge>,
        store: Arc<Mutex<SqliteStore>>,
    ) -> Self {
        Self {
            cfg,
            solana,
            radix,
            store,
            locks: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    fn bridge(&self, network: NetworkKind) -> &Arc<dyn ChainBridge> {
        match network {
            NetworkKind::Solana => &self.solana,
            NetworkKind::Radix => &self.radix,
        }
    }

    /// Mutual-exclusion guard for one order's observe-balance → transfer →
    /// persist sequence. The store's version CAS is the persistence-level
    /// backstop behind it.
    fn order_lock(&self, order_id: &str) -> Arc<tokio::sync::Mutex<()>> {
        let mut locks = self.locks.lock().expect("locks mutex poisoned");
        locks
            .entry(order_id.to_string())
            .or_insert_with(|| Arc::new(tokio::sync::Mutex::new(())))
            .clone()
    }

    fn is_expired(&self, order: &Order) -> bool {
        unix_now() - order.created_at > self.cfg.order_ttl.as_secs() as i64
    }

    /// Balance for funding decisions. A chain-level "account not found"
    /// reads as zero: an address nobody has funded holds nothing, whether or
    /// not the chain has an entry for it.
    async fn funded_balance(
        &self,
        bridge: &Arc<dyn ChainBridge>,
        address: &str,
    ) -> Result<Decimal, OrderError> {
        match bridge.account_balance(address).await {
            Ok(balance) => Ok(balance),
            Err(BridgeError::NotFound(_)) => Ok(Decimal::ZERO),
            Err(err) => Err(err.into()),
        }
    }

    /// Look up or lazily provision the user's custodial account on a
    /// network. Returns the account and whether this call created it. The
    /// loser of a concurrent provisioning race re-reads the winner's row.
    pub async fn ensure_virtual_account(
        &self,
        user_id: &str,
        network: NetworkKind,
    ) -> Result<(VirtualAccount, bool), OrderError> {
        if let Some(account) = {
            let store = self.store.lock().expect("store mutex poisoned");
            store.get_virtual_account(user_id, network)?
        } {
            return Ok((account, false));
        }

        let bridge = self.bridge(network);
        let keys = bridge.create_account()?;
        let address = bridge.derive_address(&keys.public_key)?;
        let account = VirtualAccount {
            user_id: user_id.to_string(),
            network,
            public_key: keys.public_key,
            secret_key: keys.secret_key,
            seed_phrase: Some(keys.seed_phrase),
            address,
            created_at: unix_now(),
        };

        let inserted = {
            let mut store = self.store.lock().expect("store mutex poisoned");
            store.insert_virtual_account(&account)?
        };

        if inserted {
            tracing::info!(
                user_id,
                network = %network,
                address = %account.address,
                "provisioned virtual account"
            );
            return Ok((account, true));
        }

        // Lost the uniqueness race; the winner's row is authoritative.
        let account = {
            let store = self.store.lock().expect("store mutex poisoned");
            store.get_virtual_account(user_id, network)?
        }
        .ok_or_else(|| {
            OrderError::Storage(anyhow::anyhow!(
                "virtual account vanished after conflict ({user_id}, {network})"
            ))
        })?;
        Ok((account, false))
    }

    pub async fn create_order(
        &self,
        user_id: &str,
        req: CreateOrderRequest,
    ) -> Result<Order, OrderError> {
        // Validation runs before any side effect.
        let user_known = {
            let store = self.store.lock().expect("store mutex poisoned");
            store.user_exists(user_id)?
        };
        if !user_known {
            return Err(OrderError::NotFound(format!("user: {user_id}")));
        }

        let from_network = req
            .from_network
            .parse::<NetworkKind>()
            .map_err(|e| OrderError::Validation(e.to_string()))?;
        let to_network = req
            .to_network
            .parse::<NetworkKind>()
            .map_err(|e| OrderError::Validation(e.to_string()))?;

        let from_token_network = NetworkKind::for_token(&req.from_token)
            .ok_or_else(|| OrderError::Validation(format!("unknown token: {}", req.from_token)))?;
        let to_token_network = NetworkKind::for_token(&req.to_token)
            .ok_or_else(|| OrderError::Validation(format!("unknown token: {}", req.to_token)))?;
        if from_token_network != from_network {
            return Err(OrderError::Validation(format!(
                "token {} is not on network {from_network}",
                req.from_token
            )));
        }
        if to_token_network != to_network {
            return Err(OrderError::Validation(format!(
                "token {} is not on network {to_network}",
                req.to_token
            )));
        }

        if req.amount <= Decimal::ZERO {
            return Err(OrderError::Validation(
                "amount must be positive".to_string(),
            ));
        }

        let deposit_bridge = self.bridge(to_network);
        if !deposit_bridge.validate_address(&req.destination_address) {
            return Err(OrderError::Validation(format!(
                "destination address is not a valid {to_network} address"
            )));
        }

        // Rate snapshot. A missing rate degrades to a zero-rate placeholder
        // rather than failing; see DESIGN.md.
        let rate = {
            let store = self.store.lock().expect("store mutex poisoned");
            store.latest_rate(&req.from_token, &req.to_token)?
        };
        let (rate_id, converted_amount) = match rate {
            Some(rate) => {
                let converted = rate.rate.checked_mul(req.amount).ok_or_else(|| {
                    OrderError::Validation("converted amount out of range".to_string())
                })?;
                (Some(rate.rate_id), converted)
            }
            None => {
                tracing::warn!(
                    from_token = %req.from_token,
                    to_token = %req.to_token,
                    "no exchange rate recorded for pair, using zero-rate placeholder"
                );
                (None, Decimal::ZERO)
            }
        };

        let (account, created) = self.ensure_virtual_account(user_id, from_network).await?;

        let mut order = Order {
            order_id: Uuid::new_v4().to_string(),
            user_id: user_id.to_string(),
            from_token: req.from_token,
            to_token: req.to_token,
            from_network,
            to_network,
            amount: req.amount,
            converted_amount,
            destination_address: req.destination_address,
            rate_id,
            status: OrderStatus::InsufficientFunds,
            tx_hash: None,
            created_at: unix_now(),
            version: 0,
        };

        // A freshly provisioned account is necessarily unfunded; there is
        // nothing to move yet.
        if created {
            let mut store = self.store.lock().expect("store mutex poisoned");
            store.insert_order(&order)?;
            tracing::info!(order_id = %order.order_id, "order created awaiting funding");
            return Ok(order);
        }

        let withdraw_bridge = self.bridge(from_network);
        let balance = self.funded_balance(withdraw_bridge, &account.address).await?;
        if balance <= order.amount {
            let mut store = self.store.lock().expect("store mutex poisoned");
            store.insert_order(&order)?;
            tracing::info!(
                order_id = %order.order_id,
                %balance,
                "order created awaiting funding"
            );
            return Ok(order);
        }

        // Already funded: persist, then settle inline before returning.
        order.status = OrderStatus::SufficientFunds;
        {
            let mut store = self.store.lock().expect("store mutex poisoned");
            store.insert_order(&order)?;
        }

        let (status, tx_hash) = self.run_transfer_guarded(order.clone(), account).await?;
        self.persist_transfer_outcome(&order.order_id, status, tx_hash, order.version)
    }

    /// Re-evaluate an existing order's funding state: wait, settle, expire,
    /// or re-poll a pending deposit. Client-poll driven; there is no
    /// background scheduler.
    pub async fn check_balance(
        &self,
        user_id: &str,
        order_id: &str,
    ) -> Result<CheckBalanceOutcome, OrderError> {
        let order = self.owned_order(user_id, order_id)?;

        let account = {
            let store = self.store.lock().expect("store mutex poisoned");
            store.get_virtual_account(&order.user_id, order.from_network)?
        }
        .ok_or_else(|| OrderError::NotFound(format!("virtual account for order {order_id}")))?;

        let withdraw_bridge = self.bridge(order.from_network);
        let balance = self.funded_balance(withdraw_bridge, &account.address).await?;

        if order.status.is_terminal() || self.is_expired(&order) {
            return self.settle_terminal_view(order, balance);
        }

        if order.status == OrderStatus::Pending {
            return self.repoll_pending(order, balance).await;
        }

        if balance <= order.amount {
            // Still waiting for funding; read-only.
            return Ok(CheckBalanceOutcome {
                order_id: order.order_id,
                status: order.status,
                balance,
                tx_hash: order.tx_hash,
            });
        }

        // Funded. Serialize the observe → transfer → persist sequence per
        // order; the loser of the race degrades to a pure status read.
        let lock = self.order_lock(&order.order_id);
        let _guard = lock.lock().await;

        let order = self.owned_order(user_id, order_id)?;
        if order.status.is_terminal() || self.is_expired(&order) {
            return self.settle_terminal_view(order, balance);
        }
        if order.status == OrderStatus::Pending {
            return self.repoll_pending(order, balance).await;
        }

        let claimed = {
            let mut store = self.store.lock().expect("store mutex poisoned");
            store.update_order_status(
                &order.order_id,
                OrderStatus::SufficientFunds,
                None,
                order.version,
            )?
        };
        if !claimed {
            let order = self.owned_order(user_id, order_id)?;
            return Ok(CheckBalanceOutcome {
                status: reported_status(&order),
                balance,
                tx_hash: order.tx_hash.clone(),
                order_id: order.order_id,
            });
        }

        let claimed_version = order.version + 1;
        let (status, tx_hash) = self
            .run_transfer_guarded(
                Order {
                    status: OrderStatus::SufficientFunds,
                    version: claimed_version,
                    ..order.clone()
                },
                account,
            )
            .await?;
        let order = self.persist_transfer_outcome(&order.order_id, status, tx_hash, claimed_version)?;

        Ok(CheckBalanceOutcome {
            status: reported_status(&order),
            balance,
            tx_hash: order.tx_hash.clone(),
            order_id: order.order_id,
        })
    }

    /// Ownership-checked order read for clients showing order state.
    pub fn get_order(&self, user_id: &str, order_id: &str) -> Result<Order, OrderError> {
        self.owned_order(user_id, order_id)
    }

    fn owned_order(&self, user_id: &str, order_id: &str) -> Result<Order, OrderError> {
        let order = {
            let store = self.store.lock().expect("store mutex poisoned");
            store.get_order(order_id)?
        }
        .ok_or_else(|| OrderError::NotFound(format!("order: {order_id}")))?;

        // Authorization proper is the API layer's job; the owner comparison
        // still happens here so a foreign order id reads as absent.
        if order.user_id != user_id {
            return Err(OrderError::NotFound(format!("order: {order_id}")));
        }
        Ok(order)
    }

    /// Terminal orders are immutable; a non-terminal order past its TTL
    /// transitions to Canceled here. Both report as their caller-facing
    /// view with the current balance.
    fn settle_terminal_view(
        &self,
        order: Order,
        balance: Decimal,
    ) -> Result<CheckBalanceOutcome, OrderError> {
        if !order.status.is_terminal() {
            let expired = {
                let mut store = self.store.lock().expect("store mutex poisoned");
                store.update_order_status(
                    &order.order_id,
                    OrderStatus::Canceled,
                    None,
                    order.version,
                )?
            };
            if expired {
                tracing::info!(order_id = %order.order_id, "order expired past funding window");
            }
            // Either way the stored state is now terminal or was taken over
            // by a concurrent writer; re-read for the honest view.
            let order = {
                let store = self.store.lock().expect("store mutex poisoned");
                store.get_order(&order.order_id)?
            }
            .ok_or_else(|| OrderError::NotFound(format!("order: {}", order.order_id)))?;
            return Ok(CheckBalanceOutcome {
                status: reported_status(&order),
                balance,
                tx_hash: order.tx_hash.clone(),
                order_id: order.order_id,
            });
        }

        Ok(CheckBalanceOutcome {
            status: reported_status(&order),
            balance,
            tx_hash: order.tx_hash.clone(),
            order_id: order.order_id,
        })
    }

    /// An order with a broadcast deposit only needs its transaction status
    /// re-queried; no new transfer.
    async fn repoll_pending(
        &self,
        order: Order,
        balance: Decimal,
    ) -> Result<CheckBalanceOutcome, OrderError> {
        let Some(tx_hash) = order.tx_hash.clone() else {
            // Pending without a hash would be a bug upstream; report as-is.
            return Ok(CheckBalanceOutcome {
                status: order.status,
                balance,
                tx_hash: None,
                order_id: order.order_id,
            });
        };

        let deposit_bridge = self.bridge(order.to_network);
        let polled = deposit_bridge.transaction_status(&tx_hash).await?;
        let status = match polled {
            // Not yet observed by the node; the broadcast stands.
            TxStatus::NotFound => OrderStatus::Pending,
            other => OrderStatus::from(other),
        };

        if status != order.status {
            let updated = {
                let mut store = self.store.lock().expect("store mutex poisoned");
                store.update_order_status(&order.order_id, status, None, order.version)?
            };
            if !updated {
                let order = {
                    let store = self.store.lock().expect("store mutex poisoned");
                    store.get_order(&order.order_id)?
                }
                .ok_or_else(|| OrderError::NotFound(format!("order: {}", order.order_id)))?;
                return Ok(CheckBalanceOutcome {
                    status: reported_status(&order),
                    balance,
                    tx_hash: order.tx_hash.clone(),
                    order_id: order.order_id,
                });
            }
        }

        Ok(CheckBalanceOutcome {
            status,
            balance,
            tx_hash: Some(tx_hash),
            order_id: order.order_id,
        })
    }

    fn persist_transfer_outcome(
        &self,
        order_id: &str,
        status: OrderStatus,
        tx_hash: Option<String>,
        expected_version: i64,
    ) -> Result<Order, OrderError> {
        {
            let mut store = self.store.lock().expect("store mutex poisoned");
            store.update_order_status(order_id, status, tx_hash.as_deref(), expected_version)?;
        }
        let order = {
            let store = self.store.lock().expect("store mutex poisoned");
            store.get_order(order_id)?
        }
        .ok_or_else(|| OrderError::NotFound(format!("order: {order_id}")))?;
        tracing::info!(
            order_id,
            status = ?order.status,
            tx_hash = order.tx_hash.as_deref().unwrap_or(""),
            "order settled"
        );
        Ok(order)
    }

    /// The two-leg transfer runs on its own task: once the withdraw has
    /// broadcast, a dropped/canceled request must not stop the deposit or
    /// the compensation path, or funds are stranded with no code path to
    /// reconcile them.
    async fn run_transfer_guarded(
        &self,
        order: Order,
        account: VirtualAccount,
    ) -> Result<(OrderStatus, Option<String>), OrderError> {
        let service = self.clone();
        tokio::spawn(async move { service.two_leg_transfer(&order, &account).await })
            .await
            .map_err(|e| OrderError::Storage(anyhow::anyhow!("transfer task join: {e}")))?
    }

    /// Withdraw from the virtual account into the treasury, then deposit the
    /// converted amount to the destination. A failed deposit triggers a
    /// compensating deposit of the original amount back to the virtual
    /// account; only when that also fails is the order's money actually
    /// stuck.
    async fn two_leg_transfer(
        &self,
        order: &Order,
        account: &VirtualAccount,
    ) -> Result<(OrderStatus, Option<String>), OrderError> {
        let withdraw_bridge = self.bridge(order.from_network);
        let deposit_bridge = self.bridge(order.to_network);

        // Leg 1. An error here means nothing broadcast; no compensation.
        let withdrawal = withdraw_bridge
            .withdraw(order.amount, &account.address, &account.secret_key)
            .await?;
        let Some(withdraw_hash) = withdrawal.tx_hash else {
            tracing::info!(
                order_id = %order.order_id,
                status = ?withdrawal.status,
                "withdraw rejected pre-flight"
            );
            return Ok((OrderStatus::from(withdrawal.status), None));
        };

        // Leg 2. From here on, every failure path must attempt compensation.
        let deposit_failure = match deposit_bridge
            .deposit(order.converted_amount, &order.destination_address)
            .await
        {
            Ok(response) => match response.tx_hash {
                Some(tx_hash) => {
                    let polled = match deposit_bridge.transaction_status(&tx_hash).await {
                        Ok(status) => status,
                        Err(err) => {
                            // The deposit did broadcast; leave it pending and
                            // let the next poll translate the real status.
                            tracing::warn!(
                                order_id = %order.order_id,
                                error = %err,
                                "deposit status fetch failed after broadcast"
                            );
                            TxStatus::Pending
                        }
                    };
                    let status = match polled {
                        TxStatus::NotFound => OrderStatus::Pending,
                        other => OrderStatus::from(other),
                    };
                    return Ok((status, Some(tx_hash)));
                }
                None => response
                    .detail
                    .unwrap_or_else(|| "deposit rejected pre-flight".to_string()),
            },
            Err(err) => err.to_string(),
        };

        tracing::warn!(
            order_id = %order.order_id,
            withdraw_tx = %withdraw_hash,
            error = %deposit_failure,
            "deposit leg failed, compensating withdraw"
        );

        let compensation = retry::with_backoff(
            &self.cfg.compensation_retry,
            "compensating deposit",
            || withdraw_bridge.deposit(order.amount, &account.address),
        )
        .await;

        let compensation_failure = match compensation {
            Ok(response) if response.is_submitted() => {
                tracing::info!(
                    order_id = %order.order_id,
                    compensation_tx = response.tx_hash.as_deref().unwrap_or(""),
                    "compensation deposit broadcast, order remains retryable"
                );
                return Err(OrderError::Bridge(BridgeError::Rpc(format!(
                    "deposit leg failed and was compensated: {deposit_failure}"
                ))));
            }
            Ok(response) => response
                .detail
                .unwrap_or_else(|| "compensation rejected pre-flight".to_string()),
            Err(err) => err.to_string(),
        };

        tracing::error!(
            order_id = %order.order_id,
            amount = %order.amount,
            withdraw_tx = %withdraw_hash,
            error = %compensation_failure,
            "compensation failed, funds stranded in treasury"
        );
        Err(OrderError::CompensationFailed {
            order_id: order.order_id.clone(),
            amount: order.amount,
            deposit_failure,
            compensation_failure,
        })
    }
}

/// Caller-facing status: a TTL cancellation reads as `Expired`.
fn reported_status(order: &Order) -> OrderStatus {
    match order.status {
        OrderStatus::Canceled => OrderStatus::Expired,
        status => status,
    }
}
