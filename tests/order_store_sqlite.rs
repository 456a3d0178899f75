use anyhow::{Context as _, Result};

use sol_radix_swap::bridge::{NetworkKind, Secret};
use sol_radix_swap::order::store::SqliteStore;
use sol_radix_swap::order::{ExchangeRate, Order, OrderStatus, VirtualAccount};
use rust_decimal::Decimal;

fn sample_account(user_id: &str, network: NetworkKind, address: &str) -> VirtualAccount {
    VirtualAccount {
        user_id: user_id.to_string(),
        network,
        public_key: format!("pubkey:{address}"),
        secret_key: Secret::new(format!("secret:{address}")),
        seed_phrase: Some(Secret::new(format!("seed:{address}"))),
        address: address.to_string(),
        created_at: 1_700_000_000,
    }
}

fn sample_order(order_id: &str, status: OrderStatus) -> Order {
    Order {
        order_id: order_id.to_string(),
        user_id: "alice".to_string(),
        from_token: "SOL".to_string(),
        to_token: "XRD".to_string(),
        from_network: NetworkKind::Solana,
        to_network: NetworkKind::Radix,
        amount: Decimal::new(55, 1),
        converted_amount: Decimal::from(11),
        destination_address: format!("dest:{order_id}"),
        rate_id: Some("rate-a".to_string()),
        status,
        tx_hash: None,
        created_at: 1_700_000_000,
        version: 0,
    }
}

#[test]
fn sqlite_store_orders_round_trip() -> Result<()> {
    let dir = tempfile::tempdir().context("create tempdir")?;
    let path = dir.path().join("swap_store.sqlite3");

    let mut store = SqliteStore::open(path).context("open sqlite store")?;

    let a = sample_order("order-a", OrderStatus::InsufficientFunds);
    store.insert_order(&a).context("insert order-a")?;

    let got = store
        .get_order("order-a")
        .context("get order-a")?
        .context("order-a missing")?;
    assert_eq!(got.order_id, "order-a");
    assert_eq!(got.status, OrderStatus::InsufficientFunds);
    assert_eq!(got.amount, Decimal::new(55, 1));
    assert_eq!(got.converted_amount, Decimal::from(11));
    assert_eq!(got.from_network, NetworkKind::Solana);
    assert_eq!(got.to_network, NetworkKind::Radix);
    assert_eq!(got.rate_id.as_deref(), Some("rate-a"));
    assert_eq!(got.version, 0);

    assert!(store.get_order("missing").context("get missing")?.is_none());
    Ok(())
}

#[test]
fn order_status_cas_blocks_stale_writers() -> Result<()> {
    let dir = tempfile::tempdir().context("create tempdir")?;
    let path = dir.path().join("swap_store.sqlite3");
    let mut store = SqliteStore::open(path).context("open sqlite store")?;

    store
        .insert_order(&sample_order("order-a", OrderStatus::InsufficientFunds))
        .context("insert order-a")?;

    assert!(store
        .update_order_status("order-a", OrderStatus::SufficientFunds, None, 0)
        .context("first update")?);
    // A writer still holding version 0 lost the race.
    assert!(!store
        .update_order_status("order-a", OrderStatus::Canceled, None, 0)
        .context("stale update")?);

    let got = store
        .get_order("order-a")
        .context("get order-a")?
        .context("order-a missing")?;
    assert_eq!(got.status, OrderStatus::SufficientFunds);
    assert_eq!(got.version, 1);

    assert!(store
        .update_order_status("order-a", OrderStatus::Completed, Some("tx-1"), 1)
        .context("set hash")?);
    // A later status write without a hash keeps the recorded one.
    assert!(store
        .update_order_status("order-a", OrderStatus::Completed, None, 2)
        .context("keep hash")?);

    let got = store
        .get_order("order-a")
        .context("get order-a after hash")?
        .context("order-a missing after hash")?;
    assert_eq!(got.tx_hash.as_deref(), Some("tx-1"));
    assert_eq!(got.version, 3);
    Ok(())
}

#[test]
fn virtual_account_uniqueness_is_constraint_backed() -> Result<()> {
    let dir = tempfile::tempdir().context("create tempdir")?;
    let path = dir.path().join("swap_store.sqlite3");
    let mut store = SqliteStore::open(path).context("open sqlite store")?;

    let first = sample_account("alice", NetworkKind::Solana, "sol-addr-1");
    assert!(store
        .insert_virtual_account(&first)
        .context("insert first")?);

    // Same (user, network): the constraint fires and the insert reports the
    // conflict instead of erroring.
    let duplicate = sample_account("alice", NetworkKind::Solana, "sol-addr-2");
    assert!(!store
        .insert_virtual_account(&duplicate)
        .context("insert duplicate")?);

    let got = store
        .get_virtual_account("alice", NetworkKind::Solana)
        .context("get account")?
        .context("account missing")?;
    assert_eq!(got.address, "sol-addr-1");
    assert_eq!(got.secret_key.expose(), "secret:sol-addr-1");
    assert_eq!(
        got.seed_phrase.as_ref().map(|s| s.expose().to_string()),
        Some("seed:sol-addr-1".to_string())
    );

    // A different network for the same user is a separate account.
    let radix = sample_account("alice", NetworkKind::Radix, "rdx-addr-1");
    assert!(store.insert_virtual_account(&radix).context("insert radix")?);

    assert!(store
        .get_virtual_account("bob", NetworkKind::Solana)
        .context("get bob")?
        .is_none());
    Ok(())
}

#[test]
fn latest_rate_returns_newest_quote() -> Result<()> {
    let dir = tempfile::tempdir().context("create tempdir")?;
    let path = dir.path().join("swap_store.sqlite3");
    let mut store = SqliteStore::open(path).context("open sqlite store")?;

    store
        .insert_rate(&ExchangeRate {
            rate_id: "rate-old".to_string(),
            from_token: "SOL".to_string(),
            to_token: "XRD".to_string(),
            rate: Decimal::new(15, 1),
            quoted_at: 100,
        })
        .context("insert old rate")?;
    store
        .insert_rate(&ExchangeRate {
            rate_id: "rate-new".to_string(),
            from_token: "SOL".to_string(),
            to_token: "XRD".to_string(),
            rate: Decimal::from(2),
            quoted_at: 200,
        })
        .context("insert new rate")?;

    let got = store
        .latest_rate("SOL", "XRD")
        .context("latest rate")?
        .context("rate missing")?;
    assert_eq!(got.rate_id, "rate-new");
    assert_eq!(got.rate, Decimal::from(2));

    assert!(store
        .latest_rate("XRD", "SOL")
        .context("reverse pair")?
        .is_none());
    Ok(())
}

#[test]
fn user_registry_round_trip() -> Result<()> {
    let dir = tempfile::tempdir().context("create tempdir")?;
    let path = dir.path().join("swap_store.sqlite3");
    let mut store = SqliteStore::open(path).context("open sqlite store")?;

    assert!(!store.user_exists("alice").context("check before")?);
    store.insert_user("alice").context("insert alice")?;
    store.insert_user("alice").context("insert alice again")?;
    assert!(store.user_exists("alice").context("check after")?);
    Ok(())
}
