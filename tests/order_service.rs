mod support;

use std::sync::atomic::Ordering;
use std::time::Duration;

use rust_decimal::Decimal;

use sol_radix_swap::bridge::{NetworkKind, TxStatus};
use sol_radix_swap::order::OrderStatus;
use sol_radix_swap::order::service::{CreateOrderRequest, OrderError};

use support::test_env;

const TTL: Duration = Duration::from_secs(600);

fn sol_to_xrd(amount: Decimal) -> CreateOrderRequest {
    CreateOrderRequest {
        from_token: "SOL".to_string(),
        to_token: "XRD".to_string(),
        from_network: "solana".to_string(),
        to_network: "radix".to_string(),
        amount,
        destination_address: "radix-dest-1".to_string(),
    }
}

#[tokio::test]
async fn create_order_for_new_account_waits_for_funding() {
    let env = test_env(TTL);
    env.add_user("alice");
    env.seed_rate("SOL", "XRD", Decimal::from(2));

    let order = env
        .service
        .create_order("alice", sol_to_xrd(Decimal::from(5)))
        .await
        .expect("create order");

    assert_eq!(order.status, OrderStatus::InsufficientFunds);
    assert!(order.tx_hash.is_none());
    assert_eq!(order.converted_amount, Decimal::from(10));

    let address = env.source_address("alice", NetworkKind::Solana);
    assert!(!address.is_empty());
    assert_eq!(env.virtual_account_count("alice"), 1);
    assert_eq!(env.solana.withdraw_calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn create_order_rejects_bad_requests_without_side_effects() {
    let env = test_env(TTL);
    env.add_user("alice");

    let unknown_user = env
        .service
        .create_order("mallory", sol_to_xrd(Decimal::from(5)))
        .await;
    assert!(matches!(unknown_user, Err(OrderError::NotFound(_))));

    let mut bad_token = sol_to_xrd(Decimal::from(5));
    bad_token.from_token = "BTC".to_string();
    let bad_token = env.service.create_order("alice", bad_token).await;
    assert!(matches!(bad_token, Err(OrderError::Validation(_))));

    let mut wrong_network = sol_to_xrd(Decimal::from(5));
    wrong_network.from_network = "radix".to_string();
    let wrong_network = env.service.create_order("alice", wrong_network).await;
    assert!(matches!(wrong_network, Err(OrderError::Validation(_))));

    let zero_amount = env
        .service
        .create_order("alice", sol_to_xrd(Decimal::ZERO))
        .await;
    assert!(matches!(zero_amount, Err(OrderError::Validation(_))));

    let mut bad_destination = sol_to_xrd(Decimal::from(5));
    bad_destination.destination_address = "solana-dest-1".to_string();
    let bad_destination = env.service.create_order("alice", bad_destination).await;
    assert!(matches!(bad_destination, Err(OrderError::Validation(_))));

    // Validation failures must not provision accounts.
    assert_eq!(env.virtual_account_count("alice"), 0);
}

#[tokio::test]
async fn funded_order_settles_on_check_balance() {
    let env = test_env(TTL);
    env.add_user("alice");
    env.seed_rate("SOL", "XRD", Decimal::from(2));

    let order = env
        .service
        .create_order("alice", sol_to_xrd(Decimal::from(5)))
        .await
        .expect("create order");
    let address = env.source_address("alice", NetworkKind::Solana);

    env.solana.fund(&address, Decimal::from(10));

    let outcome = env
        .service
        .check_balance("alice", &order.order_id)
        .await
        .expect("check balance");

    assert_eq!(outcome.status, OrderStatus::Completed);
    assert!(outcome.tx_hash.is_some());

    let stored = env.stored_order(&order.order_id);
    assert_eq!(stored.status, OrderStatus::Completed);
    assert!(stored.tx_hash.is_some());

    // The two legs actually moved value: 5 SOL into the treasury, 10 XRD out
    // to the destination.
    assert_eq!(env.solana.balance(&address), Decimal::from(5));
    assert_eq!(
        env.solana.treasury_balance(),
        Decimal::from(1_000_000) + Decimal::from(5)
    );
    assert_eq!(env.radix.balance("radix-dest-1"), Decimal::from(10));

    // A completed order is immutable: polling again reports the same state
    // and never re-runs the transfer.
    let again = env
        .service
        .check_balance("alice", &order.order_id)
        .await
        .expect("second check");
    assert_eq!(again.status, OrderStatus::Completed);
    assert_eq!(env.solana.withdraw_calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn balance_equal_to_amount_keeps_waiting() {
    let env = test_env(TTL);
    env.add_user("alice");
    env.seed_rate("SOL", "XRD", Decimal::from(2));

    let order = env
        .service
        .create_order("alice", sol_to_xrd(Decimal::from(5)))
        .await
        .expect("create order");
    let address = env.source_address("alice", NetworkKind::Solana);
    env.solana.fund(&address, Decimal::from(5));

    let outcome = env
        .service
        .check_balance("alice", &order.order_id)
        .await
        .expect("check balance");

    assert_eq!(outcome.status, OrderStatus::InsufficientFunds);
    assert_eq!(outcome.balance, Decimal::from(5));
    assert_eq!(env.solana.withdraw_calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn prefunded_account_settles_inline_on_create() {
    let env = test_env(TTL);
    env.add_user("alice");
    env.seed_rate("SOL", "XRD", Decimal::from(2));

    // First order provisions the account.
    env.service
        .create_order("alice", sol_to_xrd(Decimal::from(5)))
        .await
        .expect("create first order");
    let address = env.source_address("alice", NetworkKind::Solana);
    env.solana.fund(&address, Decimal::from(10));

    // The account already holds more than the second order's amount, so the
    // transfer runs before create returns.
    let order = env
        .service
        .create_order("alice", sol_to_xrd(Decimal::from(3)))
        .await
        .expect("create second order");

    assert_eq!(order.status, OrderStatus::Completed);
    assert!(order.tx_hash.is_some());
    assert_eq!(env.solana.balance(&address), Decimal::from(7));
    assert_eq!(env.radix.balance("radix-dest-1"), Decimal::from(6));
    // No second account row was provisioned.
    assert_eq!(env.virtual_account_count("alice"), 1);
}

#[tokio::test]
async fn concurrent_checks_withdraw_exactly_once() {
    let env = test_env(TTL);
    env.add_user("alice");
    env.seed_rate("SOL", "XRD", Decimal::from(2));

    let order = env
        .service
        .create_order("alice", sol_to_xrd(Decimal::from(5)))
        .await
        .expect("create order");
    let address = env.source_address("alice", NetworkKind::Solana);

    // Balance is amount + epsilon: enough for exactly one transfer.
    env.solana
        .fund(&address, Decimal::from(5) + Decimal::new(1, 9));

    let (a, b) = tokio::join!(
        env.service.check_balance("alice", &order.order_id),
        env.service.check_balance("alice", &order.order_id),
    );
    a.expect("first check");
    b.expect("second check");

    assert_eq!(env.solana.withdraw_calls.load(Ordering::SeqCst), 1);
    assert_eq!(
        env.stored_order(&order.order_id).status,
        OrderStatus::Completed
    );
}

#[tokio::test]
async fn failed_deposit_compensates_the_source_account() {
    let env = test_env(TTL);
    env.add_user("alice");
    env.seed_rate("SOL", "XRD", Decimal::from(2));

    let order = env
        .service
        .create_order("alice", sol_to_xrd(Decimal::from(5)))
        .await
        .expect("create order");
    let address = env.source_address("alice", NetworkKind::Solana);
    env.solana.fund(&address, Decimal::from(10));

    env.radix.fail_deposits.store(true, Ordering::SeqCst);

    let outcome = env.service.check_balance("alice", &order.order_id).await;
    assert!(matches!(outcome, Err(OrderError::Bridge(_))));

    // The withdraw was reversed by the compensating deposit.
    assert_eq!(env.solana.balance(&address), Decimal::from(10));
    assert_eq!(env.radix.balance("radix-dest-1"), Decimal::ZERO);
    assert_eq!(env.solana.deposit_calls.load(Ordering::SeqCst), 1);

    let stored = env.stored_order(&order.order_id);
    assert_ne!(stored.status, OrderStatus::Completed);
    assert!(!stored.status.is_terminal());

    // The outage clears; the next poll settles the order.
    env.radix.fail_deposits.store(false, Ordering::SeqCst);
    let outcome = env
        .service
        .check_balance("alice", &order.order_id)
        .await
        .expect("check balance after outage");
    assert_eq!(outcome.status, OrderStatus::Completed);
    assert_eq!(env.radix.balance("radix-dest-1"), Decimal::from(10));
}

#[tokio::test]
async fn compensation_failure_is_a_distinct_alarm() {
    let env = test_env(TTL);
    env.add_user("alice");
    env.seed_rate("SOL", "XRD", Decimal::from(2));

    let order = env
        .service
        .create_order("alice", sol_to_xrd(Decimal::from(5)))
        .await
        .expect("create order");
    let address = env.source_address("alice", NetworkKind::Solana);
    env.solana.fund(&address, Decimal::from(10));

    env.radix.fail_deposits.store(true, Ordering::SeqCst);
    env.solana.fail_deposits.store(true, Ordering::SeqCst);

    let outcome = env.service.check_balance("alice", &order.order_id).await;
    match outcome {
        Err(OrderError::CompensationFailed {
            order_id, amount, ..
        }) => {
            assert_eq!(order_id, order.order_id);
            assert_eq!(amount, Decimal::from(5));
        }
        other => panic!("expected CompensationFailed, got {other:?}"),
    }

    // The compensating deposit was retried before giving up.
    assert_eq!(env.solana.deposit_calls.load(Ordering::SeqCst), 3);
    // Funds really are stranded in the treasury.
    assert_eq!(env.solana.balance(&address), Decimal::from(5));
    assert!(!env.stored_order(&order.order_id).status.is_terminal());
}

#[tokio::test]
async fn unfunded_order_expires_and_stays_expired() {
    let env = test_env(TTL);
    env.add_user("alice");
    env.seed_rate("SOL", "XRD", Decimal::from(2));

    let order = env
        .service
        .create_order("alice", sol_to_xrd(Decimal::from(5)))
        .await
        .expect("create order");
    env.backdate_order(&order.order_id, 660);

    let outcome = env
        .service
        .check_balance("alice", &order.order_id)
        .await
        .expect("check balance");
    assert_eq!(outcome.status, OrderStatus::Expired);
    // Stored as Canceled, reported as Expired.
    assert_eq!(env.stored_order(&order.order_id).status, OrderStatus::Canceled);

    // Funds arriving after expiry never trigger a transfer.
    let address = env.source_address("alice", NetworkKind::Solana);
    env.solana.fund(&address, Decimal::from(100));

    let outcome = env
        .service
        .check_balance("alice", &order.order_id)
        .await
        .expect("check balance after expiry");
    assert_eq!(outcome.status, OrderStatus::Expired);
    assert_eq!(env.solana.withdraw_calls.load(Ordering::SeqCst), 0);
    assert_eq!(env.solana.balance(&address), Decimal::from(100));
}

#[tokio::test]
async fn pending_order_repolls_status_without_new_transfer() {
    let env = test_env(TTL);
    env.add_user("alice");
    env.seed_rate("SOL", "XRD", Decimal::from(2));

    let order = env
        .service
        .create_order("alice", sol_to_xrd(Decimal::from(5)))
        .await
        .expect("create order");
    let address = env.source_address("alice", NetworkKind::Solana);
    env.solana.fund(&address, Decimal::from(10));

    // The deposit broadcasts but is not yet committed.
    env.radix.set_deposit_status(TxStatus::Pending);

    let outcome = env
        .service
        .check_balance("alice", &order.order_id)
        .await
        .expect("check balance");
    assert_eq!(outcome.status, OrderStatus::Pending);
    let tx_hash = outcome.tx_hash.expect("pending deposit hash");

    // The chain commits; the next poll only re-queries the transaction.
    env.radix.set_tx_status(&tx_hash, TxStatus::Completed);

    let outcome = env
        .service
        .check_balance("alice", &order.order_id)
        .await
        .expect("second check");
    assert_eq!(outcome.status, OrderStatus::Completed);
    assert_eq!(env.solana.withdraw_calls.load(Ordering::SeqCst), 1);
    assert_eq!(env.radix.deposit_calls.load(Ordering::SeqCst), 1);
    assert_eq!(
        env.stored_order(&order.order_id).status,
        OrderStatus::Completed
    );
}

#[tokio::test]
async fn concurrent_creates_share_one_virtual_account() {
    let env = test_env(TTL);
    env.add_user("alice");
    env.seed_rate("SOL", "XRD", Decimal::from(2));

    let (a, b) = tokio::join!(
        env.service.create_order("alice", sol_to_xrd(Decimal::from(5))),
        env.service.create_order("alice", sol_to_xrd(Decimal::from(7))),
    );
    let a = a.expect("first order");
    let b = b.expect("second order");

    assert_ne!(a.order_id, b.order_id);
    assert_eq!(env.virtual_account_count("alice"), 1);
}

#[tokio::test]
async fn missing_rate_falls_back_to_zero_conversion() {
    let env = test_env(TTL);
    env.add_user("alice");
    // No rate seeded for the pair.

    let order = env
        .service
        .create_order("alice", sol_to_xrd(Decimal::from(5)))
        .await
        .expect("create order");

    assert!(order.rate_id.is_none());
    assert_eq!(order.converted_amount, Decimal::ZERO);
}

#[tokio::test]
async fn orders_are_invisible_to_other_users() {
    let env = test_env(TTL);
    env.add_user("alice");
    env.add_user("bob");
    env.seed_rate("SOL", "XRD", Decimal::from(2));

    let order = env
        .service
        .create_order("alice", sol_to_xrd(Decimal::from(5)))
        .await
        .expect("create order");

    let check = env.service.check_balance("bob", &order.order_id).await;
    assert!(matches!(check, Err(OrderError::NotFound(_))));
    let get = env.service.get_order("bob", &order.order_id);
    assert!(matches!(get, Err(OrderError::NotFound(_))));

    let missing = env.service.check_balance("alice", "no-such-order").await;
    assert!(matches!(missing, Err(OrderError::NotFound(_))));
}
