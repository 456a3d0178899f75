pub mod fake_bridge;

use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use rust_decimal::Decimal;
use uuid::Uuid;

use sol_radix_swap::bridge::NetworkKind;
use sol_radix_swap::order::service::{OrderService, OrderServiceConfig};
use sol_radix_swap::order::store::SqliteStore;
use sol_radix_swap::order::{ExchangeRate, Order, unix_now};
use sol_radix_swap::retry::RetryPolicy;

use self::fake_bridge::FakeBridge;

pub struct TestEnv {
    pub service: OrderService,
    pub store: Arc<Mutex<SqliteStore>>,
    pub solana: Arc<FakeBridge>,
    pub radix: Arc<FakeBridge>,
    pub store_path: PathBuf,
    _tmp: tempfile::TempDir,
}

pub fn test_env(order_ttl: Duration) -> TestEnv {
    let tmp = tempfile::tempdir().expect("create tempdir");
    let store_path = tmp.path().join("swap_store.sqlite3");
    let store = Arc::new(Mutex::new(
        SqliteStore::open(store_path.clone()).expect("open store"),
    ));

    let solana = Arc::new(FakeBridge::new(NetworkKind::Solana));
    let radix = Arc::new(FakeBridge::new(NetworkKind::Radix));

    let cfg = OrderServiceConfig {
        order_ttl,
        compensation_retry: RetryPolicy {
            attempts: 3,
            initial_backoff: Duration::from_millis(1),
            max_backoff: Duration::from_millis(2),
        },
    };

    let service = OrderService::new(cfg, solana.clone(), radix.clone(), store.clone());

    TestEnv {
        service,
        store,
        solana,
        radix,
        store_path,
        _tmp: tmp,
    }
}

impl TestEnv {
    pub fn add_user(&self, user_id: &str) {
        self.store
            .lock()
            .expect("store mutex poisoned")
            .insert_user(user_id)
            .expect("insert user");
    }

    pub fn seed_rate(&self, from_token: &str, to_token: &str, rate: Decimal) {
        self.store
            .lock()
            .expect("store mutex poisoned")
            .insert_rate(&ExchangeRate {
                rate_id: Uuid::new_v4().to_string(),
                from_token: from_token.to_string(),
                to_token: to_token.to_string(),
                rate,
                quoted_at: unix_now(),
            })
            .expect("insert rate");
    }

    pub fn source_address(&self, user_id: &str, network: NetworkKind) -> String {
        self.store
            .lock()
            .expect("store mutex poisoned")
            .get_virtual_account(user_id, network)
            .expect("get virtual account")
            .expect("virtual account missing")
            .address
    }

    pub fn stored_order(&self, order_id: &str) -> Order {
        self.store
            .lock()
            .expect("store mutex poisoned")
            .get_order(order_id)
            .expect("get order")
            .expect("order missing")
    }

    /// Shift an order's creation time into the past, for TTL tests.
    pub fn backdate_order(&self, order_id: &str, secs: i64) {
        let conn = rusqlite::Connection::open(&self.store_path).expect("open sqlite");
        conn.execute(
            "UPDATE orders SET created_at = created_at - ?1 WHERE order_id = ?2",
            rusqlite::params![secs, order_id],
        )
        .expect("backdate order");
    }

    pub fn virtual_account_count(&self, user_id: &str) -> i64 {
        let conn = rusqlite::Connection::open(&self.store_path).expect("open sqlite");
        conn.query_row(
            "SELECT COUNT(*) FROM virtual_accounts WHERE user_id = ?1",
            rusqlite::params![user_id],
            |row| row.get(0),
        )
        .expect("count virtual accounts")
    }
}
