use std::path::{Path, PathBuf};
use std::str::FromStr as _;
use std::time::Duration;

use anyhow::{Context as _, Result};
use rusqlite::{Connection, OptionalExtension as _, params};
use rust_decimal::Decimal;

use crate::bridge::{NetworkKind, Secret};

use super::{ExchangeRate, Order, OrderStatus, VirtualAccount};

#[derive(Debug)]
pub struct SqliteStore {
    conn: Connection,
    path: PathBuf,
}

impl SqliteStore {
    pub fn open(path: PathBuf) -> Result<Self> {
        if let Some(dir) = path.parent()
            && !dir.as_os_str().is_empty()
        {
            std::fs::create_dir_all(dir)
                .with_context(|| format!("create store dir {}", dir.display()))?;
        }

        let conn =
            Connection::open(&path).with_context(|| format!("open sqlite {}", path.display()))?;
        conn.busy_timeout(Duration::from_secs(5))
            .context("set sqlite busy_timeout")?;
        conn.execute_batch("PRAGMA journal_mode = WAL; PRAGMA foreign_keys = ON;")
            .context("configure sqlite pragmas")?;

        migrate(&conn).context("migrate sqlite schema")?;

        Ok(Self { conn, path })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn insert_user(&mut self, user_id: &str) -> Result<()> {
        self.conn
            .execute(
                "INSERT OR IGNORE INTO users (user_id) VALUES (?1)",
                params![user_id],
            )
            .with_context(|| format!("insert user {user_id}"))?;
        Ok(())
    }

    pub fn user_exists(&self, user_id: &str) -> Result<bool> {
        let row: Option<i64> = self
            .conn
            .query_row(
                "SELECT 1 FROM users WHERE user_id = ?1",
                params![user_id],
                |row| row.get(0),
            )
            .optional()
            .with_context(|| format!("check user {user_id}"))?;
        Ok(row.is_some())
    }

    /// Insert a freshly provisioned account. Returns `false` when the
    /// UNIQUE(user_id, network) constraint fires, meaning a concurrent
    /// request already created the row; the caller re-reads instead of
    /// erroring.
    pub fn insert_virtual_account(&mut self, account: &VirtualAccount) -> Result<bool> {
        let outcome = self.conn.execute(
            r#"
INSERT INTO virtual_accounts (
  user_id,
  network,
  public_key,
  secret_key,
  seed_phrase,
  address,
  created_at
) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
"#,
            params![
                &account.user_id,
                account.network.as_str(),
                &account.public_key,
                account.secret_key.expose(),
                account.seed_phrase.as_ref().map(|s| s.expose().to_string()),
                &account.address,
                account.created_at,
            ],
        );

        match outcome {
            Ok(_) => Ok(true),
            Err(rusqlite::Error::SqliteFailure(e, _))
                if e.code == rusqlite::ErrorCode::ConstraintViolation =>
            {
                Ok(false)
            }
            Err(e) => Err(e).with_context(|| {
                format!(
                    "insert virtual account ({}, {})",
                    account.user_id, account.network
                )
            }),
        }
    }

    pub fn get_virtual_account(
        &self,
        user_id: &str,
        network: NetworkKind,
    ) -> Result<Option<VirtualAccount>> {
        self.conn
            .query_row(
                r#"
SELECT
  user_id,
  network,
  public_key,
  secret_key,
  seed_phrase,
  address,
  created_at
FROM virtual_accounts
WHERE user_id = ?1 AND network = ?2
"#,
                params![user_id, network.as_str()],
                |row| {
                    let network_str: String = row.get(1)?;
                    let secret: String = row.get(3)?;
                    let seed: Option<String> = row.get(4)?;
                    Ok(VirtualAccount {
                        user_id: row.get(0)?,
                        network: network_from_str(&network_str, 1)?,
                        public_key: row.get(2)?,
                        secret_key: Secret::new(secret),
                        seed_phrase: seed.map(Secret::new),
                        address: row.get(5)?,
                        created_at: row.get(6)?,
                    })
                },
            )
            .optional()
            .with_context(|| format!("get virtual account ({user_id}, {network})"))
    }

    pub fn insert_order(&mut self, order: &Order) -> Result<()> {
        self.conn
            .execute(
                r#"
INSERT INTO orders (
  order_id,
  user_id,
  from_token,
  to_token,
  from_network,
  to_network,
  amount,
  converted_amount,
  destination_address,
  rate_id,
  status,
  tx_hash,
  created_at,
  version
) VALUES (
  ?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14
)
"#,
                params![
                    &order.order_id,
                    &order.user_id,
                    &order.from_token,
                    &order.to_token,
                    order.from_network.as_str(),
                    order.to_network.as_str(),
                    order.amount.to_string(),
                    order.converted_amount.to_string(),
                    &order.destination_address,
                    &order.rate_id,
                    status_to_str(order.status),
                    &order.tx_hash,
                    order.created_at,
                    order.version,
                ],
            )
            .with_context(|| format!("insert order {}", order.order_id))?;
        Ok(())
    }

    pub fn get_order(&self, order_id: &str) -> Result<Option<Order>> {
        self.conn
            .query_row(
                r#"
SELECT
  order_id,
  user_id,
  from_token,
  to_token,
  from_network,
  to_network,
  amount,
  converted_amount,
  destination_address,
  rate_id,
  status,
  tx_hash,
  created_at,
  version
FROM orders
WHERE order_id = ?1
"#,
                params![order_id],
                |row| {
                    let from_network: String = row.get(4)?;
                    let to_network: String = row.get(5)?;
                    let amount: String = row.get(6)?;
                    let converted: String = row.get(7)?;
                    let status: String = row.get(10)?;
                    Ok(Order {
                        order_id: row.get(0)?,
                        user_id: row.get(1)?,
                        from_token: row.get(2)?,
                        to_token: row.get(3)?,
                        from_network: network_from_str(&from_network, 4)?,
                        to_network: network_from_str(&to_network, 5)?,
                        amount: decimal_from_str(&amount, 6)?,
                        converted_amount: decimal_from_str(&converted, 7)?,
                        destination_address: row.get(8)?,
                        rate_id: row.get(9)?,
                        status: status_from_str(&status, 10)?,
                        tx_hash: row.get(11)?,
                        created_at: row.get(12)?,
                        version: row.get(13)?,
                    })
                },
            )
            .optional()
            .with_context(|| format!("get order {order_id}"))
    }

    /// Compare-and-swap status update keyed on the order's version. Returns
    /// `false` when a concurrent writer already bumped the version; the
    /// caller re-reads and reports instead of overwriting. A set tx_hash is
    /// kept if the update carries none.
    pub fn update_order_status(
        &mut self,
        order_id: &str,
        status: OrderStatus,
        tx_hash: Option<&str>,
        expected_version: i64,
    ) -> Result<bool> {
        let rows = self
            .conn
            .execute(
                r#"
UPDATE orders
SET status = ?2, tx_hash = COALESCE(?3, tx_hash), version = version + 1
WHERE order_id = ?1 AND version = ?4
"#,
                params![order_id, status_to_str(status), tx_hash, expected_version],
            )
            .with_context(|| format!("update order status {order_id}"))?;
        Ok(rows == 1)
    }

    pub fn insert_rate(&mut self, rate: &ExchangeRate) -> Result<()> {
        self.conn
            .execute(
                r#"
INSERT INTO exchange_rates (rate_id, from_token, to_token, rate, quoted_at)
VALUES (?1, ?2, ?3, ?4, ?5)
"#,
                params![
                    &rate.rate_id,
                    &rate.from_token,
                    &rate.to_token,
                    rate.rate.to_string(),
                    rate.quoted_at,
                ],
            )
            .with_context(|| format!("insert rate {}", rate.rate_id))?;
        Ok(())
    }

    /// Most recent rate for a token pair, if any has ever been recorded.
    pub fn latest_rate(&self, from_token: &str, to_token: &str) -> Result<Option<ExchangeRate>> {
        self.conn
            .query_row(
                r#"
SELECT rate_id, from_token, to_token, rate, quoted_at
FROM exchange_rates
WHERE from_token = ?1 AND to_token = ?2
ORDER BY quoted_at DESC, rate_id DESC
LIMIT 1
"#,
                params![from_token, to_token],
                |row| {
                    let rate: String = row.get(3)?;
                    Ok(ExchangeRate {
                        rate_id: row.get(0)?,
                        from_token: row.get(1)?,
                        to_token: row.get(2)?,
                        rate: decimal_from_str(&rate, 3)?,
                        quoted_at: row.get(4)?,
                    })
                },
            )
            .optional()
            .with_context(|| format!("latest rate {from_token}->{to_token}"))
    }
}

fn migrate(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        r#"
CREATE TABLE IF NOT EXISTS users (
  user_id TEXT PRIMARY KEY
);
CREATE TABLE IF NOT EXISTS virtual_accounts (
  user_id TEXT NOT NULL,
  network TEXT NOT NULL,
  public_key TEXT NOT NULL,
  secret_key TEXT NOT NULL,
  seed_phrase TEXT,
  address TEXT NOT NULL,
  created_at INTEGER NOT NULL,
  UNIQUE(user_id, network)
);
CREATE TABLE IF NOT EXISTS orders (
  order_id TEXT PRIMARY KEY,
  user_id TEXT NOT NULL,
  from_token TEXT NOT NULL,
  to_token TEXT NOT NULL,
  from_network TEXT NOT NULL,
  to_network TEXT NOT NULL,
  amount TEXT NOT NULL,
  converted_amount TEXT NOT NULL,
  destination_address TEXT NOT NULL,
  rate_id TEXT,
  status TEXT NOT NULL,
  tx_hash TEXT,
  created_at INTEGER NOT NULL,
  version INTEGER NOT NULL DEFAULT 0
);
CREATE INDEX IF NOT EXISTS orders_user_idx ON orders(user_id);
CREATE INDEX IF NOT EXISTS orders_status_idx ON orders(status);
CREATE TABLE IF NOT EXISTS exchange_rates (
  rate_id TEXT PRIMARY KEY,
  from_token TEXT NOT NULL,
  to_token TEXT NOT NULL,
  rate TEXT NOT NULL,
  quoted_at INTEGER NOT NULL
);
CREATE INDEX IF NOT EXISTS exchange_rates_pair_idx ON exchange_rates(from_token, to_token, quoted_at);
"#,
    )
    .context("create tables")?;
    Ok(())
}

fn status_to_str(status: OrderStatus) -> &'static str {
    match status {
        OrderStatus::InsufficientFunds => "insufficient_funds",
        OrderStatus::Pending => "pending",
        OrderStatus::SufficientFunds => "sufficient_funds",
        OrderStatus::Completed => "completed",
        OrderStatus::Canceled => "canceled",
        OrderStatus::Expired => "expired",
        OrderStatus::NotFound => "not_found",
    }
}

fn status_from_str(s: &str, col: usize) -> rusqlite::Result<OrderStatus> {
    match s {
        "insufficient_funds" => Ok(OrderStatus::InsufficientFunds),
        "pending" => Ok(OrderStatus::Pending),
        "sufficient_funds" => Ok(OrderStatus::SufficientFunds),
        "completed" => Ok(OrderStatus::Completed),
        "canceled" => Ok(OrderStatus::Canceled),
        "expired" => Ok(OrderStatus::Expired),
        "not_found" => Ok(OrderStatus::NotFound),
        other => Err(rusqlite::Error::FromSqlConversionFailure(
            col,
            rusqlite::types::Type::Text,
            format!("unknown order status: {other}").into(),
        )),
    }
}

fn network_from_str(s: &str, col: usize) -> rusqlite::Result<NetworkKind> {
    NetworkKind::from_str(s).map_err(|_| {
        rusqlite::Error::FromSqlConversionFailure(
            col,
            rusqlite::types::Type::Text,
            format!("unknown network: {s}").into(),
        )
    })
}

fn decimal_from_str(s: &str, col: usize) -> rusqlite::Result<Decimal> {
    Decimal::from_str(s).map_err(|_| {
        rusqlite::Error::FromSqlConversionFailure(
            col,
            rusqlite::types::Type::Text,
            format!("invalid decimal: {s}").into(),
        )
    })
}
