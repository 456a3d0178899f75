use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use anyhow::{Context as _, Result};
use clap::{Parser as _, Subcommand};
use rust_decimal::Decimal;
use serde_json::json;
use uuid::Uuid;

use sol_radix_swap::bridge::{ChainBridge, NetworkKind, Secret};
use sol_radix_swap::order::service::{CreateOrderRequest, OrderService, OrderServiceConfig};
use sol_radix_swap::order::store::SqliteStore;
use sol_radix_swap::order::{ExchangeRate, unix_now};
use sol_radix_swap::radix::RadixNetwork;
use sol_radix_swap::radix::bridge::{RadixBridge, RadixBridgeConfig};
use sol_radix_swap::solana::bridge::{SolanaBridge, SolanaBridgeConfig};

#[derive(Debug, clap::Parser)]
struct Args {
    #[arg(long, default_value = "swap_store.sqlite3")]
    store_path: PathBuf,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, clap::Args)]
struct BridgeArgs {
    #[arg(long, default_value = "https://api.devnet.solana.com")]
    solana_rpc_url: String,

    #[arg(long)]
    solana_treasury_address: String,

    #[arg(long)]
    solana_treasury_key: String,

    #[arg(long, default_value = "http://127.0.0.1:8080")]
    radix_gateway_url: String,

    #[arg(long, default_value = "stokenet")]
    radix_network: String,

    #[arg(long)]
    radix_xrd_resource: String,

    #[arg(long)]
    radix_treasury_address: String,

    #[arg(long)]
    radix_treasury_public_key: String,

    #[arg(long)]
    radix_treasury_key: String,

    #[arg(long, default_value_t = 30)]
    rpc_timeout_secs: u64,

    #[arg(long, default_value_t = 600)]
    order_ttl_secs: u64,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Register a user id the orchestrator will accept orders from.
    AddUser {
        #[arg(long)]
        user_id: String,
    },
    /// Record an exchange rate for a token pair.
    SeedRate {
        #[arg(long)]
        from_token: String,

        #[arg(long)]
        to_token: String,

        #[arg(long)]
        rate: Decimal,
    },
    /// Provision the user's custodial account on a network ahead of a first
    /// order.
    NewAccount {
        #[arg(long)]
        user_id: String,

        #[arg(long, value_parser = parse_network)]
        network: NetworkKind,

        #[command(flatten)]
        bridges: BridgeArgs,
    },
    CreateOrder {
        #[arg(long)]
        user_id: String,

        #[arg(long)]
        from_token: String,

        #[arg(long)]
        to_token: String,

        #[arg(long)]
        from_network: String,

        #[arg(long)]
        to_network: String,

        #[arg(long)]
        amount: Decimal,

        #[arg(long)]
        destination_address: String,

        #[command(flatten)]
        bridges: BridgeArgs,
    },
    CheckBalance {
        #[arg(long)]
        user_id: String,

        #[arg(long)]
        order_id: String,

        #[command(flatten)]
        bridges: BridgeArgs,
    },
    GetOrder {
        #[arg(long)]
        user_id: String,

        #[arg(long)]
        order_id: String,
    },
}

fn parse_network(s: &str) -> Result<NetworkKind, String> {
    s.parse::<NetworkKind>().map_err(|e| e.to_string())
}

#[tokio::main]
async fn main() -> Result<()> {
    sol_radix_swap::logging::init().ok();
    let args = Args::parse();

    let store = SqliteStore::open(args.store_path).context("open sqlite store")?;
    let store = Arc::new(Mutex::new(store));

    let out = match args.command {
        Command::AddUser { user_id } => {
            store
                .lock()
                .expect("store mutex poisoned")
                .insert_user(&user_id)
                .context("insert user")?;
            json!({ "user_id": user_id })
        }
        Command::SeedRate {
            from_token,
            to_token,
            rate,
        } => {
            let record = ExchangeRate {
                rate_id: Uuid::new_v4().to_string(),
                from_token,
                to_token,
                rate,
                quoted_at: unix_now(),
            };
            store
                .lock()
                .expect("store mutex poisoned")
                .insert_rate(&record)
                .context("insert rate")?;
            json!({
              "rate_id": record.rate_id,
              "from_token": record.from_token,
              "to_token": record.to_token,
              "rate": record.rate,
            })
        }
        Command::NewAccount {
            user_id,
            network,
            bridges,
        } => {
            let service = build_service(store.clone(), &bridges).context("build order service")?;
            let (account, created) = service
                .ensure_virtual_account(&user_id, network)
                .await
                .context("ensure virtual account")?;
            json!({
              "user_id": account.user_id,
              "network": account.network,
              "address": account.address,
              "created": created,
            })
        }
        Command::CreateOrder {
            user_id,
            from_token,
            to_token,
            from_network,
            to_network,
            amount,
            destination_address,
            bridges,
        } => {
            let service = build_service(store.clone(), &bridges).context("build order service")?;
            let order = service
                .create_order(
                    &user_id,
                    CreateOrderRequest {
                        from_token,
                        to_token,
                        from_network,
                        to_network,
                        amount,
                        destination_address,
                    },
                )
                .await
                .context("create order")?;
            serde_json::to_value(&order).context("encode order")?
        }
        Command::CheckBalance {
            user_id,
            order_id,
            bridges,
        } => {
            let service = build_service(store.clone(), &bridges).context("build order service")?;
            let outcome = service
                .check_balance(&user_id, &order_id)
                .await
                .context("check balance")?;
            serde_json::to_value(&outcome).context("encode outcome")?
        }
        Command::GetOrder { user_id, order_id } => {
            let order = store
                .lock()
                .expect("store mutex poisoned")
                .get_order(&order_id)
                .context("get order")?
                .filter(|order| order.user_id == user_id)
                .context("order not found")?;
            serde_json::to_value(&order).context("encode order")?
        }
    };

    println!("{}", serde_json::to_string_pretty(&out)?);
    Ok(())
}

fn build_service(store: Arc<Mutex<SqliteStore>>, args: &BridgeArgs) -> Result<OrderService> {
    let rpc_timeout = Duration::from_secs(args.rpc_timeout_secs);

    let solana = SolanaBridge::new(SolanaBridgeConfig {
        rpc_url: args.solana_rpc_url.clone(),
        treasury_address: args.solana_treasury_address.clone(),
        treasury_key: Secret::new(args.solana_treasury_key.clone()),
        rpc_timeout,
    })
    .context("build solana bridge")?;

    let radix = RadixBridge::new(RadixBridgeConfig {
        gateway_url: args.radix_gateway_url.clone(),
        network: RadixNetwork::parse(&args.radix_network),
        xrd_resource_address: args.radix_xrd_resource.clone(),
        treasury_address: args.radix_treasury_address.clone(),
        treasury_public_key: args.radix_treasury_public_key.clone(),
        treasury_key: Secret::new(args.radix_treasury_key.clone()),
        http_timeout: rpc_timeout,
    })
    .context("build radix bridge")?;

    let cfg = OrderServiceConfig {
        order_ttl: Duration::from_secs(args.order_ttl_secs),
        ..OrderServiceConfig::default()
    };

    Ok(OrderService::new(
        cfg,
        Arc::new(solana) as Arc<dyn ChainBridge>,
        Arc::new(radix) as Arc<dyn ChainBridge>,
        store,
    ))
}
