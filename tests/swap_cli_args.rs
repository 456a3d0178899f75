use anyhow::{Context as _, Result};
use assert_cmd::Command;
use predicates::prelude::*;

#[test]
fn help_lists_subcommands() -> Result<()> {
    Command::cargo_bin("swap_cli")
        .context("find swap_cli binary")?
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("create-order"))
        .stdout(predicate::str::contains("check-balance"))
        .stdout(predicate::str::contains("new-account"));
    Ok(())
}

#[test]
fn create_order_requires_bridge_config() -> Result<()> {
    Command::cargo_bin("swap_cli")
        .context("find swap_cli binary")?
        .args(["create-order", "--user-id", "alice"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("--solana-treasury-address"));
    Ok(())
}

#[test]
fn store_only_commands_work_offline() -> Result<()> {
    let dir = tempfile::tempdir().context("create tempdir")?;
    let store_path = dir.path().join("swap_store.sqlite3");
    let store_arg = store_path.to_str().context("store path utf-8")?;

    Command::cargo_bin("swap_cli")
        .context("find swap_cli binary")?
        .args(["--store-path", store_arg, "add-user", "--user-id", "alice"])
        .assert()
        .success()
        .stdout(predicate::str::contains("alice"));

    Command::cargo_bin("swap_cli")
        .context("find swap_cli binary")?
        .args([
            "--store-path",
            store_arg,
            "seed-rate",
            "--from-token",
            "SOL",
            "--to-token",
            "XRD",
            "--rate",
            "2.5",
        ])
        .assert()
        .success()
        .stdout(predicate::str::contains("rate_id"));

    Command::cargo_bin("swap_cli")
        .context("find swap_cli binary")?
        .args([
            "--store-path",
            store_arg,
            "get-order",
            "--user-id",
            "alice",
            "--order-id",
            "no-such-order",
        ])
        .assert()
        .failure()
        .stderr(predicate::str::contains("order not found"));
    Ok(())
}
