//! End-to-end CLI tests for the catexplorer binary.

use assert_cmd::Command;
use predicates::prelude::*;
use tempfile::TempDir;

mod support;
use support::socket_guard::start_mock_server_or_skip;
use support::{api_url, mount_birds_api};

/// Binary command isolated from the user's config file and log settings.
fn catexplorer(config_home: &TempDir) -> Command {
    let mut cmd = Command::cargo_bin("catexplorer").unwrap();
    cmd.env("XDG_CONFIG_HOME", config_home.path())
        .env_remove("RUST_LOG");
    cmd
}

/// Test that --help displays usage information and exits with code 0.
#[test]
fn test_binary_help_displays_usage() {
    let home = TempDir::new().unwrap();
    catexplorer(&home)
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("Explore a wiki category tree"));
}

/// Test that --version displays version and exits with code 0.
#[test]
fn test_binary_version_displays_version() {
    let home = TempDir::new().unwrap();
    catexplorer(&home)
        .arg("--version")
        .assert()
        .success()
        .stdout(predicate::str::contains("catexplorer"));
}

/// Test that the category argument is required.
#[test]
fn test_binary_missing_category_returns_error() {
    let home = TempDir::new().unwrap();
    catexplorer(&home)
        .assert()
        .failure()
        .stderr(predicate::str::contains("CATEGORY"));
}

/// Test that invalid flags cause non-zero exit.
#[test]
fn test_binary_invalid_flag_returns_error() {
    let home = TempDir::new().unwrap();
    catexplorer(&home)
        .args(["Birds", "--invalid-flag"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("error"));
}

/// Test that a malformed config file is reported with its path.
#[test]
fn test_binary_rejects_invalid_config_file() {
    let home = TempDir::new().unwrap();
    let config = home.path().join("custom.toml");
    std::fs::write(&config, "depth = 42\n").unwrap();

    catexplorer(&home)
        .arg("Birds")
        .arg("--config")
        .arg(&config)
        .assert()
        .failure()
        .stderr(predicate::str::contains("custom.toml"));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_binary_prints_tree_and_exports_selection() {
    let Some(server) = start_mock_server_or_skip().await else {
        return;
    };
    mount_birds_api(&server).await;
    let home = TempDir::new().unwrap();

    catexplorer(&home)
        .args(["Category:Birds", "-q", "--rate-limit", "0", "-e", "11", "-s", "11"])
        .args(["-f", "txt", "--api-url", &api_url(&server)])
        .assert()
        .success()
        .stdout(predicate::str::contains("v [x] Birds of prey (1 C, 1 P) #11"))
        .stdout(predicate::str::contains("[x] Owls (0 C, 1 P) #21"))
        .stdout(predicate::str::contains("[ ] Seabirds (0 C, 2 P) #12"))
        .stdout(predicate::str::ends_with("Raptor\nBarn owl\n"));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_binary_writes_export_file() {
    let Some(server) = start_mock_server_or_skip().await else {
        return;
    };
    mount_birds_api(&server).await;
    let home = TempDir::new().unwrap();
    let out = home.path().join("seabirds");

    catexplorer(&home)
        .args(["https://en.wikipedia.org/wiki/Category:Birds", "-q", "--no-tree"])
        .args(["--rate-limit", "0", "-s", "12", "-f", "wikicode", "--api-url", &api_url(&server)])
        .arg("-o")
        .arg(&out)
        .assert()
        .success()
        .stdout(predicate::str::is_empty());

    let written = std::fs::read_to_string(home.path().join("seabirds.wiki")).unwrap();
    assert_eq!(written, "* [[Albatross]]\n* [[Puffin]]\n");
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_binary_unknown_category_fails() {
    let Some(server) = start_mock_server_or_skip().await else {
        return;
    };
    mount_birds_api(&server).await;
    let home = TempDir::new().unwrap();

    catexplorer(&home)
        .args(["Fish", "-q", "--rate-limit", "0", "--api-url", &api_url(&server)])
        .assert()
        .failure()
        .stderr(predicate::str::contains("Failed to open category 'Fish'"));
}
