//! Integration tests for the cudi command handlers
//!
//! Each test drives `run` against an in-memory store, the way `main` drives
//! it against the configured one.

use cudi_cli::{default_backup_name, run, CliResult, Command};
use cudi_identity::storage::MemoryStore;
use cudi_identity::{IdentityError, IdentityManager, IdentityStore};
use std::path::PathBuf;

const TEST_ITERATIONS: u32 = 1_000;

/// A fresh manager over `store`, as a new process would see it
fn manager(store: &MemoryStore) -> IdentityManager {
    IdentityManager::new(IdentityStore::new(store.clone()), TEST_ITERATIONS)
}

async fn run_command(store: &MemoryStore, command: Command) -> (CliResult<()>, String) {
    let mut out = Vec::new();
    let result = run(command, &mut manager(store), &mut out).await;
    (result, String::from_utf8(out).unwrap())
}

fn peer_id_line(output: &str) -> String {
    output
        .lines()
        .find(|line| line.starts_with("Peer id:"))
        .expect("output has a peer id")
        .to_string()
}

fn export(out: PathBuf, password: &str) -> Command {
    Command::Export {
        out: Some(out),
        password: password.to_string(),
        confirm: password.to_string(),
    }
}

fn restore(file: PathBuf, password: &str) -> Command {
    Command::Restore {
        file,
        password: password.to_string(),
        force: false,
    }
}

#[tokio::test]
async fn show_without_identity_points_to_onboarding() {
    let store = MemoryStore::new();
    let (result, output) = run_command(&store, Command::Show { json: false }).await;

    assert!(result.is_ok());
    assert!(output.contains("No identity"));
}

#[tokio::test]
async fn create_then_show() {
    let store = MemoryStore::new();
    let (result, created) = run_command(&store, Command::Create { force: false }).await;
    assert!(result.is_ok());
    assert!(created.contains("Created new identity."));

    let (result, shown) = run_command(&store, Command::Show { json: false }).await;
    assert!(result.is_ok());
    assert_eq!(peer_id_line(&shown), peer_id_line(&created));
}

#[tokio::test]
async fn show_json_reports_identity_info() {
    let store = MemoryStore::new();
    run_command(&store, Command::Create { force: false }).await.0.unwrap();

    let (result, output) = run_command(&store, Command::Show { json: true }).await;
    assert!(result.is_ok());

    let info: serde_json::Value = serde_json::from_str(&output).unwrap();
    let peer_id = info["peer_id"].as_str().unwrap();
    let public_key = info["public_key"].as_str().unwrap();
    assert_eq!(peer_id.len(), 36);
    assert!(public_key.starts_with(peer_id));
    assert_eq!(info["is_new"], false);
}

#[tokio::test]
async fn create_does_not_replace_without_force() {
    let store = MemoryStore::new();
    let (_, first) = run_command(&store, Command::Create { force: false }).await;

    let (result, _) = run_command(&store, Command::Create { force: false }).await;
    assert!(result.unwrap_err().to_string().contains("--force"));

    let (_, shown) = run_command(&store, Command::Show { json: false }).await;
    assert_eq!(peer_id_line(&shown), peer_id_line(&first));

    let (result, replaced) = run_command(&store, Command::Create { force: true }).await;
    assert!(result.is_ok());
    assert_ne!(peer_id_line(&replaced), peer_id_line(&first));
}

#[tokio::test]
async fn export_and_restore_on_another_device() {
    let dir = tempfile::tempdir().unwrap();
    let backup = dir.path().join("backup.json");

    let laptop = MemoryStore::new();
    let (_, created) = run_command(&laptop, Command::Create { force: false }).await;
    let (result, output) = run_command(&laptop, export(backup.clone(), "hunter2")).await;
    assert!(result.is_ok());
    assert!(output.contains("backup.json"));

    let contents: serde_json::Value =
        serde_json::from_str(&std::fs::read_to_string(&backup).unwrap()).unwrap();
    for field in ["encryptedData", "salt", "iv"] {
        assert!(contents[field].is_string(), "missing {field}");
    }
    assert_eq!(contents["iterations"], TEST_ITERATIONS);

    let phone = MemoryStore::new();
    let (result, restored) = run_command(&phone, restore(backup, "hunter2")).await;
    assert!(result.is_ok());
    assert_eq!(peer_id_line(&restored), peer_id_line(&created));

    let (_, shown) = run_command(&phone, Command::Show { json: false }).await;
    assert_eq!(peer_id_line(&shown), peer_id_line(&created));
}

#[tokio::test]
async fn restore_with_wrong_password_fails() {
    let dir = tempfile::tempdir().unwrap();
    let backup = dir.path().join("backup.json");

    let laptop = MemoryStore::new();
    run_command(&laptop, Command::Create { force: false }).await.0.unwrap();
    run_command(&laptop, export(backup.clone(), "hunter2")).await.0.unwrap();

    let phone = MemoryStore::new();
    let (result, _) = run_command(&phone, restore(backup, "hunter3")).await;
    let err = result.unwrap_err();
    assert!(matches!(
        err.downcast_ref::<IdentityError>(),
        Some(IdentityError::AuthenticationFailure)
    ));

    let (_, shown) = run_command(&phone, Command::Show { json: false }).await;
    assert!(shown.contains("No identity"));
}

#[tokio::test]
async fn restore_rejects_plain_key_file() {
    let dir = tempfile::tempdir().unwrap();
    let file = dir.path().join("key.txt");
    std::fs::write(&file, "eyJuIjoiYWJjIn0\n").unwrap();

    let (result, _) = run_command(&MemoryStore::new(), restore(file, "pw")).await;
    let err = result.unwrap_err();
    assert!(matches!(
        err.downcast_ref::<IdentityError>(),
        Some(IdentityError::UnsupportedBackupFormat { .. })
    ));
}

#[tokio::test]
async fn export_checks_confirmation_and_existing_files() {
    let dir = tempfile::tempdir().unwrap();
    let backup = dir.path().join("backup.json");
    let store = MemoryStore::new();
    run_command(&store, Command::Create { force: false }).await.0.unwrap();

    let mismatched = Command::Export {
        out: Some(backup.clone()),
        password: "one".to_string(),
        confirm: "two".to_string(),
    };
    let (result, _) = run_command(&store, mismatched).await;
    assert!(result.is_err());
    assert!(!backup.exists());

    run_command(&store, export(backup.clone(), "pw")).await.0.unwrap();
    let (result, _) = run_command(&store, export(backup, "pw")).await;
    assert!(result.is_err());
}

#[tokio::test]
async fn export_without_identity_fails() {
    let dir = tempfile::tempdir().unwrap();
    let (result, _) = run_command(&MemoryStore::new(), export(dir.path().join("b.json"), "pw")).await;
    let err = result.unwrap_err();
    assert!(matches!(
        err.downcast_ref::<IdentityError>(),
        Some(IdentityError::NoIdentity)
    ));
}

#[tokio::test]
async fn reset_requires_confirmation() {
    let store = MemoryStore::new();
    run_command(&store, Command::Create { force: false }).await.0.unwrap();

    let (result, _) = run_command(&store, Command::Reset { yes: false }).await;
    assert!(result.is_err());
    let (_, shown) = run_command(&store, Command::Show { json: false }).await;
    assert!(shown.contains("Peer id:"));

    let (result, _) = run_command(&store, Command::Reset { yes: true }).await;
    assert!(result.is_ok());
    let (_, shown) = run_command(&store, Command::Show { json: false }).await;
    assert!(shown.contains("No identity"));
}

#[test]
fn default_backup_name_is_dated() {
    let name = default_backup_name();
    assert!(name.starts_with("cudi_identity_"));
    assert!(name.ends_with(".json"));
    assert_eq!(name.len(), "cudi_identity_YYYY-MM-DD.json".len());
}
