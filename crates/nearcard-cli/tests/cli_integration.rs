//! CLI Integration Tests
//!
//! These tests verify the CLI commands work correctly end-to-end.
//! They test the "wiring" between the CLI and the core library.

use assert_cmd::Command;
use predicates::prelude::*;
use tempfile::TempDir;

/// Create a CLI command with a temporary data directory
fn cli_cmd(data_dir: &TempDir) -> Command {
    let mut cmd = Command::cargo_bin("nearcard").expect("Failed to find nearcard binary");
    cmd.arg("--data-dir").arg(data_dir.path());
    cmd
}

// ============================================================================
// Info Command Tests
// ============================================================================

#[test]
fn test_info_command() {
    let data_dir = TempDir::new().unwrap();

    cli_cmd(&data_dir)
        .arg("info")
        .assert()
        .success()
        .stdout(predicate::str::contains("Nearcard"))
        .stdout(predicate::str::contains("Data directory:"))
        .stdout(predicate::str::contains("Accepted contacts: 0"));
}

#[test]
fn test_info_without_profile() {
    let data_dir = TempDir::new().unwrap();

    cli_cmd(&data_dir)
        .arg("info")
        .assert()
        .success()
        .stdout(predicate::str::contains("not set"));
}

// ============================================================================
// Profile Command Tests
// ============================================================================

#[test]
fn test_profile_show_before_set() {
    let data_dir = TempDir::new().unwrap();

    cli_cmd(&data_dir)
        .args(["profile", "show"])
        .assert()
        .success()
        .stdout(predicate::str::contains("No profile set"));
}

#[test]
fn test_profile_set_then_show() {
    let data_dir = TempDir::new().unwrap();

    cli_cmd(&data_dir)
        .args(["profile", "set", "Pinar Olguc", "pinar@domain.com"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Profile saved."));

    cli_cmd(&data_dir)
        .args(["profile", "show"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Pinar Olguc"))
        .stdout(predicate::str::contains("pinar@domain.com"));
}

#[test]
fn test_profile_set_with_optional_fields() {
    let data_dir = TempDir::new().unwrap();

    cli_cmd(&data_dir)
        .args([
            "profile",
            "set",
            "Pinar Olguc",
            "pinar@domain.com",
            "--phone",
            "+90 216 645 56 32",
            "--job",
            "iOS Developer",
        ])
        .assert()
        .success();

    cli_cmd(&data_dir)
        .args(["profile", "show"])
        .assert()
        .success()
        .stdout(predicate::str::contains("+90 216 645 56 32"))
        .stdout(predicate::str::contains("iOS Developer"));
}

#[test]
fn test_profile_overwrite_drops_old_optionals() {
    let data_dir = TempDir::new().unwrap();

    cli_cmd(&data_dir)
        .args([
            "profile",
            "set",
            "Pinar Olguc",
            "pinar@domain.com",
            "--job",
            "iOS Developer",
        ])
        .assert()
        .success();

    cli_cmd(&data_dir)
        .args(["profile", "set", "Pinar Olguc", "pinar@newdomain.com"])
        .assert()
        .success();

    cli_cmd(&data_dir)
        .args(["profile", "show"])
        .assert()
        .success()
        .stdout(predicate::str::contains("pinar@newdomain.com"))
        .stdout(predicate::str::contains("iOS Developer").not());
}

#[test]
fn test_profile_set_requires_email() {
    let data_dir = TempDir::new().unwrap();

    cli_cmd(&data_dir)
        .args(["profile", "set", "Pinar Olguc"])
        .assert()
        .failure();
}

// ============================================================================
// Contacts Command Tests
// ============================================================================

#[test]
fn test_contacts_list_empty() {
    let data_dir = TempDir::new().unwrap();

    cli_cmd(&data_dir)
        .args(["contacts", "list"])
        .assert()
        .success()
        .stdout(predicate::str::contains("No accepted contacts."));
}

#[test]
fn test_contacts_show_absent() {
    let data_dir = TempDir::new().unwrap();

    cli_cmd(&data_dir)
        .args(["contacts", "show", "Ghost"])
        .assert()
        .success()
        .stdout(predicate::str::contains("No contact named 'Ghost'"));
}

#[test]
fn test_contacts_remove_absent_succeeds() {
    let data_dir = TempDir::new().unwrap();

    cli_cmd(&data_dir)
        .args(["contacts", "remove", "Ghost"])
        .assert()
        .success();
}

// ============================================================================
// Demo Command Tests
// ============================================================================

#[test]
fn test_demo_exchanges_and_persists_card() {
    let data_dir = TempDir::new().unwrap();

    cli_cmd(&data_dir)
        .args(["profile", "set", "Pinar Olguc", "pinar@domain.com"])
        .assert()
        .success();

    cli_cmd(&data_dir)
        .args(["demo", "--peer-name", "Studio Phone"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Discovered peer: Studio Phone"))
        .stdout(predicate::str::contains("Card received from Studio Phone"))
        .stdout(predicate::str::contains("Contact saved: Studio Phone"))
        .stdout(predicate::str::contains("Accepted card:"));

    // The accepted card survives into a fresh invocation
    cli_cmd(&data_dir)
        .args(["contacts", "list"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Studio Phone"))
        .stdout(predicate::str::contains("them@example.com"));

    cli_cmd(&data_dir)
        .args(["contacts", "show", "Studio Phone"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Product Designer"));
}

#[test]
fn test_demo_then_remove_contact() {
    let data_dir = TempDir::new().unwrap();

    cli_cmd(&data_dir)
        .args(["demo"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Contact saved: Their Phone"));

    cli_cmd(&data_dir)
        .args(["contacts", "remove", "Their Phone"])
        .assert()
        .success();

    cli_cmd(&data_dir)
        .args(["contacts", "list"])
        .assert()
        .success()
        .stdout(predicate::str::contains("No accepted contacts."));
}

// ============================================================================
// Help and Version Tests
// ============================================================================

#[test]
fn test_help_lists_commands() {
    Command::cargo_bin("nearcard")
        .unwrap()
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("profile"))
        .stdout(predicate::str::contains("contacts"))
        .stdout(predicate::str::contains("demo"));
}

#[test]
fn test_version() {
    Command::cargo_bin("nearcard")
        .unwrap()
        .arg("--version")
        .assert()
        .success()
        .stdout(predicate::str::contains("0.1.0"));
}
