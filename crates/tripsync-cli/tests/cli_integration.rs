//! CLI Integration Tests
//!
//! These tests run the `tripsync` binary end-to-end against a temporary data
//! directory, checking the wiring between the CLI and the core library.

use assert_cmd::Command;
use predicates::prelude::*;
use tempfile::TempDir;

// ============================================================================
// Test Utilities
// ============================================================================

/// CLI command with a temporary data directory and a fixed session
fn cli_cmd(data_dir: &TempDir) -> Command {
    session_cmd(data_dir, "test-trip")
}

fn session_cmd(data_dir: &TempDir, session: &str) -> Command {
    let mut cmd = Command::cargo_bin("tripsync").expect("Failed to find tripsync binary");
    cmd.env_remove("TRIPSYNC_SESSION_ID")
        .env_remove("RUST_LOG")
        .arg("--data-dir")
        .arg(data_dir.path())
        .arg("--session")
        .arg(session);
    cmd
}

/// Extract a record id from CLI output (format: "  ID: <ulid>")
fn extract_id(output: &str) -> Option<String> {
    output
        .lines()
        .find_map(|line| line.strip_prefix("  ID: "))
        .map(|id| id.trim().to_string())
}

fn run_for_id(data_dir: &TempDir, args: &[&str]) -> String {
    let output = cli_cmd(data_dir).args(args).output().unwrap();
    assert!(output.status.success(), "command {:?} failed", args);
    extract_id(&String::from_utf8_lossy(&output.stdout)).expect("output carries an id")
}

// ============================================================================
// Identity
// ============================================================================

#[test]
fn test_whoami_is_stable() {
    let data_dir = TempDir::new().unwrap();

    let first = cli_cmd(&data_dir).arg("whoami").output().unwrap();
    let second = cli_cmd(&data_dir).arg("whoami").output().unwrap();

    let first = String::from_utf8_lossy(&first.stdout).to_string();
    assert!(first.contains("Identity: anon_"));
    assert_eq!(first, String::from_utf8_lossy(&second.stdout));
}

#[test]
fn test_whoami_with_token() {
    let data_dir = TempDir::new().unwrap();

    cli_cmd(&data_dir)
        .args(["--token", "secret", "whoami"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Identity: user_"))
        .stdout(predicate::str::contains("secret").not());
}

#[test]
fn test_missing_session_is_reported() {
    let data_dir = TempDir::new().unwrap();

    Command::cargo_bin("tripsync")
        .unwrap()
        .env_remove("TRIPSYNC_SESSION_ID")
        .arg("--data-dir")
        .arg(data_dir.path())
        .args(["checklist", "ls"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("TRIPSYNC_SESSION_ID"));
}

// ============================================================================
// Checklist
// ============================================================================

#[test]
fn test_checklist_add_list_remove() {
    let data_dir = TempDir::new().unwrap();

    let id = run_for_id(&data_dir, &["checklist", "add", "Passport"]);

    cli_cmd(&data_dir)
        .args(["checklist", "ls"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Checklist (1):"))
        .stdout(predicate::str::contains("Passport"));

    cli_cmd(&data_dir)
        .args(["checklist", "rm", &id])
        .assert()
        .success()
        .stdout(predicate::str::contains("Removed item"));

    // Second removal is harmless
    cli_cmd(&data_dir)
        .args(["checklist", "rm", &id])
        .assert()
        .success()
        .stdout(predicate::str::contains("already removed"));

    cli_cmd(&data_dir)
        .args(["checklist", "ls"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Checklist is empty."));
}

#[test]
fn test_blank_item_rejected() {
    let data_dir = TempDir::new().unwrap();

    cli_cmd(&data_dir)
        .args(["checklist", "add", "   "])
        .assert()
        .failure()
        .stderr(predicate::str::contains("Invalid input"));
}

#[test]
fn test_sessions_do_not_share_lists() {
    let data_dir = TempDir::new().unwrap();
    run_for_id(&data_dir, &["checklist", "add", "Snorkel"]);

    session_cmd(&data_dir, "other-trip")
        .args(["checklist", "ls"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Checklist is empty."));
}

// ============================================================================
// Expenses
// ============================================================================

#[test]
fn test_expense_total() {
    let data_dir = TempDir::new().unwrap();
    run_for_id(&data_dir, &["expense", "add", "Dinner", "42.50"]);
    run_for_id(&data_dir, &["expense", "add", "Taxi", "7.5"]);

    cli_cmd(&data_dir)
        .args(["expense", "ls"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Dinner"))
        .stdout(predicate::str::contains("42.50"))
        .stdout(predicate::str::contains("Total: 50.00"));
}

#[test]
fn test_non_numeric_amount_rejected() {
    let data_dir = TempDir::new().unwrap();

    cli_cmd(&data_dir)
        .args(["expense", "add", "Dinner", "abc"])
        .assert()
        .failure();

    cli_cmd(&data_dir)
        .args(["expense", "ls"])
        .assert()
        .success()
        .stdout(predicate::str::contains("No expenses yet."));
}

// ============================================================================
// Announcements
// ============================================================================

#[test]
fn test_announcement_post_and_list() {
    let data_dir = TempDir::new().unwrap();
    run_for_id(&data_dir, &["announce", "post", "Bus leaves at 7"]);

    cli_cmd(&data_dir)
        .args(["announce", "ls"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Bus leaves at 7"));
}

// ============================================================================
// Polls
// ============================================================================

#[test]
fn test_poll_vote_once() {
    let data_dir = TempDir::new().unwrap();
    let id = run_for_id(
        &data_dir,
        &["poll", "create", "Beach or Mountains?", "Beach", "Mountains"],
    );

    cli_cmd(&data_dir)
        .args(["poll", "vote", &id, "1"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Vote recorded."));

    cli_cmd(&data_dir)
        .args(["poll", "vote", &id, "2"])
        .assert()
        .success()
        .stdout(predicate::str::contains("already voted"));

    cli_cmd(&data_dir)
        .args(["poll", "ls"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Beach or Mountains? (voted)"))
        .stdout(predicate::str::is_match(r"1\. Beach\s+#{20} 1").unwrap())
        .stdout(predicate::str::is_match(r"2\. Mountains\s+0").unwrap());
}

#[test]
fn test_two_members_both_counted() {
    let data_dir = TempDir::new().unwrap();
    let id = run_for_id(&data_dir, &["poll", "create", "Pizza?", "Yes", "No"]);

    for token in ["alice", "bob"] {
        cli_cmd(&data_dir)
            .args(["--token", token, "poll", "vote", &id, "1"])
            .assert()
            .success();
    }

    cli_cmd(&data_dir)
        .args(["poll", "ls"])
        .assert()
        .success()
        .stdout(predicate::str::is_match(r"1\. Yes\s+#{20} 2").unwrap());
}

#[test]
fn test_poll_needs_two_options() {
    let data_dir = TempDir::new().unwrap();

    cli_cmd(&data_dir)
        .args(["poll", "create", "Lonely?", "Yes", " "])
        .assert()
        .failure()
        .stderr(predicate::str::contains("at least two options"));
}

#[test]
fn test_option_zero_rejected() {
    let data_dir = TempDir::new().unwrap();
    let id = run_for_id(&data_dir, &["poll", "create", "Q?", "A", "B"]);

    cli_cmd(&data_dir)
        .args(["poll", "vote", &id, "0"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("numbered from 1"));
}

// ============================================================================
// Demo
// ============================================================================

#[test]
fn test_demo_shows_both_clients() {
    let data_dir = TempDir::new().unwrap();

    cli_cmd(&data_dir)
        .arg("demo")
        .assert()
        .success()
        .stdout(predicate::str::contains("Passport"))
        .stdout(predicate::str::contains("Sunscreen"))
        .stdout(predicate::str::is_match(r"1\. Beach\s+#{20} 2").unwrap());
}

#[test]
fn test_jsonl_logs_written() {
    let data_dir = TempDir::new().unwrap();
    let logs = data_dir.path().join("logs");

    cli_cmd(&data_dir)
        .arg("-v")
        .arg("--log-dir")
        .arg(&logs)
        .args(["checklist", "add", "Hat"])
        .assert()
        .success();

    let files: Vec<_> = std::fs::read_dir(&logs).unwrap().collect();
    assert_eq!(files.len(), 1);
    let content = std::fs::read_to_string(files[0].as_ref().unwrap().path()).unwrap();
    assert!(content.contains("\"msg\":\"Record created\""));
}
