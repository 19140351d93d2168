// CLI surface checks: help output, config handling, roster seeding

use assert_cmd::Command;
use predicates::prelude::*;
use std::fs;
use tempfile::TempDir;

const LEGACY_ENV: &[&str] = &[
    "UAA_TARGET",
    "UAA_USER",
    "UAA_PASSWORD",
    "CAPI_TARGET",
    "CAPI_USER",
    "CAPI_PASSWORD",
    "USER_KEEPALIVE",
    "DEFAULT_PASSWORD",
    "CSV_FILE",
];

/// Binary run from an empty directory with no inherited configuration.
fn boulder(dir: &TempDir) -> Command {
    let mut cmd = Command::cargo_bin("boulder").unwrap();
    cmd.current_dir(dir.path()).env("BOULDER_OBSERVABILITY__JSON", "false");
    for name in LEGACY_ENV {
        cmd.env_remove(name);
    }
    cmd
}

#[test]
fn test_help_lists_commands() {
    let dir = TempDir::new().unwrap();
    boulder(&dir)
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("run"))
        .stdout(predicate::str::contains("reconcile"))
        .stdout(predicate::str::contains("plan"))
        .stdout(predicate::str::contains("roster"))
        .stdout(predicate::str::contains("config"));
}

#[test]
fn test_config_show_redacts_secrets() {
    let dir = TempDir::new().unwrap();
    boulder(&dir)
        .args(["config", "show"])
        .env("DEFAULT_PASSWORD", "super-secret")
        .env("BOULDER_LIFECYCLE__RETENTION", "48h")
        .assert()
        .success()
        .stdout(predicate::str::contains("retention = \"48h\""))
        .stdout(predicate::str::contains("[REDACTED]"))
        .stdout(predicate::str::contains("super-secret").not());
}

#[test]
fn test_config_file_is_read() {
    let dir = TempDir::new().unwrap();
    fs::write(
        dir.path().join("custom.toml"),
        "[lifecycle]\nretention = \"6h\"\npoll_interval_seconds = 15\n",
    )
    .unwrap();

    boulder(&dir)
        .args(["--config", "custom.toml", "config", "show"])
        .assert()
        .success()
        .stdout(predicate::str::contains("retention = \"6h\""))
        .stdout(predicate::str::contains("poll_interval_seconds = 15"));
}

#[test]
fn test_unparsable_retention_is_fatal() {
    let dir = TempDir::new().unwrap();
    boulder(&dir)
        .arg("plan")
        .env("USER_KEEPALIVE", "forever")
        .assert()
        .failure()
        .stderr(predicate::str::contains("retention"));
}

#[test]
fn test_missing_roster_is_fatal() {
    let dir = TempDir::new().unwrap();
    boulder(&dir)
        .arg("plan")
        .env("UAA_TARGET", "http://127.0.0.1:9")
        .env("CAPI_TARGET", "http://127.0.0.1:9")
        .env("CSV_FILE", "absent.csv")
        .assert()
        .failure()
        .stderr(predicate::str::contains("absent.csv"));
}

#[test]
fn test_reconcile_requires_baseline_password() {
    let dir = TempDir::new().unwrap();
    boulder(&dir)
        .arg("reconcile")
        .env("UAA_TARGET", "http://127.0.0.1:9")
        .env("CAPI_TARGET", "http://127.0.0.1:9")
        .assert()
        .failure()
        .stderr(predicate::str::contains("baseline_password"));
}

#[test]
fn test_roster_seed_creates_file() {
    let dir = TempDir::new().unwrap();
    boulder(&dir)
        .args(["roster", "seed", "3", "--file", "users.csv"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Added 3 entries"));

    let contents = fs::read_to_string(dir.path().join("users.csv")).unwrap();
    let mut lines = contents.lines();
    assert_eq!(lines.next(), Some("FirstName,LastName,Email,DateStart"));
    assert_eq!(lines.count(), 3);

    boulder(&dir)
        .args(["roster", "seed", "2", "--file", "users.csv"])
        .assert()
        .success();
    let contents = fs::read_to_string(dir.path().join("users.csv")).unwrap();
    assert_eq!(contents.lines().count(), 6);
}
