use std::fs;
use std::path::PathBuf;

use assert_cmd::cargo::cargo_bin_cmd;
use predicates::prelude::*;
use tempfile::{TempDir, tempdir};

fn write_config(contents: &str) -> (TempDir, PathBuf) {
    let dir = tempdir().expect("tempdir");
    let path = dir.path().join("config.json");
    fs::write(&path, contents).expect("write json");
    (dir, path)
}

fn daily_config_json() -> &'static str {
    r#"
{
  "mode": "daily",
  "daily_time": "08:00",
  "warn_minutes": 4,
  "alert_minutes": 2,
  "blink_seconds": 10,
  "overrun_minutes": 1
}
"#
}

#[test]
fn one_shot_prints_countdown_state() {
    let (_dir, config) = write_config(daily_config_json());

    let mut cmd = cargo_bin_cmd!("countdown-kiosk");
    cmd.arg("--config")
        .arg(config)
        .arg("--timezone")
        .arg("Europe/Oslo")
        .arg("--at")
        .arg("2025-09-14T07:55:00")
        .assert()
        .success()
        .stdout(predicate::str::contains(r#""state":"countdown""#))
        .stdout(predicate::str::contains(r#""mode":"normal""#))
        .stdout(predicate::str::contains(r#""target_hhmm":"08:00""#))
        .stdout(predicate::str::contains(r#""display_ms":300000"#));
}

#[test]
fn one_shot_reports_overrun_after_target() {
    let (_dir, config) = write_config(daily_config_json());

    let mut cmd = cargo_bin_cmd!("countdown-kiosk");
    cmd.arg("--config")
        .arg(config)
        .arg("--at")
        .arg("2025-09-14T08:00:30+02:00")
        .assert()
        .success()
        .stdout(predicate::str::contains(r#""state":"overrun""#))
        .stdout(predicate::str::contains(r#""signed_display_ms":-30000"#));
}

#[test]
fn clock_mode_prints_clock_state() {
    let (_dir, config) = write_config(r#"{ "mode": "clock" }"#);

    let mut cmd = cargo_bin_cmd!("countdown-kiosk");
    cmd.arg("--config")
        .arg(config)
        .arg("--pretty")
        .assert()
        .success()
        .stdout(predicate::str::contains(r#""state": "clock""#));
}

#[test]
fn malformed_json_fails_with_clear_error() {
    let (_dir, config) = write_config("{ not-valid-json ");

    let mut cmd = cargo_bin_cmd!("countdown-kiosk");
    cmd.arg("--config")
        .arg(config)
        .assert()
        .failure()
        .stderr(predicate::str::contains("invalid JSON"));
}

#[test]
fn missing_config_fails_in_one_shot_mode() {
    let dir = tempdir().expect("tempdir");

    let mut cmd = cargo_bin_cmd!("countdown-kiosk");
    cmd.arg("--config")
        .arg(dir.path().join("absent.json"))
        .assert()
        .failure()
        .stderr(predicate::str::contains("unable to read config file"));
}

#[test]
fn check_accepts_valid_config() {
    let (_dir, config) = write_config(daily_config_json());

    let mut cmd = cargo_bin_cmd!("countdown-kiosk");
    cmd.arg("--check")
        .arg("--config")
        .arg(config)
        .assert()
        .success()
        .stdout(predicate::str::contains("config ok"));
}

#[test]
fn check_rejects_unknown_mode() {
    let (_dir, config) = write_config(r#"{ "mode": "weekly" }"#);

    let mut cmd = cargo_bin_cmd!("countdown-kiosk");
    cmd.arg("--check")
        .arg("--config")
        .arg(config)
        .assert()
        .failure()
        .stderr(predicate::str::contains("mode 'weekly'"));
}

#[test]
fn check_rejects_out_of_range_daily_time() {
    let (_dir, config) = write_config(r#"{ "mode": "daily", "daily_time": "24:30" }"#);

    let mut cmd = cargo_bin_cmd!("countdown-kiosk");
    cmd.arg("--check")
        .arg("--config")
        .arg(config)
        .assert()
        .failure()
        .stderr(predicate::str::contains("outside 00:00-23:59"));
}

#[test]
fn diagnostics_succeeds_with_valid_config() {
    let (_dir, config) = write_config(daily_config_json());

    let mut cmd = cargo_bin_cmd!("countdown-kiosk");
    cmd.arg("--diagnostics")
        .arg("--config")
        .arg(config)
        .assert()
        .success()
        .stdout(predicate::str::contains("Selected timing source: SYSTEM_MONOTONIC"))
        .stdout(predicate::str::contains("Benchmark summary"));
}

#[test]
fn diagnostics_reports_frozen_clock() {
    let (_dir, config) = write_config(daily_config_json());

    let mut cmd = cargo_bin_cmd!("countdown-kiosk");
    cmd.arg("--diagnostics")
        .arg("--config")
        .arg(config)
        .arg("--at")
        .arg("2025-09-14T07:55:00+02:00")
        .assert()
        .success()
        .stdout(predicate::str::contains("Selected timing source: MANUAL"))
        .stdout(predicate::str::contains("Clock frozen at"))
        .stdout(predicate::str::contains("(08:00)"));
}

#[test]
fn diagnostics_reports_malformed_daily_time() {
    let (_dir, config) = write_config(r#"{ "mode": "daily", "daily_time": "9am" }"#);

    let mut cmd = cargo_bin_cmd!("countdown-kiosk");
    cmd.arg("--diagnostics")
        .arg("--config")
        .arg(config)
        .assert()
        .success()
        .stdout(predicate::str::contains("Resolution error: daily time '9am' must be HH:MM"))
        .stdout(predicate::str::contains("Resolved target: none"));
}

#[test]
fn watch_stops_after_count() {
    let (_dir, config) = write_config(daily_config_json());

    let mut cmd = cargo_bin_cmd!("countdown-kiosk");
    let output = cmd
        .arg("--watch")
        .arg("--count")
        .arg("2")
        .arg("--interval-ms")
        .arg("10")
        .arg("--config")
        .arg(config)
        .arg("--at")
        .arg("2025-09-14T07:59:55+02:00")
        .output()
        .expect("run watch");

    assert!(output.status.success());
    let stdout = String::from_utf8(output.stdout).expect("utf8 stdout");
    let lines: Vec<&str> = stdout.lines().collect();
    assert_eq!(lines.len(), 2);
    for line in lines {
        assert!(line.contains(r#""blink":true"#), "unexpected line {line}");
    }
}

#[test]
fn watch_survives_missing_config() {
    let dir = tempdir().expect("tempdir");

    let mut cmd = cargo_bin_cmd!("countdown-kiosk");
    cmd.arg("--watch")
        .arg("--count")
        .arg("1")
        .arg("--interval-ms")
        .arg("10")
        .arg("--config")
        .arg(dir.path().join("absent.json"))
        .assert()
        .success()
        .stdout(predicate::str::contains(r#""state":"idle""#))
        .stderr(predicate::str::contains("config unavailable"));
}

#[test]
fn unknown_timezone_fails() {
    let (_dir, config) = write_config(daily_config_json());

    let mut cmd = cargo_bin_cmd!("countdown-kiosk");
    cmd.arg("--config")
        .arg(config)
        .arg("--timezone")
        .arg("Mars/Olympus")
        .assert()
        .failure()
        .stderr(predicate::str::contains("unknown time zone"));
}

#[test]
fn zero_interval_is_rejected() {
    let (_dir, config) = write_config(daily_config_json());

    let mut cmd = cargo_bin_cmd!("countdown-kiosk");
    cmd.arg("--watch")
        .arg("--interval-ms")
        .arg("0")
        .arg("--config")
        .arg(config)
        .assert()
        .failure()
        .stderr(predicate::str::contains("--interval-ms must be greater than zero"));
}
