#![allow(clippy::unwrap_used, clippy::expect_used)]

use assert_cmd::Command;
use predicates::prelude::*;

const RESULT_LINE: &str = r"^RANKS=\d+ SIZE=\d+ RUNS=\d+ AVG_TIME=\d+\.\d{3} ms\n$";

fn halogrid() -> Command {
    let mut cmd = Command::cargo_bin("halogrid").unwrap();
    cmd.env_remove("RUST_LOG").env_remove("HALOGRID_WORKERS");
    cmd
}

#[test]
fn prints_exactly_the_result_line() {
    halogrid()
        .args(["64", "2"])
        .assert()
        .success()
        .stdout(predicate::str::is_match(RESULT_LINE).unwrap())
        .stdout(predicate::str::starts_with("RANKS=4 SIZE=64 RUNS=2 "));
}

#[test]
fn defaults_to_one_run() {
    halogrid()
        .args(["16"])
        .assert()
        .success()
        .stdout(predicate::str::starts_with("RANKS=4 SIZE=16 RUNS=1 "));
}

#[test]
fn worker_count_from_flag_and_environment() {
    halogrid()
        .args(["30", "1", "--workers", "6"])
        .assert()
        .success()
        .stdout(predicate::str::starts_with("RANKS=6 SIZE=30 "));
    halogrid()
        .env("HALOGRID_WORKERS", "3")
        .args(["30"])
        .assert()
        .success()
        .stdout(predicate::str::starts_with("RANKS=3 SIZE=30 "));
}

#[test]
fn verify_passes_for_every_kernel_mode() {
    for extra in [
        &["--kernel", "sobel"][..],
        &["--kernel", "identity"],
        &["--threaded"],
        &["--pattern", "diagonal"],
    ] {
        halogrid()
            .args(["40", "3", "--workers", "9", "--verify"])
            .args(extra)
            .assert()
            .success();
    }
}

#[test]
fn json_report_follows_the_result_line() {
    let output = halogrid()
        .args(["32", "3", "--json"])
        .assert()
        .success()
        .get_output()
        .stdout
        .clone();
    let stdout = String::from_utf8(output).unwrap();
    let (line, json) = stdout.split_once('\n').unwrap();
    assert!(line.starts_with("RANKS=4 SIZE=32 RUNS=3"));

    let report: serde_json::Value = serde_json::from_str(json).unwrap();
    assert_eq!(report["geometry"]["size"], 32);
    assert_eq!(report["geometry"]["grid_rows"], 2);
    assert_eq!(report["config"]["iterations"], 3);
    assert_eq!(report["iterations"].as_array().unwrap().len(), 3);
    assert_eq!(report["summary"]["iterations"], 3);
}

#[test]
fn writes_the_result_image() {
    let path = std::env::temp_dir().join(format!("halogrid-cli-{}.png", std::process::id()));
    halogrid()
        .args(["24", "1", "--output"])
        .arg(&path)
        .assert()
        .success();
    let bytes = std::fs::read(&path).unwrap();
    std::fs::remove_file(&path).unwrap();
    assert_eq!(&bytes[..8], b"\x89PNG\r\n\x1a\n");
}

#[test]
fn reads_the_input_image() {
    let dir = std::env::temp_dir();
    let input = dir.join(format!("halogrid-in-{}.png", std::process::id()));
    let output = dir.join(format!("halogrid-out-{}.png", std::process::id()));
    halogrid()
        .args(["20", "1", "--kernel", "identity", "--output"])
        .arg(&input)
        .assert()
        .success();

    halogrid()
        .args(["1000", "1", "--verify", "--input"])
        .arg(&input)
        .arg("--output")
        .arg(&output)
        .assert()
        .success()
        .stdout(predicate::str::starts_with("RANKS=4 SIZE=20 "));
    let written = std::fs::metadata(&output).map(|m| m.len());
    std::fs::remove_file(&input).unwrap();
    std::fs::remove_file(&output).unwrap();
    assert!(written.unwrap() > 0);
}

#[test]
fn image_smaller_than_the_grid_is_rejected() {
    halogrid()
        .args(["3", "1", "--workers", "16"])
        .assert()
        .failure()
        .stdout(predicate::str::is_empty())
        .stderr(predicate::str::contains("halogrid:"));
}

#[test]
fn size_below_the_stencil_is_a_usage_error() {
    halogrid().args(["2"]).assert().failure();
    halogrid().args(["8", "0"]).assert().failure();
}

#[test]
fn missing_input_file_is_reported() {
    halogrid()
        .args(["--input", "/nonexistent/halogrid.png"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("/nonexistent/halogrid.png"));
}

#[cfg(not(feature = "mpi"))]
#[test]
fn mpi_backend_needs_the_feature() {
    halogrid()
        .args(["--backend", "mpi"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("--features mpi"));
}
