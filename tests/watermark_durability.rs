//! Watermark durability tests
//!
//! - A committed watermark survives reopen
//! - A torn, garbled or hand-edited file is an error, never the default
//! - A crash at any point of a cycle leaves the watermark at the last
//!   committed batch, and a rerun finishes the work
//!
//! Crash tests run the real binary with `CHRONOSYNC_CRASH_POINT` set;
//! the process aborts at the named point.

use std::fs;
use std::path::{Path, PathBuf};
use std::process::{Command, Output};

use chronosync::position::Position;
use chronosync::sync::{FileSkipJournal, JOURNAL_FILE};
use chronosync::watermark::{
    watermark_path, FileWatermarkStore, WatermarkCell, WatermarkError, WatermarkStore,
};
use tempfile::TempDir;

// =============================================================================
// Test Utilities
// =============================================================================

const BINARY: &str = env!("CARGO_BIN_EXE_chronosync");

/// Config with three inline records (one unusable) and a memory target
fn write_config(dir: &Path) -> PathBuf {
    let state_dir = dir.join("state");
    let config = serde_json::json!({
        "connector_id": "crash-test",
        "state_dir": state_dir,
        "source": {
            "kind": "memory",
            "records": [
                {"position": 101, "fields": {"amount": 10}},
                {"position": 102, "fields": {"note": "no amount"}},
                {"position": 103, "fields": {"amount": 30}}
            ]
        },
        "target": {"kind": "memory"},
        "fields": [{"name": "total", "formula": "amount * 1.1"}],
        "sync": {"initial_position": 100}
    });
    let path = dir.join("chronosync.json");
    fs::write(&path, serde_json::to_string_pretty(&config).unwrap()).unwrap();
    path
}

fn run_binary(args: &[&str], config: &Path, crash_point: Option<&str>) -> Output {
    let mut command = Command::new(BINARY);
    command.args(args).arg("--config").arg(config);
    command.env_remove("CHRONOSYNC_CRASH_POINT");
    if let Some(point) = crash_point {
        command.env("CHRONOSYNC_CRASH_POINT", point);
    }
    command.output().expect("failed to spawn chronosync")
}

fn persisted(dir: &Path) -> Option<Position> {
    FileWatermarkStore::in_dir(&dir.join("state"), Position::ZERO)
        .read_document()
        .unwrap()
        .map(|doc| doc.position)
}

fn journal_positions(dir: &Path) -> Vec<Option<Position>> {
    FileSkipJournal::read_all(dir.join("state").join(JOURNAL_FILE))
        .unwrap()
        .iter()
        .map(|e| e.record.position)
        .collect()
}

// =============================================================================
// File store
// =============================================================================

#[test]
fn test_committed_watermark_survives_reopen() {
    let dir = TempDir::new().unwrap();
    {
        let store = FileWatermarkStore::in_dir(dir.path(), Position::ZERO);
        let mut cell = WatermarkCell::load(Box::new(store)).unwrap();
        assert!(cell.advance(Position::new(50)).unwrap());
        assert!(cell.advance(Position::new(75)).unwrap());
    }

    let store = FileWatermarkStore::in_dir(dir.path(), Position::ZERO);
    assert_eq!(store.load().unwrap(), Position::new(75));
}

#[test]
fn test_cell_rejects_regression_without_touching_disk() {
    let dir = TempDir::new().unwrap();
    let store = FileWatermarkStore::in_dir(dir.path(), Position::ZERO);
    let mut cell = WatermarkCell::load(Box::new(store)).unwrap();
    cell.advance(Position::new(10)).unwrap();

    let err = cell.advance(Position::new(9)).unwrap_err();
    assert!(matches!(err, WatermarkError::Regression { .. }));
    assert!(err.is_fatal());
    assert!(!cell.advance(Position::new(10)).unwrap());

    let store = FileWatermarkStore::in_dir(dir.path(), Position::ZERO);
    assert_eq!(store.load().unwrap(), Position::new(10));
}

#[test]
fn test_truncated_file_is_corrupt() {
    let dir = TempDir::new().unwrap();
    let store = FileWatermarkStore::in_dir(dir.path(), Position::ZERO);
    store.commit(Position::new(12)).unwrap();

    let full = fs::read(store.path()).unwrap();
    fs::write(store.path(), &full[..full.len() / 2]).unwrap();

    assert!(matches!(store.load(), Err(WatermarkError::Corrupt { .. })));
}

#[test]
fn test_empty_file_is_corrupt() {
    let dir = TempDir::new().unwrap();
    fs::write(watermark_path(dir.path()), "").unwrap();
    let store = FileWatermarkStore::in_dir(dir.path(), Position::new(3));
    assert!(matches!(store.load(), Err(WatermarkError::Corrupt { .. })));
}

#[test]
fn test_commit_creates_missing_state_dir() {
    let dir = TempDir::new().unwrap();
    let nested = dir.path().join("a").join("b");
    let store = FileWatermarkStore::in_dir(&nested, Position::ZERO);
    store.commit(Position::new(1)).unwrap();
    assert!(watermark_path(&nested).exists());
}

// =============================================================================
// Crash consistency through the binary
// =============================================================================

#[test]
fn test_crash_before_commit_leaves_watermark_then_rerun_completes() {
    let dir = TempDir::new().unwrap();
    let config = write_config(dir.path());

    let crashed = run_binary(&["once"], &config, Some("sync_before_commit"));
    assert!(!crashed.status.success());
    assert_eq!(persisted(dir.path()), None);

    let rerun = run_binary(&["once"], &config, None);
    assert!(
        rerun.status.success(),
        "stderr: {}",
        String::from_utf8_lossy(&rerun.stderr)
    );
    assert_eq!(persisted(dir.path()), Some(Position::new(103)));
}

#[test]
fn test_crash_after_delivery_leaves_watermark() {
    let dir = TempDir::new().unwrap();
    let config = write_config(dir.path());

    let crashed = run_binary(&["once"], &config, Some("sync_after_delivery"));
    assert!(!crashed.status.success());
    assert_eq!(persisted(dir.path()), None);
    assert!(journal_positions(dir.path()).is_empty());
}

#[test]
fn test_crash_before_rename_keeps_previous_file() {
    let dir = TempDir::new().unwrap();
    let config = write_config(dir.path());

    let crashed = run_binary(&["once"], &config, Some("watermark_before_rename"));
    assert!(!crashed.status.success());
    assert_eq!(persisted(dir.path()), None);

    let rerun = run_binary(&["once"], &config, None);
    assert!(rerun.status.success());
    assert_eq!(persisted(dir.path()), Some(Position::new(103)));
}

#[test]
fn test_crash_after_commit_is_already_durable() {
    let dir = TempDir::new().unwrap();
    let config = write_config(dir.path());

    let crashed = run_binary(&["once"], &config, Some("sync_after_commit"));
    assert!(!crashed.status.success());
    assert_eq!(persisted(dir.path()), Some(Position::new(103)));

    let rerun = run_binary(&["once"], &config, None);
    assert!(rerun.status.success());
    let stdout = String::from_utf8_lossy(&rerun.stdout);
    assert!(stdout.contains("no_new_records"), "stdout: {}", stdout);
}

#[test]
fn test_skip_is_journaled_before_commit() {
    let dir = TempDir::new().unwrap();
    let config = write_config(dir.path());

    let crashed = run_binary(&["once"], &config, Some("journal_after_append"));
    assert!(!crashed.status.success());
    assert_eq!(journal_positions(dir.path()), vec![Some(Position::new(102))]);
    assert_eq!(persisted(dir.path()), None);

    // the rerun journals the skip again; entries are at-least-once
    let rerun = run_binary(&["once"], &config, None);
    assert!(rerun.status.success());
    assert_eq!(persisted(dir.path()), Some(Position::new(103)));
    assert_eq!(
        journal_positions(dir.path()),
        vec![Some(Position::new(102)), Some(Position::new(102))]
    );
}

#[test]
fn test_status_reports_committed_watermark() {
    let dir = TempDir::new().unwrap();
    let config = write_config(dir.path());

    let before = run_binary(&["status"], &config, None);
    assert!(before.status.success());
    assert!(String::from_utf8_lossy(&before.stdout).contains(r#""persisted":false"#));

    assert!(run_binary(&["once"], &config, None).status.success());

    let after = run_binary(&["status"], &config, None);
    let stdout = String::from_utf8_lossy(&after.stdout);
    let line = stdout
        .lines()
        .rev()
        .find(|l| l.contains(r#""status":"ok""#))
        .unwrap();
    let response: serde_json::Value = serde_json::from_str(line).unwrap();
    assert_eq!(response["data"]["watermark"], 103);
    assert_eq!(response["data"]["skipped_records"], 1);
}

#[test]
fn test_corrupt_watermark_fails_startup() {
    let dir = TempDir::new().unwrap();
    let config = write_config(dir.path());
    fs::create_dir_all(dir.path().join("state")).unwrap();
    fs::write(watermark_path(&dir.path().join("state")), "not json").unwrap();

    let output = run_binary(&["once"], &config, None);
    assert!(!output.status.success());
    assert!(String::from_utf8_lossy(&output.stderr).contains("SYNC_PERSISTENCE"));
}
