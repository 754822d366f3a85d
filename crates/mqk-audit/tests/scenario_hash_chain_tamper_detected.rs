//! Audit hash chain integrity.
//!
//! GREEN when:
//! - Writing 5 diagnostic records with hash_chain=true, then verifying, succeeds.
//! - Rewriting line 3's event message is detected as a hash_self mismatch.
//! - Deleting a line is detected.
//! - An empty log verifies cleanly.

use mqk_audit::{verify_hash_chain, AuditWriter, VerifyResult};
use mqk_schemas::{DiagnosticEvent, EventSource, HookName, Severity, StrategyId};
use serde_json::json;
use std::path::{Path, PathBuf};
use uuid::Uuid;

fn event(i: usize) -> DiagnosticEvent {
    DiagnosticEvent::new(
        Severity::High,
        EventSource::NotifierMisuse,
        StrategyId::new(format!("s-{i}")),
        HookName::OnStop,
        format!("notify_high expects 2 argument(s), got {i}"),
    )
}

fn write_five(dir: &Path) -> PathBuf {
    let path = dir.join("audit.jsonl");
    let mut writer = AuditWriter::new(&path, Uuid::new_v4(), true).unwrap();
    for i in 0..5 {
        writer.append(event(i)).unwrap();
    }
    path
}

#[test]
fn untampered_chain_verifies_valid() {
    let dir = tempfile::tempdir().unwrap();
    let path = write_five(dir.path());

    assert_eq!(
        verify_hash_chain(&path).unwrap(),
        VerifyResult::Valid { lines: 5 }
    );
}

#[test]
fn tampered_message_detected() {
    let dir = tempfile::tempdir().unwrap();
    let path = write_five(dir.path());

    let content = std::fs::read_to_string(&path).unwrap();
    let mut lines: Vec<String> = content.lines().map(str::to_string).collect();
    let mut rec: serde_json::Value = serde_json::from_str(&lines[2]).unwrap();
    rec["event"]["message"] = json!("nothing to see here");
    lines[2] = serde_json::to_string(&rec).unwrap();
    std::fs::write(&path, lines.join("\n") + "\n").unwrap();

    match verify_hash_chain(&path).unwrap() {
        VerifyResult::Broken { line, reason } => {
            assert_eq!(line, 3, "{reason}");
            assert!(reason.contains("hash_self mismatch"), "{reason}");
        }
        VerifyResult::Valid { lines } => {
            panic!("tampered chain verified as valid ({lines} lines)")
        }
    }
}

#[test]
fn deleted_line_detected() {
    let dir = tempfile::tempdir().unwrap();
    let path = write_five(dir.path());

    let content = std::fs::read_to_string(&path).unwrap();
    let kept: Vec<&str> = content
        .lines()
        .enumerate()
        .filter(|(i, _)| *i != 2)
        .map(|(_, l)| l)
        .collect();
    std::fs::write(&path, kept.join("\n") + "\n").unwrap();

    match verify_hash_chain(&path).unwrap() {
        VerifyResult::Broken { line, reason } => {
            assert_eq!(line, 3, "{reason}");
            assert!(reason.contains("seq gap"), "{reason}");
        }
        VerifyResult::Valid { lines } => {
            panic!("chain with deleted line verified as valid ({lines} lines)")
        }
    }
}

#[test]
fn empty_log_is_valid() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("empty.jsonl");
    std::fs::write(&path, "").unwrap();

    assert_eq!(
        verify_hash_chain(&path).unwrap(),
        VerifyResult::Valid { lines: 0 }
    );
}
