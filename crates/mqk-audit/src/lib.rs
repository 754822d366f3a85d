//! mqk-audit
//!
//! Append-only JSONL log of Diagnostic Events, one record per line, with an
//! optional SHA-256 hash chain over canonical (sorted-key) JSON.

use anyhow::{anyhow, Context, Result};
use mqk_schemas::DiagnosticEvent;
use mqk_strategy::DiagnosticSink;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use sha2::{Digest, Sha256};
use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use uuid::Uuid;

/// Namespace for record ids; ids are UUIDv5 over run id, chain state and seq.
const RECORD_ID_NAMESPACE: Uuid = Uuid::from_u128(0x6d71_6b2d_6175_6469_742d_7265_636f_7264);

/// Append-only audit writer.
pub struct AuditWriter {
    path: PathBuf,
    run_id: Uuid,
    hash_chain: bool,
    last_hash: Option<String>,
    /// Number of records in the log; the next record's `seq`.
    seq: u64,
}

impl AuditWriter {
    /// Creates the writer and ensures parent dirs exist. Does not truncate.
    pub fn new(path: impl AsRef<Path>, run_id: Uuid, hash_chain: bool) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).with_context(|| format!("create_dir_all {:?}", parent))?;
        }

        Ok(Self {
            path,
            run_id,
            hash_chain,
            last_hash: None,
            seq: 0,
        })
    }

    /// Open an existing log and continue its chain (after a restart).
    /// A missing file starts a fresh log.
    pub fn resume(path: impl AsRef<Path>, run_id: Uuid, hash_chain: bool) -> Result<Self> {
        let mut w = Self::new(path, run_id, hash_chain)?;
        if w.path.exists() {
            let records = read_records(&w.path)?;
            if let Some(last) = records.last() {
                w.seq = last.seq + 1;
                w.last_hash = last.hash_self.clone();
            }
        }
        Ok(w)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn last_hash(&self) -> Option<&str> {
        self.last_hash.as_deref()
    }

    pub fn seq(&self) -> u64 {
        self.seq
    }

    /// Append one event and return the record as written.
    pub fn append(&mut self, event: DiagnosticEvent) -> Result<AuditRecord> {
        let record_id = derive_record_id(self.run_id, self.last_hash.as_deref(), self.seq);

        let mut rec = AuditRecord {
            record_id,
            run_id: self.run_id,
            seq: self.seq,
            event,
            hash_prev: None,
            hash_self: None,
        };

        if self.hash_chain {
            rec.hash_prev = self.last_hash.clone();
            rec.hash_self = Some(compute_record_hash(&rec)?);
        }

        let line = canonical_json_line(&rec)?;
        append_line(&self.path, &line)?;

        // Only advance once the line is on disk.
        self.seq += 1;
        if self.hash_chain {
            self.last_hash = rec.hash_self.clone();
        }
        Ok(rec)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuditRecord {
    pub record_id: Uuid,
    pub run_id: Uuid,
    pub seq: u64,
    pub event: DiagnosticEvent,
    pub hash_prev: Option<String>,
    pub hash_self: Option<String>,
}

fn derive_record_id(run_id: Uuid, last_hash: Option<&str>, seq: u64) -> Uuid {
    let name = format!("{run_id}|{}|{seq}", last_hash.unwrap_or("-"));
    Uuid::new_v5(&RECORD_ID_NAMESPACE, name.as_bytes())
}

/// Write a single line to file (with trailing newline).
fn append_line(path: &Path, line: &str) -> Result<()> {
    let mut f = OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .with_context(|| format!("open audit log {:?}", path))?;
    let mut buf = String::with_capacity(line.len() + 1);
    buf.push_str(line);
    buf.push('\n');
    f.write_all(buf.as_bytes())
        .with_context(|| format!("write audit log {:?}", path))?;
    Ok(())
}

/// Sorted-key compact JSON; one record == one line.
pub fn canonical_json_line<T: Serialize>(v: &T) -> Result<String> {
    let raw = serde_json::to_value(v).context("serialize audit record failed")?;
    serde_json::to_string(&sort_keys(&raw)).context("json stringify failed")
}

fn sort_keys(v: &Value) -> Value {
    match v {
        Value::Object(map) => {
            let mut entries: Vec<_> = map.iter().collect();
            entries.sort_by(|a, b| a.0.cmp(b.0));
            Value::Object(
                entries
                    .into_iter()
                    .map(|(k, v)| (k.clone(), sort_keys(v)))
                    .collect(),
            )
        }
        Value::Array(arr) => Value::Array(arr.iter().map(sort_keys).collect()),
        _ => v.clone(),
    }
}

/// SHA-256 over the canonical JSON of the record without `hash_self`.
pub fn compute_record_hash(rec: &AuditRecord) -> Result<String> {
    let mut clone = rec.clone();
    clone.hash_self = None;

    let canonical = canonical_json_line(&clone)?;
    let mut hasher = Sha256::new();
    hasher.update(canonical.as_bytes());
    Ok(hex::encode(hasher.finalize()))
}

/// Parse every record of a log file. Blank lines are skipped.
pub fn read_records(path: impl AsRef<Path>) -> Result<Vec<AuditRecord>> {
    let content = fs::read_to_string(path.as_ref())
        .with_context(|| format!("read audit log {:?}", path.as_ref()))?;
    content
        .lines()
        .enumerate()
        .filter(|(_, l)| !l.trim().is_empty())
        .map(|(i, l)| {
            serde_json::from_str(l.trim())
                .with_context(|| format!("parse audit record at line {}", i + 1))
        })
        .collect()
}

/// Result of hash chain verification.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum VerifyResult {
    Valid { lines: usize },
    Broken { line: usize, reason: String },
}

pub fn verify_hash_chain(path: impl AsRef<Path>) -> Result<VerifyResult> {
    let content = fs::read_to_string(path.as_ref())
        .with_context(|| format!("read audit log {:?}", path.as_ref()))?;
    verify_hash_chain_str(&content)
}

/// Same as [`verify_hash_chain`] on in-memory JSONL content.
///
/// A line that does not parse is reported as a break, not an error.
pub fn verify_hash_chain_str(content: &str) -> Result<VerifyResult> {
    let mut prev_hash: Option<String> = None;
    let mut expected_seq = 0u64;
    let mut line_count = 0usize;

    for (i, line) in content.lines().enumerate() {
        let trimmed = line.trim();
        if trimmed.is_empty() {
            continue;
        }

        let rec: AuditRecord = match serde_json::from_str(trimmed) {
            Ok(rec) => rec,
            Err(e) => {
                return Ok(VerifyResult::Broken {
                    line: i + 1,
                    reason: format!("unparseable record: {e}"),
                })
            }
        };
        line_count += 1;

        if rec.seq != expected_seq {
            return Ok(VerifyResult::Broken {
                line: i + 1,
                reason: format!("seq gap: expected {expected_seq}, got {}", rec.seq),
            });
        }

        if rec.hash_prev != prev_hash {
            return Ok(VerifyResult::Broken {
                line: i + 1,
                reason: format!(
                    "hash_prev mismatch: expected {:?}, got {:?}",
                    prev_hash, rec.hash_prev
                ),
            });
        }

        if let Some(ref claimed) = rec.hash_self {
            let recomputed = compute_record_hash(&rec)?;
            if *claimed != recomputed {
                return Ok(VerifyResult::Broken {
                    line: i + 1,
                    reason: format!("hash_self mismatch: claimed {claimed}, recomputed {recomputed}"),
                });
            }
        }

        prev_hash = rec.hash_self.clone();
        expected_seq = rec.seq + 1;
    }

    Ok(VerifyResult::Valid { lines: line_count })
}

// ---------------------------------------------------------------------------
// Settings
// ---------------------------------------------------------------------------

/// `/audit/*` settings.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct AuditSettings {
    /// `None` disables the audit log.
    pub path: Option<PathBuf>,
    pub hash_chain: bool,
}

impl Default for AuditSettings {
    fn default() -> Self {
        Self {
            path: None,
            hash_chain: true,
        }
    }
}

impl AuditSettings {
    pub const CONFIG_POINTERS: &'static [&'static str] = &["/audit/path", "/audit/hash_chain"];

    pub fn from_config_json(cfg: &Value) -> Result<Self> {
        let mut out = Self::default();
        if let Some(v) = cfg.pointer("/audit/path") {
            let p = v.as_str().context("audit.path must be a string")?;
            if p.trim().is_empty() {
                return Err(anyhow!("audit.path must not be empty"));
            }
            out.path = Some(PathBuf::from(p));
        }
        if let Some(v) = cfg.pointer("/audit/hash_chain") {
            out.hash_chain = v.as_bool().context("audit.hash_chain must be a boolean")?;
        }
        Ok(out)
    }
}

// ---------------------------------------------------------------------------
// Sink adapter
// ---------------------------------------------------------------------------

/// [`DiagnosticSink`] that appends every event to an [`AuditWriter`].
pub struct AuditSink {
    writer: Mutex<AuditWriter>,
}

impl AuditSink {
    pub fn new(writer: AuditWriter) -> Self {
        Self {
            writer: Mutex::new(writer),
        }
    }

    pub fn seq(&self) -> u64 {
        self.lock().seq()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, AuditWriter> {
        // The writer only advances its state after a successful append.
        self.writer.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl DiagnosticSink for AuditSink {
    fn forward(&self, event: DiagnosticEvent) -> Result<()> {
        let rec = self.lock().append(event)?;
        tracing::debug!(seq = rec.seq, record_id = %rec.record_id, "diagnostic audited");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mqk_schemas::{EventSource, HookName, Severity, StrategyId};
    use serde_json::json;

    fn event(msg: &str) -> DiagnosticEvent {
        DiagnosticEvent::new(
            Severity::Medium,
            EventSource::StrategyCode,
            StrategyId::new("s"),
            HookName::OnTick,
            msg,
        )
    }

    #[test]
    fn canonical_line_sorts_nested_keys() {
        let line = canonical_json_line(&json!({"b": 1, "a": {"z": 0, "y": [ {"d": 1, "c": 2} ]}})).unwrap();
        assert_eq!(line, r#"{"a":{"y":[{"c":2,"d":1}],"z":0},"b":1}"#);
    }

    #[test]
    fn record_ids_are_deterministic_and_distinct() {
        let run = Uuid::from_u128(7);
        assert_eq!(derive_record_id(run, None, 0), derive_record_id(run, None, 0));
        assert_ne!(derive_record_id(run, None, 0), derive_record_id(run, None, 1));
        assert_ne!(
            derive_record_id(run, Some("aa"), 1),
            derive_record_id(run, Some("bb"), 1)
        );
    }

    #[test]
    fn resume_continues_seq_and_chain() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("audit.jsonl");
        let run = Uuid::new_v4();

        let mut w = AuditWriter::new(&path, run, true).unwrap();
        w.append(event("one")).unwrap();
        let second = w.append(event("two")).unwrap();
        drop(w);

        let mut w = AuditWriter::resume(&path, run, true).unwrap();
        assert_eq!(w.seq(), 2);
        assert_eq!(w.last_hash(), second.hash_self.as_deref());
        let third = w.append(event("three")).unwrap();
        assert_eq!(third.seq, 2);
        assert_eq!(third.hash_prev, second.hash_self);

        assert_eq!(
            verify_hash_chain(&path).unwrap(),
            VerifyResult::Valid { lines: 3 }
        );
        let messages: Vec<String> = read_records(&path)
            .unwrap()
            .into_iter()
            .map(|r| r.event.message().to_string())
            .collect();
        assert_eq!(messages, ["one", "two", "three"]);
    }

    #[test]
    fn unchained_log_has_no_hashes_and_verifies() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested/dir/audit.jsonl");
        let mut w = AuditWriter::new(&path, Uuid::new_v4(), false).unwrap();
        let rec = w.append(event("x")).unwrap();
        assert!(rec.hash_self.is_none());
        assert!(rec.hash_prev.is_none());
        assert_eq!(
            verify_hash_chain(&path).unwrap(),
            VerifyResult::Valid { lines: 1 }
        );
    }

    #[test]
    fn garbage_line_is_a_break() {
        let r = verify_hash_chain_str("not json\n").unwrap();
        assert!(matches!(r, VerifyResult::Broken { line: 1, .. }));
    }

    #[test]
    fn settings_from_config() {
        let s = AuditSettings::from_config_json(&json!({})).unwrap();
        assert_eq!(s, AuditSettings::default());

        let s = AuditSettings::from_config_json(
            &json!({"audit": {"path": "logs/diag.jsonl", "hash_chain": false}}),
        )
        .unwrap();
        assert_eq!(s.path, Some(PathBuf::from("logs/diag.jsonl")));
        assert!(!s.hash_chain);

        assert!(AuditSettings::from_config_json(&json!({"audit": {"hash_chain": "yes"}})).is_err());
        assert!(AuditSettings::from_config_json(&json!({"audit": {"path": ""}})).is_err());
    }

    #[test]
    fn sink_appends_forwarded_events() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("audit.jsonl");
        let sink = AuditSink::new(AuditWriter::new(&path, Uuid::new_v4(), true).unwrap());

        sink.forward(event("a")).unwrap();
        sink.forward(event("b")).unwrap();
        assert_eq!(sink.seq(), 2);
        assert_eq!(read_records(&path).unwrap().len(), 2);
    }
}
