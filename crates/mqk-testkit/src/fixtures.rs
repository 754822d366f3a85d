use anyhow::{Context, Result};
use chrono::{DateTime, Duration as ChronoDuration, TimeZone, Utc};
use mqk_audit::{AuditSink, AuditWriter};
use mqk_schemas::{HookName, MarketTick, OrderUpdate};
use mqk_strategy::{DiagnosticSink, FanoutSink, HookArgs, HostSettings, MemorySink, StrategyHost};
use serde_json::json;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;
use uuid::Uuid;

/// Fixed session open used by every synthetic payload.
pub fn session_open() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 6, 3, 13, 30, 0)
        .single()
        .unwrap_or_else(Utc::now)
}

pub fn tick(symbol: &str, i: u64) -> MarketTick {
    MarketTick {
        symbol: symbol.to_string(),
        price: format!("{}.{:02}", 500 + i / 100, i % 100),
        size: (100 + i).to_string(),
        ts_utc: session_open() + ChronoDuration::milliseconds(i as i64),
    }
}

pub fn order_update(client_order_id: &str, symbol: &str, status: &str) -> OrderUpdate {
    OrderUpdate {
        client_order_id: client_order_id.to_string(),
        symbol: symbol.to_string(),
        status: status.to_string(),
        filled_qty: "0".to_string(),
        leaves_qty: "10".to_string(),
    }
}

/// Well-formed arguments for `hook`.
pub fn valid_args(hook: HookName) -> HookArgs {
    match hook {
        HookName::OnStart | HookName::OnStop => HookArgs::none(),
        HookName::OnTick => HookArgs::one(json!(tick("SPY", 0))),
        HookName::OnOrderUpdate => HookArgs::one(json!(order_update("o-1", "SPY", "NEW"))),
        HookName::OnCallback => HookArgs::one(json!({"timer": "rebalance"})),
        HookName::OnOther => HookArgs::one(json!({"news": "halt"})),
    }
}

/// Defaults with a tighter timeout and deactivation threshold.
pub fn host_settings(hook_timeout_ms: u64, max_consecutive_failures: u32) -> HostSettings {
    HostSettings {
        hook_timeout: (hook_timeout_ms > 0).then(|| Duration::from_millis(hook_timeout_ms)),
        max_consecutive_failures,
        ..HostSettings::default()
    }
}

/// Host forwarding into a [`MemorySink`] the test can drain.
pub fn memory_host(settings: HostSettings) -> (StrategyHost, MemorySink) {
    let sink = MemorySink::new();
    let host = StrategyHost::new(settings, Arc::new(sink.clone()));
    (host, sink)
}

/// Host forwarding to both a [`MemorySink`] and a hash-chained audit log in a
/// temp dir. The dir lives as long as this value.
pub struct AuditedHost {
    pub host: StrategyHost,
    pub memory: MemorySink,
    pub run_id: Uuid,
    audit_path: PathBuf,
    _dir: TempDir,
}

impl AuditedHost {
    pub fn new(settings: HostSettings) -> Result<Self> {
        let dir = tempfile::tempdir().context("create audit temp dir")?;
        let audit_path = dir.path().join("audit.jsonl");
        let run_id = Uuid::new_v4();
        let writer = AuditWriter::new(&audit_path, run_id, true)?;

        let memory = MemorySink::new();
        let sinks: Vec<Arc<dyn DiagnosticSink>> = vec![
            Arc::new(memory.clone()),
            Arc::new(AuditSink::new(writer)),
        ];
        let host = StrategyHost::new(settings, Arc::new(FanoutSink::new(sinks)));
        Ok(Self {
            host,
            memory,
            run_id,
            audit_path,
            _dir: dir,
        })
    }

    pub fn audit_path(&self) -> &Path {
        &self.audit_path
    }
}

/// Merge YAML layers the same way the binary does.
pub fn config_from_yaml(layers: &[&str]) -> Result<mqk_config::LoadedConfig> {
    mqk_config::load_layered_yaml_from_strings(layers)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn valid_args_cover_every_hook() {
        for hook in HookName::ALL {
            let args = valid_args(hook);
            match hook {
                HookName::OnStart | HookName::OnStop => assert!(args.is_empty()),
                _ => assert_eq!(args.len(), 1, "{hook}"),
            }
        }
    }

    #[test]
    fn ticks_are_time_ordered() {
        assert!(tick("SPY", 1).ts_utc < tick("SPY", 2).ts_utc);
        assert_eq!(tick("SPY", 7).price, "500.07");
    }

    #[test]
    fn zero_timeout_disables_it() {
        assert_eq!(host_settings(0, 3).hook_timeout, None);
        assert_eq!(
            host_settings(250, 3).hook_timeout,
            Some(Duration::from_millis(250))
        );
    }
}
