//! `mqk strategy demo`: drive a few built-in strategies (one well-behaved,
//! two faulty) through the host and report what the sink saw.

use anyhow::{Context, Result};
use chrono::{DateTime, Duration, Utc};
use mqk_audit::{AuditSettings, AuditSink, AuditWriter};
use mqk_schemas::{MarketTick, OrderUpdate, StrategyId};
use mqk_strategy::{
    DiagnosticSink, FanoutSink, HookArgs, HookContext, HookResult, HookStatus, HostSettings,
    Lifecycle, NotifyArg, PluginRegistry, Strategy, StrategyHost, StrategyMeta, StrategySpec,
    StrategyStatus, TracingSink,
};
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use uuid::Uuid;

const SYMBOLS: [&str; 3] = ["SPY", "AAPL", "MSFT"];

// ---------------------------------------------------------------------------
// Built-in strategies
// ---------------------------------------------------------------------------

/// Flags block trades through the high notifier, correctly.
struct BlockTradeWatcher;

impl Strategy for BlockTradeWatcher {
    fn spec(&self) -> StrategySpec {
        StrategySpec::new("block_trade_watcher")
    }

    fn on_start(&mut self, cx: &mut HookContext<'_>) -> HookResult {
        cx.notifier()
            .notify_low(&["watching".into(), NotifyArg::from(SYMBOLS.len() as i64)])?;
        Ok(HookStatus::Completed)
    }

    fn on_tick(&mut self, cx: &mut HookContext<'_>, tick: &MarketTick) -> HookResult {
        let size: f64 = tick.size.parse().context("tick size is not a number")?;
        if size >= 10_000.0 {
            cx.notifier().notify_high(&[
                format!("block trade in {}", tick.symbol).into(),
                NotifyArg::from(size),
            ])?;
        }
        Ok(HookStatus::Completed)
    }
}

/// Calls the high notifier with a missing argument when stopped.
struct SloppyShutdown;

impl Strategy for SloppyShutdown {
    fn spec(&self) -> StrategySpec {
        StrategySpec::new("sloppy_shutdown")
    }

    fn on_stop(&mut self, cx: &mut HookContext<'_>) -> HookResult {
        let _ = cx.notifier().notify_high(&["word hummingbird".into()]);
        Ok(HookStatus::Completed)
    }
}

/// Indexes a position map without checking. It only ever traded QQQ, so
/// every tick panics.
struct UncheckedPositions {
    positions: HashMap<String, i64>,
}

impl Default for UncheckedPositions {
    fn default() -> Self {
        Self {
            positions: HashMap::from([("QQQ".to_string(), 100)]),
        }
    }
}

impl Strategy for UncheckedPositions {
    fn spec(&self) -> StrategySpec {
        StrategySpec::new("unchecked_positions")
    }

    fn on_tick(&mut self, _cx: &mut HookContext<'_>, tick: &MarketTick) -> HookResult {
        let qty = self.positions[&tick.symbol];
        self.positions.insert(tick.symbol.clone(), qty);
        Ok(HookStatus::Completed)
    }

    fn on_order_update(&mut self, _cx: &mut HookContext<'_>, update: &OrderUpdate) -> HookResult {
        let filled: i64 = update
            .filled_qty
            .parse()
            .with_context(|| format!("order {} filled_qty", update.client_order_id))?;
        *self.positions.entry(update.symbol.clone()).or_default() += filled;
        Ok(HookStatus::Completed)
    }
}

pub fn builtin_registry() -> Result<PluginRegistry> {
    let mut reg = PluginRegistry::new();
    reg.register(
        StrategyMeta::new("block_trade_watcher", "1.0.0", "flags block trades"),
        || Box::new(BlockTradeWatcher),
    )?;
    reg.register(
        StrategyMeta::new("sloppy_shutdown", "1.0.0", "misuses notify_high in on_stop"),
        || Box::new(SloppyShutdown),
    )?;
    reg.register(
        StrategyMeta::new("unchecked_positions", "0.1.0", "panics on unknown symbols"),
        || Box::new(UncheckedPositions::default()),
    )?;
    Ok(reg)
}

// ---------------------------------------------------------------------------
// Demo run
// ---------------------------------------------------------------------------

pub struct DemoArgs {
    pub config_paths: Vec<String>,
    /// Overrides `/audit/path`.
    pub audit_log: Option<PathBuf>,
    pub ticks: usize,
}

pub struct DemoSummary {
    pub run_id: Uuid,
    pub config_hash: String,
    pub audit_log: Option<PathBuf>,
    pub strategies: Vec<StrategyStatus>,
}

/// Synthetic tick `i`; every 7th tick is a block trade.
fn synthetic_tick(i: usize, t0: DateTime<Utc>) -> MarketTick {
    let symbol = SYMBOLS[i % SYMBOLS.len()];
    let size = if i % 7 == 6 { 25_000 } else { 100 + i as u64 };
    MarketTick {
        symbol: symbol.to_string(),
        price: format!("{}.{:02}", 100 + i, i % 100),
        size: size.to_string(),
        ts_utc: t0 + Duration::seconds(i as i64),
    }
}

pub async fn run_demo(args: DemoArgs) -> Result<DemoSummary> {
    let loaded = super::load_config(&args.config_paths)?;
    super::check_unused_keys(&loaded, mqk_config::UnusedKeyPolicy::Warn)?;

    let settings = HostSettings::from_config_json(&loaded.config_json)?;
    let mut audit = AuditSettings::from_config_json(&loaded.config_json)?;
    if let Some(path) = args.audit_log {
        audit.path = Some(path);
    }

    let run_id = Uuid::new_v4();
    let mut sinks: Vec<Arc<dyn DiagnosticSink>> = vec![Arc::new(TracingSink)];
    if let Some(path) = &audit.path {
        let writer = AuditWriter::resume(path, run_id, audit.hash_chain)
            .with_context(|| format!("open audit log {:?}", path))?;
        sinks.push(Arc::new(AuditSink::new(writer)));
    }
    let host = StrategyHost::new(settings, Arc::new(FanoutSink::new(sinks)));

    tracing::info!(%run_id, config_hash = %loaded.config_hash, "demo starting");

    let registry = builtin_registry()?;
    let mut ids = Vec::new();
    for meta in registry.list() {
        let id = StrategyId::new(format!("{}-1", meta.name));
        let strategy = registry.instantiate_verified(&meta.name)?;
        host.register(id.clone(), strategy).await?;
        host.start(&id).await?;
        ids.push(id);
    }

    let t0 = Utc::now();
    for i in 0..args.ticks {
        let tick = serde_json::to_value(synthetic_tick(i, t0))?;
        for id in &ids {
            if host.lifecycle(id).await? != Lifecycle::Running {
                continue;
            }
            host.invoke(id, "on_tick", HookArgs::one(tick.clone())).await?;
        }
    }

    let fill = serde_json::json!({
        "client_order_id": "demo-1",
        "symbol": "AAPL",
        "status": "FILLED",
        "filled_qty": "10",
        "leaves_qty": "0"
    });
    for id in &ids {
        if host.lifecycle(id).await? == Lifecycle::Running {
            host.invoke(id, "on_order_update", HookArgs::one(fill.clone()))
                .await?;
        }
    }

    for id in &ids {
        let lifecycle = host.lifecycle(id).await?;
        if matches!(lifecycle, Lifecycle::Running | Lifecycle::Failed) {
            host.stop(id).await?;
        }
    }

    Ok(DemoSummary {
        run_id,
        config_hash: loaded.config_hash,
        audit_log: audit.path,
        strategies: host.list().await,
    })
}
