use anyhow::{anyhow, Context, Result};
use mqk_schemas::Severity;
use serde_json::Value;
use std::time::Duration;

use crate::{NotifierSignatures, ParamKind};

pub const DEFAULT_HOOK_TIMEOUT_MS: u64 = 5_000;
pub const DEFAULT_MAX_CONSECUTIVE_FAILURES: u32 = 3;

/// Host policy knobs, read from the merged config JSON.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct HostSettings {
    /// `None` disables the per-invocation timeout.
    pub hook_timeout: Option<Duration>,
    /// Captures in a row before a strategy is deactivated. 0 disables.
    pub max_consecutive_failures: u32,
    /// Severity of captures that carry no severity of their own.
    pub default_severity: Severity,
    pub signatures: NotifierSignatures,
}

impl Default for HostSettings {
    fn default() -> Self {
        Self {
            hook_timeout: Some(Duration::from_millis(DEFAULT_HOOK_TIMEOUT_MS)),
            max_consecutive_failures: DEFAULT_MAX_CONSECUTIVE_FAILURES,
            default_severity: Severity::Medium,
            signatures: NotifierSignatures::default(),
        }
    }
}

impl HostSettings {
    /// JSON pointers this type reads. Fed to the unused-key report.
    pub const CONFIG_POINTERS: &'static [&'static str] = &[
        "/host/hook_timeout_ms",
        "/host/max_consecutive_failures",
        "/diagnostics/default_severity",
        "/notifier/signatures/low",
        "/notifier/signatures/medium",
        "/notifier/signatures/high",
    ];

    /// Missing keys fall back to defaults; present but malformed keys are errors.
    pub fn from_config_json(cfg: &Value) -> Result<Self> {
        let mut out = Self::default();

        if let Some(v) = cfg.pointer("/host/hook_timeout_ms") {
            let ms = v
                .as_u64()
                .context("host.hook_timeout_ms must be a non-negative integer")?;
            out.hook_timeout = (ms > 0).then(|| Duration::from_millis(ms));
        }

        if let Some(v) = cfg.pointer("/host/max_consecutive_failures") {
            let n = v
                .as_u64()
                .context("host.max_consecutive_failures must be a non-negative integer")?;
            out.max_consecutive_failures = u32::try_from(n)
                .map_err(|_| anyhow!("host.max_consecutive_failures out of range: {n}"))?;
        }

        if let Some(v) = cfg.pointer("/diagnostics/default_severity") {
            let s = v
                .as_str()
                .context("diagnostics.default_severity must be a string")?;
            out.default_severity = s
                .parse()
                .with_context(|| format!("diagnostics.default_severity: '{s}'"))?;
        }

        for (pointer, slot) in [
            ("/notifier/signatures/low", &mut out.signatures.low),
            ("/notifier/signatures/medium", &mut out.signatures.medium),
            ("/notifier/signatures/high", &mut out.signatures.high),
        ] {
            if let Some(v) = cfg.pointer(pointer) {
                *slot = serde_json::from_value::<Vec<ParamKind>>(v.clone())
                    .with_context(|| format!("invalid notifier signature at {pointer}"))?;
            }
        }
        out.signatures
            .validate()
            .map_err(|e| anyhow!("notifier.signatures: {e}"))?;

        Ok(out)
    }
}
