//! Command handler modules for mqk-cli.
//!
//! Shared utilities used by multiple command paths live here.
//! Command-specific logic lives in the submodules.

pub mod demo;

use anyhow::Result;
use mqk_audit::AuditSettings;
use mqk_config::{LoadedConfig, UnusedKeyPolicy, UnusedKeyReport};
use mqk_strategy::HostSettings;

// ---------------------------------------------------------------------------
// Shared helpers
// ---------------------------------------------------------------------------

/// Merge config layers in order. No paths means an empty config (all defaults).
pub fn load_config(paths: &[String]) -> Result<LoadedConfig> {
    let path_refs: Vec<&str> = paths.iter().map(|s| s.as_str()).collect();
    if path_refs.is_empty() {
        mqk_config::load_layered_yaml_from_strings(&[])
    } else {
        mqk_config::load_layered_yaml(&path_refs)
    }
}

/// Every JSON pointer some reader in this binary consumes.
pub fn consumed_pointers() -> Vec<&'static str> {
    HostSettings::CONFIG_POINTERS
        .iter()
        .chain(AuditSettings::CONFIG_POINTERS)
        .copied()
        .collect()
}

/// Unused-key report for `loaded`; under `Warn` each unused key is logged.
pub fn check_unused_keys(loaded: &LoadedConfig, policy: UnusedKeyPolicy) -> Result<UnusedKeyReport> {
    let report =
        mqk_config::report_unused_keys(&consumed_pointers(), &loaded.config_json, policy)?;
    for pointer in &report.unused_leaf_pointers {
        tracing::warn!(pointer = %pointer, "config key is not read by anything");
    }
    Ok(report)
}
