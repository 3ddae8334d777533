//! Command handler modules for cbk-cli.
//!
//! Shared utilities used by multiple command paths live here.
//! Command-specific logic lives in the submodules.

pub mod journal;
pub mod rebuild;

use anyhow::{Context, Result};
use cbk_config::{
    load_layered_yaml, report_unused_keys, ConfigConsumer, EngineConfig, UnusedKeyPolicy,
};
use cbk_repo::ScheduleView;
use cbk_schedule::RebuildPolicy;
use serde::de::DeserializeOwned;
use std::fs;

// ---------------------------------------------------------------------------
// Shared helpers
// ---------------------------------------------------------------------------

/// Read and decode a JSON file. A UTF-8 BOM is tolerated.
pub fn read_json_file<T: DeserializeOwned>(path: &str) -> Result<T> {
    let bytes = fs::read(path).with_context(|| format!("read failed: {}", path))?;
    let bytes = bytes.strip_prefix(&[0xEF, 0xBB, 0xBF]).unwrap_or(&bytes);
    let raw = std::str::from_utf8(bytes).with_context(|| format!("{} must be UTF-8 text", path))?;
    serde_json::from_str(raw.trim()).with_context(|| format!("{} is not valid JSON", path))
}

/// Rebuild policy from `--config` layers; defaults when none are given.
///
/// The CLI reads only `schedule.*`, so any other key is an error here.
pub fn load_policy(config_paths: &[String]) -> Result<RebuildPolicy> {
    if config_paths.is_empty() {
        return Ok(RebuildPolicy::default());
    }
    let refs: Vec<&str> = config_paths.iter().map(|s| s.as_str()).collect();
    let loaded = load_layered_yaml(&refs)?;
    report_unused_keys(ConfigConsumer::Cli, &loaded.config_json, UnusedKeyPolicy::Fail)?;
    let cfg = EngineConfig::from_loaded(&loaded)?;
    tracing::debug!(config_hash = %loaded.config_hash, "cli config loaded");
    Ok(cfg.rebuild_policy())
}

/// Print a schedule view as pretty JSON or as `key=value` lines.
pub fn print_view(view: &ScheduleView, json: bool) -> Result<()> {
    if json {
        println!(
            "{}",
            serde_json::to_string_pretty(view).context("serialize schedule view")?
        );
        return Ok(());
    }

    let s = &view.schedule;
    println!("schedule_id={}", s.schedule_id);
    println!("entity_id={}", s.entity_id);
    println!("events={}", view.events.len());
    println!("periods={}", view.periods.len());
    for line in &view.periods {
        println!(
            "period={} state={} amount_reporting={} amount_local={} \
             cumulative_reporting={} remaining_reporting={} explanation={:?}",
            line.period,
            line.state.as_str(),
            line.amount_reporting,
            line.amount_local,
            line.cumulative_amount_reporting,
            line.remaining_amount_reporting,
            line.explanation,
        );
    }
    Ok(())
}
