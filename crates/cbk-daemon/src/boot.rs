//! Startup wiring: config layers -> repository -> `AppState`.
//!
//! `CBK_CONFIG` holds comma-separated YAML paths (base first). Without it the
//! daemon runs on defaults: in-memory, no journal. `CBK_DAEMON_ADDR`
//! overrides `daemon.bind_addr`.

use std::{net::SocketAddr, sync::Arc};

use anyhow::{Context, Result};
use cbk_config::{
    load_layered_yaml, report_unused_keys, ConfigConsumer, EngineConfig, UnusedKeyPolicy,
};
use cbk_repo::{ScheduleRepository, SystemClock};
use tracing::{info, warn};

use crate::state::AppState;

pub const CONFIG_ENV: &str = "CBK_CONFIG";
pub const ADDR_ENV: &str = "CBK_DAEMON_ADDR";

pub struct Booted {
    pub state: AppState,
    pub addr: SocketAddr,
    pub config: EngineConfig,
}

/// Boot from the process environment.
pub fn boot_from_env() -> Result<Booted> {
    let paths: Vec<String> = std::env::var(CONFIG_ENV)
        .ok()
        .map(|raw| split_paths(&raw))
        .unwrap_or_default();
    let addr_override = std::env::var(ADDR_ENV).ok();

    let refs: Vec<&str> = paths.iter().map(String::as_str).collect();
    boot(&refs, addr_override.as_deref())
}

/// Boot from explicit config paths. An empty slice means defaults.
pub fn boot(config_paths: &[&str], addr_override: Option<&str>) -> Result<Booted> {
    let (config, config_hash) = if config_paths.is_empty() {
        info!("no {CONFIG_ENV} set; running on defaults");
        (EngineConfig::default(), None)
    } else {
        let loaded = load_layered_yaml(config_paths)?;
        let report = report_unused_keys(
            ConfigConsumer::Daemon,
            &loaded.config_json,
            UnusedKeyPolicy::Warn,
        )?;
        for ptr in &report.unused_leaf_pointers {
            warn!(pointer = %ptr, "unused config key");
        }
        let config = EngineConfig::from_loaded(&loaded)?;
        info!(config_hash = %loaded.config_hash, layers = config_paths.len(), "config loaded");
        (config, Some(loaded.config_hash))
    };

    let raw_addr = addr_override.unwrap_or(&config.daemon.bind_addr);
    let addr: SocketAddr = raw_addr
        .parse()
        .with_context(|| format!("invalid bind address {raw_addr:?}"))?;

    let policy = config.rebuild_policy();
    let repo = match &config.journal.path {
        Some(path) => {
            let repo = ScheduleRepository::open_journaled(
                path,
                config.journal.hash_chain,
                policy,
                Arc::new(SystemClock),
            )?;
            info!(
                journal = %path.display(),
                schedules = repo.schedules(None).len(),
                "journal restored"
            );
            repo
        }
        None => ScheduleRepository::new().with_policy(policy),
    };

    Ok(Booted {
        state: AppState::with_repository(repo, config_hash),
        addr,
        config,
    })
}

fn split_paths(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}
