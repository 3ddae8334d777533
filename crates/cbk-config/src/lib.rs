//! cbk-config
//!
//! Layered YAML configuration.
//!
//! - Documents are deep-merged in order: earlier layers are the base, later
//!   layers override leaf by leaf.
//! - The merged document is canonicalized (sorted keys, compact JSON) and
//!   hashed with SHA-256, so an effective config is identified by one hash
//!   regardless of key order or how it was split across files.
//! - [`EngineConfig`] is the typed view the binaries read; absent keys take
//!   their defaults.

mod consumption;

pub use consumption::{
    consumed_pointers, report_unused_keys, ConfigConsumer, UnusedKeyPolicy, UnusedKeyReport,
};

use anyhow::{bail, Context, Result};
use cbk_schedule::RebuildPolicy;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use sha2::{Digest, Sha256};
use std::fs;
use std::path::PathBuf;

// ---------------------------------------------------------------------------
// Layered loading
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct LoadedConfig {
    pub config_hash: String,
    pub canonical_json: String,
    pub config_json: Value,
}

pub fn load_layered_yaml(paths: &[&str]) -> Result<LoadedConfig> {
    let mut docs: Vec<String> = Vec::with_capacity(paths.len());
    for p in paths {
        let raw =
            fs::read_to_string(p).with_context(|| format!("failed to read yaml path: {p}"))?;
        docs.push(raw);
    }

    let doc_refs: Vec<&str> = docs.iter().map(|s| s.as_str()).collect();
    load_layered_yaml_from_strings(&doc_refs)
}

pub fn load_layered_yaml_from_strings(yaml_docs: &[&str]) -> Result<LoadedConfig> {
    let mut merged = serde_json::json!({});
    for (i, raw) in yaml_docs.iter().enumerate() {
        let v_yaml: serde_yaml::Value = serde_yaml::from_str(raw)
            .with_context(|| format!("invalid yaml in layer {}", i + 1))?;
        let v_json = serde_json::to_value(v_yaml).context("yaml->json conversion failed")?;
        match v_json {
            // An empty file parses as null: contributes nothing.
            Value::Null => continue,
            Value::Object(_) => merged = deep_merge(merged, v_json),
            _ => bail!("config layer {} must be a mapping at the top level", i + 1),
        }
    }

    let canonical_json = canonicalize_json(&merged)?;
    let config_hash = sha256_hex(canonical_json.as_bytes());
    Ok(LoadedConfig {
        config_hash,
        canonical_json,
        config_json: merged,
    })
}

fn deep_merge(a: Value, b: Value) -> Value {
    match (a, b) {
        (Value::Object(mut a_map), Value::Object(b_map)) => {
            for (k, b_val) in b_map {
                let a_val = a_map.remove(&k).unwrap_or(Value::Null);
                a_map.insert(k, deep_merge(a_val, b_val));
            }
            Value::Object(a_map)
        }
        (_, b_other) => b_other,
    }
}

fn canonicalize_json(v: &Value) -> Result<String> {
    serde_json::to_string(&sort_keys(v)).context("canonical json serialize failed")
}

fn sort_keys(v: &Value) -> Value {
    match v {
        Value::Object(map) => {
            let mut keys: Vec<&String> = map.keys().collect();
            keys.sort();
            let mut out = serde_json::Map::new();
            for k in keys {
                out.insert(k.clone(), sort_keys(&map[k]));
            }
            Value::Object(out)
        }
        Value::Array(arr) => Value::Array(arr.iter().map(sort_keys).collect()),
        _ => v.clone(),
    }
}

fn sha256_hex(bytes: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    hex::encode(hasher.finalize())
}

// ---------------------------------------------------------------------------
// Typed view
// ---------------------------------------------------------------------------

pub const DEFAULT_BIND_ADDR: &str = "127.0.0.1:8899";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DaemonConfig {
    pub bind_addr: String,
}

impl Default for DaemonConfig {
    fn default() -> Self {
        Self {
            bind_addr: DEFAULT_BIND_ADDR.to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct JournalConfig {
    /// No path: in-memory only, nothing survives a restart.
    pub path: Option<PathBuf>,
    pub hash_chain: bool,
}

impl Default for JournalConfig {
    fn default() -> Self {
        Self {
            path: None,
            hash_chain: true,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScheduleConfig {
    pub open_ended_periods: u32,
}

impl Default for ScheduleConfig {
    fn default() -> Self {
        Self {
            open_ended_periods: RebuildPolicy::default().open_ended_periods,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub daemon: DaemonConfig,
    pub journal: JournalConfig,
    pub schedule: ScheduleConfig,
}

impl EngineConfig {
    /// Typed view of a merged document. Unknown sections are ignored here;
    /// see [`report_unused_keys`].
    pub fn from_json(v: &Value) -> Result<Self> {
        let cfg: EngineConfig =
            serde_json::from_value(v.clone()).context("config does not match engine schema")?;
        cfg.validate()?;
        Ok(cfg)
    }

    pub fn from_loaded(loaded: &LoadedConfig) -> Result<Self> {
        Self::from_json(&loaded.config_json)
    }

    pub fn validate(&self) -> Result<()> {
        if self.schedule.open_ended_periods == 0 {
            bail!("CONFIG_INVALID: schedule.open_ended_periods must be >= 1");
        }
        if self.daemon.bind_addr.trim().is_empty() {
            bail!("CONFIG_INVALID: daemon.bind_addr must not be empty");
        }
        Ok(())
    }

    pub fn rebuild_policy(&self) -> RebuildPolicy {
        RebuildPolicy {
            open_ended_periods: self.schedule.open_ended_periods,
        }
    }
}
