//! Scenario: config layering and hashing.
//!
//! # Invariants under test
//!
//! 1. Same documents, same hash and canonical JSON.
//! 2. Key order inside a document does not change the hash.
//! 3. Splitting one config across layers hashes like the single document.
//! 4. Later layers override earlier ones; the typed view sees the override.
//! 5. `open_ended_periods: 0` is rejected by the typed view.

use cbk_config::{load_layered_yaml, load_layered_yaml_from_strings, EngineConfig};

const BASE_YAML: &str = r#"
daemon:
  bind_addr: "127.0.0.1:8899"
journal:
  path: "var/closebook.jsonl"
  hash_chain: true
schedule:
  open_ended_periods: 12
"#;

const BASE_YAML_REORDERED: &str = r#"
schedule:
  open_ended_periods: 12
journal:
  hash_chain: true
  path: "var/closebook.jsonl"
daemon:
  bind_addr: "127.0.0.1:8899"
"#;

const OVERLAY_YAML: &str = r#"
schedule:
  open_ended_periods: 24
"#;

#[test]
fn same_input_produces_identical_hash() {
    let a = load_layered_yaml_from_strings(&[BASE_YAML]).unwrap();
    let b = load_layered_yaml_from_strings(&[BASE_YAML]).unwrap();
    assert_eq!(a.config_hash, b.config_hash);
    assert_eq!(a.canonical_json, b.canonical_json);
    assert_eq!(a.config_hash.len(), 64);
    assert!(a.config_hash.chars().all(|c| c.is_ascii_hexdigit()));
}

#[test]
fn reordered_keys_produce_same_hash() {
    let a = load_layered_yaml_from_strings(&[BASE_YAML]).unwrap();
    let b = load_layered_yaml_from_strings(&[BASE_YAML_REORDERED]).unwrap();
    assert_eq!(a.config_hash, b.config_hash);
}

#[test]
fn split_layers_hash_like_one_document() {
    let whole = load_layered_yaml_from_strings(&[BASE_YAML]).unwrap();
    let split = load_layered_yaml_from_strings(&[
        "daemon:\n  bind_addr: \"127.0.0.1:8899\"\n",
        "journal:\n  path: \"var/closebook.jsonl\"\n  hash_chain: true\n",
        "schedule:\n  open_ended_periods: 12\n",
    ])
    .unwrap();
    assert_eq!(whole.config_hash, split.config_hash);
}

#[test]
fn overlay_wins_and_changes_hash() {
    let base = load_layered_yaml_from_strings(&[BASE_YAML]).unwrap();
    let merged = load_layered_yaml_from_strings(&[BASE_YAML, OVERLAY_YAML]).unwrap();
    assert_ne!(base.config_hash, merged.config_hash);

    let cfg = EngineConfig::from_loaded(&merged).unwrap();
    assert_eq!(cfg.schedule.open_ended_periods, 24);
    assert_eq!(cfg.rebuild_policy().open_ended_periods, 24);
    assert!(cfg.journal.hash_chain);
    assert_eq!(
        cfg.journal.path.as_deref(),
        Some(std::path::Path::new("var/closebook.jsonl"))
    );
}

#[test]
fn zero_open_ended_periods_is_rejected() {
    let loaded =
        load_layered_yaml_from_strings(&["schedule:\n  open_ended_periods: 0\n"]).unwrap();
    let err = EngineConfig::from_loaded(&loaded).unwrap_err();
    assert!(err.to_string().contains("open_ended_periods"), "{err}");
}

#[test]
fn layers_load_from_files() {
    let dir = tempfile::tempdir().unwrap();
    let base = dir.path().join("base.yaml");
    let over = dir.path().join("overlay.yaml");
    std::fs::write(&base, BASE_YAML).unwrap();
    std::fs::write(&over, OVERLAY_YAML).unwrap();

    let from_files = load_layered_yaml(&[
        base.to_str().unwrap(),
        over.to_str().unwrap(),
    ])
    .unwrap();
    let from_strings = load_layered_yaml_from_strings(&[BASE_YAML, OVERLAY_YAML]).unwrap();
    assert_eq!(from_files.config_hash, from_strings.config_hash);

    assert!(load_layered_yaml(&[dir.path().join("missing.yaml").to_str().unwrap()]).is_err());
}
