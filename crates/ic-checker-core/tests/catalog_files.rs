//! Catalog and configuration files loaded from disk.

use std::fs;

use ic_checker_core::{
    AbortFlag, Catalog, Checker, CheckerConfig, ChipModel, ConfigError, Identification, Level,
    SimulatedSocket, StdDelay, DEFAULT_EXPANDERS,
};
use proptest as _;
use rstest::rstest;
use serde as _;
use serde_json as _;
use thiserror as _;
use tracing as _;

const NAND_DATABASE: &str = r#"[
  {
    "id": "74LS00",
    "name": "Quad 2-Input NAND Gate",
    "description": "Contains four independent 2-input NAND gates.",
    "power": { "vcc": 38, "gnd": 47 },
    "gates": [
      { "inputs": [41, 42], "output": 43, "table": [[0, 0, 1], [0, 1, 1], [1, 0, 1], [1, 1, 0]] },
      { "inputs": [44, 45], "output": 46, "table": [[0, 0, 1], [0, 1, 1], [1, 0, 1], [1, 1, 0]] },
      { "inputs": [33, 34], "output": 32, "table": [[0, 0, 1], [0, 1, 1], [1, 0, 1], [1, 1, 0]] },
      { "inputs": [36, 37], "output": 35, "table": [[0, 0, 1], [0, 1, 1], [1, 0, 1], [1, 1, 0]] }
    ]
  }
]"#;

fn fast_config() -> CheckerConfig {
    CheckerConfig {
        power_settle_ms: 0,
        propagation_ms: 0,
        ..CheckerConfig::default()
    }
}

#[test]
fn hand_written_database_matches_builtin_entry() {
    let dir = tempfile::tempdir().expect("tempdir");
    let path = dir.path().join("catalog.json");
    fs::write(&path, NAND_DATABASE).expect("write catalog");

    let loaded = Catalog::load(&path).expect("loads");
    let builtin = Catalog::builtin();
    assert_eq!(loaded.entries()[0], *builtin.get("74LS00").expect("entry"));
}

#[test]
fn file_catalog_drives_identification() {
    let dir = tempfile::tempdir().expect("tempdir");
    let catalog_path = dir.path().join("catalog.json");
    let config_path = dir.path().join("checker.json");
    fs::write(&catalog_path, NAND_DATABASE).expect("write catalog");
    fs::write(&config_path, r#"{"power_settle_ms": 0, "propagation_ms": 0}"#)
        .expect("write config");

    let config = CheckerConfig::load(&config_path).expect("config");
    let catalog = Catalog::load(&catalog_path).expect("catalog");

    let nand = SimulatedSocket::new(&DEFAULT_EXPANDERS)
        .with_chip(ChipModel::builtin("74LS00").expect("model"));
    let mut checker = Checker::new(nand, StdDelay, &config, catalog.clone()).expect("valid");
    assert_eq!(
        checker.run_auto_identify(&AbortFlag::new()).identification,
        Identification::Match("74LS00".into())
    );

    let and = SimulatedSocket::new(&DEFAULT_EXPANDERS)
        .with_chip(ChipModel::builtin("74LS08").expect("model"));
    let mut checker = Checker::new(and, StdDelay, &config, catalog).expect("valid");
    assert_eq!(
        checker.run_auto_identify(&AbortFlag::new()).identification,
        Identification::NoMatch
    );
}

#[test]
fn exported_builtin_catalog_reloads_identically() {
    let builtin = Catalog::builtin();
    let reloaded = Catalog::from_json(&builtin.to_json().expect("serialises")).expect("parses");
    assert_eq!(reloaded, builtin);
}

#[rstest]
#[case::non_binary(
    r#"[{"id": "X", "name": "x", "gates": [{"inputs": [0], "output": 1, "table": [[2, 1]]}]}]"#,
    ConfigError::NonBinaryLevel { device: "X".into(), gate: 0, row: 0, value: 2 }
)]
#[case::empty_row(
    r#"[{"id": "X", "name": "x", "gates": [{"inputs": [0], "output": 1, "table": [[]]}]}]"#,
    ConfigError::EmptyRow { device: "X".into(), gate: 0, row: 0 }
)]
fn malformed_rows_are_rejected_at_load(#[case] json: &str, #[case] expected: ConfigError) {
    assert_eq!(Catalog::from_json(json), Err(expected));
}

#[test]
fn entry_wired_beyond_the_expanders_is_rejected_by_checker() {
    let json = r#"[{"id": "WIDE", "name": "wide", "power": {"vcc": 38, "gnd": 47},
        "gates": [{"inputs": [48], "output": 43, "table": [[0, 1], [1, 0]]}]}]"#;
    let catalog = Catalog::from_json(json).expect("parses");
    let socket = SimulatedSocket::new(&DEFAULT_EXPANDERS);

    assert_eq!(
        Checker::new(socket, StdDelay, &fast_config(), catalog).err(),
        Some(ConfigError::PinOutOfRange {
            device: "WIDE".into(),
            pin: 48,
            pin_count: 48,
        })
    );
}

#[test]
fn duplicate_identifiers_are_rejected_case_insensitively() {
    let mut entries = Catalog::builtin().entries().to_vec();
    let mut copy = entries[0].clone();
    copy.id = "74ls00".into();
    entries.push(copy);

    let socket = SimulatedSocket::new(&DEFAULT_EXPANDERS);
    assert_eq!(
        Checker::new(socket, StdDelay, &fast_config(), Catalog::new(entries)).err(),
        Some(ConfigError::DuplicateIdentifier {
            id: "74ls00".into()
        })
    );
}

#[test]
fn rows_decode_into_levels() {
    let catalog = Catalog::from_json(NAND_DATABASE).expect("parses");
    let last_row = &catalog.entries()[0].spec.gates[0].table[3];
    assert_eq!(last_row.inputs, vec![Level::High, Level::High]);
    assert_eq!(last_row.expected, Level::Low);
}
