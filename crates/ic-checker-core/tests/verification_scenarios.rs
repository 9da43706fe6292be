//! End-to-end verification and identification against a simulated socket.

use std::time::Duration;

use ic_checker_core::{
    AbortFlag, BusError, BusOp, BusTransport, CandidateOutcome, Catalog, Checker, CheckerConfig,
    CheckerError, ChipModel, Identification, IdentificationEngine, Level, Mode, PinPlane,
    SimulatedSocket, StdDelay, TimedBus, Timing, TruthTableVerifier, DEFAULT_EXPANDERS,
};
use proptest as _;
use rstest::rstest;
use serde as _;
use serde_json as _;
use tempfile as _;
use thiserror as _;
use tracing as _;

const GND: u16 = 47;

fn plane_with(chip: &str) -> PinPlane<SimulatedSocket> {
    let socket = SimulatedSocket::new(&DEFAULT_EXPANDERS)
        .with_chip(ChipModel::builtin(chip).expect("builtin model"));
    PinPlane::new(socket, DEFAULT_EXPANDERS.to_vec()).expect("plane")
}

fn catalog_of(ids: &[&str]) -> Catalog {
    let builtin = Catalog::builtin();
    Catalog::new(
        ids.iter()
            .map(|id| builtin.get(id).expect("builtin entry").clone())
            .collect(),
    )
}

fn fast_config() -> CheckerConfig {
    CheckerConfig {
        power_settle_ms: 0,
        propagation_ms: 0,
        ..CheckerConfig::default()
    }
}

fn reads(ops: &[BusOp]) -> usize {
    ops.iter().filter(|op| op.is_read()).count()
}

#[test]
fn nand_chip_passes_its_own_table() {
    let catalog = Catalog::builtin();
    let nand = catalog.get("74LS00").expect("entry");
    let mut plane = plane_with("74LS00");

    let verification = TruthTableVerifier::new(&mut plane, &mut StdDelay, Timing::ZERO)
        .verify(&nand.spec, Mode::FailFast)
        .expect("no bus fault");

    assert!(verification.passed);
    assert_eq!(verification.mismatch, None);
    assert_eq!(verification.gates_tested, 4);
}

#[test]
fn and_table_against_nand_chip_fails_on_first_row() {
    let catalog = Catalog::builtin();
    let and = catalog.get("74LS08").expect("entry");
    let mut plane = plane_with("74LS00");

    let verification = TruthTableVerifier::new(&mut plane, &mut StdDelay, Timing::ZERO)
        .verify(&and.spec, Mode::FailFast)
        .expect("no bus fault");

    assert!(!verification.passed);
    let mismatch = verification.mismatch.expect("mismatch recorded");
    assert_eq!((mismatch.gate, mismatch.row), (0, 0));
    assert_eq!(mismatch.inputs, vec![Level::Low, Level::Low]);
    assert_eq!(mismatch.expected, Level::Low);
    assert_eq!(mismatch.actual, Level::High);
    assert_eq!(verification.gates_tested, 1);
    assert!(verification.rows.is_empty());
}

#[test]
fn fail_fast_stops_sampling_and_still_powers_down() {
    let catalog = Catalog::builtin();
    let and = catalog.get("74LS08").expect("entry");
    let mut plane = plane_with("74LS00");

    TruthTableVerifier::new(&mut plane, &mut StdDelay, Timing::ZERO)
        .verify(&and.spec, Mode::FailFast)
        .expect("no bus fault");

    let log = plane.bus().log();
    let first_read = log.iter().position(BusOp::is_read).expect("one sample");
    assert_eq!(reads(log), 1);
    assert!(log[first_read + 1..]
        .iter()
        .all(|op| matches!(op, BusOp::Write { address: 0x22, .. })));
    assert_eq!(plane.bus().latch_level(GND), Level::High);
    assert!(!plane.bus().chip_powered());
}

#[rstest]
#[case("74LS00", 4, 4)]
#[case("74LS04", 6, 2)]
#[case("74LS86", 4, 4)]
fn verbose_mode_samples_every_row(
    #[case] chip: &str,
    #[case] gates: usize,
    #[case] rows_per_gate: usize,
) {
    let catalog = Catalog::builtin();
    let entry = catalog.get(chip).expect("entry");
    let mut plane = plane_with(chip);

    let verification = TruthTableVerifier::new(&mut plane, &mut StdDelay, Timing::ZERO)
        .verify(&entry.spec, Mode::Verbose)
        .expect("no bus fault");

    assert!(verification.passed);
    assert_eq!(verification.rows.len(), gates * rows_per_gate);
    assert_eq!(reads(plane.bus().log()), gates * rows_per_gate);
    assert!(verification.rows.iter().all(|row| row.passed()));
}

#[test]
fn verbose_mode_reports_every_mismatch_of_a_wrong_table() {
    let catalog = Catalog::builtin();
    let or = catalog.get("74LS32").expect("entry");
    let mut plane = plane_with("74LS86");

    let verification = TruthTableVerifier::new(&mut plane, &mut StdDelay, Timing::ZERO)
        .verify(&or.spec, Mode::Verbose)
        .expect("no bus fault");

    assert!(!verification.passed);
    assert_eq!(verification.rows.len(), 16);
    let failing: Vec<_> = verification
        .rows
        .iter()
        .filter(|row| !row.passed())
        .map(|row| (row.gate, row.row))
        .collect();
    assert_eq!(failing, vec![(0, 3), (1, 3), (2, 3), (3, 3)]);
    assert_eq!(
        verification.mismatch.map(|row| (row.gate, row.row)),
        Some((0, 3))
    );
}

#[test]
fn first_passing_candidate_is_reported() {
    let mut plane = plane_with("74LS00");
    let report = IdentificationEngine::new(&mut plane, &mut StdDelay, Timing::ZERO)
        .identify(&catalog_of(&["74LS08", "74LS00"]), &AbortFlag::new());

    assert_eq!(report.identification, Identification::Match("74LS00".into()));
    assert_eq!(report.candidates.len(), 2);
    assert_eq!(report.candidates[0].outcome, CandidateOutcome::Failed);
    assert!(!plane.bus().chip_powered());
}

#[test]
fn bus_fault_skips_only_the_faulting_candidate() {
    let mut socket = SimulatedSocket::new(&DEFAULT_EXPANDERS)
        .with_chip(ChipModel::builtin("74LS00").expect("model"));
    socket.fail_transaction(0);
    let mut plane = PinPlane::new(socket, DEFAULT_EXPANDERS.to_vec()).expect("plane");

    let report = IdentificationEngine::new(&mut plane, &mut StdDelay, Timing::ZERO)
        .identify(&catalog_of(&["74LS08", "74LS00"]), &AbortFlag::new());

    assert_eq!(
        report.candidates[0].outcome,
        CandidateOutcome::BusFault(BusError::Nack { address: 0x22 })
    );
    assert_eq!(report.matched(), Some("74LS00"));
}

#[test]
fn manual_test_through_checker_uses_configured_timing() {
    let socket = SimulatedSocket::new(&DEFAULT_EXPANDERS)
        .with_chip(ChipModel::builtin("74LS02").expect("model"));
    let mut checker =
        Checker::new(socket, StdDelay, &fast_config(), Catalog::builtin()).expect("valid");

    assert_eq!(checker.timing(), Timing::ZERO);
    let (entry, verification) = checker.run_manual_test("74ls02").expect("no bus fault");
    assert_eq!(entry.spec.name, "Quad 2-Input NOR Gate");
    assert!(verification.passed);

    assert!(matches!(
        checker.run_manual_test("74LS00"),
        Ok((_, verification)) if !verification.passed
    ));
    assert_eq!(
        checker.run_manual_test("CD4011").err(),
        Some(CheckerError::UnknownDevice {
            id: "CD4011".into()
        })
    );
}

#[test]
fn identification_runs_over_a_deadline_bound_bus() {
    let socket = SimulatedSocket::new(&DEFAULT_EXPANDERS)
        .with_chip(ChipModel::builtin("74LS32").expect("model"));
    let bus: Box<dyn BusTransport> =
        Box::new(TimedBus::spawn(socket, Duration::from_secs(5)).expect("worker"));
    let mut checker =
        Checker::new(bus, StdDelay, &fast_config(), Catalog::builtin()).expect("valid");

    assert_eq!(checker.scan(), DEFAULT_EXPANDERS.to_vec());
    let report = checker.run_auto_identify(&AbortFlag::new());
    assert_eq!(report.matched(), Some("74LS32"));
}
