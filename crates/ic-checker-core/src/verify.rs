//! Truth-table verification of one device.
//!
//! Each test walks `Idle -> PoweredUp -> TestingGate(n)* -> PoweredDown -> Done`.
//! Power-down is the terminal transition and runs whatever happened before
//! it: after a pass, after a fail-fast abort and after a bus fault.

use std::fmt;
use std::thread;
use std::time::Duration;

use tracing::{debug, warn};

use crate::bus::BusTransport;
use crate::catalog::{DeviceSpec, PowerPins};
use crate::pins::{Level, PinPlane};
use crate::BusError;

/// Default wait between applying power and the first stimulus.
pub const DEFAULT_POWER_SETTLE: Duration = Duration::from_millis(100);

/// Default wait between driving a row's inputs and sampling the output.
pub const DEFAULT_PROPAGATION: Duration = Duration::from_millis(50);

/// Electrical settle times. Each must elapse in full before the next bus
/// operation; shorter waits risk sampling levels that have not settled.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Timing {
    /// Wait after power-up.
    pub power_settle: Duration,
    /// Wait after driving each row's inputs.
    pub propagation: Duration,
}

impl Default for Timing {
    fn default() -> Self {
        Self {
            power_settle: DEFAULT_POWER_SETTLE,
            propagation: DEFAULT_PROPAGATION,
        }
    }
}

impl Timing {
    /// No waits at all. Only meaningful against simulated hardware.
    pub const ZERO: Self = Self {
        power_settle: Duration::ZERO,
        propagation: Duration::ZERO,
    };
}

/// Blocking wait primitive.
pub trait Delay {
    /// Blocks for at least `duration`.
    fn delay(&mut self, duration: Duration);
}

impl<D: Delay + ?Sized> Delay for &mut D {
    fn delay(&mut self, duration: Duration) {
        (**self).delay(duration);
    }
}

/// [`Delay`] backed by [`std::thread::sleep`].
#[derive(Debug, Clone, Copy, Default)]
pub struct StdDelay;

impl Delay for StdDelay {
    fn delay(&mut self, duration: Duration) {
        if !duration.is_zero() {
            thread::sleep(duration);
        }
    }
}

/// Mismatch policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Mode {
    /// Check and record every row of every gate.
    Verbose,
    /// Stop at the first mismatch; used when scanning many candidates.
    FailFast,
}

/// Outcome of one truth-table row.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct RowRecord {
    /// Zero-based gate index.
    pub gate: usize,
    /// Zero-based row index within the gate.
    pub row: usize,
    /// Levels driven on the gate inputs.
    pub inputs: Vec<Level>,
    /// Level the table expects.
    pub expected: Level,
    /// Level sampled on the output.
    pub actual: Level,
}

impl RowRecord {
    /// Returns `true` when the sampled level matches the table.
    #[must_use]
    pub fn passed(&self) -> bool {
        self.expected == self.actual
    }
}

impl fmt::Display for RowRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let inputs: Vec<String> = self.inputs.iter().map(ToString::to_string).collect();
        write!(
            f,
            "In: ({})  |  Exp: {}  |  Got: {}  {}",
            inputs.join(", "),
            self.expected,
            self.actual,
            if self.passed() { "PASS" } else { "FAIL" }
        )
    }
}

/// Result of verifying one device. A mismatch is a result, not an error.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Verification {
    /// `true` when every checked row matched.
    pub passed: bool,
    /// Every checked row, in order. Populated in [`Mode::Verbose`] only.
    pub rows: Vec<RowRecord>,
    /// First mismatching row, in either mode.
    pub mismatch: Option<RowRecord>,
    /// Number of gates the test entered.
    pub gates_tested: usize,
}

/// Verification state machine phase.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Phase {
    /// Nothing applied yet.
    Idle,
    /// Power applied and settled.
    PoweredUp,
    /// Exercising the gate at this index.
    TestingGate(usize),
    /// Power removed.
    PoweredDown,
    /// Test finished.
    Done,
}

/// Progress reported to a [`VerifySink`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VerifyEvent<'r> {
    /// The state machine moved to a new phase.
    Phase(Phase),
    /// A row was sampled and compared.
    Row(&'r RowRecord),
}

/// Receiver for verification progress, in execution order.
pub trait VerifySink {
    /// Records one event.
    fn on_event(&mut self, event: VerifyEvent<'_>);
}

/// Drives one device through its truth tables over a [`PinPlane`].
pub struct TruthTableVerifier<'a, B, D> {
    plane: &'a mut PinPlane<B>,
    delay: &'a mut D,
    timing: Timing,
    sink: Option<&'a mut dyn VerifySink>,
    phase: Phase,
}

impl<B, D> fmt::Debug for TruthTableVerifier<'_, B, D> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TruthTableVerifier")
            .field("timing", &self.timing)
            .field("phase", &self.phase)
            .finish_non_exhaustive()
    }
}

impl<'a, B: BusTransport, D: Delay> TruthTableVerifier<'a, B, D> {
    /// Creates a verifier borrowing the plane and delay for its lifetime.
    pub fn new(plane: &'a mut PinPlane<B>, delay: &'a mut D, timing: Timing) -> Self {
        Self {
            plane,
            delay,
            timing,
            sink: None,
            phase: Phase::Idle,
        }
    }

    /// Reports progress to `sink`.
    #[must_use]
    pub fn with_sink(mut self, sink: &'a mut dyn VerifySink) -> Self {
        self.sink = Some(sink);
        self
    }

    /// Current phase; [`Phase::Done`] after every call to [`Self::verify`].
    #[must_use]
    pub const fn phase(&self) -> Phase {
        self.phase
    }

    /// Tests `spec` under `mode`.
    ///
    /// # Errors
    ///
    /// Returns the first [`BusError`]. Power-down is still attempted before
    /// returning; a power-down failure after an earlier error is logged and
    /// the earlier error wins.
    pub fn verify(&mut self, spec: &DeviceSpec, mode: Mode) -> Result<Verification, BusError> {
        self.enter(Phase::Idle);
        let outcome = self
            .power_up(spec.power)
            .and_then(|()| self.exercise(spec, mode));
        let power_down = self.power_down(spec.power);
        self.enter(Phase::Done);

        match (outcome, power_down) {
            (Ok(verification), Ok(())) => Ok(verification),
            (Ok(_), Err(error)) => Err(error),
            (Err(error), Err(power_error)) => {
                warn!(%power_error, "power-down after bus fault failed");
                Err(error)
            }
            (Err(error), Ok(())) => Err(error),
        }
    }

    fn enter(&mut self, phase: Phase) {
        self.phase = phase;
        if let Some(sink) = self.sink.as_deref_mut() {
            sink.on_event(VerifyEvent::Phase(phase));
        }
    }

    fn power_up(&mut self, power: Option<PowerPins>) -> Result<(), BusError> {
        if let Some(power) = power {
            self.plane.set_pin(power.vcc, Level::High)?;
            self.plane.set_pin(power.gnd, Level::Low)?;
            self.delay.delay(self.timing.power_settle);
        }
        self.enter(Phase::PoweredUp);
        Ok(())
    }

    fn power_down(&mut self, power: Option<PowerPins>) -> Result<(), BusError> {
        if let Some(power) = power {
            // Both rails high de-energises the device. Try GND even if VCC fails.
            let vcc = self.plane.set_pin(power.vcc, Level::High);
            let gnd = self.plane.set_pin(power.gnd, Level::High);
            vcc.and(gnd)?;
        }
        self.enter(Phase::PoweredDown);
        Ok(())
    }

    fn exercise(&mut self, spec: &DeviceSpec, mode: Mode) -> Result<Verification, BusError> {
        let mut result = Verification {
            passed: true,
            ..Verification::default()
        };

        for (gate_index, gate) in spec.gates.iter().enumerate() {
            self.enter(Phase::TestingGate(gate_index));
            result.gates_tested += 1;
            self.plane.set_pin(gate.output, Level::High)?;

            for (row_index, row) in gate.table.iter().enumerate() {
                for (&pin, &level) in gate.inputs.iter().zip(&row.inputs) {
                    self.plane.set_pin(pin, level)?;
                }
                self.delay.delay(self.timing.propagation);
                let actual = self.plane.get_pin(gate.output)?;

                let record = RowRecord {
                    gate: gate_index,
                    row: row_index,
                    inputs: row.inputs.clone(),
                    expected: row.expected,
                    actual,
                };
                if let Some(sink) = self.sink.as_deref_mut() {
                    sink.on_event(VerifyEvent::Row(&record));
                }

                let passed = record.passed();
                if !passed {
                    result.passed = false;
                    if result.mismatch.is_none() {
                        result.mismatch = Some(record.clone());
                    }
                }
                match mode {
                    Mode::Verbose => result.rows.push(record),
                    Mode::FailFast if !passed => {
                        debug!(
                            device = %spec.name,
                            gate = gate_index,
                            row = row_index,
                            "mismatch, aborting"
                        );
                        return Ok(result);
                    }
                    Mode::FailFast => {}
                }
            }
        }

        Ok(result)
    }
}
