//! Core crate for the IC checker: expander pin plane, truth-table
//! verification and catalog-driven identification of DIP logic devices.

/// Error taxonomy for bus, configuration and session failures.
pub mod error;
pub use error::{BusError, CheckerError, ConfigError};

/// Byte-level expander bus transport and its simulated and deadline-bound
/// implementations.
pub mod bus;
pub use bus::{BusOp, BusTransport, ChipModel, GateModel, SimulatedSocket, TimedBus};

/// Logical pin numbering and the shadowed expander output registers.
pub mod pins;
pub use pins::{
    locate, Level, LogicalPin, PinLocation, PinPlane, PINS_PER_DEVICE, REGISTERS_PER_DEVICE,
    REGISTER_BITS,
};

/// Device catalog, truth tables and built-in 7400-series families.
pub mod catalog;
pub use catalog::{
    dip14_pin, Catalog, CatalogEntry, DeviceSpec, GateFunction, GateSpec, PowerPins, TruthRow,
};

/// Power-sequenced truth-table verification of one device.
pub mod verify;
pub use verify::{
    Delay, Mode, Phase, RowRecord, StdDelay, Timing, TruthTableVerifier, Verification,
    VerifyEvent, VerifySink, DEFAULT_POWER_SETTLE, DEFAULT_PROPAGATION,
};

/// Catalog scan that names the inserted device.
pub mod identify;
pub use identify::{
    AbortFlag, CandidateOutcome, CandidateReport, Identification, IdentificationEngine,
    IdentifyReport,
};

/// Checker configuration file.
pub mod config;
pub use config::{CheckerConfig, DEFAULT_BUS_TIMEOUT_MS, DEFAULT_EXPANDERS};

/// Session driver tying configuration, catalog and pin plane together.
pub mod session;
pub use session::Checker;

#[cfg(test)]
use proptest as _;
