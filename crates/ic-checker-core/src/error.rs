//! Error taxonomy shared by the bus, the catalog loader and the session.

use std::time::Duration;

use thiserror::Error;

/// Transport-level failures surfaced by a [`crate::BusTransport`].
#[derive(Debug, Clone, PartialEq, Eq, Hash, Error)]
pub enum BusError {
    /// The addressed expander did not acknowledge the transaction.
    #[error("device 0x{address:02X} did not acknowledge")]
    Nack {
        /// Bus address of the silent device.
        address: u8,
    },
    /// The transaction did not complete before its deadline.
    #[error("transaction with device 0x{address:02X} timed out after {timeout:?}")]
    Timeout {
        /// Bus address of the device being accessed.
        address: u8,
        /// Deadline that expired.
        timeout: Duration,
    },
    /// A read returned a byte count other than the one requested.
    #[error("device 0x{address:02X} returned {actual} bytes, expected {expected}")]
    ReadLength {
        /// Bus address of the device being read.
        address: u8,
        /// Requested byte count.
        expected: usize,
        /// Received byte count.
        actual: usize,
    },
    /// The logical pin is not owned by any configured expander.
    #[error("pin {pin} is not mapped to any expander")]
    UnmappedPin {
        /// Offending logical pin.
        pin: u16,
    },
    /// The transport worker is gone and can no longer serve transactions.
    #[error("bus transport disconnected")]
    Disconnected,
    /// Any other adapter-specific failure.
    #[error("transport failure on device 0x{address:02X}: {reason}")]
    Transport {
        /// Bus address of the device being accessed.
        address: u8,
        /// Adapter-provided description.
        reason: String,
    },
}

impl BusError {
    /// Returns the device address involved in the failure, when known.
    #[must_use]
    pub const fn address(&self) -> Option<u8> {
        match self {
            Self::Nack { address }
            | Self::Timeout { address, .. }
            | Self::ReadLength { address, .. }
            | Self::Transport { address, .. } => Some(*address),
            Self::UnmappedPin { .. } | Self::Disconnected => None,
        }
    }
}

/// Malformed catalog or checker configuration, detected before any bus I/O.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigError {
    /// A pin index lies beyond the pins exposed by the configured expanders.
    #[error("{device}: pin {pin} is out of range (socket has {pin_count} pins)")]
    PinOutOfRange {
        /// Catalog identifier of the offending device, or `"<plane>"`.
        device: String,
        /// Offending logical pin.
        pin: u16,
        /// Number of logical pins available.
        pin_count: u16,
    },
    /// A truth-table row does not carry one value per input plus the expected output.
    #[error("{device}: gate {gate} row {row} has {actual} input values, expected {expected}")]
    RowArity {
        /// Catalog identifier of the offending device.
        device: String,
        /// Zero-based gate index.
        gate: usize,
        /// Zero-based row index.
        row: usize,
        /// Number of gate inputs.
        expected: usize,
        /// Number of input values found in the row.
        actual: usize,
    },
    /// A truth-table cell holds something other than 0 or 1.
    #[error("{device}: gate {gate} row {row} holds non-binary value {value}")]
    NonBinaryLevel {
        /// Catalog identifier of the offending device.
        device: String,
        /// Zero-based gate index.
        gate: usize,
        /// Zero-based row index.
        row: usize,
        /// Offending raw value.
        value: u8,
    },
    /// A truth-table row has no cells at all.
    #[error("{device}: gate {gate} row {row} is empty")]
    EmptyRow {
        /// Catalog identifier of the offending device.
        device: String,
        /// Zero-based gate index.
        gate: usize,
        /// Zero-based row index.
        row: usize,
    },
    /// A device declares no gates to test.
    #[error("{device}: no gates declared")]
    NoGates {
        /// Catalog identifier of the offending device.
        device: String,
    },
    /// A pin is used both as a power pin and elsewhere, or VCC equals GND.
    #[error("{device}: power pin {pin} conflicts with another pin assignment")]
    PowerPinConflict {
        /// Catalog identifier of the offending device.
        device: String,
        /// Conflicting logical pin.
        pin: u16,
    },
    /// Two catalog entries share an identifier.
    #[error("duplicate catalog identifier {id}")]
    DuplicateIdentifier {
        /// Repeated identifier.
        id: String,
    },
    /// No expander addresses are configured.
    #[error("no expander addresses configured")]
    NoExpanders,
    /// The same expander address is listed twice.
    #[error("expander address 0x{address:02X} listed more than once")]
    DuplicateAddress {
        /// Repeated address.
        address: u8,
    },
    /// A catalog or configuration document could not be parsed.
    #[error("parse error: {0}")]
    Parse(String),
    /// A catalog or configuration file could not be read.
    #[error("i/o error: {0}")]
    Io(String),
}

/// Failures reported by the session entry points.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CheckerError {
    /// Bus failure outside a per-candidate context.
    #[error(transparent)]
    Bus(#[from] BusError),
    /// Catalog or configuration rejected at load time.
    #[error(transparent)]
    Config(#[from] ConfigError),
    /// Manual test requested for an identifier missing from the catalog.
    #[error("unknown device {id}")]
    UnknownDevice {
        /// Requested identifier.
        id: String,
    },
}
