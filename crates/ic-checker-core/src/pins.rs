//! Logical pin numbering and the shadow-register pin plane.
//!
//! Logical pins number every expander pin across the bus: expander `n` in
//! the configured address list owns pins `16n..16n+16`, low byte first.
//!
//! The expanders have no direction register. A pin reads back an external
//! level only while this plane holds its latch bit at 1, so a gate output is
//! "made an input" by driving it high and letting the chip's low-impedance
//! output override the weak pull-up. Callers that sample a pin must set it
//! high first.

use std::fmt;

use serde::{Deserialize, Serialize};
use tracing::{trace, warn};

use crate::bus::BusTransport;
use crate::{BusError, ConfigError};

/// Index of one physical pin across the whole multi-expander bus.
pub type LogicalPin = u16;

/// Pins exposed by one expander.
pub const PINS_PER_DEVICE: u16 = 16;

/// Bits per output register.
pub const REGISTER_BITS: u16 = 8;

/// Output registers per expander; every write and read moves all of them.
pub const REGISTERS_PER_DEVICE: usize = 2;

const RELEASED: [u8; REGISTERS_PER_DEVICE] = [0xFF; REGISTERS_PER_DEVICE];

/// Binary logic level of a pin or truth-table cell.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "u8", into = "u8")]
pub enum Level {
    /// Logic 0.
    Low,
    /// Logic 1.
    High,
}

impl Level {
    /// Returns `true` for [`Level::High`].
    #[must_use]
    pub const fn is_high(self) -> bool {
        matches!(self, Self::High)
    }

    /// Numeric bit value (0 or 1).
    #[must_use]
    pub const fn as_u8(self) -> u8 {
        match self {
            Self::Low => 0,
            Self::High => 1,
        }
    }
}

impl From<bool> for Level {
    fn from(high: bool) -> Self {
        if high {
            Self::High
        } else {
            Self::Low
        }
    }
}

impl From<Level> for u8 {
    fn from(level: Level) -> Self {
        level.as_u8()
    }
}

impl TryFrom<u8> for Level {
    type Error = u8;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(Self::Low),
            1 => Ok(Self::High),
            other => Err(other),
        }
    }
}

impl fmt::Display for Level {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_u8())
    }
}

/// Position of a logical pin inside the expander chain.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct PinLocation {
    /// Index into the ordered expander address list.
    pub device_index: usize,
    /// Output register within the expander (0 or 1).
    pub register: usize,
    /// Bit offset within the register.
    pub bit: u8,
}

impl PinLocation {
    /// Single-bit mask selecting this pin in its register.
    #[must_use]
    pub const fn mask(self) -> u8 {
        1 << self.bit
    }
}

/// Maps a logical pin to its expander, register and bit. Pure.
#[must_use]
#[allow(clippy::cast_possible_truncation)]
pub const fn locate(pin: LogicalPin) -> PinLocation {
    let offset = pin % PINS_PER_DEVICE;
    PinLocation {
        device_index: (pin / PINS_PER_DEVICE) as usize,
        register: if offset < REGISTER_BITS { 0 } else { 1 },
        bit: (pin % REGISTER_BITS) as u8,
    }
}

/// Owner of the expander output-register shadow and the bus it flushes to.
///
/// Writes are cached-then-flushed: the shadow is updated first and the
/// whole register block for the owning device is written. Reads always go
/// live to hardware and never touch the shadow. If a write fails the shadow
/// is left ahead of the hardware; the device is marked stale and its next
/// write is always sent.
#[derive(Debug)]
pub struct PinPlane<B> {
    bus: B,
    addresses: Vec<u8>,
    shadow: Vec<[u8; REGISTERS_PER_DEVICE]>,
    stale: Vec<bool>,
}

impl<B: BusTransport> PinPlane<B> {
    /// Creates a plane over `addresses`, every pin released high.
    ///
    /// Every device starts stale, so the first write to each one is sent
    /// even if it does not change the shadow.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::NoExpanders`] for an empty list and
    /// [`ConfigError::DuplicateAddress`] for repeated addresses.
    pub fn new(bus: B, addresses: Vec<u8>) -> Result<Self, ConfigError> {
        validate_addresses(&addresses)?;
        let devices = addresses.len();
        Ok(Self {
            bus,
            addresses,
            shadow: vec![RELEASED; devices],
            stale: vec![true; devices],
        })
    }

    /// Ordered expander addresses.
    #[must_use]
    pub fn addresses(&self) -> &[u8] {
        &self.addresses
    }

    /// Number of logical pins exposed by all expanders.
    #[must_use]
    #[allow(clippy::cast_possible_truncation)]
    pub fn pin_count(&self) -> u16 {
        (self.addresses.len() as u16).saturating_mul(PINS_PER_DEVICE)
    }

    /// Resolves `pin` to its device address and location.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::PinOutOfRange`] when no expander owns `pin`.
    pub fn resolve(&self, pin: LogicalPin) -> Result<(u8, PinLocation), ConfigError> {
        let location = locate(pin);
        self.addresses
            .get(location.device_index)
            .map(|&address| (address, location))
            .ok_or_else(|| ConfigError::PinOutOfRange {
                device: "<plane>".into(),
                pin,
                pin_count: self.pin_count(),
            })
    }

    /// Shadow register block for `address`.
    #[must_use]
    pub fn shadow(&self, address: u8) -> Option<[u8; REGISTERS_PER_DEVICE]> {
        let index = self.addresses.iter().position(|&a| a == address)?;
        Some(self.shadow[index])
    }

    /// Returns `true` when the shadow of `address` may differ from hardware.
    #[must_use]
    pub fn is_stale(&self, address: u8) -> bool {
        self.addresses
            .iter()
            .position(|&a| a == address)
            .is_some_and(|index| self.stale[index])
    }

    /// Drives `pin` to `level` with a full-register write of its device.
    ///
    /// The write is skipped when the shadow already holds `level` and the
    /// device is not stale.
    ///
    /// # Errors
    ///
    /// Returns [`BusError::UnmappedPin`] for pins beyond the expander list
    /// and propagates transport failures. On failure the shadow has already
    /// been updated.
    pub fn set_pin(&mut self, pin: LogicalPin, level: Level) -> Result<(), BusError> {
        let location = locate(pin);
        let index = location.device_index;
        let address = *self
            .addresses
            .get(index)
            .ok_or(BusError::UnmappedPin { pin })?;

        let registers = &mut self.shadow[index];
        let before = registers[location.register];
        match level {
            Level::High => registers[location.register] |= location.mask(),
            Level::Low => registers[location.register] &= !location.mask(),
        }
        if registers[location.register] == before && !self.stale[index] {
            trace!(pin, %level, "pin already at level");
            return Ok(());
        }

        let bytes = *registers;
        trace!(pin, %level, address, ?bytes, "write");
        match self.bus.write(address, &bytes) {
            Ok(()) => {
                self.stale[index] = false;
                Ok(())
            }
            Err(error) => {
                self.stale[index] = true;
                warn!(pin, address, %error, "register write failed, shadow is ahead of hardware");
                Err(error)
            }
        }
    }

    /// Samples `pin` with a live full-register read of its device.
    ///
    /// # Errors
    ///
    /// Returns [`BusError::UnmappedPin`] for pins beyond the expander list,
    /// [`BusError::ReadLength`] when the reply is not exactly one frame, and
    /// propagates transport failures.
    pub fn get_pin(&mut self, pin: LogicalPin) -> Result<Level, BusError> {
        let location = locate(pin);
        let address = *self
            .addresses
            .get(location.device_index)
            .ok_or(BusError::UnmappedPin { pin })?;

        let bytes = self.bus.read(address, REGISTERS_PER_DEVICE)?;
        if bytes.len() != REGISTERS_PER_DEVICE {
            return Err(BusError::ReadLength {
                address,
                expected: REGISTERS_PER_DEVICE,
                actual: bytes.len(),
            });
        }
        let level = Level::from(bytes[location.register] & location.mask() != 0);
        trace!(pin, address, ?bytes, %level, "read");
        Ok(level)
    }

    /// Rewrites the shadow of every device to hardware.
    ///
    /// # Errors
    ///
    /// Stops at and returns the first transport failure.
    pub fn flush_all(&mut self) -> Result<(), BusError> {
        for index in 0..self.addresses.len() {
            let address = self.addresses[index];
            match self.bus.write(address, &self.shadow[index]) {
                Ok(()) => self.stale[index] = false,
                Err(error) => {
                    self.stale[index] = true;
                    return Err(error);
                }
            }
        }
        Ok(())
    }

    /// Releases every pin high and flushes all devices.
    ///
    /// # Errors
    ///
    /// Stops at and returns the first transport failure.
    pub fn release_all(&mut self) -> Result<(), BusError> {
        self.shadow.fill(RELEASED);
        self.flush_all()
    }

    /// Underlying transport.
    #[must_use]
    pub const fn bus(&self) -> &B {
        &self.bus
    }

    /// Mutable access to the underlying transport.
    pub fn bus_mut(&mut self) -> &mut B {
        &mut self.bus
    }

    /// Consumes the plane and returns the transport.
    pub fn into_bus(self) -> B {
        self.bus
    }
}

pub(crate) fn validate_addresses(addresses: &[u8]) -> Result<(), ConfigError> {
    if addresses.is_empty() {
        return Err(ConfigError::NoExpanders);
    }
    for (index, address) in addresses.iter().enumerate() {
        if addresses[..index].contains(address) {
            return Err(ConfigError::DuplicateAddress { address: *address });
        }
    }
    Ok(())
}
