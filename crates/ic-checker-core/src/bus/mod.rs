//! Bus transport contract and the adapters built on top of it.

/// In-process expander bus with an optional simulated chip in the socket.
pub mod sim;
/// Deadline-bounded transport wrapper.
pub mod timed;

pub use sim::{BusOp, ChipModel, GateModel, SimulatedSocket};
pub use timed::TimedBus;

use crate::BusError;

/// Synchronous, possibly failing transaction primitive over a shared addressable bus.
///
/// Expanders have no per-bit write primitive: every write carries the full
/// output-register block for one device.
pub trait BusTransport {
    /// Writes `bytes` to the device at `address` in one transaction.
    ///
    /// # Errors
    ///
    /// Returns a [`BusError`] when the device does not acknowledge or the
    /// adapter fails.
    fn write(&mut self, address: u8, bytes: &[u8]) -> Result<(), BusError>;

    /// Reads `length` bytes from the device at `address` in one transaction.
    ///
    /// # Errors
    ///
    /// Returns a [`BusError`] when the device does not acknowledge or the
    /// adapter fails.
    fn read(&mut self, address: u8, length: usize) -> Result<Vec<u8>, BusError>;

    /// Enumerates responding addresses. Diagnostic only.
    fn scan(&mut self) -> Vec<u8>;
}

impl<T: BusTransport + ?Sized> BusTransport for &mut T {
    fn write(&mut self, address: u8, bytes: &[u8]) -> Result<(), BusError> {
        (**self).write(address, bytes)
    }

    fn read(&mut self, address: u8, length: usize) -> Result<Vec<u8>, BusError> {
        (**self).read(address, length)
    }

    fn scan(&mut self) -> Vec<u8> {
        (**self).scan()
    }
}

impl<T: BusTransport + ?Sized> BusTransport for Box<T> {
    fn write(&mut self, address: u8, bytes: &[u8]) -> Result<(), BusError> {
        (**self).write(address, bytes)
    }

    fn read(&mut self, address: u8, length: usize) -> Result<Vec<u8>, BusError> {
        (**self).read(address, length)
    }

    fn scan(&mut self) -> Vec<u8> {
        (**self).scan()
    }
}
