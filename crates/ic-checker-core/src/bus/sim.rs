//! Simulated socket: quasi-bidirectional 16-bit expanders with a chip plugged in.
//!
//! Each expander holds two output-latch bytes. Reading a pin returns
//! `latch AND driven`: a latch bit at 0 sinks the pin low, a latch bit at 1
//! leaves a weak pull-up that the chip's own output can override. The chip
//! is powered only while its VCC latch is high and its GND latch is low;
//! an unpowered chip drives nothing and its outputs float high.

use std::collections::{BTreeMap, BTreeSet};

use tracing::trace;

use super::BusTransport;
use crate::catalog::{builtin_family, GateFunction, PowerPins};
use crate::pins::{locate, Level, LogicalPin, REGISTERS_PER_DEVICE};
use crate::BusError;

const RELEASED: [u8; REGISTERS_PER_DEVICE] = [0xFF; REGISTERS_PER_DEVICE];

/// One transaction observed by the simulated socket.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum BusOp {
    /// Full-register write.
    Write {
        /// Target device.
        address: u8,
        /// Bytes carried by the transaction.
        bytes: Vec<u8>,
    },
    /// Register read.
    Read {
        /// Target device.
        address: u8,
        /// Requested byte count.
        length: usize,
    },
}

impl BusOp {
    /// Device address targeted by this transaction.
    #[must_use]
    pub const fn address(&self) -> u8 {
        match self {
            Self::Write { address, .. } | Self::Read { address, .. } => *address,
        }
    }

    /// Returns `true` for reads.
    #[must_use]
    pub const fn is_read(&self) -> bool {
        matches!(self, Self::Read { .. })
    }
}

/// One combinational gate of a simulated chip, bound to socket pins.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GateModel {
    /// Socket pins sampled as gate inputs.
    pub inputs: Vec<LogicalPin>,
    /// Socket pin driven by the gate.
    pub output: LogicalPin,
    /// Logic function computed by the gate.
    pub function: GateFunction,
}

/// Behavioural model of the chip sitting in the socket.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChipModel {
    /// Supply pins; `None` models a chip powered independently of the socket.
    pub power: Option<PowerPins>,
    /// Gates evaluated on every read.
    pub gates: Vec<GateModel>,
}

impl ChipModel {
    /// Model of a built-in catalog family, looked up case-insensitively.
    #[must_use]
    pub fn builtin(id: &str) -> Option<Self> {
        let family = builtin_family(id)?;
        Some(Self {
            power: Some(family.power()),
            gates: family
                .gate_pins()
                .map(|(inputs, output)| GateModel {
                    inputs,
                    output,
                    function: family.function,
                })
                .collect(),
        })
    }

    fn powered(&self, level: impl Fn(LogicalPin) -> Level) -> bool {
        self.power
            .is_none_or(|power| level(power.vcc).is_high() && !level(power.gnd).is_high())
    }
}

/// In-process expander bus implementing [`BusTransport`].
#[derive(Debug, Clone)]
pub struct SimulatedSocket {
    addresses: Vec<u8>,
    latches: BTreeMap<u8, [u8; REGISTERS_PER_DEVICE]>,
    chip: Option<ChipModel>,
    log: Vec<BusOp>,
    nacking: BTreeSet<u8>,
    fail_at: BTreeSet<usize>,
    transactions: usize,
}

impl SimulatedSocket {
    /// Creates a socket with one expander per address, latches released high.
    ///
    /// Address order defines the logical pin numbering, as in
    /// [`crate::PinPlane`].
    #[must_use]
    pub fn new(addresses: &[u8]) -> Self {
        Self {
            addresses: addresses.to_vec(),
            latches: addresses.iter().map(|&address| (address, RELEASED)).collect(),
            chip: None,
            log: Vec::new(),
            nacking: BTreeSet::new(),
            fail_at: BTreeSet::new(),
            transactions: 0,
        }
    }

    /// Places `chip` in the socket.
    #[must_use]
    pub fn with_chip(mut self, chip: ChipModel) -> Self {
        self.chip = Some(chip);
        self
    }

    /// Swaps the socket content; `None` empties it.
    pub fn insert(&mut self, chip: Option<ChipModel>) {
        self.chip = chip;
    }

    /// Makes every transaction with `address` fail with [`BusError::Nack`].
    pub fn nack_address(&mut self, address: u8) {
        self.nacking.insert(address);
    }

    /// Makes the zero-based `n`th transaction fail once with [`BusError::Nack`].
    pub fn fail_transaction(&mut self, n: usize) {
        self.fail_at.insert(n);
    }

    /// Transactions attempted so far, including failed ones.
    #[must_use]
    pub fn log(&self) -> &[BusOp] {
        &self.log
    }

    /// Drains the transaction log.
    pub fn take_log(&mut self) -> Vec<BusOp> {
        std::mem::take(&mut self.log)
    }

    /// Current output-latch bytes of the expander at `address`.
    #[must_use]
    pub fn latch(&self, address: u8) -> Option<[u8; REGISTERS_PER_DEVICE]> {
        self.latches.get(&address).copied()
    }

    /// Level of the output latch behind `pin`; unmapped pins read high.
    #[must_use]
    pub fn latch_level(&self, pin: LogicalPin) -> Level {
        let location = locate(pin);
        self.addresses
            .get(location.device_index)
            .and_then(|address| self.latches.get(address))
            .map_or(Level::High, |registers| {
                Level::from(registers[location.register] & location.mask() != 0)
            })
    }

    /// Returns `true` while the inserted chip receives power.
    #[must_use]
    pub fn chip_powered(&self) -> bool {
        self.chip
            .as_ref()
            .is_some_and(|chip| chip.powered(|pin| self.latch_level(pin)))
    }

    fn admit(&mut self, op: BusOp) -> Result<(), BusError> {
        let address = op.address();
        let index = self.transactions;
        self.transactions += 1;
        trace!(?op, index, "simulated transaction");
        self.log.push(op);

        if self.fail_at.remove(&index)
            || self.nacking.contains(&address)
            || !self.latches.contains_key(&address)
        {
            return Err(BusError::Nack { address });
        }
        Ok(())
    }

    fn pins_driven_low(&self) -> BTreeSet<LogicalPin> {
        let Some(chip) = self.chip.as_ref() else {
            return BTreeSet::new();
        };
        if !chip.powered(|pin| self.latch_level(pin)) {
            return BTreeSet::new();
        }

        chip.gates
            .iter()
            .filter(|gate| {
                let inputs: Vec<bool> = gate
                    .inputs
                    .iter()
                    .map(|&pin| self.latch_level(pin).is_high())
                    .collect();
                !gate.function.evaluate(&inputs)
            })
            .map(|gate| gate.output)
            .collect()
    }

    fn sample(&self, address: u8) -> [u8; REGISTERS_PER_DEVICE] {
        let mut registers = self.latches.get(&address).copied().unwrap_or(RELEASED);
        for pin in self.pins_driven_low() {
            let location = locate(pin);
            if self.addresses.get(location.device_index) == Some(&address) {
                registers[location.register] &= !location.mask();
            }
        }
        registers
    }
}

impl BusTransport for SimulatedSocket {
    fn write(&mut self, address: u8, bytes: &[u8]) -> Result<(), BusError> {
        self.admit(BusOp::Write {
            address,
            bytes: bytes.to_vec(),
        })?;
        if let Some(registers) = self.latches.get_mut(&address) {
            for (latch, byte) in registers.iter_mut().zip(bytes) {
                *latch = *byte;
            }
        }
        Ok(())
    }

    fn read(&mut self, address: u8, length: usize) -> Result<Vec<u8>, BusError> {
        self.admit(BusOp::Read { address, length })?;
        let registers = self.sample(address);
        Ok(registers.iter().copied().cycle().take(length).collect())
    }

    fn scan(&mut self) -> Vec<u8> {
        self.latches
            .keys()
            .copied()
            .filter(|address| !self.nacking.contains(address))
            .collect()
    }
}
