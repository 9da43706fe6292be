//! Device catalog: static descriptions of the ICs the checker can recognise.
//!
//! Catalogs are validated once, at load, against the pin count of the
//! configured expanders. Nothing here touches the bus.

use std::collections::BTreeSet;
use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::pins::{Level, LogicalPin};
use crate::ConfigError;

/// Supply pins of a device. Driven high/low around a test, both high after.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PowerPins {
    /// Pin driven high to power the device.
    pub vcc: LogicalPin,
    /// Pin driven low to power the device.
    pub gnd: LogicalPin,
}

/// One truth-table row: input stimulus and the expected output.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct TruthRow {
    /// Levels applied to the gate inputs, in the gate's input order.
    pub inputs: Vec<Level>,
    /// Level expected on the gate output.
    pub expected: Level,
}

impl TruthRow {
    /// Builds a row from raw bits: `inputs ++ [expected]`.
    ///
    /// Returns `None` when `bits` is empty or holds a value other than 0/1.
    #[must_use]
    pub fn from_bits(bits: &[u8]) -> Option<Self> {
        let (&expected, inputs) = bits.split_last()?;
        Some(Self {
            inputs: inputs
                .iter()
                .map(|&bit| Level::try_from(bit).ok())
                .collect::<Option<_>>()?,
            expected: Level::try_from(expected).ok()?,
        })
    }

    fn to_bits(&self) -> Vec<u8> {
        self.inputs
            .iter()
            .chain(std::iter::once(&self.expected))
            .map(|level| level.as_u8())
            .collect()
    }
}

/// One gate of a device: its inputs, output and expected behaviour.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct GateSpec {
    /// Input pins in the order truth-table rows list them.
    pub inputs: Vec<LogicalPin>,
    /// Output pin sampled after each row.
    pub output: LogicalPin,
    /// Rows exercised in order. Exhaustiveness is not enforced.
    pub table: Vec<TruthRow>,
}

/// Static description of one IC.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct DeviceSpec {
    /// Human-readable name, e.g. "Quad 2-Input NAND Gate".
    pub name: String,
    /// Optional longer description.
    pub description: Option<String>,
    /// Supply pins, when the socket powers the device.
    pub power: Option<PowerPins>,
    /// Gates exercised in order.
    pub gates: Vec<GateSpec>,
}

/// Catalog entry: identifier plus device description.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CatalogEntry {
    /// Identifier such as `74LS00`.
    pub id: String,
    /// Device description.
    pub spec: DeviceSpec,
}

/// Ordered device catalog. Order decides which entry wins identification.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Catalog {
    entries: Vec<CatalogEntry>,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
struct RawEntry {
    id: String,
    name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    power: Option<PowerPins>,
    gates: Vec<RawGate>,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
struct RawGate {
    inputs: Vec<LogicalPin>,
    output: LogicalPin,
    table: Vec<Vec<u8>>,
}

impl RawEntry {
    fn into_entry(self) -> Result<CatalogEntry, ConfigError> {
        let id = self.id;
        let gates = self
            .gates
            .into_iter()
            .enumerate()
            .map(|(gate_index, gate)| -> Result<GateSpec, ConfigError> {
                let table = gate
                    .table
                    .iter()
                    .enumerate()
                    .map(|(row_index, bits)| parse_row(&id, gate_index, row_index, bits))
                    .collect::<Result<Vec<_>, _>>()?;
                Ok(GateSpec {
                    inputs: gate.inputs,
                    output: gate.output,
                    table,
                })
            })
            .collect::<Result<Vec<_>, _>>()?;

        Ok(CatalogEntry {
            spec: DeviceSpec {
                name: self.name,
                description: self.description,
                power: self.power,
                gates,
            },
            id,
        })
    }

    fn from_entry(entry: &CatalogEntry) -> Self {
        Self {
            id: entry.id.clone(),
            name: entry.spec.name.clone(),
            description: entry.spec.description.clone(),
            power: entry.spec.power,
            gates: entry
                .spec
                .gates
                .iter()
                .map(|gate| RawGate {
                    inputs: gate.inputs.clone(),
                    output: gate.output,
                    table: gate.table.iter().map(TruthRow::to_bits).collect(),
                })
                .collect(),
        }
    }
}

fn parse_row(device: &str, gate: usize, row: usize, bits: &[u8]) -> Result<TruthRow, ConfigError> {
    if bits.is_empty() {
        return Err(ConfigError::EmptyRow {
            device: device.to_owned(),
            gate,
            row,
        });
    }
    if let Some(&value) = bits.iter().find(|&&bit| bit > 1) {
        return Err(ConfigError::NonBinaryLevel {
            device: device.to_owned(),
            gate,
            row,
            value,
        });
    }
    TruthRow::from_bits(bits).ok_or_else(|| ConfigError::Parse(format!("{device}: bad row {row}")))
}

impl Catalog {
    /// Wraps `entries` without validating them; see [`Catalog::validate`].
    #[must_use]
    pub const fn new(entries: Vec<CatalogEntry>) -> Self {
        Self { entries }
    }

    /// Built-in 14-pin DIP logic families, original database order first.
    #[must_use]
    pub fn builtin() -> Self {
        Self::new(BUILTIN_FAMILIES.iter().map(BuiltinFamily::entry).collect())
    }

    /// Parses a JSON catalog.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Parse`] for malformed JSON and the row errors
    /// [`ConfigError::EmptyRow`] and [`ConfigError::NonBinaryLevel`].
    pub fn from_json(text: &str) -> Result<Self, ConfigError> {
        let raw: Vec<RawEntry> =
            serde_json::from_str(text).map_err(|error| ConfigError::Parse(error.to_string()))?;
        raw.into_iter()
            .map(RawEntry::into_entry)
            .collect::<Result<_, _>>()
            .map(Self::new)
    }

    /// Reads and parses a JSON catalog file.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Io`] when the file cannot be read, otherwise as
    /// [`Catalog::from_json`].
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let text = fs::read_to_string(path)
            .map_err(|error| ConfigError::Io(format!("{}: {error}", path.display())))?;
        Self::from_json(&text)
    }

    /// Serialises the catalog in the schema accepted by [`Catalog::from_json`].
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Parse`] if serialisation fails.
    pub fn to_json(&self) -> Result<String, ConfigError> {
        let raw: Vec<RawEntry> = self.entries.iter().map(RawEntry::from_entry).collect();
        serde_json::to_string_pretty(&raw).map_err(|error| ConfigError::Parse(error.to_string()))
    }

    /// Entries in identification order.
    #[must_use]
    pub fn entries(&self) -> &[CatalogEntry] {
        &self.entries
    }

    /// Number of entries.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns `true` for an empty catalog.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Looks an entry up by identifier, ignoring case and surrounding blanks.
    #[must_use]
    pub fn get(&self, id: &str) -> Option<&CatalogEntry> {
        let id = id.trim();
        self.entries
            .iter()
            .find(|entry| entry.id.eq_ignore_ascii_case(id))
    }

    /// Checks every entry against a socket of `pin_count` logical pins.
    ///
    /// # Errors
    ///
    /// Returns the first [`ConfigError`] found, in catalog order.
    pub fn validate(&self, pin_count: u16) -> Result<(), ConfigError> {
        let mut seen = BTreeSet::new();
        for entry in &self.entries {
            if !seen.insert(entry.id.to_ascii_uppercase()) {
                return Err(ConfigError::DuplicateIdentifier {
                    id: entry.id.clone(),
                });
            }
            validate_device(&entry.id, &entry.spec, pin_count)?;
        }
        Ok(())
    }

    /// Pairs of entries no test can tell apart. The first of each pair
    /// shadows the second during identification.
    #[must_use]
    pub fn indistinguishable(&self) -> Vec<(&str, &str)> {
        let mut pairs = Vec::new();
        for (index, first) in self.entries.iter().enumerate() {
            for second in &self.entries[index + 1..] {
                if first.spec.power == second.spec.power && first.spec.gates == second.spec.gates {
                    pairs.push((first.id.as_str(), second.id.as_str()));
                }
            }
        }
        pairs
    }
}

fn validate_device(id: &str, spec: &DeviceSpec, pin_count: u16) -> Result<(), ConfigError> {
    let out_of_range = |pin: LogicalPin| ConfigError::PinOutOfRange {
        device: id.to_owned(),
        pin,
        pin_count,
    };

    if spec.gates.is_empty() {
        return Err(ConfigError::NoGates {
            device: id.to_owned(),
        });
    }

    let mut signal_pins = BTreeSet::new();
    for (gate_index, gate) in spec.gates.iter().enumerate() {
        for &pin in gate.inputs.iter().chain(std::iter::once(&gate.output)) {
            if pin >= pin_count {
                return Err(out_of_range(pin));
            }
            signal_pins.insert(pin);
        }
        for (row_index, row) in gate.table.iter().enumerate() {
            if row.inputs.len() != gate.inputs.len() {
                return Err(ConfigError::RowArity {
                    device: id.to_owned(),
                    gate: gate_index,
                    row: row_index,
                    expected: gate.inputs.len(),
                    actual: row.inputs.len(),
                });
            }
        }
    }

    if let Some(power) = spec.power {
        for pin in [power.vcc, power.gnd] {
            if pin >= pin_count {
                return Err(out_of_range(pin));
            }
            if signal_pins.contains(&pin) {
                return Err(ConfigError::PowerPinConflict {
                    device: id.to_owned(),
                    pin,
                });
            }
        }
        if power.vcc == power.gnd {
            return Err(ConfigError::PowerPinConflict {
                device: id.to_owned(),
                pin: power.vcc,
            });
        }
    }
    Ok(())
}

/// Combinational function of one gate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum GateFunction {
    /// All inputs high.
    And,
    /// Not all inputs high.
    Nand,
    /// Any input high.
    Or,
    /// No input high.
    Nor,
    /// Odd number of inputs high.
    Xor,
    /// Even number of inputs high.
    Xnor,
    /// Inverts its single input.
    Not,
    /// Repeats its single input.
    Buffer,
}

impl GateFunction {
    /// Output level for `inputs`.
    #[must_use]
    pub fn evaluate(self, inputs: &[bool]) -> bool {
        let high = inputs.iter().filter(|&&input| input).count();
        match self {
            Self::And => high == inputs.len(),
            Self::Nand => high != inputs.len(),
            Self::Or => high > 0,
            Self::Nor => high == 0,
            Self::Xor => high % 2 == 1,
            Self::Xnor => high % 2 == 0,
            Self::Not => !inputs.first().copied().unwrap_or(false),
            Self::Buffer => inputs.first().copied().unwrap_or(false),
        }
    }

    /// Exhaustive truth table over `arity` inputs, counting up from all-low
    /// with the first input as the most significant bit.
    #[must_use]
    pub fn truth_table(self, arity: usize) -> Vec<TruthRow> {
        (0..1usize << arity)
            .map(|combination| {
                let bits: Vec<bool> = (0..arity)
                    .map(|position| (combination >> (arity - 1 - position)) & 1 == 1)
                    .collect();
                TruthRow {
                    expected: Level::from(self.evaluate(&bits)),
                    inputs: bits.into_iter().map(Level::from).collect(),
                }
            })
            .collect()
    }
}

/// Maps a 14-pin DIP chip pin (1..=14) to the socket's logical pin.
///
/// Chip pins 1..=7 sit on logical pins 41..=47 and chip pins 8..=14 on
/// logical pins 32..=38 (third expander).
#[must_use]
pub const fn dip14_pin(chip_pin: u8) -> LogicalPin {
    if chip_pin <= 7 {
        40 + chip_pin as LogicalPin
    } else {
        24 + chip_pin as LogicalPin
    }
}

const DIP14_VCC: u8 = 14;
const DIP14_GND: u8 = 7;

// (inputs, output) in chip pin numbers.
type Pinout = &'static [(&'static [u8], u8)];

const QUAD_2_INPUT: Pinout = &[(&[1, 2], 3), (&[4, 5], 6), (&[9, 10], 8), (&[12, 13], 11)];
const QUAD_2_INPUT_NOR: Pinout = &[(&[2, 3], 1), (&[5, 6], 4), (&[8, 9], 10), (&[11, 12], 13)];
const HEX_1_INPUT: Pinout = &[
    (&[1], 2),
    (&[3], 4),
    (&[5], 6),
    (&[9], 8),
    (&[11], 10),
    (&[13], 12),
];

/// Built-in 14-pin DIP logic family.
#[derive(Debug)]
pub(crate) struct BuiltinFamily {
    id: &'static str,
    name: &'static str,
    description: &'static str,
    pinout: Pinout,
    pub(crate) function: GateFunction,
}

impl BuiltinFamily {
    pub(crate) const fn power(&self) -> PowerPins {
        PowerPins {
            vcc: dip14_pin(DIP14_VCC),
            gnd: dip14_pin(DIP14_GND),
        }
    }

    pub(crate) fn gate_pins(&self) -> impl Iterator<Item = (Vec<LogicalPin>, LogicalPin)> + '_ {
        self.pinout.iter().map(|(inputs, output)| {
            (
                inputs.iter().map(|&pin| dip14_pin(pin)).collect(),
                dip14_pin(*output),
            )
        })
    }

    fn entry(&self) -> CatalogEntry {
        CatalogEntry {
            id: self.id.to_owned(),
            spec: DeviceSpec {
                name: self.name.to_owned(),
                description: Some(self.description.to_owned()),
                power: Some(self.power()),
                gates: self
                    .gate_pins()
                    .map(|(inputs, output)| GateSpec {
                        table: self.function.truth_table(inputs.len()),
                        inputs,
                        output,
                    })
                    .collect(),
            },
        }
    }
}

static BUILTIN_FAMILIES: [BuiltinFamily; 6] = [
    BuiltinFamily {
        id: "74LS00",
        name: "Quad 2-Input NAND Gate",
        description: "Contains four independent 2-input NAND gates.",
        pinout: QUAD_2_INPUT,
        function: GateFunction::Nand,
    },
    BuiltinFamily {
        id: "74LS08",
        name: "Quad 2-Input AND Gate",
        description: "Contains four independent 2-input AND gates.",
        pinout: QUAD_2_INPUT,
        function: GateFunction::And,
    },
    BuiltinFamily {
        id: "74LS02",
        name: "Quad 2-Input NOR Gate",
        description: "Contains four independent 2-input NOR gates.",
        pinout: QUAD_2_INPUT_NOR,
        function: GateFunction::Nor,
    },
    BuiltinFamily {
        id: "74LS04",
        name: "Hex Inverter",
        description: "Contains six independent inverters.",
        pinout: HEX_1_INPUT,
        function: GateFunction::Not,
    },
    BuiltinFamily {
        id: "74LS32",
        name: "Quad 2-Input OR Gate",
        description: "Contains four independent 2-input OR gates.",
        pinout: QUAD_2_INPUT,
        function: GateFunction::Or,
    },
    BuiltinFamily {
        id: "74LS86",
        name: "Quad 2-Input XOR Gate",
        description: "Contains four independent 2-input exclusive-OR gates.",
        pinout: QUAD_2_INPUT,
        function: GateFunction::Xor,
    },
];

/// Built-in family for `id`, ignoring case and surrounding blanks.
pub(crate) fn builtin_family(id: &str) -> Option<&'static BuiltinFamily> {
    let id = id.trim();
    BUILTIN_FAMILIES
        .iter()
        .find(|family| family.id.eq_ignore_ascii_case(id))
}
