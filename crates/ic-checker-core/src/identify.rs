//! Auto-identification: first catalog entry whose truth tables fully pass.

use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tracing::{debug, info, warn};

use crate::bus::BusTransport;
use crate::catalog::Catalog;
use crate::pins::PinPlane;
use crate::verify::{Delay, Mode, Timing, TruthTableVerifier};
use crate::BusError;

/// Externally raised stop request, checked between candidates only so that
/// a device is never left powered mid-row.
#[derive(Debug, Clone, Default)]
pub struct AbortFlag(Arc<AtomicBool>);

impl AbortFlag {
    /// Creates a lowered flag.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Requests a stop before the next candidate.
    pub fn raise(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    /// Lowers the flag again.
    pub fn clear(&self) {
        self.0.store(false, Ordering::SeqCst);
    }

    /// Returns `true` once a stop has been requested.
    #[must_use]
    pub fn is_raised(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// What happened to one candidate.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CandidateOutcome {
    /// Every row matched.
    Passed,
    /// A row mismatched.
    Failed,
    /// The bus failed; the candidate was skipped.
    BusFault(BusError),
}

/// Per-candidate line of an [`IdentifyReport`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CandidateReport {
    /// Catalog identifier.
    pub id: String,
    /// Candidate result.
    pub outcome: CandidateOutcome,
}

/// Overall identification verdict.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Identification {
    /// The first fully passing entry.
    Match(String),
    /// Every candidate was tested and failed logically.
    NoMatch,
    /// No candidate passed, but at least one was skipped by a bus fault.
    Inconclusive,
    /// Stopped by an [`AbortFlag`] before the catalog was exhausted.
    Aborted,
}

impl fmt::Display for Identification {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Match(id) => write!(f, "{id}"),
            Self::NoMatch => f.write_str("no match"),
            Self::Inconclusive => f.write_str("no match (some candidates skipped by bus faults)"),
            Self::Aborted => f.write_str("aborted"),
        }
    }
}

/// Result of one identification scan.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IdentifyReport {
    /// Verdict.
    pub identification: Identification,
    /// Candidates tried, in catalog order.
    pub candidates: Vec<CandidateReport>,
}

impl IdentifyReport {
    /// Identifier of the matched entry.
    #[must_use]
    pub fn matched(&self) -> Option<&str> {
        match &self.identification {
            Identification::Match(id) => Some(id.as_str()),
            _ => None,
        }
    }

    /// Candidates skipped because of bus faults.
    pub fn skipped(&self) -> impl Iterator<Item = (&str, &BusError)> {
        self.candidates
            .iter()
            .filter_map(|candidate| match &candidate.outcome {
                CandidateOutcome::BusFault(error) => Some((candidate.id.as_str(), error)),
                _ => None,
            })
    }
}

/// Runs fail-fast verification over a catalog until one entry passes.
pub struct IdentificationEngine<'a, B, D> {
    plane: &'a mut PinPlane<B>,
    delay: &'a mut D,
    timing: Timing,
}

impl<B, D> fmt::Debug for IdentificationEngine<'_, B, D> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("IdentificationEngine")
            .field("timing", &self.timing)
            .finish_non_exhaustive()
    }
}

impl<'a, B: BusTransport, D: Delay> IdentificationEngine<'a, B, D> {
    /// Creates an engine borrowing the plane and delay.
    pub fn new(plane: &'a mut PinPlane<B>, delay: &'a mut D, timing: Timing) -> Self {
        Self {
            plane,
            delay,
            timing,
        }
    }

    /// Tests candidates in catalog order and stops at the first pass.
    ///
    /// A bus fault skips the faulting candidate and the scan continues.
    /// When several entries would pass, only the first is reported.
    pub fn identify(&mut self, catalog: &Catalog, abort: &AbortFlag) -> IdentifyReport {
        let mut candidates = Vec::with_capacity(catalog.len());

        for entry in catalog.entries() {
            if abort.is_raised() {
                info!(next = %entry.id, "identification aborted");
                return IdentifyReport {
                    identification: Identification::Aborted,
                    candidates,
                };
            }

            debug!(candidate = %entry.id, "scanning signature");
            let outcome = match TruthTableVerifier::new(self.plane, self.delay, self.timing)
                .verify(&entry.spec, Mode::FailFast)
            {
                Ok(verification) if verification.passed => CandidateOutcome::Passed,
                Ok(_) => CandidateOutcome::Failed,
                Err(error) => {
                    warn!(candidate = %entry.id, %error, "bus fault, skipping candidate");
                    CandidateOutcome::BusFault(error)
                }
            };

            let passed = outcome == CandidateOutcome::Passed;
            candidates.push(CandidateReport {
                id: entry.id.clone(),
                outcome,
            });
            if passed {
                info!(device = %entry.id, "match found");
                return IdentifyReport {
                    identification: Identification::Match(entry.id.clone()),
                    candidates,
                };
            }
        }

        let identification = if candidates
            .iter()
            .any(|candidate| matches!(candidate.outcome, CandidateOutcome::BusFault(_)))
        {
            Identification::Inconclusive
        } else {
            Identification::NoMatch
        };
        info!(%identification, "catalog exhausted");
        IdentifyReport {
            identification,
            candidates,
        }
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::{
        AbortFlag, CandidateOutcome, CandidateReport, Identification, IdentificationEngine,
    };
    use crate::bus::{BusOp, ChipModel, SimulatedSocket};
    use crate::catalog::Catalog;
    use crate::pins::{Level, PinPlane};
    use crate::verify::{Delay, StdDelay, Timing};
    use crate::BusError;

    const ADDRESSES: [u8; 3] = [0x20, 0x21, 0x22];

    fn plane(chip: Option<&str>) -> PinPlane<SimulatedSocket> {
        let mut socket = SimulatedSocket::new(&ADDRESSES);
        socket.insert(chip.and_then(ChipModel::builtin));
        PinPlane::new(socket, ADDRESSES.to_vec()).expect("plane")
    }

    #[test]
    fn identifies_every_builtin_family() {
        let catalog = Catalog::builtin();
        for entry in catalog.entries() {
            let mut plane = plane(Some(entry.id.as_str()));
            let report = IdentificationEngine::new(&mut plane, &mut StdDelay, Timing::ZERO)
                .identify(&catalog, &AbortFlag::new());
            assert_eq!(report.matched(), Some(entry.id.as_str()));
        }
    }

    #[test]
    fn empty_socket_is_no_match() {
        let catalog = Catalog::builtin();
        let mut plane = plane(None);
        let report = IdentificationEngine::new(&mut plane, &mut StdDelay, Timing::ZERO)
            .identify(&catalog, &AbortFlag::new());

        assert_eq!(report.identification, Identification::NoMatch);
        assert_eq!(report.candidates.len(), catalog.len());
        assert!(report
            .candidates
            .iter()
            .all(|candidate| candidate.outcome == CandidateOutcome::Failed));
    }

    #[test]
    fn raised_flag_stops_before_first_candidate() {
        let catalog = Catalog::builtin();
        let mut plane = plane(Some("74LS00"));
        let abort = AbortFlag::new();
        abort.raise();

        let report = IdentificationEngine::new(&mut plane, &mut StdDelay, Timing::ZERO)
            .identify(&catalog, &abort);

        assert_eq!(report.identification, Identification::Aborted);
        assert!(report.candidates.is_empty());
        assert!(plane.bus().log().is_empty());
    }

    /// Raises the flag during the first propagation wait.
    struct RaiseDuringPropagation {
        abort: AbortFlag,
        propagation: Duration,
        waits: usize,
    }

    impl Delay for RaiseDuringPropagation {
        fn delay(&mut self, duration: Duration) {
            if duration == self.propagation {
                self.waits += 1;
                self.abort.raise();
            }
        }
    }

    #[test]
    fn flag_raised_mid_candidate_is_honoured_after_power_down() {
        let catalog = Catalog::builtin();
        // AND chip: the first candidate (NAND) mismatches on its first row.
        let mut plane = plane(Some("74LS08"));
        let abort = AbortFlag::new();
        let timing = Timing {
            power_settle: Duration::ZERO,
            propagation: Duration::from_millis(50),
        };
        let mut delay = RaiseDuringPropagation {
            abort: abort.clone(),
            propagation: timing.propagation,
            waits: 0,
        };

        let report =
            IdentificationEngine::new(&mut plane, &mut delay, timing).identify(&catalog, &abort);

        assert_eq!(report.identification, Identification::Aborted);
        assert_eq!(
            report.candidates,
            vec![CandidateReport {
                id: "74LS00".into(),
                outcome: CandidateOutcome::Failed,
            }]
        );
        assert_eq!(delay.waits, 1);

        // GND is pin 47: device 0x22, second register, top bit.
        let last = plane.bus().log().last().cloned();
        assert!(matches!(
            last,
            Some(BusOp::Write { address: 0x22, ref bytes }) if bytes[1] & 0x80 != 0
        ));
        assert_eq!(plane.bus().latch_level(38), Level::High);
        assert_eq!(plane.bus().latch_level(47), Level::High);
        assert!(!plane.bus().chip_powered());
    }

    #[test]
    fn unreachable_expander_makes_scan_inconclusive() {
        let catalog = Catalog::builtin();
        let mut plane = plane(Some("74LS00"));
        plane.bus_mut().nack_address(0x22);

        let report = IdentificationEngine::new(&mut plane, &mut StdDelay, Timing::ZERO)
            .identify(&catalog, &AbortFlag::new());

        assert_eq!(report.identification, Identification::Inconclusive);
        assert_eq!(report.skipped().count(), catalog.len());
        assert!(report
            .skipped()
            .all(|(_, error)| *error == BusError::Nack { address: 0x22 }));
        assert_eq!(
            Identification::Inconclusive.to_string(),
            "no match (some candidates skipped by bus faults)"
        );
    }
}
