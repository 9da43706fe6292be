//! Session driver behind the auto-identify and manual-test entry points.

use tracing::{info, warn};

use crate::bus::BusTransport;
use crate::catalog::{Catalog, CatalogEntry};
use crate::config::CheckerConfig;
use crate::identify::{AbortFlag, IdentificationEngine, IdentifyReport};
use crate::pins::PinPlane;
use crate::verify::{Delay, Mode, Timing, TruthTableVerifier, Verification, VerifySink};
use crate::{CheckerError, ConfigError};

/// Owns the pin plane and a validated catalog for one socket.
#[derive(Debug)]
pub struct Checker<B, D> {
    plane: PinPlane<B>,
    delay: D,
    timing: Timing,
    catalog: Catalog,
}

impl<B: BusTransport, D: Delay> Checker<B, D> {
    /// Validates `config` and `catalog` and builds the pin plane.
    ///
    /// No bus traffic happens here.
    ///
    /// # Errors
    ///
    /// Returns the first [`ConfigError`] found in the configuration or the
    /// catalog.
    pub fn new(
        bus: B,
        delay: D,
        config: &CheckerConfig,
        catalog: Catalog,
    ) -> Result<Self, ConfigError> {
        config.validate()?;
        let plane = PinPlane::new(bus, config.expanders.clone())?;
        catalog.validate(plane.pin_count())?;
        for (first, second) in catalog.indistinguishable() {
            warn!(first, second, "catalog entries are indistinguishable; {first} wins");
        }
        info!(
            devices = catalog.len(),
            expanders = plane.addresses().len(),
            "catalog loaded"
        );

        Ok(Self {
            plane,
            delay,
            timing: config.timing(),
            catalog,
        })
    }

    /// Validated catalog.
    #[must_use]
    pub const fn catalog(&self) -> &Catalog {
        &self.catalog
    }

    /// Pin plane, for diagnostics.
    #[must_use]
    pub const fn plane(&self) -> &PinPlane<B> {
        &self.plane
    }

    /// Mutable pin plane, for diagnostics and fault injection.
    pub fn plane_mut(&mut self) -> &mut PinPlane<B> {
        &mut self.plane
    }

    /// Settle times in use.
    #[must_use]
    pub const fn timing(&self) -> Timing {
        self.timing
    }

    /// Responding bus addresses. Diagnostic only.
    pub fn scan(&mut self) -> Vec<u8> {
        self.plane.bus_mut().scan()
    }

    /// Releases every expander pin and writes the state to hardware.
    ///
    /// # Errors
    ///
    /// Propagates the first transport failure.
    pub fn reset_socket(&mut self) -> Result<(), CheckerError> {
        self.plane.release_all().map_err(CheckerError::from)
    }

    /// Scans the catalog for the inserted device.
    pub fn run_auto_identify(&mut self, abort: &AbortFlag) -> IdentifyReport {
        IdentificationEngine::new(&mut self.plane, &mut self.delay, self.timing)
            .identify(&self.catalog, abort)
    }

    /// Tests the inserted device against `id` with full diagnostics.
    ///
    /// # Errors
    ///
    /// Returns [`CheckerError::UnknownDevice`] for identifiers missing from
    /// the catalog and [`CheckerError::Bus`] when the bus fails.
    pub fn run_manual_test(
        &mut self,
        id: &str,
    ) -> Result<(&CatalogEntry, Verification), CheckerError> {
        self.manual_test(id, None)
    }

    /// As [`Self::run_manual_test`], reporting progress to `sink` as rows
    /// are checked.
    ///
    /// # Errors
    ///
    /// As [`Self::run_manual_test`].
    pub fn run_manual_test_traced(
        &mut self,
        id: &str,
        sink: &mut dyn VerifySink,
    ) -> Result<(&CatalogEntry, Verification), CheckerError> {
        self.manual_test(id, Some(sink))
    }

    fn manual_test(
        &mut self,
        id: &str,
        sink: Option<&mut dyn VerifySink>,
    ) -> Result<(&CatalogEntry, Verification), CheckerError> {
        let entry = self
            .catalog
            .get(id)
            .ok_or_else(|| CheckerError::UnknownDevice {
                id: id.trim().to_owned(),
            })?;

        let mut verifier = TruthTableVerifier::new(&mut self.plane, &mut self.delay, self.timing);
        if let Some(sink) = sink {
            verifier = verifier.with_sink(sink);
        }
        let verification = verifier.verify(&entry.spec, Mode::Verbose)?;
        info!(device = %entry.id, passed = verification.passed, "manual test finished");
        Ok((entry, verification))
    }
}
