//! Human-readable rendering of checker results.

use std::fmt;

use ic_checker_core::{
    CandidateOutcome, Catalog, CatalogEntry, Identification, IdentifyReport, Verification,
};

const RULE: &str = "=====================================";

/// Catalog listing, one entry per line.
pub struct CatalogListing<'a>(pub &'a Catalog);

impl fmt::Display for CatalogListing<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for entry in self.0.entries() {
            let power = entry.spec.power.map_or_else(
                || "external power".to_owned(),
                |power| format!("VCC {} / GND {}", power.vcc, power.gnd),
            );
            writeln!(
                f,
                "{:<10} {:<28} {} gates, {power}",
                entry.id,
                entry.spec.name,
                entry.spec.gates.len()
            )?;
        }
        Ok(())
    }
}

/// Auto-identification transcript.
pub struct IdentifySummary<'a> {
    /// Scan result.
    pub report: &'a IdentifyReport,
    /// Catalog the scan ran over, for device names.
    pub catalog: &'a Catalog,
}

impl fmt::Display for IdentifySummary<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "{RULE}")?;
        writeln!(f, "      AUTO-IDENTIFYING IC...")?;
        writeln!(f, "{RULE}")?;
        for candidate in &self.report.candidates {
            let verdict = match &candidate.outcome {
                CandidateOutcome::Passed => "PASS".to_owned(),
                CandidateOutcome::Failed => "FAIL".to_owned(),
                CandidateOutcome::BusFault(error) => format!("SKIPPED ({error})"),
            };
            writeln!(f, "[*] Scanning signatures for {}... {verdict}", candidate.id)?;
        }
        writeln!(f)?;

        match &self.report.identification {
            Identification::Match(id) => {
                let name = self
                    .catalog
                    .get(id)
                    .map_or("", |entry| entry.spec.name.as_str());
                writeln!(f, ">>> MATCH FOUND: {id} ({name}) <<<")
            }
            Identification::NoMatch => {
                writeln!(f, ">>> NO MATCH FOUND <<<")?;
                writeln!(
                    f,
                    "The IC is broken, inserted the wrong way round, or missing from the catalog."
                )
            }
            Identification::Inconclusive => {
                writeln!(f, ">>> NO MATCH FOUND <<<")?;
                writeln!(
                    f,
                    "Some candidates were skipped by bus faults; check the expander wiring."
                )
            }
            Identification::Aborted => writeln!(f, ">>> IDENTIFICATION ABORTED <<<"),
        }
    }
}

/// Row-by-row transcript of a manual test.
pub struct ManualTestSummary<'a> {
    /// Device tested.
    pub entry: &'a CatalogEntry,
    /// Verbose verification result.
    pub verification: &'a Verification,
}

impl fmt::Display for ManualTestSummary<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let entry = self.entry;
        writeln!(f, "{RULE}")?;
        writeln!(f, "Testing: {} ({})", entry.id, entry.spec.name)?;
        writeln!(f, "{RULE}")?;

        for (index, gate) in entry.spec.gates.iter().enumerate() {
            let mut rows = self
                .verification
                .rows
                .iter()
                .filter(|row| row.gate == index)
                .peekable();
            if rows.peek().is_none() {
                continue;
            }
            let inputs: Vec<String> = gate.inputs.iter().map(ToString::to_string).collect();
            writeln!(f)?;
            writeln!(
                f,
                "  [ Gate {} ] inputs {} -> output {}",
                index + 1,
                inputs.join(", "),
                gate.output
            )?;
            for row in rows {
                writeln!(f, "    {row}")?;
            }
        }

        writeln!(f)?;
        let verdict = if self.verification.passed {
            "PASSED"
        } else {
            "FAILED"
        };
        writeln!(f, ">>> RESULT: {} {verdict} <<<", entry.id)
    }
}

/// Expander scan result against the configured address list.
pub struct ScanSummary<'a> {
    /// Addresses that answered.
    pub found: &'a [u8],
    /// Addresses the configuration expects.
    pub expected: &'a [u8],
}

impl ScanSummary<'_> {
    /// Configured addresses that did not answer.
    pub fn missing(&self) -> impl Iterator<Item = u8> + '_ {
        self.expected
            .iter()
            .copied()
            .filter(|address| !self.found.contains(address))
    }
}

impl fmt::Display for ScanSummary<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let found: Vec<String> = self
            .found
            .iter()
            .map(|address| format!("{address:#04x}"))
            .collect();
        writeln!(f, "Devices found: [{}]", found.join(", "))?;
        for address in self.missing() {
            writeln!(f, "Missing expander {address:#04x}")?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use ic_checker_core::{
        AbortFlag, Catalog, ChipModel, IdentificationEngine, Mode, PinPlane, SimulatedSocket,
        StdDelay, Timing, TruthTableVerifier, DEFAULT_EXPANDERS,
    };

    use super::{CatalogListing, IdentifySummary, ManualTestSummary, ScanSummary};

    fn plane(chip: &str) -> PinPlane<SimulatedSocket> {
        let socket = SimulatedSocket::new(&DEFAULT_EXPANDERS)
            .with_chip(ChipModel::builtin(chip).expect("model"));
        PinPlane::new(socket, DEFAULT_EXPANDERS.to_vec()).expect("plane")
    }

    #[test]
    fn listing_names_every_builtin_entry() {
        let catalog = Catalog::builtin();
        let text = CatalogListing(&catalog).to_string();
        assert_eq!(text.lines().count(), catalog.len());
        assert!(text.starts_with("74LS00"));
        assert!(text.contains("VCC 38 / GND 47"));
    }

    #[test]
    fn identify_summary_reports_each_candidate_and_the_match() {
        let catalog = Catalog::builtin();
        let mut plane = plane("74LS08");
        let report = IdentificationEngine::new(&mut plane, &mut StdDelay, Timing::ZERO)
            .identify(&catalog, &AbortFlag::new());

        let text = IdentifySummary {
            report: &report,
            catalog: &catalog,
        }
        .to_string();
        assert!(text.contains("[*] Scanning signatures for 74LS00... FAIL"));
        assert!(text.contains("[*] Scanning signatures for 74LS08... PASS"));
        assert!(text.contains(">>> MATCH FOUND: 74LS08 (Quad 2-Input AND Gate) <<<"));
    }

    #[test]
    fn manual_summary_groups_rows_by_gate() {
        let catalog = Catalog::builtin();
        let entry = catalog.get("74LS00").expect("entry");
        let mut plane = plane("74LS00");
        let verification = TruthTableVerifier::new(&mut plane, &mut StdDelay, Timing::ZERO)
            .verify(&entry.spec, Mode::Verbose)
            .expect("no bus fault");

        let text = ManualTestSummary {
            entry,
            verification: &verification,
        }
        .to_string();
        assert!(text.contains("  [ Gate 1 ] inputs 41, 42 -> output 43"));
        assert!(text.contains("  [ Gate 4 ] inputs 36, 37 -> output 35"));
        assert!(text.contains("    In: (1, 1)  |  Exp: 0  |  Got: 0  PASS"));
        assert!(text.ends_with(">>> RESULT: 74LS00 PASSED <<<\n"));
    }

    #[test]
    fn scan_summary_lists_missing_expanders() {
        let summary = ScanSummary {
            found: &[0x20, 0x22],
            expected: &DEFAULT_EXPANDERS,
        };
        assert_eq!(summary.missing().collect::<Vec<_>>(), vec![0x21]);
        assert_eq!(
            summary.to_string(),
            "Devices found: [0x20, 0x22]\nMissing expander 0x21\n"
        );
    }
}
