//! CLI entry point for the IC checker.
//!
//! Drives a simulated expander socket; `--socket` chooses the chip placed in
//! it.

mod report;

use std::io::{self, BufRead, Write};
use std::path::PathBuf;
use std::process::ExitCode;

use clap::{ArgAction, Parser, Subcommand};
use ic_checker_core::{
    AbortFlag, BusTransport, Catalog, Checker, CheckerConfig, CheckerError, ChipModel, Delay,
    Identification, SimulatedSocket, StdDelay, TimedBus,
};
use tracing::{info, warn, Level};

use crate::report::{CatalogListing, IdentifySummary, ManualTestSummary, ScanSummary};

#[cfg(test)]
use assert_cmd as _;
#[cfg(test)]
use predicates as _;
#[cfg(test)]
use tempfile as _;

const EXIT_PASS: u8 = 0;
const EXIT_FAIL: u8 = 1;
const EXIT_CONFIG: u8 = 2;

#[derive(Debug, Parser)]
#[command(name = "ic-checker")]
#[command(
    about = "Identify and test 14-pin DIP logic ICs through I2C port expanders",
    long_about = None
)]
#[command(version)]
struct Cli {
    /// Checker configuration file (JSON)
    #[arg(long, global = true, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Device catalog file (JSON); the built-in 7400-series catalog otherwise
    #[arg(long, global = true, value_name = "FILE")]
    catalog: Option<PathBuf>,

    /// Chip placed in the simulated socket, or `empty`
    #[arg(long, global = true, value_name = "IC", default_value = "74LS08")]
    socket: String,

    /// Raise log verbosity (-v info, -vv debug, -vvv trace)
    #[arg(short, long, global = true, action = ArgAction::Count)]
    verbose: u8,

    /// Skip settle delays; only safe against the simulated socket
    #[arg(long, global = true)]
    fast: bool,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Debug, PartialEq, Eq, Subcommand)]
enum Commands {
    /// Scan the catalog for the inserted IC
    Identify,
    /// Test the inserted IC against one catalog entry, row by row
    Test {
        /// Catalog identifier, e.g. 74LS00
        #[arg(value_name = "IC")]
        ic: String,
    },
    /// List catalog entries
    List,
    /// Scan the bus for expanders
    Scan,
    /// Interactive menu (default)
    Menu,
}

type Session = Checker<Box<dyn BusTransport>, StdDelay>;

fn main() -> ExitCode {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    let command = cli.command.as_ref().unwrap_or(&Commands::Menu);
    let code = open_session(&cli).map(|mut session| run_command(&mut session, command));

    ExitCode::from(code.unwrap_or_else(|error| {
        eprintln!("error: {error}");
        EXIT_CONFIG
    }))
}

fn init_logging(verbosity: u8) {
    let level = match verbosity {
        0 => Level::WARN,
        1 => Level::INFO,
        2 => Level::DEBUG,
        _ => Level::TRACE,
    };
    tracing_subscriber::fmt()
        .with_max_level(level)
        .with_target(false)
        .with_writer(io::stderr)
        .init();
}

fn load_config(cli: &Cli) -> Result<CheckerConfig, String> {
    let mut config = match &cli.config {
        Some(path) => CheckerConfig::load(path).map_err(|error| error.to_string())?,
        None => CheckerConfig::default(),
    };
    if cli.fast {
        config.power_settle_ms = 0;
        config.propagation_ms = 0;
    }
    Ok(config)
}

fn load_catalog(cli: &Cli) -> Result<Catalog, String> {
    match &cli.catalog {
        Some(path) => Catalog::load(path).map_err(|error| error.to_string()),
        None => Ok(Catalog::builtin()),
    }
}

fn simulated_chip(name: &str) -> Result<Option<ChipModel>, String> {
    if name.trim().eq_ignore_ascii_case("empty") {
        return Ok(None);
    }
    ChipModel::builtin(name).map(Some).ok_or_else(|| {
        let builtin = Catalog::builtin();
        let models: Vec<&str> = builtin
            .entries()
            .iter()
            .map(|entry| entry.id.as_str())
            .collect();
        format!(
            "no simulation model for {name}; use one of {} or `empty`",
            models.join(", ")
        )
    })
}

fn open_session(cli: &Cli) -> Result<Session, String> {
    let config = load_config(cli)?;
    let catalog = load_catalog(cli)?;

    let mut socket = SimulatedSocket::new(&config.expanders);
    socket.insert(simulated_chip(&cli.socket)?);
    let bus: Box<dyn BusTransport> = match config.bus_timeout() {
        Some(timeout) => Box::new(
            TimedBus::spawn(socket, timeout)
                .map_err(|error| format!("cannot start bus worker: {error}"))?,
        ),
        None => Box::new(socket),
    };
    info!(socket = %cli.socket, fast = cli.fast, "simulated socket ready");

    let mut session =
        Checker::new(bus, StdDelay, &config, catalog).map_err(|error| error.to_string())?;
    if let Err(error) = session.reset_socket() {
        warn!(%error, "could not release socket pins at start-up");
    }
    Ok(session)
}

fn run_command(session: &mut Session, command: &Commands) -> u8 {
    match command {
        Commands::Identify => identify(session, &mut io::stdout().lock()),
        Commands::Test { ic } => manual_test(session, ic, &mut io::stdout().lock()),
        Commands::Scan => scan(session),
        Commands::List => {
            print!("{}", CatalogListing(session.catalog()));
            EXIT_PASS
        }
        Commands::Menu => {
            let stdin = io::stdin();
            match run_menu(session, stdin.lock(), &mut io::stdout().lock()) {
                Ok(()) => EXIT_PASS,
                Err(error) => {
                    eprintln!("error: {error}");
                    EXIT_FAIL
                }
            }
        }
    }
}

const fn identification_exit(identification: &Identification) -> u8 {
    match identification {
        Identification::Match(_) => EXIT_PASS,
        Identification::NoMatch | Identification::Inconclusive | Identification::Aborted => {
            EXIT_FAIL
        }
    }
}

/// Runs one identification scan to completion.
///
/// The abort flag passed here is never raised: the binary has no interrupt
/// handler, so a scan always runs until a match or the end of the catalog.
/// Embedders that need cancellation call [`Checker::run_auto_identify`] with
/// their own [`AbortFlag`] and raise it from another thread.
fn identify<B: BusTransport, D: Delay>(checker: &mut Checker<B, D>, out: &mut impl Write) -> u8 {
    let report = checker.run_auto_identify(&AbortFlag::new());
    let summary = IdentifySummary {
        report: &report,
        catalog: checker.catalog(),
    };
    if let Err(error) = write!(out, "{summary}") {
        eprintln!("error: {error}");
    }
    identification_exit(&report.identification)
}

fn manual_test<B: BusTransport, D: Delay>(
    checker: &mut Checker<B, D>,
    ic: &str,
    out: &mut impl Write,
) -> u8 {
    match checker.run_manual_test(ic) {
        Ok((entry, verification)) => {
            let summary = ManualTestSummary {
                entry,
                verification: &verification,
            };
            if let Err(error) = write!(out, "{summary}") {
                eprintln!("error: {error}");
            }
            if verification.passed {
                EXIT_PASS
            } else {
                EXIT_FAIL
            }
        }
        Err(error @ CheckerError::UnknownDevice { .. }) => {
            eprintln!("error: {error}");
            EXIT_CONFIG
        }
        Err(error) => {
            eprintln!("error: {error}");
            EXIT_FAIL
        }
    }
}

fn scan(session: &mut Session) -> u8 {
    let found = session.scan();
    let summary = ScanSummary {
        found: &found,
        expected: session.plane().addresses(),
    };
    print!("{summary}");
    if summary.missing().next().is_none() {
        EXIT_PASS
    } else {
        EXIT_FAIL
    }
}

fn run_menu<B: BusTransport, D: Delay>(
    checker: &mut Checker<B, D>,
    mut input: impl BufRead,
    out: &mut impl Write,
) -> io::Result<()> {
    let mut line = String::new();
    loop {
        writeln!(out)?;
        writeln!(out, "===================================")?;
        writeln!(out, "        IC CHECKER")?;
        writeln!(out, "===================================")?;
        writeln!(out, "1. Auto-Identify IC")?;
        writeln!(out, "2. Manual IC Test")?;
        writeln!(out, "q. Quit")?;
        write!(out, "Select: ")?;
        out.flush()?;

        line.clear();
        if input.read_line(&mut line)? == 0 {
            return Ok(());
        }
        match line.trim() {
            "1" => {
                identify(checker, out);
            }
            "2" => {
                let ids: Vec<&str> = checker
                    .catalog()
                    .entries()
                    .iter()
                    .map(|entry| entry.id.as_str())
                    .collect();
                writeln!(out, "Available ICs: {}", ids.join(", "))?;
                write!(out, "Enter IC number: ")?;
                out.flush()?;

                line.clear();
                if input.read_line(&mut line)? == 0 {
                    return Ok(());
                }
                manual_test(checker, line.trim(), out);
            }
            "q" | "Q" => return Ok(()),
            _ => writeln!(out, "Invalid choice. Enter 1, 2 or q.")?,
        }
    }
}
