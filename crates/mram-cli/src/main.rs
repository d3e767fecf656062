//! `mramcheck`: command-line fault tester for an MRAM board behind an FPGA
//! UART command bridge.
//!
//! Exit status: `0` when every requested check passed, `1` when faults were
//! recorded, `2` on connection or configuration errors.

mod report;
mod shell;
mod vector_file;

use std::io;
use std::path::PathBuf;
use std::process::ExitCode;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand, ValueEnum};
use tracing::debug;
use tracing_subscriber::EnvFilter;

use mram_core::{
    available_ports, parse_address, retention_vector, AddressRange, Algorithm, CancelToken,
    FaultLog, MemoryTestEngine, RangePreset, SerialConfig, SerialTransport, TimingConfig,
    DEFAULT_BAUD,
};

#[derive(Debug, Parser)]
#[command(
    name = "mramcheck",
    version,
    about = "Fault tester for a 4 Mbit MRAM behind a UART command bridge"
)]
struct Cli {
    #[command(subcommand)]
    command: CommandKind,
}

#[derive(Debug, Subcommand)]
enum CommandKind {
    /// Run range-sweep algorithms and report the session fault map.
    Test(TestArgs),
    /// Run the 16-word walking-ones and walking-zeros bit tests.
    Bits(BitsArgs),
    /// Non-volatility check split around a manual power cycle.
    Retention(RetentionArgs),
    /// Interactive read/write terminal.
    Shell(ConnectArgs),
    /// List serial devices visible on this host.
    Ports,
}

/// Connection switches shared by every command that talks to the board.
#[derive(Debug, Args)]
struct ConnectArgs {
    /// Serial device of the UART bridge, e.g. /dev/ttyUSB0.
    #[arg(long, short = 'p')]
    port: String,

    /// Line rate in baud.
    #[arg(long, default_value_t = DEFAULT_BAUD)]
    baud: u32,

    /// Settle pause after each write, in milliseconds.
    #[arg(long, value_name = "MS")]
    write_settle: Option<u64>,

    /// Response window for each read, in milliseconds.
    #[arg(long, value_name = "MS")]
    read_window: Option<u64>,
}

impl ConnectArgs {
    /// Applies the command-line overrides on top of `base`.
    fn timing(&self, base: TimingConfig) -> TimingConfig {
        let mut timing = base;
        if let Some(ms) = self.write_settle {
            timing.settle_after_write = Duration::from_millis(ms);
        }
        if let Some(ms) = self.read_window {
            timing.read_response = Duration::from_millis(ms);
        }
        timing
    }

    fn open(&self, timing: &TimingConfig) -> Result<SerialTransport> {
        let config = SerialConfig {
            path: self.port.clone(),
            baud: self.baud,
        };
        SerialTransport::open(&config, timing)
            .with_context(|| format!("connecting to the bridge on {}", self.port))
    }
}

/// Address range presets matching the tester's traditional menu.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum Preset {
    /// First 1K addresses.
    Quick,
    /// First 10K addresses.
    Small,
    /// First 100K addresses.
    Medium,
    /// The whole 256K address space.
    Full,
}

impl Preset {
    const fn range(self) -> AddressRange {
        match self {
            Self::Quick => RangePreset::Quick.range(),
            Self::Small => RangePreset::Small.range(),
            Self::Medium => RangePreset::Medium.range(),
            Self::Full => RangePreset::Full.range(),
        }
    }
}

#[derive(Debug, Args)]
struct TestArgs {
    #[command(flatten)]
    connect: ConnectArgs,

    /// Address range preset.
    #[arg(long, value_enum, default_value_t = Preset::Quick, conflicts_with_all = ["start", "end"])]
    preset: Preset,

    /// Custom range start (hex, optional 0x prefix).
    #[arg(long, value_name = "ADDR", requires = "end")]
    start: Option<String>,

    /// Custom range end, inclusive (hex, optional 0x prefix).
    #[arg(long, value_name = "ADDR", requires = "start")]
    end: Option<String>,

    /// Algorithm to run; repeat the flag to run several. Defaults to
    /// march-c, checkerboard and address-uniqueness.
    #[arg(long = "algorithm", value_name = "NAME")]
    algorithms: Vec<Algorithm>,
}

#[derive(Debug, Args)]
struct BitsArgs {
    #[command(flatten)]
    connect: ConnectArgs,

    /// Base address of the walking-ones window (hex).
    #[arg(long, value_name = "ADDR", default_value = "0x00000")]
    ones_base: String,

    /// Base address of the walking-zeros window (hex).
    #[arg(long, value_name = "ADDR", default_value = "0x00100")]
    zeros_base: String,
}

#[derive(Debug, Args)]
struct RetentionArgs {
    #[command(flatten)]
    connect: ConnectArgs,

    /// File the written vector is persisted to between the two phases.
    #[arg(long, value_name = "PATH", default_value = "mram-retention.txt")]
    file: PathBuf,

    #[command(subcommand)]
    phase: RetentionPhase,
}

#[derive(Debug, Subcommand)]
enum RetentionPhase {
    /// Write the canonical vector and persist it for later verification.
    Write,
    /// Verify a previously written vector after the power cycle.
    Verify,
    /// Write, wait for a manual power cycle, reconnect and verify.
    Cycle,
}

fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(io::stderr)
        .init();

    let cli = Cli::parse();
    let cancel = CancelToken::default();
    {
        let cancel = cancel.clone();
        if let Err(err) = ctrlc::set_handler(move || {
            eprintln!("\ninterrupt: stopping after the current step");
            cancel.cancel();
        }) {
            eprintln!("warning: could not install the interrupt handler: {err}");
        }
    }

    match run(cli, &cancel) {
        Ok(true) => ExitCode::SUCCESS,
        Ok(false) => ExitCode::from(1),
        Err(err) => {
            eprintln!("error: {err:#}");
            ExitCode::from(2)
        }
    }
}

/// Dispatches the parsed command. `Ok(true)` means a clean session.
fn run(cli: Cli, cancel: &CancelToken) -> Result<bool> {
    match cli.command {
        CommandKind::Test(args) => cmd_test(&args, cancel),
        CommandKind::Bits(args) => cmd_bits(&args, cancel),
        CommandKind::Retention(args) => cmd_retention(&args, cancel),
        CommandKind::Shell(args) => {
            let timing = args.timing(TimingConfig::default());
            let mut transport = args.open(&timing)?;
            let mut engine = MemoryTestEngine::new(&mut transport, timing, cancel.clone());
            shell::run(&mut engine)?;
            Ok(true)
        }
        CommandKind::Ports => cmd_ports(),
    }
}

fn resolve_range(args: &TestArgs) -> Result<AddressRange> {
    match (&args.start, &args.end) {
        (Some(start), Some(end)) => {
            let start = parse_address(start).context("--start")?;
            let end = parse_address(end).context("--end")?;
            Ok(AddressRange::new(start, end)?)
        }
        _ => Ok(args.preset.range()),
    }
}

fn cmd_test(args: &TestArgs, cancel: &CancelToken) -> Result<bool> {
    let range = resolve_range(args)?;
    let algorithms: Vec<Algorithm> = if args.algorithms.is_empty() {
        Algorithm::default_suite().to_vec()
    } else {
        args.algorithms.clone()
    };
    debug!(range = %range, count = algorithms.len(), "test session");

    let timing = args.connect.timing(TimingConfig::default());
    let mut transport = args.connect.open(&timing)?;
    let mut engine = MemoryTestEngine::new(&mut transport, timing, cancel.clone());
    let mut log = FaultLog::new();

    println!("Testing {} ({} addresses)", range, range.word_count());
    for algorithm in algorithms {
        let mut bar = report::ProgressBar::new();
        let result = engine.run_with_progress(algorithm, range, |event| bar.update(event))?;
        bar.finish();
        report::print_run(&result);
        log.extend(&result.faults);
        if !result.completed {
            break;
        }
    }

    report::print_summary(log.summary(report::SUMMARY_LIMIT));
    Ok(log.is_empty())
}

fn cmd_bits(args: &BitsArgs, cancel: &CancelToken) -> Result<bool> {
    let ones_base = parse_address(&args.ones_base).context("--ones-base")?;
    let zeros_base = parse_address(&args.zeros_base).context("--zeros-base")?;

    let timing = args.connect.timing(TimingConfig::default());
    let mut transport = args.connect.open(&timing)?;
    let mut engine = MemoryTestEngine::new(&mut transport, timing, cancel.clone());
    let mut log = FaultLog::new();

    for (algorithm, base) in [
        (Algorithm::WalkingOnes, ones_base),
        (Algorithm::WalkingZeros, zeros_base),
    ] {
        let window = AddressRange::new(base, base)?;
        let mut bar = report::ProgressBar::new();
        let result = engine.run_with_progress(algorithm, window, |event| bar.update(event))?;
        bar.finish();
        report::print_run(&result);
        log.extend(&result.faults);
        if !result.completed {
            break;
        }
    }

    report::print_summary(log.summary(report::SUMMARY_LIMIT));
    Ok(log.is_empty())
}

fn cmd_retention(args: &RetentionArgs, cancel: &CancelToken) -> Result<bool> {
    match args.phase {
        RetentionPhase::Write => {
            retention_write(args, cancel)?;
            println!("Power cycle the board, then run `mramcheck retention verify`.");
            Ok(true)
        }
        RetentionPhase::Verify => retention_verify(args, cancel),
        RetentionPhase::Cycle => {
            retention_write(args, cancel)?;
            println!();
            println!("Disconnect board power, wait ten seconds, reconnect it.");
            wait_for_enter()?;
            retention_verify(args, cancel)
        }
    }
}

/// Write phase: store the canonical vector and persist it to the vector file.
///
/// The transport is dropped before this returns, so the port is free for the
/// power cycle and the later verify phase.
fn retention_write(args: &RetentionArgs, cancel: &CancelToken) -> Result<()> {
    let vector = retention_vector();
    let timing = args.connect.timing(TimingConfig::retention());
    let mut transport = args.connect.open(&timing)?;
    let mut engine = MemoryTestEngine::new(&mut transport, timing, cancel.clone());

    engine.write_vector(&vector)?;
    if engine.is_cancelled() {
        anyhow::bail!("interrupted before the vector was fully written");
    }
    vector_file::save(&args.file, &vector)?;
    println!(
        "Wrote {} locations; vector saved to {}",
        vector.len(),
        args.file.display()
    );
    Ok(())
}

fn retention_verify(args: &RetentionArgs, cancel: &CancelToken) -> Result<bool> {
    let vector = vector_file::load(&args.file)?;
    let timing = args.connect.timing(TimingConfig::retention());
    let mut transport = args.connect.open(&timing)?;
    let mut engine = MemoryTestEngine::new(&mut transport, timing, cancel.clone());

    engine.warmup()?;
    let result = engine.verify_vector(&vector)?;
    report::print_run(&result);

    let mut log = FaultLog::new();
    log.extend(&result.faults);
    report::print_summary(log.summary(report::SUMMARY_LIMIT));
    Ok(result.passed())
}

fn wait_for_enter() -> Result<()> {
    println!("Press ENTER when the board is powered back up.");
    let mut line = String::new();
    io::stdin()
        .read_line(&mut line)
        .context("reading operator confirmation")?;
    Ok(())
}

fn cmd_ports() -> Result<bool> {
    let ports = available_ports()?;
    if ports.is_empty() {
        println!("no serial ports found");
    } else {
        for port in ports {
            println!("{port}");
        }
    }
    Ok(true)
}
