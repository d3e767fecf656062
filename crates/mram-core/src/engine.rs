//! Memory fault-test engine.
//!
//! Each algorithm is a deterministic script of write/read steps executed
//! strictly in order over an exclusive transport. Traversal order is part of
//! the correctness contract: the descending March C elements exist to expose
//! address-decoder and coupling faults an ascending-only sweep would miss.
//!
//! Per-address mismatches and read timeouts are recorded as faults and the
//! script keeps going; the goal of a run is a complete fault map, not early
//! termination. Only channel-level failures unwind a run.

use std::fmt;
use std::str::FromStr;
use std::thread;
use std::time::{Duration, Instant};

use thiserror::Error;
use tracing::{debug, warn};

use crate::cancel::CancelToken;
use crate::codec::{decode_response, encode_read, encode_write, CodecError, RESPONSE_LEN};
use crate::fault::{FaultRecord, Phase, Response};
use crate::transport::{TimingConfig, Transport, TransportError};
use crate::units::{Address, AddressRange, ConfigError, Word, WORD_BITS};

/// Fill pattern for the March C "zero" elements.
pub const PATTERN_ZERO: Word = 0x0000;
/// Fill pattern for the March C "one" elements.
pub const PATTERN_ONE: Word = 0xFFFF;
/// Checkerboard pattern for even addresses in the first pass.
pub const PATTERN_CHECKER: Word = 0xAAAA;
/// Checkerboard pattern for odd addresses in the first pass.
pub const PATTERN_CHECKER_INV: Word = 0x5555;

/// Named test algorithms.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Deserialize, serde::Serialize))]
pub enum Algorithm {
    /// Six-element March C sweep detecting stuck-at, transition, coupling,
    /// and address-decoder faults.
    MarchC,
    /// One-hot bit patterns over 16 consecutive addresses; finds bits stuck
    /// at 0.
    WalkingOnes,
    /// Complemented one-hot patterns; finds bits stuck at 1.
    WalkingZeros,
    /// Alternating `0xAAAA`/`0x5555` by address parity, plus the inverse
    /// pass.
    Checkerboard,
    /// Address-as-data sweep exposing decoder aliasing.
    AddressUniqueness,
}

impl Algorithm {
    /// Stable lowercase identifier used on the CLI and in reports.
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::MarchC => "march-c",
            Self::WalkingOnes => "walking-ones",
            Self::WalkingZeros => "walking-zeros",
            Self::Checkerboard => "checkerboard",
            Self::AddressUniqueness => "address-uniqueness",
        }
    }

    /// The default range-sweep suite, in its canonical order.
    #[must_use]
    pub const fn default_suite() -> [Self; 3] {
        [Self::MarchC, Self::Checkerboard, Self::AddressUniqueness]
    }

    /// `true` for the 16-word bit tests, which take a base address and span a
    /// fixed window instead of sweeping an arbitrary range.
    #[must_use]
    pub const fn is_bit_test(self) -> bool {
        matches!(self, Self::WalkingOnes | Self::WalkingZeros)
    }
}

impl fmt::Display for Algorithm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Unknown algorithm name on the selection surface.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error(
    "unknown algorithm {0:?} (expected march-c, walking-ones, walking-zeros, \
     checkerboard or address-uniqueness)"
)]
pub struct UnknownAlgorithm(pub String);

impl FromStr for Algorithm {
    type Err = UnknownAlgorithm;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "march-c" => Ok(Self::MarchC),
            "walking-ones" => Ok(Self::WalkingOnes),
            "walking-zeros" => Ok(Self::WalkingZeros),
            "checkerboard" => Ok(Self::Checkerboard),
            "address-uniqueness" => Ok(Self::AddressUniqueness),
            other => Err(UnknownAlgorithm(other.to_string())),
        }
    }
}

/// Fatal conditions that unwind a run.
///
/// Per-address mismatches and read timeouts never appear here; they become
/// [`FaultRecord`]s instead.
#[derive(Debug, Error)]
pub enum EngineError {
    /// Connection-level channel failure.
    #[error(transparent)]
    Transport(#[from] TransportError),
    /// The transport violated the whole-frame response contract.
    #[error(transparent)]
    Codec(#[from] CodecError),
    /// Pre-flight validation failed; nothing was sent to the device.
    #[error(transparent)]
    Config(#[from] ConfigError),
}

/// Progress notifications emitted while a script runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Progress {
    /// A new phase of the running algorithm began.
    PhaseStarted {
        /// Operator-facing phase label.
        label: &'static str,
        /// Number of addresses the phase will verify.
        total: u32,
    },
    /// Another address within the current phase finished.
    Step {
        /// Addresses completed so far within the phase.
        done: u32,
        /// Number of addresses the phase will verify.
        total: u32,
    },
}

/// Summary of one algorithm invocation. Read-only once produced.
#[derive(Debug, Clone)]
pub struct TestResult {
    /// Stable name of the algorithm (or vector phase) that ran.
    pub algorithm: &'static str,
    /// Range that was swept; for bit tests, the 16-word window.
    pub range: AddressRange,
    /// Faults in the order they were observed.
    pub faults: Vec<FaultRecord>,
    /// Wall-clock duration of the run.
    pub elapsed: Duration,
    /// `false` when the run was cancelled before finishing its script.
    pub completed: bool,
}

impl TestResult {
    /// Number of faults recorded by this run.
    #[must_use]
    pub fn fault_count(&self) -> usize {
        self.faults.len()
    }

    /// `true` when the whole script ran and recorded no fault.
    #[must_use]
    pub fn passed(&self) -> bool {
        self.completed && self.faults.is_empty()
    }
}

/// Per-run accumulation shared by the algorithm scripts.
struct RunCtx<F: FnMut(Progress)> {
    faults: Vec<FaultRecord>,
    observer: F,
}

impl<F: FnMut(Progress)> RunCtx<F> {
    fn phase_started(&mut self, label: &'static str, total: u32) {
        (self.observer)(Progress::PhaseStarted { label, total });
    }

    fn step(&mut self, done: u32, total: u32) {
        (self.observer)(Progress::Step { done, total });
    }
}

/// Drives one algorithm at a time over an exclusive transport.
///
/// The engine holds no state across runs beyond its borrowed collaborators;
/// construct it once per session and call [`MemoryTestEngine::run`] per
/// algorithm.
pub struct MemoryTestEngine<'t> {
    transport: &'t mut dyn Transport,
    timing: TimingConfig,
    cancel: CancelToken,
}

impl<'t> MemoryTestEngine<'t> {
    /// New engine over an opened transport.
    pub fn new(
        transport: &'t mut dyn Transport,
        timing: TimingConfig,
        cancel: CancelToken,
    ) -> Self {
        Self {
            transport,
            timing,
            cancel,
        }
    }

    /// `true` once the session's cancel token has been set.
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }

    /// Writes `word` at `address`: encode, send, settle, then discard
    /// whatever the bridge echoed during the settle window.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::Transport`] on channel failure.
    pub fn write_word(&mut self, address: Address, word: Word) -> Result<(), EngineError> {
        self.transport.send(&encode_write(address, word))?;
        thread::sleep(self.timing.settle_after_write);
        self.transport.discard_input()?;
        Ok(())
    }

    /// Reads the word stored at `address`.
    ///
    /// An expired response window is an observation ([`Response::Timeout`]),
    /// not an error; the device simply did not answer in time.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::Transport`] on channel failure and
    /// [`EngineError::Codec`] when the response framing breaks.
    pub fn read_word(&mut self, address: Address) -> Result<Response, EngineError> {
        self.transport.discard_input()?;
        self.transport.send(&encode_read(address))?;
        match self.transport.receive(RESPONSE_LEN, self.timing.read_response) {
            Ok(bytes) => Ok(Response::Value(decode_response(&bytes)?)),
            Err(err) if err.is_timeout() => {
                warn!(address = %address, "read window expired");
                Ok(Response::Timeout)
            }
            Err(err) => Err(EngineError::Transport(err)),
        }
    }

    /// Drops both channel buffers; used by the retention warm-up.
    pub(crate) fn discard_buffers(&mut self) -> Result<(), EngineError> {
        self.transport.discard_input()?;
        self.transport.discard_output()?;
        Ok(())
    }

    /// Runs `algorithm` over `range` and returns its complete fault map.
    ///
    /// For bit tests, `range.start()` is the base of the fixed 16-word
    /// window and the rest of the range is ignored.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::Transport`] for connection failure,
    /// [`EngineError::Codec`] when response framing breaks, and
    /// [`EngineError::Config`] when a bit-test window would leave the
    /// address space. Mismatches and timeouts are recorded in the result,
    /// never returned as errors.
    pub fn run(
        &mut self,
        algorithm: Algorithm,
        range: AddressRange,
    ) -> Result<TestResult, EngineError> {
        self.run_with_progress(algorithm, range, |_| {})
    }

    /// Like [`MemoryTestEngine::run`], reporting progress through `observer`.
    ///
    /// # Errors
    ///
    /// Identical to [`MemoryTestEngine::run`].
    pub fn run_with_progress<F: FnMut(Progress)>(
        &mut self,
        algorithm: Algorithm,
        range: AddressRange,
        observer: F,
    ) -> Result<TestResult, EngineError> {
        let range = effective_range(algorithm, range)?;
        debug!(algorithm = %algorithm, range = %range, "run started");
        let started = Instant::now();
        let mut ctx = RunCtx {
            faults: Vec::new(),
            observer,
        };

        let completed = match algorithm {
            Algorithm::MarchC => self.run_march_c(&mut ctx, range)?,
            Algorithm::WalkingOnes => self.run_walking(&mut ctx, range, Phase::WalkingOnes)?,
            Algorithm::WalkingZeros => self.run_walking(&mut ctx, range, Phase::WalkingZeros)?,
            Algorithm::Checkerboard => self.run_checkerboard(&mut ctx, range)?,
            Algorithm::AddressUniqueness => self.run_uniqueness(&mut ctx, range)?,
        };
        if !completed {
            warn!(algorithm = %algorithm, "run cancelled before completion");
        }

        let result = TestResult {
            algorithm: algorithm.name(),
            range,
            faults: ctx.faults,
            elapsed: started.elapsed(),
            completed,
        };
        debug!(
            faults = result.fault_count(),
            completed,
            elapsed = ?result.elapsed,
            "run finished"
        );
        Ok(result)
    }

    /// Reads `address`, compares against `expected`, and records a fault on
    /// any deviation (wrong word or timeout).
    fn check<F: FnMut(Progress)>(
        &mut self,
        ctx: &mut RunCtx<F>,
        address: Address,
        phase: Phase,
        expected: Word,
    ) -> Result<(), EngineError> {
        match self.read_word(address)? {
            Response::Value(word) if word == expected => {}
            observed => {
                debug!(address = %address, phase = %phase, expected, %observed, "fault");
                ctx.faults.push(FaultRecord {
                    address,
                    phase,
                    expected,
                    observed,
                });
            }
        }
        Ok(())
    }

    /// One read/write March element over the given traversal. Returns `false`
    /// when the run was cancelled mid-element.
    fn march_element<F: FnMut(Progress)>(
        &mut self,
        ctx: &mut RunCtx<F>,
        addresses: impl Iterator<Item = Address>,
        total: u32,
        label: &'static str,
        phase: Phase,
        expected: Word,
        write: Word,
    ) -> Result<bool, EngineError> {
        ctx.phase_started(label, total);
        let mut done = 0;
        for address in addresses {
            if self.cancel.is_cancelled() {
                return Ok(false);
            }
            self.check(ctx, address, phase, expected)?;
            self.write_word(address, write)?;
            done += 1;
            ctx.step(done, total);
        }
        Ok(true)
    }

    /// March C: ⇕(w0); ⇑(r0,w1); ⇑(r1,w0); ⇓(r0,w1); ⇓(r1,w0); ⇕(r0).
    fn run_march_c<F: FnMut(Progress)>(
        &mut self,
        ctx: &mut RunCtx<F>,
        range: AddressRange,
    ) -> Result<bool, EngineError> {
        let total = range.word_count();

        ctx.phase_started("march 1/6: write 0 (up)", total);
        let mut done = 0;
        for address in range.iter_up() {
            if self.cancel.is_cancelled() {
                return Ok(false);
            }
            self.write_word(address, PATTERN_ZERO)?;
            done += 1;
            ctx.step(done, total);
        }

        if !self.march_element(
            ctx,
            range.iter_up(),
            total,
            "march 2/6: read 0, write 1 (up)",
            Phase::MarchRead0Write1Up,
            PATTERN_ZERO,
            PATTERN_ONE,
        )? {
            return Ok(false);
        }
        if !self.march_element(
            ctx,
            range.iter_up(),
            total,
            "march 3/6: read 1, write 0 (up)",
            Phase::MarchRead1Write0Up,
            PATTERN_ONE,
            PATTERN_ZERO,
        )? {
            return Ok(false);
        }
        if !self.march_element(
            ctx,
            range.iter_down(),
            total,
            "march 4/6: read 0, write 1 (down)",
            Phase::MarchRead0Write1Down,
            PATTERN_ZERO,
            PATTERN_ONE,
        )? {
            return Ok(false);
        }
        if !self.march_element(
            ctx,
            range.iter_down(),
            total,
            "march 5/6: read 1, write 0 (down)",
            Phase::MarchRead1Write0Down,
            PATTERN_ONE,
            PATTERN_ZERO,
        )? {
            return Ok(false);
        }

        ctx.phase_started("march 6/6: read 0 (up)", total);
        done = 0;
        for address in range.iter_up() {
            if self.cancel.is_cancelled() {
                return Ok(false);
            }
            self.check(ctx, address, Phase::MarchFinalRead0, PATTERN_ZERO)?;
            done += 1;
            ctx.step(done, total);
        }
        Ok(true)
    }

    /// Walking bits: all 16 writes first, then all 16 readbacks.
    fn run_walking<F: FnMut(Progress)>(
        &mut self,
        ctx: &mut RunCtx<F>,
        window: AddressRange,
        phase: Phase,
    ) -> Result<bool, EngineError> {
        let total = window.word_count();
        let label = match phase {
            Phase::WalkingOnes => "walking ones",
            _ => "walking zeros",
        };
        ctx.phase_started(label, total);

        let patterns: Vec<(Address, Word)> = window
            .iter_up()
            .enumerate()
            .map(|(bit, address)| {
                let one = 1_u16 << bit;
                let word = if phase == Phase::WalkingOnes { one } else { !one };
                (address, word)
            })
            .collect();

        for (address, word) in &patterns {
            if self.cancel.is_cancelled() {
                return Ok(false);
            }
            self.write_word(*address, *word)?;
        }
        let mut done = 0;
        for (address, word) in patterns {
            if self.cancel.is_cancelled() {
                return Ok(false);
            }
            self.check(ctx, address, phase, word)?;
            done += 1;
            ctx.step(done, total);
        }
        Ok(true)
    }

    /// One checkerboard pass: fill by address parity, then verify.
    fn checker_pass<F: FnMut(Progress)>(
        &mut self,
        ctx: &mut RunCtx<F>,
        range: AddressRange,
        phase: Phase,
        inverted: bool,
    ) -> Result<bool, EngineError> {
        let total = range.word_count();
        let label = if inverted {
            "checkerboard: inverse pass"
        } else {
            "checkerboard: first pass"
        };
        ctx.phase_started(label, total);

        for address in range.iter_up() {
            if self.cancel.is_cancelled() {
                return Ok(false);
            }
            self.write_word(address, checker_pattern(address, inverted))?;
        }
        let mut done = 0;
        for address in range.iter_up() {
            if self.cancel.is_cancelled() {
                return Ok(false);
            }
            self.check(ctx, address, phase, checker_pattern(address, inverted))?;
            done += 1;
            ctx.step(done, total);
        }
        Ok(true)
    }

    fn run_checkerboard<F: FnMut(Progress)>(
        &mut self,
        ctx: &mut RunCtx<F>,
        range: AddressRange,
    ) -> Result<bool, EngineError> {
        if !self.checker_pass(ctx, range, Phase::Checkerboard, false)? {
            return Ok(false);
        }
        self.checker_pass(ctx, range, Phase::InverseCheckerboard, true)
    }

    /// Address-as-data: a decoder aliasing fault makes a later write corrupt
    /// an earlier address's unique value.
    fn run_uniqueness<F: FnMut(Progress)>(
        &mut self,
        ctx: &mut RunCtx<F>,
        range: AddressRange,
    ) -> Result<bool, EngineError> {
        let total = range.word_count();
        ctx.phase_started("address uniqueness", total);

        for address in range.iter_up() {
            if self.cancel.is_cancelled() {
                return Ok(false);
            }
            self.write_word(address, address.as_word())?;
        }
        let mut done = 0;
        for address in range.iter_up() {
            if self.cancel.is_cancelled() {
                return Ok(false);
            }
            self.check(ctx, address, Phase::AddressUniqueness, address.as_word())?;
            done += 1;
            ctx.step(done, total);
        }
        Ok(true)
    }
}

/// Pattern stored at `address` for the requested checkerboard pass.
const fn checker_pattern(address: Address, inverted: bool) -> Word {
    let even = address.value() % 2 == 0;
    if even != inverted {
        PATTERN_CHECKER
    } else {
        PATTERN_CHECKER_INV
    }
}

/// Normalizes the requested range: bit tests span a fixed 16-word window
/// anchored at the range start.
fn effective_range(algorithm: Algorithm, range: AddressRange) -> Result<AddressRange, EngineError> {
    if algorithm.is_bit_test() {
        let base = range.start();
        let end = base.offset(WORD_BITS - 1)?;
        Ok(AddressRange::new(base, end)?)
    } else {
        Ok(range)
    }
}
