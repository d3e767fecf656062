//! Protocol codec and memory fault-test engine for a 4 Mbit MRAM exercised
//! through an FPGA UART command bridge.
//!
//! The crate splits along the data path: [`codec`] turns addresses and words
//! into wire frames with no I/O, [`transport`] moves bytes under explicit
//! timeouts, [`engine`] runs the deterministic test scripts (March C, walking
//! bits, checkerboard, address uniqueness), and [`fault`] accumulates what
//! they find. Interactive shells, report printing, and file persistence live
//! in the `mram-cli` front end.

/// Address/word primitives, ranges, and the fixed numeric grammar.
pub mod units;
pub use units::{
    parse_address, parse_hex, parse_word, Address, AddressRange, ConfigError, RangePreset, Word,
    ADDRESS_BITS, ADDRESS_MAX, WORD_BITS,
};

/// Pure wire framing for the command bridge.
pub mod codec;
pub use codec::{
    decode_response, encode_read, encode_write, CodecError, Command, READ_FRAME_LEN, READ_OPCODE,
    RESPONSE_LEN, WRITE_FRAME_LEN, WRITE_OPCODE,
};

/// Duplex byte-channel abstraction and the serial implementation.
pub mod transport;
pub use transport::{
    available_ports, SerialConfig, SerialTransport, TimingConfig, Transport, TransportError,
    DEFAULT_BAUD, DEFAULT_POWER_UP_SETTLE, DEFAULT_READ_RESPONSE, DEFAULT_WRITE_SETTLE,
};

/// Fault records, phases, and the append-only session log.
pub mod fault;
pub use fault::{FaultLog, FaultRecord, FaultSummary, Phase, Response};

/// Cooperative cancellation token.
pub mod cancel;
pub use cancel::CancelToken;

/// The memory test engine and its algorithms.
pub mod engine;
pub use engine::{
    Algorithm, EngineError, MemoryTestEngine, Progress, TestResult, UnknownAlgorithm,
    PATTERN_CHECKER, PATTERN_CHECKER_INV, PATTERN_ONE, PATTERN_ZERO,
};

/// Write-then-verify vectors for retention checks.
pub mod vector;
pub use vector::{retention_vector, VectorEntry};

#[cfg(test)]
use proptest as _;
#[cfg(test)]
use rstest as _;
