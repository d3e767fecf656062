//! Duplex byte-channel abstraction between the engine and the device.
//!
//! A transport moves frames and enforces timeouts; it owns no test semantics.
//! The hardware implementation lives in [`serial`]; tests substitute their own
//! in-memory implementations of [`Transport`].

/// Serial-port transport backed by the `serialport` crate.
pub mod serial;

pub use serial::{available_ports, SerialConfig, SerialTransport, DEFAULT_BAUD};

use std::time::Duration;

use thiserror::Error;

/// Channel-level failures.
///
/// Only [`TransportError::Timeout`] is non-fatal to a test run; every other
/// variant unwinds it.
#[derive(Debug, Error)]
pub enum TransportError {
    /// Opening the underlying serial device failed.
    #[error("failed to open serial port {path}")]
    Open {
        /// Platform path of the device that could not be opened.
        path: String,
        /// Underlying driver error.
        #[source]
        source: serialport::Error,
    },
    /// Read or write on the open channel failed.
    #[error("serial channel I/O failure")]
    Io(#[from] std::io::Error),
    /// Buffer or line control on the open channel failed.
    #[error("serial channel control failure")]
    Control(#[from] serialport::Error),
    /// Fewer than the expected bytes arrived inside the response window.
    #[error("timed out waiting for {expected} bytes ({received} received)")]
    Timeout {
        /// Bytes the caller was waiting for.
        expected: usize,
        /// Bytes that actually arrived before the deadline.
        received: usize,
    },
}

impl TransportError {
    /// `true` for the only non-fatal variant: an expired response window.
    #[must_use]
    pub const fn is_timeout(&self) -> bool {
        matches!(self, Self::Timeout { .. })
    }
}

/// A synchronous duplex byte channel carrying command and response frames.
///
/// Implementations never retry internally and never reorder: bytes are
/// observed by the device in the exact order they were sent.
pub trait Transport {
    /// Sends `bytes` down the channel.
    ///
    /// # Errors
    ///
    /// Returns a [`TransportError`] on channel failure.
    fn send(&mut self, bytes: &[u8]) -> Result<(), TransportError>;

    /// Blocks up to `timeout` for exactly `expected_len` bytes.
    ///
    /// Partial frames are never handed to the caller: anything short of
    /// `expected_len` inside the window is [`TransportError::Timeout`].
    ///
    /// # Errors
    ///
    /// Returns [`TransportError::Timeout`] when the window expires, or another
    /// [`TransportError`] variant on channel failure.
    fn receive(&mut self, expected_len: usize, timeout: Duration)
        -> Result<Vec<u8>, TransportError>;

    /// Drops any bytes already buffered on the input side.
    ///
    /// # Errors
    ///
    /// Returns a [`TransportError`] on channel failure.
    fn discard_input(&mut self) -> Result<(), TransportError>;

    /// Drops any bytes queued for output but not yet transmitted.
    ///
    /// # Errors
    ///
    /// Returns a [`TransportError`] on channel failure.
    fn discard_output(&mut self) -> Result<(), TransportError>;
}

/// Default settle pause after each write command.
pub const DEFAULT_WRITE_SETTLE: Duration = Duration::from_millis(2);
/// Default window between issuing a read and expecting its 2-byte response.
pub const DEFAULT_READ_RESPONSE: Duration = Duration::from_millis(20);
/// Default pause after opening the channel before any traffic is sent.
pub const DEFAULT_POWER_UP_SETTLE: Duration = Duration::from_millis(100);

/// Settle and response windows applied around wire operations.
///
/// These are deployment tunables: windows that are too short produce spurious
/// timeouts, not protocol errors.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimingConfig {
    /// Pause after each write before the input buffer is discarded.
    pub settle_after_write: Duration,
    /// How long to wait for the 2-byte response after issuing a read.
    pub read_response: Duration,
    /// Pause after opening the channel before any traffic is sent, covering
    /// interface boot and the memory's own power-up latency.
    pub power_up_settle: Duration,
}

impl Default for TimingConfig {
    fn default() -> Self {
        Self {
            settle_after_write: DEFAULT_WRITE_SETTLE,
            read_response: DEFAULT_READ_RESPONSE,
            power_up_settle: DEFAULT_POWER_UP_SETTLE,
        }
    }
}

impl TimingConfig {
    /// Wider windows used around retention vectors, where the session may
    /// start right after a power cycle and the FPGA bridge is still settling.
    #[must_use]
    pub const fn retention() -> Self {
        Self {
            settle_after_write: Duration::from_millis(5),
            read_response: Duration::from_millis(50),
            power_up_settle: Duration::from_millis(1500),
        }
    }

    /// Zero-length windows for tests driving in-memory transports.
    #[must_use]
    pub const fn immediate() -> Self {
        Self {
            settle_after_write: Duration::ZERO,
            read_response: Duration::ZERO,
            power_up_settle: Duration::ZERO,
        }
    }
}
