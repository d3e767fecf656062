//! Serial-port transport for the FPGA UART bridge.

use std::io::{Read, Write};
use std::thread;
use std::time::{Duration, Instant};

use serialport::{ClearBuffer, DataBits, Parity, SerialPort, StopBits};
use tracing::{debug, trace};

use super::{TimingConfig, Transport, TransportError};

/// Default line rate of the bridge.
pub const DEFAULT_BAUD: u32 = 115_200;

/// Granularity of the blocking reads inside [`Transport::receive`].
const POLL_INTERVAL: Duration = Duration::from_millis(5);

/// Connection parameters for the UART bridge. Framing is always 8-N-1.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SerialConfig {
    /// Platform path of the serial device, e.g. `/dev/ttyUSB2`.
    pub path: String,
    /// Line rate in baud.
    pub baud: u32,
}

impl SerialConfig {
    /// Configuration for `path` at the default 115200 baud.
    pub fn new(path: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            baud: DEFAULT_BAUD,
        }
    }
}

/// Exclusive handle on the serial channel for one test session.
///
/// The port is released when the transport is dropped, so the channel is
/// closed exactly once even when a run unwinds early.
pub struct SerialTransport {
    port: Box<dyn SerialPort>,
}

impl SerialTransport {
    /// Opens the configured port with 8-N-1 framing, waits out the power-up
    /// settle window, and discards anything buffered from before the session.
    ///
    /// No command may be issued before this returns; the settle pause covers
    /// interface boot and the memory's own power-up latency.
    ///
    /// # Errors
    ///
    /// Returns [`TransportError::Open`] when the device cannot be opened and
    /// other [`TransportError`] variants when the initial buffer discards
    /// fail.
    pub fn open(config: &SerialConfig, timing: &TimingConfig) -> Result<Self, TransportError> {
        let port = serialport::new(&config.path, config.baud)
            .data_bits(DataBits::Eight)
            .parity(Parity::None)
            .stop_bits(StopBits::One)
            .timeout(POLL_INTERVAL)
            .open()
            .map_err(|source| TransportError::Open {
                path: config.path.clone(),
                source,
            })?;
        debug!(path = %config.path, baud = config.baud, "serial port open");

        let mut transport = Self { port };
        thread::sleep(timing.power_up_settle);
        transport.discard_input()?;
        transport.discard_output()?;
        Ok(transport)
    }
}

impl Transport for SerialTransport {
    fn send(&mut self, bytes: &[u8]) -> Result<(), TransportError> {
        trace!(len = bytes.len(), "tx");
        self.port.write_all(bytes)?;
        self.port.flush()?;
        Ok(())
    }

    fn receive(
        &mut self,
        expected_len: usize,
        timeout: Duration,
    ) -> Result<Vec<u8>, TransportError> {
        let deadline = Instant::now() + timeout;
        let mut buf = vec![0_u8; expected_len];
        let mut received = 0;
        while received < expected_len {
            match self.port.read(&mut buf[received..]) {
                Ok(n) => received += n,
                Err(err) if err.kind() == std::io::ErrorKind::TimedOut => {}
                Err(err) => return Err(TransportError::Io(err)),
            }
            if received < expected_len && Instant::now() >= deadline {
                return Err(TransportError::Timeout {
                    expected: expected_len,
                    received,
                });
            }
        }
        trace!(len = received, "rx");
        Ok(buf)
    }

    fn discard_input(&mut self) -> Result<(), TransportError> {
        self.port.clear(ClearBuffer::Input)?;
        Ok(())
    }

    fn discard_output(&mut self) -> Result<(), TransportError> {
        self.port.clear(ClearBuffer::Output)?;
        Ok(())
    }
}

/// Enumerates serial devices visible on the host, for the CLI port listing.
///
/// # Errors
///
/// Returns [`TransportError::Control`] when the platform enumeration fails.
pub fn available_ports() -> Result<Vec<String>, TransportError> {
    let ports = serialport::available_ports()?;
    Ok(ports.into_iter().map(|info| info.port_name).collect())
}
