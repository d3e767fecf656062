//! Pure wire framing for the UART command bridge.
//!
//! Encoding and decoding touch no I/O, so the framing contract is testable
//! without any hardware on the bench.
//!
//! A write frame is `[0x57, addr_hi, addr_mid, addr_lo, data_hi, data_lo]`,
//! a read frame is `[0x52, addr_hi, addr_mid, addr_lo]`, and a read response
//! is exactly two bytes carrying the word big-endian. The address-high byte
//! only ever uses its low two bits.

use thiserror::Error;

use crate::units::{Address, Word};

/// Opcode byte of a write command frame (`'W'`).
pub const WRITE_OPCODE: u8 = 0x57;
/// Opcode byte of a read command frame (`'R'`).
pub const READ_OPCODE: u8 = 0x52;
/// Write frames carry opcode, three address bytes, and two data bytes.
pub const WRITE_FRAME_LEN: usize = 6;
/// Read frames carry opcode and three address bytes.
pub const READ_FRAME_LEN: usize = 4;
/// Every read is answered by exactly two bytes.
pub const RESPONSE_LEN: usize = 2;

/// A single device command, immutable once constructed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Deserialize, serde::Serialize))]
pub enum Command {
    /// Store `word` at `address`.
    Write {
        /// Target address.
        address: Address,
        /// Word to store.
        word: Word,
    },
    /// Fetch the word stored at `address`.
    Read {
        /// Source address.
        address: Address,
    },
}

impl Command {
    /// Encodes the command into its wire frame.
    #[must_use]
    pub fn encode(self) -> Vec<u8> {
        match self {
            Self::Write { address, word } => encode_write(address, word).to_vec(),
            Self::Read { address } => encode_read(address).to_vec(),
        }
    }
}

/// Framing violations on the response path.
///
/// Reaching one of these means the transport broke its whole-frame contract;
/// callers treat it as fatal.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CodecError {
    /// The transport handed over something other than a whole 2-byte response.
    #[error("malformed response: expected {RESPONSE_LEN} bytes, got {len}")]
    ResponseLength {
        /// Byte count actually handed to the decoder.
        len: usize,
    },
}

/// Encodes a write command frame.
#[must_use]
pub const fn encode_write(address: Address, word: Word) -> [u8; WRITE_FRAME_LEN] {
    let data = word.to_be_bytes();
    [
        WRITE_OPCODE,
        address.high2(),
        address.mid8(),
        address.low8(),
        data[0],
        data[1],
    ]
}

/// Encodes a read command frame.
#[must_use]
pub const fn encode_read(address: Address) -> [u8; READ_FRAME_LEN] {
    [READ_OPCODE, address.high2(), address.mid8(), address.low8()]
}

/// Decodes a 2-byte read response into its big-endian word.
///
/// # Errors
///
/// Returns [`CodecError::ResponseLength`] for any length other than
/// [`RESPONSE_LEN`]. The transport never hands over partial frames, so this
/// is a broken-invariant signal rather than an expected condition.
pub fn decode_response(bytes: &[u8]) -> Result<Word, CodecError> {
    match bytes {
        [high, low] => Ok(Word::from_be_bytes([*high, *low])),
        other => Err(CodecError::ResponseLength { len: other.len() }),
    }
}
