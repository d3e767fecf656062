//! Write-then-verify vectors for retention (non-volatility) checks.
//!
//! The write phase stores a known pattern mix; the verify phase runs later,
//! usually in a new process after the board has been power cycled, and reads
//! every location back. Persisting the vector between the two phases is the
//! caller's concern; the engine only needs the entries.

use std::time::Instant;

use tracing::debug;

use crate::engine::{EngineError, MemoryTestEngine, TestResult};
use crate::fault::{FaultRecord, Phase, Response};
use crate::units::{Address, AddressRange, ConfigError, Word};

/// One location of a write-then-verify vector.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Deserialize, serde::Serialize))]
pub struct VectorEntry {
    /// Location written during the write phase.
    pub address: Address,
    /// Word expected to survive the power cycle.
    pub word: Word,
    /// Operator-facing label carried through reports and the vector file.
    pub label: String,
}

impl VectorEntry {
    /// New entry with the given label.
    pub fn new(address: Address, word: Word, label: impl Into<String>) -> Self {
        Self {
            address,
            word,
            label: label.into(),
        }
    }
}

/// The canonical 16-location retention vector: magic constants, sequential
/// runs, alternating patterns, and edge bits spread across the address space.
#[must_use]
pub fn retention_vector() -> Vec<VectorEntry> {
    const LOCATIONS: [(u32, Word, &str); 16] = [
        (0x00010, 0xBAEF, "Magic pattern 1"),
        (0x00011, 0xBEED, "Magic pattern 2"),
        (0x00012, 0xAAFE, "Magic pattern 3"),
        (0x00013, 0xCABE, "Magic pattern 4"),
        (0x00100, 0x4234, "Sequential 1"),
        (0x00101, 0x2678, "Sequential 2"),
        (0x00102, 0x1ABC, "Sequential 3"),
        (0x00103, 0xCEF0, "Sequential 4"),
        (0x00200, 0xFAAA, "Alternating A"),
        (0x00201, 0x0555, "Alternating 5"),
        (0x00202, 0xEFFF, "All ones"),
        (0x00203, 0x2000, "All zeros"),
        (0x01000, 0x40FF, "Byte pattern 1"),
        (0x01001, 0x8F00, "Byte pattern 2"),
        (0x02000, 0x4001, "Edge bits 1"),
        (0x02001, 0x3002, "Edge bits 2"),
    ];
    LOCATIONS
        .iter()
        .map(|&(raw, word, label)| VectorEntry::new(Address::from_raw(raw), word, label))
        .collect()
}

/// Smallest range covering every entry, for result reporting.
fn vector_span(entries: &[VectorEntry]) -> Result<AddressRange, ConfigError> {
    let first = entries.first().ok_or(ConfigError::EmptyVector)?;
    let mut start = first.address;
    let mut end = first.address;
    for entry in entries {
        start = start.min(entry.address);
        end = end.max(entry.address);
    }
    AddressRange::new(start, end)
}

impl MemoryTestEngine<'_> {
    /// Writes every vector entry.
    ///
    /// Cancellation stops the remaining writes; a partially written vector is
    /// simply not worth verifying.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::Config`] for an empty vector and
    /// [`EngineError::Transport`] on channel failure.
    pub fn write_vector(&mut self, entries: &[VectorEntry]) -> Result<(), EngineError> {
        vector_span(entries)?;
        for entry in entries {
            if self.is_cancelled() {
                debug!("vector write cancelled");
                return Ok(());
            }
            self.write_word(entry.address, entry.word)?;
        }
        Ok(())
    }

    /// Reads every entry back and compares against the written words.
    ///
    /// Mismatches and timeouts become faults tagged [`Phase::Retention`];
    /// the verify keeps going so the result is a complete retention map.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::Config`] for an empty vector,
    /// [`EngineError::Transport`] on channel failure, and
    /// [`EngineError::Codec`] when response framing breaks.
    pub fn verify_vector(&mut self, entries: &[VectorEntry]) -> Result<TestResult, EngineError> {
        let range = vector_span(entries)?;
        let started = Instant::now();
        let mut faults = Vec::new();
        let mut completed = true;

        for entry in entries {
            if self.is_cancelled() {
                completed = false;
                break;
            }
            match self.read_word(entry.address)? {
                Response::Value(word) if word == entry.word => {}
                observed => {
                    faults.push(FaultRecord {
                        address: entry.address,
                        phase: Phase::Retention,
                        expected: entry.word,
                        observed,
                    });
                }
            }
        }

        Ok(TestResult {
            algorithm: "retention",
            range,
            faults,
            elapsed: started.elapsed(),
            completed,
        })
    }

    /// Post-power-cycle interface warm-up.
    ///
    /// The first access after reset to address `0x00000` fails on the real
    /// bridge, so the address register is first nudged with a dummy write to
    /// the top of memory, followed by a few dummy reads. Read timeouts during
    /// warm-up are ignored; this is stabilization, not verification.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::Transport`] on channel failure.
    pub fn warmup(&mut self) -> Result<(), EngineError> {
        debug!("warming up interface");
        self.write_word(Address::MAX, 0x0000)?;
        for address in [
            Address::MAX,
            Address::from_raw(0x00100),
            Address::from_raw(0x01000),
        ] {
            let _ = self.read_word(address)?;
        }
        self.discard_buffers()
    }
}
