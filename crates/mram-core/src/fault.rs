//! Fault records, phases, and the append-only session log.

use std::fmt;

use crate::units::{Address, Word};

/// Outcome of one read as observed by the engine.
///
/// A timeout is deliberately disjoint from every word value; no sentinel word
/// ever stands in for "no response".
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Deserialize, serde::Serialize))]
pub enum Response {
    /// A decoded 16-bit word.
    Value(Word),
    /// No complete response arrived inside the read window.
    Timeout,
}

impl fmt::Display for Response {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Value(word) => write!(f, "0x{word:04X}"),
            Self::Timeout => f.write_str("TIMEOUT"),
        }
    }
}

/// Test phase that exposed a fault.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Deserialize, serde::Serialize))]
pub enum Phase {
    /// March C ascending read-0 / write-1 element (phase 2 of 6).
    MarchRead0Write1Up,
    /// March C ascending read-1 / write-0 element (phase 3 of 6).
    MarchRead1Write0Up,
    /// March C descending read-0 / write-1 element (phase 4 of 6).
    MarchRead0Write1Down,
    /// March C descending read-1 / write-0 element (phase 5 of 6).
    MarchRead1Write0Down,
    /// March C final ascending read-0 sweep (phase 6 of 6).
    MarchFinalRead0,
    /// Walking-ones readback.
    WalkingOnes,
    /// Walking-zeros readback.
    WalkingZeros,
    /// Checkerboard first pass.
    Checkerboard,
    /// Inverted checkerboard second pass.
    InverseCheckerboard,
    /// Address-as-data verification.
    AddressUniqueness,
    /// Post-power-cycle retention verification.
    Retention,
}

impl Phase {
    /// Stable label used in reports.
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::MarchRead0Write1Up => "march-r0w1-up",
            Self::MarchRead1Write0Up => "march-r1w0-up",
            Self::MarchRead0Write1Down => "march-r0w1-down",
            Self::MarchRead1Write0Down => "march-r1w0-down",
            Self::MarchFinalRead0 => "march-final-r0",
            Self::WalkingOnes => "walking-ones",
            Self::WalkingZeros => "walking-zeros",
            Self::Checkerboard => "checkerboard",
            Self::InverseCheckerboard => "inverse-checkerboard",
            Self::AddressUniqueness => "address-uniqueness",
            Self::Retention => "retention",
        }
    }
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// One observed deviation from an expected value. Immutable once created.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Deserialize, serde::Serialize))]
pub struct FaultRecord {
    /// Address whose readback deviated.
    pub address: Address,
    /// Phase that exposed the fault.
    pub phase: Phase,
    /// Word the algorithm expected to read.
    pub expected: Word,
    /// What actually came back.
    pub observed: Response,
}

impl fmt::Display for FaultRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} [{}]: expected 0x{:04X}, observed {}",
            self.address, self.phase, self.expected, self.observed
        )
    }
}

/// Append-only log aggregating faults across the runs of one session.
///
/// There is no deduplication: the same address can legitimately fault in
/// several phases, and each occurrence is informative.
#[derive(Debug, Default)]
pub struct FaultLog {
    records: Vec<FaultRecord>,
}

impl FaultLog {
    /// An empty log.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            records: Vec::new(),
        }
    }

    /// Appends one record.
    pub fn record(&mut self, record: FaultRecord) {
        self.records.push(record);
    }

    /// Appends every fault captured by a finished run, in order.
    pub fn extend(&mut self, records: &[FaultRecord]) {
        self.records.extend_from_slice(records);
    }

    /// Total number of recorded faults.
    #[must_use]
    pub fn fault_count(&self) -> usize {
        self.records.len()
    }

    /// `true` while no fault has been recorded.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// All records in insertion order.
    #[must_use]
    pub fn records(&self) -> &[FaultRecord] {
        &self.records
    }

    /// Aggregate view: total count plus at most the first `limit` records.
    #[must_use]
    pub fn summary(&self, limit: usize) -> FaultSummary<'_> {
        FaultSummary {
            fault_count: self.records.len(),
            first: &self.records[..self.records.len().min(limit)],
        }
    }
}

/// Borrowed aggregate over a [`FaultLog`].
#[derive(Debug, Clone, Copy)]
pub struct FaultSummary<'a> {
    /// Total fault count across the session.
    pub fault_count: usize,
    /// Leading records, capped at the requested limit.
    pub first: &'a [FaultRecord],
}

#[cfg(test)]
mod tests {
    use super::{FaultLog, FaultRecord, Phase, Response};
    use crate::units::Address;

    fn fault(raw: u32, phase: Phase) -> FaultRecord {
        FaultRecord {
            address: Address::new(raw).unwrap(),
            phase,
            expected: 0x55AA,
            observed: Response::Timeout,
        }
    }

    #[test]
    fn log_is_append_only_and_keeps_duplicates() {
        let mut log = FaultLog::new();
        assert!(log.is_empty());
        log.record(fault(0x101, Phase::MarchRead0Write1Up));
        log.record(fault(0x101, Phase::MarchRead1Write0Down));
        log.record(fault(0x101, Phase::MarchRead1Write0Down));
        assert_eq!(log.fault_count(), 3);
        assert_eq!(log.records().len(), 3);
    }

    #[test]
    fn summary_caps_at_the_requested_limit() {
        let mut log = FaultLog::new();
        for raw in 0..25 {
            log.record(fault(raw, Phase::AddressUniqueness));
        }
        let summary = log.summary(20);
        assert_eq!(summary.fault_count, 25);
        assert_eq!(summary.first.len(), 20);
        assert_eq!(summary.first[0].address.value(), 0);

        let small = log.summary(100);
        assert_eq!(small.first.len(), 25);
    }

    #[test]
    fn record_formats_timeouts_distinctly() {
        let record = fault(0x101, Phase::Retention);
        let text = record.to_string();
        assert!(text.contains("0x00101"));
        assert!(text.contains("retention"));
        assert!(text.contains("TIMEOUT"));
        assert!(!text.contains("0xDEAD"));
    }
}
