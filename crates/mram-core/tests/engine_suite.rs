//! Engine scenarios against in-memory mock devices.
//!
//! The mocks implement the real wire protocol over a hash-map store, so every
//! test exercises the codec, the transport contract, and the traversal logic
//! together without hardware.

use proptest as _;
use rstest as _;
#[cfg(feature = "serde")]
use serde as _;
use serialport as _;
use thiserror as _;
use tracing as _;

use std::collections::{HashMap, HashSet};
use std::time::Duration;

use mram_core::{
    retention_vector, Address, AddressRange, Algorithm, CancelToken, EngineError,
    MemoryTestEngine, Phase, Progress, Response, TimingConfig, Transport, TransportError,
    VectorEntry,
};

/// Operations observed by the mock, in wire order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Op {
    Write(u32, u16),
    Read(u32),
}

/// Fault injection knobs for the mock device.
#[derive(Debug, Default)]
struct Behavior {
    /// Writes to `A` silently also overwrite `A ^ mask` (decoder aliasing).
    alias_mask: Option<u32>,
    /// `(address, bit mask, stuck_high)`: the masked bits of this cell are
    /// pinned to 1 (stuck high) or 0 (stuck low).
    stuck: Option<(u32, u16, bool)>,
    /// Reads of these addresses never produce a response.
    timeout_addresses: HashSet<u32>,
}

/// Ideal-by-default mock MRAM behind the real wire protocol.
#[derive(Debug, Default)]
struct MockBridge {
    store: HashMap<u32, u16>,
    pending: Vec<u8>,
    behavior: Behavior,
    ops: Vec<Op>,
}

impl MockBridge {
    fn with_behavior(behavior: Behavior) -> Self {
        Self {
            behavior,
            ..Self::default()
        }
    }

    fn apply_cell_faults(&self, address: u32, word: u16) -> u16 {
        match self.behavior.stuck {
            Some((stuck_addr, mask, true)) if stuck_addr == address => word | mask,
            Some((stuck_addr, mask, false)) if stuck_addr == address => word & !mask,
            _ => word,
        }
    }

    fn store_write(&mut self, address: u32, word: u16) {
        let stored = self.apply_cell_faults(address, word);
        self.store.insert(address, stored);
        if let Some(mask) = self.behavior.alias_mask {
            let alias = address ^ mask;
            let stored = self.apply_cell_faults(alias, word);
            self.store.insert(alias, stored);
        }
    }

    fn reads(&self) -> Vec<u32> {
        self.ops
            .iter()
            .filter_map(|op| match op {
                Op::Read(addr) => Some(*addr),
                Op::Write(..) => None,
            })
            .collect()
    }

    fn writes(&self) -> Vec<(u32, u16)> {
        self.ops
            .iter()
            .filter_map(|op| match op {
                Op::Write(addr, word) => Some((*addr, *word)),
                Op::Read(_) => None,
            })
            .collect()
    }
}

fn frame_address(frame: &[u8]) -> u32 {
    (u32::from(frame[1]) << 16) | (u32::from(frame[2]) << 8) | u32::from(frame[3])
}

impl Transport for MockBridge {
    fn send(&mut self, bytes: &[u8]) -> Result<(), TransportError> {
        match bytes {
            [0x57, _, _, _, hi, lo] => {
                let address = frame_address(bytes);
                let word = u16::from_be_bytes([*hi, *lo]);
                self.ops.push(Op::Write(address, word));
                self.store_write(address, word);
            }
            [0x52, _, _, _] => {
                let address = frame_address(bytes);
                self.ops.push(Op::Read(address));
                if !self.behavior.timeout_addresses.contains(&address) {
                    let word = self.store.get(&address).copied().unwrap_or(0x0000);
                    self.pending.extend_from_slice(&word.to_be_bytes());
                }
            }
            other => panic!("unexpected frame: {other:02X?}"),
        }
        Ok(())
    }

    fn receive(
        &mut self,
        expected_len: usize,
        _timeout: Duration,
    ) -> Result<Vec<u8>, TransportError> {
        if self.pending.len() >= expected_len {
            Ok(self.pending.drain(..expected_len).collect())
        } else {
            Err(TransportError::Timeout {
                expected: expected_len,
                received: self.pending.len(),
            })
        }
    }

    fn discard_input(&mut self) -> Result<(), TransportError> {
        self.pending.clear();
        Ok(())
    }

    fn discard_output(&mut self) -> Result<(), TransportError> {
        Ok(())
    }
}

fn addr(raw: u32) -> Address {
    Address::new(raw).unwrap()
}

fn range(start: u32, end: u32) -> AddressRange {
    AddressRange::new(addr(start), addr(end)).unwrap()
}

fn engine<'t>(bridge: &'t mut dyn Transport, cancel: CancelToken) -> MemoryTestEngine<'t> {
    MemoryTestEngine::new(bridge, TimingConfig::immediate(), cancel)
}

#[test]
fn march_c_over_clean_memory_yields_zero_faults() {
    let mut bridge = MockBridge::default();
    let mut engine = engine(&mut bridge, CancelToken::new());
    let result = engine.run(Algorithm::MarchC, range(0, 0x1F)).unwrap();
    assert_eq!(result.algorithm, "march-c");
    assert!(result.completed);
    assert!(result.passed());
    assert_eq!(result.fault_count(), 0);
}

#[test]
fn march_c_read_traversal_alternates_direction() {
    let mut bridge = MockBridge::default();
    {
        let mut engine = engine(&mut bridge, CancelToken::new());
        engine.run(Algorithm::MarchC, range(0, 3)).unwrap();
    }

    let up = [0, 1, 2, 3];
    let down = [3, 2, 1, 0];
    let mut expected = Vec::new();
    expected.extend(up); // phase 2
    expected.extend(up); // phase 3
    expected.extend(down); // phase 4
    expected.extend(down); // phase 5
    expected.extend(up); // phase 6
    assert_eq!(bridge.reads(), expected);
}

#[test]
fn march_c_flags_a_stuck_low_bit_in_both_read_one_elements() {
    let behavior = Behavior {
        stuck: Some((0x5, 0x0001, false)),
        ..Behavior::default()
    };
    let mut bridge = MockBridge::with_behavior(behavior);
    let mut engine = engine(&mut bridge, CancelToken::new());
    let result = engine.run(Algorithm::MarchC, range(0, 0xF)).unwrap();

    assert_eq!(result.fault_count(), 2);
    for fault in &result.faults {
        assert_eq!(fault.address.value(), 0x5);
        assert_eq!(fault.expected, 0xFFFF);
        assert_eq!(fault.observed, Response::Value(0xFFFE));
    }
    assert_eq!(result.faults[0].phase, Phase::MarchRead1Write0Up);
    assert_eq!(result.faults[1].phase, Phase::MarchRead1Write0Down);
}

#[test]
fn march_c_reports_all_six_phases_in_order() {
    let mut bridge = MockBridge::default();
    let mut labels = Vec::new();
    {
        let mut engine = engine(&mut bridge, CancelToken::new());
        engine
            .run_with_progress(Algorithm::MarchC, range(0, 3), |event| {
                if let Progress::PhaseStarted { label, .. } = event {
                    labels.push(label);
                }
            })
            .unwrap();
    }
    assert_eq!(
        labels,
        vec![
            "march 1/6: write 0 (up)",
            "march 2/6: read 0, write 1 (up)",
            "march 3/6: read 1, write 0 (up)",
            "march 4/6: read 0, write 1 (down)",
            "march 5/6: read 1, write 0 (down)",
            "march 6/6: read 0 (up)",
        ]
    );
}

#[test]
fn walking_ones_writes_each_one_hot_pattern_exactly_once() {
    let mut bridge = MockBridge::default();
    {
        let mut engine = engine(&mut bridge, CancelToken::new());
        let result = engine
            .run(Algorithm::WalkingOnes, range(0x100, 0x100))
            .unwrap();
        assert!(result.passed());
    }

    let writes = bridge.writes();
    assert_eq!(writes.len(), 16);
    for (i, (address, word)) in writes.iter().enumerate() {
        assert_eq!(*address, 0x100 + u32::try_from(i).unwrap());
        assert_eq!(*word, 1_u16 << i);
    }
}

#[test]
fn walking_zeros_writes_the_complement_patterns() {
    let mut bridge = MockBridge::default();
    {
        let mut engine = engine(&mut bridge, CancelToken::new());
        let result = engine
            .run(Algorithm::WalkingZeros, range(0x100, 0x100))
            .unwrap();
        assert!(result.passed());
    }

    let words: Vec<u16> = bridge.writes().iter().map(|&(_, word)| word).collect();
    let expected: Vec<u16> = (0..16).map(|i| !(1_u16 << i)).collect();
    assert_eq!(words, expected);
}

#[test]
fn walking_ones_pinpoints_a_bit_stuck_at_zero() {
    let behavior = Behavior {
        stuck: Some((0x105, 1 << 5, false)),
        ..Behavior::default()
    };
    let mut bridge = MockBridge::with_behavior(behavior);
    let mut engine = engine(&mut bridge, CancelToken::new());
    let result = engine
        .run(Algorithm::WalkingOnes, range(0x100, 0x100))
        .unwrap();

    assert_eq!(result.fault_count(), 1);
    let fault = result.faults[0];
    assert_eq!(fault.address.value(), 0x105);
    assert_eq!(fault.phase, Phase::WalkingOnes);
    assert_eq!(fault.expected, 0x0020);
    assert_eq!(fault.observed, Response::Value(0x0000));
}

#[test]
fn walking_zeros_pinpoints_a_bit_stuck_at_one() {
    let behavior = Behavior {
        stuck: Some((0x105, 1 << 5, true)),
        ..Behavior::default()
    };
    let mut bridge = MockBridge::with_behavior(behavior);
    let mut engine = engine(&mut bridge, CancelToken::new());
    let result = engine
        .run(Algorithm::WalkingZeros, range(0x100, 0x100))
        .unwrap();

    assert_eq!(result.fault_count(), 1);
    let fault = result.faults[0];
    assert_eq!(fault.address.value(), 0x105);
    assert_eq!(fault.phase, Phase::WalkingZeros);
    assert_eq!(fault.expected, !(1_u16 << 5));
    assert_eq!(fault.observed, Response::Value(0xFFFF));
}

#[test]
fn checkerboard_validates_every_address_under_both_patterns() {
    let mut bridge = MockBridge::default();
    {
        let mut engine = engine(&mut bridge, CancelToken::new());
        let result = engine.run(Algorithm::Checkerboard, range(0, 0xF)).unwrap();
        assert!(result.passed());
    }

    let mut seen: HashMap<u32, HashSet<u16>> = HashMap::new();
    for (address, word) in bridge.writes() {
        seen.entry(address).or_default().insert(word);
    }
    for address in 0..=0xF {
        let patterns = &seen[&address];
        assert_eq!(
            patterns,
            &HashSet::from([0xAAAA, 0x5555]),
            "address {address:#X} missed a checkerboard pass"
        );
    }
}

#[test]
fn write_then_read_round_trips_through_the_wire() {
    let mut bridge = MockBridge::default();
    let mut engine = engine(&mut bridge, CancelToken::new());
    engine.write_word(addr(0x00100), 0xAA55).unwrap();
    assert_eq!(
        engine.read_word(addr(0x00100)).unwrap(),
        Response::Value(0xAA55)
    );
}

#[test]
fn read_timeout_becomes_a_retention_fault_not_an_error() {
    let behavior = Behavior {
        timeout_addresses: HashSet::from([0x00101]),
        ..Behavior::default()
    };
    let mut bridge = MockBridge::with_behavior(behavior);
    let mut engine = engine(&mut bridge, CancelToken::new());

    let vector = vec![VectorEntry::new(addr(0x00101), 0x55AA, "victim")];
    engine.write_vector(&vector).unwrap();
    let result = engine.verify_vector(&vector).unwrap();

    assert_eq!(result.algorithm, "retention");
    assert_eq!(result.fault_count(), 1);
    let fault = result.faults[0];
    assert_eq!(fault.address.value(), 0x00101);
    assert_eq!(fault.expected, 0x55AA);
    assert_eq!(fault.observed, Response::Timeout);
}

#[test]
fn march_c_keeps_sweeping_past_a_dead_address() {
    let behavior = Behavior {
        timeout_addresses: HashSet::from([0x3]),
        ..Behavior::default()
    };
    let mut bridge = MockBridge::with_behavior(behavior);
    let mut engine = engine(&mut bridge, CancelToken::new());
    let result = engine.run(Algorithm::MarchC, range(0, 0x7)).unwrap();

    // Address 0x3 is read once in each of phases 2 through 6.
    assert!(result.completed);
    assert_eq!(result.fault_count(), 5);
    assert!(result
        .faults
        .iter()
        .all(|f| f.address.value() == 0x3 && f.observed == Response::Timeout));
}

#[test]
fn address_uniqueness_is_clean_and_idempotent_on_ideal_memory() {
    let mut bridge = MockBridge::default();
    let mut engine = engine(&mut bridge, CancelToken::new());

    let first = engine
        .run(Algorithm::AddressUniqueness, range(0, 0xF))
        .unwrap();
    let second = engine
        .run(Algorithm::AddressUniqueness, range(0, 0xF))
        .unwrap();

    assert_eq!(first.fault_count(), 0);
    assert_eq!(second.fault_count(), 0);
    assert_eq!(first.faults, second.faults);
    assert!(first.passed() && second.passed());
}

#[test]
fn address_uniqueness_exposes_decoder_aliasing_pairs() {
    let behavior = Behavior {
        alias_mask: Some(0x1),
        ..Behavior::default()
    };
    let mut bridge = MockBridge::with_behavior(behavior);
    let mut engine = engine(&mut bridge, CancelToken::new());
    let result = engine
        .run(Algorithm::AddressUniqueness, range(0, 0xF))
        .unwrap();

    // Ascending writes mean the odd partner of each pair lands last, so the
    // even address of every aliased pair holds its partner's value.
    let faulted: Vec<u32> = result.faults.iter().map(|f| f.address.value()).collect();
    assert_eq!(faulted, vec![0x0, 0x2, 0x4, 0x6, 0x8, 0xA, 0xC, 0xE]);
    for fault in &result.faults {
        let partner = u16::try_from(fault.address.value() ^ 0x1).unwrap();
        assert_eq!(fault.phase, Phase::AddressUniqueness);
        assert_eq!(fault.observed, Response::Value(partner));
    }
}

#[test]
fn pre_cancelled_token_stops_the_run_before_any_traffic() {
    let mut bridge = MockBridge::default();
    let token = CancelToken::new();
    token.cancel();
    {
        let mut engine = engine(&mut bridge, token);
        let result = engine.run(Algorithm::MarchC, range(0, 0xF)).unwrap();
        assert!(!result.completed);
        assert!(!result.passed());
        assert_eq!(result.fault_count(), 0);
    }
    assert!(bridge.ops.is_empty());
}

/// Wrapper that trips the cancel token after a fixed number of sends.
struct CancelAfter<T> {
    inner: T,
    token: CancelToken,
    remaining: usize,
}

impl<T: Transport> Transport for CancelAfter<T> {
    fn send(&mut self, bytes: &[u8]) -> Result<(), TransportError> {
        if self.remaining == 0 {
            self.token.cancel();
        } else {
            self.remaining -= 1;
        }
        self.inner.send(bytes)
    }

    fn receive(
        &mut self,
        expected_len: usize,
        timeout: Duration,
    ) -> Result<Vec<u8>, TransportError> {
        self.inner.receive(expected_len, timeout)
    }

    fn discard_input(&mut self) -> Result<(), TransportError> {
        self.inner.discard_input()
    }

    fn discard_output(&mut self) -> Result<(), TransportError> {
        self.inner.discard_output()
    }
}

#[test]
fn mid_run_cancellation_returns_the_partial_result() {
    let token = CancelToken::new();
    let mut bridge = CancelAfter {
        inner: MockBridge::default(),
        token: token.clone(),
        remaining: 20,
    };
    let result = {
        let mut engine = MemoryTestEngine::new(&mut bridge, TimingConfig::immediate(), token);
        engine.run(Algorithm::MarchC, range(0, 0xF)).unwrap()
    };
    assert!(!result.completed);
    // The cancelled run stopped well before the full script's traffic.
    assert!(bridge.inner.ops.len() < 16 * 11);
}

/// Transport whose channel dies after a fixed number of sends.
struct DieAfter {
    inner: MockBridge,
    remaining: usize,
}

impl Transport for DieAfter {
    fn send(&mut self, bytes: &[u8]) -> Result<(), TransportError> {
        if self.remaining == 0 {
            return Err(TransportError::Io(std::io::Error::other("cable pulled")));
        }
        self.remaining -= 1;
        self.inner.send(bytes)
    }

    fn receive(
        &mut self,
        expected_len: usize,
        timeout: Duration,
    ) -> Result<Vec<u8>, TransportError> {
        self.inner.receive(expected_len, timeout)
    }

    fn discard_input(&mut self) -> Result<(), TransportError> {
        self.inner.discard_input()
    }

    fn discard_output(&mut self) -> Result<(), TransportError> {
        self.inner.discard_output()
    }
}

#[test]
fn connection_failure_unwinds_the_run() {
    let mut bridge = DieAfter {
        inner: MockBridge::default(),
        remaining: 10,
    };
    let mut engine = MemoryTestEngine::new(
        &mut bridge,
        TimingConfig::immediate(),
        CancelToken::new(),
    );
    let err = engine.run(Algorithm::MarchC, range(0, 0xF)).unwrap_err();
    assert!(matches!(err, EngineError::Transport(ref e) if !e.is_timeout()));
}

#[test]
fn retention_vector_round_trips_on_ideal_memory() {
    let mut bridge = MockBridge::default();
    let vector = retention_vector();
    {
        let mut engine = engine(&mut bridge, CancelToken::new());
        engine.write_vector(&vector).unwrap();
        let result = engine.verify_vector(&vector).unwrap();
        assert!(result.passed());
        assert_eq!(result.range.start().value(), 0x00010);
        assert_eq!(result.range.end().value(), 0x02001);
    }
    assert_eq!(bridge.store.get(&0x00010), Some(&0xBAEF));
}

#[test]
fn warmup_survives_unresponsive_addresses() {
    let behavior = Behavior {
        timeout_addresses: HashSet::from([0x3FFFF, 0x00100, 0x01000]),
        ..Behavior::default()
    };
    let mut bridge = MockBridge::with_behavior(behavior);
    let mut engine = engine(&mut bridge, CancelToken::new());
    engine.warmup().unwrap();
}
