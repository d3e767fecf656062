//! Address and word primitives shared by the codec and the test engine.
//!
//! Every value is validated at construction; nothing outside the device's
//! 18-bit address space or 16-bit word space ever reaches the encoder.

use std::fmt;

use thiserror::Error;

/// Number of address bits decoded by the device (4 Mbit organised 256K x 16).
pub const ADDRESS_BITS: u32 = 18;
/// Highest valid device address.
pub const ADDRESS_MAX: u32 = 0x3_FFFF;
/// Number of data bits per word.
pub const WORD_BITS: u32 = 16;

/// A 16-bit data word as stored at one address.
pub type Word = u16;

/// Pre-flight validation failures. Nothing is sent to the device when one of
/// these is produced.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigError {
    /// Raw value exceeds the 18-bit address space.
    #[error("address {raw:#07X} outside device range 0x00000..=0x3FFFF")]
    AddressOutOfRange {
        /// The rejected raw value.
        raw: u32,
    },
    /// Raw value exceeds the 16-bit word space.
    #[error("value {raw:#X} does not fit a 16-bit word")]
    WordOutOfRange {
        /// The rejected raw value.
        raw: u32,
    },
    /// Range construction with `start` above `end`.
    #[error("range start {start} is above range end {end}")]
    EmptyRange {
        /// Requested range start.
        start: Address,
        /// Requested range end.
        end: Address,
    },
    /// Input did not match the fixed numeric grammar.
    #[error("malformed number {input:?}: expected hex digits with an optional 0x prefix")]
    MalformedNumber {
        /// The rejected input text.
        input: String,
    },
    /// A write-then-verify vector with no entries.
    #[error("test vector contains no entries")]
    EmptyVector,
}

/// Validated 18-bit device address.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Deserialize, serde::Serialize))]
pub struct Address(u32);

impl Address {
    /// Lowest valid address.
    pub const MIN: Self = Self(0);
    /// Highest valid address.
    pub const MAX: Self = Self(ADDRESS_MAX);

    /// Validates `raw` against the 18-bit address space.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::AddressOutOfRange`] when `raw` exceeds
    /// [`ADDRESS_MAX`]. Out-of-range values are rejected here, never masked.
    pub const fn new(raw: u32) -> Result<Self, ConfigError> {
        if raw <= ADDRESS_MAX {
            Ok(Self(raw))
        } else {
            Err(ConfigError::AddressOutOfRange { raw })
        }
    }

    /// Internal constructor for compile-time constants known to be in range.
    pub(crate) const fn from_raw(raw: u32) -> Self {
        Self(raw & ADDRESS_MAX)
    }

    /// Raw numeric value.
    #[must_use]
    pub const fn value(self) -> u32 {
        self.0
    }

    /// Bits 17..=16, the 2-bit high field of the wire address.
    #[must_use]
    pub const fn high2(self) -> u8 {
        ((self.0 >> 16) & 0x03) as u8
    }

    /// Bits 15..=8 of the wire address.
    #[must_use]
    pub const fn mid8(self) -> u8 {
        ((self.0 >> 8) & 0xFF) as u8
    }

    /// Bits 7..=0 of the wire address.
    #[must_use]
    pub const fn low8(self) -> u8 {
        (self.0 & 0xFF) as u8
    }

    /// Low 16 bits of the address, the expected data word for the
    /// address-uniqueness test.
    #[must_use]
    pub const fn as_word(self) -> Word {
        (self.0 & 0xFFFF) as Word
    }

    /// Address `offset` words above this one.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::AddressOutOfRange`] when the result would leave
    /// the device address space.
    pub const fn offset(self, offset: u32) -> Result<Self, ConfigError> {
        Self::new(self.0 + offset)
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{:05X}", self.0)
    }
}

/// Inclusive address range swept by the range-based algorithms.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Deserialize, serde::Serialize))]
pub struct AddressRange {
    start: Address,
    end: Address,
}

impl AddressRange {
    /// The whole 18-bit device address space.
    pub const FULL: Self = Self {
        start: Address::MIN,
        end: Address::MAX,
    };

    /// Builds the inclusive range `[start, end]`.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::EmptyRange`] when `start` is above `end`; a
    /// range always covers at least one address.
    pub const fn new(start: Address, end: Address) -> Result<Self, ConfigError> {
        if start.0 <= end.0 {
            Ok(Self { start, end })
        } else {
            Err(ConfigError::EmptyRange { start, end })
        }
    }

    /// First address of the range.
    #[must_use]
    pub const fn start(self) -> Address {
        self.start
    }

    /// Last address of the range.
    #[must_use]
    pub const fn end(self) -> Address {
        self.end
    }

    /// Number of addresses covered.
    #[must_use]
    pub const fn word_count(self) -> u32 {
        self.end.0 - self.start.0 + 1
    }

    /// Addresses in ascending order.
    pub fn iter_up(self) -> impl Iterator<Item = Address> {
        (self.start.0..=self.end.0).map(Address)
    }

    /// Addresses in descending order.
    pub fn iter_down(self) -> impl Iterator<Item = Address> {
        (self.start.0..=self.end.0).rev().map(Address)
    }
}

impl fmt::Display for AddressRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}..={}", self.start, self.end)
    }
}

/// Range presets mirroring the interactive tester's menu.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RangePreset {
    /// First 1K addresses, a couple of minutes on real hardware.
    Quick,
    /// First 10K addresses.
    Small,
    /// First 100K addresses.
    Medium,
    /// All 262 144 addresses; hours on real hardware.
    Full,
}

impl RangePreset {
    /// The concrete address range selected by this preset.
    #[must_use]
    pub const fn range(self) -> AddressRange {
        let end = match self {
            Self::Quick => Address::from_raw(0x003FF),
            Self::Small => Address::from_raw(0x027FF),
            Self::Medium => Address::from_raw(0x1_869F),
            Self::Full => Address::MAX,
        };
        AddressRange {
            start: Address::MIN,
            end,
        }
    }
}

/// Parses a number using the tester's fixed grammar: hexadecimal digits with
/// an optional `0x`/`0X` prefix. There is no decimal fallback.
///
/// # Errors
///
/// Returns [`ConfigError::MalformedNumber`] for empty input or non-hex digits.
pub fn parse_hex(input: &str) -> Result<u32, ConfigError> {
    let trimmed = input.trim();
    let digits = trimmed
        .strip_prefix("0x")
        .or_else(|| trimmed.strip_prefix("0X"))
        .unwrap_or(trimmed);
    if digits.is_empty() {
        return Err(ConfigError::MalformedNumber {
            input: trimmed.to_string(),
        });
    }
    u32::from_str_radix(digits, 16).map_err(|_| ConfigError::MalformedNumber {
        input: trimmed.to_string(),
    })
}

/// Parses an address using the fixed hex grammar, then range-checks it.
///
/// # Errors
///
/// Returns [`ConfigError::MalformedNumber`] for bad syntax and
/// [`ConfigError::AddressOutOfRange`] for values beyond 18 bits.
pub fn parse_address(input: &str) -> Result<Address, ConfigError> {
    Address::new(parse_hex(input)?)
}

/// Parses a data word using the fixed hex grammar, then range-checks it.
///
/// # Errors
///
/// Returns [`ConfigError::MalformedNumber`] for bad syntax and
/// [`ConfigError::WordOutOfRange`] for values beyond 16 bits.
pub fn parse_word(input: &str) -> Result<Word, ConfigError> {
    let raw = parse_hex(input)?;
    Word::try_from(raw).map_err(|_| ConfigError::WordOutOfRange { raw })
}

#[cfg(test)]
mod tests {
    use rstest::rstest;

    use super::{
        parse_address, parse_hex, parse_word, Address, AddressRange, ConfigError, RangePreset,
        ADDRESS_MAX,
    };

    #[test]
    fn address_accepts_full_18_bit_space() {
        assert_eq!(Address::new(0).map(Address::value), Ok(0));
        assert_eq!(Address::new(ADDRESS_MAX).map(Address::value), Ok(ADDRESS_MAX));
        assert_eq!(
            Address::new(ADDRESS_MAX + 1),
            Err(ConfigError::AddressOutOfRange {
                raw: ADDRESS_MAX + 1
            })
        );
    }

    #[test]
    fn wire_fields_reassemble_the_address() {
        let address = Address::new(0x2_AB_CD).unwrap();
        assert_eq!(address.high2(), 0x02);
        assert_eq!(address.mid8(), 0xAB);
        assert_eq!(address.low8(), 0xCD);
        let rebuilt =
            (u32::from(address.high2()) << 16) | (u32::from(address.mid8()) << 8)
                | u32::from(address.low8());
        assert_eq!(rebuilt, address.value());
    }

    #[test]
    fn offset_rejects_leaving_the_address_space() {
        let near_top = Address::new(ADDRESS_MAX - 1).unwrap();
        assert!(near_top.offset(1).is_ok());
        assert!(near_top.offset(2).is_err());
    }

    #[test]
    fn range_rejects_inverted_bounds() {
        let start = Address::new(0x10).unwrap();
        let end = Address::new(0x0F).unwrap();
        assert_eq!(
            AddressRange::new(start, end),
            Err(ConfigError::EmptyRange { start, end })
        );
    }

    #[test]
    fn range_iteration_is_inclusive_both_directions() {
        let range =
            AddressRange::new(Address::new(3).unwrap(), Address::new(6).unwrap()).unwrap();
        assert_eq!(range.word_count(), 4);
        let up: Vec<u32> = range.iter_up().map(Address::value).collect();
        let down: Vec<u32> = range.iter_down().map(Address::value).collect();
        assert_eq!(up, vec![3, 4, 5, 6]);
        assert_eq!(down, vec![6, 5, 4, 3]);
    }

    #[rstest]
    #[case(RangePreset::Quick, 0x400)]
    #[case(RangePreset::Small, 0x2800)]
    #[case(RangePreset::Medium, 0x186A0)]
    #[case(RangePreset::Full, 0x40000)]
    fn presets_start_at_zero_with_expected_sizes(
        #[case] preset: RangePreset,
        #[case] words: u32,
    ) {
        let range = preset.range();
        assert_eq!(range.start(), Address::MIN);
        assert_eq!(range.word_count(), words);
    }

    #[rstest]
    #[case("0x100", 0x100)]
    #[case("0X3FFFF", 0x3FFFF)]
    #[case("100", 0x100)]
    #[case("aa55", 0xAA55)]
    #[case("  0x10  ", 0x10)]
    fn grammar_is_hex_with_optional_prefix(#[case] input: &str, #[case] expected: u32) {
        assert_eq!(parse_hex(input), Ok(expected));
    }

    #[rstest]
    #[case("")]
    #[case("0x")]
    #[case("12G4")]
    #[case("0x-4")]
    #[case("FFFFFFFFF")]
    fn grammar_rejects_non_hex_input(#[case] input: &str) {
        assert!(matches!(
            parse_hex(input),
            Err(ConfigError::MalformedNumber { .. })
        ));
    }

    #[test]
    fn parse_word_is_range_checked() {
        assert_eq!(parse_word("0xAA55"), Ok(0xAA55));
        assert_eq!(
            parse_word("0x10000"),
            Err(ConfigError::WordOutOfRange { raw: 0x10000 })
        );
    }

    #[test]
    fn parse_address_is_range_checked() {
        assert_eq!(parse_address("0x3FFFF").map(Address::value), Ok(0x3FFFF));
        assert!(matches!(
            parse_address("0x40000"),
            Err(ConfigError::AddressOutOfRange { .. })
        ));
    }
}
