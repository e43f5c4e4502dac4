use std::fmt::Debug;

/// Value types a table can hold. A value is stored as its 64-bit pattern in
/// the slot payload; implementations define the two directions of that
/// mapping and must round-trip every representable value exactly.
pub trait TableValue: Copy + PartialEq + Debug {
    fn to_bits(self) -> u64;
    fn from_bits(bits: u64) -> Self;
}

impl TableValue for u64 {
    fn to_bits(self) -> u64 {
        self
    }

    fn from_bits(bits: u64) -> Self {
        bits
    }
}

/// Stored as the raw IEEE-754 pattern, so every value survives bit-exact,
/// NaN payloads included. Comparisons keep IEEE semantics (NaN != NaN).
impl TableValue for f64 {
    fn to_bits(self) -> u64 {
        f64::to_bits(self)
    }

    fn from_bits(bits: u64) -> Self {
        f64::from_bits(bits)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_u64_bits_are_identity() {
        assert_eq!(0u64.to_bits(), 0);
        assert_eq!(u64::MAX.to_bits(), u64::MAX);
        assert_eq!(u64::from_bits(42), 42);
    }

    #[test]
    fn test_f64_round_trips_exactly() {
        for value in [0.0, -0.0, 1.5, -2.25, f64::MIN, f64::MAX, f64::INFINITY] {
            assert_eq!(f64::from_bits(value.to_bits()), value);
        }
    }

    #[test]
    fn test_f64_nan_payload_survives() {
        let nan = f64::from_bits(0x7FF8_0000_0000_1234);
        let back = f64::from_bits(TableValue::to_bits(nan));
        assert!(back.is_nan());
        assert_eq!(back.to_bits(), 0x7FF8_0000_0000_1234);
    }
}
