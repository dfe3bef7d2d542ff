use std::cmp::Ordering;
use std::fmt;
use std::str::FromStr;

use thiserror::Error;

#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("'{input}' is not a decimal integer")]
pub struct ParseBigIntError {
    input: String,
}

/// An integer of arbitrary length, as carried on the wire by JavaScript `bigint` values.
///
/// No arithmetic is provided; this type exists so that integers too large for a JSON number
/// survive the trip between peers without losing precision.  It is stored as a canonical decimal
/// string: an optional `-` followed by digits with no leading zeros, and zero is always `0`.
/// Two `BigInt`s are therefore equal exactly when their numeric values are equal.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct BigInt(String);

impl BigInt {
    pub fn is_negative(&self) -> bool {
        self.0.starts_with('-')
    }

    /// The canonical decimal representation
    pub fn as_str(&self) -> &str {
        &self.0
    }

    fn digits(&self) -> &str {
        self.0.strip_prefix('-').unwrap_or(&self.0)
    }
}

/// Numeric order.  With no leading zeros, a longer digit string is always the larger magnitude.
impl Ord for BigInt {
    fn cmp(&self, other: &Self) -> Ordering {
        match (self.is_negative(), other.is_negative()) {
            (true, false) => Ordering::Less,
            (false, true) => Ordering::Greater,
            (negative, _) => {
                let (a, b) = (self.digits(), other.digits());
                let magnitude = a.len().cmp(&b.len()).then_with(|| a.cmp(b));
                if negative { magnitude.reverse() } else { magnitude }
            }
        }
    }
}

impl PartialOrd for BigInt {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl FromStr for BigInt {
    type Err = ParseBigIntError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let err = || ParseBigIntError { input: s.to_string() };

        let (negative, digits) = match s.strip_prefix('-') {
            Some(rest) => (true, rest),
            None => (false, s.strip_prefix('+').unwrap_or(s)),
        };

        if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
            return Err(err());
        }

        let digits = digits.trim_start_matches('0');
        if digits.is_empty() {
            return Ok(BigInt("0".to_string()));
        }

        Ok(BigInt(if negative {
            format!("-{digits}")
        } else {
            digits.to_string()
        }))
    }
}

impl fmt::Display for BigInt {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

macro_rules! bigint_from_int {
    ($($ty:ty),*) => {
        $(
            impl From<$ty> for BigInt {
                fn from(value: $ty) -> Self {
                    BigInt(value.to_string())
                }
            }
        )*
    };
}

bigint_from_int!(i8, i16, i32, i64, i128, isize, u8, u16, u32, u64, u128, usize);

impl TryFrom<&BigInt> for i128 {
    type Error = std::num::ParseIntError;

    fn try_from(value: &BigInt) -> Result<Self, Self::Error> {
        value.0.parse()
    }
}

impl TryFrom<&BigInt> for i64 {
    type Error = std::num::ParseIntError;

    fn try_from(value: &BigInt) -> Result<Self, Self::Error> {
        value.0.parse()
    }
}

impl TryFrom<&BigInt> for u64 {
    type Error = std::num::ParseIntError;

    fn try_from(value: &BigInt) -> Result<Self, Self::Error> {
        value.0.parse()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn canonicalizes_on_parse() {
        assert_eq!("007".parse::<BigInt>().unwrap().as_str(), "7");
        assert_eq!("-0".parse::<BigInt>().unwrap().as_str(), "0");
        assert_eq!("+42".parse::<BigInt>().unwrap().as_str(), "42");
        assert_eq!("-000123".parse::<BigInt>().unwrap().as_str(), "-123");
        assert_eq!("0".parse::<BigInt>().unwrap(), BigInt::from(0u8));
    }

    #[test]
    fn rejects_non_decimal_input() {
        for input in ["", "-", "+", "1.5", "1e10", "0x10", " 1", "12a", "--1"] {
            assert!(input.parse::<BigInt>().is_err(), "{input:?} should be rejected");
        }
    }

    #[test]
    fn integers_beyond_i128() {
        let huge = "123456789012345678901234567890123456789012345678901234567890";
        let value: BigInt = huge.parse().unwrap();
        assert_eq!(value.to_string(), huge);
        assert!(i128::try_from(&value).is_err());

        let value = BigInt::from(i64::MIN);
        assert!(value.is_negative());
        assert_eq!(i64::try_from(&value).unwrap(), i64::MIN);
        assert!(u64::try_from(&value).is_err());
    }

    #[test]
    fn orders_numerically() {
        let big = |s: &str| s.parse::<BigInt>().unwrap();

        assert!(BigInt::from(9i64) < BigInt::from(10i64));
        assert!(BigInt::from(-2i64) < BigInt::from(-1i64));
        assert!(BigInt::from(-10i64) < BigInt::from(-9i64));
        assert!(BigInt::from(-1i64) < BigInt::from(0i64));
        assert!(big("99999999999999999999999999") < big("100000000000000000000000000"));
        assert_eq!(big("-007").cmp(&BigInt::from(-7i64)), Ordering::Equal);

        let sorted: Vec<String> = [10i64, -2, 9, 0, -10, 100, -1]
            .into_iter()
            .map(BigInt::from)
            .collect::<std::collections::BTreeSet<_>>()
            .into_iter()
            .map(|n| n.to_string())
            .collect();
        assert_eq!(sorted, ["-10", "-2", "-1", "0", "9", "10", "100"]);
    }
}
