//! Field element type.
//!
//! A [`Felt`] is an unsigned integer interpreted modulo the field prime of the
//! program under test. The type itself does not reduce: generators are
//! responsible for staying inside `[0, P)`.

use std::fmt;
use std::str::FromStr;

use num_bigint::BigUint;
use num_traits::{Num, One, Zero};
use serde::de::{self, Visitor};
use serde::{Deserialize, Deserializer, Serialize, Serializer};

/// Field element (or any scalar carried in calldata, return data and events).
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Felt(BigUint);

impl Felt {
    pub fn new(value: BigUint) -> Self {
        Self(value)
    }

    pub fn zero() -> Self {
        Self(BigUint::zero())
    }

    pub fn is_zero(&self) -> bool {
        self.0.is_zero()
    }

    pub fn as_biguint(&self) -> &BigUint {
        &self.0
    }

    pub fn into_biguint(self) -> BigUint {
        self.0
    }

    /// Lowercase `0x`-prefixed hex form, used on the wire.
    pub fn to_hex_string(&self) -> String {
        format!("0x{}", self.0.to_str_radix(16))
    }

    /// Parse either a `0x` hex literal or a decimal literal.
    pub fn parse(s: &str) -> Result<Self, FeltParseError> {
        let s = s.trim();
        let parsed = match s.strip_prefix("0x").or_else(|| s.strip_prefix("0X")) {
            Some(hex_digits) if !hex_digits.is_empty() => BigUint::from_str_radix(hex_digits, 16),
            Some(_) => return Err(FeltParseError(s.to_string())),
            None => BigUint::from_str_radix(s, 10),
        };
        parsed.map(Self).map_err(|_| FeltParseError(s.to_string()))
    }
}

/// The Cairo field prime `2^251 + 17 * 2^192 + 1`.
pub fn field_prime() -> BigUint {
    (BigUint::one() << 251u32) + (BigUint::from(17u32) << 192u32) + BigUint::one()
}

impl From<u64> for Felt {
    fn from(value: u64) -> Self {
        Self(BigUint::from(value))
    }
}

impl From<u128> for Felt {
    fn from(value: u128) -> Self {
        Self(BigUint::from(value))
    }
}

impl From<BigUint> for Felt {
    fn from(value: BigUint) -> Self {
        Self(value)
    }
}

impl FromStr for Felt {
    type Err = FeltParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl fmt::Display for Felt {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Error returned when a string is not a valid felt literal.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FeltParseError(pub String);

impl fmt::Display for FeltParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "invalid felt literal '{}'", self.0)
    }
}

impl std::error::Error for FeltParseError {}

impl Serialize for Felt {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_hex_string())
    }
}

struct FeltVisitor;

impl<'de> Visitor<'de> for FeltVisitor {
    type Value = Felt;

    fn expecting(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str("a hex or decimal felt string, or an unsigned integer")
    }

    fn visit_u64<E: de::Error>(self, v: u64) -> Result<Felt, E> {
        Ok(Felt::from(v))
    }

    fn visit_i64<E: de::Error>(self, v: i64) -> Result<Felt, E> {
        u64::try_from(v)
            .map(Felt::from)
            .map_err(|_| E::custom(format!("negative felt {v}")))
    }

    fn visit_str<E: de::Error>(self, v: &str) -> Result<Felt, E> {
        Felt::parse(v).map_err(E::custom)
    }
}

impl<'de> Deserialize<'de> for Felt {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        deserializer.deserialize_any(FeltVisitor)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_hex_and_decimal() {
        assert_eq!(Felt::parse("0x10").unwrap(), Felt::from(16u64));
        assert_eq!(Felt::parse("16").unwrap(), Felt::from(16u64));
        assert!(Felt::parse("0x").is_err());
        assert!(Felt::parse("twelve").is_err());
    }

    #[test]
    fn test_field_prime_value() {
        let expected = BigUint::from_str_radix(
            "800000000000011000000000000000000000000000000000000000000000001",
            16,
        )
        .unwrap();
        assert_eq!(field_prime(), expected);
    }

    #[test]
    fn test_serde_accepts_numbers_and_strings() {
        let felts: Vec<Felt> = serde_json::from_str(r#"[1, "0x2", "3"]"#).unwrap();
        assert_eq!(felts, vec![Felt::from(1u64), Felt::from(2u64), Felt::from(3u64)]);
        assert_eq!(serde_json::to_string(&Felt::from(255u64)).unwrap(), "\"0xff\"");
    }
}
