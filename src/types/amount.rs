// Amount - Arbitrary-precision non-negative currency amount
//
// All balance, stake, and penalty arithmetic runs on big integers so that
// 18-decimal base units cannot overflow a fixed-width type.
use num_bigint::BigUint;
use num_traits::{ToPrimitive, Zero};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::ops::Add;

use super::primitives::Power;

/// Non-negative arbitrary-precision integer in a currency's base unit
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Default)]
pub struct Amount(BigUint);

impl Amount {
    pub fn zero() -> Self {
        Amount(BigUint::zero())
    }

    pub fn from_u64(v: u64) -> Self {
        Amount(BigUint::from(v))
    }

    pub fn from_biguint(v: BigUint) -> Self {
        Amount(v)
    }

    pub fn is_zero(&self) -> bool {
        self.0.is_zero()
    }

    pub fn as_biguint(&self) -> &BigUint {
        &self.0
    }

    pub fn plus(&self, other: &Amount) -> Amount {
        Amount(&self.0 + &other.0)
    }

    /// Checked subtraction; `None` signals underflow and must be surfaced as
    /// an insufficient-funds error by the caller, never ignored
    pub fn minus(&self, other: &Amount) -> Option<Amount> {
        if other.0 > self.0 {
            return None;
        }
        Some(Amount(&self.0 - &other.0))
    }

    /// `10^exp`
    pub fn pow10(exp: u32) -> Amount {
        Amount(BigUint::from(10u32).pow(exp))
    }

    /// Project onto the signed 64-bit power scale, saturating at `i64::MAX`
    pub fn to_power(&self) -> Power {
        self.0.to_i64().unwrap_or(Power::MAX)
    }

    /// `round_half_up(self * numerator / denominator)`, computed exactly as
    /// `(2 * self * numerator + denominator) / (2 * denominator)`
    pub fn mul_div_round_half_up(&self, numerator: u64, denominator: u64) -> Amount {
        let num = &self.0 * BigUint::from(numerator);
        let den = BigUint::from(denominator);
        Amount((num * 2u32 + &den) / (den * 2u32))
    }

    /// `self * factor`
    pub fn times(&self, factor: u64) -> Amount {
        Amount(&self.0 * BigUint::from(factor))
    }

    /// `floor(self * numerator / denominator)`
    pub fn mul_div(&self, numerator: u64, denominator: u64) -> Amount {
        Amount(&self.0 * BigUint::from(numerator) / BigUint::from(denominator))
    }

    /// `floor(self / 10^exp)`
    pub fn div_pow10(&self, exp: u32) -> Amount {
        Amount(&self.0 / BigUint::from(10u32).pow(exp))
    }

    /// `self * 10^exp`
    pub fn mul_pow10(&self, exp: u32) -> Amount {
        Amount(&self.0 * BigUint::from(10u32).pow(exp))
    }
}

impl Add for Amount {
    type Output = Amount;

    fn add(self, rhs: Amount) -> Amount {
        Amount(self.0 + rhs.0)
    }
}

impl From<u64> for Amount {
    fn from(v: u64) -> Self {
        Amount::from_u64(v)
    }
}

impl fmt::Display for Amount {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

// Serialized as a decimal string so persisted records stay readable and the
// encoding is independent of the big-integer limb layout.
impl Serialize for Amount {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.0.to_str_radix(10))
    }
}

impl<'de> Deserialize<'de> for Amount {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        let v = BigUint::parse_bytes(s.as_bytes(), 10)
            .ok_or_else(|| serde::de::Error::custom("invalid amount string"))?;
        Ok(Amount(v))
    }
}
