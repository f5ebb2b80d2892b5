//! LongInt wrapper for arbitrary precision integer support.
//!
//! Python has one `int` type with two host representations here: `Value::Int`
//! holds values that fit in an `i64`, and `Value::Long` holds a `LongInt`.
//! Arithmetic promotes to `LongInt` on overflow and [`LongInt::into_value`]
//! demotes back whenever the result fits.

use std::{
    fmt::{self, Display},
    ops::{Add, Mul, Neg, Sub},
    sync::Arc,
};

use num_bigint::BigInt;
use num_traits::{Signed, ToPrimitive, Zero};

use crate::{hash::hash_bigint, value::Value};

/// Wrapper around `num_bigint::BigInt` for arbitrary precision integers.
///
/// The inner `BigInt` is accessible via `.0` for arithmetic that needs the
/// underlying type directly.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, serde::Serialize, serde::Deserialize)]
pub struct LongInt(pub BigInt);

impl LongInt {
    #[must_use]
    pub fn new(bi: BigInt) -> Self {
        Self(bi)
    }

    /// Converts to a `Value`, demoting to `Value::Int` if it fits.
    #[must_use]
    pub fn into_value(self) -> Value {
        match self.0.to_i64() {
            Some(i) => Value::Int(i),
            None => Value::Long(Arc::new(self)),
        }
    }

    /// Hash consistent with `int` values that fit in an `i64`.
    #[must_use]
    pub fn hash(&self) -> i64 {
        hash_bigint(&self.0)
    }

    #[must_use]
    pub fn inner(&self) -> &BigInt {
        &self.0
    }

    #[must_use]
    pub fn is_zero(&self) -> bool {
        self.0.is_zero()
    }

    #[must_use]
    pub fn is_negative(&self) -> bool {
        self.0.is_negative()
    }

    #[must_use]
    pub fn to_i64(&self) -> Option<i64> {
        self.0.to_i64()
    }

    #[must_use]
    pub fn to_f64(&self) -> Option<f64> {
        self.0.to_f64()
    }

    #[must_use]
    pub fn abs(&self) -> Self {
        Self(self.0.abs())
    }
}

impl From<BigInt> for LongInt {
    fn from(bi: BigInt) -> Self {
        Self(bi)
    }
}

impl From<i64> for LongInt {
    fn from(i: i64) -> Self {
        Self(BigInt::from(i))
    }
}

impl Add for LongInt {
    type Output = Self;

    fn add(self, rhs: Self) -> Self::Output {
        Self(self.0 + rhs.0)
    }
}

impl Sub for LongInt {
    type Output = Self;

    fn sub(self, rhs: Self) -> Self::Output {
        Self(self.0 - rhs.0)
    }
}

impl Mul for LongInt {
    type Output = Self;

    fn mul(self, rhs: Self) -> Self::Output {
        Self(self.0 * rhs.0)
    }
}

impl Neg for LongInt {
    type Output = Self;

    fn neg(self) -> Self::Output {
        Self(-self.0)
    }
}

impl Display for LongInt {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}
