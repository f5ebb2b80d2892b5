//! Deterministic hash helpers for the built-in value types.
//!
//! Numeric hashes reduce modulo the Mersenne prime `2^61 - 1` so that values
//! which compare equal across `int`, `bool` and `float` hash equally. `-1` is
//! never produced; it is remapped to `-2`.

use num_bigint::BigInt;
use num_traits::ToPrimitive;

/// Mersenne prime `2^61 - 1`.
const MODULUS: i64 = (1 << 61) - 1;

fn fix_sentinel(result: i64) -> i64 {
    if result == -1 { -2 } else { result }
}

/// Hashes a machine integer.
#[must_use]
pub fn hash_int(value: i64) -> i64 {
    // i64::MIN has no positive counterpart, so reduce in i128
    let reduced = i128::from(value) % i128::from(MODULUS);
    fix_sentinel(i64::try_from(reduced).unwrap_or(0))
}

/// Hashes an arbitrary precision integer consistently with [`hash_int`].
#[must_use]
pub fn hash_bigint(value: &BigInt) -> i64 {
    if let Some(small) = value.to_i64() {
        return hash_int(small);
    }
    let reduced = value % BigInt::from(MODULUS);
    fix_sentinel(reduced.to_i64().unwrap_or(0))
}

/// Hashes a float so that it agrees with every equal `int`.
///
/// A finite float is `mantissa * 2**exponent` with an integer mantissa; the
/// hash is that product reduced modulo [`MODULUS`]. Since `2**61 = 1` modulo
/// the prime, the exponent only matters modulo 61, which also covers negative
/// exponents.
#[must_use]
pub fn hash_float(value: f64) -> i64 {
    if value.is_nan() {
        return 0;
    }
    if value.is_infinite() {
        return if value > 0.0 { 314_159 } else { -314_159 };
    }
    let bits = value.to_bits();
    let biased = i64::try_from((bits >> 52) & 0x7ff).unwrap_or(0);
    let fraction = bits & ((1 << 52) - 1);
    // subnormals have no implicit leading bit
    let (mantissa, exponent) = if biased == 0 {
        (fraction, -1074)
    } else {
        (fraction | (1 << 52), biased - 1075)
    };
    let shift = exponent.rem_euclid(61);
    let reduced = (u128::from(mantissa) << shift) % u128::from(MODULUS.unsigned_abs());
    let magnitude = i64::try_from(reduced).unwrap_or(0);
    fix_sentinel(if value.is_sign_negative() { -magnitude } else { magnitude })
}

/// Hashes a string.
#[must_use]
pub fn hash_str(value: &str) -> i64 {
    if value.is_empty() {
        return 0;
    }
    fix_sentinel(hash_bytes(value.as_bytes()))
}

fn hash_bytes(bytes: &[u8]) -> i64 {
    // fixed seeds keep hashes stable across runs
    let state = ahash::RandomState::with_seeds(0x243f_6a88, 0x85a3_08d3, 0x1319_8a2e, 0x0370_7344);
    i64::from_ne_bytes(state.hash_one(bytes).to_ne_bytes())
}

/// Identity hash for values compared by `is`.
#[must_use]
pub fn hash_pointer<T: ?Sized>(ptr: *const T) -> i64 {
    let addr = ptr.cast::<()>() as usize;
    // drop the alignment bits, as CPython does for object ids
    fix_sentinel(i64::try_from(addr >> 4).unwrap_or(i64::MAX))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn equal_numbers_hash_equally() {
        assert_eq!(hash_int(1), hash_float(1.0));
        assert_eq!(hash_int(-7), hash_float(-7.0));
        assert_eq!(hash_bigint(&BigInt::from(42)), hash_int(42));
    }

    #[test]
    fn floats_beyond_i64_hash_like_ints() {
        let big = BigInt::from(1) << 70;
        assert_eq!(hash_float(2f64.powi(70)), hash_bigint(&big));
        assert_eq!(hash_float(2f64.powi(70)), 512);
        assert_eq!(hash_float(-(2f64.powi(70))), hash_bigint(&-big));
        let exact = BigInt::from(12_345_678_901_u64) << 80;
        assert_eq!(hash_float(12_345_678_901.0 * 2f64.powi(80)), hash_bigint(&exact));
    }

    #[test]
    fn fractional_floats() {
        // 0.5 is 2**-1, and 2**-1 = 2**60 modulo 2**61 - 1
        assert_eq!(hash_float(0.5), 1 << 60);
        assert_eq!(hash_float(-1.0), -2);
        assert_eq!(hash_float(0.0), 0);
        assert_eq!(hash_float(-0.0), 0);
    }

    #[test]
    fn minus_one_is_remapped() {
        assert_eq!(hash_int(-1), -2);
        assert_eq!(hash_int(0), 0);
        assert_eq!(hash_int(MODULUS), 0);
    }

    #[test]
    fn strings_hash_deterministically() {
        assert_eq!(hash_str("abc"), hash_str("abc"));
        assert_ne!(hash_str("abc"), hash_str("abd"));
        assert_eq!(hash_str(""), 0);
    }
}
