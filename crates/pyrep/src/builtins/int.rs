//! `int` and `bool`.
//!
//! `int` has two host representations: `Value::Int` (canonical, `i64`) and
//! `Value::Long` (adopted, `LongInt`). Arithmetic methods carry one body per
//! representation. The `i64` body works on machine integers and only builds a
//! `BigInt` when a result overflows; the `LongInt` body always works on
//! `BigInt` and demotes results that fit. `bool` adds nothing but its repr and
//! the bitwise operators, and otherwise runs the `i64` bodies through host
//! class assignability.

use std::{cmp::Ordering, sync::Arc};

use num_bigint::BigInt;
use num_integer::Integer;
use num_traits::{Signed, ToPrimitive, Zero};
use strum::IntoEnumIterator;

use super::{method, one_arg, per_representation, two_args};
use crate::{
    config::RuntimeConfig,
    dispatch::{Comparison, grid::GridBuilder},
    exception::{ExcType, RunError, RunResult, SimpleException},
    hash::hash_int,
    host::{BuiltinHost, HostTable},
    runtime::Runtime,
    slot::{NativeFn, Slot, native_fn},
    types::LongInt,
    value::{AttrMap, Value},
};

/// A binary integer operation, independent of representation.
#[derive(Debug, Clone, Copy)]
enum IntOp {
    Add,
    Sub,
    Mul,
    TrueDiv,
    FloorDiv,
    Mod,
    Pow,
    LShift,
    RShift,
    And,
    Xor,
    Or,
}

impl IntOp {
    const ALL: [(Self, Slot); 12] = [
        (Self::Add, Slot::Add),
        (Self::Sub, Slot::Sub),
        (Self::Mul, Slot::Mul),
        (Self::TrueDiv, Slot::TrueDiv),
        (Self::FloorDiv, Slot::FloorDiv),
        (Self::Mod, Slot::Mod),
        (Self::Pow, Slot::Pow),
        (Self::LShift, Slot::LShift),
        (Self::RShift, Slot::RShift),
        (Self::And, Slot::And),
        (Self::Xor, Slot::Xor),
        (Self::Or, Slot::Or),
    ];

    /// The machine-integer form; `None` when the result needs a `BigInt`.
    fn small(self, a: i64, b: i64) -> RunResult<Option<Value>> {
        let result = match self {
            Self::Add => a.checked_add(b),
            Self::Sub => a.checked_sub(b),
            Self::Mul => a.checked_mul(b),
            Self::TrueDiv => {
                if b == 0 {
                    return Err(ExcType::zero_division("/"));
                }
                // operands beyond 2**53 are not exact as floats; the BigInt path rounds once
                if a.unsigned_abs() > EXACT_FLOAT_INT || b.unsigned_abs() > EXACT_FLOAT_INT {
                    return Ok(None);
                }
                return Ok(Some(Value::Float(a as f64 / b as f64)));
            }
            Self::FloorDiv => {
                if b == 0 {
                    return Err(ExcType::zero_division("//"));
                }
                // i64::MIN // -1 overflows
                (a != i64::MIN || b != -1).then(|| Integer::div_floor(&a, &b))
            }
            Self::Mod => {
                if b == 0 {
                    return Err(ExcType::zero_division("%"));
                }
                Some(if b == -1 { 0 } else { Integer::mod_floor(&a, &b) })
            }
            Self::Pow => {
                if b < 0 {
                    return Ok(None);
                }
                u32::try_from(b).ok().and_then(|exp| a.checked_pow(exp))
            }
            Self::LShift => {
                check_shift(b)?;
                if a == 0 {
                    Some(0)
                } else if b < 63 {
                    let shifted = a << b;
                    (shifted >> b == a).then_some(shifted)
                } else {
                    None
                }
            }
            Self::RShift => {
                check_shift(b)?;
                Some(a >> b.min(63))
            }
            Self::And => Some(a & b),
            Self::Xor => Some(a ^ b),
            Self::Or => Some(a | b),
        };
        Ok(result.map(Value::Int))
    }

    /// The arbitrary-precision form.
    ///
    /// Multiplication, powers and left shifts estimate their result size first
    /// and fail against `config.max_result_bytes` before allocating.
    fn big(self, config: &RuntimeConfig, a: &BigInt, b: &BigInt) -> RunResult<Value> {
        let result = match self {
            Self::Add => a + b,
            Self::Sub => a - b,
            Self::Mul => {
                config.check_result_size(bytes_for_bits(a.bits().checked_add(b.bits())), TOO_LARGE)?;
                a * b
            }
            Self::TrueDiv => {
                if b.is_zero() {
                    return Err(ExcType::zero_division("/"));
                }
                return true_div(a, b).map(Value::Float);
            }
            Self::FloorDiv => {
                if b.is_zero() {
                    return Err(ExcType::zero_division("//"));
                }
                Integer::div_floor(a, b)
            }
            Self::Mod => {
                if b.is_zero() {
                    return Err(ExcType::zero_division("%"));
                }
                Integer::mod_floor(a, b)
            }
            Self::Pow => {
                if b.is_negative() {
                    if a.is_zero() {
                        return Err(negative_power_of_zero());
                    }
                    return Ok(Value::Float(to_f64(a)?.powf(to_f64(b)?)));
                }
                // 0, 1 and -1 stay small for any exponent
                if a.bits() <= 1 {
                    return Ok(Value::Int(match a.to_i64() {
                        Some(0) if b.is_zero() => 1,
                        Some(-1) if b.is_odd() => -1,
                        Some(0) => 0,
                        _ => 1,
                    }));
                }
                let exp = b.to_u64();
                config.check_result_size(
                    bytes_for_bits(exp.and_then(|exp| a.bits().checked_mul(exp))),
                    TOO_LARGE,
                )?;
                let Some(exp) = exp.and_then(|exp| u32::try_from(exp).ok()) else {
                    return Err(ExcType::overflow_error(TOO_LARGE));
                };
                a.pow(exp)
            }
            Self::LShift => {
                if b.is_negative() {
                    return Err(ExcType::value_error("negative shift count"));
                }
                if a.is_zero() {
                    return Ok(Value::Int(0));
                }
                let shift = b.to_u64();
                config.check_result_size(
                    bytes_for_bits(shift.and_then(|shift| a.bits().checked_add(shift))),
                    TOO_LARGE,
                )?;
                let Some(shift) = shift.and_then(|shift| usize::try_from(shift).ok()) else {
                    return Err(ExcType::overflow_error(TOO_LARGE));
                };
                a << shift
            }
            Self::RShift => {
                if b.is_negative() {
                    return Err(ExcType::value_error("negative shift count"));
                }
                match b.to_usize() {
                    Some(shift) => a >> shift,
                    None if a.is_negative() => BigInt::from(-1),
                    None => BigInt::zero(),
                }
            }
            Self::And => a & b,
            Self::Xor => a ^ b,
            Self::Or => a | b,
        };
        Ok(LongInt::new(result).into_value())
    }
}

/// Largest magnitude every `i64` below which converts to `f64` exactly.
const EXACT_FLOAT_INT: u64 = 1 << 53;

const TOO_LARGE: &str = "integer result too large";

/// Bytes needed for a result of `bits` bits; `None` if the bit count overflowed.
fn bytes_for_bits(bits: Option<u64>) -> Option<usize> {
    bits.and_then(|bits| usize::try_from(bits.div_ceil(8)).ok())
}

fn bit_len(value: &BigInt) -> i64 {
    i64::try_from(value.bits()).unwrap_or(i64::MAX)
}

/// `a * 2**exp`, scaling in steps so intermediate powers of two stay finite.
fn ldexp(mut x: f64, mut exp: i64) -> f64 {
    const STEP: i32 = 1000;
    while exp > i64::from(STEP) && x.is_finite() {
        x *= 2f64.powi(STEP);
        exp -= i64::from(STEP);
    }
    while exp < -i64::from(STEP) && x != 0.0 {
        x *= 2f64.powi(-STEP);
        exp += i64::from(STEP);
    }
    x * 2f64.powi(i32::try_from(exp).unwrap_or(0))
}

/// Correctly rounded `a / b` for a non-zero `b`.
///
/// Operands that are exact as floats divide directly. Otherwise the quotient
/// is scaled to 55 significant bits, the remainder folded into the lowest bit,
/// and the result rounded once when converted.
fn true_div(a: &BigInt, b: &BigInt) -> RunResult<f64> {
    if let (Some(x), Some(y)) = (a.to_i64(), b.to_i64())
        && x.unsigned_abs() <= EXACT_FLOAT_INT
        && y.unsigned_abs() <= EXACT_FLOAT_INT
    {
        return Ok(x as f64 / y as f64);
    }
    let negative = a.is_negative() != b.is_negative();
    let (n, d) = (a.abs(), b.abs());
    let shift = 55 - (bit_len(&n) - bit_len(&d));
    let (n, d) = if shift >= 0 {
        (n << shift.unsigned_abs(), d)
    } else {
        (n, d << shift.unsigned_abs())
    };
    let (q, r) = n.div_rem(&d);
    let Some(mut q) = q.to_u64() else {
        return Err(RunError::internal("scaled quotient does not fit in 64 bits"));
    };
    if !r.is_zero() {
        q |= 1;
    }
    let magnitude = ldexp(q as f64, -shift);
    if magnitude.is_infinite() {
        return Err(ExcType::overflow_error("integer division result too large for a float"));
    }
    Ok(if negative { -magnitude } else { magnitude })
}

fn check_shift(count: i64) -> RunResult<()> {
    if count < 0 {
        Err(ExcType::value_error("negative shift count"))
    } else {
        Ok(())
    }
}

fn negative_power_of_zero() -> RunError {
    SimpleException::new_msg(
        ExcType::ZeroDivisionError,
        "0.0 cannot be raised to a negative power",
    )
    .into()
}

fn to_f64(value: &BigInt) -> RunResult<f64> {
    value
        .to_f64()
        .filter(|f| f.is_finite())
        .ok_or_else(|| ExcType::overflow_error("int too large to convert to float"))
}

/// The `i64` view of an `int` or `bool` value.
fn small(v: &Value) -> Option<i64> {
    match v {
        Value::Int(i) => Some(*i),
        Value::Bool(b) => Some(i64::from(*b)),
        _ => None,
    }
}

/// The `BigInt` view of any integer value.
fn big(v: &Value) -> Option<BigInt> {
    match v {
        Value::Long(li) => Some(li.0.clone()),
        other => small(other).map(BigInt::from),
    }
}

/// Body for receivers held as `i64`.
fn small_binary(config: &RuntimeConfig, op: IntOp, a: &Value, b: &Value) -> RunResult<Value> {
    if let (Some(x), Some(y)) = (small(a), small(b))
        && let Some(result) = op.small(x, y)?
    {
        return Ok(result);
    }
    big_binary(config, op, a, b)
}

/// Body for receivers held as `LongInt`, and the overflow path of [`small_binary`].
fn big_binary(config: &RuntimeConfig, op: IntOp, a: &Value, b: &Value) -> RunResult<Value> {
    match (big(a), big(b)) {
        (Some(x), Some(y)) => op.big(config, &x, &y),
        _ => Ok(Value::NotImplemented),
    }
}

/// One forward or reflected arithmetic method with a body per representation.
fn binary_method(hosts: &HostTable, slot: Slot, op: IntOp) -> (Arc<str>, Value) {
    let name = slot.method_name();
    let reflected = slot.is_reflected();
    let operands = move |args: &[Value]| -> RunResult<(Value, Value)> {
        let (v, w) = two_args(name, args)?;
        Ok(if reflected { (w.clone(), v.clone()) } else { (v.clone(), w.clone()) })
    };
    let small_body: NativeFn = native_fn(move |rt, args| {
        let (a, b) = operands(args)?;
        small_binary(rt.config(), op, &a, &b)
    });
    let big_body: NativeFn = native_fn(move |rt, args| {
        let (a, b) = operands(args)?;
        big_binary(rt.config(), op, &a, &b)
    });
    per_representation(
        name,
        [
            (hosts.get(BuiltinHost::Int).clone(), small_body),
            (hosts.get(BuiltinHost::Long).clone(), big_body),
        ],
    )
}

fn unary_method(
    hosts: &HostTable,
    name: &'static str,
    small_fn: fn(i64) -> Value,
    big_fn: fn(&BigInt) -> Value,
) -> (Arc<str>, Value) {
    let small_body: NativeFn = native_fn(move |_rt, args| {
        let v = one_arg(name, args)?;
        small(v).map(small_fn).ok_or_else(|| ExcType::descriptor_mismatch(name, "int", "object"))
    });
    let big_body: NativeFn = native_fn(move |_rt, args| {
        let v = one_arg(name, args)?;
        big(v)
            .map(|b| big_fn(&b))
            .ok_or_else(|| ExcType::descriptor_mismatch(name, "int", "object"))
    });
    per_representation(
        name,
        [
            (hosts.get(BuiltinHost::Int).clone(), small_body),
            (hosts.get(BuiltinHost::Long).clone(), big_body),
        ],
    )
}

fn compare_ints(v: &Value, w: &Value) -> Option<Ordering> {
    match (small(v), small(w)) {
        (Some(a), Some(b)) => Some(a.cmp(&b)),
        _ => Some(big(v)?.cmp(&big(w)?)),
    }
}

fn comparison_method(op: Comparison) -> (Arc<str>, Value) {
    let name = op.slot().method_name();
    method(name, move |_rt, args| {
        let (v, w) = two_args(name, args)?;
        Ok(compare_ints(v, w).map_or(Value::NotImplemented, |ordering| Value::Bool(op.holds(ordering))))
    })
}

fn long(value: BigInt) -> Value {
    LongInt::new(value).into_value()
}

pub(super) fn dict(hosts: &HostTable) -> AttrMap {
    let mut dict = AttrMap::default();
    for (op, slot) in IntOp::ALL {
        for slot in [Some(slot), slot.reflected()].into_iter().flatten() {
            let (name, value) = binary_method(hosts, slot, op);
            dict.insert(name, value);
        }
    }
    let unary = [
        unary_method(
            hosts,
            "__neg__",
            |a| a.checked_neg().map_or_else(|| long(-BigInt::from(a)), Value::Int),
            |b| long(-b),
        ),
        unary_method(hosts, "__pos__", Value::Int, |b| long(b.clone())),
        unary_method(
            hosts,
            "__abs__",
            |a| a.checked_abs().map_or_else(|| long(BigInt::from(a).abs()), Value::Int),
            |b| long(b.abs()),
        ),
        unary_method(hosts, "__invert__", |a| Value::Int(!a), |b| long(-b - 1)),
        unary_method(hosts, "__bool__", |a| Value::Bool(a != 0), |b| Value::Bool(!b.is_zero())),
        unary_method(hosts, "__hash__", |a| Value::Int(hash_int(a)), |b| {
            Value::Int(LongInt::new(b.clone()).hash())
        }),
        unary_method(hosts, "__repr__", |a| Value::from(a.to_string()), |b| Value::from(b.to_string())),
    ];
    dict.extend(unary);
    dict.extend(Comparison::iter().map(comparison_method));
    dict
}

/// `bool` keeps its own repr and bitwise operators; everything else is inherited from `int`.
pub(super) fn bool_dict() -> AttrMap {
    let bitwise = |slot: Slot, f: fn(bool, bool) -> bool| {
        let name = slot.method_name();
        method(name, move |_rt, args| {
            let (v, w) = two_args(name, args)?;
            Ok(match (v, w) {
                (Value::Bool(a), Value::Bool(b)) => Value::Bool(f(*a, *b)),
                _ => Value::NotImplemented,
            })
        })
    };
    [
        method("__repr__", |_rt, args| match one_arg("__repr__", args)? {
            Value::Bool(true) => Ok(Value::from("True")),
            Value::Bool(false) => Ok(Value::from("False")),
            _ => Err(ExcType::descriptor_mismatch("__repr__", "bool", "object")),
        }),
        bitwise(Slot::And, |a, b| a & b),
        bitwise(Slot::RAnd, |a, b| a & b),
        bitwise(Slot::Or, |a, b| a | b),
        bitwise(Slot::ROr, |a, b| a | b),
        bitwise(Slot::Xor, |a, b| a ^ b),
        bitwise(Slot::RXor, |a, b| a ^ b),
    ]
    .into_iter()
    .collect()
}

// ============================================================================
// Binary grid over (i64, LongInt)
// ============================================================================

fn grid_add(rt: &Runtime, v: &Value, w: &Value) -> RunResult<Value> {
    small_binary(rt.config(), IntOp::Add, v, w)
}

fn grid_sub(rt: &Runtime, v: &Value, w: &Value) -> RunResult<Value> {
    small_binary(rt.config(), IntOp::Sub, v, w)
}

fn grid_mul(rt: &Runtime, v: &Value, w: &Value) -> RunResult<Value> {
    small_binary(rt.config(), IntOp::Mul, v, w)
}

fn grid_floordiv(rt: &Runtime, v: &Value, w: &Value) -> RunResult<Value> {
    small_binary(rt.config(), IntOp::FloorDiv, v, w)
}

fn grid_mod(rt: &Runtime, v: &Value, w: &Value) -> RunResult<Value> {
    small_binary(rt.config(), IntOp::Mod, v, w)
}

/// The grid installed on `int`: every combination of its two representations.
pub(super) fn grid(hosts: &HostTable) -> GridBuilder {
    GridBuilder::new(vec![
        hosts.get(BuiltinHost::Int).clone(),
        hosts.get(BuiltinHost::Long).clone(),
    ])
    .fill(Slot::Add, grid_add)
    .fill(Slot::Sub, grid_sub)
    .fill(Slot::Mul, grid_mul)
    .fill(Slot::FloorDiv, grid_floordiv)
    .fill(Slot::Mod, grid_mod)
}
