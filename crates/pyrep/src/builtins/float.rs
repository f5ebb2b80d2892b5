//! `float`.
//!
//! Arithmetic accepts `int` and `bool` operands on either side, so mixed
//! expressions like `1 + 2.5` resolve through `float.__radd__` after `int`
//! declines.

use std::sync::Arc;

use strum::IntoEnumIterator;

use super::{method, one_arg, two_args};
use crate::{
    dispatch::Comparison,
    exception::{ExcType, RunError, RunResult, SimpleException},
    hash::hash_float,
    slot::Slot,
    value::{AttrMap, Value},
};

/// The `f64` view of a numeric operand, `None` for anything else.
fn as_float(v: &Value) -> RunResult<Option<f64>> {
    Ok(match v {
        Value::Float(f) => Some(*f),
        Value::Int(i) => Some(*i as f64),
        Value::Bool(b) => Some(f64::from(u8::from(*b))),
        Value::Long(li) => Some(
            li.to_f64()
                .filter(|f| f.is_finite())
                .ok_or_else(|| ExcType::overflow_error("int too large to convert to float"))?,
        ),
        _ => None,
    })
}

fn zero_division(msg: &str) -> RunError {
    SimpleException::new_msg(ExcType::ZeroDivisionError, msg).into()
}

fn arith(slot: Slot, a: f64, b: f64) -> RunResult<f64> {
    Ok(match slot {
        Slot::Add => a + b,
        Slot::Sub => a - b,
        Slot::Mul => a * b,
        Slot::TrueDiv => {
            if b == 0.0 {
                return Err(zero_division("float division by zero"));
            }
            a / b
        }
        Slot::FloorDiv => {
            if b == 0.0 {
                return Err(zero_division("float floor division by zero"));
            }
            (a / b).floor()
        }
        Slot::Mod => {
            if b == 0.0 {
                return Err(zero_division("float modulo by zero"));
            }
            // result takes the sign of the divisor
            let r = a % b;
            if r != 0.0 && (r < 0.0) != (b < 0.0) { r + b } else { r }
        }
        Slot::Pow => {
            if a == 0.0 && b < 0.0 {
                return Err(zero_division("0.0 cannot be raised to a negative power"));
            }
            if a < 0.0 && b.fract() != 0.0 {
                return Err(ExcType::value_error("negative number cannot be raised to a fractional power"));
            }
            a.powf(b)
        }
        other => return Err(RunError::internal(format!("float has no arithmetic for {other}"))),
    })
}

/// The forward binary slots `float` implements.
const ARITH: [Slot; 6] = [Slot::Add, Slot::Sub, Slot::Mul, Slot::TrueDiv, Slot::FloorDiv, Slot::Mod];

fn binary_method(slot: Slot, forward: Slot) -> (Arc<str>, Value) {
    let name = slot.method_name();
    let reflected = slot.is_reflected();
    method(name, move |_rt, args| {
        let (v, w) = two_args(name, args)?;
        let (Some(x), Some(y)) = (as_float(v)?, as_float(w)?) else {
            return Ok(Value::NotImplemented);
        };
        let (a, b) = if reflected { (y, x) } else { (x, y) };
        arith(forward, a, b).map(Value::Float)
    })
}

fn comparison_method(op: Comparison) -> (Arc<str>, Value) {
    let name = op.slot().method_name();
    method(name, move |_rt, args| {
        let (v, w) = two_args(name, args)?;
        let (Some(a), Some(b)) = (as_float(v)?, as_float(w)?) else {
            return Ok(Value::NotImplemented);
        };
        // NaN compares unequal to everything and unordered
        Ok(Value::Bool(match a.partial_cmp(&b) {
            Some(ordering) => op.holds(ordering),
            None => op == Comparison::Ne,
        }))
    })
}

fn receiver(name: &str, args: &[Value]) -> RunResult<f64> {
    match one_arg(name, args)? {
        Value::Float(f) => Ok(*f),
        _ => Err(ExcType::descriptor_mismatch(name, "float", "object")),
    }
}

/// `repr(float)`: shortest round-trip digits, always showing it is a float.
pub(crate) fn float_repr(f: f64) -> String {
    if f.is_nan() {
        "nan".to_owned()
    } else if f.is_infinite() {
        if f > 0.0 { "inf" } else { "-inf" }.to_owned()
    } else if f != 0.0 && !(1e-4..1e16).contains(&f.abs()) {
        let s = format!("{f:e}");
        match s.split_once('e') {
            Some((mantissa, exp)) if !exp.starts_with('-') => format!("{mantissa}e+{exp:0>2}"),
            Some((mantissa, exp)) => format!("{mantissa}e-{:0>2}", &exp[1..]),
            None => s,
        }
    } else if f.fract() == 0.0 {
        format!("{f:.1}")
    } else {
        format!("{f}")
    }
}

pub(super) fn dict() -> AttrMap {
    let mut dict = AttrMap::default();
    for forward in ARITH.into_iter().chain([Slot::Pow]) {
        dict.extend([Some(forward), forward.reflected()].into_iter().flatten().map(|slot| binary_method(slot, forward)));
    }
    dict.extend(Comparison::iter().map(comparison_method));
    dict.extend([
        method("__neg__", |_rt, args| Ok(Value::Float(-receiver("__neg__", args)?))),
        method("__pos__", |_rt, args| Ok(Value::Float(receiver("__pos__", args)?))),
        method("__abs__", |_rt, args| Ok(Value::Float(receiver("__abs__", args)?.abs()))),
        method("__bool__", |_rt, args| Ok(Value::Bool(receiver("__bool__", args)? != 0.0))),
        method("__hash__", |_rt, args| Ok(Value::Int(hash_float(receiver("__hash__", args)?)))),
        method("__repr__", |_rt, args| Ok(Value::from(float_repr(receiver("__repr__", args)?)))),
    ]);
    dict
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn repr_matches_python() {
        assert_eq!(float_repr(1.0), "1.0");
        assert_eq!(float_repr(0.1), "0.1");
        assert_eq!(float_repr(-2.5), "-2.5");
        assert_eq!(float_repr(1e16), "1e+16");
        assert_eq!(float_repr(1.5e-7), "1.5e-07");
        assert_eq!(float_repr(f64::INFINITY), "inf");
        assert_eq!(float_repr(f64::NAN), "nan");
    }

    #[test]
    fn modulo_takes_sign_of_divisor() {
        assert_eq!(arith(Slot::Mod, -7.0, 2.0).unwrap(), 1.0);
        assert_eq!(arith(Slot::Mod, 7.0, -2.0).unwrap(), -1.0);
        assert_eq!(arith(Slot::FloorDiv, -7.0, 2.0).unwrap(), -4.0);
    }

    #[test]
    fn division_by_zero() {
        let err = arith(Slot::TrueDiv, 1.0, 0.0).unwrap_err();
        assert_eq!(err.exc_type(), ExcType::ZeroDivisionError);
        assert_eq!(err.to_string(), "float division by zero");
    }
}
