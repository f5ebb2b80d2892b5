//! `str`.

use std::{fmt::Write as _, sync::Arc};

use strum::IntoEnumIterator;

use super::{method, one_arg, two_args};
use crate::{
    config::RuntimeConfig,
    dispatch::Comparison,
    exception::{ExcType, RunResult},
    hash::hash_str,
    value::{AttrMap, Value},
};

fn receiver<'a>(name: &str, args: &'a [Value]) -> RunResult<&'a Arc<str>> {
    match one_arg(name, args)? {
        Value::Str(s) => Ok(s),
        _ => Err(ExcType::descriptor_mismatch(name, "str", "object")),
    }
}

/// `repr(str)`: single quotes unless the text contains one and no double quote.
pub(crate) fn str_repr(s: &str) -> String {
    let quote = if s.contains('\'') && !s.contains('"') { '"' } else { '\'' };
    let mut out = String::with_capacity(s.len() + 2);
    out.push(quote);
    for c in s.chars() {
        match c {
            '\\' => out.push_str("\\\\"),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            '\t' => out.push_str("\\t"),
            c if c == quote => {
                out.push('\\');
                out.push(c);
            }
            c if c.is_control() => {
                let _ = write!(out, "\\x{:02x}", u32::from(c));
            }
            c => out.push(c),
        }
    }
    out.push(quote);
    out
}

fn repeat(config: &RuntimeConfig, s: &str, count: &Value) -> RunResult<Value> {
    let n = match count {
        Value::Int(n) => *n,
        Value::Bool(b) => i64::from(*b),
        Value::Long(li) if li.is_negative() => 0,
        Value::Long(_) if s.is_empty() => 0,
        Value::Long(_) => return Err(ExcType::overflow_error("repeated string is too long")),
        _ => return Ok(Value::NotImplemented),
    };
    let Ok(n) = usize::try_from(n) else {
        return Ok(Value::from(""));
    };
    config.check_result_size(s.len().checked_mul(n), "repeated string is too long")?;
    Ok(Value::from(s.repeat(n)))
}

fn comparison_method(op: Comparison) -> (Arc<str>, Value) {
    let name = op.slot().method_name();
    method(name, move |_rt, args| {
        let (v, w) = two_args(name, args)?;
        Ok(match (v, w) {
            (Value::Str(a), Value::Str(b)) => Value::Bool(op.holds(a.cmp(b))),
            _ => Value::NotImplemented,
        })
    })
}

pub(super) fn dict() -> AttrMap {
    let mut dict: AttrMap = [
        method("__add__", |_rt, args| {
            let (v, w) = two_args("__add__", args)?;
            Ok(match (v, w) {
                (Value::Str(a), Value::Str(b)) => Value::from(format!("{a}{b}")),
                _ => Value::NotImplemented,
            })
        }),
        method("__mul__", |rt, args| match two_args("__mul__", args)? {
            (Value::Str(s), count) => repeat(rt.config(), s, count),
            _ => Ok(Value::NotImplemented),
        }),
        method("__rmul__", |rt, args| match two_args("__rmul__", args)? {
            (Value::Str(s), count) => repeat(rt.config(), s, count),
            _ => Ok(Value::NotImplemented),
        }),
        method("__len__", |_rt, args| {
            let s = receiver("__len__", args)?;
            i64::try_from(s.chars().count())
                .map(Value::Int)
                .map_err(|_| ExcType::overflow_error("string too long"))
        }),
        method("__hash__", |_rt, args| Ok(Value::Int(hash_str(receiver("__hash__", args)?)))),
        method("__repr__", |_rt, args| Ok(Value::from(str_repr(receiver("__repr__", args)?)))),
        method("__str__", |_rt, args| Ok(Value::Str(Arc::clone(receiver("__str__", args)?)))),
    ]
    .into_iter()
    .collect();
    dict.extend(Comparison::iter().map(comparison_method));
    dict
}
