//! Type conversion service consumed by the evaluator.
//!
//! The evaluator calls out to a [`TypeConverter`] whenever a value has to
//! cross a type boundary: comparing operands of different types, binding
//! method arguments, storing into typed properties and honouring the
//! expected type passed to `Expression::value_as`.

use std::fmt::Debug;
use std::str::FromStr;

use bigdecimal::num_bigint::BigInt;
use bigdecimal::{BigDecimal, FromPrimitive, ToPrimitive};

use crate::error::ConversionError;
use crate::types::{TypeDescriptor, Value};

pub trait TypeConverter: Send + Sync + Debug {
    /// Whether values of `from` can in general be converted to `to`.
    /// A `true` answer does not guarantee every value converts.
    fn can_convert(&self, from: &TypeDescriptor, to: &TypeDescriptor) -> bool;

    fn convert(&self, value: &Value, from: &TypeDescriptor, to: &TypeDescriptor) -> Result<Value, ConversionError>;
}

/// Default converter: numeric widening and narrowing with range checks,
/// string parsing, string rendering of anything, and wrapping into lists.
#[derive(Debug, Default, Clone, Copy)]
pub struct StandardTypeConverter;

impl TypeConverter for StandardTypeConverter {
    fn can_convert(&self, from: &TypeDescriptor, to: &TypeDescriptor) -> bool {
        if to.is_assignable_from(from) {
            return true;
        }
        match to {
            TypeDescriptor::String | TypeDescriptor::List => true,
            t if t.is_numeric() => from.is_numeric() || *from == TypeDescriptor::String,
            TypeDescriptor::Bool => *from == TypeDescriptor::String,
            _ => false,
        }
    }

    fn convert(&self, value: &Value, from: &TypeDescriptor, to: &TypeDescriptor) -> Result<Value, ConversionError> {
        if value.is_null() || to.is_assignable_from(&TypeDescriptor::of(value)) {
            return Ok(value.clone());
        }
        let fail = || ConversionError::new(value, from, to);
        match to {
            TypeDescriptor::String => Ok(Value::String(value.to_string())),
            TypeDescriptor::Bool => match value {
                Value::String(s) => parse_bool(s).ok_or_else(|| fail().because("not a boolean literal")),
                _ => Err(fail()),
            },
            TypeDescriptor::List => Ok(match value {
                Value::String(s) => Value::list(
                    s.split(',')
                        .map(str::trim)
                        .filter(|part| !part.is_empty())
                        .map(Value::from),
                ),
                other => match other {
                    Value::Object(o) => match o.elements() {
                        Some(items) => Value::list(items),
                        None => Value::list(vec![other.clone()]),
                    },
                    _ => Value::list(vec![other.clone()]),
                },
            }),
            t if t.is_numeric() => match value {
                Value::String(s) => parse_number(s.trim(), t).ok_or_else(|| fail().because("not a number")),
                v if v.is_numeric() => {
                    convert_number(v, t).ok_or_else(|| fail().because("value out of range"))
                }
                _ => Err(fail()),
            },
            _ => Err(fail()),
        }
    }
}

fn parse_bool(s: &str) -> Option<Value> {
    match s.trim().to_ascii_lowercase().as_str() {
        "" => Some(Value::Null),
        "true" | "on" | "yes" | "1" => Some(Value::Bool(true)),
        "false" | "off" | "no" | "0" => Some(Value::Bool(false)),
        _ => None,
    }
}

fn parse_number(s: &str, to: &TypeDescriptor) -> Option<Value> {
    if s.is_empty() {
        return Some(Value::Null);
    }
    Some(match to {
        TypeDescriptor::Int => Value::Int(s.parse().ok()?),
        TypeDescriptor::Long => Value::Long(s.parse().ok()?),
        TypeDescriptor::Float => Value::Float(s.parse().ok()?),
        TypeDescriptor::Double => Value::Double(s.parse().ok()?),
        TypeDescriptor::BigInteger => Value::BigInteger(BigInt::from_str(s).ok()?),
        TypeDescriptor::BigDecimal => Value::BigDecimal(BigDecimal::from_str(s).ok()?),
        _ => return None,
    })
}

/// Convert between numeric representations. `None` when the value does not
/// fit the target or the target is not numeric. Fractions truncate toward zero.
pub(crate) fn convert_number(value: &Value, to: &TypeDescriptor) -> Option<Value> {
    Some(match to {
        TypeDescriptor::Int => Value::Int(match value {
            Value::Int(i) => *i,
            Value::Long(l) => i32::try_from(*l).ok()?,
            Value::Float(_) | Value::Double(_) => float_to_i64(value.as_f64()?).and_then(|l| i32::try_from(l).ok())?,
            Value::BigInteger(b) => b.to_i32()?,
            Value::BigDecimal(d) => d.with_scale(0).to_i32()?,
            _ => return None,
        }),
        TypeDescriptor::Long => Value::Long(match value {
            Value::Int(i) => *i as i64,
            Value::Long(l) => *l,
            Value::Float(_) | Value::Double(_) => float_to_i64(value.as_f64()?)?,
            Value::BigInteger(b) => b.to_i64()?,
            Value::BigDecimal(d) => d.with_scale(0).to_i64()?,
            _ => return None,
        }),
        TypeDescriptor::Float => Value::Float(match value {
            Value::Float(f) => *f,
            other => other.as_f64()? as f32,
        }),
        TypeDescriptor::Double => Value::Double(value.as_f64()?),
        TypeDescriptor::BigInteger => Value::BigInteger(match value {
            Value::Int(i) => BigInt::from(*i),
            Value::Long(l) => BigInt::from(*l),
            Value::Float(_) | Value::Double(_) => {
                let f = value.as_f64()?;
                if !f.is_finite() {
                    return None;
                }
                BigInt::from_f64(f.trunc())?
            }
            Value::BigInteger(b) => b.clone(),
            Value::BigDecimal(d) => d.with_scale(0).into_bigint_and_exponent().0,
            _ => return None,
        }),
        TypeDescriptor::BigDecimal => Value::BigDecimal(match value {
            Value::Int(i) => BigDecimal::from(*i),
            Value::Long(l) => BigDecimal::from(*l),
            Value::Float(f) => BigDecimal::from_str(&f.to_string()).ok()?,
            Value::Double(d) => BigDecimal::from_str(&d.to_string()).ok()?,
            Value::BigInteger(b) => BigDecimal::new(b.clone(), 0),
            Value::BigDecimal(d) => d.clone(),
            _ => return None,
        }),
        _ => return None,
    })
}

fn float_to_i64(f: f64) -> Option<i64> {
    let t = f.trunc();
    if t.is_finite() && t >= i64::MIN as f64 && t <= i64::MAX as f64 {
        Some(t as i64)
    } else {
        None
    }
}
