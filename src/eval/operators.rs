//! Operator semantics: numeric promotion, string concatenation, ordering,
//! equality and the pattern, range and type tests.

use std::cmp::Ordering;

use bigdecimal::num_bigint::{BigInt, Sign};
use bigdecimal::{BigDecimal, ToPrimitive, Zero};
use dashmap::DashMap;
use regex::Regex;

use crate::ast::{BinaryOp, UnaryOp};
use crate::context::EvaluationContext;
use crate::convert::convert_number;
use crate::error::{Error, EvaluationErrorKind, Result};
use crate::types::{TypeDescriptor, Value};

const MAX_REGEX_PATTERN_LEN: usize = 1000;
const MAX_CACHED_PATTERNS: usize = 256;
/// Exact powers larger than this many bits are an overflow.
const MAX_POWER_BITS: u64 = 1 << 20;
/// Largest scale an exact BigDecimal power may reach.
const MAX_POWER_SCALE: u64 = 1 << 20;

lazy_static::lazy_static! {
    static ref PATTERNS: DashMap<String, Regex> = DashMap::new();
}

/// Representation both operands are promoted to, widest first.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Promoted {
    BigDecimal,
    Double,
    Float,
    BigInteger,
    Long,
    Int,
}

impl Promoted {
    fn of(l: &Value, r: &Value) -> Option<Self> {
        let has = |t: TypeDescriptor| l.descriptor() == t || r.descriptor() == t;
        if !l.is_numeric() || !r.is_numeric() {
            return None;
        }
        Some(if has(TypeDescriptor::BigDecimal) {
            Promoted::BigDecimal
        } else if has(TypeDescriptor::Double) {
            Promoted::Double
        } else if has(TypeDescriptor::Float) {
            Promoted::Float
        } else if has(TypeDescriptor::BigInteger) {
            Promoted::BigInteger
        } else if has(TypeDescriptor::Long) {
            Promoted::Long
        } else {
            Promoted::Int
        })
    }

    fn descriptor(self) -> TypeDescriptor {
        match self {
            Promoted::BigDecimal => TypeDescriptor::BigDecimal,
            Promoted::Double => TypeDescriptor::Double,
            Promoted::Float => TypeDescriptor::Float,
            Promoted::BigInteger => TypeDescriptor::BigInteger,
            Promoted::Long => TypeDescriptor::Long,
            Promoted::Int => TypeDescriptor::Int,
        }
    }

    fn is_integral(self) -> bool {
        matches!(self, Promoted::BigInteger | Promoted::Long | Promoted::Int)
    }
}

fn operand_error(op: &'static str, l: &Value, r: &Value) -> Error {
    EvaluationErrorKind::OperandTypes {
        operator: op,
        left: l.descriptor().to_string(),
        right: r.descriptor().to_string(),
    }
    .into()
}

fn overflow(op: &'static str, ty: &str) -> Error {
    EvaluationErrorKind::Overflow { operator: op, ty: ty.to_string() }.into()
}

fn promote(l: &Value, r: &Value, to: Promoted, op: &'static str) -> Result<(Value, Value)> {
    let t = to.descriptor();
    match (convert_number(l, &t), convert_number(r, &t)) {
        (Some(a), Some(b)) => Ok((a, b)),
        _ => Err(operand_error(op, l, r)),
    }
}

/// `+ - * / % ^` on two evaluated operands.
pub(crate) fn arithmetic(op: BinaryOp, l: &Value, r: &Value) -> Result<Value> {
    let symbol = op.symbol();
    if op == BinaryOp::Add && (matches!(l, Value::String(_)) || matches!(r, Value::String(_))) {
        return Ok(Value::String(format!("{}{}", l, r)));
    }
    if op == BinaryOp::Mul {
        if let (Value::String(s), Some(n)) = (l, r.as_i64()) {
            let times = usize::try_from(n).map_err(|_| operand_error(symbol, l, r))?;
            return Ok(Value::String(s.repeat(times)));
        }
    }
    let promoted = Promoted::of(l, r).ok_or_else(|| operand_error(symbol, l, r))?;
    if op == BinaryOp::Pow {
        return power(l, r, promoted);
    }
    let (a, b) = promote(l, r, promoted, symbol)?;

    macro_rules! checked {
        ($a:expr, $b:expr, $variant:ident, $ty:literal) => {{
            let (a, b) = ($a, $b);
            let result = match op {
                BinaryOp::Add => a.checked_add(b),
                BinaryOp::Sub => a.checked_sub(b),
                BinaryOp::Mul => a.checked_mul(b),
                BinaryOp::Div | BinaryOp::Mod if b == 0 => {
                    return Err(EvaluationErrorKind::DivisionByZero.into())
                }
                BinaryOp::Div => a.checked_div(b),
                BinaryOp::Mod => a.checked_rem(b),
                _ => return Err(operand_error(symbol, l, r)),
            };
            result.map(Value::$variant).ok_or_else(|| overflow(symbol, $ty))
        }};
    }

    macro_rules! float {
        ($a:expr, $b:expr, $variant:ident) => {{
            let (a, b) = ($a, $b);
            Ok(Value::$variant(match op {
                BinaryOp::Add => a + b,
                BinaryOp::Sub => a - b,
                BinaryOp::Mul => a * b,
                BinaryOp::Div => a / b,
                BinaryOp::Mod => a % b,
                _ => return Err(operand_error(symbol, l, r)),
            }))
        }};
    }

    match (a, b) {
        (Value::Int(a), Value::Int(b)) => checked!(a, b, Int, "Integer"),
        (Value::Long(a), Value::Long(b)) => checked!(a, b, Long, "Long"),
        (Value::Float(a), Value::Float(b)) => float!(a, b, Float),
        (Value::Double(a), Value::Double(b)) => float!(a, b, Double),
        (Value::BigInteger(a), Value::BigInteger(b)) => Ok(Value::BigInteger(match op {
            BinaryOp::Add => a + b,
            BinaryOp::Sub => a - b,
            BinaryOp::Mul => a * b,
            BinaryOp::Div | BinaryOp::Mod if b.is_zero() => return Err(EvaluationErrorKind::DivisionByZero.into()),
            BinaryOp::Div => a / b,
            BinaryOp::Mod => a % b,
            _ => return Err(operand_error(symbol, l, r)),
        })),
        (Value::BigDecimal(a), Value::BigDecimal(b)) => Ok(Value::BigDecimal(match op {
            BinaryOp::Add => a + b,
            BinaryOp::Sub => a - b,
            BinaryOp::Mul => a * b,
            BinaryOp::Div | BinaryOp::Mod if b.is_zero() => return Err(EvaluationErrorKind::DivisionByZero.into()),
            // Quotient keeps the larger scale of the two operands.
            BinaryOp::Div => {
                let scale = a.as_bigint_and_exponent().1.max(b.as_bigint_and_exponent().1);
                (a / b).round(scale)
            }
            BinaryOp::Mod => a % b,
            _ => return Err(operand_error(symbol, l, r)),
        })),
        _ => Err(operand_error(symbol, l, r)),
    }
}

/// Integral powers are computed exactly and narrowed to the smallest of
/// Integer, Long, BigInteger that holds the result (never narrower than
/// the promoted operand type). Negative exponents give a Double.
fn power(l: &Value, r: &Value, promoted: Promoted) -> Result<Value> {
    let exponent = r.as_i64().or_else(|| match r {
        Value::BigInteger(b) => b.to_i64(),
        _ => None,
    });
    match (promoted, exponent) {
        (p, Some(e)) if p.is_integral() && e >= 0 => {
            let base = match convert_number(l, &TypeDescriptor::BigInteger) {
                Some(Value::BigInteger(b)) => b,
                _ => return Err(operand_error("^", l, r)),
            };
            let result = exact_pow(&base, e).ok_or_else(|| overflow("^", "BigInteger"))?;
            Ok(narrow(result, promoted))
        }
        (Promoted::BigDecimal, Some(e)) if e >= 0 => {
            let base = match convert_number(l, &TypeDescriptor::BigDecimal) {
                Some(Value::BigDecimal(b)) => b,
                _ => return Err(operand_error("^", l, r)),
            };
            // (u * 10^-s)^e == u^e * 10^-(s*e)
            let (unscaled, scale) = base.as_bigint_and_exponent();
            let scale = scale.checked_mul(e).filter(|s| s.unsigned_abs() <= MAX_POWER_SCALE);
            match (exact_pow(&unscaled, e), scale) {
                (Some(unscaled), Some(scale)) => Ok(Value::BigDecimal(BigDecimal::new(unscaled, scale))),
                _ => Err(overflow("^", "BigDecimal")),
            }
        }
        (Promoted::Float, _) => match (l.as_f64(), r.as_f64()) {
            (Some(a), Some(b)) => Ok(Value::Float((a as f32).powf(b as f32))),
            _ => Err(operand_error("^", l, r)),
        },
        _ => match (l.as_f64(), r.as_f64()) {
            (Some(a), Some(b)) => Ok(Value::Double(a.powf(b))),
            _ => Err(operand_error("^", l, r)),
        },
    }
}

/// `base^e` by repeated squaring, or `None` when the result would exceed
/// `MAX_POWER_BITS`. Bases 0, 1 and -1 never grow.
fn exact_pow(base: &BigInt, e: i64) -> Option<BigInt> {
    let bits = base.bits();
    if bits <= 1 {
        let value = match base.sign() {
            Sign::NoSign if e == 0 => 1,
            Sign::NoSign => 0,
            Sign::Minus if e % 2 == 1 => -1,
            _ => 1,
        };
        return Some(BigInt::from(value));
    }
    let e = u32::try_from(e).ok()?;
    ((bits - 1).saturating_mul(u64::from(e)) <= MAX_POWER_BITS).then(|| base.pow(e))
}

fn narrow(n: BigInt, at_least: Promoted) -> Value {
    match at_least {
        Promoted::Int => match n.to_i32() {
            Some(i) => Value::Int(i),
            None => narrow(n, Promoted::Long),
        },
        Promoted::Long => match n.to_i64() {
            Some(l) => Value::Long(l),
            None => Value::BigInteger(n),
        },
        _ => Value::BigInteger(n),
    }
}

pub(crate) fn unary(op: UnaryOp, v: &Value) -> Result<Value> {
    let symbol = op.symbol();
    let error = || -> Error {
        EvaluationErrorKind::UnaryOperandType { operator: symbol, operand: v.descriptor().to_string() }.into()
    };
    match op {
        UnaryOp::Plus if v.is_numeric() => Ok(v.clone()),
        UnaryOp::Negate => match v {
            Value::Int(i) => i.checked_neg().map(Value::Int).ok_or_else(|| overflow(symbol, "Integer")),
            Value::Long(l) => l.checked_neg().map(Value::Long).ok_or_else(|| overflow(symbol, "Long")),
            Value::Float(x) => Ok(Value::Float(-x)),
            Value::Double(x) => Ok(Value::Double(-x)),
            Value::BigInteger(b) => Ok(Value::BigInteger(-b.clone())),
            Value::BigDecimal(b) => Ok(Value::BigDecimal(-b.clone())),
            _ => Err(error()),
        },
        _ => Err(error()),
    }
}

fn numeric_cmp(l: &Value, r: &Value) -> Option<Ordering> {
    let promoted = Promoted::of(l, r)?;
    let (a, b) = promote(l, r, promoted, "").ok()?;
    Some(match (a, b) {
        (Value::Int(a), Value::Int(b)) => a.cmp(&b),
        (Value::Long(a), Value::Long(b)) => a.cmp(&b),
        (Value::BigInteger(a), Value::BigInteger(b)) => a.cmp(&b),
        (Value::Float(a), Value::Float(b)) => a.total_cmp(&b),
        (Value::Double(a), Value::Double(b)) => a.total_cmp(&b),
        (Value::BigDecimal(a), Value::BigDecimal(b)) => a.cmp(&b),
        _ => return None,
    })
}

/// Natural ordering without any conversion. Null sorts first.
fn natural_order(l: &Value, r: &Value) -> Option<Ordering> {
    match (l, r) {
        (Value::Null, Value::Null) => Some(Ordering::Equal),
        (Value::Null, _) => Some(Ordering::Less),
        (_, Value::Null) => Some(Ordering::Greater),
        (Value::String(a), Value::String(b)) => Some(a.cmp(b)),
        (Value::Bool(a), Value::Bool(b)) => Some(a.cmp(b)),
        (Value::Object(o), other) if o.compare_to(other).is_some() => o.compare_to(other),
        (other, Value::Object(o)) => o.compare_to(other).map(Ordering::reverse),
        _ => numeric_cmp(l, r),
    }
}

/// Convert one operand to the other's type so they can be compared.
/// Strings are the target of last resort.
fn bridge(ctx: &EvaluationContext, l: &Value, r: &Value) -> Result<Option<(Value, Value)>> {
    let (lt, rt) = (l.descriptor(), r.descriptor());
    if lt == rt {
        return Ok(None);
    }
    let converter = ctx.converter();
    if lt != TypeDescriptor::String && converter.can_convert(&rt, &lt) {
        return Ok(Some((l.clone(), converter.convert(r, &rt, &lt)?)));
    }
    if converter.can_convert(&lt, &rt) {
        return Ok(Some((converter.convert(l, &lt, &rt)?, r.clone())));
    }
    Ok(None)
}

pub(crate) fn compare(ctx: &EvaluationContext, op: &'static str, l: &Value, r: &Value) -> Result<Ordering> {
    if let Some(ord) = natural_order(l, r) {
        return Ok(ord);
    }
    if let Some((a, b)) = bridge(ctx, l, r)? {
        if let Some(ord) = natural_order(&a, &b) {
            return Ok(ord);
        }
    }
    Err(operand_error(op, l, r))
}

fn same(l: &Value, r: &Value) -> Option<bool> {
    match (l, r) {
        (Value::Null, Value::Null) => Some(true),
        (Value::Null, _) | (_, Value::Null) => Some(false),
        _ if l.is_numeric() && r.is_numeric() => numeric_cmp(l, r).map(Ordering::is_eq),
        (Value::Object(a), Value::Object(b)) if std::sync::Arc::ptr_eq(a, b) => Some(true),
        (Value::Object(o), other) | (other, Value::Object(o)) if o.compare_to(other).is_some() => {
            o.compare_to(other).map(Ordering::is_eq)
        }
        _ if l.descriptor() == r.descriptor() => Some(l == r),
        _ => None,
    }
}

/// `==`. A conversion that fails while bridging means "not equal".
pub(crate) fn equals(ctx: &EvaluationContext, l: &Value, r: &Value) -> Result<bool> {
    if let Some(eq) = same(l, r) {
        return Ok(eq);
    }
    match bridge(ctx, l, r) {
        Ok(Some((a, b))) => Ok(same(&a, &b).unwrap_or(false)),
        Ok(None) => Err(operand_error("==", l, r)),
        Err(Error::Evaluation(e)) if matches!(e.kind, EvaluationErrorKind::Conversion(_)) => Ok(false),
        Err(e) => Err(e),
    }
}

pub(crate) fn instance_of(l: &Value, r: &Value) -> Result<bool> {
    match r {
        Value::Type(_) if l.is_null() => Ok(false),
        Value::Type(TypeDescriptor::Any) => Ok(true),
        Value::Type(t) => Ok(l.descriptor() == *t),
        _ => Err(operand_error("instanceof", l, r)),
    }
}

/// Whole-string regular expression match.
pub(crate) fn matches(l: &Value, r: &Value) -> Result<bool> {
    let (Value::String(text), Value::String(pattern)) = (l, r) else {
        return Err(operand_error("matches", l, r));
    };
    if pattern.len() > MAX_REGEX_PATTERN_LEN {
        return Err(EvaluationErrorKind::InvalidPattern {
            pattern: format!("{}...", pattern.chars().take(32).collect::<String>()),
            message: format!("pattern longer than {} characters", MAX_REGEX_PATTERN_LEN),
        }
        .into());
    }
    if let Some(regex) = PATTERNS.get(pattern.as_str()) {
        return Ok(regex.is_match(text));
    }
    let regex = Regex::new(&format!("^(?:{})$", pattern)).map_err(|e| EvaluationErrorKind::InvalidPattern {
        pattern: pattern.clone(),
        message: e.to_string(),
    })?;
    let matched = regex.is_match(text);
    if PATTERNS.len() >= MAX_CACHED_PATTERNS {
        PATTERNS.clear();
    }
    PATTERNS.insert(pattern.clone(), regex);
    Ok(matched)
}

/// `x between {lo, hi}`, inclusive on both ends.
pub(crate) fn between(ctx: &EvaluationContext, l: &Value, r: &Value) -> Result<bool> {
    let bounds = match r {
        Value::List(list) if list.len() == 2 => list.to_vec(),
        _ => return Err(operand_error("between", l, r)),
    };
    Ok(compare(ctx, "between", l, &bounds[0])?.is_ge() && compare(ctx, "between", l, &bounds[1])?.is_le())
}
