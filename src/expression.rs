use std::fmt::{self, Display, Formatter};

use bigdecimal::num_bigint::BigInt;
use bigdecimal::BigDecimal;

use crate::accessor::coerce;
use crate::ast::Node;
use crate::config::ParserConfig;
use crate::context::EvaluationContext;
use crate::error::{ConversionError, Result};
use crate::eval;
use crate::types::{TypeDescriptor, TypedValue, Value};

/// A parsed expression. Immutable apart from its accessor caches, and safe
/// to evaluate from several threads at once, each with its own context.
#[derive(Debug)]
pub struct Expression {
    source: String,
    ast: Node,
    config: ParserConfig,
}

impl Expression {
    pub(crate) fn new(source: &str, ast: Node, config: ParserConfig) -> Self {
        Self { source: source.to_string(), ast, config }
    }

    /// Evaluate against an empty context.
    pub fn value(&self) -> Result<Value> {
        self.value_in(&EvaluationContext::empty())
    }

    pub fn value_in(&self, ctx: &EvaluationContext) -> Result<Value> {
        Ok(self.typed_value(ctx)?.into_value())
    }

    pub fn typed_value(&self, ctx: &EvaluationContext) -> Result<TypedValue> {
        eval::evaluate(&self.ast, ctx, &self.config)
    }

    /// Evaluate and convert the result to `target` through the context's converter.
    pub fn value_to(&self, ctx: &EvaluationContext, target: &TypeDescriptor) -> Result<Value> {
        coerce(ctx, self.value_in(ctx)?, target)
    }

    /// Evaluate and convert the result to a Rust type.
    ///
    /// ```
    /// use ladle::{parse, EvaluationContext};
    ///
    /// let expr = parse("'4' + 2").unwrap();
    /// let n: i64 = expr.value_as(&EvaluationContext::empty()).unwrap();
    /// assert_eq!(n, 42);
    /// ```
    pub fn value_as<T: FromValue>(&self, ctx: &EvaluationContext) -> Result<T> {
        let target = T::target();
        let value = self.value_to(ctx, &target)?;
        let from = value.descriptor();
        T::from_value(value.clone()).ok_or_else(|| ConversionError::new(&value, &from, &target).into())
    }

    /// Runtime type of the result, or its declared type when the result is null.
    pub fn value_type(&self, ctx: &EvaluationContext) -> Result<TypeDescriptor> {
        Ok(self.typed_value(ctx)?.descriptor().clone())
    }

    /// Assign into the location the expression denotes.
    pub fn set_value<V: Into<Value>>(&self, ctx: &EvaluationContext, value: V) -> Result<()> {
        eval::assign(&self.ast, ctx, &self.config, value.into())
    }

    pub fn is_writable(&self, ctx: &EvaluationContext) -> Result<bool> {
        eval::is_writable(&self.ast, ctx, &self.config)
    }

    pub fn source(&self) -> &str {
        &self.source
    }

    pub fn ast(&self) -> &Node {
        &self.ast
    }

    pub fn config(&self) -> &ParserConfig {
        &self.config
    }
}

impl Display for Expression {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.source)
    }
}

/// Rust types an evaluation result can be extracted as.
pub trait FromValue: Sized {
    /// Type the result is converted to before extraction.
    fn target() -> TypeDescriptor;

    fn from_value(value: Value) -> Option<Self>;
}

macro_rules! from_value {
    ($($ty:ty => $variant:ident),* $(,)?) => {
        $(
            impl FromValue for $ty {
                fn target() -> TypeDescriptor {
                    TypeDescriptor::$variant
                }

                fn from_value(value: Value) -> Option<Self> {
                    match value {
                        Value::$variant(v) => Some(v),
                        _ => None,
                    }
                }
            }
        )*
    };
}

from_value! {
    bool => Bool,
    i32 => Int,
    i64 => Long,
    f32 => Float,
    f64 => Double,
    BigInt => BigInteger,
    BigDecimal => BigDecimal,
    String => String,
}

impl FromValue for Value {
    fn target() -> TypeDescriptor {
        TypeDescriptor::Any
    }

    fn from_value(value: Value) -> Option<Self> {
        Some(value)
    }
}

impl FromValue for Vec<Value> {
    fn target() -> TypeDescriptor {
        TypeDescriptor::List
    }

    fn from_value(value: Value) -> Option<Self> {
        value.as_list().map(|list| list.to_vec())
    }
}

/// Null extracts as `None` instead of failing.
impl<T: FromValue> FromValue for Option<T> {
    fn target() -> TypeDescriptor {
        T::target()
    }

    fn from_value(value: Value) -> Option<Self> {
        match value {
            Value::Null => Some(None),
            other => T::from_value(other).map(Some),
        }
    }
}
