//! Member resolution strategies.
//!
//! An [`EvaluationContext`] holds ordered chains of property accessors,
//! method resolvers and constructor resolvers. Custom strategies come first
//! in registration order; the defaults in this module close each chain.

use std::fmt::Debug;
use std::sync::Arc;

use crate::context::EvaluationContext;
use crate::error::{EvaluationErrorKind, Result};
use crate::reflect::{MethodDescriptor, PropertyDescriptor};
use crate::types::{TypeDescriptor, TypedValue, Value};

/// Reads and writes named properties.
pub trait PropertyAccessor: Send + Sync + Debug {
    fn can_read(&self, ctx: &EvaluationContext, target: &Value, name: &str) -> bool;

    fn read(&self, ctx: &EvaluationContext, target: &Value, name: &str) -> Result<TypedValue>;

    fn can_write(&self, _ctx: &EvaluationContext, _target: &Value, _name: &str) -> bool {
        false
    }

    fn write(&self, _ctx: &EvaluationContext, target: &Value, name: &str, _value: Value) -> Result<()> {
        Err(EvaluationErrorKind::PropertyNotWritable {
            name: name.to_string(),
            target: target.descriptor().to_string(),
        }
        .into())
    }

    /// An accessor bound to the member found on `target`'s type, cached in
    /// place of `self` so later hits skip the lookup.
    fn specialize(&self, _ctx: &EvaluationContext, _target: &Value, _name: &str) -> Option<Arc<dyn PropertyAccessor>> {
        None
    }

    /// Whether what this accessor resolves depends on the context's type
    /// registry. Cached results are then only reused with the same registry.
    fn uses_type_registry(&self) -> bool {
        false
    }
}

pub trait MethodResolver: Send + Sync + Debug {
    /// Find a method callable on `target` with arguments of the given types.
    fn resolve(
        &self,
        ctx: &EvaluationContext,
        target: &Value,
        name: &str,
        arg_types: &[TypeDescriptor],
    ) -> Result<Option<Arc<dyn MethodExecutor>>>;

    /// See [`PropertyAccessor::uses_type_registry`].
    fn uses_type_registry(&self) -> bool {
        false
    }
}

pub trait MethodExecutor: Send + Sync + Debug {
    fn execute(&self, ctx: &EvaluationContext, target: &Value, args: Vec<Value>) -> Result<TypedValue>;
}

pub trait ConstructorResolver: Send + Sync + Debug {
    fn resolve(
        &self,
        ctx: &EvaluationContext,
        type_name: &str,
        arg_types: &[TypeDescriptor],
    ) -> Result<Option<Arc<dyn ConstructorExecutor>>>;

    fn uses_type_registry(&self) -> bool {
        false
    }
}

pub trait ConstructorExecutor: Send + Sync + Debug {
    fn execute(&self, ctx: &EvaluationContext, args: Vec<Value>) -> Result<TypedValue>;
}

/// Resolves `@name` references.
pub trait BeanResolver: Send + Sync + Debug {
    fn resolve(&self, ctx: &EvaluationContext, name: &str) -> Result<Value>;
}

/// Map keys as properties. A missing key reads as null.
#[derive(Debug, Default, Clone, Copy)]
pub struct MapAccessor;

impl PropertyAccessor for MapAccessor {
    fn can_read(&self, _ctx: &EvaluationContext, target: &Value, _name: &str) -> bool {
        matches!(target, Value::Map(_))
    }

    fn read(&self, _ctx: &EvaluationContext, target: &Value, name: &str) -> Result<TypedValue> {
        match target {
            Value::Map(map) => Ok(TypedValue::new(map.get(name).unwrap_or(Value::Null))),
            other => Err(not_found(other, name)),
        }
    }

    fn can_write(&self, _ctx: &EvaluationContext, target: &Value, _name: &str) -> bool {
        matches!(target, Value::Map(_))
    }

    fn write(&self, _ctx: &EvaluationContext, target: &Value, name: &str, value: Value) -> Result<()> {
        match target {
            Value::Map(map) => {
                map.insert(name, value);
                Ok(())
            }
            other => Err(not_found(other, name)),
        }
    }
}

/// Properties described in the context's type registry.
#[derive(Debug, Default, Clone, Copy)]
pub struct ReflectiveAccessor;

impl ReflectiveAccessor {
    fn lookup(ctx: &EvaluationContext, target: &Value, name: &str) -> Option<PropertyDescriptor> {
        if !matches!(target, Value::Object(_)) {
            return None;
        }
        ctx.types().for_value(target)?.property(name).cloned()
    }
}

impl PropertyAccessor for ReflectiveAccessor {
    fn can_read(&self, ctx: &EvaluationContext, target: &Value, name: &str) -> bool {
        Self::lookup(ctx, target, name).is_some()
    }

    fn read(&self, ctx: &EvaluationContext, target: &Value, name: &str) -> Result<TypedValue> {
        let property = Self::lookup(ctx, target, name).ok_or_else(|| not_found(target, name))?;
        BoundProperty(property).read(ctx, target, name)
    }

    fn can_write(&self, ctx: &EvaluationContext, target: &Value, name: &str) -> bool {
        Self::lookup(ctx, target, name).is_some_and(|p| p.is_writable())
    }

    fn write(&self, ctx: &EvaluationContext, target: &Value, name: &str, value: Value) -> Result<()> {
        let property = Self::lookup(ctx, target, name).ok_or_else(|| not_found(target, name))?;
        BoundProperty(property).write(ctx, target, name, value)
    }

    fn specialize(&self, ctx: &EvaluationContext, target: &Value, name: &str) -> Option<Arc<dyn PropertyAccessor>> {
        Self::lookup(ctx, target, name).map(|p| Arc::new(BoundProperty(p)) as Arc<dyn PropertyAccessor>)
    }

    fn uses_type_registry(&self) -> bool {
        true
    }
}

/// A property descriptor already looked up for one type.
#[derive(Debug, Clone)]
struct BoundProperty(PropertyDescriptor);

impl PropertyAccessor for BoundProperty {
    fn can_read(&self, _ctx: &EvaluationContext, _target: &Value, _name: &str) -> bool {
        true
    }

    fn read(&self, _ctx: &EvaluationContext, target: &Value, _name: &str) -> Result<TypedValue> {
        let value = (self.0.getter)(target)?;
        Ok(TypedValue::declared(value, &self.0.ty))
    }

    fn can_write(&self, _ctx: &EvaluationContext, _target: &Value, _name: &str) -> bool {
        self.0.is_writable()
    }

    fn write(&self, ctx: &EvaluationContext, target: &Value, name: &str, value: Value) -> Result<()> {
        let setter = self.0.setter.as_ref().ok_or_else(|| EvaluationErrorKind::PropertyNotWritable {
            name: name.to_string(),
            target: target.descriptor().to_string(),
        })?;
        let value = coerce(ctx, value, &self.0.ty)?;
        setter(target, value)
    }
}

/// Methods described in the context's type registry. Calls on a type value
/// (`T(Math).max(1, 2)`) see only static methods.
#[derive(Debug, Default, Clone, Copy)]
pub struct ReflectiveMethodResolver;

impl MethodResolver for ReflectiveMethodResolver {
    fn resolve(
        &self,
        ctx: &EvaluationContext,
        target: &Value,
        name: &str,
        arg_types: &[TypeDescriptor],
    ) -> Result<Option<Arc<dyn MethodExecutor>>> {
        let Some(info) = ctx.types().for_value(target) else {
            return Ok(None);
        };
        let want_static = matches!(target, Value::Type(_));
        let best = best_match(
            ctx,
            info.methods_named(name)
                .filter(|m| m.is_static == want_static && m.accepts_count(arg_types.len()))
                .map(|m| (m, (0..arg_types.len()).map(|i| m.param_at(i)).collect::<Vec<_>>())),
            arg_types,
        );
        Ok(best.map(|m| Arc::new(ReflectiveMethodExecutor(m.clone())) as Arc<dyn MethodExecutor>))
    }

    fn uses_type_registry(&self) -> bool {
        true
    }
}

#[derive(Debug)]
struct ReflectiveMethodExecutor(MethodDescriptor);

impl MethodExecutor for ReflectiveMethodExecutor {
    fn execute(&self, ctx: &EvaluationContext, target: &Value, args: Vec<Value>) -> Result<TypedValue> {
        let args = bind_args(ctx, args, |i| self.0.param_at(i))?;
        let value = (self.0.invoker)(target, args)?;
        Ok(TypedValue::declared(value, &self.0.returns))
    }
}

/// Constructors described in the context's type registry.
#[derive(Debug, Default, Clone, Copy)]
pub struct ReflectiveConstructorResolver;

impl ConstructorResolver for ReflectiveConstructorResolver {
    fn resolve(
        &self,
        ctx: &EvaluationContext,
        type_name: &str,
        arg_types: &[TypeDescriptor],
    ) -> Result<Option<Arc<dyn ConstructorExecutor>>> {
        let Some(info) = ctx.types().get(type_name) else {
            return Ok(None);
        };
        let best = best_match(
            ctx,
            info.constructors()
                .iter()
                .filter(|c| c.accepts_count(arg_types.len()))
                .map(|c| (c, (0..arg_types.len()).map(|i| c.param_at(i)).collect::<Vec<_>>())),
            arg_types,
        );
        Ok(best.map(|c| {
            Arc::new(ReflectiveConstructorExecutor { ctor: c.clone(), type_name: type_name.to_string() })
                as Arc<dyn ConstructorExecutor>
        }))
    }

    fn uses_type_registry(&self) -> bool {
        true
    }
}

#[derive(Debug)]
struct ReflectiveConstructorExecutor {
    ctor: crate::reflect::ConstructorDescriptor,
    type_name: String,
}

impl ConstructorExecutor for ReflectiveConstructorExecutor {
    fn execute(&self, ctx: &EvaluationContext, args: Vec<Value>) -> Result<TypedValue> {
        let args = bind_args(ctx, args, |i| self.ctor.param_at(i))?;
        let value = (self.ctor.factory)(args)?;
        Ok(TypedValue::declared(value, &TypeDescriptor::object(&self.type_name)))
    }
}

/// Pick the candidate with the lowest total conversion cost. Ties go to the
/// candidate registered first.
fn best_match<'a, C: 'a>(
    ctx: &EvaluationContext,
    candidates: impl Iterator<Item = (&'a C, Vec<Option<&'a TypeDescriptor>>)>,
    arg_types: &[TypeDescriptor],
) -> Option<&'a C> {
    let mut best: Option<(u32, &'a C)> = None;
    for (candidate, params) in candidates {
        let cost = params
            .iter()
            .zip(arg_types)
            .map(|(param, arg)| param.and_then(|p| match_cost(ctx, arg, p)))
            .sum::<Option<u32>>();
        if let Some(cost) = cost {
            if best.map_or(true, |(b, _)| cost < b) {
                best = Some((cost, candidate));
            }
        }
    }
    best.map(|(_, c)| c)
}

fn match_cost(ctx: &EvaluationContext, arg: &TypeDescriptor, param: &TypeDescriptor) -> Option<u32> {
    if param.is_assignable_from(arg) {
        Some(0)
    } else if numeric_rank(arg) < numeric_rank(param) && numeric_rank(arg) > 0 {
        Some(1)
    } else if ctx.converter().can_convert(arg, param) {
        Some(2)
    } else {
        None
    }
}

fn numeric_rank(t: &TypeDescriptor) -> u8 {
    match t {
        TypeDescriptor::Int => 1,
        TypeDescriptor::Long => 2,
        TypeDescriptor::BigInteger => 3,
        TypeDescriptor::Float => 4,
        TypeDescriptor::Double => 5,
        TypeDescriptor::BigDecimal => 6,
        _ => 0,
    }
}

fn bind_args<'a>(
    ctx: &EvaluationContext,
    args: Vec<Value>,
    param_at: impl Fn(usize) -> Option<&'a TypeDescriptor>,
) -> Result<Vec<Value>> {
    args.into_iter()
        .enumerate()
        .map(|(i, arg)| match param_at(i) {
            Some(param) => coerce(ctx, arg, param),
            None => Ok(arg),
        })
        .collect()
}

/// Convert `value` for storage in a destination of type `to`.
pub(crate) fn coerce(ctx: &EvaluationContext, value: Value, to: &TypeDescriptor) -> Result<Value> {
    let from = value.descriptor();
    if to.is_assignable_from(&from) {
        return Ok(value);
    }
    Ok(ctx.converter().convert(&value, &from, to)?)
}

fn not_found(target: &Value, name: &str) -> crate::error::Error {
    EvaluationErrorKind::PropertyNotFound { name: name.to_string(), target: target.descriptor().to_string() }.into()
}
