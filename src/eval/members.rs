//! Property, method and constructor references, resolved through the
//! context's chains and cached per node.

use std::sync::Arc;

use crate::accessor::PropertyAccessor;
use crate::ast::{ConstructorRef, MethodRef, Node, PropertyRef};
use crate::cache::{CacheSlot, Guard, Resolved, Scope};
use crate::context::EvaluationContext;
use crate::error::{EvaluationErrorKind, Result};
use crate::reflect::TypeRegistry;
use crate::types::{TypeDescriptor, TypedValue, Value};

use super::ExpressionState;

/// Evaluate call arguments left to right against the scope root.
pub(super) fn evaluate_args(state: &mut ExpressionState<'_>, args: &[Node]) -> Result<Vec<Value>> {
    state.in_scope_root(|s| args.iter().map(|arg| arg.evaluate(s).map(TypedValue::into_value)).collect())
}

/// Human-readable target for resolution errors. Type values show as `T(Name)`.
pub(super) fn describe_target(target: &Value) -> String {
    match target {
        Value::Type(_) => target.to_string(),
        other => other.descriptor().to_string(),
    }
}

/// The registry a resolver's result depends on, recorded with the cache entry.
fn registry_for(ctx: &EvaluationContext, uses_registry: bool) -> Option<Arc<TypeRegistry>> {
    uses_registry.then(|| Arc::clone(ctx.types_handle()))
}

fn property_scope(ctx: &EvaluationContext) -> Scope<'_, dyn PropertyAccessor> {
    Scope { chain: ctx.property_accessors(), types: ctx.types_handle() }
}

fn first_accessor(
    ctx: &EvaluationContext,
    target: &Value,
    name: &str,
    usable: impl Fn(&dyn PropertyAccessor) -> bool,
) -> Option<Resolved<dyn PropertyAccessor, dyn PropertyAccessor>> {
    ctx.property_accessors().iter().find(|accessor| usable(accessor.as_ref())).map(|accessor| Resolved {
        accessor: accessor.specialize(ctx, target, name).unwrap_or_else(|| Arc::clone(accessor)),
        source: Arc::clone(accessor),
        types: registry_for(ctx, accessor.uses_type_registry()),
    })
}

pub(super) fn read_property(state: &ExpressionState<'_>, prop: &PropertyRef) -> Result<TypedValue> {
    let target = state.active_object();
    if target.is_null() {
        if prop.null_safe {
            return Ok(TypedValue::NULL);
        }
        return Err(EvaluationErrorKind::NullTarget { member: prop.name.clone() }.into());
    }
    read_with(state.ctx, &prop.read_cache, target.value(), &prop.name)
}

/// Read `name` from a non-null `target` through `cache`.
pub(super) fn read_with(
    ctx: &EvaluationContext,
    cache: &CacheSlot<dyn PropertyAccessor>,
    target: &Value,
    name: &str,
) -> Result<TypedValue> {
    let accessor = cache.get_or_resolve(Guard::target(target), name, property_scope(ctx), || {
        Ok(first_accessor(ctx, target, name, |a| a.can_read(ctx, target, name)))
    })?;
    match accessor {
        Some(accessor) => accessor.read(ctx, target, name),
        None => Err(EvaluationErrorKind::PropertyNotFound { name: name.to_string(), target: describe_target(target) }
            .into()),
    }
}

/// Write `name` on `target` through `cache`. A property some accessor can
/// read but none can write reports as not writable rather than not found.
pub(super) fn write_with(
    ctx: &EvaluationContext,
    cache: &CacheSlot<dyn PropertyAccessor>,
    target: &Value,
    name: &str,
    value: Value,
) -> Result<()> {
    if target.is_null() {
        return Err(EvaluationErrorKind::NullTarget { member: name.to_string() }.into());
    }
    let accessor = cache.get_or_resolve(Guard::target(target), name, property_scope(ctx), || {
        Ok(first_accessor(ctx, target, name, |a| a.can_write(ctx, target, name)))
    })?;
    if let Some(accessor) = accessor {
        return accessor.write(ctx, target, name, value);
    }
    let readable = ctx.property_accessors().iter().any(|a| a.can_read(ctx, target, name));
    let (name, target) = (name.to_string(), describe_target(target));
    Err(if readable {
        EvaluationErrorKind::PropertyNotWritable { name, target }
    } else {
        EvaluationErrorKind::PropertyNotFound { name, target }
    }
    .into())
}

pub(super) fn can_write(ctx: &EvaluationContext, target: &Value, name: &str) -> bool {
    !target.is_null() && ctx.property_accessors().iter().any(|a| a.can_write(ctx, target, name))
}

pub(super) fn call_method(state: &mut ExpressionState<'_>, method: &MethodRef) -> Result<TypedValue> {
    let target = state.active_object();
    if target.is_null() {
        if method.null_safe {
            return Ok(TypedValue::NULL);
        }
        return Err(EvaluationErrorKind::NullTarget { member: format!("{}()", method.name) }.into());
    }
    let args = evaluate_args(state, &method.args)?;
    let ctx = state.ctx;
    let target = target.into_value();
    let guard = Guard::call(&target, &args);
    let arg_types = guard.arg_types().to_vec();

    let scope = Scope { chain: ctx.method_resolvers(), types: ctx.types_handle() };
    let executor = method.cache.get_or_resolve(guard, &method.name, scope, || {
        for resolver in ctx.method_resolvers() {
            if let Some(found) = resolver.resolve(ctx, &target, &method.name, &arg_types)? {
                return Ok(Some(Resolved {
                    accessor: found,
                    source: Arc::clone(resolver),
                    types: registry_for(ctx, resolver.uses_type_registry()),
                }));
            }
        }
        Ok(None)
    })?;
    let executor = executor.ok_or_else(|| EvaluationErrorKind::MethodNotFound {
        name: method.name.clone(),
        target: describe_target(&target),
        args: join_types(&arg_types),
    })?;
    executor.execute(ctx, &target, args)
}

pub(super) fn construct(state: &mut ExpressionState<'_>, ctor: &ConstructorRef) -> Result<TypedValue> {
    let args = evaluate_args(state, &ctor.args)?;
    let ctx = state.ctx;
    let guard = Guard::call(&Value::Type(TypeDescriptor::object(&ctor.type_name)), &args);
    let arg_types = guard.arg_types().to_vec();

    let scope = Scope { chain: ctx.constructor_resolvers(), types: ctx.types_handle() };
    let executor = ctor.cache.get_or_resolve(guard, &ctor.type_name, scope, || {
        for resolver in ctx.constructor_resolvers() {
            if let Some(found) = resolver.resolve(ctx, &ctor.type_name, &arg_types)? {
                return Ok(Some(Resolved {
                    accessor: found,
                    source: Arc::clone(resolver),
                    types: registry_for(ctx, resolver.uses_type_registry()),
                }));
            }
        }
        Ok(None)
    })?;
    let executor = executor.ok_or_else(|| EvaluationErrorKind::ConstructorNotFound {
        type_name: ctor.type_name.clone(),
        args: join_types(&arg_types),
    })?;
    executor.execute(ctx, args)
}

fn join_types(types: &[TypeDescriptor]) -> String {
    types.iter().map(TypeDescriptor::name).collect::<Vec<_>>().join(", ")
}
