//! Selection, projection and indexing over lists, maps, strings and
//! iterable host objects.

use indexmap::IndexMap;

use crate::ast::{IndexerRef, Node, NodeKind, SelectionKind};
use crate::context::EvaluationContext;
use crate::error::{EvaluationErrorKind, Result};
use crate::types::{MapRef, TypeDescriptor, TypedValue, Value};

use super::members;
use super::ExpressionState;

/// Map entries are presented to predicates and transforms as `{key, value}`.
fn entry(key: &str, value: Value) -> Value {
    Value::map([("key", Value::from(key)), ("value", value)])
}

fn elements(source: &Value, operation: &'static str) -> Result<Vec<Value>> {
    match source {
        Value::List(list) => Ok(list.to_vec()),
        Value::Object(object) => object.elements().ok_or_else(|| not_iterable(source, operation)),
        other => Err(not_iterable(other, operation)),
    }
}

fn not_iterable(source: &Value, operation: &'static str) -> crate::error::Error {
    EvaluationErrorKind::NotIterable { operation, target: source.descriptor().to_string() }.into()
}

fn null_source(null_safe: bool, operation: &'static str) -> Result<TypedValue> {
    if null_safe {
        Ok(TypedValue::NULL)
    } else {
        Err(EvaluationErrorKind::NullTarget { member: operation.to_string() }.into())
    }
}

fn keep(state: &mut ExpressionState<'_>, predicate: &Node, element: Value) -> Result<bool> {
    let result = state.with_scope(TypedValue::new(element), |s| predicate.evaluate(s))?;
    if let Value::Bool(b) = result.value() {
        return Ok(*b);
    }
    let found = result.value().descriptor().to_string();
    Err(crate::error::Error::from(EvaluationErrorKind::NotBoolean { context: "selection", found }).at(predicate.position))
}

pub(super) fn select(
    state: &mut ExpressionState<'_>,
    kind: SelectionKind,
    predicate: &Node,
    null_safe: bool,
) -> Result<TypedValue> {
    let operation = match kind {
        SelectionKind::All => "?[",
        SelectionKind::First => "^[",
        SelectionKind::Last => "$[",
    };
    let source = state.active_object().into_value();
    if source.is_null() {
        return null_source(null_safe, operation);
    }

    if let Value::Map(map) = &source {
        let entries: Vec<(String, Value)> = map.read().iter().map(|(k, v)| (k.clone(), v.clone())).collect();
        let mut kept = IndexMap::new();
        for (key, value) in entries {
            if keep(state, predicate, entry(&key, value.clone()))? {
                if kind == SelectionKind::First {
                    return Ok(TypedValue::new(Value::map([(key, value)])));
                }
                if kind == SelectionKind::Last {
                    kept.clear();
                }
                kept.insert(key, value);
            }
        }
        if kind != SelectionKind::All && kept.is_empty() {
            return Ok(TypedValue::NULL);
        }
        return Ok(TypedValue::new(Value::Map(MapRef::new(kept))));
    }

    let mut kept = Vec::new();
    let mut last = None;
    for item in elements(&source, operation)? {
        if keep(state, predicate, item.clone())? {
            match kind {
                SelectionKind::First => return Ok(TypedValue::new(item)),
                SelectionKind::Last => last = Some(item),
                SelectionKind::All => kept.push(item),
            }
        }
    }
    Ok(match kind {
        SelectionKind::All => TypedValue::new(Value::list(kept)),
        _ => last.map_or(TypedValue::NULL, TypedValue::new),
    })
}

pub(super) fn project(state: &mut ExpressionState<'_>, transform: &Node, null_safe: bool) -> Result<TypedValue> {
    let source = state.active_object().into_value();
    if source.is_null() {
        return null_source(null_safe, "![");
    }
    let items: Vec<Value> = match &source {
        Value::Map(map) => map.read().iter().map(|(k, v)| entry(k, v.clone())).collect(),
        other => elements(other, "![")?,
    };
    let mut projected = Vec::with_capacity(items.len());
    for item in items {
        let value = state.with_scope(TypedValue::new(item), |s| transform.evaluate(s))?;
        projected.push(value.into_value());
    }
    Ok(TypedValue::new(Value::list(projected)))
}

/// Indexes on maps and host objects may be bare names: `map[key]` reads
/// the entry `key`, not the property `key` of the root.
fn index_key(state: &mut ExpressionState<'_>, indexer: &IndexerRef, target: &Value) -> Result<Value> {
    if matches!(target, Value::Map(_) | Value::Object(_)) {
        if let NodeKind::PropertyOrField(prop) = &indexer.index.kind {
            return Ok(Value::String(prop.name.clone()));
        }
    }
    state.in_scope_root(|s| indexer.index.evaluate(s)).map(TypedValue::into_value)
}

fn key_string(key: Value) -> String {
    match key {
        Value::String(s) => s,
        other => other.to_string(),
    }
}

fn position(ctx: &EvaluationContext, key: &Value) -> Result<i64> {
    let converted = ctx.converter().convert(key, &key.descriptor(), &TypeDescriptor::Int)?;
    converted.as_i64().ok_or_else(|| {
        EvaluationErrorKind::NotIndexable { target: format!("index of type {}", key.descriptor()) }.into()
    })
}

fn in_bounds(index: i64, length: usize) -> Result<usize> {
    usize::try_from(index)
        .ok()
        .filter(|i| *i < length)
        .ok_or_else(|| EvaluationErrorKind::IndexOutOfBounds { index, length }.into())
}

pub(super) fn index(state: &mut ExpressionState<'_>, indexer: &IndexerRef) -> Result<TypedValue> {
    let target = state.active_object().into_value();
    if target.is_null() {
        return null_source(indexer.null_safe, "[]");
    }
    let key = index_key(state, indexer, &target)?;
    let ctx = state.ctx;
    match &target {
        Value::List(list) => {
            let i = in_bounds(position(ctx, &key)?, list.len())?;
            Ok(TypedValue::new(list.get(i).unwrap_or(Value::Null)))
        }
        Value::String(s) => {
            let length = s.chars().count();
            let i = in_bounds(position(ctx, &key)?, length)?;
            Ok(TypedValue::new(s.chars().nth(i).map(String::from).into()))
        }
        Value::Map(map) => Ok(TypedValue::new(map.get(&key_string(key)).unwrap_or(Value::Null))),
        Value::Object(object) => match (object.elements(), key.is_numeric()) {
            (Some(items), true) => {
                let i = in_bounds(position(ctx, &key)?, items.len())?;
                Ok(TypedValue::new(items[i].clone()))
            }
            _ => members::read_with(ctx, &indexer.read_cache, &target, &key_string(key)),
        },
        other => Err(EvaluationErrorKind::NotIndexable { target: other.descriptor().to_string() }.into()),
    }
}

/// Store into a list slot, map entry or host object property.
pub(super) fn assign_index(state: &mut ExpressionState<'_>, indexer: &IndexerRef, value: Value) -> Result<()> {
    let target = state.active_object().into_value();
    if target.is_null() {
        return Err(EvaluationErrorKind::NullTarget { member: "[]".to_string() }.into());
    }
    let key = index_key(state, indexer, &target)?;
    let ctx = state.ctx;
    match &target {
        Value::List(list) => {
            let index = position(ctx, &key)?;
            let config = state.config;
            let mut items = list.write();
            let length = items.len();
            let slot = usize::try_from(index)
                .ok()
                .filter(|i| *i < length || (config.auto_grow_collections && *i < config.maximum_auto_grow_size))
                .ok_or(EvaluationErrorKind::IndexOutOfBounds { index, length })?;
            if slot >= length {
                items.resize(slot + 1, Value::Null);
            }
            items[slot] = value;
            Ok(())
        }
        Value::Map(map) => {
            map.insert(key_string(key), value);
            Ok(())
        }
        Value::Object(_) => members::write_with(ctx, &indexer.write_cache, &target, &key_string(key), value),
        other => Err(EvaluationErrorKind::NotIndexable { target: other.descriptor().to_string() }.into()),
    }
}

pub(super) fn index_writable(state: &mut ExpressionState<'_>, indexer: &IndexerRef) -> Result<bool> {
    let target = state.active_object().into_value();
    Ok(match &target {
        Value::List(_) | Value::Map(_) => true,
        Value::Object(_) => {
            let key = index_key(state, indexer, &target)?;
            members::can_write(state.ctx, &target, &key_string(key))
        }
        _ => false,
    })
}
