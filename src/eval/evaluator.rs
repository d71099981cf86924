use std::cmp::Ordering;

use indexmap::IndexMap;

use crate::ast::{BinaryOp, Fragment, Node, NodeKind, UnaryOp};
use crate::context::EvaluationContext;
use crate::error::{EvaluationErrorKind, Result};
use crate::types::{MapRef, TypeDescriptor, TypedValue, Value};

use super::{collections, members, operators, ExpressionState};

impl Node {
    /// Evaluate this node against the current active object. Errors are
    /// tagged with this node's position unless a child already tagged them.
    pub(crate) fn evaluate(&self, state: &mut ExpressionState<'_>) -> Result<TypedValue> {
        self.evaluate_kind(state).map_err(|e| e.at(self.position))
    }

    fn evaluate_kind(&self, state: &mut ExpressionState<'_>) -> Result<TypedValue> {
        match &self.kind {
            NodeKind::Literal(value) => Ok(TypedValue::new(value.clone())),
            NodeKind::PropertyOrField(prop) => members::read_property(state, prop),
            NodeKind::Indexer(indexer) => collections::index(state, indexer),
            NodeKind::Method(method) => members::call_method(state, method),
            NodeKind::Constructor(ctor) => members::construct(state, ctor),
            NodeKind::Variable(name) => Ok(match name.as_str() {
                "this" => state.active_object(),
                "root" => state.root(),
                _ => state.ctx.variable(name).map_or(TypedValue::NULL, TypedValue::new),
            }),
            NodeKind::Function { name, args } => {
                let args = members::evaluate_args(state, args)?;
                Ok(TypedValue::new(state.ctx.functions().execute(name, args)?))
            }
            NodeKind::TypeReference(name) => Ok(TypedValue::new(Value::Type(state.ctx.types().resolve_type(name)?))),
            NodeKind::BeanReference(name) => {
                let resolver = state
                    .ctx
                    .bean_resolver()
                    .ok_or_else(|| EvaluationErrorKind::BeanNotFound { name: name.clone() })?;
                Ok(TypedValue::new(resolver.resolve(state.ctx, name)?))
            }
            NodeKind::InlineList(items) => {
                let items = items.iter().map(|item| item.evaluate(state).map(TypedValue::into_value));
                Ok(TypedValue::new(Value::list(items.collect::<Result<Vec<_>>>()?)))
            }
            NodeKind::InlineMap(entries) => {
                let mut map = IndexMap::with_capacity(entries.len());
                for (key, value) in entries {
                    let key = match key.evaluate(state)?.into_value() {
                        Value::String(s) => s,
                        other => other.to_string(),
                    };
                    map.insert(key, value.evaluate(state)?.into_value());
                }
                Ok(TypedValue::new(Value::Map(MapRef::new(map))))
            }
            NodeKind::Unary { op: UnaryOp::Not, operand } => {
                Ok(TypedValue::new(Value::Bool(!operand.condition(state, "!")?)))
            }
            NodeKind::Unary { op, operand } => {
                let value = operand.evaluate(state)?;
                Ok(TypedValue::new(operators::unary(*op, value.value())?))
            }
            NodeKind::Binary { op, left, right } => self.evaluate_binary(state, *op, left, right),
            NodeKind::Assign { target, value } => {
                let value = value.evaluate(state)?;
                target.assign(state, value.value().clone())?;
                Ok(value)
            }
            NodeKind::Ternary { condition, then, otherwise } => {
                if condition.condition(state, "?:")? {
                    then.evaluate(state)
                } else {
                    otherwise.evaluate(state)
                }
            }
            NodeKind::Elvis { value, fallback } => {
                let value = value.evaluate(state)?;
                if value.is_null() || value.value().as_str() == Some("") {
                    fallback.evaluate(state)
                } else {
                    Ok(value)
                }
            }
            NodeKind::Selection { kind, predicate, null_safe } => {
                collections::select(state, *kind, predicate, *null_safe)
            }
            NodeKind::Projection { transform, null_safe } => collections::project(state, transform, *null_safe),
            NodeKind::Compound(links) | NodeKind::SafeNavigationChain(links) => {
                Ok(evaluate_links(state, links)?.unwrap_or(TypedValue::NULL))
            }
            NodeKind::Template(fragments) => evaluate_template(state, fragments),
        }
    }

    fn evaluate_binary(
        &self,
        state: &mut ExpressionState<'_>,
        op: BinaryOp,
        left: &Node,
        right: &Node,
    ) -> Result<TypedValue> {
        let ctx = state.ctx;
        let result = match op {
            BinaryOp::And => Value::Bool(left.condition(state, "&&")? && right.condition(state, "&&")?),
            BinaryOp::Or => Value::Bool(left.condition(state, "||")? || right.condition(state, "||")?),
            BinaryOp::Add | BinaryOp::Sub | BinaryOp::Mul | BinaryOp::Div | BinaryOp::Mod | BinaryOp::Pow => {
                let (l, r) = operands(state, left, right)?;
                operators::arithmetic(op, &l, &r)?
            }
            BinaryOp::Eq | BinaryOp::Ne => {
                let (l, r) = operands(state, left, right)?;
                Value::Bool(operators::equals(ctx, &l, &r)? == (op == BinaryOp::Eq))
            }
            BinaryOp::Lt | BinaryOp::Le | BinaryOp::Gt | BinaryOp::Ge => {
                let (l, r) = operands(state, left, right)?;
                let ordering = operators::compare(ctx, op.symbol(), &l, &r)?;
                Value::Bool(match op {
                    BinaryOp::Lt => ordering == Ordering::Less,
                    BinaryOp::Le => ordering != Ordering::Greater,
                    BinaryOp::Gt => ordering == Ordering::Greater,
                    _ => ordering != Ordering::Less,
                })
            }
            BinaryOp::InstanceOf => {
                let (l, r) = operands(state, left, right)?;
                Value::Bool(operators::instance_of(&l, &r)?)
            }
            BinaryOp::Matches => {
                let (l, r) = operands(state, left, right)?;
                Value::Bool(operators::matches(&l, &r)?)
            }
            BinaryOp::Between => {
                let (l, r) = operands(state, left, right)?;
                Value::Bool(operators::between(ctx, &l, &r)?)
            }
        };
        Ok(TypedValue::new(result))
    }

    /// Evaluate as a boolean operand of `context`.
    fn condition(&self, state: &mut ExpressionState<'_>, context: &'static str) -> Result<bool> {
        let value = self.evaluate(state)?.into_value();
        truth(state.ctx, value, context).map_err(|e| e.at(self.position))
    }

    /// Store `value` into the location this node denotes.
    pub(crate) fn assign(&self, state: &mut ExpressionState<'_>, value: Value) -> Result<()> {
        self.assign_kind(state, value).map_err(|e| e.at(self.position))
    }

    fn assign_kind(&self, state: &mut ExpressionState<'_>, value: Value) -> Result<()> {
        match &self.kind {
            NodeKind::Variable(name) if name == "this" || name == "root" => {
                Err(EvaluationErrorKind::VariableNotAssignable { name: name.clone() }.into())
            }
            NodeKind::Variable(name) => {
                state.ctx.set_variable(name, value);
                Ok(())
            }
            NodeKind::PropertyOrField(prop) => {
                let target = state.active_object();
                members::write_with(state.ctx, &prop.write_cache, target.value(), &prop.name, value)
            }
            NodeKind::Indexer(indexer) => collections::assign_index(state, indexer, value),
            NodeKind::Compound(links) | NodeKind::SafeNavigationChain(links) => {
                let Some((last, prefix)) = links.split_last() else {
                    return Err(EvaluationErrorKind::NotWritable { node: self.describe() }.into());
                };
                match grow_prefix(state, prefix)? {
                    Some(target) if !(target.is_null() && last.is_null_safe_link()) => {
                        state.with_active(target, |s| last.assign(s, value))
                    }
                    // A null-safe link met null; there is nothing to assign into.
                    _ => Ok(()),
                }
            }
            _ => Err(EvaluationErrorKind::NotWritable { node: self.describe() }.into()),
        }
    }

    pub(crate) fn is_writable(&self, state: &mut ExpressionState<'_>) -> Result<bool> {
        let writable = match &self.kind {
            NodeKind::Variable(name) => Ok(name != "this" && name != "root"),
            NodeKind::PropertyOrField(prop) => {
                let target = state.active_object();
                Ok(members::can_write(state.ctx, target.value(), &prop.name))
            }
            NodeKind::Indexer(indexer) => collections::index_writable(state, indexer),
            NodeKind::Compound(links) | NodeKind::SafeNavigationChain(links) => match links.split_last() {
                Some((last, prefix)) => match evaluate_links(state, prefix)? {
                    Some(target) if !target.is_null() => state.with_active(target, |s| last.is_writable(s)),
                    _ => Ok(false),
                },
                None => Ok(false),
            },
            _ => Ok(false),
        };
        writable.map_err(|e| e.at(self.position))
    }

    fn describe(&self) -> &'static str {
        match &self.kind {
            NodeKind::Literal(_) => "literal",
            NodeKind::Method(_) => "method call",
            NodeKind::Constructor(_) => "constructor call",
            NodeKind::Function { .. } => "function call",
            NodeKind::TypeReference(_) => "type reference",
            NodeKind::BeanReference(_) => "bean reference",
            NodeKind::InlineList(_) => "inline list",
            NodeKind::InlineMap(_) => "inline map",
            NodeKind::Unary { .. } | NodeKind::Binary { .. } => "operator",
            NodeKind::Assign { .. } => "assignment",
            NodeKind::Ternary { .. } => "ternary",
            NodeKind::Elvis { .. } => "elvis",
            NodeKind::Selection { .. } => "selection",
            NodeKind::Projection { .. } => "projection",
            NodeKind::Template(_) => "template",
            NodeKind::PropertyOrField(_)
            | NodeKind::Indexer(_)
            | NodeKind::Variable(_)
            | NodeKind::Compound(_)
            | NodeKind::SafeNavigationChain(_) => "expression",
        }
    }
}

fn operands(state: &mut ExpressionState<'_>, left: &Node, right: &Node) -> Result<(Value, Value)> {
    let l = left.evaluate(state)?.into_value();
    let r = right.evaluate(state)?.into_value();
    Ok((l, r))
}

/// Bool passes through, strings go through the converter, anything else
/// is an error.
fn truth(ctx: &EvaluationContext, value: Value, context: &'static str) -> Result<bool> {
    let converted = match value {
        Value::String(_) => ctx.converter().convert(&value, &TypeDescriptor::String, &TypeDescriptor::Bool)?,
        other => other,
    };
    match converted {
        Value::Bool(b) => Ok(b),
        other => Err(EvaluationErrorKind::NotBoolean { context, found: other.descriptor().to_string() }.into()),
    }
}

/// Evaluate a postfix chain, each link against the previous result.
/// `None` means a null-safe link met null and the rest of the chain was skipped.
fn evaluate_links(state: &mut ExpressionState<'_>, links: &[Node]) -> Result<Option<TypedValue>> {
    let mut current: Option<TypedValue> = None;
    for link in links {
        current = Some(match current {
            None => link.evaluate(state)?,
            Some(value) if value.is_null() && link.is_null_safe_link() => return Ok(None),
            Some(value) => state.with_active(value, |s| link.evaluate(s))?,
        });
    }
    Ok(current)
}

/// Like [`evaluate_links`], but a null property along the way is replaced
/// by an empty map written back into its parent when auto-growing is on.
fn grow_prefix(state: &mut ExpressionState<'_>, links: &[Node]) -> Result<Option<TypedValue>> {
    let mut current = state.active_object();
    for (i, link) in links.iter().enumerate() {
        if i > 0 && current.is_null() && link.is_null_safe_link() {
            return Ok(None);
        }
        let mut next = state.with_active(current.clone(), |s| link.evaluate(s))?;
        if next.is_null() && state.config.auto_grow_null_references {
            if let NodeKind::PropertyOrField(prop) = &link.kind {
                let grown = Value::Map(MapRef::new(IndexMap::new()));
                members::write_with(state.ctx, &prop.write_cache, current.value(), &prop.name, grown.clone())
                    .map_err(|e| e.at(link.position))?;
                next = TypedValue::new(grown);
            }
        }
        current = next;
    }
    Ok(Some(current))
}

/// A lone fragment keeps its value; otherwise fragments are concatenated
/// with null rendering as the empty string.
fn evaluate_template(state: &mut ExpressionState<'_>, fragments: &[Fragment]) -> Result<TypedValue> {
    if let [Fragment::Expression(node)] = fragments {
        return node.evaluate(state);
    }
    let mut out = String::new();
    for fragment in fragments {
        match fragment {
            Fragment::Literal(text) => out.push_str(text),
            Fragment::Expression(node) => {
                let value = node.evaluate(state)?;
                if !value.is_null() {
                    out.push_str(&value.value().to_string());
                }
            }
        }
    }
    Ok(TypedValue::new(Value::String(out)))
}
