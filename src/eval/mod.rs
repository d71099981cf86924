//! Tree-walking evaluation of parsed expressions.

mod collections;
mod evaluator;
mod members;
pub(crate) mod operators;
mod state;

use tracing::trace;

use crate::ast::Node;
use crate::config::ParserConfig;
use crate::context::EvaluationContext;
use crate::error::Result;
use crate::types::{TypedValue, Value};

pub(crate) use state::ExpressionState;

pub(crate) fn evaluate(node: &Node, ctx: &EvaluationContext, config: &ParserConfig) -> Result<TypedValue> {
    trace!(expression = %node, "evaluating");
    node.evaluate(&mut ExpressionState::new(ctx, config))
}

pub(crate) fn assign(node: &Node, ctx: &EvaluationContext, config: &ParserConfig, value: Value) -> Result<()> {
    trace!(expression = %node, "assigning");
    node.assign(&mut ExpressionState::new(ctx, config), value)
}

pub(crate) fn is_writable(node: &Node, ctx: &EvaluationContext, config: &ParserConfig) -> Result<bool> {
    node.is_writable(&mut ExpressionState::new(ctx, config))
}
