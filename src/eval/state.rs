use crate::config::ParserConfig;
use crate::context::EvaluationContext;
use crate::types::TypedValue;

/// Per-evaluation state: the context plus the stacks that decide what an
/// unqualified reference, `#this` and `#root` mean at a given point.
pub(crate) struct ExpressionState<'a> {
    pub ctx: &'a EvaluationContext,
    pub config: &'a ParserConfig,
    /// Target of the next unqualified member reference.
    active: Vec<TypedValue>,
    /// Element currently bound by selection or projection.
    scopes: Vec<TypedValue>,
}

impl<'a> ExpressionState<'a> {
    pub fn new(ctx: &'a EvaluationContext, config: &'a ParserConfig) -> Self {
        Self { ctx, config, active: Vec::new(), scopes: Vec::new() }
    }

    pub fn active_object(&self) -> TypedValue {
        self.active.last().cloned().unwrap_or_else(|| self.ctx.root().clone())
    }

    pub fn scope_root(&self) -> TypedValue {
        self.scopes.last().cloned().unwrap_or_else(|| self.ctx.root().clone())
    }

    pub fn root(&self) -> TypedValue {
        self.ctx.root().clone()
    }

    pub fn with_active<R>(&mut self, value: TypedValue, f: impl FnOnce(&mut Self) -> R) -> R {
        self.active.push(value);
        let result = f(self);
        self.active.pop();
        result
    }

    /// Bind `value` as the element of a collection operation.
    pub fn with_scope<R>(&mut self, value: TypedValue, f: impl FnOnce(&mut Self) -> R) -> R {
        self.scopes.push(value.clone());
        let result = self.with_active(value, f);
        self.scopes.pop();
        result
    }

    /// Arguments and index expressions see the scope root as the active
    /// object, not the target of the call.
    pub fn in_scope_root<R>(&mut self, f: impl FnOnce(&mut Self) -> R) -> R {
        let root = self.scope_root();
        self.with_active(root, f)
    }
}
