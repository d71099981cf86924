//! An expression language for navigating and manipulating object graphs.
//!
//! ```
//! use ladle::{parse, EvaluationContext, Value};
//!
//! let root = Value::from_json(serde_json::json!({
//!     "items": [{"price": 5}, {"price": 20}]
//! }));
//! let ctx = EvaluationContext::new(root);
//! let expensive = parse("items.?[price > 10].size()").unwrap().value_in(&ctx).unwrap();
//! assert_eq!(expensive, Value::Int(1));
//! ```

pub mod accessor;
pub mod ast;
pub mod cache;
pub mod config;
pub mod context;
pub mod convert;
pub mod custom;
pub mod error;
mod eval;
pub mod expression;
pub mod lexer;
pub mod parser;
pub mod reflect;
pub mod template;
pub mod types;

pub use accessor::{BeanResolver, MethodExecutor, MethodResolver, PropertyAccessor};
pub use config::{ParserConfig, TemplateParserContext};
pub use context::{EvaluationContext, EvaluationContextBuilder};
pub use convert::{StandardTypeConverter, TypeConverter};
pub use custom::{CustomFunction, FunctionRegistry};
pub use error::{ConversionError, Error, EvaluationErrorKind, ParseError, ParseErrorKind, Result};
pub use expression::{Expression, FromValue};
pub use reflect::{TypeInfo, TypeRegistry};
pub use types::{HostObject, TypeDescriptor, TypedValue, Value};

/// Parse an expression with the default [`ParserConfig`].
pub fn parse(text: &str) -> Result<Expression> {
    parse_with(text, ParserConfig::default())
}

pub fn parse_with(text: &str, config: ParserConfig) -> Result<Expression> {
    let ast = parser::parse_expression(text, &config)?;
    Ok(Expression::new(text, ast, config))
}

/// Parse literal text with embedded expressions delimited by `context`.
pub fn parse_template(text: &str, context: &TemplateParserContext) -> Result<Expression> {
    let config = ParserConfig::default();
    let ast = template::parse_template(text, context, &config)?;
    Ok(Expression::new(text, ast, config))
}

/// Parse and evaluate once against `root`.
pub fn evaluate<V: Into<Value>>(text: &str, root: V) -> Result<Value> {
    parse(text)?.value_in(&EvaluationContext::new(root))
}
