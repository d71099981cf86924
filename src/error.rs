use std::fmt::{Display, Formatter};

use thiserror::Error;

use crate::types::TypeDescriptor;

pub type Result<T> = std::result::Result<T, Error>;

/// Every failure surfaced by parsing or evaluating an expression.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum Error {
    #[error(transparent)]
    Parse(#[from] ParseError),

    #[error(transparent)]
    Evaluation(#[from] EvaluationError),
}

impl Error {
    /// Source offset the error was raised at, if known.
    pub fn position(&self) -> Option<usize> {
        match self {
            Error::Parse(e) => Some(e.position),
            Error::Evaluation(e) => e.position,
        }
    }

    /// Stable code for categorization.
    pub fn code(&self) -> &'static str {
        match self {
            Error::Parse(_) => "LADLE:PARSE",
            Error::Evaluation(e) => e.kind.code(),
        }
    }

    pub fn parse_kind(&self) -> Option<&ParseErrorKind> {
        match self {
            Error::Parse(e) => Some(&e.kind),
            Error::Evaluation(_) => None,
        }
    }

    pub fn evaluation_kind(&self) -> Option<&EvaluationErrorKind> {
        match self {
            Error::Parse(_) => None,
            Error::Evaluation(e) => Some(&e.kind),
        }
    }

    /// Error raised by user code (functions, host methods, bean resolvers).
    pub fn function<M: Into<String>>(message: M) -> Self {
        EvaluationError::new(EvaluationErrorKind::Function { message: message.into() }).into()
    }

    /// Tags an evaluation error with the position of the node that raised it.
    /// The innermost position wins.
    pub(crate) fn at(self, position: usize) -> Self {
        match self {
            Error::Evaluation(mut e) => {
                if e.position.is_none() {
                    e.position = Some(position);
                }
                Error::Evaluation(e)
            }
            other => other,
        }
    }
}

impl From<EvaluationErrorKind> for Error {
    fn from(kind: EvaluationErrorKind) -> Self {
        Error::Evaluation(EvaluationError::new(kind))
    }
}

impl From<ConversionError> for Error {
    fn from(err: ConversionError) -> Self {
        EvaluationErrorKind::Conversion(err).into()
    }
}

#[derive(Debug, Clone, PartialEq, Error)]
pub struct ParseError {
    pub position: usize,
    pub kind: ParseErrorKind,
    pub expected: Option<String>,
}

impl ParseError {
    pub fn new(kind: ParseErrorKind, position: usize) -> Self {
        Self { position, kind, expected: None }
    }

    pub fn expected<E: Into<String>>(mut self, expected: E) -> Self {
        self.expected = Some(expected.into());
        self
    }

    pub(crate) fn shifted(mut self, offset: usize) -> Self {
        self.position += offset;
        self
    }
}

impl Display for ParseError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match &self.expected {
            Some(expected) => write!(f, "{} at position {} (expected {})", self.kind, self.position, expected),
            None => write!(f, "{} at position {}", self.kind, self.position),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Error)]
pub enum ParseErrorKind {
    #[error("unexpected character '{0}'")]
    UnexpectedCharacter(char),
    #[error("unterminated string literal")]
    UnterminatedString,
    #[error("invalid numeric literal '{0}'")]
    InvalidNumber(String),
    #[error("unexpected token {0}")]
    UnexpectedToken(String),
    #[error("unexpected end of expression")]
    UnexpectedEnd,
    #[error("empty expression")]
    EmptyExpression,
    #[error("expressions nest deeper than {max} levels")]
    NestingTooDeep { max: usize },
    #[error("expression of length {length} exceeds the maximum of {max}")]
    ExpressionTooLong { length: usize, max: usize },
    #[error("template fragment opened with '{prefix}' is never closed")]
    UnterminatedTemplate { prefix: String },
    #[error("empty template fragment")]
    EmptyTemplateFragment,
}

#[derive(Debug, Clone, PartialEq, Error)]
pub struct EvaluationError {
    pub position: Option<usize>,
    pub kind: EvaluationErrorKind,
}

impl EvaluationError {
    pub fn new(kind: EvaluationErrorKind) -> Self {
        Self { position: None, kind }
    }
}

impl Display for EvaluationError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self.position {
            Some(pos) => write!(f, "{} at position {}", self.kind, pos),
            None => write!(f, "{}", self.kind),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Error)]
pub enum EvaluationErrorKind {
    #[error("property '{name}' cannot be found on {target}")]
    PropertyNotFound { name: String, target: String },
    #[error("property '{name}' is not writable on {target}")]
    PropertyNotWritable { name: String, target: String },
    #[error("method {name}({args}) cannot be found on {target}")]
    MethodNotFound { name: String, target: String, args: String },
    #[error("constructor {type_name}({args}) cannot be found")]
    ConstructorNotFound { type_name: String, args: String },
    #[error("function '#{name}' is not registered")]
    FunctionNotFound { name: String },
    #[error("function '#{name}' expects {expected} arguments, got {actual}")]
    FunctionArity { name: String, expected: String, actual: usize },
    #[error("type '{name}' is not registered")]
    TypeNotFound { name: String },
    #[error("bean '{name}' cannot be resolved")]
    BeanNotFound { name: String },
    #[error("'{member}' cannot be accessed on null")]
    NullTarget { member: String },
    #[error("{node} is not assignable")]
    NotWritable { node: &'static str },
    #[error("variable '#{name}' cannot be assigned")]
    VariableNotAssignable { name: String },
    #[error(transparent)]
    Conversion(ConversionError),
    #[error("operator '{operator}' is not supported between {left} and {right}")]
    OperandTypes { operator: &'static str, left: String, right: String },
    #[error("operator '{operator}' is not supported on {operand}")]
    UnaryOperandType { operator: &'static str, operand: String },
    #[error("result of '{operator}' overflows {ty}")]
    Overflow { operator: &'static str, ty: String },
    #[error("division by zero")]
    DivisionByZero,
    #[error("invalid pattern '{pattern}': {message}")]
    InvalidPattern { pattern: String, message: String },
    #[error("index {index} is out of bounds for length {length}")]
    IndexOutOfBounds { index: i64, length: usize },
    #[error("{target} cannot be indexed")]
    NotIndexable { target: String },
    #[error("{operation} is not supported on {target}")]
    NotIterable { operation: &'static str, target: String },
    #[error("{context} requires a boolean, found {found}")]
    NotBoolean { context: &'static str, found: String },
    #[error("{message}")]
    Function { message: String },
}

impl EvaluationErrorKind {
    pub fn code(&self) -> &'static str {
        match self {
            Self::PropertyNotFound { .. }
            | Self::MethodNotFound { .. }
            | Self::ConstructorNotFound { .. }
            | Self::FunctionNotFound { .. }
            | Self::TypeNotFound { .. }
            | Self::BeanNotFound { .. } => "LADLE:RESOLUTION",
            Self::Conversion(_) => "LADLE:CONVERSION",
            Self::OperandTypes { .. }
            | Self::UnaryOperandType { .. }
            | Self::Overflow { .. }
            | Self::DivisionByZero
            | Self::InvalidPattern { .. }
            | Self::NotBoolean { .. } => "LADLE:OPERAND",
            Self::IndexOutOfBounds { .. } | Self::NotIndexable { .. } | Self::NotIterable { .. } => {
                "LADLE:INDEX"
            }
            Self::NullTarget { .. } => "LADLE:NULL_TARGET",
            Self::PropertyNotWritable { .. }
            | Self::NotWritable { .. }
            | Self::VariableNotAssignable { .. } => "LADLE:NOT_WRITABLE",
            Self::FunctionArity { .. } => "LADLE:ARITY",
            Self::Function { .. } => "LADLE:FUNCTION",
        }
    }
}

/// Raised by a [`TypeConverter`](crate::convert::TypeConverter) when no
/// conversion path exists or the value does not fit the target type.
#[derive(Debug, Clone, PartialEq, Error)]
#[error("cannot convert {value} from {from} to {to}{}", reason_suffix(.reason))]
pub struct ConversionError {
    pub value: String,
    pub from: TypeDescriptor,
    pub to: TypeDescriptor,
    pub reason: Option<String>,
}

impl ConversionError {
    pub fn new(value: impl Display, from: &TypeDescriptor, to: &TypeDescriptor) -> Self {
        Self {
            value: value.to_string(),
            from: from.clone(),
            to: to.clone(),
            reason: None,
        }
    }

    pub fn because<R: Into<String>>(mut self, reason: R) -> Self {
        self.reason = Some(reason.into());
        self
    }
}

fn reason_suffix(reason: &Option<String>) -> String {
    match reason {
        Some(r) => format!(": {}", r),
        None => String::new(),
    }
}
