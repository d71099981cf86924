use std::fmt::{self, Display, Formatter};

use crate::accessor::{ConstructorExecutor, ConstructorResolver, MethodExecutor, MethodResolver, PropertyAccessor};
use crate::cache::{CacheSlot, SlotState};
use crate::types::Value;

/// Byte range in the source text.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Span {
    pub start: usize,
    pub end: usize,
}

impl Span {
    pub fn new(start: usize, end: usize) -> Self {
        Self { start, end }
    }

    pub fn to(self, other: Span) -> Span {
        Span { start: self.start, end: other.end }
    }
}

#[derive(Debug)]
pub struct Node {
    pub span: Span,
    /// Offset reported in evaluation errors raised by this node. The operator
    /// position for operator nodes, the span start otherwise.
    pub position: usize,
    pub kind: NodeKind,
}

#[derive(Debug)]
pub enum NodeKind {
    Literal(Value),
    PropertyOrField(PropertyRef),
    Indexer(IndexerRef),
    Method(MethodRef),
    Constructor(ConstructorRef),
    Variable(String),
    Function { name: String, args: Vec<Node> },
    TypeReference(String),
    BeanReference(String),
    InlineList(Vec<Node>),
    InlineMap(Vec<(Node, Node)>),
    Unary { op: UnaryOp, operand: Box<Node> },
    Binary { op: BinaryOp, left: Box<Node>, right: Box<Node> },
    Assign { target: Box<Node>, value: Box<Node> },
    Ternary { condition: Box<Node>, then: Box<Node>, otherwise: Box<Node> },
    Elvis { value: Box<Node>, fallback: Box<Node> },
    Selection { kind: SelectionKind, predicate: Box<Node>, null_safe: bool },
    Projection { transform: Box<Node>, null_safe: bool },
    /// Postfix chain; each link is evaluated against the previous result.
    Compound(Vec<Node>),
    /// A postfix chain holding at least one null-safe link.
    SafeNavigationChain(Vec<Node>),
    Template(Vec<Fragment>),
}

#[derive(Debug)]
pub struct PropertyRef {
    pub name: String,
    pub null_safe: bool,
    pub(crate) read_cache: CacheSlot<dyn PropertyAccessor>,
    pub(crate) write_cache: CacheSlot<dyn PropertyAccessor>,
}

impl PropertyRef {
    pub fn new(name: String, null_safe: bool) -> Self {
        Self { name, null_safe, read_cache: CacheSlot::new(), write_cache: CacheSlot::new() }
    }
}

#[derive(Debug)]
pub struct IndexerRef {
    pub index: Box<Node>,
    pub null_safe: bool,
    /// Used when indexing a host object by property name.
    pub(crate) read_cache: CacheSlot<dyn PropertyAccessor>,
    pub(crate) write_cache: CacheSlot<dyn PropertyAccessor>,
}

impl IndexerRef {
    pub fn new(index: Node, null_safe: bool) -> Self {
        Self { index: Box::new(index), null_safe, read_cache: CacheSlot::new(), write_cache: CacheSlot::new() }
    }
}

#[derive(Debug)]
pub struct MethodRef {
    pub name: String,
    pub args: Vec<Node>,
    pub null_safe: bool,
    pub(crate) cache: CacheSlot<dyn MethodExecutor, dyn MethodResolver>,
}

impl MethodRef {
    pub fn new(name: String, args: Vec<Node>, null_safe: bool) -> Self {
        Self { name, args, null_safe, cache: CacheSlot::new() }
    }
}

#[derive(Debug)]
pub struct ConstructorRef {
    pub type_name: String,
    pub args: Vec<Node>,
    pub(crate) cache: CacheSlot<dyn ConstructorExecutor, dyn ConstructorResolver>,
}

impl ConstructorRef {
    pub fn new(type_name: String, args: Vec<Node>) -> Self {
        Self { type_name, args, cache: CacheSlot::new() }
    }
}

#[derive(Debug)]
pub enum Fragment {
    Literal(String),
    Expression(Node),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SelectionKind {
    All,
    First,
    Last,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnaryOp {
    Not,
    Negate,
    Plus,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinaryOp {
    Add,
    Sub,
    Mul,
    Div,
    Mod,
    Pow,
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
    And,
    Or,
    InstanceOf,
    Matches,
    Between,
}

impl BinaryOp {
    pub fn symbol(self) -> &'static str {
        match self {
            BinaryOp::Add => "+",
            BinaryOp::Sub => "-",
            BinaryOp::Mul => "*",
            BinaryOp::Div => "/",
            BinaryOp::Mod => "%",
            BinaryOp::Pow => "^",
            BinaryOp::Eq => "==",
            BinaryOp::Ne => "!=",
            BinaryOp::Lt => "<",
            BinaryOp::Le => "<=",
            BinaryOp::Gt => ">",
            BinaryOp::Ge => ">=",
            BinaryOp::And => "&&",
            BinaryOp::Or => "||",
            BinaryOp::InstanceOf => "instanceof",
            BinaryOp::Matches => "matches",
            BinaryOp::Between => "between",
        }
    }
}

impl UnaryOp {
    pub fn symbol(self) -> &'static str {
        match self {
            UnaryOp::Not => "!",
            UnaryOp::Negate => "-",
            UnaryOp::Plus => "+",
        }
    }
}

impl Node {
    pub fn new(span: Span, kind: NodeKind) -> Self {
        Self { span, position: span.start, kind }
    }

    pub fn at(mut self, position: usize) -> Self {
        self.position = position;
        self
    }

    /// Direct children in evaluation order.
    pub fn children(&self) -> Vec<&Node> {
        match &self.kind {
            NodeKind::Literal(_)
            | NodeKind::PropertyOrField(_)
            | NodeKind::Variable(_)
            | NodeKind::TypeReference(_)
            | NodeKind::BeanReference(_) => Vec::new(),
            NodeKind::Indexer(r) => vec![&*r.index],
            NodeKind::Method(r) => r.args.iter().collect(),
            NodeKind::Constructor(r) => r.args.iter().collect(),
            NodeKind::Function { args, .. } | NodeKind::InlineList(args) => args.iter().collect(),
            NodeKind::InlineMap(entries) => entries.iter().flat_map(|(k, v)| [k, v]).collect(),
            NodeKind::Unary { operand, .. } => vec![&**operand],
            NodeKind::Binary { left, right, .. } => vec![&**left, &**right],
            NodeKind::Assign { target, value } => vec![&**target, &**value],
            NodeKind::Ternary { condition, then, otherwise } => vec![&**condition, &**then, &**otherwise],
            NodeKind::Elvis { value, fallback } => vec![&**value, &**fallback],
            NodeKind::Selection { predicate, .. } => vec![&**predicate],
            NodeKind::Projection { transform, .. } => vec![&**transform],
            NodeKind::Compound(links) | NodeKind::SafeNavigationChain(links) => links.iter().collect(),
            NodeKind::Template(fragments) => fragments
                .iter()
                .filter_map(|f| match f {
                    Fragment::Expression(node) => Some(node),
                    Fragment::Literal(_) => None,
                })
                .collect(),
        }
    }

    /// States of this node's own accessor caches (read, then write, for
    /// properties and indexers). Empty for nodes without caches.
    pub fn cache_states(&self) -> Vec<SlotState> {
        match &self.kind {
            NodeKind::PropertyOrField(r) => vec![r.read_cache.state(), r.write_cache.state()],
            NodeKind::Indexer(r) => vec![r.read_cache.state(), r.write_cache.state()],
            NodeKind::Method(r) => vec![r.cache.state()],
            NodeKind::Constructor(r) => vec![r.cache.state()],
            _ => Vec::new(),
        }
    }

    /// Pre-order walk over the tree.
    pub fn walk<'a>(&'a self, visit: &mut dyn FnMut(&'a Node)) {
        visit(self);
        for child in self.children() {
            child.walk(visit);
        }
    }

    fn is_indexer(&self) -> bool {
        matches!(self.kind, NodeKind::Indexer(_))
    }

    pub(crate) fn is_null_safe_link(&self) -> bool {
        match &self.kind {
            NodeKind::PropertyOrField(r) => r.null_safe,
            NodeKind::Method(r) => r.null_safe,
            NodeKind::Indexer(r) => r.null_safe,
            NodeKind::Selection { null_safe, .. } | NodeKind::Projection { null_safe, .. } => *null_safe,
            _ => false,
        }
    }
}

fn write_args(f: &mut Formatter<'_>, args: &[Node]) -> fmt::Result {
    write!(f, "(")?;
    for (i, arg) in args.iter().enumerate() {
        if i > 0 {
            write!(f, ",")?;
        }
        write!(f, "{}", arg)?;
    }
    write!(f, ")")
}

fn write_literal(f: &mut Formatter<'_>, value: &Value) -> fmt::Result {
    match value {
        Value::String(s) => write!(f, "'{}'", s.replace('\'', "''")),
        Value::Long(l) => write!(f, "{}L", l),
        Value::Float(x) => write!(f, "{}f", x),
        other => write!(f, "{}", other),
    }
}

/// Canonical source form, with binary operators fully parenthesized.
impl Display for Node {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match &self.kind {
            NodeKind::Literal(v) => write_literal(f, v),
            NodeKind::PropertyOrField(r) => write!(f, "{}", r.name),
            NodeKind::Indexer(r) => write!(f, "[{}]", r.index),
            NodeKind::Method(r) => {
                write!(f, "{}", r.name)?;
                write_args(f, &r.args)
            }
            NodeKind::Constructor(r) => {
                write!(f, "new {}", r.type_name)?;
                write_args(f, &r.args)
            }
            NodeKind::Variable(name) => write!(f, "#{}", name),
            NodeKind::Function { name, args } => {
                write!(f, "#{}", name)?;
                write_args(f, args)
            }
            NodeKind::TypeReference(name) => write!(f, "T({})", name),
            NodeKind::BeanReference(name) => write!(f, "@{}", name),
            NodeKind::InlineList(items) => {
                write!(f, "{{")?;
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        write!(f, ",")?;
                    }
                    write!(f, "{}", item)?;
                }
                write!(f, "}}")
            }
            NodeKind::InlineMap(entries) if entries.is_empty() => write!(f, "{{:}}"),
            NodeKind::InlineMap(entries) => {
                write!(f, "{{")?;
                for (i, (k, v)) in entries.iter().enumerate() {
                    if i > 0 {
                        write!(f, ",")?;
                    }
                    write!(f, "{}:{}", k, v)?;
                }
                write!(f, "}}")
            }
            NodeKind::Unary { op, operand } => write!(f, "{}{}", op.symbol(), operand),
            NodeKind::Binary { op, left, right } => write!(f, "({} {} {})", left, op.symbol(), right),
            NodeKind::Assign { target, value } => write!(f, "{} = {}", target, value),
            NodeKind::Ternary { condition, then, otherwise } => {
                write!(f, "({} ? {} : {})", condition, then, otherwise)
            }
            NodeKind::Elvis { value, fallback } => write!(f, "({} ?: {})", value, fallback),
            NodeKind::Selection { kind, predicate, .. } => {
                let open = match kind {
                    SelectionKind::All => "?[",
                    SelectionKind::First => "^[",
                    SelectionKind::Last => "$[",
                };
                write!(f, "{}{}]", open, predicate)
            }
            NodeKind::Projection { transform, .. } => write!(f, "![{}]", transform),
            NodeKind::Compound(links) | NodeKind::SafeNavigationChain(links) => {
                for (i, link) in links.iter().enumerate() {
                    if i > 0 && link.is_indexer() {
                        if link.is_null_safe_link() {
                            write!(f, "?")?;
                        }
                    } else if i > 0 {
                        write!(f, "{}", if link.is_null_safe_link() { "?." } else { "." })?;
                    }
                    write!(f, "{}", link)?;
                }
                Ok(())
            }
            NodeKind::Template(fragments) => {
                for fragment in fragments {
                    match fragment {
                        Fragment::Literal(text) => write!(f, "{}", text)?,
                        Fragment::Expression(node) => write!(f, "#{{{}}}", node)?,
                    }
                }
                Ok(())
            }
        }
    }
}
