use tracing::trace;

use crate::ast::{
    BinaryOp, ConstructorRef, IndexerRef, MethodRef, Node, NodeKind, PropertyRef, SelectionKind, Span, UnaryOp,
};
use crate::config::ParserConfig;
use crate::error::{ParseError, ParseErrorKind};
use crate::lexer::{Lexer, Spanned, Token};
use crate::types::Value;

/// Maximum nesting of sub-expressions.
const MAX_NESTING_DEPTH: usize = 256;

pub struct Parser {
    tokens: Vec<Spanned>,
    pos: usize,
    prev_end: usize,
    depth: usize,
}

impl Parser {
    /// Tokenize `input`; positions are offset by `offset` so fragments of a
    /// larger text report positions in that text.
    pub fn new(input: &str, offset: usize) -> Result<Self, ParseError> {
        let mut tokens = Lexer::new(input).tokenize().map_err(|e| e.shifted(offset))?;
        for t in &mut tokens {
            t.start += offset;
            t.end += offset;
        }
        Ok(Self { tokens, pos: 0, prev_end: offset, depth: 0 })
    }

    fn peek(&self) -> &Token {
        &self.tokens[self.pos.min(self.tokens.len() - 1)].token
    }

    fn peek_at(&self, n: usize) -> &Token {
        &self.tokens[(self.pos + n).min(self.tokens.len() - 1)].token
    }

    fn start(&self) -> usize {
        self.tokens[self.pos.min(self.tokens.len() - 1)].start
    }

    fn bump(&mut self) -> Token {
        let idx = self.pos.min(self.tokens.len() - 1);
        let tok = self.tokens[idx].token.clone();
        self.prev_end = self.tokens[idx].end;
        if self.pos < self.tokens.len() - 1 {
            self.pos += 1;
        }
        tok
    }

    fn span_from(&self, start: usize) -> Span {
        Span::new(start, self.prev_end)
    }

    fn unexpected(&self, expected: &str) -> ParseError {
        let kind = match self.peek() {
            Token::Eof => ParseErrorKind::UnexpectedEnd,
            other => ParseErrorKind::UnexpectedToken(other.to_string()),
        };
        ParseError::new(kind, self.start()).expected(expected)
    }

    fn expect(&mut self, tok: Token, expected: &str) -> Result<(), ParseError> {
        if *self.peek() == tok {
            self.bump();
            Ok(())
        } else {
            Err(self.unexpected(expected))
        }
    }

    /// Parse the whole input as one expression.
    pub fn parse(&mut self) -> Result<Node, ParseError> {
        if *self.peek() == Token::Eof {
            return Err(ParseError::new(ParseErrorKind::EmptyExpression, self.start()));
        }
        let node = self.parse_expr()?;
        if *self.peek() != Token::Eof {
            return Err(self.unexpected("end of expression"));
        }
        Ok(node)
    }

    /// Run one level of recursive descent under the nesting limit.
    fn nested<T>(&mut self, parse: impl FnOnce(&mut Self) -> Result<T, ParseError>) -> Result<T, ParseError> {
        if self.depth >= MAX_NESTING_DEPTH {
            return Err(ParseError::new(ParseErrorKind::NestingTooDeep { max: MAX_NESTING_DEPTH }, self.start()));
        }
        self.depth += 1;
        let result = parse(self);
        self.depth -= 1;
        result
    }

    // Assignment, ternary and elvis recurse on the right through here.
    fn parse_expr(&mut self) -> Result<Node, ParseError> {
        self.nested(Self::parse_expr_inner)
    }

    fn parse_expr_inner(&mut self) -> Result<Node, ParseError> {
        let start = self.start();
        let lhs = self.parse_or()?;
        match self.peek() {
            Token::Assign => {
                let op = self.start();
                self.bump();
                let rhs = self.parse_expr()?;
                Ok(Node::new(
                    self.span_from(start),
                    NodeKind::Assign { target: Box::new(lhs), value: Box::new(rhs) },
                )
                .at(op))
            }
            Token::Elvis => {
                self.bump();
                let fallback = self.parse_expr()?;
                Ok(Node::new(
                    self.span_from(start),
                    NodeKind::Elvis { value: Box::new(lhs), fallback: Box::new(fallback) },
                ))
            }
            Token::QMark => {
                self.bump();
                let then = self.parse_expr()?;
                self.expect(Token::Colon, "':' in ternary expression")?;
                let otherwise = self.parse_expr()?;
                Ok(Node::new(
                    self.span_from(start),
                    NodeKind::Ternary { condition: Box::new(lhs), then: Box::new(then), otherwise: Box::new(otherwise) },
                ))
            }
            _ => Ok(lhs),
        }
    }

    fn binary(&self, start: usize, op_pos: usize, op: BinaryOp, left: Node, right: Node) -> Node {
        Node::new(self.span_from(start), NodeKind::Binary { op, left: Box::new(left), right: Box::new(right) }).at(op_pos)
    }

    fn parse_or(&mut self) -> Result<Node, ParseError> {
        let start = self.start();
        let mut node = self.parse_and()?;
        while *self.peek() == Token::OrOr {
            let op_pos = self.start();
            self.bump();
            let rhs = self.parse_and()?;
            node = self.binary(start, op_pos, BinaryOp::Or, node, rhs);
        }
        Ok(node)
    }

    fn parse_and(&mut self) -> Result<Node, ParseError> {
        let start = self.start();
        let mut node = self.parse_equality()?;
        while *self.peek() == Token::AndAnd {
            let op_pos = self.start();
            self.bump();
            let rhs = self.parse_equality()?;
            node = self.binary(start, op_pos, BinaryOp::And, node, rhs);
        }
        Ok(node)
    }

    fn parse_equality(&mut self) -> Result<Node, ParseError> {
        let start = self.start();
        let mut node = self.parse_relational()?;
        loop {
            let op = match self.peek() {
                Token::EqEq => BinaryOp::Eq,
                Token::NotEq => BinaryOp::Ne,
                _ => break,
            };
            let op_pos = self.start();
            self.bump();
            let rhs = self.parse_relational()?;
            node = self.binary(start, op_pos, op, node, rhs);
        }
        Ok(node)
    }

    // Relational operators do not chain: `a < b < c` is rejected.
    fn parse_relational(&mut self) -> Result<Node, ParseError> {
        let start = self.start();
        let node = self.parse_additive()?;
        let op = match self.peek() {
            Token::Less => BinaryOp::Lt,
            Token::Le => BinaryOp::Le,
            Token::Greater => BinaryOp::Gt,
            Token::Ge => BinaryOp::Ge,
            Token::InstanceOf => BinaryOp::InstanceOf,
            Token::Matches => BinaryOp::Matches,
            Token::Between => BinaryOp::Between,
            _ => return Ok(node),
        };
        let op_pos = self.start();
        self.bump();
        let rhs = self.parse_additive()?;
        Ok(self.binary(start, op_pos, op, node, rhs))
    }

    fn parse_additive(&mut self) -> Result<Node, ParseError> {
        let start = self.start();
        let mut node = self.parse_multiplicative()?;
        loop {
            let op = match self.peek() {
                Token::Plus => BinaryOp::Add,
                Token::Minus => BinaryOp::Sub,
                _ => break,
            };
            let op_pos = self.start();
            self.bump();
            let rhs = self.parse_multiplicative()?;
            node = self.binary(start, op_pos, op, node, rhs);
        }
        Ok(node)
    }

    fn parse_multiplicative(&mut self) -> Result<Node, ParseError> {
        let start = self.start();
        let mut node = self.parse_unary()?;
        loop {
            let op = match self.peek() {
                Token::Star => BinaryOp::Mul,
                Token::Slash => BinaryOp::Div,
                Token::Percent => BinaryOp::Mod,
                _ => break,
            };
            let op_pos = self.start();
            self.bump();
            let rhs = self.parse_unary()?;
            node = self.binary(start, op_pos, op, node, rhs);
        }
        Ok(node)
    }

    // Prefix operators recurse here, and so do exponents.
    fn parse_unary(&mut self) -> Result<Node, ParseError> {
        self.nested(Self::parse_unary_inner)
    }

    fn parse_unary_inner(&mut self) -> Result<Node, ParseError> {
        let start = self.start();
        let op = match self.peek() {
            Token::Bang => UnaryOp::Not,
            Token::Minus => UnaryOp::Negate,
            Token::Plus => UnaryOp::Plus,
            _ => return self.parse_power(),
        };
        self.bump();
        let operand = self.parse_unary()?;
        Ok(Node::new(self.span_from(start), NodeKind::Unary { op, operand: Box::new(operand) }))
    }

    // Binds tighter than prefix operators, so -3^2 == -(3^2). Right
    // associative through the unary exponent: 2^3^2 == 2^(3^2).
    fn parse_power(&mut self) -> Result<Node, ParseError> {
        let start = self.start();
        let base = self.parse_postfix()?;
        if *self.peek() == Token::Caret {
            let op_pos = self.start();
            self.bump();
            let exponent = self.parse_unary()?;
            return Ok(self.binary(start, op_pos, BinaryOp::Pow, base, exponent));
        }
        Ok(base)
    }

    fn parse_postfix(&mut self) -> Result<Node, ParseError> {
        let start = self.start();
        let first = self.parse_primary()?;
        let mut links = vec![first];
        let mut safe = false;
        loop {
            let link_start = self.start();
            let link = match self.peek() {
                Token::Dot | Token::SafeNavigation => {
                    let null_safe = *self.peek() == Token::SafeNavigation;
                    self.bump();
                    safe |= null_safe;
                    self.parse_member(link_start, null_safe)?
                }
                Token::LBracket => {
                    self.bump();
                    self.parse_index(link_start, false)?
                }
                // `a?[0]`: a safe index, selection needs the dot.
                Token::SelectAll => {
                    self.bump();
                    safe = true;
                    self.parse_index(link_start, true)?
                }
                _ => break,
            };
            links.push(link);
        }
        if links.len() == 1 {
            return Ok(links.remove(0));
        }
        let span = self.span_from(start);
        Ok(if safe {
            Node::new(span, NodeKind::SafeNavigationChain(links))
        } else {
            Node::new(span, NodeKind::Compound(links))
        })
    }

    fn parse_index(&mut self, start: usize, null_safe: bool) -> Result<Node, ParseError> {
        let index = self.parse_expr()?;
        self.expect(Token::RBracket, "']'")?;
        Ok(Node::new(self.span_from(start), NodeKind::Indexer(IndexerRef::new(index, null_safe))))
    }

    /// Whatever follows `.` or `?.`.
    fn parse_member(&mut self, start: usize, null_safe: bool) -> Result<Node, ParseError> {
        let selection = match self.peek() {
            Token::SelectAll => Some(SelectionKind::All),
            Token::SelectFirst => Some(SelectionKind::First),
            Token::SelectLast => Some(SelectionKind::Last),
            _ => None,
        };
        if let Some(kind) = selection {
            self.bump();
            let predicate = self.parse_expr()?;
            self.expect(Token::RBracket, "']' closing the selection")?;
            return Ok(Node::new(
                self.span_from(start),
                NodeKind::Selection { kind, predicate: Box::new(predicate), null_safe },
            ));
        }
        match self.peek().clone() {
            Token::Project => {
                self.bump();
                let transform = self.parse_expr()?;
                self.expect(Token::RBracket, "']' closing the projection")?;
                Ok(Node::new(self.span_from(start), NodeKind::Projection { transform: Box::new(transform), null_safe }))
            }
            Token::LBracket if null_safe => {
                self.bump();
                self.parse_index(start, true)
            }
            Token::Identifier(name) => {
                let name_start = self.start();
                self.bump();
                if *self.peek() == Token::LParen {
                    let args = self.parse_args()?;
                    Ok(Node::new(self.span_from(name_start), NodeKind::Method(MethodRef::new(name, args, null_safe))))
                } else {
                    Ok(Node::new(self.span_from(name_start), NodeKind::PropertyOrField(PropertyRef::new(name, null_safe))))
                }
            }
            _ => Err(self.unexpected("property, method, selection or projection")),
        }
    }

    fn parse_args(&mut self) -> Result<Vec<Node>, ParseError> {
        self.expect(Token::LParen, "'('")?;
        let mut args = Vec::new();
        if *self.peek() == Token::RParen {
            self.bump();
            return Ok(args);
        }
        loop {
            args.push(self.parse_expr()?);
            match self.peek() {
                Token::Comma => {
                    self.bump();
                }
                Token::RParen => {
                    self.bump();
                    return Ok(args);
                }
                _ => return Err(self.unexpected("',' or ')'")),
            }
        }
    }

    fn qualified_name(&mut self) -> Result<String, ParseError> {
        let mut name = match self.peek() {
            Token::Identifier(s) => s.clone(),
            _ => return Err(self.unexpected("type name")),
        };
        self.bump();
        while *self.peek() == Token::Dot && matches!(self.peek_at(1), Token::Identifier(_)) {
            self.bump();
            if let Token::Identifier(part) = self.bump() {
                name.push('.');
                name.push_str(&part);
            }
        }
        Ok(name)
    }

    fn parse_primary(&mut self) -> Result<Node, ParseError> {
        let start = self.start();
        let literal = match self.peek() {
            Token::Int(i) => Some(Value::Int(*i)),
            Token::Long(l) => Some(Value::Long(*l)),
            Token::Float(x) => Some(Value::Float(*x)),
            Token::Double(x) => Some(Value::Double(*x)),
            Token::String(s) => Some(Value::String(s.clone())),
            Token::True => Some(Value::Bool(true)),
            Token::False => Some(Value::Bool(false)),
            Token::Null => Some(Value::Null),
            _ => None,
        };
        if let Some(value) = literal {
            self.bump();
            return Ok(Node::new(self.span_from(start), NodeKind::Literal(value)));
        }

        match self.peek().clone() {
            Token::LParen => {
                self.bump();
                let inner = self.parse_expr()?;
                self.expect(Token::RParen, "')'")?;
                Ok(inner)
            }
            Token::LBrace => self.parse_inline(),
            Token::Hash => {
                self.bump();
                let name = match self.peek() {
                    Token::Identifier(name) => name.clone(),
                    _ => return Err(self.unexpected("variable or function name after '#'")),
                };
                self.bump();
                if *self.peek() == Token::LParen {
                    let args = self.parse_args()?;
                    Ok(Node::new(self.span_from(start), NodeKind::Function { name, args }))
                } else {
                    Ok(Node::new(self.span_from(start), NodeKind::Variable(name)))
                }
            }
            Token::At => {
                self.bump();
                let name = match self.peek().clone() {
                    Token::Identifier(_) => self.qualified_name()?,
                    Token::String(s) => {
                        self.bump();
                        s
                    }
                    _ => return Err(self.unexpected("bean name after '@'")),
                };
                Ok(Node::new(self.span_from(start), NodeKind::BeanReference(name)))
            }
            Token::Identifier(name) if name == "new" && matches!(self.peek_at(1), Token::Identifier(_)) => {
                self.bump();
                let type_name = self.qualified_name()?;
                let args = self.parse_args()?;
                Ok(Node::new(self.span_from(start), NodeKind::Constructor(ConstructorRef::new(type_name, args))))
            }
            Token::Identifier(name) if name == "T" && *self.peek_at(1) == Token::LParen => {
                self.bump();
                self.bump();
                let type_name = self.qualified_name()?;
                self.expect(Token::RParen, "')' closing the type reference")?;
                Ok(Node::new(self.span_from(start), NodeKind::TypeReference(type_name)))
            }
            Token::Identifier(name) => {
                self.bump();
                if *self.peek() == Token::LParen {
                    let args = self.parse_args()?;
                    Ok(Node::new(self.span_from(start), NodeKind::Method(MethodRef::new(name, args, false))))
                } else {
                    Ok(Node::new(self.span_from(start), NodeKind::PropertyOrField(PropertyRef::new(name, false))))
                }
            }
            _ => Err(self.unexpected("expression")),
        }
    }

    /// `{}` `{:}` `{a, b}` `{k: v, ...}`
    fn parse_inline(&mut self) -> Result<Node, ParseError> {
        let start = self.start();
        self.expect(Token::LBrace, "'{'")?;
        if *self.peek() == Token::RBrace {
            self.bump();
            return Ok(Node::new(self.span_from(start), NodeKind::InlineList(Vec::new())));
        }
        if *self.peek() == Token::Colon && *self.peek_at(1) == Token::RBrace {
            self.bump();
            self.bump();
            return Ok(Node::new(self.span_from(start), NodeKind::InlineMap(Vec::new())));
        }

        let first = self.parse_expr()?;
        if *self.peek() != Token::Colon {
            let mut items = vec![first];
            while *self.peek() == Token::Comma {
                self.bump();
                items.push(self.parse_expr()?);
            }
            self.expect(Token::RBrace, "',' or '}'")?;
            return Ok(Node::new(self.span_from(start), NodeKind::InlineList(items)));
        }

        let mut entries = Vec::new();
        let mut key = map_key(first);
        loop {
            self.expect(Token::Colon, "':' in map literal")?;
            let value = self.parse_expr()?;
            entries.push((key, value));
            match self.peek() {
                Token::Comma => {
                    self.bump();
                    key = map_key(self.parse_expr()?);
                }
                Token::RBrace => {
                    self.bump();
                    break;
                }
                _ => return Err(self.unexpected("',' or '}'")),
            }
        }
        Ok(Node::new(self.span_from(start), NodeKind::InlineMap(entries)))
    }
}

/// Bare identifiers used as map keys stand for their own name.
fn map_key(node: Node) -> Node {
    match node.kind {
        NodeKind::PropertyOrField(r) => Node::new(node.span, NodeKind::Literal(Value::String(r.name))),
        kind => Node { kind, ..node },
    }
}

/// Parse a complete expression.
pub fn parse_expression(input: &str, config: &ParserConfig) -> Result<Node, ParseError> {
    trace!(length = input.len(), "parsing expression");
    let length = input.chars().count();
    if length > config.max_expression_length {
        return Err(ParseError::new(
            ParseErrorKind::ExpressionTooLong { length, max: config.max_expression_length },
            0,
        ));
    }
    Parser::new(input, 0)?.parse()
}
