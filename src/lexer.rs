use std::fmt;

use crate::error::{ParseError, ParseErrorKind};

#[derive(Debug, Clone, PartialEq)]
pub enum Token {
    Int(i32),
    Long(i64),
    Float(f32),
    Double(f64),
    Identifier(String),
    String(String),
    True,
    False,
    Null,
    Plus,
    Minus,
    Star,
    Slash,
    Percent,
    Caret,
    Bang,
    Assign,
    EqEq,
    NotEq,
    Less,
    Le,
    Greater,
    Ge,
    AndAnd,
    OrOr,
    InstanceOf,
    Matches,
    Between,
    QMark,
    Elvis,          // ?:
    SafeNavigation, // ?.
    Dot,
    Comma,
    Colon,
    Hash,
    At,
    LParen,
    RParen,
    LBracket,
    RBracket,
    LBrace,
    RBrace,
    SelectAll,   // ?[
    SelectFirst, // ^[
    SelectLast,  // $[
    Project,     // ![
    Eof,
}

impl fmt::Display for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Token::Int(i) => return write!(f, "'{}'", i),
            Token::Long(l) => return write!(f, "'{}L'", l),
            Token::Float(x) => return write!(f, "'{}f'", x),
            Token::Double(x) => return write!(f, "'{}'", x),
            Token::Identifier(s) => return write!(f, "'{}'", s),
            Token::String(s) => return write!(f, "string '{}'", s),
            Token::True => "'true'",
            Token::False => "'false'",
            Token::Null => "'null'",
            Token::Plus => "'+'",
            Token::Minus => "'-'",
            Token::Star => "'*'",
            Token::Slash => "'/'",
            Token::Percent => "'%'",
            Token::Caret => "'^'",
            Token::Bang => "'!'",
            Token::Assign => "'='",
            Token::EqEq => "'=='",
            Token::NotEq => "'!='",
            Token::Less => "'<'",
            Token::Le => "'<='",
            Token::Greater => "'>'",
            Token::Ge => "'>='",
            Token::AndAnd => "'&&'",
            Token::OrOr => "'||'",
            Token::InstanceOf => "'instanceof'",
            Token::Matches => "'matches'",
            Token::Between => "'between'",
            Token::QMark => "'?'",
            Token::Elvis => "'?:'",
            Token::SafeNavigation => "'?.'",
            Token::Dot => "'.'",
            Token::Comma => "','",
            Token::Colon => "':'",
            Token::Hash => "'#'",
            Token::At => "'@'",
            Token::LParen => "'('",
            Token::RParen => "')'",
            Token::LBracket => "'['",
            Token::RBracket => "']'",
            Token::LBrace => "'{'",
            Token::RBrace => "'}'",
            Token::SelectAll => "'?['",
            Token::SelectFirst => "'^['",
            Token::SelectLast => "'$['",
            Token::Project => "'!['",
            Token::Eof => "end of expression",
        };
        f.write_str(s)
    }
}

/// A token together with the byte range it was read from.
#[derive(Debug, Clone, PartialEq)]
pub struct Spanned {
    pub token: Token,
    pub start: usize,
    pub end: usize,
}

#[derive(Clone)]
pub struct Lexer<'a> {
    input: &'a [u8],
    pos: usize,
    last_start: usize,
    last_end: usize,
    after_dot: bool,
}

impl<'a> Lexer<'a> {
    pub fn new(input: &'a str) -> Self {
        Self {
            input: input.as_bytes(),
            pos: 0,
            last_start: 0,
            last_end: 0,
            after_dot: false,
        }
    }

    /// Read the whole input.
    pub fn tokenize(mut self) -> Result<Vec<Spanned>, ParseError> {
        let mut tokens = Vec::new();
        loop {
            let token = self.next_token()?;
            let done = token == Token::Eof;
            tokens.push(Spanned { token, start: self.last_start, end: self.last_end });
            if done {
                return Ok(tokens);
            }
        }
    }

    fn peek(&self) -> Option<u8> {
        self.input.get(self.pos).copied()
    }

    fn peek_at(&self, offset: usize) -> Option<u8> {
        self.input.get(self.pos + offset).copied()
    }

    fn bump(&mut self) -> Option<u8> {
        let b = self.peek()?;
        self.pos += 1;
        Some(b)
    }

    fn skip_ws(&mut self) {
        while matches!(self.peek(), Some(b' ' | b'\t' | b'\n' | b'\r')) {
            self.pos += 1;
        }
    }

    fn text(&self, start: usize, end: usize) -> String {
        String::from_utf8_lossy(&self.input[start..end]).into_owned()
    }

    fn number(&mut self, start: usize) -> Result<Token, ParseError> {
        let first = self.input[start];
        if first == b'0' && matches!(self.peek(), Some(b'x' | b'X')) {
            return self.hex_number(start);
        }
        let mut is_real = false;
        while let Some(c) = self.peek() {
            match c {
                b'0'..=b'9' => self.pos += 1,
                // Only a dot followed by a digit belongs to the literal; `1.foo` is a member access.
                b'.' if !is_real && matches!(self.peek_at(1), Some(b'0'..=b'9')) => {
                    is_real = true;
                    self.pos += 1;
                }
                b'e' | b'E' => {
                    let sign = usize::from(matches!(self.peek_at(1), Some(b'+' | b'-')));
                    if matches!(self.peek_at(1 + sign), Some(b'0'..=b'9')) {
                        is_real = true;
                        self.pos += 1 + sign;
                    } else {
                        break;
                    }
                }
                _ => break,
            }
        }
        let digits = self.text(start, self.pos);
        let invalid = |pos: usize, text: &str| ParseError::new(ParseErrorKind::InvalidNumber(text.to_string()), pos);
        let token = match self.peek() {
            Some(b'L' | b'l') if !is_real => {
                self.pos += 1;
                Token::Long(digits.parse().map_err(|_| invalid(start, &digits))?)
            }
            Some(b'f' | b'F') => {
                self.pos += 1;
                Token::Float(digits.parse().map_err(|_| invalid(start, &digits))?)
            }
            Some(b'd' | b'D') => {
                self.pos += 1;
                Token::Double(digits.parse().map_err(|_| invalid(start, &digits))?)
            }
            _ if is_real => Token::Double(digits.parse().map_err(|_| invalid(start, &digits))?),
            _ => Token::Int(digits.parse().map_err(|_| invalid(start, &digits))?),
        };
        if matches!(self.peek(), Some(b'a'..=b'z' | b'A'..=b'Z' | b'_')) {
            let end = self.pos + 1;
            return Err(invalid(start, &self.text(start, end)));
        }
        Ok(token)
    }

    fn hex_number(&mut self, start: usize) -> Result<Token, ParseError> {
        self.pos += 1; // 'x'
        let digits_start = self.pos;
        while matches!(self.peek(), Some(b'0'..=b'9' | b'a'..=b'f' | b'A'..=b'F')) {
            self.pos += 1;
        }
        let digits = self.text(digits_start, self.pos);
        let invalid = || ParseError::new(ParseErrorKind::InvalidNumber(self.text(start, self.pos)), start);
        if digits.is_empty() {
            return Err(invalid());
        }
        if matches!(self.peek(), Some(b'L' | b'l')) {
            let value = u64::from_str_radix(&digits, 16).map_err(|_| invalid())?;
            self.pos += 1;
            Ok(Token::Long(value as i64))
        } else {
            let value = u32::from_str_radix(&digits, 16).map_err(|_| invalid())?;
            Ok(Token::Int(value as i32))
        }
    }

    fn identifier(&mut self, start: usize) -> Token {
        while matches!(self.peek(), Some(b'a'..=b'z' | b'A'..=b'Z' | b'0'..=b'9' | b'_' | b'$')) {
            self.pos += 1;
        }
        let s = self.text(start, self.pos);
        let lower = s.to_ascii_lowercase();
        match lower.as_str() {
            "true" => return Token::True,
            "false" => return Token::False,
            "null" => return Token::Null,
            _ => {}
        }
        // Textual operators are plain identifiers right after a dot: `a.and` is a property.
        if self.after_dot {
            return Token::Identifier(s);
        }
        match lower.as_str() {
            "and" => Token::AndAnd,
            "or" => Token::OrOr,
            "not" => Token::Bang,
            "eq" => Token::EqEq,
            "ne" => Token::NotEq,
            "lt" => Token::Less,
            "le" => Token::Le,
            "gt" => Token::Greater,
            "ge" => Token::Ge,
            "div" => Token::Slash,
            "mod" => Token::Percent,
            "instanceof" => Token::InstanceOf,
            "matches" => Token::Matches,
            "between" => Token::Between,
            _ => Token::Identifier(s),
        }
    }

    /// Quoted literal; the quote character is escaped by doubling it (`'it''s'`).
    fn string(&mut self, quote: u8, start: usize) -> Result<Token, ParseError> {
        let mut buf: Vec<u8> = Vec::new();
        while let Some(c) = self.bump() {
            if c == quote {
                if self.peek() == Some(quote) {
                    self.pos += 1;
                    buf.push(quote);
                    continue;
                }
                return Ok(Token::String(String::from_utf8_lossy(&buf).into_owned()));
            }
            buf.push(c);
        }
        Err(ParseError::new(ParseErrorKind::UnterminatedString, start))
    }

    pub fn next_token(&mut self) -> Result<Token, ParseError> {
        self.skip_ws();
        let start = self.pos;
        self.last_start = start;
        let ch = match self.bump() {
            Some(c) => c,
            None => {
                self.last_end = start;
                return Ok(Token::Eof);
            }
        };

        let tok = match ch {
            b'0'..=b'9' => self.number(start)?,
            b'$' if self.peek() == Some(b'[') => {
                self.pos += 1;
                Token::SelectLast
            }
            b'a'..=b'z' | b'A'..=b'Z' | b'_' | b'$' => self.identifier(start),
            b'\'' | b'"' => self.string(ch, start)?,
            b'.' => Token::Dot,
            b'+' => Token::Plus,
            b'-' => Token::Minus,
            b'*' => Token::Star,
            b'/' => Token::Slash,
            b'%' => Token::Percent,
            b'^' => {
                if self.peek() == Some(b'[') {
                    self.pos += 1;
                    Token::SelectFirst
                } else {
                    Token::Caret
                }
            }
            b'!' => match self.peek() {
                Some(b'=') => {
                    self.pos += 1;
                    Token::NotEq
                }
                Some(b'[') => {
                    self.pos += 1;
                    Token::Project
                }
                _ => Token::Bang,
            },
            b'?' => match self.peek() {
                Some(b'.') if !matches!(self.peek_at(1), Some(b'0'..=b'9')) => {
                    self.pos += 1;
                    Token::SafeNavigation
                }
                Some(b':') => {
                    self.pos += 1;
                    Token::Elvis
                }
                Some(b'[') => {
                    self.pos += 1;
                    Token::SelectAll
                }
                _ => Token::QMark,
            },
            b'=' => {
                if self.peek() == Some(b'=') {
                    self.pos += 1;
                    Token::EqEq
                } else {
                    Token::Assign
                }
            }
            b'<' => {
                if self.peek() == Some(b'=') {
                    self.pos += 1;
                    Token::Le
                } else {
                    Token::Less
                }
            }
            b'>' => {
                if self.peek() == Some(b'=') {
                    self.pos += 1;
                    Token::Ge
                } else {
                    Token::Greater
                }
            }
            b'&' if self.peek() == Some(b'&') => {
                self.pos += 1;
                Token::AndAnd
            }
            b'|' if self.peek() == Some(b'|') => {
                self.pos += 1;
                Token::OrOr
            }
            b',' => Token::Comma,
            b':' => Token::Colon,
            b'#' => Token::Hash,
            b'@' => Token::At,
            b'(' => Token::LParen,
            b')' => Token::RParen,
            b'[' => Token::LBracket,
            b']' => Token::RBracket,
            b'{' => Token::LBrace,
            b'}' => Token::RBrace,
            _ => {
                let c = std::str::from_utf8(&self.input[start..])
                    .ok()
                    .and_then(|s| s.chars().next())
                    .unwrap_or(ch as char);
                return Err(ParseError::new(ParseErrorKind::UnexpectedCharacter(c), start));
            }
        };
        self.last_end = self.pos;
        self.after_dot = matches!(tok, Token::Dot | Token::SafeNavigation);
        Ok(tok)
    }

    pub fn last_start(&self) -> usize {
        self.last_start
    }

    pub fn last_end(&self) -> usize {
        self.last_end
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tokens(input: &str) -> Vec<Token> {
        Lexer::new(input).tokenize().unwrap().into_iter().map(|s| s.token).collect()
    }

    #[test]
    fn numeric_literals() {
        assert_eq!(
            tokens("42 42L 1.5 2e3 1.5f 0x1F 7d"),
            vec![
                Token::Int(42),
                Token::Long(42),
                Token::Double(1.5),
                Token::Double(2000.0),
                Token::Float(1.5),
                Token::Int(31),
                Token::Double(7.0),
                Token::Eof
            ]
        );
    }

    #[test]
    fn int_overflow_is_rejected() {
        let err = Lexer::new("3000000000").tokenize().unwrap_err();
        assert!(matches!(err.kind, ParseErrorKind::InvalidNumber(_)));
        assert_eq!(tokens("3000000000L"), vec![Token::Long(3_000_000_000), Token::Eof]);
    }

    #[test]
    fn strings_escape_by_doubling() {
        assert_eq!(tokens("'it''s'"), vec![Token::String("it's".into()), Token::Eof]);
        assert_eq!(tokens("\"say \"\"hi\"\"\""), vec![Token::String("say \"hi\"".into()), Token::Eof]);
        let err = Lexer::new("'open").tokenize().unwrap_err();
        assert_eq!(err.kind, ParseErrorKind::UnterminatedString);
        assert_eq!(err.position, 0);
    }

    #[test]
    fn navigation_and_collection_operators() {
        assert_eq!(
            tokens("a?.b.?[x].![y].^[z].$[w]?:c"),
            vec![
                Token::Identifier("a".into()),
                Token::SafeNavigation,
                Token::Identifier("b".into()),
                Token::Dot,
                Token::SelectAll,
                Token::Identifier("x".into()),
                Token::RBracket,
                Token::Dot,
                Token::Project,
                Token::Identifier("y".into()),
                Token::RBracket,
                Token::Dot,
                Token::SelectFirst,
                Token::Identifier("z".into()),
                Token::RBracket,
                Token::Dot,
                Token::SelectLast,
                Token::Identifier("w".into()),
                Token::RBracket,
                Token::Elvis,
                Token::Identifier("c".into()),
                Token::Eof
            ]
        );
    }

    #[test]
    fn textual_operators_except_after_dot() {
        assert_eq!(
            tokens("a and b.or"),
            vec![
                Token::Identifier("a".into()),
                Token::AndAnd,
                Token::Identifier("b".into()),
                Token::Dot,
                Token::Identifier("or".into()),
                Token::Eof
            ]
        );
    }

    #[test]
    fn spans_track_offsets() {
        let spanned = Lexer::new("ab >= 'c'").tokenize().unwrap();
        assert_eq!((spanned[0].start, spanned[0].end), (0, 2));
        assert_eq!((spanned[1].start, spanned[1].end), (3, 5));
        assert_eq!((spanned[2].start, spanned[2].end), (6, 9));
    }

    #[test]
    fn unexpected_character_reports_position() {
        let err = Lexer::new("1 ~ 2").tokenize().unwrap_err();
        assert_eq!(err.kind, ParseErrorKind::UnexpectedCharacter('~'));
        assert_eq!(err.position, 2);
    }
}
