//! Templates: literal text with embedded, delimited expressions.
//!
//! `"Hello #{name}, you have #{items.size()} items"` splits into literal
//! and expression fragments. Brackets and quotes inside a fragment are
//! balanced, so `#{ {1, 2}.size() }` and `#{ 'a}' }` close at the right
//! suffix.

use tracing::trace;

use crate::ast::{Fragment, Node, NodeKind, Span};
use crate::config::{ParserConfig, TemplateParserContext};
use crate::error::{ParseError, ParseErrorKind};
use crate::parser::Parser;

pub fn parse_template(
    text: &str,
    context: &TemplateParserContext,
    config: &ParserConfig,
) -> Result<Node, ParseError> {
    trace!(length = text.len(), prefix = %context.prefix, "parsing template");
    let length = text.chars().count();
    if length > config.max_expression_length {
        return Err(ParseError::new(
            ParseErrorKind::ExpressionTooLong { length, max: config.max_expression_length },
            0,
        ));
    }

    let (prefix, suffix) = (context.prefix.as_str(), context.suffix.as_str());
    let mut fragments = Vec::new();
    let mut literal = String::new();
    let mut cursor = 0;

    if !prefix.is_empty() && !suffix.is_empty() {
        while let Some(found) = text[cursor..].find(prefix) {
            let open = cursor + found;
            literal.push_str(&text[cursor..open]);
            let body_start = open + prefix.len();
            let close = find_suffix(text, body_start, suffix).ok_or_else(|| {
                ParseError::new(ParseErrorKind::UnterminatedTemplate { prefix: prefix.to_string() }, open)
                    .expected(suffix)
            })?;
            let body = &text[body_start..close];
            if body.trim().is_empty() {
                return Err(ParseError::new(ParseErrorKind::EmptyTemplateFragment, open));
            }
            if !literal.is_empty() {
                fragments.push(Fragment::Literal(std::mem::take(&mut literal)));
            }
            fragments.push(Fragment::Expression(Parser::new(body, body_start)?.parse()?));
            cursor = close + suffix.len();
        }
    }
    literal.push_str(&text[cursor..]);
    if !literal.is_empty() {
        fragments.push(Fragment::Literal(literal));
    }
    Ok(Node::new(Span::new(0, text.len()), NodeKind::Template(fragments)))
}

/// Byte offset of the suffix closing the fragment that starts at `from`.
fn find_suffix(text: &str, from: usize, suffix: &str) -> Option<usize> {
    let mut depth = 0usize;
    let mut quote: Option<char> = None;
    for (i, c) in text[from..].char_indices() {
        let at = from + i;
        if let Some(q) = quote {
            if c == q {
                quote = None;
            }
            continue;
        }
        if depth == 0 && text[at..].starts_with(suffix) {
            return Some(at);
        }
        match c {
            '\'' | '"' => quote = Some(c),
            '(' | '[' | '{' => depth += 1,
            ')' | ']' | '}' => depth = depth.saturating_sub(1),
            _ => {}
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(text: &str) -> Result<Node, ParseError> {
        parse_template(text, &TemplateParserContext::default(), &ParserConfig::default())
    }

    fn fragments(node: &Node) -> Vec<String> {
        match &node.kind {
            NodeKind::Template(fragments) => fragments
                .iter()
                .map(|f| match f {
                    Fragment::Literal(text) => format!("lit:{}", text),
                    Fragment::Expression(node) => format!("expr:{}", node),
                })
                .collect(),
            other => panic!("not a template: {:?}", other),
        }
    }

    #[test]
    fn splits_literal_and_expression_fragments() {
        let node = parse("Hello #{name}, #{items.size()} items").unwrap();
        assert_eq!(
            fragments(&node),
            vec!["lit:Hello ", "expr:name", "lit:, ", "expr:items.size()", "lit: items"]
        );
    }

    #[test]
    fn balances_braces_and_quotes() {
        let node = parse("#{ {1, 2}.size() } and #{ 'a}' }").unwrap();
        assert_eq!(fragments(&node), vec!["expr:{1,2}.size()", "lit: and ", "expr:'a}'"]);
    }

    #[test]
    fn plain_text_is_one_literal() {
        assert_eq!(fragments(&parse("no fragments here").unwrap()), vec!["lit:no fragments here"]);
        assert!(fragments(&parse("").unwrap()).is_empty());
    }

    #[test]
    fn custom_delimiters() {
        let node = parse_template("a ${x} b #{y}", &TemplateParserContext::dollar(), &ParserConfig::default()).unwrap();
        assert_eq!(fragments(&node), vec!["lit:a ", "expr:x", "lit: b #{y}"]);
    }

    #[test]
    fn malformed_fragments() {
        let err = parse("abc #{name").unwrap_err();
        assert_eq!(err.kind, ParseErrorKind::UnterminatedTemplate { prefix: "#{".to_string() });
        assert_eq!(err.position, 4);

        let err = parse("x #{  } y").unwrap_err();
        assert_eq!(err.kind, ParseErrorKind::EmptyTemplateFragment);

        // Positions inside a fragment are offsets into the whole template.
        let err = parse("ab #{1 +} c").unwrap_err();
        assert_eq!(err.position, 8);
    }
}
