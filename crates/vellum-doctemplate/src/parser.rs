/*
 * parser.rs
 * Copyright (c) 2025 Posit, PBC
 */

//! Expression parser.
//!
//! A hand-written tokenizer and recursive-descent parser for directive
//! expressions. Precedence, lowest to highest: logical-or, logical-and,
//! equality/relational comparison, unary negation, primary (literal, path,
//! function call, parenthesized expression).
//!
//! Function-call syntax binds a receiver path to a call: `items:sum('amt')`
//! resolves `items` first and passes it as the implicit first argument.
//! Whether the name is registered is checked at evaluation time, not here: a
//! call to an unregistered function is syntactically indistinguishable from
//! a valid one.

use crate::ast::{BinaryOp, Call, Expr, Literal, PathRef, UnaryOp};
use crate::error::{TemplateError, TemplateResult};

/// Parse a directive expression into an expression tree.
pub fn parse(text: &str) -> TemplateResult<Expr> {
    let tokens = tokenize(text)?;
    let mut parser = Parser {
        source: text,
        tokens,
        pos: 0,
    };
    let expr = parser.expression()?;
    parser.expect_end()?;
    Ok(expr)
}

#[derive(Debug, Clone, PartialEq)]
enum Token {
    Ident(String),
    Number(f64),
    Str(String),
    EqEq,
    Ne,
    Le,
    Ge,
    Lt,
    Gt,
    AndAnd,
    OrOr,
    Bang,
    LParen,
    RParen,
    Comma,
    Dot,
    Colon,
}

impl Token {
    fn describe(&self) -> String {
        match self {
            Token::Ident(name) => format!("`{name}`"),
            Token::Number(n) => format!("`{n}`"),
            Token::Str(_) => "string literal".to_string(),
            Token::EqEq => "`==`".to_string(),
            Token::Ne => "`!=`".to_string(),
            Token::Le => "`<=`".to_string(),
            Token::Ge => "`>=`".to_string(),
            Token::Lt => "`<`".to_string(),
            Token::Gt => "`>`".to_string(),
            Token::AndAnd => "`&&`".to_string(),
            Token::OrOr => "`||`".to_string(),
            Token::Bang => "`!`".to_string(),
            Token::LParen => "`(`".to_string(),
            Token::RParen => "`)`".to_string(),
            Token::Comma => "`,`".to_string(),
            Token::Dot => "`.`".to_string(),
            Token::Colon => "`:`".to_string(),
        }
    }
}

fn parse_error(
    source: &str,
    offset: usize,
    expected: impl Into<String>,
    found: impl Into<String>,
) -> TemplateError {
    TemplateError::Parse {
        directive: source.to_string(),
        offset,
        expected: expected.into(),
        found: found.into(),
    }
}

/// Tokenize an expression, recording the byte offset of each token.
fn tokenize(source: &str) -> TemplateResult<Vec<(Token, usize)>> {
    let bytes = source.as_bytes();
    let mut tokens = Vec::new();
    let mut pos = 0;

    while pos < bytes.len() {
        let start = pos;
        match bytes[pos] {
            b' ' | b'\t' | b'\r' | b'\n' => pos += 1,
            b'(' => {
                tokens.push((Token::LParen, start));
                pos += 1;
            }
            b')' => {
                tokens.push((Token::RParen, start));
                pos += 1;
            }
            b',' => {
                tokens.push((Token::Comma, start));
                pos += 1;
            }
            b'.' => {
                tokens.push((Token::Dot, start));
                pos += 1;
            }
            b':' => {
                tokens.push((Token::Colon, start));
                pos += 1;
            }
            b'=' => {
                if bytes.get(pos + 1) == Some(&b'=') {
                    tokens.push((Token::EqEq, start));
                    pos += 2;
                } else {
                    return Err(parse_error(source, start, "`==`", "`=`"));
                }
            }
            b'!' => {
                if bytes.get(pos + 1) == Some(&b'=') {
                    tokens.push((Token::Ne, start));
                    pos += 2;
                } else {
                    tokens.push((Token::Bang, start));
                    pos += 1;
                }
            }
            b'<' => {
                if bytes.get(pos + 1) == Some(&b'=') {
                    tokens.push((Token::Le, start));
                    pos += 2;
                } else {
                    tokens.push((Token::Lt, start));
                    pos += 1;
                }
            }
            b'>' => {
                if bytes.get(pos + 1) == Some(&b'=') {
                    tokens.push((Token::Ge, start));
                    pos += 2;
                } else {
                    tokens.push((Token::Gt, start));
                    pos += 1;
                }
            }
            b'&' => {
                if bytes.get(pos + 1) == Some(&b'&') {
                    tokens.push((Token::AndAnd, start));
                    pos += 2;
                } else {
                    return Err(parse_error(source, start, "`&&`", "`&`"));
                }
            }
            b'|' => {
                if bytes.get(pos + 1) == Some(&b'|') {
                    tokens.push((Token::OrOr, start));
                    pos += 2;
                } else {
                    return Err(parse_error(source, start, "`||`", "`|`"));
                }
            }
            quote @ (b'\'' | b'"') => {
                let (value, end) = lex_string(source, pos, quote)?;
                tokens.push((Token::Str(value), start));
                pos = end;
            }
            b'0'..=b'9' => {
                let (value, end) = lex_number(source, pos)?;
                tokens.push((Token::Number(value), start));
                pos = end;
            }
            c if c == b'_' || c.is_ascii_alphabetic() => {
                let mut end = pos + 1;
                while end < bytes.len()
                    && (bytes[end] == b'_' || bytes[end].is_ascii_alphanumeric())
                {
                    end += 1;
                }
                tokens.push((Token::Ident(source[pos..end].to_string()), start));
                pos = end;
            }
            other => {
                return Err(parse_error(
                    source,
                    start,
                    "expression token",
                    format!("`{}`", other as char),
                ));
            }
        }
    }

    Ok(tokens)
}

/// Lex a quoted string literal starting at `start`. Supports `\` escapes for
/// the quote character and backslash itself.
fn lex_string(source: &str, start: usize, quote: u8) -> TemplateResult<(String, usize)> {
    let bytes = source.as_bytes();
    let mut value = String::new();
    let mut pos = start + 1;

    while pos < bytes.len() {
        match bytes[pos] {
            b'\\' if pos + 1 < bytes.len() => {
                value.push(bytes[pos + 1] as char);
                pos += 2;
            }
            c if c == quote => return Ok((value, pos + 1)),
            _ => {
                // Copy a whole UTF-8 character, not a byte.
                let ch = source[pos..].chars().next().expect("in-bounds char");
                value.push(ch);
                pos += ch.len_utf8();
            }
        }
    }

    Err(parse_error(
        source,
        start,
        "closing quote",
        "end of input",
    ))
}

fn lex_number(source: &str, start: usize) -> TemplateResult<(f64, usize)> {
    let bytes = source.as_bytes();
    let mut end = start;
    while end < bytes.len() && bytes[end].is_ascii_digit() {
        end += 1;
    }
    if end < bytes.len() && bytes[end] == b'.' && bytes.get(end + 1).is_some_and(u8::is_ascii_digit)
    {
        end += 1;
        while end < bytes.len() && bytes[end].is_ascii_digit() {
            end += 1;
        }
    }
    let value = source[start..end]
        .parse::<f64>()
        .map_err(|_| parse_error(source, start, "number", &source[start..end]))?;
    Ok((value, end))
}

struct Parser<'a> {
    source: &'a str,
    tokens: Vec<(Token, usize)>,
    pos: usize,
}

impl Parser<'_> {
    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos).map(|(t, _)| t)
    }

    fn advance(&mut self) -> Option<&Token> {
        let token = self.tokens.get(self.pos).map(|(t, _)| t);
        if token.is_some() {
            self.pos += 1;
        }
        token
    }

    fn offset(&self) -> usize {
        self.tokens
            .get(self.pos)
            .map(|(_, o)| *o)
            .unwrap_or(self.source.len())
    }

    fn error_here(&self, expected: impl Into<String>) -> TemplateError {
        let found = self
            .tokens
            .get(self.pos)
            .map(|(t, _)| t.describe())
            .unwrap_or_else(|| "end of input".to_string());
        parse_error(self.source, self.offset(), expected, found)
    }

    fn expect_end(&self) -> TemplateResult<()> {
        if self.pos < self.tokens.len() {
            return Err(self.error_here("end of expression"));
        }
        Ok(())
    }

    fn expression(&mut self) -> TemplateResult<Expr> {
        self.logical_or()
    }

    fn logical_or(&mut self) -> TemplateResult<Expr> {
        let mut lhs = self.logical_and()?;
        while self.peek() == Some(&Token::OrOr) {
            self.advance();
            let rhs = self.logical_and()?;
            lhs = Expr::Binary {
                op: BinaryOp::Or,
                lhs: Box::new(lhs),
                rhs: Box::new(rhs),
            };
        }
        Ok(lhs)
    }

    fn logical_and(&mut self) -> TemplateResult<Expr> {
        let mut lhs = self.comparison()?;
        while self.peek() == Some(&Token::AndAnd) {
            self.advance();
            let rhs = self.comparison()?;
            lhs = Expr::Binary {
                op: BinaryOp::And,
                lhs: Box::new(lhs),
                rhs: Box::new(rhs),
            };
        }
        Ok(lhs)
    }

    fn comparison(&mut self) -> TemplateResult<Expr> {
        let mut lhs = self.unary()?;
        loop {
            let op = match self.peek() {
                Some(Token::EqEq) => BinaryOp::Eq,
                Some(Token::Ne) => BinaryOp::Ne,
                Some(Token::Le) => BinaryOp::Le,
                Some(Token::Ge) => BinaryOp::Ge,
                Some(Token::Lt) => BinaryOp::Lt,
                Some(Token::Gt) => BinaryOp::Gt,
                _ => break,
            };
            self.advance();
            let rhs = self.unary()?;
            lhs = Expr::Binary {
                op,
                lhs: Box::new(lhs),
                rhs: Box::new(rhs),
            };
        }
        Ok(lhs)
    }

    fn unary(&mut self) -> TemplateResult<Expr> {
        if self.peek() == Some(&Token::Bang) {
            self.advance();
            let operand = self.unary()?;
            return Ok(Expr::Unary {
                op: UnaryOp::Not,
                operand: Box::new(operand),
            });
        }
        self.primary()
    }

    fn primary(&mut self) -> TemplateResult<Expr> {
        match self.peek() {
            Some(Token::LParen) => {
                self.advance();
                let inner = self.expression()?;
                if self.peek() != Some(&Token::RParen) {
                    return Err(self.error_here("`)`"));
                }
                self.advance();
                Ok(inner)
            }
            Some(Token::Str(_)) => {
                let Some(Token::Str(value)) = self.advance().cloned() else {
                    unreachable!()
                };
                Ok(Expr::Literal(Literal::String(value)))
            }
            Some(Token::Number(_)) => {
                let Some(Token::Number(value)) = self.advance().cloned() else {
                    unreachable!()
                };
                Ok(Expr::Literal(Literal::Number(value)))
            }
            Some(Token::Ident(name)) if name == "true" => {
                self.advance();
                Ok(Expr::Literal(Literal::Bool(true)))
            }
            Some(Token::Ident(name)) if name == "false" => {
                self.advance();
                Ok(Expr::Literal(Literal::Bool(false)))
            }
            Some(Token::Ident(_)) => self.path_or_call(),
            _ => Err(self.error_here("literal, path, or `(`")),
        }
    }

    /// A path, optionally followed by `:name(args)` turning it into a call.
    fn path_or_call(&mut self) -> TemplateResult<Expr> {
        let mut segments = vec![self.ident("path segment")?];
        while self.peek() == Some(&Token::Dot) {
            self.advance();
            segments.push(self.ident("path segment")?);
        }
        let path = PathRef::new(segments);

        if self.peek() != Some(&Token::Colon) {
            return Ok(Expr::Path(path));
        }
        self.advance();

        let name = self.ident("function name")?;
        if self.peek() != Some(&Token::LParen) {
            return Err(self.error_here("`(`"));
        }
        self.advance();

        let mut args = Vec::new();
        if self.peek() != Some(&Token::RParen) {
            loop {
                args.push(self.expression()?);
                match self.peek() {
                    Some(Token::Comma) => {
                        self.advance();
                    }
                    Some(Token::RParen) => break,
                    _ => return Err(self.error_here("`,` or `)`")),
                }
            }
        }
        self.advance(); // consume `)`

        Ok(Expr::Call(Call {
            receiver: path,
            name,
            args,
        }))
    }

    fn ident(&mut self, expected: &str) -> TemplateResult<String> {
        match self.peek() {
            Some(Token::Ident(_)) => {
                let Some(Token::Ident(name)) = self.advance().cloned() else {
                    unreachable!()
                };
                Ok(name)
            }
            _ => Err(self.error_here(expected)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn path(segments: &[&str]) -> Expr {
        Expr::Path(PathRef::new(segments.iter().map(|s| s.to_string()).collect()))
    }

    #[test]
    fn test_parse_path() {
        assert_eq!(parse("customer.name").unwrap(), path(&["customer", "name"]));
        assert_eq!(parse("this.type").unwrap(), path(&["this", "type"]));
    }

    #[test]
    fn test_parse_literals() {
        assert_eq!(
            parse("'Individual'").unwrap(),
            Expr::Literal(Literal::String("Individual".to_string()))
        );
        assert_eq!(
            parse("\"quoted\"").unwrap(),
            Expr::Literal(Literal::String("quoted".to_string()))
        );
        assert_eq!(parse("42").unwrap(), Expr::Literal(Literal::Number(42.0)));
        assert_eq!(parse("3.25").unwrap(), Expr::Literal(Literal::Number(3.25)));
        assert_eq!(parse("true").unwrap(), Expr::Literal(Literal::Bool(true)));
        assert_eq!(parse("false").unwrap(), Expr::Literal(Literal::Bool(false)));
    }

    #[test]
    fn test_string_escapes() {
        assert_eq!(
            parse(r"'it\'s'").unwrap(),
            Expr::Literal(Literal::String("it's".to_string()))
        );
        assert_eq!(
            parse(r"'a\\b'").unwrap(),
            Expr::Literal(Literal::String(r"a\b".to_string()))
        );
    }

    #[test]
    fn test_precedence() {
        // a == b && c == d  parses as  (a == b) && (c == d)
        let expr = parse("a == b && c == d").unwrap();
        let Expr::Binary {
            op: BinaryOp::And,
            lhs,
            rhs,
        } = expr
        else {
            panic!("expected `&&` at the root, got {expr:?}");
        };
        assert!(matches!(
            *lhs,
            Expr::Binary {
                op: BinaryOp::Eq,
                ..
            }
        ));
        assert!(matches!(
            *rhs,
            Expr::Binary {
                op: BinaryOp::Eq,
                ..
            }
        ));
    }

    #[test]
    fn test_or_binds_loosest() {
        let expr = parse("a && b || c").unwrap();
        assert!(matches!(
            expr,
            Expr::Binary {
                op: BinaryOp::Or,
                ..
            }
        ));
    }

    #[test]
    fn test_unary_not() {
        let expr = parse("!archived").unwrap();
        let Expr::Unary {
            op: UnaryOp::Not,
            operand,
        } = expr
        else {
            panic!("expected unary not");
        };
        assert_eq!(*operand, path(&["archived"]));
    }

    #[test]
    fn test_parenthesized() {
        let expr = parse("(a || b) && c").unwrap();
        assert!(matches!(
            expr,
            Expr::Binary {
                op: BinaryOp::And,
                ..
            }
        ));
    }

    #[test]
    fn test_function_call() {
        let expr = parse("items:sum('amount')").unwrap();
        assert_eq!(
            expr,
            Expr::Call(Call {
                receiver: PathRef::new(vec!["items".to_string()]),
                name: "sum".to_string(),
                args: vec![Expr::Literal(Literal::String("amount".to_string()))],
            })
        );
    }

    #[test]
    fn test_function_call_multiple_args() {
        let expr = parse("rows:filter('type', 'Land')").unwrap();
        let Expr::Call(call) = expr else {
            panic!("expected a call");
        };
        assert_eq!(call.name, "filter");
        assert_eq!(call.args.len(), 2);
    }

    #[test]
    fn test_function_call_no_args() {
        let expr = parse("items:count()").unwrap();
        let Expr::Call(call) = expr else {
            panic!("expected a call");
        };
        assert_eq!(call.name, "count");
        assert!(call.args.is_empty());
    }

    #[test]
    fn test_dotted_receiver() {
        let expr = parse("loan.payments:sum('amount')").unwrap();
        let Expr::Call(call) = expr else {
            panic!("expected a call");
        };
        assert_eq!(call.receiver.segments, vec!["loan", "payments"]);
    }

    #[test]
    fn test_unbalanced_parens() {
        let err = parse("(a == b").unwrap_err();
        assert!(matches!(err, TemplateError::Parse { .. }));
        let TemplateError::Parse { expected, .. } = err else {
            unreachable!()
        };
        assert_eq!(expected, "`)`");
    }

    #[test]
    fn test_unterminated_string() {
        let err = parse("'open").unwrap_err();
        let TemplateError::Parse {
            expected, offset, ..
        } = err
        else {
            panic!("expected parse error");
        };
        assert_eq!(expected, "closing quote");
        assert_eq!(offset, 0);
    }

    #[test]
    fn test_unknown_operator() {
        let err = parse("a = b").unwrap_err();
        let TemplateError::Parse { expected, .. } = err else {
            panic!("expected parse error");
        };
        assert_eq!(expected, "`==`");
    }

    #[test]
    fn test_trailing_tokens_rejected() {
        let err = parse("a b").unwrap_err();
        let TemplateError::Parse { expected, .. } = err else {
            panic!("expected parse error");
        };
        assert_eq!(expected, "end of expression");
    }

    #[test]
    fn test_error_offset_points_at_failure() {
        let err = parse("a && &").unwrap_err();
        let TemplateError::Parse { offset, .. } = err else {
            panic!("expected parse error");
        };
        assert_eq!(offset, 5);
    }

    #[test]
    fn test_parse_is_pure() {
        let a = parse("this.collateralOwner.type == 'Individual'").unwrap();
        let b = parse("this.collateralOwner.type == 'Individual'").unwrap();
        assert_eq!(a, b);
    }
}
