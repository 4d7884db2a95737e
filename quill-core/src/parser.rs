//! Recursive-descent parser for quill scripts.
//!
//! Parsing never stops at the first problem: a malformed item is reported
//! and skipped up to the next `;`, so one pass yields every syntax error.

use crate::ast::{BinaryOp, Directive, Expr, ExprKind, Ident, Item, Script};
use crate::diagnostic::Diagnostic;
use crate::lexer::{Token, TokenKind, lex};
use crate::span::Span;

#[derive(Debug)]
pub struct ParseResult {
    pub script: Script,
    pub diagnostics: Vec<Diagnostic>,
}

pub fn parse(source: &str) -> ParseResult {
    let lexed = lex(source);
    let mut parser = Parser {
        source,
        tokens: lexed.tokens,
        position: 0,
        diagnostics: lexed.diagnostics,
    };
    let script = parser.parse_script();
    ParseResult {
        script,
        diagnostics: parser.diagnostics,
    }
}

/// Marker for a parse failure that has already been reported.
struct Reported;

type PResult<T> = Result<T, Reported>;

struct Parser<'src> {
    source: &'src str,
    tokens: Vec<Token>,
    position: usize,
    diagnostics: Vec<Diagnostic>,
}

impl<'src> Parser<'src> {
    fn parse_script(&mut self) -> Script {
        let mut script = Script::default();

        while self.peek().kind == TokenKind::Directive {
            if let Ok(directive) = self.parse_directive() {
                script.directives.push(directive);
            }
        }

        while self.peek().kind != TokenKind::Eof {
            if self.peek().kind == TokenKind::Directive {
                let token = self.advance();
                self.error(
                    "QS1012",
                    "directives must appear before any statement",
                    token.span,
                );
                self.synchronize();
                continue;
            }
            match self.parse_item() {
                Ok(item) => script.items.push(item),
                Err(Reported) => self.synchronize(),
            }
        }

        script
    }

    fn parse_directive(&mut self) -> PResult<Directive> {
        let token = self.advance();
        match token.text(self.source) {
            "#r" => {
                let path = self.expect(TokenKind::StringLiteral, "a quoted path after #r")?;
                let text = path.text(self.source);
                Ok(Directive::Reference {
                    path: text[1..text.len() - 1].to_string(),
                    span: token.span.join(path.span),
                })
            }
            other => {
                self.error(
                    "QS1013",
                    format!("unsupported directive '{other}'"),
                    token.span,
                );
                self.synchronize_line(token.span.end);
                Err(Reported)
            }
        }
    }

    fn parse_item(&mut self) -> PResult<Item> {
        match self.peek().kind {
            TokenKind::Int => {
                self.advance();
                let name = self.parse_ident("a variable name")?;
                self.expect(TokenKind::Equal, "'='")?;
                let value = self.parse_expr()?;
                self.expect(TokenKind::Semi, "';'")?;
                Ok(Item::Declare { name, value })
            }
            TokenKind::Ident if self.peek_at(1).kind == TokenKind::Equal => {
                let name = self.parse_ident("a variable name")?;
                self.advance(); // '='
                let value = self.parse_expr()?;
                self.expect(TokenKind::Semi, "';'")?;
                Ok(Item::Assign { name, value })
            }
            _ => {
                let expr = self.parse_expr()?;
                match self.peek().kind {
                    TokenKind::Semi => {
                        self.advance();
                        Ok(Item::Expr {
                            expr,
                            terminated: true,
                        })
                    }
                    TokenKind::Eof => Ok(Item::Expr {
                        expr,
                        terminated: false,
                    }),
                    _ => {
                        let span = self.peek().span;
                        self.error("QS1010", "expected ';'", span);
                        Err(Reported)
                    }
                }
            }
        }
    }

    fn parse_expr(&mut self) -> PResult<Expr> {
        let mut lhs = self.parse_term()?;
        loop {
            let op = match self.peek().kind {
                TokenKind::Plus => BinaryOp::Add,
                TokenKind::Minus => BinaryOp::Sub,
                _ => return Ok(lhs),
            };
            self.advance();
            let rhs = self.parse_term()?;
            lhs = binary(op, lhs, rhs);
        }
    }

    fn parse_term(&mut self) -> PResult<Expr> {
        let mut lhs = self.parse_unary()?;
        loop {
            let op = match self.peek().kind {
                TokenKind::Star => BinaryOp::Mul,
                TokenKind::Slash => BinaryOp::Div,
                TokenKind::Percent => BinaryOp::Rem,
                _ => return Ok(lhs),
            };
            self.advance();
            let rhs = self.parse_unary()?;
            lhs = binary(op, lhs, rhs);
        }
    }

    fn parse_unary(&mut self) -> PResult<Expr> {
        if self.peek().kind != TokenKind::Minus {
            return self.parse_primary();
        }
        let minus = self.advance();
        // `-2147483648` is only representable when the sign is folded in.
        if self.peek().kind == TokenKind::IntLiteral {
            let literal = self.peek();
            if digits(literal.text(self.source)) == "2147483648" {
                self.advance();
                return Ok(Expr {
                    kind: ExprKind::Int(i32::MIN),
                    span: minus.span.join(literal.span),
                });
            }
        }
        let operand = self.parse_unary()?;
        Ok(Expr {
            span: minus.span.join(operand.span),
            kind: ExprKind::Neg(Box::new(operand)),
        })
    }

    fn parse_primary(&mut self) -> PResult<Expr> {
        let token = self.peek();
        match token.kind {
            TokenKind::IntLiteral => {
                self.advance();
                let text = digits(token.text(self.source));
                match text.parse::<i32>() {
                    Ok(value) => Ok(Expr {
                        kind: ExprKind::Int(value),
                        span: token.span,
                    }),
                    Err(_) => {
                        self.error(
                            "QS1003",
                            format!("integer literal {text} does not fit in int"),
                            token.span,
                        );
                        Err(Reported)
                    }
                }
            }
            TokenKind::LParen => {
                self.advance();
                let inner = self.parse_expr()?;
                let close = self.expect(TokenKind::RParen, "')'")?;
                Ok(Expr {
                    kind: inner.kind,
                    span: token.span.join(close.span),
                })
            }
            TokenKind::Ident => self.parse_name_or_call(),
            _ => {
                self.error("QS1011", "expected expression", token.span);
                Err(Reported)
            }
        }
    }

    fn parse_name_or_call(&mut self) -> PResult<Expr> {
        let mut path = vec![self.parse_ident("a name")?];
        while self.peek().kind == TokenKind::Dot {
            self.advance();
            path.push(self.parse_ident("a name after '.'")?);
        }

        if self.peek().kind != TokenKind::LParen {
            if path.len() == 1 {
                let ident = path.remove(0);
                return Ok(Expr {
                    kind: ExprKind::Name(ident.name),
                    span: ident.span,
                });
            }
            let span = self.peek().span;
            self.error("QS1010", "expected '(' after a qualified name", span);
            return Err(Reported);
        }

        self.advance(); // '('
        let mut args = Vec::new();
        if self.peek().kind != TokenKind::RParen {
            loop {
                args.push(self.parse_expr()?);
                if self.peek().kind == TokenKind::Comma {
                    self.advance();
                } else {
                    break;
                }
            }
        }
        let close = self.expect(TokenKind::RParen, "')'")?;
        Ok(Expr {
            span: path[0].span.join(close.span),
            kind: ExprKind::Call { path, args },
        })
    }

    fn parse_ident(&mut self, what: &str) -> PResult<Ident> {
        let token = self.expect(TokenKind::Ident, what)?;
        Ok(Ident {
            name: token.text(self.source).to_string(),
            span: token.span,
        })
    }

    fn expect(&mut self, kind: TokenKind, what: &str) -> PResult<Token> {
        let token = self.peek();
        if token.kind == kind {
            self.advance();
            return Ok(token);
        }
        if token.kind == TokenKind::Eof {
            self.error("QS1011", format!("expected {what} before end of input"), token.span);
        } else {
            self.error("QS1010", format!("expected {what}"), token.span);
        }
        Err(Reported)
    }

    fn peek(&self) -> Token {
        self.peek_at(0)
    }

    fn peek_at(&self, offset: usize) -> Token {
        let index = (self.position + offset).min(self.tokens.len() - 1);
        self.tokens[index]
    }

    fn advance(&mut self) -> Token {
        let token = self.peek();
        if self.position < self.tokens.len() - 1 {
            self.position += 1;
        }
        token
    }

    /// Skip past the next `;`, or to end of input.
    fn synchronize(&mut self) {
        loop {
            match self.advance().kind {
                TokenKind::Semi | TokenKind::Eof => return,
                _ => {}
            }
        }
    }

    /// Skip the rest of a directive's line.
    fn synchronize_line(&mut self, from: u32) {
        let line_end = self.source[from as usize..]
            .find('\n')
            .map_or(self.source.len(), |offset| from as usize + offset);
        while self.peek().kind != TokenKind::Eof && (self.peek().span.start as usize) < line_end {
            self.advance();
        }
    }

    fn error(&mut self, code: &'static str, message: impl Into<String>, span: Span) {
        self.diagnostics.push(Diagnostic::error(code, message, span));
    }
}

fn binary(op: BinaryOp, lhs: Expr, rhs: Expr) -> Expr {
    Expr {
        span: lhs.span.join(rhs.span),
        kind: ExprKind::Binary {
            op,
            lhs: Box::new(lhs),
            rhs: Box::new(rhs),
        },
    }
}

/// Literal text without `_` separators.
fn digits(text: &str) -> String {
    text.chars().filter(|ch| *ch != '_').collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse_ok(source: &str) -> Script {
        let result = parse(source);
        assert!(
            result.diagnostics.is_empty(),
            "unexpected diagnostics: {:?}",
            result.diagnostics
        );
        result.script
    }

    #[test]
    fn parses_trailing_expression() {
        let script = parse_ok("1+1");
        let value = script.trailing_value().expect("trailing value");
        assert!(matches!(
            value.kind,
            ExprKind::Binary {
                op: BinaryOp::Add,
                ..
            }
        ));
        assert_eq!(value.span, Span::new(0, 3));
    }

    #[test]
    fn respects_precedence() {
        let script = parse_ok("1 + 2 * 3");
        let Some(Expr {
            kind: ExprKind::Binary { op, rhs, .. },
            ..
        }) = script.trailing_value()
        else {
            panic!("expected binary expression");
        };
        assert_eq!(*op, BinaryOp::Add);
        assert!(matches!(
            rhs.kind,
            ExprKind::Binary {
                op: BinaryOp::Mul,
                ..
            }
        ));
    }

    #[test]
    fn parses_declarations_assignments_and_calls() {
        let script = parse_ok("int x = core.max(1, -2);\nx = x * 2;\nabs(x);");
        assert_eq!(script.items.len(), 3);
        assert!(matches!(&script.items[0], Item::Declare { name, .. } if name.name == "x"));
        assert!(matches!(&script.items[1], Item::Assign { name, .. } if name.name == "x"));
        assert!(script.trailing_value().is_none());
        let Item::Declare { value, .. } = &script.items[0] else {
            panic!("expected declaration");
        };
        let ExprKind::Call { path, args } = &value.kind else {
            panic!("expected call");
        };
        let names: Vec<_> = path.iter().map(|p| p.name.as_str()).collect();
        assert_eq!(names, ["core", "max"]);
        assert_eq!(args.len(), 2);
    }

    #[test]
    fn parses_reference_directives() {
        let script = parse_ok("#r \"lib/json.wasm\"\n#r \"/abs/text.wasm\"\n1");
        assert_eq!(
            script.directives,
            [
                Directive::Reference {
                    path: "lib/json.wasm".to_string(),
                    span: Span::new(0, 18),
                },
                Directive::Reference {
                    path: "/abs/text.wasm".to_string(),
                    span: Span::new(19, 38),
                },
            ]
        );
    }

    #[test]
    fn incomplete_declaration_reports_expected_expression() {
        let result = parse("int x = ");
        assert_eq!(result.diagnostics.len(), 1);
        assert_eq!(result.diagnostics[0].code, "QS1011");
        assert_eq!(result.diagnostics[0].span, Span::empty(8));
    }

    #[test]
    fn recovers_and_reports_every_statement_error() {
        let result = parse("int = 1;\n2 +;\n3");
        let codes: Vec<_> = result.diagnostics.iter().map(|d| d.code).collect();
        assert_eq!(codes, ["QS1010", "QS1011"]);
        assert!(result.script.trailing_value().is_some());
    }

    #[test]
    fn rejects_late_and_unknown_directives() {
        let result = parse("#load \"other.qs\"\n1;\n#r \"a.wasm\"\n2");
        let codes: Vec<_> = result.diagnostics.iter().map(|d| d.code).collect();
        assert_eq!(codes, ["QS1013", "QS1012"]);
    }

    #[test]
    fn reports_out_of_range_literals() {
        let result = parse("2147483648");
        assert_eq!(result.diagnostics[0].code, "QS1003");

        let script = parse_ok("-2147483648");
        assert_eq!(
            script.trailing_value().map(|e| &e.kind),
            Some(&ExprKind::Int(i32::MIN))
        );
    }

    #[test]
    fn missing_semicolon_between_statements() {
        let result = parse("1 2");
        assert_eq!(result.diagnostics[0].code, "QS1010");
        assert_eq!(result.diagnostics[0].span, Span::new(2, 3));
    }
}
