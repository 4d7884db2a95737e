//! Lexer for quill scripts.

use crate::diagnostic::Diagnostic;
use crate::span::Span;

/// Kind of a token produced by the lexer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenKind {
    Eof,

    // Identifiers and literals
    Ident,
    IntLiteral,
    StringLiteral,
    /// `#` immediately followed by a name, e.g. `#r`.
    Directive,

    // Punctuation
    LParen,    // (
    RParen,    // )
    Comma,     // ,
    Semi,      // ;
    Dot,       // .
    Equal,     // =
    Plus,      // +
    Minus,     // -
    Star,      // *
    Slash,     // /
    Percent,   // %

    // Keywords
    Int,
}

/// A single token. The text is recovered by slicing the source with the
/// span; string literal spans include the quotes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Token {
    pub kind: TokenKind,
    pub span: Span,
}

impl Token {
    pub fn text<'src>(&self, source: &'src str) -> &'src str {
        &source[self.span.start as usize..self.span.end as usize]
    }
}

/// Result of lexing a script.
#[derive(Debug)]
pub struct LexResult {
    pub tokens: Vec<Token>,
    pub diagnostics: Vec<Diagnostic>,
}

/// Lex a script into tokens. The token list always ends with `Eof`.
pub fn lex(source: &str) -> LexResult {
    let mut lexer = Lexer {
        chars: source.as_bytes(),
        index: 0,
        diagnostics: Vec::new(),
    };
    lexer.run()
}

struct Lexer<'src> {
    chars: &'src [u8],
    index: usize,
    diagnostics: Vec<Diagnostic>,
}

impl<'src> Lexer<'src> {
    fn run(&mut self) -> LexResult {
        let mut tokens = Vec::new();

        while let Some(ch) = self.peek_char() {
            if is_whitespace(ch) {
                self.consume_char();
                continue;
            }
            if ch == b'/' && self.peek_next() == Some(b'/') {
                self.skip_line_comment();
                continue;
            }

            let start = self.index as u32;
            let kind = match ch {
                b'(' => Some(self.single(TokenKind::LParen)),
                b')' => Some(self.single(TokenKind::RParen)),
                b',' => Some(self.single(TokenKind::Comma)),
                b';' => Some(self.single(TokenKind::Semi)),
                b'.' => Some(self.single(TokenKind::Dot)),
                b'=' => Some(self.single(TokenKind::Equal)),
                b'+' => Some(self.single(TokenKind::Plus)),
                b'-' => Some(self.single(TokenKind::Minus)),
                b'*' => Some(self.single(TokenKind::Star)),
                b'/' => Some(self.single(TokenKind::Slash)),
                b'%' => Some(self.single(TokenKind::Percent)),
                b'"' => self.lex_string(start),
                b'#' => self.lex_directive(start),
                b'0'..=b'9' => Some(self.lex_number()),
                _ if is_ident_start(ch) => Some(self.lex_ident_or_keyword(start)),
                _ => {
                    self.consume_utf8_char();
                    self.unexpected_char(start);
                    None
                }
            };

            if let Some(kind) = kind {
                tokens.push(Token {
                    kind,
                    span: Span::new(start, self.index as u32),
                });
            }
        }

        let end = self.chars.len() as u32;
        tokens.push(Token {
            kind: TokenKind::Eof,
            span: Span::empty(end),
        });

        LexResult {
            tokens,
            diagnostics: std::mem::take(&mut self.diagnostics),
        }
    }

    fn single(&mut self, kind: TokenKind) -> TokenKind {
        self.consume_char();
        kind
    }

    fn unexpected_char(&mut self, start: u32) {
        let span = Span::new(start, self.index as u32);
        self.diagnostics
            .push(Diagnostic::error("QS1001", "unexpected character", span));
    }

    fn skip_line_comment(&mut self) {
        while let Some(ch) = self.peek_char() {
            if ch == b'\n' {
                break;
            }
            self.consume_char();
        }
    }

    fn lex_string(&mut self, start: u32) -> Option<TokenKind> {
        // Opening quote
        self.consume_char();

        while let Some(ch) = self.peek_char() {
            match ch {
                b'"' => {
                    self.consume_char();
                    return Some(TokenKind::StringLiteral);
                }
                b'\n' => break,
                _ => self.consume_char(),
            }
        }

        let span = Span::new(start, self.index as u32);
        self.diagnostics.push(Diagnostic::error(
            "QS1002",
            "unterminated string literal",
            span,
        ));
        None
    }

    fn lex_directive(&mut self, start: u32) -> Option<TokenKind> {
        self.consume_char(); // '#'
        if !self.peek_char().is_some_and(is_ident_start) {
            if self.peek_char().is_some_and(|byte| !byte.is_ascii()) {
                self.consume_utf8_char();
            }
            self.unexpected_char(start);
            return None;
        }
        while self.peek_char().is_some_and(is_ident_continue) {
            self.consume_char();
        }
        Some(TokenKind::Directive)
    }

    fn lex_number(&mut self) -> TokenKind {
        while let Some(ch) = self.peek_char() {
            if matches!(ch, b'0'..=b'9' | b'_') {
                self.consume_char();
            } else {
                break;
            }
        }
        TokenKind::IntLiteral
    }

    fn lex_ident_or_keyword(&mut self, start: u32) -> TokenKind {
        while self.peek_char().is_some_and(is_ident_continue) {
            self.consume_char();
        }
        match &self.chars[start as usize..self.index] {
            b"int" => TokenKind::Int,
            _ => TokenKind::Ident,
        }
    }

    fn peek_char(&self) -> Option<u8> {
        self.chars.get(self.index).copied()
    }

    fn peek_next(&self) -> Option<u8> {
        self.chars.get(self.index + 1).copied()
    }

    fn consume_char(&mut self) {
        if self.index < self.chars.len() {
            self.index += 1;
        }
    }

    /// Step over a whole UTF-8 sequence so spans stay on char boundaries.
    fn consume_utf8_char(&mut self) {
        self.consume_char();
        while self
            .peek_char()
            .is_some_and(|byte| byte & 0b1100_0000 == 0b1000_0000)
        {
            self.consume_char();
        }
    }
}

fn is_whitespace(ch: u8) -> bool {
    matches!(ch, b' ' | b'\t' | b'\n' | b'\r')
}

fn is_ident_start(ch: u8) -> bool {
    ch.is_ascii_alphabetic() || ch == b'_'
}

fn is_ident_continue(ch: u8) -> bool {
    is_ident_start(ch) || ch.is_ascii_digit()
}
