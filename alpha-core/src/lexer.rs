//! Lexer for Alpha source text.

use crate::diagnostic::Diagnostic;
use crate::span::{FileId, Span};

/// Kind of a token produced by the lexer.
///
/// Keywords are ordinary `Word`s; the parser decides what a word means.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenKind {
    Word,
    Int,
    Real,
    Str,
    Oper,
    Eof,
}

/// A single token.
///
/// For `Str` tokens `text` holds the decoded content (escapes already
/// applied); for everything else it is the source text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Token {
    pub kind: TokenKind,
    pub text: String,
    pub span: Span,
}

impl Token {
    pub fn is(&self, kind: TokenKind, text: &str) -> bool {
        self.kind == kind && self.text == text
    }

    pub fn is_oper(&self, text: &str) -> bool {
        self.is(TokenKind::Oper, text)
    }

    pub fn is_word(&self, text: &str) -> bool {
        self.is(TokenKind::Word, text)
    }

    pub fn is_eof(&self) -> bool {
        self.kind == TokenKind::Eof
    }
}

/// Result of lexing a source file.
#[derive(Debug)]
pub struct LexResult {
    pub tokens: Vec<Token>,
    pub diagnostics: Vec<Diagnostic>,
}

/// Operators, longest first so that a linear scan finds the longest match.
const OPERATORS: &[&str] = &[
    "%%=", "===", "!==", "<<=", ">>=", ":=", "+=", "-=", "*=", "/=", "%=", "&=", "|=", "^=",
    "<=", ">=", "==", "!=", "&&", "||", "++", "--", "<<", ">>", "%%", "+", "-", "*", "/", "%",
    "&", "|", "^", "~", "!", "<", ">", "=", ",", ".", "?", ":", ";", "(", ")", "[", "]", "{",
    "}",
];

/// Lex a source string into tokens. The last token is always `Eof`.
pub fn lex(file_id: FileId, source: &str) -> LexResult {
    let mut lexer = Lexer {
        file_id,
        chars: source.as_bytes(),
        source,
        index: 0,
        line: 0,
        col: 0,
        diagnostics: Vec::new(),
    };
    lexer.run()
}

struct Lexer<'src> {
    file_id: FileId,
    source: &'src str,
    chars: &'src [u8],
    index: usize,
    line: u32,
    col: u32,
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
                while let Some(c) = self.peek_char() {
                    if c == b'\n' {
                        break;
                    }
                    self.consume_char();
                }
                continue;
            }
            if ch == b'/' && self.peek_next() == Some(b'*') {
                self.skip_block_comment();
                continue;
            }

            let span = self.span();
            let start = self.index;
            let token = match ch {
                b'"' => self.lex_string(span),
                b'0'..=b'9' => self.lex_number(start, span),
                _ if is_ident_start(ch) => self.lex_word(start, span),
                _ => self.lex_operator(span),
            };

            if let Some(tok) = token {
                tokens.push(tok);
            }
        }

        tokens.push(Token {
            kind: TokenKind::Eof,
            text: String::new(),
            span: self.span(),
        });

        LexResult {
            tokens,
            diagnostics: std::mem::take(&mut self.diagnostics),
        }
    }

    fn span(&self) -> Span {
        Span::new(self.file_id, self.line, self.col)
    }

    fn token(&self, kind: TokenKind, start: usize, span: Span) -> Option<Token> {
        Some(Token {
            kind,
            text: self.source[start..self.index].to_string(),
            span,
        })
    }

    fn skip_block_comment(&mut self) {
        let span = self.span();
        self.consume_char();
        self.consume_char();
        loop {
            match self.peek_char() {
                Some(b'*') if self.peek_next() == Some(b'/') => {
                    self.consume_char();
                    self.consume_char();
                    return;
                }
                Some(_) => self.consume_char(),
                None => {
                    let diag = Diagnostic::error("unterminated comment", span).with_code("E0004");
                    self.diagnostics.push(diag);
                    return;
                }
            }
        }
    }

    fn lex_operator(&mut self, span: Span) -> Option<Token> {
        let rest = &self.chars[self.index..];
        let found = OPERATORS
            .iter()
            .find(|op| rest.starts_with(op.as_bytes()))
            .copied();
        match found {
            Some(op) => {
                for _ in 0..op.len() {
                    self.consume_char();
                }
                Some(Token {
                    kind: TokenKind::Oper,
                    text: op.to_string(),
                    span,
                })
            }
            None => {
                self.consume_char();
                let diag = Diagnostic::error("unexpected character", span).with_code("E0001");
                self.diagnostics.push(diag);
                None
            }
        }
    }

    fn lex_string(&mut self, span: Span) -> Option<Token> {
        // Opening quote
        self.consume_char();

        let mut bytes = Vec::new();
        while let Some(ch) = self.peek_char() {
            match ch {
                b'"' => {
                    self.consume_char();
                    return Some(Token {
                        kind: TokenKind::Str,
                        text: String::from_utf8_lossy(&bytes).into_owned(),
                        span,
                    });
                }
                b'\\' => {
                    let escape_span = self.span();
                    self.consume_char();
                    match self.lex_escape() {
                        Some(byte) => bytes.push(byte),
                        None => {
                            let diag = Diagnostic::error("invalid escape sequence", escape_span)
                                .with_code("E0003");
                            self.diagnostics.push(diag);
                        }
                    }
                }
                b'\n' => break,
                _ => {
                    bytes.push(ch);
                    self.consume_char();
                }
            }
        }

        let diag = Diagnostic::error("unterminated string literal", span).with_code("E0002");
        self.diagnostics.push(diag);
        None
    }

    fn lex_escape(&mut self) -> Option<u8> {
        let ch = self.peek_char()?;
        self.consume_char();
        match ch {
            b'n' => Some(b'\n'),
            b't' => Some(b'\t'),
            b'r' => Some(b'\r'),
            b'0' => Some(0),
            b'\\' => Some(b'\\'),
            b'"' => Some(b'"'),
            b'\'' => Some(b'\''),
            b'x' => {
                let hi = self.peek_char().and_then(hex_value)?;
                self.consume_char();
                let lo = self.peek_char().and_then(hex_value)?;
                self.consume_char();
                Some(hi * 16 + lo)
            }
            _ => None,
        }
    }

    fn lex_number(&mut self, start: usize, span: Span) -> Option<Token> {
        // Radix prefixes only ever produce integers.
        if self.peek_char() == Some(b'0')
            && matches!(
                self.peek_next(),
                Some(b'x' | b'X' | b'o' | b'O' | b'b' | b'B' | b'd' | b'D')
            )
        {
            self.consume_char();
            self.consume_char();
            while let Some(ch) = self.peek_char() {
                if ch.is_ascii_alphanumeric() || ch == b'_' {
                    self.consume_char();
                } else {
                    break;
                }
            }
            return self.token(TokenKind::Int, start, span);
        }

        self.consume_digits();
        let mut is_real = false;

        if self.peek_char() == Some(b'.') && self.peek_next().is_some_and(|c| c.is_ascii_digit()) {
            is_real = true;
            self.consume_char();
            self.consume_digits();
        }

        if matches!(self.peek_char(), Some(b'e' | b'E')) {
            let sign = matches!(self.peek_next(), Some(b'+' | b'-'));
            let digit_at = if sign { self.index + 2 } else { self.index + 1 };
            if self.chars.get(digit_at).is_some_and(|c| c.is_ascii_digit()) {
                is_real = true;
                self.consume_char();
                if sign {
                    self.consume_char();
                }
                self.consume_digits();
            }
        }

        let kind = if is_real { TokenKind::Real } else { TokenKind::Int };
        self.token(kind, start, span)
    }

    fn consume_digits(&mut self) {
        while let Some(ch) = self.peek_char() {
            if ch.is_ascii_digit() || ch == b'_' {
                self.consume_char();
            } else {
                break;
            }
        }
    }

    fn lex_word(&mut self, start: usize, span: Span) -> Option<Token> {
        self.consume_char();
        while let Some(ch) = self.peek_char() {
            if is_ident_continue(ch) {
                self.consume_char();
            } else {
                break;
            }
        }
        self.token(TokenKind::Word, start, span)
    }

    fn peek_char(&self) -> Option<u8> {
        self.chars.get(self.index).copied()
    }

    fn peek_next(&self) -> Option<u8> {
        self.chars.get(self.index + 1).copied()
    }

    fn consume_char(&mut self) {
        if let Some(&ch) = self.chars.get(self.index) {
            self.index += 1;
            if ch == b'\n' {
                self.line += 1;
                self.col = 0;
            } else {
                self.col += 1;
            }
        }
    }
}

fn is_whitespace(ch: u8) -> bool {
    matches!(ch, b' ' | b'\t' | b'\n' | b'\r')
}

fn is_ident_start(ch: u8) -> bool {
    ch.is_ascii_alphabetic() || ch == b'_' || ch == b'@'
}

fn is_ident_continue(ch: u8) -> bool {
    ch.is_ascii_alphanumeric() || ch == b'_'
}

fn hex_value(ch: u8) -> Option<u8> {
    (ch as char).to_digit(16).map(|d| d as u8)
}

/// Cursor over a token vector with one-token putback.
#[derive(Debug)]
pub struct TokenStream {
    tokens: Vec<Token>,
    pos: usize,
}

impl TokenStream {
    /// `tokens` must end with an `Eof` token, as [`lex`] guarantees.
    pub fn new(tokens: Vec<Token>) -> Self {
        assert!(
            tokens.last().is_some_and(Token::is_eof),
            "token stream must end with Eof"
        );
        TokenStream { tokens, pos: 0 }
    }

    pub fn peek(&self) -> &Token {
        &self.tokens[self.pos.min(self.tokens.len() - 1)]
    }

    /// Return the current token and advance. `Eof` is returned forever once
    /// reached.
    pub fn next(&mut self) -> Token {
        let token = self.peek().clone();
        self.pos = (self.pos + 1).min(self.tokens.len());
        token
    }

    /// Step back over the token just returned by `next`.
    pub fn putback(&mut self) {
        self.pos = self.pos.saturating_sub(1);
    }

    /// The most recently consumed token (or the first one if nothing was
    /// consumed yet).
    pub fn last(&self) -> &Token {
        &self.tokens[self.pos.saturating_sub(1).min(self.tokens.len() - 1)]
    }

    pub fn at_eof(&self) -> bool {
        self.peek().is_eof()
    }

    /// Replace the token under the cursor; used to split a `>>` that closes
    /// two type argument lists.
    pub fn replace_peek(&mut self, token: Token) {
        let index = self.pos.min(self.tokens.len() - 1);
        self.tokens[index] = token;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn kinds_and_text(source: &str) -> Vec<(TokenKind, String)> {
        lex(FileId(0), source)
            .tokens
            .into_iter()
            .map(|t| (t.kind, t.text))
            .collect()
    }

    #[test]
    fn longest_operator_wins() {
        let toks = kinds_and_text("a %%= b === c := d");
        let opers: Vec<_> = toks
            .iter()
            .filter(|(k, _)| *k == TokenKind::Oper)
            .map(|(_, t)| t.as_str())
            .collect();
        assert_eq!(opers, ["%%=", "===", ":="]);
    }

    #[test]
    fn numbers_and_reals() {
        let toks = kinds_and_text("0x1F 12_000 1.5 2e10 3.e");
        assert_eq!(toks[0], (TokenKind::Int, "0x1F".to_string()));
        assert_eq!(toks[1], (TokenKind::Int, "12_000".to_string()));
        assert_eq!(toks[2], (TokenKind::Real, "1.5".to_string()));
        assert_eq!(toks[3], (TokenKind::Real, "2e10".to_string()));
        // `3.e` is the integer 3 followed by member access on `e`.
        assert_eq!(toks[4], (TokenKind::Int, "3".to_string()));
        assert_eq!(toks[5], (TokenKind::Oper, ".".to_string()));
    }

    #[test]
    fn strings_decode_escapes() {
        let result = lex(FileId(0), r#""a\n\x41\"""#);
        assert!(result.diagnostics.is_empty());
        assert_eq!(result.tokens[0].kind, TokenKind::Str);
        assert_eq!(result.tokens[0].text, "a\nA\"");
    }

    #[test]
    fn tracks_lines_and_skips_comments() {
        let result = lex(FileId(0), "// header\nlet /* x */ y");
        let let_tok = &result.tokens[0];
        assert!(let_tok.is_word("let"));
        assert_eq!((let_tok.span.line, let_tok.span.col), (1, 0));
        assert_eq!(result.tokens[1].span.col, 12);
        assert!(result.tokens[2].is_eof());
    }

    #[test]
    fn reports_unexpected_and_unterminated() {
        let result = lex(FileId(0), "a # \"open");
        let codes: Vec<_> = result.diagnostics.iter().filter_map(|d| d.code).collect();
        assert_eq!(codes, ["E0001", "E0002"]);
    }

    #[test]
    fn stream_putback_and_eof() {
        let mut stream = TokenStream::new(lex(FileId(0), "a b").tokens);
        assert!(stream.next().is_word("a"));
        assert!(stream.next().is_word("b"));
        stream.putback();
        assert!(stream.peek().is_word("b"));
        stream.next();
        assert!(stream.next().is_eof());
        assert!(stream.next().is_eof());
        assert!(stream.last().is_eof());
        stream.putback();
        assert!(stream.peek().is_eof());
    }
}
