use super::source::{Span, SymbolSequence};
use crate::error::CompileError;

/// Token kinds of the expression language.
///
/// Every kind has a one-character tag (see [`TokenKind::tag`]).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenKind {
    // Operators and punctuation
    Assign,
    Plus,
    Minus,
    Star,
    Slash,
    LParen,
    RParen,
    Percent,
    Caret,
    Dot,
    Comma,
    Semicolon,

    // Literals
    Identifier,
    Float,
    Int,

    // Special
    EndOfString,
}

impl TokenKind {
    /// Single-character tag: the operator itself, `'\0'` for end of string,
    /// `'d'` identifiers, `'f'` floats and `'i'` ints.
    pub fn tag(self) -> char {
        match self {
            TokenKind::Assign => '=',
            TokenKind::Plus => '+',
            TokenKind::Minus => '-',
            TokenKind::Star => '*',
            TokenKind::Slash => '/',
            TokenKind::LParen => '(',
            TokenKind::RParen => ')',
            TokenKind::Percent => '%',
            TokenKind::Caret => '^',
            TokenKind::Dot => '.',
            TokenKind::Comma => ',',
            TokenKind::Semicolon => ';',
            TokenKind::Identifier => 'd',
            TokenKind::Float => 'f',
            TokenKind::Int => 'i',
            TokenKind::EndOfString => '\0',
        }
    }

    fn operator(byte: u8) -> Option<Self> {
        let kind = match byte {
            b'=' => TokenKind::Assign,
            b'+' => TokenKind::Plus,
            b'-' => TokenKind::Minus,
            b'*' => TokenKind::Star,
            b'/' => TokenKind::Slash,
            b'(' => TokenKind::LParen,
            b')' => TokenKind::RParen,
            b'%' => TokenKind::Percent,
            b'^' => TokenKind::Caret,
            b'.' => TokenKind::Dot,
            b',' => TokenKind::Comma,
            b';' => TokenKind::Semicolon,
            _ => return None,
        };
        Some(kind)
    }
}

/// A token with its kind and source span.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Token {
    pub kind: TokenKind,
    pub span: Span,
}

impl Token {
    pub fn new(kind: TokenKind, span: Span) -> Self {
        Self { kind, span }
    }
}

/// On-demand tokenizer over a [`SymbolSequence`].
///
/// An unknown character records an error and yields `EndOfString`. Only the
/// first error is kept until [`Lexer::take_error`] clears it.
pub struct Lexer {
    sequence: SymbolSequence,
    cursor: usize,
    error: Option<CompileError>,
}

impl Lexer {
    pub fn new(source: &str) -> Self {
        Self {
            sequence: SymbolSequence::new(source),
            cursor: 0,
            error: None,
        }
    }

    pub fn sequence(&self) -> &SymbolSequence {
        &self.sequence
    }

    pub fn has_error(&self) -> bool {
        self.error.is_some()
    }

    pub fn error(&self) -> Option<&CompileError> {
        self.error.as_ref()
    }

    /// Take the recorded error, resetting the lexer's error state.
    pub fn take_error(&mut self) -> Option<CompileError> {
        self.error.take()
    }

    /// Collect every token up to and including `EndOfString`.
    pub fn tokenize(source: &str) -> Result<Vec<Token>, CompileError> {
        let mut lexer = Lexer::new(source);
        let mut tokens = Vec::new();
        loop {
            let token = lexer.next_token();
            tokens.push(token);
            if token.kind == TokenKind::EndOfString {
                break;
            }
        }
        match lexer.take_error() {
            Some(err) => Err(err),
            None => Ok(tokens),
        }
    }

    pub fn next_token(&mut self) -> Token {
        while self.peek().is_ascii_whitespace() {
            self.cursor += 1;
        }

        let start = self.cursor;
        let symbol = self.sequence.get(start);
        if symbol.is_end() {
            return Token::new(TokenKind::EndOfString, Span::new(start, start + 1));
        }

        let byte = symbol.byte();
        if let Some(kind) = TokenKind::operator(byte) {
            self.cursor += 1;
            return Token::new(kind, Span::new(start, self.cursor));
        }

        if byte.is_ascii_alphabetic() || byte == b'_' {
            self.eat_while(|b| b.is_ascii_alphanumeric() || b == b'_');
            return Token::new(TokenKind::Identifier, Span::new(start, self.cursor));
        }

        if byte.is_ascii_digit() {
            self.eat_while(|b| b.is_ascii_digit());
            let kind = if self.peek() == b'.' {
                self.cursor += 1;
                self.eat_while(|b| b.is_ascii_digit());
                TokenKind::Float
            } else {
                TokenKind::Int
            };
            return Token::new(kind, Span::new(start, self.cursor));
        }

        let span = Span::new(start, start + 1);
        self.set_error(CompileError::new(
            format!(
                "Error, unknown symbol \"{}\" at position {}.",
                self.sequence.char_at(start),
                start
            ),
            span,
            self.sequence.excerpt(span),
        ));
        Token::new(TokenKind::EndOfString, span)
    }

    fn set_error(&mut self, err: CompileError) {
        if self.error.is_none() {
            log::debug!("lexer error: {}", err.message);
            self.error = Some(err);
        }
    }

    fn peek(&self) -> u8 {
        self.sequence.get(self.cursor).byte()
    }

    fn eat_while(&mut self, pred: impl Fn(u8) -> bool) {
        while pred(self.peek()) {
            self.cursor += 1;
        }
    }
}
