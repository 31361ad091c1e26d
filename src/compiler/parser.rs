use crate::compiler::ast::{Expr, Node};
use crate::compiler::lexer::{Lexer, Token, TokenKind};
use crate::compiler::source::Span;
use crate::error::CompileError;

/// Deepest allowed nesting of parentheses, unary operators and calls.
pub const MAX_NESTING: usize = 256;

type ParseResult<T> = Result<T, CompileError>;

/// A recursive descent parser for expressions.
///
/// ```text
/// Block  := Expr (';' Expr)* END_OF_STRING
/// Expr   := Term (('+'|'-') Term)*
/// Term   := Factor (('*'|'/') Factor)*
/// Factor := FLOAT | INT
///         | IDENTIFIER ('(' (Expr (',' Expr)*)? ')')?
///         | '-' Factor | '+' Factor
///         | '(' Expr ')'
/// ```
///
/// The productions return `Ok(None)` when the current token cannot start
/// them, so the caller can report what it expected in its own words.
pub struct Parser {
    lexer: Lexer,
    current: Token,
    depth: usize,
}

impl Parser {
    pub fn new(source: &str) -> Self {
        let mut lexer = Lexer::new(source);
        let current = lexer.next_token();
        Self {
            lexer,
            current,
            depth: 0,
        }
    }

    /// Parse a whole expression.
    pub fn parse(source: &str) -> ParseResult<Node> {
        Parser::new(source).parse_block()
    }

    /// Parse the input as a block. A lexer error takes precedence over
    /// whatever the parser made of the truncated token stream.
    pub fn parse_block(mut self) -> ParseResult<Node> {
        let result = self.block();
        match self.lexer.take_error() {
            Some(err) => Err(err),
            None => result,
        }
    }

    fn block(&mut self) -> ParseResult<Node> {
        let Some(mut node) = self.expr()? else {
            return Err(self.error_here("expected expression"));
        };

        while self.match_token(TokenKind::Semicolon) {
            let Some(next) = self.expr()? else {
                return Err(self.error_here("expected expression"));
            };
            node = Node::combine(node, next);
        }

        if !self.check(TokenKind::EndOfString) {
            return Err(self.error_here("expected end of string"));
        }
        Ok(node)
    }

    fn expr(&mut self) -> ParseResult<Option<Node>> {
        let Some(mut lhs) = self.term()? else {
            return Ok(None);
        };

        loop {
            let op = self.current.kind;
            if op != TokenKind::Plus && op != TokenKind::Minus {
                break;
            }
            self.advance();

            let Some(rhs) = self.term()? else {
                return Err(self.error_here("expected expression"));
            };
            let span = lhs.span.merge(rhs.span);
            let (lhs_box, rhs_box) = (Box::new(lhs), Box::new(rhs));
            lhs = match op {
                TokenKind::Plus => Node::new(Expr::Add(lhs_box, rhs_box), span),
                _ => Node::new(Expr::Sub(lhs_box, rhs_box), span),
            };
        }

        Ok(Some(lhs))
    }

    fn term(&mut self) -> ParseResult<Option<Node>> {
        let Some(mut lhs) = self.factor()? else {
            return Ok(None);
        };

        loop {
            let op = self.current.kind;
            if op != TokenKind::Star && op != TokenKind::Slash {
                break;
            }
            self.advance();

            let Some(rhs) = self.factor()? else {
                return Err(self.error_here("expected term"));
            };
            let span = lhs.span.merge(rhs.span);
            let (lhs_box, rhs_box) = (Box::new(lhs), Box::new(rhs));
            lhs = match op {
                TokenKind::Star => Node::new(Expr::Mul(lhs_box, rhs_box), span),
                _ => Node::new(Expr::Div(lhs_box, rhs_box), span),
            };
        }

        Ok(Some(lhs))
    }

    fn factor(&mut self) -> ParseResult<Option<Node>> {
        let token = self.current;
        match token.kind {
            TokenKind::Float | TokenKind::Int => {
                self.advance();
                let text = self.lexer.sequence().text(token.span);
                let value: f64 = text.parse().map_err(|_| {
                    self.error_at(token.span, &format!("invalid number \"{}\"", text))
                })?;
                Ok(Some(Node::float(value, token.span)))
            }
            TokenKind::Identifier => {
                self.advance();
                let name = self.lexer.sequence().text(token.span).to_string();
                if !self.match_token(TokenKind::LParen) {
                    return Ok(Some(Node::variable(name, token.span)));
                }
                self.enter(token.span)?;
                let args = self.arguments()?;
                let close = self.current.span;
                self.expect(TokenKind::RParen)?;
                self.leave();
                Ok(Some(Node::call(name, args, token.span.merge(close))))
            }
            TokenKind::Minus | TokenKind::Plus => {
                self.advance();
                self.enter(token.span)?;
                let Some(operand) = self.factor()? else {
                    let message = if token.kind == TokenKind::Minus {
                        "wrong unary minus operator, expected factor"
                    } else {
                        "wrong unary plus operator, expected factor"
                    };
                    return Err(self.error_here(message));
                };
                self.leave();
                let span = token.span.merge(operand.span);
                let expr = if token.kind == TokenKind::Minus {
                    Expr::Neg(Box::new(operand))
                } else {
                    Expr::Plus(Box::new(operand))
                };
                Ok(Some(Node::new(expr, span)))
            }
            TokenKind::LParen => {
                self.advance();
                self.enter(token.span)?;
                let Some(inner) = self.expr()? else {
                    return Err(self.error_here("expected expression"));
                };
                self.expect(TokenKind::RParen)?;
                self.leave();
                Ok(Some(inner))
            }
            _ => Ok(None),
        }
    }

    fn arguments(&mut self) -> ParseResult<Vec<Node>> {
        let mut args = Vec::new();
        let Some(first) = self.expr()? else {
            return Ok(args);
        };
        args.push(first);
        while self.match_token(TokenKind::Comma) {
            let Some(arg) = self.expr()? else {
                return Err(self.error_here("expected expression"));
            };
            args.push(arg);
        }
        Ok(args)
    }

    // ===== Token helpers =====

    fn advance(&mut self) {
        if self.current.kind != TokenKind::EndOfString {
            self.current = self.lexer.next_token();
        }
    }

    fn check(&self, kind: TokenKind) -> bool {
        self.current.kind == kind
    }

    fn match_token(&mut self, kind: TokenKind) -> bool {
        if self.check(kind) {
            self.advance();
            true
        } else {
            false
        }
    }

    fn expect(&mut self, kind: TokenKind) -> ParseResult<()> {
        if self.match_token(kind) {
            return Ok(());
        }
        let span = self.current.span;
        if self.current.kind == TokenKind::EndOfString {
            Err(CompileError::new(
                "Error: Unexpected end of input",
                span,
                self.lexer.sequence().excerpt(span),
            ))
        } else {
            Err(CompileError::new(
                format!(
                    "Error: Unexpected token. Expected '{}', but '{}' was found at position: {}.",
                    kind.tag(),
                    self.lexer.sequence().text(span),
                    span.start
                ),
                span,
                self.lexer.sequence().excerpt(span),
            ))
        }
    }

    fn enter(&mut self, span: Span) -> ParseResult<()> {
        self.depth += 1;
        if self.depth > MAX_NESTING {
            return Err(self.error_at(span, "expression is nested too deeply"));
        }
        Ok(())
    }

    fn leave(&mut self) {
        self.depth -= 1;
    }

    // ===== Diagnostics =====

    /// `Error, <what>, but "<token>" was found at position <n>.`
    fn error_here(&self, what: &str) -> CompileError {
        let span = self.current.span;
        CompileError::new(
            format!(
                "Error, {}, but \"{}\" was found at position {}.",
                what,
                self.lexer.sequence().text(span),
                span.start
            ),
            span,
            self.lexer.sequence().excerpt(span),
        )
    }

    fn error_at(&self, span: Span, what: &str) -> CompileError {
        CompileError::new(
            format!("Error, {} at position {}.", what, span.start),
            span,
            self.lexer.sequence().excerpt(span),
        )
    }
}
