//! L2: the expression parser (spec §4.2).
//!
//! A small recursive-descent parser over the token stream produced by
//! [`super::lexer::tokenize`]. Five public entry points mirror spec §4.2:
//! [`ExprParser::parse_primitive`], [`ExprParser::parse_identifier`],
//! [`ExprParser::parse_path`], [`ExprParser::parse_filtered`] and
//! [`ExprParser::parse_boolean`], plus [`ExprParser::parse_loop`].

use super::ast::*;
use crate::error::Error;
use crate::lex::{Token, TokenKind};
use crate::span::Spanned;

pub struct ExprParser<'a> {
    tokens: &'a [Spanned<Token>],
    pos: usize,
    template_name: String,
}

impl<'a> ExprParser<'a> {
    pub fn new(tokens: &'a [Spanned<Token>], template_name: impl Into<String>) -> Self {
        Self { tokens, pos: 0, template_name: template_name.into() }
    }

    fn peek(&self) -> &Token {
        &self.tokens[self.pos.min(self.tokens.len() - 1)].node
    }

    fn peek_span(&self) -> crate::span::Span {
        self.tokens[self.pos.min(self.tokens.len() - 1)].span.clone()
    }

    fn at_eof(&self) -> bool {
        matches!(self.peek().kind, TokenKind::Eof)
    }

    fn advance(&mut self) -> Token {
        let t = self.tokens[self.pos.min(self.tokens.len() - 1)].node.clone();
        if self.pos < self.tokens.len() - 1 {
            self.pos += 1;
        }
        t
    }

    pub(crate) fn eat(&mut self, kind: TokenKind) -> bool {
        if self.peek().kind == kind {
            self.advance();
            true
        } else {
            false
        }
    }

    fn expect(&mut self, kind: TokenKind, what: &str) -> crate::error::Result<Token> {
        if self.peek().kind == kind {
            Ok(self.advance())
        } else {
            Err(self.err(format!("expected {what}, found '{}'", self.peek().value)))
        }
    }

    fn err(&self, message: impl Into<String>) -> Error {
        Error::syntax(message, Some(self.peek_span()))
    }

    /// `parse_primitive`: a literal, a path, or a range.
    pub fn parse_primitive(&mut self) -> crate::error::Result<Expression> {
        let tok = self.peek().clone();
        let primary = match tok.kind {
            TokenKind::String => {
                self.advance();
                Expression::StringLiteral(tok.value)
            }
            TokenKind::Integer => {
                self.advance();
                Expression::IntegerLiteral(tok.value.parse().map_err(|_| self.err("invalid integer literal"))?)
            }
            TokenKind::Float => {
                self.advance();
                Expression::FloatLiteral(tok.value.parse().map_err(|_| self.err("invalid float literal"))?)
            }
            TokenKind::True => {
                self.advance();
                Expression::BooleanLiteral(true)
            }
            TokenKind::False => {
                self.advance();
                Expression::BooleanLiteral(false)
            }
            TokenKind::Nil => {
                self.advance();
                Expression::Nil
            }
            TokenKind::Word if tok.value == "empty" => {
                self.advance();
                Expression::Empty
            }
            TokenKind::Word if tok.value == "blank" => {
                self.advance();
                Expression::Blank
            }
            TokenKind::LParen => {
                self.advance();
                let start = self.parse_primitive()?;
                self.expect(TokenKind::Range, "'..'")?;
                let stop = self.parse_primitive()?;
                self.expect(TokenKind::RParen, "')'")?;
                return Ok(Expression::Range(Box::new(start), Box::new(stop)));
            }
            TokenKind::Word => Expression::Path(self.parse_path()?),
            _ => return Err(self.err(format!("unexpected token '{}'", tok.value))),
        };
        Ok(primary)
    }

    /// `parse_identifier`: strictly a bare word, erroring on a multi-segment
    /// path (used where a tag wants a plain new-binding name, e.g.
    /// `assign <identifier> = ...`).
    pub fn parse_identifier(&mut self) -> crate::error::Result<String> {
        let tok = self.expect(TokenKind::Word, "an identifier")?;
        if matches!(self.peek().kind, TokenKind::Dot | TokenKind::LBracket) {
            return Err(self.err("expected a plain identifier, found a path"));
        }
        Ok(tok.value)
    }

    /// `parse_path`: head word, then zero-or-more `.word` or `[expr]`
    /// selectors.
    pub fn parse_path(&mut self) -> crate::error::Result<Path> {
        let start_span = self.peek_span();
        let head = self.expect(TokenKind::Word, "a variable name")?;
        let mut segments = vec![Segment::Name(head.value)];
        loop {
            match self.peek().kind {
                TokenKind::Dot => {
                    self.advance();
                    let word = self.expect(TokenKind::Word, "a property name")?;
                    segments.push(Segment::Name(word.value));
                }
                TokenKind::LBracket => {
                    self.advance();
                    match self.peek().kind {
                        TokenKind::String => {
                            let s = self.advance();
                            segments.push(Segment::QuotedString(s.value));
                        }
                        TokenKind::Integer => {
                            let s = self.advance();
                            segments.push(Segment::Integer(s.value.parse().unwrap_or_default()));
                        }
                        _ => {
                            let nested = self.parse_primitive()?;
                            segments.push(Segment::Nested(Box::new(nested)));
                        }
                    }
                    self.expect(TokenKind::RBracket, "']'")?;
                }
                _ => break,
            }
        }
        Ok(Path { segments, span: start_span })
    }

    fn parse_filters(&mut self) -> crate::error::Result<Vec<Filter>> {
        let mut filters = Vec::new();
        while self.eat(TokenKind::Pipe) {
            filters.push(self.parse_one_filter()?);
        }
        Ok(filters)
    }

    fn parse_one_filter(&mut self) -> crate::error::Result<Filter> {
        let span = self.peek_span();
        let name = self.expect(TokenKind::Word, "a filter name")?.value;
        let mut positional = Vec::new();
        let mut keyword = Vec::new();
        if self.eat(TokenKind::Colon) {
            loop {
                if matches!(self.peek().kind, TokenKind::Word) && self.is_kwarg_ahead() {
                    let key = self.advance().value;
                    // Accept both `name: value` and `name = value`.
                    if !self.eat(TokenKind::Colon) {
                        self.expect(TokenKind::Assign, "':' or '='")?;
                    }
                    let value = self.parse_filtered_inner(false)?;
                    keyword.push((key, value));
                } else {
                    let value = self.parse_filtered_inner(false)?;
                    positional.push(value);
                }
                if !self.eat(TokenKind::Comma) {
                    break;
                }
            }
        }
        Ok(Filter { name, positional, keyword, span })
    }

    /// Lookahead: is the current `Word` followed by `:` or `=` (making it a
    /// keyword-argument name) rather than the start of a path expression?
    fn is_kwarg_ahead(&self) -> bool {
        matches!(
            self.tokens.get(self.pos + 1).map(|t| t.node.kind),
            Some(TokenKind::Colon) | Some(TokenKind::Assign)
        )
    }

    /// A primitive used as a filter argument: literals and bare paths, no
    /// nested filters or boolean operators.
    fn parse_filtered_inner(&mut self, _allow_filters: bool) -> crate::error::Result<Expression> {
        self.parse_primitive()
    }

    /// `FilteredExpression.parse`: primary expression, zero-or-more
    /// pre-conditional filters, optional `|| tail-filters`, optional
    /// `if cond [else alt]` producing a [`Expression::Ternary`].
    pub fn parse_filtered(&mut self) -> crate::error::Result<Expression> {
        let left = self.parse_primitive()?;
        let filters = self.parse_filters()?;
        let tail_filters = if self.eat(TokenKind::DoublePipe) {
            self.parse_filters()?
        } else {
            Vec::new()
        };
        if self.eat(TokenKind::If) {
            let condition = self.parse_boolean()?;
            let alternative = if self.eat(TokenKind::Else) {
                Some(Box::new(self.parse_filtered_inner(false)?))
            } else {
                None
            };
            return Ok(Expression::Ternary {
                left: Box::new(left),
                filters,
                condition: Box::new(condition),
                alternative,
                tail_filters,
            });
        }
        if tail_filters.is_empty() {
            if filters.is_empty() {
                Ok(left)
            } else {
                Ok(Expression::Filtered { left: Box::new(left), filters })
            }
        } else {
            // `expr || tail` without `if`: treat the tail filters as
            // unconditionally applied, matching a ternary whose condition is
            // always true.
            Ok(Expression::Ternary {
                left: Box::new(left),
                filters,
                condition: Box::new(BooleanExpr::Value(Box::new(Expression::BooleanLiteral(true)))),
                alternative: None,
                tail_filters,
            })
        }
    }

    /// `BooleanExpression.parse`: full logical grammar with `not`,
    /// parenthesised grouping, and `and`/`or` chaining (`and`/`or` are
    /// left-associative, `and` binds tighter than `or`).
    pub fn parse_boolean(&mut self) -> crate::error::Result<BooleanExpr> {
        self.parse_or()
    }

    fn parse_or(&mut self) -> crate::error::Result<BooleanExpr> {
        let mut left = self.parse_and()?;
        while self.eat(TokenKind::Or) {
            let right = self.parse_and()?;
            left = BooleanExpr::Or(Box::new(left), Box::new(right));
        }
        Ok(left)
    }

    fn parse_and(&mut self) -> crate::error::Result<BooleanExpr> {
        let mut left = self.parse_not()?;
        while self.eat(TokenKind::And) {
            let right = self.parse_not()?;
            left = BooleanExpr::And(Box::new(left), Box::new(right));
        }
        Ok(left)
    }

    fn parse_not(&mut self) -> crate::error::Result<BooleanExpr> {
        if self.eat(TokenKind::Not) {
            return Ok(BooleanExpr::Not(Box::new(self.parse_not()?)));
        }
        if self.eat(TokenKind::LParen) {
            let inner = self.parse_or()?;
            self.expect(TokenKind::RParen, "')'")?;
            return self.parse_comparison_tail(inner);
        }
        self.parse_comparison()
    }

    fn parse_comparison(&mut self) -> crate::error::Result<BooleanExpr> {
        let left = self.parse_primitive()?;
        let op = match self.peek().kind {
            TokenKind::Eq => CompareOp::Eq,
            TokenKind::Ne => CompareOp::Ne,
            TokenKind::Lt => CompareOp::Lt,
            TokenKind::Le => CompareOp::Le,
            TokenKind::Gt => CompareOp::Gt,
            TokenKind::Ge => CompareOp::Ge,
            TokenKind::Contains => CompareOp::Contains,
            _ => return Ok(BooleanExpr::Value(Box::new(left))),
        };
        self.advance();
        let right = self.parse_primitive()?;
        Ok(BooleanExpr::Compare { left: Box::new(left), op, right: Box::new(right) })
    }

    /// Parentheses exist only to group `and`/`or`/`not` precedence (spec
    /// §4.2); a parenthesised group is itself a complete boolean operand; so
    /// this just hands the group back unchanged.
    fn parse_comparison_tail(&mut self, inner: BooleanExpr) -> crate::error::Result<BooleanExpr> {
        Ok(inner)
    }

    /// `LoopExpression.parse`: `ident in iterable [limit: n] [offset: n|"continue"] [cols: n] [reversed]`.
    pub fn parse_loop(&mut self) -> crate::error::Result<LoopExpr> {
        let span = self.peek_span();
        let name = self.parse_identifier()?;
        self.expect(TokenKind::In, "'in'")?;
        let iterable = match self.peek().kind {
            TokenKind::LParen => self.parse_primitive()?,
            _ => Expression::Path(self.parse_path()?),
        };
        let mut limit = None;
        let mut offset = None;
        let mut cols = None;
        let mut reversed = false;
        loop {
            self.eat(TokenKind::Comma);
            match self.peek().kind {
                TokenKind::Word if self.peek().value == "limit" => {
                    self.advance();
                    self.expect(TokenKind::Colon, "':'")?;
                    limit = Some(self.parse_loop_bound()?);
                }
                TokenKind::Word if self.peek().value == "offset" => {
                    self.advance();
                    self.expect(TokenKind::Colon, "':'")?;
                    offset = Some(self.parse_loop_bound()?);
                }
                TokenKind::Word if self.peek().value == "cols" => {
                    self.advance();
                    self.expect(TokenKind::Colon, "':'")?;
                    cols = Some(Box::new(self.parse_primitive()?));
                }
                TokenKind::Word if self.peek().value == "reversed" => {
                    self.advance();
                    reversed = true;
                }
                _ => break,
            }
        }
        Ok(LoopExpr { name, iterable: Box::new(iterable), limit, offset, cols, reversed, span })
    }

    fn parse_loop_bound(&mut self) -> crate::error::Result<LoopBound> {
        if let TokenKind::String = self.peek().kind {
            if self.peek().value == "continue" {
                self.advance();
                return Ok(LoopBound::Continue);
            }
        }
        let n = self.expect(TokenKind::Integer, "an integer or \"continue\"")?;
        Ok(LoopBound::Integer(n.value.parse().unwrap_or_default()))
    }

    /// `assign <identifier> = <filtered expression>`.
    pub fn parse_assignment(&mut self) -> crate::error::Result<(String, Expression)> {
        let name = self.parse_identifier()?;
        self.expect(TokenKind::Assign, "'='")?;
        let value = self.parse_filtered()?;
        Ok((name, value))
    }

    pub fn finish(&mut self) -> crate::error::Result<()> {
        if !self.at_eof() {
            return Err(self.err(format!("unexpected trailing token '{}'", self.peek().value)));
        }
        Ok(())
    }

    pub fn template_name(&self) -> &str {
        &self.template_name
    }
}
