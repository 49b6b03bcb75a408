//! L2: the shared expression sub-language (spec §3, §4.2).

pub mod ast;
mod cache;
mod lexer;
mod parser;

pub use ast::*;
pub use cache::ExpressionCache;
pub use parser::ExprParser;

use crate::lex::Token;
use crate::span::Spanned;

/// Tokenizes and parses `text` (the raw value of an `Output`/`Tag` token)
/// as a filtered expression — the workhorse entry point used by `{{ }}`
/// output nodes, `assign`, `echo`, and most tag bodies.
pub fn parse_filtered_expression(text: &str, template_name: &str, base_offset: usize) -> crate::error::Result<Expression> {
    let tokens: Vec<Spanned<Token>> = lexer::tokenize(text, template_name, base_offset)?;
    let mut parser = ExprParser::new(&tokens, template_name);
    let expr = parser.parse_filtered()?;
    parser.finish()?;
    Ok(expr)
}

pub fn parse_boolean_expression(text: &str, template_name: &str, base_offset: usize) -> crate::error::Result<BooleanExpr> {
    let tokens: Vec<Spanned<Token>> = lexer::tokenize(text, template_name, base_offset)?;
    let mut parser = ExprParser::new(&tokens, template_name);
    let expr = parser.parse_boolean()?;
    parser.finish()?;
    Ok(expr)
}

pub fn parse_loop_expression(text: &str, template_name: &str, base_offset: usize) -> crate::error::Result<LoopExpr> {
    let tokens: Vec<Spanned<Token>> = lexer::tokenize(text, template_name, base_offset)?;
    let mut parser = ExprParser::new(&tokens, template_name);
    let expr = parser.parse_loop()?;
    parser.finish()?;
    Ok(expr)
}

pub fn parse_path(text: &str, template_name: &str, base_offset: usize) -> crate::error::Result<Path> {
    let tokens: Vec<Spanned<Token>> = lexer::tokenize(text, template_name, base_offset)?;
    let mut parser = ExprParser::new(&tokens, template_name);
    let expr = parser.parse_path()?;
    parser.finish()?;
    Ok(expr)
}

pub fn parse_assignment(text: &str, template_name: &str, base_offset: usize) -> crate::error::Result<(String, Expression)> {
    let tokens: Vec<Spanned<Token>> = lexer::tokenize(text, template_name, base_offset)?;
    let mut parser = ExprParser::new(&tokens, template_name);
    let result = parser.parse_assignment()?;
    parser.finish()?;
    Ok(result)
}

pub fn parse_identifier(text: &str, template_name: &str, base_offset: usize) -> crate::error::Result<String> {
    let tokens: Vec<Spanned<Token>> = lexer::tokenize(text, template_name, base_offset)?;
    let mut parser = ExprParser::new(&tokens, template_name);
    let expr = parser.parse_identifier()?;
    parser.finish()?;
    Ok(expr)
}

/// Parses a comma-separated list of expressions (used by `cycle`, `case
/// ... when a, b`).
pub fn parse_expression_list(text: &str, template_name: &str, base_offset: usize) -> crate::error::Result<Vec<Expression>> {
    let tokens: Vec<Spanned<Token>> = lexer::tokenize(text, template_name, base_offset)?;
    let mut parser = ExprParser::new(&tokens, template_name);
    let mut items = vec![parser.parse_primitive()?];
    loop {
        let before = items.len();
        if parser.eat_comma_or_or() {
            items.push(parser.parse_primitive()?);
        }
        if items.len() == before {
            break;
        }
    }
    parser.finish()?;
    Ok(items)
}

impl<'a> ExprParser<'a> {
    /// `case`'s `when` clauses separate values with `,` or `or`.
    pub fn eat_comma_or_or(&mut self) -> bool {
        use crate::lex::TokenKind;
        self.eat(TokenKind::Comma) || self.eat(TokenKind::Or)
    }
}
