//! The fine-grained expression sub-lexer (spec §4.2).
//!
//! Re-tokenizes the raw text carried by an `Output`/`Tag` top-level
//! [`crate::lex::Token`] into words, literals, punctuation and keyword
//! operators.

use crate::error::Error;
use crate::lex::{Token, TokenKind};
use crate::span::{Span, Spanned};

pub fn tokenize(text: &str, template_name: &str, base_offset: usize) -> crate::error::Result<Vec<Spanned<Token>>> {
    let mut out = Vec::new();
    let bytes = text.as_bytes();
    let mut i = 0usize;
    while i < bytes.len() {
        let start = i;
        let c = bytes[i] as char;

        if c.is_whitespace() {
            i += 1;
            continue;
        }

        macro_rules! emit {
            ($kind:expr, $len:expr, $val:expr) => {{
                out.push(spanned($kind, $val, template_name, base_offset + start));
                i += $len;
                continue;
            }};
        }

        match c {
            '.' if bytes.get(i + 1) == Some(&b'.') => emit!(TokenKind::Range, 2, ".."),
            '.' => emit!(TokenKind::Dot, 1, "."),
            ',' => emit!(TokenKind::Comma, 1, ","),
            ':' => emit!(TokenKind::Colon, 1, ":"),
            '[' => emit!(TokenKind::LBracket, 1, "["),
            ']' => emit!(TokenKind::RBracket, 1, "]"),
            '(' => emit!(TokenKind::LParen, 1, "("),
            ')' => emit!(TokenKind::RParen, 1, ")"),
            '|' if bytes.get(i + 1) == Some(&b'|') => emit!(TokenKind::DoublePipe, 2, "||"),
            '|' => emit!(TokenKind::Pipe, 1, "|"),
            '=' if bytes.get(i + 1) == Some(&b'=') => emit!(TokenKind::Eq, 2, "=="),
            '=' => emit!(TokenKind::Assign, 1, "="),
            '!' if bytes.get(i + 1) == Some(&b'=') => emit!(TokenKind::Ne, 2, "!="),
            '<' if bytes.get(i + 1) == Some(&b'=') => emit!(TokenKind::Le, 2, "<="),
            '<' => emit!(TokenKind::Lt, 1, "<"),
            '>' if bytes.get(i + 1) == Some(&b'=') => emit!(TokenKind::Ge, 2, ">="),
            '>' => emit!(TokenKind::Gt, 1, ">"),
            '\'' | '"' => {
                let quote = c;
                let mut j = i + 1;
                let mut value = String::new();
                loop {
                    match text[j..].chars().next() {
                        None => {
                            return Err(Error::syntax(
                                "unterminated string literal",
                                Some(Span::new(template_name, base_offset + start)),
                            ));
                        }
                        Some(ch) if ch == quote => {
                            j += ch.len_utf8();
                            break;
                        }
                        Some(ch) => {
                            value.push(ch);
                            j += ch.len_utf8();
                        }
                    }
                }
                out.push(spanned(TokenKind::String, value, template_name, base_offset + start));
                i = j;
                continue;
            }
            c if c.is_ascii_digit() || (c == '-' && bytes.get(i + 1).is_some_and(u8::is_ascii_digit)) => {
                let mut j = i + 1;
                let mut is_float = false;
                while j < bytes.len() && (bytes[j].is_ascii_digit() || (bytes[j] == b'.' && !is_float && bytes.get(j + 1).is_some_and(u8::is_ascii_digit))) {
                    if bytes[j] == b'.' {
                        is_float = true;
                    }
                    j += 1;
                }
                let lexeme = &text[i..j];
                out.push(spanned(
                    if is_float { TokenKind::Float } else { TokenKind::Integer },
                    lexeme,
                    template_name,
                    base_offset + start,
                ));
                i = j;
                continue;
            }
            c if is_word_start(c) => {
                let mut j = i + c.len_utf8();
                while j < bytes.len() && is_word_continue(text[j..].chars().next().unwrap()) {
                    j += text[j..].chars().next().unwrap().len_utf8();
                }
                let word = &text[i..j];
                let kind = keyword_kind(word).unwrap_or(TokenKind::Word);
                out.push(spanned(kind, word, template_name, base_offset + start));
                i = j;
                continue;
            }
            _ => {
                return Err(Error::syntax(
                    format!("unexpected character '{c}' in expression"),
                    Some(Span::new(template_name, base_offset + start)),
                ));
            }
        }
    }
    out.push(spanned(TokenKind::Eof, "", template_name, base_offset + bytes.len()));
    Ok(out)
}

fn spanned(kind: TokenKind, value: impl Into<String>, template_name: &str, offset: usize) -> Spanned<Token> {
    Spanned::new(Token::new(kind, value), Span::new(template_name, offset))
}

fn is_word_start(c: char) -> bool {
    c.is_alphabetic() || c == '_'
}

fn is_word_continue(c: char) -> bool {
    c.is_alphanumeric() || c == '_' || c == '-'
}

fn keyword_kind(word: &str) -> Option<TokenKind> {
    Some(match word {
        "true" => TokenKind::True,
        "false" => TokenKind::False,
        "nil" | "null" => TokenKind::Nil,
        "and" => TokenKind::And,
        "or" => TokenKind::Or,
        "not" => TokenKind::Not,
        "in" => TokenKind::In,
        "with" => TokenKind::With,
        "for" => TokenKind::For,
        "as" => TokenKind::As,
        "if" => TokenKind::If,
        "else" => TokenKind::Else,
        "contains" => TokenKind::Contains,
        _ => return None,
    })
}
