//! L1: the top-level lexer (spec §4.1).
//!
//! Splits raw template source into content/output/tag runs. Grounded on the
//! teacher's Wikitext tokenizer in spirit (single forward pass, `memchr` for
//! delimiter scanning) but hand-written rather than PEG-driven, matching the
//! "regex/automaton-driven" lexer spec §4.1 calls for.

mod token;

pub use token::{Token, TokenKind};

use crate::span::{Span, Spanned};
use memchr::memchr;
use std::collections::VecDeque;

/// Which comment shorthand, if any, is recognized in content mode.
#[derive(Clone, Copy, Debug)]
pub struct LexerConfig {
    /// Enables the `{# ... #}` shorthand (spec §4.1, off by default).
    pub template_comments: bool,
}

impl Default for LexerConfig {
    fn default() -> Self {
        Self { template_comments: false }
    }
}

/// Tokenizes one template's source text into a finite sequence of tokens
/// terminated by `Eof`.
pub struct Lexer<'a> {
    source: &'a str,
    template_name: String,
    pos: usize,
    config: LexerConfig,
    done: bool,
    /// Synthesized tokens waiting to be yielded before lexing resumes: a
    /// queued `Expression` token after a `Tag`, or — for a verbatim
    /// `{% comment %}` body — the synthesized `Content` and `endcomment`
    /// `Tag` tokens that stand in for what a second lexing pass would have
    /// produced, had the body actually been re-lexed.
    pending: VecDeque<Spanned<Token>>,
}

impl<'a> Lexer<'a> {
    pub fn new(source: &'a str, template_name: impl Into<String>, config: LexerConfig) -> Self {
        Self {
            source,
            template_name: template_name.into(),
            pos: 0,
            config,
            done: false,
            pending: VecDeque::new(),
        }
    }

    fn span(&self, start: usize) -> Span {
        Span::new(self.template_name.clone(), start)
    }

    fn make(&self, kind: TokenKind, value: impl Into<String>, start: usize) -> Spanned<Token> {
        Spanned::new(Token::new(kind, value), self.span(start))
    }

    /// Finds the next delimiter (`{{`, `{%`, or `{#` if enabled) at or after
    /// `from`, returning its byte offset and a 2-character tag identifying
    /// which one it is.
    fn find_delim(&self, from: usize) -> Option<(usize, &'static str)> {
        let bytes = self.source.as_bytes();
        let mut i = from;
        loop {
            let rel = memchr(b'{', &bytes[i..])?;
            let at = i + rel;
            match bytes.get(at + 1) {
                Some(b'{') => return Some((at, "{{")),
                Some(b'%') => return Some((at, "{%")),
                Some(b'#') if self.config.template_comments => return Some((at, "{#")),
                _ => i = at + 1,
            }
            if i >= bytes.len() {
                return None;
            }
        }
    }

    /// Consumes a single output or tag construct starting at `start`
    /// (which points at the opening delimiter), returning the emitted token
    /// plus whether whitespace control was requested on entry/exit.
    fn lex_construct(&mut self, start: usize, open: &str, close: &str) -> Result<Spanned<Token>, Spanned<Token>> {
        let after_open = start + open.len();
        let (body_start, trim_left) = if self.source[after_open..].starts_with('-') {
            (after_open + 1, true)
        } else {
            (after_open, false)
        };
        let Some(rel_end) = self.source[body_start..].find(close) else {
            self.pos = self.source.len();
            return Err(self.make(TokenKind::Illegal, &self.source[start..], start));
        };
        let mut body_end = body_start + rel_end;
        let trim_right = body_end > body_start && self.source[..body_end].ends_with('-');
        if trim_right {
            body_end -= 1;
        }
        let raw = self.source[body_start..body_end].trim().to_string();
        self.pos = body_start + rel_end + close.len();

        if open == "{{" {
            Ok(self.make_with_trim(TokenKind::Output, raw, start, trim_left, trim_right))
        } else {
            // `{% name rest... %}`: split the tag name from its expression,
            // queuing the expression (if any) as a separate `Expression`
            // token to be yielded immediately after the `Tag` token.
            let mut parts = raw.splitn(2, char::is_whitespace);
            let name = parts.next().unwrap_or_default().to_string();
            let expr_text = parts.next().map(str::trim).unwrap_or("");
            if !expr_text.is_empty() {
                self.pending.push_back(self.make(TokenKind::Expression, expr_text, body_start));
            }
            Ok(self.make_with_trim(TokenKind::Tag, name, start, trim_left, trim_right))
        }
    }

    fn make_with_trim(
        &self,
        kind: TokenKind,
        value: impl Into<String>,
        start: usize,
        trim_left: bool,
        trim_right: bool,
    ) -> Spanned<Token> {
        let mut tok = Token::new(kind, value);
        tok.trim_left = trim_left;
        tok.trim_right = trim_right;
        Spanned::new(tok, self.span(start))
    }

}

impl<'a> Iterator for Lexer<'a> {
    type Item = Spanned<Token>;

    fn next(&mut self) -> Option<Self::Item> {
        if let Some(pending) = self.pending.pop_front() {
            return Some(pending);
        }
        if self.done {
            return None;
        }
        if self.pos >= self.source.len() {
            self.done = true;
            return Some(self.make(TokenKind::Eof, "", self.pos));
        }

        match self.find_delim(self.pos) {
            None => {
                let start = self.pos;
                let text = self.source[start..].to_string();
                self.pos = self.source.len();
                Some(self.make(TokenKind::Content, text, start))
            }
            Some((at, _)) if at > self.pos => {
                let start = self.pos;
                let text = self.source[start..at].to_string();
                self.pos = at;
                Some(self.make(TokenKind::Content, text, start))
            }
            Some((at, "{{")) => match self.lex_construct(at, "{{", "}}") {
                Ok(t) | Err(t) => Some(t),
            },
            Some((at, "{%")) => {
                // `{% raw %}...{% endraw %}` bypasses all further lexing.
                if self.source[at..].starts_with("{% raw %}") || self.source[at..].starts_with("{%raw%}") {
                    return Some(self.lex_raw(at));
                }
                // `{% comment %}...{% endcomment %}`'s body is likewise
                // never lexed for tags or outputs (spec §4.1).
                if self.source[at..].starts_with("{% comment %}") || self.source[at..].starts_with("{%comment%}") {
                    return Some(self.lex_comment(at));
                }
                match self.lex_construct(at, "{%", "%}") {
                    Ok(t) | Err(t) => Some(t),
                }
            }
            Some((at, "{#")) => {
                let Some(rel_end) = self.source[at + 2..].find("#}") else {
                    self.pos = self.source.len();
                    return Some(self.make(TokenKind::Illegal, &self.source[at..], at));
                };
                let end = at + 2 + rel_end + 2;
                self.pos = end;
                self.next()
            }
            Some((_, _)) => unreachable!("find_delim only returns known delimiters"),
        }
    }
}

impl<'a> Lexer<'a> {
    fn lex_raw(&mut self, start: usize) -> Spanned<Token> {
        let end_tag = "{% endraw %}";
        let alt_end_tag = "{%endraw%}";
        let body_start = self.source[start..]
            .find("%}")
            .map(|i| start + i + 2)
            .unwrap_or(self.source.len());
        let rel = self.source[body_start..]
            .find(end_tag)
            .or_else(|| self.source[body_start..].find(alt_end_tag));
        match rel {
            Some(rel) => {
                let body_end = body_start + rel;
                let matched_len = if self.source[body_end..].starts_with(end_tag) {
                    end_tag.len()
                } else {
                    alt_end_tag.len()
                };
                self.pos = body_end + matched_len;
                self.make(TokenKind::Content, &self.source[body_start..body_end], body_start)
            }
            None => {
                self.pos = self.source.len();
                self.make(TokenKind::Content, &self.source[body_start..], body_start)
            }
        }
    }

    /// Scans a `{% comment %}` body verbatim up to the matching
    /// `{% endcomment %}`/`{%endcomment%}`, queuing synthetic `Content` and
    /// `endcomment` `Tag` tokens so the parser's existing `parse_comment`
    /// (which expects that shape) needs no change, while nothing inside the
    /// body is ever tokenized for `{{`/`{%` constructs.
    fn lex_comment(&mut self, start: usize) -> Spanned<Token> {
        let end_tag = "{% endcomment %}";
        let alt_end_tag = "{%endcomment%}";
        let body_start = self.source[start..]
            .find("%}")
            .map(|i| start + i + 2)
            .unwrap_or(self.source.len());
        let rel = self.source[body_start..]
            .find(end_tag)
            .or_else(|| self.source[body_start..].find(alt_end_tag));
        match rel {
            Some(rel) => {
                let body_end = body_start + rel;
                let matched_len = if self.source[body_end..].starts_with(end_tag) {
                    end_tag.len()
                } else {
                    alt_end_tag.len()
                };
                self.pending.push_back(self.make(TokenKind::Content, &self.source[body_start..body_end], body_start));
                self.pending.push_back(self.make(TokenKind::Tag, "endcomment", body_end));
                self.pos = body_end + matched_len;
            }
            None => {
                self.pending.push_back(self.make(TokenKind::Content, &self.source[body_start..], body_start));
                self.pos = self.source.len();
            }
        }
        self.make(TokenKind::Tag, "comment", start)
    }
}

/// Applies `{{-`/`-}}`/`{%-`/`-%}` whitespace control by trimming adjacent
/// `Content` tokens in place (spec §4.1). Must run after a full token list
/// is collected, since a trim request looks at the *previous* token.
pub fn apply_whitespace_control(tokens: &mut [Spanned<Token>]) {
    for i in 0..tokens.len() {
        let (trim_left, trim_right) = (tokens[i].node.trim_left, tokens[i].node.trim_right);
        if trim_left {
            if i > 0 {
                if let TokenKind::Content = tokens[i - 1].node.kind {
                    tokens[i - 1].node.value = tokens[i - 1].node.value.trim_end().to_string();
                }
            }
        }
        if trim_right {
            if i + 1 < tokens.len() {
                if let TokenKind::Content = tokens[i + 1].node.kind {
                    tokens[i + 1].node.value = tokens[i + 1].node.value.trim_start().to_string();
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn lex(src: &str) -> Vec<Spanned<Token>> {
        let mut toks: Vec<_> = Lexer::new(src, "t", LexerConfig::default()).collect();
        apply_whitespace_control(&mut toks);
        toks
    }

    #[test]
    fn content_and_output() {
        let toks = lex("Hello, {{ name }}!");
        assert_eq!(toks[0].node.kind, TokenKind::Content);
        assert_eq!(toks[0].node.value, "Hello, ");
        assert_eq!(toks[1].node.kind, TokenKind::Output);
        assert_eq!(toks[1].node.value, "name");
        assert_eq!(toks[2].node.value, "!");
        assert_eq!(toks[3].node.kind, TokenKind::Eof);
    }

    #[test]
    fn whitespace_control_trims_adjacent_content() {
        let toks = lex("  {{- x -}}  ");
        assert_eq!(toks[0].node.value, "");
        assert_eq!(toks[2].node.value, "");
    }

    #[test]
    fn raw_tag_is_verbatim() {
        let toks = lex("{% raw %}{{ not an expr }}{% endraw %}");
        assert_eq!(toks[0].node.kind, TokenKind::Content);
        assert_eq!(toks[0].node.value, "{{ not an expr }}");
    }

    #[test]
    fn comment_tag_body_is_verbatim() {
        let toks = lex("{% comment %}{{ not an expr }}{% endcomment %}");
        assert_eq!(toks[0].node.kind, TokenKind::Tag);
        assert_eq!(toks[0].node.value, "comment");
        assert_eq!(toks[1].node.kind, TokenKind::Content);
        assert_eq!(toks[1].node.value, "{{ not an expr }}");
        assert_eq!(toks[2].node.kind, TokenKind::Tag);
        assert_eq!(toks[2].node.value, "endcomment");
    }

    #[test]
    fn byte_exactness_invariant() {
        let src = "a{{ b }}c{% d %}e";
        let toks = lex(src);
        for t in &toks {
            if t.node.kind == TokenKind::Content {
                let start = t.span.byte_index;
                assert!(src[start..].starts_with(&t.node.value) || t.node.value.is_empty());
            }
        }
    }
}
