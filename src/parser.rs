//! L3: the template parser (spec §4.3) — turns a token stream into a
//! [`Node`] tree, dispatching block tags to their matching terminator via
//! the tag registry. Grounded on the teacher's `wikitext::builder` pass
//! that folds a flat token list into a nested `Token` tree; here the fold
//! is a direct recursive descent rather than a second pass over PEG output,
//! since this crate's lexer is hand-written rather than PEG-generated.

use crate::ast::{IfArm, MacroParam, MessageSegment, Node, WhenArm};
use crate::env::Environment;
use crate::error::{Error, Result, Tolerance};
use crate::expr;
use crate::lex::{apply_whitespace_control, Lexer, LexerConfig, Token, TokenKind};
use crate::span::{Span, Spanned};

pub struct Parser<'a> {
    tokens: Vec<Spanned<Token>>,
    pos: usize,
    template_name: String,
    env: &'a Environment,
    /// Tags disabled for just this parse, layered on top of
    /// `env.disabled_tags` — used by `{% render %}` to disable `include` in
    /// its callee without mutating the shared `Environment` (spec §4.4).
    extra_disabled_tags: std::collections::HashSet<String>,
}

/// What ended a block's node list: a known terminator tag name, or end of
/// input (only valid at the template's top level).
enum BlockEnd {
    Tag(String, Span),
    Eof,
}

impl<'a> Parser<'a> {
    pub fn new(source: &str, template_name: impl Into<String>, env: &'a Environment) -> Self {
        let template_name = template_name.into();
        let config = LexerConfig { template_comments: env.template_comments };
        let mut tokens: Vec<_> = Lexer::new(source, template_name.clone(), config).collect();
        apply_whitespace_control(&mut tokens);
        Self { tokens, pos: 0, template_name, env, extra_disabled_tags: std::collections::HashSet::new() }
    }

    /// Disables additional tags for this parse only, on top of
    /// `env.disabled_tags`.
    pub fn with_extra_disabled_tags(mut self, names: impl IntoIterator<Item = &'static str>) -> Self {
        self.extra_disabled_tags.extend(names.into_iter().map(str::to_string));
        self
    }

    pub fn parse(&mut self) -> Result<Vec<Node>> {
        let (nodes, end) = self.parse_nodes(&[])?;
        if let BlockEnd::Tag(name, span) = end {
            return self.unexpected_tag(&name, span).map(|_| nodes);
        }
        Ok(nodes)
    }

    fn peek(&self) -> &Spanned<Token> {
        &self.tokens[self.pos.min(self.tokens.len() - 1)]
    }

    fn advance(&mut self) -> Spanned<Token> {
        let tok = self.tokens[self.pos.min(self.tokens.len() - 1)].clone();
        if self.pos < self.tokens.len() - 1 {
            self.pos += 1;
        }
        tok
    }

    fn syntax_err(&self, message: impl Into<String>) -> Error {
        Error::syntax(message, Some(self.peek().span.clone()))
    }

    /// Consumes the `Expression` token following a `Tag` token, if the
    /// lexer queued one (spec §4.1: only tags with a non-empty body get
    /// one). Returns its raw text and byte offset.
    fn take_expr_text(&mut self) -> Option<(String, usize)> {
        if self.peek().node.kind == TokenKind::Expression {
            let tok = self.advance();
            Some((tok.node.value, tok.span.byte_index))
        } else {
            None
        }
    }

    fn require_expr_text(&mut self, tag: &str) -> Result<(String, usize)> {
        self.take_expr_text().ok_or_else(|| self.syntax_err(format!("'{tag}' tag requires an argument")))
    }

    fn recover(&self, err: Error) -> Result<Node> {
        match self.env.tolerance {
            Tolerance::Strict => Err(err),
            Tolerance::Warn => {
                log::warn!("{err}");
                Ok(Node::Illegal { message: err.to_string(), span: self.peek().span.clone() })
            }
            Tolerance::Lax => Ok(Node::Illegal { message: err.to_string(), span: self.peek().span.clone() }),
        }
    }

    fn unexpected_tag(&self, name: &str, span: Span) -> Result<()> {
        let err = Error::syntax(format!("unexpected tag '{name}'"), Some(span));
        match self.env.tolerance {
            Tolerance::Strict => Err(err),
            Tolerance::Warn => {
                log::warn!("{err}");
                Ok(())
            }
            Tolerance::Lax => Ok(()),
        }
    }

    /// Parses a filtered expression, consulting `env.expression_cache`
    /// first (spec §4.2) — the workhorse path hit once per `{{ }}` output
    /// and most tag bodies, so it is the one worth caching by raw text.
    fn parse_filtered(&self, text: &str, offset: usize) -> Result<expr::Expression> {
        let template_name = &self.template_name;
        self.env.expression_cache.get_or_insert_with(text, || expr::parse_filtered_expression(text, template_name, offset))
    }

    /// Parses a trailing `with <expr> [as <alias>]` clause off an
    /// `{% include %}`/`{% render %}` tag body, e.g. `"page" with product as p`.
    fn parse_with_clause(&self, text: &str, offset: usize) -> Result<Option<(expr::Expression, Option<String>)>> {
        let Some(idx) = text.find(" with ") else { return Ok(None) };
        let rest = &text[idx + 6..];
        let (value_text, alias) = match rest.split_once(" as ") {
            Some((v, a)) => (v, Some(a.split(',').next().unwrap_or("").trim().to_string())),
            None => (rest.split(',').next().unwrap_or(rest), None),
        };
        let value = self.parse_filtered(value_text.trim(), offset + idx + 6)?;
        Ok(Some((value, alias)))
    }

    /// Parses nodes until one of `terminators` is seen (as a `Tag` token,
    /// left unconsumed) or end of input.
    fn parse_nodes(&mut self, terminators: &[&str]) -> Result<(Vec<Node>, BlockEnd)> {
        let mut nodes = Vec::new();
        loop {
            match self.peek().node.kind {
                TokenKind::Eof => return Ok((nodes, BlockEnd::Eof)),
                TokenKind::Content => {
                    let tok = self.advance();
                    nodes.push(Node::Content { text: tok.node.value, span: tok.span });
                }
                TokenKind::Output => {
                    let tok = self.advance();
                    let expr = self.parse_filtered(&tok.node.value, tok.span.byte_index)?;
                    nodes.push(Node::Output { expr, span: tok.span });
                }
                TokenKind::Tag => {
                    let name = self.peek().node.value.clone();
                    if terminators.contains(&name.as_str()) {
                        let span = self.peek().span.clone();
                        return Ok((nodes, BlockEnd::Tag(name, span)));
                    }
                    match self.parse_tag(&name) {
                        Ok(node) => nodes.push(node),
                        Err(err) => nodes.push(self.recover(err)?),
                    }
                }
                other => return Err(self.syntax_err(format!("unexpected token kind {other:?}"))),
            }
        }
    }

    fn expect_end(&mut self, end: BlockEnd, expected: &str) -> Result<Span> {
        match end {
            BlockEnd::Tag(name, span) if name == expected => {
                self.advance(); // consume the Tag token
                let _ = self.take_expr_text(); // discard e.g. `{% endif %}`'s (absent) body
                Ok(span)
            }
            BlockEnd::Tag(name, span) => Err(Error::syntax(format!("expected '{expected}', found '{name}'"), Some(span))),
            BlockEnd::Eof => Err(self.syntax_err(format!("unexpected end of template, expected '{expected}'"))),
        }
    }

    fn parse_tag(&mut self, name: &str) -> Result<Node> {
        if self.env.disabled_tags.contains(name) || self.extra_disabled_tags.contains(name) {
            return Err(Error::DisabledTag { name: name.to_string(), span: self.peek().span.clone() });
        }
        match name {
            "assign" => self.parse_assign(),
            "capture" => self.parse_capture(),
            "increment" => self.parse_increment(),
            "decrement" => self.parse_decrement(),
            "if" => self.parse_if(),
            "unless" => self.parse_unless(),
            "case" => self.parse_case(),
            "for" => self.parse_for(),
            "tablerow" => self.parse_tablerow(),
            "cycle" => self.parse_cycle(),
            "echo" => self.parse_echo(),
            "liquid" => self.parse_liquid(),
            "comment" => self.parse_comment(),
            "#" => self.parse_inline_comment(),
            "include" => self.parse_include(),
            "render" => self.parse_render(),
            "ifchanged" => self.parse_ifchanged(),
            "block" => self.parse_block(),
            "extends" => self.parse_extends(),
            "macro" => self.parse_macro(),
            "call" => self.parse_call(),
            "with" => self.parse_with(),
            "translate" => self.parse_translate(),
            "break" => self.parse_leaf_tag(Node::Break),
            "continue" => self.parse_leaf_tag(Node::Continue),
            _ => Err(self.syntax_err(format!("unknown tag '{name}'"))),
        }
    }

    fn parse_leaf_tag(&mut self, make: impl FnOnce(Span) -> Node) -> Result<Node> {
        let span = self.advance().span;
        let _ = self.take_expr_text();
        Ok(make(span))
    }

    fn parse_assign(&mut self) -> Result<Node> {
        let span = self.advance().span;
        let (text, offset) = self.require_expr_text("assign")?;
        let (name, value) = expr::parse_assignment(&text, &self.template_name, offset)?;
        Ok(Node::Assign { name, value, span })
    }

    fn parse_capture(&mut self) -> Result<Node> {
        let span = self.advance().span;
        let (text, _) = self.require_expr_text("capture")?;
        let name = text.trim().to_string();
        let (body, end) = self.parse_nodes(&["endcapture"])?;
        self.expect_end(end, "endcapture")?;
        Ok(Node::Capture { name, body, span })
    }

    fn parse_increment(&mut self) -> Result<Node> {
        let span = self.advance().span;
        let (text, _) = self.require_expr_text("increment")?;
        Ok(Node::Increment { name: text.trim().to_string(), span })
    }

    fn parse_decrement(&mut self) -> Result<Node> {
        let span = self.advance().span;
        let (text, _) = self.require_expr_text("decrement")?;
        Ok(Node::Decrement { name: text.trim().to_string(), span })
    }

    fn parse_if(&mut self) -> Result<Node> {
        let span = self.advance().span;
        let (text, offset) = self.require_expr_text("if")?;
        let mut condition = expr::parse_boolean_expression(&text, &self.template_name, offset)?;
        let mut arms = Vec::new();
        loop {
            let (body, end) = self.parse_nodes(&["elsif", "else", "endif"])?;
            arms.push(IfArm { condition, body });
            match end {
                BlockEnd::Tag(name, _) if name == "elsif" => {
                    self.advance();
                    let (text, offset) = self.require_expr_text("elsif")?;
                    condition = expr::parse_boolean_expression(&text, &self.template_name, offset)?;
                }
                BlockEnd::Tag(name, _) if name == "else" => {
                    self.advance();
                    let _ = self.take_expr_text();
                    let (else_body, end) = self.parse_nodes(&["endif"])?;
                    self.expect_end(end, "endif")?;
                    return Ok(Node::If { arms, else_branch: Some(else_body), span });
                }
                other => {
                    self.expect_end(other, "endif")?;
                    return Ok(Node::If { arms, else_branch: None, span });
                }
            }
        }
    }

    fn parse_unless(&mut self) -> Result<Node> {
        let span = self.advance().span;
        let (text, offset) = self.require_expr_text("unless")?;
        let condition = expr::parse_boolean_expression(&text, &self.template_name, offset)?;
        let (body, end) = self.parse_nodes(&["else", "endunless"])?;
        match end {
            BlockEnd::Tag(name, _) if name == "else" => {
                self.advance();
                let _ = self.take_expr_text();
                let (else_body, end) = self.parse_nodes(&["endunless"])?;
                self.expect_end(end, "endunless")?;
                Ok(Node::Unless { condition, body, else_branch: Some(else_body), span })
            }
            other => {
                self.expect_end(other, "endunless")?;
                Ok(Node::Unless { condition, body, else_branch: None, span })
            }
        }
    }

    fn parse_case(&mut self) -> Result<Node> {
        let span = self.advance().span;
        let (text, offset) = self.require_expr_text("case")?;
        let subject = self.parse_filtered(&text, offset)?;
        // Skip any stray content between `case` and the first `when` (Liquid
        // ignores it; it exists only for human-readable indentation).
        let (_, mut end) = self.parse_nodes(&["when", "else", "endcase"])?;
        let mut whens = Vec::new();
        loop {
            match end {
                BlockEnd::Tag(name, _) if name == "when" => {
                    self.advance();
                    let (text, offset) = self.require_expr_text("when")?;
                    let values = expr::parse_expression_list(&text, &self.template_name, offset)?;
                    let (body, next_end) = self.parse_nodes(&["when", "else", "endcase"])?;
                    whens.push(WhenArm { values, body });
                    end = next_end;
                }
                BlockEnd::Tag(name, _) if name == "else" => {
                    self.advance();
                    let _ = self.take_expr_text();
                    let (else_body, next_end) = self.parse_nodes(&["endcase"])?;
                    self.expect_end(next_end, "endcase")?;
                    return Ok(Node::Case { subject, whens, else_branch: Some(else_body), span });
                }
                other => {
                    self.expect_end(other, "endcase")?;
                    return Ok(Node::Case { subject, whens, else_branch: None, span });
                }
            }
        }
    }

    fn parse_for(&mut self) -> Result<Node> {
        let span = self.advance().span;
        let (text, offset) = self.require_expr_text("for")?;
        let loop_expr = expr::parse_loop_expression(&text, &self.template_name, offset)?;
        let (body, end) = self.parse_nodes(&["else", "endfor"])?;
        match end {
            BlockEnd::Tag(name, _) if name == "else" => {
                self.advance();
                let _ = self.take_expr_text();
                let (else_body, end) = self.parse_nodes(&["endfor"])?;
                self.expect_end(end, "endfor")?;
                Ok(Node::For { loop_expr, body, else_branch: Some(else_body), span })
            }
            other => {
                self.expect_end(other, "endfor")?;
                Ok(Node::For { loop_expr, body, else_branch: None, span })
            }
        }
    }

    fn parse_tablerow(&mut self) -> Result<Node> {
        let span = self.advance().span;
        let (text, offset) = self.require_expr_text("tablerow")?;
        let loop_expr = expr::parse_loop_expression(&text, &self.template_name, offset)?;
        let (body, end) = self.parse_nodes(&["endtablerow"])?;
        self.expect_end(end, "endtablerow")?;
        Ok(Node::TableRow { loop_expr, body, span })
    }

    fn parse_cycle(&mut self) -> Result<Node> {
        let span = self.advance().span;
        let (text, offset) = self.require_expr_text("cycle")?;
        // An optional leading `"group": ` before the comma-separated values.
        let (group, rest, rest_offset) = match text.split_once(':') {
            Some((maybe_group, rest)) if maybe_group.trim_start().starts_with(['"', '\'']) => {
                let g = self.parse_filtered(maybe_group.trim(), offset)?;
                let group = g.is_literal_string().map(str::to_string);
                let rest_offset = offset + maybe_group.len() + 1;
                (group, rest.to_string(), rest_offset)
            }
            _ => (None, text.clone(), offset),
        };
        let values = expr::parse_expression_list(&rest, &self.template_name, rest_offset)?;
        Ok(Node::Cycle { group, values, span })
    }

    fn parse_echo(&mut self) -> Result<Node> {
        let span = self.advance().span;
        let (text, offset) = self.require_expr_text("echo")?;
        let expr = self.parse_filtered(&text, offset)?;
        Ok(Node::Echo { expr, span })
    }

    /// `{% liquid ... %}`: each line of the body is itself a tag name plus
    /// arguments, newline-delimited, with no delimiters of its own.
    fn parse_liquid(&mut self) -> Result<Node> {
        let span = self.advance().span;
        let (text, offset) = self.require_expr_text("liquid")?;
        let mut body = Vec::new();
        let mut cursor = offset;
        for line in text.split('\n') {
            let trimmed = line.trim();
            cursor += line.len() + 1;
            if trimmed.is_empty() || trimmed.starts_with('#') {
                continue;
            }
            let mut sub = Parser::new(&format!("{{% {trimmed} %}}"), self.template_name.clone(), self.env);
            body.extend(sub.parse()?);
        }
        let _ = cursor;
        Ok(Node::Liquid { body, span })
    }

    fn parse_comment(&mut self) -> Result<Node> {
        let span = self.advance().span;
        let _ = self.take_expr_text();
        let (_, end) = self.parse_nodes(&["endcomment"])?;
        self.expect_end(end, "endcomment")?;
        Ok(Node::Comment { span })
    }

    /// `{% # ... %}`: a single-construct inline comment (spec §4.1). Every
    /// line of the body must start with `#` (ignoring leading whitespace),
    /// or be blank; anything else is a syntax error rather than silently
    /// swallowed content.
    fn parse_inline_comment(&mut self) -> Result<Node> {
        let span = self.advance().span;
        if let Some((text, _)) = self.take_expr_text() {
            // The tag name `#` already consumed the first line's own
            // leading `#`; only continuation lines need to carry one.
            for line in text.lines().skip(1) {
                let trimmed = line.trim_start();
                if !trimmed.is_empty() && !trimmed.starts_with('#') {
                    return Err(self.syntax_err("every line of an inline '#' comment must start with '#'"));
                }
            }
        }
        Ok(Node::InlineComment { span })
    }

    fn parse_kwargs(&mut self, text: &str, offset: usize) -> Result<(String, Vec<(String, crate::expr::Expression)>)> {
        // `include "name", foo: 1, bar: baz` — split the leading quoted or
        // bare template-name token from the rest by the first top-level comma.
        let trimmed = text.trim_start();
        let consumed = trimmed.len() - trimmed.trim_start().len();
        let name_offset = offset + (text.len() - trimmed.len()) + consumed;
        let (name_text, rest) = split_first_arg(trimmed);
        let name = name_text.trim().trim_matches('"').trim_matches('\'').to_string();
        let mut kwargs = Vec::new();
        if let Some(rest) = rest {
            let rest_offset = name_offset + name_text.len();
            for pair in split_top_level_commas(rest) {
                if let Some((k, v)) = pair.split_once(':') {
                    let value = self.parse_filtered(v.trim(), rest_offset)?;
                    kwargs.push((k.trim().to_string(), value));
                }
            }
        }
        Ok((name, kwargs))
    }

    fn parse_include(&mut self) -> Result<Node> {
        let span = self.advance().span;
        let (text, offset) = self.require_expr_text("include")?;
        let template = self.parse_filtered(text.split(',').next().unwrap_or(&text).trim(), offset)?;
        let with_expr = self.parse_with_clause(&text, offset)?;
        let (_, kwargs) = self.parse_kwargs(&text, offset)?;
        Ok(Node::Include { template, with_expr, kwargs, span })
    }

    fn parse_render(&mut self) -> Result<Node> {
        let span = self.advance().span;
        let (text, offset) = self.require_expr_text("render")?;
        let for_loop = text.contains(" for ");
        let (name, kwargs) = self.parse_kwargs(&text, offset)?;
        let with_expr = self.parse_with_clause(&text, offset)?;
        let alias = text
            .split(" as ")
            .nth(1)
            .map(|s| s.split(',').next().unwrap_or("").trim().to_string())
            .filter(|s| !s.is_empty());
        Ok(Node::Render { template: name, with_expr, for_loop, alias, kwargs, span })
    }

    fn parse_ifchanged(&mut self) -> Result<Node> {
        let span = self.advance().span;
        let _ = self.take_expr_text();
        let (body, end) = self.parse_nodes(&["endifchanged"])?;
        self.expect_end(end, "endifchanged")?;
        Ok(Node::IfChanged { body, span })
    }

    fn parse_block(&mut self) -> Result<Node> {
        let span = self.advance().span;
        let (text, _) = self.require_expr_text("block")?;
        let required = text.trim_end().ends_with("required");
        let name = text.trim().trim_end_matches("required").trim().to_string();
        let (body, end) = self.parse_nodes(&["endblock"])?;
        self.expect_end(end, "endblock")?;
        Ok(Node::Block { name, required, body, span })
    }

    fn parse_extends(&mut self) -> Result<Node> {
        let span = self.advance().span;
        let (text, _) = self.require_expr_text("extends")?;
        let template = text.trim().trim_matches('"').trim_matches('\'').to_string();
        Ok(Node::Extends { template, span })
    }

    fn parse_macro(&mut self) -> Result<Node> {
        let span = self.advance().span;
        let (text, offset) = self.require_expr_text("macro")?;
        let (name_text, rest) = split_first_arg(&text);
        let name = name_text.trim().to_string();
        let mut params = Vec::new();
        if let Some(rest) = rest {
            let rest_offset = offset + name_text.len();
            for part in split_top_level_commas(rest) {
                match part.split_once(':') {
                    Some((k, v)) => {
                        let default = self.parse_filtered(v.trim(), rest_offset)?;
                        params.push(MacroParam { name: k.trim().to_string(), default: Some(default) });
                    }
                    None if !part.trim().is_empty() => {
                        params.push(MacroParam { name: part.trim().to_string(), default: None });
                    }
                    None => {}
                }
            }
        }
        let (body, end) = self.parse_nodes(&["endmacro"])?;
        self.expect_end(end, "endmacro")?;
        Ok(Node::Macro { name, params, body, span })
    }

    fn parse_call(&mut self) -> Result<Node> {
        let span = self.advance().span;
        let (text, offset) = self.require_expr_text("call")?;
        let (name_text, rest) = split_first_arg(&text);
        let name = name_text.trim().to_string();
        let mut positional = Vec::new();
        let mut keyword = Vec::new();
        if let Some(rest) = rest {
            for part in split_top_level_commas(rest) {
                let part = part.trim();
                if part.is_empty() {
                    continue;
                }
                if let Some((k, v)) = part.split_once(':') {
                    let value = self.parse_filtered(v.trim(), offset)?;
                    keyword.push((k.trim().to_string(), value));
                } else {
                    positional.push(self.parse_filtered(part, offset)?);
                }
            }
        }
        Ok(Node::Call { name, positional, keyword, span })
    }

    fn parse_with(&mut self) -> Result<Node> {
        let span = self.advance().span;
        let (text, offset) = self.require_expr_text("with")?;
        let mut bindings = Vec::new();
        for part in split_top_level_commas(&text) {
            if let Some((k, v)) = part.split_once('=').or_else(|| part.split_once(':')) {
                let value = self.parse_filtered(v.trim(), offset)?;
                bindings.push((k.trim().to_string(), value));
            }
        }
        let (body, end) = self.parse_nodes(&["endwith"])?;
        self.expect_end(end, "endwith")?;
        Ok(Node::With { bindings, body, span })
    }

    fn parse_translate(&mut self) -> Result<Node> {
        let span = self.advance().span;
        let (text, offset) = self.require_expr_text("translate")?;
        let (_, kwargs) = self.parse_kwargs(&format!("_, {text}"), offset)?;
        let plural_count = kwargs.iter().find(|(k, _)| k == "count").map(|(_, v)| v.clone());
        let context = kwargs.iter().find(|(k, _)| k == "context").map(|(_, v)| v.clone());
        let (singular_nodes, end) = self.parse_nodes(&["plural", "endtranslate"])?;
        let singular = message_segments(&singular_nodes);
        let plural = match end {
            BlockEnd::Tag(name, _) if name == "plural" => {
                self.advance();
                let _ = self.take_expr_text();
                let (plural_nodes, end) = self.parse_nodes(&["endtranslate"])?;
                self.expect_end(end, "endtranslate")?;
                Some(message_segments(&plural_nodes))
            }
            other => {
                self.expect_end(other, "endtranslate")?;
                None
            }
        };
        Ok(Node::Translate { singular, plural, plural_count, context, kwargs, span })
    }
}

/// Reduces a parsed `{% translate %}` body back to plain text + bare
/// variable segments (spec §4.4: no filters or nested paths allowed there).
fn message_segments(nodes: &[Node]) -> Vec<MessageSegment> {
    nodes
        .iter()
        .map(|n| match n {
            Node::Content { text, .. } => MessageSegment::Text(text.clone()),
            Node::Output { expr, .. } => match expr {
                crate::expr::Expression::Path(p) => MessageSegment::Var(p.stringify()),
                _ => MessageSegment::Text(String::new()),
            },
            _ => MessageSegment::Text(String::new()),
        })
        .collect()
}


/// Splits `name rest...` on the first run of whitespace or comma, returning
/// the first argument (unquoted) and the remainder, if any.
fn split_first_arg(text: &str) -> (&str, Option<&str>) {
    let trimmed = text.trim_start();
    let end = trimmed
        .find([',', ' ', '\t'])
        .unwrap_or(trimmed.len());
    let (first, rest) = trimmed.split_at(end);
    let rest = rest.trim_start_matches(',').trim();
    (first, if rest.is_empty() { None } else { Some(rest) })
}

/// Splits on commas that are not inside a quoted string or bracket/paren
/// nesting (used for kwarg lists, macro params, call arguments).
fn split_top_level_commas(text: &str) -> Vec<&str> {
    let mut parts = Vec::new();
    let mut depth = 0i32;
    let mut in_quote = None;
    let mut start = 0;
    let bytes = text.as_bytes();
    for (i, &b) in bytes.iter().enumerate() {
        match b {
            b'"' | b'\'' if in_quote.is_none() => in_quote = Some(b),
            c if Some(c) == in_quote => in_quote = None,
            b'[' | b'(' if in_quote.is_none() => depth += 1,
            b']' | b')' if in_quote.is_none() => depth -= 1,
            b',' if in_quote.is_none() && depth == 0 => {
                parts.push(text[start..i].trim());
                start = i + 1;
            }
            _ => {}
        }
    }
    let tail = text[start..].trim();
    if !tail.is_empty() {
        parts.push(tail);
    }
    parts
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(src: &str) -> Vec<Node> {
        let env = Environment::default();
        Parser::new(src, "t", &env).parse().expect("parse")
    }

    #[test]
    fn parses_if_else() {
        let nodes = parse("{% if a %}yes{% else %}no{% endif %}");
        assert!(matches!(nodes[0], Node::If { .. }));
    }

    #[test]
    fn parses_for_loop() {
        let nodes = parse("{% for x in (1..3) %}{{ x }}{% endfor %}");
        assert!(matches!(nodes[0], Node::For { .. }));
    }

    #[test]
    fn rejects_mismatched_end_tag_strictly() {
        let env = Environment::default();
        let err = Parser::new("{% if a %}x{% endfor %}", "t", &env).parse();
        assert!(err.is_err());
    }

    #[test]
    fn assign_parses_name_and_expression() {
        let nodes = parse("{% assign x = 1 | plus: 2 %}");
        match &nodes[0] {
            Node::Assign { name, .. } => assert_eq!(name, "x"),
            other => panic!("expected Assign, got {other:?}"),
        }
    }
}
