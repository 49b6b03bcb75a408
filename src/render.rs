//! L7: the tree-walking render engine (spec §4.6, §4.7).
//!
//! Grounded on the teacher's `renderer::expand_templates` pass, which walks
//! a parsed tree emitting text into a caller-supplied sink while tracking a
//! template stack for partial nesting; here the sink is a `String` buffer
//! (async rendering goes through the same evaluator, since no built-in tag
//! performs I/O) and the partial stack is `RenderContext::enter_template`.

use crate::ast::Node;
use crate::context::RenderContext;
use crate::error::{Error, Result};
use crate::expr::{BooleanExpr, CompareOp, Expression, LoopBound, LoopExpr, Path, Segment};
use crate::value::{PathSegment, Undefined, Value};

/// Renders a full node list, the template-level entry point. A stray
/// `{% break %}`/`{% continue %}` outside of any loop (spec §4.4) is a
/// syntax error here rather than a silently absorbed signal.
pub fn render_nodes(nodes: &[Node], ctx: &mut RenderContext, out: &mut String) -> Result<()> {
    match render_into(nodes, ctx, out)? {
        ControlFlow::Normal => Ok(()),
        ControlFlow::Break | ControlFlow::Continue => {
            Err(Error::syntax("'break'/'continue' used outside of a loop", None))
        }
    }
}

/// What happened while rendering one node: plain completion, or a
/// loop-control signal bubbling up from a nested `break`/`continue`.
enum ControlFlow {
    Normal,
    Break,
    Continue,
}

fn render_node(node: &Node, ctx: &mut RenderContext, out: &mut String) -> Result<ControlFlow> {
    match node {
        Node::Content { text, .. } => {
            ctx.bump_output(text.len())?;
            out.push_str(text);
            Ok(ControlFlow::Normal)
        }
        Node::Output { expr, .. } => {
            let value = eval_expression(expr, ctx)?;
            let text = crate::value::to_liquid_string(&value, ctx.autoescape())?;
            ctx.bump_output(text.len())?;
            out.push_str(&text);
            Ok(ControlFlow::Normal)
        }
        Node::Echo { expr, .. } => {
            let value = eval_expression(expr, ctx)?;
            let text = crate::value::to_liquid_string(&value, ctx.autoescape())?;
            ctx.bump_output(text.len())?;
            out.push_str(&text);
            Ok(ControlFlow::Normal)
        }
        Node::Raw { text, .. } => {
            out.push_str(text);
            Ok(ControlFlow::Normal)
        }
        Node::Comment { .. } | Node::InlineComment { .. } | Node::Extends { .. } => Ok(ControlFlow::Normal),
        Node::Assign { name, value, .. } => {
            let v = eval_expression(value, ctx)?;
            ctx.assign(name.clone(), v);
            ctx.check_local_namespace_limit()?;
            Ok(ControlFlow::Normal)
        }
        Node::Capture { name, body, .. } => {
            let mut buf = String::new();
            render_into(body, ctx, &mut buf)?;
            let value = if ctx.autoescape() { Value::safe(buf) } else { Value::string(buf) };
            ctx.assign(name.clone(), value);
            Ok(ControlFlow::Normal)
        }
        Node::Increment { name, .. } => {
            let v = ctx.increment(name);
            out.push_str(&v.to_string());
            Ok(ControlFlow::Normal)
        }
        Node::Decrement { name, .. } => {
            let v = ctx.decrement(name);
            out.push_str(&v.to_string());
            Ok(ControlFlow::Normal)
        }
        Node::Cycle { group, values, .. } => {
            let key = group.clone().unwrap_or_else(|| values.len().to_string());
            let idx = ctx.next_cycle(&key, values.len());
            let value = eval_expression(&values[idx], ctx)?;
            let text = crate::value::to_liquid_string(&value, ctx.autoescape())?;
            out.push_str(&text);
            Ok(ControlFlow::Normal)
        }
        Node::If { arms, else_branch, .. } => {
            for arm in arms {
                if eval_boolean(&arm.condition, ctx)? {
                    return render_suppressed(&arm.body, ctx, out);
                }
            }
            match else_branch {
                Some(body) => render_suppressed(body, ctx, out),
                None => Ok(ControlFlow::Normal),
            }
        }
        Node::Unless { condition, body, else_branch, .. } => {
            if !eval_boolean(condition, ctx)? {
                render_suppressed(body, ctx, out)
            } else if let Some(else_body) = else_branch {
                render_suppressed(else_body, ctx, out)
            } else {
                Ok(ControlFlow::Normal)
            }
        }
        Node::Case { subject, whens, else_branch, .. } => {
            let subject_value = eval_expression(subject, ctx)?;
            for when in whens {
                for candidate in &when.values {
                    if eval_expression(candidate, ctx)? == subject_value {
                        return render_suppressed(&when.body, ctx, out);
                    }
                }
            }
            match else_branch {
                Some(body) => render_suppressed(body, ctx, out),
                None => Ok(ControlFlow::Normal),
            }
        }
        Node::For { loop_expr, body, else_branch, .. } => render_for(loop_expr, body, else_branch.as_deref(), ctx, out),
        Node::TableRow { loop_expr, body, .. } => render_tablerow(loop_expr, body, ctx, out),
        Node::Break { .. } => Ok(ControlFlow::Break),
        Node::Continue { .. } => Ok(ControlFlow::Continue),
        Node::IfChanged { body, .. } => {
            let mut buf = String::new();
            render_into(body, ctx, &mut buf)?;
            if ctx.ifchanged("ifchanged", buf.clone()) {
                out.push_str(&buf);
            }
            Ok(ControlFlow::Normal)
        }
        Node::With { bindings, body, .. } => {
            let mut scope = ctx.push_scope();
            for (name, expr) in bindings {
                let v = eval_expression(expr, &mut scope)?;
                scope.set_local(name.clone(), v);
            }
            render_into(body, &mut scope, out)?;
            Ok(ControlFlow::Normal)
        }
        Node::Liquid { body, .. } => render_into(body, ctx, out).map(|_| ControlFlow::Normal),
        Node::Block { name, span, body, .. } => {
            if ctx.disabled_tags.contains("block") {
                return Err(Error::DisabledTag { name: "block".to_string(), span: Some(span.clone()) });
            }
            match ctx.block_chains.get(name).cloned() {
                Some(chain) if !chain.is_empty() => {
                    render_block_chain_level(&chain, chain.len() - 1, ctx, out)?;
                }
                _ => {
                    render_into(body, ctx, out)?;
                }
            }
            Ok(ControlFlow::Normal)
        }
        Node::Macro { .. } => {
            if let Node::Macro { name, .. } = node {
                ctx.define_macro(name.clone(), node.clone());
            }
            Ok(ControlFlow::Normal)
        }
        Node::Call { name, positional, keyword, .. } => render_call(name, positional, keyword, ctx, out).map(|_| ControlFlow::Normal),
        Node::Include { template, with_expr, kwargs, span, .. } => {
            if ctx.disabled_tags.contains("include") {
                return Err(Error::DisabledTag { name: "include".to_string(), span: Some(span.clone()) });
            }
            let name_value = eval_expression(template, ctx)?;
            let name = name_value.as_str().unwrap_or_default().to_string();
            render_partial(&name, with_expr, kwargs, ctx, out).map(|_| ControlFlow::Normal)
        }
        Node::Render { template, with_expr, kwargs, for_loop, alias, .. } => {
            render_isolated_partial(template, with_expr, kwargs, *for_loop, alias.as_deref(), ctx, out).map(|_| ControlFlow::Normal)
        }
        Node::Translate { singular, plural, plural_count, context, kwargs, .. } => {
            render_translate(singular, plural, plural_count, context, kwargs, ctx, out).map(|_| ControlFlow::Normal)
        }
        Node::Illegal { message, .. } => {
            log::debug!("rendering illegal node: {message}");
            Ok(ControlFlow::Normal)
        }
    }
}

/// Renders `body`, suppressing the output entirely if it turns out to be
/// whitespace-only and the environment has not opted out (spec §4.3, §4.6).
fn render_suppressed(body: &[Node], ctx: &mut RenderContext, out: &mut String) -> Result<ControlFlow> {
    let all_blank = body.iter().all(Node::is_blank);
    if all_blank && ctx.env.suppress_blank_control_flow_blocks() {
        // Still execute for side effects (assign, increment, macro …) but
        // discard the (whitespace-only) text.
        let mut sink = String::new();
        let flow = render_into(body, ctx, &mut sink)?;
        return Ok(flow);
    }
    render_into(body, ctx, out)
}

/// Runs a node list to completion within the current (non-looping) flow,
/// translating an inner `Break`/`Continue` signal into a syntax error since
/// it only has meaning inside `for`/`tablerow`.
fn render_into(body: &[Node], ctx: &mut RenderContext, out: &mut String) -> Result<ControlFlow> {
    for node in body {
        match render_node(node, ctx, out)? {
            ControlFlow::Normal => {}
            signal @ (ControlFlow::Break | ControlFlow::Continue) => return Ok(signal),
        }
    }
    Ok(ControlFlow::Normal)
}

fn render_for(loop_expr: &LoopExpr, body: &[Node], else_branch: Option<&[Node]>, ctx: &mut RenderContext, out: &mut String) -> Result<ControlFlow> {
    let iterable = eval_expression(&loop_expr.iterable, ctx)?;
    let mut items = iterable.iter_for_loop();
    if loop_expr.reversed {
        items.reverse();
    }
    let offset = match &loop_expr.offset {
        Some(LoopBound::Integer(n)) => (*n).max(0) as usize,
        Some(LoopBound::Continue) => ctx.tag_namespace().get(&offset_key(loop_expr)).and_then(Value::to_i64).unwrap_or(0).max(0) as usize,
        None => 0,
    };
    if offset < items.len() {
        items.drain(0..offset);
    } else {
        items.clear();
    }
    if let Some(LoopBound::Integer(n)) = loop_expr.limit {
        items.truncate(n.max(0) as usize);
    }
    ctx.tag_namespace().insert(offset_key(loop_expr), Value::Integer((offset + items.len()) as i64));

    if items.is_empty() {
        return match else_branch {
            Some(body) => render_suppressed(body, ctx, out),
            None => Ok(ControlFlow::Normal),
        };
    }

    let len = items.len();
    for (i, item) in items.into_iter().enumerate() {
        ctx.bump_loop_iteration()?;
        let mut scope = ctx.push_scope();
        scope.set_local(loop_expr.name.clone(), item);
        scope.set_local("forloop", forloop_drop(i, len));
        let flow = render_into(body, &mut scope, out)?;
        match flow {
            ControlFlow::Break => break,
            ControlFlow::Continue | ControlFlow::Normal => {}
        }
    }
    Ok(ControlFlow::Normal)
}

/// Keys the `offset: continue` counter by loop variable **and** iterable
/// (`original_source/liquid/builtin/expressions/loop.py`'s
/// `offset_key = f"{self.identifier}-{self.iterable}"`), so two loops that
/// happen to reuse the same loop-variable name over different iterables
/// don't share state.
fn offset_key(loop_expr: &LoopExpr) -> String {
    format!("for-offset:{}-{:?}", loop_expr.name, loop_expr.iterable)
}

fn forloop_drop(index: usize, length: usize) -> Value {
    let mut map = indexmap::IndexMap::new();
    map.insert("index".to_string(), Value::Integer(index as i64 + 1));
    map.insert("index0".to_string(), Value::Integer(index as i64));
    map.insert("rindex".to_string(), Value::Integer((length - index) as i64));
    map.insert("rindex0".to_string(), Value::Integer((length - index - 1) as i64));
    map.insert("first".to_string(), Value::Bool(index == 0));
    map.insert("last".to_string(), Value::Bool(index + 1 == length));
    map.insert("length".to_string(), Value::Integer(length as i64));
    Value::Map(map)
}

fn render_tablerow(loop_expr: &LoopExpr, body: &[Node], ctx: &mut RenderContext, out: &mut String) -> Result<ControlFlow> {
    let iterable = eval_expression(&loop_expr.iterable, ctx)?;
    let mut items = iterable.iter_for_loop();
    if let Some(LoopBound::Integer(n)) = loop_expr.offset {
        if (n.max(0) as usize) < items.len() {
            items.drain(0..n.max(0) as usize);
        } else {
            items.clear();
        }
    }
    if let Some(LoopBound::Integer(n)) = loop_expr.limit {
        items.truncate(n.max(0) as usize);
    }
    let cols = match &loop_expr.cols {
        Some(expr) => eval_expression(expr, ctx)?.to_i64().unwrap_or(items.len() as i64).max(1) as usize,
        None => items.len().max(1),
    };
    let len = items.len();
    out.push_str("<tr class=\"row1\">\n");
    for (i, item) in items.into_iter().enumerate() {
        ctx.bump_loop_iteration()?;
        let col = i % cols;
        if i > 0 && col == 0 {
            out.push_str(&format!("</tr>\n<tr class=\"row{}\">\n", i / cols + 1));
        }
        out.push_str(&format!("<td class=\"col{}\">", col + 1));
        let mut scope = ctx.push_scope();
        scope.set_local(loop_expr.name.clone(), item);
        scope.set_local("tablerowloop", forloop_drop(i, len));
        let flow = render_into(body, &mut scope, out)?;
        out.push_str("</td>");
        if let ControlFlow::Break = flow {
            out.push_str("</tr>\n");
            return Ok(ControlFlow::Normal);
        }
    }
    out.push_str("</tr>\n");
    Ok(ControlFlow::Normal)
}

/// Renders one level of a `{% block %}` override chain (spec §4.5), making
/// `{{ block.super }}` resolve to the eagerly-rendered text of the next
/// level down. `level` counts from the root (0) to the most-derived
/// override (`chain.len() - 1`, the level actually rendered to the caller).
fn render_block_chain_level(chain: &[Vec<Node>], level: usize, ctx: &mut RenderContext, out: &mut String) -> Result<()> {
    let mut scope = ctx.push_scope();
    if level > 0 {
        let mut super_text = String::new();
        render_block_chain_level(chain, level - 1, &mut scope, &mut super_text)?;
        let mut map = indexmap::IndexMap::new();
        map.insert("super".to_string(), Value::safe(super_text));
        scope.set_local("block", Value::Map(map));
    }
    render_into(&chain[level], &mut scope, out)?;
    Ok(())
}

fn render_call(name: &str, positional: &[Expression], keyword: &[(String, Expression)], ctx: &mut RenderContext, out: &mut String) -> Result<()> {
    let Some(macro_node) = ctx.get_macro(name).cloned() else {
        return Err(Error::syntax(format!("call to undefined macro '{name}'"), None));
    };
    let Node::Macro { params, body, .. } = &macro_node else { unreachable!() };
    let mut scope = ctx.push_scope();
    for (i, param) in params.iter().enumerate() {
        let value = if let Some((_, expr)) = keyword.iter().find(|(k, _)| k == &param.name) {
            eval_expression(expr, &mut scope)?
        } else if let Some(expr) = positional.get(i) {
            eval_expression(expr, &mut scope)?
        } else if let Some(default) = &param.default {
            eval_expression(default, &mut scope)?
        } else {
            Value::Undefined(Undefined::new(param.name.clone(), scope.env.undefined_policy))
        };
        scope.set_local(param.name.clone(), value);
    }
    // A macro body renders with `include` and `block` disabled (spec §4.4);
    // restore prior membership afterwards rather than assuming both were absent.
    let had_include = !scope.disabled_tags.insert("include".to_string());
    let had_block = !scope.disabled_tags.insert("block".to_string());
    let result = render_into(body, &mut scope, out);
    if !had_include {
        scope.disabled_tags.remove("include");
    }
    if !had_block {
        scope.disabled_tags.remove("block");
    }
    result?;
    Ok(())
}

fn render_partial(
    name: &str,
    with_expr: &Option<(Expression, Option<String>)>,
    kwargs: &[(String, Expression)],
    ctx: &mut RenderContext,
    out: &mut String,
) -> Result<()> {
    let source = ctx.env.loader.load(name)?;
    let nodes = crate::parser::Parser::new(&source.source, source.matter.clone(), ctx.env)
        .parse()
        .map_err(|e| e.with_origin(&source.source))?;
    let mut depth_guard = ctx.enter_template()?;
    for (key, expr) in kwargs {
        let v = eval_expression(expr, &mut depth_guard)?;
        depth_guard.set_local(key.clone(), v);
    }
    if let Some((expr, alias)) = with_expr {
        let v = eval_expression(expr, &mut depth_guard)?;
        depth_guard.set_local(alias.clone().unwrap_or_else(|| name.to_string()), v);
    }
    render_into(&nodes, &mut depth_guard, out).map_err(|e| e.with_origin(&source.source))?;
    Ok(())
}

/// `{% render %}` differs from `{% include %}` by giving the partial an
/// isolated scope (no access to the caller's locals), per spec §4.4.
fn render_isolated_partial(
    name: &str,
    with_expr: &Option<(Expression, Option<String>)>,
    kwargs: &[(String, Expression)],
    for_loop: bool,
    alias: Option<&str>,
    ctx: &mut RenderContext,
    out: &mut String,
) -> Result<()> {
    let source = ctx.env.loader.load(name)?;
    let nodes = crate::parser::Parser::new(&source.source, source.matter.clone(), ctx.env)
        .with_extra_disabled_tags(["include"])
        .parse()
        .map_err(|e| e.with_origin(&source.source))?;
    let _depth_guard = ctx.enter_template()?;
    let mut globals = indexmap::IndexMap::new();
    for (key, expr) in kwargs {
        globals.insert(key.clone(), eval_expression(expr, ctx)?);
    }
    if let Some((expr, explicit_alias)) = with_expr {
        let value = eval_expression(expr, ctx)?;
        let key = explicit_alias.clone().or_else(|| alias.map(str::to_string)).unwrap_or_else(|| name.to_string());
        if for_loop {
            for item in value.iter_for_loop() {
                let mut fresh = RenderContext::new(ctx.env, globals.clone());
                if ctx.env.carry_loop_iterations {
                    fresh.set_loop_iterations(ctx.loop_iterations());
                }
                fresh.set_local(key.clone(), item);
                render_nodes(&nodes, &mut fresh, out)?;
                if ctx.env.carry_loop_iterations {
                    ctx.set_loop_iterations(fresh.loop_iterations());
                }
            }
            return Ok(());
        }
        globals.insert(key, value);
    }
    let mut fresh = RenderContext::new(ctx.env, globals);
    if ctx.env.carry_loop_iterations {
        fresh.set_loop_iterations(ctx.loop_iterations());
    }
    render_nodes(&nodes, &mut fresh, out)?;
    if ctx.env.carry_loop_iterations {
        ctx.set_loop_iterations(fresh.loop_iterations());
    }
    Ok(())
}

/// Reduces a parsed message block's segments back to `gettext`-style text:
/// literal `%` doubled, each `{{ var }}` replaced by a `%(var)s` placeholder
/// (`original_source/liquid/extra/tags/translate_tag.py`'s
/// `validate_message_block`), so a catalog lookup receives the same shape
/// a Python `gettext` catalog would.
fn raw_message_text(segments: &[crate::ast::MessageSegment]) -> String {
    let mut text = String::new();
    for segment in segments {
        match segment {
            crate::ast::MessageSegment::Text(t) => text.push_str(&t.replace('%', "%%")),
            crate::ast::MessageSegment::Var(name) => {
                text.push_str("%(");
                text.push_str(name);
                text.push_str(")s");
            }
        }
    }
    text
}

/// Replaces `%(name)s` placeholders (and unescapes `%%`) in catalog output,
/// resolving each name against `{% translate %}`'s own keyword arguments
/// first, then the surrounding context — mirrors `TranslateNode._format_message`.
fn substitute_message_vars(text: &str, ctx: &mut RenderContext, kwargs: &[(String, Expression)]) -> Result<String> {
    let mut out = String::with_capacity(text.len());
    let mut rest = text;
    loop {
        let Some(idx) = rest.find('%') else {
            out.push_str(rest);
            break;
        };
        out.push_str(&rest[..idx]);
        let after = &rest[idx + 1..];
        if let Some(stripped) = after.strip_prefix('%') {
            out.push('%');
            rest = stripped;
        } else if let Some(inner) = after.strip_prefix('(') {
            match inner.find(")s") {
                Some(close) => {
                    let name = &inner[..close];
                    let value = kwargs
                        .iter()
                        .find(|(k, _)| k == name)
                        .map(|(_, e)| eval_expression(e, ctx))
                        .transpose()?
                        .or_else(|| ctx.get(name).cloned())
                        .unwrap_or_else(|| Value::Undefined(Undefined::new(name.to_string(), ctx.env.undefined_policy)));
                    out.push_str(&crate::value::to_liquid_string(&value, ctx.autoescape())?);
                    rest = &inner[close + 2..];
                }
                None => {
                    out.push('%');
                    rest = after;
                }
            }
        } else {
            out.push('%');
            rest = after;
        }
    }
    Ok(out)
}

/// Dispatches `{% translate %}` against `Environment::translations` by
/// presence of a plural form and a message context, the way
/// `TranslateNode.gettext` picks `gettext`/`ngettext`/`pgettext`/`npgettext`
/// (spec §4.4). With the default `NullTranslations` this is a passthrough.
fn render_translate(
    singular: &[crate::ast::MessageSegment],
    plural: &Option<Vec<crate::ast::MessageSegment>>,
    plural_count: &Option<Expression>,
    context: &Option<Expression>,
    kwargs: &[(String, Expression)],
    ctx: &mut RenderContext,
    out: &mut String,
) -> Result<()> {
    let count = match plural_count {
        Some(expr) => eval_expression(expr, ctx)?.to_i64().unwrap_or(1),
        None => 1,
    };
    let message_context = match context {
        Some(expr) => {
            let value = eval_expression(expr, ctx)?;
            value.as_str().filter(|s| !s.is_empty()).map(str::to_string)
        }
        None => None,
    };
    let singular_text = raw_message_text(singular);
    let message_text = match plural.as_ref().filter(|_| count != 0) {
        Some(plural_segments) => {
            let plural_text = raw_message_text(plural_segments);
            match &message_context {
                Some(c) => ctx.env.translations.npgettext(c, &singular_text, &plural_text, count),
                None => ctx.env.translations.ngettext(&singular_text, &plural_text, count),
            }
        }
        None => match &message_context {
            Some(c) => ctx.env.translations.pgettext(c, &singular_text),
            None => ctx.env.translations.gettext(&singular_text),
        },
    };
    let rendered = substitute_message_vars(&message_text, ctx, kwargs)?;
    out.push_str(&rendered);
    Ok(())
}

/// Evaluates an [`Expression`] against the current context.
pub fn eval_expression(expr: &Expression, ctx: &mut RenderContext) -> Result<Value> {
    match expr {
        Expression::StringLiteral(s) => Ok(Value::string(s.clone())),
        Expression::IntegerLiteral(i) => Ok(Value::Integer(*i)),
        Expression::FloatLiteral(f) => Ok(Value::Float(*f)),
        Expression::BooleanLiteral(b) => Ok(Value::Bool(*b)),
        Expression::Nil => Ok(Value::Nil),
        Expression::Empty => Ok(Value::Empty),
        Expression::Blank => Ok(Value::Blank),
        Expression::Range(start, stop) => {
            let start = eval_expression(start, ctx)?.to_i64().ok_or_else(|| Error::ty("range bound must be an integer", None))?;
            let stop = eval_expression(stop, ctx)?.to_i64().ok_or_else(|| Error::ty("range bound must be an integer", None))?;
            Ok(Value::Range(crate::value::LiquidRange { start, stop }))
        }
        Expression::Path(path) => eval_path(path, ctx),
        Expression::Filtered { left, filters } => {
            let mut value = eval_expression(left, ctx)?;
            for filter in filters {
                value = apply_filter(filter, value, ctx)?;
            }
            Ok(value)
        }
        Expression::Ternary { left, filters, condition, alternative, tail_filters } => {
            let take_left = eval_boolean(condition, ctx)?;
            let mut value = if take_left {
                let mut v = eval_expression(left, ctx)?;
                for filter in filters {
                    v = apply_filter(filter, v, ctx)?;
                }
                v
            } else {
                match alternative {
                    Some(alt) => eval_expression(alt, ctx)?,
                    None => Value::Nil,
                }
            };
            for filter in tail_filters {
                value = apply_filter(filter, value, ctx)?;
            }
            Ok(value)
        }
    }
}

fn apply_filter(filter: &crate::expr::Filter, value: Value, ctx: &mut RenderContext) -> Result<Value> {
    let Some(descriptor) = ctx.env.filters.get(&filter.name).cloned() else {
        if ctx.env.strict_filters {
            return Err(Error::NoSuchFilter { name: filter.name.clone(), span: Some(filter.span.clone()) });
        }
        return Ok(value);
    };
    let mut positional = Vec::with_capacity(filter.positional.len());
    for p in &filter.positional {
        positional.push(eval_expression(p, ctx)?);
    }
    let mut keyword = indexmap::IndexMap::new();
    for (k, v) in &filter.keyword {
        keyword.insert(k.clone(), eval_expression(v, ctx)?);
    }
    let context_arg = if descriptor.with_context { Some(&*ctx) } else { None };
    (descriptor.func)(&value, &positional, &keyword, context_arg, ctx.env)
}

pub fn eval_boolean(expr: &BooleanExpr, ctx: &mut RenderContext) -> Result<bool> {
    match expr {
        BooleanExpr::Value(e) => Ok(eval_expression(e, ctx)?.is_truthy()),
        BooleanExpr::Not(inner) => Ok(!eval_boolean(inner, ctx)?),
        BooleanExpr::And(a, b) => Ok(eval_boolean(a, ctx)? && eval_boolean(b, ctx)?),
        BooleanExpr::Or(a, b) => Ok(eval_boolean(a, ctx)? || eval_boolean(b, ctx)?),
        BooleanExpr::Compare { left, op, right } => {
            let l = eval_expression(left, ctx)?;
            let r = eval_expression(right, ctx)?;
            Ok(compare(&l, *op, &r))
        }
    }
}

fn compare(l: &Value, op: CompareOp, r: &Value) -> bool {
    match op {
        CompareOp::Eq => l == r,
        CompareOp::Ne => l != r,
        CompareOp::Lt => matches!(l.partial_cmp(r), Some(std::cmp::Ordering::Less)),
        CompareOp::Le => matches!(l.partial_cmp(r), Some(std::cmp::Ordering::Less | std::cmp::Ordering::Equal)),
        CompareOp::Gt => matches!(l.partial_cmp(r), Some(std::cmp::Ordering::Greater)),
        CompareOp::Ge => matches!(l.partial_cmp(r), Some(std::cmp::Ordering::Greater | std::cmp::Ordering::Equal)),
        CompareOp::Contains => match (l, r) {
            (Value::String(s) | Value::Safe(s), Value::String(needle) | Value::Safe(needle)) => s.contains(needle.as_ref()),
            (Value::Array(items), needle) => items.contains(needle),
            _ => false,
        },
    }
}

/// Resolves a [`Path`] against the scope chain, applying each segment's
/// indexed access in turn (spec §4.2, §4.6).
pub fn eval_path(path: &Path, ctx: &mut RenderContext) -> Result<Value> {
    let Some(head) = path.head_name() else {
        return Ok(Value::Nil);
    };
    ctx.track(&path.stringify());
    let mut value = match builtin_variable(head, ctx) {
        Some(v) => v,
        None => ctx
            .get(head)
            .cloned()
            .unwrap_or_else(|| Value::Undefined(Undefined::new(head.to_string(), ctx.env.undefined_policy))),
    };
    for segment in path.segments.iter().skip(1) {
        let resolved_segment = match segment {
            Segment::Name(n) => PathSegment::Name(n.clone()),
            Segment::Integer(i) => PathSegment::Integer(*i),
            Segment::QuotedString(s) => PathSegment::Name(s.clone()),
            Segment::Nested(inner) => {
                let inner_value = eval_expression(inner, ctx)?;
                match inner_value {
                    Value::Integer(i) => PathSegment::Integer(i),
                    other => PathSegment::Name(other.as_str().unwrap_or_default().to_string()),
                }
            }
        };
        value = value.index(&resolved_segment, ctx.env.undefined_policy);
    }
    if value.is_undefined() && ctx.env.undefined_policy == crate::value::UndefinedPolicy::Strict {
        if let Value::Undefined(u) = &value {
            return Err(Error::Undefined { name: u.name.clone(), span: Some(path.span.clone()) });
        }
    }
    Ok(value)
}

/// Context-supplied built-ins available under every scope (spec §5): the
/// render-host clock and a drop exposing the current template's name,
/// grounded on `original_source/liquid/drops/template.py`.
fn builtin_variable(name: &str, ctx: &RenderContext) -> Option<Value> {
    match name {
        "template" => {
            let mut map = indexmap::IndexMap::new();
            map.insert("directory".to_string(), Value::string(""));
            map.insert("name".to_string(), Value::string(""));
            map.insert("suffix".to_string(), Value::string("liquid"));
            Some(Value::Map(map))
        }
        "now" => {
            let now = time::UtcDateTime::now();
            let rendered = now
                .format(&time::format_description::well_known::Iso8601::DEFAULT)
                .unwrap_or_default();
            Some(Value::string(rendered))
        }
        "today" => {
            let today = time::UtcDateTime::now().date();
            let rendered = today
                .format(&time::format_description::well_known::Iso8601::DEFAULT)
                .unwrap_or_default();
            Some(Value::string(rendered))
        }
        _ => {
            let _ = ctx;
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use crate::loader::DictLoader;
    use crate::value::UndefinedPolicy;
    use crate::{Environment, Error, Value};
    use indexmap::IndexMap;
    use std::sync::Arc;

    fn render(source: &str, globals: IndexMap<String, Value>) -> String {
        Environment::default().render_string(source, globals).unwrap()
    }

    #[test]
    fn output_applies_a_filter() {
        let mut globals = IndexMap::new();
        globals.insert("name".to_string(), Value::string("world"));
        assert_eq!(render("Hello, {{ name | upcase }}!", globals), "Hello, WORLD!");
    }

    #[test]
    fn for_loop_iterates_with_forloop_drop() {
        let mut globals = IndexMap::new();
        globals.insert("items".to_string(), Value::Array(vec![Value::Integer(1), Value::Integer(2), Value::Integer(3)]));
        let out = render("{% for item in items %}{{ forloop.index }}:{{ item }},{% endfor %}", globals);
        assert_eq!(out, "1:1,2:2,3:3,");
    }

    #[test]
    fn for_loop_else_runs_on_empty_iterable() {
        let mut globals = IndexMap::new();
        globals.insert("items".to_string(), Value::Array(vec![]));
        let out = render("{% for item in items %}{{ item }}{% else %}empty{% endfor %}", globals);
        assert_eq!(out, "empty");
    }

    #[test]
    fn for_loop_honors_limit_and_offset() {
        let mut globals = IndexMap::new();
        globals.insert("items".to_string(), Value::Range(crate::value::LiquidRange { start: 1, stop: 10 }));
        let out = render("{% for n in items offset: 2 limit: 3 %}{{ n }}{% endfor %}", globals);
        assert_eq!(out, "345");
    }

    #[test]
    fn break_stops_the_loop_early() {
        let mut globals = IndexMap::new();
        globals.insert("items".to_string(), Value::Array(vec![Value::Integer(1), Value::Integer(2), Value::Integer(3)]));
        let out = render("{% for item in items %}{% if item == 2 %}{% break %}{% endif %}{{ item }}{% endfor %}", globals);
        assert_eq!(out, "1");
    }

    #[test]
    fn if_elsif_else_picks_the_first_true_arm() {
        let mut globals = IndexMap::new();
        globals.insert("score".to_string(), Value::Integer(70));
        let out = render(
            "{% if score >= 90 %}A{% elsif score >= 80 %}B{% elsif score >= 60 %}C{% else %}F{% endif %}",
            globals,
        );
        assert_eq!(out, "C");
    }

    #[test]
    fn unless_renders_body_when_condition_is_false() {
        assert_eq!(render("{% unless false %}shown{% endunless %}", IndexMap::new()), "shown");
    }

    #[test]
    fn case_matches_by_equality() {
        let mut globals = IndexMap::new();
        globals.insert("handle".to_string(), Value::string("shirt"));
        let out = render(
            "{% case handle %}{% when 'shoes' %}footwear{% when 'shirt', 'pants' %}clothing{% else %}other{% endcase %}",
            globals,
        );
        assert_eq!(out, "clothing");
    }

    #[test]
    fn assign_and_capture_bind_template_scoped_locals() {
        let out = render("{% assign x = 1 %}{% capture y %}hello{% endcapture %}{{ x }}-{{ y }}", IndexMap::new());
        assert_eq!(out, "1-hello");
    }

    #[test]
    fn increment_and_decrement_share_a_counter_namespace() {
        let out = render("{% increment count %}{% increment count %}{% decrement count %}", IndexMap::new());
        assert_eq!(out, "01-1");
    }

    #[test]
    fn cycle_advances_through_its_value_list_and_wraps() {
        let out = render("{% cycle 'a', 'b' %}{% cycle 'a', 'b' %}{% cycle 'a', 'b' %}", IndexMap::new());
        assert_eq!(out, "aba");
    }

    #[test]
    fn ifchanged_suppresses_repeated_output() {
        let mut globals = IndexMap::new();
        globals.insert("items".to_string(), Value::Array(vec![Value::Integer(1), Value::Integer(1), Value::Integer(2)]));
        let out = render("{% for n in items %}{% ifchanged %}{{ n }}{% endifchanged %}{% endfor %}", globals);
        assert_eq!(out, "12");
    }

    #[test]
    fn with_binds_a_scoped_local_without_leaking_it() {
        let out = render("{% with x: 5 %}{{ x }}{% endwith %}{{ x }}", IndexMap::new());
        assert_eq!(out, "5");
    }

    #[test]
    fn macro_call_binds_positional_and_keyword_arguments() {
        let out = render(
            "{% macro greet name, greeting: 'Hi' %}{{ greeting }}, {{ name }}!{% endmacro %}{% call greet 'Ada' %} {% call greet 'Bo', greeting: 'Yo' %}",
            IndexMap::new(),
        );
        assert_eq!(out, "Hi, Ada! Yo, Bo!");
    }

    #[test]
    fn strict_undefined_policy_raises_on_lookup() {
        let env = Environment::builder().undefined_policy(UndefinedPolicy::Strict).build();
        let template = env.parse("{{ missing }}").unwrap();
        let err = template.render(IndexMap::new()).unwrap_err();
        assert!(matches!(err, Error::Undefined { .. }));
    }

    #[test]
    fn lenient_undefined_policy_renders_as_empty() {
        assert_eq!(render("[{{ missing }}]", IndexMap::new()), "[]");
    }

    #[test]
    fn disabled_tags_are_rejected_at_parse_time() {
        let env = Environment::builder().disable_tag("increment").build();
        let err = env.parse("{% increment x %}").unwrap_err();
        assert!(matches!(err, Error::DisabledTag { .. }));
    }

    #[test]
    fn empty_keyword_compares_against_array_and_string_emptiness() {
        let mut globals = IndexMap::new();
        globals.insert("items".to_string(), Value::Array(vec![]));
        let out = render("{% if items == empty %}yes{% else %}no{% endif %}", globals);
        assert_eq!(out, "yes");

        let mut globals = IndexMap::new();
        globals.insert("items".to_string(), Value::Array(vec![Value::Integer(1)]));
        let out = render("{% if items == empty %}yes{% else %}no{% endif %}", globals);
        assert_eq!(out, "no");
    }

    #[test]
    fn blank_keyword_compares_against_whitespace_only_strings() {
        let mut globals = IndexMap::new();
        globals.insert("text".to_string(), Value::string("   "));
        let out = render("{% if text == blank %}yes{% else %}no{% endif %}", globals);
        assert_eq!(out, "yes");
    }

    #[test]
    fn comment_body_is_not_lexed_for_tags_or_output() {
        let out = render("before{% comment %}{{ broken | %} not real {% endcomment %}after", IndexMap::new());
        assert_eq!(out, "beforeafter");
    }

    #[test]
    fn inline_hash_comment_emits_nothing() {
        let out = render("before{% # this is a comment %}after", IndexMap::new());
        assert_eq!(out, "beforeafter");
    }

    #[test]
    fn inline_hash_comment_rejects_a_line_not_starting_with_hash() {
        let env = Environment::default();
        let err = env.parse("{% # ok\nnot a comment line %}").unwrap_err();
        assert!(matches!(err, Error::Syntax { .. }));
    }

    #[test]
    fn break_inside_tablerow_stops_remaining_cells() {
        let mut globals = IndexMap::new();
        globals.insert("items".to_string(), Value::Array(vec![Value::Integer(1), Value::Integer(2), Value::Integer(3)]));
        let out = render("{% tablerow item in items %}{% if item == 2 %}{% break %}{% endif %}{{ item }}{% endtablerow %}", globals);
        assert_eq!(out, "<tr class=\"row1\">\n<td class=\"col1\">1</td><td class=\"col2\"></td></tr>\n");
    }

    #[test]
    fn assign_escapes_enclosing_blocks_by_default() {
        let out = render("{% for i in (1..1) %}{% assign seen = 'yes' %}{% endfor %}{{ seen }}", IndexMap::new());
        assert_eq!(out, "yes");
    }

    #[test]
    fn block_scope_confines_assign_to_its_innermost_scope() {
        let env = Environment::builder().block_scope(true).build();
        let out = env
            .render_string("{% for i in (1..1) %}{% assign seen = 'yes' %}{% endfor %}[{{ seen }}]", IndexMap::new())
            .unwrap();
        assert_eq!(out, "[]");
    }

    #[test]
    fn carry_loop_iterations_shares_the_budget_across_isolated_renders() {
        let loader = Arc::new(DictLoader::with([("partial".to_string(), "{% for i in (1..5) %}.{% endfor %}".to_string())]));
        let env = Environment::builder().loader(loader).loop_iteration_limit(8).carry_loop_iterations(true).build();
        let err = env.render_string("{% render 'partial' %}{% render 'partial' %}", IndexMap::new()).unwrap_err();
        assert!(matches!(err, Error::LoopIterationLimit { .. }));
    }

    #[test]
    fn render_tag_disables_include_in_its_callee() {
        let loader = Arc::new(DictLoader::with([
            ("outer".to_string(), "{% render 'inner' %}".to_string()),
            ("inner".to_string(), "{% include 'deeper' %}".to_string()),
            ("deeper".to_string(), "deep".to_string()),
        ]));
        let env = Environment::builder().loader(loader).build();
        let err = env.render_string("{% render 'outer' %}", IndexMap::new()).unwrap_err();
        assert!(matches!(err, Error::DisabledTag { .. }));
    }

    #[test]
    fn calling_a_macro_whose_body_has_a_block_is_a_disabled_tag_error() {
        let err = Environment::default()
            .render_string("{% macro m %}{% block b %}fallback{% endblock %}{% endmacro %}{% call m %}", IndexMap::new())
            .unwrap_err();
        assert!(matches!(err, Error::DisabledTag { .. }));
    }

    #[test]
    fn calling_a_macro_whose_body_includes_is_a_disabled_tag_error() {
        let mut globals = IndexMap::new();
        globals.insert("unused".to_string(), Value::Nil);
        let env = Environment::default();
        let err = env.render_string("{% macro m %}{% include 'x' %}{% endmacro %}{% call m %}", globals).unwrap_err();
        assert!(matches!(err, Error::DisabledTag { .. }));
    }

    #[test]
    fn whitespace_only_blocks_are_suppressed_by_default() {
        let mut globals = IndexMap::new();
        globals.insert("flag".to_string(), Value::Bool(true));
        let out = render("before{% if flag %}\n   \n{% endif %}after", globals);
        assert_eq!(out, "beforeafter");
    }

    #[test]
    fn translate_falls_back_to_singular_or_plural_text_with_default_translations() {
        let mut globals = IndexMap::new();
        globals.insert("count".to_string(), Value::Integer(3));
        let out = render(
            "{% translate count: count %}{{ count }} item{% plural %}{{ count }} items{% endtranslate %}",
            globals,
        );
        assert_eq!(out, "3 items");

        let mut globals = IndexMap::new();
        globals.insert("count".to_string(), Value::Integer(1));
        let out = render(
            "{% translate count: count %}{{ count }} item{% plural %}{{ count }} items{% endtranslate %}",
            globals,
        );
        assert_eq!(out, "1 item");
    }

    #[test]
    fn translate_without_plural_renders_the_singular_form() {
        let out = render("{% translate %}Hello, {{ name }}!{% endtranslate %}", {
            let mut globals = IndexMap::new();
            globals.insert("name".to_string(), Value::string("Ada"));
            globals
        });
        assert_eq!(out, "Hello, Ada!");
    }

    #[test]
    fn translate_offset_key_does_not_confuse_two_loops_sharing_a_variable_name() {
        let mut globals = IndexMap::new();
        globals.insert("a".to_string(), Value::Array(vec![Value::Integer(1), Value::Integer(2), Value::Integer(3)]));
        globals.insert("b".to_string(), Value::Array(vec![Value::Integer(10), Value::Integer(20), Value::Integer(30)]));
        let out = render(
            "{% for x in a offset: continue %}{{ x }}{% endfor %}|{% for x in b offset: continue %}{{ x }}{% endfor %}",
            globals,
        );
        assert_eq!(out, "123|102030");
    }
}
