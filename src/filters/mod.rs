//! A minimal default filter set (spec §1 scopes the concrete filter
//! library out, but the registry contract needs at least a few live
//! members to be exercisable end to end). Grounded on the shape of
//! `original_source/liquid/builtin/filters/string.py` for argument
//! conventions, reimplemented against this crate's [`Value`].

use crate::env::{Environment, FilterDescriptor, FilterRegistry};
use crate::error::{Error, Result};
use crate::value::Value;
use indexmap::IndexMap;
use std::sync::Arc;

pub fn builtin_filter_registry() -> FilterRegistry {
    let mut registry = FilterRegistry::new();
    for (name, func) in [
        ("upcase", upcase as _),
        ("downcase", downcase as _),
        ("capitalize", capitalize as _),
        ("strip", strip as _),
        ("append", append as _),
        ("prepend", prepend as _),
        ("size", size as _),
        ("default", default_filter as _),
        ("join", join as _),
        ("first", first as _),
        ("last", last as _),
        ("plus", plus as _),
        ("minus", minus as _),
        ("times", times as _),
        ("abs", abs as _),
        ("escape", escape as _),
    ] {
        registry.insert(
            name.to_string(),
            FilterDescriptor { name: name.to_string(), with_context: false, with_environment: false, func },
        );
    }
    registry
}

fn wrong_args(name: &str) -> Error {
    Error::Value { message: format!("filter {name} received the wrong number of arguments"), span: None }
}

fn upcase(v: &Value, _p: &[Value], _k: &IndexMap<String, Value>, _c: Option<&crate::context::RenderContext<'_>>, _e: &Environment) -> Result<Value> {
    Ok(Value::String(Arc::from(v.as_str().unwrap_or_default().to_uppercase())))
}

fn downcase(v: &Value, _p: &[Value], _k: &IndexMap<String, Value>, _c: Option<&crate::context::RenderContext<'_>>, _e: &Environment) -> Result<Value> {
    Ok(Value::String(Arc::from(v.as_str().unwrap_or_default().to_lowercase())))
}

fn capitalize(v: &Value, _p: &[Value], _k: &IndexMap<String, Value>, _c: Option<&crate::context::RenderContext<'_>>, _e: &Environment) -> Result<Value> {
    let s = v.as_str().unwrap_or_default();
    let mut chars = s.chars();
    let capitalized = match chars.next() {
        Some(first) => first.to_uppercase().collect::<String>() + chars.as_str(),
        None => String::new(),
    };
    Ok(Value::String(Arc::from(capitalized)))
}

fn strip(v: &Value, _p: &[Value], _k: &IndexMap<String, Value>, _c: Option<&crate::context::RenderContext<'_>>, _e: &Environment) -> Result<Value> {
    Ok(Value::String(Arc::from(v.as_str().unwrap_or_default().trim())))
}

fn append(v: &Value, p: &[Value], _k: &IndexMap<String, Value>, _c: Option<&crate::context::RenderContext<'_>>, _e: &Environment) -> Result<Value> {
    let suffix = p.first().ok_or_else(|| wrong_args("append"))?;
    Ok(Value::String(Arc::from(format!("{}{}", v.as_str().unwrap_or_default(), suffix.as_str().unwrap_or_default()))))
}

fn prepend(v: &Value, p: &[Value], _k: &IndexMap<String, Value>, _c: Option<&crate::context::RenderContext<'_>>, _e: &Environment) -> Result<Value> {
    let prefix = p.first().ok_or_else(|| wrong_args("prepend"))?;
    Ok(Value::String(Arc::from(format!("{}{}", prefix.as_str().unwrap_or_default(), v.as_str().unwrap_or_default()))))
}

fn size(v: &Value, _p: &[Value], _k: &IndexMap<String, Value>, _c: Option<&crate::context::RenderContext<'_>>, _e: &Environment) -> Result<Value> {
    Ok(Value::Integer(v.len().unwrap_or(0) as i64))
}

fn default_filter(v: &Value, p: &[Value], _k: &IndexMap<String, Value>, _c: Option<&crate::context::RenderContext<'_>>, _e: &Environment) -> Result<Value> {
    if v.is_truthy() {
        Ok(v.clone())
    } else {
        Ok(p.first().cloned().unwrap_or(Value::Nil))
    }
}

fn join(v: &Value, p: &[Value], _k: &IndexMap<String, Value>, _c: Option<&crate::context::RenderContext<'_>>, e: &Environment) -> Result<Value> {
    let sep = p.first().and_then(Value::as_str).unwrap_or(" ").to_string();
    let items = v.as_array().ok_or_else(|| wrong_args("join"))?;
    let mut rendered = Vec::with_capacity(items.len());
    for item in items {
        rendered.push(crate::value::to_liquid_string(item, e.autoescape)?);
    }
    Ok(Value::String(Arc::from(rendered.join(&sep))))
}

fn first(v: &Value, _p: &[Value], _k: &IndexMap<String, Value>, _c: Option<&crate::context::RenderContext<'_>>, _e: &Environment) -> Result<Value> {
    Ok(v.as_array().and_then(|a| a.first()).cloned().unwrap_or(Value::Nil))
}

fn last(v: &Value, _p: &[Value], _k: &IndexMap<String, Value>, _c: Option<&crate::context::RenderContext<'_>>, _e: &Environment) -> Result<Value> {
    Ok(v.as_array().and_then(|a| a.last()).cloned().unwrap_or(Value::Nil))
}

fn plus(v: &Value, p: &[Value], _k: &IndexMap<String, Value>, _c: Option<&crate::context::RenderContext<'_>>, _e: &Environment) -> Result<Value> {
    let rhs = p.first().ok_or_else(|| wrong_args("plus"))?;
    arith(v, rhs, |a, b| a + b, |a, b| a + b)
}

fn minus(v: &Value, p: &[Value], _k: &IndexMap<String, Value>, _c: Option<&crate::context::RenderContext<'_>>, _e: &Environment) -> Result<Value> {
    let rhs = p.first().ok_or_else(|| wrong_args("minus"))?;
    arith(v, rhs, |a, b| a - b, |a, b| a - b)
}

fn times(v: &Value, p: &[Value], _k: &IndexMap<String, Value>, _c: Option<&crate::context::RenderContext<'_>>, _e: &Environment) -> Result<Value> {
    let rhs = p.first().ok_or_else(|| wrong_args("times"))?;
    arith(v, rhs, |a, b| a * b, |a, b| a * b)
}

fn arith(a: &Value, b: &Value, fi: impl Fn(i64, i64) -> i64, ff: impl Fn(f64, f64) -> f64) -> Result<Value> {
    match (a, b) {
        (Value::Integer(x), Value::Integer(y)) => Ok(Value::Integer(fi(*x, *y))),
        _ => {
            let x = a.to_f64().ok_or_else(|| wrong_args("arithmetic filter"))?;
            let y = b.to_f64().ok_or_else(|| wrong_args("arithmetic filter"))?;
            Ok(Value::Float(ff(x, y)))
        }
    }
}

fn abs(v: &Value, _p: &[Value], _k: &IndexMap<String, Value>, _c: Option<&crate::context::RenderContext<'_>>, _e: &Environment) -> Result<Value> {
    match v {
        Value::Integer(i) => Ok(Value::Integer(i.abs())),
        other => Ok(Value::Float(other.to_f64().unwrap_or(0.0).abs())),
    }
}

fn escape(v: &Value, _p: &[Value], _k: &IndexMap<String, Value>, _c: Option<&crate::context::RenderContext<'_>>, _e: &Environment) -> Result<Value> {
    Ok(Value::Safe(Arc::from(html_escape::encode_text(v.as_str().unwrap_or_default()).into_owned())))
}
