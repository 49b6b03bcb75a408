//! The `Value` sum type values flow through the engine as, and the
//! `Undefined` placeholder produced by a failed lookup (spec §3, §9
//! "Undefined as a sum type").

use crate::error::Error;
use indexmap::IndexMap;
use std::{cmp::Ordering, fmt, ops::Range as StdRange, sync::Arc};

/// How an environment should construct `Undefined` placeholders (spec §3).
#[derive(Clone, Copy, Debug, Eq, PartialEq, Default)]
pub enum UndefinedPolicy {
    /// Silently empty, falsy, zero-length, equal to itself and to `Nil`.
    #[default]
    Lenient,
    /// Like lenient, but `to_string` renders a diagnostic like
    /// `"undefined variable 'x'"` instead of the empty string.
    Debug,
    /// Every operation except producing a debug representation raises
    /// [`Error::Undefined`].
    Strict,
}

/// A placeholder value produced when a path lookup misses (spec §3).
#[derive(Clone, Debug)]
pub struct Undefined {
    pub name: String,
    pub policy: UndefinedPolicy,
}

impl Undefined {
    pub fn new(name: impl Into<String>, policy: UndefinedPolicy) -> Self {
        Self { name: name.into(), policy }
    }

    /// `to_liquid_string`'s contribution for the undefined case.
    pub fn to_output_string(&self) -> crate::error::Result<String> {
        match self.policy {
            UndefinedPolicy::Lenient => Ok(String::new()),
            UndefinedPolicy::Debug => Ok(format!("undefined variable '{}'", self.name)),
            UndefinedPolicy::Strict => Err(Error::Undefined { name: self.name.clone(), span: None }),
        }
    }

    pub fn truthy(&self) -> bool {
        false
    }

    pub fn len(&self) -> crate::error::Result<usize> {
        match self.policy {
            UndefinedPolicy::Strict => Err(Error::Undefined { name: self.name.clone(), span: None }),
            _ => Ok(0),
        }
    }
}

impl PartialEq for Undefined {
    /// Lenient/debug `Undefined` compares equal to itself and to `Nil`;
    /// strict `Undefined` never compares equal to anything (spec §9, open
    /// question: preserved to match the reference Python implementation,
    /// which treats strict-undefined equality as always raising except for
    /// identity comparisons the interpreter itself performs internally).
    fn eq(&self, other: &Self) -> bool {
        !matches!(self.policy, UndefinedPolicy::Strict)
            && !matches!(other.policy, UndefinedPolicy::Strict)
    }
}

/// A range literal, inclusive of both ends per Liquid's `(a..b)` syntax.
#[derive(Clone, Debug, PartialEq)]
pub struct LiquidRange {
    pub start: i64,
    pub stop: i64,
}

impl LiquidRange {
    pub fn len(&self) -> usize {
        if self.stop < self.start { 0 } else { (self.stop - self.start + 1) as usize }
    }

    pub fn iter(&self) -> impl DoubleEndedIterator<Item = i64> + Clone {
        let r: StdRange<i64> = self.start..self.stop.saturating_add(1);
        r
    }
}

impl fmt::Display for LiquidRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}..{}", self.start, self.stop)
    }
}

/// The dynamically typed value domain Liquid expressions and filters
/// operate on (spec §9 "Filter polymorphism").
#[derive(Clone, Debug)]
pub enum Value {
    Nil,
    Bool(bool),
    Integer(i64),
    Float(f64),
    String(Arc<str>),
    /// Markup exempt from autoescaping.
    Safe(Arc<str>),
    Array(Vec<Value>),
    Map(IndexMap<String, Value>),
    Range(LiquidRange),
    Undefined(Undefined),
    /// The `empty`/`blank` keyword literals (spec §3). These are never
    /// produced by a lookup or filter, only by evaluating the `empty`/
    /// `blank` expression keywords, and exist solely so `== empty` and
    /// `== blank` can special-case comparison against the other operand's
    /// emptiness/blankness rather than literally comparing to `""`.
    Empty,
    Blank,
}

impl Value {
    pub fn string(s: impl Into<Arc<str>>) -> Self {
        Value::String(s.into())
    }

    pub fn safe(s: impl Into<Arc<str>>) -> Self {
        Value::Safe(s.into())
    }

    pub fn is_undefined(&self) -> bool {
        matches!(self, Value::Undefined(_))
    }

    pub fn is_nil(&self) -> bool {
        matches!(self, Value::Nil)
    }

    /// Liquid truthiness: only `nil`, `false` and `Undefined` are falsy;
    /// `0`, `""` and empty arrays/maps are truthy (this is the property
    /// that most surprises newcomers and that the conformance suite pins).
    pub fn is_truthy(&self) -> bool {
        match self {
            Value::Nil => false,
            Value::Bool(b) => *b,
            Value::Undefined(u) => u.truthy(),
            _ => true,
        }
    }

    pub fn is_empty(&self) -> bool {
        match self {
            Value::String(s) | Value::Safe(s) => s.is_empty(),
            Value::Array(a) => a.is_empty(),
            Value::Map(m) => m.is_empty(),
            Value::Nil | Value::Empty => true,
            Value::Undefined(u) => !matches!(u.policy, UndefinedPolicy::Strict),
            _ => false,
        }
    }

    pub fn is_blank(&self) -> bool {
        match self {
            Value::String(s) | Value::Safe(s) => s.trim().is_empty(),
            Value::Nil | Value::Bool(false) | Value::Blank => true,
            _ => self.is_empty(),
        }
    }

    pub fn len(&self) -> Option<usize> {
        match self {
            Value::String(s) | Value::Safe(s) => Some(s.chars().count()),
            Value::Array(a) => Some(a.len()),
            Value::Map(m) => Some(m.len()),
            Value::Range(r) => Some(r.len()),
            Value::Undefined(u) => u.len().ok(),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::String(s) | Value::Safe(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_array(&self) -> Option<&[Value]> {
        match self {
            Value::Array(a) => Some(a),
            _ => None,
        }
    }

    pub fn to_i64(&self) -> Option<i64> {
        match self {
            Value::Integer(i) => Some(*i),
            Value::Float(f) => Some(*f as i64),
            Value::String(s) | Value::Safe(s) => s.trim().parse().ok(),
            Value::Bool(b) => Some(*b as i64),
            _ => None,
        }
    }

    pub fn to_f64(&self) -> Option<f64> {
        match self {
            Value::Integer(i) => Some(*i as f64),
            Value::Float(f) => Some(*f),
            Value::String(s) | Value::Safe(s) => s.trim().parse().ok(),
            Value::Bool(b) => Some(if *b { 1.0 } else { 0.0 }),
            _ => None,
        }
    }

    /// Iterates the value the way `for`/`tablerow` do: arrays iterate their
    /// elements, ranges their integers, maps their `[key, value]` pairs,
    /// everything else is treated as a single-element sequence unless nil
    /// or undefined (empty).
    pub fn iter_for_loop(&self) -> Vec<Value> {
        match self {
            Value::Array(a) => a.clone(),
            Value::Range(r) => r.iter().map(Value::Integer).collect(),
            Value::Map(m) => m
                .iter()
                .map(|(k, v)| Value::Array(vec![Value::string(k.clone()), v.clone()]))
                .collect(),
            Value::Nil | Value::Undefined(_) => Vec::new(),
            other => vec![other.clone()],
        }
    }

    /// Indexed access used by `Path` segments after the head: numeric index
    /// into arrays, string key into maps, and the special names
    /// `size`/`first`/`last` on strings, arrays and ranges (spec §3).
    pub fn index(&self, segment: &PathSegment, policy: UndefinedPolicy) -> Value {
        match segment {
            PathSegment::Integer(i) => match self {
                Value::Array(a) => {
                    let idx = if *i < 0 { a.len() as i64 + i } else { *i };
                    if idx >= 0 && (idx as usize) < a.len() {
                        a[idx as usize].clone()
                    } else {
                        Value::Undefined(Undefined::new(i.to_string(), policy))
                    }
                }
                Value::Range(r) => {
                    let items: Vec<i64> = r.iter().collect();
                    let idx = if *i < 0 { items.len() as i64 + i } else { *i };
                    if idx >= 0 && (idx as usize) < items.len() {
                        Value::Integer(items[idx as usize])
                    } else {
                        Value::Undefined(Undefined::new(i.to_string(), policy))
                    }
                }
                _ => Value::Undefined(Undefined::new(i.to_string(), policy)),
            },
            PathSegment::Name(name) => {
                match name.as_str() {
                    "size" => {
                        if let Some(len) = self.len() {
                            return Value::Integer(len as i64);
                        }
                    }
                    "first" => match self {
                        Value::Array(a) => return a.first().cloned().unwrap_or(Value::Nil),
                        Value::Range(r) => return Value::Integer(r.start),
                        Value::String(s) | Value::Safe(s) => {
                            return s
                                .chars()
                                .next()
                                .map(|c| Value::string(c.to_string()))
                                .unwrap_or(Value::Nil);
                        }
                        _ => {}
                    },
                    "last" => match self {
                        Value::Array(a) => return a.last().cloned().unwrap_or(Value::Nil),
                        Value::Range(r) => return Value::Integer(r.stop),
                        Value::String(s) | Value::Safe(s) => {
                            return s
                                .chars()
                                .last()
                                .map(|c| Value::string(c.to_string()))
                                .unwrap_or(Value::Nil);
                        }
                        _ => {}
                    },
                    _ => {}
                }
                match self {
                    Value::Map(m) => m
                        .get(name.as_str())
                        .cloned()
                        .unwrap_or_else(|| Value::Undefined(Undefined::new(name.clone(), policy))),
                    _ => Value::Undefined(Undefined::new(name.clone(), policy)),
                }
            }
        }
    }
}

/// One segment of a [`crate::expr::Path`] (spec §3: identifier, integer
/// index, or a nested path from a bracket expression — nested paths are
/// resolved to a `Name`/`Integer` before indexing, see `expr::Path::resolve`).
#[derive(Clone, Debug, PartialEq)]
pub enum PathSegment {
    Name(String),
    Integer(i64),
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        use Value::*;
        match (self, other) {
            (Nil, Nil) => true,
            (Bool(a), Bool(b)) => a == b,
            (Integer(a), Integer(b)) => a == b,
            (Float(a), Float(b)) => a == b,
            (Integer(a), Float(b)) | (Float(b), Integer(a)) => *a as f64 == *b,
            (String(a), String(b)) | (Safe(a), Safe(b)) | (String(a), Safe(b)) | (Safe(a), String(b)) => a == b,
            (Array(a), Array(b)) => a == b,
            (Map(a), Map(b)) => a == b,
            (Range(a), Range(b)) => a == b,
            (Undefined(a), Undefined(b)) => a == b,
            (Undefined(u), Nil) | (Nil, Undefined(u)) => !matches!(u.policy, UndefinedPolicy::Strict),
            (Empty, Empty) => true,
            (Empty, other) | (other, Empty) => other.is_empty(),
            (Blank, Blank) => true,
            (Blank, other) | (other, Blank) => other.is_blank(),
            _ => false,
        }
    }
}

impl PartialOrd for Value {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        use Value::*;
        match (self, other) {
            (Integer(a), Integer(b)) => a.partial_cmp(b),
            (Float(a), Float(b)) => a.partial_cmp(b),
            (Integer(a), Float(b)) => (*a as f64).partial_cmp(b),
            (Float(a), Integer(b)) => a.partial_cmp(&(*b as f64)),
            (String(a), String(b)) | (Safe(a), Safe(b)) => a.partial_cmp(b),
            _ => None,
        }
    }
}

/// `to_liquid_string(v, autoescape)` (spec §4.6): the canonical render of a
/// value into output text.
pub fn to_liquid_string(value: &Value, autoescape: bool) -> crate::error::Result<String> {
    let raw = match value {
        Value::Safe(s) => return Ok(s.to_string()),
        Value::String(s) => s.to_string(),
        Value::Bool(b) => b.to_string(),
        Value::Integer(i) => i.to_string(),
        Value::Float(f) => format_float(*f),
        Value::Nil | Value::Empty | Value::Blank => return Ok(String::new()),
        Value::Undefined(u) => u.to_output_string()?,
        Value::Range(r) => r.to_string(),
        Value::Array(items) => {
            if autoescape {
                let mut out = String::new();
                for item in items {
                    out.push_str(&to_liquid_string(item, autoescape)?);
                }
                return Ok(out);
            }
            let mut out = String::new();
            for item in items {
                out.push_str(&to_liquid_string(item, false)?);
            }
            out
        }
        Value::Map(_) => String::new(),
    };
    if autoescape && !matches!(value, Value::Safe(_)) {
        Ok(html_escape::encode_text(&raw).into_owned())
    } else {
        Ok(raw)
    }
}

/// Converts a parsed JSON document into a [`Value`], the bridge used by the
/// CLI's `--context` flag and by host code that keeps its render globals in
/// JSON. Numbers that fit in `i64` stay integral; everything else falls
/// back to `f64`, matching `serde_json`'s own `Number` preference order.
pub fn from_json(json: &serde_json::Value) -> Value {
    match json {
        serde_json::Value::Null => Value::Nil,
        serde_json::Value::Bool(b) => Value::Bool(*b),
        serde_json::Value::Number(n) => match n.as_i64() {
            Some(i) => Value::Integer(i),
            None => Value::Float(n.as_f64().unwrap_or(0.0)),
        },
        serde_json::Value::String(s) => Value::string(s.clone()),
        serde_json::Value::Array(items) => Value::Array(items.iter().map(from_json).collect()),
        serde_json::Value::Object(map) => {
            Value::Map(map.iter().map(|(k, v)| (k.clone(), from_json(v))).collect())
        }
    }
}

fn format_float(f: f64) -> String {
    if f.fract() == 0.0 && f.is_finite() {
        format!("{f:.1}")
    } else {
        f.to_string()
    }
}
