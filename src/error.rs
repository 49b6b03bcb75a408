//! The error taxonomy (spec §4.9, §7).
//!
//! Mirrors the teacher's `renderer::Error`: one `thiserror` enum per concern,
//! `#[from]` conversions so `?` composes across module boundaries, and a
//! wrapper variant (`Error::At`) that attaches the span of the node/token
//! that was executing when a lower-level error surfaced, the way the
//! teacher's `Error::Node` attaches a `LineCol` to a boxed inner error.

use crate::span::Span;
use std::fmt;

/// Tolerance mode governing how *parse* errors propagate (spec §4.3, §7).
#[derive(Clone, Copy, Debug, Eq, PartialEq, Default)]
pub enum Tolerance {
    /// Raise on the first error.
    #[default]
    Strict,
    /// Record the error (via `log::warn!`) and continue, injecting an
    /// `Illegal` node in place of the offending construct.
    Warn,
    /// Silently recover; never logs.
    Lax,
}

/// Every user-visible error this crate can produce.
///
/// Control-flow signals (`break`, `continue`) are deliberately not part of
/// this enum — `render::render_node` returns them as an `Ok(ControlFlow)`
/// variant instead — because they must never be allowed to propagate to a
/// host as a user error.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// A lexical or grammatical error encountered while parsing a template.
    #[error("{message}")]
    Syntax {
        message: String,
        span: Option<Span>,
    },

    /// A value was used in a way its type does not support.
    #[error("{message}")]
    Type {
        message: String,
        span: Option<Span>,
    },

    /// A value was structurally fine but semantically invalid (e.g. a
    /// malformed range, an out-of-range `limit:`).
    #[error("{message}")]
    Value {
        message: String,
        span: Option<Span>,
    },

    /// The loader could not find a template under the requested name.
    #[error("template not found: {name}")]
    TemplateNotFound { name: String },

    /// Two `{% extends %}` tags in one template, or a duplicate `{% block %}`
    /// name within one template's inheritance chain.
    #[error("{message}")]
    TemplateInheritance { message: String, span: Option<Span> },

    /// A `{% block required %}` reached the root of its chain unoverridden.
    #[error("block '{name}' is required, but was not overridden")]
    RequiredBlock { name: String, span: Option<Span> },

    /// The strict `Undefined` variant observed a non-representational
    /// operation.
    #[error("'{name}' is undefined")]
    Undefined { name: String, span: Option<Span> },

    /// `strict_filters=true` and an unregistered filter name was used.
    #[error("unknown filter '{name}'")]
    NoSuchFilter { name: String, span: Option<Span> },

    /// A tag present in `disabled_tags` was used.
    #[error("{name} usage is not allowed in this context")]
    DisabledTag { name: String, span: Option<Span> },

    /// `max_context_depth` exceeded by nested `include`/`render`/`extends`.
    #[error("maximum context depth ({limit}) reached")]
    ContextDepth { limit: usize },

    /// `loop_iteration_limit` exceeded.
    #[error("loop iteration limit ({limit}) reached")]
    LoopIterationLimit { limit: usize },

    /// `output_stream_limit` exceeded.
    #[error("output stream limit ({limit} bytes) reached")]
    OutputStreamLimit { limit: usize },

    /// `local_namespace_limit` exceeded.
    #[error("local namespace limit ({limit} names) reached")]
    LocalNamespaceLimit { limit: usize },

    /// The body of a `{% translate %}` block used a construct other than
    /// plain content and bare variable references.
    #[error("{message}")]
    TranslationSyntax { message: String, span: Option<Span> },

    /// A write to the output buffer failed (only possible for a
    /// caller-supplied `fmt::Write`/`io::Write` sink).
    #[error("write error: {0}")]
    Fmt(#[from] fmt::Error),

    /// An error produced by a template somewhere up the render stack,
    /// annotated with the span of the node that was executing.
    #[error("{source}, on line {line} of {origin}")]
    At {
        #[source]
        source: Box<Error>,
        origin: String,
        line: usize,
    },
}

impl Error {
    pub fn syntax(message: impl Into<String>, span: Option<Span>) -> Self {
        Error::Syntax { message: message.into(), span }
    }

    pub fn ty(message: impl Into<String>, span: Option<Span>) -> Self {
        Error::Type { message: message.into(), span }
    }

    pub fn value(message: impl Into<String>, span: Option<Span>) -> Self {
        Error::Value { message: message.into(), span }
    }

    /// The span attached to this error, if any, prior to being wrapped in
    /// [`Error::At`].
    pub fn span(&self) -> Option<&Span> {
        match self {
            Error::Syntax { span, .. }
            | Error::Type { span, .. }
            | Error::Value { span, .. }
            | Error::TemplateInheritance { span, .. }
            | Error::RequiredBlock { span, .. }
            | Error::Undefined { span, .. }
            | Error::NoSuchFilter { span, .. }
            | Error::DisabledTag { span, .. }
            | Error::TranslationSyntax { span, .. } => span.as_ref(),
            _ => None,
        }
    }

    /// Wraps `self` with the origin and line number computed from `source`,
    /// producing the `"<msg>, on line <n> of <name>"` representation spec
    /// §7 requires — unless already wrapped, or no span is available.
    pub fn with_origin(self, source: &str) -> Self {
        if matches!(self, Error::At { .. }) {
            return self;
        }
        let Some(span) = self.span().cloned() else {
            return self;
        };
        let (line, _col) = span.line_col(source);
        let origin = span.template_name.clone();
        Error::At {
            source: Box::new(self),
            origin,
            line,
        }
    }
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
