//! L4: the process-wide `Environment` (spec §3, §5).
//!
//! An `Environment` is built once and shared immutably across renders,
//! mirroring the teacher's `config::CONFIG` static record of parser
//! configuration (namespace tables, magic words, …): here the equivalent
//! record is the tag registry, filter registry, loader and render limits.

use crate::error::Tolerance;
use crate::expr::ExpressionCache;
use crate::loader::Loader;
use crate::tags::{TagDescriptor, TagRegistry};
use crate::translations::{NullTranslations, Translations};
use crate::value::{UndefinedPolicy, Value};
use indexmap::IndexMap;
use std::collections::HashSet;
use std::sync::Arc;

/// A registered filter: a function pointer plus the injection metadata
/// spec §3/§6.2 describe. Concrete filter *implementations* (math, string,
/// array, date, HTML, i18n) are outside this crate's scope (spec §1); the
/// handful registered by [`filters::builtin`] are a minimal demonstration
/// set sufficient to exercise `{{ v | filter }}` output, not a claim to
/// implement "the" Liquid filter library.
pub type FilterFn = fn(
    &Value,
    &[Value],
    &IndexMap<String, Value>,
    Option<&crate::context::RenderContext<'_>>,
    &Environment,
) -> crate::error::Result<Value>;

#[derive(Clone)]
pub struct FilterDescriptor {
    pub name: String,
    pub with_context: bool,
    pub with_environment: bool,
    pub func: FilterFn,
}

pub type FilterRegistry = std::collections::HashMap<String, FilterDescriptor>;

/// Process-wide configuration, safe for concurrent immutable use once built
/// (spec §5 "Shared resources").
pub struct Environment {
    pub tags: TagRegistry,
    pub filters: FilterRegistry,
    pub loader: Arc<dyn Loader>,
    pub undefined_policy: UndefinedPolicy,
    pub tolerance: Tolerance,
    pub autoescape: bool,
    pub strict_filters: bool,
    pub template_comments: bool,
    pub comment_start_string: String,
    pub comment_end_string: String,
    pub max_context_depth: usize,
    pub loop_iteration_limit: usize,
    pub output_stream_limit: usize,
    pub local_namespace_limit: usize,
    pub expression_cache: Arc<ExpressionCache>,
    /// Bound on digit count accepted by numeric-string coercion (spec §5
    /// "DoS guards" / `original_source/liquid/limits.py`). `0` disables
    /// the check; otherwise clamped to at least `640`.
    pub max_number_of_digits: usize,
    /// When `true`, a block whose output is entirely whitespace is still
    /// forwarded to its parent buffer. This is the positive framing of the
    /// same knob spec §8 calls `suppress_blank_control_flow_blocks` in its
    /// negated form; see [`Environment::suppress_blank_control_flow_blocks`].
    pub render_whitespace_only_blocks: bool,
    pub disabled_tags: HashSet<String>,
    pub allow_parens_in_boolean: bool,
    pub allow_not_in_boolean: bool,
    /// Whether `{% assign %}` writes to the innermost scope (`true`) rather
    /// than through to the template-level scope (`false`, the common
    /// default; spec §3(vii)).
    pub block_scope: bool,
    /// Whether a `{% render %}`'s isolated child context shares the
    /// caller's consumed `loop_iteration_limit` budget instead of getting a
    /// fresh one (spec §3(vii)).
    pub carry_loop_iterations: bool,
    /// Message catalog backend for `{% translate %}` (spec §4.4). Defaults
    /// to [`NullTranslations`], a passthrough.
    pub translations: Arc<dyn Translations>,
}

impl Environment {
    pub fn builder() -> EnvironmentBuilder {
        EnvironmentBuilder::default()
    }

    pub fn suppress_blank_control_flow_blocks(&self) -> bool {
        !self.render_whitespace_only_blocks
    }

    pub fn digit_limit(&self) -> Option<usize> {
        if self.max_number_of_digits == 0 {
            None
        } else {
            Some(self.max_number_of_digits.max(640))
        }
    }
}

pub struct EnvironmentBuilder {
    tags: TagRegistry,
    filters: FilterRegistry,
    loader: Option<Arc<dyn Loader>>,
    undefined_policy: UndefinedPolicy,
    tolerance: Tolerance,
    autoescape: bool,
    strict_filters: bool,
    template_comments: bool,
    comment_start_string: String,
    comment_end_string: String,
    max_context_depth: usize,
    loop_iteration_limit: usize,
    output_stream_limit: usize,
    local_namespace_limit: usize,
    expression_cache_size: u32,
    max_number_of_digits: usize,
    render_whitespace_only_blocks: bool,
    disabled_tags: HashSet<String>,
    block_scope: bool,
    carry_loop_iterations: bool,
    translations: Option<Arc<dyn Translations>>,
}

impl Default for EnvironmentBuilder {
    fn default() -> Self {
        Self {
            tags: crate::tags::builtin_tag_registry(),
            filters: crate::filters::builtin_filter_registry(),
            loader: None,
            undefined_policy: UndefinedPolicy::Lenient,
            tolerance: Tolerance::Strict,
            autoescape: false,
            strict_filters: false,
            template_comments: false,
            comment_start_string: "{#".to_string(),
            comment_end_string: "#}".to_string(),
            max_context_depth: 30,
            loop_iteration_limit: usize::MAX,
            output_stream_limit: usize::MAX,
            local_namespace_limit: usize::MAX,
            expression_cache_size: 256,
            max_number_of_digits: 4300,
            render_whitespace_only_blocks: false,
            disabled_tags: HashSet::new(),
            block_scope: false,
            carry_loop_iterations: false,
            translations: None,
        }
    }
}

impl EnvironmentBuilder {
    pub fn loader(mut self, loader: Arc<dyn Loader>) -> Self {
        self.loader = Some(loader);
        self
    }

    pub fn tag(mut self, descriptor: TagDescriptor) -> Self {
        self.tags.insert(descriptor.name.clone(), descriptor);
        self
    }

    pub fn filter(mut self, descriptor: FilterDescriptor) -> Self {
        self.filters.insert(descriptor.name.clone(), descriptor);
        self
    }

    pub fn undefined_policy(mut self, policy: UndefinedPolicy) -> Self {
        self.undefined_policy = policy;
        self
    }

    pub fn tolerance(mut self, tolerance: Tolerance) -> Self {
        self.tolerance = tolerance;
        self
    }

    pub fn autoescape(mut self, value: bool) -> Self {
        self.autoescape = value;
        self
    }

    pub fn strict_filters(mut self, value: bool) -> Self {
        self.strict_filters = value;
        self
    }

    pub fn template_comments(mut self, value: bool) -> Self {
        self.template_comments = value;
        self
    }

    pub fn max_context_depth(mut self, value: usize) -> Self {
        self.max_context_depth = value;
        self
    }

    pub fn loop_iteration_limit(mut self, value: usize) -> Self {
        self.loop_iteration_limit = value;
        self
    }

    pub fn output_stream_limit(mut self, value: usize) -> Self {
        self.output_stream_limit = value;
        self
    }

    pub fn local_namespace_limit(mut self, value: usize) -> Self {
        self.local_namespace_limit = value;
        self
    }

    pub fn expression_cache_size(mut self, value: u32) -> Self {
        self.expression_cache_size = value;
        self
    }

    pub fn max_number_of_digits(mut self, value: usize) -> Self {
        self.max_number_of_digits = value;
        self
    }

    pub fn render_whitespace_only_blocks(mut self, value: bool) -> Self {
        self.render_whitespace_only_blocks = value;
        self
    }

    pub fn disable_tag(mut self, name: impl Into<String>) -> Self {
        self.disabled_tags.insert(name.into());
        self
    }

    pub fn block_scope(mut self, value: bool) -> Self {
        self.block_scope = value;
        self
    }

    pub fn carry_loop_iterations(mut self, value: bool) -> Self {
        self.carry_loop_iterations = value;
        self
    }

    pub fn translations(mut self, value: Arc<dyn Translations>) -> Self {
        self.translations = Some(value);
        self
    }

    pub fn build(self) -> Environment {
        let loader = self.loader.unwrap_or_else(|| Arc::new(crate::loader::DictLoader::new()));
        Environment {
            tags: self.tags,
            filters: self.filters,
            loader,
            undefined_policy: self.undefined_policy,
            tolerance: self.tolerance,
            autoescape: self.autoescape,
            strict_filters: self.strict_filters,
            template_comments: self.template_comments,
            comment_start_string: self.comment_start_string,
            comment_end_string: self.comment_end_string,
            max_context_depth: self.max_context_depth,
            loop_iteration_limit: self.loop_iteration_limit,
            output_stream_limit: self.output_stream_limit,
            local_namespace_limit: self.local_namespace_limit,
            expression_cache: Arc::new(ExpressionCache::new(self.expression_cache_size)),
            max_number_of_digits: self.max_number_of_digits,
            render_whitespace_only_blocks: self.render_whitespace_only_blocks,
            disabled_tags: self.disabled_tags,
            allow_parens_in_boolean: true,
            allow_not_in_boolean: true,
            block_scope: self.block_scope,
            carry_loop_iterations: self.carry_loop_iterations,
            translations: self.translations.unwrap_or_else(|| Arc::new(NullTranslations)),
        }
    }
}

impl Default for Environment {
    fn default() -> Self {
        EnvironmentBuilder::default().build()
    }
}
