//! L6: render-time context (spec §3 "RenderContext", §5 "Scoping").
//!
//! The scope chain is a stack of maps searched innermost-first, the shape
//! `original_source/liquid/chain_map.py`'s `ReadOnlyChainMap` models and the
//! teacher's `renderer::stack::TemplateStack` depth-tracking mirrors for
//! partial/include nesting.

use crate::env::Environment;
use crate::error::{Error, Result};
use crate::value::Value;
use bitflags::bitflags;
use indexmap::IndexMap;
use std::collections::HashMap;

bitflags! {
    #[derive(Clone, Copy, Debug, PartialEq, Eq)]
    pub struct ContextFlags: u8 {
        const AUTOESCAPE          = 0b0000_0001;
        const CARRY_LOOP_ITERATIONS = 0b0000_0010;
        const BLOCK_SCOPE         = 0b0000_0100;
    }
}

/// A named counter driven by `{% increment %}`/`{% decrement %}`, stored
/// separately from ordinary locals (spec §4.4: shares a namespace keyed by
/// name but not by assignment scope).
#[derive(Default)]
struct Counters(HashMap<String, i64>);

/// One frame of the scope chain.
type Scope = IndexMap<String, Value>;

/// Per-render mutable state: scope chain, globals, counters, cycle
/// positions, and the tag-private namespace used by stateful tags
/// (spec §5 "tag_namespace").
pub struct RenderContext<'a> {
    pub env: &'a Environment,
    globals: Scope,
    scopes: Vec<Scope>,
    counters: Counters,
    cycles: HashMap<String, usize>,
    ifchanged: HashMap<String, String>,
    tag_namespace: HashMap<String, Value>,
    macros: HashMap<String, crate::ast::Node>,
    depth: usize,
    pub flags: ContextFlags,
    pub disabled_tags: std::collections::HashSet<String>,
    loop_iterations: usize,
    output_len: usize,
    /// Per-name stacks of `{% block %}` override bodies, root-most first,
    /// populated by [`crate::inheritance`] before rendering a template that
    /// is the base of an `{% extends %}` chain.
    pub(crate) block_chains: HashMap<String, Vec<Vec<crate::ast::Node>>>,
    /// When set by [`crate::analysis`], every `Path` lookup's head name is
    /// recorded here instead of (or in addition to) being resolved — the
    /// mechanism behind contextual analysis (spec §4.8b).
    pub(crate) tracker: Option<std::cell::RefCell<std::collections::BTreeSet<String>>>,
}

impl<'a> RenderContext<'a> {
    pub fn new(env: &'a Environment, globals: IndexMap<String, Value>) -> Self {
        let mut flags = ContextFlags::empty();
        if env.autoescape {
            flags |= ContextFlags::AUTOESCAPE;
        }
        if env.block_scope {
            flags |= ContextFlags::BLOCK_SCOPE;
        }
        if env.carry_loop_iterations {
            flags |= ContextFlags::CARRY_LOOP_ITERATIONS;
        }
        Self {
            env,
            globals,
            scopes: vec![Scope::new()],
            counters: Counters::default(),
            cycles: HashMap::new(),
            ifchanged: HashMap::new(),
            tag_namespace: HashMap::new(),
            macros: HashMap::new(),
            depth: 0,
            flags,
            disabled_tags: env.disabled_tags.clone(),
            loop_iterations: 0,
            output_len: 0,
            block_chains: HashMap::new(),
            tracker: None,
        }
    }

    pub fn with_tracking(mut self) -> Self {
        self.tracker = Some(std::cell::RefCell::new(std::collections::BTreeSet::new()));
        self
    }

    pub fn track(&self, name: &str) {
        if let Some(tracker) = &self.tracker {
            tracker.borrow_mut().insert(name.to_string());
        }
    }

    pub fn into_tracked_names(self) -> std::collections::BTreeSet<String> {
        self.tracker.map(|t| t.into_inner()).unwrap_or_default()
    }

    pub fn autoescape(&self) -> bool {
        self.flags.contains(ContextFlags::AUTOESCAPE)
    }

    /// Pushes a new local scope. The guard pops it on drop, generalizing the
    /// teacher's `scopeguard::guard` RAII cleanup used around nested parses.
    pub fn push_scope(&mut self) -> ScopeGuard<'_, 'a> {
        self.scopes.push(Scope::new());
        ScopeGuard { ctx: self }
    }

    pub fn enter_template(&mut self) -> Result<DepthGuard<'_, 'a>> {
        if self.depth >= self.env.max_context_depth {
            return Err(Error::ContextDepth { limit: self.env.max_context_depth });
        }
        self.depth += 1;
        Ok(DepthGuard { ctx: self })
    }

    pub fn depth(&self) -> usize {
        self.depth
    }

    pub fn set_local(&mut self, name: impl Into<String>, value: Value) {
        let scope = self.scopes.last_mut().expect("at least one scope always present");
        scope.insert(name.into(), value);
    }

    /// `assign` writes through to the outermost (template-level) scope by
    /// default, unlike `{% capture %}`/`for`-loop locals which stay
    /// block-scoped — the common real-world default (spec §3(vii)
    /// `block_scope`). When `block_scope` is enabled, `assign` instead
    /// writes to the innermost scope, like any other local.
    pub fn assign(&mut self, name: impl Into<String>, value: Value) {
        if self.flags.contains(ContextFlags::BLOCK_SCOPE) {
            self.set_local(name, value);
        } else {
            self.scopes[0].insert(name.into(), value);
        }
    }

    pub fn get(&self, name: &str) -> Option<&Value> {
        for scope in self.scopes.iter().rev() {
            if let Some(v) = scope.get(name) {
                return Some(v);
            }
        }
        self.globals.get(name)
    }

    pub fn tag_namespace(&mut self) -> &mut HashMap<String, Value> {
        &mut self.tag_namespace
    }

    pub fn increment(&mut self, name: &str) -> i64 {
        let entry = self.counters.0.entry(name.to_string()).or_insert(0);
        let value = *entry;
        *entry += 1;
        value
    }

    pub fn decrement(&mut self, name: &str) -> i64 {
        let entry = self.counters.0.entry(name.to_string()).or_insert(0);
        *entry -= 1;
        *entry
    }

    pub fn next_cycle(&mut self, key: &str, len: usize) -> usize {
        let slot = self.cycles.entry(key.to_string()).or_insert(0);
        let idx = *slot % len.max(1);
        *slot += 1;
        idx
    }

    pub fn ifchanged(&mut self, key: &str, rendered: String) -> bool {
        match self.ifchanged.get(key) {
            Some(prev) if prev == &rendered => false,
            _ => {
                self.ifchanged.insert(key.to_string(), rendered);
                true
            }
        }
    }

    pub fn define_macro(&mut self, name: String, node: crate::ast::Node) {
        self.macros.insert(name, node);
    }

    pub fn get_macro(&self, name: &str) -> Option<&crate::ast::Node> {
        self.macros.get(name)
    }

    /// The loop-iteration count consumed so far. Read by `{% render %}`
    /// when `carry_loop_iterations` is enabled so an isolated partial's
    /// fresh context shares the caller's remaining budget rather than
    /// getting one of its own (spec §3(vii)).
    pub fn loop_iterations(&self) -> usize {
        self.loop_iterations
    }

    pub fn set_loop_iterations(&mut self, n: usize) {
        self.loop_iterations = n;
    }

    pub fn bump_loop_iteration(&mut self) -> Result<()> {
        self.loop_iterations += 1;
        if self.loop_iterations > self.env.loop_iteration_limit {
            return Err(Error::LoopIterationLimit { limit: self.env.loop_iteration_limit });
        }
        Ok(())
    }

    pub fn bump_output(&mut self, n: usize) -> Result<()> {
        self.output_len += n;
        if self.output_len > self.env.output_stream_limit {
            return Err(Error::OutputStreamLimit { limit: self.env.output_stream_limit });
        }
        Ok(())
    }

    pub fn local_namespace_len(&self) -> usize {
        self.scopes.iter().map(|s| s.len()).sum()
    }

    pub fn check_local_namespace_limit(&self) -> Result<()> {
        if self.local_namespace_len() > self.env.local_namespace_limit {
            return Err(Error::LocalNamespaceLimit { limit: self.env.local_namespace_limit });
        }
        Ok(())
    }
}

/// RAII scope pop, mirroring the teacher's `scopeguard`-based cleanup idiom.
pub struct ScopeGuard<'ctx, 'a> {
    ctx: &'ctx mut RenderContext<'a>,
}

impl Drop for ScopeGuard<'_, '_> {
    fn drop(&mut self) {
        self.ctx.scopes.pop();
    }
}

impl<'a> std::ops::Deref for ScopeGuard<'_, 'a> {
    type Target = RenderContext<'a>;
    fn deref(&self) -> &Self::Target {
        self.ctx
    }
}

impl<'a> std::ops::DerefMut for ScopeGuard<'_, 'a> {
    fn deref_mut(&mut self) -> &mut Self::Target {
        self.ctx
    }
}

pub struct DepthGuard<'ctx, 'a> {
    ctx: &'ctx mut RenderContext<'a>,
}

impl Drop for DepthGuard<'_, '_> {
    fn drop(&mut self) {
        self.ctx.depth -= 1;
    }
}

impl<'a> std::ops::Deref for DepthGuard<'_, 'a> {
    type Target = RenderContext<'a>;
    fn deref(&self) -> &Self::Target {
        self.ctx
    }
}

impl<'a> std::ops::DerefMut for DepthGuard<'_, 'a> {
    fn deref_mut(&mut self) -> &mut Self::Target {
        self.ctx
    }
}
