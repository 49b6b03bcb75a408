use crate::ast::Node;
use crate::env::Environment;
use crate::error::Result;
use crate::expr::{BooleanExpr, Expression, Filter, Path};
use std::collections::{BTreeSet, HashSet};

/// The report produced by [`analyze`] (spec §4.8a).
#[derive(Debug, Default, serde::Serialize)]
pub struct StructuralReport {
    /// Every distinct path expression referenced, in `a.b[0]` form.
    pub variables: BTreeSet<String>,
    /// Head names bound somewhere in the template by `assign`, `capture`,
    /// a `for`/`tablerow` loop variable, a `with` binding or a macro
    /// parameter — an approximation of "local" since this pass does not
    /// track scope boundaries.
    pub locals: BTreeSet<String>,
    /// Head names referenced but never locally bound; presumed supplied by
    /// the render-time globals.
    pub globals: BTreeSet<String>,
    pub filters: BTreeSet<String>,
    pub tags: BTreeSet<String>,
    /// Literal template names passed to `{% include %}`/`{% render %}`.
    pub partials: BTreeSet<String>,
}

struct Walker<'a> {
    env: &'a Environment,
    report: StructuralReport,
    visited_partials: HashSet<String>,
    depth: usize,
}

/// Walks `nodes` (and, recursively, any statically resolvable partial)
/// collecting the structural report. `env` supplies the loader used to
/// follow `include`/`render` and the tag registry used to validate tag
/// names are recognized.
pub fn analyze(nodes: &[Node], env: &Environment) -> Result<StructuralReport> {
    let mut walker = Walker { env, report: StructuralReport::default(), visited_partials: HashSet::new(), depth: 0 };
    walker.walk_nodes(nodes)?;
    let report = walker.report;
    Ok(StructuralReport {
        globals: report.variables.iter().filter(|v| !report.locals.contains(head_of(v))).cloned().collect(),
        ..report
    })
}

fn head_of(path: &str) -> &str {
    path.split(['.', '[']).next().unwrap_or(path)
}

impl<'a> Walker<'a> {
    fn walk_nodes(&mut self, nodes: &[Node]) -> Result<()> {
        for node in nodes {
            self.walk_node(node)?;
        }
        Ok(())
    }

    fn walk_node(&mut self, node: &Node) -> Result<()> {
        match node {
            Node::Content { .. } | Node::Comment { .. } | Node::InlineComment { .. } | Node::Raw { .. } => {}
            Node::Output { expr, .. } | Node::Echo { expr, .. } => {
                self.report.tags.insert(if matches!(node, Node::Echo { .. }) { "echo" } else { "output" }.to_string());
                self.walk_expr(expr);
            }
            Node::If { arms, else_branch, .. } => {
                self.report.tags.insert("if".to_string());
                for arm in arms {
                    self.walk_boolean(&arm.condition);
                    self.walk_nodes(&arm.body)?;
                }
                if let Some(body) = else_branch {
                    self.walk_nodes(body)?;
                }
            }
            Node::Unless { condition, body, else_branch, .. } => {
                self.report.tags.insert("unless".to_string());
                self.walk_boolean(condition);
                self.walk_nodes(body)?;
                if let Some(body) = else_branch {
                    self.walk_nodes(body)?;
                }
            }
            Node::Case { subject, whens, else_branch, .. } => {
                self.report.tags.insert("case".to_string());
                self.walk_expr(subject);
                for when in whens {
                    for v in &when.values {
                        self.walk_expr(v);
                    }
                    self.walk_nodes(&when.body)?;
                }
                if let Some(body) = else_branch {
                    self.walk_nodes(body)?;
                }
            }
            Node::For { loop_expr, body, else_branch, .. } => {
                self.report.tags.insert("for".to_string());
                self.walk_expr(&loop_expr.iterable);
                self.report.locals.insert(loop_expr.name.clone());
                self.walk_nodes(body)?;
                if let Some(body) = else_branch {
                    self.walk_nodes(body)?;
                }
            }
            Node::TableRow { loop_expr, body, .. } => {
                self.report.tags.insert("tablerow".to_string());
                self.walk_expr(&loop_expr.iterable);
                self.report.locals.insert(loop_expr.name.clone());
                self.walk_nodes(body)?;
            }
            Node::Capture { name, body, .. } => {
                self.report.tags.insert("capture".to_string());
                self.report.locals.insert(name.clone());
                self.walk_nodes(body)?;
            }
            Node::Assign { name, value, .. } => {
                self.report.tags.insert("assign".to_string());
                self.walk_expr(value);
                self.report.locals.insert(name.clone());
            }
            Node::Increment { name, .. } => {
                self.report.tags.insert("increment".to_string());
                self.report.locals.insert(name.clone());
            }
            Node::Decrement { name, .. } => {
                self.report.tags.insert("decrement".to_string());
                self.report.locals.insert(name.clone());
            }
            Node::Cycle { values, .. } => {
                self.report.tags.insert("cycle".to_string());
                for v in values {
                    self.walk_expr(v);
                }
            }
            Node::Liquid { body, .. } => {
                self.report.tags.insert("liquid".to_string());
                self.walk_nodes(body)?;
            }
            Node::Include { template, with_expr, kwargs, .. } => {
                self.report.tags.insert("include".to_string());
                self.walk_expr(template);
                if let Some((expr, _)) = with_expr {
                    self.walk_expr(expr);
                }
                for (_, expr) in kwargs {
                    self.walk_expr(expr);
                }
                if let Some(name) = template.is_literal_string() {
                    self.walk_partial(name)?;
                }
            }
            Node::Render { template, with_expr, kwargs, .. } => {
                self.report.tags.insert("render".to_string());
                self.report.partials.insert(template.clone());
                if let Some((expr, _)) = with_expr {
                    self.walk_expr(expr);
                }
                for (_, expr) in kwargs {
                    self.walk_expr(expr);
                }
                self.walk_partial(template)?;
            }
            Node::IfChanged { body, .. } => {
                self.report.tags.insert("ifchanged".to_string());
                self.walk_nodes(body)?;
            }
            Node::Block { body, .. } => {
                self.report.tags.insert("block".to_string());
                self.walk_nodes(body)?;
            }
            Node::Extends { .. } => {
                self.report.tags.insert("extends".to_string());
            }
            Node::Macro { name, params, body, .. } => {
                self.report.tags.insert("macro".to_string());
                for p in params {
                    self.report.locals.insert(p.name.clone());
                    if let Some(default) = &p.default {
                        self.walk_expr(default);
                    }
                }
                let _ = name;
                self.walk_nodes(body)?;
            }
            Node::Call { positional, keyword, .. } => {
                self.report.tags.insert("call".to_string());
                for e in positional {
                    self.walk_expr(e);
                }
                for (_, e) in keyword {
                    self.walk_expr(e);
                }
            }
            Node::With { bindings, body, .. } => {
                self.report.tags.insert("with".to_string());
                for (name, e) in bindings {
                    self.walk_expr(e);
                    self.report.locals.insert(name.clone());
                }
                self.walk_nodes(body)?;
            }
            Node::Translate { plural_count, context, kwargs, .. } => {
                self.report.tags.insert("translate".to_string());
                if let Some(e) = plural_count {
                    self.walk_expr(e);
                }
                if let Some(e) = context {
                    self.walk_expr(e);
                }
                for (_, e) in kwargs {
                    self.walk_expr(e);
                }
            }
            Node::Break { .. } => {
                self.report.tags.insert("break".to_string());
            }
            Node::Continue { .. } => {
                self.report.tags.insert("continue".to_string());
            }
            Node::Illegal { .. } => {}
        }
        Ok(())
    }

    fn walk_partial(&mut self, name: &str) -> Result<()> {
        if self.depth >= self.env.max_context_depth || !self.visited_partials.insert(name.to_string()) {
            return Ok(());
        }
        let Ok(source) = self.env.loader.load(name) else {
            return Ok(());
        };
        let nodes = match crate::parser::Parser::new(&source.source, source.matter.clone(), self.env).parse() {
            Ok(nodes) => nodes,
            Err(_) => return Ok(()),
        };
        self.depth += 1;
        let result = self.walk_nodes(&nodes);
        self.depth -= 1;
        result
    }

    fn walk_expr(&mut self, expr: &Expression) {
        match expr {
            Expression::StringLiteral(_)
            | Expression::IntegerLiteral(_)
            | Expression::FloatLiteral(_)
            | Expression::BooleanLiteral(_)
            | Expression::Nil
            | Expression::Empty
            | Expression::Blank => {}
            Expression::Range(a, b) => {
                self.walk_expr(a);
                self.walk_expr(b);
            }
            Expression::Path(p) => self.walk_path(p),
            Expression::Filtered { left, filters } => {
                self.walk_expr(left);
                for f in filters {
                    self.walk_filter(f);
                }
            }
            Expression::Ternary { left, filters, condition, alternative, tail_filters } => {
                self.walk_expr(left);
                for f in filters {
                    self.walk_filter(f);
                }
                self.walk_boolean(condition);
                if let Some(alt) = alternative {
                    self.walk_expr(alt);
                }
                for f in tail_filters {
                    self.walk_filter(f);
                }
            }
        }
    }

    fn walk_filter(&mut self, filter: &Filter) {
        self.report.filters.insert(filter.name.clone());
        for e in &filter.positional {
            self.walk_expr(e);
        }
        for (_, e) in &filter.keyword {
            self.walk_expr(e);
        }
    }

    fn walk_boolean(&mut self, expr: &BooleanExpr) {
        match expr {
            BooleanExpr::Value(e) => self.walk_expr(e),
            BooleanExpr::Not(inner) => self.walk_boolean(inner),
            BooleanExpr::And(a, b) | BooleanExpr::Or(a, b) => {
                self.walk_boolean(a);
                self.walk_boolean(b);
            }
            BooleanExpr::Compare { left, right, .. } => {
                self.walk_expr(left);
                self.walk_expr(right);
            }
        }
    }

    fn walk_path(&mut self, path: &Path) {
        self.report.variables.insert(path.stringify());
    }
}
