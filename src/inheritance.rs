//! L7: template inheritance (spec §4.5), grounded on
//! `original_source/liquid/extends_tag.py` — the reference implementation's
//! canonical `extends`/`block` resolution — generalized into this crate's
//! own render-context plumbing (`RenderContext::block_chains`).
//!
//! Resolution walks from the requested (leaf) template up through each
//! `{% extends %}` to the template that has none (the root/base layout),
//! collecting every `{% block %}` body along the way into a per-name stack
//! ordered root-first. Rendering then walks the *root*'s node tree, and
//! whenever a `{% block %}` is reached, substitutes the most-derived
//! override for that name (`render::render_block_chain_level` handles
//! `{{ block.super }}` chaining).

use crate::ast::Node;
use crate::context::RenderContext;
use crate::env::Environment;
use crate::error::{Error, Result};
use std::collections::{HashMap, HashSet};

/// One parsed template level in an inheritance chain, root-first order.
struct Level {
    nodes: Vec<Node>,
    name: String,
}

/// Finds this template's `{% extends %}` target, if any. More than one
/// `{% extends %}` in the same template is an error (spec §4.5 step 2),
/// matching the duplicate-name check [`collect_blocks`] already does for
/// block names.
fn extends_target(nodes: &[Node]) -> Result<Option<&str>> {
    let mut found = None;
    for node in nodes {
        if let Node::Extends { template, .. } = node {
            if found.is_some() {
                return Err(Error::TemplateInheritance {
                    message: "more than one 'extends' tag in the same template".to_string(),
                    span: None,
                });
            }
            found = Some(template.as_str());
        }
    }
    Ok(found)
}

fn build_chain(leaf_nodes: Vec<Node>, leaf_name: String, env: &Environment) -> Result<Vec<Level>> {
    let mut levels = vec![Level { nodes: leaf_nodes, name: leaf_name }];
    let mut seen = HashSet::new();
    loop {
        let current = levels.last().expect("at least the leaf level is present");
        let Some(parent_name) = extends_target(&current.nodes)? else { break };
        let parent_name = parent_name.to_string();
        if !seen.insert(parent_name.clone()) {
            return Err(Error::TemplateInheritance {
                message: format!("circular 'extends' chain at '{parent_name}'"),
                span: None,
            });
        }
        let source = env.loader.load(&parent_name)?;
        let nodes = crate::parser::Parser::new(&source.source, source.matter.clone(), env)
            .parse()
            .map_err(|e| e.with_origin(&source.source))?;
        levels.push(Level { nodes, name: source.matter });
    }
    levels.reverse(); // root first
    Ok(levels)
}

/// Walks `nodes` one level deep (matching this crate's simplification that
/// `{% block %}` tags are collected from a template's top level and from
/// directly nested control-flow bodies, not from inside `{% capture %}` or
/// macro bodies, which are not meaningful places to put layout blocks).
fn collect_blocks<'a>(nodes: &'a [Node], into: &mut HashMap<String, &'a str>) -> Result<()> {
    fn walk<'a>(nodes: &'a [Node], into: &mut HashMap<String, &'a str>) -> Result<()> {
        for node in nodes {
            match node {
                Node::Block { name, .. } => {
                    if into.contains_key(name.as_str()) {
                        return Err(Error::TemplateInheritance {
                            message: format!("duplicate block '{name}' in the same template"),
                            span: None,
                        });
                    }
                    into.insert(name.clone(), name.as_str());
                }
                Node::If { arms, else_branch, .. } => {
                    for arm in arms {
                        walk(&arm.body, into)?;
                    }
                    if let Some(body) = else_branch {
                        walk(body, into)?;
                    }
                }
                Node::Unless { body, else_branch, .. } => {
                    walk(body, into)?;
                    if let Some(body) = else_branch {
                        walk(body, into)?;
                    }
                }
                _ => {}
            }
        }
        Ok(())
    }
    walk(nodes, into)
}

/// Flattens `nodes`, returning every `{% block %}` node reachable through
/// the same structural positions [`collect_blocks`] considers.
fn find_block_bodies(nodes: &[Node], name: &str) -> Option<Vec<Node>> {
    for node in nodes {
        match node {
            Node::Block { name: n, body, .. } if n == name => return Some(body.clone()),
            Node::If { arms, else_branch, .. } => {
                for arm in arms {
                    if let Some(found) = find_block_bodies(&arm.body, name) {
                        return Some(found);
                    }
                }
                if let Some(body) = else_branch {
                    if let Some(found) = find_block_bodies(body, name) {
                        return Some(found);
                    }
                }
            }
            Node::Unless { body, else_branch, .. } => {
                if let Some(found) = find_block_bodies(body, name) {
                    return Some(found);
                }
                if let Some(body) = else_branch {
                    if let Some(found) = find_block_bodies(body, name) {
                        return Some(found);
                    }
                }
            }
            _ => {}
        }
    }
    None
}

fn required_without_override(root_nodes: &[Node], chains: &HashMap<String, Vec<Vec<Node>>>) -> Option<String> {
    fn walk(nodes: &[Node], chains: &HashMap<String, Vec<Vec<Node>>>) -> Option<String> {
        for node in nodes {
            match node {
                Node::Block { name, required, .. } => {
                    if *required && chains.get(name).map(Vec::len).unwrap_or(0) <= 1 {
                        return Some(name.clone());
                    }
                }
                Node::If { arms, else_branch, .. } => {
                    for arm in arms {
                        if let Some(n) = walk(&arm.body, chains) {
                            return Some(n);
                        }
                    }
                    if let Some(body) = else_branch {
                        if let Some(n) = walk(body, chains) {
                            return Some(n);
                        }
                    }
                }
                _ => {}
            }
        }
        None
    }
    walk(root_nodes, chains)
}

/// Parses `leaf_source` and, if it (transitively) extends another template,
/// resolves the full chain and renders the root layout with every block
/// substituted by its most-derived override. Returns `Ok(None)` when the
/// leaf does not use `{% extends %}` at all, so the caller can fall back to
/// plain rendering.
pub fn render_if_extends(
    leaf_nodes: &[Node],
    leaf_name: &str,
    env: &Environment,
    ctx: &mut RenderContext,
    out: &mut String,
) -> Result<bool> {
    if extends_target(leaf_nodes)?.is_none() {
        return Ok(false);
    }
    let levels = build_chain(leaf_nodes.to_vec(), leaf_name.to_string(), env)?;
    let mut names: HashSet<String> = HashSet::new();
    for level in &levels {
        let mut seen_here = HashMap::new();
        collect_blocks(&level.nodes, &mut seen_here)?;
        names.extend(seen_here.keys().map(|k| k.to_string()));
    }
    let mut chains: HashMap<String, Vec<Vec<Node>>> = HashMap::new();
    for name in &names {
        let stack: Vec<Vec<Node>> = levels.iter().filter_map(|level| find_block_bodies(&level.nodes, name)).collect();
        chains.insert(name.clone(), stack);
    }
    let root = &levels[0];
    if let Some(name) = required_without_override(&root.nodes, &chains) {
        return Err(Error::RequiredBlock { name, span: None });
    }
    ctx.block_chains = chains;
    crate::render::render_nodes(&root.nodes, ctx, out)?;
    Ok(true)
}

#[cfg(test)]
mod tests {
    use crate::loader::DictLoader;
    use crate::Environment;
    use indexmap::IndexMap;
    use std::sync::Arc;

    fn build(templates: &[(&str, &str)]) -> Environment {
        let loader = DictLoader::with(templates.iter().map(|(n, s)| (n.to_string(), s.to_string())));
        Environment::builder().loader(Arc::new(loader)).build()
    }

    #[test]
    fn child_overrides_a_base_block_and_reaches_block_super() {
        let env = build(&[
            (
                "base.liquid",
                "{% block title %}Base Title{% endblock %}|{% block content %}base-content{% endblock %}",
            ),
            (
                "child.liquid",
                "{% extends \"base.liquid\" %}{% block content %}child-content {{ block.super }}{% endblock %}",
            ),
        ]);
        let template = env.get_template("child.liquid").unwrap();
        let out = template.render(IndexMap::new()).unwrap();
        assert_eq!(out, "Base Title|child-content base-content");
    }

    #[test]
    fn grandchild_chains_block_super_through_every_level() {
        let env = build(&[
            ("base.liquid", "{% block content %}base{% endblock %}"),
            (
                "middle.liquid",
                "{% extends \"base.liquid\" %}{% block content %}middle>{{ block.super }}{% endblock %}",
            ),
            (
                "leaf.liquid",
                "{% extends \"middle.liquid\" %}{% block content %}leaf>{{ block.super }}{% endblock %}",
            ),
        ]);
        let template = env.get_template("leaf.liquid").unwrap();
        let out = template.render(IndexMap::new()).unwrap();
        assert_eq!(out, "leaf>middle>base");
    }

    #[test]
    fn a_block_left_unoverridden_falls_back_to_the_base_body() {
        let env = build(&[
            ("base.liquid", "{% block a %}A{% endblock %}{% block b %}B{% endblock %}"),
            ("child.liquid", "{% extends \"base.liquid\" %}{% block a %}A2{% endblock %}"),
        ]);
        let template = env.get_template("child.liquid").unwrap();
        let out = template.render(IndexMap::new()).unwrap();
        assert_eq!(out, "A2B");
    }

    #[test]
    fn required_block_without_any_override_is_a_render_error() {
        let env = build(&[
            ("base.liquid", "{% block content required %}{% endblock %}"),
            ("child.liquid", "{% extends \"base.liquid\" %}"),
        ]);
        let err = env.get_template("child.liquid").unwrap().render(IndexMap::new()).unwrap_err();
        assert!(matches!(err, crate::Error::RequiredBlock { .. }));
    }

    #[test]
    fn circular_extends_chain_is_rejected() {
        let env = build(&[
            ("a.liquid", "{% extends \"b.liquid\" %}"),
            ("b.liquid", "{% extends \"a.liquid\" %}"),
        ]);
        let err = env.get_template("a.liquid").unwrap().render(IndexMap::new()).unwrap_err();
        assert!(matches!(err, crate::Error::TemplateInheritance { .. }));
    }

    #[test]
    fn a_second_extends_tag_in_the_same_template_is_rejected() {
        let env = build(&[
            ("base.liquid", ""),
            ("other.liquid", ""),
            ("child.liquid", "{% extends \"base.liquid\" %}{% extends \"other.liquid\" %}"),
        ]);
        let err = env.get_template("child.liquid").unwrap().render(IndexMap::new()).unwrap_err();
        assert!(matches!(err, crate::Error::TemplateInheritance { .. }));
    }
}
