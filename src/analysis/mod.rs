//! L8: static analysis (spec §4.8a "structural", §4.8b "contextual").
//!
//! Structural analysis is a single AST traversal: no values flow, so
//! `{% if %}` branches, `{% case %}` arms and filter arguments are all
//! visited unconditionally. Contextual analysis instead performs a real
//! render with [`crate::context::RenderContext::with_tracking`] enabled,
//! recording which paths were actually looked up along the branches that
//! execution actually took. Grounded on the teacher's `wikitext::visit`
//! module, which walks a parsed tree collecting link/template/transclusion
//! references the same structural way.

mod structural;

pub use structural::{analyze, StructuralReport};

use crate::context::RenderContext;
use crate::env::Environment;
use crate::error::Result;
use indexmap::IndexMap;
use std::collections::BTreeSet;

#[derive(Debug, Default, serde::Serialize)]
pub struct ContextualReport {
    pub accessed: BTreeSet<String>,
}

/// Renders `nodes` with lookup tracking enabled and discards the output,
/// keeping only the set of paths that were actually dereferenced.
pub fn analyze_with_context(nodes: &[crate::ast::Node], env: &Environment, globals: IndexMap<String, crate::value::Value>) -> Result<ContextualReport> {
    let mut ctx = RenderContext::new(env, globals).with_tracking();
    let mut out = String::new();
    crate::render::render_nodes(nodes, &mut ctx, &mut out)?;
    Ok(ContextualReport { accessed: ctx.into_tracked_names() })
}

#[cfg(test)]
mod tests {
    use crate::value::Value;
    use crate::Environment;
    use goldenfile::Mint;
    use indexmap::IndexMap;
    use std::io::Write;

    #[test]
    fn structural_report_distinguishes_locals_from_globals() {
        let env = Environment::default();
        let template = env
            .parse("{% assign greeting = \"hi\" %}{% for item in items %}{{ item | upcase }}{% endfor %}{{ user.name }}")
            .unwrap();
        let report = template.analyze().unwrap();

        assert_eq!(report.tags, ["assign", "for", "output"].iter().map(|s| s.to_string()).collect());
        assert_eq!(report.filters, ["upcase"].iter().map(|s| s.to_string()).collect());
        assert_eq!(report.locals, ["greeting", "item"].iter().map(|s| s.to_string()).collect());
        assert_eq!(report.globals, ["items", "user.name"].iter().map(|s| s.to_string()).collect());
        assert!(report.partials.is_empty());
    }

    #[test]
    fn structural_report_is_stable_across_runs() {
        let mut mint = Mint::new("tests/goldenfiles");
        let mut file = mint.new_goldenfile("structural_report.txt").unwrap();

        let env = Environment::default();
        let template = env
            .parse("{% assign greeting = \"hi\" %}{% for item in items %}{{ item | upcase }}{% endfor %}{{ user.name }}")
            .unwrap();
        let report = template.analyze().unwrap();

        writeln!(file, "tags: {:?}", report.tags).unwrap();
        writeln!(file, "filters: {:?}", report.filters).unwrap();
        writeln!(file, "variables: {:?}", report.variables).unwrap();
        writeln!(file, "locals: {:?}", report.locals).unwrap();
        writeln!(file, "globals: {:?}", report.globals).unwrap();
        writeln!(file, "partials: {:?}", report.partials).unwrap();
    }

    #[test]
    fn contextual_analysis_only_records_paths_on_the_branch_actually_taken() {
        let env = Environment::default();
        let template = env
            .parse("{% if user.admin %}{{ user.name }}{% endif %}{% if user.banned %}{{ reason }}{% endif %}")
            .unwrap();

        let mut user = IndexMap::new();
        user.insert("admin".to_string(), Value::Bool(true));
        user.insert("banned".to_string(), Value::Bool(false));
        user.insert("name".to_string(), Value::string("Ada"));
        let mut globals = IndexMap::new();
        globals.insert("user".to_string(), Value::Map(user));

        let report = template.analyze_with_context(globals).unwrap();
        assert_eq!(
            report.accessed,
            ["user.admin", "user.name", "user.banned"].iter().map(|s| s.to_string()).collect()
        );
        assert!(!report.accessed.contains("reason"));
    }

    #[test]
    fn structural_report_follows_literal_partial_names() {
        use crate::loader::DictLoader;
        use std::sync::Arc;

        let loader = DictLoader::with([
            ("outer.liquid".to_string(), "{% include \"inner.liquid\" %}".to_string()),
            ("inner.liquid".to_string(), "{{ detail }}".to_string()),
        ]);
        let env = Environment::builder().loader(Arc::new(loader)).build();
        let template = env.get_template("outer.liquid").unwrap();
        let report = template.analyze().unwrap();

        assert!(report.tags.contains("include"));
        assert!(report.globals.contains("detail"));
    }
}
