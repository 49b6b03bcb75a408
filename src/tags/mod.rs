//! L4: the tag registry (spec §3 "TagDescriptor", §4.4).
//!
//! A [`TagDescriptor`] records a tag's name and, for block tags, its set of
//! valid terminator/continuation keywords (`endif`, `else`, `elsif`, …) —
//! generalizing the teacher's static `TAG_EXTENSIONS`/parser-function table
//! in `renderer::parser_fns` that maps a tag name to the function that
//! consumes its body. The actual parse semantics for every built-in tag
//! live in [`crate::parser`], which consults the registry only to find a
//! block's valid terminators and to honor `disabled_tags`.

use std::collections::HashMap;

#[derive(Clone)]
pub struct TagDescriptor {
    pub name: String,
    /// For block tags: the set of keywords that end (or continue) this
    /// block, e.g. `if` -> `["elsif", "else", "endif"]`.
    pub terminators: Vec<&'static str>,
    pub is_block: bool,
}

impl TagDescriptor {
    fn block(name: &str, terminators: &[&'static str]) -> Self {
        Self { name: name.to_string(), terminators: terminators.to_vec(), is_block: true }
    }

    fn inline(name: &str) -> Self {
        Self { name: name.to_string(), terminators: Vec::new(), is_block: false }
    }
}

pub type TagRegistry = HashMap<String, TagDescriptor>;

/// The fixed set of tags this crate understands (spec §4.4). Order is
/// irrelevant; listed roughly in the spec's own tag order.
pub fn builtin_tag_registry() -> TagRegistry {
    let mut registry = TagRegistry::new();
    let mut add = |d: TagDescriptor| {
        registry.insert(d.name.clone(), d);
    };
    add(TagDescriptor::inline("assign"));
    add(TagDescriptor::block("capture", &["endcapture"]));
    add(TagDescriptor::inline("increment"));
    add(TagDescriptor::inline("decrement"));
    add(TagDescriptor::block("if", &["elsif", "else", "endif"]));
    add(TagDescriptor::block("unless", &["else", "endunless"]));
    add(TagDescriptor::block("case", &["when", "else", "endcase"]));
    add(TagDescriptor::block("for", &["else", "endfor"]));
    add(TagDescriptor::block("tablerow", &["endtablerow"]));
    add(TagDescriptor::inline("cycle"));
    add(TagDescriptor::inline("echo"));
    add(TagDescriptor::block("liquid", &["endliquid"]));
    add(TagDescriptor::block("comment", &["endcomment"]));
    add(TagDescriptor::inline("#"));
    add(TagDescriptor::block("raw", &["endraw"]));
    add(TagDescriptor::inline("include"));
    add(TagDescriptor::inline("render"));
    add(TagDescriptor::block("ifchanged", &["endifchanged"]));
    add(TagDescriptor::block("block", &["endblock"]));
    add(TagDescriptor::inline("extends"));
    add(TagDescriptor::block("macro", &["endmacro"]));
    add(TagDescriptor::inline("call"));
    add(TagDescriptor::block("with", &["endwith"]));
    add(TagDescriptor::block("translate", &["plural", "endtranslate"]));
    add(TagDescriptor::inline("break"));
    add(TagDescriptor::inline("continue"));
    registry
}
