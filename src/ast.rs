//! L3: the template AST (spec §3 "Node").
//!
//! One node per §4.4 tag plus `Content`/`Output`/`Illegal`. Each block-tag
//! variant owns its child node lists directly (unique ownership root to
//! leaves, spec §9), generalizing the teacher's flat `Token` enum
//! (`wikitext::Token`) into a tree shape a recursive-descent parser builds
//! directly rather than reducing from a flat PEG token list.

use crate::expr::{BooleanExpr, Expression, LoopExpr};
use crate::span::Span;

/// A segment of a `{% translate %}` message body: either literal text or a
/// bare variable reference (spec §4.4: no filters, no multi-segment paths
/// are allowed inside a translate block).
#[derive(Clone, Debug)]
pub enum MessageSegment {
    Text(String),
    Var(String),
}

#[derive(Clone, Debug)]
pub struct IfArm {
    pub condition: BooleanExpr,
    pub body: Vec<Node>,
}

#[derive(Clone, Debug)]
pub struct WhenArm {
    pub values: Vec<Expression>,
    pub body: Vec<Node>,
}

#[derive(Clone, Debug)]
pub struct MacroParam {
    pub name: String,
    pub default: Option<Expression>,
}

/// A parsed template node. `blank()` reports whether this node can ever
/// produce non-whitespace output, which drives whitespace-only block
/// suppression (spec §4.3, §4.6).
#[derive(Clone, Debug)]
pub enum Node {
    Content { text: String, span: Span },
    Output { expr: Expression, span: Span },
    If { arms: Vec<IfArm>, else_branch: Option<Vec<Node>>, span: Span },
    Unless { condition: BooleanExpr, body: Vec<Node>, else_branch: Option<Vec<Node>>, span: Span },
    Case { subject: Expression, whens: Vec<WhenArm>, else_branch: Option<Vec<Node>>, span: Span },
    For { loop_expr: LoopExpr, body: Vec<Node>, else_branch: Option<Vec<Node>>, span: Span },
    TableRow { loop_expr: LoopExpr, body: Vec<Node>, span: Span },
    Capture { name: String, body: Vec<Node>, span: Span },
    Assign { name: String, value: Expression, span: Span },
    Increment { name: String, span: Span },
    Decrement { name: String, span: Span },
    Cycle { group: Option<String>, values: Vec<Expression>, span: Span },
    Echo { expr: Expression, span: Span },
    Liquid { body: Vec<Node>, span: Span },
    Comment { span: Span },
    InlineComment { span: Span },
    Raw { text: String, span: Span },
    Include {
        template: Expression,
        with_expr: Option<(Expression, Option<String>)>,
        kwargs: Vec<(String, Expression)>,
        span: Span,
    },
    Render {
        template: String,
        with_expr: Option<(Expression, Option<String>)>,
        for_loop: bool,
        alias: Option<String>,
        kwargs: Vec<(String, Expression)>,
        span: Span,
    },
    IfChanged { body: Vec<Node>, span: Span },
    Block { name: String, required: bool, body: Vec<Node>, span: Span },
    Extends { template: String, span: Span },
    Macro { name: String, params: Vec<MacroParam>, body: Vec<Node>, span: Span },
    Call { name: String, positional: Vec<Expression>, keyword: Vec<(String, Expression)>, span: Span },
    With { bindings: Vec<(String, Expression)>, body: Vec<Node>, span: Span },
    Translate {
        singular: Vec<MessageSegment>,
        plural: Option<Vec<MessageSegment>>,
        plural_count: Option<Expression>,
        context: Option<Expression>,
        kwargs: Vec<(String, Expression)>,
        span: Span,
    },
    Break { span: Span },
    Continue { span: Span },
    Illegal { message: String, span: Span },
}

fn all_blank(nodes: &[Node]) -> bool {
    nodes.iter().all(Node::is_blank)
}

impl Node {
    pub fn span(&self) -> &Span {
        match self {
            Node::Content { span, .. }
            | Node::Output { span, .. }
            | Node::If { span, .. }
            | Node::Unless { span, .. }
            | Node::Case { span, .. }
            | Node::For { span, .. }
            | Node::TableRow { span, .. }
            | Node::Capture { span, .. }
            | Node::Assign { span, .. }
            | Node::Increment { span, .. }
            | Node::Decrement { span, .. }
            | Node::Cycle { span, .. }
            | Node::Echo { span, .. }
            | Node::Liquid { span, .. }
            | Node::Comment { span, .. }
            | Node::InlineComment { span, .. }
            | Node::Raw { span, .. }
            | Node::Include { span, .. }
            | Node::Render { span, .. }
            | Node::IfChanged { span, .. }
            | Node::Block { span, .. }
            | Node::Extends { span, .. }
            | Node::Macro { span, .. }
            | Node::Call { span, .. }
            | Node::With { span, .. }
            | Node::Translate { span, .. }
            | Node::Break { span, .. }
            | Node::Continue { span, .. }
            | Node::Illegal { span, .. } => span,
        }
    }

    /// Whether this node can *never* produce non-whitespace output (spec
    /// §4.3). Block nodes are blank iff every child is blank; tags that
    /// always emit something observable (assign, increment/decrement,
    /// macro/call, cycle, …) are conservatively never blank.
    pub fn is_blank(&self) -> bool {
        match self {
            Node::Content { text, .. } => text.trim().is_empty(),
            Node::Comment { .. } | Node::InlineComment { .. } | Node::Macro { .. } | Node::Extends { .. } => true,
            Node::If { arms, else_branch, .. } => {
                arms.iter().all(|a| all_blank(&a.body)) && else_branch.as_deref().is_none_or(all_blank)
            }
            Node::Unless { body, else_branch, .. } => {
                all_blank(body) && else_branch.as_deref().is_none_or(all_blank)
            }
            Node::Case { whens, else_branch, .. } => {
                whens.iter().all(|w| all_blank(&w.body)) && else_branch.as_deref().is_none_or(all_blank)
            }
            Node::For { body, else_branch, .. } => {
                all_blank(body) && else_branch.as_deref().is_none_or(all_blank)
            }
            Node::Capture { .. } => true, // binds a name, emits nothing itself
            Node::IfChanged { body, .. } => all_blank(body),
            Node::Block { body, .. } => all_blank(body),
            Node::With { body, .. } => all_blank(body),
            Node::Liquid { body, .. } => all_blank(body),
            Node::Raw { text, .. } => text.trim().is_empty(),
            _ => false,
        }
    }

    /// Tags that opt out of whitespace-only suppression regardless of
    /// their computed `blank()` value (spec §4.3 "forced_output"). No
    /// built-in tag currently opts out; the hook exists for custom `if`
    /// variants per §4.3.
    pub fn forced_output(&self) -> bool {
        false
    }
}
