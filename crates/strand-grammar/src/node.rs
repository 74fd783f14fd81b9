use std::fmt;
use std::sync::Arc;

use strand_errors::SyntaxError;
use strand_tree::arena::Key;
use strand_tree::{KeywordId, RuleId};

use crate::keyword::KeywordMap;
use crate::state::SyntaxState;

/// Handle to a node of the grammar under construction.
pub type NodeId = Key<Node>;

/// User matcher: gets the text, the cursor and the state, returns the new
/// cursor or `None` for no match.
pub(crate) type Callback =
    Arc<dyn Fn(&[u8], usize, Option<&mut SyntaxState>) -> Option<usize> + Send + Sync>;

/// Turns a failure at an `error()` node into a diagnostic.
pub(crate) type ErrorHook = Arc<dyn Fn(&[u8], usize, Option<&SyntaxState>) -> SyntaxError + Send + Sync>;

#[derive(Debug)]
pub struct Node {
    pub(crate) kind: NodeKind,
    pub(crate) parent: Option<NodeId>,
    pub(crate) attached: bool,
}

impl Node {
    pub(crate) fn new(kind: NodeKind) -> Self {
        Self { kind, parent: None, attached: false }
    }
}

/// Reference to a rule, possibly in another definition.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct RuleRef {
    /// Index into the owning definition's targets, `None` for its own rules.
    pub(crate) target: Option<u32>,
    pub(crate) rule: RuleId,
}

/// Rule named in the grammar text, resolved by the link pass.
#[derive(Debug)]
pub(crate) struct RuleSlot {
    pub(crate) name: Box<str>,
    pub(crate) resolved: Option<RuleRef>,
}

impl RuleSlot {
    pub(crate) fn new(name: &str) -> Self {
        Self { name: name.into(), resolved: None }
    }
}

#[derive(Debug)]
pub(crate) enum InvokeTarget {
    Named { name: Box<str>, resolved: Option<u32> },
    Target(u32),
}

impl InvokeTarget {
    pub(crate) fn target(&self) -> Option<u32> {
        match *self {
            Self::Named { resolved, .. } => resolved,
            Self::Target(target) => Some(target),
        }
    }
}

pub(crate) enum NodeKind {
    Char { ch: u8, invert: bool },
    Greater { ch: u8, invert: bool },
    GreaterOrEqual { ch: u8, invert: bool },
    Any,
    RangeMinMax { a: u8, b: u8, invert: bool },
    RangeExplicit { set: Box<[u8]>, invert: bool },
    String { s: Box<[u8]>, case_sensitive: bool },
    Keyword { map: KeywordMap, words: Box<str> },
    Repeat { min: usize, max: usize, entry: NodeId },
    LazyRepeat { min: usize, entry: NodeId },
    GreedyRepeat { min: usize, max: usize, entry: NodeId },
    Length { min: usize, max: usize, entry: NodeId },
    Boi,
    Eoi,
    Pass { invert: bool },
    Find { entry: NodeId },
    Ahead { entry: NodeId, invert: bool },
    Behind { entry: NodeId, length: usize, invert: bool },
    Choice { alternatives: Box<[NodeId]> },
    Glue { sequence: Box<[NodeId]> },
    Hint { text: Option<Box<str>> },
    Expect { message: Box<str>, entry: NodeId },
    Call { callback: Callback },
    Error,
    Set { flag: usize, value: bool },
    If { flag: usize, then: NodeId, otherwise: NodeId },
    GetChar { slot: usize },
    SetChar { slot: usize, value: u8 },
    VarChar { slot: usize, invert: bool },
    GetString { slot: usize, coverage: NodeId },
    SetString { slot: usize, value: Box<[u8]> },
    VarString { slot: usize },
    Ref { rule: RuleSlot },
    Inline { rule: RuleSlot },
    Previous { rule: RuleSlot, keyword: Option<(Box<str>, Option<KeywordId>)> },
    Context { rule: RuleSlot, entry: Option<NodeId> },
    Invoke { target: InvokeTarget, coverage: Option<NodeId> },
}

impl NodeKind {
    /// Direct children, in match order.
    pub(crate) fn children(&self) -> Vec<NodeId> {
        match self {
            Self::Repeat { entry, .. }
            | Self::LazyRepeat { entry, .. }
            | Self::GreedyRepeat { entry, .. }
            | Self::Length { entry, .. }
            | Self::Find { entry }
            | Self::Ahead { entry, .. }
            | Self::Behind { entry, .. }
            | Self::Expect { entry, .. }
            | Self::GetString { coverage: entry, .. } => vec![*entry],
            Self::Choice { alternatives: nodes } | Self::Glue { sequence: nodes } => nodes.to_vec(),
            Self::If { then, otherwise, .. } => vec![*then, *otherwise],
            Self::Context { entry, .. } | Self::Invoke { coverage: entry, .. } => {
                entry.iter().copied().collect()
            }
            _ => Vec::new(),
        }
    }

    pub(crate) fn rule_slot(&self) -> Option<&RuleSlot> {
        match self {
            Self::Ref { rule } | Self::Inline { rule } => Some(rule),
            Self::Previous { rule, .. } | Self::Context { rule, .. } => Some(rule),
            _ => None,
        }
    }

    /// Declaration keyword used when printing the grammar.
    pub(crate) fn declaration_type(&self) -> &'static str {
        match *self {
            Self::Char { invert, .. } => pick(invert, "CHAR", "OTHER"),
            Self::Greater { invert, .. } => pick(invert, "GREATER", "BELOW_OR_EQUAL"),
            Self::GreaterOrEqual { invert, .. } => pick(invert, "GREATER_OR_EQUAL", "BELOW"),
            Self::Any => "ANY",
            Self::RangeMinMax { invert, .. } | Self::RangeExplicit { invert, .. } => {
                pick(invert, "RANGE", "EXCEPT")
            }
            Self::String { .. } => "STRING",
            Self::Keyword { .. } => "KEYWORD",
            Self::Repeat { .. } => "REPEAT",
            Self::LazyRepeat { .. } => "LAZY_REPEAT",
            Self::GreedyRepeat { .. } => "GREEDY_REPEAT",
            Self::Length { .. } => "LENGTH",
            Self::Boi => "BOI",
            Self::Eoi => "EOI",
            Self::Pass { invert } => pick(invert, "PASS", "FAIL"),
            Self::Find { .. } => "FIND",
            Self::Ahead { invert, .. } => pick(invert, "AHEAD", "NOT"),
            Self::Behind { invert, .. } => pick(invert, "BEHIND", "NOT_BEHIND"),
            Self::Choice { .. } => "CHOICE",
            Self::Glue { .. } => "GLUE",
            Self::Hint { ref text } => if text.is_some() { "HINT" } else { "DONE" },
            Self::Expect { .. } => "EXPECT",
            Self::Call { .. } => "CALL",
            Self::Error => "ERROR",
            Self::Set { .. } => "SET",
            Self::If { .. } => "IF",
            Self::GetChar { .. } => "GETCHAR",
            Self::SetChar { .. } => "SETCHAR",
            Self::VarChar { invert, .. } => pick(invert, "VARCHAR", "VAROTHER"),
            Self::GetString { .. } => "GETSTRING",
            Self::SetString { .. } => "SETSTRING",
            Self::VarString { .. } => "VARSTRING",
            Self::Ref { .. } => "REF",
            Self::Inline { .. } => "INLINE",
            Self::Previous { .. } => "PREVIOUS",
            Self::Context { .. } => "CONTEXT",
            Self::Invoke { .. } => "INVOKE",
        }
    }
}

fn pick(invert: bool, plain: &'static str, inverted: &'static str) -> &'static str {
    if invert { inverted } else { plain }
}

impl fmt::Debug for NodeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.declaration_type())
    }
}

#[derive(Debug)]
pub(crate) struct RuleData {
    pub(crate) name: Box<str>,
    pub(crate) void: bool,
    pub(crate) entry: NodeId,
}
