use std::cell::RefCell;
use std::ops::{Bound, RangeBounds};
use std::sync::Arc;

use indexmap::IndexSet;
use rustc_hash::FxHashMap;
use strand_errors::{GrammarError, StateKind, SyntaxError};
use strand_tree::arena::Arena;
use strand_tree::{KeywordId, RuleId};

use crate::definition::{Definition, Target};
use crate::keyword::KeywordMap;
use crate::link::ScopeBuilder;
use crate::node::{InvokeTarget, Node, NodeId, NodeKind, RuleData, RuleSlot};
use crate::state::{StateLayout, SyntaxState};

/// Authoring side of a grammar.
///
/// Combinators take `&self` so they nest like the grammar they describe:
///
/// ```ignore
/// let g = DefinitionBuilder::new();
/// g.define("Digit", g.range(b'0', b'9'));
/// g.define("Number", g.repeat(1.., g.reference("Digit")));
/// g.entry("Number");
/// let number = g.link()?;
/// ```
///
/// Mistakes (redefinitions, unknown state variables, ...) are remembered and
/// reported by [`DefinitionBuilder::link`], which is the only way to obtain
/// a matchable [`Definition`].
#[derive(Default)]
pub struct DefinitionBuilder {
    inner: RefCell<BuilderData>,
}

pub(crate) struct BuilderData {
    pub(crate) name: Option<Box<str>>,
    pub(crate) case_sensitive: bool,
    pub(crate) nodes: Arena<Node>,
    pub(crate) rules: Vec<RuleData>,
    pub(crate) rule_by_name: FxHashMap<Box<str>, RuleId>,
    pub(crate) keywords: IndexSet<Box<str>>,
    pub(crate) imports: Vec<(Box<str>, Definition)>,
    pub(crate) targets: Vec<Target>,
    pub(crate) entry: Option<Box<str>>,
    pub(crate) layout: StateLayout,
    pub(crate) error_hook: Option<crate::node::ErrorHook>,
    pub(crate) error: Option<GrammarError>,
}

impl Default for BuilderData {
    fn default() -> Self {
        Self {
            name: None,
            case_sensitive: true,
            nodes: Arena::new(),
            rules: Vec::new(),
            rule_by_name: FxHashMap::default(),
            keywords: IndexSet::new(),
            imports: Vec::new(),
            targets: Vec::new(),
            entry: None,
            layout: StateLayout::default(),
            error_hook: None,
            error: None,
        }
    }
}

impl BuilderData {
    fn fail(&mut self, error: GrammarError) {
        if self.error.is_none() {
            self.error = Some(error);
        }
    }

    fn alloc(&mut self, kind: NodeKind) -> NodeId {
        let children = kind.children();
        let id = self.nodes.alloc(Node::new(kind));
        for child in children {
            self.attach(child, Some(id));
        }
        id
    }

    fn attach(&mut self, child: NodeId, parent: Option<NodeId>) {
        if self.nodes.get(child).is_none() {
            self.fail(GrammarError::UnknownNode);
            return;
        }
        let node = &mut self.nodes[child];
        if node.attached {
            self.fail(GrammarError::NodeReused);
            return;
        }
        node.attached = true;
        node.parent = parent;
    }

    fn add_rule(&mut self, name: &str, entry: NodeId, void: bool) -> RuleId {
        if let Some(&rule) = self.rule_by_name.get(name) {
            self.fail(GrammarError::Redefinition { rule: name.to_owned() });
            return rule;
        }
        self.attach(entry, None);
        let rule = RuleId::new(self.rules.len() as u32);
        self.rules.push(RuleData { name: name.into(), void, entry });
        self.rule_by_name.insert(name.into(), rule);
        rule
    }

    fn state_slot(&mut self, kind: StateKind, name: &str) -> usize {
        let slot = match kind {
            StateKind::Flag => self.layout.flags.get_index_of(name),
            StateKind::Char => self.layout.chars.get_index_of(name),
            StateKind::String => self.layout.strings.get_index_of(name),
        };
        slot.unwrap_or_else(|| {
            self.fail(GrammarError::UndefinedStateVariable { kind, name: name.to_owned() });
            0
        })
    }

    fn declare<T>(
        &mut self,
        kind: StateKind,
        name: &str,
        value: T,
        slots: impl FnOnce(&mut StateLayout) -> &mut indexmap::IndexMap<Box<str>, T>,
    ) -> usize {
        let slots = slots(&mut self.layout);
        if let Some(slot) = slots.get_index_of(name) {
            self.fail(GrammarError::StateRedefinition { kind, name: name.to_owned() });
            return slot;
        }
        slots.insert_full(name.into(), value).0
    }

    /// Static length of whatever `node` matches, if it has one.
    fn fixed_length(&self, node: NodeId) -> Option<usize> {
        match &self.nodes.get(node)?.kind {
            NodeKind::Char { .. }
            | NodeKind::Greater { .. }
            | NodeKind::GreaterOrEqual { .. }
            | NodeKind::Any
            | NodeKind::RangeMinMax { .. }
            | NodeKind::RangeExplicit { .. }
            | NodeKind::GetChar { .. }
            | NodeKind::VarChar { .. } => Some(1),
            NodeKind::String { s, .. } => Some(s.len()),
            NodeKind::Repeat { min, max, entry } | NodeKind::GreedyRepeat { min, max, entry }
                if min == max =>
            {
                min.checked_mul(self.fixed_length(*entry)?)
            }
            NodeKind::Boi
            | NodeKind::Eoi
            | NodeKind::Pass { .. }
            | NodeKind::Ahead { .. }
            | NodeKind::Behind { .. }
            | NodeKind::Hint { .. }
            | NodeKind::Set { .. }
            | NodeKind::SetChar { .. }
            | NodeKind::SetString { .. }
            | NodeKind::Previous { .. } => Some(0),
            NodeKind::Expect { entry, .. } => self.fixed_length(*entry),
            NodeKind::Choice { alternatives } => {
                let (first, rest) = alternatives.split_first()?;
                let length = self.fixed_length(*first)?;
                rest.iter().all(|&node| self.fixed_length(node) == Some(length)).then_some(length)
            }
            NodeKind::Glue { sequence } => {
                sequence.iter().try_fold(0usize, |sum, &node| sum.checked_add(self.fixed_length(node)?))
            }
            _ => None,
        }
    }
}

fn bounds(range: impl RangeBounds<usize>) -> (usize, usize) {
    let min = match range.start_bound() {
        Bound::Included(&n) => n,
        Bound::Excluded(&n) => n.saturating_add(1),
        Bound::Unbounded => 0,
    };
    let max = match range.end_bound() {
        Bound::Included(&n) => n,
        Bound::Excluded(&n) => n.saturating_sub(1),
        Bound::Unbounded => usize::MAX,
    };
    (min, max)
}

impl DefinitionBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder for a definition other grammars can import or invoke by
    /// `name`.
    pub fn named(name: &str) -> Self {
        let builder = Self::new();
        builder.syntax(name);
        builder
    }

    fn with<R>(&self, f: impl FnOnce(&mut BuilderData) -> R) -> R {
        f(&mut self.inner.borrow_mut())
    }

    fn node(&self, kind: NodeKind) -> NodeId {
        self.with(|data| data.alloc(kind))
    }

    pub(crate) fn into_data(self) -> BuilderData {
        self.inner.into_inner()
    }

    /// Names the definition. The name also determines its id.
    pub fn syntax(&self, name: &str) {
        self.with(|data| data.name = Some(name.into()));
    }

    /// Makes the rules of `definition` reachable as `alias::Rule` (the
    /// definition's own name when `alias` is `None`) and lets `invoke` use
    /// it by that name.
    pub fn import(&self, definition: &Definition, alias: Option<&str>) {
        self.with(|data| match alias.or(definition.name()) {
            Some(name) => data.imports.push((name.into(), definition.clone())),
            None => data.fail(GrammarError::AnonymousImport),
        });
    }

    /// Sets a named option. `caseSensitive` is the only one.
    pub fn option(&self, name: &str, value: bool) {
        self.with(|data| {
            if name.eq_ignore_ascii_case("caseSensitive") {
                data.case_sensitive = value;
            } else {
                data.fail(GrammarError::UnknownOption { option: name.to_owned() });
            }
        });
    }

    /// Applies to `string` and `keyword` nodes created afterwards.
    pub fn set_case_sensitive(&self, value: bool) {
        self.with(|data| data.case_sensitive = value);
    }

    /// Replaces the diagnostic produced by `error()` nodes.
    pub fn on_syntax_error(
        &self,
        hook: impl Fn(&[u8], usize, Option<&SyntaxState>) -> SyntaxError + Send + Sync + 'static,
    ) {
        self.with(|data| data.error_hook = Some(Arc::new(hook)));
    }

    pub fn char(&self, ch: u8) -> NodeId {
        self.node(NodeKind::Char { ch, invert: false })
    }

    /// Any single byte except `ch`.
    pub fn other(&self, ch: u8) -> NodeId {
        self.node(NodeKind::Char { ch, invert: true })
    }

    pub fn greater(&self, ch: u8) -> NodeId {
        self.node(NodeKind::Greater { ch, invert: false })
    }

    pub fn below_or_equal(&self, ch: u8) -> NodeId {
        self.node(NodeKind::Greater { ch, invert: true })
    }

    pub fn greater_or_equal(&self, ch: u8) -> NodeId {
        self.node(NodeKind::GreaterOrEqual { ch, invert: false })
    }

    pub fn below(&self, ch: u8) -> NodeId {
        self.node(NodeKind::GreaterOrEqual { ch, invert: true })
    }

    pub fn any(&self) -> NodeId {
        self.node(NodeKind::Any)
    }

    /// One byte in `a..=b`.
    pub fn range(&self, a: u8, b: u8) -> NodeId {
        self.node(NodeKind::RangeMinMax { a, b, invert: false })
    }

    /// One byte out of `set`.
    pub fn range_of(&self, set: impl AsRef<[u8]>) -> NodeId {
        self.node(NodeKind::RangeExplicit { set: set.as_ref().into(), invert: false })
    }

    pub fn except(&self, a: u8, b: u8) -> NodeId {
        self.node(NodeKind::RangeMinMax { a, b, invert: true })
    }

    pub fn except_of(&self, set: impl AsRef<[u8]>) -> NodeId {
        self.node(NodeKind::RangeExplicit { set: set.as_ref().into(), invert: true })
    }

    pub fn string(&self, s: impl AsRef<[u8]>) -> NodeId {
        self.with(|data| {
            let kind = NodeKind::String { s: s.as_ref().into(), case_sensitive: data.case_sensitive };
            data.alloc(kind)
        })
    }

    /// Longest of the space or tab separated `words`. Tags the enclosing
    /// rule's token with the matched keyword.
    pub fn keyword(&self, words: &str) -> NodeId {
        self.with(|data| {
            let mut map = KeywordMap::new(data.case_sensitive);
            for word in words.split([' ', '\t']).filter(|word| !word.is_empty()) {
                let (index, _) = data.keywords.insert_full(word.into());
                map.insert(word.as_bytes(), KeywordId::new(index as u32));
            }
            data.alloc(NodeKind::Keyword { map, words: words.into() })
        })
    }

    /// `entry` as often as possible, succeeding when the count is within
    /// `count`.
    pub fn repeat(&self, count: impl RangeBounds<usize>, entry: NodeId) -> NodeId {
        let (min, max) = bounds(count);
        self.node(NodeKind::Repeat { min, max, entry })
    }

    /// Fewest repetitions (at least `min`) after which the rest of the
    /// enclosing sequence matches.
    pub fn lazy_repeat(&self, min: usize, entry: NodeId) -> NodeId {
        self.node(NodeKind::LazyRepeat { min, entry })
    }

    /// Most repetitions after which the rest of the enclosing sequence
    /// matches.
    pub fn greedy_repeat(&self, count: impl RangeBounds<usize>, entry: NodeId) -> NodeId {
        let (min, max) = bounds(count);
        self.node(NodeKind::GreedyRepeat { min, max, entry })
    }

    /// `entry` once, accepted only if the matched length is within `length`.
    pub fn length(&self, length: impl RangeBounds<usize>, entry: NodeId) -> NodeId {
        let (min, max) = bounds(length);
        self.node(NodeKind::Length { min, max, entry })
    }

    pub fn boi(&self) -> NodeId {
        self.node(NodeKind::Boi)
    }

    pub fn eoi(&self) -> NodeId {
        self.node(NodeKind::Eoi)
    }

    pub fn pass(&self) -> NodeId {
        self.node(NodeKind::Pass { invert: false })
    }

    pub fn fail(&self) -> NodeId {
        self.node(NodeKind::Pass { invert: true })
    }

    pub fn find(&self, entry: NodeId) -> NodeId {
        self.node(NodeKind::Find { entry })
    }

    pub fn ahead(&self, entry: NodeId) -> NodeId {
        self.node(NodeKind::Ahead { entry, invert: false })
    }

    pub fn not(&self, entry: NodeId) -> NodeId {
        self.node(NodeKind::Ahead { entry, invert: true })
    }

    /// Zero-width check that `entry` ends right at the cursor. `entry` must
    /// have a fixed length.
    pub fn behind(&self, entry: NodeId) -> NodeId {
        self.behind_node(entry, false)
    }

    pub fn not_behind(&self, entry: NodeId) -> NodeId {
        self.behind_node(entry, true)
    }

    fn behind_node(&self, entry: NodeId, invert: bool) -> NodeId {
        self.with(|data| {
            let length = data.fixed_length(entry).unwrap_or_else(|| {
                data.fail(GrammarError::UnboundedBehind);
                0
            });
            data.alloc(NodeKind::Behind { entry, length, invert })
        })
    }

    pub fn choice(&self, alternatives: impl IntoIterator<Item = NodeId>) -> NodeId {
        self.node(NodeKind::Choice { alternatives: alternatives.into_iter().collect() })
    }

    pub fn glue(&self, sequence: impl IntoIterator<Item = NodeId>) -> NodeId {
        self.node(NodeKind::Glue { sequence: sequence.into_iter().collect() })
    }

    /// Remembers `text` as the explanation for a failure further on, unless
    /// a hint is already pending.
    pub fn hint(&self, text: &str) -> NodeId {
        self.node(NodeKind::Hint { text: Some(text.into()) })
    }

    /// Clears the pending hint.
    pub fn done(&self) -> NodeId {
        self.node(NodeKind::Hint { text: None })
    }

    /// When `entry` fails, reports `message` and gives up on the whole match.
    pub fn expect(&self, message: &str, entry: NodeId) -> NodeId {
        self.node(NodeKind::Expect { message: message.into(), entry })
    }

    pub fn call(
        &self,
        callback: impl Fn(&[u8], usize, Option<&mut SyntaxState>) -> Option<usize>
        + Send
        + Sync
        + 'static,
    ) -> NodeId {
        self.node(NodeKind::Call { callback: Arc::new(callback) })
    }

    /// Raises a syntax error through the hook set with
    /// [`DefinitionBuilder::on_syntax_error`] and stops matching.
    pub fn error(&self) -> NodeId {
        self.node(NodeKind::Error)
    }

    pub fn define(&self, name: &str, entry: NodeId) -> RuleId {
        self.with(|data| data.add_rule(name, entry, false))
    }

    /// Rule whose token is dissolved into its parent after a match.
    pub fn define_void(&self, name: &str, entry: NodeId) -> RuleId {
        self.with(|data| data.add_rule(name, entry, true))
    }

    pub fn entry(&self, rule: &str) {
        self.with(|data| data.entry = Some(rule.into()));
    }

    /// The rule `name`, which may be scoped like `Other::Rule`.
    pub fn reference(&self, name: &str) -> NodeId {
        self.node(NodeKind::Ref { rule: RuleSlot::new(name) })
    }

    /// The body of rule `name`, without a token of its own.
    pub fn inline(&self, name: &str) -> NodeId {
        self.node(NodeKind::Inline { rule: RuleSlot::new(name) })
    }

    /// Zero-width check that the token before the current rule's token is
    /// an instance of `rule`.
    pub fn previous(&self, rule: &str) -> NodeId {
        self.node(NodeKind::Previous { rule: RuleSlot::new(rule), keyword: None })
    }

    /// Like [`DefinitionBuilder::previous`], also requiring `keyword`.
    pub fn previous_keyword(&self, rule: &str, keyword: &str) -> NodeId {
        self.node(NodeKind::Previous {
            rule: RuleSlot::new(rule),
            keyword: Some((keyword.into(), None)),
        })
    }

    /// Checks that the current rule is nested in `rule`, then matches
    /// `entry` (if any) as part of that enclosing token.
    pub fn context(&self, rule: &str, entry: Option<NodeId>) -> NodeId {
        self.node(NodeKind::Context { rule: RuleSlot::new(rule), entry })
    }

    pub fn state_flag(&self, name: &str, default: bool) {
        self.with(|data| data.declare(StateKind::Flag, name, default, |layout| &mut layout.flags));
    }

    pub fn state_char(&self, name: &str, default: u8) {
        self.with(|data| data.declare(StateKind::Char, name, default, |layout| &mut layout.chars));
    }

    pub fn state_string(&self, name: &str, default: &[u8]) {
        self.with(|data| {
            data.declare(StateKind::String, name, default.into(), |layout| &mut layout.strings)
        });
    }

    /// Declares an empty string slot unless `name` already exists.
    pub fn touch_string(&self, name: &str) {
        self.with(|data| {
            if !data.layout.strings.contains_key(name) {
                data.layout.strings.insert(name.into(), Box::default());
            }
        });
    }

    pub fn set(&self, flag: &str, value: bool) -> NodeId {
        self.with(|data| {
            let flag = data.state_slot(StateKind::Flag, flag);
            data.alloc(NodeKind::Set { flag, value })
        })
    }

    /// `then` when `flag` is set, otherwise `otherwise` (or nothing).
    pub fn if_flag(&self, flag: &str, then: NodeId, otherwise: Option<NodeId>) -> NodeId {
        let otherwise = otherwise.unwrap_or_else(|| self.pass());
        self.with(|data| {
            let flag = data.state_slot(StateKind::Flag, flag);
            data.alloc(NodeKind::If { flag, then, otherwise })
        })
    }

    /// Consumes one byte and stores it in `name`.
    pub fn get_char(&self, name: &str) -> NodeId {
        self.with(|data| {
            let slot = data.state_slot(StateKind::Char, name);
            data.alloc(NodeKind::GetChar { slot })
        })
    }

    pub fn set_char(&self, name: &str, value: u8) -> NodeId {
        self.with(|data| {
            let slot = data.state_slot(StateKind::Char, name);
            data.alloc(NodeKind::SetChar { slot, value })
        })
    }

    /// One byte equal to the one stored in `name`.
    pub fn var_char(&self, name: &str) -> NodeId {
        self.var_char_node(name, false)
    }

    pub fn var_other(&self, name: &str) -> NodeId {
        self.var_char_node(name, true)
    }

    fn var_char_node(&self, name: &str, invert: bool) -> NodeId {
        self.with(|data| {
            let slot = data.state_slot(StateKind::Char, name);
            data.alloc(NodeKind::VarChar { slot, invert })
        })
    }

    /// Stores the text matched by `coverage` in `name`.
    pub fn get_string(&self, name: &str, coverage: NodeId) -> NodeId {
        self.with(|data| {
            let slot = data.state_slot(StateKind::String, name);
            data.alloc(NodeKind::GetString { slot, coverage })
        })
    }

    pub fn set_string(&self, name: &str, value: impl AsRef<[u8]>) -> NodeId {
        self.with(|data| {
            let slot = data.state_slot(StateKind::String, name);
            data.alloc(NodeKind::SetString { slot, value: value.as_ref().into() })
        })
    }

    /// The literal text stored in `name`.
    pub fn var_string(&self, name: &str) -> NodeId {
        self.with(|data| {
            let slot = data.state_slot(StateKind::String, name);
            data.alloc(NodeKind::VarString { slot })
        })
    }

    /// Matches the entry rule of the definition `name` (imported or in the
    /// same scope). With a `coverage`, the sub-grammar only sees the text
    /// `coverage` matched.
    pub fn invoke(&self, name: &str, coverage: Option<NodeId>) -> NodeId {
        self.node(NodeKind::Invoke {
            target: InvokeTarget::Named { name: name.into(), resolved: None },
            coverage,
        })
    }

    pub fn invoke_definition(&self, definition: &Definition, coverage: Option<NodeId>) -> NodeId {
        self.with(|data| {
            let target = Target::External(definition.clone());
            let index = match data.targets.iter().position(|known| known.same(&target)) {
                Some(index) => index,
                None => {
                    data.targets.push(target);
                    data.targets.len() - 1
                }
            };
            data.alloc(NodeKind::Invoke { target: InvokeTarget::Target(index as u32), coverage })
        })
    }

    /// Resolves every name and returns the finished definition.
    pub fn link(self) -> Result<Definition, GrammarError> {
        self.link_with(true)
    }

    /// Like [`DefinitionBuilder::link`]; `optimize` turns references to
    /// void rules whose bodies contain no references into inline matches.
    pub fn link_with(self, optimize: bool) -> Result<Definition, GrammarError> {
        let mut scope = ScopeBuilder::new();
        scope.add(self);
        let scope = scope.link_with(optimize)?;
        Ok(Definition { scope: scope.0, index: 0 })
    }
}
