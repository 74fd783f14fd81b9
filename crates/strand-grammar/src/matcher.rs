use drop_bomb::DropBomb;
use strand_errors::SyntaxError;
use strand_tree::{DefinitionId, RuleId, TokenId, TokenTree};

use crate::definition::{DefinitionData, Hint, ScopeData, Target};
use crate::node::{NodeId, NodeKind, RuleRef};
use crate::state::SyntaxState;

/// One definition of a linked scope, borrowed for the duration of a match.
#[derive(Clone, Copy)]
pub(crate) struct Grammar<'g> {
    scope: &'g ScopeData,
    index: usize,
}

impl<'g> Grammar<'g> {
    pub(crate) fn new(scope: &'g ScopeData, index: usize) -> Self {
        Self { scope, index }
    }

    pub(crate) fn data(self) -> &'g DefinitionData {
        &self.scope.members[self.index]
    }

    fn same(self, other: Self) -> bool {
        std::ptr::eq(self.scope, other.scope) && self.index == other.index
    }

    pub(crate) fn target(self, target: u32) -> Option<Self> {
        match self.data().targets.get(target as usize)? {
            Target::Member(index) => Some(Self::new(self.scope, *index)),
            Target::External(definition) => Some(Self::new(&definition.scope, definition.index)),
        }
    }

    /// The grammar with the given id among this one and everything it can
    /// reach.
    pub(crate) fn find(self, id: DefinitionId) -> Option<Self> {
        let mut visited: Vec<Self> = Vec::new();
        let mut stack = vec![self];
        while let Some(grammar) = stack.pop() {
            if visited.iter().any(|seen| seen.same(grammar)) {
                continue;
            }
            visited.push(grammar);
            if grammar.data().id == id {
                return Some(grammar);
            }
            stack.extend((0..grammar.scope.members.len()).map(|i| Self::new(grammar.scope, i)));
            stack.extend((0..grammar.data().targets.len() as u32).filter_map(|t| grammar.target(t)));
        }
        None
    }

    /// Node matched right after `node` within its rule body, looking through
    /// enclosing sequences and choices.
    pub(crate) fn successor(self, node: NodeId) -> Option<NodeId> {
        let nodes = &self.data().nodes;
        let parent = nodes[node].parent?;
        match &nodes[parent].kind {
            NodeKind::Glue { sequence } => {
                let at = sequence.iter().position(|&child| child == node)?;
                match sequence.get(at + 1) {
                    Some(&next) => Some(next),
                    None => self.successor(parent),
                }
            }
            NodeKind::Choice { .. } => self.successor(parent),
            _ => None,
        }
    }
}

/// Tokens appended to `parent` since creation are either kept or discarded.
struct Checkpoint {
    parent: Option<TokenId>,
    saved: Option<TokenId>,
    bomb: DropBomb,
}

impl Checkpoint {
    fn new(tree: &TokenTree, parent: Option<TokenId>) -> Self {
        Self {
            parent,
            saved: parent.and_then(|parent| tree.last_child(parent)),
            bomb: DropBomb::new("Checkpoint must be either committed or rolled back"),
        }
    }

    fn commit(mut self) {
        self.bomb.defuse();
    }

    fn roll_back(mut self, tree: &mut TokenTree) {
        self.bomb.defuse();
        self.rewind(tree);
    }

    /// Rolls back without closing the checkpoint.
    fn rewind(&self, tree: &mut TokenTree) {
        if let Some(parent) = self.parent {
            tree.roll_back(parent, self.saved);
        }
    }

    fn settle(self, tree: &mut TokenTree, result: Option<usize>) -> Option<usize> {
        match result {
            Some(_) => self.commit(),
            None => self.roll_back(tree),
        }
        result
    }
}

pub(crate) struct Outcome {
    pub(crate) end: Option<usize>,
    pub(crate) hint: Option<Hint>,
    pub(crate) raised: Option<SyntaxError>,
}

/// Runs the entry rule of `grammar` once at `i0`.
pub(crate) fn run(
    grammar: Grammar<'_>,
    text: &[u8],
    i0: usize,
    state: Option<&mut SyntaxState>,
    tree: &mut TokenTree,
) -> Outcome {
    let mut matcher =
        Matcher { text, tree, record: true, hint: None, finalized: false, raised: None };
    let end = matcher.rule_ref(grammar, grammar.data().entry, false, i0, None, state);
    Outcome {
        end,
        hint: matcher.hint.map(|(text, offset)| Hint { text: text.to_owned(), offset }),
        raised: matcher.raised,
    }
}

/// State of one recursive descent over `text`.
struct Matcher<'g, 'm> {
    text: &'m [u8],
    tree: &'m mut TokenTree,
    /// Cleared while probing: no tokens are produced.
    record: bool,
    hint: Option<(&'g str, usize)>,
    /// Set by `expect` and `error` nodes; every pending alternative fails.
    finalized: bool,
    raised: Option<SyntaxError>,
}

/// Picks the state for matching inside `target`: the current one when it
/// belongs to `target`, else the child state, created on demand.
fn enter<'s>(
    target: Grammar<'_>,
    state: Option<&'s mut SyntaxState>,
    local: &'s mut Option<SyntaxState>,
) -> Option<&'s mut SyntaxState> {
    let data = target.data();
    if !data.stateful {
        return None;
    }
    match state {
        Some(state) if data.layout.fits(state, data.id) => Some(state),
        Some(state) => {
            let child = state.child_mut();
            if !child.as_deref().is_some_and(|child| data.layout.fits(child, data.id)) {
                *child = Some(Box::new(data.layout.new_state(data.id)));
            }
            child.as_deref_mut()
        }
        None => Some(local.insert(data.layout.new_state(data.id))),
    }
}

impl<'g> Matcher<'g, '_> {
    fn one(&self, i: usize, accept: impl FnOnce(u8) -> bool) -> Option<usize> {
        let byte = *self.text.get(i)?;
        accept(byte).then_some(i + 1)
    }

    fn node(
        &mut self,
        g: Grammar<'g>,
        id: NodeId,
        i: usize,
        parent: Option<TokenId>,
        state: Option<&mut SyntaxState>,
    ) -> Option<usize> {
        if self.finalized {
            return None;
        }
        let end = self.node_kind(g, id, i, parent, state);
        if self.finalized {
            return None;
        }
        end
    }

    /// Matches `id` without producing tokens, keeping the tree untouched.
    fn lookaround(
        &mut self,
        g: Grammar<'g>,
        id: NodeId,
        i: usize,
        state: Option<&mut SyntaxState>,
    ) -> Option<usize> {
        let record = std::mem::replace(&mut self.record, false);
        let end = self.node(g, id, i, None, state);
        self.record = record;
        end
    }

    /// Whether the nodes following `node` in its rule body match at `i`.
    /// Leaves no trace: state, hints and errors are restored.
    fn rest_matches(
        &mut self,
        g: Grammar<'g>,
        node: NodeId,
        i: usize,
        state: Option<&SyntaxState>,
    ) -> bool {
        let mut scratch = state.cloned();
        let hint = self.hint;
        let raised = self.raised.take();
        let record = std::mem::replace(&mut self.record, false);

        let mut at = Some(i);
        let mut current = node;
        while let (Some(i), Some(next)) = (at, g.successor(current)) {
            at = self.node(g, next, i, None, scratch.as_mut());
            current = next;
        }

        self.record = record;
        self.hint = hint;
        self.raised = raised;
        self.finalized = false;
        at.is_some()
    }

    /// Matches rule `rule` of `g`, wrapping its body in a new token
    /// appended to `parent`.
    fn rule(
        &mut self,
        g: Grammar<'g>,
        rule: RuleId,
        i: usize,
        parent: Option<TokenId>,
        state: Option<&mut SyntaxState>,
    ) -> Option<usize> {
        let data = g.data().rules.get(rule.index() as usize)?;
        if !self.record {
            return self.node(g, data.entry, i, None, state);
        }

        log::trace!("enter {} at {i}", data.name);
        let token = self.tree.produce(g.data().id, Some(rule));
        if let Some(parent) = parent {
            self.tree.append_child(parent, token);
        }
        let end = self.node(g, data.entry, i, Some(token), state);
        match end {
            Some(end) => {
                log::trace!("exit {} at {end}", data.name);
                self.tree.set_range(token, i, end);
                match parent {
                    Some(_) if data.void => self.tree.dissolve(token),
                    Some(_) => {}
                    None => self.tree.set_root(Some(token)),
                }
            }
            None => {
                log::trace!("fail {} at {i}", data.name);
                self.tree.discard(token);
            }
        }
        end
    }

    /// Follows a resolved reference, switching definition (and state) when
    /// it points outside `g`.
    fn rule_ref(
        &mut self,
        g: Grammar<'g>,
        rule: RuleRef,
        inline: bool,
        i: usize,
        parent: Option<TokenId>,
        state: Option<&mut SyntaxState>,
    ) -> Option<usize> {
        let target = match rule.target {
            Some(target) => g.target(target)?,
            None => g,
        };
        let mut local = None;
        let state = if target.same(g) { state } else { enter(target, state, &mut local) };
        if inline {
            let entry = target.data().rules.get(rule.rule.index() as usize)?.entry;
            self.node(target, entry, i, parent, state)
        } else {
            self.rule(target, rule.rule, i, parent, state)
        }
    }

    /// Whether `token` was produced by the rule `rule` refers to.
    fn is_instance(&self, g: Grammar<'g>, token: TokenId, rule: RuleRef) -> bool {
        let target = match rule.target {
            Some(target) => g.target(target),
            None => Some(g),
        };
        let token = &self.tree[token];
        target.is_some_and(|target| {
            token.definition() == target.data().id && token.rule() == Some(rule.rule)
        })
    }

    fn node_kind(
        &mut self,
        g: Grammar<'g>,
        id: NodeId,
        i: usize,
        parent: Option<TokenId>,
        mut state: Option<&mut SyntaxState>,
    ) -> Option<usize> {
        let text = self.text;
        match &g.data().nodes[id].kind {
            &NodeKind::Char { ch, invert } => self.one(i, |b| (b == ch) != invert),
            &NodeKind::Greater { ch, invert } => self.one(i, |b| (b > ch) != invert),
            &NodeKind::GreaterOrEqual { ch, invert } => self.one(i, |b| (b >= ch) != invert),
            NodeKind::Any => self.one(i, |_| true),
            &NodeKind::RangeMinMax { a, b, invert } => {
                self.one(i, |u| (a..=b).contains(&u) != invert)
            }
            NodeKind::RangeExplicit { set, invert } => {
                self.one(i, |u| set.contains(&u) != *invert)
            }
            NodeKind::String { s, case_sensitive } => {
                let end = i.checked_add(s.len())?;
                let found = text.get(i..end)?;
                let equal =
                    if *case_sensitive { found == &**s } else { found.eq_ignore_ascii_case(s) };
                equal.then_some(end)
            }
            NodeKind::Keyword { map, .. } => {
                let (end, keyword) = map.longest_match(text, i)?;
                if let Some(parent) = parent {
                    self.tree.set_keyword(parent, Some(keyword));
                }
                Some(end)
            }
            &NodeKind::Repeat { min, max, entry } => {
                let checkpoint = Checkpoint::new(self.tree, parent);
                let mut count = 0;
                let mut at = i;
                while count < max {
                    let step = Checkpoint::new(self.tree, parent);
                    let Some(next) = self.node(g, entry, at, parent, state.as_deref_mut()) else {
                        step.roll_back(self.tree);
                        break;
                    };
                    step.commit();
                    count += 1;
                    if next == at {
                        log::warn!("repetition body matched the empty string at {at}");
                        break;
                    }
                    at = next;
                }
                checkpoint.settle(self.tree, (count >= min).then_some(at))
            }
            &NodeKind::LazyRepeat { min, entry } => {
                let checkpoint = Checkpoint::new(self.tree, parent);
                let mut count = 0;
                let mut at = i;
                let mut stalled = false;
                loop {
                    if count >= min && self.rest_matches(g, id, at, state.as_deref()) {
                        return checkpoint.settle(self.tree, Some(at));
                    }
                    if stalled {
                        break;
                    }
                    let step = Checkpoint::new(self.tree, parent);
                    let Some(next) = self.node(g, entry, at, parent, state.as_deref_mut()) else {
                        step.roll_back(self.tree);
                        break;
                    };
                    step.commit();
                    count += 1;
                    stalled = next == at;
                    if stalled {
                        log::warn!("repetition body matched the empty string at {at}");
                    }
                    at = next;
                }
                checkpoint.settle(self.tree, None)
            }
            &NodeKind::GreedyRepeat { min, max, entry } => {
                let checkpoint = Checkpoint::new(self.tree, parent);
                let last_child = |tree: &TokenTree| parent.and_then(|parent| tree.last_child(parent));
                let mut best = (min == 0).then(|| (i, last_child(&*self.tree)));
                let mut count = 0;
                let mut at = i;
                while count < max {
                    let step = Checkpoint::new(self.tree, parent);
                    let Some(next) = self.node(g, entry, at, parent, state.as_deref_mut()) else {
                        step.roll_back(self.tree);
                        break;
                    };
                    step.commit();
                    count += 1;
                    let stalled = next == at;
                    at = next;
                    if count >= min && self.rest_matches(g, id, at, state.as_deref()) {
                        best = Some((at, last_child(&*self.tree)));
                    }
                    if stalled {
                        log::warn!("repetition body matched the empty string at {at}");
                        break;
                    }
                }
                match best {
                    Some((end, saved)) => {
                        if let Some(parent) = parent {
                            self.tree.roll_back(parent, saved);
                        }
                        checkpoint.commit();
                        Some(end)
                    }
                    None => checkpoint.settle(self.tree, None),
                }
            }
            &NodeKind::Length { min, max, entry } => {
                let checkpoint = Checkpoint::new(self.tree, parent);
                let end = self.node(g, entry, i, parent, state).filter(|&end| {
                    end.checked_sub(i).is_some_and(|length| (min..=max).contains(&length))
                });
                checkpoint.settle(self.tree, end)
            }
            NodeKind::Boi => (i == 0).then_some(i),
            NodeKind::Eoi => (i == text.len()).then_some(i),
            &NodeKind::Pass { invert } => (!invert).then_some(i),
            &NodeKind::Find { entry } => {
                let mut at = i;
                loop {
                    let checkpoint = Checkpoint::new(self.tree, parent);
                    if let Some(end) = self.node(g, entry, at, parent, state.as_deref_mut()) {
                        checkpoint.commit();
                        return Some(end);
                    }
                    checkpoint.roll_back(self.tree);
                    if at >= text.len() || self.finalized {
                        return None;
                    }
                    at += 1;
                }
            }
            &NodeKind::Ahead { entry, invert } => {
                let matched = self.lookaround(g, entry, i, state).is_some();
                (matched != invert).then_some(i)
            }
            &NodeKind::Behind { entry, length, invert } => {
                // Too close to the start: fails either way.
                let start = i.checked_sub(length)?;
                let matched = self.lookaround(g, entry, start, state) == Some(i);
                (matched != invert).then_some(i)
            }
            NodeKind::Choice { alternatives } => {
                let checkpoint = Checkpoint::new(self.tree, parent);
                for &alternative in alternatives.iter() {
                    if let Some(end) = self.node(g, alternative, i, parent, state.as_deref_mut()) {
                        checkpoint.commit();
                        return Some(end);
                    }
                    checkpoint.rewind(self.tree);
                    if self.finalized {
                        break;
                    }
                }
                checkpoint.settle(self.tree, None)
            }
            NodeKind::Glue { sequence } => {
                let checkpoint = Checkpoint::new(self.tree, parent);
                let mut at = Some(i);
                for &node in sequence.iter() {
                    let Some(i) = at else { break };
                    at = self.node(g, node, i, parent, state.as_deref_mut());
                }
                checkpoint.settle(self.tree, at)
            }
            NodeKind::Hint { text: hint } => {
                match hint {
                    Some(hint) => {
                        if self.hint.is_none() {
                            self.hint = Some((&**hint, i));
                        }
                    }
                    None => self.hint = None,
                }
                Some(i)
            }
            NodeKind::Expect { message, entry } => {
                let end = self.node(g, *entry, i, parent, state);
                if end.is_none() && !self.finalized {
                    self.hint = Some((&**message, i));
                    self.finalized = true;
                }
                end
            }
            NodeKind::Call { callback } => callback(text, i, state),
            NodeKind::Error => {
                let error = match (&g.data().error_hook, self.hint) {
                    (Some(hook), _) => hook(text, i, state.as_deref()),
                    (None, Some((hint, at))) => SyntaxError::new(hint, text, at),
                    (None, None) => SyntaxError::new("syntax error", text, i),
                };
                log::debug!("syntax error raised: {error}");
                self.raised = Some(error);
                self.finalized = true;
                None
            }
            &NodeKind::Set { flag, value } => {
                state?.set_flag(flag, value);
                Some(i)
            }
            &NodeKind::If { flag, then, otherwise } => {
                let set = state.as_deref()?.flag(flag)?;
                self.node(g, if set { then } else { otherwise }, i, parent, state)
            }
            &NodeKind::GetChar { slot } => {
                let state = state?;
                let byte = *text.get(i)?;
                state.set_char(slot, byte);
                Some(i + 1)
            }
            &NodeKind::SetChar { slot, value } => {
                state?.set_char(slot, value);
                Some(i)
            }
            &NodeKind::VarChar { slot, invert } => {
                let ch = state.as_deref()?.char(slot)?;
                self.one(i, |b| (b == ch) != invert)
            }
            &NodeKind::GetString { slot, coverage } => {
                state.as_deref()?;
                let checkpoint = Checkpoint::new(self.tree, parent);
                let end = self.node(g, coverage, i, parent, state.as_deref_mut());
                let found = end.and_then(|end| text.get(i..end));
                match (found, state) {
                    (Some(found), Some(state)) => {
                        state.set_string(slot, found);
                        checkpoint.settle(self.tree, end)
                    }
                    _ => checkpoint.settle(self.tree, None),
                }
            }
            NodeKind::SetString { slot, value } => {
                state?.set_string(*slot, value);
                Some(i)
            }
            &NodeKind::VarString { slot } => {
                let value = state.as_deref()?.string(slot)?;
                let end = i.checked_add(value.len())?;
                (text.get(i..end)? == value).then_some(end)
            }
            NodeKind::Ref { rule } => {
                let checkpoint = Checkpoint::new(self.tree, parent);
                let end = match rule.resolved {
                    Some(rule) => self.rule_ref(g, rule, false, i, parent, state),
                    None => None,
                };
                checkpoint.settle(self.tree, end)
            }
            NodeKind::Inline { rule } => {
                let checkpoint = Checkpoint::new(self.tree, parent);
                let end = match rule.resolved {
                    Some(rule) => self.rule_ref(g, rule, true, i, parent, state),
                    None => None,
                };
                checkpoint.settle(self.tree, end)
            }
            NodeKind::Previous { rule, keyword } => {
                let previous = self.tree.prev_sibling(parent?)?;
                let matched = self.is_instance(g, previous, rule.resolved?)
                    && match keyword {
                        Some((_, keyword)) => {
                            keyword.is_some() && self.tree[previous].keyword() == *keyword
                        }
                        None => true,
                    };
                matched.then_some(i)
            }
            NodeKind::Context { rule, entry } => {
                let outer = self.tree.parent(parent?)?;
                if !self.is_instance(g, outer, rule.resolved?) {
                    return None;
                }
                match *entry {
                    Some(entry) => {
                        let checkpoint = Checkpoint::new(self.tree, Some(outer));
                        let end = self.node(g, entry, i, Some(outer), state);
                        checkpoint.settle(self.tree, end)
                    }
                    None => Some(i),
                }
            }
            NodeKind::Invoke { target, coverage } => {
                let target = g.target(target.target()?)?;
                let entry = target.data().entry;
                match *coverage {
                    Some(coverage) => {
                        let end = self.lookaround(g, coverage, i, state.as_deref_mut())?;
                        let covered = text.get(..end)?;
                        let mut local = None;
                        let state = enter(target, state, &mut local);
                        let mut inner = Matcher {
                            text: covered,
                            tree: &mut *self.tree,
                            record: self.record,
                            hint: None,
                            finalized: false,
                            raised: None,
                        };
                        let checkpoint = Checkpoint::new(inner.tree, parent);
                        let inner_end = inner.rule_ref(target, entry, false, i, parent, state);
                        if inner_end.is_none() {
                            log::debug!("invoked grammar did not match the covered text at {i}");
                        }
                        checkpoint.settle(inner.tree, inner_end);
                        Some(end)
                    }
                    None => {
                        let mut local = None;
                        let state = enter(target, state, &mut local);
                        let checkpoint = Checkpoint::new(self.tree, parent);
                        let end = self.rule_ref(target, entry, false, i, parent, state);
                        checkpoint.settle(self.tree, end)
                    }
                }
            }
        }
    }
}
