use std::fmt;
use std::sync::Arc;

use indexmap::IndexSet;
use rustc_hash::FxHashMap;
use strand_errors::SyntaxError;
use strand_tree::arena::Arena;
use strand_tree::{DefinitionId, KeywordId, RuleId, TokenRef, TokenTree};

use crate::matcher::{self, Grammar};
use crate::node::{ErrorHook, Node, RuleData, RuleRef};
use crate::state::{StateLayout, SyntaxState};

/// A definition reachable from another one.
#[derive(Clone)]
pub(crate) enum Target {
    /// Another member of the same scope.
    Member(usize),
    External(Definition),
}

impl Target {
    pub(crate) fn same(&self, other: &Self) -> bool {
        match (self, other) {
            (Self::Member(a), Self::Member(b)) => a == b,
            (Self::External(a), Self::External(b)) => a.same(b),
            _ => false,
        }
    }
}

pub(crate) struct DefinitionData {
    pub(crate) id: DefinitionId,
    pub(crate) name: Option<Box<str>>,
    pub(crate) nodes: Arena<Node>,
    pub(crate) rules: Vec<RuleData>,
    pub(crate) rule_by_name: FxHashMap<Box<str>, RuleId>,
    pub(crate) keywords: IndexSet<Box<str>>,
    pub(crate) entry: RuleRef,
    pub(crate) entry_name: Box<str>,
    pub(crate) targets: Vec<Target>,
    pub(crate) visible: FxHashMap<Box<str>, Target>,
    pub(crate) layout: StateLayout,
    pub(crate) stateful: bool,
    pub(crate) error_hook: Option<ErrorHook>,
}

pub(crate) struct ScopeData {
    pub(crate) members: Box<[DefinitionData]>,
}

/// Group of definitions linked together. Members see each other by name.
#[derive(Clone)]
pub struct Scope(pub(crate) Arc<ScopeData>);

impl Scope {
    pub fn definition(&self, name: &str) -> Option<Definition> {
        let index = self.0.members.iter().position(|data| data.name.as_deref() == Some(name))?;
        Some(Definition { scope: self.0.clone(), index })
    }

    pub fn definitions(&self) -> impl Iterator<Item = Definition> + '_ {
        (0..self.0.members.len()).map(|index| Definition { scope: self.0.clone(), index })
    }
}

impl fmt::Debug for Scope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list().entries(self.definitions()).finish()
    }
}

/// A linked grammar, ready for matching.
///
/// Cheap to clone and safe to share between threads: every match brings its
/// own [`TokenTree`] and [`SyntaxState`].
#[derive(Clone)]
pub struct Definition {
    pub(crate) scope: Arc<ScopeData>,
    pub(crate) index: usize,
}

/// Successful match: the token tree and the cursor where the entry rule
/// stopped.
#[derive(Debug)]
pub struct Match {
    tree: TokenTree,
    end: usize,
}

impl Match {
    pub fn root(&self) -> Option<TokenRef<'_>> {
        self.tree.root()
    }

    pub fn end(&self) -> usize {
        self.end
    }

    pub fn tree(&self) -> &TokenTree {
        &self.tree
    }

    pub fn tree_mut(&mut self) -> &mut TokenTree {
        &mut self.tree
    }

    pub fn into_tree(self) -> TokenTree {
        self.tree
    }
}

/// Most specific hint set along the failed path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Hint {
    pub text: String,
    pub offset: usize,
}

/// Failed match. Hands the (emptied) token tree back for reuse.
#[derive(Debug)]
pub struct NoMatch {
    pub tree: TokenTree,
    pub hint: Option<Hint>,
    /// Set when an `error()` node rejected the input.
    pub raised: Option<SyntaxError>,
    pub offset: usize,
}

impl NoMatch {
    /// The raised error, else the hint, else a generic message at the
    /// position the match started from.
    pub fn into_syntax_error(self, text: &[u8]) -> SyntaxError {
        if let Some(error) = self.raised {
            return error;
        }
        match self.hint {
            Some(hint) => SyntaxError::new(hint.text, text, hint.offset),
            None => SyntaxError::new("syntax error", text, self.offset),
        }
    }
}

impl Definition {
    pub(crate) fn data(&self) -> &DefinitionData {
        &self.scope.members[self.index]
    }

    pub(crate) fn grammar(&self) -> Grammar<'_> {
        Grammar::new(&self.scope, self.index)
    }

    pub(crate) fn same(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.scope, &other.scope) && self.index == other.index
    }

    pub fn id(&self) -> DefinitionId {
        self.data().id
    }

    pub fn name(&self) -> Option<&str> {
        self.data().name.as_deref()
    }

    pub fn rule_count(&self) -> usize {
        self.data().rules.len()
    }

    pub fn rule_by_name(&self, name: &str) -> Option<RuleId> {
        self.data().rule_by_name.get(name).copied()
    }

    pub fn rule_name(&self, rule: RuleId) -> Option<&str> {
        self.data().rules.get(rule.index() as usize).map(|rule| &*rule.name)
    }

    pub fn keyword_by_name(&self, keyword: &str) -> Option<KeywordId> {
        self.data().keywords.get_index_of(keyword).map(|index| KeywordId::new(index as u32))
    }

    pub fn keyword_name(&self, keyword: KeywordId) -> Option<&str> {
        self.data().keywords.get_index(keyword.index() as usize).map(|name| &**name)
    }

    pub fn flag_id(&self, name: &str) -> Option<usize> {
        self.data().layout.flags.get_index_of(name)
    }

    pub fn char_id(&self, name: &str) -> Option<usize> {
        self.data().layout.chars.get_index_of(name)
    }

    pub fn string_id(&self, name: &str) -> Option<usize> {
        self.data().layout.strings.get_index_of(name)
    }

    /// Whether matching needs a [`SyntaxState`].
    pub fn is_stateful(&self) -> bool {
        self.data().stateful
    }

    /// Fresh state holding the declared defaults.
    pub fn new_state(&self) -> SyntaxState {
        let data = self.data();
        data.layout.new_state(data.id)
    }

    /// Matches the entry rule once at `i0`.
    pub fn match_at(&self, text: &[u8], i0: usize) -> Option<Match> {
        self.match_with(text, i0, None, TokenTree::new()).ok()
    }

    /// Matches the entry rule once at `i0`, recording tokens into `tree`
    /// (cleared first) and using `state` when given.
    ///
    /// A `state` left by another definition is reset to this definition's
    /// defaults.
    pub fn match_with(
        &self,
        text: &[u8],
        i0: usize,
        state: Option<&mut SyntaxState>,
        mut tree: TokenTree,
    ) -> Result<Match, NoMatch> {
        tree.clear();
        let data = self.data();

        let mut local = None;
        let state = match state {
            Some(state) => {
                if !data.layout.fits(state, data.id) {
                    *state = self.new_state();
                }
                Some(state)
            }
            None if data.stateful => local.insert(self.new_state()).into(),
            None => None,
        };

        let outcome = matcher::run(self.grammar(), text, i0, state, &mut tree);
        match outcome.end {
            Some(end) => Ok(Match { tree, end }),
            None => {
                tree.clear();
                Err(NoMatch { tree, hint: outcome.hint, raised: outcome.raised, offset: i0 })
            }
        }
    }

    /// Scans forward from `i0` for the first position the entry rule matches
    /// at. `i0` is left at that position, or at the end of the text.
    pub fn find(&self, text: &[u8], i0: &mut usize) -> Option<Match> {
        self.find_with(text, i0, None, TokenTree::new()).ok()
    }

    /// Like [`Definition::find`]. Every start position sees `state` as it
    /// was passed in; only the successful attempt leaves its changes.
    pub fn find_with(
        &self,
        text: &[u8],
        i0: &mut usize,
        mut state: Option<&mut SyntaxState>,
        mut tree: TokenTree,
    ) -> Result<Match, NoMatch> {
        let initial = state.as_deref().cloned();
        let mut failure = None;
        while *i0 < text.len() {
            match self.match_with(text, *i0, state.as_deref_mut(), tree) {
                Ok(found) => return Ok(found),
                Err(no_match) => {
                    if let (Some(state), Some(initial)) = (state.as_deref_mut(), &initial) {
                        state.clone_from(initial);
                    }
                    *i0 += 1;
                    tree = std::mem::take(&mut failure.insert(no_match).tree);
                }
            }
        }
        match failure {
            Some(mut failure) => {
                failure.tree = tree;
                Err(failure)
            }
            None => Err(NoMatch { tree, hint: None, raised: None, offset: *i0 }),
        }
    }

    /// Matches at the start of `text` and turns a failure into a
    /// [`SyntaxError`].
    pub fn parse(&self, text: &[u8]) -> Result<Match, SyntaxError> {
        self.match_with(text, 0, None, TokenTree::new())
            .map_err(|no_match| no_match.into_syntax_error(text))
    }

    /// Indented dump of a match, tokens labeled by rule name.
    pub fn dump(&self, found: &Match, text: &[u8]) -> String {
        found.tree().dump(text, |token| self.label(token))
    }

    /// Rule name of a token produced by this definition or one it reaches,
    /// with the keyword appended when the token carries one.
    pub fn label(&self, token: TokenRef<'_>) -> String {
        let Some(grammar) = self.grammar().find(token.definition()) else {
            return format!("#{}", token.definition().index());
        };
        let data = grammar.data();
        let mut label = match token.rule().and_then(|rule| data.rules.get(rule.index() as usize)) {
            Some(rule) => rule.name.to_string(),
            None => "<root>".to_owned(),
        };
        if let Some(keyword) =
            token.keyword().and_then(|keyword| data.keywords.get_index(keyword.index() as usize))
        {
            label.push(':');
            label.push_str(keyword);
        }
        label
    }
}

impl fmt::Debug for Definition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Definition")
            .field("name", &self.name())
            .field("id", &self.id())
            .field("rules", &self.rule_count())
            .finish_non_exhaustive()
    }
}
