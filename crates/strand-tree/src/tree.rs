use std::fmt::{self, Write as _};
use std::ops::Index;

use text_size::TextRange;

use crate::arena::Arena;
use crate::token::{DefinitionId, KeywordId, RuleId, Token, TokenId};

/// Arena-backed token tree.
///
/// The tree doubles as the token factory: tokens discarded during
/// backtracking go to a pool and are handed out again by
/// [`TokenTree::produce`], so a tree reused across matches stops allocating
/// once it has grown to the working size of the grammar.
///
/// A [`TokenId`] stays valid until the token is discarded; after that the
/// slot may be recycled for an unrelated token.
#[derive(Default, Clone)]
pub struct TokenTree {
    tokens: Arena<Token>,
    pool: Vec<TokenId>,
    root: Option<TokenId>,
}

impl TokenTree {
    pub fn new() -> Self {
        Self::default()
    }

    /// Forgets every token, keeping the allocations for the next match.
    pub fn clear(&mut self) {
        self.tokens.clear();
        self.pool.clear();
        self.root = None;
    }

    /// Number of live tokens.
    pub fn len(&self) -> usize {
        self.tokens.len() - self.pool.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn root(&self) -> Option<TokenRef<'_>> {
        self.root.map(|id| self.token(id))
    }

    pub fn root_id(&self) -> Option<TokenId> {
        self.root
    }

    pub fn set_root(&mut self, root: Option<TokenId>) {
        self.root = root;
    }

    pub fn token(&self, id: TokenId) -> TokenRef<'_> {
        TokenRef { tree: self, id }
    }

    /// Returns a detached token with an empty range, reusing a pooled slot
    /// when one is available.
    pub fn produce(&mut self, definition: DefinitionId, rule: Option<RuleId>) -> TokenId {
        let token = Token::new(definition, rule);
        match self.pool.pop() {
            Some(id) => {
                self.tokens[id] = token;
                id
            }
            None => self.tokens.alloc(token),
        }
    }

    pub fn set_range(&mut self, id: TokenId, i0: usize, i1: usize) {
        self.tokens[id].set_span(i0, i1);
    }

    pub fn set_keyword(&mut self, id: TokenId, keyword: Option<KeywordId>) {
        self.tokens[id].set_keyword(keyword);
    }

    pub fn parent(&self, id: TokenId) -> Option<TokenId> {
        self.tokens[id].links.parent
    }

    pub fn first_child(&self, id: TokenId) -> Option<TokenId> {
        self.tokens[id].links.first_child
    }

    pub fn last_child(&self, id: TokenId) -> Option<TokenId> {
        self.tokens[id].links.last_child
    }

    pub fn prev_sibling(&self, id: TokenId) -> Option<TokenId> {
        self.tokens[id].links.prev_sibling
    }

    pub fn next_sibling(&self, id: TokenId) -> Option<TokenId> {
        self.tokens[id].links.next_sibling
    }

    pub fn children(&self, id: TokenId) -> impl DoubleEndedIterator<Item = TokenId> + '_ {
        Children { tree: self, front: self.first_child(id), back: self.last_child(id) }
    }

    /// Attaches the detached token `child` as the last child of `parent`.
    pub fn append_child(&mut self, parent: TokenId, child: TokenId) {
        debug_assert!(self.parent(child).is_none(), "token is already attached");

        let last = self.tokens[parent].links.last_child;
        {
            let links = &mut self.tokens[child].links;
            links.parent = Some(parent);
            links.prev_sibling = last;
            links.next_sibling = None;
        }
        match last {
            Some(last) => self.tokens[last].links.next_sibling = Some(child),
            None => self.tokens[parent].links.first_child = Some(child),
        }
        self.tokens[parent].links.last_child = Some(child);
    }

    /// Attaches the detached token `child` right before `sibling`.
    pub fn insert_before(&mut self, sibling: TokenId, child: TokenId) {
        debug_assert!(self.parent(child).is_none(), "token is already attached");

        let Some(parent) = self.parent(sibling) else {
            return;
        };
        let prev = self.tokens[sibling].links.prev_sibling;
        {
            let links = &mut self.tokens[child].links;
            links.parent = Some(parent);
            links.prev_sibling = prev;
            links.next_sibling = Some(sibling);
        }
        self.tokens[sibling].links.prev_sibling = Some(child);
        match prev {
            Some(prev) => self.tokens[prev].links.next_sibling = Some(child),
            None => self.tokens[parent].links.first_child = Some(child),
        }
    }

    /// Detaches `id` (with its subtree) from its parent and siblings.
    pub fn unlink(&mut self, id: TokenId) {
        let links = self.tokens[id].links;
        match links.prev_sibling {
            Some(prev) => self.tokens[prev].links.next_sibling = links.next_sibling,
            None => {
                if let Some(parent) = links.parent {
                    self.tokens[parent].links.first_child = links.next_sibling;
                }
            }
        }
        match links.next_sibling {
            Some(next) => self.tokens[next].links.prev_sibling = links.prev_sibling,
            None => {
                if let Some(parent) = links.parent {
                    self.tokens[parent].links.last_child = links.prev_sibling;
                }
            }
        }

        let links = &mut self.tokens[id].links;
        links.parent = None;
        links.prev_sibling = None;
        links.next_sibling = None;
    }

    /// Unlinks `id` and returns it and its whole subtree to the pool.
    pub fn discard(&mut self, id: TokenId) {
        self.unlink(id);
        if self.root == Some(id) {
            self.root = None;
        }

        let mut stack = vec![id];
        while let Some(id) = stack.pop() {
            stack.extend(self.children(id));
            self.tokens[id].links = Default::default();
            self.pool.push(id);
        }
    }

    /// Moves every child of `from` to the end of `to`'s children, in order.
    pub fn splice_children(&mut self, from: TokenId, to: TokenId) {
        while let Some(child) = self.first_child(from) {
            self.unlink(child);
            self.append_child(to, child);
        }
    }

    /// Replaces the attached token `id` by its children, in place.
    pub fn dissolve(&mut self, id: TokenId) {
        if self.parent(id).is_none() {
            return;
        }
        while let Some(child) = self.first_child(id) {
            self.unlink(child);
            self.insert_before(id, child);
        }
        self.discard(id);
    }

    /// Discards the children of `parent` appended after `saved`, the last
    /// child `parent` had when the attempt started.
    pub fn roll_back(&mut self, parent: TokenId, saved: Option<TokenId>) {
        while let Some(last) = self.last_child(parent) {
            if Some(last) == saved {
                break;
            }
            self.discard(last);
        }
    }

    /// Deep copy of `id` from `other`, returned detached.
    pub(crate) fn graft(&mut self, other: &Self, id: TokenId) -> TokenId {
        let source = &other[id];
        let copy = self.produce(source.definition(), source.rule());
        self.set_keyword(copy, source.keyword());
        self.set_range(copy, source.i0(), source.i1());
        for child in other.children(id) {
            let child = self.graft(other, child);
            self.append_child(copy, child);
        }
        copy
    }

    /// Renders the tree below the root as indented `label@i0..i1` lines,
    /// leaves followed by their text.
    pub fn dump(&self, text: &[u8], label: impl Fn(TokenRef<'_>) -> String) -> String {
        let mut out = String::new();
        if let Some(root) = self.root {
            self.dump_token(&mut out, text, &label, root, 0);
        }
        out
    }

    fn dump_token(
        &self,
        out: &mut String,
        text: &[u8],
        label: &impl Fn(TokenRef<'_>) -> String,
        id: TokenId,
        depth: usize,
    ) {
        let token = self.token(id);
        let _ = write!(out, "{:indent$}{}@{:?}", "", label(token), token.range(), indent = depth * 2);
        if token.first_child().is_none() {
            let _ = write!(out, " {:?}", String::from_utf8_lossy(token.text(text)));
        }
        out.push('\n');
        for child in self.children(id) {
            self.dump_token(out, text, label, child, depth + 1);
        }
    }
}

impl Index<TokenId> for TokenTree {
    type Output = Token;

    fn index(&self, index: TokenId) -> &Self::Output {
        &self.tokens[index]
    }
}

impl fmt::Debug for TokenTree {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TokenTree")
            .field("len", &self.len())
            .field("root", &self.root)
            .finish_non_exhaustive()
    }
}

struct Children<'a> {
    tree: &'a TokenTree,
    front: Option<TokenId>,
    back: Option<TokenId>,
}

impl Iterator for Children<'_> {
    type Item = TokenId;

    fn next(&mut self) -> Option<Self::Item> {
        let id = self.front?;
        if self.front == self.back {
            self.front = None;
            self.back = None;
        } else {
            self.front = self.tree.next_sibling(id);
        }
        Some(id)
    }
}

impl DoubleEndedIterator for Children<'_> {
    fn next_back(&mut self) -> Option<Self::Item> {
        let id = self.back?;
        if self.front == self.back {
            self.front = None;
            self.back = None;
        } else {
            self.back = self.tree.prev_sibling(id);
        }
        Some(id)
    }
}

/// Read-only token handle tied to the lifetime of the tree.
#[derive(Clone, Copy)]
pub struct TokenRef<'a> {
    tree: &'a TokenTree,
    id: TokenId,
}

impl<'a> TokenRef<'a> {
    #[inline]
    pub fn id(self) -> TokenId {
        self.id
    }

    #[inline]
    pub fn get(self) -> &'a Token {
        &self.tree[self.id]
    }

    #[inline]
    pub fn definition(self) -> DefinitionId {
        self.get().definition()
    }

    #[inline]
    pub fn rule(self) -> Option<RuleId> {
        self.get().rule()
    }

    #[inline]
    pub fn keyword(self) -> Option<KeywordId> {
        self.get().keyword()
    }

    #[inline]
    pub fn range(self) -> TextRange {
        self.get().range()
    }

    #[inline]
    pub fn i0(self) -> usize {
        self.get().i0()
    }

    #[inline]
    pub fn i1(self) -> usize {
        self.get().i1()
    }

    /// Slice of `text` covered by this token.
    #[inline]
    pub fn text(self, text: &[u8]) -> &[u8] {
        text.get(self.i0()..self.i1()).unwrap_or_default()
    }

    pub fn parent(self) -> Option<Self> {
        self.with(self.tree.parent(self.id))
    }

    pub fn first_child(self) -> Option<Self> {
        self.with(self.tree.first_child(self.id))
    }

    pub fn last_child(self) -> Option<Self> {
        self.with(self.tree.last_child(self.id))
    }

    pub fn prev_sibling(self) -> Option<Self> {
        self.with(self.tree.prev_sibling(self.id))
    }

    pub fn next_sibling(self) -> Option<Self> {
        self.with(self.tree.next_sibling(self.id))
    }

    pub fn children(self) -> impl DoubleEndedIterator<Item = TokenRef<'a>> {
        let tree = self.tree;
        tree.children(self.id).map(move |id| tree.token(id))
    }

    fn with(self, id: Option<TokenId>) -> Option<Self> {
        Some(Self { tree: self.tree, id: id? })
    }
}

impl fmt::Debug for TokenRef<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TokenRef")
            .field("rule", &self.rule())
            .field("keyword", &self.keyword())
            .field("range", &self.range())
            .finish()
    }
}
