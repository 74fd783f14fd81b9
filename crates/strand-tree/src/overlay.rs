//! Operations combining a token tree with the source it covers: projecting
//! uncovered spans (`glow`), merging a second parse into a first (`meld`) and
//! cutting a byte range out of a tree (`burn`).

use text_size::TextRange;

use crate::token::TokenId;
use crate::tree::{TokenRef, TokenTree};

/// Receives the spans of a token not covered by any of its children.
pub trait Screen {
    /// Called with the token owning the gap `[i0, i1)`. Returning `false`
    /// stops the walk.
    fn project(&mut self, token: TokenRef<'_>, i0: usize, i1: usize) -> bool;
}

impl<F> Screen for F
where
    F: FnMut(TokenRef<'_>, usize, usize) -> bool,
{
    fn project(&mut self, token: TokenRef<'_>, i0: usize, i1: usize) -> bool {
        self(token, i0, i1)
    }
}

impl TokenTree {
    /// Depth-first walk over `id` that hands every non-empty gap (before the
    /// first child, between children, after the last child) to `screen`,
    /// interleaved with the walk into the children.
    ///
    /// Returns `false` as soon as `screen` does.
    pub fn glow<S: Screen + ?Sized>(&self, id: TokenId, screen: &mut S) -> bool {
        let token = self.token(id);
        let mut cursor = token.i0();

        for child in token.children() {
            if cursor < child.i0() && !screen.project(token, cursor, child.i0()) {
                return false;
            }
            if !self.glow(child.id(), screen) {
                return false;
            }
            cursor = child.i1();
        }

        if cursor < token.i1() {
            return screen.project(token, cursor, token.i1());
        }
        true
    }

    /// Merges copies of the children of `root1` (a token of `other`) into
    /// the children of `root0`, keeping ascending `i0` order.
    ///
    /// On equal starts the child already in `root0` goes first. A child of
    /// `root1` that starts and ends strictly inside the child placed right
    /// before it is melded into that child instead of becoming its sibling.
    pub fn meld(&mut self, root0: TokenId, other: &Self, root1: TokenId) {
        let incoming = other.children(root1).collect::<Vec<_>>();
        self.meld_children(root0, other, &incoming);
    }

    fn meld_children(&mut self, parent: TokenId, other: &Self, incoming: &[TokenId]) {
        let mut prev: Option<TokenId> = None;
        let mut next = self.first_child(parent);
        let mut incoming = incoming.iter().copied().peekable();

        while let Some(&theirs) = incoming.peek() {
            let range = other[theirs].range();

            if let Some(ours) = next.filter(|&ours| self[ours].range().start() <= range.start()) {
                prev = Some(ours);
                next = self.next_sibling(ours);
                continue;
            }
            incoming.next();

            match prev.filter(|&host| nests(self[host].range(), range)) {
                Some(host) => self.meld_children(host, other, &[theirs]),
                None => {
                    let copy = self.graft(other, theirs);
                    match next {
                        Some(next) => self.insert_before(next, copy),
                        None => self.append_child(parent, copy),
                    }
                    prev = Some(copy);
                }
            }
        }
    }

    /// Removes `[b0, b1)` from `id` and its subtree.
    ///
    /// Tokens inside the range are discarded, tokens overlapping one edge
    /// are clipped to it, and tokens spanning the whole range keep their
    /// range while their children are burned. Returns `false` when the
    /// token lies entirely outside the range.
    pub fn burn(&mut self, id: TokenId, b0: usize, b1: usize) -> bool {
        let token = &self[id];
        let (i0, i1) = (token.i0(), token.i1());

        if i0 >= b1 || (i1 <= b0 && i0 < b0) {
            return false;
        }
        if b0 <= i0 && i1 <= b1 {
            self.discard(id);
            return true;
        }

        let children = self.children(id).collect::<Vec<_>>();
        for child in children {
            self.burn(child, b0, b1);
        }

        if b0 <= i0 {
            self.set_range(id, b1, i1);
        } else if i1 <= b1 {
            self.set_range(id, i0, b0);
        }
        true
    }
}

fn nests(host: TextRange, range: TextRange) -> bool {
    host.start() < range.start() && range.start() < host.end() && range.end() < host.end()
}
