use text_size::{TextRange, TextSize};

use crate::arena::Key;

macro_rules! id {
    ($(#[$attr:meta])* $name:ident) => {
        $(#[$attr])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
        pub struct $name(u32);

        impl $name {
            pub const fn new(raw: u32) -> Self {
                Self(raw)
            }

            pub const fn index(self) -> u32 {
                self.0
            }
        }
    };
}

id! {
    /// Identifies the grammar a token was produced by. Derived from the
    /// grammar's declared name.
    DefinitionId
}

id! {
    /// Dense index of a rule inside its grammar.
    RuleId
}

id! {
    /// Dense index of a keyword inside its grammar's keyword table.
    KeywordId
}

pub type TokenId = Key<Token>;

/// One match record: which rule matched which byte range.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Token {
    definition: DefinitionId,
    rule: Option<RuleId>,
    keyword: Option<KeywordId>,
    range: TextRange,
    pub(crate) links: Links,
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub(crate) struct Links {
    pub(crate) parent: Option<TokenId>,
    pub(crate) first_child: Option<TokenId>,
    pub(crate) last_child: Option<TokenId>,
    pub(crate) prev_sibling: Option<TokenId>,
    pub(crate) next_sibling: Option<TokenId>,
}

impl Token {
    pub(crate) fn new(definition: DefinitionId, rule: Option<RuleId>) -> Self {
        Self { definition, rule, keyword: None, range: TextRange::default(), links: Links::default() }
    }

    pub fn definition(&self) -> DefinitionId {
        self.definition
    }

    /// `None` for untyped tokens.
    pub fn rule(&self) -> Option<RuleId> {
        self.rule
    }

    pub fn keyword(&self) -> Option<KeywordId> {
        self.keyword
    }

    pub fn range(&self) -> TextRange {
        self.range
    }

    pub fn i0(&self) -> usize {
        self.range.start().into()
    }

    pub fn i1(&self) -> usize {
        self.range.end().into()
    }

    pub(crate) fn set_keyword(&mut self, keyword: Option<KeywordId>) {
        self.keyword = keyword;
    }

    pub(crate) fn set_span(&mut self, i0: usize, i1: usize) {
        self.range = TextRange::new(offset(i0), offset(i1.max(i0)));
    }
}

pub(crate) fn offset(i: usize) -> TextSize {
    TextSize::new(i as u32)
}
