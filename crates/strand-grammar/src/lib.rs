//! Parsing expression grammars assembled from combinators.
//!
//! A [`DefinitionBuilder`] collects rules built from nodes, [`link`]ing turns
//! it into an immutable [`Definition`] that matches byte input into a
//! [`TokenTree`].
//!
//! [`link`]: DefinitionBuilder::link

mod builder;
mod debug;
mod definition;
mod keyword;
mod link;
mod matcher;
mod node;
mod state;

#[cfg(test)]
mod tests;

pub use builder::DefinitionBuilder;
pub use definition::{Definition, Hint, Match, NoMatch, Scope};
pub use link::ScopeBuilder;
pub use node::{Node, NodeId};
pub use state::SyntaxState;
pub use strand_errors::{GrammarError, StateKind, SyntaxError};
pub use strand_tree::{DefinitionId, KeywordId, RuleId, TokenId, TokenRef, TokenTree};
