//! Token tree produced by grammar matches.
//!
//! Tokens live in an arena and are linked to their parent and siblings by
//! index, so unlinking and recycling during backtracking is O(1).

pub mod arena;
mod overlay;
mod token;
mod tree;


pub use overlay::Screen;
pub use text_size::{TextRange, TextSize};
pub use token::{DefinitionId, KeywordId, RuleId, Token, TokenId};
pub use tree::{TokenRef, TokenTree};
