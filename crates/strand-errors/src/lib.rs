//! Errors reported while building grammars and while matching them.

use std::fmt::{self, Display};

pub use annotate_snippets::Renderer;
use annotate_snippets::{Level, Snippet};
use line_index::LineIndex;
pub use text_size::{TextRange, TextSize};

/// A mistake in a grammar, caught before any input is matched.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum GrammarError {
    #[error("redefinition of rule `{rule}`")]
    Redefinition { rule: String },
    #[error("undefined rule `{rule}` referenced")]
    UndefinedRule { rule: String },
    #[error("undefined keyword `{keyword}` referenced")]
    UndefinedKeyword { keyword: String },
    #[error("undefined definition `{definition}` referenced")]
    UndefinedDefinition { definition: String },
    #[error("undefined scope `{scope}` in `{path}`")]
    UndefinedScope { scope: String, path: String },
    #[error("undefined state {kind} `{name}` referenced")]
    UndefinedStateVariable { kind: StateKind, name: String },
    #[error("redefinition of state {kind} `{name}`")]
    StateRedefinition { kind: StateKind, name: String },
    #[error("missing entry rule declaration")]
    MissingEntry,
    #[error("unknown option `{option}`")]
    UnknownOption { option: String },
    #[error("imported definition has no name")]
    AnonymousImport,
    #[error("node used in more than one place")]
    NodeReused,
    #[error("node does not belong to this definition")]
    UnknownNode,
    #[error("lookbehind requires an entry with a fixed length")]
    UnboundedBehind,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StateKind {
    Flag,
    Char,
    String,
}

impl Display for StateKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Flag => "flag",
            Self::Char => "char",
            Self::String => "string",
        })
    }
}

/// Input rejected by a grammar, located by byte offset and 1-based
/// line/column.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{message} at line {line}, column {column}")]
pub struct SyntaxError {
    message: String,
    offset: usize,
    line: u32,
    column: u32,
}

impl SyntaxError {
    pub fn new(message: impl Into<String>, text: &[u8], offset: usize) -> Self {
        let (line, column) = line_col(text, offset);
        Self { message: message.into(), offset, line, column }
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    pub fn offset(&self) -> usize {
        self.offset
    }

    pub fn line(&self) -> u32 {
        self.line
    }

    pub fn column(&self) -> u32 {
        self.column
    }

    pub fn render<'a>(
        &'a self,
        renderer: &'a Renderer,
        path: &'a str,
        text: &'a str,
    ) -> impl Display + 'a {
        let start = self.offset.min(text.len());
        let end = text
            .get(start..)
            .and_then(|rest| rest.chars().next())
            .map_or(start, |c| start + c.len_utf8());

        let message = Level::Error.title(&self.message).snippet(
            Snippet::source(text)
                .origin(path)
                .annotation(Level::Error.span(start..end).label("here"))
                .fold(true),
        );
        renderer.render(message)
    }
}

/// 1-based line and byte column of `offset`.
pub fn line_col(text: &[u8], offset: usize) -> (u32, u32) {
    let offset = offset.min(text.len());
    match std::str::from_utf8(text) {
        Ok(text) => {
            let line_col = LineIndex::new(text).line_col(TextSize::new(offset as u32));
            (line_col.line + 1, line_col.col + 1)
        }
        Err(_) => {
            let before = &text[..offset];
            let line = before.iter().filter(|&&byte| byte == b'\n').count();
            let start = before.iter().rposition(|&byte| byte == b'\n').map_or(0, |i| i + 1);
            (line as u32 + 1, (offset - start) as u32 + 1)
        }
    }
}
