use indexmap::IndexMap;
use strand_tree::DefinitionId;

/// State variables declared by a definition, with their defaults.
#[derive(Debug, Clone, Default)]
pub(crate) struct StateLayout {
    pub(crate) flags: IndexMap<Box<str>, bool>,
    pub(crate) chars: IndexMap<Box<str>, u8>,
    pub(crate) strings: IndexMap<Box<str>, Box<[u8]>>,
}

impl StateLayout {
    pub(crate) fn is_empty(&self) -> bool {
        self.flags.is_empty() && self.chars.is_empty() && self.strings.is_empty()
    }

    pub(crate) fn new_state(&self, definition: DefinitionId) -> SyntaxState {
        SyntaxState {
            definition,
            flags: self.flags.values().copied().collect(),
            chars: self.chars.values().copied().collect(),
            strings: self.strings.values().map(|value| value.to_vec()).collect(),
            child: None,
        }
    }

    pub(crate) fn fits(&self, state: &SyntaxState, definition: DefinitionId) -> bool {
        state.definition == definition
            && state.flags.len() == self.flags.len()
            && state.chars.len() == self.chars.len()
            && state.strings.len() == self.strings.len()
    }
}

/// Mutable per-match storage for the flags, characters and strings a
/// definition declares.
///
/// Slots are addressed by the ids the definition hands out
/// (`Definition::flag_id` and friends). Sub-grammars entered through
/// `invoke` get their own state, kept as the child of this one and reused
/// for as long as the same definition is entered.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyntaxState {
    definition: DefinitionId,
    flags: Vec<bool>,
    chars: Vec<u8>,
    strings: Vec<Vec<u8>>,
    child: Option<Box<SyntaxState>>,
}

impl SyntaxState {
    pub fn definition(&self) -> DefinitionId {
        self.definition
    }

    pub fn flag(&self, id: usize) -> Option<bool> {
        self.flags.get(id).copied()
    }

    pub fn char(&self, id: usize) -> Option<u8> {
        self.chars.get(id).copied()
    }

    pub fn string(&self, id: usize) -> Option<&[u8]> {
        self.strings.get(id).map(Vec::as_slice)
    }

    pub fn set_flag(&mut self, id: usize, value: bool) {
        if let Some(slot) = self.flags.get_mut(id) {
            *slot = value;
        }
    }

    pub fn set_char(&mut self, id: usize, value: u8) {
        if let Some(slot) = self.chars.get_mut(id) {
            *slot = value;
        }
    }

    pub fn set_string(&mut self, id: usize, value: &[u8]) {
        if let Some(slot) = self.strings.get_mut(id) {
            slot.clear();
            slot.extend_from_slice(value);
        }
    }

    /// State of the most recently invoked sub-grammar.
    pub fn child(&self) -> Option<&Self> {
        self.child.as_deref()
    }

    pub(crate) fn child_mut(&mut self) -> &mut Option<Box<Self>> {
        &mut self.child
    }
}
