use strand_tree::KeywordId;

/// Byte trie answering "longest keyword starting here".
#[derive(Debug, Clone)]
pub(crate) struct KeywordMap {
    nodes: Vec<TrieNode>,
    case_sensitive: bool,
}

#[derive(Debug, Clone, Default)]
struct TrieNode {
    edges: Vec<(u8, u32)>,
    keyword: Option<KeywordId>,
}

impl KeywordMap {
    pub(crate) fn new(case_sensitive: bool) -> Self {
        Self { nodes: vec![TrieNode::default()], case_sensitive }
    }

    pub(crate) fn insert(&mut self, word: &[u8], keyword: KeywordId) {
        let mut at = 0;
        for &byte in word {
            let byte = self.fold(byte);
            let found = self.nodes[at].edges.iter().find(|&&(edge, _)| edge == byte);
            at = match found.map(|&(_, next)| next as usize) {
                Some(next) => next,
                None => {
                    let next = self.nodes.len();
                    self.nodes.push(TrieNode::default());
                    self.nodes[at].edges.push((byte, next as u32));
                    next
                }
            };
        }
        self.nodes[at].keyword = Some(keyword);
    }

    /// Returns the end of the longest keyword matching `text` at `i`.
    pub(crate) fn longest_match(&self, text: &[u8], i: usize) -> Option<(usize, KeywordId)> {
        let mut best = None;
        let mut at = 0;
        for (offset, &byte) in text.get(i..)?.iter().enumerate() {
            let byte = self.fold(byte);
            let Some(&(_, next)) = self.nodes[at].edges.iter().find(|&&(edge, _)| edge == byte)
            else {
                break;
            };
            at = next as usize;
            if let Some(keyword) = self.nodes[at].keyword {
                best = Some((i + offset + 1, keyword));
            }
        }
        best
    }

    fn fold(&self, byte: u8) -> u8 {
        if self.case_sensitive { byte } else { byte.to_ascii_lowercase() }
    }
}
