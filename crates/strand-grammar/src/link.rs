use std::hash::{Hash, Hasher};
use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};

use rustc_hash::{FxHashMap, FxHasher};
use strand_errors::GrammarError;
use strand_tree::arena::Arena;
use strand_tree::{DefinitionId, KeywordId, RuleId};

use crate::builder::{BuilderData, DefinitionBuilder};
use crate::definition::{Definition, DefinitionData, Scope, ScopeData, Target};
use crate::node::{InvokeTarget, Node, NodeId, NodeKind, RuleData, RuleRef, RuleSlot};

/// Definitions linked together, so that they can reference each other's
/// rules (`Other::Rule`) and invoke each other by name.
///
/// If any member declares state, every member is treated as stateful.
#[derive(Default)]
pub struct ScopeBuilder {
    members: Vec<DefinitionBuilder>,
}

impl ScopeBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, definition: DefinitionBuilder) -> &mut Self {
        self.members.push(definition);
        self
    }

    pub fn link(self) -> Result<Scope, GrammarError> {
        self.link_with(true)
    }

    pub fn link_with(self, optimize: bool) -> Result<Scope, GrammarError> {
        let mut members: Vec<BuilderData> =
            self.members.into_iter().map(DefinitionBuilder::into_data).collect();
        if let Some(error) = members.iter_mut().find_map(|data| data.error.take()) {
            return Err(error);
        }

        let visible: Vec<FxHashMap<Box<str>, Target>> =
            (0..members.len()).map(|index| visible_names(&members, index)).collect();
        let tables: Vec<FxHashMap<Box<str>, RuleId>> =
            members.iter().map(|data| data.rule_by_name.clone()).collect();

        let mut linked = Vec::with_capacity(members.len());
        for (index, data) in members.into_iter().enumerate() {
            let linker = Linker { index, tables: &tables, visible: &visible };
            linked.push(linker.link(data, optimize)?);
        }

        let stateful = linked.iter().any(|data| {
            !data.layout.is_empty()
                || data.targets.iter().any(|target| match target {
                    Target::External(definition) => definition.is_stateful(),
                    Target::Member(_) => false,
                })
        });
        for (data, visible) in linked.iter_mut().zip(visible) {
            data.stateful = stateful;
            data.visible = visible;
        }

        Ok(Scope(Arc::new(ScopeData { members: linked.into_boxed_slice() })))
    }
}

/// Imports shadow scope siblings of the same name.
fn visible_names(members: &[BuilderData], index: usize) -> FxHashMap<Box<str>, Target> {
    let mut visible = FxHashMap::default();
    for (sibling, data) in members.iter().enumerate() {
        if let (true, Some(name)) = (sibling != index, &data.name) {
            visible.insert(name.clone(), Target::Member(sibling));
        }
    }
    for (name, definition) in &members[index].imports {
        visible.insert(name.clone(), Target::External(definition.clone()));
    }
    visible
}

fn definition_id(name: Option<&str>) -> DefinitionId {
    static ANONYMOUS: AtomicU32 = AtomicU32::new(0);

    let mut hasher = FxHasher::default();
    match name {
        Some(name) => name.hash(&mut hasher),
        None => format!("#{}", ANONYMOUS.fetch_add(1, Ordering::Relaxed)).hash(&mut hasher),
    }
    DefinitionId::new(hasher.finish() as u32)
}

struct Linker<'a> {
    index: usize,
    tables: &'a [FxHashMap<Box<str>, RuleId>],
    visible: &'a [FxHashMap<Box<str>, Target>],
}

impl Linker<'_> {
    fn link(&self, mut data: BuilderData, optimize: bool) -> Result<DefinitionData, GrammarError> {
        let id = definition_id(data.name.as_deref());
        log::debug!("linking {} ({id:?})", data.name.as_deref().unwrap_or("<anonymous>"));

        for key in data.nodes.keys() {
            match &mut data.nodes[key].kind {
                NodeKind::Ref { rule } | NodeKind::Inline { rule } | NodeKind::Context { rule, .. } => {
                    rule.resolved = Some(self.rule(&mut data.targets, &rule.name)?);
                }
                NodeKind::Previous { rule, keyword } => {
                    rule.resolved = Some(self.rule(&mut data.targets, &rule.name)?);
                    if let Some((name, resolved)) = keyword {
                        let index = data.keywords.get_index_of(&**name).ok_or_else(|| {
                            GrammarError::UndefinedKeyword { keyword: name.to_string() }
                        })?;
                        *resolved = Some(KeywordId::new(index as u32));
                    }
                }
                NodeKind::Invoke { target: InvokeTarget::Named { name, resolved }, .. } => {
                    *resolved = Some(self.definition(&mut data.targets, name)?);
                }
                _ => {}
            }
        }

        let entry_name = data.entry.take().ok_or(GrammarError::MissingEntry)?;
        let entry = self.rule(&mut data.targets, &entry_name)?;

        if optimize {
            let plain = inlinable(&data.nodes, &data.rules);
            let inlined: Vec<_> = data
                .nodes
                .iter_enumerated()
                .filter(|(_, node)| match &node.kind {
                    NodeKind::Ref { rule: RuleSlot { resolved: Some(rule), .. } } => {
                        rule.target.is_none() && plain[rule.rule.index() as usize]
                    }
                    _ => false,
                })
                .map(|(key, _)| key)
                .collect();
            for key in inlined {
                let kind = &mut data.nodes[key].kind;
                if let NodeKind::Ref { rule } = kind {
                    log::debug!("inlining reference to void rule `{}`", rule.name);
                    let rule = std::mem::replace(rule, RuleSlot::new(""));
                    *kind = NodeKind::Inline { rule };
                }
            }
        }

        Ok(DefinitionData {
            id,
            name: data.name,
            nodes: data.nodes,
            rules: data.rules,
            rule_by_name: data.rule_by_name,
            keywords: data.keywords,
            entry,
            entry_name,
            targets: data.targets,
            visible: FxHashMap::default(),
            layout: data.layout,
            stateful: false,
            error_hook: data.error_hook,
        })
    }

    /// Walks `path` (every segment but the rule name) through visible
    /// definitions.
    fn location(&self, path: &[&str], full: &str) -> Result<Target, GrammarError> {
        let undefined = |scope: &str| GrammarError::UndefinedScope {
            scope: scope.to_owned(),
            path: full.to_owned(),
        };
        let (first, rest) = path.split_first().ok_or_else(|| undefined(full))?;
        let mut location =
            self.visible[self.index].get(*first).cloned().ok_or_else(|| undefined(*first))?;
        for segment in rest {
            location = self.lookup(&location, segment).ok_or_else(|| undefined(*segment))?;
        }
        Ok(location)
    }

    fn lookup(&self, location: &Target, name: &str) -> Option<Target> {
        match location {
            Target::Member(index) => self.visible[*index].get(name).cloned(),
            Target::External(definition) => match definition.data().visible.get(name)? {
                Target::Member(index) => Some(Target::External(Definition {
                    scope: definition.scope.clone(),
                    index: *index,
                })),
                external => Some(external.clone()),
            },
        }
    }

    fn rule(&self, targets: &mut Vec<Target>, path: &str) -> Result<RuleRef, GrammarError> {
        let undefined = || GrammarError::UndefinedRule { rule: path.to_owned() };
        let segments: Vec<&str> = path.split("::").collect();
        let (name, scope) = segments.split_last().ok_or_else(undefined)?;
        if scope.is_empty() {
            let rule = self.tables[self.index].get(*name).copied().ok_or_else(undefined)?;
            return Ok(RuleRef { target: None, rule });
        }

        let location = self.location(scope, path)?;
        let rule = match &location {
            Target::Member(index) => self.tables[*index].get(*name).copied(),
            Target::External(definition) => definition.rule_by_name(name),
        }
        .ok_or_else(undefined)?;
        let target = match location {
            Target::Member(index) if index == self.index => None,
            location => Some(push_target(targets, location)),
        };
        Ok(RuleRef { target, rule })
    }

    fn definition(&self, targets: &mut Vec<Target>, name: &str) -> Result<u32, GrammarError> {
        let segments: Vec<&str> = name.split("::").collect();
        match self.location(&segments, name) {
            Ok(location) => Ok(push_target(targets, location)),
            Err(_) => Err(GrammarError::UndefinedDefinition { definition: name.to_owned() }),
        }
    }
}

fn push_target(targets: &mut Vec<Target>, target: Target) -> u32 {
    let index = match targets.iter().position(|known| known.same(&target)) {
        Some(index) => index,
        None => {
            targets.push(target);
            targets.len() - 1
        }
    };
    index as u32
}

/// Rules whose references can be replaced by their bodies without changing
/// the tree: void, without `REF`s of their own, and with nothing in the body
/// (or in rules it inlines) that reads or tags the enclosing token.
pub(crate) fn inlinable(nodes: &Arena<Node>, rules: &[RuleData]) -> Vec<bool> {
    rules.iter().map(|rule| rule.void && is_plain(nodes, rules, rule.entry)).collect()
}

fn is_plain(nodes: &Arena<Node>, rules: &[RuleData], entry: NodeId) -> bool {
    let mut seen = vec![false; rules.len()];
    let mut stack = vec![entry];
    while let Some(node) = stack.pop() {
        let kind = &nodes[node].kind;
        match kind {
            NodeKind::Ref { .. }
            | NodeKind::Previous { .. }
            | NodeKind::Context { .. }
            | NodeKind::Keyword { .. } => return false,
            NodeKind::Inline { rule } => match rule.resolved {
                Some(RuleRef { target: None, rule: local }) => {
                    let index = local.index() as usize;
                    if !std::mem::replace(&mut seen[index], true) {
                        stack.push(rules[index].entry);
                    }
                }
                _ => return false,
            },
            _ => {}
        }
        stack.extend(kind.children());
    }
    true
}
