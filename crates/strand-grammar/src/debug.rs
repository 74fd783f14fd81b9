use std::fmt::Write as _;

use crate::definition::{Definition, DefinitionData};
use crate::node::{InvokeTarget, NodeId, NodeKind, RuleRef};

impl Definition {
    /// Prints the rules back as `DEFINE(...)` declarations followed by the
    /// `ENTRY(...)` line. With `omit_unused`, rules the entry rule cannot
    /// reach are left out.
    pub fn declaration(&self, omit_unused: bool) -> String {
        let data = self.data();
        let used = omit_unused.then(|| reachable(data));

        let mut out = String::new();
        for (index, rule) in data.rules.iter().enumerate() {
            if used.as_ref().is_some_and(|used| !used[index]) {
                continue;
            }
            let define = if rule.void { "DEFINE_VOID" } else { "DEFINE" };
            let _ = writeln!(out, "{define}({},", quote(rule.name.as_bytes()));
            self.write_node(&mut out, rule.entry, 1);
            out.push_str("\n);\n\n");
        }
        let _ = writeln!(out, "ENTRY({});", quote(data.entry_name.as_bytes()));
        out
    }

    fn write_node(&self, out: &mut String, id: NodeId, depth: usize) {
        let data = self.data();
        let kind = &data.nodes[id].kind;
        let name = kind.declaration_type();
        let _ = write!(out, "{:indent$}{name}(", "", indent = depth * 2);

        let (attrs, children) = self.attributes(kind);
        if children.is_empty() {
            out.push_str(&attrs.join(", "));
            out.push(')');
            return;
        }
        for attr in attrs {
            let _ = write!(out, "{attr}, ");
        }
        // Trailing `, ` becomes `,` before the line break.
        if out.ends_with(", ") {
            out.pop();
        }
        out.push('\n');
        for (i, &child) in children.iter().enumerate() {
            if i > 0 {
                out.push_str(",\n");
            }
            self.write_node(out, child, depth + 1);
        }
        let _ = write!(out, "\n{:indent$})", "", indent = depth * 2);
    }

    fn attributes(&self, kind: &NodeKind) -> (Vec<String>, Vec<NodeId>) {
        let data = self.data();
        let flag = |slot: usize| quote_name(data.layout.flags.get_index(slot).map(|(name, _)| &**name));
        let char_slot =
            |slot: usize| quote_name(data.layout.chars.get_index(slot).map(|(name, _)| &**name));
        let string_slot =
            |slot: usize| quote_name(data.layout.strings.get_index(slot).map(|(name, _)| &**name));
        let bounds = |min: usize, max: usize| match max {
            usize::MAX => vec![min.to_string()],
            max => vec![min.to_string(), max.to_string()],
        };

        let attrs = match kind {
            &NodeKind::Char { ch, .. }
            | &NodeKind::Greater { ch, .. }
            | &NodeKind::GreaterOrEqual { ch, .. } => vec![quote_char(ch)],
            &NodeKind::RangeMinMax { a, b, .. } => vec![quote_char(a), quote_char(b)],
            NodeKind::RangeExplicit { set, .. } => vec![quote(set)],
            NodeKind::String { s, .. } => vec![quote(s)],
            NodeKind::Keyword { words, .. } => vec![quote(words.as_bytes())],
            &NodeKind::Repeat { min, max, .. }
            | &NodeKind::GreedyRepeat { min, max, .. }
            | &NodeKind::Length { min, max, .. } => bounds(min, max),
            &NodeKind::LazyRepeat { min, .. } => vec![min.to_string()],
            NodeKind::Hint { text: Some(text) } => vec![quote(text.as_bytes())],
            NodeKind::Expect { message, .. } => vec![quote(message.as_bytes())],
            &NodeKind::Set { flag: slot, value } => vec![flag(slot), value.to_string()],
            &NodeKind::If { flag: slot, .. } => vec![flag(slot)],
            &NodeKind::GetChar { slot } | &NodeKind::VarChar { slot, .. } => vec![char_slot(slot)],
            &NodeKind::SetChar { slot, value } => vec![char_slot(slot), quote_char(value)],
            &NodeKind::GetString { slot, .. } | &NodeKind::VarString { slot } => {
                vec![string_slot(slot)]
            }
            NodeKind::SetString { slot, value } => vec![string_slot(*slot), quote(value)],
            NodeKind::Ref { rule } | NodeKind::Inline { rule } | NodeKind::Context { rule, .. } => {
                vec![quote(rule.name.as_bytes())]
            }
            NodeKind::Previous { rule, keyword } => {
                let mut attrs = vec![quote(rule.name.as_bytes())];
                attrs.extend(keyword.iter().map(|(keyword, _)| quote(keyword.as_bytes())));
                attrs
            }
            NodeKind::Invoke { target, .. } => vec![self.invoke_name(target)],
            _ => Vec::new(),
        };
        (attrs, kind.children())
    }

    fn invoke_name(&self, target: &InvokeTarget) -> String {
        match target {
            InvokeTarget::Named { name, .. } => quote(name.as_bytes()),
            InvokeTarget::Target(target) => {
                let name = self.grammar().target(*target).and_then(|grammar| grammar.data().name.as_deref());
                quote_name(name)
            }
        }
    }
}

/// Rules of `data` reachable from its entry rule.
fn reachable(data: &DefinitionData) -> Vec<bool> {
    let mut used = vec![false; data.rules.len()];
    let local = |rule: Option<RuleRef>| {
        rule.filter(|rule| rule.target.is_none()).map(|rule| rule.rule.index() as usize)
    };

    let mut rules: Vec<usize> = local(Some(data.entry)).into_iter().collect();
    while let Some(rule) = rules.pop() {
        if std::mem::replace(&mut used[rule], true) {
            continue;
        }
        let mut stack = vec![data.rules[rule].entry];
        while let Some(node) = stack.pop() {
            let kind = &data.nodes[node].kind;
            rules.extend(local(kind.rule_slot().and_then(|slot| slot.resolved)));
            stack.extend(kind.children());
        }
    }
    used
}

fn quote(text: &[u8]) -> String {
    format!("\"{}\"", text.escape_ascii())
}

fn quote_char(ch: u8) -> String {
    format!("'{}'", ch.escape_ascii())
}

fn quote_name(name: Option<&str>) -> String {
    name.map_or_else(|| "?".to_owned(), |name| quote(name.as_bytes()))
}
