use expect_test::expect;

use crate::DefinitionBuilder;
use crate::link::inlinable;
use crate::node::NodeKind;

fn list(optimize: bool) -> crate::Definition {
    let g = DefinitionBuilder::named("list");
    g.define("Digit", g.range(b'0', b'9'));
    g.define_void("Sep", g.glue([g.char(b','), g.repeat(0.., g.char(b' '))]));
    g.define("List", g.glue([
        g.reference("Digit"),
        g.repeat(0.., g.glue([g.reference("Sep"), g.reference("Digit")])),
    ]));
    g.entry("List");
    g.link_with(optimize).unwrap()
}

#[test]
fn only_plain_void_rules_are_inlinable() {
    let list = list(false);
    let data = list.data();
    assert_eq!(inlinable(&data.nodes, &data.rules), [false, true, false]);

    let g = DefinitionBuilder::new();
    g.define("A", g.char(b'a'));
    g.define_void("AfterA", g.glue([g.previous("A"), g.char(b'b')]));
    g.define_void("Let", g.keyword("let"));
    g.define_void("Nested", g.glue([g.inline("AfterA"), g.char(b'c')]));
    g.define_void("Plain", g.repeat(1.., g.char(b' ')));
    g.define("Top", g.glue([
        g.reference("A"),
        g.reference("Nested"),
        g.reference("Let"),
        g.reference("Plain"),
    ]));
    g.entry("Top");
    let top = g.link_with(false).unwrap();
    let data = top.data();
    assert_eq!(inlinable(&data.nodes, &data.rules), [false, false, false, false, true, false]);
}

#[test]
fn void_leaf_references_are_inlined() {
    let optimized = list(true);
    let inlined = optimized
        .data()
        .nodes
        .iter_enumerated()
        .filter(|(_, node)| matches!(node.kind, NodeKind::Inline { .. }))
        .count();
    assert_eq!(inlined, 1);

    let plain = list(false);
    assert!(plain.data().nodes.iter_enumerated().all(|(_, node)| !matches!(node.kind, NodeKind::Inline { .. })));
}

#[test]
fn void_rules_with_references_keep_their_token() {
    let g = DefinitionBuilder::new();
    g.define("Digit", g.range(b'0', b'9'));
    g.define_void("Pair", g.glue([g.reference("Digit"), g.reference("Digit")]));
    g.define("Top", g.reference("Pair"));
    g.entry("Top");
    let top = g.link().unwrap();
    assert!(top.data().nodes.iter_enumerated().all(|(_, node)| !matches!(node.kind, NodeKind::Inline { .. })));
}

#[test]
fn successors_look_through_sequences_and_choices() {
    let g = DefinitionBuilder::new();
    let a = g.char(b'a');
    let b = g.char(b'b');
    let c = g.char(b'c');
    let d = g.char(b'd');
    let choice = g.choice([b, c]);
    let inner = g.glue([a, choice]);
    g.define("Top", g.glue([inner, d]));
    g.entry("Top");
    let top = g.link().unwrap();
    let grammar = top.grammar();

    assert_eq!(grammar.successor(a), Some(choice));
    assert_eq!(grammar.successor(b), Some(d));
    assert_eq!(grammar.successor(c), Some(d));
    assert_eq!(grammar.successor(d), None);
}

#[test]
fn definition_ids_follow_names() {
    let a = DefinitionBuilder::named("same");
    a.define("A", a.any());
    a.entry("A");
    let b = DefinitionBuilder::named("same");
    b.define("B", b.char(b'b'));
    b.entry("B");
    let c = DefinitionBuilder::new();
    c.define("C", c.any());
    c.entry("C");
    let d = DefinitionBuilder::new();
    d.define("D", d.any());
    d.entry("D");

    let (a, b) = (a.link().unwrap(), b.link().unwrap());
    let (c, d) = (c.link().unwrap(), d.link().unwrap());
    assert_eq!(a.id(), b.id());
    assert_ne!(c.id(), d.id());
}

#[test]
fn declaration() {
    let list = list(true);
    expect![[r#"
        DEFINE("Digit",
          RANGE('0', '9')
        );

        DEFINE_VOID("Sep",
          GLUE(
            CHAR(','),
            REPEAT(0,
              CHAR(' ')
            )
          )
        );

        DEFINE("List",
          GLUE(
            REF("Digit"),
            REPEAT(0,
              GLUE(
                INLINE("Sep"),
                REF("Digit")
              )
            )
          )
        );

        ENTRY("List");
    "#]]
    .assert_eq(&list.declaration(false));
}

#[test]
fn declaration_omits_unreachable_rules() {
    let g = DefinitionBuilder::new();
    g.state_flag("seen", false);
    g.state_string("tag", b"");
    g.define("Unused", g.string("never\n"));
    g.define("Tag", g.get_string("tag", g.repeat(1..=8, g.except_of(b"<>"))));
    g.define("Top", g.glue([
        g.char(b'<'),
        g.reference("Tag"),
        g.set("seen", true),
        g.expect("closing `>`", g.char(b'>')),
    ]));
    g.entry("Top");
    let top = g.link().unwrap();

    expect![[r#"
        DEFINE("Tag",
          GETSTRING("tag",
            REPEAT(1, 8,
              EXCEPT("<>")
            )
          )
        );

        DEFINE("Top",
          GLUE(
            CHAR('<'),
            REF("Tag"),
            SET("seen", true),
            EXPECT("closing `>`",
              CHAR('>')
            )
          )
        );

        ENTRY("Top");
    "#]]
    .assert_eq(&top.declaration(true));
    assert!(top.declaration(false).contains(r#"STRING("never\n")"#));
}
