use expect_test::{Expect, expect};
use strand_grammar::{Definition, DefinitionBuilder, TokenRef};

fn digits(void: bool) -> Definition {
    let g = DefinitionBuilder::named("digits");
    let digit = g.range(b'0', b'9');
    if void {
        g.define_void("Digit", digit);
    } else {
        g.define("Digit", digit);
    }
    g.define("Digits", g.repeat(1.., g.reference("Digit")));
    g.entry("Digits");
    g.link().unwrap()
}

fn check(definition: &Definition, text: &str, expect: Expect) {
    let found = definition.match_at(text.as_bytes(), 0).unwrap();
    assert_eq!(found.end(), text.len());
    expect.assert_eq(&definition.dump(&found, text.as_bytes()));
}

#[test]
fn digits_produce_one_token_each() {
    let digits = digits(false);
    check(
        &digits,
        "123",
        expect![[r#"
            Digits@0..3
              Digit@0..1 "1"
              Digit@1..2 "2"
              Digit@2..3 "3"
        "#]],
    );
}

#[test]
fn void_digits_leave_a_leaf() {
    check(
        &digits(true),
        "123",
        expect![[r#"
            Digits@0..3 "123"
        "#]],
    );
}

#[test]
fn empty_input_does_not_match() {
    assert!(digits(false).match_at(b"", 0).is_none());
}

#[test]
fn partial_consumption_is_a_match() {
    let digits = digits(false);
    let mut i0 = 0;
    let found = digits.find(b"12a", &mut i0).unwrap();
    assert_eq!(i0, 0);
    assert_eq!(found.end(), 2);
}

#[test]
fn find_skips_ahead() {
    let digits = digits(false);
    let mut i0 = 0;
    let found = digits.find(b"ab42", &mut i0).unwrap();
    assert_eq!((i0, found.end()), (2, 4));

    let mut i0 = 0;
    assert!(digits.find(b"abc", &mut i0).is_none());
    assert_eq!(i0, 3);
}

#[test]
fn failed_alternative_consumes_nothing() {
    let g = DefinitionBuilder::new();
    g.define("Top", g.choice([g.string("ab"), g.string("a")]));
    g.entry("Top");
    let top = g.link().unwrap();
    assert_eq!(top.match_at(b"a", 0).unwrap().end(), 1);
}

#[test]
fn earlier_alternative_wins() {
    let g = DefinitionBuilder::new();
    g.define("Top", g.choice([g.string("a"), g.string("ab")]));
    g.entry("Top");
    let top = g.link().unwrap();
    assert_eq!(top.match_at(b"ab", 0).unwrap().end(), 1);
}

fn ab() -> DefinitionBuilder {
    let g = DefinitionBuilder::new();
    g.define("A", g.char(b'a'));
    g.define("B", g.char(b'b'));
    g
}

#[test]
fn failed_alternatives_leave_no_tokens() {
    let g = ab();
    g.define("Top", g.choice([
        g.glue([g.reference("A"), g.reference("B"), g.char(b'x')]),
        g.glue([g.reference("A"), g.char(b'c')]),
    ]));
    g.entry("Top");
    check(
        &g.link().unwrap(),
        "ac",
        expect![[r#"
            Top@0..2
              A@0..1 "a"
        "#]],
    );
}

#[test]
fn failed_repetition_is_rolled_back() {
    let g = ab();
    g.define("Top", g.glue([
        g.repeat(0.., g.glue([g.reference("A"), g.reference("B")])),
        g.reference("A"),
    ]));
    g.entry("Top");
    check(
        &g.link().unwrap(),
        "aba",
        expect![[r#"
            Top@0..3
              A@0..1 "a"
              B@1..2 "b"
              A@2..3 "a"
        "#]],
    );
}

#[test]
fn lookarounds_leave_no_tokens() {
    let g = ab();
    g.define("Top", g.glue([
        g.ahead(g.reference("A")),
        g.not(g.glue([g.reference("A"), g.reference("B")])),
        g.find(g.reference("B")),
    ]));
    g.entry("Top");
    check(
        &g.link().unwrap(),
        "aab",
        expect![[r#"
            Top@0..3
              B@2..3 "b"
        "#]],
    );
}

#[test]
fn void_rules_are_transparent() {
    let manual = DefinitionBuilder::new();
    manual.define("Digit", manual.range(b'0', b'9'));
    manual.define("List", manual.glue([
        manual.reference("Digit"),
        manual.repeat(0.., manual.glue([manual.char(b','), manual.reference("Digit")])),
    ]));
    manual.entry("List");
    let manual = manual.link().unwrap();

    let via_rule = |optimize| {
        let g = DefinitionBuilder::new();
        g.define("Digit", g.range(b'0', b'9'));
        g.define_void("Sep", g.char(b','));
        g.define("List", g.glue([
            g.reference("Digit"),
            g.repeat(0.., g.glue([g.reference("Sep"), g.reference("Digit")])),
        ]));
        g.entry("List");
        g.link_with(optimize).unwrap()
    };

    let text = b"1,2,3";
    let dump = |definition: &Definition| {
        definition.dump(&definition.match_at(text, 0).unwrap(), text)
    };
    let expected = expect![[r#"
        List@0..5
          Digit@0..1 "1"
          Digit@2..3 "2"
          Digit@4..5 "3"
    "#]];
    expected.assert_eq(&dump(&manual));
    assert_eq!(dump(&via_rule(true)), dump(&manual));
    assert_eq!(dump(&via_rule(false)), dump(&manual));
}

fn contained(token: TokenRef<'_>) -> bool {
    token.children().all(|child| {
        token.i0() <= child.i0() && child.i1() <= token.i1() && contained(child)
    })
}

#[test]
fn children_stay_inside_their_parent() {
    let g = DefinitionBuilder::new();
    g.define("Word", g.repeat(1.., g.range(b'a', b'z')));
    g.define_void("Space", g.repeat(1.., g.char(b' ')));
    g.define("Line", g.glue([
        g.reference("Word"),
        g.repeat(0.., g.glue([g.reference("Space"), g.reference("Word")])),
    ]));
    g.define("Text", g.repeat(1.., g.glue([g.reference("Line"), g.repeat(0..=1, g.char(b'\n'))])));
    g.entry("Text");
    let text = g.link().unwrap();

    let found = text.match_at(b"one two\nthree  four\nfive", 0).unwrap();
    assert_eq!(found.end(), 24);
    assert!(contained(found.root().unwrap()));
}

#[test]
fn matching_is_deterministic() {
    let digits = digits(false);
    let first = digits.match_at(b"9876", 0).unwrap();
    let dump = digits.dump(&first, b"9876");

    let mut tree = first.into_tree();
    for _ in 0..3 {
        let found = digits.match_with(b"9876", 0, None, tree).unwrap();
        assert_eq!(digits.dump(&found, b"9876"), dump);
        tree = found.into_tree();
    }
}

#[test]
fn failed_match_returns_an_empty_tree() {
    let digits = digits(false);
    let tree = digits.match_at(b"12", 0).unwrap().into_tree();
    let failure = digits.match_with(b"x", 0, None, tree).unwrap_err();
    assert!(failure.tree.is_empty());
    assert_eq!(failure.offset, 0);
}

#[test]
fn keywords_tag_their_rule() {
    let g = DefinitionBuilder::new();
    g.define("Word", g.keyword("if else elif"));
    g.define("Words", g.repeat(1.., g.glue([g.reference("Word"), g.repeat(0.., g.char(b' '))])));
    g.entry("Words");
    let words = g.link().unwrap();

    check(
        &words,
        "if elif else",
        expect![[r#"
            Words@0..12
              Word:if@0..2 "if"
              Word:elif@3..7 "elif"
              Word:else@8..12 "else"
        "#]],
    );
    let found = words.match_at(b"elif", 0).unwrap();
    let word = found.root().unwrap().first_child().unwrap();
    assert_eq!(word.keyword(), words.keyword_by_name("elif"));
    assert_eq!(words.keyword_name(word.keyword().unwrap()), Some("elif"));
}

#[test]
fn case_insensitive_option() {
    let g = DefinitionBuilder::new();
    g.option("caseSensitive", false);
    g.define("Select", g.glue([g.string("select"), g.char(b' '), g.keyword("all distinct")]));
    g.entry("Select");
    let select = g.link().unwrap();
    assert_eq!(select.match_at(b"SELECT Distinct", 0).unwrap().end(), 15);

    let g = DefinitionBuilder::new();
    g.define("Select", g.string("select"));
    g.entry("Select");
    assert!(g.link().unwrap().match_at(b"SELECT", 0).is_none());
}

#[test]
fn comparisons_and_sets() {
    let g = DefinitionBuilder::new();
    g.define("Top", g.glue([
        g.greater(b'a'),
        g.greater_or_equal(b'b'),
        g.below(b'c'),
        g.below_or_equal(b'c'),
        g.other(b'x'),
        g.range_of(b"+-"),
        g.except(b'0', b'9'),
        g.except_of(b"xyz"),
        g.any(),
    ]));
    g.entry("Top");
    let top = g.link().unwrap();
    assert_eq!(top.match_at(b"bbbcy-a!?", 0).unwrap().end(), 9);
    assert!(top.match_at(b"abbcy-a!?", 0).is_none());
    assert!(top.match_at(b"bbbcy-a!", 0).is_none());
}

#[test]
fn anchors() {
    let g = DefinitionBuilder::new();
    g.define("Top", g.glue([g.boi(), g.repeat(1.., g.range(b'0', b'9')), g.eoi()]));
    g.entry("Top");
    let top = g.link().unwrap();
    assert!(top.match_at(b"12", 0).is_some());
    assert!(top.match_at(b"12a", 0).is_none());
    let mut i0 = 0;
    assert!(top.find(b"a12", &mut i0).is_none());
}

#[test]
fn pass_and_fail() {
    let g = DefinitionBuilder::new();
    g.define("Top", g.choice([g.fail(), g.pass()]));
    g.entry("Top");
    assert_eq!(g.link().unwrap().match_at(b"abc", 0).unwrap().end(), 0);
}

#[test]
fn lookbehind() {
    let g = DefinitionBuilder::new();
    g.define("Top", g.glue([
        g.any(),
        g.behind(g.choice([g.char(b'a'), g.char(b'b')])),
        g.not_behind(g.string("xa")),
        g.any(),
    ]));
    g.entry("Top");
    let top = g.link().unwrap();
    assert!(top.match_at(b"cb", 0).is_none());
    assert!(top.match_at(b"xab", 1).is_none());
    assert_eq!(top.match_at(b"yab", 1).unwrap().end(), 3);
    // Fewer bytes before the cursor than the body needs: both polarities fail.
    assert!(top.match_at(b"ab", 0).is_none());

    let g = DefinitionBuilder::new();
    g.define("Top", g.glue([g.any(), g.behind(g.string("xy"))]));
    g.entry("Top");
    assert!(g.link().unwrap().match_at(b"y", 0).is_none());
}

#[test]
fn length_bounds() {
    let g = DefinitionBuilder::new();
    g.define("Top", g.length(2..=3, g.repeat(1.., g.range(b'a', b'z'))));
    g.entry("Top");
    let top = g.link().unwrap();
    assert!(top.match_at(b"a", 0).is_none());
    assert_eq!(top.match_at(b"abc", 0).unwrap().end(), 3);
    assert!(top.match_at(b"abcd", 0).is_none());
}

#[test]
fn bounded_repetition() {
    let g = DefinitionBuilder::new();
    g.define("Top", g.repeat(2..4, g.char(b'a')));
    g.entry("Top");
    let top = g.link().unwrap();
    assert!(top.match_at(b"a", 0).is_none());
    assert_eq!(top.match_at(b"aa", 0).unwrap().end(), 2);
    assert_eq!(top.match_at(b"aaaaa", 0).unwrap().end(), 3);
}

#[test]
fn empty_repetition_body_stops() {
    let g = DefinitionBuilder::new();
    g.define("Top", g.repeat(0.., g.pass()));
    g.entry("Top");
    assert_eq!(g.link().unwrap().match_at(b"abc", 0).unwrap().end(), 0);
}

fn comment(repeat: impl FnOnce(&DefinitionBuilder) -> strand_grammar::NodeId) -> Definition {
    let g = DefinitionBuilder::new();
    let body = repeat(&g);
    g.define("Comment", g.glue([g.string("/*"), body, g.string("*/")]));
    g.entry("Comment");
    g.link().unwrap()
}

#[test]
fn lazy_repetition_stops_at_first_close() {
    let lazy = comment(|g| g.lazy_repeat(0, g.any()));
    assert_eq!(lazy.match_at(b"/* a */ b */", 0).unwrap().end(), 7);
    assert_eq!(lazy.match_at(b"/**/", 0).unwrap().end(), 4);
    assert!(lazy.match_at(b"/* a", 0).is_none());
}

#[test]
fn greedy_repetition_stops_at_last_close() {
    let greedy = comment(|g| g.greedy_repeat(0.., g.any()));
    assert_eq!(greedy.match_at(b"/* a */ b */", 0).unwrap().end(), 12);
    assert_eq!(greedy.match_at(b"/**/", 0).unwrap().end(), 4);

    let plain = comment(|g| g.repeat(0.., g.any()));
    assert!(plain.match_at(b"/* a */ b */", 0).is_none());
}

#[test]
fn callbacks() {
    let g = DefinitionBuilder::new();
    g.define("Top", g.repeat(1.., g.call(|text, i, _| {
        text.get(i).filter(|b| b.is_ascii_hexdigit()).map(|_| i + 1)
    })));
    g.entry("Top");
    let top = g.link().unwrap();
    assert_eq!(top.match_at(b"c0ffee!", 0).unwrap().end(), 6);
}

#[test]
fn previous_sibling() {
    let g = DefinitionBuilder::new();
    g.define("Num", g.repeat(1.., g.range(b'0', b'9')));
    g.define("Unit", g.glue([g.previous("Num"), g.repeat(1.., g.range(b'a', b'z'))]));
    g.define("Top", g.repeat(1.., g.choice([g.reference("Num"), g.reference("Unit")])));
    g.entry("Top");
    let top = g.link().unwrap();

    check(
        &top,
        "12kg",
        expect![[r#"
            Top@0..4
              Num@0..2 "12"
              Unit@2..4 "kg"
        "#]],
    );
    assert!(top.match_at(b"kg", 0).is_none());
}

#[test]
fn previous_sibling_with_keyword() {
    let g = DefinitionBuilder::new();
    g.define("Kw", g.keyword("let const"));
    g.define("Name", g.glue([g.previous_keyword("Kw", "let"), g.repeat(1.., g.range(b'a', b'z'))]));
    g.define("Top", g.glue([g.reference("Kw"), g.char(b' '), g.reference("Name")]));
    g.entry("Top");
    let top = g.link().unwrap();
    assert!(top.match_at(b"let x", 0).is_some());
    assert!(top.match_at(b"const x", 0).is_none());
}

#[test]
fn enclosing_context() {
    let g = DefinitionBuilder::new();
    g.define("Inner", g.glue([g.context("Outer", None), g.char(b'x')]));
    g.define("Outer", g.glue([g.char(b'('), g.reference("Inner"), g.char(b')')]));
    g.define("Top", g.choice([g.reference("Outer"), g.reference("Inner")]));
    g.entry("Top");
    let top = g.link().unwrap();
    assert!(top.match_at(b"(x)", 0).is_some());
    assert!(top.match_at(b"x", 0).is_none());
}

#[test]
fn definitions_are_shared_between_threads() {
    let digits = digits(false);
    std::thread::scope(|scope| {
        for text in ["1", "22", "333"] {
            let digits = &digits;
            scope.spawn(move || {
                assert_eq!(digits.match_at(text.as_bytes(), 0).unwrap().end(), text.len());
            });
        }
    });
}
