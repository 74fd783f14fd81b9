use strand_grammar::{Definition, DefinitionBuilder, GrammarError, ScopeBuilder, StateKind};

fn link_error(build: impl FnOnce(&DefinitionBuilder)) -> GrammarError {
    let g = DefinitionBuilder::named("broken");
    build(&g);
    g.link().unwrap_err()
}

#[test]
fn undefined_rule() {
    let error = link_error(|g| {
        g.define("Top", g.reference("Missing"));
        g.entry("Top");
    });
    assert_eq!(error, GrammarError::UndefinedRule { rule: "Missing".to_owned() });
    assert_eq!(error.to_string(), "undefined rule `Missing` referenced");
}

#[test]
fn missing_entry() {
    let error = link_error(|g| {
        g.define("Top", g.any());
    });
    assert_eq!(error, GrammarError::MissingEntry);
}

#[test]
fn entry_must_exist() {
    let error = link_error(|g| {
        g.define("Top", g.any());
        g.entry("Start");
    });
    assert_eq!(error, GrammarError::UndefinedRule { rule: "Start".to_owned() });
}

#[test]
fn redefinition() {
    let error = link_error(|g| {
        g.define("Top", g.any());
        g.define("Top", g.char(b'a'));
        g.entry("Top");
    });
    assert_eq!(error, GrammarError::Redefinition { rule: "Top".to_owned() });
}

#[test]
fn undefined_keyword() {
    let error = link_error(|g| {
        g.define("Kw", g.keyword("let"));
        g.define("Top", g.glue([g.reference("Kw"), g.previous_keyword("Kw", "var")]));
        g.entry("Top");
    });
    assert_eq!(error, GrammarError::UndefinedKeyword { keyword: "var".to_owned() });
}

#[test]
fn undefined_definition() {
    let error = link_error(|g| {
        g.define("Top", g.invoke("json", None));
        g.entry("Top");
    });
    assert_eq!(error, GrammarError::UndefinedDefinition { definition: "json".to_owned() });
}

#[test]
fn undefined_scope() {
    let error = link_error(|g| {
        g.define("Top", g.reference("Outer::Inner::Rule"));
        g.entry("Top");
    });
    assert_eq!(
        error,
        GrammarError::UndefinedScope { scope: "Outer".to_owned(), path: "Outer::Inner::Rule".to_owned() }
    );
}

#[test]
fn undefined_state_variable() {
    let error = link_error(|g| {
        g.state_char("quote", b'"');
        g.define("Top", g.var_string("quote"));
        g.entry("Top");
    });
    assert_eq!(
        error,
        GrammarError::UndefinedStateVariable { kind: StateKind::String, name: "quote".to_owned() }
    );
    assert_eq!(error.to_string(), "undefined state string `quote` referenced");
}

#[test]
fn state_redefinition() {
    let error = link_error(|g| {
        g.state_flag("open", false);
        g.state_flag("open", true);
        g.define("Top", g.set("open", true));
        g.entry("Top");
    });
    assert_eq!(error, GrammarError::StateRedefinition { kind: StateKind::Flag, name: "open".to_owned() });
}

#[test]
fn touch_string_tolerates_existing_slots() {
    let g = DefinitionBuilder::new();
    g.state_string("tag", b"p");
    g.touch_string("tag");
    g.touch_string("id");
    g.define("Top", g.glue([g.var_string("tag"), g.var_string("id")]));
    g.entry("Top");
    let top = g.link().unwrap();
    assert_eq!((top.string_id("tag"), top.string_id("id")), (Some(0), Some(1)));
    assert_eq!(top.match_at(b"p", 0).unwrap().end(), 1);
}

#[test]
fn unknown_option() {
    let error = link_error(|g| {
        g.option("CASESENSITIVE", true);
        g.option("fast", true);
        g.define("Top", g.any());
        g.entry("Top");
    });
    assert_eq!(error, GrammarError::UnknownOption { option: "fast".to_owned() });
}

#[test]
fn nodes_belong_to_one_parent() {
    let error = link_error(|g| {
        let a = g.char(b'a');
        g.define("Top", g.glue([a, a]));
        g.entry("Top");
    });
    assert_eq!(error, GrammarError::NodeReused);
}

#[test]
fn nodes_belong_to_one_definition() {
    let other = DefinitionBuilder::new();
    for _ in 0..4 {
        other.any();
    }
    let foreign = other.any();
    let error = link_error(|g| {
        g.define("Top", g.glue([g.any(), foreign]));
        g.entry("Top");
    });
    assert_eq!(error, GrammarError::UnknownNode);
}

#[test]
fn lookbehind_needs_a_fixed_length() {
    let error = link_error(|g| {
        g.define("Top", g.behind(g.repeat(1.., g.char(b'a'))));
        g.entry("Top");
    });
    assert_eq!(error, GrammarError::UnboundedBehind);

    let g = DefinitionBuilder::new();
    g.define("Top", g.glue([
        g.string("abc"),
        g.behind(g.glue([g.repeat(2..=2, g.any()), g.char(b'c')])),
    ]));
    g.entry("Top");
    assert_eq!(g.link().unwrap().match_at(b"abc", 0).unwrap().end(), 3);
}

#[test]
fn anonymous_imports_are_rejected() {
    let anonymous = DefinitionBuilder::new();
    anonymous.define("A", anonymous.any());
    anonymous.entry("A");
    let anonymous = anonymous.link().unwrap();

    let error = link_error(|g| {
        g.import(&anonymous, None);
        g.define("Top", g.any());
        g.entry("Top");
    });
    assert_eq!(error, GrammarError::AnonymousImport);
}

#[test]
fn scope_reports_the_first_broken_member() {
    let fine = DefinitionBuilder::named("fine");
    fine.define("A", fine.reference("broken::B"));
    fine.entry("A");
    let broken = DefinitionBuilder::named("broken");
    broken.define("B", broken.reference("C"));
    broken.entry("B");

    let mut scope = ScopeBuilder::new();
    scope.add(fine).add(broken);
    assert_eq!(scope.link().unwrap_err(), GrammarError::UndefinedRule { rule: "C".to_owned() });
}

fn after_a(optimize: bool) -> Definition {
    let g = DefinitionBuilder::new();
    g.define("A", g.char(b'a'));
    g.define_void("AfterA", g.glue([g.previous("A"), g.char(b'b')]));
    g.define_void("Let", g.keyword("let"));
    g.define_void("Space", g.repeat(0.., g.char(b' ')));
    g.define("Top", g.glue([
        g.reference("A"),
        g.reference("AfterA"),
        g.reference("Space"),
        g.reference("Let"),
    ]));
    g.entry("Top");
    g.link_with(optimize).unwrap()
}

#[test]
fn optimizer_keeps_the_matched_language() {
    let plain = after_a(false);
    let optimized = after_a(true);
    for text in [&b"ab let"[..], b"ablet", b"b let", b"ab"] {
        let expected = plain.match_at(text, 0);
        let found = optimized.match_at(text, 0);
        assert_eq!(found.as_ref().map(|found| found.end()), expected.as_ref().map(|found| found.end()));
        if let (Some(found), Some(expected)) = (found, expected) {
            assert_eq!(optimized.dump(&found, text), plain.dump(&expected, text));
        }
    }
    assert_eq!(optimized.match_at(b"ab let", 0).unwrap().end(), 6);
}
