use clap::ValueEnum;
use strand_errors::GrammarError;
use strand_grammar::{Definition, DefinitionBuilder, NodeId};

/// Grammars shipped with the command line.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub(crate) enum Bundled {
    Digits,
    Ini,
}

impl Bundled {
    pub(crate) fn definition(self) -> Result<Definition, GrammarError> {
        match self {
            Self::Digits => digits(),
            Self::Ini => ini(),
        }
    }
}

/// Whitespace separated, optionally negative integers.
pub(crate) fn digits() -> Result<Definition, GrammarError> {
    let g = DefinitionBuilder::named("digits");
    g.define_void("Space", g.repeat(0.., g.range_of(b" \t\r\n")));
    g.define("Number", g.glue([g.repeat(0..=1, g.char(b'-')), g.repeat(1.., g.range(b'0', b'9'))]));
    g.define("Numbers", g.glue([
        g.reference("Space"),
        g.repeat(0.., g.glue([g.reference("Number"), g.reference("Space")])),
        g.hint("expected a number"),
        g.eoi(),
    ]));
    g.entry("Numbers");
    g.link()
}

/// Sections, `key = value` pairs and `;`/`#` comments, one per line.
pub(crate) fn ini() -> Result<Definition, GrammarError> {
    let g = DefinitionBuilder::named("ini");
    let word = || -> NodeId {
        g.repeat(1.., g.choice([
            g.range(b'a', b'z'),
            g.range(b'A', b'Z'),
            g.range(b'0', b'9'),
            g.range_of(b"_.-"),
        ]))
    };

    g.define_void("Blank", g.repeat(0.., g.range_of(b" \t")));
    g.define("Comment", g.glue([g.range_of(b";#"), g.repeat(0.., g.except_of(b"\r\n"))]));
    g.define("Name", word());
    g.define("Key", word());
    g.define("Section", g.glue([
        g.char(b'['),
        g.reference("Blank"),
        g.expect("expected a section name", g.reference("Name")),
        g.reference("Blank"),
        g.expect("missing `]`", g.char(b']')),
    ]));
    // Inner blanks belong to the value, trailing ones do not.
    g.define("Value", g.glue([
        g.repeat(1.., g.except_of(b" \t\r\n;#")),
        g.repeat(0.., g.glue([g.repeat(1.., g.range_of(b" \t")), g.repeat(1.., g.except_of(b" \t\r\n;#"))])),
    ]));
    g.define("Pair", g.glue([
        g.reference("Key"),
        g.reference("Blank"),
        g.hint("expected `=`"),
        g.char(b'='),
        g.done(),
        g.reference("Blank"),
        g.choice([g.reference("Value"), g.pass()]),
    ]));
    g.define_void("Content", g.glue([
        g.reference("Blank"),
        g.choice([g.reference("Section"), g.reference("Pair"), g.reference("Comment"), g.pass()]),
        g.reference("Blank"),
        g.choice([g.reference("Comment"), g.pass()]),
    ]));
    g.define_void("Line", g.glue([g.reference("Content"), g.repeat(0..=1, g.char(b'\r')), g.char(b'\n')]));
    g.define("Ini", g.glue([
        g.repeat(0.., g.reference("Line")),
        g.reference("Content"),
        g.hint("expected end of line"),
        g.eoi(),
    ]));
    g.entry("Ini");
    g.link()
}
