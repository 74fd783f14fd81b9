mod grammars;

use anyhow::Context;
use camino::Utf8PathBuf;
use clap::Parser;
use grammars::Bundled;
use strand_errors::Renderer;

#[derive(Parser)]
enum Options {
    /// Matches a file against a bundled grammar and prints the token tree.
    Run { grammar: Bundled, path: Utf8PathBuf },
    /// Prints the rules of a bundled grammar.
    Grammar {
        grammar: Bundled,
        /// Keep rules the entry rule never reaches.
        #[arg(long)]
        all: bool,
    },
}

fn main() -> anyhow::Result<()> {
    match Options::parse() {
        Options::Run { grammar, path } => {
            let definition = grammar.definition()?;
            let text = std::fs::read_to_string(&path)
                .with_context(|| format!("failed to read `{path}`"))?;

            match definition.parse(text.as_bytes()) {
                Ok(found) => print!("{}", definition.dump(&found, text.as_bytes())),
                Err(error) => {
                    let renderer = Renderer::styled();
                    eprintln!("{}", error.render(&renderer, path.as_str(), &text));
                    std::process::exit(1);
                }
            }

            Ok(())
        }
        Options::Grammar { grammar, all } => {
            print!("{}", grammar.definition()?.declaration(!all));
            Ok(())
        }
    }
}
