use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser)]
#[command(
    name = "wit",
    version,
    about = "Context tree descriptions for editors",
    after_help = r#"Examples:
  wit serve --root .
  wit show --root . --file src/main.rs --line 12 --character 4
  wit describe --root . --path 'src/main.rs#main' --description 'Entry point'
  wit list --root . --parent src
  wit product --root .
"#
)]
pub struct Args {
    #[command(subcommand)]
    pub command: Command,
}

/// Options shared by every subcommand.
#[derive(clap::Args, Clone, Debug)]
pub struct Workspace {
    /// Workspace root; paths in the context tree are relative to it.
    #[arg(long, default_value = ".")]
    pub root: PathBuf,
    /// Database file (overrides WIT_DB).
    #[arg(long)]
    pub db: Option<PathBuf>,
    /// Product name (overrides WIT_PRODUCT_NAME and the git remote).
    #[arg(long)]
    pub product: Option<String>,
}

#[derive(Subcommand)]
pub enum Command {
    /// Run a JSONL session over stdin/stdout.
    Serve {
        #[command(flatten)]
        workspace: Workspace,
    },
    /// Resolve and print the context tree for one location.
    Show {
        #[command(flatten)]
        workspace: Workspace,
        /// File to resolve, absolute or relative to the root.
        #[arg(long)]
        file: PathBuf,
        /// Zero-based cursor line.
        #[arg(long)]
        line: Option<u32>,
        /// Zero-based cursor column.
        #[arg(long, default_value_t = 0)]
        character: u32,
    },
    /// Store a description for a path identity.
    Describe {
        #[command(flatten)]
        workspace: Workspace,
        /// Path identity, e.g. src/a.ts#Bar#foo.
        #[arg(long)]
        path: String,
        #[arg(long)]
        description: String,
    },
    /// List stored items below a parent (top level when omitted).
    List {
        #[command(flatten)]
        workspace: Workspace,
        #[arg(long)]
        parent: Option<String>,
    },
    /// Print the product this workspace resolves to.
    Product {
        #[command(flatten)]
        workspace: Workspace,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_show_with_position() {
        let args = Args::try_parse_from([
            "wit", "show", "--root", "/repo", "--file", "src/a.ts", "--line", "3",
        ])
        .unwrap();
        let Command::Show {
            workspace,
            file,
            line,
            character,
        } = args.command
        else {
            panic!("expected show");
        };
        assert_eq!(workspace.root, PathBuf::from("/repo"));
        assert_eq!(file, PathBuf::from("src/a.ts"));
        assert_eq!(line, Some(3));
        assert_eq!(character, 0);
    }

    #[test]
    fn describe_requires_description() {
        assert!(Args::try_parse_from(["wit", "describe", "--path", "src"]).is_err());
    }
}
