use anyhow::{Context, Result, bail};
use clap::Parser;
use std::io::{self, BufReader};
use std::path::{Path, PathBuf};
use tracing_subscriber::EnvFilter;
use wit::cli::{self, Workspace};
use wit::config::Config;
use wit::model::{Node, PathIdentity, Position};
use wit::outline::OutlineProvider;
use wit::protocol::JsonlSink;
use wit::session::{self, Session};

fn main() -> Result<()> {
    init_tracing();
    let args = cli::Args::parse();

    match args.command {
        cli::Command::Serve { workspace } => {
            let (root, config) = load(&workspace)?;
            let session = Session::start(
                &root,
                &config,
                Box::new(OutlineProvider::new()),
                JsonlSink::new(io::stdout()),
            );
            session.run(BufReader::new(io::stdin()));
            Ok(())
        }
        cli::Command::Show {
            workspace,
            file,
            line,
            character,
        } => {
            let (root, config) = load(&workspace)?;
            let (context, store) = session::bootstrap(&root, &config)?;
            let file = if file.is_absolute() {
                file
            } else {
                root.join(file)
            };
            let position = line.map(|line| Position::new(line, character));
            let view = session::resolve_tree(
                context,
                &store,
                &mut OutlineProvider::new(),
                &file,
                position,
            );
            if view.tree.is_empty() {
                bail!("{} yields no context under {}", file.display(), root.display());
            }
            println!("{}", serde_json::to_string_pretty(&view)?);
            Ok(())
        }
        cli::Command::Describe {
            workspace,
            path,
            description,
        } => {
            let (root, config) = load(&workspace)?;
            let (context, store) = session::bootstrap(&root, &config)?;
            let product_id = context.product.id;
            let path = PathIdentity::new(path);
            let item_type = store
                .get_item(product_id, &path)?
                .map(|item| item.item_type)
                .unwrap_or_else(|| path.inferred_type());
            store
                .upsert(product_id, &Node::new(path.clone(), item_type, description))
                .with_context(|| format!("failed to store description for {path}"))?;
            let stored = store.get_item(product_id, &path)?;
            println!("{}", serde_json::to_string_pretty(&stored)?);
            Ok(())
        }
        cli::Command::List { workspace, parent } => {
            let (root, config) = load(&workspace)?;
            let (context, store) = session::bootstrap(&root, &config)?;
            let parent = parent.map(PathIdentity::new);
            let items = store.children(context.product.id, parent.as_ref())?;
            println!("{}", serde_json::to_string_pretty(&items)?);
            Ok(())
        }
        cli::Command::Product { workspace } => {
            let (root, config) = load(&workspace)?;
            let (context, store) = session::bootstrap(&root, &config)?;
            let output = serde_json::json!({
                "product": context.product,
                "db": store.db_path(),
                "items": store.item_count(context.product.id)?,
            });
            println!("{}", serde_json::to_string_pretty(&output)?);
            Ok(())
        }
    }
}

fn init_tracing() {
    // stdout carries the protocol; logs go to stderr
    let filter = EnvFilter::try_from_env("WIT_LOG").unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .with_target(false)
        .init();
}

fn load(workspace: &Workspace) -> Result<(PathBuf, Config)> {
    let root = absolute_root(&workspace.root)?;
    let mut config = Config::from_env();
    if let Some(db) = &workspace.db {
        config.db_path = Some(db.clone());
    }
    if let Some(product) = &workspace.product {
        config.product_name = Some(product.clone());
    }
    Ok((root, config))
}

fn absolute_root(root: &Path) -> Result<PathBuf> {
    if root.is_absolute() {
        return Ok(root.to_path_buf());
    }
    let cwd = std::env::current_dir().context("failed to read current directory")?;
    Ok(cwd.join(root).components().collect())
}
