//! notetree - browse, search and safely move markdown notes.
//!
//! Usage:
//!   notetree tree [PATH]               Show the document tree
//!   notetree search PATH TERM          Search names and document text
//!   notetree plan SOURCE DEST          Show how a move would be carried out
//!   notetree move SOURCE DEST          Move with verification across volumes
//!   notetree copy SOURCE DEST          Copy and verify
//!   notetree verify A B                Compare two files by content
//!   notetree digest FILE...            Print content digests
//!   notetree --help                    Show help

use std::path::{Path, PathBuf};
use std::sync::Arc;

use clap::{Args, Parser, Subcommand, ValueEnum};
use color_eyre::eyre::{Context, Result, bail};
use serde_json::json;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::EnvFilter;

use notetree_core::{DocumentTree, LoadState, NodeId, TreeConfig};
use notetree_ops::{
    FileSystem, IntegrityVerifier, LocalFs, PreflightReport, PreflightWarning, TransferEngine,
    TransferEvent, TransferMode, TransferPlan,
};
use notetree_search::{ResultTree, SearchEngine, SearchEvent, SearchOptions, SearchQuery};

#[derive(Parser)]
#[command(
    name = "notetree",
    version,
    about = "Browse, search and safely move markdown notes",
    long_about = "notetree shows a directory of markdown documents as a tree, searches \
                  names and document text, and moves or copies entries with content \
                  verification when they cross volumes."
)]
struct Cli {
    #[command(flatten)]
    tree: TreeArgs,

    #[command(subcommand)]
    command: Command,
}

#[derive(Args)]
struct TreeArgs {
    /// Extension of document files, without the dot
    #[arg(long = "ext", default_value = "md", global = true)]
    document_extension: String,

    /// Skip entries whose names start with a dot
    #[arg(long, global = true)]
    no_hidden: bool,

    /// Follow symbolic links
    #[arg(long, global = true)]
    follow_symlinks: bool,

    /// Output format
    #[arg(short, long, default_value = "text", global = true)]
    format: OutputFormat,
}

impl TreeArgs {
    fn config(&self, root: &Path) -> TreeConfig {
        let mut config = TreeConfig::new(root);
        config.document_extension = self.document_extension.clone();
        config.include_hidden = !self.no_hidden;
        config.follow_symlinks = self.follow_symlinks;
        config
    }
}

#[derive(Subcommand)]
enum Command {
    /// Show the document tree
    Tree {
        /// Root directory
        #[arg(default_value = ".")]
        path: PathBuf,

        /// Expand directories down to this depth
        #[arg(short, long, default_value = "1")]
        depth: usize,

        /// Reveal these paths, expanding their ancestors
        #[arg(short, long)]
        open: Vec<PathBuf>,
    },

    /// Search names and document text
    Search {
        /// Directory to search
        path: PathBuf,

        /// Text to look for
        term: String,

        /// Match case exactly
        #[arg(short = 'c', long)]
        case_sensitive: bool,
    },

    /// Validate a move or copy and show its strategy and preflight
    Plan {
        source: PathBuf,
        destination: PathBuf,

        /// Plan a copy instead of a move
        #[arg(long)]
        copy: bool,
    },

    /// Move an entry
    Move {
        source: PathBuf,
        destination: PathBuf,
    },

    /// Copy an entry and verify the copy
    Copy {
        source: PathBuf,
        destination: PathBuf,
    },

    /// Compare two files by content
    Verify { first: PathBuf, second: PathBuf },

    /// Print content digests
    Digest {
        #[arg(required = true)]
        files: Vec<PathBuf>,
    },
}

#[derive(Debug, Clone, Copy, ValueEnum, Default, PartialEq, Eq)]
enum OutputFormat {
    #[default]
    Text,
    Json,
}

#[tokio::main]
async fn main() -> Result<()> {
    color_eyre::install()?;
    init_tracing();

    let cli = Cli::parse();
    let args = &cli.tree;

    match cli.command {
        Command::Tree { path, depth, open } => run_tree(args, &path, depth, &open)?,
        Command::Search {
            path,
            term,
            case_sensitive,
        } => run_search(args, &path, &term, case_sensitive).await?,
        Command::Plan {
            source,
            destination,
            copy,
        } => {
            let mode = if copy { TransferMode::Copy } else { TransferMode::Move };
            run_plan(args, &source, &destination, mode)?
        }
        Command::Move {
            source,
            destination,
        } => run_transfer(args, &source, destination, TransferMode::Move).await?,
        Command::Copy {
            source,
            destination,
        } => run_transfer(args, &source, destination, TransferMode::Copy).await?,
        Command::Verify { first, second } => run_verify(args, &first, &second)?,
        Command::Digest { files } => run_digest(args, &files)?,
    }

    Ok(())
}

/// Log to stderr, filtered by `NOTETREE_LOG` (default `warn`).
fn init_tracing() {
    let filter = EnvFilter::try_from_env("NOTETREE_LOG").unwrap_or_else(|_| EnvFilter::new("warn"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

/// Print the lazily loaded tree after expanding it to `depth`.
fn run_tree(args: &TreeArgs, path: &Path, depth: usize, open: &[PathBuf]) -> Result<()> {
    let mut tree = DocumentTree::new(args.config(path)).context("Cannot open tree")?;

    let mut stack = vec![(tree.root(), 0usize)];
    while let Some((id, level)) = stack.pop() {
        if level >= depth {
            continue;
        }
        let is_dir = tree.get(id).is_some_and(|n| n.is_dir());
        if !is_dir {
            continue;
        }
        tree.expand(id)
            .with_context(|| format!("Cannot expand {}", display_path(&tree, id)))?;
        stack.extend(tree.children(id).iter().map(|&child| (child, level + 1)));
    }

    for path in open {
        let path = path.canonicalize().context("Invalid path")?;
        if tree.reveal(&path).is_none() {
            bail!("{} is not part of the tree", path.display());
        }
    }

    let rows = tree.visible_nodes();
    match args.format {
        OutputFormat::Text => {
            println!("{}", tree.root_path().display());
            for (level, id) in rows {
                let Some(node) = tree.get(id) else { continue };
                let indent = "  ".repeat(level);
                let marker = match (node.has_expander(), node.is_expanded()) {
                    (true, true) => "▼ ",
                    (true, false) => "▶ ",
                    _ => "  ",
                };
                println!("{indent}{marker}{}", node.name());
                if let LoadState::Error { message } = node.load_state() {
                    println!("{indent}    ! {message}");
                }
            }
        }
        OutputFormat::Json => {
            let rows: Vec<_> = rows
                .into_iter()
                .filter_map(|(level, id)| tree.get(id).map(|node| (level, node)))
                .map(|(level, node)| {
                    json!({
                        "depth": level,
                        "path": node.path(),
                        "kind": node.kind(),
                        "expanded": node.is_expanded(),
                        "state": node.load_state(),
                    })
                })
                .collect();
            println!("{}", serde_json::to_string_pretty(&rows)?);
        }
    }

    Ok(())
}

fn display_path(tree: &DocumentTree, id: NodeId) -> String {
    tree.get(id)
        .map(|n| n.path().display().to_string())
        .unwrap_or_default()
}

/// Run a search to completion and print the result tree.
async fn run_search(args: &TreeArgs, path: &Path, term: &str, case_sensitive: bool) -> Result<()> {
    let root = path.canonicalize().context("Invalid path")?;
    let query = SearchQuery::new(term, case_sensitive)?;
    let mut engine = SearchEngine::new(SearchOptions::from_tree_config(&args.config(&root)));

    let mut rx = engine.start(&root, query).await?;
    let mut matches = Vec::new();
    while let Some(event) = rx.recv().await {
        match event {
            SearchEvent::Results(batch) => matches.extend(batch),
            SearchEvent::Finished { cancelled, matched } => {
                tracing::debug!(cancelled, matched, "search finished");
            }
        }
    }

    match args.format {
        OutputFormat::Text => match ResultTree::build(&matches) {
            None => println!("No matches for \"{term}\"."),
            Some(results) => {
                for (level, node) in results.rows() {
                    let name = if level == 0 {
                        node.path.display().to_string()
                    } else {
                        node.name.to_string()
                    };
                    let marker = if node.is_match { "*" } else { " " };
                    println!("{}{marker} {name}", "  ".repeat(level));
                }
                println!();
                println!("{} match(es)", results.matched());
            }
        },
        OutputFormat::Json => {
            println!("{}", serde_json::to_string_pretty(&matches)?);
        }
    }

    Ok(())
}

fn engine_for(args: &TreeArgs, source: &Path) -> Result<(TransferEngine, PathBuf)> {
    let source = source.canonicalize().context("Invalid source path")?;
    let root = source.parent().unwrap_or(&source).to_path_buf();
    let engine = TransferEngine::new(Arc::new(LocalFs), args.config(&root));
    Ok((engine, source))
}

fn run_plan(args: &TreeArgs, source: &Path, destination: &Path, mode: TransferMode) -> Result<()> {
    let (engine, source) = engine_for(args, source)?;
    let plan = engine
        .plan(&source, destination, mode)
        .context("Transfer cannot proceed")?;

    match args.format {
        OutputFormat::Text => print_plan(&plan),
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&plan)?),
    }
    Ok(())
}

fn print_plan(plan: &TransferPlan) {
    println!();
    println!("{}", "─".repeat(60));
    println!(" {}", plan.source.display());
    println!(" -> {}", plan.destination.display());
    println!(" Strategy: {}", plan.strategy);
    println!("{}", "─".repeat(60));
    if let Some(report) = &plan.preflight {
        print_preflight(report);
    }
}

fn print_preflight(report: &PreflightReport) {
    println!(
        " {} files, {} folders, {}",
        report.file_count,
        report.dir_count,
        format_size(report.total_bytes)
    );
    println!(" Available at destination: {}", format_size(report.available));
    if report.cross_volume {
        println!(" Crosses volumes: data is copied, verified, then the source removed");
    }
    for warning in &report.warnings {
        match warning {
            PreflightWarning::ManyFiles { count } => {
                println!(" Warning: large operation ({count} files)")
            }
            PreflightWarning::LargeTotal { bytes } => {
                println!(" Warning: large operation ({})", format_size(*bytes))
            }
        }
    }
}

/// Run a transfer on a background worker, reporting progress on stderr.
async fn run_transfer(
    args: &TreeArgs,
    source: &Path,
    destination: PathBuf,
    mode: TransferMode,
) -> Result<()> {
    let (engine, source) = engine_for(args, source)?;
    let mut rx = engine.start(source, destination, mode, CancellationToken::new());

    let mut outcome = None;
    while let Some(event) = rx.recv().await {
        match event {
            TransferEvent::Planned(plan) => {
                eprintln!("{} using {}", plan.source.display(), plan.strategy)
            }
            TransferEvent::Preflight(report) => {
                if args.format == OutputFormat::Text {
                    print_preflight(&report);
                }
            }
            TransferEvent::Progress(progress) => {
                tracing::debug!(
                    phase = ?progress.phase,
                    percent = progress.percentage(),
                    file = ?progress.current_file,
                    "transfer progress"
                );
            }
            TransferEvent::Completed(done) => outcome = Some(done),
            TransferEvent::Failed(err) => bail!("{}: {}", err.kind, err),
        }
    }

    let Some(outcome) = outcome else {
        bail!("transfer worker stopped without a result");
    };
    match args.format {
        OutputFormat::Text => {
            println!("{}", outcome.summary());
            if outcome.fell_back {
                println!(" (rename crossed devices, fell back to copy)");
            }
        }
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&outcome)?),
    }
    Ok(())
}

fn run_verify(args: &TreeArgs, first: &Path, second: &Path) -> Result<()> {
    let verifier = IntegrityVerifier::default();
    let same = verifier
        .verify(&LocalFs, first, second)
        .context("Verification failed")?;

    match args.format {
        OutputFormat::Text => {
            let verdict = if same { "identical" } else { "different" };
            println!("{} and {} are {verdict}", first.display(), second.display());
        }
        OutputFormat::Json => println!("{}", json!({ "identical": same })),
    }
    if !same {
        std::process::exit(1);
    }
    Ok(())
}

fn run_digest(args: &TreeArgs, files: &[PathBuf]) -> Result<()> {
    let verifier = IntegrityVerifier::default();
    let fs: &dyn FileSystem = &LocalFs;

    let mut digests = Vec::with_capacity(files.len());
    for file in files {
        let digest = verifier
            .digest(fs, file)
            .with_context(|| format!("Cannot read {}", file.display()))?;
        digests.push((file, digest));
    }

    match args.format {
        OutputFormat::Text => {
            for (file, digest) in &digests {
                println!("{digest}  {}", file.display());
            }
        }
        OutputFormat::Json => {
            let rows: Vec<_> = digests
                .iter()
                .map(|(file, digest)| json!({ "path": file, "blake3": digest.to_hex() }))
                .collect();
            println!("{}", serde_json::to_string_pretty(&rows)?);
        }
    }
    Ok(())
}

/// Format size in human-readable form.
fn format_size(bytes: u64) -> String {
    humansize::format_size(bytes, humansize::BINARY)
}
