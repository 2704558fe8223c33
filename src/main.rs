//! Tessera CLI entry point

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

mod commands;

#[derive(Parser)]
#[command(name = "tessera")]
#[command(about = "Curate a weighted file selection across project roots", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,

    /// Project root; repeat for several (defaults to current directory)
    #[arg(short, long = "root")]
    roots: Vec<PathBuf>,

    /// Engine configuration file (TOML)
    #[arg(short, long)]
    config: Option<PathBuf>,
}

#[derive(Subcommand)]
enum Commands {
    /// List the visible tree below a directory
    List {
        /// Directory to list (defaults to every root)
        dir: Option<PathBuf>,

        /// How many levels to descend
        #[arg(short, long, default_value = "1")]
        depth: usize,
    },
    /// Show what a search query narrows the tree to
    Search {
        query: String,
    },
    /// Print the weight of individual files
    Weigh {
        #[arg(required = true)]
        paths: Vec<PathBuf>,
    },
    /// Select files or directories and report their weights
    Select {
        #[arg(required = true)]
        paths: Vec<PathBuf>,

        /// Print per-directory and total weights only
        #[arg(short, long)]
        summary: bool,
    },
    /// Delete the weight cache
    ClearCache,
    /// Watch the roots and keep rules and cache current until interrupted
    Watch,
    /// Show version
    Version,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Initialize logging
    let log_level = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(format!("tessera={}", log_level)))
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    if let Commands::Version = cli.command {
        println!("Tessera v{}", env!("CARGO_PKG_VERSION"));
        return Ok(());
    }

    let roots = if cli.roots.is_empty() {
        vec![PathBuf::from(".")]
    } else {
        cli.roots
    };
    let engine = commands::open_engine(roots, cli.config.as_deref())?;

    match cli.command {
        Commands::List { dir, depth } => commands::list(&engine, dir, depth).await,
        Commands::Search { query } => commands::search(&engine, &query).await,
        Commands::Weigh { paths } => commands::weigh(&engine, paths).await,
        Commands::Select { paths, summary } => commands::select(&engine, paths, summary).await,
        Commands::ClearCache => commands::clear_cache(&engine).await,
        Commands::Watch => commands::watch(&engine).await,
        Commands::Version => Ok(()),
    }
}
