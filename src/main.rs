use anyhow::{Context, Result};
use clap::{CommandFactory, Parser, Subcommand};
use hybrid_code_search::config::{Config, EmbeddingProviderKind};
use hybrid_code_search::index::{FileWatcher, IncrementalIndexer};
use hybrid_code_search::index::watcher::DEFAULT_DEBOUNCE;
use hybrid_code_search::query::{mcp, QueryInterface, ToolResponse, DEFAULT_TREE_DEPTH};
use hybrid_code_search::telemetry;
use hybrid_code_search::utils::format_number;
use hybrid_code_search::vector::VectorBackend;
use std::path::{Path, PathBuf};
use std::time::Instant;
use tracing::{info, warn};

/// Hybrid Code Search - lexical + semantic search over a source tree
#[derive(Parser, Debug)]
#[command(name = "hybrid_code_search")]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Path to configuration file
    #[arg(short, long, value_name = "FILE", global = true)]
    config: Option<PathBuf>,

    /// Project root to index
    #[arg(short, long, value_name = "DIR", default_value = ".", global = true)]
    root: PathBuf,

    /// Embedding provider (overrides config file)
    #[arg(long, value_name = "PROVIDER", global = true)]
    provider: Option<EmbeddingProviderKind>,

    /// Vector backend (overrides config file)
    #[arg(long, value_name = "BACKEND", global = true)]
    backend: Option<VectorBackend>,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Generate a template configuration file and exit
    #[arg(long, value_name = "FILE")]
    init: Option<PathBuf>,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Rebuild the whole index
    Index,
    /// Re-index files changed since the last run
    Update,
    /// Hybrid search
    Search {
        query: String,
        #[arg(short = 'k', long, value_name = "N")]
        top_k: Option<usize>,
    },
    /// Find units by symbol name
    Symbol {
        name: String,
        /// contains | prefix | exact
        #[arg(long, default_value = "contains")]
        mode: String,
    },
    /// Show the project directory tree
    Tree {
        path: Option<String>,
        #[arg(long, default_value_t = DEFAULT_TREE_DEPTH)]
        depth: usize,
    },
    /// Find code similar to a snippet
    Similar {
        snippet: Option<String>,
        /// Read the snippet from a file
        #[arg(long, value_name = "FILE", conflicts_with = "snippet")]
        file: Option<PathBuf>,
        #[arg(short = 'k', long, value_name = "N")]
        top_k: Option<usize>,
    },
    /// Show index statistics
    Stats,
    /// Serve the query tools over stdio (JSON-RPC)
    Serve,
    /// Keep the index up to date as files change
    Watch,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    telemetry::init_logging(args.verbose);

    // Handle --init flag: generate template config and exit
    if let Some(init_path) = args.init {
        let path = if init_path.as_os_str().is_empty() {
            PathBuf::from("hybrid_code_search.toml")
        } else {
            init_path
        };

        if path.exists() {
            eprintln!("Error: Config file already exists: {}", path.display());
            eprintln!("Remove it first or choose a different path.");
            std::process::exit(1);
        }

        Config::write_template(&path)?;
        println!("✓ Generated config file: {}", path.display());
        println!("\nEdit the file, then build the index with:");
        println!("  hybrid_code_search --config {} index", path.display());
        return Ok(());
    }

    let Some(command) = args.command else {
        Args::command().print_help()?;
        return Ok(());
    };

    let root = std::fs::canonicalize(&args.root)
        .with_context(|| format!("Project root not found: {}", args.root.display()))?;
    let config = load_config(args.config.as_deref(), &root)?
        .with_env_overrides()?
        .with_overrides(args.provider, args.backend);

    if args.verbose {
        info!(root = %root.display(), "Project root");
        info!(exclude_patterns = ?config.indexer.exclude_patterns, "Exclude patterns");
    }

    let mut indexer = IncrementalIndexer::open(&config, &root)?;

    match command {
        Command::Index => {
            let start = Instant::now();
            let units = indexer.index().await?;
            let stats = indexer.stats();
            println!(
                "✓ Indexed {} units from {} files in {:.2}s",
                format_number(units),
                format_number(stats.files),
                start.elapsed().as_secs_f64()
            );
        }
        Command::Update => {
            let summary = indexer.update().await?;
            if summary.is_empty() {
                println!("Index is up to date");
            } else {
                println!("✓ {}", summary);
            }
        }
        Command::Search { query, top_k } => {
            let top_k = top_k.unwrap_or(config.search.default_top_k);
            let interface = prepared(indexer).await?;
            print_response(interface.search_code(&query, top_k).await);
        }
        Command::Symbol { name, mode } => {
            let interface = prepared(indexer).await?;
            print_response(interface.search_by_symbol(&name, &mode));
        }
        Command::Tree { path, depth } => {
            let interface = QueryInterface::new(indexer);
            print_response(interface.get_file_structure(path.as_deref(), depth));
        }
        Command::Similar {
            snippet,
            file,
            top_k,
        } => {
            let snippet = match (snippet, file) {
                (_, Some(file)) => std::fs::read_to_string(&file)
                    .with_context(|| format!("Failed to read snippet file: {}", file.display()))?,
                (Some(snippet), None) => snippet,
                (None, None) => anyhow::bail!("Provide a snippet or --file <FILE>"),
            };
            let top_k = top_k.unwrap_or(config.search.default_top_k);
            let interface = prepared(indexer).await?;
            print_response(interface.get_similar_patterns(&snippet, top_k).await);
        }
        Command::Stats => {
            println!("{}", indexer.stats());
            println!("Cache:      {}", indexer.cache_dir().display());
        }
        Command::Serve => {
            let mut interface = prepared(indexer).await?;
            mcp::run(&mut interface).await?;
        }
        Command::Watch => watch(indexer).await?,
    }

    Ok(())
}

fn load_config(explicit: Option<&Path>, root: &Path) -> Result<Config> {
    if let Some(config_path) = explicit {
        // Explicit config file specified
        if !config_path.exists() {
            anyhow::bail!(
                "Config file not found: {}\nUse --init {} to generate a template.",
                config_path.display(),
                config_path.display()
            );
        }
        info!(path = %config_path.display(), "Loading config from file");
        return Config::from_file(config_path);
    }

    match Config::from_default_locations(root)? {
        Some((config, path)) => {
            info!(path = %path.display(), "Loading config from default location");
            Ok(config)
        }
        None => {
            info!("No config file found, using defaults");
            Ok(Config::default())
        }
    }
}

/// Bring the index up to date before answering queries
async fn prepared(mut indexer: IncrementalIndexer) -> Result<QueryInterface> {
    let summary = indexer.update().await?;
    if !summary.is_empty() {
        info!(%summary, "Index refreshed");
    }
    Ok(QueryInterface::new(indexer))
}

fn print_response(response: ToolResponse) {
    println!("{}", response.first_text());
    if response.is_error {
        std::process::exit(1);
    }
}

async fn watch(mut indexer: IncrementalIndexer) -> Result<()> {
    let summary = indexer.update().await?;
    info!(%summary, units = indexer.units().len(), "Initial update complete");

    let excluded = indexer.filter().excluded_dirs();
    let mut watcher = FileWatcher::new(indexer.root(), &excluded, DEFAULT_DEBOUNCE)?;

    loop {
        tokio::select! {
            change = watcher.recv() => {
                let Some(change) = change else {
                    warn!("File watcher stopped");
                    break;
                };
                let pending = watcher.drain();
                info!(path = %change.path().display(), pending, "Change detected");
                match indexer.update().await {
                    Ok(summary) if !summary.is_empty() => info!(%summary, "Index updated"),
                    Ok(_) => {}
                    Err(e) => warn!(error = %e, "Update failed"),
                }
            }
            _ = tokio::signal::ctrl_c() => {
                info!("Shutting down");
                break;
            }
        }
    }
    Ok(())
}
