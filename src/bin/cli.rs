//! Filter list mirror CLI
//!
//! Local execution entry point. A scheduler invokes `update` with the
//! published output directory.

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use listmirror::{
    error::Result,
    models::Config,
    pipeline,
    services::{Reporter, SourceRegistry, reporter::tracker_from_config},
    storage::{LocalStorage, SnapshotStorage},
};

/// listmirror - Filter List Mirror
#[derive(Parser, Debug)]
#[command(
    name = "listmirror",
    version,
    about = "Mirror adblock filter lists and build a rule search index"
)]
struct Cli {
    /// Path to the TOML configuration file
    #[arg(short, long, global = true, default_value = "listmirror.toml")]
    config: PathBuf,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Fetch, validate and publish every registered list
    Update {
        /// Output directory holding the previous snapshot
        output_dir: PathBuf,

        /// List catalog JSON URL extending the registry
        #[arg(long)]
        catalog: Option<String>,

        /// Index filename inside the output directory
        #[arg(long, conflicts_with = "no_index")]
        index: Option<String>,

        /// Skip building the search index
        #[arg(long)]
        no_index: bool,

        /// Webhook receiving one JSON event per failed source
        #[arg(long)]
        webhook: Option<String>,
    },

    /// Validate configuration and the source registry
    Validate,

    /// Query a built search index
    Search {
        /// Path to the index database
        index: PathBuf,

        /// Free-text query
        query: String,

        /// Maximum number of results
        #[arg(short, long)]
        limit: Option<usize>,
    },

    /// Show the published snapshot
    Info {
        /// Output directory to inspect
        output_dir: PathBuf,
    },
}

/// Initialize logging based on verbosity flag.
fn init_logging(verbose: bool) {
    let level = if verbose { "debug" } else { "info" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(level))
        .format_timestamp_secs()
        .init();
}

/// Main entry point for the CLI application.
#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    let mut config = Config::load_or_default(&cli.config);
    log::info!("Configuration: {}", cli.config.display());

    match cli.command {
        Command::Update {
            output_dir,
            catalog,
            index,
            no_index,
            webhook,
        } => {
            if catalog.is_some() {
                config.catalog.url = catalog;
            }
            if let Some(filename) = index {
                config.index.filename = filename;
            }
            if no_index {
                config.index.enabled = false;
            }
            if webhook.is_some() {
                config.reporting.webhook_url = webhook;
            }

            let storage = LocalStorage::new(&output_dir);
            let reporter = Reporter::new(tracker_from_config(
                &config.reporting,
                &config.fetcher.user_agent,
            ));
            let report = pipeline::run_update(&config, &storage, &reporter).await?;

            let counts = report.counts();
            log::info!(
                "{} of {} sources accepted, {} files changed",
                counts.accepted,
                counts.total,
                report.changes.len()
            );
        }

        Command::Validate => {
            log::info!("Validating configuration...");

            if let Err(e) = config.validate() {
                log::error!("Config validation failed: {}", e);
                return Err(e);
            }
            let registry = SourceRegistry::from_config(&config)?;
            for source in registry.list_sources() {
                log::info!(
                    "  {} -> {} ({}, min {} rules)",
                    source.name,
                    source.filename,
                    source.syntax,
                    source.threshold()
                );
            }
            log::info!("Config OK: {} sources registered", registry.len());
        }

        Command::Search {
            index,
            query,
            limit,
        } => {
            let limit = limit.unwrap_or(config.index.search_limit);
            let hits = pipeline::search(&index, &query, limit)?;
            if hits.is_empty() {
                log::info!("No rules match '{}'", query);
            }
            for hit in hits {
                println!("{}:{}\t{}", hit.filename, hit.line_number, hit.rule);
            }
        }

        Command::Info { output_dir } => {
            log::info!("Output directory: {}", output_dir.display());

            let manifest = LocalStorage::new(&output_dir).load_manifest().await?;
            if manifest.is_empty() {
                log::info!("No snapshot found yet.");
            }
            for (filename, entry) in &manifest {
                log::info!(
                    "  {} ({}): {} rules, updated {}",
                    filename,
                    entry.name,
                    entry.rule_count,
                    entry.updated_at.format("%Y-%m-%d %H:%M UTC")
                );
            }
            log::info!(
                "{} files, {} rules",
                manifest.len(),
                manifest.values().map(|e| e.rule_count).sum::<usize>()
            );

            let index_path = output_dir.join(&config.index.filename);
            log::info!(
                "Search index: {}",
                if index_path.exists() {
                    "exists"
                } else {
                    "not found"
                }
            );
        }
    }

    Ok(())
}
