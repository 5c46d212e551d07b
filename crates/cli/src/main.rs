//! anjin entry point.
//!
//! `index` keeps the chunk index of a codebase in step with the files on
//! disk. `check` looks up newer releases for the packages of a requirements
//! file and fetches (and summarizes) their changelogs. Logging goes to
//! stderr so the report on stdout stays clean.

use std::path::PathBuf;
use std::sync::Arc;

use anjin_client::{ChangelogClient, DebugSummarizer, FetchClient, FetchConfig, OpenAiClient, OpenAiConfig, PypiClient};
use anjin_core::pipeline::{log_progress, progress_channel};
use anjin_core::snippets::UsageScanner;
use anjin_core::sync::{ChunkConfig, PersistedCacheIndex};
use anjin_core::{
    AppConfig, ArtifactCache, CodeIndex, Collaborators, Pipeline, ReconcilableStore, Summarizer, SyncEngine,
    SyncOptions,
};
use anyhow::Result;
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

mod report;
mod requirements;

#[derive(Debug, Parser)]
#[command(name = "anjin", version, about = "Changelog summaries for outdated Python dependencies")]
struct Cli {
    /// Emit logs as JSON lines.
    #[arg(long, global = true)]
    json_logs: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Sync the chunk index with a codebase.
    Index {
        #[arg(long, default_value = ".")]
        codebase: PathBuf,
        /// Ignore the persisted index and re-add every file.
        #[arg(long)]
        clear_index: bool,
        /// Wipe stored chunks before syncing.
        #[arg(long)]
        clear_store: bool,
    },
    /// Check a requirements file for newer releases.
    Check {
        #[arg(long, default_value = "requirements.txt")]
        requirements: PathBuf,
        /// Codebase scanned for usage snippets.
        #[arg(long, default_value = ".")]
        codebase: PathBuf,
        /// Skip the summarizer call.
        #[arg(long)]
        debug: bool,
        /// Neither read nor write the changelog cache.
        #[arg(long)]
        no_cache: bool,
    },
    /// Search the chunk index.
    Search {
        query: String,
        #[arg(short, long, default_value_t = 5)]
        k: usize,
    },
    /// Drop cached changelogs for a package.
    Purge { package: String },
}

fn init_logging(json: bool) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let builder = tracing_subscriber::fmt().with_env_filter(filter).with_writer(std::io::stderr);
    if json {
        builder.json().init();
    } else {
        builder.init();
    }
}

async fn index(config: &AppConfig, codebase: PathBuf, options: SyncOptions) -> Result<()> {
    let index_dir = config.index_dir();
    let store = CodeIndex::open_in_dir(&index_dir).await?;
    let engine = SyncEngine::new(
        codebase,
        config.file_extensions.clone(),
        ChunkConfig::new(config.chunk_size, config.chunk_overlap)?,
        PersistedCacheIndex::in_dir(&index_dir),
        store,
    );

    tracing::info!(root = %engine.root().display(), ?options, "syncing code index");
    let run = engine.sync(options).await?;
    print!("{}", report::render_sync(&run.report));

    if let Err(e) = run.persisted {
        tracing::error!(error = %e, "index file not saved; changed files will be reprocessed next run");
        return Err(e.into());
    }
    Ok(())
}

async fn check(
    config: &AppConfig, requirements_path: PathBuf, codebase: PathBuf, debug: bool, use_cache: bool,
) -> Result<()> {
    let (requirements_text, packages) = requirements::read_requirements(&requirements_path)?;
    tracing::info!(path = %requirements_path.display(), packages = packages.len(), "loaded requirements");

    let fetch = FetchClient::new(FetchConfig::from(config))?;
    let summarizer: Arc<dyn Summarizer> = if debug {
        Arc::new(DebugSummarizer)
    } else {
        let api_key = config.require_openai_api_key()?;
        Arc::new(
            OpenAiClient::new(fetch.clone(), api_key, OpenAiConfig::from(config))?
                .with_project_context(requirements_text),
        )
    };

    let collaborators = Collaborators {
        versions: Arc::new(PypiClient::new(fetch.clone())),
        retriever: Arc::new(ChangelogClient::new(fetch, config.github_token.clone())),
        summarizer,
        snippets: Some(Arc::new(UsageScanner::new(codebase, config.file_extensions.clone(), config.max_snippets))),
    };

    let mut pipeline = Pipeline::new(collaborators, config.changelog_sources())
        .with_call_timeout(config.timeout())
        .with_max_concurrency(config.max_concurrency);
    if use_cache {
        pipeline = pipeline.with_cache(ArtifactCache::new(config.changelog_cache_dir()));
    }

    let (tx, rx) = progress_channel();
    let observer = tokio::spawn(log_progress(rx));
    let run = pipeline.run(packages, Some(tx)).await;
    let observed = observer.await?;
    tracing::debug!(completed = run.completed, observed, "pipeline finished");

    print!("{}", report::render_run(&run));
    Ok(())
}

async fn search(config: &AppConfig, query: String, k: usize) -> Result<()> {
    let store = CodeIndex::open_in_dir(config.index_dir()).await?;
    let results = store.query(&[query], k).await?;
    for (rank, text) in results.into_iter().flatten().enumerate() {
        println!("--- {} ---\n{}", rank + 1, text.trim_end());
    }
    Ok(())
}

async fn purge(config: &AppConfig, package: &str) -> Result<()> {
    let cache = ArtifactCache::new(config.changelog_cache_dir());
    if cache.purge(package).await? {
        println!("purged cached changelogs for {package}");
    } else {
        println!("nothing cached for {package}");
    }
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.json_logs);

    let config = AppConfig::load()?;

    match cli.command {
        Command::Index { codebase, clear_index, clear_store } => {
            index(&config, codebase, SyncOptions { clear_index, clear_store }).await
        }
        Command::Check { requirements, codebase, debug, no_cache } => {
            check(&config, requirements, codebase, debug || config.debug, config.use_cache && !no_cache).await
        }
        Command::Search { query, k } => search(&config, query, k).await,
        Command::Purge { package } => purge(&config, &package).await,
    }
}
