use std::io::Read;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, Context};
use clap::Parser;
use homedir::my_home;
use tracing_subscriber::EnvFilter;

mod cli;
mod config;
mod eid;
mod semantic;
mod store;
#[cfg(test)]
mod tests;
mod web;

use config::{Config, StoreBackend};
use semantic::{LazyEmbedder, SearchQuery, SemanticSearchService};
use store::{ChunkStore, FileStore, MemoryStore};

fn base_path(arg: Option<PathBuf>) -> anyhow::Result<PathBuf> {
    if let Some(path) = arg {
        return Ok(path);
    }
    if let Ok(path) = std::env::var("SEMSEARCH_BASE_PATH") {
        return Ok(PathBuf::from(path));
    }
    let home = my_home()
        .context("couldnt find home dir")?
        .context("couldnt find home dir")?;
    Ok(home.join(".local/share/semsearch"))
}

fn read_input(file: &str) -> anyhow::Result<String> {
    if file == "-" {
        let mut text = String::new();
        std::io::stdin()
            .read_to_string(&mut text)
            .context("failed to read stdin")?;
        return Ok(text);
    }
    std::fs::read_to_string(file).with_context(|| format!("failed to read {file}"))
}

/// Build the search service: one embedder and one store for the whole process.
fn build_service(config: &Config) -> anyhow::Result<SemanticSearchService> {
    let embedding = &config.embedding;
    let embedder = Arc::new(LazyEmbedder::new(
        &embedding.model,
        config.base_path().to_path_buf(),
        Some(Duration::from_secs(embedding.download_timeout_secs)),
    ));
    embedder.validate()?;

    if embedding.preload {
        embedder.preload()?;
    }

    let store: Arc<dyn ChunkStore> = match config.store.backend {
        StoreBackend::File => Arc::new(FileStore::new(
            config.base_path().join("sessions"),
            semantic::model_id_hash(&embedding.model),
        )?),
        StoreBackend::Memory => Arc::new(MemoryStore::new()),
    };

    log::info!(
        "Using model '{}' with {} store at {}",
        embedding.model,
        store.name(),
        config.base_path().display()
    );

    Ok(SemanticSearchService::new(embedder, store))
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let args = cli::Args::parse();

    let base_path = base_path(args.base_path)?;
    let config = Config::load_with(&base_path)
        .with_context(|| format!("failed to load config from {}", base_path.display()))?;

    match args.command {
        cli::Command::Serve { addr } => {
            let addr = addr.unwrap_or_else(|| config.server.listen_addr.clone());
            let service = Arc::new(build_service(&config)?);
            web::start_daemon(web::SharedState { service, config }, addr)?;
        }

        cli::Command::Store {
            session,
            chunk_size,
            file,
        } => {
            if config.store.backend == StoreBackend::Memory {
                log::warn!("memory store selected: stored chunks are dropped when this command exits");
            }
            let text = read_input(&file)?;
            let chunk_size = chunk_size.unwrap_or(config.store.default_chunk_size);

            let service = build_service(&config)?;
            let report = service.store_text(&session, &text, chunk_size)?;
            println!("{}", serde_json::to_string_pretty(&report)?);
        }

        cli::Command::Search {
            session,
            limit,
            base_similarity,
            query,
        } => {
            let query = SearchQuery::new(session, query)
                .with_limit(limit.unwrap_or(config.search.default_limit))
                .with_base_similarity(
                    base_similarity.unwrap_or(config.search.default_base_similarity),
                );

            let service = build_service(&config)?;
            let results = service.search(&query)?;
            println!("{}", serde_json::to_string_pretty(&results)?);

            if results.is_empty() {
                bail!("no results found");
            }
        }

        cli::Command::Chunk { chunk_size, file } => {
            let text = read_input(&file)?;
            let chunk_size = chunk_size.unwrap_or(config.store.default_chunk_size);
            let chunks = semantic::chunk(&text, chunk_size)?;
            println!("{}", serde_json::to_string_pretty(&chunks)?);
        }
    }

    Ok(())
}
