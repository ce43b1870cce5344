use anyhow::{bail, Context};
use book_search_core::{
    ChromaStore, ChunkKind, EmbeddingClient, IndexLedger, IngestOutcome, IngestionEngine,
    OpenAiProvider, PlainTextParser, SearchEngine, SearchRequest, SystemConfig, VectorStore,
};
use chrono::Utc;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing::info;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

#[derive(Parser)]
#[command(name = "book-search", version)]
struct Cli {
    #[command(subcommand)]
    command: Command,

    /// Root directory of the book library
    #[arg(long, env = "BOOK_SEARCH_ROOT", default_value = ".")]
    library_root: PathBuf,

    /// Vector store base URL (Chroma-compatible HTTP API)
    #[arg(long, default_value = "http://localhost:8000")]
    store_url: String,

    /// Vector store collection name
    #[arg(long, default_value = "book_chunks")]
    collection: String,

    /// Embedding API base URL
    #[arg(long, default_value = "https://api.openai.com/v1")]
    embedding_api_base: String,

    /// Embedding model name
    #[arg(long, default_value = "text-embedding-3-small")]
    embedding_model: String,

    /// Embedding API key
    #[arg(long, env = "OPENAI_API_KEY", hide_env_values = true)]
    api_key: Option<String>,
}

#[derive(Subcommand)]
enum Command {
    /// Verify configuration, create the data directory and the collection.
    Init,
    /// Ingest the whole library, or a single book with --book.
    Ingest {
        /// Path to one book file to ingest (forces re-ingestion).
        #[arg(long)]
        book: Option<PathBuf>,
        /// Re-ingest books even when their content hash is unchanged.
        #[arg(long, default_value_t = false)]
        force: bool,
    },
    /// Ingest only new or changed books.
    Update,
    /// Search the index by meaning.
    Search {
        /// Free-text query
        query: String,
        /// Maximum number of results
        #[arg(long, default_value = "10")]
        limit: usize,
        /// Restrict to one granularity: chapter or paragraph
        #[arg(long)]
        kind: Option<String>,
        /// Only books whose author contains this (case-insensitive)
        #[arg(long)]
        author: Option<String>,
        /// Only books whose title contains this (case-insensitive)
        #[arg(long)]
        book_title: Option<String>,
        /// Print full chunk text instead of a preview
        #[arg(long, default_value_t = false)]
        full_text: bool,
    },
    /// Show ledger statistics and the live chunk count.
    Status,
    /// Delete every stored vector and reset the ledger.
    Clear,
}

type Engine = IngestionEngine<PlainTextParser, ChromaStore, OpenAiProvider>;

fn system_config(cli: &Cli) -> anyhow::Result<SystemConfig> {
    let mut config = SystemConfig::rooted(&cli.library_root);
    config.store.endpoint = cli.store_url.clone();
    config.store.collection = cli.collection.clone();
    config.embedding.api_base = cli.embedding_api_base.clone();
    config.embedding.model = cli.embedding_model.clone();
    config.embedding.api_key = cli
        .api_key
        .clone()
        .context("no embedding API key; pass --api-key or set OPENAI_API_KEY")?;
    Ok(config)
}

fn build_engine(config: &SystemConfig) -> anyhow::Result<Engine> {
    let store = ChromaStore::from_config(&config.store)?;
    let embedder = EmbeddingClient::new(
        OpenAiProvider::from_config(&config.embedding),
        config.embedding.clone(),
    );
    let ledger = IndexLedger::open(&config.paths.ledger_file)?;
    Ok(IngestionEngine::new(
        PlainTextParser,
        store,
        embedder,
        ledger,
        config.clone(),
    ))
}

fn parse_kind(raw: &str) -> anyhow::Result<ChunkKind> {
    match raw.to_lowercase().as_str() {
        "chapter" => Ok(ChunkKind::Chapter),
        "paragraph" => Ok(ChunkKind::Paragraph),
        other => bail!("unknown chunk kind {other:?}; expected chapter or paragraph"),
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(EnvFilter::from_default_env())
        .with(fmt::layer())
        .init();

    let cli = Cli::parse();
    let config = system_config(&cli)?;
    info!(
        library_root = %config.paths.books_root.display(),
        started_at = %Utc::now().to_rfc3339(),
        "book-search boot"
    );

    match &cli.command {
        Command::Init => {
            std::fs::create_dir_all(&config.paths.data_dir).with_context(|| {
                format!(
                    "creating data directory {}",
                    config.paths.data_dir.display()
                )
            })?;

            let store = ChromaStore::from_config(&config.store)?;
            store.ensure_collection().await?;

            let embedder = EmbeddingClient::new(
                OpenAiProvider::from_config(&config.embedding),
                config.embedding.clone(),
            );
            let probe = embedder.embed(&["test".to_string()]).await?;

            println!("library root: {}", config.paths.books_root.display());
            println!("data directory: {}", config.paths.data_dir.display());
            println!("collection: {}", config.store.collection);
            println!(
                "embedding model: {} ({} dimensions)",
                config.embedding.model,
                probe.first().map(Vec::len).unwrap_or(0)
            );
            println!("initialized");
        }
        Command::Ingest { book, force } => {
            let mut engine = build_engine(&config)?;
            match book {
                Some(path) => {
                    let outcome = engine.ingest_book(path, true).await.with_context(|| {
                        format!("ingesting {}", path.display())
                    })?;
                    report_outcome(path, outcome);
                }
                None => {
                    let report = engine.ingest_library(*force).await;
                    print_library_report(&report);
                }
            }
        }
        Command::Update => {
            let mut engine = build_engine(&config)?;
            let report = engine.ingest_library(false).await;
            print_library_report(&report);
        }
        Command::Search {
            query,
            limit,
            kind,
            author,
            book_title,
            full_text,
        } => {
            let store = ChromaStore::from_config(&config.store)?;
            let embedder = EmbeddingClient::new(
                OpenAiProvider::from_config(&config.embedding),
                config.embedding.clone(),
            );
            let searcher = SearchEngine::new(store, embedder, config.search.clone());

            let request = SearchRequest {
                query: query.clone(),
                limit: Some(*limit),
                kind: kind.as_deref().map(parse_kind).transpose()?,
                author: author.clone(),
                book_title: book_title.clone(),
            };

            let hits = searcher
                .search(&request)
                .await
                .with_context(|| format!("searching for {query:?}"))?;

            if hits.is_empty() {
                println!("no results");
                return Ok(());
            }

            for (position, hit) in hits.iter().enumerate() {
                println!(
                    "{}. {} - {} [{}]",
                    position + 1,
                    hit.book_title,
                    hit.book_author,
                    hit.kind.as_str()
                );
                println!(
                    "   chapter: {} (ch. {})  similarity: {:.3}",
                    hit.chapter_title, hit.chapter_number, hit.similarity
                );
                if *full_text {
                    println!("   text: {}", hit.text);
                } else {
                    println!("   preview: {}", hit.preview(200));
                }
            }
        }
        Command::Status => {
            let engine = build_engine(&config)?;
            let stats = engine.status();
            println!("books indexed: {}", stats.books);
            println!("chapter chunks: {}", stats.chapter_chunks);
            println!("paragraph chunks: {}", stats.paragraph_chunks);
            match stats.last_update {
                Some(at) => println!("last update: {}", at.to_rfc3339()),
                None => println!("last update: never"),
            }
            match engine.stored_chunk_count().await {
                Ok(count) => println!("stored chunks: {count}"),
                Err(error) => println!("stored chunks: unavailable ({error})"),
            }
        }
        Command::Clear => {
            let mut engine = build_engine(&config)?;
            engine.clear_index().await?;
            println!("index cleared");
        }
    }

    Ok(())
}

fn report_outcome(path: &std::path::Path, outcome: IngestOutcome) {
    match outcome {
        IngestOutcome::Indexed {
            chapter_chunks,
            paragraph_chunks,
        } => {
            println!("indexed {}", path.display());
            println!("  chapter chunks: {chapter_chunks}");
            println!("  paragraph chunks: {paragraph_chunks}");
        }
        IngestOutcome::Unchanged => println!("unchanged, skipped: {}", path.display()),
        IngestOutcome::Empty => println!("no chunks produced: {}", path.display()),
    }
}

fn print_library_report(report: &book_search_core::LibraryReport) {
    println!("books found: {}", report.found);
    println!("processed: {}", report.processed);
    println!("skipped: {}", report.skipped);
    if report.failed > 0 {
        println!("failed: {}", report.failed);
    }
    println!("chapter chunks added: {}", report.chapter_chunks);
    println!("paragraph chunks added: {}", report.paragraph_chunks);
}
