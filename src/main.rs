//! CLI entry point for ragsearch.
//!
//! Loads settings, wires a fastembed provider to an in-memory store built
//! from a JSON chunk file, and runs one search, filter or lookup.

use anyhow::{Context, anyhow};
use clap::{
    Parser, Subcommand,
    builder::styling::{AnsiColor, Effects, Styles},
};
use console::style;
use ragsearch::config::LoggingConfig;
use ragsearch::error::codes;
use ragsearch::io::{ExitCode, JsonResponse, OutputFormat, ResponseMeta};
use ragsearch::search::embedding::classify_provider_error;
use ragsearch::search::filter::parse_filter_expressions;
use ragsearch::search::store::classify_store_error;
use ragsearch::{
    ErrorContext, FastEmbedProvider, MemoryVectorStore, SearchConfig, SearchEngine, SearchError,
    SearchQuery, SearchResult, Settings, Severity,
};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;
use tracing_subscriber::EnvFilter;

fn clap_cargo_style() -> Styles {
    Styles::styled()
        .header(AnsiColor::Cyan.on_default() | Effects::BOLD)
        .usage(AnsiColor::Cyan.on_default() | Effects::BOLD)
        .literal(AnsiColor::Green.on_default())
        .placeholder(AnsiColor::Green.on_default())
}

/// Validated vector similarity search over document chunks
#[derive(Parser)]
#[command(
    name = "ragsearch",
    version = env!("CARGO_PKG_VERSION"),
    about = "Validated vector similarity search over document chunks",
    next_line_help = true,
    styles = clap_cargo_style()
)]
struct Cli {
    /// Path to custom settings.toml file
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

/// Available CLI commands
#[derive(Subcommand)]
enum Commands {
    /// Set up .ragsearch/settings.toml
    Init {
        /// Overwrite an existing settings file
        #[arg(short, long)]
        force: bool,
    },

    /// Display active settings
    Config,

    /// Rank chunks by similarity to a query
    Search {
        /// Query text
        text: String,

        /// JSON file with the chunks to search
        #[arg(long, env = "RAGSEARCH_CHUNKS")]
        chunks: PathBuf,

        /// Maximum number of results (1-100)
        #[arg(short, long)]
        limit: Option<usize>,

        /// Minimum similarity score (0.0-1.0)
        #[arg(short, long)]
        threshold: Option<f64>,

        /// Combine vector similarity with lexical overlap
        #[arg(long)]
        hybrid: bool,

        /// Omit section, chapter and position metadata
        #[arg(long)]
        no_metadata: bool,

        /// Restrict results, e.g. `filename=guide.pdf` or `page_number>=3`
        #[arg(long = "filter", value_name = "EXPR")]
        filters: Vec<String>,

        /// Output in JSON format
        #[arg(long)]
        json: bool,
    },

    /// Fetch one chunk by id
    Get {
        /// Chunk id
        id: String,

        #[arg(long, env = "RAGSEARCH_CHUNKS")]
        chunks: PathBuf,

        #[arg(long)]
        json: bool,
    },

    /// List chunks matching attribute filters, without ranking
    Filter {
        #[arg(long, env = "RAGSEARCH_CHUNKS")]
        chunks: PathBuf,

        /// Conditions, e.g. `filename=guide.pdf` or `page_number<=10`
        #[arg(long = "where", value_name = "EXPR", required = true)]
        conditions: Vec<String>,

        #[arg(short, long)]
        limit: Option<usize>,

        #[arg(long)]
        json: bool,
    },
}

/// Install the global subscriber. `RUST_LOG` wins over the configured level.
fn init_tracing(logging: &LoggingConfig) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&logging.level));
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr);

    if logging.json {
        builder.json().init();
    } else {
        builder.init();
    }
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    if cli.config.is_none() && !matches!(cli.command, Commands::Init { .. }) {
        if let Err(warning) = Settings::check_init() {
            eprintln!("Warning: {warning}");
            eprintln!("Using default configuration for now.");
        }
    }

    let settings = if let Some(config_path) = &cli.config {
        Settings::load_from(config_path).unwrap_or_else(|e| {
            eprintln!(
                "Configuration error loading from {}: {e}",
                config_path.display()
            );
            std::process::exit(ExitCode::ConfigError.into());
        })
    } else {
        Settings::load().unwrap_or_else(|e| {
            eprintln!("Configuration error: {e}");
            Settings::default()
        })
    };

    init_tracing(&settings.logging);

    let exit_code = match run(cli.command, &settings).await {
        Ok(code) => code,
        Err(e) => {
            eprintln!("Error: {e:#}");
            ExitCode::GeneralError
        }
    };
    std::process::exit(exit_code.into());
}

async fn run(command: Commands, settings: &Settings) -> anyhow::Result<ExitCode> {
    match command {
        Commands::Init { force } => {
            let path = Settings::init_config_file(force).map_err(|e| anyhow!("{e}"))?;
            println!("Created configuration file at: {}", path.display());
            println!("Edit this file to customize your settings.");
            Ok(ExitCode::Success)
        }

        Commands::Config => {
            println!("Current Configuration:");
            println!("{}", "=".repeat(50));
            let toml_str =
                toml::to_string_pretty(settings).context("failed to render settings as TOML")?;
            println!("{toml_str}");
            Ok(ExitCode::Success)
        }

        Commands::Search {
            text,
            chunks,
            limit,
            threshold,
            hybrid,
            no_metadata,
            filters,
            json,
        } => {
            let format = OutputFormat::from_json_flag(json);
            let started = Instant::now();

            let filters = parse_filter_expressions(&filters).map_err(|e| anyhow!(e))?;
            let mut builder = SearchQuery::builder(text)
                .limit(limit.unwrap_or(settings.search.default_limit))
                .similarity_threshold(threshold.unwrap_or(settings.search.default_threshold))
                .include_metadata(!no_metadata);
            if !filters.is_empty() {
                builder = builder.filters(filters);
            }

            let outcome: Result<Vec<SearchResult>, SearchError> = async {
                let query = builder.build()?;
                let engine = build_engine(settings, &chunks).await?;
                if hybrid {
                    engine.hybrid_search(&query).await
                } else {
                    engine.search(&query).await
                }
            }
            .await;

            Ok(match outcome {
                Ok(results) => print_results(&results, format, started),
                Err(error) => report_error(&error, format),
            })
        }

        Commands::Get { id, chunks, json } => {
            let format = OutputFormat::from_json_flag(json);
            let started = Instant::now();

            let outcome: Result<Option<SearchResult>, SearchError> = async {
                let engine = build_engine(settings, &chunks).await?;
                engine.get_chunk_by_id(&id).await
            }
            .await;

            Ok(match outcome {
                Ok(Some(result)) => print_results(std::slice::from_ref(&result), format, started),
                Ok(None) => {
                    if format.is_json() {
                        let response = JsonResponse::not_found("Chunk", &id);
                        println!("{}", serde_json::to_string_pretty(&response)?);
                    } else {
                        eprintln!("Chunk '{id}' not found");
                    }
                    ExitCode::NotFound
                }
                Err(error) => report_error(&error, format),
            })
        }

        Commands::Filter {
            chunks,
            conditions,
            limit,
            json,
        } => {
            let format = OutputFormat::from_json_flag(json);
            let started = Instant::now();
            let filters = parse_filter_expressions(&conditions).map_err(|e| anyhow!(e))?;

            let outcome: Result<Vec<SearchResult>, SearchError> = async {
                let engine = build_engine(settings, &chunks).await?;
                engine
                    .search_by_filters(&filters, limit.unwrap_or(settings.search.default_limit))
                    .await
            }
            .await;

            Ok(match outcome {
                Ok(results) => print_results(&results, format, started),
                Err(error) => report_error(&error, format),
            })
        }
    }
}

/// Load chunks, embed the ones without vectors and build the engine.
///
/// Model loading and document embedding run on the blocking pool.
async fn build_engine(settings: &Settings, chunks: &Path) -> Result<SearchEngine, SearchError> {
    let config = SearchConfig::from_settings(settings)?;
    let table_name = settings.search.table_name.clone();
    let embedding_config = settings.embedding.clone();
    let chunks = chunks.to_path_buf();

    let (provider, store, embedded) = tokio::task::spawn_blocking(move || {
        let store = MemoryVectorStore::load_json(&chunks)
            .map_err(|e| classify_store_error(e, &table_name))?;
        let provider = FastEmbedProvider::new(&embedding_config)?;
        let embedded = store
            .embed_missing(|texts| provider.embed_documents(texts))
            .map_err(|e| classify_provider_error(e, 0))?;
        Ok::<_, SearchError>((provider, store, embedded))
    })
    .await
    .map_err(|e| {
        SearchError::generic(
            codes::INITIALIZATION_ERROR,
            format!("chunk store setup task failed: {e}"),
            Severity::Critical,
            ErrorContext::new(),
        )
    })??;

    tracing::debug!(
        chunks = store.len(),
        embedded,
        model = provider.model_name(),
        "chunk store ready"
    );

    SearchEngine::new(Arc::new(provider), Arc::new(store), config)
}

fn print_results(results: &[SearchResult], format: OutputFormat, started: Instant) -> ExitCode {
    if format.is_json() {
        let elapsed_ms = u64::try_from(started.elapsed().as_millis()).ok();
        let response = JsonResponse::success(results).with_meta(ResponseMeta::new(elapsed_ms));
        match serde_json::to_string_pretty(&response) {
            Ok(text) => println!("{text}"),
            Err(e) => {
                eprintln!("Error: failed to serialize results: {e}");
                return ExitCode::GeneralError;
            }
        }
        return ExitCode::Success;
    }

    if results.is_empty() {
        println!("No matching chunks.");
        return ExitCode::Success;
    }

    for (rank, result) in results.iter().enumerate() {
        println!(
            "{}. {} {} p.{} {}",
            rank + 1,
            style(format!("[{:.3}]", result.similarity_score())).green(),
            style(result.filename()).cyan().bold(),
            result.page_number(),
            style(format!("({})", result.chunk_id())).dim(),
        );
        if let Some(section) = result.metadata().and_then(|m| m.section_name.as_deref()) {
            println!("   {}", style(section).italic());
        }
        println!("   {}", snippet(result.content(), 200));
    }

    ExitCode::Success
}

fn report_error(error: &SearchError, format: OutputFormat) -> ExitCode {
    let exit_code = ExitCode::from_error(error);

    if format.is_json() {
        match serde_json::to_string_pretty(&JsonResponse::from_error(error)) {
            Ok(text) => println!("{text}"),
            Err(_) => eprintln!("Error: {error}"),
        }
    } else {
        eprintln!("{} {error}", style("Error:").red().bold());
        for suggestion in error.recovery_suggestions() {
            eprintln!("  {} {suggestion}", style("hint:").yellow());
        }
    }

    exit_code
}

/// First `max_chars` characters on one line.
fn snippet(text: &str, max_chars: usize) -> String {
    let flat: String = text.split_whitespace().collect::<Vec<_>>().join(" ");
    if flat.chars().count() <= max_chars {
        flat
    } else {
        let cut: String = flat.chars().take(max_chars).collect();
        format!("{cut}...")
    }
}
