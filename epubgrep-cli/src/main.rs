use std::num::NonZeroUsize;
use std::path::PathBuf;
use std::time::{Duration, Instant};

use anyhow::{bail, Context, Result};
use clap::{Args, Parser, Subcommand};
use serde::Serialize;
use tracing::debug;
use tracing_subscriber::EnvFilter;

use epubgrep::{
    default_thread_count, CancelToken, FileSearch, Metadata, MetadataExtractor, SearchConfig,
    SearchFilters, SearchQuery, SearchRequest, SearchResult,
};

#[derive(Parser)]
#[command(
    name = "epubgrep",
    version,
    about = "Search text content across epub archives",
    after_help = "Examples:\n  \
        epubgrep search -d ./books -p \"search term\"\n  \
        epubgrep search -d ./books -p \"patt.*rn\" --regex\n  \
        epubgrep search -d ./books -p text --author \"Author Name\" --extract-metadata\n  \
        epubgrep metadata -d ./books --pretty"
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Search for a text or regex pattern in every epub under a directory
    Search(Box<SearchArgs>),

    /// Extract metadata from every epub under a directory
    Metadata(MetadataArgs),
}

#[derive(Args)]
struct SearchArgs {
    /// Directory containing epub files
    #[arg(short = 'd', long)]
    directory: PathBuf,

    /// Search pattern (literal text unless --regex)
    #[arg(short = 'p', long)]
    pattern: String,

    /// Treat the pattern as a regular expression
    #[arg(long)]
    regex: bool,

    /// Case-insensitive search (text mode only)
    #[arg(short = 'i', long)]
    ignore_case: bool,

    /// Number of context lines around each match
    #[arg(short = 'c', long, default_value_t = 0)]
    context: usize,

    /// Maximum number of worker threads (defaults to the CPU count)
    #[arg(short = 't', long)]
    threads: Option<NonZeroUsize>,

    /// Extract and include metadata in results
    #[arg(long)]
    extract_metadata: bool,

    /// Filter by author (requires --extract-metadata)
    #[arg(long, value_name = "NAME")]
    author: Option<String>,

    /// Filter by series (requires --extract-metadata)
    #[arg(long, value_name = "NAME")]
    series: Option<String>,

    /// Filter by title (requires --extract-metadata)
    #[arg(long, value_name = "NAME")]
    title: Option<String>,

    /// Restrict the search to these exact epub paths
    #[arg(long, value_name = "PATH")]
    files_in: Vec<PathBuf>,

    /// Give up after this many seconds
    #[arg(long, value_name = "SECONDS")]
    timeout: Option<u64>,

    /// Pretty-print the JSON output
    #[arg(long)]
    pretty: bool,

    /// Logging level (disabled, error, warn, info, debug, trace)
    #[arg(long, default_value = "warn")]
    log_level: String,
}

#[derive(Args)]
struct MetadataArgs {
    /// Directory containing epub files
    #[arg(short = 'd', long)]
    directory: PathBuf,

    /// Maximum number of worker threads (defaults to the CPU count)
    #[arg(short = 't', long)]
    threads: Option<NonZeroUsize>,

    /// Give up after this many seconds
    #[arg(long, value_name = "SECONDS")]
    timeout: Option<u64>,

    /// Pretty-print the JSON output
    #[arg(long)]
    pretty: bool,

    /// Logging level (disabled, error, warn, info, debug, trace)
    #[arg(long, default_value = "warn")]
    log_level: String,
}

#[derive(Serialize)]
struct SearchReport {
    results: Vec<SearchResult>,
    summary: SearchSummary,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct SearchSummary {
    total_files: usize,
    total_matches: usize,
}

#[derive(Serialize)]
struct MetadataReport {
    results: Vec<MetadataEntry>,
    summary: MetadataSummary,
}

#[derive(Serialize)]
struct MetadataEntry {
    path: PathBuf,
    metadata: Metadata,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct MetadataSummary {
    total_files: usize,
}

fn main() {
    if let Err(err) = run() {
        eprintln!("Error: {err:#}");
        std::process::exit(1);
    }
}

fn run() -> Result<()> {
    let cli = Cli::parse();
    match cli.command {
        Commands::Search(args) => run_search(*args),
        Commands::Metadata(args) => run_metadata(args),
    }
}

fn run_search(args: SearchArgs) -> Result<()> {
    init_logging(&args.log_level);

    if (args.author.is_some() || args.series.is_some() || args.title.is_some())
        && !args.extract_metadata
    {
        bail!("metadata filters (--author, --series, --title) require --extract-metadata");
    }
    if !args.directory.exists() {
        bail!("directory does not exist: {}", args.directory.display());
    }

    let mut config = SearchConfig::new(&args.directory);
    if let Some(threads) = args.threads {
        config.thread_count = threads;
    }
    config.extract_metadata = args.extract_metadata;

    let query = if args.regex {
        SearchQuery::regex(&args.pattern)
    } else {
        SearchQuery::text(&args.pattern, args.ignore_case)
    };
    let request = SearchRequest {
        query,
        filters: build_filters(&args),
        context: args.context,
    };

    debug!(
        "searching '{}' for '{}' (regex: {}, metadata: {}, threads: {})",
        args.directory.display(),
        args.pattern,
        args.regex,
        args.extract_metadata,
        config.thread_count
    );
    let started = Instant::now();

    let token = cancel_token(args.timeout);
    let search = FileSearch::new(config);
    let mut results = Vec::new();
    let mut total_matches = 0usize;
    search
        .search(&token, &request, |result| {
            total_matches += result.matches.len();
            results.push(result);
            Ok(())
        })
        .context("search failed")?;

    debug!(
        "search completed in {:.2?} ({} files with matches, {} matches)",
        started.elapsed(),
        results.len(),
        total_matches
    );

    let report = SearchReport {
        summary: SearchSummary {
            total_files: results.len(),
            total_matches,
        },
        results,
    };
    print_json(&report, args.pretty)
}

fn run_metadata(args: MetadataArgs) -> Result<()> {
    init_logging(&args.log_level);

    if !args.directory.exists() {
        bail!("directory does not exist: {}", args.directory.display());
    }

    let extractor = MetadataExtractor::new(args.threads.unwrap_or_else(default_thread_count));
    let token = cancel_token(args.timeout);

    let mut results = Vec::new();
    extractor
        .process_directory(&token, &args.directory, |path, metadata| {
            results.push(MetadataEntry {
                path: path.to_path_buf(),
                metadata,
            });
            Ok(())
        })
        .context("metadata extraction failed")?;

    // worker completion order is not stable
    results.sort_by(|a, b| a.path.cmp(&b.path));

    let report = MetadataReport {
        summary: MetadataSummary {
            total_files: results.len(),
        },
        results,
    };
    print_json(&report, args.pretty)
}

fn build_filters(args: &SearchArgs) -> Option<SearchFilters> {
    if args.author.is_none()
        && args.series.is_none()
        && args.title.is_none()
        && args.files_in.is_empty()
    {
        return None;
    }
    Some(SearchFilters {
        author_equals: args.author.clone(),
        series_equals: args.series.clone(),
        title_equals: args.title.clone(),
        files_in: args.files_in.clone(),
    })
}

fn cancel_token(timeout: Option<u64>) -> CancelToken {
    match timeout {
        Some(seconds) => CancelToken::with_timeout(Duration::from_secs(seconds)),
        None => CancelToken::new(),
    }
}

/// Logs go to stderr so stdout stays parseable JSON.
fn init_logging(level: &str) {
    let level = if level.eq_ignore_ascii_case("disabled") {
        "off"
    } else {
        level
    };
    let filter = EnvFilter::try_new(level).unwrap_or_else(|_| {
        eprintln!("unrecognized log level '{level}', using 'warn'");
        EnvFilter::new("warn")
    });
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn print_json<T: Serialize>(report: &T, pretty: bool) -> Result<()> {
    let rendered = if pretty {
        serde_json::to_string_pretty(report)
    } else {
        serde_json::to_string(report)
    }
    .context("failed to render JSON output")?;
    println!("{rendered}");
    Ok(())
}
