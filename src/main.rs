use std::path::PathBuf;
use std::time::Duration;

use anyhow::Context;
use clap::Parser;
use tracing_subscriber::EnvFilter;

use pdscan::commons::{CategoryQuery, HttpApi};
use pdscan::dates::YearPolicy;
use pdscan::filter::ExclusionSet;
use pdscan::pipeline::{self, RunOptions};
use pdscan::report;

/// Scan a Commons category for copyright/PD-like template usage and write a
/// review spreadsheet.
#[derive(Debug, clap::Parser)]
#[command(name = "pdscan", version)]
struct CommandLine {
    /// Category whose file pages are scanned.
    #[arg(long, default_value = "Media from Delpher")]
    category: String,

    /// Category whose members are excluded from the scan.
    #[arg(long, default_value = "Scans from the Internet Archive")]
    exclude_category: String,

    /// Process at most this many files (for test/debug runs).
    #[arg(long)]
    limit: Option<usize>,

    /// Output CSV path. Defaults to
    /// `<Category>-Extracted_copyright_templates-<ddmmyyyy>.csv`.
    #[arg(long)]
    output: Option<PathBuf>,

    /// Identifying User-Agent sent with every API request, as required by the
    /// Wikimedia API etiquette.
    #[arg(long, default_value = "pdscan/0.1 (https://github.com/Schuwi/pdscan)")]
    user_agent: String,

    /// MediaWiki API endpoint.
    #[arg(long, default_value = "https://commons.wikimedia.org/w/api.php")]
    api_url: String,

    /// Minimum spacing between outbound API requests, in milliseconds.
    #[arg(long, default_value_t = 250)]
    request_spacing_ms: u64,

    /// How a date field with several candidate years collapses to one.
    #[arg(long, value_enum, default_value = "latest")]
    year_policy: YearPolicy,

    /// Also drop rows whose date resolved to "Unknown" (default keeps them).
    #[arg(long)]
    drop_undated: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .with_writer(std::io::stderr)
        .init();

    let args = CommandLine::parse();

    let api = HttpApi::new(
        &args.api_url,
        &args.user_agent,
        Duration::from_millis(args.request_spacing_ms),
    )
    .context("setting up API client")?;

    let options = RunOptions {
        query: CategoryQuery::new(&args.category, &args.exclude_category),
        cap: args.limit,
        policy: args.year_policy,
        drop_undated: args.drop_undated,
    };

    tracing::info!(
        category = %args.category,
        exclude = %args.exclude_category,
        limit = ?args.limit,
        "starting scan"
    );

    let (rows, summary) = pipeline::run(&api, &options, &ExclusionSet::default()).await?;

    if rows.is_empty() {
        println!("No valid files processed.");
        return Ok(());
    }

    let output = args
        .output
        .unwrap_or_else(|| PathBuf::from(report::default_output_name(&args.category)));
    report::write_csv_file(&output, &rows)
        .with_context(|| format!("writing results to {}", output.display()))?;

    println!(
        "Results written to {} ({} rows, {} files discovered)",
        output.display(),
        summary.emitted,
        summary.discovered
    );

    Ok(())
}
