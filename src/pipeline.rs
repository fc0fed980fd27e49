use rustc_hash::FxHashSet;

use crate::commons::{with_retry, ApiError, CategoryQuery, WikiApi};
use crate::dates::YearPolicy;
use crate::extract::{extract_page, file_page_url};
use crate::filter::ExclusionSet;
use crate::report::ReportRow;

/// Options for one batch run.
#[derive(Debug, Clone)]
pub struct RunOptions {
    pub query: CategoryQuery,
    /// Stop discovering/fetching after this many files (debug/test runs).
    pub cap: Option<usize>,
    pub policy: YearPolicy,
    /// When set, rows whose date resolved to "Unknown" are dropped too, not
    /// just rows without any retained template.
    pub drop_undated: bool,
}

/// Why a discovered file ended in the Skipped state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Skip {
    /// Page vanished between discovery and fetch.
    Missing,
    /// Fetch kept failing past the retry budget.
    FetchFailed,
    /// Nothing left after the exclusion policy.
    NoTemplates,
    /// `drop_undated` is set and no date resolved.
    NoDate,
}

/// Counters reported at the end of a run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RunSummary {
    pub discovered: usize,
    pub emitted: usize,
    pub skipped_missing: usize,
    pub skipped_fetch_failed: usize,
    pub skipped_no_templates: usize,
    pub skipped_no_date: usize,
}

impl RunSummary {
    fn record_skip(&mut self, skip: Skip) {
        match skip {
            Skip::Missing => self.skipped_missing += 1,
            Skip::FetchFailed => self.skipped_fetch_failed += 1,
            Skip::NoTemplates => self.skipped_no_templates += 1,
            Skip::NoDate => self.skipped_no_date += 1,
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    /// Discovery itself failed past the retry budget before finding anything;
    /// with no files enumerable there is no run to salvage.
    #[error("cannot enumerate category members: {0}")]
    Discovery(#[source] ApiError),
}

/// Enumerates the target category, deduplicated, capped.
///
/// Pagination across the search API is transparent: batches are requested
/// until the API stops returning a continuation offset or the cap is reached.
/// A cap stops issuing further requests promptly; titles already received are
/// kept. Transient failures on a continuation batch are retried and, if the
/// budget is exhausted mid-listing, the titles discovered so far are used
/// rather than failing the run.
pub async fn discover_files<A: WikiApi + ?Sized>(
    api: &A,
    query: &CategoryQuery,
    cap: Option<usize>,
) -> Result<Vec<String>, PipelineError> {
    let mut titles: Vec<String> = Vec::new();
    let mut seen: FxHashSet<String> = FxHashSet::default();
    let mut offset = 0usize;

    loop {
        let batch = match with_retry("search batch", || api.search_batch(query, offset)).await {
            Ok(batch) => batch,
            Err(error) if titles.is_empty() => return Err(PipelineError::Discovery(error)),
            Err(error) => {
                tracing::error!(%error, offset, "discovery aborted mid-listing, continuing with partial list");
                break;
            }
        };

        for title in batch.titles {
            if seen.insert(title.clone()) {
                titles.push(title);
            }
            if let Some(cap) = cap {
                if titles.len() >= cap {
                    tracing::info!(cap, "result cap reached, stopping discovery");
                    return Ok(titles);
                }
            }
        }

        match batch.next_offset {
            Some(next) => offset = next,
            None => break,
        }
    }

    Ok(titles)
}

/// Runs the whole per-file pipeline: Discovered → Fetched → Extracted →
/// Filtered → (Emitted | Skipped).
///
/// Sequential by design: the workload is a few thousand network round-trips
/// and the shared throttle in the API client is the actual bottleneck. Each
/// fetch is an independent awaitable with no cross-file state, so bounding
/// this loop with a worker pool later changes nothing in the contracts.
///
/// Every emitted row is also mirrored to stdout as it is produced. Per-file
/// failures skip-and-log; only total discovery failure aborts.
pub async fn run<A: WikiApi + ?Sized>(
    api: &A,
    options: &RunOptions,
    exclusions: &ExclusionSet,
) -> Result<(Vec<ReportRow>, RunSummary), PipelineError> {
    let titles = discover_files(api, &options.query, options.cap).await?;

    let mut summary = RunSummary {
        discovered: titles.len(),
        ..RunSummary::default()
    };
    let mut rows: Vec<ReportRow> = Vec::new();

    for title in &titles {
        match process_file(api, options, exclusions, title).await {
            Ok(row) => {
                println!("{}", row.console_line());
                rows.push(row);
                summary.emitted += 1;
            }
            Err(skip) => summary.record_skip(skip),
        }
    }

    tracing::info!(
        discovered = summary.discovered,
        emitted = summary.emitted,
        skipped_missing = summary.skipped_missing,
        skipped_fetch_failed = summary.skipped_fetch_failed,
        skipped_no_templates = summary.skipped_no_templates,
        skipped_no_date = summary.skipped_no_date,
        "run finished"
    );

    Ok((rows, summary))
}

/// One file through Fetched → Extracted → Filtered.
async fn process_file<A: WikiApi + ?Sized>(
    api: &A,
    options: &RunOptions,
    exclusions: &ExclusionSet,
    title: &str,
) -> Result<ReportRow, Skip> {
    let wikitext = match with_retry("fetch wikitext", || api.wikitext(title)).await {
        Ok(wikitext) => wikitext,
        Err(ApiError::NotFound(_)) => {
            // category membership raced with the fetch; tolerated
            tracing::warn!(title, "page gone since discovery, skipping");
            return Err(Skip::Missing);
        }
        Err(error) => {
            tracing::error!(title, %error, "fetch failed past retry budget, skipping");
            return Err(Skip::FetchFailed);
        }
    };

    let extraction = extract_page(&wikitext, exclusions, options.policy);
    if extraction.is_empty() {
        tracing::debug!(title, "no templates retained after filtering, omitting");
        return Err(Skip::NoTemplates);
    }
    if options.drop_undated && extraction.year.is_none() {
        tracing::debug!(title, "no resolvable date, omitting per configuration");
        return Err(Skip::NoDate);
    }

    Ok(ReportRow::new(file_page_url(title), &extraction))
}
