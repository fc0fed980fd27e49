// SPDX-License-Identifier: MPL-2.0
//! # pdscan
//!
//! Scans a Wikimedia Commons category for files whose licensing metadata
//! suggests they are in the public domain but which are not tagged with the
//! standard templates, and extracts the evidence into a spreadsheet for
//! manual review.
//!
//! ## Overview
//!
//! Given a target category (e.g. "Media from Delpher") and an exclusion
//! category (e.g. "Scans from the Internet Archive"), `pdscan`:
//!
//! 1. enumerates the member file pages through the MediaWiki search API,
//! 2. fetches each page's raw wikitext,
//! 3. extracts candidate copyright/license template invocations, both
//!    top-level ones and ones embedded in the `permission=`, `date=` and
//!    `publication date=` fields of metadata wrappers like `{{Information}}`,
//!    `{{Photograph}}`, `{{Artwork}}` or `{{Book}}`,
//! 4. normalizes the date field to a single simplified year (when a range or
//!    several dates are present, the most recent valid year wins, biasing
//!    towards "still in copyright"),
//! 5. filters out templates known to be irrelevant to copyright status, and
//! 6. writes one row per file to the console and to a CSV spreadsheet.
//!
//! The output is a review aid, not a legal determination: template names are
//! reported as observed, files with no retained templates are omitted, and a
//! missing date shows up as an explicit `Unknown`.
//!
//! ## Basic usage
//!
//! The crate ships a CLI binary:
//!
//! ```text
//! pdscan --category "Media from Delpher" \
//!        --exclude-category "Scans from the Internet Archive" \
//!        --limit 20
//! ```
//!
//! The extraction core is usable as a library without touching the network:
//!
//! ```rust
//! use pdscan::dates::YearPolicy;
//! use pdscan::extract::extract_page;
//! use pdscan::filter::ExclusionSet;
//!
//! let wikitext = "{{Information|date={{circa|1930}}|permission={{PD-old}}}}";
//! let extraction = extract_page(wikitext, &ExclusionSet::default(), YearPolicy::Latest);
//!
//! assert_eq!(extraction.templates.len(), 1);
//! assert_eq!(extraction.templates[0].name, "PD-old");
//! assert_eq!(extraction.year.unwrap().0, 1930);
//! ```
//!
//! Wikitext template syntax nests: an invocation may carry further
//! invocations in its argument values, across multiple lines. The scanner in
//! [`wikitext`] tracks nesting depth explicitly instead of pattern-matching,
//! so inner invocations are reported independently of outer ones and an outer
//! invocation is never truncated at the first `}}`.
//!
//! ## Talking to the live API
//!
//! [`commons::HttpApi`] implements the [`commons::WikiApi`] trait against
//! `https://commons.wikimedia.org/w/api.php`. It attaches the identifying
//! User-Agent required by the Wikimedia API etiquette, spaces out requests
//! through a shared throttle and retries transient failures with bounded
//! exponential backoff. The pipeline in [`pipeline`] only sees the trait, so
//! tests run against an in-memory fake.

/// MediaWiki API client: discovery, wikitext retrieval, retry and throttling.
pub mod commons;
/// Date-field normalization to a single simplified year.
pub mod dates;
/// Per-page template and date extraction.
pub mod extract;
/// The exclusion policy for copyright-irrelevant templates.
pub mod filter;
/// The batch run: per-file state pipeline and summary counters.
pub mod pipeline;
/// Spreadsheet and console output.
pub mod report;
/// The balanced `{{...}}` scanner.
pub mod wikitext;
