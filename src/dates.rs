use std::fmt::{self, Display};
use std::sync::LazyLock;

use regex::Regex;

use crate::wikitext::{blank_out_templates, scan_templates, RawTemplate};

/// Simplified publication/creation date: a single year.
///
/// Commons date fields mix literal dates, approximate-date templates and
/// free-form prose; everything recognized is collapsed to one year. Absence of
/// a recognized form is represented by `Option::None` at the call sites, never
/// by a sentinel year.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Year(pub u16);

impl Display for Year {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// Years outside this range are treated as noise (page ids, catalogue
/// numbers), not as dates.
const YEAR_RANGE: std::ops::RangeInclusive<u16> = 1000..=2100;

/// How to collapse multiple candidate years into one.
///
/// `Latest` is the production default: when a date field carries a range or
/// several disjoint date expressions, the most recent valid year wins, biasing
/// towards the work still being in copyright. `Earliest` exists so the bias is
/// a visible, swappable decision rather than a hard-coded one.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, clap::ValueEnum)]
pub enum YearPolicy {
    #[default]
    Latest,
    Earliest,
}

impl YearPolicy {
    fn resolve(self, years: impl IntoIterator<Item = u16>) -> Option<Year> {
        let years = years.into_iter().filter(|year| YEAR_RANGE.contains(year));
        match self {
            YearPolicy::Latest => years.max().map(Year),
            YearPolicy::Earliest => years.min().map(Year),
        }
    }
}

static LITERAL_YEAR: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(\d{4})").expect("static regex"));

/// Extracts at most one simplified year from the raw text of a date-like
/// field.
///
/// Recognized forms:
/// - bare four-digit years, `YYYY-MM`, `YYYY-MM-DD` and compact `YYYYMMDD`
///   literals (only the year survives)
/// - `{{circa|1930}}`, `{{taken on|1918-12-21}}`
/// - `{{other date|between|1890|1900}}` and similar two-bound forms
/// - `{{other date|decade|1930}}` resolved to the decade's final year,
///   `{{other date|century|19}}` resolved to the century's final year
/// - `{{complex date|...|century|19}}`
/// - `{{ucfirst: ...}}` wrappers are transparent (the scanner reports the
///   inner invocation on its own)
///
/// `{{other date|?}}` and unrecognized text yield `None`. Deterministic: the
/// same input and policy always produce the same result.
pub fn normalize_date(text: &str, policy: YearPolicy) -> Option<Year> {
    let mut candidates: Vec<u16> = Vec::new();

    for template in scan_templates(text) {
        candidates.extend(template_years(&template));
    }

    // literal tokens, with template spans blanked out so a template argument
    // is not double-counted as free text
    let blanked = blank_out_templates(text);
    for capture in LITERAL_YEAR.captures_iter(&blanked) {
        if let Ok(year) = capture[1].parse::<u16>() {
            candidates.push(year);
        }
    }

    policy.resolve(candidates)
}

/// Candidate years carried by one date-related template invocation.
fn template_years(template: &RawTemplate) -> Vec<u16> {
    let name = template.name.to_ascii_lowercase();
    match name.as_str() {
        "circa" | "ca" => positional_years(template),
        "taken on" => positional_years(template),
        "other date" | "otherdate" => other_date_years(template),
        "complex date" => complex_date_years(template),
        "date" => positional_years(template),
        _ => Vec::new(),
    }
}

/// All plausible year tokens among an invocation's positional arguments.
fn positional_years(template: &RawTemplate) -> Vec<u16> {
    template
        .positional_args()
        .flat_map(|arg| {
            LITERAL_YEAR
                .captures_iter(arg)
                .filter_map(|capture| capture[1].parse::<u16>().ok())
                .collect::<Vec<_>>()
        })
        .collect()
}

/// `{{other date|<qualifier>|...}}`: the qualifier decides how the remaining
/// arguments are read.
fn other_date_years(template: &RawTemplate) -> Vec<u16> {
    let mut positional = template.positional_args();
    let qualifier = match positional.next() {
        Some(qualifier) => qualifier.to_ascii_lowercase(),
        None => return Vec::new(),
    };

    match qualifier.as_str() {
        // explicitly unknown
        "?" => Vec::new(),
        "decade" => positional
            .filter_map(parse_year_token)
            .map(|year| year.saturating_add(9))
            .collect(),
        "century" => positional
            .filter_map(|arg| arg.trim().parse::<u16>().ok())
            .map(|century| century.saturating_mul(100))
            .collect(),
        // between, from-until, or, ca, circa, before, after, spring, ...:
        // every year among the remaining arguments is a candidate and the
        // policy picks the bound
        _ => positional.filter_map(parse_year_token).collect(),
    }
}

/// `{{complex date|...}}`: only the century form carries a usable bound; the
/// other variants repeat plain year arguments which `positional_years` covers.
fn complex_date_years(template: &RawTemplate) -> Vec<u16> {
    let positional: Vec<&str> = template.positional_args().collect();
    if let Some(idx) = positional
        .iter()
        .position(|arg| arg.eq_ignore_ascii_case("century"))
    {
        if let Some(century) = positional.get(idx + 1).and_then(|arg| arg.parse::<u16>().ok()) {
            return vec![century.saturating_mul(100)];
        }
    }
    positional.iter().filter_map(|arg| parse_year_token(arg)).collect()
}

/// Leading four-digit year of a token like `1918`, `1918-12-21` or `19181221`.
fn parse_year_token(token: &str) -> Option<u16> {
    let capture = LITERAL_YEAR.captures(token.trim())?;
    capture[1].parse::<u16>().ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn latest(text: &str) -> Option<Year> {
        normalize_date(text, YearPolicy::Latest)
    }

    #[test]
    fn test_bare_year() {
        assert_eq!(latest("1930"), Some(Year(1930)));
    }

    #[test]
    fn test_year_month_day_literal() {
        assert_eq!(latest("1935-06-01"), Some(Year(1935)));
        assert_eq!(latest("1935-06"), Some(Year(1935)));
    }

    #[test]
    fn test_compact_numeric_date() {
        assert_eq!(latest("19350601"), Some(Year(1935)));
    }

    #[test]
    fn test_circa() {
        assert_eq!(latest("{{circa|1930}}"), Some(Year(1930)));
    }

    #[test]
    fn test_taken_on() {
        assert_eq!(latest("{{taken on|1918-12-21}}"), Some(Year(1918)));
    }

    #[test]
    fn test_other_date_between_resolves_to_later_bound() {
        assert_eq!(latest("{{other date|between|1890|1900}}"), Some(Year(1900)));
    }

    #[test]
    fn test_other_date_circa() {
        assert_eq!(latest("{{other date|ca|1925}}"), Some(Year(1925)));
    }

    #[test]
    fn test_other_date_decade() {
        assert_eq!(latest("{{other date|decade|1930}}"), Some(Year(1939)));
    }

    #[test]
    fn test_other_date_century() {
        assert_eq!(latest("{{other date|century|19}}"), Some(Year(1900)));
    }

    #[test]
    fn test_complex_date_century() {
        assert_eq!(
            latest("{{complex date|century|19|adj1=early}}"),
            Some(Year(1900))
        );
    }

    #[test]
    fn test_other_date_question_mark_is_unknown() {
        assert_eq!(latest("{{other date|?}}"), None);
    }

    #[test]
    fn test_unrecognized_text_is_absent() {
        assert_eq!(latest("unknown"), None);
        assert_eq!(latest(""), None);
        assert_eq!(latest("sometime before the war"), None);
    }

    #[test]
    fn test_ucfirst_wrapper_is_transparent() {
        assert_eq!(latest("{{ucfirst: {{circa|1930}}}}"), Some(Year(1930)));
    }

    #[test]
    fn test_latest_wins_across_disjoint_expressions() {
        assert_eq!(latest("1890; reprinted {{circa|1930}}"), Some(Year(1930)));
    }

    #[test]
    fn test_earliest_policy() {
        assert_eq!(
            normalize_date("{{other date|between|1890|1900}}", YearPolicy::Earliest),
            Some(Year(1890))
        );
    }

    #[test]
    fn test_out_of_range_tokens_ignored() {
        assert_eq!(latest("catalogue no. 0042"), None);
        assert_eq!(latest("scan 9999"), None);
    }

    #[test]
    fn test_deterministic() {
        let input = "{{other date|between|1890|1900}} and 1895";
        assert_eq!(latest(input), latest(input));
        assert_eq!(latest(input), Some(Year(1900)));
    }
}
