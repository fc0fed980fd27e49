use compact_str::{CompactString, ToCompactString};
use percent_encoding::{utf8_percent_encode, NON_ALPHANUMERIC};

use crate::dates::{normalize_date, Year, YearPolicy};
use crate::filter::ExclusionSet;
use crate::wikitext::{scan_templates, RawTemplate};

/// Metadata wrappers whose `permission=`, `date=` and `publication date=`
/// fields may carry license templates and date expressions of their own.
const WRAPPER_TEMPLATES: &[&str] = &["information", "photograph", "artwork", "art photo", "book"];

/// Wrapper fields whose values are searched for embedded template
/// invocations.
const TEMPLATE_FIELDS: &[&str] = &["permission", "date", "publication date"];

/// Wrapper fields consulted for the publication year, in preference order.
const DATE_FIELDS: &[&str] = &["date", "publication date"];

/// Where a reported template invocation was found.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TemplateContext {
    /// Outside of any other invocation's argument list.
    TopLevel,
    /// Inside a named field of a metadata wrapper.
    WrapperField {
        wrapper: CompactString,
        field: CompactString,
    },
}

/// One candidate copyright/license template found on a file page.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TemplateUsage {
    /// Template name as written, whitespace-trimmed.
    pub name: CompactString,
    pub context: TemplateContext,
}

impl TemplateUsage {
    pub fn new(name: &str, context: TemplateContext) -> Self {
        Self {
            name: name.trim().to_compact_string(),
            context,
        }
    }

    /// Deterministic link to the template's documentation page.
    pub fn doc_url(&self) -> String {
        let underscored = self.name.replace(' ', "_");
        format!(
            "https://commons.wikimedia.org/wiki/Template:{}",
            utf8_percent_encode(&underscored, URL_PATH_ESCAPE)
        )
    }

    /// Display form, braces included, as it appears in the spreadsheet.
    pub fn display_name(&self) -> String {
        format!("{{{{{}}}}}", self.name)
    }
}

/// Characters escaped in page-title URLs. Mirrors `urllib.parse.quote`
/// defaults: unreserved characters and `/` stay literal.
const URL_PATH_ESCAPE: &percent_encoding::AsciiSet = &NON_ALPHANUMERIC
    .remove(b'/')
    .remove(b'_')
    .remove(b'-')
    .remove(b'.')
    .remove(b'~')
    .remove(b'(')
    .remove(b')')
    .remove(b',')
    .remove(b':');

/// Browsable URL of a file page, derived from its `File:...` title.
pub fn file_page_url(title: &str) -> String {
    let underscored = title.replace(' ', "_");
    format!(
        "https://commons.wikimedia.org/wiki/{}",
        utf8_percent_encode(&underscored, URL_PATH_ESCAPE)
    )
}

/// Everything extracted from one file page, after filtering.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PageExtraction {
    /// Retained template usages, deduplicated, in first-occurrence order.
    pub templates: Vec<TemplateUsage>,
    /// Simplified publication year, if any date field carried a recognized
    /// form. `None` means "Unknown" downstream, never a default year.
    pub year: Option<Year>,
}

impl PageExtraction {
    /// A page whose candidates were all excluded carries no copyright signal
    /// and is omitted from the output set entirely.
    pub fn is_empty(&self) -> bool {
        self.templates.is_empty()
    }
}

fn is_wrapper(name: &str) -> bool {
    WRAPPER_TEMPLATES
        .iter()
        .any(|wrapper| name.eq_ignore_ascii_case(wrapper))
}

/// Extracts candidate templates and a publication year from one page's raw
/// wikitext.
///
/// Candidates come from two places:
/// - top-level invocations (the metadata wrappers themselves are not
///   candidates, only containers)
/// - invocations embedded in the `permission=`, `date=` and
///   `publication date=` fields of a recognized wrapper, at any nesting depth
///
/// The publication year is taken from the first wrapper `date=` field that
/// yields a recognized form, falling back to `publication date=`. The
/// exclusion set is applied to the collected candidates before returning, so
/// the result is ready for emission.
pub fn extract_page(
    wikitext: &str,
    exclusions: &ExclusionSet,
    policy: YearPolicy,
) -> PageExtraction {
    let scanned = scan_templates(wikitext);
    let mut candidates: Vec<TemplateUsage> = Vec::new();

    for template in scanned.iter().filter(|t| t.depth == 0) {
        if is_wrapper(&template.name) {
            candidates.extend(wrapper_field_candidates(template));
        } else {
            candidates.push(TemplateUsage::new(&template.name, TemplateContext::TopLevel));
        }
    }

    let year = wrapper_year(&scanned, policy);

    PageExtraction {
        templates: exclusions.apply(candidates),
        year,
    }
}

/// Invocations embedded in the interesting fields of one wrapper block.
fn wrapper_field_candidates(wrapper: &RawTemplate) -> Vec<TemplateUsage> {
    let mut candidates = Vec::new();
    for field in TEMPLATE_FIELDS {
        let Some(value) = wrapper.named_arg(field) else {
            continue;
        };
        for embedded in scan_templates(value) {
            candidates.push(TemplateUsage::new(
                &embedded.name,
                TemplateContext::WrapperField {
                    wrapper: wrapper.name.to_compact_string(),
                    field: CompactString::new(*field),
                },
            ));
        }
    }
    candidates
}

/// Publication year from the date-like fields of the scanned wrappers.
fn wrapper_year(scanned: &[RawTemplate], policy: YearPolicy) -> Option<Year> {
    for field in DATE_FIELDS {
        for wrapper in scanned
            .iter()
            .filter(|t| t.depth == 0 && is_wrapper(&t.name))
        {
            if let Some(year) = wrapper
                .named_arg(field)
                .and_then(|value| normalize_date(value, policy))
            {
                return Some(year);
            }
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dates::Year;

    fn extract(wikitext: &str) -> PageExtraction {
        extract_page(wikitext, &ExclusionSet::default(), YearPolicy::default())
    }

    fn names(extraction: &PageExtraction) -> Vec<&str> {
        extraction
            .templates
            .iter()
            .map(|u| u.name.as_str())
            .collect()
    }

    const PAGE: &str = "\
== {{int:filedesc}} ==
{{Information
|description = {{nl|Portret van een onbekende man}}
|date = {{circa|1930}}
|source = [https://www.delpher.nl Delpher]
|author = unknown
|permission = {{PD-old-70}}
{{PD-scan|PD-old-70}}
}}

== {{int:license-header}} ==
{{PD-anon-70-EU}}
{{Media from Delpher|page=123}}
[[Category:Media from Delpher]]
";

    #[test]
    fn test_full_page_extraction() {
        let extraction = extract(PAGE);
        // {{int:...}} headers and {{circa}} are filtered, wrappers are not
        // candidates themselves
        assert_eq!(
            names(&extraction),
            vec!["PD-old-70", "PD-scan", "PD-anon-70-EU", "Media from Delpher"]
        );
        assert_eq!(extraction.year, Some(Year(1930)));
    }

    #[test]
    fn test_wrapper_itself_is_not_a_candidate() {
        let extraction = extract("{{Information|permission={{PD-old}}}}");
        assert_eq!(names(&extraction), vec!["PD-old"]);
    }

    #[test]
    fn test_embedded_context_recorded() {
        let extraction = extract("{{Information|permission={{PD-old}}}}");
        assert_eq!(
            extraction.templates[0].context,
            TemplateContext::WrapperField {
                wrapper: "Information".into(),
                field: "permission".into(),
            }
        );
    }

    #[test]
    fn test_date_field_year_and_embedded_template() {
        let extraction = extract("{{Photograph|date={{taken on|1918-12-21}}}}");
        assert_eq!(extraction.year, Some(Year(1918)));
        // {{taken on}} itself is excluded as a date helper
        assert!(extraction.is_empty());
    }

    #[test]
    fn test_publication_date_fallback() {
        let extraction = extract("{{Book|publication date=1935-06-01|author=X}}");
        assert_eq!(extraction.year, Some(Year(1935)));
    }

    #[test]
    fn test_date_field_preferred_over_publication_date() {
        let extraction =
            extract("{{Book|publication date=1950|date=1930}}");
        assert_eq!(extraction.year, Some(Year(1930)));
    }

    #[test]
    fn test_no_recognized_date_is_absent() {
        let extraction = extract("{{Information|date=unknown|permission={{PD-old}}}}");
        assert_eq!(extraction.year, None);
        assert_eq!(names(&extraction), vec!["PD-old"]);
    }

    #[test]
    fn test_all_templates_excluded_leaves_empty_page() {
        let extraction = extract("{{en|some caption}}\n{{DEFAULTSORT:Foo}}\n{{circa|1930}}");
        assert!(extraction.is_empty());
    }

    #[test]
    fn test_nested_permission_templates_reported_independently() {
        let extraction = extract("{{Artwork|permission={{PD-art|{{PD-old-100}}}}}}");
        assert_eq!(names(&extraction), vec!["PD-art", "PD-old-100"]);
    }

    #[test]
    fn test_doc_url_derivation() {
        let usage = TemplateUsage::new("PD-anon 70-EU", TemplateContext::TopLevel);
        assert_eq!(
            usage.doc_url(),
            "https://commons.wikimedia.org/wiki/Template:PD-anon_70-EU"
        );
        assert_eq!(usage.display_name(), "{{PD-anon 70-EU}}");
    }

    #[test]
    fn test_file_page_url() {
        assert_eq!(
            file_page_url("File:Portret van een man.jpg"),
            "https://commons.wikimedia.org/wiki/File:Portret_van_een_man.jpg"
        );
    }
}
