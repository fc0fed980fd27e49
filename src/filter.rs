use std::sync::LazyLock;

use compact_str::CompactString;
use regex::Regex;
use rustc_hash::FxHashSet;

use crate::extract::TemplateUsage;

/// Templates that say nothing about copyright status: formatting helpers,
/// date/source wrappers, citation and provenance templates, museum catalogue
/// references. Collected from manual review of the target category; kept
/// lowercase.
const IRRELEVANT_TEMPLATES: &[&str] = &[
    "1937",
    "1937 03 17",
    "after",
    "anonymous",
    "author",
    "before",
    "between",
    "bijbelsche kunst",
    "bildindex",
    "boijmansonline",
    "booknavibar",
    "border is intentional",
    "chefs d'oeuvre de la collection d.g. van beuningen",
    "cite news",
    "circa",
    "collective work",
    "complex date",
    "creator",
    "crop for wikidata",
    "date",
    "dead link",
    "de collectie verrijkt",
    "de jérôme bosch à rembrandt, peintures et dessins du musée boymans de rotterdam",
    "de minimis",
    "deminimis",
    "delpher",
    "djvu",
    "daumier register",
    "dutch art 1450–1900",
    "extracted",
    "extracted from",
    "fop-pakistan",
    "fourcaud (1)",
    "fraenger",
    "friedländer",
    "haverman, hendrik johannes",
    "het wonder, miracula christi",
    "hieronymus bosch, the complete paintings and drawings",
    "hieronymus bosch, visions of genius",
    "honderd jaar museum boymans, rotterdam, meesterwerken uit de verzameling d.g. van beuningen",
    "image extracted",
    "imagenote",
    "imagenoteend",
    "insignia",
    "jeroen bosch, noord-nederlandsche primitieven",
    "jérôme bosch (fierens-vevaert)",
    "jheronimus bosch (1967)",
    "jheronimus bosch (2001)",
    "jheronimus bosch alle schilderijen en tekeningen",
    "kersttentoonstelling (1927-1928)",
    "kik-irpa",
    "kunstschatten uit nederlandse verzamelingen",
    "la collection goudstikker (june 1927)",
    "langswitch",
    "les primitifs flamands",
    "location",
    "marijnissen",
    "object location",
    "onze musici",
    "onze musici (1923)",
    "original",
    "original caption",
    "original description",
    "original description page",
    "other date",
    "otherdate",
    "otherversion",
    "other version",
    "p-page",
    "pd-algorithm",
    "provenanceevent",
    "retouched",
    "retouchedpicture",
    "retouched picture",
    "rijksmonument",
    "rkdimages",
    "see more images",
    "size",
    "superseded",
    "taken on",
    "technique",
    "tentoonstelling hieronymus bosch (1930)",
    "tentoonstelling van oude kunst door de vereeniging van handelaren in oude kunst in nederland",
    "tolnay",
    "transferred from",
    "ucfirst",
    "uncategorized",
    "uploaded from mobile",
    "uploaded with derivativefx",
    "user",
    "van eyck to bruegel, 1400-1550",
    "verzameling f. koenigs",
    "vlaamsche kunst",
    "wga",
];

// {{en}}, {{nl}} style language tags
static LANGUAGE_TAG: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[a-zA-Z]{2,3}$").expect("static regex"));
static DEFAULTSORT: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)^defaultsort[: ]").expect("static regex"));
// a family of Dutch parliament yearbook source templates
static ONZE_AFGEVAARDIGDEN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)^onze afgevaardigden").expect("static regex"));

/// Immutable set of template names that are never reported as copyright
/// evidence.
///
/// Constructed once per run (or per test) and passed into extraction
/// explicitly; applying it is a pure filter over the extracted usages and
/// never touches the wikitext itself.
#[derive(Debug, Clone)]
pub struct ExclusionSet {
    names: FxHashSet<CompactString>,
}

impl Default for ExclusionSet {
    /// The built-in list used for production runs.
    fn default() -> Self {
        Self::from_names(IRRELEVANT_TEMPLATES.iter().copied())
    }
}

impl ExclusionSet {
    /// Builds a set from explicit names; matching is case-insensitive.
    pub fn from_names<'a>(names: impl IntoIterator<Item = &'a str>) -> Self {
        let mut set = FxHashSet::default();
        for name in names {
            set.insert(CompactString::new(name.to_lowercase()));
        }
        Self { names: set }
    }

    /// Whether `name` is excluded from reporting.
    ///
    /// Beyond the static name list this drops:
    /// - namespace-style names containing a colon (`User:...`, `Creator:...`,
    ///   `ucfirst: ...`) which mark attribution or utility invocations
    /// - two/three-letter language tags (`{{en}}`, `{{nl}}`)
    /// - `DEFAULTSORT` sort-key directives
    /// - the `onze afgevaardigden` source-book family
    pub fn is_excluded(&self, name: &str) -> bool {
        let name = name.trim();
        name.contains(':')
            || LANGUAGE_TAG.is_match(name)
            || DEFAULTSORT.is_match(name)
            || ONZE_AFGEVAARDIGDEN.is_match(name)
            || self.names.contains(name.to_lowercase().as_str())
    }

    /// Filters and deduplicates extracted usages.
    ///
    /// Keeps first-occurrence order; duplicates are matched on the lowercased
    /// name. Idempotent: applying it to an already filtered list is a no-op.
    pub fn apply(&self, usages: Vec<TemplateUsage>) -> Vec<TemplateUsage> {
        let mut seen: FxHashSet<CompactString> = FxHashSet::default();
        usages
            .into_iter()
            .filter(|usage| {
                !self.is_excluded(&usage.name) && seen.insert(usage.name.to_lowercase())
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::extract::{TemplateContext, TemplateUsage};

    fn usage(name: &str) -> TemplateUsage {
        TemplateUsage::new(name, TemplateContext::TopLevel)
    }

    #[test]
    fn test_static_list_is_case_insensitive() {
        let set = ExclusionSet::default();
        assert!(set.is_excluded("Circa"));
        assert!(set.is_excluded("LangSwitch"));
        assert!(!set.is_excluded("PD-old-70"));
    }

    #[test]
    fn test_namespaced_names_excluded() {
        let set = ExclusionSet::default();
        assert!(set.is_excluded("User:Wdwdbot"));
        assert!(set.is_excluded("Creator:Hendrik Jan Bulthuis"));
        assert!(set.is_excluded("ucfirst: {{Anonymous}}"));
    }

    #[test]
    fn test_language_tags_excluded() {
        let set = ExclusionSet::default();
        assert!(set.is_excluded("en"));
        assert!(set.is_excluded("NL"));
        assert!(!set.is_excluded("PD-NL"));
    }

    #[test]
    fn test_defaultsort_and_onze_family_excluded() {
        let set = ExclusionSet::default();
        assert!(set.is_excluded("DEFAULTSORT:Bosch"));
        assert!(set.is_excluded("Onze afgevaardigden 1909"));
    }

    #[test]
    fn test_fixture_sets_substitute_the_builtin_list() {
        let set = ExclusionSet::from_names(["noise"]);
        assert!(set.is_excluded("Noise"));
        assert!(!set.is_excluded("circa"));
    }

    #[test]
    fn test_apply_preserves_order_and_dedups() {
        let set = ExclusionSet::default();
        let filtered = set.apply(vec![
            usage("PD-old"),
            usage("circa"),
            usage("Anonymous-EU"),
            usage("pd-old"),
        ]);
        let names: Vec<&str> = filtered.iter().map(|u| u.name.as_str()).collect();
        assert_eq!(names, vec!["PD-old", "Anonymous-EU"]);
    }

    #[test]
    fn test_apply_is_idempotent() {
        let set = ExclusionSet::default();
        let once = set.apply(vec![
            usage("PD-old"),
            usage("circa"),
            usage("en"),
            usage("Anonymous-EU"),
        ]);
        let twice = set.apply(once.clone());
        assert_eq!(once, twice);
    }
}
