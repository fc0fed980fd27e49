use std::sync::LazyLock;

use compact_str::{CompactString, ToCompactString};
use memchr::memmem;

/// A single `{{...}}` invocation found in a piece of wikitext.
///
/// The scanner reports *every* invocation, including ones nested inside the
/// argument values of other invocations. `depth` is 0 for an invocation that
/// is not enclosed by any other invocation in the scanned text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawTemplate {
    /// Template name as written, surrounding whitespace trimmed.
    ///
    /// Magic-word prefixes stay part of the name, e.g. `DEFAULTSORT:Foo` or
    /// `ucfirst: {{Anonymous}}`.
    pub name: CompactString,
    /// Raw argument strings, split on `|` at the invocation's own nesting
    /// level. Named arguments keep their `key=value` form.
    pub args: Vec<String>,
    /// Byte offset of the opening `{{` in the scanned text.
    pub start: usize,
    /// Byte offset one past the closing `}}`.
    pub end: usize,
    /// Number of enclosing invocations.
    pub depth: usize,
}

impl RawTemplate {
    /// Case-insensitive lookup of a named argument (`|key = value`).
    ///
    /// Field values in metadata wrappers regularly span multiple lines; the
    /// value is returned trimmed but otherwise raw, nested markup included.
    pub fn named_arg(&self, key: &str) -> Option<&str> {
        self.args.iter().find_map(|arg| {
            let (name, value) = split_once_top_level(arg, b'=')?;
            if name.trim().eq_ignore_ascii_case(key) {
                Some(value.trim())
            } else {
                None
            }
        })
    }

    /// First positional (unnamed) argument, if any.
    pub fn first_positional(&self) -> Option<&str> {
        self.args
            .iter()
            .map(String::as_str)
            .find(|arg| split_once_top_level(arg, b'=').is_none())
            .map(str::trim)
    }

    /// All positional (unnamed) arguments, in order.
    pub fn positional_args(&self) -> impl Iterator<Item = &str> {
        self.args
            .iter()
            .map(String::as_str)
            .filter(|arg| split_once_top_level(arg, b'=').is_none())
            .map(str::trim)
    }
}

static OPEN_FINDER: LazyLock<memmem::Finder> = LazyLock::new(|| memmem::Finder::new(b"{{"));

/// Scans `text` for balanced `{{...}}` invocations.
///
/// Uses an explicit stack of opening offsets, so an invocation that contains
/// further invocations in its argument values is never truncated at the first
/// `}}`: each inner invocation is reported independently and the outer one
/// closes at its own matching delimiter. Results are ordered by start offset.
///
/// Unterminated invocations (more `{{` than `}}`) are dropped with a warning;
/// stray `}}` without a matching opener are ignored. The input is never
/// modified and scanning never fails.
pub fn scan_templates(text: &str) -> Vec<RawTemplate> {
    let bytes = text.as_bytes();
    let mut stack: Vec<usize> = Vec::new();
    let mut found: Vec<RawTemplate> = Vec::new();

    let mut i = match OPEN_FINDER.find(bytes) {
        Some(first) => first,
        None => return found,
    };

    while i + 1 < bytes.len() {
        match (bytes[i], bytes[i + 1]) {
            (b'{', b'{') => {
                stack.push(i);
                i += 2;
            }
            (b'}', b'}') => {
                if let Some(start) = stack.pop() {
                    let end = i + 2;
                    if let Some(template) = parse_invocation(&text[start..end], start, stack.len())
                    {
                        found.push(template);
                    }
                }
                i += 2;
            }
            _ => i += 1,
        }
    }

    if !stack.is_empty() {
        tracing::warn!(
            unterminated = stack.len(),
            "dropping unterminated template invocations"
        );
    }

    found.sort_by_key(|t| t.start);
    found
}

/// Splits the interior of one balanced invocation into name and arguments.
///
/// `raw` includes the surrounding braces. Returns `None` for degenerate
/// invocations with an empty name (`{{}}`, `{{|x}}`).
fn parse_invocation(raw: &str, start: usize, depth: usize) -> Option<RawTemplate> {
    let interior = &raw[2..raw.len() - 2];

    let mut parts = split_top_level(interior, b'|');
    let name = parts.next().unwrap_or("").trim();
    if name.is_empty() {
        return None;
    }

    Some(RawTemplate {
        name: name.to_compact_string(),
        args: parts.map(|arg| arg.trim().to_owned()).collect(),
        start,
        end: start + raw.len(),
        depth,
    })
}

/// Iterator over segments of `text` separated by `delimiter`, where the
/// delimiter only counts at nesting depth 0 with respect to `{{ }}` and
/// `[[ ]]` pairs. A `|` inside a nested invocation or a wiki link belongs to
/// that construct, not to the segment boundary.
fn split_top_level(text: &str, delimiter: u8) -> impl Iterator<Item = &str> {
    let bytes = text.as_bytes();
    let mut boundaries = vec![0usize];
    let mut depth = 0usize;
    let mut i = 0;

    while i < bytes.len() {
        if i + 1 < bytes.len() {
            match (bytes[i], bytes[i + 1]) {
                (b'{', b'{') | (b'[', b'[') => {
                    depth += 1;
                    i += 2;
                    continue;
                }
                (b'}', b'}') | (b']', b']') => {
                    depth = depth.saturating_sub(1);
                    i += 2;
                    continue;
                }
                _ => {}
            }
        }
        if depth == 0 && bytes[i] == delimiter {
            boundaries.push(i);
        }
        i += 1;
    }

    boundaries.push(text.len());
    (0..boundaries.len() - 1).map(move |idx| {
        let from = if idx == 0 {
            boundaries[idx]
        } else {
            boundaries[idx] + 1
        };
        &text[from..boundaries[idx + 1]]
    })
}

/// Like `str::split_once` but the delimiter only counts at nesting depth 0.
fn split_once_top_level(text: &str, delimiter: u8) -> Option<(&str, &str)> {
    let bytes = text.as_bytes();
    let mut depth = 0usize;
    let mut i = 0;

    while i < bytes.len() {
        if i + 1 < bytes.len() {
            match (bytes[i], bytes[i + 1]) {
                (b'{', b'{') | (b'[', b'[') => {
                    depth += 1;
                    i += 2;
                    continue;
                }
                (b'}', b'}') | (b']', b']') => {
                    depth = depth.saturating_sub(1);
                    i += 2;
                    continue;
                }
                _ => {}
            }
        }
        if depth == 0 && bytes[i] == delimiter {
            return Some((&text[..i], &text[i + 1..]));
        }
        i += 1;
    }

    None
}

/// Replaces every scanned invocation in `text` with spaces, preserving byte
/// offsets, so literal date tokens can be matched without tripping over years
/// that are really template arguments.
pub fn blank_out_templates(text: &str) -> String {
    let mut blanked = text.as_bytes().to_vec();
    for template in scan_templates(text) {
        if template.depth == 0 {
            for byte in &mut blanked[template.start..template.end] {
                *byte = b' ';
            }
        }
    }
    // only ASCII spaces were written over existing char boundaries
    String::from_utf8(blanked).unwrap_or_default()
}
