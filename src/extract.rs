//! Recovery of structured candidates from arbitrary model text.
//!
//! Providers wrap their JSON in markdown fences, preface it with prose,
//! truncate it mid-object, or skip the structure entirely. The extractor runs
//! an ordered chain of strategies until one yields a parseable array, with a
//! final repair pass for truncated arrays. It never errors: total failure is
//! an absent structure, which callers can tell apart from a genuine empty
//! array ("nothing found").

use once_cell::sync::Lazy;
use regex::Regex;
use tracing::debug;

use crate::annotate::types::RawCandidate;

/// Result of extraction: free-text rationale plus raw candidate objects.
#[derive(Debug, Default)]
pub struct Extraction {
    pub rationale: String,
    /// `Some` when a strategy parsed an array, which may legitimately be
    /// empty. `None` means no strategy recovered any structure at all.
    pub structured: Option<Vec<RawCandidate>>,
}

impl Extraction {
    /// Recovered candidates, empty when no structure was found.
    pub fn candidates(&self) -> &[RawCandidate] {
        self.structured.as_deref().unwrap_or(&[])
    }
}

/// Section markers that introduce the structured part of a response.
const SECTION_MARKERS: &[&str] = &["json output", "structured output", "json:"];

/// Separator line for "rationale --- output" layouts.
const SEPARATOR: &str = "---";

// =============================================================================
// Strategy chain
// =============================================================================

type Strategy = fn(&str) -> Option<Vec<RawCandidate>>;

/// Strategies in priority order. Adding, removing, or reordering one is a
/// data change, not a control-flow rewrite.
const STRATEGIES: &[(&str, Strategy)] = &[
    ("labeled_fence", from_labeled_fence),
    ("generic_fence", from_generic_fence),
    ("section_header", from_section_header),
    ("separator_tail", from_separator_tail),
    ("bracket_scan", from_bracket_scan),
    ("whole_text", from_whole_text),
    ("repair", from_repair),
];

/// Recover (rationale, candidates) from raw model text. Never errors.
pub fn extract(raw: &str) -> Extraction {
    let rationale = extract_rationale(raw);

    for &(name, strategy) in STRATEGIES {
        if let Some(candidates) = strategy(raw) {
            debug!(strategy = name, count = candidates.len(), "extraction succeeded");
            return Extraction {
                rationale,
                structured: Some(candidates),
            };
        }
    }

    debug!(len = raw.len(), "all extraction strategies failed");
    Extraction {
        rationale,
        structured: None,
    }
}

fn try_parse(s: &str) -> Option<Vec<RawCandidate>> {
    serde_json::from_str::<Vec<RawCandidate>>(s.trim()).ok()
}

// =============================================================================
// Individual strategies
// =============================================================================

/// Interior of a fenced block explicitly labeled as JSON.
fn from_labeled_fence(raw: &str) -> Option<Vec<RawCandidate>> {
    let interior = fence_interior(raw, true)?;
    try_parse(interior)
}

/// Interior of any fenced block.
fn from_generic_fence(raw: &str) -> Option<Vec<RawCandidate>> {
    let interior = fence_interior(raw, false)?;
    try_parse(interior)
}

/// Array following an explicit section marker like "JSON Output:".
fn from_section_header(raw: &str) -> Option<Vec<RawCandidate>> {
    let pos = SECTION_MARKERS
        .iter()
        .filter_map(|m| find_ci(raw, m).map(|p| p + m.len()))
        .min()?;
    let tail = &raw[pos..];
    let array = scan_array(tail)?;
    try_parse(array.complete?)
}

/// ASCII-case-insensitive substring search. Markers are ASCII, so a match
/// offset is always a char boundary in `haystack`.
fn find_ci(haystack: &str, needle: &str) -> Option<usize> {
    let h = haystack.as_bytes();
    let n = needle.as_bytes();
    if n.is_empty() || h.len() < n.len() {
        return None;
    }
    (0..=h.len() - n.len()).find(|&i| h[i..i + n.len()].eq_ignore_ascii_case(n))
}

/// Array in the final segment of a "rationale --- output" layout.
fn from_separator_tail(raw: &str) -> Option<Vec<RawCandidate>> {
    let tail_start = last_separator_end(raw)?;
    let array = scan_array(&raw[tail_start..])?;
    try_parse(array.complete?)
}

/// Depth-counted scan from the first opening bracket anywhere in the text.
fn from_bracket_scan(raw: &str) -> Option<Vec<RawCandidate>> {
    let array = scan_array(raw)?;
    try_parse(array.complete?)
}

/// Whole trimmed text as a last resort.
fn from_whole_text(raw: &str) -> Option<Vec<RawCandidate>> {
    try_parse(raw)
}

/// Truncation repair: close the array at the last object that completed at
/// depth 1 and synthesize the closing bracket.
///
/// Known trade-off: if the provider's output was merely slow rather than
/// truncated, a valid final object past the last complete one is dropped.
/// Not distinguishable from text alone.
fn from_repair(raw: &str) -> Option<Vec<RawCandidate>> {
    let scan = scan_array(raw)?;
    // Only reached when every complete-parse strategy failed, so the scan is
    // either unterminated or the substring is unparseable; repair from the
    // last known-good object boundary.
    let prefix = scan.repairable?;
    let repaired = format!("{prefix}]");
    try_parse(&repaired)
}

// =============================================================================
// Fences and separators
// =============================================================================

/// Interior of the first markdown fence. `labeled_only` requires a `json`
/// info string on the opening fence.
fn fence_interior(raw: &str, labeled_only: bool) -> Option<&str> {
    let mut search_from = 0;
    loop {
        let open = raw[search_from..].find("```")? + search_from;
        let after = &raw[open + 3..];
        let line_end = after.find('\n')?;
        let label = after[..line_end].trim();

        let matches = if labeled_only {
            label.eq_ignore_ascii_case("json")
        } else {
            true
        };

        if matches {
            let body = &after[line_end + 1..];
            let close = body.find("```")?;
            return Some(&body[..close]);
        }

        // Skip past this fence pair and keep looking.
        let body = &after[line_end + 1..];
        let close = body.find("```")?;
        search_from = open + 3 + line_end + 1 + close + 3;
    }
}

/// Byte offset just past the last line consisting solely of the separator.
fn last_separator_end(raw: &str) -> Option<usize> {
    let mut offset = 0;
    let mut found = None;
    for line in raw.split_inclusive('\n') {
        if line.trim() == SEPARATOR {
            found = Some(offset + line.len());
        }
        offset += line.len();
    }
    found
}

// =============================================================================
// Bracket-depth scanner
// =============================================================================

/// Outcome of scanning from the first `[`.
struct ArrayScan<'a> {
    /// The balanced `[...]` substring, if depth returned to zero.
    complete: Option<&'a str>,
    /// Prefix ending at the last `}` that closed an object at depth 1;
    /// appending `]` yields a candidate repaired array. Present only when at
    /// least one object completed.
    repairable: Option<&'a str>,
}

/// Scan from the first `[` with a depth counter that tracks quoted-string
/// state and escapes, so brackets inside string literals are not counted.
fn scan_array(raw: &str) -> Option<ArrayScan<'_>> {
    let start = raw.find('[')?;
    let bytes = raw.as_bytes();

    let mut depth = 0usize;
    let mut in_string = false;
    let mut escaped = false;
    let mut complete_end = None;
    let mut last_object_end = None;

    for i in start..bytes.len() {
        let b = bytes[i];

        if in_string {
            if escaped {
                escaped = false;
            } else if b == b'\\' {
                escaped = true;
            } else if b == b'"' {
                in_string = false;
            }
            continue;
        }

        match b {
            b'"' => in_string = true,
            b'[' | b'{' => depth += 1,
            b']' | b'}' => {
                depth = depth.saturating_sub(1);
                if b == b'}' && depth == 1 {
                    last_object_end = Some(i);
                }
                if depth == 0 {
                    complete_end = Some(i);
                    break;
                }
            }
            _ => {}
        }
    }

    Some(ArrayScan {
        complete: complete_end.map(|end| &raw[start..=end]),
        repairable: last_object_end.map(|end| &raw[start..=end]),
    })
}

// =============================================================================
// Rationale
// =============================================================================

/// A line that starts a new enumerated item ("3." / "4)"); group 1 is
/// whatever content follows the enumerator.
static ENUM_ITEM: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^\s*\d+[.)]\s*(.*)$").expect("static regex"));

/// Free text preceding the structured-output marker/fence, with any trailing
/// incomplete enumerated fragment stripped.
pub fn extract_rationale(raw: &str) -> String {
    let mut cut = raw.len();

    if let Some(p) = raw.find("```") {
        cut = cut.min(p);
    }
    for marker in SECTION_MARKERS {
        if let Some(p) = find_ci(raw, marker) {
            cut = cut.min(p);
        }
    }
    let mut offset = 0;
    for line in raw.split_inclusive('\n') {
        if line.trim() == SEPARATOR {
            cut = cut.min(offset);
            break;
        }
        offset += line.len();
    }
    if cut == raw.len() {
        // No marker at all; stop at the array itself if present.
        if let Some(p) = raw.find('[') {
            cut = p;
        }
    }

    let mut rationale = raw[..cut].trim().to_string();

    // Strip trailing lines that open an enumerated item without finishing it:
    // either a bare enumerator ("4.") or one whose content never reaches
    // sentence-final punctuation.
    while let Some(last_line) = rationale.lines().last() {
        let dangling = ENUM_ITEM.captures(last_line).is_some_and(|c| {
            let content = c[1].trim_end();
            content.is_empty() || !content.ends_with(['.', '!', '?', ':'])
        });
        if !dangling {
            break;
        }
        let without = rationale.len() - last_line.len();
        rationale.truncate(without);
        rationale = rationale.trim_end().to_string();
    }

    rationale
}

// =============================================================================
// TESTS
// =============================================================================
