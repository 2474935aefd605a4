use std::ops::Range;
use std::time::Duration;

use similar::{ChangeTag, TextDiff};

pub const CONTEXT_LINES: usize = 3;
pub const SOURCE_HEADER: &str = "source stdout";
pub const TARGET_HEADER: &str = "target stdout";

// Past the deadline `similar` falls back to a coarser diff of the remainder
// instead of finishing the exact search.
const LINE_DIFF_DEADLINE: Duration = Duration::from_secs(2);
const SIMILARITY_DEADLINE: Duration = Duration::from_secs(1);

/// Line-oriented unified diff of `old` against `new`, one entry per output
/// line with trailing newlines stripped. Empty when the texts are equal.
pub fn unified_diff_lines(old: &str, new: &str) -> Vec<String> {
    if old == new {
        return Vec::new();
    }

    let diff = TextDiff::configure()
        .timeout(LINE_DIFF_DEADLINE)
        .diff_lines(old, new);
    let mut out = vec![
        format!("--- {SOURCE_HEADER}"),
        format!("+++ {TARGET_HEADER}"),
    ];

    for group in diff.grouped_ops(CONTEXT_LINES) {
        let (Some(first), Some(last)) = (group.first(), group.last()) else {
            continue;
        };
        let old_range = first.old_range().start..last.old_range().end;
        let new_range = first.new_range().start..last.new_range().end;
        out.push(format!(
            "@@ -{} +{} @@",
            hunk_range(&old_range),
            hunk_range(&new_range)
        ));

        for op in &group {
            for change in diff.iter_changes(op) {
                let sign = match change.tag() {
                    ChangeTag::Equal => ' ',
                    ChangeTag::Delete => '-',
                    ChangeTag::Insert => '+',
                };
                let value = change.value();
                let value = value.strip_suffix('\n').unwrap_or(value);
                out.push(format!("{sign}{value}"));
            }
        }
    }

    out
}

// `start,len` with a 1-based start; a single line omits the length and an
// empty range points at the line before it.
fn hunk_range(range: &Range<usize>) -> String {
    let len = range.end - range.start;
    match len {
        1 => format!("{}", range.start + 1),
        0 => format!("{},0", range.start),
        _ => format!("{},{}", range.start + 1, len),
    }
}

/// Character-level similarity `2*M/T` as a percentage with two decimals.
pub fn similarity_pct(old: &str, new: &str) -> f64 {
    if old == new {
        return 100.0;
    }
    let ratio = TextDiff::configure()
        .timeout(SIMILARITY_DEADLINE)
        .diff_chars(old, new)
        .ratio();
    round2(f64::from(ratio) * 100.0)
}

fn round2(v: f64) -> f64 {
    (v * 100.0).round() / 100.0
}
