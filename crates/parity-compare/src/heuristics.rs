//! Signatures of output differences that are cosmetic across runtime
//! versions rather than behavioral.

use once_cell::sync::Lazy;
use regex::Regex;

static MAPPING_REPR: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\{[^{}]*:[^{}]*\}").expect("valid mapping regex"));
static STRING_PREFIX: Lazy<Regex> =
    Lazy::new(|| Regex::new(r#"(?:^|[^A-Za-z0-9_])u['"]"#).expect("valid prefix regex"));
static TYPE_REPR: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"<(?:type|class)\s+'").expect("valid type regex"));
static LONG_SUFFIX: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\b\d+L\b").expect("valid long regex"));
static NUMBER: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\d+(?:\.\d+)?").expect("valid number regex"));

pub const MAPPING_ORDER_WARNING: &str = "Outputs contain mapping reprs; iteration order of unordered mappings differs between runtimes (arbitrary in the source runtime, insertion order in the target).";
pub const STRING_PREFIX_WARNING: &str = "String prefix difference detected (u'...' vs '...'); likely cosmetic, not a behavioral change.";
pub const TYPE_REPR_WARNING: &str = "Type representation difference detected (<type '...'> vs <class '...'>); cosmetic difference between runtimes.";
pub const LONG_SUFFIX_WARNING: &str = "Long integer suffix detected (123L vs 123); the target runtime has a single integer type.";
pub const DIVISION_WARNING: &str = "Possible division semantics difference: the source runtime floors '/' on integers while the target runtime performs true division.";

/// Changed lines of a unified diff, split by side. Everything before the
/// first hunk header is the file header and is skipped; inside hunks a line
/// such as `--- x` is a removed `-- x`.
pub(crate) struct ChangedLines<'a> {
    pub removed: Vec<&'a str>,
    pub added: Vec<&'a str>,
}

impl<'a> ChangedLines<'a> {
    pub fn from_diff(diff_lines: &'a [String]) -> Self {
        let mut removed = Vec::new();
        let mut added = Vec::new();
        let body = diff_lines.iter().skip_while(|l| !l.starts_with("@@ "));
        for line in body {
            if line.starts_with("@@ ") {
                continue;
            }
            if let Some(rest) = line.strip_prefix('-') {
                removed.push(rest);
            } else if let Some(rest) = line.strip_prefix('+') {
                added.push(rest);
            }
        }
        Self { removed, added }
    }

    fn any(&self, re: &Regex) -> bool {
        self.removed.iter().chain(&self.added).any(|l| re.is_match(l))
    }
}

pub(crate) fn false_positive_warnings(
    source_stdout: &str,
    target_stdout: &str,
    changed: &ChangedLines<'_>,
) -> Vec<String> {
    let mut warnings = Vec::new();

    if changed.any(&MAPPING_REPR)
        && MAPPING_REPR.is_match(source_stdout)
        && MAPPING_REPR.is_match(target_stdout)
    {
        warnings.push(MAPPING_ORDER_WARNING.to_string());
    }

    if changed.any(&STRING_PREFIX) {
        warnings.push(STRING_PREFIX_WARNING.to_string());
    }

    if changed.any(&TYPE_REPR) {
        warnings.push(TYPE_REPR_WARNING.to_string());
    }

    if changed.removed.iter().any(|l| LONG_SUFFIX.is_match(l)) {
        warnings.push(LONG_SUFFIX_WARNING.to_string());
    }

    let removed_has_int = changed
        .removed
        .iter()
        .any(|l| NUMBER.find_iter(l).any(|m| !m.as_str().contains('.')));
    let added_has_decimal = changed
        .added
        .iter()
        .any(|l| NUMBER.find_iter(l).any(|m| m.as_str().contains('.')));
    if removed_has_int && added_has_decimal {
        warnings.push(DIVISION_WARNING.to_string());
    }

    warnings
}

#[cfg(test)]
mod tests {
    use super::*;

    fn diff(removed: &[&str], added: &[&str]) -> Vec<String> {
        let mut out = vec!["--- source stdout".to_string(), "+++ target stdout".to_string()];
        out.push("@@ -1 +1 @@".to_string());
        out.extend(removed.iter().map(|l| format!("-{l}")));
        out.extend(added.iter().map(|l| format!("+{l}")));
        out
    }

    fn warnings_for(src: &str, dst: &str, removed: &[&str], added: &[&str]) -> Vec<String> {
        let lines = diff(removed, added);
        false_positive_warnings(src, dst, &ChangedLines::from_diff(&lines))
    }

    #[test]
    fn mapping_order_needs_mappings_on_both_sides() {
        let w = warnings_for(
            "{'b': 2, 'a': 1}\n",
            "{'a': 1, 'b': 2}\n",
            &["{'b': 2, 'a': 1}"],
            &["{'a': 1, 'b': 2}"],
        );
        assert_eq!(w, vec![MAPPING_ORDER_WARNING.to_string()]);

        let w = warnings_for("{'a': 1}\n", "crash\n", &["{'a': 1}"], &["crash"]);
        assert!(!w.contains(&MAPPING_ORDER_WARNING.to_string()));
    }

    #[test]
    fn string_prefix_is_a_standalone_token() {
        let w = warnings_for("[u'x']\n", "['x']\n", &["[u'x']"], &["['x']"]);
        assert!(w.contains(&STRING_PREFIX_WARNING.to_string()));

        let w = warnings_for("menu'\n", "menu\n", &["menu'"], &["menu"]);
        assert!(!w.contains(&STRING_PREFIX_WARNING.to_string()));
    }

    #[test]
    fn type_repr() {
        let w = warnings_for(
            "<type 'int'>\n",
            "<class 'int'>\n",
            &["<type 'int'>"],
            &["<class 'int'>"],
        );
        assert_eq!(w, vec![TYPE_REPR_WARNING.to_string()]);
    }

    #[test]
    fn long_suffix() {
        let w = warnings_for("10L\n", "10\n", &["10L"], &["10"]);
        assert_eq!(w, vec![LONG_SUFFIX_WARNING.to_string()]);
    }

    #[test]
    fn division_needs_ints_removed_and_decimals_added() {
        let w = warnings_for("5 / 2 = 2\n", "5 / 2 = 2.5\n", &["5 / 2 = 2"], &["5 / 2 = 2.5"]);
        assert_eq!(w, vec![DIVISION_WARNING.to_string()]);

        let w = warnings_for("2.5\n", "2\n", &["2.5"], &["2"]);
        assert!(w.is_empty());
    }

    #[test]
    fn removed_line_that_looks_like_a_header_is_kept() {
        let lines = crate::diff::unified_diff_lines("-- 5 / 2 = 2\n", "-- 5 / 2 = 2.5\n");
        assert_eq!(lines[3], "--- 5 / 2 = 2");

        let changed = ChangedLines::from_diff(&lines);
        assert_eq!(changed.removed, vec!["-- 5 / 2 = 2"]);
        assert_eq!(changed.added, vec!["-- 5 / 2 = 2.5"]);

        let w = false_positive_warnings("-- 5 / 2 = 2\n", "-- 5 / 2 = 2.5\n", &changed);
        assert_eq!(w, vec![DIVISION_WARNING.to_string()]);
    }

    #[test]
    fn headers_are_not_changed_lines() {
        let lines = diff(&[], &[]);
        let changed = ChangedLines::from_diff(&lines);
        assert!(changed.removed.is_empty());
        assert!(changed.added.is_empty());
    }
}
