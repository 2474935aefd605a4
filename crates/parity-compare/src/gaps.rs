//! Fingerprints, in target-runtime stderr, of names that only existed in the
//! source runtime.

use once_cell::sync::Lazy;
use regex::Regex;

/// A name removed from the target runtime, with its replacement when one
/// exists.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LegacyName {
    pub name: &'static str,
    pub replacement: Option<&'static str>,
}

const fn legacy(name: &'static str, replacement: Option<&'static str>) -> LegacyName {
    LegacyName { name, replacement }
}

pub const LEGACY_BUILTINS: &[LegacyName] = &[
    legacy("raw_input", Some("input")),
    legacy("xrange", Some("range")),
    legacy("basestring", Some("str")),
    legacy("unicode", Some("str")),
    legacy("unichr", Some("chr")),
    legacy("long", Some("int")),
    legacy("reduce", Some("functools.reduce")),
    legacy("reload", Some("importlib.reload")),
    legacy("execfile", None),
    legacy("cmp", None),
    legacy("file", Some("open")),
];

pub const LEGACY_MODULES: &[LegacyName] = &[
    legacy("cPickle", Some("pickle")),
    legacy("cStringIO", Some("io")),
    legacy("StringIO", Some("io")),
    legacy("ConfigParser", Some("configparser")),
    legacy("Queue", Some("queue")),
    legacy("HTMLParser", Some("html.parser")),
    legacy("urllib2", Some("urllib.request")),
    legacy("httplib", Some("http.client")),
    legacy("Tkinter", Some("tkinter")),
    legacy("__builtin__", Some("builtins")),
    legacy("commands", Some("subprocess")),
];

pub const LEGACY_METHODS: &[LegacyName] = &[
    legacy("has_key", Some("the `in` operator")),
    legacy("iteritems", Some("items()")),
    legacy("itervalues", Some("values()")),
    legacy("iterkeys", Some("keys()")),
];

static NAME_ERROR: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"NameError: (?:global )?name '([A-Za-z_][A-Za-z0-9_]*)' is not defined")
        .expect("valid NameError regex")
});
static IMPORT_ERROR: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?:ModuleNotFoundError|ImportError): No module named '?([A-Za-z_][A-Za-z0-9_.]*)")
        .expect("valid ImportError regex")
});
static ATTRIBUTE_ERROR: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"AttributeError: .*has no attribute '([A-Za-z_][A-Za-z0-9_]*)'")
        .expect("valid AttributeError regex")
});

fn lookup(table: &[LegacyName], name: &str) -> Option<LegacyName> {
    table.iter().copied().find(|l| l.name == name)
}

fn suggestion(l: &LegacyName) -> String {
    match l.replacement {
        Some(r) => format!("; use {r} instead"),
        None => "; it has no direct replacement".to_string(),
    }
}

/// Migration-gap warnings for `target_stderr`, one per distinct construct, in
/// order: builtins, then modules, then methods.
pub fn migration_gap_warnings(target_stderr: &str) -> Vec<String> {
    let mut warnings = Vec::new();
    let mut seen: Vec<&'static str> = Vec::new();

    for caps in NAME_ERROR.captures_iter(target_stderr) {
        let Some(l) = lookup(LEGACY_BUILTINS, &caps[1]) else {
            continue;
        };
        if !seen.contains(&l.name) {
            seen.push(l.name);
            warnings.push(format!(
                "Migration gap: NameError for '{}', a builtin removed from the target runtime{}.",
                l.name,
                suggestion(&l)
            ));
        }
    }

    for caps in IMPORT_ERROR.captures_iter(target_stderr) {
        let top = caps[1].split('.').next().unwrap_or_default();
        let Some(l) = lookup(LEGACY_MODULES, top) else {
            continue;
        };
        if !seen.contains(&l.name) {
            seen.push(l.name);
            warnings.push(format!(
                "Migration gap: import of '{}' failed; the module was renamed or removed in the target runtime{}.",
                l.name,
                suggestion(&l)
            ));
        }
    }

    for caps in ATTRIBUTE_ERROR.captures_iter(target_stderr) {
        let Some(l) = lookup(LEGACY_METHODS, &caps[1]) else {
            continue;
        };
        if !seen.contains(&l.name) {
            seen.push(l.name);
            warnings.push(format!(
                "Migration gap: method '{}' no longer exists in the target runtime{}.",
                l.name,
                suggestion(&l)
            ));
        }
    }

    warnings
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn name_error_on_legacy_builtin() {
        let stderr = "Traceback (most recent call last):\n  File \"main.py\", line 1, in <module>\n    name = raw_input()\nNameError: name 'raw_input' is not defined\n";
        let w = migration_gap_warnings(stderr);
        assert_eq!(w.len(), 1);
        assert!(w[0].contains("'raw_input'"), "{}", w[0]);
        assert!(w[0].contains("use input instead"), "{}", w[0]);
    }

    #[test]
    fn name_error_with_hint_suffix() {
        let w = migration_gap_warnings(
            "NameError: name 'xrange' is not defined. Did you mean: 'range'?\n",
        );
        assert_eq!(w.len(), 1);
        assert!(w[0].contains("'xrange'"));
    }

    #[test]
    fn unknown_names_are_ignored() {
        assert!(migration_gap_warnings("NameError: name 'frobnicate' is not defined\n").is_empty());
        assert!(migration_gap_warnings("ModuleNotFoundError: No module named 'numpy'\n").is_empty());
    }

    #[test]
    fn builtin_without_replacement() {
        let w = migration_gap_warnings("NameError: name 'execfile' is not defined\n");
        assert!(w[0].contains("no direct replacement"));
    }

    #[test]
    fn module_not_found_both_spellings() {
        let w = migration_gap_warnings("ModuleNotFoundError: No module named 'cPickle'\n");
        assert_eq!(w.len(), 1);
        assert!(w[0].contains("'cPickle'") && w[0].contains("use pickle instead"));

        let w = migration_gap_warnings("ImportError: No module named urllib2.request\n");
        assert_eq!(w.len(), 1);
        assert!(w[0].contains("urllib.request"));
    }

    #[test]
    fn removed_dict_methods() {
        let w = migration_gap_warnings("AttributeError: 'dict' object has no attribute 'iteritems'\n");
        assert_eq!(w.len(), 1);
        assert!(w[0].contains("items()"));
    }

    #[test]
    fn repeated_fingerprints_warn_once() {
        let stderr = "NameError: name 'unicode' is not defined\nNameError: name 'unicode' is not defined\n";
        assert_eq!(migration_gap_warnings(stderr).len(), 1);
    }
}
