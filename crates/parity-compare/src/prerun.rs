use once_cell::sync::Lazy;
use regex::Regex;

struct Pattern {
    re: Regex,
    warning: &'static str,
}

fn pattern(re: &str, warning: &'static str) -> Pattern {
    Pattern {
        re: Regex::new(re).expect("valid pre-run pattern"),
        warning,
    }
}

static PATTERNS: Lazy<Vec<Pattern>> = Lazy::new(|| {
    vec![
        pattern(
            r"\braw_input\s*\(",
            "File uses raw_input(); execution may hang without stdin input.",
        ),
        pattern(
            r"\binput\s*\(",
            "File uses input(); execution may hang without stdin input.",
        ),
        pattern(
            r"\bsys\.stdin\.read",
            "File reads sys.stdin; execution may hang without stdin input.",
        ),
        pattern(
            r"\bimport\s+random\b|\bfrom\s+random\s+import\b",
            "File imports random; output may be non-deterministic.",
        ),
        pattern(
            r"\buuid\.uuid[14]\s*\(",
            "File generates UUIDs; output may be non-deterministic.",
        ),
        pattern(
            r"\bos\.urandom\s*\(",
            "File calls os.urandom(); output may be non-deterministic.",
        ),
        pattern(
            r"\bdatetime\.now\s*\(",
            "File calls datetime.now(); output may be non-deterministic.",
        ),
        pattern(
            r"\bdatetime\.utcnow\s*\(",
            "File calls datetime.utcnow(); output may be non-deterministic.",
        ),
        pattern(
            r"\btime\.time\s*\(",
            "File calls time.time(); output may be non-deterministic.",
        ),
        pattern(
            r"\btime\.clock\s*\(",
            "File calls time.clock(); output may be non-deterministic.",
        ),
        pattern(
            r"\bdate\.today\s*\(",
            "File calls date.today(); output may be non-deterministic.",
        ),
    ]
});

/// Static warnings for a source file, produced before anything runs.
pub fn scan_pre_run(source_text: &str) -> Vec<String> {
    PATTERNS
        .iter()
        .filter(|p| p.re.is_match(source_text))
        .map(|p| p.warning.to_string())
        .collect()
}
