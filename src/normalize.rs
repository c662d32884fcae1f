//! Place-name canonicalization.
//!
//! Names coming from the IGN tables and from the statistics descriptions
//! disagree on accents, case, punctuation and administrative prefixes.
//! Everything is folded to lowercase ASCII before any comparison.

use regex::Regex;
use std::sync::LazyLock;
use unicode_normalization::UnicodeNormalization;

/// Checked in order; the first one that matches is removed.
const PREFIXES: &[&str] = &[
    "provincia de ",
    "partido de ",
    "departamento de ",
    "departamento ",
];

static ANTARTIDA: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\bant\s*arg\b").expect("valid regex"));
static ATLANTICO_SUR: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\batl\s*sur\b").expect("valid regex"));

/// Lowercase ASCII, accents stripped, `.`/`,` turned into spaces, whitespace
/// collapsed and one leading administrative prefix removed.
pub fn normalize_name(name: &str) -> String {
    let ascii: String = name
        .nfkd()
        .filter(|c| c.is_ascii())
        .map(|c| match c {
            '.' | ',' => ' ',
            c => c.to_ascii_lowercase(),
        })
        .collect();
    let collapsed = ascii.split_whitespace().collect::<Vec<_>>().join(" ");
    strip_prefix(collapsed)
}

fn strip_prefix(name: String) -> String {
    // Repeated so that normalizing twice gives the same result, e.g.
    // "departamento departamento x".
    let mut name = name;
    while let Some(rest) = PREFIXES.iter().find_map(|p| name.strip_prefix(p)) {
        name = rest.to_string();
    }
    name
}

/// `normalize_name` plus the abbreviations seen in province names.
pub fn normalize_provincia(name: &str) -> String {
    let normalized = normalize_name(name);
    let normalized = ANTARTIDA.replace_all(&normalized, "antartida");
    let normalized = ATLANTICO_SUR.replace_all(&normalized, "atlantico sur");
    normalized
        .replace("atlsur", "atlantico sur")
        .replace("islas del ", "islas ")
}
