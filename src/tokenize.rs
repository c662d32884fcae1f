use std::collections::{BTreeSet, HashMap, HashSet};
use std::sync::LazyLock;

/// Significant words of a department name.
pub type TokenSet = BTreeSet<String>;

static STOPWORDS: LazyLock<HashSet<&'static str>> = LazyLock::new(|| {
    [
        "de", "del", "la", "las", "el", "los", "y", "general", "coronel", "mayor", "presidente",
    ]
    .into_iter()
    .collect()
});

static REPLACEMENTS: LazyLock<HashMap<&'static str, &'static str>> = LazyLock::new(|| {
    HashMap::from([
        ("pte", "presidente"),
        ("presidencia", "presidente"),
        ("gonzales", "gonzalez"),
        ("gral", "general"),
    ])
});

static NUMBER_WORDS: LazyLock<HashMap<&'static str, &'static str>> =
    LazyLock::new(|| HashMap::from([("tres", "3"), ("nueve", "9"), ("veinticinco", "25")]));

/// Splits an already normalized name into its significant tokens.
///
/// Tokens starting with a fused `la` ("lapampa") also contribute the
/// remainder ("pampa"), in addition to the token itself.
pub fn tokenize(normalized: &str) -> TokenSet {
    let mut tokens = TokenSet::new();
    for raw in normalized.split_whitespace() {
        let token = REPLACEMENTS.get(raw).copied().unwrap_or(raw);
        let token = NUMBER_WORDS.get(token).copied().unwrap_or(token);

        if token.chars().count() == 1 && !token.chars().all(|c| c.is_ascii_digit()) {
            continue;
        }
        if STOPWORDS.contains(token) {
            continue;
        }
        tokens.insert(token.to_string());
        if let Some(rest) = token.strip_prefix("la") {
            if !rest.is_empty() {
                tokens.insert(rest.to_string());
            }
        }
    }
    tokens
}

/// True when either set contains the other.
pub fn nested(a: &TokenSet, b: &TokenSet) -> bool {
    a.is_subset(b) || b.is_subset(a)
}
