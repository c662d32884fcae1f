//! Parser for the `Description` column of the statistics tables.
//!
//! The column is a run of `key: value` chunks separated by `<br>` tags, with
//! keys written in several spellings.

use crate::types::{Description, FieldValue};
use regex::Regex;
use std::sync::LazyLock;

pub const PAIS: &str = "pais";
pub const PROVINCIA: &str = "provincia";
pub const TOTAL_HA: &str = "total_ha";
pub const EXTRANJERIZADA_HA: &str = "extranjerizada_ha";
pub const PORCENTAJE: &str = "porcentaje";

static BREAK: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)<br\s*/?>").expect("valid regex"));

/// Spelling variants seen in the source, already lowercased.
const KEY_SYNONYMS: &[(&str, &str)] = &[
    ("pais", PAIS),
    ("país", PAIS),
    ("provincia", PROVINCIA),
    ("povincia", PROVINCIA),
    ("total hectáreas", TOTAL_HA),
    ("total hectareas", TOTAL_HA),
    ("hectáreas extranjerizadas", EXTRANJERIZADA_HA),
    ("hectareas extranjerizadas", EXTRANJERIZADA_HA),
    ("porcentaje extranjerización", PORCENTAJE),
    ("porcentaje extranjerizacion", PORCENTAJE),
];

fn canonical_key(key: &str) -> String {
    KEY_SYNONYMS
        .iter()
        .find(|(variant, _)| *variant == key)
        .map(|(_, canonical)| canonical.to_string())
        .unwrap_or_else(|| key.replace(' ', "_"))
}

/// Parses a description blob. Never fails: chunks without a colon are
/// skipped and numbers that do not parse are kept as text.
pub fn parse_description(blob: &str) -> Description {
    parse_fields(blob).collect()
}

/// Canonical `(key, value)` pairs in the order they appear in the blob.
/// Repeated keys appear more than once.
pub fn parse_fields(blob: &str) -> impl Iterator<Item = (String, FieldValue)> + '_ {
    BREAK.split(blob).filter_map(|chunk| {
        let (key, value) = chunk.trim().split_once(':')?;
        let key = canonical_key(&key.trim().to_lowercase());
        let value = value.trim();
        let parsed = match key.as_str() {
            TOTAL_HA | EXTRANJERIZADA_HA => parse_hectares(value),
            PORCENTAJE => parse_percentage(value),
            _ => FieldValue::Text(value.to_string()),
        };
        Some((key, parsed))
    })
}

/// Thousands separators are commas: `"1,234.5"`.
fn parse_hectares(value: &str) -> FieldValue {
    value
        .replace(',', "")
        .parse::<f64>()
        .map(FieldValue::Float)
        .unwrap_or_else(|_| FieldValue::Text(value.to_string()))
}

fn parse_percentage(value: &str) -> FieldValue {
    if let Ok(i) = value.parse::<i64>() {
        return FieldValue::Int(i);
    }
    value
        .parse::<f64>()
        .map(FieldValue::Float)
        .unwrap_or_else(|_| FieldValue::Text(value.to_string()))
}
