//! Name-based reconciliation of IGN polygons against statistics records.
//!
//! Departments go through a fixed cascade of stages; the first stage that
//! yields a record wins. Every stage refuses to guess: more than one
//! candidate is the same as none.

use crate::index::{DepartmentIndex, ProvinceIndex};
use crate::normalize::{normalize_name, normalize_provincia};
use crate::tokenize::{nested, tokenize};
use crate::types::StatRecord;
use serde::Serialize;
use std::collections::HashMap;

/// Department names used by IGN for a province capital that the
/// statistics source lists under the city's name.
const CAPITAL_PLACEHOLDERS: &[&str] = &["capital", "la capital"];

const CAPITAL_NAME_BY_PROVINCIA: &[(&str, &str)] = &[
    ("misiones", "posadas"),
    ("catamarca", "san fernando del valle de catamarca"),
    ("tucuman", "san miguel de tucuman"),
    ("la pampa", "santa rosa"),
    ("la rioja", "la rioja"),
    ("corrientes", "corrientes"),
    ("santa fe", "santa fe"),
    ("cordoba", "cordoba"),
];

/// Two-digit province code -> province name, from the IGN province table.
#[derive(Debug, Default, Clone)]
pub struct ProvinceCodeMap {
    by_code: HashMap<String, String>,
}

impl ProvinceCodeMap {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, code: &str, name: String) {
        self.by_code.insert(pad_code(code), name);
    }

    /// Province of a department, from the first two characters of its code.
    pub fn resolve(&self, department_code: &str) -> Option<&str> {
        let code = department_code.trim();
        if code.is_empty() {
            return None;
        }
        let prefix: String = code.chars().take(2).collect();
        self.by_code.get(&pad_code(&prefix)).map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.by_code.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_code.is_empty()
    }
}

fn pad_code(code: &str) -> String {
    format!("{:0>2}", code.trim())
}

/// Which cascade stage produced a department match.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum MatchStage {
    ExactKey,
    UniqueName,
    TokenSet,
    Capital,
}

impl MatchStage {
    pub const ALL: [MatchStage; 4] = [
        MatchStage::ExactKey,
        MatchStage::UniqueName,
        MatchStage::TokenSet,
        MatchStage::Capital,
    ];
}

/// What the cascade knows about one department polygon.
#[derive(Debug, Clone)]
pub struct DepartmentQuery {
    pub name: String,
    /// Normalized parent province; empty when the code did not resolve.
    pub provincia: String,
}

impl DepartmentQuery {
    pub fn new(raw_name: &str, provincia: Option<&str>) -> Self {
        Self {
            name: normalize_name(raw_name),
            provincia: provincia.map(normalize_provincia).unwrap_or_default(),
        }
    }

    fn has_provincia(&self) -> bool {
        !self.provincia.is_empty()
    }
}

#[derive(Debug, Clone, Copy)]
pub struct DepartmentMatch<'a> {
    pub record: &'a StatRecord,
    pub stage: MatchStage,
}

type Stage = for<'a> fn(&'a DepartmentIndex, &DepartmentQuery) -> Option<&'a StatRecord>;

const CASCADE: [(MatchStage, Stage); 4] = [
    (MatchStage::ExactKey, exact_key_stage),
    (MatchStage::UniqueName, unique_name_stage),
    (MatchStage::TokenSet, token_set_stage),
    (MatchStage::Capital, capital_stage),
];

/// Runs the cascade and returns the first hit.
pub fn match_departamento<'a>(
    index: &'a DepartmentIndex,
    query: &DepartmentQuery,
) -> Option<DepartmentMatch<'a>> {
    CASCADE.iter().find_map(|(stage, run)| {
        run(index, query).map(|record| DepartmentMatch {
            record,
            stage: *stage,
        })
    })
}

fn exact_key_stage<'a>(index: &'a DepartmentIndex, query: &DepartmentQuery) -> Option<&'a StatRecord> {
    if !query.has_provincia() {
        return None;
    }
    index.exact(&query.provincia, &query.name)
}

fn unique_name_stage<'a>(
    index: &'a DepartmentIndex,
    query: &DepartmentQuery,
) -> Option<&'a StatRecord> {
    if query.has_provincia() {
        return None;
    }
    single(index.by_name(&query.name))
}

fn token_set_stage<'a>(index: &'a DepartmentIndex, query: &DepartmentQuery) -> Option<&'a StatRecord> {
    if !query.has_provincia() {
        return None;
    }
    let tokens = tokenize(&query.name);
    single(
        index
            .in_provincia(&query.provincia)
            .filter(|(candidate, _)| nested(candidate, &tokens))
            .map(|(_, record)| record),
    )
}

fn capital_stage<'a>(index: &'a DepartmentIndex, query: &DepartmentQuery) -> Option<&'a StatRecord> {
    if !query.has_provincia() || !CAPITAL_PLACEHOLDERS.contains(&query.name.as_str()) {
        return None;
    }
    let capital = capital_name(&query.provincia)?;
    index.exact(&query.provincia, capital)
}

pub fn capital_name(normalized_provincia: &str) -> Option<&'static str> {
    CAPITAL_NAME_BY_PROVINCIA
        .iter()
        .find(|(provincia, _)| *provincia == normalized_provincia)
        .map(|(_, capital)| *capital)
}

/// The only item, or `None` for zero or several.
fn single<'a>(mut candidates: impl Iterator<Item = &'a StatRecord>) -> Option<&'a StatRecord> {
    let first = candidates.next()?;
    match candidates.next() {
        None => Some(first),
        Some(_) => None,
    }
}

/// Province polygons match by normalized name only.
pub fn match_provincia<'a>(index: &'a ProvinceIndex, raw_name: &str) -> Option<&'a StatRecord> {
    let normalized = normalize_provincia(raw_name);
    if normalized.is_empty() {
        return None;
    }
    index.get(&normalized)
}
