//! Lookup structures over the statistics records.

use crate::description::{parse_description, parse_fields, PROVINCIA};
use crate::normalize::{normalize_name, normalize_provincia};
use crate::tokenize::{tokenize, TokenSet};
use crate::types::StatRecord;
use regex::Regex;
use std::collections::HashMap;
use std::sync::LazyLock;

/// Placeholder used in the province table when the name lives in the description.
const PLACEHOLDER_NAME: &str = "GP";

static LEADING_PROVINCE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?:Provincia de |^)([^<\n]+)").expect("valid regex"));

/// Builds the record for one row of the province table, or `None` when no
/// province name can be found.
///
/// Placeholder rows take the first field (in source order) whose key names
/// the province; an empty value there falls back to the leading text.
pub fn province_record(name: Option<&str>, description: &str) -> Option<StatRecord> {
    let prov_name = match name {
        Some(PLACEHOLDER_NAME) | None => parse_fields(description)
            .find(|(key, _)| key.contains(PROVINCIA) || key.as_str() == "nombre")
            .map(|(_, value)| value.to_string())
            .filter(|value| !value.is_empty())
            .or_else(|| {
                LEADING_PROVINCE
                    .captures(description)
                    .map(|caps| caps[1].trim().to_string())
            }),
        Some(name) => Some(name.to_string()),
    }?;
    if prov_name.is_empty() {
        return None;
    }
    Some(StatRecord::new(prov_name, parse_description(description)))
}

/// Province statistics keyed by normalized province name.
#[derive(Debug, Default)]
pub struct ProvinceIndex {
    by_name: HashMap<String, StatRecord>,
}

impl ProvinceIndex {
    pub fn build(records: impl IntoIterator<Item = StatRecord>) -> Self {
        let mut by_name = HashMap::new();
        for record in records {
            by_name.insert(normalize_provincia(&record.nombre_original), record);
        }
        Self { by_name }
    }

    pub fn get(&self, normalized: &str) -> Option<&StatRecord> {
        self.by_name.get(normalized)
    }

    pub fn len(&self) -> usize {
        self.by_name.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_name.is_empty()
    }
}

/// Department statistics with the three lookups used by the matcher.
#[derive(Debug, Default)]
pub struct DepartmentIndex {
    records: Vec<StatRecord>,
    /// `provincia|departamento` -> record; later rows overwrite earlier ones.
    exact: HashMap<String, usize>,
    /// Department name alone -> every record with that name, in source order.
    by_name: HashMap<String, Vec<usize>>,
    /// Province -> token sets of its departments, in source order.
    by_provincia: HashMap<String, Vec<(TokenSet, usize)>>,
}

pub fn exact_key(normalized_provincia: &str, normalized_name: &str) -> String {
    format!("{normalized_provincia}|{normalized_name}")
}

impl DepartmentIndex {
    pub fn build(records: impl IntoIterator<Item = StatRecord>) -> Self {
        let mut index = Self::default();
        for record in records {
            let id = index.records.len();
            let name = normalize_name(&record.nombre_original);
            let provincia = record.provincia().map(normalize_provincia).unwrap_or_default();

            if !provincia.is_empty() {
                index.exact.insert(exact_key(&provincia, &name), id);
                index
                    .by_provincia
                    .entry(provincia)
                    .or_default()
                    .push((tokenize(&name), id));
            }
            index.by_name.entry(name).or_default().push(id);
            index.records.push(record);
        }
        index
    }

    pub fn exact(&self, normalized_provincia: &str, normalized_name: &str) -> Option<&StatRecord> {
        self.exact
            .get(&exact_key(normalized_provincia, normalized_name))
            .map(|&id| &self.records[id])
    }

    pub fn by_name(&self, normalized_name: &str) -> impl Iterator<Item = &StatRecord> {
        self.by_name
            .get(normalized_name)
            .into_iter()
            .flatten()
            .map(move |&id| &self.records[id])
    }

    pub fn in_provincia(
        &self,
        normalized_provincia: &str,
    ) -> impl Iterator<Item = (&TokenSet, &StatRecord)> {
        self.by_provincia
            .get(normalized_provincia)
            .into_iter()
            .flatten()
            .map(move |(tokens, id)| (tokens, &self.records[*id]))
    }

    pub fn records(&self) -> &[StatRecord] {
        &self.records
    }

    /// Distinct exact keys; smaller than `records().len()` when keys collide.
    pub fn exact_len(&self) -> usize {
        self.exact.len()
    }
}
