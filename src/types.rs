use geo::Geometry;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// A value pulled out of a description blob. Numeric fields that fail to
/// parse keep their original text.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum FieldValue {
    Int(i64),
    Float(f64),
    Text(String),
}

impl FieldValue {
    /// Numeric view; unparsed text counts as no number.
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            FieldValue::Int(i) => Some(*i as f64),
            FieldValue::Float(f) => Some(*f),
            FieldValue::Text(_) => None,
        }
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            FieldValue::Text(s) => Some(s),
            _ => None,
        }
    }
}

impl std::fmt::Display for FieldValue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            FieldValue::Int(i) => write!(f, "{i}"),
            FieldValue::Float(x) => write!(f, "{x}"),
            FieldValue::Text(s) => f.write_str(s),
        }
    }
}

/// Canonical field name -> value.
pub type Description = BTreeMap<String, FieldValue>;

/// Severity band derived from the foreignization percentage.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Nivel {
    Alto,
    SobrePromedio,
    Normal,
    SinDatos,
}

impl Nivel {
    pub fn as_str(&self) -> &'static str {
        match self {
            Nivel::Alto => "alto",
            Nivel::SobrePromedio => "sobre_promedio",
            Nivel::Normal => "normal",
            Nivel::SinDatos => "sin_datos",
        }
    }
}

/// One statistical observation from the statistics source.
#[derive(Debug, Clone, PartialEq)]
pub struct StatRecord {
    pub nombre_original: String,
    pub fields: Description,
    pub nivel: Nivel,
}

impl StatRecord {
    pub fn new(nombre_original: String, fields: Description) -> Self {
        let nivel = crate::classify::classify_value(fields.get(crate::description::PORCENTAJE));
        Self {
            nombre_original,
            fields,
            nivel,
        }
    }

    pub fn provincia(&self) -> Option<&str> {
        self.fields
            .get(crate::description::PROVINCIA)
            .and_then(FieldValue::as_text)
    }

    pub fn porcentaje(&self) -> Option<&FieldValue> {
        self.fields.get(crate::description::PORCENTAJE)
    }

    pub fn total_ha(&self) -> Option<&FieldValue> {
        self.fields.get(crate::description::TOTAL_HA)
    }

    pub fn extranjerizada_ha(&self) -> Option<&FieldValue> {
        self.fields.get(crate::description::EXTRANJERIZADA_HA)
    }
}

/// A polygon row from an IGN boundary table.
#[derive(Debug, Clone)]
pub struct BoundaryRow {
    pub fid: i64,
    pub nam: Option<String>,
    pub fna: Option<String>,
    /// Administrative code; only present for departments.
    pub codigo: Option<String>,
    pub geometry: Option<Geometry<f64>>,
}

impl BoundaryRow {
    /// Short name, falling back to the formal one.
    pub fn nombre(&self) -> Option<&str> {
        self.nam
            .as_deref()
            .filter(|s| !s.is_empty())
            .or(self.fna.as_deref())
    }
}

/// A row of one of the statistics tier tables.
#[derive(Debug, Clone)]
pub struct PointRow {
    pub fid: i64,
    /// `None` when the `Name` column is NULL.
    pub nombre: Option<String>,
    pub tier: Nivel,
    pub record: StatRecord,
    pub geometry: Option<Geometry<f64>>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ProvinciaProperties {
    pub fid: i64,
    pub nombre: Option<String>,
    pub nombre_completo: Option<String>,
    pub total_ha: Option<FieldValue>,
    pub extranjerizada_ha: Option<FieldValue>,
    pub porcentaje: Option<FieldValue>,
    pub nivel: Nivel,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DepartamentoProperties {
    pub fid: i64,
    pub nombre: Option<String>,
    pub nombre_completo: Option<String>,
    pub codigo: Option<String>,
    pub provincia: Option<String>,
    pub total_ha: Option<FieldValue>,
    pub extranjerizada_ha: Option<FieldValue>,
    pub porcentaje: Option<FieldValue>,
    pub nivel: Nivel,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PuntoProperties {
    pub fid: i64,
    pub nombre: Option<String>,
    pub provincia: Option<String>,
    pub total_ha: Option<FieldValue>,
    pub extranjerizada_ha: Option<FieldValue>,
    pub porcentaje: Option<FieldValue>,
    pub nivel: Nivel,
}

/// Output feature: geometry plus merged attributes.
#[derive(Debug, Clone)]
pub struct EnrichedFeature<P> {
    pub properties: P,
    pub geometry: Geometry<f64>,
}
