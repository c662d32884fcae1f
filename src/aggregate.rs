//! Assembly of the output layers and the summary statistics.

use crate::data::SourceData;
use crate::index::{DepartmentIndex, ProvinceIndex};
use crate::matcher::{match_departamento, match_provincia, DepartmentQuery, MatchStage, ProvinceCodeMap};
use crate::output::Outputs;
use crate::types::{
    BoundaryRow, DepartamentoProperties, EnrichedFeature, FieldValue, Nivel, PointRow,
    ProvinciaProperties, PuntoProperties,
};
use anyhow::{anyhow, Result};
use geojson::{Feature, FeatureCollection, JsonObject};
use rayon::prelude::*;
use serde::Serialize;
use std::collections::HashMap;
use tracing::{debug, info};

/// Per-layer match bookkeeping, used for logging and the `report` command.
#[derive(Debug, Default, Clone, Serialize)]
pub struct MatchReport {
    pub total: usize,
    pub matched: usize,
    pub by_stage: HashMap<MatchStage, usize>,
    pub unmatched: Vec<String>,
}

impl MatchReport {
    fn record(&mut self, name: &str, stage: Option<MatchStage>) {
        self.total += 1;
        match stage {
            Some(stage) => {
                self.matched += 1;
                *self.by_stage.entry(stage).or_default() += 1;
            }
            None => self.unmatched.push(name.to_string()),
        }
    }
}

pub fn build_provincias(
    rows: &[BoundaryRow],
    index: &ProvinceIndex,
) -> (Vec<EnrichedFeature<ProvinciaProperties>>, MatchReport) {
    let mut report = MatchReport::default();
    let mut features = Vec::with_capacity(rows.len());

    for row in rows {
        let Some(geometry) = row.geometry.clone() else {
            continue;
        };
        let nombre = row.nombre().map(str::to_string);
        let stats = nombre.as_deref().and_then(|n| match_provincia(index, n));
        report.record(nombre.as_deref().unwrap_or_default(), stats.map(|_| MatchStage::ExactKey));

        features.push(EnrichedFeature {
            properties: ProvinciaProperties {
                fid: row.fid,
                nombre,
                nombre_completo: row.fna.clone(),
                total_ha: stats.and_then(|s| s.total_ha().cloned()),
                extranjerizada_ha: stats.and_then(|s| s.extranjerizada_ha().cloned()),
                porcentaje: stats.and_then(|s| s.porcentaje().cloned()),
                nivel: stats.map_or(Nivel::SinDatos, |s| s.nivel),
            },
            geometry,
        });
    }

    info!(
        "Found {} provincias, matched {} with statistics",
        features.len(),
        report.matched
    );
    (features, report)
}

pub fn build_departamentos(
    rows: &[BoundaryRow],
    index: &DepartmentIndex,
    codes: &ProvinceCodeMap,
) -> (Vec<EnrichedFeature<DepartamentoProperties>>, MatchReport) {
    // Indices are read-only here; par_iter keeps source order on collect.
    let matched: Vec<_> = rows
        .par_iter()
        .filter(|row| row.geometry.is_some())
        .map(|row| {
            let nombre = row.nombre().unwrap_or_default();
            let prov_name = row.codigo.as_deref().and_then(|c| codes.resolve(c));
            let hit = match_departamento(index, &DepartmentQuery::new(nombre, prov_name));
            (row, prov_name, hit)
        })
        .collect();

    let mut report = MatchReport::default();
    let mut features = Vec::with_capacity(matched.len());
    for (row, prov_name, hit) in matched {
        let Some(geometry) = row.geometry.clone() else {
            continue;
        };
        let nombre = row.nombre();
        report.record(nombre.unwrap_or_default(), hit.map(|h| h.stage));
        if let Some(h) = &hit {
            debug!(
                "{:?} matched '{}' via {:?}",
                nombre, h.record.nombre_original, h.stage
            );
        }
        let stats = hit.map(|h| h.record);

        features.push(EnrichedFeature {
            properties: DepartamentoProperties {
                fid: row.fid,
                nombre: nombre.map(str::to_string),
                nombre_completo: row.fna.clone(),
                codigo: row.codigo.clone(),
                provincia: stats
                    .and_then(|s| s.fields.get(crate::description::PROVINCIA))
                    .map(FieldValue::to_string)
                    .filter(|p| !p.is_empty())
                    .or_else(|| prov_name.map(str::to_string)),
                total_ha: stats.and_then(|s| s.total_ha().cloned()),
                extranjerizada_ha: stats.and_then(|s| s.extranjerizada_ha().cloned()),
                porcentaje: stats.and_then(|s| s.porcentaje().cloned()),
                nivel: stats.map_or(Nivel::SinDatos, |s| s.nivel),
            },
            geometry,
        });
    }

    info!(
        "Found {} departamentos, matched {} with statistics",
        features.len(),
        report.matched
    );
    (features, report)
}

pub fn build_puntos(points: &[PointRow]) -> Vec<EnrichedFeature<PuntoProperties>> {
    let features: Vec<_> = points
        .iter()
        .filter_map(|p| {
            let geometry = p.geometry.clone()?;
            Some(EnrichedFeature {
                properties: PuntoProperties {
                    fid: p.fid,
                    nombre: p.nombre.clone(),
                    provincia: p.record.provincia().map(str::to_string),
                    total_ha: p.record.total_ha().cloned(),
                    extranjerizada_ha: p.record.extranjerizada_ha().cloned(),
                    porcentaje: p.record.porcentaje().cloned(),
                    nivel: p.record.nivel,
                },
                geometry,
            })
        })
        .collect();
    info!("Found {} points", features.len());
    features
}

fn properties_object<P: Serialize>(properties: &P) -> Result<JsonObject> {
    match serde_json::to_value(properties)? {
        serde_json::Value::Object(map) => Ok(map),
        other => Err(anyhow!("Feature properties must serialize to an object, got {other}")),
    }
}

pub fn to_feature_collection<P: Serialize>(
    features: &[EnrichedFeature<P>],
) -> Result<FeatureCollection> {
    let features = features
        .iter()
        .map(|f| {
            Ok(Feature {
                bbox: None,
                geometry: Some(geojson::Geometry::new(geojson::Value::from(&f.geometry))),
                id: None,
                properties: Some(properties_object(&f.properties)?),
                foreign_members: None,
            })
        })
        .collect::<Result<Vec<_>>>()?;
    Ok(FeatureCollection {
        bbox: None,
        features,
        foreign_members: None,
    })
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Summary {
    pub total_departamentos: usize,
    pub total_departamentos_ign: usize,
    pub alto_nivel: usize,
    pub sobre_promedio: usize,
    pub normal: usize,
    pub total_provincias: usize,
}

#[derive(Debug, Clone, Serialize)]
pub struct Stats {
    pub provincias: Vec<JsonObject>,
    pub departamentos: Vec<JsonObject>,
    pub summary: Summary,
}

fn without_fid<P: Serialize>(properties: &P) -> Result<JsonObject> {
    let mut map = properties_object(properties)?;
    map.remove("fid");
    Ok(map)
}

fn sort_key(porcentaje: Option<&FieldValue>) -> f64 {
    porcentaje.and_then(FieldValue::as_f64).unwrap_or(0.0)
}

/// Builds `stats.json`. Department figures come from the point layer, which
/// carries every statistics row regardless of polygon matching.
pub fn generate_stats(
    provincias: &[EnrichedFeature<ProvinciaProperties>],
    departamentos_ign: usize,
    puntos: &[EnrichedFeature<PuntoProperties>],
) -> Result<Stats> {
    let provincias = provincias
        .iter()
        .filter(|f| f.properties.porcentaje.is_some())
        .map(|f| without_fid(&f.properties))
        .collect::<Result<Vec<_>>>()?;

    let mut depts: Vec<&PuntoProperties> = puntos.iter().map(|f| &f.properties).collect();
    depts.sort_by(|a, b| {
        sort_key(b.porcentaje.as_ref()).total_cmp(&sort_key(a.porcentaje.as_ref()))
    });

    let count = |nivel: Nivel| depts.iter().filter(|d| d.nivel == nivel).count();
    let summary = Summary {
        total_departamentos: depts.iter().filter(|d| d.nivel != Nivel::SinDatos).count(),
        total_departamentos_ign: departamentos_ign,
        alto_nivel: count(Nivel::Alto),
        sobre_promedio: count(Nivel::SobrePromedio),
        normal: count(Nivel::Normal),
        total_provincias: provincias.len(),
    };

    let departamentos = depts
        .into_iter()
        .map(without_fid)
        .collect::<Result<Vec<_>>>()?;

    Ok(Stats {
        provincias,
        departamentos,
        summary,
    })
}

/// Everything the `prepare` command writes, plus the match reports.
pub struct Assembled {
    pub outputs: Outputs,
    pub provincias: MatchReport,
    pub departamentos: MatchReport,
}

/// Matches every boundary feature and builds the four outputs. Source data
/// is only read.
pub fn assemble(source: &SourceData) -> Result<Assembled> {
    let (provincias, prov_report) = build_provincias(&source.ign_provincias, &source.provincias);
    let (departamentos, dept_report) =
        build_departamentos(&source.ign_departamentos, &source.departamentos, &source.codes);
    let puntos = build_puntos(&source.puntos);
    let stats = generate_stats(&provincias, departamentos.len(), &puntos)?;

    Ok(Assembled {
        outputs: Outputs {
            provincias: to_feature_collection(&provincias)?,
            departamentos: to_feature_collection(&departamentos)?,
            puntos: to_feature_collection(&puntos)?,
            stats,
        },
        provincias: prov_report,
        departamentos: dept_report,
    })
}
