use crate::config::{AppConfig, LayerConfig};
use crate::description::parse_description;
use crate::geometry;
use crate::index::{province_record, DepartmentIndex, ProvinceIndex};
use crate::matcher::ProvinceCodeMap;
use crate::types::{BoundaryRow, PointRow, StatRecord};
use anyhow::{Context, Result};
use geo::Geometry;
use rayon::prelude::*;
use rusqlite::types::Value;
use rusqlite::{Connection, OpenFlags};
use std::path::Path;
use tracing::{debug, info, warn};

/// Everything read from the three GeoPackages, indices already built.
pub struct SourceData {
    pub provincias: ProvinceIndex,
    pub departamentos: DepartmentIndex,
    pub codes: ProvinceCodeMap,
    pub ign_provincias: Vec<BoundaryRow>,
    pub ign_departamentos: Vec<BoundaryRow>,
    pub puntos: Vec<PointRow>,
}

pub fn load_data(config: &AppConfig) -> Result<SourceData> {
    let processing = &config.processing;

    info!("Loading statistics from {:?}", config.input.tierras);
    let tierras = open(&config.input.tierras)?;
    let provincias = ProvinceIndex::build(load_province_stats(&tierras, &processing.province_table)?);
    let puntos = load_points(&tierras, &processing.department_layers)?;
    let departamentos = DepartmentIndex::build(puntos.iter().map(|p| p.record.clone()));
    info!(
        "Statistics: {} provincias, {} departamentos ({} distinct keys)",
        provincias.len(),
        departamentos.records().len(),
        departamentos.exact_len()
    );

    let ign_provs = open(&config.input.ign_provincias)?;
    let codes = load_province_code_map(&ign_provs, &processing.ign_province_table)?;
    let ign_provincias = load_boundaries(
        &ign_provs,
        &processing.ign_province_table,
        false,
        processing.simplify_tolerance,
    )?;

    let ign_deptos = open(&config.input.ign_departamentos)?;
    let ign_departamentos = load_boundaries(
        &ign_deptos,
        &processing.ign_department_table,
        true,
        processing.simplify_tolerance,
    )?;
    info!(
        "IGN: {} provincias, {} departamentos, {} province codes",
        ign_provincias.len(),
        ign_departamentos.len(),
        codes.len()
    );

    Ok(SourceData {
        provincias,
        departamentos,
        codes,
        ign_provincias,
        ign_departamentos,
        puntos,
    })
}

fn open(path: &Path) -> Result<Connection> {
    Connection::open_with_flags(path, OpenFlags::SQLITE_OPEN_READ_ONLY)
        .with_context(|| format!("Failed to open GeoPackage: {:?}", path))
}

fn quote_ident(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}

/// Text form of a column that may be stored as text or number.
fn value_to_string(value: Value) -> Option<String> {
    match value {
        Value::Null | Value::Blob(_) => None,
        Value::Integer(i) => Some(i.to_string()),
        Value::Real(f) => Some(f.to_string()),
        Value::Text(s) => Some(s),
    }
}

pub fn load_province_stats(conn: &Connection, table: &str) -> Result<Vec<StatRecord>> {
    let sql = format!("SELECT Name, Description FROM {}", quote_ident(table));
    let mut stmt = conn
        .prepare(&sql)
        .with_context(|| format!("Failed to query province table '{}'", table))?;
    let rows = stmt.query_map([], |row| {
        Ok((row.get::<_, Option<String>>(0)?, row.get::<_, Option<String>>(1)?))
    })?;

    let mut records = Vec::new();
    for row in rows {
        let (name, description) = row?;
        match province_record(name.as_deref(), description.as_deref().unwrap_or("")) {
            Some(record) => records.push(record),
            None => debug!("Province row without a usable name: {:?}", name),
        }
    }
    Ok(records)
}

pub fn load_points(conn: &Connection, layers: &[LayerConfig]) -> Result<Vec<PointRow>> {
    let mut raw = Vec::new();
    for layer in layers {
        let sql = format!(
            "SELECT fid, geom, Name, Description FROM {}",
            quote_ident(&layer.table)
        );
        let mut stmt = conn
            .prepare(&sql)
            .with_context(|| format!("Failed to query layer '{}'", layer.table))?;
        let rows = stmt.query_map([], |row| {
            Ok((
                row.get::<_, i64>(0)?,
                row.get::<_, Option<Vec<u8>>>(1)?,
                row.get::<_, Option<String>>(2)?,
                row.get::<_, Option<String>>(3)?,
            ))
        })?;
        for row in rows {
            let (fid, geom, name, description) = row?;
            raw.push((layer, fid, geom, name, description.unwrap_or_default()));
        }
    }

    let points = raw
        .into_par_iter()
        .map(|(layer, fid, geom, nombre, description)| {
            let record = StatRecord::new(
                nombre.clone().unwrap_or_default(),
                parse_description(&description),
            );
            if record.nivel != layer.nivel {
                debug!(
                    "'{}' is listed in '{}' but its percentage classifies as {}",
                    record.nombre_original,
                    layer.table,
                    record.nivel.as_str()
                );
            }
            PointRow {
                fid,
                nombre,
                tier: layer.nivel,
                record,
                geometry: decode_geometry(&layer.table, fid, geom.as_deref(), 0.0),
            }
        })
        .collect();
    Ok(points)
}

pub fn load_province_code_map(conn: &Connection, table: &str) -> Result<ProvinceCodeMap> {
    let sql = format!("SELECT in1, nam, fna FROM {}", quote_ident(table));
    let mut stmt = conn
        .prepare(&sql)
        .with_context(|| format!("Failed to query province codes from '{}'", table))?;
    let rows = stmt.query_map([], |row| {
        Ok((
            row.get::<_, Value>(0)?,
            row.get::<_, Option<String>>(1)?,
            row.get::<_, Option<String>>(2)?,
        ))
    })?;

    let mut codes = ProvinceCodeMap::new();
    for row in rows {
        let (in1, nam, fna) = row?;
        let Some(code) = value_to_string(in1) else {
            continue;
        };
        if let Some(name) = nam.filter(|n| !n.is_empty()).or(fna) {
            codes.insert(&code, name);
        }
    }
    Ok(codes)
}

/// Reads an IGN boundary table. Geometry is decoded and simplified in
/// parallel; rows whose geometry cannot be decoded keep `None`.
pub fn load_boundaries(
    conn: &Connection,
    table: &str,
    with_code: bool,
    tolerance: f64,
) -> Result<Vec<BoundaryRow>> {
    let code_column = if with_code { "in1" } else { "NULL" };
    let sql = format!(
        "SELECT fid, geom, nam, fna, {} FROM {}",
        code_column,
        quote_ident(table)
    );
    let mut stmt = conn
        .prepare(&sql)
        .with_context(|| format!("Failed to query boundary table '{}'", table))?;
    let rows = stmt.query_map([], |row| {
        Ok((
            row.get::<_, i64>(0)?,
            row.get::<_, Option<Vec<u8>>>(1)?,
            row.get::<_, Option<String>>(2)?,
            row.get::<_, Option<String>>(3)?,
            row.get::<_, Value>(4)?,
        ))
    })?;
    let raw = rows.collect::<rusqlite::Result<Vec<_>>>()?;

    let boundaries = raw
        .into_par_iter()
        .map(|(fid, geom, nam, fna, code)| BoundaryRow {
            fid,
            geometry: decode_geometry(table, fid, geom.as_deref(), tolerance),
            nam,
            fna,
            codigo: value_to_string(code),
        })
        .collect();
    Ok(boundaries)
}

fn decode_geometry(table: &str, fid: i64, blob: Option<&[u8]>, tolerance: f64) -> Option<Geometry<f64>> {
    let blob = blob?;
    match geometry::decode_simplified(blob, tolerance) {
        Ok(geometry) => Some(geometry),
        Err(e) => {
            warn!("Skipping {} fid {}: cannot decode geometry: {}", table, fid, e);
            None
        }
    }
}
