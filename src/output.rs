use crate::aggregate::Stats;
use anyhow::{Context, Result};
use geojson::FeatureCollection;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::info;

pub const PROVINCIAS_FILE: &str = "provincias.geojson";
pub const DEPARTAMENTOS_FILE: &str = "departamentos.geojson";
pub const PUNTOS_FILE: &str = "puntos.geojson";
pub const STATS_FILE: &str = "stats.json";

pub struct Outputs {
    pub provincias: FeatureCollection,
    pub departamentos: FeatureCollection,
    pub puntos: FeatureCollection,
    pub stats: Stats,
}

/// Serializes everything first, then writes each file through a temporary
/// sibling and a rename, so a failed run leaves earlier outputs intact.
pub fn write_outputs(dir: &Path, outputs: &Outputs) -> Result<()> {
    let rendered = [
        (PROVINCIAS_FILE, serde_json::to_string(&outputs.provincias)?),
        (DEPARTAMENTOS_FILE, serde_json::to_string(&outputs.departamentos)?),
        (PUNTOS_FILE, serde_json::to_string(&outputs.puntos)?),
        (STATS_FILE, serde_json::to_string_pretty(&outputs.stats)?),
    ];

    fs::create_dir_all(dir).with_context(|| format!("Failed to create output directory: {:?}", dir))?;

    let mut staged: Vec<(PathBuf, PathBuf)> = Vec::with_capacity(rendered.len());
    for (name, content) in &rendered {
        let target = dir.join(name);
        let tmp = dir.join(format!(".{}.tmp", name));
        if let Err(e) = fs::write(&tmp, content) {
            for (tmp, _) in &staged {
                let _ = fs::remove_file(tmp);
            }
            return Err(e).with_context(|| format!("Failed to write {:?}", tmp));
        }
        staged.push((tmp, target));
    }

    for (tmp, target) in &staged {
        fs::rename(tmp, target).with_context(|| format!("Failed to replace {:?}", target))?;
    }

    info!(
        "Wrote {} ({} features), {} ({} features), {} ({} features), {}",
        PROVINCIAS_FILE,
        outputs.provincias.features.len(),
        DEPARTAMENTOS_FILE,
        outputs.departamentos.features.len(),
        PUNTOS_FILE,
        outputs.puntos.features.len(),
        STATS_FILE
    );
    Ok(())
}
