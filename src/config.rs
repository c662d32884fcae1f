use crate::types::Nivel;
use anyhow::{anyhow, Context, Result};
use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};

#[derive(Debug, Deserialize, Clone)]
pub struct AppConfig {
    pub input: InputConfig,
    #[serde(default)]
    pub processing: ProcessingConfig,
    pub output: OutputConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct InputConfig {
    pub tierras: PathBuf,           // statistics GeoPackage (points + province table)
    pub ign_provincias: PathBuf,    // IGN province polygons
    pub ign_departamentos: PathBuf, // IGN department polygons
}

#[derive(Debug, Deserialize, Clone)]
pub struct ProcessingConfig {
    /// Degrees. Simplification is Visvalingam-Whyatt, which thresholds on
    /// triangle area, so this value is squared into an area before use.
    #[serde(default = "default_simplify_tolerance")]
    pub simplify_tolerance: f64,
    #[serde(default = "default_province_table")]
    pub province_table: String,
    #[serde(default = "default_department_layers")]
    pub department_layers: Vec<LayerConfig>,
    #[serde(default = "default_ign_province_table")]
    pub ign_province_table: String,
    #[serde(default = "default_ign_department_table")]
    pub ign_department_table: String,
}

/// One tier table of the statistics source.
#[derive(Debug, Deserialize, Clone)]
pub struct LayerConfig {
    pub table: String,
    pub nivel: Nivel,
}

#[derive(Debug, Deserialize, Clone)]
pub struct OutputConfig {
    pub dir: PathBuf,
}

impl Default for ProcessingConfig {
    fn default() -> Self {
        Self {
            simplify_tolerance: default_simplify_tolerance(),
            province_table: default_province_table(),
            department_layers: default_department_layers(),
            ign_province_table: default_ign_province_table(),
            ign_department_table: default_ign_department_table(),
        }
    }
}

fn default_simplify_tolerance() -> f64 {
    0.005
}

fn default_province_table() -> String {
    "Provincias.xlsx".to_string()
}

fn default_department_layers() -> Vec<LayerConfig> {
    vec![
        LayerConfig {
            table: "Departamentos con alto nivel de extranjerización de tierras".to_string(),
            nivel: Nivel::Alto,
        },
        LayerConfig {
            table: "Departamentos por encima del promedio nacional".to_string(),
            nivel: Nivel::SobrePromedio,
        },
        LayerConfig {
            table: "Departamentos dentro del promedio nacional".to_string(),
            nivel: Nivel::Normal,
        },
    ]
}

fn default_ign_province_table() -> String {
    "ignprovincia".to_string()
}

fn default_ign_department_table() -> String {
    "igndepartamento".to_string()
}

impl AppConfig {
    pub fn load_from_file(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {:?}", path))?;
        Self::from_toml(&content)
    }

    pub fn from_toml(content: &str) -> Result<Self> {
        let config: AppConfig =
            toml::from_str(content).with_context(|| "Failed to parse TOML configuration")?;
        Ok(config)
    }

    /// Checks that every input exists before any source is opened.
    pub fn validate_inputs(&self) -> Result<()> {
        for path in [
            &self.input.tierras,
            &self.input.ign_provincias,
            &self.input.ign_departamentos,
        ] {
            if !path.is_file() {
                return Err(anyhow!("Input file not found: {:?}", path));
            }
        }
        if self.processing.simplify_tolerance < 0.0 {
            return Err(anyhow!(
                "simplify_tolerance must not be negative, got {}",
                self.processing.simplify_tolerance
            ));
        }
        Ok(())
    }
}
