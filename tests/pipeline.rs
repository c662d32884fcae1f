use rusqlite::{params, Connection};
use std::path::{Path, PathBuf};
use tempfile::TempDir;
use tierras_map::aggregate::assemble;
use tierras_map::config::AppConfig;
use tierras_map::data::load_data;
use tierras_map::matcher::MatchStage;
use tierras_map::output::{write_outputs, DEPARTAMENTOS_FILE, PROVINCIAS_FILE, PUNTOS_FILE, STATS_FILE};

const ALTO: &str = "Departamentos con alto nivel de extranjerización de tierras";
const SOBRE: &str = "Departamentos por encima del promedio nacional";
const NORMAL: &str = "Departamentos dentro del promedio nacional";

fn wkb_point(x: f64, y: f64) -> Vec<u8> {
    let mut out = vec![1u8];
    out.extend_from_slice(&1u32.to_le_bytes());
    out.extend_from_slice(&x.to_le_bytes());
    out.extend_from_slice(&y.to_le_bytes());
    out
}

fn wkb_square(x: f64, y: f64) -> Vec<u8> {
    let ring = [(x, y), (x + 1.0, y), (x + 1.0, y + 1.0), (x, y + 1.0), (x, y)];
    let mut out = vec![1u8];
    out.extend_from_slice(&3u32.to_le_bytes());
    out.extend_from_slice(&1u32.to_le_bytes());
    out.extend_from_slice(&(ring.len() as u32).to_le_bytes());
    for (x, y) in ring {
        out.extend_from_slice(&x.to_le_bytes());
        out.extend_from_slice(&y.to_le_bytes());
    }
    out
}

/// GeoPackage binary with an XY envelope (indicator 1, 32 bytes).
fn gpkg(wkb: Vec<u8>) -> Vec<u8> {
    let mut out = vec![b'G', b'P', 0, (1 << 1) | 1];
    out.extend_from_slice(&4326u32.to_le_bytes());
    out.extend_from_slice(&[0u8; 32]);
    out.extend(wkb);
    out
}

fn write_tierras(path: &Path) {
    let conn = Connection::open(path).unwrap();
    conn.execute_batch(&format!(
        r#"
        CREATE TABLE "Provincias.xlsx" (fid INTEGER PRIMARY KEY, Name TEXT, Description TEXT);
        CREATE TABLE "{ALTO}" (fid INTEGER PRIMARY KEY, geom BLOB, Name TEXT, Description TEXT);
        CREATE TABLE "{SOBRE}" (fid INTEGER PRIMARY KEY, geom BLOB, Name TEXT, Description TEXT);
        CREATE TABLE "{NORMAL}" (fid INTEGER PRIMARY KEY, geom BLOB, Name TEXT, Description TEXT);
        "#
    ))
    .unwrap();

    conn.execute(
        r#"INSERT INTO "Provincias.xlsx" (Name, Description) VALUES (?1, ?2), (?3, ?4)"#,
        params![
            "Córdoba",
            "País: Argentina<br>Porcentaje Extranjerización: 4",
            "GP",
            "Provincia: Chaco<br>Porcentaje Extranjerización: 12",
        ],
    )
    .unwrap();

    let insert = |table: &str, fid: i64, name: &str, description: &str, geom: Vec<u8>| {
        conn.execute(
            &format!(r#"INSERT INTO "{table}" (fid, geom, Name, Description) VALUES (?1, ?2, ?3, ?4)"#),
            params![fid, geom, name, description],
        )
        .unwrap();
    };
    insert(
        ALTO,
        1,
        "Gral. Güemes",
        "Provincia: Chaco<br>Total Hectáreas: 1,000<br>Hectáreas Extranjerizadas: 250<br>Porcentaje Extranjerización: 25",
        gpkg(wkb_point(-60.0, -26.0)),
    );
    insert(
        SOBRE,
        1,
        "Río Cuarto",
        "Provincia: Córdoba<br>Porcentaje Extranjerización: 7.5",
        gpkg(wkb_point(-64.3, -33.1)),
    );
    insert(
        NORMAL,
        1,
        "Córdoba",
        "Provincia: Córdoba<br>Porcentaje Extranjerización: 2",
        gpkg(wkb_point(-64.2, -31.4)),
    );
    insert(NORMAL, 2, "Iruya", "Porcentaje Extranjerización: 1", wkb_point(-65.2, -22.8));
}

fn write_ign_provincias(path: &Path) {
    let conn = Connection::open(path).unwrap();
    conn.execute_batch(
        "CREATE TABLE ignprovincia (fid INTEGER PRIMARY KEY, geom BLOB, fna TEXT, nam TEXT, in1 TEXT);",
    )
    .unwrap();
    let rows: [(i64, Option<Vec<u8>>, &str, &str, &str); 4] = [
        (1, Some(gpkg(wkb_square(-65.0, -33.0))), "Provincia de Córdoba", "Córdoba", "14"),
        (2, Some(gpkg(wkb_square(-61.0, -26.0))), "Provincia del Chaco", "Chaco", "22"),
        (3, Some(gpkg(wkb_square(-65.0, -24.0))), "Provincia de Salta", "Salta", "66"),
        (4, Some(vec![b'G', b'P', 0]), "Provincia de Jujuy", "Jujuy", "38"),
    ];
    for (fid, geom, fna, nam, in1) in rows {
        conn.execute(
            "INSERT INTO ignprovincia (fid, geom, fna, nam, in1) VALUES (?1, ?2, ?3, ?4, ?5)",
            params![fid, geom, fna, nam, in1],
        )
        .unwrap();
    }
}

fn write_ign_departamentos(path: &Path) {
    let conn = Connection::open(path).unwrap();
    conn.execute_batch(
        "CREATE TABLE igndepartamento (fid INTEGER PRIMARY KEY, geom BLOB, fna TEXT, nam TEXT, in1 TEXT);",
    )
    .unwrap();
    let rows = [
        (1, "Departamento Capital", "Capital", "14014"),
        (2, "Departamento Río Cuarto", "Río Cuarto", "14098"),
        (3, "Departamento General Güemes", "General Güemes", "22039"),
        (4, "Departamento Iruya", "Iruya", "99001"),
        (5, "Departamento Santa Victoria", "Santa Victoria", "66154"),
    ];
    for (fid, fna, nam, in1) in rows {
        conn.execute(
            "INSERT INTO igndepartamento (fid, geom, fna, nam, in1) VALUES (?1, ?2, ?3, ?4, ?5)",
            params![fid, gpkg(wkb_square(-64.0, -32.0)), fna, nam, in1],
        )
        .unwrap();
    }
}

fn fixture() -> (TempDir, AppConfig) {
    let dir = TempDir::new().unwrap();
    let tierras = dir.path().join("Tierras.gpkg");
    let provs = dir.path().join("ign_provincias.gpkg");
    let deptos = dir.path().join("ign_departamentos.gpkg");
    write_tierras(&tierras);
    write_ign_provincias(&provs);
    write_ign_departamentos(&deptos);

    let out: PathBuf = dir.path().join("web");
    let config = AppConfig::from_toml(&format!(
        "[input]\ntierras = {:?}\nign_provincias = {:?}\nign_departamentos = {:?}\n\n[output]\ndir = {:?}\n",
        tierras, provs, deptos, out
    ))
    .unwrap();
    config.validate_inputs().unwrap();
    (dir, config)
}

#[test]
fn departments_match_through_every_stage() {
    let (_dir, config) = fixture();
    let source = load_data(&config).unwrap();
    let assembled = assemble(&source).unwrap();

    let report = &assembled.departamentos;
    assert_eq!(report.total, 5);
    assert_eq!(report.matched, 4);
    assert_eq!(report.unmatched, ["Santa Victoria"]);
    for stage in MatchStage::ALL {
        assert_eq!(report.by_stage.get(&stage), Some(&1), "stage {stage:?}");
    }

    let deptos = &assembled.outputs.departamentos.features;
    let props = |fid: i64| {
        deptos
            .iter()
            .map(|f| f.properties.as_ref().unwrap())
            .find(|p| p["fid"] == serde_json::json!(fid))
            .unwrap()
    };
    assert_eq!(props(1)["porcentaje"], serde_json::json!(2));
    assert_eq!(props(1)["nivel"], serde_json::json!("normal"));
    assert_eq!(props(2)["nivel"], serde_json::json!("sobre_promedio"));
    assert_eq!(props(3)["total_ha"], serde_json::json!(1000.0));
    assert_eq!(props(3)["nivel"], serde_json::json!("alto"));
    assert_eq!(props(4)["provincia"], serde_json::Value::Null);
    assert_eq!(props(5)["nivel"], serde_json::json!("sin_datos"));
    assert_eq!(props(5)["provincia"], serde_json::json!("Salta"));
}

#[test]
fn provinces_skip_broken_geometry() {
    let (_dir, config) = fixture();
    let source = load_data(&config).unwrap();
    let assembled = assemble(&source).unwrap();

    assert_eq!(assembled.outputs.provincias.features.len(), 3);
    assert_eq!(assembled.provincias.matched, 2);
    assert_eq!(assembled.provincias.unmatched, ["Salta"]);
    assert_eq!(source.codes.resolve("38001"), Some("Jujuy"));
}

#[test]
fn writes_all_outputs() {
    let (_dir, config) = fixture();
    let source = load_data(&config).unwrap();
    let assembled = assemble(&source).unwrap();
    write_outputs(&config.output.dir, &assembled.outputs).unwrap();

    for name in [PROVINCIAS_FILE, DEPARTAMENTOS_FILE, PUNTOS_FILE] {
        let text = std::fs::read_to_string(config.output.dir.join(name)).unwrap();
        let parsed: geojson::GeoJson = text.parse().unwrap();
        assert!(matches!(parsed, geojson::GeoJson::FeatureCollection(_)), "{name}");
    }

    let stats: serde_json::Value =
        serde_json::from_str(&std::fs::read_to_string(config.output.dir.join(STATS_FILE)).unwrap())
            .unwrap();
    assert_eq!(
        stats["summary"],
        serde_json::json!({
            "total_departamentos": 4,
            "total_departamentos_ign": 5,
            "alto_nivel": 1,
            "sobre_promedio": 1,
            "normal": 2,
            "total_provincias": 2,
        })
    );
    let order: Vec<_> = stats["departamentos"]
        .as_array()
        .unwrap()
        .iter()
        .map(|d| d["nombre"].as_str().unwrap().to_string())
        .collect();
    assert_eq!(order, ["Gral. Güemes", "Río Cuarto", "Córdoba", "Iruya"]);
    assert!(stats["provincias"][0].get("fid").is_none());

    let leftovers = std::fs::read_dir(&config.output.dir)
        .unwrap()
        .filter(|e| e.as_ref().unwrap().file_name().to_string_lossy().ends_with(".tmp"))
        .count();
    assert_eq!(leftovers, 0);
}
