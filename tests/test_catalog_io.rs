mod common;

use common::*;
use flate2::write::GzEncoder;
use flate2::Compression;
use optiflood::io::CatalogDocument;
use optiflood::{FileCatalog, FloodConfig, FloodError, FloodPipeline, SceneCatalog};
use std::io::Write;
use std::sync::Arc;

fn write_catalog(dir: &tempfile::TempDir, name: &str, gzip: bool) -> std::path::PathBuf {
    let document = CatalogDocument::from_scenes(&flood_event());
    let json = serde_json::to_vec(&document).unwrap();
    let path = dir.path().join(name);

    if gzip {
        let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
        encoder.write_all(&json).unwrap();
        std::fs::write(&path, encoder.finish().unwrap()).unwrap();
    } else {
        std::fs::write(&path, json).unwrap();
    }
    path
}

const CONFIG: &str = r#"
start_date = "2023-06-10"
end_date = "2023-06-20"
lag_days = 5
cloud_threshold = 0.3
water_index_threshold = 0.0
min_area_m2 = 5000.0

[aoi]
bbox = [500000.0, 4000000.0, 502000.0, 4002000.0]
"#;

#[test]
fn test_file_catalog_runs_pipeline() {
    let dir = tempfile::tempdir().unwrap();
    let catalog_path = write_catalog(&dir, "catalog.json", false);
    let config_path = dir.path().join("run.toml");
    std::fs::write(&config_path, CONFIG).unwrap();

    let config = FloodConfig::from_file(&config_path).unwrap();
    let pipeline = FloodPipeline::new(&config, Arc::new(FileCatalog::new(&catalog_path))).unwrap();
    let map = pipeline.run().unwrap();

    assert_eq!(map.summary.flooded_area_m2, 40_000.0);
    assert_eq!(map.summary.component_count, 1);
}

#[test]
fn test_gzip_catalog_matches_plain() {
    let dir = tempfile::tempdir().unwrap();
    let plain = write_catalog(&dir, "catalog.json", false);
    let packed = write_catalog(&dir, "catalog.json.gz", true);
    let config = FloodConfig::from_toml_str(CONFIG).unwrap();

    let a = FloodPipeline::new(&config, Arc::new(FileCatalog::new(&plain)))
        .unwrap()
        .run()
        .unwrap();
    let b = FloodPipeline::new(&config, Arc::new(FileCatalog::new(&packed)))
        .unwrap()
        .run()
        .unwrap();
    assert_eq!(a, b);
}

#[test]
fn test_missing_catalog_file_is_data_source_error() {
    let dir = tempfile::tempdir().unwrap();
    let config = FloodConfig::from_toml_str(CONFIG).unwrap();
    let validated = config.validate().unwrap();

    let catalog = FileCatalog::new(dir.path().join("absent.json"));
    let result = catalog.query(&validated.aoi, &validated.windows.query_window());
    assert!(matches!(result, Err(FloodError::DataSource(_))));
}

#[test]
fn test_truncated_catalog_is_data_source_error() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("broken.json");
    std::fs::write(&path, br#"{"scenes": [{"id": "S2A"#).unwrap();

    let config = FloodConfig::from_toml_str(CONFIG).unwrap();
    let pipeline = FloodPipeline::new(&config, Arc::new(FileCatalog::new(&path))).unwrap();
    assert!(matches!(pipeline.run(), Err(FloodError::DataSource(_))));
}

#[test]
fn test_percent_cloud_cover_is_accepted() {
    let text = r#"{
        "scenes": [{
            "id": "S2B_T15SWB_20230612",
            "acquired": "2023-06-12T17:05:00Z",
            "cloud_cover_percent": 12.5,
            "footprint": [[0.0, 0.0], [2.0, 0.0], [2.0, 2.0], [0.0, 2.0]],
            "grid": { "geo_transform": [0.0, 1.0, 0.0, 2.0, 0.0, -1.0], "rows": 2, "cols": 2 },
            "bands": { "green": [0.1, 0.1, 0.1, 0.1], "nir": [0.3, 0.3, 0.02, 0.02] },
            "scl": [4, 4, 6, 6]
        }]
    }"#;

    let scenes = CatalogDocument::from_bytes(text.as_bytes())
        .unwrap()
        .into_scenes()
        .unwrap();
    assert_eq!(scenes.len(), 1);
    assert!((scenes[0].cloud_cover - 0.125).abs() < 1e-12);
    assert_eq!(scenes[0].scl.as_ref().unwrap()[[1, 0]], 6);
}

#[test]
fn test_windows_from_config_file() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("run.toml");
    std::fs::write(&path, CONFIG.replace("lag_days = 5", "lag_days = 0\nbaseline_span_days = 10"))
        .unwrap();

    let windows = FloodConfig::from_file(&path).unwrap().validate().unwrap().windows;
    assert_eq!(windows.baseline.start, date(2023, 5, 31));
    assert_eq!(windows.baseline.end, date(2023, 6, 9));
    assert_eq!(windows.query_window().start, date(2023, 5, 31));
    assert_eq!(windows.query_window().end, date(2023, 6, 20));
}

#[test]
fn test_unreadable_config_is_io_error() {
    let dir = tempfile::tempdir().unwrap();
    assert!(matches!(
        FloodConfig::from_file(dir.path().join("missing.toml")),
        Err(FloodError::Io(_))
    ));
}
