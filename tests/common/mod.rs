//! Synthetic Sentinel-2 scenes on a 20 m UTM grid

#![allow(dead_code)]

use chrono::{NaiveDate, TimeZone, Utc};
use ndarray::Array2;
use optiflood::geometry::Polygon;
use optiflood::types::{Band, CoordinateSystem, GeoTransform, GridSpec, Scene};
use optiflood::AoiSpec;
use std::collections::HashMap;

pub const ROWS: usize = 100;
pub const COLS: usize = 100;
pub const PIXEL: f64 = 20.0;
pub const ORIGIN_X: f64 = 500_000.0;
pub const ORIGIN_Y: f64 = 4_002_000.0;

/// SCL vegetation
pub const SCL_CLEAR: u8 = 4;
/// SCL cloud, high probability
pub const SCL_CLOUD: u8 = 9;

pub fn grid() -> GridSpec {
    grid_sized(ROWS, COLS)
}

pub fn grid_sized(rows: usize, cols: usize) -> GridSpec {
    GridSpec {
        geo_transform: GeoTransform::from_gdal([ORIGIN_X, PIXEL, 0.0, ORIGIN_Y, 0.0, -PIXEL]),
        rows,
        cols,
        crs: CoordinateSystem::Projected { epsg: 32615 },
    }
}

pub fn aoi() -> AoiSpec {
    aoi_sized(ROWS, COLS)
}

/// AOI matching the extent of a `rows` x `cols` grid
pub fn aoi_sized(rows: usize, cols: usize) -> AoiSpec {
    AoiSpec::BBox {
        bbox: [
            ORIGIN_X,
            ORIGIN_Y - PIXEL * rows as f64,
            ORIGIN_X + PIXEL * cols as f64,
            ORIGIN_Y,
        ],
    }
}

pub fn date(year: i32, month: u32, day: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(year, month, day).unwrap()
}

/// Permanent lake along the top five rows
pub fn lake(row: usize, _col: usize) -> bool {
    row < 5
}

/// Lake plus a 10x10 flooded field, a 2x2 puddle and a single wet pixel
pub fn flooded(row: usize, col: usize) -> bool {
    lake(row, col)
        || ((40..50).contains(&row) && (40..50).contains(&col))
        || ((80..82).contains(&row) && (80..82).contains(&col))
        || (row == 10 && col == 90)
}

/// A clear scene whose water pixels are chosen by `water`
pub fn scene(
    id: &str,
    day: NaiveDate,
    cloud_cover: f64,
    water: impl Fn(usize, usize) -> bool,
) -> Scene {
    scene_sized(id, day, cloud_cover, ROWS, COLS, water)
}

pub fn scene_sized(
    id: &str,
    day: NaiveDate,
    cloud_cover: f64,
    rows: usize,
    cols: usize,
    water: impl Fn(usize, usize) -> bool,
) -> Scene {
    let wet = Array2::from_shape_fn((rows, cols), |(r, c)| water(r, c));
    let green = wet.mapv(|w| if w { 0.10 } else { 0.05 });
    let nir = wet.mapv(|w| if w { 0.02 } else { 0.30 });
    let swir = wet.mapv(|w| if w { 0.01 } else { 0.25 });
    let blue = Array2::from_elem((rows, cols), 0.04);

    let mut bands = HashMap::new();
    bands.insert(Band::Blue, blue);
    bands.insert(Band::Green, green);
    bands.insert(Band::Nir, nir);
    bands.insert(Band::Swir1, swir);

    let (min_x, min_y, max_x, max_y) = (
        ORIGIN_X - 1000.0,
        ORIGIN_Y - PIXEL * rows as f64 - 1000.0,
        ORIGIN_X + PIXEL * cols as f64 + 1000.0,
        ORIGIN_Y + 1000.0,
    );

    Scene {
        id: id.to_string(),
        platform: "Sentinel-2A".to_string(),
        acquired: Utc.from_utc_datetime(&day.and_hms_opt(10, 30, 0).unwrap()),
        cloud_cover,
        footprint: Polygon::rectangle(min_x, min_y, max_x, max_y).unwrap(),
        grid: grid_sized(rows, cols),
        bands,
        scl: Some(Array2::from_elem((rows, cols), SCL_CLEAR)),
    }
}

/// Mark a rectangular block of `scene` as cloud in its SCL layer
pub fn cloud_over(mut scene: Scene, rows: std::ops::Range<usize>, cols: std::ops::Range<usize>) -> Scene {
    if let Some(scl) = scene.scl.as_mut() {
        for r in rows {
            for c in cols.clone() {
                scl[[r, c]] = SCL_CLOUD;
            }
        }
    }
    scene
}

/// Three clear baseline scenes in May 2023 and two flood-period scenes in June,
/// the second clouded over the flooded field
pub fn flood_event() -> Vec<Scene> {
    vec![
        scene("S2A_20230510", date(2023, 5, 10), 0.05, lake),
        scene("S2B_20230520", date(2023, 5, 20), 0.10, lake),
        scene("S2A_20230530", date(2023, 5, 30), 0.02, lake),
        scene("S2B_20230612", date(2023, 6, 12), 0.15, flooded),
        cloud_over(
            scene("S2A_20230615", date(2023, 6, 15), 0.25, flooded),
            38..52,
            38..52,
        ),
    ]
}
