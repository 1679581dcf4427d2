//! Flood map output types

use ndarray::Array2;
use serde::{Deserialize, Serialize};

use crate::core::area_filter::Connectivity;
use crate::core::classify::ClassificationMode;
use crate::core::composite::CompositeRule;
use crate::types::{GridSpec, TimeWindow};

/// One retained contiguous flooded region
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FloodComponent {
    pub id: usize,
    pub pixel_count: usize,
    pub area_m2: f64,
    pub min_row: usize,
    pub min_col: usize,
    pub max_row: usize,
    pub max_col: usize,
}

/// Scalar statistics of a flood map
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FloodSummary {
    pub total_pixels: usize,
    pub flooded_pixels: usize,
    pub flooded_area_m2: f64,
    pub component_count: usize,
    pub discarded_components: usize,
    pub discarded_area_m2: f64,
    pub permanent_water_pixels: usize,
    pub nodata_pixels: usize,
}

/// Inputs and settings a flood map was produced with
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Provenance {
    pub source_label: String,
    pub algorithm: String,
    pub water_index: String,
    pub mode: ClassificationMode,
    pub composite_rule: Option<CompositeRule>,
    pub connectivity: Connectivity,
    pub baseline_window: Option<TimeWindow>,
    pub flood_window: Option<TimeWindow>,
    pub baseline_scenes: Vec<String>,
    pub flood_scenes: Vec<String>,
    pub water_index_threshold: f32,
    pub cloud_threshold: Option<f64>,
    pub min_area_m2: f64,
}

/// Final flood map: boolean raster, no-data mask, components, summary and
/// provenance. Format-agnostic; serialization belongs to callers.
#[derive(Debug, Clone, PartialEq)]
pub struct FloodMap {
    pub grid: GridSpec,
    pub flooded: Array2<bool>,
    pub nodata: Array2<bool>,
    pub components: Vec<FloodComponent>,
    pub summary: FloodSummary,
    pub provenance: Provenance,
}

impl FloodMap {
    /// Display name, e.g. `Flood extent on 2023-06-01 (Sentinel-2)`
    pub fn layer_name(&self) -> String {
        let date = self
            .provenance
            .flood_window
            .map(|w| w.start.to_string())
            .unwrap_or_else(|| "undated".to_string());
        format!("Flood extent on {} ({})", date, self.provenance.source_label)
    }

    /// Flood map as `0 = dry, 1 = flooded, 255 = no-data`
    pub fn to_u8(&self) -> Array2<u8> {
        let mut out = self.flooded.mapv(u8::from);
        for (value, &missing) in out.iter_mut().zip(self.nodata.iter()) {
            if missing {
                *value = 255;
            }
        }
        out
    }
}

/// Serializable summary and provenance, without the rasters
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FloodReport {
    pub layer_name: String,
    pub grid: GridSpec,
    pub summary: FloodSummary,
    pub components: Vec<FloodComponent>,
    pub provenance: Provenance,
}

impl From<&FloodMap> for FloodReport {
    fn from(map: &FloodMap) -> Self {
        Self {
            layer_name: map.layer_name(),
            grid: map.grid.clone(),
            summary: map.summary.clone(),
            components: map.components.clone(),
            provenance: map.provenance.clone(),
        }
    }
}
