//! Connected-component labelling and minimum-area filtering.

use ndarray::Array2;
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;

use crate::core::classify::{ChangeClass, ChangeMap};
use crate::core::flood_map::{FloodComponent, FloodMap, FloodSummary, Provenance};
use crate::types::{FloodError, FloodResult};

/// Pixel neighbourhood used to group flooded pixels
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Connectivity {
    /// Edge neighbours only
    Four,
    /// Edge and diagonal neighbours
    #[default]
    Eight,
}

impl Connectivity {
    fn offsets(&self) -> &'static [(isize, isize)] {
        const FOUR: [(isize, isize); 4] = [(-1, 0), (0, -1), (0, 1), (1, 0)];
        const EIGHT: [(isize, isize); 8] = [
            (-1, -1),
            (-1, 0),
            (-1, 1),
            (0, -1),
            (0, 1),
            (1, -1),
            (1, 0),
            (1, 1),
        ];
        match self {
            Connectivity::Four => &FOUR,
            Connectivity::Eight => &EIGHT,
        }
    }
}

/// Removes flooded regions smaller than a minimum ground area
#[derive(Debug, Clone, Default)]
pub struct AreaFilter {
    connectivity: Connectivity,
}

impl AreaFilter {
    pub fn new(connectivity: Connectivity) -> Self {
        Self { connectivity }
    }

    pub fn connectivity(&self) -> Connectivity {
        self.connectivity
    }

    /// Keep connected flooded regions whose area is at least `min_area_m2`.
    ///
    /// Components are discovered in raster-scan order of their first pixel,
    /// so ids and ordering are deterministic.
    pub fn filter(&self, raw: &ChangeMap, min_area_m2: f64) -> FloodResult<FloodMap> {
        if !min_area_m2.is_finite() || min_area_m2 <= 0.0 {
            return Err(FloodError::Configuration(format!(
                "min_area must be positive, got {}",
                min_area_m2
            )));
        }

        let (rows, cols) = raw.classes.dim();
        log::info!(
            "Filtering flooded regions below {} m² ({:?}-connected)",
            min_area_m2,
            self.connectivity
        );

        let row_area: Vec<f64> = (0..rows).map(|r| raw.grid.pixel_area_m2(r)).collect();
        let mut visited = Array2::<bool>::from_elem((rows, cols), false);
        let mut flooded = Array2::<bool>::from_elem((rows, cols), false);
        let mut components = Vec::new();
        let mut summary = FloodSummary {
            total_pixels: rows * cols,
            permanent_water_pixels: raw.count(ChangeClass::PermanentWater),
            nodata_pixels: raw.count(ChangeClass::NoData),
            ..FloodSummary::default()
        };

        let mut queue = VecDeque::new();
        let mut members = Vec::new();

        for start_row in 0..rows {
            for start_col in 0..cols {
                if visited[[start_row, start_col]]
                    || raw.classes[[start_row, start_col]] != ChangeClass::Flooded
                {
                    continue;
                }

                members.clear();
                visited[[start_row, start_col]] = true;
                queue.push_back((start_row, start_col));

                while let Some((r, c)) = queue.pop_front() {
                    members.push((r, c));
                    for &(dr, dc) in self.connectivity.offsets() {
                        let nr = r as isize + dr;
                        let nc = c as isize + dc;
                        if nr < 0 || nc < 0 || nr >= rows as isize || nc >= cols as isize {
                            continue;
                        }
                        let (nr, nc) = (nr as usize, nc as usize);
                        if !visited[[nr, nc]] && raw.classes[[nr, nc]] == ChangeClass::Flooded {
                            visited[[nr, nc]] = true;
                            queue.push_back((nr, nc));
                        }
                    }
                }

                let area: f64 = members.iter().map(|&(r, _)| row_area[r]).sum();
                if area < min_area_m2 {
                    summary.discarded_components += 1;
                    summary.discarded_area_m2 += area;
                    continue;
                }

                let mut component = FloodComponent {
                    id: components.len() + 1,
                    pixel_count: members.len(),
                    area_m2: area,
                    min_row: start_row,
                    min_col: start_col,
                    max_row: start_row,
                    max_col: start_col,
                };
                for &(r, c) in &members {
                    flooded[[r, c]] = true;
                    component.min_row = component.min_row.min(r);
                    component.min_col = component.min_col.min(c);
                    component.max_row = component.max_row.max(r);
                    component.max_col = component.max_col.max(c);
                }
                summary.flooded_pixels += component.pixel_count;
                summary.flooded_area_m2 += component.area_m2;
                components.push(component);
            }
        }
        summary.component_count = components.len();

        log::info!(
            "Retained {} flooded regions ({:.0} m²), discarded {} ({:.0} m²)",
            summary.component_count,
            summary.flooded_area_m2,
            summary.discarded_components,
            summary.discarded_area_m2
        );

        Ok(FloodMap {
            grid: raw.grid.clone(),
            flooded,
            nodata: raw.classes.mapv(|c| c == ChangeClass::NoData),
            components,
            summary,
            provenance: Provenance {
                source_label: String::new(),
                algorithm: String::new(),
                water_index: String::new(),
                mode: raw.mode,
                composite_rule: None,
                connectivity: self.connectivity,
                baseline_window: None,
                flood_window: None,
                baseline_scenes: Vec::new(),
                flood_scenes: Vec::new(),
                water_index_threshold: raw.threshold,
                cloud_threshold: None,
                min_area_m2,
            },
        })
    }
}
