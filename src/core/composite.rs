//! Temporal compositing of index rasters over a time window.
//!
//! Each pixel aggregates only its valid observations; pixels without any are
//! no-data and carry a zero count.

use ndarray::{Array2, Zip};
use num_traits::Float;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;

use crate::core::water_index::IndexRaster;
use crate::types::{FloodError, FloodResult, GridSpec, Raster, TimeWindow};

/// Per-pixel aggregation rule across a time window
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CompositeRule {
    /// Median of all valid observations (mean of the two middle values for even counts)
    #[default]
    Median,
    /// Value from the latest acquisition with a valid observation
    MostRecentValid,
}

/// Median of a slice of floats; reorders the slice. `None` when empty.
pub fn median<T: Float>(values: &mut [T]) -> Option<T> {
    if values.is_empty() {
        return None;
    }
    values.sort_by(|a, b| a.partial_cmp(b).unwrap_or(Ordering::Equal));
    let mid = values.len() / 2;
    if values.len() % 2 == 1 {
        Some(values[mid])
    } else {
        Some((values[mid - 1] + values[mid]) / (T::one() + T::one()))
    }
}

/// Representative index raster for one time window
#[derive(Debug, Clone, PartialEq)]
pub struct CompositeRaster {
    pub window: TimeWindow,
    pub rule: CompositeRule,
    pub grid: GridSpec,
    /// Aggregated index; NaN where no valid observation exists
    pub values: Raster,
    /// Number of valid observations contributing to each pixel
    pub counts: Array2<u16>,
    /// Scenes that fell inside the window, in acquisition order
    pub sources: Vec<String>,
}

impl CompositeRaster {
    pub fn is_nodata(&self, row: usize, col: usize) -> bool {
        self.counts[[row, col]] == 0
    }

    pub fn nodata_count(&self) -> usize {
        self.counts.iter().filter(|&&c| c == 0).count()
    }

    pub fn valid_percentage(&self) -> f64 {
        let total = self.counts.len();
        if total == 0 {
            0.0
        } else {
            100.0 * (total - self.nodata_count()) as f64 / total as f64
        }
    }
}

/// Builds per-window composites from index rasters
#[derive(Debug, Clone, Default)]
pub struct TemporalCompositor {
    rule: CompositeRule,
}

impl TemporalCompositor {
    pub fn new(rule: CompositeRule) -> Self {
        Self { rule }
    }

    pub fn rule(&self) -> CompositeRule {
        self.rule
    }

    /// Aggregate the rasters acquired within `window`.
    ///
    /// Fails with `InsufficientData` when no raster falls in the window. A
    /// window whose rasters are entirely cloudy yields an all-no-data
    /// composite instead.
    pub fn composite(
        &self,
        rasters: &[IndexRaster],
        window: &TimeWindow,
    ) -> FloodResult<CompositeRaster> {
        let mut subset: Vec<&IndexRaster> = rasters
            .iter()
            .filter(|r| window.contains(r.acquisition_date()))
            .collect();

        if subset.is_empty() {
            return Err(FloodError::InsufficientData {
                window: *window,
                reason: "no scenes acquired in window".to_string(),
            });
        }
        subset.sort_by(|a, b| a.acquired.cmp(&b.acquired).then_with(|| a.id.cmp(&b.id)));

        let grid = subset[0].grid.clone();
        if let Some(other) = subset.iter().find(|r| r.grid != grid) {
            return Err(FloodError::Processing(format!(
                "raster {} is not on the same grid as {}",
                other.id, subset[0].id
            )));
        }

        log::info!(
            "Compositing {} rasters for window {} using {:?}",
            subset.len(),
            window,
            self.rule
        );

        let mut values = Raster::from_elem(grid.dim(), f32::NAN);
        let mut counts = Array2::<u16>::zeros(grid.dim());

        #[cfg(feature = "parallel")]
        Zip::indexed(&mut values)
            .and(&mut counts)
            .par_for_each(|(row, col), value, count| {
                (*value, *count) = self.aggregate_pixel(&subset, row, col);
            });

        #[cfg(not(feature = "parallel"))]
        Zip::indexed(&mut values)
            .and(&mut counts)
            .for_each(|(row, col), value, count| {
                (*value, *count) = self.aggregate_pixel(&subset, row, col);
            });

        let composite = CompositeRaster {
            window: *window,
            rule: self.rule,
            grid,
            values,
            counts,
            sources: subset.iter().flat_map(|r| r.sources.iter().cloned()).collect(),
        };

        log::info!(
            "Composite for {}: {:.1}% of pixels have valid observations",
            window,
            composite.valid_percentage()
        );
        Ok(composite)
    }

    /// Aggregated value and valid-observation count at one pixel.
    /// `subset` is in ascending acquisition order.
    fn aggregate_pixel(&self, subset: &[&IndexRaster], row: usize, col: usize) -> (f32, u16) {
        let mut observations: Vec<f32> = subset
            .iter()
            .filter(|r| r.valid[[row, col]])
            .map(|r| r.values[[row, col]])
            .collect();
        let count = observations.len().min(u16::MAX as usize) as u16;

        let value = match self.rule {
            CompositeRule::Median => median(&mut observations),
            CompositeRule::MostRecentValid => observations.last().copied(),
        };
        (value.unwrap_or(f32::NAN), count)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geometry::Polygon;
    use crate::types::{CoordinateSystem, GeoTransform};
    use approx::assert_relative_eq;
    use chrono::{NaiveDate, TimeZone, Utc};
    use ndarray::arr2;

    fn grid() -> GridSpec {
        GridSpec {
            geo_transform: GeoTransform::from_gdal([0.0, 10.0, 0.0, 20.0, 0.0, -10.0]),
            rows: 2,
            cols: 2,
            crs: CoordinateSystem::Projected { epsg: 32615 },
        }
    }

    fn raster(id: &str, day: u32, values: Raster) -> IndexRaster {
        let valid = values.mapv(|v| !v.is_nan());
        IndexRaster {
            id: id.to_string(),
            sources: vec![id.to_string()],
            acquired: Utc.with_ymd_and_hms(2023, 6, day, 10, 0, 0).unwrap(),
            footprints: vec![Polygon::rectangle(0.0, 0.0, 20.0, 20.0).unwrap()],
            grid: grid(),
            values,
            valid,
        }
    }

    fn window(start: u32, end: u32) -> TimeWindow {
        TimeWindow::new(
            NaiveDate::from_ymd_opt(2023, 6, start).unwrap(),
            NaiveDate::from_ymd_opt(2023, 6, end).unwrap(),
        )
        .unwrap()
    }

    #[test]
    fn test_median_helper() {
        assert_eq!(median::<f32>(&mut []), None);
        assert_eq!(median(&mut [3.0f32, 1.0, 2.0]), Some(2.0));
        assert_eq!(median(&mut [4.0f64, 1.0, 3.0, 2.0]), Some(2.5));
    }

    #[test]
    fn test_median_composite_with_counts() {
        let nan = f32::NAN;
        let rasters = vec![
            raster("a", 2, arr2(&[[0.1, nan], [0.5, nan]])),
            raster("b", 3, arr2(&[[0.3, 0.2], [nan, nan]])),
            raster("c", 4, arr2(&[[0.2, nan], [0.7, nan]])),
            raster("late", 20, arr2(&[[0.9, 0.9], [0.9, 0.9]])),
        ];
        let composite = TemporalCompositor::new(CompositeRule::Median)
            .composite(&rasters, &window(1, 10))
            .unwrap();

        assert_eq!(composite.sources, vec!["a", "b", "c"]);
        assert_eq!(composite.counts, arr2(&[[3, 1], [2, 0]]));
        assert_relative_eq!(composite.values[[0, 0]], 0.2);
        assert_relative_eq!(composite.values[[0, 1]], 0.2);
        assert_relative_eq!(composite.values[[1, 0]], 0.6, epsilon = 1e-6);
        assert!(composite.is_nodata(1, 1) && composite.values[[1, 1]].is_nan());

        // No-data iff zero observations
        for ((r, c), &count) in composite.counts.indexed_iter() {
            assert_eq!(composite.is_nodata(r, c), count == 0);
            assert_eq!(composite.values[[r, c]].is_nan(), count == 0);
        }
    }

    #[test]
    fn test_most_recent_valid_composite() {
        let nan = f32::NAN;
        // Deliberately out of order
        let rasters = vec![
            raster("c", 4, arr2(&[[0.2, nan], [0.7, nan]])),
            raster("a", 2, arr2(&[[0.1, 0.4], [0.5, nan]])),
        ];
        let composite = TemporalCompositor::new(CompositeRule::MostRecentValid)
            .composite(&rasters, &window(1, 10))
            .unwrap();

        assert_relative_eq!(composite.values[[0, 0]], 0.2);
        assert_relative_eq!(composite.values[[0, 1]], 0.4);
        assert_relative_eq!(composite.values[[1, 0]], 0.7);
        assert_eq!(composite.counts[[0, 0]], 2);
    }

    #[test]
    fn test_empty_window_is_insufficient_data() {
        let rasters = vec![raster("a", 2, arr2(&[[0.1, 0.1], [0.1, 0.1]]))];
        let result = TemporalCompositor::default().composite(&rasters, &window(10, 15));
        assert!(matches!(result, Err(FloodError::InsufficientData { .. })));
    }

    #[test]
    fn test_all_cloudy_window_is_nodata_not_error() {
        let rasters = vec![raster("a", 2, Raster::from_elem((2, 2), f32::NAN))];
        let composite = TemporalCompositor::default()
            .composite(&rasters, &window(1, 5))
            .unwrap();
        assert_eq!(composite.nodata_count(), 4);
        assert_eq!(composite.valid_percentage(), 0.0);
    }
}
