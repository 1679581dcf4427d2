//! Water thresholding and baseline/flood change classification

use ndarray::{Array2, Zip};
use serde::{Deserialize, Serialize};

use crate::core::composite::CompositeRaster;
use crate::types::{FloodError, FloodResult, GridSpec};

/// What the classifier reports as flooded
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ClassificationMode {
    /// Water in the flood period that was not water in the baseline
    #[default]
    Change,
    /// Any water in the flood period
    Extent,
}

/// Per-pixel classification result
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ChangeClass {
    /// Missing observations in a composite the mode depends on
    NoData,
    Dry,
    /// Water in both periods (change mode only)
    PermanentWater,
    Flooded,
}

/// Raw, unfiltered classification aligned to the analysis grid
#[derive(Debug, Clone, PartialEq)]
pub struct ChangeMap {
    pub grid: GridSpec,
    pub mode: ClassificationMode,
    pub threshold: f32,
    pub classes: Array2<ChangeClass>,
}

impl ChangeMap {
    pub fn count(&self, class: ChangeClass) -> usize {
        self.classes.iter().filter(|&&c| c == class).count()
    }
}

/// Water when the index reaches the threshold
pub fn is_water(index: f32, threshold: f32) -> bool {
    index >= threshold
}

/// Thresholds baseline and flood-period composites into a change map
#[derive(Debug, Clone)]
pub struct FloodClassifier {
    threshold: f32,
    mode: ClassificationMode,
}

impl FloodClassifier {
    pub fn new(threshold: f32, mode: ClassificationMode) -> Self {
        Self { threshold, mode }
    }

    pub fn threshold(&self) -> f32 {
        self.threshold
    }

    /// Classify every pixel. No-data in a composite the mode depends on is
    /// never guessed as flooded or dry.
    pub fn classify(
        &self,
        baseline: &CompositeRaster,
        flood: &CompositeRaster,
    ) -> FloodResult<ChangeMap> {
        if baseline.grid != flood.grid {
            return Err(FloodError::Processing(
                "baseline and flood composites are on different grids".to_string(),
            ));
        }
        if !self.threshold.is_finite() {
            return Err(FloodError::Configuration(format!(
                "water index threshold must be finite, got {}",
                self.threshold
            )));
        }

        log::info!(
            "Classifying {:?} with water index threshold {}",
            self.mode,
            self.threshold
        );

        let threshold = self.threshold;
        let mode = self.mode;
        let mut classes = Array2::from_elem(flood.grid.dim(), ChangeClass::NoData);

        Zip::from(&mut classes)
            .and(&baseline.values)
            .and(&baseline.counts)
            .and(&flood.values)
            .and(&flood.counts)
            .for_each(|class, &before, &before_n, &after, &after_n| {
                if after_n == 0 {
                    return;
                }
                let wet_after = is_water(after, threshold);
                *class = match mode {
                    ClassificationMode::Extent if wet_after => ChangeClass::Flooded,
                    ClassificationMode::Extent => ChangeClass::Dry,
                    ClassificationMode::Change => {
                        if before_n == 0 {
                            return;
                        }
                        match (is_water(before, threshold), wet_after) {
                            (false, true) => ChangeClass::Flooded,
                            (true, true) => ChangeClass::PermanentWater,
                            _ => ChangeClass::Dry,
                        }
                    }
                };
            });

        let map = ChangeMap {
            grid: flood.grid.clone(),
            mode,
            threshold,
            classes,
        };

        log::info!(
            "Raw classification: {} flooded, {} permanent water, {} no-data pixels",
            map.count(ChangeClass::Flooded),
            map.count(ChangeClass::PermanentWater),
            map.count(ChangeClass::NoData)
        );
        Ok(map)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::composite::CompositeRule;
    use crate::types::{CoordinateSystem, GeoTransform, Raster, TimeWindow};
    use chrono::NaiveDate;
    use ndarray::arr2;

    fn composite(values: Raster) -> CompositeRaster {
        let counts = values.mapv(|v| if v.is_nan() { 0 } else { 3 });
        let day = NaiveDate::from_ymd_opt(2023, 6, 1).unwrap();
        CompositeRaster {
            window: TimeWindow::new(day, day).unwrap(),
            rule: CompositeRule::Median,
            grid: GridSpec {
                geo_transform: GeoTransform::from_gdal([0.0, 10.0, 0.0, 20.0, 0.0, -10.0]),
                rows: values.nrows(),
                cols: values.ncols(),
                crs: CoordinateSystem::Projected { epsg: 32615 },
            },
            values,
            counts,
            sources: vec![],
        }
    }

    #[test]
    fn test_change_classification() {
        let nan = f32::NAN;
        let baseline = composite(arr2(&[[-0.3, 0.4, -0.2], [nan, -0.1, 0.0]]));
        let flood = composite(arr2(&[[0.2, 0.5, -0.4], [0.6, nan, 0.3]]));
        let map = FloodClassifier::new(0.0, ClassificationMode::Change)
            .classify(&baseline, &flood)
            .unwrap();

        use ChangeClass::*;
        assert_eq!(
            map.classes,
            arr2(&[[Flooded, PermanentWater, Dry], [NoData, NoData, PermanentWater]])
        );
    }

    #[test]
    fn test_nodata_is_never_flooded() {
        let nan = f32::NAN;
        let baseline = composite(arr2(&[[nan, -0.5], [-0.5, nan]]));
        let flood = composite(arr2(&[[0.9, nan], [0.9, 0.9]]));
        let map = FloodClassifier::new(0.1, ClassificationMode::Change)
            .classify(&baseline, &flood)
            .unwrap();

        for ((r, c), class) in map.classes.indexed_iter() {
            if *class == ChangeClass::Flooded {
                assert!(baseline.counts[[r, c]] > 0 && flood.counts[[r, c]] > 0);
                assert!(flood.values[[r, c]] >= 0.1 && baseline.values[[r, c]] < 0.1);
            }
        }
        assert_eq!(map.count(ChangeClass::Flooded), 1);
        assert_eq!(map.count(ChangeClass::NoData), 3);
    }

    #[test]
    fn test_extent_mode_ignores_baseline_water() {
        let nan = f32::NAN;
        let baseline = composite(arr2(&[[0.5, nan]]));
        let flood = composite(arr2(&[[0.5, 0.2]]));
        let map = FloodClassifier::new(0.0, ClassificationMode::Extent)
            .classify(&baseline, &flood)
            .unwrap();
        assert_eq!(map.classes, arr2(&[[ChangeClass::Flooded, ChangeClass::Flooded]]));
    }
}
