//! Run configuration: deserialization, validation and derived time windows.

use chrono::{Duration, NaiveDate};
use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::core::area_filter::Connectivity;
use crate::core::classify::ClassificationMode;
use crate::core::cloud_mask::CloudMaskMethod;
use crate::core::composite::CompositeRule;
use crate::core::water_index::WaterIndexKind;
use crate::geometry::{AreaOfInterest, Polygon};
use crate::types::{FloodError, FloodResult, TimeWindow};

/// Area of interest as written in a config file
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum AoiSpec {
    /// `[min_x, min_y, max_x, max_y]`
    BBox { bbox: [f64; 4] },
    /// One or more rings of `[x, y]` vertices
    Polygons { polygons: Vec<Vec<[f64; 2]>> },
}

impl AoiSpec {
    pub fn to_area_of_interest(&self) -> FloodResult<AreaOfInterest> {
        match self {
            AoiSpec::BBox { bbox } => {
                let [min_x, min_y, max_x, max_y] = *bbox;
                if min_x >= max_x || min_y >= max_y {
                    return Err(FloodError::Configuration(format!(
                        "degenerate AOI bounding box {:?}",
                        bbox
                    )));
                }
                Ok(AreaOfInterest::from_polygon(Polygon::rectangle(
                    min_x, min_y, max_x, max_y,
                )?))
            }
            AoiSpec::Polygons { polygons } => {
                let rings = polygons
                    .iter()
                    .map(|ring| Polygon::new(ring.iter().map(|p| (p[0], p[1])).collect()))
                    .collect::<FloodResult<Vec<_>>>()?;
                AreaOfInterest::new(rings)
            }
        }
    }
}

fn default_baseline_span_days() -> i64 {
    30
}

fn default_cloud_blue_threshold() -> f32 {
    0.2
}

fn default_true() -> bool {
    true
}

fn default_catalog_timeout_secs() -> u64 {
    60
}

fn default_source_label() -> String {
    "Sentinel-2".to_string()
}

/// User-facing configuration for one flood mapping run.
///
/// The AOI, dates, lag and the three thresholds are required; they are
/// sensor- and site-specific so no defaults are provided for them.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FloodConfig {
    pub aoi: AoiSpec,
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
    /// Days separating the end of the baseline window from `start_date`
    pub lag_days: i64,
    /// Maximum scene-level cloud fraction in [0, 1]
    pub cloud_threshold: f64,
    pub water_index_threshold: f64,
    pub min_area_m2: f64,

    #[serde(default = "default_baseline_span_days")]
    pub baseline_span_days: i64,
    #[serde(default)]
    pub water_index: WaterIndexKind,
    #[serde(default)]
    pub cloud_mask: CloudMaskMethod,
    /// Blue reflectance at or above which a pixel is cloud (spectral masking)
    #[serde(default = "default_cloud_blue_threshold")]
    pub cloud_blue_threshold: f32,
    #[serde(default)]
    pub composite: CompositeRule,
    #[serde(default)]
    pub connectivity: Connectivity,
    #[serde(default)]
    pub mode: ClassificationMode,
    #[serde(default = "default_true")]
    pub mosaic_by_date: bool,
    #[serde(default)]
    pub require_full_coverage: bool,
    #[serde(default = "default_catalog_timeout_secs")]
    pub catalog_timeout_secs: u64,
    #[serde(default = "default_source_label")]
    pub source_label: String,
}

impl FloodConfig {
    /// Config with the required values and defaults for everything else
    pub fn new(
        aoi: AoiSpec,
        start_date: NaiveDate,
        end_date: NaiveDate,
        lag_days: i64,
        cloud_threshold: f64,
        water_index_threshold: f64,
        min_area_m2: f64,
    ) -> Self {
        Self {
            aoi,
            start_date,
            end_date,
            lag_days,
            cloud_threshold,
            water_index_threshold,
            min_area_m2,
            baseline_span_days: default_baseline_span_days(),
            water_index: WaterIndexKind::default(),
            cloud_mask: CloudMaskMethod::default(),
            cloud_blue_threshold: default_cloud_blue_threshold(),
            composite: CompositeRule::default(),
            connectivity: Connectivity::default(),
            mode: ClassificationMode::default(),
            mosaic_by_date: true,
            require_full_coverage: false,
            catalog_timeout_secs: default_catalog_timeout_secs(),
            source_label: default_source_label(),
        }
    }

    pub fn from_toml_str(text: &str) -> FloodResult<Self> {
        toml::from_str(text)
            .map_err(|e| FloodError::Configuration(format!("invalid config: {}", e)))
    }

    pub fn from_file<P: AsRef<Path>>(path: P) -> FloodResult<Self> {
        log::info!("Loading configuration from: {}", path.as_ref().display());
        let text = std::fs::read_to_string(path.as_ref())?;
        Self::from_toml_str(&text)
    }

    /// Check every value and derive the analysis windows.
    pub fn validate(&self) -> FloodResult<ValidatedConfig> {
        let aoi = self.aoi.to_area_of_interest()?;

        if self.start_date > self.end_date {
            return Err(FloodError::Configuration(format!(
                "start_date {} is after end_date {}",
                self.start_date, self.end_date
            )));
        }
        if self.lag_days < 0 {
            return Err(FloodError::Configuration(format!(
                "lag must be non-negative, got {} days",
                self.lag_days
            )));
        }
        if self.baseline_span_days < 1 {
            return Err(FloodError::Configuration(format!(
                "baseline span must be at least one day, got {}",
                self.baseline_span_days
            )));
        }
        if !(0.0..=1.0).contains(&self.cloud_threshold) {
            return Err(FloodError::Configuration(format!(
                "cloud_threshold must be a fraction in [0, 1], got {}",
                self.cloud_threshold
            )));
        }
        if !(-1.0..=1.0).contains(&self.water_index_threshold) {
            return Err(FloodError::Configuration(format!(
                "water_index_threshold must lie in [-1, 1], got {}",
                self.water_index_threshold
            )));
        }
        if !self.min_area_m2.is_finite() || self.min_area_m2 <= 0.0 {
            return Err(FloodError::Configuration(format!(
                "min_area must be positive, got {}",
                self.min_area_m2
            )));
        }
        if !self.cloud_blue_threshold.is_finite() || self.cloud_blue_threshold <= 0.0 {
            return Err(FloodError::Configuration(format!(
                "cloud_blue_threshold must be positive, got {}",
                self.cloud_blue_threshold
            )));
        }
        if self.catalog_timeout_secs == 0 {
            return Err(FloodError::Configuration(
                "catalog timeout must be at least one second".to_string(),
            ));
        }

        let days = |name: &str, value: i64| {
            Duration::try_days(value).ok_or_else(|| {
                FloodError::Configuration(format!("{} of {} days is out of range", name, value))
            })
        };
        let windows = AnalysisWindows::derive(
            self.start_date,
            self.end_date,
            days("lag", self.lag_days)?,
            days("baseline span", self.baseline_span_days)?,
        )?;

        Ok(ValidatedConfig {
            aoi,
            windows,
            cloud_threshold: self.cloud_threshold,
            water_index_threshold: self.water_index_threshold as f32,
            min_area_m2: self.min_area_m2,
            water_index: self.water_index,
            cloud_mask: self.cloud_mask,
            cloud_blue_threshold: self.cloud_blue_threshold,
            composite: self.composite,
            connectivity: self.connectivity,
            mode: self.mode,
            mosaic_by_date: self.mosaic_by_date,
            require_full_coverage: self.require_full_coverage,
            catalog_timeout: std::time::Duration::from_secs(self.catalog_timeout_secs),
            source_label: self.source_label.clone(),
        })
    }
}

/// Baseline and flood-period windows of one run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct AnalysisWindows {
    pub baseline: TimeWindow,
    pub flood: TimeWindow,
}

impl AnalysisWindows {
    pub fn derive(
        start_date: NaiveDate,
        end_date: NaiveDate,
        lag: Duration,
        baseline_span: Duration,
    ) -> FloodResult<Self> {
        let flood = TimeWindow::new(start_date, end_date)?;
        let baseline = flood.baseline_before(lag, baseline_span)?;
        if baseline.overlaps(&flood) {
            return Err(FloodError::Configuration(format!(
                "baseline window {} overlaps flood window {}",
                baseline, flood
            )));
        }
        Ok(Self { baseline, flood })
    }

    /// Single window spanning both periods, used for the catalog query
    pub fn query_window(&self) -> TimeWindow {
        self.baseline.union(&self.flood)
    }
}

/// Configuration that passed validation; immutable for one pipeline run
#[derive(Debug, Clone)]
pub struct ValidatedConfig {
    pub aoi: AreaOfInterest,
    pub windows: AnalysisWindows,
    pub cloud_threshold: f64,
    pub water_index_threshold: f32,
    pub min_area_m2: f64,
    pub water_index: WaterIndexKind,
    pub cloud_mask: CloudMaskMethod,
    pub cloud_blue_threshold: f32,
    pub composite: CompositeRule,
    pub connectivity: Connectivity,
    pub mode: ClassificationMode,
    pub mosaic_by_date: bool,
    pub require_full_coverage: bool,
    pub catalog_timeout: std::time::Duration,
    pub source_label: String,
}
