//! Core types and error definitions

use chrono::{DateTime, Duration, NaiveDate, Utc};
use ndarray::Array2;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;

use crate::geometry::Polygon;

/// Real-valued reflectance or index data
pub type RasterValue = f32;

/// 2D real raster (rows x cols)
pub type Raster = Array2<RasterValue>;

/// 2D per-pixel validity mask (true = usable)
pub type ValidityMask = Array2<bool>;

/// Coordinate system enumeration
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum CoordinateSystem {
    /// Geographic coordinates (longitude, latitude) in degrees
    Geographic,
    /// Projected coordinates in metres (e.g., UTM)
    Projected { epsg: u32 },
}

impl Default for CoordinateSystem {
    fn default() -> Self {
        CoordinateSystem::Geographic
    }
}

/// Spectral bands used by the flood workflow
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Band {
    Blue,
    Green,
    Red,
    Nir,
    Swir1,
    Swir2,
}

impl fmt::Display for Band {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Band::Blue => write!(f, "blue"),
            Band::Green => write!(f, "green"),
            Band::Red => write!(f, "red"),
            Band::Nir => write!(f, "nir"),
            Band::Swir1 => write!(f, "swir1"),
            Band::Swir2 => write!(f, "swir2"),
        }
    }
}

/// Geospatial transformation parameters (GDAL ordering)
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GeoTransform {
    pub top_left_x: f64,
    pub pixel_width: f64,
    pub rotation_x: f64,
    pub top_left_y: f64,
    pub rotation_y: f64,
    pub pixel_height: f64,
}

impl GeoTransform {
    pub fn from_gdal(gt: [f64; 6]) -> Self {
        Self {
            top_left_x: gt[0],
            pixel_width: gt[1],
            rotation_x: gt[2],
            top_left_y: gt[3],
            rotation_y: gt[4],
            pixel_height: gt[5],
        }
    }

    /// Map coordinates of the centre of pixel (row, col)
    pub fn pixel_center(&self, row: usize, col: usize) -> (f64, f64) {
        let c = col as f64 + 0.5;
        let r = row as f64 + 0.5;
        (
            self.top_left_x + c * self.pixel_width + r * self.rotation_x,
            self.top_left_y + c * self.rotation_y + r * self.pixel_height,
        )
    }
}

/// Raster grid shared by every layer of one pipeline run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GridSpec {
    pub geo_transform: GeoTransform,
    pub rows: usize,
    pub cols: usize,
    #[serde(default)]
    pub crs: CoordinateSystem,
}

const EARTH_RADIUS_M: f64 = 6_371_008.8;

impl GridSpec {
    pub fn dim(&self) -> (usize, usize) {
        (self.rows, self.cols)
    }

    /// Ground area of one pixel in row `row`, in square metres.
    ///
    /// Geographic grids use a spherical approximation evaluated at the row's
    /// centre latitude.
    pub fn pixel_area_m2(&self, row: usize) -> f64 {
        let gt = &self.geo_transform;
        match self.crs {
            CoordinateSystem::Projected { .. } => (gt.pixel_width * gt.pixel_height).abs(),
            CoordinateSystem::Geographic => {
                let (_, lat) = gt.pixel_center(row, 0);
                let dy = gt.pixel_height.abs().to_radians() * EARTH_RADIUS_M;
                let dx = gt.pixel_width.abs().to_radians() * EARTH_RADIUS_M * lat.to_radians().cos();
                (dx * dy).abs()
            }
        }
    }
}

/// Inclusive calendar-date window
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TimeWindow {
    pub start: NaiveDate,
    pub end: NaiveDate,
}

impl TimeWindow {
    pub fn new(start: NaiveDate, end: NaiveDate) -> FloodResult<Self> {
        if start > end {
            return Err(FloodError::Configuration(format!(
                "time window start {} is after end {}",
                start, end
            )));
        }
        Ok(Self { start, end })
    }

    pub fn contains(&self, date: NaiveDate) -> bool {
        date >= self.start && date <= self.end
    }

    pub fn contains_time(&self, time: &DateTime<Utc>) -> bool {
        self.contains(time.date_naive())
    }

    pub fn overlaps(&self, other: &TimeWindow) -> bool {
        self.start <= other.end && other.start <= self.end
    }

    pub fn days(&self) -> i64 {
        (self.end - self.start).num_days() + 1
    }

    /// Baseline window ending `lag` before this window's start and spanning `span`.
    ///
    /// Equivalent to the half-open range `[start - lag - span, start - lag)`.
    pub fn baseline_before(&self, lag: Duration, span: Duration) -> FloodResult<TimeWindow> {
        let out_of_range = || {
            FloodError::Configuration(format!(
                "baseline before {} with lag {} days and span {} days is out of the date range",
                self.start,
                lag.num_days(),
                span.num_days()
            ))
        };
        let end_exclusive = self.start.checked_sub_signed(lag).ok_or_else(out_of_range)?;
        let start = end_exclusive.checked_sub_signed(span).ok_or_else(out_of_range)?;
        let end = end_exclusive.pred_opt().ok_or_else(out_of_range)?;
        TimeWindow::new(start, end)
    }

    /// Smallest window covering both `self` and `other`
    pub fn union(&self, other: &TimeWindow) -> TimeWindow {
        TimeWindow {
            start: self.start.min(other.start),
            end: self.end.max(other.end),
        }
    }
}

impl fmt::Display for TimeWindow {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{} .. {}]", self.start, self.end)
    }
}

/// One multispectral acquisition clipped to the analysis grid
#[derive(Debug, Clone)]
pub struct Scene {
    pub id: String,
    pub platform: String,
    pub acquired: DateTime<Utc>,
    /// Scene-level cloud fraction in [0, 1] from provider metadata
    pub cloud_cover: f64,
    pub footprint: Polygon,
    pub grid: GridSpec,
    /// Surface reflectance per band, all shaped like `grid`
    pub bands: HashMap<Band, Raster>,
    /// Sentinel-2 Scene Classification Layer, when supplied
    pub scl: Option<Array2<u8>>,
}

impl Scene {
    pub fn band(&self, band: Band) -> FloodResult<&Raster> {
        self.bands.get(&band).ok_or_else(|| {
            FloodError::DataSource(format!("scene {} has no {} band", self.id, band))
        })
    }

    pub fn acquisition_date(&self) -> NaiveDate {
        self.acquired.date_naive()
    }
}

/// Error types for flood processing
#[derive(Debug, thiserror::Error)]
pub enum FloodError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Data source error: {0}")]
    DataSource(String),

    #[error("Insufficient data for window {window}: {reason}")]
    InsufficientData { window: TimeWindow, reason: String },

    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Processing error: {0}")]
    Processing(String),

    #[error("Processing cancelled")]
    Cancelled,
}

/// Result type for flood operations
pub type FloodResult<T> = Result<T, FloodError>;
