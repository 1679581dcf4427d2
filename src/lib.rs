//! optiflood: Optical Flood Mapping from Multispectral Time Series
//!
//! Detects newly inundated land by comparing water-index composites of a
//! pre-event baseline period against a flood period over an area of interest,
//! and removes flooded regions below a minimum ground area.

pub mod types;
pub mod geometry;
pub mod config;
pub mod io;
pub mod core;

// Re-export main types and functions for easier access
pub use types::{
    Band, CoordinateSystem, FloodError, FloodResult, GeoTransform, GridSpec, Raster, Scene,
    TimeWindow, ValidityMask,
};

pub use geometry::{AreaOfInterest, BoundingBox, Polygon};
pub use config::{AnalysisWindows, AoiSpec, FloodConfig, ValidatedConfig};
pub use io::{FileCatalog, HttpCatalog, MemoryCatalog, SceneCatalog};
pub use crate::core::{CancellationToken, FloodMap, FloodPipeline, FloodReport};
