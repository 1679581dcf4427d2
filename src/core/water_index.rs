//! Normalized-difference water indices (NDWI, MNDWI).

use chrono::{DateTime, NaiveDate, Utc};
use ndarray::Zip;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;

use crate::core::cloud_mask::MaskedScene;
use crate::geometry::Polygon;
use crate::types::{Band, FloodError, FloodResult, GridSpec, Raster, ValidityMask};

/// Normalized-difference water index `(a - b) / (a + b)` over a band pair.
///
/// Implementations only choose the bands; the arithmetic and validity rules
/// are shared. Higher values mean wetter for every formula.
pub trait WaterIndex: fmt::Debug + Send + Sync {
    fn name(&self) -> &'static str;

    /// `(a, b)` in `(a - b) / (a + b)`
    fn bands(&self) -> (Band, Band);
}

/// McFeeters NDWI: green vs near-infrared (Sentinel-2 B3/B8)
#[derive(Debug, Clone, Copy, Default)]
pub struct Ndwi;

impl WaterIndex for Ndwi {
    fn name(&self) -> &'static str {
        "ndwi"
    }

    fn bands(&self) -> (Band, Band) {
        (Band::Green, Band::Nir)
    }
}

/// Xu modified NDWI: green vs short-wave infrared (Sentinel-2 B3/B11)
#[derive(Debug, Clone, Copy, Default)]
pub struct Mndwi;

impl WaterIndex for Mndwi {
    fn name(&self) -> &'static str {
        "mndwi"
    }

    fn bands(&self) -> (Band, Band) {
        (Band::Green, Band::Swir1)
    }
}

/// Index selection as written in configuration
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WaterIndexKind {
    #[default]
    Ndwi,
    Mndwi,
}

impl WaterIndexKind {
    pub fn formula(&self) -> Arc<dyn WaterIndex> {
        match self {
            WaterIndexKind::Ndwi => Arc::new(Ndwi),
            WaterIndexKind::Mndwi => Arc::new(Mndwi),
        }
    }
}

/// Single-band index raster for one scene (or one same-day mosaic of scenes)
#[derive(Debug, Clone)]
pub struct IndexRaster {
    pub id: String,
    /// Identifiers of the scenes this raster was derived from
    pub sources: Vec<String>,
    pub acquired: DateTime<Utc>,
    pub footprints: Vec<Polygon>,
    pub grid: GridSpec,
    /// Index values in [-1, 1]; NaN where invalid
    pub values: Raster,
    pub valid: ValidityMask,
}

impl IndexRaster {
    pub fn valid_count(&self) -> usize {
        self.valid.iter().filter(|&&v| v).count()
    }

    pub fn acquisition_date(&self) -> NaiveDate {
        self.acquired.date_naive()
    }
}

/// Per-pixel normalized difference. `None` where undefined or out of range.
pub fn normalized_difference(a: f32, b: f32) -> Option<f32> {
    let sum = a + b;
    if !a.is_finite() || !b.is_finite() || sum == 0.0 {
        return None;
    }
    let value = (a - b) / sum;
    // Negative reflectances can push the ratio outside [-1, 1]
    if value.is_finite() && (-1.0..=1.0).contains(&value) {
        Some(value)
    } else {
        None
    }
}

/// Computes the configured water index for masked scenes
#[derive(Debug, Clone)]
pub struct WaterIndexer {
    formula: Arc<dyn WaterIndex>,
}

impl WaterIndexer {
    pub fn new(formula: Arc<dyn WaterIndex>) -> Self {
        Self { formula }
    }

    pub fn ndwi() -> Self {
        Self::new(Arc::new(Ndwi))
    }

    pub fn formula_name(&self) -> &'static str {
        self.formula.name()
    }

    /// Compute the index for one masked scene.
    ///
    /// Pixels already invalid in the mask, outside `clip` (when given), or
    /// where the formula is undefined are invalid in the output.
    pub fn index(
        &self,
        masked: &MaskedScene<'_>,
        clip: Option<&ValidityMask>,
    ) -> FloodResult<IndexRaster> {
        let scene = masked.scene;
        let (band_a, band_b) = self.formula.bands();
        let a = scene.band(band_a)?;
        let b = scene.band(band_b)?;

        if let Some(clip) = clip {
            if clip.dim() != masked.valid.dim() {
                return Err(FloodError::Processing(format!(
                    "clip mask {:?} does not match scene {} grid {:?}",
                    clip.dim(),
                    scene.id,
                    masked.valid.dim()
                )));
            }
        }

        let mut values = Raster::from_elem(masked.valid.dim(), f32::NAN);
        let mut valid = ValidityMask::from_elem(masked.valid.dim(), false);

        Zip::indexed(&mut values)
            .and(&mut valid)
            .and(&masked.valid)
            .and(a)
            .and(b)
            .for_each(|(row, col), value, ok, &usable, &va, &vb| {
                let inside = clip.map_or(true, |c| c[[row, col]]);
                if !usable || !inside {
                    return;
                }
                if let Some(v) = normalized_difference(va, vb) {
                    *value = v;
                    *ok = true;
                }
            });

        let raster = IndexRaster {
            id: scene.id.clone(),
            sources: vec![scene.id.clone()],
            acquired: scene.acquired,
            footprints: vec![scene.footprint.clone()],
            grid: scene.grid.clone(),
            values,
            valid,
        };

        log::debug!(
            "{} for scene {}: {} valid pixels",
            self.formula.name(),
            scene.id,
            raster.valid_count()
        );
        Ok(raster)
    }
}
