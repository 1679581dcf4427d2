//! Per-pixel cloud, shadow and no-data masking for optical scenes.
//!
//! Two strategies are supported: the Sentinel-2 Scene Classification Layer
//! and a blue-band brightness test. Band values are never modified; only a
//! validity mask is produced.

use ndarray::Zip;
use serde::{Deserialize, Serialize};

use crate::types::{Band, FloodError, FloodResult, Scene, ValidityMask};

/// Sentinel-2 Scene Classification Layer classes treated as unusable
pub mod scl {
    pub const NO_DATA: u8 = 0;
    pub const SATURATED_OR_DEFECTIVE: u8 = 1;
    pub const CLOUD_SHADOW: u8 = 3;
    pub const CLOUD_MEDIUM_PROBABILITY: u8 = 8;
    pub const CLOUD_HIGH_PROBABILITY: u8 = 9;
    pub const THIN_CIRRUS: u8 = 10;
}

/// Cloud masking strategy
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CloudMaskMethod {
    /// Provider Scene Classification Layer (cloud, shadow, cirrus, no-data classes)
    #[default]
    Scl,
    /// Blue-band brightness test; detects clouds but not shadows
    Spectral,
}

/// Per-pixel classification produced by the masker
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PixelQuality {
    Clear,
    Cloud,
    Shadow,
    NoData,
}

/// Masking statistics for one scene
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MaskStats {
    pub total_pixels: usize,
    pub clear_pixels: usize,
    pub cloud_pixels: usize,
    pub shadow_pixels: usize,
    pub nodata_pixels: usize,
}

impl MaskStats {
    pub fn clear_percentage(&self) -> f64 {
        if self.total_pixels == 0 {
            0.0
        } else {
            100.0 * self.clear_pixels as f64 / self.total_pixels as f64
        }
    }
}

/// A scene with its per-pixel validity mask. Band values are untouched.
#[derive(Debug, Clone)]
pub struct MaskedScene<'a> {
    pub scene: &'a Scene,
    /// true = usable, false = cloud, shadow or no-data
    pub valid: ValidityMask,
    pub stats: MaskStats,
}

/// Cloud and cloud-shadow masker
#[derive(Debug, Clone)]
pub struct CloudMasker {
    method: CloudMaskMethod,
    blue_threshold: f32,
}

impl CloudMasker {
    pub fn new(method: CloudMaskMethod, blue_threshold: f32) -> Self {
        Self {
            method,
            blue_threshold,
        }
    }

    /// SCL-based masker
    pub fn scl() -> Self {
        Self::new(CloudMaskMethod::Scl, 0.2)
    }

    pub fn method(&self) -> CloudMaskMethod {
        self.method
    }

    /// Classify a single pixel from its SCL code
    pub fn classify_scl(code: u8) -> PixelQuality {
        match code {
            scl::NO_DATA | scl::SATURATED_OR_DEFECTIVE => PixelQuality::NoData,
            scl::CLOUD_SHADOW => PixelQuality::Shadow,
            scl::CLOUD_MEDIUM_PROBABILITY | scl::CLOUD_HIGH_PROBABILITY | scl::THIN_CIRRUS => {
                PixelQuality::Cloud
            }
            _ => PixelQuality::Clear,
        }
    }

    /// Mark cloud, shadow and no-data pixels invalid.
    ///
    /// A pixel with a non-finite value in any band is no-data regardless of
    /// the strategy. Deterministic: the mask depends only on the scene.
    pub fn mask<'a>(&self, scene: &'a Scene) -> FloodResult<MaskedScene<'a>> {
        log::debug!("Masking clouds in scene {} using {:?}", scene.id, self.method);

        let dim = scene.grid.dim();
        let mut quality = ndarray::Array2::from_elem(dim, PixelQuality::Clear);

        match self.method {
            CloudMaskMethod::Scl => {
                let layer = scene.scl.as_ref().ok_or_else(|| {
                    FloodError::DataSource(format!(
                        "scene {} has no scene classification layer",
                        scene.id
                    ))
                })?;
                if layer.dim() != dim {
                    return Err(FloodError::DataSource(format!(
                        "scene {} classification layer is {:?}, grid is {:?}",
                        scene.id,
                        layer.dim(),
                        dim
                    )));
                }
                Zip::from(&mut quality)
                    .and(layer)
                    .for_each(|q, &code| *q = Self::classify_scl(code));
            }
            CloudMaskMethod::Spectral => {
                let blue = scene.band(Band::Blue)?;
                let threshold = self.blue_threshold;
                Zip::from(&mut quality).and(blue).for_each(|q, &b| {
                    if b.is_finite() && b >= threshold {
                        *q = PixelQuality::Cloud;
                    }
                });
            }
        }

        for (band, raster) in &scene.bands {
            if raster.dim() != dim {
                return Err(FloodError::DataSource(format!(
                    "scene {} {} band is {:?}, grid is {:?}",
                    scene.id,
                    band,
                    raster.dim(),
                    dim
                )));
            }
            Zip::from(&mut quality).and(raster).for_each(|q, &v| {
                if !v.is_finite() {
                    *q = PixelQuality::NoData;
                }
            });
        }

        let mut stats = MaskStats {
            total_pixels: quality.len(),
            ..MaskStats::default()
        };
        for q in quality.iter() {
            match q {
                PixelQuality::Clear => stats.clear_pixels += 1,
                PixelQuality::Cloud => stats.cloud_pixels += 1,
                PixelQuality::Shadow => stats.shadow_pixels += 1,
                PixelQuality::NoData => stats.nodata_pixels += 1,
            }
        }
        let valid = quality.mapv(|q| q == PixelQuality::Clear);

        log::debug!(
            "Scene {}: {:.1}% clear ({} cloud, {} shadow, {} no-data)",
            scene.id,
            stats.clear_percentage(),
            stats.cloud_pixels,
            stats.shadow_pixels,
            stats.nodata_pixels
        );

        Ok(MaskedScene { scene, valid, stats })
    }
}

impl Default for CloudMasker {
    fn default() -> Self {
        Self::scl()
    }
}
