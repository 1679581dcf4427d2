//! Core flood mapping stages

pub mod collect;
pub mod cloud_mask;
pub mod water_index;
pub mod mosaic;
pub mod composite;
pub mod classify;
pub mod area_filter;
pub mod flood_map;
pub mod pipeline;

// Re-export main types
pub use collect::{SceneCollector, CollectionStats};
pub use cloud_mask::{CloudMasker, CloudMaskMethod, MaskedScene, MaskStats, PixelQuality};
pub use water_index::{WaterIndex, WaterIndexKind, WaterIndexer, IndexRaster, Ndwi, Mndwi, normalized_difference};
pub use mosaic::{DailyMosaicker, MosaicParams};
pub use composite::{TemporalCompositor, CompositeRaster, CompositeRule, median};
pub use classify::{FloodClassifier, ChangeMap, ChangeClass, ClassificationMode, is_water};
pub use area_filter::{AreaFilter, Connectivity};
pub use flood_map::{FloodMap, FloodComponent, FloodSummary, FloodReport, Provenance};
pub use pipeline::{FloodPipeline, CancellationToken};
