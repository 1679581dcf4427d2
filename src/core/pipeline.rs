//! End-to-end flood mapping run.
//!
//! The pipeline validates its configuration up front, issues a single catalog
//! query spanning both analysis windows and then processes scenes without
//! further I/O.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use crate::config::{FloodConfig, ValidatedConfig};
use crate::core::area_filter::AreaFilter;
use crate::core::classify::FloodClassifier;
use crate::core::cloud_mask::CloudMasker;
use crate::core::collect::SceneCollector;
use crate::core::composite::TemporalCompositor;
use crate::core::flood_map::FloodMap;
use crate::core::mosaic::{DailyMosaicker, MosaicParams};
use crate::core::water_index::{IndexRaster, WaterIndexer};
use crate::io::SceneCatalog;
use crate::types::{FloodError, FloodResult, Scene, ValidityMask};

/// Cooperative cancellation flag, checked between scenes
#[derive(Debug, Clone, Default)]
pub struct CancellationToken {
    cancelled: Arc<AtomicBool>,
}

impl CancellationToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }

    fn check(&self) -> FloodResult<()> {
        if self.is_cancelled() {
            Err(FloodError::Cancelled)
        } else {
            Ok(())
        }
    }
}

/// Wires the stages together for one configuration.
///
/// Collect -> cloud mask -> water index -> (daily mosaic) -> composite x2
/// -> classify -> area filter. Each run is independent and stateless.
pub struct FloodPipeline {
    config: ValidatedConfig,
    collector: SceneCollector,
    masker: CloudMasker,
    indexer: WaterIndexer,
    mosaicker: Option<DailyMosaicker>,
    compositor: TemporalCompositor,
    classifier: FloodClassifier,
    area_filter: AreaFilter,
}

impl FloodPipeline {
    /// Validate `config` and build the pipeline. Configuration errors surface
    /// here, before the catalog is touched.
    pub fn new(config: &FloodConfig, catalog: Arc<dyn SceneCatalog>) -> FloodResult<Self> {
        let validated = config.validate()?;
        Ok(Self::from_validated(validated, catalog))
    }

    pub fn from_validated(config: ValidatedConfig, catalog: Arc<dyn SceneCatalog>) -> Self {
        let collector = SceneCollector::new(catalog).with_timeout(config.catalog_timeout);
        let mosaicker = config.mosaic_by_date.then(|| {
            DailyMosaicker::new(MosaicParams {
                require_full_coverage: config.require_full_coverage,
            })
        });

        Self {
            collector,
            masker: CloudMasker::new(config.cloud_mask, config.cloud_blue_threshold),
            indexer: WaterIndexer::new(config.water_index.formula()),
            mosaicker,
            compositor: TemporalCompositor::new(config.composite),
            classifier: FloodClassifier::new(config.water_index_threshold, config.mode),
            area_filter: AreaFilter::new(config.connectivity),
            config,
        }
    }

    pub fn config(&self) -> &ValidatedConfig {
        &self.config
    }

    pub fn run(&self) -> FloodResult<FloodMap> {
        self.run_with_cancellation(&CancellationToken::new())
    }

    pub fn run_with_cancellation(&self, token: &CancellationToken) -> FloodResult<FloodMap> {
        let windows = self.config.windows;
        log::info!(
            "Starting flood mapping: baseline {}, flood period {}",
            windows.baseline,
            windows.flood
        );
        token.check()?;

        let scenes = self.collector.collect(
            &self.config.aoi,
            &windows.query_window(),
            self.config.cloud_threshold,
        )?;

        let mut rasters = self.index_scenes(&scenes, token)?;
        token.check()?;

        if let (Some(mosaicker), Some(first)) = (&self.mosaicker, rasters.first()) {
            let clip = self.config.aoi.clip_mask(&first.grid);
            rasters = mosaicker.mosaic(rasters, &clip)?;
        }

        let baseline = self.compositor.composite(&rasters, &windows.baseline)?;
        let flood = self.compositor.composite(&rasters, &windows.flood)?;
        token.check()?;

        let change = self.classifier.classify(&baseline, &flood)?;
        let mut map = self.area_filter.filter(&change, self.config.min_area_m2)?;

        let provenance = &mut map.provenance;
        provenance.source_label = self.config.source_label.clone();
        provenance.water_index = self.indexer.formula_name().to_string();
        provenance.algorithm = format!("{}_threshold_v1", self.indexer.formula_name());
        provenance.composite_rule = Some(self.compositor.rule());
        provenance.baseline_window = Some(windows.baseline);
        provenance.flood_window = Some(windows.flood);
        provenance.baseline_scenes = baseline.sources;
        provenance.flood_scenes = flood.sources;
        provenance.cloud_threshold = Some(self.config.cloud_threshold);

        log::info!(
            "{}: {:.0} m² flooded in {} regions",
            map.layer_name(),
            map.summary.flooded_area_m2,
            map.summary.component_count
        );
        Ok(map)
    }

    /// Mask and index every scene. Scenes are independent, so this stage
    /// runs in parallel when enabled; output keeps the input order.
    fn index_scenes(
        &self,
        scenes: &[Scene],
        token: &CancellationToken,
    ) -> FloodResult<Vec<IndexRaster>> {
        let Some(first) = scenes.first() else {
            return Ok(Vec::new());
        };
        let clip = self.config.aoi.clip_mask(&first.grid);
        log::info!(
            "Indexing {} scenes with {} ({} AOI pixels)",
            scenes.len(),
            self.indexer.formula_name(),
            clip.iter().filter(|&&v| v).count()
        );

        self.index_each(scenes, &clip, token)
    }

    #[cfg(feature = "parallel")]
    fn index_each(
        &self,
        scenes: &[Scene],
        clip: &ValidityMask,
        token: &CancellationToken,
    ) -> FloodResult<Vec<IndexRaster>> {
        use rayon::prelude::*;

        scenes
            .par_iter()
            .map(|scene| self.index_scene(scene, clip, token))
            .collect()
    }

    #[cfg(not(feature = "parallel"))]
    fn index_each(
        &self,
        scenes: &[Scene],
        clip: &ValidityMask,
        token: &CancellationToken,
    ) -> FloodResult<Vec<IndexRaster>> {
        scenes
            .iter()
            .map(|scene| self.index_scene(scene, clip, token))
            .collect()
    }

    fn index_scene(
        &self,
        scene: &Scene,
        clip: &ValidityMask,
        token: &CancellationToken,
    ) -> FloodResult<IndexRaster> {
        token.check()?;
        if scene.grid.dim() != clip.dim() {
            return Err(FloodError::DataSource(format!(
                "scene {} grid {:?} differs from the analysis grid {:?}",
                scene.id,
                scene.grid.dim(),
                clip.dim()
            )));
        }
        let masked = self.masker.mask(scene)?;
        self.indexer.index(&masked, Some(clip))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::AoiSpec;
    use crate::io::MemoryCatalog;
    use chrono::NaiveDate;

    fn config() -> FloodConfig {
        FloodConfig::new(
            AoiSpec::BBox {
                bbox: [0.0, 0.0, 100.0, 100.0],
            },
            NaiveDate::from_ymd_opt(2023, 6, 1).unwrap(),
            NaiveDate::from_ymd_opt(2023, 6, 15).unwrap(),
            5,
            0.3,
            0.0,
            5000.0,
        )
    }

    #[test]
    fn test_invalid_config_fails_before_catalog_query() {
        let catalog = Arc::new(MemoryCatalog::new(vec![]));
        let mut bad = config();
        bad.start_date = NaiveDate::from_ymd_opt(2023, 6, 20).unwrap();

        let result = FloodPipeline::new(&bad, catalog.clone());
        assert!(matches!(result, Err(FloodError::Configuration(_))));
        assert_eq!(catalog.query_count(), 0);
    }

    #[test]
    fn test_no_scenes_is_insufficient_baseline() {
        let catalog = Arc::new(MemoryCatalog::new(vec![]));
        let pipeline = FloodPipeline::new(&config(), catalog.clone()).unwrap();

        match pipeline.run() {
            Err(FloodError::InsufficientData { window, .. }) => {
                assert_eq!(window, pipeline.config().windows.baseline);
            }
            other => panic!("expected insufficient data, got {:?}", other.map(|m| m.summary)),
        }
        assert_eq!(catalog.query_count(), 1);
    }

    #[test]
    fn test_cancelled_run() {
        let catalog = Arc::new(MemoryCatalog::new(vec![]));
        let pipeline = FloodPipeline::new(&config(), catalog.clone()).unwrap();
        let token = CancellationToken::new();
        token.cancel();

        assert!(matches!(
            pipeline.run_with_cancellation(&token),
            Err(FloodError::Cancelled)
        ));
        assert_eq!(catalog.query_count(), 0);
    }
}
