//! Scene retrieval: catalog query with deadline, then window, footprint and
//! cloud-cover filtering.

use std::sync::mpsc;
use std::sync::Arc;
use std::time::Duration;

use crate::geometry::AreaOfInterest;
use crate::io::SceneCatalog;
use crate::types::{FloodError, FloodResult, Scene, TimeWindow};

/// Counts of scenes removed by each filter
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CollectionStats {
    pub returned: usize,
    pub outside_aoi: usize,
    pub outside_window: usize,
    pub too_cloudy: usize,
    pub kept: usize,
}

/// Retrieves and filters candidate scenes from an injected catalog
#[derive(Clone)]
pub struct SceneCollector {
    catalog: Arc<dyn SceneCatalog>,
    timeout: Option<Duration>,
}

impl SceneCollector {
    pub fn new(catalog: Arc<dyn SceneCatalog>) -> Self {
        Self {
            catalog,
            timeout: None,
        }
    }

    /// Give up on the catalog after `timeout`, failing with a data source error
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    pub fn catalog_name(&self) -> &str {
        self.catalog.name()
    }

    /// Scenes overlapping `aoi`, acquired within `window` and with scene-level
    /// cloud cover at most `cloud_threshold`, ordered by acquisition time then
    /// id. An empty result is not an error.
    pub fn collect(
        &self,
        aoi: &AreaOfInterest,
        window: &TimeWindow,
        cloud_threshold: f64,
    ) -> FloodResult<Vec<Scene>> {
        Ok(self.collect_with_stats(aoi, window, cloud_threshold)?.0)
    }

    pub fn collect_with_stats(
        &self,
        aoi: &AreaOfInterest,
        window: &TimeWindow,
        cloud_threshold: f64,
    ) -> FloodResult<(Vec<Scene>, CollectionStats)> {
        log::info!(
            "Collecting scenes from {} for {} (cloud cover <= {:.0}%)",
            self.catalog.name(),
            window,
            cloud_threshold * 100.0
        );

        let candidates = self.query(aoi, window)?;
        let mut stats = CollectionStats {
            returned: candidates.len(),
            ..CollectionStats::default()
        };

        let mut scenes = Vec::with_capacity(candidates.len());
        for scene in candidates {
            if !window.contains_time(&scene.acquired) {
                stats.outside_window += 1;
            } else if !aoi.intersects(&scene.footprint) {
                stats.outside_aoi += 1;
            } else if scene.cloud_cover.is_nan() || scene.cloud_cover > cloud_threshold {
                log::debug!(
                    "Discarding scene {}: cloud cover {:.1}%",
                    scene.id,
                    scene.cloud_cover * 100.0
                );
                stats.too_cloudy += 1;
            } else {
                scenes.push(scene);
            }
        }

        scenes.sort_by(|a, b| a.acquired.cmp(&b.acquired).then_with(|| a.id.cmp(&b.id)));
        stats.kept = scenes.len();

        log::info!(
            "Kept {} of {} scenes ({} outside window, {} outside AOI, {} too cloudy)",
            stats.kept,
            stats.returned,
            stats.outside_window,
            stats.outside_aoi,
            stats.too_cloudy
        );
        if scenes.is_empty() {
            log::warn!("No scenes satisfy the filters for {}", window);
        }
        Ok((scenes, stats))
    }

    fn query(&self, aoi: &AreaOfInterest, window: &TimeWindow) -> FloodResult<Vec<Scene>> {
        let Some(timeout) = self.timeout else {
            return self.catalog.query(aoi, window);
        };

        // The worker is detached on timeout; its late result is dropped.
        let (tx, rx) = mpsc::channel();
        let catalog = Arc::clone(&self.catalog);
        let (aoi, window) = (aoi.clone(), *window);
        std::thread::Builder::new()
            .name("catalog-query".to_string())
            .spawn(move || {
                let _ = tx.send(catalog.query(&aoi, &window));
            })?;

        match rx.recv_timeout(timeout) {
            Ok(result) => result,
            Err(mpsc::RecvTimeoutError::Timeout) => Err(FloodError::DataSource(format!(
                "catalog {} did not respond within {:?}",
                self.catalog.name(),
                timeout
            ))),
            Err(mpsc::RecvTimeoutError::Disconnected) => Err(FloodError::DataSource(format!(
                "catalog {} query aborted",
                self.catalog.name()
            ))),
        }
    }
}
