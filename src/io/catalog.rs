//! Scene catalog backends and the JSON catalog document format

use chrono::{DateTime, Utc};
use flate2::read::GzDecoder;
use ndarray::Array2;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::io::Read;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use crate::geometry::{AreaOfInterest, Polygon};
use crate::types::{
    Band, CoordinateSystem, FloodError, FloodResult, GeoTransform, GridSpec, Scene, TimeWindow,
};

/// Source of scene metadata and pixel data for an AOI and date range.
///
/// Implementations may return a superset of the requested scenes; the
/// collector applies the footprint, date and cloud-cover filters. The
/// catalog is expected to deliver pixel data already resampled onto the
/// analysis grid.
pub trait SceneCatalog: Send + Sync {
    /// Short human-readable identifier used in log messages
    fn name(&self) -> &str;

    fn query(&self, aoi: &AreaOfInterest, window: &TimeWindow) -> FloodResult<Vec<Scene>>;
}

/// Raster grid as stored in a catalog document
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GridDocument {
    pub geo_transform: [f64; 6],
    pub rows: usize,
    pub cols: usize,
    #[serde(default)]
    pub crs: CoordinateSystem,
}

/// One scene as stored in a catalog document
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SceneDocument {
    pub id: String,
    pub acquired: DateTime<Utc>,
    #[serde(default)]
    pub platform: String,
    /// Cloud fraction in [0, 1]
    #[serde(default)]
    pub cloud_cover: Option<f64>,
    /// Cloud percentage in [0, 100], as reported by Sentinel-2 metadata
    #[serde(default)]
    pub cloud_cover_percent: Option<f64>,
    pub footprint: Vec<[f64; 2]>,
    pub grid: GridDocument,
    /// Row-major reflectance values per band; `null` marks no-data
    pub bands: BTreeMap<Band, Vec<Option<f32>>>,
    #[serde(default)]
    pub scl: Option<Vec<u8>>,
}

impl SceneDocument {
    pub fn from_scene(scene: &Scene) -> Self {
        let gt = &scene.grid.geo_transform;
        Self {
            id: scene.id.clone(),
            acquired: scene.acquired,
            platform: scene.platform.clone(),
            cloud_cover: Some(scene.cloud_cover),
            cloud_cover_percent: None,
            footprint: scene.footprint.vertices().into_iter().map(|(x, y)| [x, y]).collect(),
            grid: GridDocument {
                geo_transform: [
                    gt.top_left_x,
                    gt.pixel_width,
                    gt.rotation_x,
                    gt.top_left_y,
                    gt.rotation_y,
                    gt.pixel_height,
                ],
                rows: scene.grid.rows,
                cols: scene.grid.cols,
                crs: scene.grid.crs,
            },
            bands: scene
                .bands
                .iter()
                .map(|(band, raster)| {
                    let values: Vec<Option<f32>> =
                        raster.iter().map(|v| v.is_finite().then_some(*v)).collect();
                    (*band, values)
                })
                .collect(),
            scl: scene.scl.as_ref().map(|scl| scl.iter().copied().collect()),
        }
    }

    /// Validate the document and build a `Scene`. Malformed metadata is a
    /// data source error.
    pub fn into_scene(self) -> FloodResult<Scene> {
        let malformed = |what: String| FloodError::DataSource(format!("scene {}: {}", self.id, what));

        let cloud_cover = match (self.cloud_cover, self.cloud_cover_percent) {
            (Some(fraction), _) => fraction,
            (None, Some(percent)) => percent / 100.0,
            (None, None) => return Err(malformed("missing cloud cover".to_string())),
        };
        if !(0.0..=1.0).contains(&cloud_cover) {
            return Err(malformed(format!("cloud cover {} outside [0, 1]", cloud_cover)));
        }

        let footprint = Polygon::new(self.footprint.iter().map(|p| (p[0], p[1])).collect())
            .map_err(|e| malformed(format!("invalid footprint: {}", e)))?;

        let (rows, cols) = (self.grid.rows, self.grid.cols);
        if rows == 0 || cols == 0 {
            return Err(malformed(format!("empty grid {}x{}", rows, cols)));
        }
        if self.bands.is_empty() {
            return Err(malformed("no bands".to_string()));
        }

        let mut bands = HashMap::with_capacity(self.bands.len());
        for (band, values) in &self.bands {
            let pixels: Vec<f32> = values.iter().map(|v| v.unwrap_or(f32::NAN)).collect();
            let raster = Array2::from_shape_vec((rows, cols), pixels).map_err(|_| {
                malformed(format!(
                    "{} band has {} values, expected {}x{}",
                    band,
                    values.len(),
                    rows,
                    cols
                ))
            })?;
            bands.insert(*band, raster);
        }

        let scl = match &self.scl {
            Some(values) => Some(Array2::from_shape_vec((rows, cols), values.clone()).map_err(
                |_| malformed(format!("SCL layer has {} values, expected {}x{}", values.len(), rows, cols)),
            )?),
            None => None,
        };

        Ok(Scene {
            id: self.id.clone(),
            platform: self.platform.clone(),
            acquired: self.acquired,
            cloud_cover,
            footprint,
            grid: GridSpec {
                geo_transform: GeoTransform::from_gdal(self.grid.geo_transform),
                rows,
                cols,
                crs: self.grid.crs,
            },
            bands,
            scl,
        })
    }
}

/// Top-level catalog document
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CatalogDocument {
    pub scenes: Vec<SceneDocument>,
}

impl CatalogDocument {
    pub fn from_scenes(scenes: &[Scene]) -> Self {
        Self {
            scenes: scenes.iter().map(SceneDocument::from_scene).collect(),
        }
    }

    /// Parse a JSON document, transparently gunzipping compressed content
    pub fn from_bytes(content: &[u8]) -> FloodResult<Self> {
        let parsed = if is_gzip_content(content) {
            let mut text = Vec::new();
            GzDecoder::new(content)
                .read_to_end(&mut text)
                .map_err(|e| FloodError::DataSource(format!("failed to decompress catalog: {}", e)))?;
            serde_json::from_slice(&text)
        } else {
            serde_json::from_slice(content)
        };
        parsed.map_err(|e| FloodError::DataSource(format!("malformed catalog document: {}", e)))
    }

    pub fn into_scenes(self) -> FloodResult<Vec<Scene>> {
        self.scenes.into_iter().map(SceneDocument::into_scene).collect()
    }
}

/// Check if content is gzip format by examining magic bytes
fn is_gzip_content(content: &[u8]) -> bool {
    content.len() >= 2 && content[0] == 0x1F && content[1] == 0x8B
}

/// In-memory catalog, mostly for tests and embedding
pub struct MemoryCatalog {
    scenes: Vec<Scene>,
    queries: AtomicUsize,
}

impl MemoryCatalog {
    pub fn new(scenes: Vec<Scene>) -> Self {
        Self {
            scenes,
            queries: AtomicUsize::new(0),
        }
    }

    /// Number of `query` calls served so far
    pub fn query_count(&self) -> usize {
        self.queries.load(Ordering::SeqCst)
    }
}

impl SceneCatalog for MemoryCatalog {
    fn name(&self) -> &str {
        "memory"
    }

    fn query(&self, aoi: &AreaOfInterest, window: &TimeWindow) -> FloodResult<Vec<Scene>> {
        self.queries.fetch_add(1, Ordering::SeqCst);
        log::debug!("Memory catalog query for {} ({} scenes held)", window, self.scenes.len());
        let bbox = aoi.bounding_box();
        Ok(self
            .scenes
            .iter()
            .filter(|s| s.footprint.bounding_box().intersects(&bbox))
            .cloned()
            .collect())
    }
}

/// Catalog backed by a JSON document on disk (optionally gzip-compressed)
pub struct FileCatalog {
    path: PathBuf,
    label: String,
}

impl FileCatalog {
    pub fn new<P: AsRef<Path>>(path: P) -> Self {
        let path = path.as_ref().to_path_buf();
        let label = format!("file:{}", path.display());
        Self { path, label }
    }
}

impl SceneCatalog for FileCatalog {
    fn name(&self) -> &str {
        &self.label
    }

    fn query(&self, _aoi: &AreaOfInterest, window: &TimeWindow) -> FloodResult<Vec<Scene>> {
        log::info!("Reading scene catalog: {}", self.path.display());
        let content = std::fs::read(&self.path).map_err(|e| {
            FloodError::DataSource(format!("cannot read catalog {}: {}", self.path.display(), e))
        })?;
        let scenes = CatalogDocument::from_bytes(&content)?.into_scenes()?;
        log::debug!("Catalog holds {} scenes; query window {}", scenes.len(), window);
        Ok(scenes)
    }
}

/// Remote catalog reached over HTTP.
///
/// Issues `GET <base_url>?bbox=min_x,min_y,max_x,max_y&datetime=<start>/<end>`
/// and expects a catalog document in response. Any session or credential
/// setup happens before the catalog is constructed.
pub struct HttpCatalog {
    client: reqwest::blocking::Client,
    base_url: String,
}

impl HttpCatalog {
    pub fn new(base_url: &str, timeout: Duration) -> FloodResult<Self> {
        let client = reqwest::blocking::Client::builder()
            .timeout(timeout)
            .user_agent(concat!("optiflood/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| FloodError::DataSource(format!("failed to create HTTP client: {}", e)))?;
        Ok(Self::with_client(client, base_url))
    }

    /// Use a pre-configured client (proxies, auth headers, ...)
    pub fn with_client(client: reqwest::blocking::Client, base_url: &str) -> Self {
        Self {
            client,
            base_url: base_url.trim_end_matches('?').to_string(),
        }
    }

    fn request_params(aoi: &AreaOfInterest, window: &TimeWindow) -> [(&'static str, String); 2] {
        let bbox = aoi.bounding_box();
        [
            (
                "bbox",
                format!("{},{},{},{}", bbox.min_x, bbox.min_y, bbox.max_x, bbox.max_y),
            ),
            ("datetime", format!("{}/{}", window.start, window.end)),
        ]
    }
}

impl SceneCatalog for HttpCatalog {
    fn name(&self) -> &str {
        &self.base_url
    }

    fn query(&self, aoi: &AreaOfInterest, window: &TimeWindow) -> FloodResult<Vec<Scene>> {
        log::info!("Querying remote catalog {} for {}", self.base_url, window);

        let response = self
            .client
            .get(&self.base_url)
            .query(&Self::request_params(aoi, window))
            .send()
            .map_err(|e| {
                if e.is_timeout() {
                    FloodError::DataSource(format!("catalog request timed out: {}", e))
                } else {
                    FloodError::DataSource(format!("catalog unreachable: {}", e))
                }
            })?;

        let status = response.status();
        if !status.is_success() {
            return Err(FloodError::DataSource(format!(
                "HTTP {} {}: {}",
                status.as_u16(),
                status.canonical_reason().unwrap_or(""),
                self.base_url
            )));
        }

        let content = response
            .bytes()
            .map_err(|e| FloodError::DataSource(format!("failed to read catalog response: {}", e)))?;
        log::debug!("Downloaded {} bytes of catalog metadata", content.len());

        CatalogDocument::from_bytes(&content)?.into_scenes()
    }
}
