//! Same-day mosaicking of index rasters

use chrono::NaiveDate;
use std::collections::BTreeMap;

use crate::core::composite::median;
use crate::core::water_index::IndexRaster;
use crate::types::{FloodError, FloodResult, Raster, ValidityMask};

/// Daily mosaicking parameters
#[derive(Debug, Clone, Default)]
pub struct MosaicParams {
    /// Drop dates whose combined footprints leave any AOI pixel uncovered
    pub require_full_coverage: bool,
}

/// Merges same-day acquisitions into one raster per date.
///
/// Adjacent tiles from one overpass share an acquisition date; merging them
/// first keeps a single overpass from outweighing others in the temporal
/// composite.
#[derive(Debug, Clone, Default)]
pub struct DailyMosaicker {
    params: MosaicParams,
}

impl DailyMosaicker {
    pub fn new(params: MosaicParams) -> Self {
        Self { params }
    }

    /// Group rasters by UTC acquisition date and merge each group by
    /// per-pixel median of valid values. Output is ordered by date.
    ///
    /// `aoi_mask` marks the pixels the AOI covers; it is only consulted when
    /// full coverage is required.
    pub fn mosaic(
        &self,
        rasters: Vec<IndexRaster>,
        aoi_mask: &ValidityMask,
    ) -> FloodResult<Vec<IndexRaster>> {
        let input_count = rasters.len();
        let mut by_date: BTreeMap<NaiveDate, Vec<IndexRaster>> = BTreeMap::new();
        for raster in rasters {
            by_date.entry(raster.acquisition_date()).or_default().push(raster);
        }

        let mut mosaics = Vec::with_capacity(by_date.len());
        for (date, mut group) in by_date {
            group.sort_by(|a, b| a.acquired.cmp(&b.acquired).then_with(|| a.id.cmp(&b.id)));

            if self.params.require_full_coverage && !Self::covers(&group, aoi_mask) {
                log::warn!(
                    "Dropping {} mosaic: {} scene(s) do not cover the AOI",
                    date,
                    group.len()
                );
                continue;
            }

            if group.len() == 1 {
                mosaics.extend(group);
                continue;
            }
            mosaics.push(Self::merge(date, &group)?);
        }

        log::info!(
            "Mosaicked {} rasters into {} daily mosaics",
            input_count,
            mosaics.len()
        );
        Ok(mosaics)
    }

    fn merge(date: NaiveDate, group: &[IndexRaster]) -> FloodResult<IndexRaster> {
        let first = &group[0];
        if let Some(other) = group.iter().find(|r| r.grid != first.grid) {
            return Err(FloodError::Processing(format!(
                "cannot mosaic {} with {}: grids differ",
                other.id, first.id
            )));
        }

        let dim = first.grid.dim();
        let mut values = Raster::from_elem(dim, f32::NAN);
        let mut valid = ValidityMask::from_elem(dim, false);
        let mut samples = Vec::with_capacity(group.len());

        for ((row, col), value) in values.indexed_iter_mut() {
            samples.clear();
            samples.extend(
                group
                    .iter()
                    .filter(|r| r.valid[[row, col]])
                    .map(|r| r.values[[row, col]]),
            );
            if let Some(m) = median(&mut samples) {
                *value = m;
                valid[[row, col]] = true;
            }
        }

        log::debug!("Merged {} scenes acquired on {}", group.len(), date);

        Ok(IndexRaster {
            id: format!("mosaic:{}", date),
            sources: group.iter().flat_map(|r| r.sources.iter().cloned()).collect(),
            acquired: first.acquired,
            footprints: group.iter().flat_map(|r| r.footprints.iter().cloned()).collect(),
            grid: first.grid.clone(),
            values,
            valid,
        })
    }

    /// True when every AOI pixel centre lies inside at least one footprint
    fn covers(group: &[IndexRaster], aoi_mask: &ValidityMask) -> bool {
        let gt = &group[0].grid.geo_transform;
        aoi_mask.indexed_iter().all(|((row, col), &inside)| {
            if !inside {
                return true;
            }
            let (x, y) = gt.pixel_center(row, col);
            group
                .iter()
                .flat_map(|r| r.footprints.iter())
                .any(|f| f.contains_point(x, y))
        })
    }
}
