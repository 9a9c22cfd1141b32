//! Lowest-unblocked-elevation search: for every azimuth of a fixed grid,
//! sweep a grid of elevation angles through the blockage pipeline and
//! report, per range gate, the minimum elevation at which cumulative
//! blockage drops below a threshold.

use rayon::prelude::*;
use tracing::{debug, info};

use crate::blockage::{BeamBlockConfig, beam_block};
use crate::error::BlockageError;
use crate::grid::{Grid2, linspace};
use crate::io::RadarVolume;
use crate::terrain::TerrainRaster;

/// Search grid and acceptance threshold for the elevation solver.
#[derive(Debug, Clone, Copy)]
pub struct ElevationSearch {
    pub az_start: f64,
    pub az_end: f64,
    pub az_count: usize,
    pub elev_start: f64,
    pub elev_end: f64,
    pub elev_count: usize,
    /// A gate counts as unblocked once CBB falls below this fraction.
    pub cbb_threshold: f64,
}

impl Default for ElevationSearch {
    fn default() -> Self {
        Self {
            az_start: 0.0,
            az_end: 360.0,
            az_count: 360,
            elev_start: 0.0,
            elev_end: 90.0,
            elev_count: 90,
            cbb_threshold: 0.01,
        }
    }
}

/// For each (azimuth, gate) of the search grid, the minimum elevation
/// angle in degrees at which CBB is below `cbb_threshold`. Gates that stay
/// blocked across the whole elevation grid are NaN — never the grid's
/// lowest angle.
///
/// One synthetic single-azimuth RHI volume is built per azimuth and run
/// through the full projector + calculator pass; azimuths are independent
/// and run on the rayon pool, with results collected in input order. The
/// output grid is `(az_count, ngates)`.
pub fn lowest_unblocked_elevation(
    volume: &RadarVolume,
    raster: &TerrainRaster,
    config: &BeamBlockConfig,
    search: &ElevationSearch,
) -> Result<Grid2, BlockageError> {
    volume.validate()?;
    if search.az_count == 0 || search.elev_count == 0 {
        return Err(BlockageError::BadVolume(
            "empty solver search grid".to_string(),
        ));
    }

    let azimuths = linspace(search.az_start, search.az_end, search.az_count);
    let elevations = linspace(search.elev_start, search.elev_end, search.elev_count);
    let ngates = volume.ngates();
    info!(
        azimuths = search.az_count,
        elevations = search.elev_count,
        ngates,
        "starting lowest-elevation search"
    );

    let rows: Vec<Vec<f64>> = azimuths
        .par_iter()
        .map(|&azimuth| -> Result<Vec<f64>, BlockageError> {
            let rhi = RadarVolume::rhi(
                volume.site,
                volume.range.clone(),
                azimuth,
                elevations.clone(),
            );
            let (_, cbb) = beam_block(&rhi, raster, config)?;

            let row = (0..ngates)
                .map(|gate| {
                    // Scan the elevation axis bottom-up; first angle whose
                    // CBB clears the threshold wins.
                    (0..search.elev_count)
                        .find(|&e| cbb.get(e, gate) < search.cbb_threshold)
                        .map_or(f64::NAN, |e| elevations[e])
                })
                .collect();
            debug!(azimuth, "azimuth column done");
            Ok(row)
        })
        .collect::<Result<_, _>>()?;

    let mut result = Grid2::invalid(search.az_count, ngates);
    for (az, row) in rows.iter().enumerate() {
        result.row_mut(az).copy_from_slice(row);
    }
    Ok(result)
}

/// (ray, gate) indices where the field exceeds `threshold`. NaN cells are
/// skipped, not reported.
pub fn locate_block(field: &Grid2, threshold: f64) -> Vec<(usize, usize)> {
    locate(field, |v| v > threshold)
}

/// (ray, gate) indices where the field is below `threshold`, i.e. gates
/// confirmed unblocked at that level. NaN cells are skipped.
pub fn locate_no_block(field: &Grid2, threshold: f64) -> Vec<(usize, usize)> {
    locate(field, |v| v < threshold)
}

fn locate(field: &Grid2, keep: impl Fn(f64) -> bool) -> Vec<(usize, usize)> {
    let (nrows, ncols) = field.shape();
    let mut hits = Vec::new();
    for row in 0..nrows {
        for col in 0..ncols {
            let v = field.get(row, col);
            if !v.is_nan() && keep(v) {
                hits.push((row, col));
            }
        }
    }
    hits
}
