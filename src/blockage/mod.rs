//! Per-sweep beam blockage pipeline: project gates onto the terrain
//! raster, evaluate the partial block fraction, reduce to cumulative
//! blockage and classify into flags.

use itertools::izip;
use tracing::{debug, warn};

use crate::error::BlockageError;
use crate::geo::polar_to_lonlat_alt;
use crate::grid::Grid2;
use crate::io::RadarVolume;
use crate::physics::beam::{half_power_radius, partial_block_fraction};
use crate::physics::refraction::RefractionParams;
use crate::terrain::{Bbox, TerrainRaster};

#[derive(Debug, Clone, Copy)]
pub struct BeamBlockConfig {
    /// Half-power beam width in degrees.
    pub beam_width: f64,
    pub refraction: RefractionParams,
}

impl Default for BeamBlockConfig {
    fn default() -> Self {
        Self {
            beam_width: 1.0,
            refraction: RefractionParams::default(),
        }
    }
}

/// Terrain-height and beam-center-altitude samples for one sweep,
/// aligned with its (ray, gate) polar grid. Transient: produced by
/// [`project_sweep`], consumed by [`partial_beam_block`].
pub struct SweepGeometry {
    pub terrain: Grid2,
    pub beam_alt: Grid2,
}

/// Map every (azimuth, elevation, range) triple of a sweep to a terrain
/// height and beam-center altitude.
///
/// All gate positions are projected into the raster CRS first; the raster
/// is then clipped to their bounding box (a read-only window, the shared
/// raster itself is never narrowed) before sampling. A footprint outside
/// the raster is a hard error for the sweep.
pub fn project_sweep(
    volume: &RadarVolume,
    azimuths: &[f64],
    elevations: &[f64],
    raster: &TerrainRaster,
    refraction: RefractionParams,
) -> Result<SweepGeometry, BlockageError> {
    if azimuths.len() != elevations.len() {
        return Err(BlockageError::ShapeMismatch(format!(
            "{} azimuths vs {} elevations",
            azimuths.len(),
            elevations.len()
        )));
    }
    let nrays = azimuths.len();
    let ngates = volume.ngates();

    let mut coords = Vec::with_capacity(nrays * ngates);
    let mut beam_alt = Grid2::invalid(nrays, ngates);
    for (ray, (&az, &el)) in izip!(azimuths, elevations).enumerate() {
        for (gate, &range_m) in volume.range.iter().enumerate() {
            let pos = polar_to_lonlat_alt(range_m, az, el, volume.site, refraction);
            coords.push(raster.project(pos));
            beam_alt.set(ray, gate, pos.altitude);
        }
    }

    let bbox = Bbox::of_points(coords.iter().copied()).ok_or_else(|| {
        BlockageError::ShapeMismatch("sweep has no gates to project".to_string())
    })?;
    let window = raster.window(&bbox)?;
    debug!(nrays, ngates, window_shape = ?window.shape(), "clipped raster for sweep");

    let mut terrain = Grid2::invalid(nrays, ngates);
    for ray in 0..nrays {
        for gate in 0..ngates {
            let (x, y) = coords[ray * ngates + gate];
            terrain.set(ray, gate, window.sample(x, y));
        }
    }

    Ok(SweepGeometry { terrain, beam_alt })
}

/// Per-gate partial beam block fraction for one sweep. NaN terrain samples
/// stay NaN; they are never coerced to "unblocked".
pub fn partial_beam_block(
    geom: &SweepGeometry,
    beam_radius: &[f64],
) -> Result<Grid2, BlockageError> {
    let (nrays, ngates) = geom.terrain.shape();
    if beam_radius.len() != ngates {
        return Err(BlockageError::ShapeMismatch(format!(
            "{} beam radii for {} gates",
            beam_radius.len(),
            ngates
        )));
    }
    let mut pbb = Grid2::invalid(nrays, ngates);
    for ray in 0..nrays {
        for (gate, &radius) in beam_radius.iter().enumerate() {
            let frac = partial_block_fraction(
                geom.terrain.get(ray, gate),
                geom.beam_alt.get(ray, gate),
                radius,
            );
            pbb.set(ray, gate, frac);
        }
    }
    Ok(pbb)
}

/// Reduce per-gate PBB into cumulative beam block: for each ray, CBB at
/// gate `g` is the maximum PBB over gates `0..=g`. Power lost earlier on
/// the path is never recovered, so CBB is non-decreasing with range by
/// construction.
///
/// A single forward pass per ray. NaN gates do not feed the running
/// maximum: they report the worst valid obstruction seen so far, or stay
/// NaN while no valid gate has been encountered. An all-invalid ray stays
/// all-invalid.
///
/// This is the one shared reduction; every input representation routes
/// through it.
pub fn cumulative_beam_block(pbb: &Grid2) -> Grid2 {
    let (nrays, ngates) = pbb.shape();
    let mut cbb = Grid2::invalid(nrays, ngates);
    for ray in 0..nrays {
        let mut running: f64 = f64::NAN;
        let row = cbb.row_mut(ray);
        for (gate, &frac) in pbb.row(ray).iter().enumerate() {
            if frac.is_nan() {
                row[gate] = running;
            } else {
                running = if running.is_nan() { frac } else { running.max(frac) };
                row[gate] = running;
            }
        }
    }
    cbb
}

/// Classify PBB and CBB fractions into categorical flags using two
/// thresholds: `value < no_block` is 0 (unblocked), `value >= complete`
/// is 2 (complete), anything between is 1 (partial). A value exactly at
/// `no_block` therefore counts as partial, exactly at `complete` as
/// complete. NaN stays NaN. Inputs are not mutated.
pub fn beam_block_flags(
    pbb: &Grid2,
    cbb: &Grid2,
    no_block_threshold: f64,
    complete_block_threshold: f64,
) -> Result<(Grid2, Grid2), BlockageError> {
    if no_block_threshold >= complete_block_threshold {
        return Err(BlockageError::BadThreshold(format!(
            "no_block threshold {no_block_threshold} must be below complete \
             threshold {complete_block_threshold}"
        )));
    }
    let classify = |grid: &Grid2| {
        let (nrows, ncols) = grid.shape();
        let mut flags = Grid2::invalid(nrows, ncols);
        for row in 0..nrows {
            for col in 0..ncols {
                let v = grid.get(row, col);
                let flag = if v.is_nan() {
                    f64::NAN
                } else if v < no_block_threshold {
                    0.0
                } else if v >= complete_block_threshold {
                    2.0
                } else {
                    1.0
                };
                flags.set(row, col, flag);
            }
        }
        flags
    };
    Ok((classify(pbb), classify(cbb)))
}

/// Single-threshold quick flagging: `value > threshold` is 1, anything
/// else (equality included) is 0. NaN stays NaN.
pub fn threshold_flags(field: &Grid2, threshold: f64) -> Grid2 {
    let (nrows, ncols) = field.shape();
    let mut flags = Grid2::invalid(nrows, ncols);
    for row in 0..nrows {
        for col in 0..ncols {
            let v = field.get(row, col);
            let flag = if v.is_nan() {
                f64::NAN
            } else if v > threshold {
                1.0
            } else {
                0.0
            };
            flags.set(row, col, flag);
        }
    }
    flags
}

/// Compute PBB and CBB for every sweep of a volume and concatenate the
/// per-sweep grids into whole-volume `(total_rays, ngates)` arrays.
pub fn beam_block(
    volume: &RadarVolume,
    raster: &TerrainRaster,
    config: &BeamBlockConfig,
) -> Result<(Grid2, Grid2), BlockageError> {
    volume.validate()?;
    let beam_radius = half_power_radius(&volume.range, config.beam_width);

    let mut pbb_parts = Vec::with_capacity(volume.nsweeps());
    let mut cbb_parts = Vec::with_capacity(volume.nsweeps());
    for sweep in volume.sweeps() {
        let azimuths = &volume.azimuth[sweep.start..sweep.end];
        let elevations = &volume.elevation[sweep.start..sweep.end];

        let geom = project_sweep(volume, azimuths, elevations, raster, config.refraction)?;
        let pbb = partial_beam_block(&geom, &beam_radius)?;

        let invalid_rays = (0..pbb.nrows())
            .filter(|&r| pbb.row(r).iter().all(|v| v.is_nan()))
            .count();
        if invalid_rays > 0 {
            warn!(
                sweep = sweep.number,
                invalid_rays, "rays with no valid terrain samples"
            );
        }

        let cbb = cumulative_beam_block(&pbb);
        debug!(
            sweep = sweep.number,
            fixed_angle = sweep.fixed_angle,
            nrays = pbb.nrows(),
            "sweep blockage computed"
        );
        pbb_parts.push(pbb);
        cbb_parts.push(cbb);
    }

    Ok((
        Grid2::concat_rows(&pbb_parts)?,
        Grid2::concat_rows(&cbb_parts)?,
    ))
}
