use std::fs::File;
use std::io::Read;
use std::num::NonZeroUsize;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use anyhow::{Context, Result};
use lru::LruCache;
use tracing::debug;

use crate::error::BlockageError;
use crate::geo::{LatLon, latlon_to_webmercator};

pub const SRTM3_SIZE: usize = 1201;
pub const SRTM1_SIZE: usize = 3601;

const SRTM_VOID: i16 = -32768;

/// Coordinate system the raster grid is expressed in. Polar sample points
/// are reprojected into this CRS before sampling.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RasterCrs {
    /// Plain geographic degrees (lon = x, lat = y), as SRTM tiles.
    Geographic,
    /// Web Mercator meters (EPSG:3857).
    WebMercator,
}

/// A georeferenced elevation raster on a regular north-up grid.
///
/// Cell centers: `x = x_origin + col * dx`, `y = y_origin - row * dy`
/// (row 0 is the northern edge). Values are meters AMSL, NaN for no-data.
/// Immutable after load; shared read-only across sweep computations.
#[derive(Debug, Clone)]
pub struct TerrainRaster {
    nrows: usize,
    ncols: usize,
    x_origin: f64,
    y_origin: f64,
    dx: f64,
    dy: f64,
    crs: RasterCrs,
    values: Vec<f64>,
}

impl TerrainRaster {
    pub fn new(
        nrows: usize,
        ncols: usize,
        x_origin: f64,
        y_origin: f64,
        dx: f64,
        dy: f64,
        crs: RasterCrs,
        values: Vec<f64>,
    ) -> Result<Self, BlockageError> {
        if values.len() != nrows * ncols {
            return Err(BlockageError::Raster(format!(
                "expected {} values for a {}x{} raster, got {}",
                nrows * ncols,
                nrows,
                ncols,
                values.len()
            )));
        }
        if dx <= 0.0 || dy <= 0.0 {
            return Err(BlockageError::Raster(format!(
                "non-positive cell size {dx}x{dy}"
            )));
        }
        Ok(Self {
            nrows,
            ncols,
            x_origin,
            y_origin,
            dx,
            dy,
            crs,
            values,
        })
    }

    /// Load one SRTM `.hgt` tile. The tile's SW corner lat/lon is parsed
    /// from the file name (e.g. `N45E005.hgt`), the resolution from the
    /// file length. Void pixels become NaN.
    pub fn from_hgt(path: &Path) -> Result<Self> {
        let (lat, lon) = parse_hgt_name(path)?;

        let mut file = File::open(path).with_context(|| format!("Failed to open {path:?}"))?;
        let metadata = file.metadata()?;
        let size = match metadata.len() {
            2884802 => SRTM3_SIZE,
            25934402 => SRTM1_SIZE,
            len => anyhow::bail!("Unknown HGT file size: {}", len),
        };

        let mut buffer = Vec::with_capacity(size * size * 2);
        file.read_to_end(&mut buffer)?;

        let values: Vec<f64> = buffer
            .chunks_exact(2)
            .map(|chunk| {
                let raw = i16::from_be_bytes([chunk[0], chunk[1]]);
                if raw == SRTM_VOID { f64::NAN } else { f64::from(raw) }
            })
            .collect();

        let step = 1.0 / (size - 1) as f64;
        debug!(?path, size, lat, lon, "loaded hgt tile");
        Ok(Self {
            nrows: size,
            ncols: size,
            x_origin: f64::from(lon),
            y_origin: f64::from(lat) + 1.0,
            dx: step,
            dy: step,
            crs: RasterCrs::Geographic,
            values,
        })
    }

    pub fn shape(&self) -> (usize, usize) {
        (self.nrows, self.ncols)
    }

    pub fn crs(&self) -> RasterCrs {
        self.crs
    }

    /// Reproject a geographic position into this raster's CRS.
    pub fn project(&self, p: LatLon) -> (f64, f64) {
        match self.crs {
            RasterCrs::Geographic => (p.longitude, p.latitude),
            RasterCrs::WebMercator => {
                let m = latlon_to_webmercator(p);
                (m.x, m.y)
            }
        }
    }

    #[inline(always)]
    fn value(&self, row: usize, col: usize) -> f64 {
        self.values[row * self.ncols + col]
    }

    /// Fractional (col, row) of a CRS point; may fall outside the grid.
    fn grid_pos(&self, x: f64, y: f64) -> (f64, f64) {
        ((x - self.x_origin) / self.dx, (self.y_origin - y) / self.dy)
    }

    /// Restrict the raster to the cells covering `bbox`, with a one-cell
    /// margin. The window borrows the shared raster; nothing is narrowed
    /// in place, so concurrent sweeps each clip independently.
    ///
    /// Fails hard if any part of the box leaves the raster extent — a
    /// truncated window would silently degrade the interpolation.
    pub fn window(&self, bbox: &Bbox) -> Result<RasterWindow<'_>, BlockageError> {
        let (c_min, r_min) = self.grid_pos(bbox.x_min, bbox.y_max);
        let (c_max, r_max) = self.grid_pos(bbox.x_max, bbox.y_min);

        let out_of_bounds = c_min < 0.0
            || r_min < 0.0
            || c_max > (self.ncols - 1) as f64
            || r_max > (self.nrows - 1) as f64;
        if out_of_bounds {
            return Err(BlockageError::ClipOutOfBounds {
                x_min: bbox.x_min,
                y_min: bbox.y_min,
                x_max: bbox.x_max,
                y_max: bbox.y_max,
            });
        }

        let col0 = (c_min.floor() as usize).saturating_sub(1);
        let row0 = (r_min.floor() as usize).saturating_sub(1);
        let col1 = (c_max.ceil() as usize + 1).min(self.ncols - 1);
        let row1 = (r_max.ceil() as usize + 1).min(self.nrows - 1);

        Ok(RasterWindow {
            raster: self,
            row0,
            col0,
            row1,
            col1,
        })
    }
}

fn parse_hgt_name(path: &Path) -> Result<(i32, i32)> {
    let stem = path
        .file_stem()
        .and_then(|s| s.to_str())
        .with_context(|| format!("Bad HGT file name {path:?}"))?;
    anyhow::ensure!(stem.len() == 7, "Bad HGT file name {:?}", path);

    let lat: i32 = stem[1..3].parse()?;
    let lon: i32 = stem[4..7].parse()?;
    let lat = match &stem[0..1] {
        "N" => lat,
        "S" => -lat,
        _ => anyhow::bail!("Bad HGT hemisphere in {:?}", path),
    };
    let lon = match &stem[3..4] {
        "E" => lon,
        "W" => -lon,
        _ => anyhow::bail!("Bad HGT hemisphere in {:?}", path),
    };
    Ok((lat, lon))
}

/// Axis-aligned bounding box in raster CRS units.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Bbox {
    pub x_min: f64,
    pub y_min: f64,
    pub x_max: f64,
    pub y_max: f64,
}

impl Bbox {
    /// Smallest box covering all points. None for an empty set.
    pub fn of_points(points: impl IntoIterator<Item = (f64, f64)>) -> Option<Bbox> {
        let mut bbox: Option<Bbox> = None;
        for (x, y) in points {
            bbox = Some(match bbox {
                None => Bbox {
                    x_min: x,
                    y_min: y,
                    x_max: x,
                    y_max: y,
                },
                Some(b) => Bbox {
                    x_min: b.x_min.min(x),
                    y_min: b.y_min.min(y),
                    x_max: b.x_max.max(x),
                    y_max: b.y_max.max(y),
                },
            });
        }
        bbox
    }
}

/// A clipped, read-only view of a [`TerrainRaster`]. Scoped to one sweep's
/// computation.
pub struct RasterWindow<'a> {
    raster: &'a TerrainRaster,
    row0: usize,
    col0: usize,
    row1: usize,
    col1: usize,
}

impl RasterWindow<'_> {
    pub fn shape(&self) -> (usize, usize) {
        (self.row1 - self.row0 + 1, self.col1 - self.col0 + 1)
    }

    /// Bilinear terrain height at a CRS point. NaN outside the window or
    /// when any contributing cell is no-data.
    pub fn sample(&self, x: f64, y: f64) -> f64 {
        let (c, r) = self.raster.grid_pos(x, y);
        if c < self.col0 as f64 || c > self.col1 as f64 || r < self.row0 as f64
            || r > self.row1 as f64
        {
            return f64::NAN;
        }

        let c0 = (c.floor() as usize).min(self.col1);
        let r0 = (r.floor() as usize).min(self.row1);
        let c1 = (c0 + 1).min(self.col1);
        let r1 = (r0 + 1).min(self.row1);

        let tx = c - c0 as f64;
        let ty = r - r0 as f64;

        let h00 = self.raster.value(r0, c0);
        let h10 = self.raster.value(r0, c1);
        let h01 = self.raster.value(r1, c0);
        let h11 = self.raster.value(r1, c1);

        let h0 = blend(h00, h10, tx);
        let h1 = blend(h01, h11, tx);
        blend(h0, h1, ty)
    }
}

/// Linear blend that ignores a zero-weight endpoint, so a no-data neighbor
/// does not poison a sample landing exactly on a valid cell.
fn blend(a: f64, b: f64, t: f64) -> f64 {
    if t == 0.0 {
        a
    } else if t == 1.0 {
        b
    } else {
        a * (1.0 - t) + b * t
    }
}

/// Caches loaded rasters by path so repeated volume passes (and the
/// per-azimuth solver) share a single load.
pub struct RasterStore {
    cache: Arc<Mutex<LruCache<PathBuf, Arc<TerrainRaster>>>>,
}

impl RasterStore {
    pub fn new(capacity: usize) -> Self {
        let capacity = NonZeroUsize::new(capacity.max(1)).unwrap();
        Self {
            cache: Arc::new(Mutex::new(LruCache::new(capacity))),
        }
    }

    pub fn open(&self, path: &Path) -> Result<Arc<TerrainRaster>> {
        {
            let mut cache = self.cache.lock().unwrap();
            if let Some(raster) = cache.get(path) {
                return Ok(raster.clone());
            }
        }

        let raster = Arc::new(TerrainRaster::from_hgt(path)?);

        let mut cache = self.cache.lock().unwrap();
        cache.put(path.to_path_buf(), raster.clone());
        Ok(raster)
    }
}

impl Default for RasterStore {
    fn default() -> Self {
        Self::new(8)
    }
}
