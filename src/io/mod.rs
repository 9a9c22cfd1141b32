use serde::Deserialize;

use crate::error::BlockageError;
use crate::geo::LatLon;
use crate::grid::{Grid2, linspace};

/// A polar radar volume: site position, the shared gate range array and
/// flat per-ray azimuth/elevation arrays partitioned into sweeps.
///
/// Both input representations (structured object, JSON document) normalize
/// to this type, so every downstream computation sees identical geometry
/// inputs regardless of origin.
#[derive(Debug, Clone)]
pub struct RadarVolume {
    pub site: LatLon,
    /// Gate center ranges in meters, shared by every ray.
    pub range: Vec<f64>,
    /// Per-ray azimuth in degrees, flat across all sweeps.
    pub azimuth: Vec<f64>,
    /// Per-ray elevation in degrees, flat across all sweeps.
    pub elevation: Vec<f64>,
    /// First ray index of each sweep.
    pub sweep_start_ray_index: Vec<usize>,
    /// Last ray index of each sweep (inclusive).
    pub sweep_end_ray_index: Vec<usize>,
    /// Nominal elevation angle per sweep, degrees.
    pub fixed_angle: Vec<f64>,
}

/// Borrowed view of one sweep's rays.
#[derive(Debug, Clone, Copy)]
pub struct Sweep {
    pub number: usize,
    pub start: usize,
    /// Exclusive end ray index.
    pub end: usize,
    pub fixed_angle: f64,
}

impl RadarVolume {
    pub fn ngates(&self) -> usize {
        self.range.len()
    }

    pub fn nrays(&self) -> usize {
        self.azimuth.len()
    }

    pub fn nsweeps(&self) -> usize {
        self.sweep_start_ray_index.len()
    }

    pub fn validate(&self) -> Result<(), BlockageError> {
        if self.range.is_empty() {
            return Err(BlockageError::BadVolume("empty range array".to_string()));
        }
        if self.azimuth.len() != self.elevation.len() {
            return Err(BlockageError::BadVolume(format!(
                "azimuth ({}) and elevation ({}) lengths differ",
                self.azimuth.len(),
                self.elevation.len()
            )));
        }
        if self.sweep_start_ray_index.len() != self.sweep_end_ray_index.len() {
            return Err(BlockageError::BadVolume(
                "sweep start/end index lengths differ".to_string(),
            ));
        }
        if self.sweep_start_ray_index.is_empty() {
            return Err(BlockageError::BadVolume("volume has no sweeps".to_string()));
        }
        for (i, (&start, &end)) in self
            .sweep_start_ray_index
            .iter()
            .zip(&self.sweep_end_ray_index)
            .enumerate()
        {
            if end < start || end >= self.nrays() {
                return Err(BlockageError::BadVolume(format!(
                    "sweep {i} ray range {start}..={end} out of bounds for {} rays",
                    self.nrays()
                )));
            }
        }
        Ok(())
    }

    pub fn sweeps(&self) -> impl Iterator<Item = Sweep> + '_ {
        self.sweep_start_ray_index
            .iter()
            .zip(&self.sweep_end_ray_index)
            .enumerate()
            .map(|(number, (&start, &end))| Sweep {
                number,
                start,
                end: end + 1,
                fixed_angle: self.fixed_angle.get(number).copied().unwrap_or_else(|| {
                    // Fall back to the first ray's elevation when the
                    // volume carries no fixed-angle array.
                    self.elevation[start]
                }),
            })
    }

    /// Synthetic plan-position volume: `nsweeps` sweeps of `rays_per_sweep`
    /// evenly spaced azimuths, each at its fixed elevation angle.
    pub fn ppi(
        site: LatLon,
        range: Vec<f64>,
        rays_per_sweep: usize,
        fixed_angles: Vec<f64>,
    ) -> Self {
        let nsweeps = fixed_angles.len();
        let az_step = 360.0 / rays_per_sweep as f64;
        let mut azimuth = Vec::with_capacity(nsweeps * rays_per_sweep);
        let mut elevation = Vec::with_capacity(nsweeps * rays_per_sweep);
        let mut starts = Vec::with_capacity(nsweeps);
        let mut ends = Vec::with_capacity(nsweeps);
        for (s, &angle) in fixed_angles.iter().enumerate() {
            starts.push(s * rays_per_sweep);
            ends.push((s + 1) * rays_per_sweep - 1);
            for r in 0..rays_per_sweep {
                azimuth.push(az_step * r as f64);
                elevation.push(angle);
            }
        }
        Self {
            site,
            range,
            azimuth,
            elevation,
            sweep_start_ray_index: starts,
            sweep_end_ray_index: ends,
            fixed_angle: fixed_angles,
        }
    }

    /// Synthetic range-height volume: one sweep holding every elevation of
    /// the search grid at a single azimuth. The elevation solver builds one
    /// of these per azimuth.
    pub fn rhi(site: LatLon, range: Vec<f64>, azimuth_deg: f64, elevations: Vec<f64>) -> Self {
        let nrays = elevations.len();
        Self {
            site,
            range,
            azimuth: vec![azimuth_deg; nrays],
            elevation: elevations,
            sweep_start_ray_index: vec![0],
            sweep_end_ray_index: vec![nrays.saturating_sub(1)],
            fixed_angle: vec![azimuth_deg],
        }
    }

    /// Parse an X-SAPR style JSON document. Every variable's `data` entry
    /// may be a plain scalar/array or a string containing a JSON-encoded
    /// array, as the documents in the wild mix both.
    pub fn from_json(text: &str) -> Result<Self, BlockageError> {
        let doc: JsonDocument =
            serde_json::from_str(text).map_err(|e| BlockageError::BadVolume(e.to_string()))?;
        let v = doc.variables;

        let elevation = v.elevation.data.array()?;
        let nsweeps = v.sweep_start_ray_index.data.array()?.len();
        let fixed_angle = match v.fixed_angle {
            Some(var) => var.data.array()?,
            // Derive nominal angles from the first ray of each sweep.
            None => {
                let starts = v.sweep_start_ray_index.data.indices()?;
                starts
                    .iter()
                    .take(nsweeps)
                    .map(|&s| elevation.get(s).copied().unwrap_or(f64::NAN))
                    .collect()
            }
        };

        let volume = Self {
            site: LatLon {
                latitude: v.latitude.data.scalar()?,
                longitude: v.longitude.data.scalar()?,
                altitude: v.altitude.data.scalar()?,
            },
            range: v.range.data.array()?,
            azimuth: v.azimuth.data.array()?,
            elevation,
            sweep_start_ray_index: v.sweep_start_ray_index.data.indices()?,
            sweep_end_ray_index: v.sweep_end_ray_index.data.indices()?,
            fixed_angle,
        };
        volume.validate()?;
        Ok(volume)
    }
}

/// Convenience PPI range array: `ngates` gates from `range_start` at
/// `gate_space` meter spacing.
pub fn gate_ranges(ngates: usize, range_start: f64, gate_space: f64) -> Vec<f64> {
    linspace(
        range_start,
        (ngates - 1) as f64 * gate_space + range_start,
        ngates,
    )
}

#[derive(Deserialize)]
struct JsonDocument {
    variables: JsonVariables,
}

#[derive(Deserialize)]
struct JsonVariables {
    longitude: JsonVariable,
    latitude: JsonVariable,
    altitude: JsonVariable,
    range: JsonVariable,
    azimuth: JsonVariable,
    elevation: JsonVariable,
    sweep_start_ray_index: JsonVariable,
    sweep_end_ray_index: JsonVariable,
    #[serde(default)]
    fixed_angle: Option<JsonVariable>,
}

#[derive(Deserialize)]
struct JsonVariable {
    data: JsonData,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum JsonData {
    Scalar(f64),
    Array(Vec<f64>),
    /// A string holding a JSON-encoded scalar or array.
    Encoded(String),
}

impl JsonData {
    fn scalar(&self) -> Result<f64, BlockageError> {
        match self {
            JsonData::Scalar(v) => Ok(*v),
            JsonData::Array(a) if a.len() == 1 => Ok(a[0]),
            JsonData::Encoded(s) => {
                let decoded: JsonData = serde_json::from_str(s)
                    .map_err(|e| BlockageError::BadVolume(e.to_string()))?;
                decoded.scalar()
            }
            _ => Err(BlockageError::BadVolume(
                "expected scalar variable".to_string(),
            )),
        }
    }

    fn array(&self) -> Result<Vec<f64>, BlockageError> {
        match self {
            JsonData::Scalar(v) => Ok(vec![*v]),
            JsonData::Array(a) => Ok(a.clone()),
            JsonData::Encoded(s) => {
                let decoded: Vec<f64> = serde_json::from_str(s)
                    .map_err(|e| BlockageError::BadVolume(e.to_string()))?;
                Ok(decoded)
            }
        }
    }

    fn indices(&self) -> Result<Vec<usize>, BlockageError> {
        self.array()?
            .into_iter()
            .map(|v| {
                if v < 0.0 || v.fract() != 0.0 {
                    Err(BlockageError::BadVolume(format!("bad ray index {v}")))
                } else {
                    Ok(v as usize)
                }
            })
            .collect()
    }
}

/// A computed per-gate field plus the descriptive metadata attached to it
/// when stored in a volume's field collection.
#[derive(Debug, Clone)]
pub struct BlockageField {
    pub standard_name: &'static str,
    pub long_name: &'static str,
    pub units: &'static str,
    pub comment: &'static str,
    pub coordinates: &'static str,
    pub data: Grid2,
}

pub fn pbb_field(data: Grid2) -> BlockageField {
    BlockageField {
        standard_name: "partial_beam_block",
        long_name: "Partial Beam Block Fraction",
        units: "unitless",
        comment: "Partial beam block fraction due to terrain.",
        coordinates: "elevation, azimuth, range",
        data,
    }
}

pub fn cbb_field(data: Grid2) -> BlockageField {
    BlockageField {
        standard_name: "cumulative_beam_block",
        long_name: "Cumulative Beam Block Fraction",
        units: "unitless",
        comment: "Cumulative beam block fraction due to terrain.",
        coordinates: "elevation, azimuth, range",
        data,
    }
}

pub fn pbb_flags_field(data: Grid2) -> BlockageField {
    BlockageField {
        standard_name: "partial_beam_block_flag",
        long_name: "Partial Beam Block Flag",
        units: "unitless",
        comment: "Partial beam block fraction flag, 1 for flagged values, 0 for non-flagged.",
        coordinates: "elevation, azimuth, range",
        data,
    }
}

pub fn cbb_flags_field(data: Grid2) -> BlockageField {
    BlockageField {
        standard_name: "cumulative_beam_block_flag",
        long_name: "Cumulative Beam Block Flag",
        units: "unitless",
        comment: "Cumulative beam block fraction flag, 1 for flagged values, 0 for non-flagged.",
        coordinates: "elevation, azimuth, range",
        data,
    }
}

pub fn lowest_el_field(data: Grid2) -> BlockageField {
    BlockageField {
        standard_name: "low_el_not_blocked",
        long_name: "Lowest Elevation Not Blocked",
        units: "Degrees",
        comment: "Lowest elevation when each gate will achieve less than 0.01 CBB.",
        coordinates: "elevation, azimuth, range",
        data,
    }
}
