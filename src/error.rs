use thiserror::Error;

#[derive(Debug, Error)]
pub enum BlockageError {
    /// The projected sweep footprint falls (partly) outside the raster
    /// extent. Clipping never proceeds with truncated data.
    #[error(
        "sweep footprint ({x_min:.1}..{x_max:.1}, {y_min:.1}..{y_max:.1}) \
         outside raster extent"
    )]
    ClipOutOfBounds {
        x_min: f64,
        y_min: f64,
        x_max: f64,
        y_max: f64,
    },

    #[error("malformed radar volume: {0}")]
    BadVolume(String),

    #[error("shape mismatch: {0}")]
    ShapeMismatch(String),

    #[error("invalid threshold: {0}")]
    BadThreshold(String),

    #[error("raster error: {0}")]
    Raster(String),
}
