pub mod blockage;
pub mod error;
pub mod geo;
pub mod grid;
pub mod io;
pub mod physics;
pub mod solver;
pub mod terrain;

pub use blockage::{BeamBlockConfig, beam_block, beam_block_flags, threshold_flags};
pub use error::BlockageError;
pub use grid::Grid2;
pub use io::RadarVolume;
pub use solver::{ElevationSearch, lowest_unblocked_elevation};
pub use terrain::TerrainRaster;

#[cfg(test)]
mod tests;
