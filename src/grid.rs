use serde::{Deserialize, Serialize};

use crate::error::BlockageError;

/// Row-major 2-D grid of f64 values. Rows are rays (or azimuths), columns
/// are range gates. `f64::NAN` marks an invalid/masked cell; 0.0 always
/// means a confirmed value, never "unknown".
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Grid2 {
    nrows: usize,
    ncols: usize,
    data: Vec<f64>,
}

impl Grid2 {
    pub fn filled(nrows: usize, ncols: usize, value: f64) -> Self {
        Self {
            nrows,
            ncols,
            data: vec![value; nrows * ncols],
        }
    }

    pub fn invalid(nrows: usize, ncols: usize) -> Self {
        Self::filled(nrows, ncols, f64::NAN)
    }

    pub fn from_vec(nrows: usize, ncols: usize, data: Vec<f64>) -> Result<Self, BlockageError> {
        if data.len() != nrows * ncols {
            return Err(BlockageError::ShapeMismatch(format!(
                "expected {} values for a {}x{} grid, got {}",
                nrows * ncols,
                nrows,
                ncols,
                data.len()
            )));
        }
        Ok(Self { nrows, ncols, data })
    }

    pub fn nrows(&self) -> usize {
        self.nrows
    }

    pub fn ncols(&self) -> usize {
        self.ncols
    }

    pub fn shape(&self) -> (usize, usize) {
        (self.nrows, self.ncols)
    }

    #[inline(always)]
    pub fn get(&self, row: usize, col: usize) -> f64 {
        self.data[row * self.ncols + col]
    }

    #[inline(always)]
    pub fn set(&mut self, row: usize, col: usize, value: f64) {
        self.data[row * self.ncols + col] = value;
    }

    pub fn row(&self, row: usize) -> &[f64] {
        let start = row * self.ncols;
        &self.data[start..start + self.ncols]
    }

    pub fn row_mut(&mut self, row: usize) -> &mut [f64] {
        let start = row * self.ncols;
        &mut self.data[start..start + self.ncols]
    }

    pub fn values(&self) -> &[f64] {
        &self.data
    }

    /// Stack grids vertically (along the ray axis). All grids must share
    /// the same column count; the per-sweep results of a volume pass are
    /// concatenated this way in sweep order.
    pub fn concat_rows(parts: &[Grid2]) -> Result<Grid2, BlockageError> {
        let ncols = match parts.first() {
            Some(g) => g.ncols,
            None => {
                return Err(BlockageError::ShapeMismatch(
                    "cannot concatenate zero grids".to_string(),
                ));
            }
        };
        let mut data = Vec::with_capacity(parts.iter().map(|g| g.data.len()).sum());
        let mut nrows = 0;
        for part in parts {
            if part.ncols != ncols {
                return Err(BlockageError::ShapeMismatch(format!(
                    "column count {} != {}",
                    part.ncols, ncols
                )));
            }
            nrows += part.nrows;
            data.extend_from_slice(&part.data);
        }
        Ok(Grid2 { nrows, ncols, data })
    }
}

/// `count` evenly spaced values from `start` to `end` inclusive.
pub fn linspace(start: f64, end: f64, count: usize) -> Vec<f64> {
    if count == 0 {
        return Vec::new();
    }
    if count == 1 {
        return vec![start];
    }
    let step = (end - start) / (count - 1) as f64;
    (0..count).map(|i| start + step * i as f64).collect()
}
