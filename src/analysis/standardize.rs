use ndarray::{Array1, Axis};

use crate::data::model::CurveMatrix;
use crate::error::CurveError;

/// Columns whose population std is below this are treated as constant and
/// left unscaled (scale 1), so they center to zero instead of dividing by ~0.
pub const STD_EPSILON: f64 = 1e-12;

/// Frozen per-column mean and scale, fit once on a reference matrix.
#[derive(Debug, Clone, PartialEq)]
pub struct Standardizer {
    pub mean: Array1<f64>,
    pub scale: Array1<f64>,
}

impl Standardizer {
    /// Fit on `reference`. Uses the population standard deviation.
    pub fn fit(reference: &CurveMatrix) -> Result<Self, CurveError> {
        if reference.nrows() == 0 {
            return Err(CurveError::InsufficientPoints { found: 0 });
        }
        let mean = reference
            .values
            .mean_axis(Axis(0))
            .ok_or(CurveError::InsufficientPoints { found: 0 })?;
        let scale = reference.values.std_axis(Axis(0), 0.0).mapv(|s| {
            if s < STD_EPSILON {
                1.0
            } else {
                s
            }
        });
        Ok(Standardizer { mean, scale })
    }

    /// Apply the frozen statistics. Never refits.
    pub fn apply(&self, matrix: &CurveMatrix) -> Result<CurveMatrix, CurveError> {
        matrix.check_width(self.mean.len())?;
        let values = (&matrix.values - &self.mean) / &self.scale;
        Ok(CurveMatrix {
            names: matrix.names.clone(),
            values,
        })
    }
}
