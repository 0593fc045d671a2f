//! Standard scaler: `(x - mean) / scale`

use super::Scaler;
use crate::error::{ArtifactError, Result};
use ndarray::{Array1, Array2};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StandardScaler {
    pub mean: Vec<f64>,
    pub scale: Vec<f64>,
}

impl StandardScaler {
    pub fn new(mean: Vec<f64>, scale: Vec<f64>) -> Result<Self> {
        let scaler = Self { mean, scale };
        scaler.check()?;
        Ok(scaler)
    }

    /// Pass-through scaler for `n` features
    pub fn identity(n: usize) -> Self {
        Self {
            mean: vec![0.0; n],
            scale: vec![1.0; n],
        }
    }

    pub(crate) fn check(&self) -> Result<()> {
        if self.mean.len() != self.scale.len() {
            return Err(ArtifactError::DimensionMismatch {
                artifact: "scaler.scale",
                expected: self.mean.len(),
                actual: self.scale.len(),
            }
            .into());
        }
        if self.mean.iter().chain(&self.scale).any(|v| !v.is_finite()) {
            return Err(ArtifactError::InvalidConfig("scaler has non-finite parameters".into()).into());
        }
        Ok(())
    }

    /// Zero (constant feature) scales are treated as 1
    fn effective_scale(&self) -> Array1<f64> {
        self.scale
            .iter()
            .map(|&s| if s == 0.0 { 1.0 } else { s })
            .collect()
    }
}

impl Scaler for StandardScaler {
    fn transform(&self, rows: &Array2<f64>) -> Result<Array2<f64>> {
        if rows.ncols() != self.mean.len() {
            return Err(ArtifactError::DimensionMismatch {
                artifact: "scaler input",
                expected: self.mean.len(),
                actual: rows.ncols(),
            }
            .into());
        }
        let mean = Array1::from(self.mean.clone());
        let scale = self.effective_scale();
        Ok((rows - &mean) / &scale)
    }

    fn n_features(&self) -> usize {
        self.mean.len()
    }
}
