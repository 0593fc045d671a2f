//! Latent-Gaussian sequence forecaster
//!
//! Encodes a window summary (last row and column means) into a Gaussian
//! latent, samples it with the reparameterization trick and decodes the
//! sample linearly into H log-returns.

use super::{Forecaster, ModelConfig};
use crate::error::{ArtifactError, InferenceError, Result};
use ndarray::{Array1, Array2, Axis};
use parking_lot::Mutex;
use rand::rngs::StdRng;
use rand::SeedableRng;
use rand_distr::{Distribution, StandardNormal};
use serde::{Deserialize, Serialize};

const LOGVAR_CLAMP: f64 = 10.0;

/// Fully connected layer as stored in `model.json`; `weights` is
/// `input_size` rows by `output_size` columns.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DenseLayer {
    pub weights: Vec<Vec<f64>>,
    pub bias: Vec<f64>,
}

/// Serialized forecaster weights
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LatentWeights {
    pub window: usize,
    pub features: usize,
    pub horizon: usize,
    pub latent_dim: usize,
    /// `2F -> hidden`, tanh
    pub encoder: DenseLayer,
    pub encoder_mu: DenseLayer,
    pub encoder_logvar: DenseLayer,
    /// `latent -> H`
    pub decoder: DenseLayer,
    #[serde(default = "default_sampling")]
    pub sampling: bool,
    #[serde(default)]
    pub seed: Option<u64>,
    /// Per-step log-return clip
    #[serde(default = "default_max_abs_return")]
    pub max_abs_return: f64,
}

fn default_sampling() -> bool {
    true
}

fn default_max_abs_return() -> f64 {
    0.5
}

#[derive(Debug, Clone)]
struct Dense {
    weights: Array2<f64>,
    bias: Array1<f64>,
}

impl Dense {
    fn from_layer(layer: DenseLayer, name: &'static str, input: usize, output: usize) -> Result<Self> {
        if layer.weights.len() != input {
            return Err(ArtifactError::DimensionMismatch {
                artifact: name,
                expected: input,
                actual: layer.weights.len(),
            }
            .into());
        }
        if let Some(row) = layer.weights.iter().find(|r| r.len() != output) {
            return Err(ArtifactError::DimensionMismatch {
                artifact: name,
                expected: output,
                actual: row.len(),
            }
            .into());
        }
        if layer.bias.len() != output {
            return Err(ArtifactError::DimensionMismatch {
                artifact: name,
                expected: output,
                actual: layer.bias.len(),
            }
            .into());
        }

        let flat: Vec<f64> = layer.weights.into_iter().flatten().collect();
        let weights = Array2::from_shape_vec((input, output), flat)
            .map_err(|e| ArtifactError::InvalidConfig(format!("{}: {}", name, e)))?;
        Ok(Self {
            weights,
            bias: Array1::from(layer.bias),
        })
    }

    fn forward(&self, input: &Array1<f64>) -> Array1<f64> {
        input.dot(&self.weights) + &self.bias
    }
}

pub struct LatentForecaster {
    window: usize,
    features: usize,
    encoder: Dense,
    mu: Dense,
    logvar: Dense,
    decoder: Dense,
    sampling: bool,
    max_abs_return: f64,
    rng: Mutex<StdRng>,
}

impl LatentForecaster {
    /// Build from serialized weights, checking every layer against `config`
    pub fn from_weights(weights: LatentWeights, config: &ModelConfig) -> Result<Self> {
        let checks = [
            ("model.window", config.window, weights.window),
            ("model.features", config.n_features(), weights.features),
            ("model.horizon", config.horizon, weights.horizon),
        ];
        for (artifact, expected, actual) in checks {
            if expected != actual {
                return Err(ArtifactError::DimensionMismatch {
                    artifact,
                    expected,
                    actual,
                }
                .into());
            }
        }
        if weights.latent_dim == 0 {
            return Err(ArtifactError::InvalidConfig("latent_dim must be positive".into()).into());
        }
        if !(weights.max_abs_return.is_finite() && weights.max_abs_return > 0.0) {
            return Err(ArtifactError::InvalidConfig("max_abs_return must be positive".into()).into());
        }

        let hidden = weights.encoder.bias.len();
        let encoder = Dense::from_layer(weights.encoder, "model.encoder", 2 * weights.features, hidden)?;
        let mu = Dense::from_layer(weights.encoder_mu, "model.encoder_mu", hidden, weights.latent_dim)?;
        let logvar = Dense::from_layer(
            weights.encoder_logvar,
            "model.encoder_logvar",
            hidden,
            weights.latent_dim,
        )?;
        let decoder = Dense::from_layer(weights.decoder, "model.decoder", weights.latent_dim, weights.horizon)?;

        let rng = match weights.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_os_rng(),
        };

        Ok(Self {
            window: weights.window,
            features: weights.features,
            encoder,
            mu,
            logvar,
            decoder,
            sampling: weights.sampling,
            max_abs_return: weights.max_abs_return,
            rng: Mutex::new(rng),
        })
    }

    fn summarize(&self, window: &Array2<f64>) -> std::result::Result<Array1<f64>, InferenceError> {
        let last = window.row(self.window - 1);
        let mean = window
            .mean_axis(Axis(0))
            .ok_or_else(|| InferenceError::Failed("empty window".to_string()))?;
        Ok(last.iter().chain(mean.iter()).copied().collect())
    }

    fn standard_normal(&self, n: usize) -> Array1<f64> {
        let mut rng = self.rng.lock();
        Array1::from_shape_fn(n, |_| StandardNormal.sample(&mut *rng))
    }
}

impl Forecaster for LatentForecaster {
    fn predict(&self, window: &Array2<f64>) -> std::result::Result<Array1<f64>, InferenceError> {
        let (rows, cols) = window.dim();
        if rows != self.window || cols != self.features {
            return Err(InferenceError::WindowShape {
                expected_rows: self.window,
                expected_cols: self.features,
                rows,
                cols,
            });
        }

        let summary = self.summarize(window)?;
        let hidden = self.encoder.forward(&summary).mapv(f64::tanh);
        let mu = self.mu.forward(&hidden);

        let z = if self.sampling {
            let std = self
                .logvar
                .forward(&hidden)
                .mapv(|v| (0.5 * v.clamp(-LOGVAR_CLAMP, LOGVAR_CLAMP)).exp());
            let eps = self.standard_normal(mu.len());
            &mu + &(std * eps)
        } else {
            mu
        };

        let limit = self.max_abs_return;
        Ok(self.decoder.forward(&z).mapv(|r| {
            if r.is_finite() {
                r.clamp(-limit, limit)
            } else {
                r
            }
        }))
    }

    fn name(&self) -> &str {
        "latent-gaussian"
    }
}
