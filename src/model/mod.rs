//! Frozen model artifacts
//!
//! A [`ModelBundle`] groups the model config, the fitted feature scaler and
//! the sequence forecaster. It is loaded once and passed by reference into
//! every inference call.

mod latent;
mod scaler;

pub use latent::{DenseLayer, LatentForecaster, LatentWeights};
pub use scaler::StandardScaler;

use crate::error::{ArtifactError, InferenceError, Result};
use ndarray::{Array1, Array2};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::HashSet;
use std::fs;
use std::path::Path;
use std::sync::Arc;
use tracing::info;

pub const CONFIG_FILE: &str = "config.json";
pub const SCALER_FILE: &str = "scaler.json";
pub const MODEL_FILE: &str = "model.json";

/// Sequence forecaster: `[W, F]` scaled window in, one log-return per
/// future step out.
///
/// Implementations may be stochastic. They must be callable from several
/// threads at once.
#[cfg_attr(test, mockall::automock)]
pub trait Forecaster: Send + Sync {
    fn predict(&self, window: &Array2<f64>) -> std::result::Result<Array1<f64>, InferenceError>;

    /// Model name for logging
    fn name(&self) -> &str;
}

/// Fitted feature transform
pub trait Scaler: Send + Sync {
    fn transform(&self, rows: &Array2<f64>) -> Result<Array2<f64>>;

    fn n_features(&self) -> usize;
}

/// Model shape and feature order
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelConfig {
    /// Window length W
    #[serde(rename = "W", alias = "window", default = "default_window")]
    pub window: usize,
    /// Forecast horizon H
    #[serde(rename = "H", alias = "horizon", default = "default_horizon")]
    pub horizon: usize,
    #[serde(
        rename = "TARGET_COL",
        alias = "target_column",
        default = "default_target_column"
    )]
    pub target_column: String,
    /// Column order of the model input matrix
    #[serde(rename = "feature_cols", alias = "feature_column_order", default)]
    pub feature_columns: Vec<String>,
}

impl ModelConfig {
    pub fn new(
        window: usize,
        horizon: usize,
        target_column: impl Into<String>,
        feature_columns: Vec<String>,
    ) -> Self {
        Self {
            window,
            horizon,
            target_column: target_column.into(),
            feature_columns,
        }
    }

    pub fn n_features(&self) -> usize {
        self.feature_columns.len()
    }

    pub fn validate(&self) -> Result<()> {
        if self.window == 0 {
            return Err(ArtifactError::InvalidConfig("W must be positive".into()).into());
        }
        if self.horizon == 0 {
            return Err(ArtifactError::InvalidConfig("H must be positive".into()).into());
        }
        if self.target_column.trim().is_empty() {
            return Err(ArtifactError::InvalidConfig("TARGET_COL is empty".into()).into());
        }
        if self.feature_columns.is_empty() {
            return Err(ArtifactError::InvalidConfig("feature_cols is empty".into()).into());
        }
        let mut seen = HashSet::new();
        for col in &self.feature_columns {
            if !seen.insert(col.as_str()) {
                return Err(ArtifactError::InvalidConfig(format!(
                    "duplicate feature column '{}'",
                    col
                ))
                .into());
            }
        }
        Ok(())
    }
}

fn default_window() -> usize {
    90
}

fn default_horizon() -> usize {
    7
}

fn default_target_column() -> String {
    "close".to_string()
}

/// Config, scaler and forecaster loaded together
#[derive(Clone)]
pub struct ModelBundle {
    config: ModelConfig,
    scaler: Arc<dyn Scaler>,
    forecaster: Arc<dyn Forecaster>,
    fingerprint: String,
}

impl std::fmt::Debug for ModelBundle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ModelBundle")
            .field("config", &self.config)
            .field("forecaster", &self.forecaster.name())
            .field("fingerprint", &self.fingerprint)
            .finish()
    }
}

impl ModelBundle {
    /// Assemble a bundle from in-memory parts.
    ///
    /// The fingerprint is derived from the config only.
    pub fn new(
        config: ModelConfig,
        scaler: Arc<dyn Scaler>,
        forecaster: Arc<dyn Forecaster>,
    ) -> Result<Self> {
        config.validate()?;
        if scaler.n_features() != config.n_features() {
            return Err(ArtifactError::DimensionMismatch {
                artifact: SCALER_FILE,
                expected: config.n_features(),
                actual: scaler.n_features(),
            }
            .into());
        }
        let fingerprint = hex::encode(Sha256::digest(serde_json::to_vec(&config)?));
        Ok(Self {
            config,
            scaler,
            forecaster,
            fingerprint,
        })
    }

    /// Load `config.json`, `scaler.json` and `model.json` from `dir`
    pub fn load(dir: &Path) -> Result<Self> {
        let config_bytes = read_artifact(dir, CONFIG_FILE)?;
        let scaler_bytes = read_artifact(dir, SCALER_FILE)?;
        let model_bytes = read_artifact(dir, MODEL_FILE)?;

        let config: ModelConfig = parse_artifact(CONFIG_FILE, &config_bytes)?;
        config.validate()?;

        let scaler: StandardScaler = parse_artifact(SCALER_FILE, &scaler_bytes)?;
        scaler.check()?;
        if scaler.n_features() != config.n_features() {
            return Err(ArtifactError::DimensionMismatch {
                artifact: SCALER_FILE,
                expected: config.n_features(),
                actual: scaler.n_features(),
            }
            .into());
        }

        let weights: LatentWeights = parse_artifact(MODEL_FILE, &model_bytes)?;
        let forecaster = LatentForecaster::from_weights(weights, &config)?;

        let mut hasher = Sha256::new();
        hasher.update(&config_bytes);
        hasher.update(&scaler_bytes);
        hasher.update(&model_bytes);
        let fingerprint = hex::encode(hasher.finalize());

        info!(
            "Loaded model bundle from {} (W={}, H={}, F={}, fingerprint {})",
            dir.display(),
            config.window,
            config.horizon,
            config.n_features(),
            &fingerprint[..12]
        );

        Ok(Self {
            config,
            scaler: Arc::new(scaler),
            forecaster: Arc::new(forecaster),
            fingerprint,
        })
    }

    pub fn config(&self) -> &ModelConfig {
        &self.config
    }

    pub fn scaler(&self) -> &dyn Scaler {
        self.scaler.as_ref()
    }

    pub fn forecaster(&self) -> &dyn Forecaster {
        self.forecaster.as_ref()
    }

    /// Shared handle, for callers that move the forecaster onto a worker
    pub fn forecaster_handle(&self) -> Arc<dyn Forecaster> {
        Arc::clone(&self.forecaster)
    }

    /// SHA-256 of the artifact files, hex encoded
    pub fn fingerprint(&self) -> &str {
        &self.fingerprint
    }
}

fn read_artifact(dir: &Path, name: &str) -> Result<Vec<u8>> {
    let path = dir.join(name);
    if !path.is_file() {
        return Err(ArtifactError::Missing(path).into());
    }
    Ok(fs::read(path)?)
}

fn parse_artifact<T: serde::de::DeserializeOwned>(name: &str, bytes: &[u8]) -> Result<T> {
    serde_json::from_slice(bytes)
        .map_err(|e| ArtifactError::InvalidConfig(format!("{}: {}", name, e)).into())
}
