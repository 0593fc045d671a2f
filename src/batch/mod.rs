//! Batch evaluation over every symbol of a feature table.
//!
//! Symbols run one at a time on a blocking worker. A failing symbol becomes a
//! [`SymbolOutcome::Failed`] entry and never stops the run.

mod checkpoint;
mod guard;
#[cfg(test)]
mod tests;

pub use checkpoint::{Checkpoint, CheckpointEntry, CheckpointStatus};
pub use guard::{GuardedForecaster, RetryPolicy};

use crate::config::EvaluationConfig;
use crate::data::{FeatureFrame, MarketTable};
use crate::engine::{metrics, report, InferenceEngine};
use crate::error::{ErrorKind, ForecastError, Result};
use crate::model::ModelBundle;
use crate::types::{MetricsResult, ResultBundle};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio::runtime::Handle;
use tracing::{info, warn};
use uuid::Uuid;

pub const METRICS_FILE: &str = "metrics_backtest_all_symbols.csv";
pub const SUMMARY_FILE: &str = "summary.json";

/// Per-run knobs, usually taken from [`EvaluationConfig`]
#[derive(Debug, Clone)]
pub struct BatchSettings {
    pub backtest_days: usize,
    pub lookback_display: usize,
    pub inference_timeout: Duration,
    pub retry: RetryPolicy,
    pub output_dir: PathBuf,
}

impl From<&EvaluationConfig> for BatchSettings {
    fn from(config: &EvaluationConfig) -> Self {
        Self {
            backtest_days: config.backtest_days,
            lookback_display: config.lookback_display,
            inference_timeout: config.inference_timeout(),
            retry: config.retry_policy(),
            output_dir: config.resolved_output_dir(),
        }
    }
}

impl Default for BatchSettings {
    fn default() -> Self {
        Self::from(&EvaluationConfig::default())
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct SymbolFailure {
    pub symbol: String,
    pub kind: ErrorKind,
    pub detail: String,
}

impl SymbolFailure {
    pub fn from_error(symbol: &str, err: &ForecastError) -> Self {
        Self {
            symbol: symbol.to_string(),
            kind: err.kind(),
            detail: err.to_string(),
        }
    }
}

#[derive(Debug, Clone)]
pub enum SymbolOutcome {
    Completed(Box<ResultBundle>),
    Failed(SymbolFailure),
    /// Already completed with the same bundle in a previous run; carries
    /// the metrics recorded then
    Skipped {
        symbol: String,
        metrics: Option<MetricsResult>,
    },
}

impl SymbolOutcome {
    pub fn symbol(&self) -> &str {
        match self {
            SymbolOutcome::Completed(bundle) => &bundle.symbol,
            SymbolOutcome::Failed(failure) => &failure.symbol,
            SymbolOutcome::Skipped { symbol, .. } => symbol,
        }
    }
}

#[derive(Debug, Clone)]
pub struct BatchReport {
    pub run_id: Uuid,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub fingerprint: String,
    pub outcomes: Vec<SymbolOutcome>,
}

/// Serializable digest of a [`BatchReport`]
#[derive(Debug, Clone, Serialize)]
pub struct BatchSummary {
    pub run_id: Uuid,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub fingerprint: String,
    pub succeeded: usize,
    pub failed: usize,
    pub skipped: usize,
    pub aggregate: MetricsResult,
    pub failures: Vec<SymbolFailure>,
}

impl BatchReport {
    pub fn completed(&self) -> impl Iterator<Item = &ResultBundle> {
        self.outcomes.iter().filter_map(|o| match o {
            SymbolOutcome::Completed(bundle) => Some(bundle.as_ref()),
            _ => None,
        })
    }

    pub fn failures(&self) -> impl Iterator<Item = &SymbolFailure> {
        self.outcomes.iter().filter_map(|o| match o {
            SymbolOutcome::Failed(failure) => Some(failure),
            _ => None,
        })
    }

    pub fn succeeded(&self) -> usize {
        self.completed().count()
    }

    pub fn failed(&self) -> usize {
        self.failures().count()
    }

    pub fn skipped(&self) -> usize {
        self.outcomes
            .iter()
            .filter(|o| matches!(o, SymbolOutcome::Skipped { .. }))
            .count()
    }

    /// Metrics of every completed symbol, including those completed by an
    /// earlier run and skipped in this one
    pub fn metric_rows(&self) -> Vec<(String, MetricsResult)> {
        self.outcomes
            .iter()
            .filter_map(|o| match o {
                SymbolOutcome::Completed(bundle) => Some((bundle.symbol.clone(), bundle.metrics)),
                SymbolOutcome::Skipped {
                    symbol,
                    metrics: Some(m),
                } => Some((symbol.clone(), *m)),
                _ => None,
            })
            .collect()
    }

    /// Cross-symbol metrics over [`Self::metric_rows`]
    pub fn aggregate(&self) -> MetricsResult {
        let results: Vec<MetricsResult> = self.metric_rows().into_iter().map(|(_, m)| m).collect();
        metrics::aggregate(&results)
    }

    pub fn summary(&self) -> BatchSummary {
        BatchSummary {
            run_id: self.run_id,
            started_at: self.started_at,
            finished_at: self.finished_at,
            fingerprint: self.fingerprint.clone(),
            succeeded: self.succeeded(),
            failed: self.failed(),
            skipped: self.skipped(),
            aggregate: self.aggregate(),
            failures: self.failures().cloned().collect(),
        }
    }

    pub fn log_summary(&self) {
        let elapsed = self.finished_at - self.started_at;
        info!(
            "Run {} finished in {}s: {} succeeded, {} failed, {} skipped",
            self.run_id,
            elapsed.num_seconds(),
            self.succeeded(),
            self.failed(),
            self.skipped()
        );
        info!("Aggregate: {}", self.aggregate());
        for failure in self.failures() {
            warn!("  {} [{}] {}", failure.symbol, failure.kind, failure.detail);
        }
    }

    /// Metrics CSV (sorted by rmse), one JSON per completed symbol and the
    /// run summary
    pub fn write_outputs(&self, dir: &Path) -> Result<()> {
        std::fs::create_dir_all(dir)?;

        let rows = self.metric_rows();
        if !rows.is_empty() {
            report::write_metrics_csv(&dir.join(METRICS_FILE), &rows)?;
        }
        for bundle in self.completed() {
            report::write_result_json(dir, bundle)?;
        }

        let file = std::fs::File::create(dir.join(SUMMARY_FILE))?;
        serde_json::to_writer_pretty(file, &self.summary())?;
        info!("Wrote {} results to {}", rows.len(), dir.display());
        Ok(())
    }
}

/// Run one symbol end to end on a blocking worker, with every forecaster
/// call guarded by the configured timeout and retry policy
pub async fn infer_symbol(
    bundle: Arc<ModelBundle>,
    table: Arc<MarketTable>,
    symbol: String,
    settings: BatchSettings,
) -> Result<ResultBundle> {
    let handle = Handle::current();
    tokio::task::spawn_blocking(move || {
        let guarded = GuardedForecaster::new(
            bundle.forecaster_handle(),
            handle,
            settings.inference_timeout,
            settings.retry.clone(),
        );
        let frame = FeatureFrame::build(table.get(&symbol)?, bundle.config())?;
        InferenceEngine::with_forecaster(&bundle, &guarded).run(
            &frame,
            settings.backtest_days,
            settings.lookback_display,
        )
    })
    .await
    .map_err(|e| ForecastError::Internal(format!("inference worker failed: {}", e)))?
}

pub struct BatchEvaluator {
    bundle: Arc<ModelBundle>,
    settings: BatchSettings,
}

impl BatchEvaluator {
    pub fn new(bundle: Arc<ModelBundle>, settings: BatchSettings) -> Self {
        Self { bundle, settings }
    }

    pub fn settings(&self) -> &BatchSettings {
        &self.settings
    }

    /// Evaluate every symbol in sorted order.
    ///
    /// With a checkpoint, symbols already completed under the same bundle
    /// fingerprint are skipped and every finished symbol is appended.
    pub async fn run(
        &self,
        table: Arc<MarketTable>,
        mut checkpoint: Option<&mut Checkpoint>,
    ) -> Result<BatchReport> {
        let run_id = Uuid::new_v4();
        let started_at = Utc::now();
        let fingerprint = self.bundle.fingerprint().to_string();

        let mut symbols = table.symbols().to_vec();
        symbols.sort();
        info!(
            "Run {}: evaluating {} symbols (backtest {}d, timeout {:?})",
            run_id,
            symbols.len(),
            self.settings.backtest_days,
            self.settings.inference_timeout
        );

        let mut outcomes = Vec::with_capacity(symbols.len());
        for (i, symbol) in symbols.into_iter().enumerate() {
            if let Some(cp) = checkpoint.as_deref() {
                if cp.is_completed(&symbol, &fingerprint) {
                    info!("[{}] {} already completed, skipping", i + 1, symbol);
                    let metrics = cp.entry(&symbol).and_then(|e| e.metrics);
                    outcomes.push(SymbolOutcome::Skipped { symbol, metrics });
                    continue;
                }
            }

            let result = infer_symbol(
                Arc::clone(&self.bundle),
                Arc::clone(&table),
                symbol.clone(),
                self.settings.clone(),
            )
            .await;

            let (outcome, entry) = match result {
                Ok(bundle) => {
                    let entry = CheckpointEntry::completed(&symbol, &fingerprint, bundle.metrics);
                    (SymbolOutcome::Completed(Box::new(bundle)), entry)
                }
                Err(e) => {
                    warn!("[{}] {} failed: {}", i + 1, symbol, e);
                    let failure = SymbolFailure::from_error(&symbol, &e);
                    let entry = CheckpointEntry::failed(&symbol, &fingerprint, &failure.detail);
                    (SymbolOutcome::Failed(failure), entry)
                }
            };

            if let Some(cp) = checkpoint.as_deref_mut() {
                cp.record(entry).await?;
            }
            outcomes.push(outcome);
        }

        Ok(BatchReport {
            run_id,
            started_at,
            finished_at: Utc::now(),
            fingerprint,
            outcomes,
        })
    }
}
