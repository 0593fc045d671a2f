//! Tests for the batch evaluator

#[cfg(test)]
mod tests {
    use super::super::*;
    use crate::error::{ErrorKind, InferenceError};
    use crate::model::{Forecaster, ModelConfig, StandardScaler};
    use ndarray::{Array1, Array2};
    use std::fmt::Write as _;

    struct Drift;

    impl Forecaster for Drift {
        fn predict(&self, _window: &Array2<f64>) -> std::result::Result<Array1<f64>, InferenceError> {
            Ok(Array1::from_elem(2, 0.001))
        }

        fn name(&self) -> &str {
            "drift"
        }
    }

    struct Stuck;

    impl Forecaster for Stuck {
        fn predict(&self, _window: &Array2<f64>) -> std::result::Result<Array1<f64>, InferenceError> {
            std::thread::sleep(Duration::from_millis(200));
            Ok(Array1::zeros(2))
        }

        fn name(&self) -> &str {
            "stuck"
        }
    }

    fn bundle(forecaster: Arc<dyn Forecaster>) -> Arc<ModelBundle> {
        let config = ModelConfig::new(5, 2, "close", vec!["rsi_14".to_string()]);
        Arc::new(
            ModelBundle::new(config, Arc::new(StandardScaler::identity(1)), forecaster).unwrap(),
        )
    }

    /// CCC and AAA have enough rows, BBB does not
    fn table() -> Arc<MarketTable> {
        table_with_bbb_rows(8)
    }

    fn table_with_bbb_rows(bbb_rows: usize) -> Arc<MarketTable> {
        let mut csv = String::from("time,symbol,close,rsi_14,volume\n");
        for (symbol, rows) in [("CCC", 15), ("BBB", bbb_rows), ("AAA", 20)] {
            for i in 0..rows {
                let day = chrono::NaiveDate::from_ymd_opt(2024, 1, 1).unwrap()
                    + chrono::Days::new(i as u64);
                let close = 50.0 + (i as f64 * 0.7).cos() * 3.0;
                writeln!(csv, "{},{},{},{},{}", day, symbol, close, 40.0 + i as f64, 1000).unwrap();
            }
        }
        Arc::new(MarketTable::from_reader(csv.as_bytes()).unwrap())
    }

    fn settings(dir: &Path) -> BatchSettings {
        BatchSettings {
            backtest_days: 5,
            lookback_display: 10,
            inference_timeout: Duration::from_secs(5),
            retry: RetryPolicy {
                max_attempts: 2,
                initial_backoff: Duration::from_millis(1),
                max_backoff: Duration::from_millis(2),
            },
            output_dir: dir.to_path_buf(),
        }
    }

    #[test]
    fn test_settings_from_config() {
        let config = EvaluationConfig::default();
        let settings = BatchSettings::from(&config);
        assert_eq!(settings.backtest_days, 60);
        assert_eq!(settings.lookback_display, 120);
        assert_eq!(settings.inference_timeout, Duration::from_secs(30));
        assert_eq!(settings.retry.max_attempts, 3);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_failures_are_isolated() {
        let dir = tempfile::tempdir().unwrap();
        let evaluator = BatchEvaluator::new(bundle(Arc::new(Drift)), settings(dir.path()));

        let report = evaluator.run(table(), None).await.unwrap();
        let order: Vec<&str> = report.outcomes.iter().map(|o| o.symbol()).collect();
        assert_eq!(order, vec!["AAA", "BBB", "CCC"]);
        assert_eq!(report.succeeded(), 2);
        assert_eq!(report.failed(), 1);
        assert_eq!(report.skipped(), 0);

        let failure = report.failures().next().unwrap();
        assert_eq!(failure.symbol, "BBB");
        assert_eq!(failure.kind, ErrorKind::InsufficientHistory);

        let agg = report.aggregate();
        assert_eq!(agg.days, 10);
        assert!(agg.rmse.is_finite());

        let summary = serde_json::to_value(report.summary()).unwrap();
        assert_eq!(summary["succeeded"], 2);
        assert_eq!(summary["failures"][0]["kind"], "insufficient_history");
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_timeout_becomes_failure() {
        let dir = tempfile::tempdir().unwrap();
        let mut s = settings(dir.path());
        s.inference_timeout = Duration::from_millis(10);
        s.retry = RetryPolicy::once();
        let evaluator = BatchEvaluator::new(bundle(Arc::new(Stuck)), s);

        let report = evaluator.run(table(), None).await.unwrap();
        assert_eq!(report.succeeded(), 0);
        let kinds: Vec<ErrorKind> = report.failures().map(|f| f.kind).collect();
        assert_eq!(
            kinds,
            vec![
                ErrorKind::InferenceTimeout,
                ErrorKind::InsufficientHistory,
                ErrorKind::InferenceTimeout
            ]
        );
        assert!(report.aggregate().is_empty());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_resume_skips_completed_symbols() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("checkpoint.jsonl");
        let evaluator = BatchEvaluator::new(bundle(Arc::new(Drift)), settings(dir.path()));

        let mut cp = Checkpoint::open(&path).await.unwrap();
        let first = evaluator.run(table(), Some(&mut cp)).await.unwrap();
        assert_eq!(first.succeeded(), 2);

        let mut cp = Checkpoint::open(&path).await.unwrap();
        let second = evaluator.run(table(), Some(&mut cp)).await.unwrap();
        assert_eq!(second.skipped(), 2);
        assert_eq!(second.failed(), 1);
        assert_eq!(second.succeeded(), 0);
        assert_ne!(first.run_id, second.run_id);

        // A different bundle invalidates the checkpoint
        let config = ModelConfig::new(4, 2, "close", vec!["rsi_14".to_string()]);
        let other = Arc::new(
            ModelBundle::new(config, Arc::new(StandardScaler::identity(1)), Arc::new(Drift))
                .unwrap(),
        );
        let evaluator = BatchEvaluator::new(other, settings(dir.path()));
        let mut cp = Checkpoint::open(&path).await.unwrap();
        let third = evaluator.run(table(), Some(&mut cp)).await.unwrap();
        assert_eq!(third.skipped(), 0);
        assert_eq!(third.succeeded(), 2);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_resumed_outputs_cover_checkpointed_symbols() {
        let dir = tempfile::tempdir().unwrap();
        let out = dir.path().join("charts");
        let path = dir.path().join("checkpoint.jsonl");
        let evaluator = BatchEvaluator::new(bundle(Arc::new(Drift)), settings(&out));

        let mut cp = Checkpoint::open(&path).await.unwrap();
        let first = evaluator.run(table(), Some(&mut cp)).await.unwrap();
        assert_eq!(first.aggregate().days, 10);
        first.write_outputs(&out).unwrap();

        // BBB now has enough history; AAA and CCC come from the checkpoint
        let mut cp = Checkpoint::open(&path).await.unwrap();
        let second = evaluator
            .run(table_with_bbb_rows(20), Some(&mut cp))
            .await
            .unwrap();
        assert_eq!(second.succeeded(), 1);
        assert_eq!(second.skipped(), 2);

        let first_aaa = first.completed().find(|b| b.symbol == "AAA").unwrap().metrics;
        let rows = second.metric_rows();
        let symbols: Vec<&str> = rows.iter().map(|(s, _)| s.as_str()).collect();
        assert_eq!(symbols, vec!["AAA", "BBB", "CCC"]);
        assert_eq!(rows[0].1.days, first_aaa.days);
        assert_eq!(rows[0].1.rmse, first_aaa.rmse);
        assert_eq!(second.aggregate().days, 15);

        second.write_outputs(&out).unwrap();
        let csv = std::fs::read_to_string(out.join(METRICS_FILE)).unwrap();
        assert_eq!(csv.lines().count(), 4);
        for symbol in ["AAA", "BBB", "CCC"] {
            assert!(csv.lines().any(|l| l.starts_with(&format!("{},", symbol))));
            assert!(out.join(format!("{}.json", symbol)).is_file());
        }

        let summary: serde_json::Value =
            serde_json::from_str(&std::fs::read_to_string(out.join(SUMMARY_FILE)).unwrap())
                .unwrap();
        assert_eq!(summary["skipped"], 2);
        assert_eq!(summary["aggregate"]["days"], 15);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_write_outputs() {
        let dir = tempfile::tempdir().unwrap();
        let out = dir.path().join("charts");
        let evaluator = BatchEvaluator::new(bundle(Arc::new(Drift)), settings(&out));

        let report = evaluator.run(table(), None).await.unwrap();
        report.write_outputs(&evaluator.settings().output_dir).unwrap();

        assert!(out.join(METRICS_FILE).is_file());
        assert!(out.join("AAA.json").is_file());
        assert!(out.join("CCC.json").is_file());
        assert!(!out.join("BBB.json").exists());

        let summary: serde_json::Value =
            serde_json::from_str(&std::fs::read_to_string(out.join(SUMMARY_FILE)).unwrap())
                .unwrap();
        assert_eq!(summary["failed"], 1);

        let csv = std::fs::read_to_string(out.join(METRICS_FILE)).unwrap();
        assert_eq!(csv.lines().count(), 3);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_infer_symbol_unknown() {
        let dir = tempfile::tempdir().unwrap();
        let err = infer_symbol(
            bundle(Arc::new(Drift)),
            table(),
            "ZZZ".to_string(),
            settings(dir.path()),
        )
        .await
        .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::UnknownSymbol);
    }
}
