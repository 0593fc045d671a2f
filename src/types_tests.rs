//! Tests for core types

#[cfg(test)]
mod tests {
    use super::super::types::*;
    use chrono::NaiveDate;

    fn day(d: u32) -> chrono::NaiveDateTime {
        NaiveDate::from_ymd_opt(2024, 1, d)
            .unwrap()
            .and_hms_opt(0, 0, 0)
            .unwrap()
    }

    #[test]
    fn test_empty_metrics_values() {
        let m = MetricsResult::empty();
        assert_eq!(m.days, 0);
        assert!(m.is_empty());
        assert_eq!(m.rmse, f64::INFINITY);
        assert_eq!(m.mape, f64::INFINITY);
        assert!(m.da.is_nan());
        assert!(m.ta.is_nan());
        assert!(m.sda.is_nan());
    }

    #[test]
    fn test_empty_metrics_serialize_without_coercion() {
        let json = serde_json::to_value(MetricsResult::empty()).unwrap();
        assert_eq!(json["days"], 0);
        assert_eq!(json["rmse"], "inf");
        assert_eq!(json["mape"], "inf");
        assert_eq!(json["da"], "NaN");
        assert_eq!(json["ta"], "NaN");
        assert_eq!(json["sda"], "NaN");
    }

    #[test]
    fn test_metrics_deserialize_roundtrip_keeps_nan() {
        let m = MetricsResult {
            days: 2,
            rmse: 0.5,
            mape: 1.25,
            da: 1.0,
            ta: f64::NAN,
            sda: f64::NAN,
        };
        let json = serde_json::to_string(&m).unwrap();
        let back: MetricsResult = serde_json::from_str(&json).unwrap();
        assert_eq!(back.days, 2);
        assert_eq!(back.rmse, 0.5);
        assert!(back.ta.is_nan());
        assert!(back.sda.is_nan());
    }

    #[test]
    fn test_metrics_display() {
        let m = MetricsResult {
            days: 60,
            rmse: 1.234,
            mape: 2.5,
            da: 0.55,
            ta: 0.4,
            sda: 0.6,
        };
        let text = m.to_string();
        assert!(text.starts_with("Backtest(60d)"));
        assert!(text.contains("RMSE=1.23"));
        assert!(text.contains("MAPE=2.50%"));
    }

    #[test]
    fn test_backtest_record_validity() {
        let ok = BacktestRecord {
            time: day(2),
            actual: 10.0,
            predicted: 10.5,
        };
        let bad = BacktestRecord {
            time: day(3),
            actual: 10.0,
            predicted: f64::NAN,
        };
        let overflow = BacktestRecord {
            time: day(4),
            actual: 10.0,
            predicted: f64::INFINITY,
        };
        assert!(ok.is_valid());
        assert!(!bad.is_valid());
        assert!(!overflow.is_valid());
    }

    #[test]
    fn test_backtest_record_json_shape() {
        let rec = BacktestRecord {
            time: day(2),
            actual: 10.0,
            predicted: f64::NAN,
        };
        let json = serde_json::to_value(rec).unwrap();
        assert_eq!(json["time"], "2024-01-02T00:00:00");
        assert_eq!(json["actual"], 10.0);
        assert_eq!(json["predicted"], "NaN");
    }

    #[test]
    fn test_result_bundle_field_names() {
        let bundle = ResultBundle {
            symbol: "FPT".to_string(),
            backtest_records: vec![],
            forecast_records: vec![ForecastRecord {
                time: day(5),
                predicted: 101.0,
            }],
            metrics: MetricsResult::empty(),
            history: vec![],
            indicators: vec![],
        };
        let json = serde_json::to_value(&bundle).unwrap();
        assert!(json.get("backtest_records").is_some());
        assert!(json.get("forecast_records").is_some());
        assert!(json.get("metrics").is_some());
        assert_eq!(json["forecast_records"][0]["predicted"], 101.0);
    }
}
