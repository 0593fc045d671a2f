//! Backtest metrics: RMSE, MAPE and the directional family (DA, TA, SDA).
//!
//! The directional metrics compare price *movements*, so both series are
//! prefixed with the same anchor price `p0` (the last observed price before
//! the first compared point) before differencing.

use crate::types::{BacktestRecord, MetricsResult};

/// Floor for the MAPE denominator
pub const EPSILON: f64 = 1e-12;

/// -1, 0 or 1. Zero is its own direction.
pub fn sign(x: f64) -> i8 {
    if x > 0.0 {
        1
    } else if x < 0.0 {
        -1
    } else {
        0
    }
}

pub fn rmse(actual: &[f64], predicted: &[f64]) -> f64 {
    if actual.is_empty() {
        return f64::INFINITY;
    }
    let sse: f64 = actual
        .iter()
        .zip(predicted)
        .map(|(a, p)| (p - a).powi(2))
        .sum();
    (sse / actual.len() as f64).sqrt()
}

/// Mean absolute percentage error, in percent
pub fn mape(actual: &[f64], predicted: &[f64]) -> f64 {
    if actual.is_empty() {
        return f64::INFINITY;
    }
    let total: f64 = actual
        .iter()
        .zip(predicted)
        .map(|(a, p)| (p - a).abs() / a.abs().max(EPSILON))
        .sum();
    total / actual.len() as f64 * 100.0
}

fn directions(series: &[f64]) -> Vec<i8> {
    series.windows(2).map(|w| sign(w[1] - w[0])).collect()
}

fn fraction_equal<T: PartialEq>(a: &[T], b: &[T]) -> f64 {
    if a.is_empty() {
        return f64::NAN;
    }
    let hits = a.iter().zip(b).filter(|(x, y)| x == y).count();
    hits as f64 / a.len() as f64
}

/// Share of steps where actual and predicted move the same way.
/// Inputs already include the anchor.
pub fn directional_accuracy(actual: &[f64], predicted: &[f64]) -> f64 {
    fraction_equal(&directions(actual), &directions(predicted))
}

/// Share of positions where both series agree on whether the direction
/// flipped. NaN with fewer than 3 points (anchor included).
pub fn turning_point_accuracy(actual: &[f64], predicted: &[f64]) -> f64 {
    if actual.len() < 3 || predicted.len() < 3 {
        return f64::NAN;
    }
    let turns = |series: &[f64]| -> Vec<bool> {
        directions(series).windows(2).map(|d| d[1] != d[0]).collect()
    };
    fraction_equal(&turns(actual), &turns(predicted))
}

/// Agreement of the two-step slope sign `x[i+1] - x[i-1]`.
/// NaN with fewer than 3 points (anchor included).
pub fn slope_directional_accuracy(actual: &[f64], predicted: &[f64]) -> f64 {
    if actual.len() < 3 || predicted.len() < 3 {
        return f64::NAN;
    }
    let slopes = |series: &[f64]| -> Vec<i8> {
        series.windows(3).map(|w| sign(w[2] - w[0])).collect()
    };
    fraction_equal(&slopes(actual), &slopes(predicted))
}

/// Metrics over already filtered, finite series
pub fn evaluate(actual: &[f64], predicted: &[f64], anchor: f64) -> MetricsResult {
    let n = actual.len().min(predicted.len());
    if n == 0 {
        return MetricsResult::empty();
    }
    let (actual, predicted) = (&actual[..n], &predicted[..n]);

    let anchored = |series: &[f64]| -> Vec<f64> {
        std::iter::once(anchor).chain(series.iter().copied()).collect()
    };
    let a = anchored(actual);
    let p = anchored(predicted);

    MetricsResult {
        days: n,
        rmse: rmse(actual, predicted),
        mape: mape(actual, predicted),
        da: directional_accuracy(&a, &p),
        ta: turning_point_accuracy(&a, &p),
        sda: slope_directional_accuracy(&a, &p),
    }
}

/// Metrics over the valid (finite) records only
pub fn evaluate_records(records: &[BacktestRecord], anchor: f64) -> MetricsResult {
    let (actual, predicted): (Vec<f64>, Vec<f64>) = records
        .iter()
        .filter(|r| r.is_valid())
        .map(|r| (r.actual, r.predicted))
        .unzip();
    evaluate(&actual, &predicted, anchor)
}

fn mean(values: impl Iterator<Item = f64>) -> f64 {
    let (sum, count) = values.fold((0.0, 0usize), |(s, c), v| (s + v, c + 1));
    if count == 0 {
        f64::NAN
    } else {
        sum / count as f64
    }
}

/// Cross-symbol average: plain mean for rmse/mape/da, NaN-skipping mean for
/// ta/sda. `days` is the total number of compared points.
pub fn aggregate(results: &[MetricsResult]) -> MetricsResult {
    if results.is_empty() {
        return MetricsResult::empty();
    }
    MetricsResult {
        days: results.iter().map(|m| m.days).sum(),
        rmse: mean(results.iter().map(|m| m.rmse)),
        mape: mean(results.iter().map(|m| m.mape)),
        da: mean(results.iter().map(|m| m.da)),
        ta: mean(results.iter().map(|m| m.ta).filter(|v| !v.is_nan())),
        sda: mean(results.iter().map(|m| m.sda).filter(|v| !v.is_nan())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sign_zero_is_distinct() {
        assert_eq!(sign(2.0), 1);
        assert_eq!(sign(-0.5), -1);
        assert_eq!(sign(0.0), 0);
    }

    #[test]
    fn test_identical_series() {
        let actual = [10.0, 11.0, 10.5, 12.0];
        let m = evaluate(&actual, &actual, 9.5);
        assert_eq!(m.days, 4);
        assert_eq!(m.rmse, 0.0);
        assert_eq!(m.mape, 0.0);
        assert_eq!(m.da, 1.0);
        assert_eq!(m.ta, 1.0);
        assert_eq!(m.sda, 1.0);
    }

    #[test]
    fn test_single_point_leaves_ta_sda_nan() {
        let m = evaluate(&[11.0], &[10.5], 10.0);
        assert_eq!(m.days, 1);
        assert!((m.rmse - 0.5).abs() < 1e-12);
        assert!(m.mape.is_finite());
        assert_eq!(m.da, 1.0);
        assert!(m.ta.is_nan());
        assert!(m.sda.is_nan());
    }

    #[test]
    fn test_two_points_enable_ta_sda() {
        // anchor + 2 points = 3 points
        let m = evaluate(&[11.0, 10.0], &[11.0, 12.0], 10.0);
        assert_eq!(m.da, 0.5);
        assert_eq!(m.ta, 0.0);
        assert_eq!(m.sda, 0.0);
    }

    #[test]
    fn test_flat_step_counts_as_own_direction() {
        // actual flat, predicted up: no direction match
        let m = evaluate(&[10.0], &[10.1], 10.0);
        assert_eq!(m.da, 0.0);
    }

    #[test]
    fn test_rmse_mape_values() {
        let actual = [100.0, 200.0];
        let pred = [110.0, 180.0];
        assert!((rmse(&actual, &pred) - (250.0f64).sqrt()).abs() < 1e-9);
        assert!((mape(&actual, &pred) - 10.0).abs() < 1e-9);
    }

    #[test]
    fn test_mape_zero_actual_uses_floor() {
        let v = mape(&[0.0], &[1e-12]);
        assert!((v - 100.0).abs() < 1e-6);
    }

    #[test]
    fn test_empty_series() {
        let m = evaluate(&[], &[], 1.0);
        assert_eq!(m.days, 0);
        assert_eq!(m.rmse, f64::INFINITY);
        assert_eq!(m.mape, f64::INFINITY);
        assert!(m.da.is_nan());
    }

    #[test]
    fn test_evaluate_records_filters_non_finite() {
        let t = chrono::NaiveDate::from_ymd_opt(2024, 1, 1)
            .unwrap()
            .and_hms_opt(0, 0, 0)
            .unwrap();
        let records = [
            BacktestRecord { time: t, actual: 10.0, predicted: f64::NAN },
            BacktestRecord { time: t, actual: 11.0, predicted: 11.0 },
            BacktestRecord { time: t, actual: 12.0, predicted: f64::INFINITY },
        ];
        let m = evaluate_records(&records, 10.0);
        assert_eq!(m.days, 1);
        assert_eq!(m.rmse, 0.0);
    }

    #[test]
    fn test_aggregate_skips_nan_for_ta_sda() {
        let a = MetricsResult { days: 10, rmse: 1.0, mape: 2.0, da: 0.5, ta: f64::NAN, sda: 0.4 };
        let b = MetricsResult { days: 20, rmse: 3.0, mape: 4.0, da: 0.7, ta: 0.6, sda: f64::NAN };
        let agg = aggregate(&[a, b]);
        assert_eq!(agg.days, 30);
        assert_eq!(agg.rmse, 2.0);
        assert_eq!(agg.mape, 3.0);
        assert!((agg.da - 0.6).abs() < 1e-12);
        assert_eq!(agg.ta, 0.6);
        assert_eq!(agg.sda, 0.4);
    }

    #[test]
    fn test_aggregate_of_nothing() {
        let agg = aggregate(&[]);
        assert!(agg.is_empty());
        assert_eq!(agg.rmse, f64::INFINITY);
        assert!(agg.ta.is_nan());
    }
}
