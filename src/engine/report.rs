//! Presentation columns and file outputs for result bundles

use crate::data::FeatureFrame;
use crate::error::Result;
use crate::types::{IndicatorRow, MetricsResult, PricePoint, ResultBundle};
use crate::utils::non_finite_tag;
use std::fs;
use std::io;
use std::path::{Component, Path, PathBuf};

/// Last `lookback` observed prices
pub fn history(frame: &FeatureFrame, lookback: usize) -> Vec<PricePoint> {
    let n = frame.len();
    let from = n.saturating_sub(lookback);
    frame.times()[from..]
        .iter()
        .zip(&frame.target()[from..])
        .map(|(&time, &price)| PricePoint { time, price })
        .collect()
}

/// Indicator values for rows `start..N`, NaN where a column is absent
pub fn indicator_rows(frame: &FeatureFrame, start: usize) -> Vec<IndicatorRow> {
    let value = |name: &str, i: usize| -> f64 {
        frame
            .display_column(name)
            .and_then(|col| col.get(i).copied())
            .unwrap_or(f64::NAN)
    };

    (start..frame.len())
        .map(|i| {
            let macd = value("macd", i);
            let macd_signal = value("macd_signal", i);
            IndicatorRow {
                time: frame.times()[i],
                volume: value("volume", i),
                ema20: value("ema20", i),
                ema60: value("ema60", i),
                ma10: value("ma_10", i),
                ma20: value("ma_20", i),
                rsi_14: value("rsi_14", i),
                macd,
                macd_signal,
                macd_hist: macd - macd_signal,
            }
        })
        .collect()
}

fn format_float(v: f64) -> String {
    match non_finite_tag(v) {
        Some(tag) => tag.to_string(),
        None => v.to_string(),
    }
}

/// Metrics table sorted by rmse ascending (non-finite last)
pub fn write_metrics_csv(path: &Path, rows: &[(String, MetricsResult)]) -> Result<()> {
    let mut sorted: Vec<&(String, MetricsResult)> = rows.iter().collect();
    sorted.sort_by(|a, b| rank(a.1.rmse).total_cmp(&rank(b.1.rmse)));

    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    let mut writer = csv::Writer::from_path(path)?;
    writer.write_record(["symbol", "days", "rmse", "mape", "da", "ta", "sda"])?;
    for (symbol, m) in sorted {
        writer.write_record([
            symbol.clone(),
            m.days.to_string(),
            format_float(m.rmse),
            format_float(m.mape),
            format_float(m.da),
            format_float(m.ta),
            format_float(m.sda),
        ])?;
    }
    writer.flush()?;
    Ok(())
}

fn rank(v: f64) -> f64 {
    if v.is_nan() {
        f64::INFINITY
    } else {
        v
    }
}

/// `<dir>/<SYMBOL>.json`; symbols that are not a single plain path
/// component are rejected
pub fn write_result_json(dir: &Path, bundle: &ResultBundle) -> Result<PathBuf> {
    let path = dir.join(result_file_name(&bundle.symbol)?);
    fs::create_dir_all(dir)?;
    let file = fs::File::create(&path)?;
    serde_json::to_writer_pretty(file, bundle)?;
    Ok(path)
}

fn result_file_name(symbol: &str) -> Result<String> {
    let mut components = Path::new(symbol).components();
    let plain = matches!(
        (components.next(), components.next()),
        (Some(Component::Normal(_)), None)
    ) && !symbol.contains(['/', '\\']);
    if !plain {
        return Err(io::Error::new(
            io::ErrorKind::InvalidInput,
            format!("symbol '{}' is not usable as a file name", symbol),
        )
        .into());
    }
    Ok(format!("{}.json", symbol))
}
