//! Feature table loading
//!
//! A [`MarketTable`] holds the preprocessed multi-symbol CSV split per
//! symbol. [`FeatureFrame`] is the validated, model-aligned view of one
//! symbol that the engine consumes.

mod frame;

pub use frame::{FeatureFrame, CLIP_ABS, DISPLAY_COLUMNS};

use crate::error::{FrameError, Result};
use crate::utils::{parse_number, parse_timestamp};
use chrono::NaiveDateTime;
use std::collections::{BTreeMap, HashMap};
use std::fs::File;
use std::io::Read;
use std::path::Path;
use tracing::{debug, info, warn};

const TIME_COLUMNS: &[&str] = &["time", "date", "datetime"];
const SYMBOL_COLUMNS: &[&str] = &["symbol", "ticker"];

/// Raw numeric columns of one symbol, sorted by time
#[derive(Debug, Clone, Default)]
pub struct SymbolTable {
    pub symbol: String,
    pub times: Vec<NaiveDateTime>,
    pub columns: BTreeMap<String, Vec<f64>>,
}

impl SymbolTable {
    /// Build a table, sorting rows by time (stable, duplicates kept)
    pub fn new(
        symbol: impl Into<String>,
        times: Vec<NaiveDateTime>,
        columns: BTreeMap<String, Vec<f64>>,
    ) -> Result<Self> {
        let symbol = symbol.into();
        for (name, values) in &columns {
            if values.len() != times.len() {
                return Err(FrameError::LengthMismatch {
                    symbol,
                    column: name.clone(),
                    rows: times.len(),
                    actual: values.len(),
                }
                .into());
            }
        }

        let mut order: Vec<usize> = (0..times.len()).collect();
        order.sort_by_key(|&i| times[i]);

        let times = order.iter().map(|&i| times[i]).collect();
        let columns = columns
            .into_iter()
            .map(|(name, values)| {
                let sorted = order.iter().map(|&i| values[i]).collect();
                (name, sorted)
            })
            .collect();

        Ok(Self {
            symbol,
            times,
            columns,
        })
    }

    pub fn len(&self) -> usize {
        self.times.len()
    }

    pub fn is_empty(&self) -> bool {
        self.times.is_empty()
    }

    pub fn column(&self, name: &str) -> Option<&[f64]> {
        self.columns.get(name).map(Vec::as_slice)
    }
}

/// All symbols of the preprocessed feature table
#[derive(Debug, Clone, Default)]
pub struct MarketTable {
    symbols: Vec<String>,
    tables: HashMap<String, SymbolTable>,
}

#[derive(Default)]
struct SymbolRows {
    times: Vec<NaiveDateTime>,
    columns: Vec<Vec<f64>>,
}

impl MarketTable {
    pub fn from_csv_path(path: &Path) -> Result<Self> {
        let file = File::open(path)?;
        let table = Self::from_reader(file)?;
        info!(
            "Loaded {} symbols from {}",
            table.symbols.len(),
            path.display()
        );
        Ok(table)
    }

    /// Parse CSV with a `time` and `symbol` column; every other column is numeric
    pub fn from_reader<R: Read>(reader: R) -> Result<Self> {
        let mut reader = csv::ReaderBuilder::new().flexible(false).from_reader(reader);
        let headers: Vec<String> = reader
            .headers()?
            .iter()
            .map(|h| h.trim().to_string())
            .collect();

        let time_idx = find_column(&headers, TIME_COLUMNS)
            .ok_or_else(|| FrameError::MissingColumn("time".to_string()))?;
        let symbol_idx = find_column(&headers, SYMBOL_COLUMNS)
            .ok_or_else(|| FrameError::MissingColumn("symbol".to_string()))?;

        let value_columns: Vec<(usize, String)> = headers
            .iter()
            .enumerate()
            .filter(|(i, _)| *i != time_idx && *i != symbol_idx)
            .map(|(i, name)| (i, name.clone()))
            .collect();

        let mut order: Vec<String> = Vec::new();
        let mut rows: HashMap<String, SymbolRows> = HashMap::new();
        let mut skipped = 0usize;

        for (row, record) in reader.records().enumerate() {
            let record = record?;
            let symbol = record
                .get(symbol_idx)
                .map(|s| s.trim().to_uppercase())
                .unwrap_or_default();
            if symbol.is_empty() {
                skipped += 1;
                continue;
            }

            let raw_time = record.get(time_idx).unwrap_or_default();
            let time = parse_timestamp(raw_time).ok_or_else(|| FrameError::InvalidTimestamp {
                row,
                value: raw_time.to_string(),
            })?;

            let entry = rows.entry(symbol.clone()).or_insert_with(|| {
                order.push(symbol.clone());
                SymbolRows {
                    times: Vec::new(),
                    columns: vec![Vec::new(); value_columns.len()],
                }
            });
            entry.times.push(time);
            for (slot, (idx, _)) in entry.columns.iter_mut().zip(&value_columns) {
                slot.push(record.get(*idx).map(parse_number).unwrap_or(f64::NAN));
            }
        }

        if skipped > 0 {
            warn!("Skipped {} rows without a symbol", skipped);
        }

        let mut tables = HashMap::with_capacity(rows.len());
        for (symbol, data) in rows {
            let columns = value_columns
                .iter()
                .map(|(_, name)| name.clone())
                .zip(data.columns)
                .collect();
            let table = SymbolTable::new(symbol.clone(), data.times, columns)?;
            debug!("{}: {} rows", symbol, table.len());
            tables.insert(symbol, table);
        }

        Ok(Self {
            symbols: order,
            tables,
        })
    }

    /// Distinct symbols in first-appearance order
    pub fn symbols(&self) -> &[String] {
        &self.symbols
    }

    pub fn len(&self) -> usize {
        self.symbols.len()
    }

    pub fn is_empty(&self) -> bool {
        self.symbols.is_empty()
    }

    /// Case-insensitive lookup
    pub fn get(&self, symbol: &str) -> Result<&SymbolTable> {
        let key = symbol.trim().to_uppercase();
        self.tables
            .get(&key)
            .ok_or_else(|| FrameError::UnknownSymbol(key).into())
    }
}

fn find_column(headers: &[String], candidates: &[&str]) -> Option<usize> {
    headers
        .iter()
        .position(|h| candidates.iter().any(|c| h.eq_ignore_ascii_case(c)))
}
