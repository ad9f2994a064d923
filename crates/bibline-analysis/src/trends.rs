//! Yearly publication series and the growth statistics derived from it
//!
//! Years come from the first year-bearing column in the table; a cell counts
//! when its first four characters are digits. Zero-count years are implicit
//! unless [`YearlySeries::fill_gaps`] is applied.

use std::collections::BTreeMap;
use std::path::Path;

use anyhow::{Context, Result};
use bibline_core::{PipelineError, RecordTable, parse_year, table::YEAR_COLUMNS};
use serde::Serialize;

/// Publication counts keyed by year, ascending.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct YearlySeries(BTreeMap<i32, u64>);

/// Series plus the rows that did not make it in.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SeriesBuild {
    pub series: YearlySeries,
    /// Column the years were read from, if any was present.
    pub year_column: Option<String>,
    pub rows_total: usize,
    pub excluded_missing_year: usize,
    pub excluded_by_filter: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct YoyRow {
    pub year: i32,
    pub count: u64,
    /// Undefined when the previous calendar year is absent.
    pub yoy_abs: Option<i64>,
    /// Percent; undefined when the previous year is absent or zero.
    pub yoy_pct: Option<f64>,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct CagrSummary {
    pub start_year: Option<i32>,
    pub end_year: Option<i32>,
    pub start_count: Option<u64>,
    pub end_count: Option<u64>,
    pub cagr: f64,
}

/// Mean of the last five series rows against the five before.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct Momentum {
    pub avg_last5: Option<f64>,
    pub avg_prev5: Option<f64>,
    pub avg_last5_vs_prev5: Option<f64>,
}

impl YearlySeries {
    pub fn from_counts(counts: impl IntoIterator<Item = (i32, u64)>) -> Self {
        Self(counts.into_iter().collect())
    }

    /// Count rows per year, applying an inclusive `[min_year, max_year]` filter.
    pub fn build(
        table: &RecordTable,
        min_year: Option<i32>,
        max_year: Option<i32>,
    ) -> Result<SeriesBuild, PipelineError> {
        validate_year_filter(min_year, max_year)?;

        let year_col = table.first_column(YEAR_COLUMNS);
        let mut counts = BTreeMap::new();
        let mut excluded_missing_year = 0;
        let mut excluded_by_filter = 0;

        for value in year_col.into_iter().flat_map(|c| table.column_values(c)) {
            let Some(year) = value.and_then(parse_year) else {
                excluded_missing_year += 1;
                continue;
            };
            if min_year.is_some_and(|m| year < m) || max_year.is_some_and(|m| year > m) {
                excluded_by_filter += 1;
                continue;
            }
            *counts.entry(year).or_insert(0) += 1;
        }
        if year_col.is_none() {
            log::warn!("No year column found; the yearly series is empty");
            excluded_missing_year = table.len();
        }
        if excluded_missing_year > 0 {
            log::info!("Excluded {excluded_missing_year} rows without a parsable year");
        }

        Ok(SeriesBuild {
            series: Self(counts),
            year_column: year_col.map(|c| table.columns()[c].clone()),
            rows_total: table.len(),
            excluded_missing_year,
            excluded_by_filter,
        })
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn get(&self, year: i32) -> Option<u64> {
        self.0.get(&year).copied()
    }

    pub fn iter(&self) -> impl Iterator<Item = (i32, u64)> + '_ {
        self.0.iter().map(|(&y, &c)| (y, c))
    }

    pub fn first_year(&self) -> Option<i32> {
        self.0.keys().next().copied()
    }

    pub fn last_year(&self) -> Option<i32> {
        self.0.keys().next_back().copied()
    }

    /// Make every year between the first and last explicit, with zero counts.
    pub fn fill_gaps(&mut self) {
        if let (Some(first), Some(last)) = (self.first_year(), self.last_year()) {
            for year in first..=last {
                self.0.entry(year).or_insert(0);
            }
        }
    }

    /// One row per series year, compared against the previous calendar year.
    pub fn yoy(&self) -> Vec<YoyRow> {
        self.iter()
            .map(|(year, count)| {
                let prev = self.get(year - 1);
                YoyRow {
                    year,
                    count,
                    yoy_abs: prev.map(|p| count as i64 - p as i64),
                    yoy_pct: prev
                        .filter(|&p| p > 0)
                        .map(|p| (count as f64 - p as f64) / p as f64 * 100.0),
                }
            })
            .collect()
    }

    /// Compound annual growth between the first and last nonzero years.
    pub fn cagr(&self) -> CagrSummary {
        let mut nonzero = self.iter().filter(|&(_, c)| c > 0);
        let Some((first, first_count)) = nonzero.next() else {
            return CagrSummary {
                start_year: None,
                end_year: None,
                start_count: None,
                end_count: None,
                cagr: 0.0,
            };
        };
        let (last, last_count) = nonzero.last().unwrap_or((first, first_count));
        let span = last - first;
        let cagr = if span <= 0 {
            0.0
        } else {
            (last_count as f64 / first_count as f64).powf(1.0 / span as f64) - 1.0
        };
        CagrSummary {
            start_year: Some(first),
            end_year: Some(last),
            start_count: Some(first_count),
            end_count: Some(last_count),
            cagr,
        }
    }

    /// Needs at least ten series rows.
    pub fn momentum(&self) -> Momentum {
        let counts: Vec<u64> = self.0.values().copied().collect();
        if counts.len() < 10 {
            return Momentum::default();
        }
        let mean = |xs: &[u64]| xs.iter().sum::<u64>() as f64 / xs.len() as f64;
        let n = counts.len();
        let avg_last5 = mean(&counts[n - 5..]);
        let avg_prev5 = mean(&counts[n - 10..n - 5]);
        Momentum {
            avg_last5: Some(avg_last5),
            avg_prev5: Some(avg_prev5),
            avg_last5_vs_prev5: (avg_prev5 != 0.0).then(|| avg_last5 / avg_prev5),
        }
    }

    /// `pub_year,count`
    pub fn write_csv(&self, path: &Path) -> Result<()> {
        let mut writer = csv_writer(path)?;
        writer.write_record(["pub_year", "count"])?;
        for (year, count) in self.iter() {
            writer.write_record([year.to_string(), count.to_string()])?;
        }
        finish(writer, path)
    }
}

/// Reject an inverted `[min_year, max_year]` range.
pub fn validate_year_filter(min_year: Option<i32>, max_year: Option<i32>) -> Result<(), PipelineError> {
    match (min_year, max_year) {
        (Some(min), Some(max)) if min > max => Err(PipelineError::config(
            "min_year",
            format!("min_year {min} is after max_year {max}"),
        )),
        _ => Ok(()),
    }
}

/// `year,count,yoy_abs,yoy_pct`; undefined values are empty cells.
pub fn write_yoy_csv(rows: &[YoyRow], path: &Path) -> Result<()> {
    let mut writer = csv_writer(path)?;
    writer.write_record(["year", "count", "yoy_abs", "yoy_pct"])?;
    for row in rows {
        writer.write_record([
            row.year.to_string(),
            row.count.to_string(),
            opt(row.yoy_abs),
            opt(row.yoy_pct),
        ])?;
    }
    finish(writer, path)
}

/// One summary row: the CAGR figures, the momentum figures and the run id.
pub fn write_cagr_csv(cagr: &CagrSummary, momentum: &Momentum, run_id: &str, path: &Path) -> Result<()> {
    let mut writer = csv_writer(path)?;
    writer.write_record([
        "start_year",
        "end_year",
        "start_count",
        "end_count",
        "cagr",
        "avg_last5",
        "avg_prev5",
        "avg_last5_vs_prev5",
        "run_id",
    ])?;
    writer.write_record([
        opt(cagr.start_year),
        opt(cagr.end_year),
        opt(cagr.start_count),
        opt(cagr.end_count),
        cagr.cagr.to_string(),
        opt(momentum.avg_last5),
        opt(momentum.avg_prev5),
        opt(momentum.avg_last5_vs_prev5),
        run_id.to_string(),
    ])?;
    finish(writer, path)
}

fn opt<T: ToString>(value: Option<T>) -> String {
    value.map(|v| v.to_string()).unwrap_or_default()
}

fn csv_writer(path: &Path) -> Result<csv::Writer<std::fs::File>> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("failed to create {}", parent.display()))?;
    }
    csv::Writer::from_path(path).with_context(|| format!("failed to create {}", path.display()))
}

fn finish(mut writer: csv::Writer<std::fs::File>, path: &Path) -> Result<()> {
    writer
        .flush()
        .with_context(|| format!("failed to write {}", path.display()))
}
