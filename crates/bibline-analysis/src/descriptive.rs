//! Descriptive tables written alongside the cleaned dataset

use std::collections::BTreeMap;
use std::path::Path;

use anyhow::{Context, Result};
use bibline_core::RecordTable;
use rustc_hash::FxHashMap;
use serde::Serialize;

use crate::clean::JOURNAL_COLUMNS;

/// Keyword columns, in lookup order.
pub const KEYWORD_COLUMNS: &[&str] = &["authkeywords", "keywords", "author_keywords"];

/// Separator for multi-valued author and keyword cells.
pub const ITEM_SEP: char = ';';

/// Two-column `(label, count)` table, most frequent first.
#[derive(Debug, Clone, PartialEq)]
pub struct FrequencyTable {
    pub label: &'static str,
    pub rows: Vec<(String, usize)>,
}

impl FrequencyTable {
    pub fn empty(label: &'static str) -> Self {
        Self {
            label,
            rows: Vec::new(),
        }
    }

    /// Count items; ties are ordered alphabetically so output is stable.
    pub fn from_items<'a>(label: &'static str, items: impl IntoIterator<Item = &'a str>) -> Self {
        let mut counts: FxHashMap<&str, usize> = FxHashMap::default();
        for item in items {
            *counts.entry(item).or_default() += 1;
        }
        let mut rows: Vec<(String, usize)> =
            counts.into_iter().map(|(k, v)| (k.to_string(), v)).collect();
        rows.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
        Self { label, rows }
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Write `<label>,count` CSV; the header is written even when empty.
    pub fn write_csv(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("failed to create {}", parent.display()))?;
        }
        let mut writer = csv::Writer::from_path(path)
            .with_context(|| format!("failed to create {}", path.display()))?;
        writer.write_record([self.label, "count"])?;
        for (item, count) in &self.rows {
            writer.write_record([item.as_str(), &count.to_string()])?;
        }
        writer
            .flush()
            .with_context(|| format!("failed to write {}", path.display()))?;
        Ok(())
    }
}

/// Journal frequencies from the first journal column present.
pub fn top_journals(table: &RecordTable) -> Option<FrequencyTable> {
    let col = table.first_column(JOURNAL_COLUMNS)?;
    let items = table
        .column_values(col)
        .flatten()
        .map(str::trim)
        .filter(|v| !v.is_empty());
    Some(FrequencyTable::from_items("journal", items))
}

/// Author frequencies from `;`-separated `author_names`.
pub fn top_authors(table: &RecordTable) -> Option<FrequencyTable> {
    let col = table.column_index("author_names")?;
    Some(split_and_count(table, col))
}

/// Keyword frequencies from the first keyword column present.
pub fn keyword_freq(table: &RecordTable) -> Option<FrequencyTable> {
    let col = table.first_column(KEYWORD_COLUMNS)?;
    Some(split_and_count(table, col))
}

fn split_and_count(table: &RecordTable, col: usize) -> FrequencyTable {
    let items = table
        .column_values(col)
        .flatten()
        .flat_map(|v| v.split(ITEM_SEP))
        .map(str::trim)
        .filter(|v| !v.is_empty());
    FrequencyTable::from_items("item", items)
}

/// Non-null share of one field.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Coverage {
    pub n_nonnull: usize,
    pub n_total: usize,
    /// Fraction in `[0, 1]`.
    pub pct_nonnull: f64,
}

impl Coverage {
    pub fn of(table: &RecordTable, col: Option<usize>) -> Self {
        let n_total = table.len();
        let n_nonnull = col.map_or(0, |c| {
            table
                .column_values(c)
                .filter(|v| v.is_some_and(|s| !s.trim().is_empty()))
                .count()
        });
        let pct_nonnull = if n_total == 0 {
            0.0
        } else {
            n_nonnull as f64 / n_total as f64
        };
        Self {
            n_nonnull,
            n_total,
            pct_nonnull,
        }
    }
}

/// Coverage for pub_year, journal, authors and keywords.
pub fn coverage(table: &RecordTable) -> BTreeMap<String, Coverage> {
    [
        ("pub_year", table.column_index("pub_year")),
        ("journal", table.first_column(JOURNAL_COLUMNS)),
        ("authors", table.column_index("author_names")),
        ("keywords", table.first_column(KEYWORD_COLUMNS)),
    ]
    .into_iter()
    .map(|(name, col)| (name.to_string(), Coverage::of(table, col)))
    .collect()
}
