//! Cleaning transform: normalize, then deduplicate
//!
//! Normalizing first means rows that only differed in blanks the transform
//! fills collapse in the same pass, so cleaning a cleaned table is a no-op.
//! Dedup key is the identifier column (`eid`, else `EID`) when present,
//! otherwise the whole row. Values are compared trimmed, whitespace-collapsed
//! and lowercased; stored values are left as they were. The first occurrence
//! wins and survivors keep their input order.

use std::fmt;

use bibline_core::RecordTable;
use rustc_hash::FxHashSet;
use serde::{Serialize, Serializer};

/// Columns a missing `pub_year` is derived from, in lookup order.
pub const YEAR_SOURCE_COLUMNS: &[&str] = &[
    "year",
    "Year",
    "coverDate",
    "cover_date",
    "prism:coverDate",
];

/// Columns `author_names` can be filled from.
pub const CREATOR_COLUMNS: &[&str] = &["creator", "dc:creator"];

/// Journal title columns, in lookup order.
pub const JOURNAL_COLUMNS: &[&str] = &[
    "prism:publicationName",
    "publicationName",
    "journal",
    "sourceTitle",
];

/// Fields the transform adds or fills.
pub const DERIVED_FIELDS: &[&str] = &["pub_year", "author_names"];

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DedupKey {
    /// Identifier column name.
    Identifier(String),
    FullRow,
}

impl fmt::Display for DedupKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Identifier(col) => f.write_str(col),
            Self::FullRow => f.write_str("full_row"),
        }
    }
}

impl Serialize for DedupKey {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CleaningReport {
    pub rows_before: usize,
    pub rows_after: usize,
    pub duplicates_removed: usize,
    pub dedup_key: DedupKey,
    pub derived_fields: Vec<String>,
    /// Journal column that was trimmed, if any.
    pub journal_column: Option<String>,
}

#[derive(Debug, Clone)]
pub struct CleanedTable {
    pub table: RecordTable,
    pub report: CleaningReport,
}

/// Comparison form of a cell: trimmed, inner whitespace collapsed, lowercased.
/// Blank cells compare as missing.
pub fn normalize_value(value: &str) -> Option<String> {
    let mut out = String::with_capacity(value.len());
    for word in value.split_whitespace() {
        if !out.is_empty() {
            out.push(' ');
        }
        out.extend(word.chars().flat_map(char::to_lowercase));
    }
    (!out.is_empty()).then_some(out)
}

#[derive(Hash, PartialEq, Eq)]
enum RowKey {
    Id(String),
    Row(Vec<Option<String>>),
}

/// Remove duplicate rows. Returns the surviving table and the key used.
pub fn deduplicate(table: &RecordTable) -> (RecordTable, DedupKey) {
    let id_col = table.identifier_column();
    let key = match id_col {
        Some(col) => DedupKey::Identifier(table.columns()[col].clone()),
        None => DedupKey::FullRow,
    };

    let mut seen = FxHashSet::default();
    let keep: Vec<usize> = table
        .rows()
        .filter(|row| {
            let id = id_col.and_then(|col| row.at(col)).and_then(normalize_value);
            let row_key = match id {
                Some(id) => RowKey::Id(id),
                None => RowKey::Row(
                    row.values()
                        .iter()
                        .map(|v| v.as_deref().and_then(normalize_value))
                        .collect(),
                ),
            };
            seen.insert(row_key)
        })
        .map(|row| row.index())
        .collect();

    (table.select_rows(&keep), key)
}

/// Derive `pub_year`, fill `author_names`, trim the journal column.
/// Returns the journal column that was trimmed.
pub fn normalize(table: &mut RecordTable) -> Option<String> {
    let source_cols: Vec<usize> = YEAR_SOURCE_COLUMNS
        .iter()
        .filter_map(|c| table.column_index(c))
        .collect();
    let year_col = table.ensure_column("pub_year");
    for i in 0..table.len() {
        let current = table.cell(i, year_col).map(str::trim).filter(|v| !v.is_empty());
        if current.is_some() {
            continue;
        }
        let derived = table.row(i).year(&source_cols).map(|y| y.to_string());
        table.set_cell(i, year_col, derived);
    }

    let creator_col = table.first_column(CREATOR_COLUMNS);
    let authors_col = table.ensure_column("author_names");
    if let Some(creator_col) = creator_col {
        for i in 0..table.len() {
            let blank = table
                .cell(i, authors_col)
                .is_none_or(|v| v.trim().is_empty());
            if blank {
                let creator = table.cell(i, creator_col).map(String::from);
                table.set_cell(i, authors_col, creator);
            }
        }
    }

    let journal_col = table.first_column(JOURNAL_COLUMNS)?;
    for i in 0..table.len() {
        let trimmed = table
            .cell(i, journal_col)
            .map(str::trim)
            .filter(|v| !v.is_empty())
            .map(String::from);
        table.set_cell(i, journal_col, trimmed);
    }
    Some(table.columns()[journal_col].clone())
}

/// Full cleaning transform.
pub fn clean(raw: &RecordTable) -> CleanedTable {
    let rows_before = raw.len();
    let mut normalized = raw.clone();
    let journal_column = normalize(&mut normalized);
    let (table, dedup_key) = deduplicate(&normalized);
    let rows_after = table.len();

    log::info!(
        "Dedup on {dedup_key}: {rows_before} -> {rows_after} rows ({} removed)",
        rows_before - rows_after
    );

    CleanedTable {
        table,
        report: CleaningReport {
            rows_before,
            rows_after,
            duplicates_removed: rows_before - rows_after,
            dedup_key,
            derived_fields: DERIVED_FIELDS.iter().map(|s| s.to_string()).collect(),
            journal_column,
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bibline_core::Record;

    fn table(columns: &[&str], rows: &[&[&str]]) -> RecordTable {
        let mut t = RecordTable::new(columns.iter().map(|c| c.to_string()).collect());
        for row in rows {
            t.push_row(
                row.iter()
                    .map(|v| (!v.is_empty()).then(|| v.to_string()))
                    .collect(),
            )
            .unwrap();
        }
        t
    }

    #[test]
    fn normalize_value_forms() {
        assert_eq!(normalize_value("  Foo\t  BAR \n"), Some("foo bar".into()));
        assert_eq!(normalize_value("   "), None);
    }

    #[test]
    fn identifier_dedup_is_normalized() {
        let t = table(
            &["eid", "title"],
            &[&["2-s2.0-1", "A"], &[" 2-S2.0-1 ", "B"], &["2-s2.0-2", "C"]],
        );
        let (out, key) = deduplicate(&t);
        assert_eq!(key, DedupKey::Identifier("eid".into()));
        assert_eq!(out.len(), 2);
        assert_eq!(out.row(0).get("title"), Some("A"));
        // stored value untouched
        assert_eq!(out.row(0).get("eid"), Some("2-s2.0-1"));
    }

    #[test]
    fn upper_case_identifier_column() {
        let t = table(&["EID", "title"], &[&["x", "A"], &["x", "B"]]);
        let (out, key) = deduplicate(&t);
        assert_eq!(key.to_string(), "EID");
        assert_eq!(out.len(), 1);
    }

    #[test]
    fn blank_identifier_falls_back_to_full_row() {
        let t = table(
            &["eid", "title"],
            &[&["", "Same"], &["", " same "], &["", "Other"]],
        );
        let (out, _) = deduplicate(&t);
        assert_eq!(out.len(), 2);
    }

    #[test]
    fn full_row_dedup_without_identifier() {
        let t = table(
            &["title", "pub_year"],
            &[&["A", "2020"], &["a  ", "2020"], &["A", "2021"]],
        );
        let (out, key) = deduplicate(&t);
        assert_eq!(key, DedupKey::FullRow);
        assert_eq!(out.len(), 2);
    }

    #[test]
    fn pub_year_derived_from_cover_date() {
        let mut t = table(
            &["coverDate", "pub_year"],
            &[&["2019-03-01", ""], &["2019-03-01", "2020"], &["bad", ""]],
        );
        normalize(&mut t);
        assert_eq!(t.row(0).get("pub_year"), Some("2019"));
        assert_eq!(t.row(1).get("pub_year"), Some("2020"));
        assert_eq!(t.row(2).get("pub_year"), None);
    }

    #[test]
    fn pub_year_derived_from_any_year_column() {
        for column in YEAR_SOURCE_COLUMNS {
            let mut t = table(&["title", column], &[&["A", "2018"], &["B", "2019-07-01"], &["C", ""]]);
            normalize(&mut t);
            assert_eq!(t.row(0).get("pub_year"), Some("2018"), "{column}");
            assert_eq!(t.row(1).get("pub_year"), Some("2019"), "{column}");
            assert_eq!(t.row(2).get("pub_year"), None, "{column}");
        }
    }

    #[test]
    fn plain_year_column_survives_cleaning() {
        let raw = table(
            &["title", "year"],
            &[&["A", "2020"], &["B", "2020"], &["C", "2021"]],
        );
        let cleaned = clean(&raw);
        let years: Vec<_> = cleaned.table.rows().map(|r| r.get("pub_year")).collect();
        assert_eq!(years, vec![Some("2020"), Some("2020"), Some("2021")]);
    }

    #[test]
    fn author_names_and_journal() {
        let mut t = table(
            &["dc:creator", "publicationName"],
            &[&["Smith J.", "  Journal of X "], &["", "   "]],
        );
        let journal = normalize(&mut t);
        assert_eq!(journal.as_deref(), Some("publicationName"));
        assert_eq!(t.row(0).get("author_names"), Some("Smith J."));
        assert_eq!(t.row(0).get("publicationName"), Some("Journal of X"));
        assert_eq!(t.row(1).get("author_names"), None);
        assert_eq!(t.row(1).get("publicationName"), None);
        assert!(t.column_index("pub_year").is_some());
    }

    #[test]
    fn reference_example_keeps_seven_rows() {
        let mut records = Vec::new();
        for i in 0..3 {
            let mut r = Record::new();
            r.insert("title", Some(format!("Paper 2020-{i}")));
            r.insert("pub_year", Some("2020".into()));
            records.push(r);
        }
        let mut y2021 = Vec::new();
        for i in 0..4 {
            let mut r = Record::new();
            r.insert("title", Some(format!("Paper 2021-{i}")));
            r.insert("pub_year", Some("2021".into()));
            y2021.push(r);
        }
        records.extend(y2021.iter().cloned());
        records.extend(y2021);
        let raw = RecordTable::from_records(records);
        assert_eq!(raw.len(), 11);

        let cleaned = clean(&raw);
        assert_eq!(cleaned.table.len(), 7);
        assert_eq!(cleaned.report.duplicates_removed, 4);
        assert_eq!(cleaned.report.dedup_key, DedupKey::FullRow);
    }

    #[test]
    fn cleaning_is_idempotent() {
        let raw = table(
            &["eid", "dc:creator", "coverDate", "journal"],
            &[
                &["e1", "A", "2020-01-01", " J1 "],
                &["e1", "A", "2020-01-01", "J1"],
                &["e2", "B", "2021-01-01", "J2"],
                &["", "C", "", ""],
            ],
        );
        let once = clean(&raw);
        let twice = clean(&once.table);
        assert_eq!(once.table, twice.table);
        assert_eq!(twice.report.duplicates_removed, 0);
    }

    #[test]
    fn rows_equal_after_filling_collapse_in_one_pass() {
        let raw = table(
            &["title", "pub_year", "coverDate", "creator", "author_names"],
            &[
                &["A", "", "2020-01-01", "Smith", ""],
                &["A", "2020", "2020-01-01", "Smith", "Smith"],
            ],
        );
        let once = clean(&raw);
        assert_eq!(once.report.rows_after, 1);
        assert_eq!(once.table.row(0).get("pub_year"), Some("2020"));

        let twice = clean(&once.table);
        assert_eq!(twice.table, once.table);
        assert_eq!(twice.report.duplicates_removed, 0);
    }

    #[test]
    fn no_required_columns() {
        let cleaned = clean(&RecordTable::default());
        assert_eq!(cleaned.report.rows_after, 0);
        assert_eq!(cleaned.table.columns(), &["pub_year", "author_names"]);
    }
}
