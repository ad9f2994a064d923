//! Pass-through record table
//!
//! The column set is whatever the search client returned. Every cell is an
//! optional string; the pipeline only interprets the year-bearing and
//! identifier columns and carries everything else verbatim.

/// Columns that may carry a publication year, in lookup order.
pub const YEAR_COLUMNS: &[&str] = &[
    "pub_year",
    "year",
    "Year",
    "coverDate",
    "cover_date",
    "prism:coverDate",
];

/// Columns that uniquely identify a record, in lookup order.
pub const IDENTIFIER_COLUMNS: &[&str] = &["eid", "EID"];

/// One record before it is placed into a table: ordered (column, value) pairs.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Record {
    fields: Vec<(String, Option<String>)>,
}

impl Record {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set a field, replacing an earlier value under the same name.
    pub fn insert(&mut self, name: impl Into<String>, value: Option<String>) {
        let name = name.into();
        if let Some(slot) = self.fields.iter_mut().find(|(n, _)| *n == name) {
            slot.1 = value;
        } else {
            self.fields.push((name, value));
        }
    }

    pub fn get(&self, name: &str) -> Option<&str> {
        self.fields
            .iter()
            .find(|(n, _)| n == name)
            .and_then(|(_, v)| v.as_deref())
    }

    pub fn fields(&self) -> &[(String, Option<String>)] {
        &self.fields
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }
}

/// Column-named table of optional string cells, row-major.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RecordTable {
    columns: Vec<String>,
    rows: Vec<Vec<Option<String>>>,
}

impl RecordTable {
    pub fn new(columns: Vec<String>) -> Self {
        Self {
            columns,
            rows: Vec::new(),
        }
    }

    /// Build a table from records; columns are the union in first-seen order.
    pub fn from_records(records: impl IntoIterator<Item = Record>) -> Self {
        let mut table = Self::default();
        for record in records {
            let mut row = vec![None; table.columns.len()];
            for (name, value) in record.fields {
                let idx = table.ensure_column(&name);
                if idx >= row.len() {
                    row.resize(idx + 1, None);
                }
                row[idx] = value;
            }
            row.resize(table.columns.len(), None);
            table.rows.push(row);
        }
        table
    }

    /// Stack tables vertically; columns are unioned in first-seen order.
    pub fn concat(tables: impl IntoIterator<Item = RecordTable>) -> Self {
        let mut out = Self::default();
        for table in tables {
            let mapping: Vec<usize> = table
                .columns
                .iter()
                .map(|c| out.ensure_column(c))
                .collect();
            let width = out.columns.len();
            for row in table.rows {
                let mut new_row = vec![None; width];
                for (src, value) in row.into_iter().enumerate() {
                    new_row[mapping[src]] = value;
                }
                out.rows.push(new_row);
            }
        }
        out
    }

    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|c| c == name)
    }

    /// Index of the first candidate column present in the schema.
    pub fn first_column(&self, candidates: &[&str]) -> Option<usize> {
        candidates.iter().find_map(|c| self.column_index(c))
    }

    /// All year-bearing columns present, in lookup order.
    pub fn year_columns(&self) -> Vec<usize> {
        YEAR_COLUMNS
            .iter()
            .filter_map(|c| self.column_index(c))
            .collect()
    }

    pub fn identifier_column(&self) -> Option<usize> {
        self.first_column(IDENTIFIER_COLUMNS)
    }

    /// Return the column index, appending an all-null column when absent.
    pub fn ensure_column(&mut self, name: &str) -> usize {
        if let Some(idx) = self.column_index(name) {
            return idx;
        }
        self.columns.push(name.to_string());
        for row in &mut self.rows {
            row.push(None);
        }
        self.columns.len() - 1
    }

    /// Append a row. Short rows are padded with nulls.
    pub fn push_row(&mut self, mut values: Vec<Option<String>>) -> anyhow::Result<()> {
        anyhow::ensure!(
            values.len() <= self.columns.len(),
            "row has {} values but table has {} columns",
            values.len(),
            self.columns.len()
        );
        values.resize(self.columns.len(), None);
        self.rows.push(values);
        Ok(())
    }

    pub fn cell(&self, row: usize, col: usize) -> Option<&str> {
        self.rows
            .get(row)
            .and_then(|r| r.get(col))
            .and_then(|v| v.as_deref())
    }

    pub fn set_cell(&mut self, row: usize, col: usize, value: Option<String>) {
        if let Some(slot) = self.rows.get_mut(row).and_then(|r| r.get_mut(col)) {
            *slot = value;
        }
    }

    pub fn row(&self, idx: usize) -> RowView<'_> {
        RowView { table: self, idx }
    }

    pub fn rows(&self) -> impl Iterator<Item = RowView<'_>> {
        (0..self.rows.len()).map(move |idx| RowView { table: self, idx })
    }

    /// Column values, top to bottom.
    pub fn column_values(&self, col: usize) -> impl Iterator<Item = Option<&str>> {
        self.rows
            .iter()
            .map(move |r| r.get(col).and_then(|v| v.as_deref()))
    }

    /// Keep only the rows at `keep` (ascending indices), preserving their order.
    pub fn select_rows(&self, keep: &[usize]) -> Self {
        Self {
            columns: self.columns.clone(),
            rows: keep.iter().filter_map(|&i| self.rows.get(i).cloned()).collect(),
        }
    }
}

/// Borrowed view of one table row.
#[derive(Debug, Clone, Copy)]
pub struct RowView<'a> {
    table: &'a RecordTable,
    idx: usize,
}

impl<'a> RowView<'a> {
    pub fn index(&self) -> usize {
        self.idx
    }

    pub fn get(&self, name: &str) -> Option<&'a str> {
        let col = self.table.column_index(name)?;
        self.table.cell(self.idx, col)
    }

    pub fn at(&self, col: usize) -> Option<&'a str> {
        self.table.cell(self.idx, col)
    }

    pub fn values(&self) -> &'a [Option<String>] {
        &self.table.rows[self.idx]
    }

    /// Publication year from the first year-bearing column that parses.
    pub fn year(&self, year_columns: &[usize]) -> Option<i32> {
        year_columns
            .iter()
            .find_map(|&col| self.at(col).and_then(parse_year))
    }
}

/// Parse a year from the leading four characters (`2021`, `2021-05-01`, `2021.0`).
pub fn parse_year(value: &str) -> Option<i32> {
    let text = value.trim();
    let head = text.get(..4)?;
    if !head.chars().all(|c| c.is_ascii_digit()) {
        return None;
    }
    head.parse().ok()
}
