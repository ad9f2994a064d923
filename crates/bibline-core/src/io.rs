//! Table files: Parquet when the columnar engine is compiled in, CSV otherwise
//!
//! Writers go through `<name>.tmp` and an atomic rename. Every column is
//! written as nullable UTF-8; CSV cannot tell null from empty, so empty CSV
//! cells read back as null.

use std::fmt;
use std::fs::{self, File};
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};

use crate::error::{Capability, PipelineError};
use crate::table::RecordTable;

/// On-disk table format.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TableFormat {
    Parquet,
    Csv,
}

impl TableFormat {
    pub fn extension(self) -> &'static str {
        match self {
            Self::Parquet => "parquet",
            Self::Csv => "csv",
        }
    }

    fn from_path(path: &Path) -> Option<Self> {
        match path.extension()?.to_str()? {
            "parquet" => Some(Self::Parquet),
            "csv" => Some(Self::Csv),
            _ => None,
        }
    }
}

impl fmt::Display for TableFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.extension())
    }
}

/// Requested output format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FormatPreference {
    /// Parquet when available, CSV otherwise.
    #[default]
    Auto,
    Parquet,
    Csv,
}

/// Result of a table write.
#[derive(Debug, Clone)]
pub struct WrittenTable {
    pub path: PathBuf,
    pub format: TableFormat,
    pub rows: usize,
}

/// Whether this build can read and write Parquet.
pub const fn columnar_available() -> bool {
    cfg!(feature = "parquet")
}

/// Strip a `.parquet`/`.csv` suffix, leaving the artifact base path.
fn base_path(path: &Path) -> PathBuf {
    if TableFormat::from_path(path).is_some() {
        path.with_extension("")
    } else {
        path.to_path_buf()
    }
}

fn with_format(base: &Path, format: TableFormat) -> PathBuf {
    let mut name = base.as_os_str().to_os_string();
    name.push(".");
    name.push(format.extension());
    PathBuf::from(name)
}

fn log_capability_gap(reason: &str) {
    let gap = PipelineError::CapabilityUnavailable {
        capability: Capability::ColumnarFormat,
        reason: reason.to_string(),
    };
    log::warn!("{gap}; writing CSV instead");
}

/// Write `table` to `<base>.parquet` or `<base>.csv`.
///
/// A file of the other format left over from an earlier run with the same
/// base is removed so readers never pick up stale data.
pub fn write_table(
    table: &RecordTable,
    base: &Path,
    preference: FormatPreference,
    zstd_level: i32,
) -> Result<WrittenTable> {
    let base = base_path(base);
    if let Some(parent) = base.parent() {
        fs::create_dir_all(parent)
            .with_context(|| format!("failed to create {}", parent.display()))?;
    }

    let want_parquet = !matches!(preference, FormatPreference::Csv);
    let format = if !want_parquet {
        TableFormat::Csv
    } else if !columnar_available() {
        log_capability_gap("built without the `parquet` feature");
        TableFormat::Csv
    } else if table.columns().is_empty() {
        log::debug!("table has no columns; Parquet needs a schema, using CSV");
        TableFormat::Csv
    } else {
        TableFormat::Parquet
    };

    let written = match format {
        TableFormat::Parquet => match write_atomic(table, &base, TableFormat::Parquet, zstd_level)
        {
            Ok(w) => w,
            Err(e) => {
                log_capability_gap(&format!("Parquet write failed: {e:#}"));
                write_atomic(table, &base, TableFormat::Csv, zstd_level)?
            }
        },
        TableFormat::Csv => write_atomic(table, &base, TableFormat::Csv, zstd_level)?,
    };

    let other = match written.format {
        TableFormat::Parquet => TableFormat::Csv,
        TableFormat::Csv => TableFormat::Parquet,
    };
    let stale = with_format(&base, other);
    if stale.exists() {
        log::info!("Removing stale {}", stale.display());
        fs::remove_file(&stale).with_context(|| format!("failed to remove {}", stale.display()))?;
    }

    Ok(written)
}

fn write_atomic(
    table: &RecordTable,
    base: &Path,
    format: TableFormat,
    zstd_level: i32,
) -> Result<WrittenTable> {
    let final_path = with_format(base, format);
    let mut tmp_name = final_path.as_os_str().to_os_string();
    tmp_name.push(".tmp");
    let tmp_path = PathBuf::from(tmp_name);

    if tmp_path.exists() {
        fs::remove_file(&tmp_path)?;
    }

    let result = match format {
        TableFormat::Parquet => write_parquet(table, &tmp_path, zstd_level),
        TableFormat::Csv => write_csv(table, &tmp_path),
    };
    if let Err(e) = result {
        let _ = fs::remove_file(&tmp_path);
        return Err(e);
    }

    fs::rename(&tmp_path, &final_path).with_context(|| {
        format!(
            "failed to rename {} → {}",
            tmp_path.display(),
            final_path.display()
        )
    })?;

    Ok(WrittenTable {
        path: final_path,
        format,
        rows: table.len(),
    })
}

/// Find the table file for `base`: an exact path, else `.parquet`, else `.csv`.
pub fn locate_table(base: &Path) -> Option<PathBuf> {
    if TableFormat::from_path(base).is_some() {
        return base.exists().then(|| base.to_path_buf());
    }
    [TableFormat::Parquet, TableFormat::Csv]
        .into_iter()
        .map(|f| with_format(base, f))
        .find(|p| p.exists())
}

/// Read a table written by [`write_table`] (or any CSV/Parquet file).
pub fn read_table(base: &Path) -> Result<(RecordTable, PathBuf, TableFormat)> {
    let path = locate_table(base)
        .with_context(|| format!("no parquet/csv table found for {}", base.display()))?;

    let mut format = TableFormat::from_path(&path).unwrap_or(TableFormat::Csv);
    let mut path = path;

    if format == TableFormat::Parquet && !columnar_available() {
        let csv_path = path.with_extension("csv");
        anyhow::ensure!(
            csv_path.exists(),
            "{} is Parquet but this build has no Parquet support and no CSV fallback exists",
            path.display()
        );
        log::warn!(
            "Parquet support unavailable; reading {} instead",
            csv_path.display()
        );
        path = csv_path;
        format = TableFormat::Csv;
    }

    let table = match format {
        TableFormat::Parquet => read_parquet(&path),
        TableFormat::Csv => read_csv(&path),
    }
    .with_context(|| format!("failed to read {}", path.display()))?;

    log::debug!(
        "Read {} rows × {} columns from {}",
        table.len(),
        table.columns().len(),
        path.display()
    );
    Ok((table, path, format))
}

fn write_csv(table: &RecordTable, path: &Path) -> Result<()> {
    let mut writer = csv::Writer::from_path(path)
        .with_context(|| format!("failed to create {}", path.display()))?;
    if !table.columns().is_empty() {
        writer.write_record(table.columns())?;
        for row in table.rows() {
            writer.write_record(row.values().iter().map(|v| v.as_deref().unwrap_or("")))?;
        }
    }
    writer.flush()?;
    Ok(())
}

fn read_csv(path: &Path) -> Result<RecordTable> {
    let file = File::open(path)?;
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(true)
        .flexible(true)
        .from_reader(file);

    let headers: Vec<String> = reader.headers()?.iter().map(str::to_string).collect();
    let mut table = RecordTable::new(headers);
    for result in reader.records() {
        let record = result?;
        let values: Vec<Option<String>> = record
            .iter()
            .take(table.columns().len())
            .map(|v| (!v.is_empty()).then(|| v.to_string()))
            .collect();
        table.push_row(values)?;
    }
    Ok(table)
}

#[cfg(feature = "parquet")]
fn write_parquet(table: &RecordTable, path: &Path, zstd_level: i32) -> Result<()> {
    use std::sync::Arc;

    use arrow::array::{ArrayRef, RecordBatch, StringArray};
    use arrow::datatypes::{DataType, Field, Schema};
    use parquet::arrow::ArrowWriter;
    use parquet::basic::{Compression, ZstdLevel};
    use parquet::file::properties::WriterProperties;

    let schema = Arc::new(Schema::new(
        table
            .columns()
            .iter()
            .map(|c| Field::new(c, DataType::Utf8, true))
            .collect::<Vec<_>>(),
    ));
    let arrays: Vec<ArrayRef> = (0..table.columns().len())
        .map(|col| Arc::new(StringArray::from_iter(table.column_values(col))) as ArrayRef)
        .collect();
    let batch = RecordBatch::try_new(schema.clone(), arrays)?;

    let level = ZstdLevel::try_new(zstd_level)?;
    let props = WriterProperties::builder()
        .set_compression(Compression::ZSTD(level))
        .build();

    let file = File::create(path)?;
    let mut writer = ArrowWriter::try_new(file, schema, Some(props))?;
    writer.write(&batch)?;
    writer.close()?;
    Ok(())
}

#[cfg(not(feature = "parquet"))]
fn write_parquet(_table: &RecordTable, _path: &Path, _zstd_level: i32) -> Result<()> {
    anyhow::bail!("built without the `parquet` feature")
}

#[cfg(feature = "parquet")]
fn read_parquet(path: &Path) -> Result<RecordTable> {
    use arrow::array::{Array, AsArray};
    use arrow::compute::cast;
    use arrow::datatypes::DataType;
    use parquet::arrow::arrow_reader::ParquetRecordBatchReaderBuilder;

    let file = File::open(path)?;
    let builder = ParquetRecordBatchReaderBuilder::try_new(file)?;
    let columns: Vec<String> = builder
        .schema()
        .fields()
        .iter()
        .map(|f| f.name().clone())
        .collect();
    let reader = builder.build()?;

    let mut table = RecordTable::new(columns);
    for batch in reader {
        let batch = batch?;
        let strings = batch
            .columns()
            .iter()
            .map(|col| cast(col, &DataType::Utf8))
            .collect::<Result<Vec<_>, _>>()?;
        for row in 0..batch.num_rows() {
            let values = strings
                .iter()
                .map(|arr| {
                    let arr = arr.as_string::<i32>();
                    (!arr.is_null(row)).then(|| arr.value(row).to_string())
                })
                .collect();
            table.push_row(values)?;
        }
    }
    Ok(table)
}

#[cfg(not(feature = "parquet"))]
fn read_parquet(_path: &Path) -> Result<RecordTable> {
    anyhow::bail!("built without the `parquet` feature")
}

/// Remove stale .tmp files in an output directory
pub fn cleanup_tmp_files(output_dir: &Path) -> std::io::Result<()> {
    if !output_dir.exists() {
        return Ok(());
    }
    for entry in fs::read_dir(output_dir)? {
        let path = entry?.path();
        if path.extension().is_some_and(|ext| ext == "tmp") {
            log::warn!("Removing stale tmp file: {}", path.display());
            fs::remove_file(&path)?;
        }
    }
    Ok(())
}
