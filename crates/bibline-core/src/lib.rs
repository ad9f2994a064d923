//! Bibline Core - Common infrastructure for the bibliometric pipeline
//!
//! Provides the pass-through record table, table file I/O (Parquet with a
//! CSV fallback), the pipeline error taxonomy, logging and progress display
//! shared by every phase.

pub mod error;
pub mod io;
pub mod logging;
pub mod progress;
pub mod table;

// Re-exports for convenience
pub use error::{Capability, PipelineError};
pub use io::{
    FormatPreference, TableFormat, WrittenTable, cleanup_tmp_files, columnar_available,
    locate_table, read_table, write_table,
};
pub use logging::{attach_log_file, init_logging};
pub use progress::{ProgressContext, fmt_num};
pub use table::{Record, RecordTable, RowView, parse_year};
