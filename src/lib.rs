mod config;
mod date;
mod paths;
mod util;
mod progress;
mod error;

mod record;
mod store;
mod table;
mod convert;
mod acquire;
mod dedupe;
mod latest;
mod export;
mod summary;
mod pipeline;

pub use crate::config::{PipelineOptions, DEFAULT_INDEX_URL};
pub use crate::date::SnapshotDate;
pub use crate::paths::{discover_tables, Layout};
pub use crate::pipeline::{normalized_name, MappingETL};
pub use crate::summary::{RunSummary, SourceReport, SUMMARY_FILE_NAME};

// error taxonomy for per-file failures
pub use crate::error::{FailureKind, StageError};

// the fixed row schema
pub use crate::record::{ColumnPolicy, Record, CODE_COLUMN, COLUMNS, COLUMN_COUNT};

// idempotent stage caches
pub use crate::store::{ensure, ArtifactStore, DirStore, Ensured};

// adapters: row-text reading, format conversion, acquisition, export
pub use crate::table::{CsvTableSource, TableSource};
pub use crate::convert::{CommandConverter, FormatConverter};
pub use crate::acquire::{archive_name, discover_zip_links, extract_tables, fetch_archive, ExtractedTable, Fetcher, HttpFetcher};
pub use crate::export::{CanonicalExporter, CsvExporter, XlsxExporter, CSV_FILE_NAME, XLSX_FILE_NAME};

// dedupe engine and latest selection
pub use crate::dedupe::{merge_source, DedupeState, MergeOutcome};
pub use crate::latest::{pick_promotion, rotate_latest, select_latest, Rotation, SourceFile, SourceStatus};

pub use crate::util::init_tracing_once;
