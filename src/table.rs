use crate::error::StageError;
use crate::record::{ColumnPolicy, Record, COLUMN_COUNT};
use crate::util::open_with_backoff;
use std::io::BufReader;
use std::path::Path;

/// Reads a normalized table as a stream of [`Record`]s.
///
/// Implementations deliver rows as they are read. When an error is returned, the rows before
/// the failure have already been handed to `on_record` and the rest of the file is abandoned.
pub trait TableSource {
    fn for_each_record(&self, path: &Path, on_record: &mut dyn FnMut(Record)) -> Result<u64, StageError>;

    /// Whole-table convenience wrapper around [`TableSource::for_each_record`].
    fn read_table(&self, path: &Path) -> Result<Vec<Record>, StageError> {
        let mut rows = Vec::new();
        self.for_each_record(path, &mut |r| rows.push(r))?;
        Ok(rows)
    }
}

/// Comma-delimited text with a header row, as written by the format converter.
/// Ragged rows are accepted; each row is projected to the first 11 columns.
#[derive(Clone, Debug)]
pub struct CsvTableSource {
    pub policy: ColumnPolicy,
    pub read_buffer_bytes: usize,
}

impl Default for CsvTableSource {
    fn default() -> Self {
        Self { policy: ColumnPolicy::default(), read_buffer_bytes: 256 * 1024 }
    }
}

impl CsvTableSource {
    pub fn new(policy: ColumnPolicy) -> Self {
        Self { policy, ..Default::default() }
    }
}

impl TableSource for CsvTableSource {
    fn for_each_record(&self, path: &Path, on_record: &mut dyn FnMut(Record)) -> Result<u64, StageError> {
        let parse_err = |row: u64, e: csv::Error| StageError::Parse {
            path: path.to_path_buf(),
            row,
            reason: e.to_string(),
        };

        let file = open_with_backoff(path)?;
        let mut rdr = csv::ReaderBuilder::new()
            .has_headers(true)
            .flexible(true)
            .from_reader(BufReader::with_capacity(self.read_buffer_bytes.max(8 * 1024), file));

        let width = rdr.headers().map_err(|e| parse_err(1, e))?.len();
        if width < COLUMN_COUNT && self.policy == ColumnPolicy::Reject {
            return Err(StageError::ColumnCount { path: path.to_path_buf(), found: width, expected: COLUMN_COUNT });
        }

        let mut n: u64 = 0;
        for row in rdr.records() {
            // header is row 1
            let row = row.map_err(|e| parse_err(n + 2, e))?;
            on_record(Record::from_fields(row.iter()));
            n += 1;
        }
        Ok(n)
    }
}
