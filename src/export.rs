use crate::record::{Record, CODE_COLUMN, COLUMNS, COLUMN_COUNT};
use crate::util::{create_with_backoff, replace_file_atomic_backoff};
use anyhow::{Context, Result};
use rust_xlsxwriter::{Format, Table, TableColumn, TableStyle, Workbook};
use std::io::BufWriter;
use std::path::{Path, PathBuf};

pub const CSV_FILE_NAME: &str = "combined_bnf_snomed_mapping_data.csv";
pub const XLSX_FILE_NAME: &str = "combined_bnf_snomed_mapping_data.xlsx";

/// Persists the canonical dataset. Returns the path written.
pub trait CanonicalExporter {
    fn export(&self, rows: &[Record]) -> Result<PathBuf>;
}

fn temp_for(path: &Path) -> PathBuf {
    let mut name = path.file_name().map(|n| n.to_os_string()).unwrap_or_default();
    name.push(".inprogress");
    path.with_file_name(name)
}

/// UTF-8, comma-delimited, header row first, blanks as empty strings.
#[derive(Clone, Debug)]
pub struct CsvExporter {
    pub path: PathBuf,
    pub write_buffer_bytes: usize,
}

impl CsvExporter {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into(), write_buffer_bytes: 256 * 1024 }
    }
}

impl CanonicalExporter for CsvExporter {
    fn export(&self, rows: &[Record]) -> Result<PathBuf> {
        let tmp = temp_for(&self.path);
        {
            let f = create_with_backoff(&tmp).with_context(|| format!("create {}", tmp.display()))?;
            let mut w = csv::Writer::from_writer(BufWriter::with_capacity(self.write_buffer_bytes.max(8 * 1024), f));
            w.write_record(COLUMNS)?;
            for r in rows {
                w.write_record(r.fields())?;
            }
            w.flush().with_context(|| format!("flush {}", tmp.display()))?;
        }
        replace_file_atomic_backoff(&tmp, &self.path)?;
        tracing::info!("Data combined and saved to {} with {} rows.", self.path.display(), rows.len());
        Ok(self.path.clone())
    }
}

/// Styled workbook: one sheet, a banded table over all rows, uniform column widths, and the
/// code column stored as text so long SNOMED identifiers are not turned into numbers.
#[derive(Clone, Debug)]
pub struct XlsxExporter {
    pub path: PathBuf,
    pub sheet_name: String,
    pub table_name: String,
    pub column_width: f64,
}

impl XlsxExporter {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            sheet_name: "BNF Snomed Mapping Data".to_string(),
            table_name: "BNFSnomedMapping".to_string(),
            column_width: 20.0,
        }
    }
}

impl CanonicalExporter for XlsxExporter {
    fn export(&self, rows: &[Record]) -> Result<PathBuf> {
        let mut workbook = Workbook::new();
        let text = Format::new().set_num_format("@");
        let sheet = workbook.add_worksheet();
        sheet.set_name(&self.sheet_name)?;

        for (col, header) in COLUMNS.iter().enumerate() {
            let col = col as u16;
            sheet.set_column_width(col, self.column_width)?;
            sheet.write_string(0, col, *header)?;
        }
        for (i, record) in rows.iter().enumerate() {
            let row = i as u32 + 1;
            for (col, value) in record.iter().enumerate() {
                if col == CODE_COLUMN {
                    sheet.write_string_with_format(row, col as u16, value, &text)?;
                } else {
                    sheet.write_string(row, col as u16, value)?;
                }
            }
        }

        // A table needs at least one data row; an empty dataset gets a blank one.
        let last_row = rows.len().max(1) as u32;
        let columns: Vec<TableColumn> = COLUMNS.iter().map(|h| TableColumn::new().set_header(*h)).collect();
        let table = Table::new()
            .set_name(&self.table_name)
            .set_style(TableStyle::Light8)
            .set_banded_rows(true)
            .set_banded_columns(true)
            .set_columns(&columns);
        sheet.add_table(0, 0, last_row, (COLUMN_COUNT - 1) as u16, &table)?;

        let tmp = temp_for(&self.path);
        workbook.save(&tmp).with_context(|| format!("save {}", tmp.display()))?;
        replace_file_atomic_backoff(&tmp, &self.path)?;
        tracing::info!("Data also saved to {}.", self.path.display());
        Ok(self.path.clone())
    }
}
