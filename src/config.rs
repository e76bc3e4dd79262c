use crate::record::ColumnPolicy;
use std::path::{Path, PathBuf};
use std::time::Duration;

pub const DEFAULT_INDEX_URL: &str =
    "https://www.nhsbsa.nhs.uk/prescription-data/understanding-our-data/bnf-snomed-mapping";

/// User-facing options with sensible defaults and builder chaining.
#[derive(Clone, Debug)]
pub struct PipelineOptions {
    pub base_dir: PathBuf,
    pub index_url: String,        // archive links are resolved against this page
    pub offline: bool,            // skip acquisition, merge what is cached
    pub table_extension: String,  // archive entries to extract
    pub http_timeout: Duration,

    // external converter: `{input}` / `{output}` are substituted per table
    pub converter_program: String,
    pub converter_args: Vec<String>,
    pub converter_timeout: Duration,

    pub column_policy: ColumnPolicy,
    pub xlsx_export: bool,        // also write the styled workbook next to the csv
    pub progress: bool,

    // IO tuning
    pub read_buffer_bytes: usize,
    pub write_buffer_bytes: usize,
}

impl Default for PipelineOptions {
    fn default() -> Self {
        Self {
            base_dir: PathBuf::from("bnf_snomed_mapping_data"),
            index_url: DEFAULT_INDEX_URL.to_string(),
            offline: false,
            table_extension: ".xlsx".to_string(),
            http_timeout: Duration::from_secs(120),

            converter_program: "cscript".to_string(),
            converter_args: ["//nologo", "convert_to_csv.vbs", "{input}", "{output}"]
                .iter()
                .map(|s| s.to_string())
                .collect(),
            converter_timeout: Duration::from_secs(300),

            column_policy: ColumnPolicy::Reject,
            xlsx_export: true,
            progress: true,

            read_buffer_bytes: 256 * 1024,
            write_buffer_bytes: 256 * 1024,
        }
    }
}

impl PipelineOptions {
    pub fn with_base_dir(mut self, base_dir: impl AsRef<Path>) -> Self {
        self.base_dir = base_dir.as_ref().to_path_buf();
        self
    }
    pub fn with_index_url(mut self, url: impl Into<String>) -> Self {
        self.index_url = url.into();
        self
    }
    pub fn with_offline(mut self, yes: bool) -> Self {
        self.offline = yes;
        self
    }
    pub fn with_table_extension(mut self, ext: impl AsRef<str>) -> Self {
        let ext = ext.as_ref().trim();
        self.table_extension = if ext.starts_with('.') { ext.to_string() } else { format!(".{ext}") };
        self
    }
    pub fn with_http_timeout(mut self, timeout: Duration) -> Self {
        self.http_timeout = timeout;
        self
    }
    pub fn with_converter<I, S>(mut self, program: impl Into<String>, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.converter_program = program.into();
        self.converter_args = args.into_iter().map(Into::into).collect();
        self
    }
    pub fn with_converter_timeout(mut self, timeout: Duration) -> Self {
        self.converter_timeout = timeout.max(Duration::from_millis(100));
        self
    }
    pub fn with_column_policy(mut self, policy: ColumnPolicy) -> Self {
        self.column_policy = policy;
        self
    }
    pub fn with_xlsx_export(mut self, yes: bool) -> Self {
        self.xlsx_export = yes;
        self
    }
    pub fn with_progress(mut self, yes: bool) -> Self {
        self.progress = yes;
        self
    }
    pub fn with_io_buffers(mut self, read_bytes: usize, write_bytes: usize) -> Self {
        self.read_buffer_bytes = read_bytes.max(8 * 1024);
        self.write_buffer_bytes = write_bytes.max(8 * 1024);
        self
    }
}
