use crate::error::FailureKind;
use crate::latest::{SourceFile, SourceStatus};
use crate::util::{create_with_backoff, replace_file_atomic_backoff};
use anyhow::{Context, Result};
use serde::Serialize;
use std::fmt::Display;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

pub const SUMMARY_FILE_NAME: &str = "run_summary.json";

/// What one run did, stage by stage. Written to `output/run_summary.json`.
#[derive(Clone, Debug, Default, Serialize)]
pub struct RunSummary {
    pub links_found: usize,
    pub archives_fetched: usize,
    pub archives_cached: usize,
    pub tables_extracted: usize,
    pub tables_cached: usize,
    pub conversions_run: usize,
    pub conversions_cached: usize,

    pub acquisition_failures: usize,
    pub conversion_failures: usize,
    pub parse_failures: usize,
    pub export_failures: usize,

    pub rows_read: u64,
    pub canonical_rows: usize,
    pub latest: Option<String>,
    pub outputs: Vec<PathBuf>,
    pub sources: Vec<SourceReport>,
}

#[derive(Clone, Debug, Serialize)]
pub struct SourceReport {
    pub name: String,
    pub date: Option<String>,
    pub status: SourceStatus,
    pub rows_added: u64,
}

impl SourceReport {
    pub fn new(src: &SourceFile, rows_added: u64) -> Self {
        Self {
            name: src.name.clone(),
            date: src.date.map(|d| d.to_string()),
            status: src.status,
            rows_added,
        }
    }
}

impl RunSummary {
    /// Log a per-file failure and count it. The run carries on.
    pub fn fail(&mut self, kind: FailureKind, msg: impl Display) {
        tracing::error!("{}", msg);
        match kind {
            FailureKind::Acquisition => self.acquisition_failures += 1,
            FailureKind::Conversion => self.conversion_failures += 1,
            FailureKind::Parse => self.parse_failures += 1,
            FailureKind::Export => self.export_failures += 1,
        }
    }

    pub fn total_failures(&self) -> usize {
        self.acquisition_failures + self.conversion_failures + self.parse_failures + self.export_failures
    }

    pub fn write_json(&self, path: &Path) -> Result<()> {
        let mut name = path.file_name().map(|n| n.to_os_string()).unwrap_or_default();
        name.push(".inprogress");
        let tmp = path.with_file_name(name);
        {
            let f = create_with_backoff(&tmp).with_context(|| format!("create {}", tmp.display()))?;
            let mut w = BufWriter::new(f);
            serde_json::to_writer_pretty(&mut w, self)?;
            w.write_all(b"\n")?;
            w.flush()?;
        }
        replace_file_atomic_backoff(&tmp, path)
    }
}
