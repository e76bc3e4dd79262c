use crate::acquire::{discover_zip_links, extract_tables, fetch_archive, Fetcher, HttpFetcher};
use crate::config::PipelineOptions;
use crate::convert::{CommandConverter, FormatConverter};
use crate::dedupe::{merge_source, DedupeState};
use crate::error::FailureKind;
use crate::export::{CanonicalExporter, CsvExporter, XlsxExporter, CSV_FILE_NAME, XLSX_FILE_NAME};
use crate::latest::{pick_promotion, rotate_latest, select_latest, SourceFile, SourceStatus};
use crate::paths::{discover_tables, Layout};
use crate::progress::ProgressScope;
use crate::record::{ColumnPolicy, Record};
use crate::store::{ensure, ArtifactStore, DirStore};
use crate::summary::{RunSummary, SourceReport, SUMMARY_FILE_NAME};
use crate::table::{CsvTableSource, TableSource};
use crate::util::{file_name_str, init_tracing_once};
use ahash::AHashSet;
use anyhow::Result;
use std::path::{Path, PathBuf};
use std::time::Duration;
use url::Url;

/// The mapping ETL: acquire → normalize → dedupe → export → rotate latest.
///
/// Every stage caches under the base directory, so running it again after an interruption
/// picks up at the first missing artifact. Adapters default to HTTP download, the external
/// converter command, and csv reading; each can be swapped through the builder.
pub struct MappingETL {
    pub(crate) opts: PipelineOptions,
    fetcher: Option<Box<dyn Fetcher>>,
    converter: Option<Box<dyn FormatConverter>>,
    table_source: Option<Box<dyn TableSource>>,
}

struct Stores {
    archives: DirStore,
    tables: DirStore,
    normalized: DirStore,
    latest: DirStore,
}

impl Default for MappingETL {
    fn default() -> Self {
        Self::new()
    }
}

impl MappingETL {
    pub fn new() -> Self {
        Self::with_options(PipelineOptions::default())
    }

    pub fn with_options(opts: PipelineOptions) -> Self {
        Self { opts, fetcher: None, converter: None, table_source: None }
    }

    // -------- Builder methods --------
    pub fn base_dir(mut self, base: impl AsRef<Path>) -> Self { self.opts = self.opts.with_base_dir(base); self }
    pub fn index_url(mut self, url: impl Into<String>) -> Self { self.opts = self.opts.with_index_url(url); self }
    pub fn offline(mut self, yes: bool) -> Self { self.opts = self.opts.with_offline(yes); self }
    pub fn table_extension(mut self, ext: impl AsRef<str>) -> Self { self.opts = self.opts.with_table_extension(ext); self }
    pub fn http_timeout(mut self, timeout: Duration) -> Self { self.opts = self.opts.with_http_timeout(timeout); self }
    pub fn converter_command<I, S>(mut self, program: impl Into<String>, args: I) -> Self where I: IntoIterator<Item = S>, S: Into<String> { self.opts = self.opts.with_converter(program, args); self }
    pub fn converter_timeout(mut self, timeout: Duration) -> Self { self.opts = self.opts.with_converter_timeout(timeout); self }
    pub fn column_policy(mut self, policy: ColumnPolicy) -> Self { self.opts = self.opts.with_column_policy(policy); self }
    pub fn xlsx_export(mut self, yes: bool) -> Self { self.opts = self.opts.with_xlsx_export(yes); self }
    pub fn progress(mut self, yes: bool) -> Self { self.opts = self.opts.with_progress(yes); self }
    pub fn io_buffers(mut self, read_bytes: usize, write_bytes: usize) -> Self { self.opts = self.opts.with_io_buffers(read_bytes, write_bytes); self }

    // -------- Adapter overrides --------
    pub fn fetcher(mut self, f: impl Fetcher + 'static) -> Self { self.fetcher = Some(Box::new(f)); self }
    pub fn converter(mut self, c: impl FormatConverter + 'static) -> Self { self.converter = Some(Box::new(c)); self }
    pub fn table_source(mut self, t: impl TableSource + 'static) -> Self { self.table_source = Some(Box::new(t)); self }

    pub fn options(&self) -> &PipelineOptions {
        &self.opts
    }

    /// Run every stage and return the summary.
    pub fn run(self) -> Result<RunSummary> {
        self.run_collect().map(|(summary, _)| summary)
    }

    /// Run every stage and also hand back the canonical rows.
    ///
    /// Per-file failures are logged and counted in the summary; only failing to lay out the
    /// base directory or to write the canonical export aborts the run.
    pub fn run_collect(self) -> Result<(RunSummary, Vec<Record>)> {
        init_tracing_once();

        let layout = Layout::new(&self.opts.base_dir);
        layout.create_all()?;
        let stores = Stores {
            archives: DirStore::open(&layout.archives)?,
            tables: DirStore::open(&layout.tables)?,
            normalized: DirStore::open(&layout.normalized)?,
            latest: DirStore::open(&layout.latest)?,
        };

        let mut summary = RunSummary::default();

        let mut sources = self.acquire(&stores, &mut summary)?;
        self.normalize(&mut sources, &stores, &mut summary);
        let (state, added) = self.merge(&mut sources, &mut summary);
        summary.canonical_rows = state.len();
        let rows = state.into_rows();

        summary.outputs = self.export(&layout, &rows, &mut summary)?;
        self.rotate(&mut sources, &layout, &mut summary);

        summary.sources = sources.iter().zip(&added).map(|(s, n)| SourceReport::new(s, *n)).collect();
        if let Err(e) = summary.write_json(&layout.output.join(SUMMARY_FILE_NAME)) {
            tracing::warn!("could not write run summary: {:#}", e);
        }
        tracing::info!(
            "Run finished: {} canonical rows from {} tables ({} failures).",
            summary.canonical_rows,
            sources.len(),
            summary.total_failures()
        );
        Ok((summary, rows))
    }

    // -------- Stage 1: acquire --------

    fn acquire(&self, stores: &Stores, summary: &mut RunSummary) -> Result<Vec<SourceFile>> {
        if self.opts.offline {
            tracing::info!("Offline run: using cached archives and tables only.");
            return Ok(self.cached_sources(stores, summary));
        }

        let http;
        let fetcher: &dyn Fetcher = match &self.fetcher {
            Some(f) => f.as_ref(),
            None => {
                http = HttpFetcher::new(self.opts.http_timeout)?;
                &http
            }
        };

        let page = match Url::parse(&self.opts.index_url) {
            Ok(u) => u,
            Err(e) => {
                summary.fail(FailureKind::Acquisition, format!("index URL {}: {e}", self.opts.index_url));
                tracing::warn!("Falling back to cached archives and tables.");
                return Ok(self.cached_sources(stores, summary));
            }
        };
        let html = match fetcher.fetch(&self.opts.index_url) {
            Ok(body) => String::from_utf8_lossy(&body).into_owned(),
            Err(e) => {
                summary.fail(FailureKind::Acquisition, format!("fetch index {}: {:#}", self.opts.index_url, e));
                tracing::warn!("Falling back to cached archives and tables.");
                return Ok(self.cached_sources(stores, summary));
            }
        };

        let links = discover_zip_links(&html, &page);
        summary.links_found = links.len();
        tracing::info!("Found {} zip files to download.", links.len());

        let pb = ProgressScope::count(self.opts.progress, "Acquire", links.len() as u64);
        let mut sources = Vec::new();
        let mut names = AHashSet::new();
        for url in &links {
            pb.inc(1);
            let archive = match fetch_archive(fetcher, &stores.archives, url) {
                Ok(a) => a,
                Err(e) => {
                    summary.fail(FailureKind::Acquisition, format!("download {url}: {e:#}"));
                    continue;
                }
            };
            if archive.was_cached() {
                summary.archives_cached += 1;
            } else {
                summary.archives_fetched += 1;
            }

            self.unpack(archive.path(), stores, summary, &mut sources, &mut names);
        }
        pb.finish("acquired");
        Ok(sources)
    }

    /// Everything earlier runs acquired, without touching the network: tables re-extracted from
    /// the cached archives (a table rotated out of `latest/` lives on only there), then whatever
    /// sits in the table cache and in `latest/`.
    fn cached_sources(&self, stores: &Stores, summary: &mut RunSummary) -> Vec<SourceFile> {
        let ext = &self.opts.table_extension;
        let mut sources = Vec::new();
        let mut names = AHashSet::new();

        let archives = discover_tables(stores.archives.dir(), ".zip");
        summary.archives_cached += archives.len();
        for archive in &archives {
            self.unpack(archive, stores, summary, &mut sources, &mut names);
        }

        for path in discover_tables(stores.tables.dir(), ext).into_iter().chain(discover_tables(stores.latest.dir(), ext)) {
            if file_name_str(&path).map_or(true, |n| names.contains(n)) {
                continue;
            }
            summary.tables_cached += 1;
            push_source(&mut sources, &mut names, path);
        }
        tracing::info!("Found {} cached tables in {} cached archives.", sources.len(), archives.len());
        sources
    }

    fn unpack(
        &self,
        archive: &Path,
        stores: &Stores,
        summary: &mut RunSummary,
        sources: &mut Vec<SourceFile>,
        names: &mut AHashSet<String>,
    ) {
        match extract_tables(archive, &stores.tables, &stores.latest, &self.opts.table_extension) {
            Ok(tables) => {
                for t in tables {
                    if t.cached {
                        summary.tables_cached += 1;
                    } else {
                        summary.tables_extracted += 1;
                    }
                    push_source(sources, names, t.path);
                }
            }
            Err(e) => summary.fail(FailureKind::Acquisition, format!("extract {}: {e:#}", archive.display())),
        }
    }

    // -------- Stage 2: normalize --------

    fn normalize(&self, sources: &mut [SourceFile], stores: &Stores, summary: &mut RunSummary) {
        let default_converter;
        let converter: &dyn FormatConverter = match &self.converter {
            Some(c) => c.as_ref(),
            None => {
                default_converter = CommandConverter::new(
                    self.opts.converter_program.clone(),
                    self.opts.converter_args.clone(),
                    self.opts.converter_timeout,
                );
                &default_converter
            }
        };

        let pb = ProgressScope::count(self.opts.progress, "Normalize", sources.len() as u64);
        for src in sources.iter_mut() {
            pb.inc(1);
            let key = normalized_name(&src.name);
            if !stores.normalized.exists(&key) {
                tracing::info!("Converting {} to {}", src.name, key);
            }
            let input = src.path.clone();
            match ensure(&stores.normalized, &key, |tmp| Ok(converter.convert(&input, tmp)?)) {
                Ok(done) => {
                    if done.was_cached() {
                        summary.conversions_cached += 1;
                    } else {
                        summary.conversions_run += 1;
                    }
                    src.normalized = Some(done.into_path());
                    src.advance(SourceStatus::Normalized);
                }
                Err(e) => summary.fail(FailureKind::Conversion, format!("Failed to convert {} to {}: {e:#}", src.name, key)),
            }
        }
        pb.finish("normalized");
    }

    // -------- Stage 3: dedupe --------

    fn merge(&self, sources: &mut [SourceFile], summary: &mut RunSummary) -> (DedupeState, Vec<u64>) {
        let default_source;
        let table_source: &dyn TableSource = match &self.table_source {
            Some(t) => t.as_ref(),
            None => {
                default_source = CsvTableSource { policy: self.opts.column_policy, read_buffer_bytes: self.opts.read_buffer_bytes };
                &default_source
            }
        };

        let mut state = DedupeState::new();
        let mut added = vec![0u64; sources.len()];
        let pb = ProgressScope::count(self.opts.progress, "Merge", sources.len() as u64);
        for (i, src) in sources.iter_mut().enumerate() {
            pb.inc(1);
            let Some(path) = src.normalized.clone() else { continue };
            tracing::info!("Reading {}", path.display());

            let (next, outcome) = merge_source(state, table_source, &path);
            state = next;
            summary.rows_read += outcome.read;
            added[i] = outcome.added;

            match outcome.error {
                None => {
                    src.advance(SourceStatus::Merged);
                    tracing::info!("Added {} unique entries from {}", outcome.added, src.name);
                }
                Some(e) => {
                    let kind = e.kind();
                    summary.fail(kind, format!("Error reading {}: {e}", src.name));
                    if outcome.added > 0 {
                        tracing::warn!("Kept {} unique entries read from {} before the error", outcome.added, src.name);
                    }
                }
            }
        }
        pb.finish("merged");
        (state, added)
    }

    // -------- Stage 4: export --------

    /// The csv is the canonical artifact and failing to write it aborts the run. The workbook
    /// is a convenience copy; its failure is counted and the run goes on to rotation.
    fn export(&self, layout: &Layout, rows: &[Record], summary: &mut RunSummary) -> Result<Vec<PathBuf>> {
        let mut csv = CsvExporter::new(layout.output.join(CSV_FILE_NAME));
        csv.write_buffer_bytes = self.opts.write_buffer_bytes;
        let mut outputs = vec![csv.export(rows)?];

        if self.opts.xlsx_export {
            let xlsx = XlsxExporter::new(layout.output.join(XLSX_FILE_NAME));
            match xlsx.export(rows) {
                Ok(path) => outputs.push(path),
                Err(e) => summary.fail(FailureKind::Export, format!("Failed to write {}: {e:#}", xlsx.path.display())),
            }
        }
        Ok(outputs)
    }

    // -------- Stage 5: rotate latest --------

    fn rotate(&self, sources: &mut [SourceFile], layout: &Layout, summary: &mut RunSummary) {
        let eligible: Vec<&SourceFile> = sources.iter().filter(|s| s.is_normalized()).collect();
        let undated: Vec<&str> = eligible.iter().filter(|s| s.date.is_none()).map(|s| s.name.as_str()).collect();
        if !undated.is_empty() {
            tracing::info!("No date token in {}; not considered for latest.", undated.join(", "));
        }

        let candidates = select_latest(eligible.iter().copied());
        let winner = pick_promotion(&candidates).map(|s| s.name.clone());
        if candidates.len() > 1 {
            if let Some(w) = &winner {
                tracing::info!("{} tables share the newest date, promoting {}", candidates.len(), w);
            }
        }

        for src in sources.iter_mut() {
            if winner.as_deref() != Some(src.name.as_str()) {
                src.advance(SourceStatus::Retained);
                continue;
            }
            match rotate_latest(&layout.latest, &src.path) {
                Ok(rotation) => {
                    src.path = rotation.path().to_path_buf();
                    src.advance(SourceStatus::PromotedToLatest);
                    summary.latest = Some(src.name.clone());
                }
                Err(e) => {
                    tracing::error!("could not move {} into {}: {:#}", src.name, layout.latest.display(), e);
                    src.advance(SourceStatus::Retained);
                }
            }
        }
        if winner.is_none() {
            tracing::warn!("No dated table available; {} left unchanged.", layout.latest.display());
        }
    }
}

fn push_source(sources: &mut Vec<SourceFile>, names: &mut AHashSet<String>, path: PathBuf) {
    match SourceFile::acquired(&path) {
        Ok(src) => {
            if names.insert(src.name.clone()) {
                sources.push(src);
            } else {
                tracing::warn!("{} appears more than once; keeping the first copy", src.name);
            }
        }
        Err(e) => tracing::warn!("skipping {}: {:#}", path.display(), e),
    }
}

/// Normalized artifact key for a table: same stem, `.csv` extension.
pub fn normalized_name(table_name: &str) -> String {
    let stem = Path::new(table_name).file_stem().and_then(|s| s.to_str()).unwrap_or(table_name);
    format!("{stem}.csv")
}
