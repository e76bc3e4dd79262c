#![allow(dead_code)]

use anyhow::{anyhow, Result};
use bnfmap::{FormatConverter, Fetcher, Record, StageError, COLUMNS};
use std::collections::HashMap;
use std::fs;
use std::io::{BufRead, BufReader, Cursor, Read, Write};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use zip::write::SimpleFileOptions;
use zip::CompressionMethod;

/// Fresh temp directory that outlives the test (inspectable on failure).
pub fn temp_base() -> PathBuf {
    tempfile::tempdir().unwrap().into_path()
}

/// An 11-field record starting with `a`, `b`, padded with a fixed tail.
pub fn rec(a: &str, b: &str) -> Record {
    Record::from_fields([a, b, "0101010A0", "Acetic acid", "123456789", "desc", "5%", "ml", "pack desc", "1", ""])
}

/// Render rows as the converter would: header plus comma-separated rows.
pub fn csv_text(header: &[&str], rows: &[Record]) -> String {
    let mut w = csv::Writer::from_writer(Vec::new());
    w.write_record(header).unwrap();
    for r in rows {
        w.write_record(r.fields()).unwrap();
    }
    String::from_utf8(w.into_inner().unwrap()).unwrap()
}

pub fn canonical_csv(rows: &[Record]) -> String {
    csv_text(&COLUMNS, rows)
}

pub fn write_file(path: &Path, content: &str) {
    fs::create_dir_all(path.parent().unwrap()).unwrap();
    fs::write(path, content).unwrap();
}

pub fn read_lines(path: &Path) -> Vec<String> {
    let f = fs::File::open(path).unwrap();
    BufReader::new(f).lines().map(|l| l.unwrap()).filter(|s| !s.is_empty()).collect()
}

/// Read a csv export back as records (header skipped).
pub fn read_export(path: &Path) -> Vec<Record> {
    let mut rdr = csv::Reader::from_path(path).unwrap();
    rdr.records().map(|r| Record::from_fields(r.unwrap().iter())).collect()
}

pub fn file_names(dir: &Path) -> Vec<String> {
    let mut names: Vec<String> = fs::read_dir(dir)
        .unwrap()
        .filter_map(|e| e.ok())
        .filter(|e| e.file_type().map(|t| t.is_file()).unwrap_or(false))
        .map(|e| e.file_name().to_string_lossy().into_owned())
        .collect();
    names.sort();
    names
}

/// Build an in-memory zip with the given `(entry name, content)` pairs.
pub fn zip_bytes(entries: &[(&str, &str)]) -> Vec<u8> {
    let mut buf = Vec::new();
    {
        let mut zip = zip::ZipWriter::new(Cursor::new(&mut buf));
        let options = SimpleFileOptions::default().compression_method(CompressionMethod::Stored);
        for (name, content) in entries {
            zip.start_file(*name, options).unwrap();
            zip.write_all(content.as_bytes()).unwrap();
        }
        zip.finish().unwrap();
    }
    buf
}

/// Text of one part of a zip container (e.g. `xl/workbook.xml` inside an `.xlsx`).
pub fn zip_entry_text(path: &Path, entry: &str) -> String {
    let mut zip = zip::ZipArchive::new(fs::File::open(path).unwrap()).unwrap();
    let mut text = String::new();
    zip.by_name(entry).unwrap().read_to_string(&mut text).unwrap();
    text
}

/// Test "converter": the tables in tests are already csv text, so conversion is a copy.
/// Counts invocations so resumability can be checked.
#[derive(Clone, Default)]
pub struct CopyConverter {
    pub calls: Arc<AtomicUsize>,
    /// Inputs whose name contains one of these fragments fail with a non-zero status.
    pub fail_on: Vec<String>,
}

impl CopyConverter {
    pub fn failing_on(fragment: &str) -> Self {
        Self { fail_on: vec![fragment.to_string()], ..Default::default() }
    }
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl FormatConverter for CopyConverter {
    fn convert(&self, input: &Path, output: &Path) -> Result<(), StageError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let name = input.file_name().unwrap().to_string_lossy().into_owned();
        if self.fail_on.iter().any(|f| name.contains(f.as_str())) {
            return Err(StageError::Convert { input: input.to_path_buf(), status: "exit status: 1".into(), stderr: "boom".into() });
        }
        fs::copy(input, output)?;
        Ok(())
    }
}

/// Serves canned bodies by URL; anything else is a 404-style error.
#[derive(Clone, Default)]
pub struct MemoryFetcher {
    pub bodies: Arc<HashMap<String, Vec<u8>>>,
    pub calls: Arc<AtomicUsize>,
}

impl MemoryFetcher {
    pub fn new(bodies: Vec<(String, Vec<u8>)>) -> Self {
        Self { bodies: Arc::new(bodies.into_iter().collect()), calls: Arc::default() }
    }
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl Fetcher for MemoryFetcher {
    fn fetch(&self, url: &str) -> Result<Vec<u8>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.bodies.get(url).cloned().ok_or_else(|| anyhow!("404 for {url}"))
    }
}

pub const INDEX_URL: &str = "https://example.test/mapping";
pub const ORIGIN: &str = "https://example.test";

/// Index page linking to the given site-relative archive paths.
pub fn index_html(links: &[&str]) -> Vec<u8> {
    let mut html = String::from("<html><body><ul>\n");
    for l in links {
        html.push_str(&format!("<li><a class=\"download\" href=\"{l}\">snapshot</a></li>\n"));
    }
    html.push_str("<li><a href=\"/guidance.pdf\">guidance</a></li>\n</ul></body></html>");
    html.into_bytes()
}

/// Standard corpus for pipeline tests:
/// - `snap_20230101_a.zip` → `map_20230101_a.xlsx` with the duplicate pair (X,Y),(X,Y)
/// - `snap_20230101_b.zip` → `map_20230101_b.xlsx` with (X,Y) again
/// - `snap_20230201.zip`   → `map_20230201.xlsx` with (A,B)
pub fn standard_fetcher() -> MemoryFetcher {
    let xy = rec("X", "Y");
    let ab = rec("A", "B");
    let a = zip_bytes(&[("tables/map_20230101_a.xlsx", &canonical_csv(&[xy.clone(), xy.clone()]))]);
    let b = zip_bytes(&[("map_20230101_b.xlsx", &canonical_csv(&[xy]))]);
    let c = zip_bytes(&[("map_20230201.xlsx", &canonical_csv(&[ab])), ("readme.txt", "ignored")]);
    MemoryFetcher::new(vec![
        (INDEX_URL.to_string(), index_html(&["/media/snap_20230101_a.zip", "/media/snap_20230101_b.zip", "/media/snap_20230201.zip"])),
        (format!("{ORIGIN}/media/snap_20230101_a.zip"), a),
        (format!("{ORIGIN}/media/snap_20230101_b.zip"), b),
        (format!("{ORIGIN}/media/snap_20230201.zip"), c),
    ])
}
