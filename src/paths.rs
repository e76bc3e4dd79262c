use anyhow::{Context, Result};
use std::fs;
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

/// On-disk tree of one mapping dataset. Every stage caches into its own directory, and the
/// presence of a file there is the only record that the stage completed.
#[derive(Clone, Debug)]
pub struct Layout {
    pub base: PathBuf,
    pub archives: PathBuf,   // zip_files/<archive>.zip
    pub tables: PathBuf,     // xlsx_files/<table>.xlsx
    pub normalized: PathBuf, // csv_files/<table>.csv
    pub latest: PathBuf,     // latest/<table>.xlsx (single occupant)
    pub output: PathBuf,     // combined csv/xlsx + run summary
}

impl Layout {
    pub fn new(base: impl AsRef<Path>) -> Self {
        let base = base.as_ref().to_path_buf();
        Self {
            archives: base.join("zip_files"),
            tables: base.join("xlsx_files"),
            normalized: base.join("csv_files"),
            latest: base.join("latest"),
            output: base.join("output"),
            base,
        }
    }

    pub fn create_all(&self) -> Result<()> {
        for dir in [&self.base, &self.archives, &self.tables, &self.normalized, &self.latest, &self.output] {
            fs::create_dir_all(dir).with_context(|| format!("create {}", dir.display()))?;
        }
        Ok(())
    }
}

/// Files directly inside `dir` whose name ends with `extension`, sorted by name.
/// A missing directory yields nothing.
pub fn discover_tables(dir: &Path, extension: &str) -> Vec<PathBuf> {
    if !dir.exists() {
        return Vec::new();
    }
    let mut found: Vec<PathBuf> = WalkDir::new(dir)
        .min_depth(1)
        .max_depth(1)
        .into_iter()
        .filter_map(|e| e.ok())
        .filter(|e| e.file_type().is_file())
        .filter(|e| e.file_name().to_str().is_some_and(|n| n.ends_with(extension)))
        .map(|e| e.path().to_path_buf())
        .collect();
    found.sort();
    found
}
