//! Name-addressed artifact stores and the `ensure` discipline that makes every stage
//! idempotent: work runs only when its output is missing, and output only becomes visible
//! once the producer has finished.

use crate::util::{move_file, remove_with_backoff};
use anyhow::{bail, Context, Result};
use std::fs;
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

const STAGING_DIR: &str = ".inprogress";

/// Capability interface of a stage cache. Keys are plain file names.
pub trait ArtifactStore {
    fn exists(&self, key: &str) -> bool;

    /// Where the committed artifact for `key` lives (whether or not it exists yet).
    fn path(&self, key: &str) -> PathBuf;

    fn put(&self, key: &str, bytes: &[u8]) -> Result<PathBuf>;

    fn remove(&self, key: &str) -> Result<()>;

    /// Committed keys, sorted.
    fn keys(&self) -> Result<Vec<String>>;

    /// Scratch location a producer writes `key` to before it is committed.
    fn staging_path(&self, key: &str) -> Result<PathBuf>;

    /// Promote a staged artifact so that `exists(key)` becomes true.
    fn commit(&self, key: &str) -> Result<PathBuf>;

    /// Drop a staged artifact left by a failed producer.
    fn discard(&self, key: &str);
}

/// Directory-backed store: `<dir>/<key>` for committed artifacts and
/// `<dir>/.inprogress/<key>` while a producer is writing.
#[derive(Clone, Debug)]
pub struct DirStore {
    dir: PathBuf,
}

impl DirStore {
    pub fn open(dir: impl AsRef<Path>) -> Result<Self> {
        let dir = dir.as_ref().to_path_buf();
        fs::create_dir_all(&dir).with_context(|| format!("create {}", dir.display()))?;
        Ok(Self { dir })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }
}

impl ArtifactStore for DirStore {
    fn exists(&self, key: &str) -> bool {
        self.path(key).is_file()
    }

    fn path(&self, key: &str) -> PathBuf {
        self.dir.join(key)
    }

    fn put(&self, key: &str, bytes: &[u8]) -> Result<PathBuf> {
        let staged = self.staging_path(key)?;
        fs::write(&staged, bytes).with_context(|| format!("write {}", staged.display()))?;
        self.commit(key)
    }

    fn remove(&self, key: &str) -> Result<()> {
        remove_with_backoff(&self.path(key))
    }

    fn keys(&self) -> Result<Vec<String>> {
        let mut keys = Vec::new();
        for entry in WalkDir::new(&self.dir).min_depth(1).max_depth(1) {
            let entry = entry.with_context(|| format!("list {}", self.dir.display()))?;
            if !entry.file_type().is_file() {
                continue;
            }
            if let Some(name) = entry.file_name().to_str() {
                keys.push(name.to_string());
            }
        }
        keys.sort();
        Ok(keys)
    }

    fn staging_path(&self, key: &str) -> Result<PathBuf> {
        let staging = self.dir.join(STAGING_DIR);
        fs::create_dir_all(&staging).with_context(|| format!("create {}", staging.display()))?;
        let path = staging.join(key);
        // A leftover from an interrupted run must not be mistaken for fresh output.
        remove_with_backoff(&path)?;
        Ok(path)
    }

    fn commit(&self, key: &str) -> Result<PathBuf> {
        let staged = self.dir.join(STAGING_DIR).join(key);
        if !staged.is_file() {
            bail!("nothing staged for {key} in {}", self.dir.display());
        }
        let dest = self.path(key);
        move_file(&staged, &dest)?;
        Ok(dest)
    }

    fn discard(&self, key: &str) {
        let staged = self.dir.join(STAGING_DIR).join(key);
        if let Err(e) = remove_with_backoff(&staged) {
            tracing::warn!("could not discard staged {}: {:#}", staged.display(), e);
        }
    }
}

/// Result of [`ensure`]: where the artifact is and whether this call produced it.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Ensured {
    Cached(PathBuf),
    Produced(PathBuf),
}

impl Ensured {
    pub fn path(&self) -> &Path {
        match self {
            Ensured::Cached(p) | Ensured::Produced(p) => p,
        }
    }

    pub fn into_path(self) -> PathBuf {
        match self {
            Ensured::Cached(p) | Ensured::Produced(p) => p,
        }
    }

    pub fn was_cached(&self) -> bool {
        matches!(self, Ensured::Cached(_))
    }
}

/// Make sure `key` exists in `store`, running `produce` against the staging path only when it
/// does not. A producer that fails, or returns without writing its output, leaves nothing
/// behind, so the next run sees the artifact as missing and tries again.
pub fn ensure<S, F>(store: &S, key: &str, produce: F) -> Result<Ensured>
where
    S: ArtifactStore + ?Sized,
    F: FnOnce(&Path) -> Result<()>,
{
    if store.exists(key) {
        tracing::info!("{key} already exists, skipping.");
        return Ok(Ensured::Cached(store.path(key)));
    }

    let staged = store.staging_path(key)?;
    if let Err(e) = produce(&staged) {
        store.discard(key);
        return Err(e.context(format!("producing {key}")));
    }
    if !staged.is_file() {
        bail!(crate::error::StageError::MissingOutput(store.path(key)));
    }
    Ok(Ensured::Produced(store.commit(key)?))
}
