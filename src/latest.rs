//! Latest-snapshot selection and rotation of the single-slot `latest/` directory.

use crate::date::SnapshotDate;
use crate::util::{file_name_str, move_file, remove_with_backoff};
use anyhow::{anyhow, Context, Result};
use serde::Serialize;
use std::fs;
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

/// Where a source table is in its journey through one run. Transitions only move forward;
/// `Retained` and `PromotedToLatest` are terminal.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SourceStatus {
    Discovered,
    Acquired,
    Normalized,
    Merged,
    Retained,
    PromotedToLatest,
}

impl SourceStatus {
    pub fn is_terminal(self) -> bool {
        matches!(self, SourceStatus::Retained | SourceStatus::PromotedToLatest)
    }

    pub fn can_advance_to(self, next: SourceStatus) -> bool {
        use SourceStatus::*;
        match (self, next) {
            (Discovered, Acquired) | (Acquired, Normalized) | (Normalized, Merged) => true,
            // A file whose rows could only be partly read is normalized but never merged;
            // it still ends in one of the terminal states.
            (Normalized | Merged, Retained | PromotedToLatest) => true,
            _ => false,
        }
    }
}

/// One extracted snapshot table.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SourceFile {
    pub name: String,
    pub path: PathBuf,
    pub date: Option<SnapshotDate>,
    pub status: SourceStatus,
    /// Normalized row-text artifact, once the table has one.
    pub normalized: Option<PathBuf>,
}

impl SourceFile {
    /// A table known by path but not yet confirmed on disk.
    pub fn new(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        let name = file_name_str(&path)
            .ok_or_else(|| anyhow!("{} has no usable file name", path.display()))?
            .to_string();
        Ok(Self {
            date: SnapshotDate::from_filename(&name),
            name,
            path,
            status: SourceStatus::Discovered,
            normalized: None,
        })
    }

    /// Shorthand for a table that is already on disk.
    pub fn acquired(path: impl Into<PathBuf>) -> Result<Self> {
        let mut src = Self::new(path)?;
        src.advance(SourceStatus::Acquired);
        Ok(src)
    }

    /// Move to `next`. Returns `false` (and leaves the status alone) for a backwards or
    /// skipping transition.
    pub fn advance(&mut self, next: SourceStatus) -> bool {
        if !self.status.can_advance_to(next) {
            tracing::debug!("{}: ignoring transition {:?} -> {:?}", self.name, self.status, next);
            return false;
        }
        self.status = next;
        true
    }

    /// Has a normalized artifact, so it may take part in the merge and in latest selection.
    pub fn is_normalized(&self) -> bool {
        self.status >= SourceStatus::Normalized
    }
}

/// All sources carrying the greatest embedded date. Undated sources never qualify, so the
/// result is empty when nothing is dated.
pub fn select_latest<'a, I>(sources: I) -> Vec<&'a SourceFile>
where
    I: IntoIterator<Item = &'a SourceFile>,
{
    let dated: Vec<&SourceFile> = sources.into_iter().filter(|s| s.date.is_some()).collect();
    let Some(max) = dated.iter().filter_map(|s| s.date).max() else {
        return Vec::new();
    };
    dated.into_iter().filter(|s| s.date == Some(max)).collect()
}

/// Tie-break among same-dated candidates: the lexicographically smallest file name wins.
pub fn pick_promotion<'a>(candidates: &[&'a SourceFile]) -> Option<&'a SourceFile> {
    candidates.iter().copied().min_by(|a, b| a.name.cmp(&b.name))
}

/// Outcome of [`rotate_latest`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Rotation {
    /// The winner was moved into the slot.
    Promoted { path: PathBuf, removed: Vec<String> },
    /// The slot already held a file of that name; nothing was moved.
    AlreadyCurrent { path: PathBuf, removed: Vec<String> },
}

impl Rotation {
    pub fn path(&self) -> &Path {
        match self {
            Rotation::Promoted { path, .. } | Rotation::AlreadyCurrent { path, .. } => path,
        }
    }

    pub fn removed(&self) -> &[String] {
        match self {
            Rotation::Promoted { removed, .. } | Rotation::AlreadyCurrent { removed, .. } => removed,
        }
    }
}

/// Make `slot` hold exactly `winner`: first every other file in the slot is removed, then
/// the winner is moved in (not copied).
pub fn rotate_latest(slot: &Path, winner: &Path) -> Result<Rotation> {
    fs::create_dir_all(slot).with_context(|| format!("create {}", slot.display()))?;
    let name = file_name_str(winner).ok_or_else(|| anyhow!("{} has no usable file name", winner.display()))?;
    let dest = slot.join(name);

    let mut removed = Vec::new();
    for entry in WalkDir::new(slot).min_depth(1).max_depth(1) {
        let entry = entry.with_context(|| format!("list {}", slot.display()))?;
        if !entry.file_type().is_file() || entry.file_name().to_str() == Some(name) {
            continue;
        }
        remove_with_backoff(entry.path())?;
        let old = entry.file_name().to_string_lossy().into_owned();
        tracing::info!("Removed outdated file {}", old);
        removed.push(old);
    }

    if dest.exists() {
        tracing::info!("{} already exists.", name);
        return Ok(Rotation::AlreadyCurrent { path: dest, removed });
    }

    move_file(winner, &dest)?;
    tracing::info!("Moved {} to {}", name, slot.display());
    Ok(Rotation::Promoted { path: dest, removed })
}
