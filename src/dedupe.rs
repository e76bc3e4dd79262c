use crate::error::StageError;
use crate::record::Record;
use crate::table::TableSource;
use ahash::AHashSet;
use std::path::Path;

/// Running state of the canonical merge: every full-row key seen so far and the distinct rows
/// in first-seen order. One value lives for one pipeline run; it only ever grows.
#[derive(Clone, Debug, Default)]
pub struct DedupeState {
    seen: AHashSet<Record>,
    rows: Vec<Record>,
}

impl DedupeState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fold one record in. Returns `true` when it had not been seen before.
    pub fn insert(&mut self, record: Record) -> bool {
        if self.contains(&record) {
            return false;
        }
        self.seen.insert(record.clone());
        self.rows.push(record);
        true
    }

    /// Fold a batch in and return how many of its records were new.
    pub fn accumulate<I>(&mut self, records: I) -> u64
    where
        I: IntoIterator<Item = Record>,
    {
        let mut added = 0;
        for record in records {
            if self.insert(record) {
                added += 1;
            }
        }
        added
    }

    pub fn contains(&self, record: &Record) -> bool {
        self.seen.contains(record)
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Canonical rows in first-seen order.
    pub fn rows(&self) -> &[Record] {
        &self.rows
    }

    pub fn into_rows(self) -> Vec<Record> {
        self.rows
    }
}

/// What one source contributed to the merge.
#[derive(Debug, Default)]
pub struct MergeOutcome {
    pub read: u64,
    pub added: u64,
    /// Set when reading stopped early. Rows read before the failure are still merged.
    pub error: Option<StageError>,
}

/// One merge step: stream `path` through `source` into `state` and hand the state back.
pub fn merge_source<T>(mut state: DedupeState, source: &T, path: &Path) -> (DedupeState, MergeOutcome)
where
    T: TableSource + ?Sized,
{
    let mut outcome = MergeOutcome::default();
    let res = source.for_each_record(path, &mut |record| {
        outcome.read += 1;
        if state.insert(record) {
            outcome.added += 1;
        }
    });
    outcome.error = res.err();
    (state, outcome)
}
