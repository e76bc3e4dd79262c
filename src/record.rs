//! The fixed 11-column mapping row and the policy for tables that are narrower than that.

use std::fmt;

pub const COLUMN_COUNT: usize = 11;

/// Canonical headers, in column order (A..K of the published workbooks).
pub const COLUMNS: [&str; COLUMN_COUNT] = [
    "Presentation / Pack Level",
    "VMP / VMPP/ AMP / AMPP",
    "BNF Code",
    "BNF Name",
    "SNOMED Code",
    "DM+D: Product Description",
    "Strength",
    "Unit Of Measure",
    "DM+D: Product and Pack Description",
    "Pack",
    "Sub-pack",
];

/// Index of the code identifier column that spreadsheet exports keep as text.
pub const CODE_COLUMN: usize = 4;

/// One mapping row. Equality and hashing cover all 11 fields, which makes the record itself
/// the dedup key. Missing values are stored as `""`.
#[derive(Clone, Debug, Default, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Record([String; COLUMN_COUNT]);

impl Record {
    pub fn new(fields: [String; COLUMN_COUNT]) -> Self {
        Self(fields)
    }

    /// Project a raw row onto the schema: the first 11 values are kept, extra values are
    /// dropped and absent trailing values become `""`.
    pub fn from_fields<I, S>(fields: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut it = fields.into_iter();
        Self(std::array::from_fn(|_| it.next().map(Into::into).unwrap_or_default()))
    }

    /// Same projection for sources that can report a missing cell (`None` becomes `""`).
    pub fn from_optional<I, S>(fields: I) -> Self
    where
        I: IntoIterator<Item = Option<S>>,
        S: Into<String>,
    {
        Self::from_fields(fields.into_iter().map(|v| v.map(Into::into).unwrap_or_default()))
    }

    pub fn fields(&self) -> &[String; COLUMN_COUNT] {
        &self.0
    }

    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.0.iter().map(String::as_str)
    }
}

impl fmt::Display for Record {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({})", self.0.join(", "))
    }
}

/// What to do with a table whose header is narrower than [`COLUMN_COUNT`].
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum ColumnPolicy {
    /// Skip the whole file.
    #[default]
    Reject,
    /// Read it anyway and fill the missing columns with `""`.
    Pad,
}
