use regex::Regex;
use std::fmt;
use std::str::FromStr;
use std::sync::OnceLock;
use time::{Date, Month};

/// Publication date embedded in a snapshot filename as an 8-digit `YYYYMMDD` token,
/// e.g. `BNF Snomed Mapping data 20230601.xlsx`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct SnapshotDate(Date);

fn token_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\d{8}").unwrap())
}

impl SnapshotDate {
    pub fn from_ymd(year: i32, month: u8, day: u8) -> Option<Self> {
        let month = Month::try_from(month).ok()?;
        Date::from_calendar_date(year, month, day).ok().map(Self)
    }

    /// First 8-digit run in `name` that is a real calendar date. Runs that are not
    /// (`99999999`, `20231340`) are passed over rather than treated as a date.
    pub fn from_filename(name: &str) -> Option<Self> {
        token_re().find_iter(name).find_map(|m| m.as_str().parse().ok())
    }
}

impl fmt::Display for SnapshotDate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:04}{:02}{:02}", self.0.year(), u8::from(self.0.month()), self.0.day())
    }
}

impl FromStr for SnapshotDate {
    type Err = String;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.len() != 8 || !s.bytes().all(|b| b.is_ascii_digit()) {
            return Err("expected YYYYMMDD".into());
        }
        let year: i32 = s[0..4].parse().map_err(|_| "invalid year")?;
        let month: u8 = s[4..6].parse().map_err(|_| "invalid month")?;
        let day: u8 = s[6..8].parse().map_err(|_| "invalid day")?;
        Self::from_ymd(year, month, day).ok_or_else(|| format!("{s} is not a calendar date"))
    }
}
