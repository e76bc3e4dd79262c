#[path = "common/mod.rs"]
mod common;

use bnfmap::{pick_promotion, rotate_latest, select_latest, Rotation, SnapshotDate, SourceFile, SourceStatus};
use common::*;
use std::fs;

fn normalized(name: &str) -> SourceFile {
    let mut s = SourceFile::acquired(format!("/pool/{name}")).unwrap();
    assert!(s.advance(SourceStatus::Normalized));
    s
}

#[test]
fn date_token_is_taken_from_the_file_name() {
    assert_eq!(
        SnapshotDate::from_filename("BNF Snomed Mapping data 20230601.xlsx"),
        SnapshotDate::from_ymd(2023, 6, 1)
    );
    assert_eq!(SnapshotDate::from_filename("mapping.xlsx"), None);
    assert_eq!(SnapshotDate::from_filename("mapping_2023_06_01.xlsx"), None);
    // not a calendar date, so the next token is used
    assert_eq!(SnapshotDate::from_filename("v99999999_20221201.xlsx"), SnapshotDate::from_ymd(2022, 12, 1));
    assert_eq!(SnapshotDate::from_ymd(2023, 2, 30), None);
    assert_eq!("20230101".parse::<SnapshotDate>().unwrap().to_string(), "20230101");
    assert!("2023011".parse::<SnapshotDate>().is_err());
}

/// Given 20230101, 20230601 and 20221201 only the 20230601 source is latest.
#[test]
fn selects_only_the_maximal_date() {
    let sources = vec![normalized("map_20230101.xlsx"), normalized("map_20230601.xlsx"), normalized("map_20221201.xlsx")];
    let latest = select_latest(&sources);
    assert_eq!(latest.len(), 1);
    assert_eq!(latest[0].name, "map_20230601.xlsx");
}

/// An undated source never becomes latest, not even when it is the only source.
#[test]
fn undated_sources_are_never_candidates() {
    let only = vec![normalized("map_current.xlsx")];
    assert!(select_latest(&only).is_empty());
    assert!(pick_promotion(&select_latest(&only)).is_none());

    let mixed = vec![normalized("map_current.xlsx"), normalized("map_20200101.xlsx")];
    let latest = select_latest(&mixed);
    assert_eq!(latest.len(), 1);
    assert_eq!(latest[0].name, "map_20200101.xlsx");
}

/// Same-dated candidates are all returned; the smallest file name is the one promoted,
/// whatever order the caller supplied.
#[test]
fn tie_break_promotes_smallest_name() {
    let sources = vec![normalized("map_20230101_b.xlsx"), normalized("map_20230101_a.xlsx"), normalized("map_20221231.xlsx")];
    let candidates = select_latest(&sources);
    assert_eq!(candidates.len(), 2);
    assert_eq!(pick_promotion(&candidates).unwrap().name, "map_20230101_a.xlsx");
}

/// A slot holding an older snapshot ends up holding only the new one, and the new one is
/// moved out of the pool rather than copied.
#[test]
fn rotation_replaces_stale_file() {
    let base = temp_base();
    let slot = base.join("latest");
    let pool = base.join("pool");
    write_file(&slot.join("map_20221201.xlsx"), "old");
    write_file(&pool.join("map_20230601.xlsx"), "new");

    let rotation = rotate_latest(&slot, &pool.join("map_20230601.xlsx")).unwrap();
    assert!(matches!(rotation, Rotation::Promoted { .. }));
    assert_eq!(rotation.removed(), &["map_20221201.xlsx".to_string()]);
    assert_eq!(file_names(&slot), vec!["map_20230601.xlsx"]);
    assert!(!pool.join("map_20230601.xlsx").exists());
    assert_eq!(fs::read_to_string(slot.join("map_20230601.xlsx")).unwrap(), "new");
}

/// If the slot already holds a file of the winner's name, nothing is moved, but anything
/// else in the slot is still cleared.
#[test]
fn rotation_is_noop_when_already_current() {
    let base = temp_base();
    let slot = base.join("latest");
    write_file(&slot.join("map_20230601.xlsx"), "current");
    write_file(&slot.join("stray.xlsx"), "stray");
    write_file(&base.join("pool").join("map_20230601.xlsx"), "pool copy");

    let rotation = rotate_latest(&slot, &base.join("pool").join("map_20230601.xlsx")).unwrap();
    assert!(matches!(rotation, Rotation::AlreadyCurrent { .. }));
    assert_eq!(file_names(&slot), vec!["map_20230601.xlsx"]);
    assert_eq!(fs::read_to_string(slot.join("map_20230601.xlsx")).unwrap(), "current");

    // rotating the file that already sits in the slot is also a no-op
    let again = rotate_latest(&slot, &slot.join("map_20230601.xlsx")).unwrap();
    assert!(matches!(again, Rotation::AlreadyCurrent { .. }));
    assert!(again.removed().is_empty());
}

#[test]
fn source_status_only_moves_forward() {
    let mut s = SourceFile::new("/pool/map_20230101.xlsx").unwrap();
    assert_eq!(s.status, SourceStatus::Discovered);
    assert!(!s.advance(SourceStatus::Normalized), "cannot skip acquisition");
    assert!(s.advance(SourceStatus::Acquired));
    assert!(!s.is_normalized());
    assert!(!s.advance(SourceStatus::Retained), "an unnormalized file is not retained");
    assert!(s.advance(SourceStatus::Normalized));
    assert!(s.advance(SourceStatus::Merged));
    assert!(!s.advance(SourceStatus::Acquired), "no back transitions");
    assert!(s.advance(SourceStatus::PromotedToLatest));
    assert!(s.status.is_terminal());
    assert!(!s.advance(SourceStatus::Retained));
    assert_eq!(s.date, SnapshotDate::from_ymd(2023, 1, 1));
}
