#[path = "common/mod.rs"]
mod common;

use bnfmap::{ColumnPolicy, CsvTableSource, Record, StageError, TableSource, COLUMNS};
use common::*;
use std::fs;

/// Ragged rows are projected: long rows are cut to 11 fields, short rows padded with "".
#[test]
fn rows_are_projected_to_eleven_columns() {
    let base = temp_base();
    let path = base.join("t.csv");
    let mut text = COLUMNS.join(",");
    text.push_str(",Extra\n");
    text.push_str("a,b,c,d,e,f,g,h,i,j,k,l\n");
    text.push_str("a,b\n");
    text.push_str("a,b,,,,,,,,,\n");
    write_file(&path, &text);

    let rows = CsvTableSource::default().read_table(&path).unwrap();
    assert_eq!(rows.len(), 3);
    assert_eq!(rows[0], Record::from_fields(["a", "b", "c", "d", "e", "f", "g", "h", "i", "j", "k"]));
    assert_eq!(rows[1], Record::from_fields(["a", "b"]));
    assert_eq!(rows[1], rows[2], "missing trailing cells equal explicit blanks");
}

/// A table narrower than the schema is rejected by default and padded on request.
#[test]
fn narrow_tables_follow_column_policy() {
    let base = temp_base();
    let path = base.join("narrow.csv");
    write_file(&path, "Presentation / Pack Level,VMP / VMPP/ AMP / AMPP,BNF Code\nX,Y,Z\n");

    let err = CsvTableSource::new(ColumnPolicy::Reject).read_table(&path).unwrap_err();
    assert!(matches!(err, StageError::ColumnCount { found: 3, expected: 11, .. }));

    let rows = CsvTableSource::new(ColumnPolicy::Pad).read_table(&path).unwrap();
    assert_eq!(rows, vec![Record::from_fields(["X", "Y", "Z"])]);
}

/// A malformed row stops the file: rows before it are delivered, rows after it are not.
#[test]
fn parse_error_abandons_rest_of_file() {
    let base = temp_base();
    let path = base.join("broken.csv");
    let mut bytes = csv_text(&COLUMNS, &[rec("X", "Y")]).into_bytes();
    bytes.extend_from_slice(b"A,\xff\xfe,c,d,e,f,g,h,i,j,k\n");
    bytes.extend_from_slice(csv_text(&COLUMNS, &[rec("A", "B")]).lines().nth(1).unwrap().as_bytes());
    bytes.push(b'\n');
    fs::write(&path, bytes).unwrap();

    let mut seen = Vec::new();
    let err = CsvTableSource::default().for_each_record(&path, &mut |r| seen.push(r)).unwrap_err();
    assert!(matches!(err, StageError::Parse { row: 3, .. }), "got {err:?}");
    assert_eq!(seen, vec![rec("X", "Y")]);
}

#[test]
fn missing_file_is_an_io_error() {
    let base = temp_base();
    let err = CsvTableSource::default().read_table(&base.join("nope.csv")).unwrap_err();
    assert!(matches!(err, StageError::Io(_)));
}
