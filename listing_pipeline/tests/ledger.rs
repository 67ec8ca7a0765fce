mod common;

use std::sync::Arc;

use chrono::NaiveDate;
use common::{session, writer, FakeSheets};
use listing_pipeline::ledger::{default_format_rules, ColumnFormatRule};
use listing_pipeline::normalize::normalize;
use listing_pipeline::{ComplexName, ListingRecord};
use serde_json::json;

fn record(unit: &str, price: u64) -> ListingRecord {
    let mut record = ListingRecord::new(price);
    record.unit_number = Some(unit.to_string());
    record.floor = Some(2);
    record
}

#[tokio::test]
async fn append_reports_cells_and_keeps_prior_rows() {
    let sheets = Arc::new(FakeSheets::with_rows(vec![vec![json!("existing")]]));
    let ledger = writer(sheets.clone());
    let at = NaiveDate::from_ymd_opt(2024, 6, 10)
        .unwrap()
        .and_hms_opt(10, 0, 0)
        .unwrap();
    let name = ComplexName::new("Soma Square");
    let rows = vec![
        normalize(&record("601", 3000), &name, at),
        normalize(&record("602", 3100), &name, at),
    ];

    let result = ledger.append(&session(), &rows).await.unwrap();
    assert_eq!(result.cells_written, 16);

    let result = ledger.append(&session(), &rows[..1]).await.unwrap();
    assert_eq!(result.cells_written, 8);

    let stored = sheets.snapshot();
    assert_eq!(stored.len(), 4);
    assert_eq!(stored[0], vec![json!("existing")]);
    assert_eq!(stored[1][0], "06/10/2024 10:00:00");
    assert_eq!(stored[3][2], "601");
}

#[tokio::test]
async fn empty_batch_is_a_no_op() {
    let sheets = Arc::new(FakeSheets::default());
    let result = writer(sheets.clone()).append(&session(), &[]).await.unwrap();
    assert_eq!(result.cells_written, 0);
    assert_eq!(sheets.append_calls.load(std::sync::atomic::Ordering::SeqCst), 0);
}

#[tokio::test]
async fn enforcing_formats_twice_changes_nothing() {
    let sheets = Arc::new(FakeSheets::default());
    let ledger = writer(sheets.clone());
    let rules = default_format_rules();

    ledger.enforce_column_formats(&session(), &rules).await.unwrap();
    let first = (sheets.format_of(0), sheets.format_of(6));
    ledger.enforce_column_formats(&session(), &rules).await.unwrap();

    assert_eq!((sheets.format_of(0), sheets.format_of(6)), first);
    assert_eq!(
        sheets.format_of(0).unwrap(),
        json!({ "type": "DATE_TIME", "pattern": "MM/dd/yyyy hh:mm:ss" })
    );
    assert_eq!(
        sheets.format_of(6).unwrap(),
        json!({ "type": "DATE", "pattern": "MM/dd/yyyy" })
    );
    assert_eq!(sheets.formats.lock().unwrap().len(), 2);
}

#[tokio::test]
async fn custom_rules_only_touch_their_columns() {
    let sheets = Arc::new(FakeSheets::default());
    writer(sheets.clone())
        .enforce_column_formats(&session(), &[ColumnFormatRule::date(4)])
        .await
        .unwrap();
    assert!(sheets.format_of(0).is_none());
    assert_eq!(sheets.format_of(4).unwrap()["type"], "DATE");
}

#[tokio::test]
async fn read_rows_renders_cells_as_text() {
    let sheets = Arc::new(FakeSheets::with_rows(vec![vec![
        json!("06/10/2024 10:00:00"),
        json!("Soma Square"),
        json!(3000),
        json!(null),
    ]]));
    let rows = writer(sheets).read_rows(&session()).await.unwrap();
    assert_eq!(rows, vec![vec!["06/10/2024 10:00:00", "Soma Square", "3000", ""]]);
}

#[tokio::test]
async fn out_of_range_column_fails_before_any_request() {
    let sheets = Arc::new(FakeSheets::default());
    let result = writer(sheets.clone())
        .enforce_column_formats(&session(), &[ColumnFormatRule::date(0), ColumnFormatRule::date(u32::MAX)])
        .await;
    assert!(result.is_err());
    assert_eq!(sheets.batch_calls.load(std::sync::atomic::Ordering::SeqCst), 0);
}
