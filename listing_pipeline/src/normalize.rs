use chrono::NaiveDateTime;
use serde::{Serialize, Serializer};

use crate::{ComplexName, ListingRecord};

pub const TIMESTAMP_FORMAT: &str = "%m/%d/%Y %H:%M:%S";

pub const COLUMNS: [&str; 8] = [
    "timestamp",
    "complex_name",
    "unit_number",
    "price",
    "size_sqft",
    "floor",
    "date_available",
    "other",
];

/// One scalar ledger cell. `Empty` is written as a blank cell.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Cell {
    Text(String),
    Integer(i64),
    /// Prices and sizes, which are never negative.
    Unsigned(u64),
    Empty,
}

impl Cell {
    fn text(value: Option<&str>) -> Self {
        match value {
            Some(s) => Cell::Text(s.to_string()),
            None => Cell::Empty,
        }
    }

    fn integer(value: Option<i64>) -> Self {
        value.map(Cell::Integer).unwrap_or(Cell::Empty)
    }

    fn unsigned(value: Option<u64>) -> Self {
        value.map(Cell::Unsigned).unwrap_or(Cell::Empty)
    }
}

impl Serialize for Cell {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Cell::Text(s) => serializer.serialize_str(s),
            Cell::Integer(n) => serializer.serialize_i64(*n),
            Cell::Unsigned(n) => serializer.serialize_u64(*n),
            Cell::Empty => serializer.serialize_str(""),
        }
    }
}

/// `[timestamp, complex_name, unit_number, price, size_sqft, floor, date_available, other]`
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct LedgerRow(pub [Cell; 8]);

impl LedgerRow {
    pub fn cells(&self) -> &[Cell; 8] {
        &self.0
    }
}

pub fn normalize(
    record: &ListingRecord,
    complex_name: &ComplexName,
    captured_at: NaiveDateTime,
) -> LedgerRow {
    LedgerRow([
        Cell::Text(captured_at.format(TIMESTAMP_FORMAT).to_string()),
        Cell::Text(complex_name.as_str().to_string()),
        Cell::text(record.unit_number.as_deref()),
        Cell::Unsigned(record.price),
        Cell::unsigned(record.size_sqft),
        Cell::integer(record.floor),
        Cell::text(record.date_available.as_deref()),
        Cell::text(record.other.as_deref()),
    ])
}

pub fn normalize_all(
    records: &[ListingRecord],
    complex_name: &ComplexName,
    captured_at: NaiveDateTime,
) -> Vec<LedgerRow> {
    records
        .iter()
        .map(|r| normalize(r, complex_name, captured_at))
        .collect()
}
