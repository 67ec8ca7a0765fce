use std::sync::Arc;

use serde::Serialize;
use serde_json::{json, Value};
use tracing::info;

use crate::error::LedgerError;
use crate::normalize::LedgerRow;
use crate::session::AuthenticatedSession;
use crate::sheets::SheetsTransport;

pub const TIMESTAMP_PATTERN: &str = "MM/dd/yyyy hh:mm:ss";
pub const DATE_PATTERN: &str = "MM/dd/yyyy";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum NumberFormatKind {
    Date,
    DateTime,
}

/// Display format applied to one whole column.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ColumnFormatRule {
    pub column: u32,
    pub kind: NumberFormatKind,
    pub pattern: String,
}

impl ColumnFormatRule {
    pub fn timestamp(column: u32) -> Self {
        Self {
            column,
            kind: NumberFormatKind::DateTime,
            pattern: TIMESTAMP_PATTERN.to_string(),
        }
    }

    pub fn date(column: u32) -> Self {
        Self {
            column,
            kind: NumberFormatKind::Date,
            pattern: DATE_PATTERN.to_string(),
        }
    }

    /// `repeatCell` request covering every row of the column.
    pub fn to_request(&self, sheet_id: i64) -> Result<Value, LedgerError> {
        let end = self.column.checked_add(1).ok_or_else(|| {
            LedgerError::Malformed(format!("column index {} is out of range", self.column))
        })?;
        Ok(json!({
            "repeatCell": {
                "range": {
                    "sheetId": sheet_id,
                    "startColumnIndex": self.column,
                    "endColumnIndex": end,
                },
                "cell": {
                    "userEnteredFormat": {
                        "numberFormat": {
                            "type": self.kind,
                            "pattern": self.pattern,
                        }
                    }
                },
                "fields": "userEnteredFormat.numberFormat",
            }
        }))
    }
}

/// Timestamp in column A, date available in column G.
pub fn default_format_rules() -> Vec<ColumnFormatRule> {
    vec![ColumnFormatRule::timestamp(0), ColumnFormatRule::date(6)]
}

#[derive(Debug, Clone)]
pub struct LedgerConfig {
    pub spreadsheet_id: String,
    pub range: String,
    pub sheet_id: i64,
    pub format_rules: Vec<ColumnFormatRule>,
}

impl LedgerConfig {
    pub fn new(spreadsheet_id: impl Into<String>, range: impl Into<String>) -> Self {
        Self {
            spreadsheet_id: spreadsheet_id.into(),
            range: range.into(),
            sheet_id: 0,
            format_rules: default_format_rules(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct AppendResult {
    pub cells_written: u64,
}

pub struct LedgerWriter {
    transport: Arc<dyn SheetsTransport>,
    config: LedgerConfig,
}

impl LedgerWriter {
    pub fn new(transport: Arc<dyn SheetsTransport>, config: LedgerConfig) -> Self {
        Self { transport, config }
    }

    pub fn config(&self) -> &LedgerConfig {
        &self.config
    }

    /// Appends the batch as new trailing rows. Existing rows are never touched.
    pub async fn append(
        &self,
        session: &AuthenticatedSession,
        rows: &[LedgerRow],
    ) -> Result<AppendResult, LedgerError> {
        if rows.is_empty() {
            return Ok(AppendResult { cells_written: 0 });
        }

        let values = rows
            .iter()
            .map(serde_json::to_value)
            .collect::<Result<Vec<_>, _>>()
            .map_err(|e| LedgerError::Malformed(e.to_string()))?;

        let response = self
            .transport
            .append_values(session, &self.config.spreadsheet_id, &self.config.range, values)
            .await?;
        let cells_written = response
            .updates
            .updated_cells
            .ok_or_else(|| LedgerError::Malformed("append response has no updatedCells".into()))?;

        info!(rows = rows.len(), cells = cells_written, "cells appended");
        Ok(AppendResult { cells_written })
    }

    /// Applies each rule to its whole column. Re-applying a rule is a no-op.
    pub async fn enforce_column_formats(
        &self,
        session: &AuthenticatedSession,
        format_spec: &[ColumnFormatRule],
    ) -> Result<(), LedgerError> {
        if format_spec.is_empty() {
            return Ok(());
        }
        let requests = format_spec
            .iter()
            .map(|rule| rule.to_request(self.config.sheet_id))
            .collect::<Result<Vec<_>, _>>()?;
        self.transport
            .batch_update(session, &self.config.spreadsheet_id, requests)
            .await?;
        info!(columns = format_spec.len(), "column formats enforced");
        Ok(())
    }

    pub async fn read_rows(
        &self,
        session: &AuthenticatedSession,
    ) -> Result<Vec<Vec<String>>, LedgerError> {
        let range = self
            .transport
            .get_values(session, &self.config.spreadsheet_id, &self.config.range)
            .await?;
        Ok(range
            .values
            .into_iter()
            .map(|row| row.into_iter().map(cell_text).collect())
            .collect())
    }
}

fn cell_text(value: Value) -> String {
    match value {
        Value::String(s) => s,
        Value::Null => String::new(),
        other => other.to_string(),
    }
}
