use std::sync::Arc;

use serde::Deserialize;
use serde_json::{json, Value};
use tracing::{debug, warn};

use crate::error::ExtractError;
use crate::openai::{CompletionService, OutputSchema};
use crate::{ComplexName, ListingRecord, ReducedContent};

pub const DEFAULT_FOCUS: &str = "2 bedroom";

#[derive(Debug, Clone)]
pub struct ExtractorConfig {
    /// Which units to ask for, e.g. "2 bedroom".
    pub focus: String,
    pub temperature: f32,
}

impl Default for ExtractorConfig {
    fn default() -> Self {
        Self {
            focus: DEFAULT_FOCUS.to_string(),
            temperature: 0.0,
        }
    }
}

/// Records that survived coercion plus the number dropped for lacking a price.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExtractedListings {
    pub records: Vec<ListingRecord>,
    pub excluded: usize,
}

pub struct StructuredExtractor {
    service: Arc<dyn CompletionService>,
    config: ExtractorConfig,
}

impl StructuredExtractor {
    pub fn new(service: Arc<dyn CompletionService>, config: ExtractorConfig) -> Self {
        Self { service, config }
    }

    pub async fn extract_records(
        &self,
        content: &ReducedContent,
    ) -> Result<ExtractedListings, ExtractError> {
        let prompt = format!(
            "Extract the apartment information from the following text data containing \
             information about available apartments. Give me the information of all available \
             {} apartments as a list:\n{}",
            self.config.focus,
            content.text()
        );
        let output = self
            .service
            .complete(&prompt, &listing_schema(), self.config.temperature)
            .await?;

        let envelope: ListingEnvelope = serde_json::from_value(output)
            .map_err(|e| ExtractError::Schema(format!("listing output: {}", e)))?;
        let extracted = validate(envelope.apartment_info);
        if extracted.excluded > 0 {
            warn!(
                excluded = extracted.excluded,
                kept = extracted.records.len(),
                "dropped listings without a usable price"
            );
        }
        Ok(extracted)
    }

    pub async fn extract_name(&self, content: &ReducedContent) -> Result<ComplexName, ExtractError> {
        let prompt = format!(
            "Extract the name of the apartment from the following text data:\n{}",
            content.text()
        );
        let output = self
            .service
            .complete(&prompt, &name_schema(), self.config.temperature)
            .await?;

        let envelope: NameEnvelope = serde_json::from_value(output)
            .map_err(|e| ExtractError::Schema(format!("name output: {}", e)))?;
        debug!(name = %envelope.name, "extracted complex name");
        Ok(ComplexName::new(envelope.name.trim()))
    }

    /// Issues both extraction calls concurrently.
    pub async fn extract(
        &self,
        content: &ReducedContent,
    ) -> Result<(ExtractedListings, ComplexName), ExtractError> {
        futures::try_join!(self.extract_records(content), self.extract_name(content))
    }
}

#[derive(Debug, Deserialize)]
struct ListingEnvelope {
    apartment_info: Vec<RawListing>,
}

#[derive(Debug, Default, Deserialize)]
struct RawListing {
    #[serde(default)]
    unit_number: Value,
    #[serde(default)]
    price: Value,
    #[serde(default)]
    size_sqft: Value,
    #[serde(default)]
    floor: Value,
    #[serde(default)]
    date_available: Value,
    #[serde(default)]
    other: Value,
}

#[derive(Debug, Deserialize)]
struct NameEnvelope {
    name: String,
}

fn validate(raw: Vec<RawListing>) -> ExtractedListings {
    let total = raw.len();
    let records: Vec<ListingRecord> = raw
        .into_iter()
        .filter_map(|r| {
            let price = coerce_unsigned(&r.price)?;
            Some(ListingRecord {
                unit_number: coerce_text(&r.unit_number),
                price,
                size_sqft: coerce_unsigned(&r.size_sqft),
                floor: coerce_signed(&r.floor),
                date_available: coerce_text(&r.date_available),
                other: coerce_text(&r.other),
            })
        })
        .collect();

    ExtractedListings {
        excluded: total - records.len(),
        records,
    }
}

fn numeric_text(s: &str) -> String {
    s.trim().chars().filter(|c| *c != '$' && *c != ',').collect::<String>().trim().to_string()
}

fn coerce_unsigned(value: &Value) -> Option<u64> {
    match value {
        Value::Number(n) => n.as_u64().or_else(|| {
            n.as_f64()
                .filter(|f| *f >= 0.0 && f.fract() == 0.0 && *f <= u64::MAX as f64)
                .map(|f| f as u64)
        }),
        Value::String(s) => numeric_text(s).parse().ok(),
        _ => None,
    }
}

fn coerce_signed(value: &Value) -> Option<i64> {
    match value {
        Value::Number(n) => n.as_i64().or_else(|| {
            n.as_f64()
                .filter(|f| f.fract() == 0.0 && f.abs() <= i64::MAX as f64)
                .map(|f| f as i64)
        }),
        Value::String(s) => numeric_text(s).parse().ok(),
        _ => None,
    }
}

fn coerce_text(value: &Value) -> Option<String> {
    match value {
        Value::String(s) if !s.trim().is_empty() => Some(s.trim().to_string()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

fn listing_schema() -> OutputSchema {
    OutputSchema {
        name: "apartment_info_list",
        schema: json!({
            "type": "object",
            "properties": {
                "apartment_info": {
                    "type": "array",
                    "description": "A list of available apartments",
                    "items": {
                        "type": "object",
                        "properties": {
                            "unit_number": {
                                "type": ["string", "null"],
                                "description": "The unit number of the available unit"
                            },
                            "price": {
                                "type": "integer",
                                "description": "The price of the available unit"
                            },
                            "size_sqft": {
                                "type": ["integer", "null"],
                                "description": "The size of the available unit in square feet"
                            },
                            "floor": {
                                "type": ["integer", "null"],
                                "description": "The floor of the available unit"
                            },
                            "date_available": {
                                "type": ["string", "null"],
                                "description": "The date the unit is available in the format: mm/dd/yyyy"
                            },
                            "other": {
                                "type": ["string", "null"],
                                "description": "Other information about the unit"
                            }
                        },
                        "required": ["unit_number", "price", "size_sqft", "floor", "date_available", "other"],
                        "additionalProperties": false
                    }
                }
            },
            "required": ["apartment_info"],
            "additionalProperties": false
        }),
    }
}

fn name_schema() -> OutputSchema {
    OutputSchema {
        name: "apartment_name",
        schema: json!({
            "type": "object",
            "properties": {
                "name": {
                    "type": "string",
                    "description": "The name of the apartment complex"
                }
            },
            "required": ["name"],
            "additionalProperties": false
        }),
    }
}
