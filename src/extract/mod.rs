// src/extract/mod.rs

use chrono::NaiveDate;
use roxmltree::{Document, Node};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, instrument, trace};

use crate::table::{Maturity, YieldRecord};

#[derive(Error, Debug)]
pub enum ExtractError {
    #[error("malformed document: {0}")]
    Malformed(#[from] roxmltree::Error),

    #[error("field `{0}` missing from document")]
    MissingField(String),

    #[error("invalid date `{value}` in field `{field}`")]
    BadDate { field: String, value: String },

    #[error("non-numeric {maturity} yield `{value}` in field `{field}`")]
    Coercion {
        maturity: Maturity,
        field: String,
        value: String,
    },
}

impl ExtractError {
    /// Only a yield that is present but not a number is fatal; every other
    /// failure means the page does not hold a usable trading day.
    pub fn is_fatal(&self) -> bool {
        matches!(self, ExtractError::Coercion { .. })
    }
}

/// Element names of the settlement date and the twelve yields, in maturity order.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FieldNames {
    pub date: String,
    pub yields: Vec<String>,
}

impl Default for FieldNames {
    fn default() -> Self {
        Self {
            date: "NEW_DATE".to_string(),
            yields: [
                "BC_1MONTH",
                "BC_2MONTH",
                "BC_3MONTH",
                "BC_6MONTH",
                "BC_1YEAR",
                "BC_2YEAR",
                "BC_3YEAR",
                "BC_5YEAR",
                "BC_7YEAR",
                "BC_10YEAR",
                "BC_20YEAR",
                "BC_30YEAR",
            ]
            .iter()
            .map(|s| s.to_string())
            .collect(),
        }
    }
}

impl FieldNames {
    pub fn validate(&self) -> Result<(), String> {
        if self.date.trim().is_empty() {
            return Err("date field name is empty".into());
        }
        if self.yields.len() != Maturity::COUNT {
            return Err(format!(
                "expected {} yield field names, found {}",
                Maturity::COUNT,
                self.yields.len()
            ));
        }
        if let Some(i) = self.yields.iter().position(|f| f.trim().is_empty()) {
            return Err(format!("{} yield field name is empty", Maturity::ALL[i]));
        }
        Ok(())
    }

    pub fn yield_field(&self, maturity: Maturity) -> Option<&str> {
        self.yields.get(maturity.position()).map(String::as_str)
    }
}

/// Parse raw page text into an XML tree.
pub fn parse_document(text: &str) -> Result<Document<'_>, ExtractError> {
    Ok(Document::parse(text)?)
}

/// First element whose local name is `name`; namespace prefixes are ignored.
pub fn find_field<'a, 'input>(doc: &'a Document<'input>, name: &str) -> Option<Node<'a, 'input>> {
    doc.descendants()
        .find(|n| n.is_element() && n.tag_name().name() == name)
}

/// Trimmed text of a field, or `None` when it is absent or empty
/// (the feed marks missing yields with `m:null="true"` and no content).
pub fn field_text<'a>(doc: &'a Document<'_>, name: &str) -> Option<&'a str> {
    find_field(doc, name)
        .and_then(|n| n.text())
        .map(str::trim)
        .filter(|t| !t.is_empty())
}

/// Pull one trading day out of a parsed page.
pub fn extract_record(doc: &Document<'_>, fields: &FieldNames) -> Result<YieldRecord, ExtractError> {
    let raw_date = field_text(doc, &fields.date)
        .ok_or_else(|| ExtractError::MissingField(fields.date.clone()))?;
    // timestamps look like `2019-01-02T00:00:00`; keep the date part
    let date = raw_date
        .get(..10)
        .and_then(|d| NaiveDate::parse_from_str(d, "%Y-%m-%d").ok())
        .ok_or_else(|| ExtractError::BadDate {
            field: fields.date.clone(),
            value: raw_date.to_string(),
        })?;

    let mut yields = [None; Maturity::COUNT];
    for maturity in Maturity::ALL {
        let Some(field) = fields.yield_field(maturity) else {
            continue;
        };
        let Some(text) = field_text(doc, field) else {
            trace!(%date, %maturity, field, "yield absent");
            continue;
        };
        let value = text
            .parse::<f64>()
            .ok()
            .filter(|v| v.is_finite())
            .ok_or_else(|| ExtractError::Coercion {
                maturity,
                field: field.to_string(),
                value: text.to_string(),
            })?;
        yields[maturity.position()] = Some(value);
    }

    Ok(YieldRecord::new(date, yields))
}

/// Parse and extract in one step.
#[instrument(level = "debug", skip(text, fields), fields(len = text.len()))]
pub fn extract_page(text: &str, fields: &FieldNames) -> Result<YieldRecord, ExtractError> {
    let doc = parse_document(text)?;
    let record = extract_record(&doc, fields)?;
    debug!(date = %record.date, "extracted daily yields");
    Ok(record)
}
