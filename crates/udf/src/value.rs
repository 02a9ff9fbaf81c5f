//! Typed UDF values

use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, NaiveDate, Utc};
use foureyes_core::FieldError;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::definition::FieldType;

/// A value in exactly one typed slot, matching its field's type
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum FieldValue {
    Text(String),
    Number(Decimal),
    Currency(Decimal),
    Percentage(Decimal),
    Boolean(bool),
    Date(NaiveDate),
    #[serde(rename = "DATETIME")]
    DateTime(DateTime<Utc>),
    Choice(String),
    MultiChoice(BTreeSet<String>),
}

impl FieldValue {
    /// Parse a raw JSON value according to a field type
    ///
    /// Only the shape is checked here; range, length and option checks
    /// happen in validation.
    pub fn parse(field: &str, field_type: &FieldType, raw: &Value) -> Result<Self, FieldError> {
        let mismatch = || FieldError::type_mismatch(field, field_type.as_str());

        match field_type {
            FieldType::Text { .. } => raw
                .as_str()
                .map(|s| FieldValue::Text(s.to_string()))
                .ok_or_else(mismatch),
            FieldType::Number { .. } => parse_decimal(raw).map(FieldValue::Number).ok_or_else(mismatch),
            FieldType::Currency { .. } => parse_decimal(raw).map(FieldValue::Currency).ok_or_else(mismatch),
            FieldType::Percentage { .. } => {
                parse_decimal(raw).map(FieldValue::Percentage).ok_or_else(mismatch)
            }
            FieldType::Boolean => raw.as_bool().map(FieldValue::Boolean).ok_or_else(mismatch),
            FieldType::Date => raw
                .as_str()
                .and_then(|s| NaiveDate::parse_from_str(s.trim(), "%Y-%m-%d").ok())
                .map(FieldValue::Date)
                .ok_or_else(mismatch),
            FieldType::DateTime => raw
                .as_str()
                .and_then(|s| DateTime::parse_from_rfc3339(s.trim()).ok())
                .map(|t| FieldValue::DateTime(t.with_timezone(&Utc)))
                .ok_or_else(mismatch),
            FieldType::Dropdown { .. } => raw
                .as_str()
                .map(|s| FieldValue::Choice(s.to_string()))
                .ok_or_else(mismatch),
            FieldType::MultiSelect { .. } => {
                let items = raw.as_array().ok_or_else(mismatch)?;
                items
                    .iter()
                    .map(|item| item.as_str().map(str::to_string))
                    .collect::<Option<BTreeSet<_>>>()
                    .map(FieldValue::MultiChoice)
                    .ok_or_else(mismatch)
            }
        }
    }

    /// Whether this value occupies the slot of `field_type`
    pub fn matches_type(&self, field_type: &FieldType) -> bool {
        matches!(
            (self, field_type),
            (FieldValue::Text(_), FieldType::Text { .. })
                | (FieldValue::Number(_), FieldType::Number { .. })
                | (FieldValue::Currency(_), FieldType::Currency { .. })
                | (FieldValue::Percentage(_), FieldType::Percentage { .. })
                | (FieldValue::Boolean(_), FieldType::Boolean)
                | (FieldValue::Date(_), FieldType::Date)
                | (FieldValue::DateTime(_), FieldType::DateTime)
                | (FieldValue::Choice(_), FieldType::Dropdown { .. })
                | (FieldValue::MultiChoice(_), FieldType::MultiSelect { .. })
        )
    }

    /// Numeric payload of the numeric slots
    pub fn as_decimal(&self) -> Option<Decimal> {
        match self {
            FieldValue::Number(d) | FieldValue::Currency(d) | FieldValue::Percentage(d) => Some(*d),
            _ => None,
        }
    }

    /// Plain JSON rendering (decimals as strings)
    pub fn to_json(&self) -> Value {
        match self {
            FieldValue::Text(s) | FieldValue::Choice(s) => Value::String(s.clone()),
            FieldValue::Number(d) | FieldValue::Currency(d) | FieldValue::Percentage(d) => {
                Value::String(d.to_string())
            }
            FieldValue::Boolean(b) => Value::Bool(*b),
            FieldValue::Date(d) => Value::String(d.format("%Y-%m-%d").to_string()),
            FieldValue::DateTime(t) => Value::String(t.to_rfc3339()),
            FieldValue::MultiChoice(set) => {
                Value::Array(set.iter().cloned().map(Value::String).collect())
            }
        }
    }

    /// Comparison key for uniqueness; equal values yield equal keys
    pub fn canonical_key(&self) -> String {
        match self {
            FieldValue::Number(d) | FieldValue::Currency(d) | FieldValue::Percentage(d) => {
                d.normalize().to_string()
            }
            FieldValue::MultiChoice(set) => set.iter().cloned().collect::<Vec<_>>().join("\u{1f}"),
            other => match other.to_json() {
                Value::String(s) => s,
                v => v.to_string(),
            },
        }
    }
}

fn parse_decimal(raw: &Value) -> Option<Decimal> {
    match raw {
        Value::Number(n) => {
            let text = n.to_string();
            Decimal::from_str(&text)
                .or_else(|_| Decimal::from_scientific(&text))
                .ok()
        }
        Value::String(s) => Decimal::from_str(s.trim()).ok(),
        _ => None,
    }
}

impl fmt::Display for FieldValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.to_json() {
            Value::String(s) => f.write_str(&s),
            other => write!(f, "{}", other),
        }
    }
}
