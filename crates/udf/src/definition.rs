//! UDF definitions

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Inclusive numeric range
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct NumericBounds {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub min_value: Option<Decimal>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_value: Option<Decimal>,
}

impl NumericBounds {
    pub fn new(min_value: Option<Decimal>, max_value: Option<Decimal>) -> Self {
        Self {
            min_value,
            max_value,
        }
    }

    pub fn contains(&self, value: Decimal) -> bool {
        self.min_value.map_or(true, |min| value >= min) && self.max_value.map_or(true, |max| value <= max)
    }
}

/// Type of a user-defined field, with its type-specific constraints
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum FieldType {
    Text {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        max_length: Option<usize>,
    },
    Number {
        #[serde(flatten)]
        bounds: NumericBounds,
    },
    Currency {
        #[serde(flatten)]
        bounds: NumericBounds,
    },
    Percentage {
        #[serde(flatten)]
        bounds: NumericBounds,
    },
    Boolean,
    Date,
    #[serde(rename = "DATETIME")]
    DateTime,
    Dropdown {
        options: Vec<String>,
    },
    MultiSelect {
        options: Vec<String>,
    },
}

impl FieldType {
    pub fn as_str(&self) -> &'static str {
        match self {
            FieldType::Text { .. } => "TEXT",
            FieldType::Number { .. } => "NUMBER",
            FieldType::Currency { .. } => "CURRENCY",
            FieldType::Percentage { .. } => "PERCENTAGE",
            FieldType::Boolean => "BOOLEAN",
            FieldType::Date => "DATE",
            FieldType::DateTime => "DATETIME",
            FieldType::Dropdown { .. } => "DROPDOWN",
            FieldType::MultiSelect { .. } => "MULTI_SELECT",
        }
    }

    /// Numeric range, for the numeric types
    pub fn bounds(&self) -> Option<&NumericBounds> {
        match self {
            FieldType::Number { bounds }
            | FieldType::Currency { bounds }
            | FieldType::Percentage { bounds } => Some(bounds),
            _ => None,
        }
    }

    /// Allowed options, for the choice types
    pub fn options(&self) -> Option<&[String]> {
        match self {
            FieldType::Dropdown { options } | FieldType::MultiSelect { options } => Some(options),
            _ => None,
        }
    }
}

/// Schema of one custom field on an entity type
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldDefinition {
    pub id: String,
    pub entity_type: String,
    pub field_name: String,
    pub label: String,
    pub field_type: FieldType,
    #[serde(default)]
    pub is_required: bool,
    #[serde(default)]
    pub is_unique: bool,
    #[serde(default = "default_active")]
    pub is_active: bool,
    pub created_by: String,
    pub created_at: DateTime<Utc>,
}

fn default_active() -> bool {
    true
}

impl FieldDefinition {
    /// New active, optional, non-unique definition
    pub fn new(entity_type: &str, field_name: &str, field_type: FieldType) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            entity_type: entity_type.trim().to_ascii_lowercase(),
            field_name: field_name.trim().to_string(),
            label: field_name.trim().to_string(),
            field_type,
            is_required: false,
            is_unique: false,
            is_active: true,
            created_by: String::new(),
            created_at: Utc::now(),
        }
    }

    pub fn with_label(mut self, label: &str) -> Self {
        self.label = label.to_string();
        self
    }

    pub fn required(mut self) -> Self {
        self.is_required = true;
        self
    }

    pub fn unique(mut self) -> Self {
        self.is_unique = true;
        self
    }
}
