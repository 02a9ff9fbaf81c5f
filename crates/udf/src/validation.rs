//! Per-field validation rules

use std::collections::HashSet;

use foureyes_core::FieldError;

use crate::definition::{FieldDefinition, FieldType};
use crate::value::FieldValue;

/// Type-specific constraint checks on an already-parsed value
pub fn check_constraints(def: &FieldDefinition, value: &FieldValue) -> Option<FieldError> {
    let field = def.field_name.as_str();

    if !value.matches_type(&def.field_type) {
        return Some(FieldError::type_mismatch(field, def.field_type.as_str()));
    }

    match (&def.field_type, value) {
        (FieldType::Text { max_length: Some(max) }, FieldValue::Text(text)) => {
            let length = text.chars().count();
            (length > *max).then(|| {
                FieldError::constraint(
                    field,
                    format!("{} is {} characters long, maximum is {}", field, length, max),
                )
            })
        }
        (FieldType::Dropdown { options }, FieldValue::Choice(choice)) => {
            (!options.contains(choice)).then(|| {
                FieldError::constraint(field, format!("{} is not an option of {}", choice, field))
            })
        }
        (FieldType::MultiSelect { options }, FieldValue::MultiChoice(choices)) => {
            let invalid: Vec<&str> = choices
                .iter()
                .filter(|c| !options.contains(*c))
                .map(String::as_str)
                .collect();
            (!invalid.is_empty()).then(|| {
                FieldError::constraint(
                    field,
                    format!("{} are not options of {}", invalid.join(", "), field),
                )
            })
        }
        (field_type, value) => {
            let bounds = field_type.bounds()?;
            let number = value.as_decimal()?;
            (!bounds.contains(number)).then(|| {
                let min = bounds.min_value.map_or("-inf".to_string(), |m| m.to_string());
                let max = bounds.max_value.map_or("+inf".to_string(), |m| m.to_string());
                FieldError::constraint(
                    field,
                    format!("{} must be within [{}, {}], got {}", field, min, max, number),
                )
            })
        }
    }
}

/// Sanity checks on a definition before it is stored
pub fn check_definition(def: &FieldDefinition) -> Vec<FieldError> {
    let field = def.field_name.as_str();
    let mut errors = Vec::new();

    if field.is_empty() || field.chars().any(char::is_whitespace) {
        errors.push(FieldError::constraint(
            field,
            format!("field name '{}' must be non-empty without whitespace", field),
        ));
    }
    if def.entity_type.is_empty() {
        errors.push(FieldError::constraint(field, "entity type must be non-empty"));
    }

    match &def.field_type {
        FieldType::Text { max_length: Some(0) } => {
            errors.push(FieldError::constraint(field, "max_length must be positive"));
        }
        FieldType::Dropdown { options } | FieldType::MultiSelect { options } => {
            let mut seen = HashSet::new();
            if options.is_empty() {
                errors.push(FieldError::constraint(field, "choice fields need at least one option"));
            }
            if options.iter().any(|o| !seen.insert(o)) {
                errors.push(FieldError::constraint(field, "options must be distinct"));
            }
        }
        other => {
            if let Some(bounds) = other.bounds() {
                if let (Some(min), Some(max)) = (bounds.min_value, bounds.max_value) {
                    if min > max {
                        errors.push(FieldError::constraint(
                            field,
                            format!("min_value {} exceeds max_value {}", min, max),
                        ));
                    }
                }
            }
        }
    }

    errors
}
