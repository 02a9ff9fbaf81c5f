//! Value history trail

use chrono::{DateTime, Utc};
use foureyes_core::Actor;
use serde::{Deserialize, Serialize};

use crate::definition::FieldDefinition;
use crate::value::FieldValue;

/// One change of one field value; immutable once written
///
/// `new_value == None` clears the field. `definition_id` names the
/// definition the value was written under, so values of a deactivated
/// field never resurface under a later field of the same name.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ValueHistoryRecord {
    pub id: String,
    pub definition_id: String,
    pub entity_type: String,
    pub entity_id: String,
    pub field_name: String,
    pub old_value: Option<FieldValue>,
    pub new_value: Option<FieldValue>,
    pub actor: String,
    pub timestamp: DateTime<Utc>,
}

impl ValueHistoryRecord {
    pub fn new(
        def: &FieldDefinition,
        entity_id: &str,
        old_value: Option<FieldValue>,
        new_value: Option<FieldValue>,
        actor: &Actor,
    ) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            definition_id: def.id.clone(),
            entity_type: def.entity_type.clone(),
            entity_id: entity_id.to_string(),
            field_name: def.field_name.clone(),
            old_value,
            new_value,
            actor: actor.login().to_string(),
            timestamp: Utc::now(),
        }
    }
}
