//! Entity kind to resource name mapping

use std::collections::HashMap;

/// Maps an entity kind to the resource its grants are checked against
///
/// Kinds without an override use their own name. Action resources are
/// derived from the base name (`<resource>.approve`, `.close`, `.reactivate`).
#[derive(Debug, Clone, Default)]
pub struct ResourceMap {
    overrides: HashMap<String, String>,
}

impl ResourceMap {
    pub fn new() -> Self {
        Self::default()
    }

    /// Route `kind` to `resource`
    pub fn with_mapping(mut self, kind: &str, resource: &str) -> Self {
        self.overrides
            .insert(kind.to_ascii_lowercase(), resource.to_string());
        self
    }

    /// Resource name for an entity kind
    pub fn resource_for(&self, kind: &str) -> String {
        let key = kind.to_ascii_lowercase();
        self.overrides.get(&key).cloned().unwrap_or(key)
    }
}
