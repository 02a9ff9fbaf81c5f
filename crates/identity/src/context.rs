//! Request context - the raw identity material supplied by the caller

use std::collections::HashMap;

/// Ambient context of one request
///
/// Header names are matched case-insensitively.
#[derive(Debug, Clone, Default)]
pub struct RequestContext {
    env: HashMap<String, String>,
    headers: HashMap<String, String>,
    explicit_identity: Option<String>,
    session_identity: Option<String>,
}

impl RequestContext {
    /// Create an empty context
    pub fn new() -> Self {
        Self::default()
    }

    /// Capture the given process environment variables
    pub fn from_process_env<'a>(keys: impl IntoIterator<Item = &'a str>) -> Self {
        let mut ctx = Self::new();
        for key in keys {
            if let Ok(value) = std::env::var(key) {
                ctx.env.insert(key.to_string(), value);
            }
        }
        ctx
    }

    /// Set an environment variable
    pub fn with_env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.insert(key.into(), value.into());
        self
    }

    /// Set a header
    pub fn with_header(mut self, name: &str, value: impl Into<String>) -> Self {
        self.headers.insert(name.to_lowercase(), value.into());
        self
    }

    /// Set the explicit caller-supplied identity
    pub fn with_explicit_identity(mut self, identity: impl Into<String>) -> Self {
        self.explicit_identity = Some(identity.into());
        self
    }

    /// Set the session-bound identity
    pub fn with_session_identity(mut self, identity: impl Into<String>) -> Self {
        self.session_identity = Some(identity.into());
        self
    }

    pub fn env(&self, key: &str) -> Option<&str> {
        self.env.get(key).map(String::as_str)
    }

    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(&name.to_lowercase()).map(String::as_str)
    }

    pub fn explicit_identity(&self) -> Option<&str> {
        self.explicit_identity.as_deref()
    }

    pub fn session_identity(&self) -> Option<&str> {
        self.session_identity.as_deref()
    }
}
