//! Actor - the normalized identity acting on a request
//!
//! Every identity source is normalized the same way:
//! `CORP\JDoe` → `jdoe`, `jdoe@CORP.EXAMPLE` → `jdoe`.

use serde::{Deserialize, Serialize};
use std::fmt;

/// A normalized identity
///
/// Actors are derived per request and never persisted directly; audit and
/// workflow records reference them by `login`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Actor {
    login: String,
    display_name: Option<String>,
}

impl Actor {
    /// Build an actor from a raw identity string
    ///
    /// Returns `None` when nothing is left after normalization.
    ///
    /// # Examples
    /// ```
    /// use foureyes_core::Actor;
    ///
    /// let actor = Actor::new(r"CORP\JDoe").unwrap();
    /// assert_eq!(actor.login(), "jdoe");
    ///
    /// assert!(Actor::new("  ").is_none());
    /// ```
    pub fn new(raw: &str) -> Option<Self> {
        let login = normalize_login(raw);
        if login.is_empty() {
            return None;
        }
        Some(Self {
            login,
            display_name: None,
        })
    }

    /// Set the display name
    pub fn with_display_name(mut self, name: impl Into<String>) -> Self {
        self.display_name = Some(name.into());
        self
    }

    /// Normalized login
    pub fn login(&self) -> &str {
        &self.login
    }

    /// Optional human-readable name
    pub fn display_name(&self) -> Option<&str> {
        self.display_name.as_deref()
    }

    /// Check whether a stored login (in any source format) denotes this actor
    pub fn is(&self, login: &str) -> bool {
        normalize_login(login) == self.login
    }
}

impl fmt::Display for Actor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.login)
    }
}

/// Normalize a raw login: strip `DOMAIN\`, strip `@realm`, lowercase
pub fn normalize_login(raw: &str) -> String {
    let trimmed = raw.trim();
    let without_domain = match trimmed.rfind('\\') {
        Some(idx) => &trimmed[idx + 1..],
        None => trimmed,
    };
    let without_realm = match without_domain.find('@') {
        Some(idx) => &without_domain[..idx],
        None => without_domain,
    };
    without_realm.trim().to_lowercase()
}
