//! Identity Resolver - first non-empty source wins

use foureyes_core::{Actor, GovernanceError, GovernanceResult};

use crate::config::IdentityConfig;
use crate::context::RequestContext;

/// Which source produced the identity
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IdentitySource {
    EnvironmentOverride,
    TrustedHeader(String),
    Explicit,
    Session,
}

/// An actor together with the source it was resolved from
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedIdentity {
    pub actor: Actor,
    pub source: IdentitySource,
}

/// Resolves a request context into a normalized actor
///
/// Pure function of the context: no caching, no side effects beyond logging.
#[derive(Debug, Clone, Default)]
pub struct IdentityResolver {
    config: IdentityConfig,
}

impl IdentityResolver {
    pub fn new(config: IdentityConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &IdentityConfig {
        &self.config
    }

    /// Resolve the acting identity
    ///
    /// Fails with `IdentityUnresolved` when no source yields a value; callers
    /// must treat that as "no actor", never as a guest.
    pub fn resolve(&self, ctx: &RequestContext) -> GovernanceResult<Actor> {
        self.resolve_with_source(ctx).map(|resolved| resolved.actor)
    }

    /// Resolve the acting identity and report which source produced it
    pub fn resolve_with_source(&self, ctx: &RequestContext) -> GovernanceResult<ResolvedIdentity> {
        for (raw, source) in self.candidates(ctx) {
            if let Some(actor) = Actor::new(raw) {
                tracing::debug!(actor = %actor, source = ?source, "Identity resolved");
                return Ok(ResolvedIdentity { actor, source });
            }
        }

        tracing::warn!("No identity source yielded a value");
        Err(GovernanceError::IdentityUnresolved)
    }

    /// Raw values in priority order
    fn candidates<'a>(&'a self, ctx: &'a RequestContext) -> Vec<(&'a str, IdentitySource)> {
        let mut candidates = Vec::new();

        if let Some(value) = ctx.env(&self.config.env_override_var) {
            candidates.push((value, IdentitySource::EnvironmentOverride));
        }

        for header in &self.config.trusted_headers {
            if let Some(value) = ctx.header(header) {
                candidates.push((value, IdentitySource::TrustedHeader(header.clone())));
            }
        }

        if let Some(value) = ctx.explicit_identity() {
            candidates.push((value, IdentitySource::Explicit));
        }

        if let Some(value) = ctx.session_identity() {
            candidates.push((value, IdentitySource::Session));
        }

        candidates
    }
}
