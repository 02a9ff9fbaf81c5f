//! FourEyes Identity Resolver
//!
//! Turns ambient request context into a single normalized [`Actor`].
//! Sources are consulted in strict priority order and never merged:
//!
//! ```text
//! 1. process environment override  (FOUREYES_USER)
//! 2. trusted reverse-proxy headers (fixed precedence list)
//! 3. explicit caller-supplied identity
//! 4. session identity from a prior authentication step
//! ```
//!
//! [`Actor`]: foureyes_core::Actor

pub mod config;
pub mod context;
pub mod resolver;

pub use config::IdentityConfig;
pub use context::RequestContext;
pub use resolver::{IdentityResolver, IdentitySource, ResolvedIdentity};
