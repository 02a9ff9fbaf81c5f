//! FourEyes Core - Domain types
//!
//! This crate contains the fundamental types shared by every FourEyes crate:
//! - `Actor`: a normalized identity (lowercase login, no domain or realm)
//! - `AccessMode` / `Action`: the vocabulary of permission grants and requests
//! - `GovernanceError`: the error taxonomy surfaced to callers
//! - `Deadline`: caller-supplied deadline applied to collaborator calls

pub mod access;
pub mod actor;
pub mod deadline;
pub mod error;

pub use access::{AccessMode, Action, ParseAccessError};
pub use actor::{normalize_login, Actor};
pub use deadline::Deadline;
pub use error::{FieldError, FieldErrorKind, GovernanceError, GovernanceResult};
