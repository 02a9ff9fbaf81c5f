//! Caller-supplied deadlines
//!
//! Expiry surfaces as `GovernanceError::Timeout`, distinct from any
//! business-rule failure.

use std::future::Future;
use std::time::Duration;

use tokio::time::{timeout_at, Instant};

use crate::error::{GovernanceError, GovernanceResult};

/// Absolute point in time by which an operation must finish
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Deadline(Instant);

impl Deadline {
    /// Deadline `duration` from now
    pub fn after(duration: Duration) -> Self {
        Self(Instant::now() + duration)
    }

    /// Deadline at a specific instant
    pub fn at(instant: Instant) -> Self {
        Self(instant)
    }

    pub fn instant(&self) -> Instant {
        self.0
    }

    pub fn is_expired(&self) -> bool {
        Instant::now() >= self.0
    }

    /// Time left before expiry (zero once expired)
    pub fn remaining(&self) -> Duration {
        self.0.saturating_duration_since(Instant::now())
    }

    /// Run a collaborator call under this deadline
    pub async fn run<F, T>(&self, what: &str, fut: F) -> GovernanceResult<T>
    where
        F: Future<Output = GovernanceResult<T>>,
    {
        match timeout_at(self.0, fut).await {
            Ok(result) => result,
            Err(_) => Err(GovernanceError::Timeout(what.to_string())),
        }
    }
}
