//! Domain error model.

use thiserror::Error;

/// Deterministic identity failure.
///
/// Remote and infrastructure failures are modelled separately (see
/// `insightforge-invoke::InvocationError`).
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum DomainError {
    /// An identifier was invalid (e.g. parse failure).
    #[error("invalid identifier: {0}")]
    InvalidId(String),
}

impl DomainError {
    pub fn invalid_id(msg: impl Into<String>) -> Self {
        Self::InvalidId(msg.into())
    }
}
