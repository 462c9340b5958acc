//! Error taxonomy shared by every stage.

use thiserror::Error;

/// Errors surfaced by the simulation core.
///
/// Every public operation validates its rules and inputs before touching
/// any output buffer, so an error never comes with a partial result.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum PlanetError {
    /// A rule field is missing, out of range or inconsistent with another.
    #[error("invalid configuration: {0}")]
    InvalidConfiguration(String),
    /// A supplied grid does not match the configured shape or holds bad values.
    #[error("invalid input: {0}")]
    InvalidInput(String),
    /// The algorithm cannot satisfy one of its own preconditions.
    #[error("core invariant violated: {0}")]
    CoreInvariantViolation(String),
}

pub type Result<T> = std::result::Result<T, PlanetError>;

/// Shorthand for rule validation failures.
pub(crate) fn invalid_config(msg: impl Into<String>) -> PlanetError {
    PlanetError::InvalidConfiguration(msg.into())
}

pub(crate) fn invalid_input(msg: impl Into<String>) -> PlanetError {
    PlanetError::InvalidInput(msg.into())
}

pub(crate) fn invariant(msg: impl Into<String>) -> PlanetError {
    PlanetError::CoreInvariantViolation(msg.into())
}
