// fusion_core/src/error.rs

use thiserror::Error;

/// Conditions the state core reports instead of silently absorbing.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum StateError {
    /// A timestamp did not move strictly forward. Usually an out-of-order
    /// measurement or a clock problem upstream.
    #[error("non-monotonic timestamp: current time is {current}, requested {requested}")]
    NonMonotonicTime { current: f64, requested: f64 },

    #[error("quaternion `{field}` is not unit length (norm = {norm})")]
    NonUnitQuaternion { field: &'static str, norm: f64 },

    #[error("error covariance is not symmetric (max |P - P^T| = {max_asymmetry})")]
    AsymmetricCovariance { max_asymmetry: f64 },

    #[error("error covariance is not positive semi-definite")]
    CovarianceNotPositiveSemiDefinite,

    #[error("state field `{field}` contains a non-finite value")]
    NonFinite { field: &'static str },
}

/// Failures while loading an initial state configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to extract initial state configuration: {0}")]
    Extract(#[from] Box<figment::Error>),

    #[error("invalid initial state configuration: {0}")]
    Invalid(String),
}

impl From<figment::Error> for ConfigError {
    fn from(err: figment::Error) -> Self {
        ConfigError::Extract(Box::new(err))
    }
}
