//! Delivery setup errors
//!
//! Delivery itself never errors: every attempt ends in a
//! `DeliveryOutcome`. These cover building a target.

use thiserror::Error;

pub type DeliveryResult<T> = Result<T, DeliveryError>;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DeliveryError {
    #[error("invalid target configuration: {0}")]
    InvalidConfig(String),

    #[error("credential environment variable '{0}' is not set")]
    MissingCredential(String),

    #[error("failed to build http client: {0}")]
    Client(String),
}

impl DeliveryError {
    pub fn code(&self) -> &'static str {
        match self {
            DeliveryError::InvalidConfig(_) => "DELIVERY_INVALID_CONFIG",
            DeliveryError::MissingCredential(_) => "DELIVERY_MISSING_CREDENTIAL",
            DeliveryError::Client(_) => "DELIVERY_CLIENT",
        }
    }
}
