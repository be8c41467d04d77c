use std::fmt;

use thiserror::Error;

use crate::secrets::SecretError;

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum DomainError {
    #[error("invalid role `{value}`")]
    InvalidRole { value: String },
}

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum ApplicationError {
    #[error(transparent)]
    Domain(#[from] DomainError),
    #[error("persistence failure: {0}")]
    Persistence(String),
    #[error("integration failure: {0}")]
    Integration(String),
    #[error("configuration failure: {0}")]
    Configuration(String),
}

impl From<SecretError> for ApplicationError {
    fn from(value: SecretError) -> Self {
        Self::Integration(value.to_string())
    }
}

impl ApplicationError {
    pub fn class(&self) -> FailureClass {
        match self {
            Self::Domain(_) => FailureClass::Rejected,
            Self::Persistence(_) | Self::Integration(_) => FailureClass::Unavailable,
            Self::Configuration(_) => FailureClass::Internal,
        }
    }

    pub fn into_interface(self, correlation_id: impl Into<String>) -> InterfaceError {
        InterfaceError::new(self.class(), self.to_string(), correlation_id)
    }
}

/// How a failure is presented to the Slack user. Retrying helps only for
/// `Unavailable`.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FailureClass {
    Rejected,
    Unavailable,
    Internal,
}

impl fmt::Display for FailureClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Rejected => "rejected",
            Self::Unavailable => "unavailable",
            Self::Internal => "internal",
        })
    }
}

/// A failure ready to be reported back to chat. `detail` is for logs only;
/// users see [`InterfaceError::user_message`] and the correlation id.
#[derive(Clone, Debug, Error, PartialEq, Eq)]
#[error("{class} ({correlation_id}): {detail}")]
pub struct InterfaceError {
    pub class: FailureClass,
    pub detail: String,
    pub correlation_id: String,
}

impl InterfaceError {
    pub fn new(
        class: FailureClass,
        detail: impl Into<String>,
        correlation_id: impl Into<String>,
    ) -> Self {
        Self { class, detail: detail.into(), correlation_id: correlation_id.into() }
    }

    pub fn user_message(&self) -> &'static str {
        match self.class {
            FailureClass::Rejected => "That command could not be processed. Check it and try again.",
            FailureClass::Unavailable => {
                "Something went wrong while saving that. Please try again shortly."
            }
            FailureClass::Internal => "Something went wrong. Please contact an exec.",
        }
    }

    pub fn correlation_id(&self) -> &str {
        &self.correlation_id
    }
}
