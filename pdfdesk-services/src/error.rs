use std::fmt;

use thiserror::Error;

/// Which remote service a failure came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Service {
    Translation,
    Summarization,
}

impl fmt::Display for Service {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Service::Translation => f.write_str("Translation"),
            Service::Summarization => f.write_str("Summarization"),
        }
    }
}

/// Failure of a translation or summarization request.
///
/// The display strings are what a front end shows the user verbatim.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ServiceError {
    /// The request was rejected before anything was sent.
    #[error("{0}")]
    Validation(String),

    #[error("{0} timeout")]
    Timeout(Service),

    #[error("HTTP Error: {0}")]
    Http(u16),

    /// The service answered, but not with a usable result.
    #[error("{0}")]
    Payload(String),

    #[error("Error: {0}")]
    Transport(String),
}

impl ServiceError {
    pub(crate) fn validation(message: impl Into<String>) -> Self {
        ServiceError::Validation(message.into())
    }

    pub(crate) fn from_reqwest(service: Service, err: reqwest::Error) -> Self {
        if err.is_timeout() {
            ServiceError::Timeout(service)
        } else if let Some(status) = err.status() {
            ServiceError::Http(status.as_u16())
        } else if err.is_decode() {
            ServiceError::Payload(format!("{service} service returned malformed data"))
        } else {
            ServiceError::Transport(err.to_string())
        }
    }
}

pub type Result<T> = std::result::Result<T, ServiceError>;
