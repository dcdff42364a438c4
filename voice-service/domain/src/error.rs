use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum DomainError {
    #[error("clip download failed: {message}")]
    TransportFetch { message: String },

    #[error("scratch storage error: {message}")]
    Storage { message: String },

    #[error("decode failed: {message}")]
    Decode { message: String },

    #[error("transform failed: {message}")]
    Transform { message: String },

    #[error("not enough samples to analyse: need {required}, got {actual}")]
    InsufficientSamples { required: usize, actual: usize },

    #[error("{stage} exceeded the time limit")]
    Timeout { stage: String },

    #[error("encode failed: {message}")]
    Encode { message: String },

    #[error("delivery failed: {message}")]
    TransportSend { message: String },

    #[error("validation error: {message}")]
    Validation { message: String },

    #[error("internal error: {message}")]
    Internal { message: String },
}

impl DomainError {
    pub fn transport_fetch(message: impl Into<String>) -> Self {
        Self::TransportFetch {
            message: message.into(),
        }
    }

    pub fn storage(message: impl Into<String>) -> Self {
        Self::Storage {
            message: message.into(),
        }
    }

    pub fn decode(message: impl Into<String>) -> Self {
        Self::Decode {
            message: message.into(),
        }
    }

    pub fn transform(message: impl Into<String>) -> Self {
        Self::Transform {
            message: message.into(),
        }
    }

    pub fn timeout(stage: impl Into<String>) -> Self {
        Self::Timeout {
            stage: stage.into(),
        }
    }

    pub fn encode(message: impl Into<String>) -> Self {
        Self::Encode {
            message: message.into(),
        }
    }

    pub fn transport_send(message: impl Into<String>) -> Self {
        Self::TransportSend {
            message: message.into(),
        }
    }

    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation {
            message: message.into(),
        }
    }

    pub fn internal_error(message: impl Into<String>) -> Self {
        Self::Internal {
            message: message.into(),
        }
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            DomainError::TransportFetch { .. } => ErrorKind::TransportFetch,
            DomainError::Storage { .. } => ErrorKind::Storage,
            DomainError::Decode { .. } => ErrorKind::Decode,
            DomainError::Transform { .. } => ErrorKind::Transform,
            DomainError::InsufficientSamples { .. } => ErrorKind::InsufficientSamples,
            DomainError::Timeout { .. } => ErrorKind::Timeout,
            DomainError::Encode { .. } => ErrorKind::Encode,
            DomainError::TransportSend { .. } => ErrorKind::TransportSend,
            DomainError::Validation { .. } => ErrorKind::Validation,
            DomainError::Internal { .. } => ErrorKind::Internal,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    TransportFetch,
    Storage,
    Decode,
    Transform,
    InsufficientSamples,
    Timeout,
    Encode,
    TransportSend,
    Validation,
    Internal,
}

impl ErrorKind {
    pub fn as_str(self) -> &'static str {
        match self {
            ErrorKind::TransportFetch => "transport_fetch",
            ErrorKind::Storage => "storage",
            ErrorKind::Decode => "decode",
            ErrorKind::Transform => "transform",
            ErrorKind::InsufficientSamples => "insufficient_samples",
            ErrorKind::Timeout => "timeout",
            ErrorKind::Encode => "encode",
            ErrorKind::TransportSend => "transport_send",
            ErrorKind::Validation => "validation",
            ErrorKind::Internal => "internal",
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
