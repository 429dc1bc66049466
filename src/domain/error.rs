use thiserror::Error;

#[derive(Debug, Error)]
pub enum DomainError {
    #[error("domain validation failed: {message}")]
    Validation { message: String },
}

impl DomainError {
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation {
            message: message.into(),
        }
    }

    /// Human-readable reason, safe to show to the submitter.
    pub fn public_reason(&self) -> &str {
        match self {
            Self::Validation { message } => message.as_str(),
        }
    }
}
