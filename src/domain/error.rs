use thiserror::Error;

#[derive(Debug, Error)]
pub enum DomainError {
    #[error("invalid document name `{name}`: {reason}")]
    InvalidName { name: String, reason: &'static str },
    #[error("domain invariant violated: {message}")]
    Invariant { message: String },
}

impl DomainError {
    pub fn invalid_name(name: impl Into<String>, reason: &'static str) -> Self {
        Self::InvalidName {
            name: name.into(),
            reason,
        }
    }

    pub fn invariant(message: impl Into<String>) -> Self {
        Self::Invariant {
            message: message.into(),
        }
    }
}
