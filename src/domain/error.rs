use thiserror::Error;

#[derive(Debug, Error)]
pub enum DomainError {
    #[error("invalid duration `{input}`: {reason}")]
    InvalidDuration { input: String, reason: String },
    #[error("invalid date `{input}`: {reason}")]
    InvalidDate { input: String, reason: String },
}

impl DomainError {
    pub fn invalid_duration(input: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidDuration {
            input: input.into(),
            reason: reason.into(),
        }
    }

    pub fn invalid_date(input: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidDate {
            input: input.into(),
            reason: reason.into(),
        }
    }
}
