use super::state::FlowKind;
use crate::decode::DecodeError;
use crate::session::StorageError;
use crate::transport::TransportError;
use thiserror::Error;

pub const MIN_PASSWORD_LEN: usize = 8;

/// Problems caught before anything is sent.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("{0} is required.")]
    MissingField(&'static str),
    #[error("Passwords do not match.")]
    PasswordMismatch,
    #[error("Password must be at least {min} characters long.")]
    PasswordTooShort { min: usize },
    #[error("Missing reset token. Please restart the reset flow.")]
    MissingRecoveryContext,
}

#[derive(Debug, Error)]
pub enum AuthError {
    #[error("A {0} request is already in progress.")]
    Busy(FlowKind),
    #[error(transparent)]
    Validation(#[from] ValidationError),
    #[error(transparent)]
    Decode(#[from] DecodeError),
    #[error(transparent)]
    Transport(#[from] TransportError),
    #[error("Failed to update session: {0}")]
    Storage(#[from] StorageError),
    #[error("{message}")]
    Application { status: u16, message: String },
}

pub(crate) fn require(value: &str, field: &'static str) -> Result<(), ValidationError> {
    if value.trim().is_empty() {
        return Err(ValidationError::MissingField(field));
    }
    Ok(())
}
