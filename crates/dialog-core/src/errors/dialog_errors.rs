use thiserror::Error;

use crate::dialog::DialogId;

/// Result type for dialog operations
pub type DialogResult<T> = Result<T, DialogError>;

/// Errors raised by the dialog layer
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DialogError {
    /// The operation is not valid in the dialog's current state
    #[error("Invalid dialog state: {message}")]
    InvalidState { message: String },

    /// The peer violated dialog rules (CSeq ordering, missing headers)
    #[error("Protocol error: {message}")]
    Protocol { message: String },

    /// No dialog matches the given id or message
    #[error("Dialog not found: {id}")]
    NotFound { id: String },

    /// A confirmed dialog was given a different remote tag
    #[error("Tag mismatch: dialog has {expected}, got {actual}")]
    TagMismatch { expected: String, actual: String },

    /// A message could not be built
    #[error("Failed to build message: {0}")]
    Build(#[from] sipunit_sip_core::Error),
}

impl DialogError {
    pub fn invalid_state(message: impl Into<String>) -> Self {
        DialogError::InvalidState { message: message.into() }
    }

    pub fn protocol_error(message: impl Into<String>) -> Self {
        DialogError::Protocol { message: message.into() }
    }

    pub fn dialog_not_found(id: &DialogId) -> Self {
        DialogError::NotFound { id: id.to_string() }
    }
}
