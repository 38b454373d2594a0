//! Error types for the harness
//!
//! Every public operation either returns a [`SipUnitError`] or records one
//! in the object's [`LastOperation`](crate::operation::LastOperation). The
//! [`ErrorKind`] groups variants so a test can assert on the category of a
//! failure without matching on its detail.

use serde::{Deserialize, Serialize};
use sipunit_dialog_core::{DialogError, TransactionError};
use thiserror::Error;

/// Result type for harness operations
pub type SipUnitResult<T> = Result<T, SipUnitError>;

/// Broad category of a failure
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ErrorKind {
    /// The test used the API wrongly (bad input, invalid transition)
    Programming,
    /// The network or a socket failed
    Transport,
    /// Nothing arrived within the allotted time
    Timeout,
    /// The peer broke a protocol rule
    Protocol,
    /// The stack or phone was configured wrongly
    Configuration,
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            ErrorKind::Programming => "programming",
            ErrorKind::Transport => "transport",
            ErrorKind::Timeout => "timeout",
            ErrorKind::Protocol => "protocol",
            ErrorKind::Configuration => "configuration",
        };
        f.write_str(name)
    }
}

/// Errors surfaced by stacks, phones, calls and subscriptions
#[derive(Error, Debug)]
pub enum SipUnitError {
    /// The operation is not valid in the object's current state
    #[error("Invalid state: {message}")]
    InvalidState { message: String },

    /// A header, URI or status code supplied by the test is malformed
    #[error("Malformed input: {0}")]
    MalformedHeader(#[from] sipunit_sip_core::Error),

    /// No socket address could be derived for a target
    #[error("Unreachable peer {target}: {reason}")]
    UnreachablePeer { target: String, reason: String },

    /// The transport refused or failed to carry a message
    #[error("Transport error: {message}")]
    Transport { message: String },

    /// A wait ran out
    #[error("Timed out after {timeout_ms}ms waiting for {what}")]
    Timeout { what: String, timeout_ms: u64 },

    /// A second final response was attempted on one transaction
    #[error("Final response already sent on {transaction}")]
    DuplicateFinalResponse { transaction: String },

    /// The peer sent something that violates the protocol
    #[error("Protocol error: {message}")]
    Protocol { message: String },

    /// Invalid stack or phone configuration
    #[error("Configuration error: {message}")]
    Configuration { message: String },

    /// Another live stack already uses this name
    #[error("A stack named '{name}' already exists")]
    DuplicateStackName { name: String },

    /// The phone or stack was disposed
    #[error("{what} has been disposed")]
    Disposed { what: String },
}

impl SipUnitError {
    pub fn invalid_state(message: impl Into<String>) -> Self {
        SipUnitError::InvalidState { message: message.into() }
    }

    pub fn protocol(message: impl Into<String>) -> Self {
        SipUnitError::Protocol { message: message.into() }
    }

    pub fn configuration(message: impl Into<String>) -> Self {
        SipUnitError::Configuration { message: message.into() }
    }

    pub fn transport(message: impl Into<String>) -> Self {
        SipUnitError::Transport { message: message.into() }
    }

    pub fn timeout(what: impl Into<String>, timeout: std::time::Duration) -> Self {
        SipUnitError::Timeout {
            what: what.into(),
            timeout_ms: timeout.as_millis() as u64,
        }
    }

    pub fn unreachable(target: impl Into<String>, reason: impl Into<String>) -> Self {
        SipUnitError::UnreachablePeer {
            target: target.into(),
            reason: reason.into(),
        }
    }

    pub fn disposed(what: impl Into<String>) -> Self {
        SipUnitError::Disposed { what: what.into() }
    }

    /// The category of this failure
    pub fn kind(&self) -> ErrorKind {
        match self {
            SipUnitError::InvalidState { .. }
            | SipUnitError::MalformedHeader(_)
            | SipUnitError::Disposed { .. } => ErrorKind::Programming,
            SipUnitError::UnreachablePeer { .. } | SipUnitError::Transport { .. } => {
                ErrorKind::Transport
            }
            SipUnitError::Timeout { .. } => ErrorKind::Timeout,
            SipUnitError::DuplicateFinalResponse { .. } | SipUnitError::Protocol { .. } => {
                ErrorKind::Protocol
            }
            SipUnitError::Configuration { .. } | SipUnitError::DuplicateStackName { .. } => {
                ErrorKind::Configuration
            }
        }
    }

    pub fn is_timeout(&self) -> bool {
        self.kind() == ErrorKind::Timeout
    }
}

impl From<DialogError> for SipUnitError {
    fn from(e: DialogError) -> Self {
        match e {
            DialogError::InvalidState { message } => SipUnitError::InvalidState { message },
            DialogError::NotFound { id } => {
                SipUnitError::invalid_state(format!("no dialog {}", id))
            }
            DialogError::Protocol { message } => SipUnitError::Protocol { message },
            tag @ DialogError::TagMismatch { .. } => SipUnitError::protocol(tag.to_string()),
            DialogError::Build(e) => SipUnitError::MalformedHeader(e),
        }
    }
}

impl From<TransactionError> for SipUnitError {
    fn from(e: TransactionError) -> Self {
        match e {
            TransactionError::Send { .. } => SipUnitError::transport(e.to_string()),
            TransactionError::NotFound(key) => {
                SipUnitError::invalid_state(format!("no transaction {}", key))
            }
            TransactionError::DuplicateFinalResponse(key) => SipUnitError::DuplicateFinalResponse {
                transaction: key.to_string(),
            },
            TransactionError::MissingBranch => SipUnitError::protocol(e.to_string()),
            TransactionError::InvalidRequest(message) => SipUnitError::InvalidState { message },
        }
    }
}

impl From<sipunit_sip_transport::Error> for SipUnitError {
    fn from(e: sipunit_sip_transport::Error) -> Self {
        use sipunit_sip_transport::Error as TransportError;
        match e {
            // A port already in use is a setup problem, not a network one
            TransportError::BindFailed(..)
            | TransportError::TlsCertificateError(_)
            | TransportError::UnsupportedTransport(_) => SipUnitError::configuration(e.to_string()),
            other => SipUnitError::transport(other.to_string()),
        }
    }
}

impl From<std::io::Error> for SipUnitError {
    fn from(e: std::io::Error) -> Self {
        SipUnitError::configuration(e.to_string())
    }
}

impl From<serde_json::Error> for SipUnitError {
    fn from(e: serde_json::Error) -> Self {
        SipUnitError::configuration(format!("invalid JSON configuration: {}", e))
    }
}
