use thiserror::Error;

use crate::transaction::TransactionKey;

/// Result type for transaction operations
pub type TransactionResult<T> = Result<T, TransactionError>;

/// Errors raised by the transaction tracker
#[derive(Error, Debug)]
pub enum TransactionError {
    /// The transport rejected the message
    #[error("Failed to send {what}: {source}")]
    Send {
        what: String,
        #[source]
        source: sipunit_sip_transport::Error,
    },

    /// No transaction with this key
    #[error("Transaction not found: {0}")]
    NotFound(TransactionKey),

    /// A final response was already sent on this server transaction
    #[error("Final response already sent on transaction {0}")]
    DuplicateFinalResponse(TransactionKey),

    /// The request has no Via branch to key a transaction on
    #[error("Request has no Via branch parameter")]
    MissingBranch,

    /// The request cannot start a transaction (ACK)
    #[error("Invalid request: {0}")]
    InvalidRequest(String),
}
