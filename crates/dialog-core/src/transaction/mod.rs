//! SIP transaction correlation (RFC 3261 Section 17)
//!
//! Client transactions are keyed by the top Via branch of the request and
//! the CSeq method; server transactions use the same pair from the received
//! request. ACK to a non-2xx final is matched to its INVITE server
//! transaction, ACK to a 2xx is not a transaction at all and is sent with
//! [`TransactionTracker::send_stateless`].

pub mod key;
pub mod timer;
pub mod tracker;

pub use key::TransactionKey;
pub use timer::TimerSettings;
pub use tracker::{ServerRequestOutcome, TransactionTracker};

use std::fmt;

use serde::{Deserialize, Serialize};

/// Lifecycle of a tracked transaction
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TransactionState {
    /// Request sent or received, nothing answered yet
    Trying,
    /// A provisional response was exchanged
    Proceeding,
    /// A final response was exchanged
    Completed,
    /// Finished (2xx to INVITE, or ACK absorbed)
    Terminated,
    /// No final response before Timer B/F fired
    TimedOut,
    /// The transport failed while retransmitting
    Errored,
}

impl TransactionState {
    /// Whether a final response has already been exchanged
    pub fn has_final_response(&self) -> bool {
        matches!(self, TransactionState::Completed | TransactionState::Terminated)
    }
}

impl fmt::Display for TransactionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            TransactionState::Trying => "Trying",
            TransactionState::Proceeding => "Proceeding",
            TransactionState::Completed => "Completed",
            TransactionState::Terminated => "Terminated",
            TransactionState::TimedOut => "TimedOut",
            TransactionState::Errored => "Errored",
        };
        f.write_str(name)
    }
}
