use std::fmt;

use serde::{Deserialize, Serialize};

/// Dialog lifecycle (RFC 3261 Section 12)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DialogState {
    /// Created by a provisional response carrying a To tag
    Early,
    /// Created or confirmed by a 2xx
    Confirmed,
    /// Ended by BYE, a failure final, or explicit termination
    Terminated,
}

impl fmt::Display for DialogState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DialogState::Early => write!(f, "Early"),
            DialogState::Confirmed => write!(f, "Confirmed"),
            DialogState::Terminated => write!(f, "Terminated"),
        }
    }
}
