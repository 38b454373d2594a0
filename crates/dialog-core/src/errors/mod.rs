//! Error types for dialog-core
//!
//! Dialog errors cover state and protocol violations inside a dialog;
//! transaction errors cover sending and correlating messages.

pub mod dialog_errors;
pub mod transaction_errors;

pub use dialog_errors::{DialogError, DialogResult};
pub use transaction_errors::{TransactionError, TransactionResult};
