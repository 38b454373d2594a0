//! Transaction tracking and dialog management for the sipunit harness
//!
//! - [`transaction`]: client/server transaction correlation with RFC 3261
//!   retransmission and timeout timers
//! - [`dialog`] and [`manager`]: dialog state, keyed by Call-ID and tags,
//!   and construction of in-dialog requests
//! - [`events`]: the timeout-bounded [`EventQueue`] that responses and
//!   inbound requests are delivered through

pub mod dialog;
pub mod errors;
pub mod events;
pub mod manager;
pub mod transaction;

pub use dialog::{Dialog, DialogId, DialogState};
pub use errors::{DialogError, DialogResult, TransactionError, TransactionResult};
pub use events::EventQueue;
pub use manager::{DialogManager, LocalEndpoint};
pub use transaction::{
    ServerRequestOutcome, TimerSettings, TransactionKey, TransactionState, TransactionTracker,
};
