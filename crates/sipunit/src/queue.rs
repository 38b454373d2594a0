//! Per-phone inbound FIFO
//!
//! Each [`SipPhone`](crate::SipPhone) owns one queue of received requests.
//! The stack's listener pushes into it; calls, subscriptions and
//! [`SipPhone::wait_request`](crate::SipPhone::wait_request) pop from it
//! with a timeout. Responses use the same queue type, one per client
//! transaction, inside the transaction tracker.

pub use sipunit_dialog_core::events::EventQueue;
