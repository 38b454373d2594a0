//! Inbound event delivery
//!
//! Waiters block on an [`EventQueue`] with an explicit timeout instead of
//! registering callbacks.

pub mod queue;

pub use queue::EventQueue;
