//! Dialog manager
//!
//! Owns the dialogs of one user agent. Dialogs are created from the
//! responses that establish them, located again from the tags of later
//! messages, and used to build in-dialog requests.

pub mod core;

pub use self::core::{DialogManager, LocalEndpoint};
