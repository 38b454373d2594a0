//! Parsers for SIP messages and their components, built on `nom`.

pub mod message;
pub mod uri;
pub mod utils;

pub use message::{frame_length, keepalive_prefix, parse_message, MAX_HEAD_SIZE};
pub use uri::parse_uri;
