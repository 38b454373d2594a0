//! # sipunit-sip-core
//!
//! SIP message model, parser and builders used by the sipunit harness.
//!
//! - [`types`]: URIs, name-addrs, typed header values, [`Request`],
//!   [`Response`] and [`Message`]
//! - [`parser`]: `nom` based wire parser plus stream framing
//! - [`builder`]: fluent request/response builders
//!
//! ```rust
//! use sipunit_sip_core::prelude::*;
//!
//! let request = SimpleRequestBuilder::new(Method::Options, "sip:bob@127.0.0.1:5060")
//!     .unwrap()
//!     .from("", "sip:alice@127.0.0.1", Some("abc"))
//!     .to("", "sip:bob@127.0.0.1", None)
//!     .call_id("call-1")
//!     .cseq(1)
//!     .via("127.0.0.1:5070", "UDP", Some("z9hG4bK1"))
//!     .build()
//!     .unwrap();
//!
//! let parsed = parse_message(&<Message as From<Request>>::from(request).to_bytes()).unwrap();
//! assert_eq!(parsed.call_id(), Some("call-1"));
//! ```

pub mod builder;
pub mod error;
pub mod parser;
pub mod types;

pub use builder::{SimpleRequestBuilder, SimpleResponseBuilder};
pub use error::{Error, Result};
pub use parser::{frame_length, parse_message, parse_uri};
pub use types::*;

/// Commonly used types in one import
pub mod prelude {
    pub use crate::builder::{SimpleRequestBuilder, SimpleResponseBuilder};
    pub use crate::error::{Error, Result};
    pub use crate::parser::parse_message;
    pub use crate::types::{
        generate_branch, generate_call_id, generate_tag, Address, CSeq, Event, HeaderAccess,
        HeaderName, Headers, Message, Method, Param, Request, Response, StatusCode, SubState,
        SubscriptionState, Uri, Via,
    };
}
