//! SIP message model: URIs, addresses, typed header values, requests and
//! responses.

pub mod address;
pub mod cseq;
pub mod event;
pub mod headers;
pub mod method;
pub mod param;
pub mod sip_message;
pub mod sip_request;
pub mod sip_response;
pub mod status;
pub mod subscription_state;
pub mod uri;
pub mod via;

pub use address::Address;
pub use cseq::CSeq;
pub use event::Event;
pub use headers::{Header, HeaderAccess, HeaderName, Headers};
pub use method::Method;
pub use param::{Param, ParamList};
pub use sip_message::Message;
pub use sip_request::Request;
pub use sip_response::Response;
pub use status::StatusCode;
pub use subscription_state::{SubState, SubscriptionState};
pub use uri::{Scheme, Uri};
pub use via::{generate_branch, Via, BRANCH_MAGIC_COOKIE};

use rand::distributions::Alphanumeric;
use rand::Rng;

/// Random alphanumeric string of `len` characters
pub fn random_token(len: usize) -> String {
    rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(len)
        .map(char::from)
        .collect()
}

/// Fresh tag for From/To headers
pub fn generate_tag() -> String {
    random_token(10)
}

/// Fresh Call-ID, optionally qualified with a host
pub fn generate_call_id(host: Option<&str>) -> String {
    let id = uuid::Uuid::new_v4().simple().to_string();
    match host {
        Some(host) => format!("{}@{}", id, host),
        None => id,
    }
}
