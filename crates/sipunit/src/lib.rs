//! # sipunit
//!
//! Simulated SIP user agents for protocol tests.
//!
//! A [`SipStack`] binds one UDP, TCP or TLS socket. Phones created on it
//! ([`SipPhone`]) send and receive requests through that socket with real
//! transaction and dialog handling, and every wait takes an explicit
//! timeout. On top of the raw request/response API sit two helpers:
//!
//! - [`SipCall`]: the INVITE/ACK/BYE state machine, usable from either side
//! - [`EventSubscriber`] and [`EventNotifier`]: SUBSCRIBE/NOTIFY
//!
//! Every phone, call and subscription remembers the outcome of its last
//! operation ([`LastOperation`]), so a test can assert on why a wait
//! returned nothing.
//!
//! ```rust,no_run
//! use std::time::Duration;
//! use sipunit::prelude::*;
//!
//! # async fn demo() -> sipunit::SipUnitResult<()> {
//! let stack = SipStack::new(StackConfig::new("demo").with_port(0)).await?;
//! let alice = stack.create_phone(PhoneConfig::new("sip:alice@127.0.0.1"))?;
//! let bob = stack.create_phone(PhoneConfig::new("sip:bob@127.0.0.1"))?;
//!
//! let mut call = alice.create_call();
//! call.initiate_outgoing_call(&stack.sip_uri("bob"), None).await?;
//! let mut incoming = bob.wait_for_incoming_call(Duration::from_secs(1)).await.unwrap();
//! incoming.send_incoming_call_response(200, None, 0).await?;
//! call.wait_outgoing_call_response(Duration::from_secs(1)).await;
//! assert_eq!(call.state(), CallState::Confirmed);
//!
//! stack.dispose().await;
//! # Ok(())
//! # }
//! ```

pub mod assertions;
pub mod call;
pub mod config;
pub mod error;
pub mod logging;
pub mod operation;
pub mod phone;
pub mod queue;
mod resolve;
pub mod stack;
pub mod subscription;

pub use call::{CallState, SipCall};
pub use config::{PhoneConfig, StackConfig, TimerConfig};
pub use error::{ErrorKind, SipUnitError, SipUnitResult};
pub use logging::{init_test_logging, setup_logging, LoggingConfig};
pub use operation::{HasLastOperation, LastOperation, OperationRecord, Outcome};
pub use phone::{ReplyOptions, RequestEvent, SipPhone};
pub use queue::EventQueue;
pub use stack::{stack_name_in_use, SipStack};
pub use subscription::{EventNotifier, EventSubscriber};

pub use sipunit_dialog_core::{Dialog, DialogId, DialogState, TransactionKey};
pub use sipunit_sip_transport::{TlsSettings, TransportType};

/// Everything a test usually needs in one import
pub mod prelude {
    pub use crate::assertions::*;
    pub use crate::{
        CallState, EventNotifier, EventSubscriber, HasLastOperation, PhoneConfig, ReplyOptions,
        RequestEvent, SipCall, SipPhone, SipStack, SipUnitError, SipUnitResult, StackConfig,
        TransportType,
    };
    pub use sipunit_sip_core::prelude::{
        Address, Event, HeaderAccess, Message, Method, Request, Response, SimpleRequestBuilder,
        SimpleResponseBuilder, StatusCode, SubscriptionState, Uri,
    };
}
