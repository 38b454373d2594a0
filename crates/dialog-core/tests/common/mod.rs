#![allow(dead_code)]

use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use parking_lot::Mutex;
use sipunit_sip_core::prelude::*;
use sipunit_sip_transport::{
    Error as TransportError, Result as TransportResult, Transport, TransportType,
};

/// Records every message instead of putting it on the wire
#[derive(Debug)]
pub struct MockTransport {
    transport_type: TransportType,
    sent: Mutex<Vec<(Message, SocketAddr)>>,
    fail_sends: AtomicBool,
    closed: AtomicBool,
}

impl MockTransport {
    pub fn new(transport_type: TransportType) -> Self {
        MockTransport {
            transport_type,
            sent: Mutex::new(Vec::new()),
            fail_sends: AtomicBool::new(false),
            closed: AtomicBool::new(false),
        }
    }

    pub fn udp() -> Self {
        Self::new(TransportType::Udp)
    }

    pub fn tcp() -> Self {
        Self::new(TransportType::Tcp)
    }

    pub fn fail_sends(&self, fail: bool) {
        self.fail_sends.store(fail, Ordering::SeqCst);
    }

    pub fn sent(&self) -> Vec<(Message, SocketAddr)> {
        self.sent.lock().clone()
    }

    pub fn sent_count(&self) -> usize {
        self.sent.lock().len()
    }

    pub fn last_sent(&self) -> Option<Message> {
        self.sent.lock().last().map(|(m, _)| m.clone())
    }
}

#[async_trait::async_trait]
impl Transport for MockTransport {
    fn local_addr(&self) -> TransportResult<SocketAddr> {
        Ok("127.0.0.1:5060".parse().unwrap())
    }

    fn transport_type(&self) -> TransportType {
        self.transport_type
    }

    async fn send_message(&self, message: Message, destination: SocketAddr) -> TransportResult<()> {
        if self.fail_sends.load(Ordering::SeqCst) {
            return Err(TransportError::SendFailed(
                destination,
                std::io::Error::new(std::io::ErrorKind::ConnectionRefused, "mock refused"),
            ));
        }
        self.sent.lock().push((message, destination));
        Ok(())
    }

    async fn close(&self) -> TransportResult<()> {
        self.closed.store(true, Ordering::SeqCst);
        Ok(())
    }

    fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }
}

/// Routes crate logs to the test output; `RUST_LOG` overrides the filter
pub fn init_logging() {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("sipunit_dialog_core=debug"));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_test_writer()
        .try_init();
}

pub fn peer() -> SocketAddr {
    "127.0.0.1:5070".parse().unwrap()
}

pub fn short() -> Duration {
    Duration::from_millis(100)
}

pub fn request(method: Method, branch: &str, seq: u32) -> Request {
    SimpleRequestBuilder::new(method, "sip:bob@127.0.0.1:5070")
        .unwrap()
        .from("Alice", "sip:alice@example.com", Some("alice-tag"))
        .to("Bob", "sip:bob@example.com", None)
        .call_id("dialog-core-test")
        .cseq(seq)
        .via("127.0.0.1:5060", "UDP", Some(branch))
        .contact("<sip:alice@127.0.0.1:5060>")
        .build()
        .unwrap()
}

pub fn response(request: &Request, status: StatusCode, to_tag: Option<&str>) -> Response {
    let mut builder = SimpleResponseBuilder::response_from_request(request, status, None)
        .contact("<sip:bob@127.0.0.1:5070>");
    if let Some(tag) = to_tag {
        builder = builder.to_tag(tag);
    }
    builder.build().unwrap()
}
