#![allow(dead_code)]

use std::time::Duration;

use sipunit::prelude::*;

/// Wait used for exchanges that complete over loopback
pub const WAIT: Duration = Duration::from_secs(2);

/// Wait for something that must not happen
pub fn short() -> Duration {
    Duration::from_millis(200)
}

pub fn unique_name(prefix: &str) -> String {
    format!("{}-{}", prefix, uuid::Uuid::new_v4().simple())
}

pub fn stack_config(prefix: &str, protocol: TransportType) -> StackConfig {
    StackConfig::new(unique_name(prefix))
        .with_protocol(protocol)
        .with_port(0)
        .with_timers(Duration::from_millis(100), Duration::from_millis(400))
        .with_default_timeout(WAIT)
}

/// A stack on an ephemeral loopback UDP port
pub async fn udp_stack(prefix: &str) -> SipStack {
    sipunit::init_test_logging();
    SipStack::new(stack_config(prefix, TransportType::Udp))
        .await
        .expect("bind test stack")
}

pub async fn tcp_stack(prefix: &str) -> SipStack {
    sipunit::init_test_logging();
    SipStack::new(stack_config(prefix, TransportType::Tcp))
        .await
        .expect("bind test stack")
}

pub fn phone(stack: &SipStack, user: &str) -> SipPhone {
    stack
        .create_phone(PhoneConfig::new(format!("sip:{}@127.0.0.1", user)))
        .expect("create phone")
}
