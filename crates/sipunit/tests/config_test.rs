//! Environment and file based configuration

mod common;

use std::env;
use std::time::Duration;

use serial_test::serial;
use sipunit::config::{StackConfig, DEFAULT_STACK_NAME};
use sipunit::{ErrorKind, SipStack, TransportType};

const VARS: [&str; 5] = [
    "SIPUNIT_STACK_NAME",
    "SIPUNIT_PROTOCOL",
    "SIPUNIT_HOST",
    "SIPUNIT_PORT",
    "SIPUNIT_TIMEOUT_MS",
];

fn clear_env() {
    for var in VARS {
        env::remove_var(var);
    }
}

#[test]
#[serial]
fn test_from_env_defaults() {
    clear_env();
    let config = StackConfig::from_env().unwrap();
    assert_eq!(config.name, DEFAULT_STACK_NAME);
    assert_eq!(config.protocol, TransportType::Udp);
    assert_eq!(config.port, 5060);
}

#[test]
#[serial]
fn test_from_env_overrides() {
    clear_env();
    env::set_var("SIPUNIT_STACK_NAME", "env-stack");
    env::set_var("SIPUNIT_PROTOCOL", "tcp");
    env::set_var("SIPUNIT_PORT", "0");
    env::set_var("SIPUNIT_TIMEOUT_MS", "750");

    let config = StackConfig::from_env().unwrap();
    clear_env();

    assert_eq!(config.name, "env-stack");
    assert_eq!(config.protocol, TransportType::Tcp);
    assert_eq!(config.port, 0);
    assert_eq!(config.default_timeout(), Duration::from_millis(750));
}

#[test]
#[serial]
fn test_from_env_rejects_bad_values() {
    clear_env();
    env::set_var("SIPUNIT_PORT", "not-a-port");
    let err = StackConfig::from_env().unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Configuration);

    clear_env();
    env::set_var("SIPUNIT_PROTOCOL", "sctp");
    assert!(StackConfig::from_env().is_err());
    clear_env();
}

#[tokio::test]
async fn test_json_file_config_starts_stack() {
    let name = common::unique_name("json");
    let path = env::temp_dir().join(format!("{}.json", name));
    std::fs::write(
        &path,
        format!(
            r#"{{ "name": "{}", "protocol": "tcp", "port": 0, "timers": {{ "t1_ms": 50, "t2_ms": 200 }} }}"#,
            name
        ),
    )
    .unwrap();

    let config = StackConfig::from_json_file(&path).unwrap();
    std::fs::remove_file(&path).unwrap();
    assert_eq!(config.timers.t1_ms, 50);
    assert_eq!(config.bind_host, "127.0.0.1");

    let stack = SipStack::new(config).await.unwrap();
    assert_eq!(stack.protocol(), TransportType::Tcp);
    assert_ne!(stack.local_addr().port(), 0);
    stack.dispose().await;
}

#[test]
fn test_json_file_errors() {
    let missing = StackConfig::from_json_file("/nonexistent/sipunit.json").unwrap_err();
    assert_eq!(missing.kind(), ErrorKind::Configuration);

    let path = env::temp_dir().join(format!("{}.json", common::unique_name("bad-timers")));
    std::fs::write(&path, r#"{ "timers": { "t1_ms": 0 } }"#).unwrap();
    let err = StackConfig::from_json_file(&path).unwrap_err();
    std::fs::remove_file(&path).unwrap();
    assert_eq!(err.kind(), ErrorKind::Configuration);
}
