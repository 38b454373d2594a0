//! Stack and phone configuration
//!
//! Both types start from sensible defaults and are adjusted with `with_*`
//! setters:
//!
//! ```rust
//! use sipunit::config::{PhoneConfig, StackConfig};
//! use sipunit_sip_transport::TransportType;
//!
//! let stack = StackConfig::new("uac")
//!     .with_protocol(TransportType::Tcp)
//!     .with_port(0);
//! assert_eq!(stack.bind_addr().unwrap().port(), 0);
//!
//! let phone = PhoneConfig::new("sip:amit@nist.gov").with_loopback(true);
//! assert!(phone.loopback);
//! ```
//!
//! [`StackConfig::from_env`] and [`StackConfig::from_json_file`] load the
//! same settings from `SIPUNIT_*` variables or a JSON document.

use std::env;
use std::net::{IpAddr, SocketAddr};
use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use sipunit_dialog_core::TimerSettings;
use sipunit_sip_transport::{TlsSettings, TransportType};

use crate::error::{SipUnitError, SipUnitResult};

/// Stack name used when none is configured
pub const DEFAULT_STACK_NAME: &str = "sipunit";
/// Wait applied by operations that block without an explicit timeout
pub const DEFAULT_TIMEOUT_MS: u64 = 5000;

/// RFC 3261 base timers in milliseconds
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TimerConfig {
    pub t1_ms: u64,
    pub t2_ms: u64,
}

impl Default for TimerConfig {
    fn default() -> Self {
        let defaults = TimerSettings::default();
        TimerConfig {
            t1_ms: defaults.t1.as_millis() as u64,
            t2_ms: defaults.t2.as_millis() as u64,
        }
    }
}

impl TimerConfig {
    pub fn to_settings(&self) -> TimerSettings {
        TimerSettings::new(Duration::from_millis(self.t1_ms), Duration::from_millis(self.t2_ms))
    }
}

/// Configuration of one [`SipStack`](crate::SipStack)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StackConfig {
    /// Process-unique stack name
    pub name: String,
    pub protocol: TransportType,
    /// Local interface to bind
    pub bind_host: String,
    /// Local port; 0 picks an ephemeral one
    pub port: u16,
    /// Host written into Via and Contact; derived from `bind_host` when unset
    pub public_host: Option<String>,
    /// Required when `protocol` is TLS
    pub tls: Option<TlsSettings>,
    pub timers: TimerConfig,
    /// Capacity of the transport event channel
    pub channel_capacity: Option<usize>,
    /// Default for phones that do not set their own
    pub default_timeout_ms: u64,
}

impl Default for StackConfig {
    fn default() -> Self {
        StackConfig {
            name: DEFAULT_STACK_NAME.to_string(),
            protocol: TransportType::Udp,
            bind_host: "127.0.0.1".to_string(),
            port: 5060,
            public_host: None,
            tls: None,
            timers: TimerConfig::default(),
            channel_capacity: None,
            default_timeout_ms: DEFAULT_TIMEOUT_MS,
        }
    }
}

impl StackConfig {
    /// Default configuration under `name`
    pub fn new(name: impl Into<String>) -> Self {
        StackConfig {
            name: name.into(),
            ..Default::default()
        }
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    pub fn with_protocol(mut self, protocol: TransportType) -> Self {
        self.protocol = protocol;
        self
    }

    pub fn with_bind_host(mut self, host: impl Into<String>) -> Self {
        self.bind_host = host.into();
        self
    }

    pub fn with_port(mut self, port: u16) -> Self {
        self.port = port;
        self
    }

    pub fn with_public_host(mut self, host: impl Into<String>) -> Self {
        self.public_host = Some(host.into());
        self
    }

    pub fn with_tls(mut self, tls: TlsSettings) -> Self {
        self.tls = Some(tls);
        self
    }

    pub fn with_timers(mut self, t1: Duration, t2: Duration) -> Self {
        self.timers = TimerConfig {
            t1_ms: t1.as_millis() as u64,
            t2_ms: t2.as_millis() as u64,
        };
        self
    }

    pub fn with_channel_capacity(mut self, capacity: usize) -> Self {
        self.channel_capacity = Some(capacity);
        self
    }

    pub fn with_default_timeout(mut self, timeout: Duration) -> Self {
        self.default_timeout_ms = timeout.as_millis() as u64;
        self
    }

    /// Reads overrides from `SIPUNIT_STACK_NAME`, `SIPUNIT_PROTOCOL`,
    /// `SIPUNIT_HOST`, `SIPUNIT_PORT` and `SIPUNIT_TIMEOUT_MS` on top of the
    /// defaults
    pub fn from_env() -> SipUnitResult<Self> {
        let mut config = StackConfig::default();

        if let Ok(name) = env::var("SIPUNIT_STACK_NAME") {
            config.name = name;
        }
        if let Ok(protocol) = env::var("SIPUNIT_PROTOCOL") {
            config.protocol = protocol.parse().map_err(|_| {
                SipUnitError::configuration(format!(
                    "SIPUNIT_PROTOCOL: unknown protocol '{}'",
                    protocol
                ))
            })?;
        }
        if let Ok(host) = env::var("SIPUNIT_HOST") {
            config.bind_host = host;
        }
        if let Ok(port) = env::var("SIPUNIT_PORT") {
            config.port = port.parse().map_err(|_| {
                SipUnitError::configuration(format!("SIPUNIT_PORT: '{}' is not a port", port))
            })?;
        }
        if let Ok(timeout) = env::var("SIPUNIT_TIMEOUT_MS") {
            config.default_timeout_ms = timeout.parse().map_err(|_| {
                SipUnitError::configuration(format!(
                    "SIPUNIT_TIMEOUT_MS: '{}' is not a number",
                    timeout
                ))
            })?;
        }

        config.validate()?;
        Ok(config)
    }

    /// Loads a JSON document; missing fields keep their defaults
    pub fn from_json_file(path: impl AsRef<Path>) -> SipUnitResult<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|e| {
            SipUnitError::configuration(format!("cannot read {}: {}", path.display(), e))
        })?;
        let config: StackConfig = serde_json::from_str(&content)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> SipUnitResult<()> {
        if self.name.trim().is_empty() {
            return Err(SipUnitError::configuration("stack name must not be empty"));
        }
        if self.protocol == TransportType::Tls && self.tls.is_none() {
            return Err(SipUnitError::configuration("TLS stacks need certificate settings"));
        }
        if self.timers.t1_ms == 0 || self.timers.t2_ms < self.timers.t1_ms {
            return Err(SipUnitError::configuration(format!(
                "timers must satisfy 0 < T1 <= T2 (T1={}ms, T2={}ms)",
                self.timers.t1_ms, self.timers.t2_ms
            )));
        }
        self.bind_addr().map(|_| ())
    }

    /// Socket address the transport binds to
    pub fn bind_addr(&self) -> SipUnitResult<SocketAddr> {
        let ip: IpAddr = self.bind_host.parse().map_err(|_| {
            SipUnitError::configuration(format!(
                "bind host '{}' is not an IP address",
                self.bind_host
            ))
        })?;
        Ok(SocketAddr::new(ip, self.port))
    }

    /// Host advertised in Via and Contact headers
    pub fn advertised_host(&self) -> String {
        if let Some(host) = &self.public_host {
            return host.clone();
        }
        match self.bind_host.parse::<IpAddr>() {
            Ok(ip) if ip.is_unspecified() => "127.0.0.1".to_string(),
            _ => self.bind_host.clone(),
        }
    }

    pub fn default_timeout(&self) -> Duration {
        Duration::from_millis(self.default_timeout_ms)
    }
}

/// Configuration of one [`SipPhone`](crate::SipPhone)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PhoneConfig {
    /// Address of record, e.g. `sip:amit@nist.gov`
    pub uri: String,
    /// Send to 127.0.0.1 when a target host is a name rather than an IP
    #[serde(default)]
    pub loopback: bool,
    #[serde(default)]
    pub display_name: Option<String>,
    /// Overrides the stack's default timeout
    #[serde(default)]
    pub default_timeout_ms: Option<u64>,
}

impl PhoneConfig {
    pub fn new(uri: impl Into<String>) -> Self {
        PhoneConfig {
            uri: uri.into(),
            loopback: false,
            display_name: None,
            default_timeout_ms: None,
        }
    }

    pub fn with_loopback(mut self, loopback: bool) -> Self {
        self.loopback = loopback;
        self
    }

    pub fn with_display_name(mut self, name: impl Into<String>) -> Self {
        self.display_name = Some(name.into());
        self
    }

    pub fn with_default_timeout(mut self, timeout: Duration) -> Self {
        self.default_timeout_ms = Some(timeout.as_millis() as u64);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = StackConfig::default();
        assert_eq!(config.name, DEFAULT_STACK_NAME);
        assert_eq!(config.protocol, TransportType::Udp);
        assert_eq!(config.timers.t1_ms, 500);
        assert_eq!(config.timers.t2_ms, 4000);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_advertised_host() {
        let config = StackConfig::new("a").with_bind_host("0.0.0.0");
        assert_eq!(config.advertised_host(), "127.0.0.1");

        let config = config.with_public_host("sip.example.com");
        assert_eq!(config.advertised_host(), "sip.example.com");
    }

    #[test]
    fn test_validation() {
        assert!(StackConfig::new("  ").validate().is_err());
        assert!(StackConfig::new("a").with_bind_host("localhost").validate().is_err());
        assert!(StackConfig::new("a")
            .with_protocol(TransportType::Tls)
            .validate()
            .is_err());
        assert!(StackConfig::new("a")
            .with_timers(Duration::from_millis(500), Duration::from_millis(100))
            .validate()
            .is_err());
    }

    #[test]
    fn test_partial_json() {
        let config: StackConfig =
            serde_json::from_str(r#"{"name":"json","protocol":"tcp","port":0}"#).unwrap();
        assert_eq!(config.name, "json");
        assert_eq!(config.protocol, TransportType::Tcp);
        assert_eq!(config.bind_host, "127.0.0.1");
        assert_eq!(config.default_timeout_ms, DEFAULT_TIMEOUT_MS);
    }

    #[test]
    fn test_timer_settings() {
        let settings = TimerConfig { t1_ms: 20, t2_ms: 80 }.to_settings();
        assert_eq!(settings.t1, Duration::from_millis(20));
        assert_eq!(settings.transaction_timeout(), Duration::from_millis(20 * 64));
    }
}
