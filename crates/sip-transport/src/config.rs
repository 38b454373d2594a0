use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// Certificate material for a TLS transport
///
/// The same certificate serves both the listening side and, when `ca_path`
/// is set, verification of the peers this transport connects to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TlsSettings {
    /// PEM certificate chain presented to peers
    pub cert_path: PathBuf,
    /// PEM private key (PKCS#8 or RSA)
    pub key_path: PathBuf,
    /// PEM CA bundle used to verify servers we connect to
    #[serde(default)]
    pub ca_path: Option<PathBuf>,
    /// Name to verify on outgoing connections; the peer IP when unset
    #[serde(default)]
    pub server_name: Option<String>,
}

impl TlsSettings {
    pub fn new(cert_path: impl Into<PathBuf>, key_path: impl Into<PathBuf>) -> Self {
        TlsSettings {
            cert_path: cert_path.into(),
            key_path: key_path.into(),
            ca_path: None,
            server_name: None,
        }
    }

    pub fn with_ca(mut self, ca_path: impl Into<PathBuf>) -> Self {
        self.ca_path = Some(ca_path.into());
        self
    }

    pub fn with_server_name(mut self, name: impl Into<String>) -> Self {
        self.server_name = Some(name.into());
        self
    }
}
