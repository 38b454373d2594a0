use std::fs::File;
use std::io::BufReader;
use std::path::Path;
use std::sync::Arc;

use rustls::{Certificate, ClientConfig, PrivateKey, RootCertStore, ServerConfig};
use rustls_pemfile::{certs, pkcs8_private_keys, rsa_private_keys};

use crate::error::{Error, Result};

fn open(path: &Path) -> Result<BufReader<File>> {
    File::open(path)
        .map(BufReader::new)
        .map_err(|e| Error::TlsCertificateError(format!("{}: {}", path.display(), e)))
}

/// Loads every certificate in a PEM file
pub fn load_certs(path: &Path) -> Result<Vec<Certificate>> {
    let mut reader = open(path)?;
    let certs: Vec<Certificate> = certs(&mut reader)
        .map_err(|e| Error::TlsCertificateError(format!("{}: {}", path.display(), e)))?
        .into_iter()
        .map(Certificate)
        .collect();

    if certs.is_empty() {
        return Err(Error::TlsCertificateError(format!(
            "No certificates found in {}",
            path.display()
        )));
    }
    Ok(certs)
}

/// Loads the first PKCS#8 or RSA private key in a PEM file
pub fn load_private_key(path: &Path) -> Result<PrivateKey> {
    let mut reader = open(path)?;
    let keys = pkcs8_private_keys(&mut reader)
        .map_err(|e| Error::TlsCertificateError(format!("{}: {}", path.display(), e)))?;
    if let Some(key) = keys.into_iter().next() {
        return Ok(PrivateKey(key));
    }

    let mut reader = open(path)?;
    let keys = rsa_private_keys(&mut reader)
        .map_err(|e| Error::TlsCertificateError(format!("{}: {}", path.display(), e)))?;
    if let Some(key) = keys.into_iter().next() {
        return Ok(PrivateKey(key));
    }

    Err(Error::TlsCertificateError(format!(
        "No private key found in {}",
        path.display()
    )))
}

pub fn create_server_config(cert_path: &Path, key_path: &Path) -> Result<Arc<ServerConfig>> {
    let certs = load_certs(cert_path)?;
    let key = load_private_key(key_path)?;

    let config = ServerConfig::builder()
        .with_safe_defaults()
        .with_no_client_auth()
        .with_single_cert(certs, key)
        .map_err(|e| Error::TlsError(e.to_string()))?;

    Ok(Arc::new(config))
}

/// Client config trusting only the given CA bundle
pub fn create_client_config(ca_path: Option<&Path>) -> Result<Arc<ClientConfig>> {
    let mut root_store = RootCertStore::empty();
    if let Some(path) = ca_path {
        for cert in load_certs(path)? {
            root_store
                .add(&cert)
                .map_err(|e| Error::TlsCertificateError(e.to_string()))?;
        }
    }

    let config = ClientConfig::builder()
        .with_safe_defaults()
        .with_root_certificates(root_store)
        .with_no_client_auth();

    Ok(Arc::new(config))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_files() {
        let missing = Path::new("/nonexistent/sipunit/cert.pem");
        assert!(matches!(load_certs(missing), Err(Error::TlsCertificateError(_))));
        assert!(matches!(load_private_key(missing), Err(Error::TlsCertificateError(_))));
        assert!(create_server_config(missing, missing).is_err());
    }

    #[test]
    fn test_empty_pem_has_no_certs() {
        let path = std::env::temp_dir().join(format!("sipunit-empty-{}.pem", std::process::id()));
        std::fs::write(&path, "not a pem file\n").unwrap();
        assert!(matches!(load_certs(&path), Err(Error::TlsCertificateError(_))));
        assert!(matches!(load_private_key(&path), Err(Error::TlsCertificateError(_))));
        let _ = std::fs::remove_file(&path);
    }

    #[test]
    fn test_client_config_without_ca() {
        assert!(create_client_config(None).is_ok());
    }
}
