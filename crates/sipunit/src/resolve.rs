//! Target URI to socket address
//!
//! IP literals are used as they are. Host names go through the system
//! resolver unless the phone is in loopback mode, which sends everything
//! to 127.0.0.1 so same-process peers can use realistic domain names.

use std::net::{IpAddr, Ipv4Addr, SocketAddr};

use sipunit_sip_core::Uri;
use tracing::debug;

use crate::error::{SipUnitError, SipUnitResult};

pub(crate) async fn resolve_uri(uri: &Uri, loopback: bool) -> SipUnitResult<SocketAddr> {
    let port = uri.port_or_default();
    let host = uri.host.trim_start_matches('[').trim_end_matches(']');

    if let Ok(ip) = host.parse::<IpAddr>() {
        return Ok(SocketAddr::new(ip, port));
    }
    if loopback {
        debug!("Loopback: {} resolved to 127.0.0.1:{}", uri, port);
        return Ok(SocketAddr::new(IpAddr::V4(Ipv4Addr::LOCALHOST), port));
    }

    let mut addrs = tokio::net::lookup_host((host, port))
        .await
        .map_err(|e| SipUnitError::unreachable(uri.to_string(), e.to_string()))?;
    addrs
        .next()
        .ok_or_else(|| SipUnitError::unreachable(uri.to_string(), "host has no addresses"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_ip_literal() {
        let uri: Uri = "sip:bob@10.1.2.3:5070".parse().unwrap();
        assert_eq!(resolve_uri(&uri, false).await.unwrap(), "10.1.2.3:5070".parse().unwrap());

        let uri: Uri = "sip:bob@10.1.2.3".parse().unwrap();
        assert_eq!(resolve_uri(&uri, false).await.unwrap().port(), 5060);
    }

    #[tokio::test]
    async fn test_loopback() {
        let uri: Uri = "sip:becky@nist.gov:5061".parse().unwrap();
        assert_eq!(resolve_uri(&uri, true).await.unwrap(), "127.0.0.1:5061".parse().unwrap());
    }

    #[tokio::test]
    async fn test_unresolvable() {
        let uri: Uri = "sip:nobody@no-such-host.invalid".parse().unwrap();
        let err = resolve_uri(&uri, false).await.unwrap_err();
        assert!(matches!(err, SipUnitError::UnreachablePeer { .. }));
    }
}
