use std::fmt;

use serde::{Deserialize, Serialize};
use sipunit_sip_core::{HeaderAccess, Method, Request, Response};

/// Identifies a transaction by branch, method and direction
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TransactionKey {
    /// Top Via branch parameter
    pub branch: String,
    /// Method of the request that created the transaction
    pub method: Method,
    /// True for server transactions
    pub is_server: bool,
}

impl TransactionKey {
    pub fn new(branch: String, method: Method, is_server: bool) -> Self {
        TransactionKey {
            branch,
            method,
            is_server,
        }
    }

    /// Key of the client transaction a request starts
    pub fn for_client_request(request: &Request) -> Option<Self> {
        let branch = request.branch()?;
        Some(Self::new(branch, request.method().clone(), false))
    }

    /// Key of the server transaction a received request belongs to
    ///
    /// ACK maps onto the INVITE transaction it acknowledges.
    pub fn for_server_request(request: &Request) -> Option<Self> {
        let branch = request.branch()?;
        let method = match request.method() {
            Method::Ack => Method::Invite,
            other => other.clone(),
        };
        Some(Self::new(branch, method, true))
    }

    /// Key of the client transaction a received response answers
    pub fn for_response(response: &Response) -> Option<Self> {
        let branch = response.branch()?;
        let cseq = response.cseq().ok()?;
        Some(Self::new(branch, cseq.method, false))
    }

    pub fn is_invite(&self) -> bool {
        self.method == Method::Invite
    }
}

impl fmt::Display for TransactionKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let side = if self.is_server { "server" } else { "client" };
        write!(f, "{}:{}:{}", self.branch, self.method, side)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sipunit_sip_core::{SimpleRequestBuilder, SimpleResponseBuilder, StatusCode};

    fn invite() -> Request {
        SimpleRequestBuilder::invite("sip:bob@127.0.0.1:5070")
            .unwrap()
            .from("Alice", "sip:alice@example.com", Some("a1"))
            .to("Bob", "sip:bob@example.com", None)
            .call_id("key-test")
            .cseq(1)
            .via("127.0.0.1:5060", "UDP", Some("z9hG4bKkey1"))
            .build()
            .unwrap()
    }

    #[test]
    fn test_request_and_response_keys_match() {
        let request = invite();
        let response =
            SimpleResponseBuilder::response_from_request(&request, StatusCode::RINGING, None)
                .build()
                .unwrap();

        let client = TransactionKey::for_client_request(&request).unwrap();
        assert_eq!(TransactionKey::for_response(&response).unwrap(), client);
        assert_eq!(client.to_string(), "z9hG4bKkey1:INVITE:client");

        let server = TransactionKey::for_server_request(&request).unwrap();
        assert!(server.is_server);
        assert_ne!(server, client);
    }

    #[test]
    fn test_ack_maps_to_invite_server_transaction() {
        let ack = SimpleRequestBuilder::new(Method::Ack, "sip:bob@127.0.0.1:5070")
            .unwrap()
            .from("Alice", "sip:alice@example.com", Some("a1"))
            .to("Bob", "sip:bob@example.com", Some("b1"))
            .call_id("key-test")
            .cseq(1)
            .via("127.0.0.1:5060", "UDP", Some("z9hG4bKkey1"))
            .build()
            .unwrap();
        let key = TransactionKey::for_server_request(&ack).unwrap();
        assert_eq!(key, TransactionKey::for_server_request(&invite()).unwrap());
    }
}
