use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use sipunit_sip_core::prelude::*;
use sipunit_sip_transport::{
    bind_transport, TcpTransport, Transport, TransportEvent, TransportType, UdpTransport,
};
use tokio::net::UdpSocket;
use tokio::sync::mpsc;
use tokio::time::timeout;

fn init_logging() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter("sipunit_sip_transport=debug")
        .with_test_writer()
        .try_init();
}

fn any_local() -> SocketAddr {
    "127.0.0.1:0".parse().unwrap()
}

fn options_request(target: SocketAddr, transport: &str) -> Request {
    SimpleRequestBuilder::new(Method::Options, &format!("sip:bob@{}", target))
        .unwrap()
        .from("Alice", "sip:alice@example.com", Some("a1"))
        .to("Bob", "sip:bob@example.com", None)
        .call_id("transport-test-call")
        .cseq(1)
        .via(&target.to_string(), transport, Some("z9hG4bKtransport1"))
        .build()
        .unwrap()
}

async fn next_message(rx: &mut mpsc::Receiver<TransportEvent>) -> (Message, SocketAddr) {
    loop {
        let event = timeout(Duration::from_secs(2), rx.recv())
            .await
            .expect("timed out waiting for a transport event")
            .expect("transport channel closed");
        if let TransportEvent::MessageReceived { message, source, .. } = event {
            return (message, source);
        }
    }
}

#[tokio::test]
async fn test_udp_send_receive() {
    init_logging();
    let (a, _a_rx) = UdpTransport::bind(any_local(), None).await.unwrap();
    let (b, mut b_rx) = UdpTransport::bind(any_local(), None).await.unwrap();
    let b_addr = b.local_addr().unwrap();

    a.send_message(options_request(b_addr, "UDP").into(), b_addr).await.unwrap();

    let (message, source) = next_message(&mut b_rx).await;
    assert_eq!(source, a.local_addr().unwrap());
    let request = message.as_request().unwrap();
    assert_eq!(request.method(), &Method::Options);
    assert_eq!(request.call_id(), Some("transport-test-call"));

    a.close().await.unwrap();
    b.close().await.unwrap();
}

#[tokio::test]
async fn test_udp_garbage_reported_as_error_event() {
    init_logging();
    let (transport, mut rx) = UdpTransport::bind(any_local(), None).await.unwrap();
    let addr = transport.local_addr().unwrap();

    let raw = UdpSocket::bind(any_local()).await.unwrap();
    raw.send_to(b"this is not sip\r\n\r\n", addr).await.unwrap();

    let event = timeout(Duration::from_secs(2), rx.recv()).await.unwrap().unwrap();
    assert!(matches!(event, TransportEvent::Error { .. }));
    transport.close().await.unwrap();
}

#[tokio::test]
async fn test_udp_close_releases_port() {
    let (transport, mut rx) = UdpTransport::bind(any_local(), None).await.unwrap();
    let addr = transport.local_addr().unwrap();

    transport.close().await.unwrap();
    assert!(transport.is_closed());
    // Idempotent
    transport.close().await.unwrap();

    let mut saw_closed = false;
    while let Ok(Some(event)) = timeout(Duration::from_millis(200), rx.recv()).await {
        if matches!(event, TransportEvent::Closed) {
            saw_closed = true;
        }
    }
    assert!(saw_closed);

    let (rebound, _rx) = UdpTransport::bind(addr, None).await.unwrap();
    assert_eq!(rebound.local_addr().unwrap(), addr);
    rebound.close().await.unwrap();
}

#[tokio::test]
async fn test_send_after_close_fails() {
    let (transport, _rx) = UdpTransport::bind(any_local(), None).await.unwrap();
    let target = transport.local_addr().unwrap();
    transport.close().await.unwrap();

    let result = transport.send_message(options_request(target, "UDP").into(), target).await;
    assert!(matches!(result, Err(sipunit_sip_transport::Error::TransportClosed)));
}

#[tokio::test]
async fn test_tcp_reply_uses_same_connection() {
    init_logging();
    let (server, mut server_rx) = TcpTransport::bind(any_local(), None).await.unwrap();
    let (client, mut client_rx) = TcpTransport::bind(any_local(), None).await.unwrap();
    let server_addr = server.local_addr().unwrap();

    let request = options_request(server_addr, "TCP");
    client.send_message(request.into(), server_addr).await.unwrap();

    let (message, source) = next_message(&mut server_rx).await;
    // The source is the client's ephemeral connection port, not its listener
    assert_ne!(source, client.local_addr().unwrap());

    let received = message.as_request().unwrap();
    let reply = SimpleResponseBuilder::response_from_request(received, StatusCode::OK, None)
        .build()
        .unwrap();
    server.send_message(reply.into(), source).await.unwrap();

    let (message, _) = next_message(&mut client_rx).await;
    let response = message.as_response().unwrap();
    assert_eq!(response.status_code(), 200);
    assert_eq!(response.call_id(), Some("transport-test-call"));

    client.close().await.unwrap();
    server.close().await.unwrap();
}

#[tokio::test]
async fn test_tcp_close_releases_port() {
    let (transport, _rx) = TcpTransport::bind(any_local(), None).await.unwrap();
    let addr = transport.local_addr().unwrap();
    transport.close().await.unwrap();

    let (rebound, _rx) = TcpTransport::bind(addr, None).await.unwrap();
    rebound.close().await.unwrap();
}

#[tokio::test]
async fn test_factory_binds_requested_type() {
    init_logging();
    let (udp, _rx): (Arc<dyn Transport>, _) =
        bind_transport(TransportType::Udp, any_local(), None, None).await.unwrap();
    assert_eq!(udp.transport_type(), TransportType::Udp);
    assert!(!udp.is_reliable());
    udp.close().await.unwrap();

    let (tcp, _rx) = bind_transport(TransportType::Tcp, any_local(), None, Some(10)).await.unwrap();
    assert_eq!(tcp.transport_type(), TransportType::Tcp);
    assert!(tcp.is_reliable());
    tcp.close().await.unwrap();
}

#[tokio::test]
async fn test_factory_tls_without_settings_fails() {
    let result = bind_transport(TransportType::Tls, any_local(), None, None).await;
    assert!(result.is_err());
}
