//! Stack lifecycle, routing and raw request/response tests

mod common;

use std::time::Duration;

use common::*;
use sipunit::prelude::*;
use sipunit::{stack_name_in_use, ErrorKind, ReplyOptions};

#[tokio::test]
async fn test_duplicate_stack_name_rejected() {
    let stack = udp_stack("dup").await;
    let again = SipStack::new(StackConfig::new(stack.name()).with_port(0)).await;
    assert!(matches!(again, Err(SipUnitError::DuplicateStackName { .. })));

    let name = stack.name().to_string();
    stack.dispose().await;
    assert!(!stack_name_in_use(&name));

    let reused = SipStack::new(StackConfig::new(&name).with_port(0)).await.unwrap();
    reused.dispose().await;
}

#[tokio::test]
async fn test_failed_bind_releases_name() {
    let stack = udp_stack("taken").await;
    let port = stack.local_addr().port();

    let name = unique_name("second");
    let clash = SipStack::new(StackConfig::new(&name).with_port(port)).await;
    let err = clash.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Configuration);
    assert!(!stack_name_in_use(&name));

    stack.dispose().await;
}

#[tokio::test]
async fn test_dispose_is_idempotent_and_frees_port() {
    let stack = udp_stack("dispose").await;
    let addr = stack.local_addr();
    let amit = phone(&stack, "amit");

    stack.dispose().await;
    stack.dispose().await;
    assert!(stack.is_disposed());
    assert!(amit.is_disposed());
    assert_eq!(stack.phone_count(), 0);

    let err = stack.create_phone(PhoneConfig::new("sip:late@127.0.0.1")).unwrap_err();
    assert!(matches!(err, SipUnitError::Disposed { .. }));
    assert!(amit.new_request(Method::Options, "sip:x@127.0.0.1").is_err());
    assert_last_operation_fail(&amit);

    let rebound = SipStack::new(StackConfig::new(unique_name("rebind")).with_port(addr.port()))
        .await
        .expect("port free after dispose");
    rebound.dispose().await;
}

#[tokio::test]
async fn test_phone_users_unique_per_stack() {
    let stack = udp_stack("users").await;
    let _amit = phone(&stack, "amit");
    let err = stack
        .create_phone(PhoneConfig::new("sip:amit@example.com"))
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Configuration);

    let err = stack.create_phone(PhoneConfig::new("sip:example.com")).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Configuration);
    assert_eq!(stack.phone_count(), 1);

    stack.dispose().await;
}

#[tokio::test]
async fn test_phone_dispose_detaches_from_stack() {
    let stack = udp_stack("detach").await;
    let amit = phone(&stack, "amit");
    amit.dispose().await;
    amit.dispose().await;
    assert_last_operation_success(&amit);
    assert_eq!(stack.phone_count(), 0);

    // The user part is free again
    let again = phone(&stack, "amit");
    assert!(!again.is_disposed());

    stack.dispose().await;
}

#[tokio::test]
async fn test_unknown_user_gets_404() {
    let stack = udp_stack("404").await;
    let amit = phone(&stack, "amit");

    let options = amit
        .new_request(Method::Options, &stack.sip_uri("nobody"))
        .unwrap()
        .build()
        .unwrap();
    let key = amit.send_request(options).await.unwrap();
    let response = amit.wait_response(&key, WAIT).await;
    assert_response_received(response.as_ref(), 404);
    assert!(response.unwrap().to_tag().is_some());

    stack.dispose().await;
}

#[tokio::test]
async fn test_options_round_trip_with_custom_headers() {
    let stack = udp_stack("options").await;
    let amit = phone(&stack, "amit");
    let becky = phone(&stack, "becky");

    let options = amit
        .new_request(Method::Options, &stack.sip_uri("becky"))
        .unwrap()
        .header("Accept", "application/sdp")
        .build()
        .unwrap();
    let key = amit.send_request(options).await.unwrap();

    let received = becky.wait_request(WAIT).await.expect("OPTIONS");
    assert_header_contains(&received.request, "Accept", "application/sdp");
    assert_eq!(received.source, stack.local_addr());

    becky
        .send_reply(
            &received,
            200,
            None,
            ReplyOptions::new()
                .with_header("Allow", "INVITE, ACK, BYE, SUBSCRIBE, NOTIFY")
                .with_to_tag("becky-options"),
        )
        .await
        .unwrap();

    let response = amit.wait_response(&key, WAIT).await.expect("200");
    assert_eq!(response.to_tag().as_deref(), Some("becky-options"));
    assert_header_contains(&response, "Allow", "NOTIFY");
    assert_header_not_present(&response, "Contact");
    assert_eq!(amit.dialog_count(), 0);

    // A second final on the same transaction is refused
    let err = becky
        .send_reply(&received, 500, None, ReplyOptions::new())
        .await
        .unwrap_err();
    assert!(matches!(err, SipUnitError::DuplicateFinalResponse { .. }));
    assert_last_operation_fail(&becky);

    stack.dispose().await;
}

#[tokio::test]
async fn test_wait_request_respects_timeout() {
    let stack = udp_stack("timeout").await;
    let amit = phone(&stack, "amit");

    let started = tokio::time::Instant::now();
    assert!(amit.wait_request(Duration::from_millis(250)).await.is_none());
    let elapsed = started.elapsed();
    assert!(elapsed >= Duration::from_millis(240), "returned after {:?}", elapsed);
    assert!(elapsed < Duration::from_secs(2), "returned after {:?}", elapsed);
    assert_last_operation_fail(&amit);
    assert_eq!(amit.last_operation().error_kind(), Some(ErrorKind::Timeout));
    assert!(amit.format_last_operation().contains("250ms"));

    stack.dispose().await;
}

#[tokio::test]
async fn test_loopback_phone_resolves_domain_names() {
    let stack = udp_stack("loopback").await;
    let amit = stack
        .create_phone(PhoneConfig::new("sip:amit@nist.gov").with_loopback(true))
        .unwrap();
    let becky = stack
        .create_phone(PhoneConfig::new("sip:becky@nist.gov").with_loopback(true))
        .unwrap();

    let target = format!("sip:becky@nist.gov:{}", stack.local_addr().port());
    let message = amit
        .new_request(Method::Message, &target)
        .unwrap()
        .body("text/plain", "hello")
        .build()
        .unwrap();
    let key = amit.send_request(message).await.unwrap();

    let received = becky.wait_request(WAIT).await.expect("MESSAGE");
    assert_eq!(received.request.body(), b"hello");
    becky.send_reply(&received, 200, None, ReplyOptions::new()).await.unwrap();
    assert_response_received(amit.wait_response(&key, WAIT).await.as_ref(), 200);

    stack.dispose().await;
}

#[tokio::test]
async fn test_unresolvable_target_keeps_call_idle() {
    let stack = udp_stack("unreachable").await;
    let amit = phone(&stack, "amit");

    let mut call = amit.create_call();
    let err = call
        .initiate_outgoing_call("sip:becky@no-such-host.invalid", None)
        .await
        .unwrap_err();
    assert!(matches!(err, SipUnitError::UnreachablePeer { .. }));
    assert_last_operation_fail(&call);
    assert_eq!(call.state(), CallState::Idle);

    stack.dispose().await;
}
