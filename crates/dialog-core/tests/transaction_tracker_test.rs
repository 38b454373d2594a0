//! Transaction tracker tests against a recording transport

mod common;

use std::sync::Arc;
use std::time::Duration;

use common::*;
use sipunit_dialog_core::{
    ServerRequestOutcome, TimerSettings, TransactionError, TransactionKey, TransactionState,
    TransactionTracker,
};
use sipunit_sip_core::prelude::*;

fn tracker_with(transport: Arc<MockTransport>, settings: TimerSettings) -> TransactionTracker {
    TransactionTracker::new(transport, settings)
}

fn slow_timers() -> TimerSettings {
    TimerSettings::new(Duration::from_secs(5), Duration::from_secs(5))
}

#[tokio::test]
async fn test_responses_consumed_in_arrival_order() {
    let transport = Arc::new(MockTransport::udp());
    let tracker = tracker_with(transport.clone(), slow_timers());

    let invite = request(Method::Invite, "z9hG4bKorder", 1);
    let key = tracker.send_request(invite.clone(), peer(), None).await.unwrap();
    assert_eq!(transport.sent_count(), 1);
    assert_eq!(tracker.state(&key), Some(TransactionState::Trying));

    assert!(tracker.on_response(response(&invite, StatusCode::RINGING, Some("bob-tag"))).await);
    assert!(tracker.on_response(response(&invite, StatusCode::OK, Some("bob-tag"))).await);

    let first = tracker.wait_response(&key, short()).await.unwrap();
    assert_eq!(first.status_code(), 180);
    let second = tracker.wait_response(&key, short()).await.unwrap();
    assert_eq!(second.status_code(), 200);
    assert!(tracker.wait_response(&key, short()).await.is_none());
    assert_eq!(tracker.state(&key), Some(TransactionState::Terminated));
}

#[tokio::test]
async fn test_duplicate_final_is_dropped() {
    let transport = Arc::new(MockTransport::udp());
    let tracker = tracker_with(transport, slow_timers());

    let subscribe = request(Method::Subscribe, "z9hG4bKdup", 1);
    let key = tracker.send_request(subscribe.clone(), peer(), None).await.unwrap();

    let ok = response(&subscribe, StatusCode::OK, Some("bob-tag"));
    assert!(tracker.on_response(ok.clone()).await);
    assert!(tracker.on_response(ok).await);

    assert!(tracker.wait_response(&key, short()).await.is_some());
    assert!(tracker.wait_response(&key, short()).await.is_none());
    assert_eq!(tracker.state(&key), Some(TransactionState::Completed));
}

#[tokio::test]
async fn test_invite_failure_is_acked_on_same_branch() {
    let transport = Arc::new(MockTransport::udp());
    let tracker = tracker_with(transport.clone(), slow_timers());

    let invite = request(Method::Invite, "z9hG4bKbusy", 3);
    let key = tracker.send_request(invite.clone(), peer(), None).await.unwrap();
    assert!(tracker.on_response(response(&invite, StatusCode::BUSY_HERE, Some("bob-tag"))).await);

    let ack = transport.last_sent().unwrap();
    let ack = ack.as_request().unwrap();
    assert_eq!(ack.method(), &Method::Ack);
    assert_eq!(ack.branch().as_deref(), Some("z9hG4bKbusy"));
    assert_eq!(ack.cseq().unwrap(), CSeq::new(3, Method::Ack));
    assert_eq!(ack.to_tag().as_deref(), Some("bob-tag"));

    assert_eq!(tracker.wait_response(&key, short()).await.unwrap().status_code(), 486);
}

#[tokio::test]
async fn test_unknown_response_is_not_claimed() {
    let transport = Arc::new(MockTransport::udp());
    let tracker = tracker_with(transport, slow_timers());

    let stray = request(Method::Options, "z9hG4bKstray", 1);
    assert!(!tracker.on_response(response(&stray, StatusCode::OK, None)).await);
    assert!(!tracker.owns_response(&response(&stray, StatusCode::OK, None)));
}

#[tokio::test]
async fn test_send_failure_is_surfaced() {
    let transport = Arc::new(MockTransport::udp());
    transport.fail_sends(true);
    let tracker = tracker_with(transport, slow_timers());

    let result = tracker
        .send_request(request(Method::Invite, "z9hG4bKfail", 1), peer(), None)
        .await;
    assert!(matches!(result, Err(TransactionError::Send { .. })));
    assert_eq!(tracker.client_count(), 0);
}

#[tokio::test]
async fn test_request_without_branch_rejected() {
    let transport = Arc::new(MockTransport::udp());
    let tracker = tracker_with(transport, slow_timers());

    let mut invite = request(Method::Invite, "z9hG4bKnobranch", 1);
    invite.headers_mut().set(HeaderName::Via, "SIP/2.0/UDP 127.0.0.1:5060");
    assert!(matches!(
        tracker.send_request(invite, peer(), None).await,
        Err(TransactionError::MissingBranch)
    ));
}

#[tokio::test]
async fn test_udp_retransmits_until_answered() {
    init_logging();
    let transport = Arc::new(MockTransport::udp());
    let settings = TimerSettings::new(Duration::from_millis(20), Duration::from_millis(80));
    let tracker = tracker_with(transport.clone(), settings);

    let options = request(Method::Options, "z9hG4bKretx", 1);
    let key = tracker.send_request(options.clone(), peer(), None).await.unwrap();

    tokio::time::sleep(Duration::from_millis(150)).await;
    let before = transport.sent_count();
    assert!(before >= 3, "expected retransmissions, saw {} sends", before);

    tracker.on_response(response(&options, StatusCode::OK, None)).await;
    tokio::time::sleep(Duration::from_millis(150)).await;
    assert_eq!(transport.sent_count(), before);
    assert!(tracker.wait_response(&key, short()).await.is_some());
}

#[tokio::test]
async fn test_reliable_transport_does_not_retransmit() {
    let transport = Arc::new(MockTransport::tcp());
    let settings = TimerSettings::new(Duration::from_millis(20), Duration::from_millis(80));
    let tracker = tracker_with(transport.clone(), settings);

    tracker
        .send_request(request(Method::Options, "z9hG4bKtcp", 1), peer(), None)
        .await
        .unwrap();
    tokio::time::sleep(Duration::from_millis(150)).await;
    assert_eq!(transport.sent_count(), 1);
}

#[tokio::test]
async fn test_unanswered_transaction_times_out() {
    init_logging();
    let transport = Arc::new(MockTransport::tcp());
    let settings = TimerSettings::new(Duration::from_millis(2), Duration::from_millis(8));
    let tracker = tracker_with(transport, settings);

    let key = tracker
        .send_request(request(Method::Options, "z9hG4bKtimeout", 1), peer(), None)
        .await
        .unwrap();
    tokio::time::sleep(Duration::from_millis(400)).await;
    assert_eq!(tracker.state(&key), Some(TransactionState::TimedOut));
}

#[tokio::test]
async fn test_server_transaction_lifecycle() {
    init_logging();
    let transport = Arc::new(MockTransport::udp());
    let tracker = tracker_with(transport.clone(), slow_timers());

    let invite = request(Method::Invite, "z9hG4bKserver", 1);
    let key = match tracker.on_request(&invite, peer()).await.unwrap() {
        ServerRequestOutcome::New(key) => key,
        other => panic!("expected a new transaction, got {:?}", other),
    };
    assert!(key.is_server);
    assert_eq!(tracker.server_request(&key).unwrap(), invite);

    tracker
        .send_reply(&key, response(&invite, StatusCode::RINGING, Some("bob-tag")))
        .await
        .unwrap();
    tracker
        .send_reply(&key, response(&invite, StatusCode::OK, Some("bob-tag")))
        .await
        .unwrap();

    let duplicate = tracker
        .send_reply(&key, response(&invite, StatusCode::OK, Some("bob-tag")))
        .await;
    assert!(matches!(duplicate, Err(TransactionError::DuplicateFinalResponse(_))));
    assert_eq!(transport.sent_count(), 2);

    // A retransmitted INVITE is answered with the last response
    assert_eq!(
        tracker.on_request(&invite, peer()).await.unwrap(),
        ServerRequestOutcome::Retransmission(key.clone())
    );
    assert_eq!(transport.sent_count(), 3);
    assert_eq!(transport.last_sent().unwrap().as_response().unwrap().status_code(), 200);
}

#[tokio::test]
async fn test_ack_for_failure_is_absorbed() {
    init_logging();
    let transport = Arc::new(MockTransport::udp());
    let tracker = tracker_with(transport, slow_timers());

    let invite = request(Method::Invite, "z9hG4bKabsorb", 1);
    let ServerRequestOutcome::New(key) = tracker.on_request(&invite, peer()).await.unwrap() else {
        panic!("expected a new transaction");
    };
    tracker
        .send_reply(&key, response(&invite, StatusCode::BUSY_HERE, Some("bob-tag")))
        .await
        .unwrap();

    let ack = SimpleRequestBuilder::new(Method::Ack, "sip:bob@127.0.0.1:5070")
        .unwrap()
        .from("Alice", "sip:alice@example.com", Some("alice-tag"))
        .to("Bob", "sip:bob@example.com", Some("bob-tag"))
        .call_id("dialog-core-test")
        .cseq(1)
        .via("127.0.0.1:5060", "UDP", Some("z9hG4bKabsorb"))
        .build()
        .unwrap();
    assert_eq!(
        tracker.on_request(&ack, peer()).await.unwrap(),
        ServerRequestOutcome::AckAbsorbed(key.clone())
    );
    assert_eq!(tracker.state(&key), Some(TransactionState::Terminated));

    // ACK on its own branch belongs to a 2xx and is passed through
    let mut ack_2xx = ack.clone();
    ack_2xx.headers_mut().set(HeaderName::Via, "SIP/2.0/UDP 127.0.0.1:5060;branch=z9hG4bKother");
    assert_eq!(tracker.on_request(&ack_2xx, peer()).await.unwrap(), ServerRequestOutcome::Ack);
}

#[tokio::test]
async fn test_reply_on_unknown_transaction() {
    let transport = Arc::new(MockTransport::udp());
    let tracker = tracker_with(transport, slow_timers());
    let invite = request(Method::Invite, "z9hG4bKunknown", 1);
    let key = TransactionKey::for_server_request(&invite).unwrap();

    let result = tracker.send_reply(&key, response(&invite, StatusCode::OK, None)).await;
    assert!(matches!(result, Err(TransactionError::NotFound(_))));
}

#[tokio::test]
async fn test_ack_cannot_start_transaction() {
    let transport = Arc::new(MockTransport::udp());
    let tracker = tracker_with(transport.clone(), slow_timers());

    let ack = request(Method::Ack, "z9hG4bKack", 1);
    assert!(matches!(
        tracker.send_request(ack.clone(), peer(), None).await,
        Err(TransactionError::InvalidRequest(_))
    ));
    tracker.send_stateless(ack, peer()).await.unwrap();
    assert_eq!(transport.sent_count(), 1);
}

#[tokio::test]
async fn test_shutdown_wakes_waiters() {
    let transport = Arc::new(MockTransport::udp());
    let tracker = Arc::new(tracker_with(transport, slow_timers()));

    let key = tracker
        .send_request(request(Method::Options, "z9hG4bKshutdown", 1), peer(), None)
        .await
        .unwrap();
    let waiter = {
        let tracker = tracker.clone();
        let key = key.clone();
        tokio::spawn(async move { tracker.wait_response(&key, Duration::from_secs(30)).await })
    };
    tokio::time::sleep(Duration::from_millis(20)).await;
    tracker.shutdown().await;

    let result = tokio::time::timeout(Duration::from_secs(2), waiter).await.unwrap().unwrap();
    assert!(result.is_none());
    assert_eq!(tracker.client_count(), 0);
}
