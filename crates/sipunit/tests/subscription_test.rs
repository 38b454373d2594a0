//! Conference event subscription between two phones on one stack

mod common;

use bytes::Bytes;
use common::*;
use sipunit::prelude::*;
use sipunit::ReplyOptions;

const CONFERENCE_INFO: &str = "application/conference-info+xml";

const CONFERENCE_XML: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<conference-info xmlns="urn:ietf:params:xml:ns:conference-info" entity="sip:conf@127.0.0.1" state="full" version="1">
  <conference-description><subject>Weekly sync</subject></conference-description>
  <users/>
</conference-info>
"#;

#[tokio::test]
async fn test_conference_subscription_raw_exchange() {
    let stack = udp_stack("conf-raw").await;
    let a = phone(&stack, "a");
    let conf = phone(&stack, "conf");

    let subscribe = a
        .new_request(Method::Subscribe, &stack.sip_uri("conf"))
        .unwrap()
        .event(&Event::new("conference"))
        .expires(3600)
        .build()
        .unwrap();
    let key = a.send_request(subscribe).await.unwrap();
    assert_last_operation_success(&a);

    let received = conf.wait_request(WAIT).await.expect("SUBSCRIBE");
    assert_eq!(received.method(), &Method::Subscribe);
    assert_header_contains(&received.request, "Event", "conference");

    let sent = conf
        .send_reply(
            &received,
            200,
            None,
            ReplyOptions::new().with_contact_param("isfocus").with_expires(3600),
        )
        .await
        .unwrap();
    assert_last_operation_success(&conf);

    let ok = a.wait_response(&key, WAIT).await;
    assert_last_operation_success(&a);
    assert_response_received(ok.as_ref(), 200);
    let ok = ok.unwrap();
    assert!(ok.contacts().unwrap()[0].has_param("isfocus"));
    assert_eq!(ok.expires(), Some(3600));
    assert_eq!(ok.to_tag(), sent.to_tag());
    assert!(a.dialog_for_response(&ok).is_some());

    let dialog = conf.dialog_for_reply(&sent).expect("notifier dialog");
    let notify = conf.create_in_dialog_request(&dialog, Method::Notify).unwrap();
    let notify = SimpleRequestBuilder::from_request(notify)
        .event(&Event::new("conference"))
        .subscription_state(&SubscriptionState::active(3600))
        .body(CONFERENCE_INFO, CONFERENCE_XML)
        .build()
        .unwrap();
    let notify_key = conf.send_request(notify).await.unwrap();
    assert_last_operation_success(&conf);

    let received = a.wait_request(WAIT).await.expect("NOTIFY");
    assert_eq!(received.method(), &Method::Notify);
    assert_eq!(received.request.from_tag(), ok.to_tag());
    assert_eq!(received.request.to_tag(), ok.from_tag());
    assert_eq!(received.request.call_id(), ok.call_id());
    assert_eq!(received.request.content_type(), Some(CONFERENCE_INFO));
    assert_eq!(received.request.body(), CONFERENCE_XML.as_bytes());
    assert!(a.dialog_for_request(&received.request).is_some());

    a.send_reply(&received, 200, None, ReplyOptions::new()).await.unwrap();
    assert_last_operation_success(&a);

    let notify_ok = conf.wait_response(&notify_key, WAIT).await;
    assert_last_operation_success(&conf);
    assert_response_received(notify_ok.as_ref(), 200);

    stack.dispose().await;
}

#[tokio::test]
async fn test_conference_subscription_lifecycle() {
    let stack = udp_stack("conf-api").await;
    let a = phone(&stack, "a");
    let conf = phone(&stack, "conf");
    let mut subscriber = EventSubscriber::new(&a);

    let conf_uri = stack.sip_uri("conf");
    let (subscribed, notifier) = tokio::join!(
        subscriber.subscribe(&conf_uri, Event::new("conference"), 3600, WAIT),
        async {
            let request = conf.wait_request(WAIT).await.expect("SUBSCRIBE");
            let mut notifier = EventNotifier::new(&conf, request).unwrap();
            notifier.accept(200, 3600, &["isfocus"]).await.unwrap();
            assert_last_operation_success(&notifier);
            notifier
        }
    );
    let mut notifier = notifier;
    let ok = subscribed.unwrap();
    assert_last_operation_success(&subscriber);
    assert_response_received(Some(&ok), 200);
    assert_header_contains(&ok, "Contact", "isfocus");
    assert_eq!(subscriber.expires(), Some(3600));
    assert!(subscriber.dialog_id().is_some());

    notifier
        .send_notify(SubscriptionState::active(3600), Some(CONFERENCE_INFO), CONFERENCE_XML)
        .await
        .unwrap();
    let notify = subscriber.wait_notify(WAIT).await.expect("NOTIFY");
    assert_last_operation_success(&subscriber);
    assert_eq!(notify.request.from_tag(), ok.to_tag());
    assert_eq!(notify.request.to_tag(), ok.from_tag());
    assert!(!subscriber.is_terminated());

    subscriber.reply_to_notify(&notify, 200, None).await.unwrap();
    let notify_ok = notifier.wait_notify_response(WAIT).await;
    assert_response_received(notify_ok.as_ref(), 200);
    assert_last_operation_success(&notifier);

    let (unsubscribed, ()) = tokio::join!(subscriber.unsubscribe(WAIT), async {
        let refresh = notifier.wait_subscribe(WAIT).await.expect("unsubscribe");
        assert_eq!(refresh.request.expires(), Some(0));
        notifier.reply_to_subscribe(&refresh, 200, 0).await.unwrap();
        notifier
            .send_notify(SubscriptionState::terminated(Some("timeout")), None, Bytes::new())
            .await
            .unwrap();
    });
    assert_response_received(Some(&unsubscribed.unwrap()), 200);

    let last = subscriber.wait_notify(WAIT).await.expect("final NOTIFY");
    assert_header_not_present(&last.request, "Content-Type");
    assert!(subscriber.is_terminated());
    subscriber.reply_to_notify(&last, 200, None).await.unwrap();

    stack.dispose().await;
}

#[tokio::test]
async fn test_invalid_notifies_are_rejected() {
    let stack = udp_stack("conf-reject").await;
    let a = phone(&stack, "a");
    let conf = phone(&stack, "conf");
    let mut subscriber = EventSubscriber::new(&a);

    let conf_uri = stack.sip_uri("conf");
    let (subscribed, notifier) = tokio::join!(
        subscriber.subscribe(&conf_uri, Event::new("conference"), 600, WAIT),
        async {
            let request = conf.wait_request(WAIT).await.expect("SUBSCRIBE");
            let mut notifier = EventNotifier::new(&conf, request).unwrap();
            notifier.accept(200, 600, &[]).await.unwrap();
            notifier
        }
    );
    subscribed.unwrap();
    let dialog = notifier.dialog_id().cloned().expect("notifier dialog");

    // Wrong event package
    let notify = conf.create_in_dialog_request(&dialog, Method::Notify).unwrap();
    let wrong_event = SimpleRequestBuilder::from_request(notify)
        .event(&Event::new("presence"))
        .subscription_state(&SubscriptionState::active(600))
        .build()
        .unwrap();
    let key = conf.send_request(wrong_event).await.unwrap();
    assert!(subscriber.wait_notify(WAIT).await.is_none());
    assert_last_operation_fail(&subscriber);
    assert_eq!(subscriber.last_operation().status_code(), Some(489));
    assert_response_received(conf.wait_response(&key, WAIT).await.as_ref(), 489);

    // No Subscription-State
    let notify = conf.create_in_dialog_request(&dialog, Method::Notify).unwrap();
    let stateless = SimpleRequestBuilder::from_request(notify)
        .event(&Event::new("conference"))
        .build()
        .unwrap();
    let key = conf.send_request(stateless).await.unwrap();
    assert!(subscriber.wait_notify(WAIT).await.is_none());
    assert_eq!(subscriber.last_operation().status_code(), Some(400));
    assert_response_received(conf.wait_response(&key, WAIT).await.as_ref(), 400);

    stack.dispose().await;
}

#[tokio::test]
async fn test_rejected_subscription_is_recorded() {
    let stack = udp_stack("conf-busy").await;
    let a = phone(&stack, "a");
    let conf = phone(&stack, "conf");
    let mut subscriber = EventSubscriber::new(&a);

    let conf_uri = stack.sip_uri("conf");
    let (subscribed, rejected) = tokio::join!(
        subscriber.subscribe(&conf_uri, Event::new("conference"), 600, WAIT),
        async {
            let request = conf.wait_request(WAIT).await.expect("SUBSCRIBE");
            let mut notifier = EventNotifier::new(&conf, request).unwrap();
            notifier.reject(403, Some("Forbidden")).await
        }
    );
    rejected.unwrap();
    let response = subscribed.unwrap();
    assert_response_received(Some(&response), 403);
    assert_last_operation_fail(&subscriber);
    assert_eq!(subscriber.last_operation().status_code(), Some(403));
    assert!(subscriber.dialog_id().is_none());

    stack.dispose().await;
}
