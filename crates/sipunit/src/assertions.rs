//! Test assertions with SIP-aware failure messages
//!
//! All helpers panic at the caller's location.

use sipunit_sip_core::{HeaderAccess, HeaderName, Response};

use crate::operation::HasLastOperation;

/// Panics unless the object's last operation succeeded
#[track_caller]
pub fn assert_last_operation_success(object: &impl HasLastOperation) {
    if !object.last_operation_succeeded() {
        panic!("expected last operation to succeed, got: {}", object.format_last_operation());
    }
}

/// Panics if the object's last operation succeeded (or nothing ran)
#[track_caller]
pub fn assert_last_operation_fail(object: &impl HasLastOperation) {
    let last = object.last_operation();
    if last.is_success() || last.get().is_none() {
        panic!("expected last operation to fail, got: {}", last.format());
    }
}

/// Panics unless `response` is present with status `code`
#[track_caller]
pub fn assert_response_received(response: Option<&Response>, code: u16) {
    match response {
        Some(response) if response.status_code() == code => {}
        Some(response) => panic!(
            "expected {} response, got {} {}",
            code,
            response.status_code(),
            response.reason_phrase()
        ),
        None => panic!("expected {} response, got none", code),
    }
}

/// Panics unless some `header` value of `message` contains `value`
#[track_caller]
pub fn assert_header_contains(message: &impl HeaderAccess, header: &str, value: &str) {
    let values = header_values(message, header);
    if !values.iter().any(|v| v.contains(value)) {
        panic!("expected {} header containing {:?}, found {:?}", header, value, values);
    }
}

/// Panics if `message` carries `header`
#[track_caller]
pub fn assert_header_not_present(message: &impl HeaderAccess, header: &str) {
    let values = header_values(message, header);
    if !values.is_empty() {
        panic!("expected no {} header, found {:?}", header, values);
    }
}

fn header_values(message: &impl HeaderAccess, header: &str) -> Vec<String> {
    match header.parse::<HeaderName>() {
        Ok(name) => message.headers().get_all(&name).into_iter().map(str::to_string).collect(),
        Err(_) => Vec::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::SipUnitError;
    use crate::operation::LastOperation;
    use sipunit_sip_core::prelude::*;

    struct Recorder(LastOperation);

    impl HasLastOperation for Recorder {
        fn last_operation(&self) -> &LastOperation {
            &self.0
        }
    }

    fn ok_response() -> Response {
        let request = SimpleRequestBuilder::new(Method::Options, "sip:bob@127.0.0.1:5070")
            .unwrap()
            .from("", "sip:alice@127.0.0.1", Some("a1"))
            .to("", "sip:bob@127.0.0.1", None)
            .call_id("assert-test")
            .cseq(1)
            .via("127.0.0.1:5060", "UDP", Some("z9hG4bKassert"))
            .build()
            .unwrap();
        SimpleResponseBuilder::response_from_request(&request, StatusCode::OK, None)
            .header("Allow", "INVITE, ACK, BYE")
            .build()
            .unwrap()
    }

    #[test]
    fn test_last_operation_assertions() {
        let recorder = Recorder(LastOperation::new());
        recorder.0.succeed("op");
        assert_last_operation_success(&recorder);

        recorder.0.fail("op", &SipUnitError::invalid_state("idle"));
        assert_last_operation_fail(&recorder);
    }

    #[test]
    #[should_panic(expected = "expected last operation to fail")]
    fn test_fail_assertion_rejects_empty_record() {
        assert_last_operation_fail(&Recorder(LastOperation::new()));
    }

    #[test]
    fn test_header_assertions() {
        let response = ok_response();
        assert_response_received(Some(&response), 200);
        assert_header_contains(&response, "Allow", "BYE");
        assert_header_contains(&response, "call-id", "assert-test");
        assert_header_not_present(&response, "Subscription-State");
    }

    #[test]
    #[should_panic(expected = "expected 486 response, got 200")]
    fn test_response_assertion_reports_status() {
        assert_response_received(Some(&ok_response()), 486);
    }
}
