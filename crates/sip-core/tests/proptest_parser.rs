use proptest::prelude::*;
use sipunit_sip_core::prelude::*;
use sipunit_sip_core::{parse_uri, Scheme};

fn host() -> impl Strategy<Value = String> {
    prop_oneof![
        "[a-z]{1,10}(\\.[a-z]{1,8}){0,2}",
        (0u8..=255, 0u8..=255, 0u8..=255, 1u8..=254)
            .prop_map(|(a, b, c, d)| format!("{}.{}.{}.{}", a, b, c, d)),
    ]
}

proptest! {
    #[test]
    fn uri_display_parses_back(
        sips in any::<bool>(),
        user in proptest::option::of("[a-z][a-z0-9_.-]{0,12}"),
        host in host(),
        port in proptest::option::of(1u16..),
        transport in proptest::option::of(prop_oneof!["udp", "tcp", "tls"]),
    ) {
        let mut uri = Uri::new(if sips { Scheme::Sips } else { Scheme::Sip }, host);
        uri.user = user;
        uri.port = port;
        if let Some(t) = transport {
            uri = uri.with_param(Param::new("transport", Some(t)));
        }
        let parsed = parse_uri(&uri.to_string()).unwrap();
        prop_assert_eq!(parsed, uri);
    }

    #[test]
    fn address_tag_survives_display(tag in "[A-Za-z0-9]{1,16}", name in "[A-Za-z ]{0,12}") {
        let mut address =
            Address::new(parse_uri("sip:bob@example.com").unwrap()).with_tag(tag.clone());
        if !name.trim().is_empty() {
            address = address.with_display_name(name.trim());
        }
        let parsed: Address = address.to_string().parse().unwrap();
        prop_assert_eq!(parsed.tag(), Some(tag.as_str()));
        prop_assert_eq!(parsed, address);
    }

    #[test]
    fn parser_never_panics(data in proptest::collection::vec(any::<u8>(), 0..512)) {
        let _ = parse_message(&data);
        let _ = sipunit_sip_core::frame_length(&data);
    }

    #[test]
    fn cseq_number_round_trips(seq in 0u32..(1 << 31)) {
        let cseq = CSeq::new(seq, Method::Bye);
        prop_assert_eq!(cseq.to_string().parse::<CSeq>().unwrap(), cseq);
    }
}
