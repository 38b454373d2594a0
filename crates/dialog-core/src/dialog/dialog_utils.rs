//! Header extraction helpers shared by the dialog constructors

use sipunit_sip_core::{Address, HeaderAccess, Uri};

/// The URI of the first Contact, if any parses
pub fn extract_contact_uri(message: &impl HeaderAccess) -> Option<Uri> {
    message
        .contacts()
        .ok()
        .and_then(|contacts| contacts.into_iter().next())
        .map(|contact| contact.uri)
}

/// Record-Route entries as a route set; the UAC reverses them
pub fn extract_route_set(message: &impl HeaderAccess, reverse: bool) -> Vec<Address> {
    let mut routes = message.record_routes().unwrap_or_default();
    if reverse {
        routes.reverse();
    }
    routes
}

/// Strips the tag so the address can be re-tagged per request
pub fn without_tag(mut address: Address) -> Address {
    address.params.retain(|p| !p.name.eq_ignore_ascii_case("tag"));
    address
}
