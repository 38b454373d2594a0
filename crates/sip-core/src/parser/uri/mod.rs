//! SIP URI parsing
//!
//! ```text
//! SIP-URI  = "sip:" [ userinfo ] hostport uri-parameters [ headers ]
//! SIPS-URI = "sips:" [ userinfo ] hostport uri-parameters [ headers ]
//! ```

use nom::{
    branch::alt,
    bytes::complete::{tag_no_case, take_while1},
    character::complete::{char, digit1},
    combinator::{all_consuming, map, map_res, opt, value},
    sequence::{delimited, preceded},
    IResult,
};

use crate::error::{Error, Result};
use crate::parser::utils::parse_params;
use crate::types::uri::{Scheme, Uri};

fn scheme(input: &str) -> IResult<&str, Scheme> {
    // "sips:" must be tried first
    alt((
        value(Scheme::Sips, tag_no_case("sips:")),
        value(Scheme::Sip, tag_no_case("sip:")),
    ))(input)
}

fn is_host_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || c == '-' || c == '.' || c == '_'
}

fn ipv6_reference(input: &str) -> IResult<&str, &str> {
    delimited(
        char('['),
        take_while1(|c: char| c.is_ascii_hexdigit() || c == ':' || c == '.'),
        char(']'),
    )(input)
}

fn port(input: &str) -> IResult<&str, u16> {
    preceded(char(':'), map_res(digit1, str::parse::<u16>))(input)
}

fn hostport(input: &str) -> IResult<&str, (String, Option<u16>)> {
    let (rest, host) = alt((
        map(ipv6_reference, str::to_string),
        map(take_while1(is_host_char), str::to_string),
    ))(input)?;
    let (rest, port) = opt(port)(rest)?;
    Ok((rest, (host, port)))
}

/// Parses a complete `sip:`/`sips:` URI
pub fn parse_uri(input: &str) -> Result<Uri> {
    let input = input.trim();
    let invalid = || Error::InvalidUri(input.to_string());

    let (rest, scheme) = scheme(input).map_err(|_| invalid())?;

    let (rest, headers) = match rest.split_once('?') {
        Some((before, after)) => (before, Some(after.to_string())),
        None => (rest, None),
    };

    let (user, rest) = match rest.find('@') {
        Some(at) => {
            let user = &rest[..at];
            if user.is_empty() || user.contains(char::is_whitespace) {
                return Err(invalid());
            }
            (Some(user.to_string()), &rest[at + 1..])
        }
        None => (None, rest),
    };

    let (hostport_part, params_part) = match rest.find(';') {
        Some(semi) => (&rest[..semi], &rest[semi..]),
        None => (rest, ""),
    };

    let (_, (host, port)) = all_consuming(hostport)(hostport_part).map_err(|_| invalid())?;

    Ok(Uri {
        scheme,
        user,
        host,
        port,
        params: parse_params(params_part),
        headers,
    })
}
