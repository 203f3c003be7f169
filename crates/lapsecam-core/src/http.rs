//! Minimal HTTP request parsing.
//!
//! Just enough of HTTP/1.x for the device surface: one request line, a
//! `Content-Length` header for form posts, query strings, and the percent
//! codec shared by links and untrusted identifiers.

use heapless::{String, Vec};

/// Request methods the surface distinguishes.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Method {
    Get,
    Post,
    Other,
}

/// Parsed request line plus the one header the surface needs.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct RequestHead<'a> {
    pub method: Method,
    pub path: &'a str,
    pub query: &'a str,
    pub content_length: usize,
}

/// Parse the bytes up to (not including) the blank line.
///
/// Returns `None` for anything that is not a recognizable request head.
pub fn parse_request(head: &[u8]) -> Option<RequestHead<'_>> {
    let text = core::str::from_utf8(head).ok()?;
    let mut lines = text.split("\r\n");
    let request_line = lines.next()?;

    let mut parts = request_line.split(' ').filter(|part| !part.is_empty());
    let method = match parts.next()? {
        "GET" => Method::Get,
        "POST" => Method::Post,
        _ => Method::Other,
    };
    let target = parts.next()?;
    parts.next()?; // HTTP version must be present.

    let (path, query) = match target.split_once('?') {
        Some((path, query)) => (path, query),
        None => (target, ""),
    };

    let mut content_length = 0;
    for line in lines {
        if let Some((name, value)) = line.split_once(':') {
            if name.trim().eq_ignore_ascii_case("content-length") {
                content_length = value.trim().parse().unwrap_or(0);
            }
        }
    }

    Some(RequestHead {
        method,
        path,
        query,
        content_length,
    })
}

/// Raw value of `key` in a query or form-encoded string.
///
/// A bare flag (`?download`) yields an empty value.
pub fn query_param<'a>(query: &'a str, key: &str) -> Option<&'a str> {
    query
        .split('&')
        .filter(|pair| !pair.is_empty())
        .find_map(|pair| match pair.split_once('=') {
            Some((name, value)) => (name == key).then_some(value),
            None => (pair == key).then_some(""),
        })
}

/// Percent-decode a query value (`%XX` escapes, `+` as space).
///
/// Decodes into bytes first so multi-byte UTF-8 survives. `None` for
/// malformed escapes, invalid UTF-8, or values that exceed `N` bytes; all
/// reject the request before anything downstream sees the value.
pub fn percent_decode<const N: usize>(input: &str) -> Option<String<N>> {
    let mut buf: Vec<u8, N> = Vec::new();
    let mut bytes = input.bytes();
    while let Some(byte) = bytes.next() {
        let decoded = match byte {
            b'+' => b' ',
            b'%' => {
                let high = hex_value(bytes.next()?)?;
                let low = hex_value(bytes.next()?)?;
                high << 4 | low
            }
            other => other,
        };
        buf.push(decoded).ok()?;
    }
    let text = core::str::from_utf8(&buf).ok()?;
    String::try_from(text).ok()
}

/// Percent-encode for link targets; everything outside the unreserved set is
/// escaped.
pub fn percent_encode<const N: usize>(input: &str) -> Option<String<N>> {
    let mut out: String<N> = String::new();
    for byte in input.bytes() {
        if byte.is_ascii_alphanumeric() || matches!(byte, b'-' | b'_' | b'.' | b'~') {
            out.push(byte as char).ok()?;
        } else {
            out.push('%').ok()?;
            out.push(hex_digit(byte >> 4)).ok()?;
            out.push(hex_digit(byte & 0x0F)).ok()?;
        }
    }
    Some(out)
}

fn hex_value(byte: u8) -> Option<u8> {
    (byte as char).to_digit(16).map(|digit| digit as u8)
}

fn hex_digit(nibble: u8) -> char {
    match nibble {
        0..=9 => (b'0' + nibble) as char,
        _ => (b'A' + nibble - 10) as char,
    }
}
