//! Byte-level helpers for raw HTTP/1.x messages
//!
//! The tunnel never parses a request beyond its header block: it locates the
//! end of the headers, reads or rewrites the `Host` line, and otherwise treats
//! the message as opaque bytes.

use http::StatusCode;
use once_cell::sync::Lazy;
use regex::bytes::Regex;

use crate::constants::{HEADER_BLOCK_TERMINATOR, TIMEOUT_BODY};
use crate::error::{Result, TunnelError};
use crate::models::UpstreamRoute;
use crate::utils::http_date;

/// First `Host` header line, matched case-insensitively at the start of a line
static HOST_HEADER: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?im-u)^host:[ \t]*([^\r\n]*)").unwrap());

/// Offset just past the `\r\n\r\n` that ends the header block, if present
pub fn find_header_end(buf: &[u8]) -> Option<usize> {
    buf.windows(HEADER_BLOCK_TERMINATOR.len())
        .position(|w| w == HEADER_BLOCK_TERMINATOR)
        .map(|pos| pos + HEADER_BLOCK_TERMINATOR.len())
}

fn header_block(raw: &[u8]) -> &[u8] {
    find_header_end(raw).map_or(raw, |end| &raw[..end])
}

/// Derive the upstream host and port from the request's `Host` header
///
/// A header without an explicit port routes to 443 (TLS).
pub fn extract_route(raw: &[u8]) -> Result<UpstreamRoute> {
    let caps = HOST_HEADER
        .captures(header_block(raw))
        .ok_or(TunnelError::MissingHostHeader)?;

    let value = std::str::from_utf8(&caps[1])
        .map_err(|_| TunnelError::InvalidHostHeader("not valid UTF-8".to_string()))?
        .trim();

    if value.is_empty() {
        return Err(TunnelError::MissingHostHeader);
    }

    UpstreamRoute::parse(value)
}

/// Replace the first `Host` header with the given destination
///
/// Every other byte of the request, including any body already received,
/// is copied through unchanged.
pub fn rewrite_host(raw: &[u8], destination: &UpstreamRoute) -> Result<Vec<u8>> {
    let found = HOST_HEADER
        .find(header_block(raw))
        .ok_or(TunnelError::MissingHostHeader)?;

    let replacement = format!("Host: {}", destination.authority());
    let mut out = Vec::with_capacity(raw.len() + replacement.len());
    out.extend_from_slice(&raw[..found.start()]);
    out.extend_from_slice(replacement.as_bytes());
    out.extend_from_slice(&raw[found.end()..]);
    Ok(out)
}

/// Build a plain-text HTTP response that closes the connection
pub fn error_response(status: StatusCode, body: &str) -> Vec<u8> {
    let reason = status.canonical_reason().unwrap_or("Error");
    error_response_with_date(status, reason, body, &http_date())
}

/// Same as [`error_response`], with `name` in place of the reason phrase
pub fn tagged_error_response(status: StatusCode, name: &str, body: &str) -> Vec<u8> {
    error_response_with_date(status, name, body, &http_date())
}

fn error_response_with_date(status: StatusCode, reason: &str, body: &str, date: &str) -> Vec<u8> {
    format!(
        "HTTP/1.1 {} {}\r\n\
         Content-Type: text/plain; charset=utf-8\r\n\
         Connection: close\r\n\
         Date: {}\r\n\
         \r\n\
         {}",
        status.as_u16(),
        reason,
        date,
        body
    )
    .into_bytes()
}

/// The fixed 408 answer given when the tunnel does not respond in time
pub fn timeout_response() -> Vec<u8> {
    error_response(StatusCode::REQUEST_TIMEOUT, TIMEOUT_BODY)
}
