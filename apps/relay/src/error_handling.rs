//! Error handling and sanitization
//!
//! Every failure on the ingress path ends as a well-formed HTTP response.
//! Errors that say something useful to the caller are passed through; internal
//! failures are logged in full and answered with the status's reason phrase only.

use tracing::error;
use ws_tunnel_common::{
    TunnelError,
    protocol::{error_response, tagged_error_response, timeout_response},
};

/// Check if an error's message can be shown to the ingress caller
pub fn is_safe_error(e: &TunnelError) -> bool {
    matches!(
        e,
        TunnelError::Timeout
            | TunnelError::TunnelUnavailable { .. }
            | TunnelError::MissingHostHeader
            | TunnelError::InvalidHostHeader(_)
            | TunnelError::RequestTooLarge(_)
    )
}

/// Get the body text for an error response
///
/// Returns the actual error message if it's safe, otherwise the reason phrase
pub fn client_error_message(e: &TunnelError) -> String {
    if is_safe_error(e) {
        e.to_string()
    } else {
        error!("Internal error: {}", e);
        e.status_code()
            .canonical_reason()
            .unwrap_or("Internal Server Error")
            .to_string()
    }
}

/// Synthesize the raw HTTP response for a failed tunneled request
pub fn error_response_for(e: &TunnelError) -> Vec<u8> {
    match e {
        TunnelError::Timeout => timeout_response(),
        TunnelError::TunnelUnavailable { message, name, .. } => {
            tagged_error_response(e.status_code(), name, message)
        }
        _ => error_response(e.status_code(), &client_error_message(e)),
    }
}
