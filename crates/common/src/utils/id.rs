use uuid::Uuid;

use crate::protocol::CorrelationId;

/// Generate a fresh correlation identifier from a random (v4) UUID
///
/// The identifier travels in its 36-character hyphenated form.
pub fn generate_correlation_id() -> CorrelationId {
    let mut buf = [0u8; CorrelationId::LEN];
    Uuid::new_v4().hyphenated().encode_lower(&mut buf);
    CorrelationId::from_bytes(buf)
}
