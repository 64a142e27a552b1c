use std::fmt;

use crate::constants::CORRELATION_ID_LEN;
use crate::error::{Result, TunnelError};

/// Fixed-width correlation identifier, carried as its textual UUID form
///
/// The relay generates identifiers; the forwarder treats them as opaque and
/// echoes them back verbatim.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct CorrelationId([u8; CORRELATION_ID_LEN]);

impl CorrelationId {
    pub const LEN: usize = CORRELATION_ID_LEN;

    pub fn from_bytes(bytes: [u8; CORRELATION_ID_LEN]) -> Self {
        Self(bytes)
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }
}

impl fmt::Display for CorrelationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&String::from_utf8_lossy(&self.0))
    }
}

impl fmt::Debug for CorrelationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "CorrelationId({})", self)
    }
}

/// The wire unit exchanged over the tunnel: identifier followed by an opaque payload
///
/// There is no length prefix; the payload is everything after the first
/// [`CorrelationId::LEN`] bytes of a binary WebSocket message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    pub id: CorrelationId,
    pub payload: Vec<u8>,
}

impl Frame {
    pub fn new(id: CorrelationId, payload: impl Into<Vec<u8>>) -> Self {
        Self {
            id,
            payload: payload.into(),
        }
    }

    pub fn encode(&self) -> Vec<u8> {
        encode_frame(&self.id, &self.payload)
    }

    /// Split a received message into identifier and payload
    pub fn decode(bytes: &[u8]) -> Result<Self> {
        if bytes.len() < CorrelationId::LEN {
            return Err(TunnelError::MalformedFrame(bytes.len()));
        }

        let (head, payload) = bytes.split_at(CorrelationId::LEN);
        let id: [u8; CORRELATION_ID_LEN] = head
            .try_into()
            .map_err(|_| TunnelError::MalformedFrame(bytes.len()))?;

        Ok(Self::new(CorrelationId(id), payload))
    }
}

/// Encode a frame without taking ownership of the payload
pub fn encode_frame(id: &CorrelationId, payload: &[u8]) -> Vec<u8> {
    let mut buf = Vec::with_capacity(CorrelationId::LEN + payload.len());
    buf.extend_from_slice(id.as_bytes());
    buf.extend_from_slice(payload);
    buf
}
