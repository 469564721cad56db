//! Payload transform pipeline.
//!
//! Symmetric byte-level hooks between the wire and the application,
//! the insertion point for concerns like compression or obfuscation.
//! A [`Transform`] is always installed; [`Identity`] is the default,
//! so callers never check for a missing hook.

/// Byte mapping between wire payloads and application payloads.
///
/// Contract: `decode(encode(x)) == x` for every valid payload `x`.
pub trait Transform: Send + Sync {
    /// Inbound: map wire bytes to application bytes, before parsing.
    fn encode(&self, wire: &[u8]) -> anyhow::Result<Vec<u8>>;

    /// Outbound: map application bytes to wire bytes, after
    /// serialization and before transmission.
    fn decode(&self, app: &[u8]) -> anyhow::Result<Vec<u8>>;
}

/// The do-nothing transform.
#[derive(Debug, Default, Clone, Copy)]
pub struct Identity;

impl Transform for Identity {
    fn encode(&self, wire: &[u8]) -> anyhow::Result<Vec<u8>> {
        Ok(wire.to_vec())
    }

    fn decode(&self, app: &[u8]) -> anyhow::Result<Vec<u8>> {
        Ok(app.to_vec())
    }
}
