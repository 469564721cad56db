//! Application message contract.
//!
//! The gate treats messages as opaque: it can fill one from received
//! bytes and serialize one into an output buffer, nothing more. The
//! concrete grammar lives in the embedding framework.

/// One application message.
///
/// Acquired from a [`MessagePool`] for each successful read; the gate
/// never retains a message beyond the call that produced it.
pub trait Message: Send + std::fmt::Debug {
    /// Replace the message contents with a parse of `bytes`.
    fn reset(&mut self, bytes: &[u8]) -> anyhow::Result<()>;

    /// Append the serialized form to `sink`, returning the number of
    /// bytes written.
    fn serialize(&self, sink: &mut Vec<u8>) -> anyhow::Result<usize>;
}

/// Source of blank messages, one per inbound frame.
pub trait MessagePool: Send + Sync {
    fn acquire(&self) -> Box<dyn Message>;
}

/// Default message: an uninterpreted byte payload.
#[derive(Debug, Default, Clone)]
pub struct BytesMessage {
    payload: Vec<u8>,
}

impl BytesMessage {
    pub fn new(payload: impl Into<Vec<u8>>) -> Self {
        Self {
            payload: payload.into(),
        }
    }

    pub fn payload(&self) -> &[u8] {
        &self.payload
    }
}

impl Message for BytesMessage {
    fn reset(&mut self, bytes: &[u8]) -> anyhow::Result<()> {
        self.payload.clear();
        self.payload.extend_from_slice(bytes);
        Ok(())
    }

    fn serialize(&self, sink: &mut Vec<u8>) -> anyhow::Result<usize> {
        sink.extend_from_slice(&self.payload);
        Ok(self.payload.len())
    }
}

/// Allocation-backed pool handing out blank [`BytesMessage`]s.
///
/// Frameworks with a real reuse pool plug in their own [`MessagePool`].
#[derive(Debug, Default, Clone, Copy)]
pub struct BytesPool;

impl MessagePool for BytesPool {
    fn acquire(&self) -> Box<dyn Message> {
        Box::new(BytesMessage::default())
    }
}
