//! Core types for the trellis WebSocket message gate.
//!
//! Leaf abstractions shared by the server crate and by embedding
//! frameworks: the opaque application message contract, the payload
//! transform pipeline, origin access control, and process lifecycle
//! signaling. Nothing in here touches HTTP or the transport.

pub mod lifecycle;
pub mod message;
pub mod origin;
pub mod transform;

pub use lifecycle::LifecycleEvents;
pub use message::{BytesMessage, BytesPool, Message, MessagePool};
pub use origin::OriginPolicy;
pub use transform::{Identity, Transform};
