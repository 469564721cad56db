//! Socket handles and the registry seam.
//!
//! A [`Socket`] is the handle currency passed to the accept hook once
//! an upgrade succeeds. Registration itself is a trait so the owning
//! framework can plug in its own pool; [`SocketPool`] is the built-in
//! capacity-bounded default.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::Mutex;
use tokio::time::Instant;
use tracing::debug;
use uuid::Uuid;

use trellis_core::Message;

use crate::conn::{Conn, ConnError, ConnReader, ConnWriter};

/// Shared handle to a registered socket.
pub type SocketHandle = Arc<Socket>;

/// One registered connection: an id plus the adapted transport.
///
/// The read and write halves are guarded independently, so one reader
/// and one writer may run concurrently on the same handle and a read
/// parked waiting for a frame never delays a write. More than one
/// concurrent reader (or writer) still serializes on the half's lock;
/// that discipline belongs to the owning framework.
pub struct Socket {
    id: Uuid,
    reader: Mutex<ConnReader>,
    writer: Mutex<ConnWriter>,
}

impl Socket {
    pub fn new(conn: Conn) -> SocketHandle {
        let (reader, writer) = conn.split();
        Arc::new(Self {
            id: Uuid::new_v4(),
            reader: Mutex::new(reader),
            writer: Mutex::new(writer),
        })
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub async fn read_message(&self) -> Result<Option<Box<dyn Message>>, ConnError> {
        self.reader.lock().await.read_message().await
    }

    pub async fn write_message(&self, msg: &dyn Message) -> Result<(), ConnError> {
        self.writer.lock().await.write_message(msg).await
    }

    pub async fn set_deadline(&self, deadline: Option<Instant>) {
        self.reader.lock().await.set_deadline(deadline);
    }

    pub async fn frames_sent(&self) -> u64 {
        self.writer.lock().await.frames_sent()
    }
}

impl std::fmt::Debug for Socket {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Socket").field("id", &self.id).finish()
    }
}

/// Where upgraded connections are handed off.
#[async_trait]
pub trait SocketRegistry: Send + Sync {
    /// Take ownership of the adapted connection and return the handle
    /// that the accept hook will receive.
    async fn register(&self, conn: Conn) -> Result<SocketHandle, RegistryError>;
}

/// Registration failures.
#[derive(Debug, thiserror::Error)]
pub enum RegistryError {
    #[error("registry at capacity ({0} sockets)")]
    AtCapacity(usize),
    #[error("registry closed")]
    Closed,
}

/// Built-in registry: uuid-keyed map with a capacity bound.
#[derive(Debug)]
pub struct SocketPool {
    sockets: Mutex<HashMap<Uuid, SocketHandle>>,
    max_sockets: usize,
}

impl SocketPool {
    pub fn new(max_sockets: usize) -> Self {
        Self {
            sockets: Mutex::new(HashMap::new()),
            max_sockets,
        }
    }

    pub async fn count(&self) -> usize {
        self.sockets.lock().await.len()
    }

    pub async fn get(&self, id: Uuid) -> Option<SocketHandle> {
        self.sockets.lock().await.get(&id).cloned()
    }

    pub async fn remove(&self, id: Uuid) -> Option<SocketHandle> {
        self.sockets.lock().await.remove(&id)
    }

    pub async fn clear(&self) {
        self.sockets.lock().await.clear();
    }
}

#[async_trait]
impl SocketRegistry for SocketPool {
    async fn register(&self, conn: Conn) -> Result<SocketHandle, RegistryError> {
        let mut sockets = self.sockets.lock().await;
        if sockets.len() >= self.max_sockets {
            return Err(RegistryError::AtCapacity(self.max_sockets));
        }
        let handle = Socket::new(conn);
        sockets.insert(handle.id(), Arc::clone(&handle));
        debug!("socket {} registered", handle.id());
        Ok(handle)
    }
}
