//! Shared harness: a gate mounted on a real listener with an accept
//! hook that forwards every new socket to the test.

#![allow(dead_code)]

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;

use trellis_core::LifecycleEvents;
use trellis_server::{Gate, Meta, Server, SocketHandle, SocketPool, SocketRegistry};

pub const TEST_WINDOW: Duration = Duration::from_millis(150);

pub struct Harness {
    pub server: Server,
    pub addr: SocketAddr,
    pub lifecycle: Arc<LifecycleEvents>,
    pub registry: Arc<SocketPool>,
    pub accepted: mpsc::UnboundedReceiver<(SocketHandle, Meta)>,
}

pub async fn start_gate<F>(configure: F) -> Harness
where
    F: FnOnce(Gate) -> Gate,
{
    let lifecycle = Arc::new(LifecycleEvents::new());
    let registry = Arc::new(SocketPool::new(64));
    let (tx, accepted) = mpsc::unbounded_channel();
    let accept = move |socket: SocketHandle, meta: Meta| {
        let _ = tx.send((socket, meta));
    };
    let gate = configure(
        Gate::new(
            Arc::clone(&registry) as Arc<dyn SocketRegistry>,
            Arc::clone(&lifecycle),
        )
        .with_accept(Arc::new(accept)),
    );
    let server = Server::with_startup_window(Arc::clone(&lifecycle), TEST_WINDOW);
    let addr = server
        .start("127.0.0.1:0".parse().unwrap(), gate.into_router())
        .await
        .expect("listener should start");
    Harness {
        server,
        addr,
        lifecycle,
        registry,
        accepted,
    }
}

pub fn ws_url(addr: SocketAddr, path: &str) -> String {
    format!("ws://{addr}{path}")
}

pub fn http_url(addr: SocketAddr, path: &str) -> String {
    format!("http://{addr}{path}")
}
