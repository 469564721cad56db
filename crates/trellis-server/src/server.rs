//! Listener lifecycle.
//!
//! [`Server`] owns the HTTP listeners that exist solely for the
//! upgrade handshake: an explicitly owned registry (append at startup,
//! drained exactly once at shutdown), a bounded-time startup check,
//! and a shutdown handler subscribed to the process lifecycle at
//! construction.

use std::net::SocketAddr;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use anyhow::Context as _;
use axum::Router;
use tokio::net::TcpListener;
use tokio::sync::{oneshot, watch};
use tokio::task::JoinHandle;
use tokio::time::timeout;
use tracing::{debug, info};

use trellis_core::LifecycleEvents;

/// How long a freshly spawned serve task gets to fail before the start
/// is declared healthy.
pub const DEFAULT_STARTUP_WINDOW: Duration = Duration::from_secs(1);

struct ListenerEntry {
    addr: SocketAddr,
    close: oneshot::Sender<()>,
    // Dropped with the entry; the serve task finishes on its own after
    // the close signal.
    _task: JoinHandle<anyhow::Result<()>>,
}

struct Inner {
    listeners: Mutex<Vec<ListenerEntry>>,
    startup_window: Duration,
    /// Closing subscription, taken by the watcher task on first start.
    closing: Mutex<Option<watch::Receiver<bool>>>,
}

impl Inner {
    /// Drain the registry and close every listener, best effort.
    /// Running this twice is a no-op.
    fn close_all(&self) {
        let drained: Vec<ListenerEntry> = {
            let mut listeners = self.listeners.lock().unwrap();
            listeners.drain(..).collect()
        };
        for entry in drained {
            debug!("closing listener on {}", entry.addr);
            // The task may already be gone; close errors are swallowed.
            let _ = entry.close.send(());
        }
    }
}

/// Manages the upgrade-handshake listeners.
#[derive(Clone)]
pub struct Server {
    inner: Arc<Inner>,
}

impl Server {
    /// Create a server wired to `lifecycle`: its shutdown handler is
    /// subscribed here, not with any ambient global. Construction needs
    /// no runtime; the watcher task is spawned by the first `start`.
    pub fn new(lifecycle: Arc<LifecycleEvents>) -> Self {
        Self::with_startup_window(lifecycle, DEFAULT_STARTUP_WINDOW)
    }

    pub fn with_startup_window(lifecycle: Arc<LifecycleEvents>, startup_window: Duration) -> Self {
        let inner = Arc::new(Inner {
            listeners: Mutex::new(Vec::new()),
            startup_window,
            closing: Mutex::new(Some(lifecycle.subscribe_closing())),
        });
        Self { inner }
    }

    /// Spawn the closing-signal watcher once, on the first start.
    fn spawn_watcher(&self) {
        let Some(mut closing) = self.inner.closing.lock().unwrap().take() else {
            return;
        };
        let watcher = Arc::clone(&self.inner);
        tokio::spawn(async move {
            loop {
                if *closing.borrow_and_update() {
                    watcher.close_all();
                    break;
                }
                if closing.changed().await.is_err() {
                    break;
                }
            }
        });
    }

    /// Bind `addr` and serve `router` on it in a background task.
    ///
    /// The bind itself is eager, so bind failures return synchronously.
    /// The serve call is then raced against the startup window: it is
    /// expected to block for the listener's entire life, so still
    /// running when the window elapses is the success condition, and
    /// any return inside the window is a startup failure. Returns the
    /// bound address (useful with port 0).
    pub async fn start(&self, addr: SocketAddr, router: Router) -> anyhow::Result<SocketAddr> {
        self.spawn_watcher();
        let listener = TcpListener::bind(addr)
            .await
            .with_context(|| format!("bind {addr}"))?;
        let local = listener.local_addr()?;

        let (close_tx, close_rx) = oneshot::channel::<()>();
        let mut task = tokio::spawn(async move {
            axum::serve(listener, router)
                .with_graceful_shutdown(async move {
                    let _ = close_rx.await;
                })
                .await
                .map_err(anyhow::Error::from)
        });

        match timeout(self.inner.startup_window, &mut task).await {
            Ok(Ok(Ok(()))) => Err(anyhow::anyhow!("listener {local} exited during startup")),
            Ok(Ok(Err(err))) => Err(err.context(format!("serve {local}"))),
            Ok(Err(join_err)) => Err(anyhow::anyhow!("listener task for {local} failed: {join_err}")),
            Err(_elapsed) => {
                info!("listener started on {local}");
                self.inner.listeners.lock().unwrap().push(ListenerEntry {
                    addr: local,
                    close: close_tx,
                    _task: task,
                });
                Ok(local)
            }
        }
    }

    /// Close all listeners now. Idempotent; also triggered by the
    /// lifecycle closing signal.
    pub fn shutdown(&self) {
        self.inner.close_all();
    }

    /// Number of listeners currently registered.
    pub fn listener_count(&self) -> usize {
        self.inner.listeners.lock().unwrap().len()
    }
}

impl std::fmt::Debug for Server {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Server")
            .field("listeners", &self.listener_count())
            .field("startup_window", &self.inner.startup_window)
            .finish()
    }
}
