//! WebSocket upgrade gate and message-socket adapter.
//!
//! Sits between the HTTP upgrade handshake and a connection framework
//! that expects discrete application messages: [`Gate`] runs the
//! per-request upgrade state machine, [`Conn`] adapts one accepted
//! WebSocket into message-level reads and writes, and [`Server`] owns
//! the listeners that route requests into the gate.

pub mod config;
pub mod conn;
pub mod logging;
pub mod server;
pub mod socket;
pub mod upgrade;

pub use config::GateConfig;
pub use conn::{Conn, ConnError, ConnReader, ConnWriter};
pub use logging::init_logging;
pub use server::{Server, DEFAULT_STARTUP_WINDOW};
pub use socket::{RegistryError, Socket, SocketHandle, SocketPool, SocketRegistry};
pub use upgrade::{handle_upgrade, AcceptHook, Gate, Meta, NoAccept, NoVerify, VerifyHook};
