//! The upgrade gate: per-request handshake state machine.
//!
//! Order per request, terminal at the first failure: process gate,
//! route match, verify, origin check, protocol upgrade, socket
//! registration, accept callback. Every abort path answers with a
//! plain-text diagnostic (omitted for HEAD) and logs an alert.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use axum::extract::ws::WebSocketUpgrade;
use axum::extract::State;
use axum::http::{header, HeaderMap, Method, StatusCode, Uri};
use axum::response::{IntoResponse, Response};
use axum::Router;
use tower_http::trace::TraceLayer;
use tracing::error;

use trellis_core::{
    BytesPool, Identity, LifecycleEvents, MessagePool, OriginPolicy, Transform,
};

use crate::config::GateConfig;
use crate::conn::Conn;
use crate::socket::{SocketHandle, SocketRegistry};

/// String-keyed metadata produced by verification, forwarded to accept.
pub type Meta = HashMap<String, String>;

/// Inspects the handshake request before the upgrade is attempted.
///
/// An error here rejects the handshake with a 500 and the error text
/// as body.
#[async_trait]
pub trait VerifyHook: Send + Sync {
    async fn verify(&self, method: &Method, uri: &Uri, headers: &HeaderMap)
        -> anyhow::Result<Meta>;
}

/// Default verify hook: accepts every request with empty metadata.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoVerify;

#[async_trait]
impl VerifyHook for NoVerify {
    async fn verify(&self, _: &Method, _: &Uri, _: &HeaderMap) -> anyhow::Result<Meta> {
        Ok(Meta::new())
    }
}

/// Receives the new socket handle once registration succeeds.
/// Invoked synchronously in the handling task, fire-and-forget.
pub trait AcceptHook: Send + Sync {
    fn accept(&self, socket: SocketHandle, meta: Meta);
}

impl<F> AcceptHook for F
where
    F: Fn(SocketHandle, Meta) + Send + Sync,
{
    fn accept(&self, socket: SocketHandle, meta: Meta) {
        self(socket, meta)
    }
}

/// Default accept hook: does nothing. The registry still holds the
/// socket.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoAccept;

impl AcceptHook for NoAccept {
    fn accept(&self, _socket: SocketHandle, _meta: Meta) {}
}

/// The upgrade gate. All hooks are capabilities selected at
/// construction; none is ever null-checked at call time.
pub struct Gate {
    route: Option<String>,
    origin: OriginPolicy,
    verify: Arc<dyn VerifyHook>,
    accept: Arc<dyn AcceptHook>,
    registry: Arc<dyn SocketRegistry>,
    transform: Arc<dyn Transform>,
    pool: Arc<dyn MessagePool>,
    lifecycle: Arc<LifecycleEvents>,
}

impl Gate {
    pub fn new(registry: Arc<dyn SocketRegistry>, lifecycle: Arc<LifecycleEvents>) -> Self {
        Self {
            route: None,
            origin: OriginPolicy::allow_all(),
            verify: Arc::new(NoVerify),
            accept: Arc::new(NoAccept),
            registry,
            transform: Arc::new(Identity),
            pool: Arc::new(BytesPool),
            lifecycle,
        }
    }

    /// Build a gate with route and origin list taken from `config`.
    pub fn from_config(
        config: &GateConfig,
        registry: Arc<dyn SocketRegistry>,
        lifecycle: Arc<LifecycleEvents>,
    ) -> Self {
        let mut gate = Self::new(registry, lifecycle).with_origin(config.origin_policy());
        if let Some(route) = &config.route {
            gate = gate.with_route(route.clone());
        }
        gate
    }

    /// Restrict the gate to one path; other paths get 404.
    pub fn with_route(mut self, route: impl Into<String>) -> Self {
        self.route = Some(route.into());
        self
    }

    pub fn with_origin(mut self, origin: OriginPolicy) -> Self {
        self.origin = origin;
        self
    }

    pub fn with_verify(mut self, hook: Arc<dyn VerifyHook>) -> Self {
        self.verify = hook;
        self
    }

    pub fn with_accept(mut self, hook: Arc<dyn AcceptHook>) -> Self {
        self.accept = hook;
        self
    }

    pub fn with_transform(mut self, transform: Arc<dyn Transform>) -> Self {
        self.transform = transform;
        self
    }

    pub fn with_message_pool(mut self, pool: Arc<dyn MessagePool>) -> Self {
        self.pool = pool;
        self
    }

    /// Mount the gate on a fresh router. The gate answers every path
    /// itself so route mismatches produce its own 404.
    pub fn into_router(self) -> Router {
        Router::new()
            .fallback(handle_upgrade)
            .layer(TraceLayer::new_for_http())
            .with_state(Arc::new(self))
    }

    async fn handle(
        &self,
        method: Method,
        uri: Uri,
        headers: HeaderMap,
        ws: Option<WebSocketUpgrade>,
    ) -> Response {
        if self.lifecycle.is_stopped() {
            return self.reject(&method, anyhow::anyhow!("server is stopped"));
        }
        if let Some(route) = &self.route {
            if uri.path() != route {
                return (StatusCode::NOT_FOUND, "404 page not found").into_response();
            }
        }
        let meta = match self.verify.verify(&method, &uri, &headers).await {
            Ok(meta) => meta,
            Err(err) => return self.reject(&method, err),
        };
        // Requests without an Origin header are non-browser clients and
        // pass; a present header must satisfy the policy.
        if let Some(value) = headers.get(header::ORIGIN) {
            let origin = value.to_str().unwrap_or_default();
            if !self.origin.allows(origin) {
                return self.reject(&method, anyhow::anyhow!("origin {origin:?} not allowed"));
            }
        }
        let Some(ws) = ws else {
            return self.reject(&method, anyhow::anyhow!("not a websocket upgrade request"));
        };

        let registry = Arc::clone(&self.registry);
        let accept = Arc::clone(&self.accept);
        let transform = Arc::clone(&self.transform);
        let pool = Arc::clone(&self.pool);
        let mut response = ws.on_upgrade(move |socket| async move {
            let conn = Conn::new(socket, transform, pool);
            // The response is already hijacked here; a failed
            // registration can only be logged and the transport dropped.
            match registry.register(conn).await {
                Ok(handle) => accept.accept(handle, meta),
                Err(err) => error!("socket registration failed: {err}"),
            }
        });
        // Echo the requested subprotocol verbatim.
        if let Some(protocol) = headers.get(header::SEC_WEBSOCKET_PROTOCOL) {
            response
                .headers_mut()
                .insert(header::SEC_WEBSOCKET_PROTOCOL, protocol.clone());
        }
        response
    }

    fn reject(&self, method: &Method, err: anyhow::Error) -> Response {
        error!("websocket upgrade rejected: {err}");
        let body = if method == Method::HEAD {
            String::new()
        } else {
            err.to_string()
        };
        (StatusCode::INTERNAL_SERVER_ERROR, body).into_response()
    }
}

impl std::fmt::Debug for Gate {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Gate")
            .field("route", &self.route)
            .field("origin", &self.origin)
            .finish()
    }
}

/// Axum handler running the gate's state machine for one request.
pub async fn handle_upgrade(
    State(gate): State<Arc<Gate>>,
    method: Method,
    uri: Uri,
    headers: HeaderMap,
    ws: Option<WebSocketUpgrade>,
) -> Response {
    gate.handle(method, uri, headers, ws).await
}
