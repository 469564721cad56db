//! Upgrade gate behavior: route matching, verification, origin policy,
//! process gate, and subprotocol echo.

mod common;

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use axum::http::{HeaderMap, Method, Uri};
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::Error as WsError;

use trellis_core::OriginPolicy;
use trellis_server::{Meta, VerifyHook};

use common::{http_url, start_gate, ws_url};

struct CountingVerify {
    calls: Arc<AtomicUsize>,
    fail: bool,
}

#[async_trait]
impl VerifyHook for CountingVerify {
    async fn verify(&self, _: &Method, _: &Uri, _: &HeaderMap) -> anyhow::Result<Meta> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.fail {
            anyhow::bail!("verification rejected");
        }
        let mut meta = Meta::new();
        meta.insert("uid".to_string(), "42".to_string());
        Ok(meta)
    }
}

#[tokio::test]
async fn route_mismatch_is_404_and_skips_verify() {
    let calls = Arc::new(AtomicUsize::new(0));
    let h = start_gate(|g| {
        g.with_route("/ws").with_verify(Arc::new(CountingVerify {
            calls: Arc::clone(&calls),
            fail: false,
        }))
    })
    .await;

    let resp = reqwest::get(http_url(h.addr, "/other")).await.unwrap();

    assert_eq!(resp.status().as_u16(), 404);
    assert_eq!(resp.text().await.unwrap(), "404 page not found");
    assert_eq!(calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn verify_error_is_500_and_no_socket_is_registered() {
    let calls = Arc::new(AtomicUsize::new(0));
    let h = start_gate(|g| {
        g.with_route("/ws").with_verify(Arc::new(CountingVerify {
            calls: Arc::clone(&calls),
            fail: true,
        }))
    })
    .await;

    let resp = reqwest::get(http_url(h.addr, "/ws")).await.unwrap();

    assert_eq!(resp.status().as_u16(), 500);
    assert_eq!(resp.text().await.unwrap(), "verification rejected");
    assert_eq!(calls.load(Ordering::SeqCst), 1);
    assert_eq!(h.registry.count().await, 0);
}

#[tokio::test]
async fn stopped_service_rejects_before_verify() {
    let calls = Arc::new(AtomicUsize::new(0));
    let h = start_gate(|g| {
        g.with_route("/ws").with_verify(Arc::new(CountingVerify {
            calls: Arc::clone(&calls),
            fail: false,
        }))
    })
    .await;

    h.lifecycle.stop();
    let resp = reqwest::get(http_url(h.addr, "/ws")).await.unwrap();

    assert_eq!(resp.status().as_u16(), 500);
    assert_eq!(resp.text().await.unwrap(), "server is stopped");
    assert_eq!(calls.load(Ordering::SeqCst), 0);
    assert_eq!(h.registry.count().await, 0);
}

#[tokio::test]
async fn head_request_failure_has_empty_body() {
    let h = start_gate(|g| {
        g.with_route("/ws").with_verify(Arc::new(CountingVerify {
            calls: Arc::new(AtomicUsize::new(0)),
            fail: true,
        }))
    })
    .await;

    let client = reqwest::Client::new();
    let resp = client.head(http_url(h.addr, "/ws")).send().await.unwrap();

    assert_eq!(resp.status().as_u16(), 500);
    assert!(resp.text().await.unwrap().is_empty());
}

#[tokio::test]
async fn origin_allowlist_is_enforced() {
    let h = start_gate(|g| {
        g.with_route("/ws")
            .with_origin(OriginPolicy::new(vec!["example.com".to_string()]))
    })
    .await;

    let mut allowed = ws_url(h.addr, "/ws").into_client_request().unwrap();
    allowed
        .headers_mut()
        .insert("Origin", "https://example.com".parse().unwrap());
    let (ws, _) = connect_async(allowed)
        .await
        .expect("allowed origin should connect");
    drop(ws);

    let mut rejected = ws_url(h.addr, "/ws").into_client_request().unwrap();
    rejected
        .headers_mut()
        .insert("Origin", "https://evil.test".parse().unwrap());
    match connect_async(rejected).await {
        Err(WsError::Http(resp)) => assert_eq!(resp.status().as_u16(), 500),
        other => panic!("expected http rejection, got {other:?}"),
    }
}

#[tokio::test]
async fn missing_origin_header_is_allowed() {
    let h = start_gate(|g| {
        g.with_route("/ws")
            .with_origin(OriginPolicy::new(vec!["example.com".to_string()]))
    })
    .await;

    // tungstenite sends no Origin header by default.
    let (ws, _) = connect_async(ws_url(h.addr, "/ws"))
        .await
        .expect("non-browser client should connect");
    drop(ws);
}

#[tokio::test]
async fn subprotocol_is_echoed_verbatim() {
    let h = start_gate(|g| g.with_route("/ws")).await;

    let mut request = ws_url(h.addr, "/ws").into_client_request().unwrap();
    request
        .headers_mut()
        .insert("Sec-WebSocket-Protocol", "trellis.v1".parse().unwrap());
    let (_ws, resp) = connect_async(request).await.unwrap();

    assert_eq!(
        resp.headers().get("sec-websocket-protocol").unwrap(),
        "trellis.v1"
    );
}

#[tokio::test]
async fn accept_receives_handle_and_verify_metadata() {
    let mut h = start_gate(|g| {
        g.with_route("/ws").with_verify(Arc::new(CountingVerify {
            calls: Arc::new(AtomicUsize::new(0)),
            fail: false,
        }))
    })
    .await;

    let (_ws, _) = connect_async(ws_url(h.addr, "/ws")).await.unwrap();
    let (socket, meta) = h.accepted.recv().await.unwrap();

    assert_eq!(meta.get("uid").map(String::as_str), Some("42"));
    assert_eq!(h.registry.count().await, 1);
    assert!(h.registry.get(socket.id()).await.is_some());
}
