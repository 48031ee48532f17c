//! Single-use loopback listener for the OAuth redirect
//!
//! Serves `GET /callback` on a loopback address until the first redirect
//! arrives, hands the query parameters back through a oneshot channel, and
//! then shuts itself down. The oneshot sender sits in a `Mutex<Option<_>>`
//! so only the first request can take it; later requests get a 409 and can
//! never block the handshake.
//!
//! Shutdown handshake:
//! 1. handler sends the params on `done`
//! 2. `wait()` receives them (or times out) and fires the close signal
//! 3. axum drains and the server task's result is the close result

use std::net::SocketAddr;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use axum::Router;
use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::response::{Html, IntoResponse};
use axum::routing::get;
use serde::Deserialize;
use tokio::net::TcpListener;
use tokio::sync::oneshot;
use tracing::{debug, info, warn};

use crate::constants::CALLBACK_PATH;
use crate::error::{Error, Result};

/// How long the server may take to drain after the callback was captured.
const CLOSE_TIMEOUT: Duration = Duration::from_secs(5);

const RECEIVED_PAGE: &str = r#"<!DOCTYPE html>
<html>
<head><title>playlistinator</title></head>
<body style="font-family: system-ui; text-align: center; padding-top: 80px;">
<h2>Authorization received</h2>
<p>You can close this tab and return to the terminal.</p>
</body>
</html>"#;

const ALREADY_RECEIVED_PAGE: &str = r#"<!DOCTYPE html>
<html>
<head><title>playlistinator</title></head>
<body style="font-family: system-ui; text-align: center; padding-top: 80px;">
<h2>Authorization already received</h2>
</body>
</html>"#;

/// Query parameters of the redirect.
///
/// The authorization server sends `code` + `state` on success and
/// `error` + `state` when the user declines.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct CallbackParams {
    pub state: Option<String>,
    pub code: Option<String>,
    pub error: Option<String>,
}

type DoneSlot = Arc<Mutex<Option<oneshot::Sender<CallbackParams>>>>;

/// Router serving only the callback path; everything else is a 404.
fn callback_router(done: DoneSlot) -> Router {
    Router::new()
        .route(CALLBACK_PATH, get(handle_callback))
        .with_state(done)
}

async fn handle_callback(
    State(done): State<DoneSlot>,
    Query(params): Query<CallbackParams>,
) -> impl IntoResponse {
    let sender = done.lock().ok().and_then(|mut slot| slot.take());
    match sender {
        Some(tx) => {
            debug!(
                has_code = params.code.is_some(),
                has_error = params.error.is_some(),
                "authorization callback received"
            );
            // The receiver only disappears if wait() already gave up
            let _ = tx.send(params);
            (StatusCode::OK, Html(RECEIVED_PAGE))
        }
        None => {
            warn!("ignoring duplicate authorization callback");
            (StatusCode::CONFLICT, Html(ALREADY_RECEIVED_PAGE))
        }
    }
}

/// A bound, not yet serving, callback listener.
///
/// Binding is separate from serving so the flow can fail fast on a busy
/// port before the user is sent to the browser.
pub struct CallbackListener {
    listener: TcpListener,
    local_addr: SocketAddr,
}

impl CallbackListener {
    pub async fn bind(addr: SocketAddr) -> Result<Self> {
        let listener = TcpListener::bind(addr).await.map_err(|e| {
            Error::Callback(format!(
                "failed to bind callback listener on {addr}: {e} (is another process using the port?)"
            ))
        })?;
        let local_addr = listener
            .local_addr()
            .map_err(|e| Error::Callback(format!("callback listener has no local address: {e}")))?;
        Ok(Self {
            listener,
            local_addr,
        })
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Serve until one callback arrives or `timeout` elapses, then close.
    ///
    /// Returns the callback parameters only if the server also closed
    /// cleanly. A timeout takes precedence over close errors.
    pub async fn wait(self, timeout: Duration) -> Result<CallbackParams> {
        let (done_tx, done_rx) = oneshot::channel();
        let (close_tx, close_rx) = oneshot::channel::<()>();
        let app = callback_router(Arc::new(Mutex::new(Some(done_tx))));

        info!(addr = %self.local_addr, "waiting for authorization callback");

        let mut server = tokio::spawn(async move {
            axum::serve(self.listener, app)
                .with_graceful_shutdown(async {
                    let _ = close_rx.await;
                })
                .await
        });

        let received = tokio::time::timeout(timeout, done_rx).await;

        let _ = close_tx.send(());
        let closed = match tokio::time::timeout(CLOSE_TIMEOUT, &mut server).await {
            Ok(Ok(Ok(()))) => {
                debug!("callback listener closed");
                Ok(())
            }
            Ok(Ok(Err(e))) => Err(Error::Callback(format!("callback listener failed: {e}"))),
            Ok(Err(e)) => Err(Error::Callback(format!("callback listener task failed: {e}"))),
            Err(_) => {
                server.abort();
                Err(Error::Callback(format!(
                    "callback listener did not close within {}s",
                    CLOSE_TIMEOUT.as_secs()
                )))
            }
        };

        let params = match received {
            Err(_) => return Err(Error::Timeout(timeout)),
            Ok(Err(_)) => {
                return Err(Error::Callback(
                    "callback listener stopped before a redirect arrived".into(),
                ));
            }
            Ok(Ok(params)) => params,
        };
        closed?;
        Ok(params)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::Request;
    use tower::ServiceExt;

    fn slot() -> (DoneSlot, oneshot::Receiver<CallbackParams>) {
        let (tx, rx) = oneshot::channel();
        (Arc::new(Mutex::new(Some(tx))), rx)
    }

    #[tokio::test]
    async fn router_captures_state_and_code() {
        let (done, rx) = slot();
        let response = callback_router(done)
            .oneshot(
                Request::get("/callback?state=s-1&code=c-1")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let params = rx.await.unwrap();
        assert_eq!(params.state.as_deref(), Some("s-1"));
        assert_eq!(params.code.as_deref(), Some("c-1"));
        assert!(params.error.is_none());
    }

    #[tokio::test]
    async fn second_callback_does_not_block() {
        let (done, rx) = slot();
        let app = callback_router(done);

        let first = app
            .clone()
            .oneshot(Request::get("/callback?state=a&code=1").body(Body::empty()).unwrap())
            .await
            .unwrap();
        let second = app
            .oneshot(Request::get("/callback?state=b&code=2").body(Body::empty()).unwrap())
            .await
            .unwrap();

        assert_eq!(first.status(), StatusCode::OK);
        assert_eq!(second.status(), StatusCode::CONFLICT);
        assert_eq!(rx.await.unwrap().state.as_deref(), Some("a"));
    }

    #[tokio::test]
    async fn other_paths_are_not_served() {
        let (done, _rx) = slot();
        let response = callback_router(done)
            .oneshot(Request::get("/").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn listener_returns_params_and_shuts_down() {
        let listener = CallbackListener::bind("127.0.0.1:0".parse().unwrap())
            .await
            .unwrap();
        let addr = listener.local_addr();

        let waiter = tokio::spawn(listener.wait(Duration::from_secs(10)));

        let body = reqwest::get(format!("http://{addr}/callback?state=st&code=cd"))
            .await
            .unwrap()
            .text()
            .await
            .unwrap();
        assert!(body.contains("Authorization received"));

        let params = waiter.await.unwrap().unwrap();
        assert_eq!(params.code.as_deref(), Some("cd"));
        assert_eq!(params.state.as_deref(), Some("st"));

        // The port is released once wait() returns
        assert!(reqwest::get(format!("http://{addr}/callback")).await.is_err());
    }

    #[tokio::test]
    async fn listener_times_out_without_callback() {
        let listener = CallbackListener::bind("127.0.0.1:0".parse().unwrap())
            .await
            .unwrap();

        let err = listener.wait(Duration::from_millis(50)).await.unwrap_err();
        assert!(matches!(err, Error::Timeout(d) if d == Duration::from_millis(50)));
    }

    #[tokio::test]
    async fn bind_conflict_is_reported() {
        let first = CallbackListener::bind("127.0.0.1:0".parse().unwrap())
            .await
            .unwrap();
        let err = CallbackListener::bind(first.local_addr())
            .await
            .err()
            .unwrap();
        assert!(matches!(err, Error::Callback(_)));
    }
}
