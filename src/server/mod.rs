//! Development server: static files with caching disabled, plus the
//! live-reload channel
//!
//! `/reload` upgrades to a WebSocket that waits for the next completed
//! build, pushes the literal text `reload` exactly once, and closes. The
//! page's injected script reconnects after reloading, so each connection
//! only ever needs one notice.

use std::net::SocketAddr;
use std::path::Path;
use std::sync::Arc;

use anyhow::Result;
use axum::{
    extract::{
        ws::{Message, WebSocket},
        State, WebSocketUpgrade,
    },
    http::{header, HeaderValue},
    response::IntoResponse,
    routing::get,
    Router,
};
use tokio::sync::broadcast;
use tower_http::{services::ServeDir, set_header::SetResponseHeaderLayer};

use crate::Site;

/// Unit event: a build finished and open browser sessions should refresh.
/// Broadcast to exactly the connections subscribed at that moment.
#[derive(Debug, Clone, Copy)]
pub struct ReloadNotice;

struct AppState {
    reload_tx: broadcast::Sender<ReloadNotice>,
}

/// Start the development server.
pub async fn serve(site: &Site, port: u16, reload_tx: broadcast::Sender<ReloadNotice>) -> Result<()> {
    let app = router(&site.out_dir, reload_tx);

    let addr: SocketAddr = format!("127.0.0.1:{}", port).parse()?;
    let listener = tokio::net::TcpListener::bind(addr).await?;

    println!("Serving {} at http://{}", site.out_dir.display(), addr);
    println!("Press Ctrl+C to stop.");

    axum::serve(listener, app).await?;
    Ok(())
}

/// Routes: the reload endpoint plus the output tree as static files.
/// Every response carries headers disabling all caching; the build may
/// replace any file at any time.
fn router(out_dir: &Path, reload_tx: broadcast::Sender<ReloadNotice>) -> Router {
    let state = Arc::new(AppState { reload_tx });

    Router::new()
        .route("/reload", get(reload_handler))
        .fallback_service(ServeDir::new(out_dir).append_index_html_on_directories(true))
        .layer(SetResponseHeaderLayer::overriding(
            header::CACHE_CONTROL,
            HeaderValue::from_static("no-cache, no-store, must-revalidate"),
        ))
        .layer(SetResponseHeaderLayer::overriding(
            header::PRAGMA,
            HeaderValue::from_static("no-cache"),
        ))
        .layer(SetResponseHeaderLayer::overriding(
            header::EXPIRES,
            HeaderValue::from_static("0"),
        ))
        .with_state(state)
}

async fn reload_handler(
    ws: WebSocketUpgrade,
    State(state): State<Arc<AppState>>,
) -> impl IntoResponse {
    // subscribe before the upgrade completes so a build finishing during
    // the handshake is not missed
    let reload_rx = state.reload_tx.subscribe();
    ws.on_upgrade(move |socket| notify_on_rebuild(socket, reload_rx))
}

/// Block until the next build completes, push one reload message, close.
/// A client disconnect while waiting just drops the subscription; other
/// waiting connections still get the notice.
async fn notify_on_rebuild(mut socket: WebSocket, mut reload_rx: broadcast::Receiver<ReloadNotice>) {
    tracing::debug!("live reload client connected");

    loop {
        tokio::select! {
            result = reload_rx.recv() => {
                match result {
                    Ok(ReloadNotice) => {
                        if socket.send(Message::Text("reload".to_string())).await.is_ok() {
                            let _ = socket.send(Message::Close(None)).await;
                        }
                        break;
                    }
                    Err(broadcast::error::RecvError::Lagged(_)) => continue,
                    Err(broadcast::error::RecvError::Closed) => break,
                }
            }
            msg = socket.recv() => {
                match msg {
                    Some(Ok(Message::Ping(data))) => {
                        if socket.send(Message::Pong(data)).await.is_err() {
                            break;
                        }
                    }
                    Some(Ok(Message::Close(_))) | None => break,
                    _ => {}
                }
            }
        }
    }

    tracing::debug!("live reload client disconnected");
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use std::fs;
    use tower::ServiceExt;

    fn test_router(out_dir: &Path) -> Router {
        let (reload_tx, _) = broadcast::channel(16);
        router(out_dir, reload_tx)
    }

    #[tokio::test]
    async fn test_static_serving_disables_caching() {
        let tmp = tempfile::tempdir().unwrap();
        fs::write(tmp.path().join("index.html"), "<html></html>").unwrap();

        let response = test_router(tmp.path())
            .oneshot(
                Request::builder()
                    .uri("/index.html")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let headers = response.headers();
        assert_eq!(
            headers[header::CACHE_CONTROL],
            "no-cache, no-store, must-revalidate"
        );
        assert_eq!(headers[header::PRAGMA], "no-cache");
        assert_eq!(headers[header::EXPIRES], "0");
    }

    #[tokio::test]
    async fn test_directory_request_serves_index() {
        let tmp = tempfile::tempdir().unwrap();
        fs::write(tmp.path().join("index.html"), "home").unwrap();

        let response = test_router(tmp.path())
            .oneshot(Request::builder().uri("/").body(Body::empty()).unwrap())
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn test_missing_file_is_not_found_not_a_crash() {
        // mid-rebuild the output tree can be briefly empty; requests must
        // degrade to 404, never bring the server down
        let tmp = tempfile::tempdir().unwrap();

        let response = test_router(tmp.path())
            .oneshot(
                Request::builder()
                    .uri("/gone.html")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_notice_reaches_only_connections_open_at_completion() {
        let (reload_tx, _keep_alive) = broadcast::channel::<ReloadNotice>(16);

        let mut before = reload_tx.subscribe();
        reload_tx.send(ReloadNotice).unwrap();
        assert!(before.try_recv().is_ok());

        // a connection arriving after the build completed waits for the next one
        let mut after = reload_tx.subscribe();
        assert!(matches!(
            after.try_recv(),
            Err(broadcast::error::TryRecvError::Empty)
        ));
    }
}
