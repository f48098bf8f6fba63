//! # Dev Server
//!
//! Hosts the development bundle for a widget container. The main port
//! serves `dist/release`, the widget metadata and a live-reload event
//! stream; the next port up answers plaintext status probes.

use crate::bundler::{BuildEvent, BuildEvents};
use crate::config::RELEASE_CODE_PATH;
use anyhow::{Context, Result};
use axum::extract::State;
use axum::http::header;
use axum::response::sse::{Event, KeepAlive, Sse};
use axum::response::IntoResponse;
use axum::routing::get;
use axum::{Json, Router};
use serde::Serialize;
use serde_json::json;
use std::convert::Infallible;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use tokio_stream::wrappers::BroadcastStream;
use tokio_stream::{Stream, StreamExt};
use tower_http::cors::{Any, CorsLayer};
use tower_http::services::ServeDir;
use tower_http::trace::TraceLayer;

/// Path of the live-reload event stream
pub const LIVE_RELOAD_PATH: &str = "/widget-cli/sockjs-node";

/// 1x1 transparent PNG used as a reachability probe
const PING_PNG: &[u8] = &[
    0x89, 0x50, 0x4e, 0x47, 0x0d, 0x0a, 0x1a, 0x0a, 0x00, 0x00, 0x00, 0x0d, 0x49, 0x48, 0x44, 0x52,
    0x00, 0x00, 0x00, 0x01, 0x00, 0x00, 0x00, 0x01, 0x08, 0x06, 0x00, 0x00, 0x00, 0x1f, 0x15, 0xc4,
    0x89, 0x00, 0x00, 0x00, 0x0a, 0x49, 0x44, 0x41, 0x54, 0x78, 0x9c, 0x63, 0x00, 0x01, 0x00, 0x00,
    0x05, 0x00, 0x01, 0x0d, 0x0a, 0x2d, 0xb4, 0x00, 0x00, 0x00, 0x00, 0x49, 0x45, 0x4e, 0x44, 0xae,
    0x42, 0x60, 0x82,
];

#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum Protocol {
    Http,
    Https,
}

impl Protocol {
    pub fn scheme(self) -> &'static str {
        match self {
            Protocol::Http => "http",
            Protocol::Https => "https",
        }
    }
}

/// Metadata the widget container reads before loading the bundle
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct WidgetInfo {
    pub sandbox: Option<bool>,
    pub package_id: String,
}

#[derive(Debug, Clone)]
pub struct TlsFiles {
    pub cert: PathBuf,
    pub key: PathBuf,
}

#[derive(Debug, Clone)]
pub struct DevServerOptions {
    pub root: PathBuf,
    pub port: u16,
    pub protocol: Protocol,
    pub tls: Option<TlsFiles>,
    pub widget: WidgetInfo,
}

impl DevServerOptions {
    /// Address to paste into the widget container
    pub fn bundle_url(&self, bundle_name: &str) -> String {
        format!(
            "{}://localhost:{}/{}",
            self.protocol.scheme(),
            self.port,
            bundle_name
        )
    }
}

#[derive(Clone)]
struct AppState {
    events: BuildEvents,
    widget: WidgetInfo,
}

fn cors() -> CorsLayer {
    CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any)
}

/// Routes on the main port
pub fn widget_router(root: &Path, widget: WidgetInfo, events: BuildEvents) -> Router {
    let state = AppState { events, widget };

    Router::new()
        .route("/widgetConfig", get(widget_config))
        .route(LIVE_RELOAD_PATH, get(live_reload))
        .fallback_service(ServeDir::new(root.join(RELEASE_CODE_PATH)))
        .layer(cors())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Routes on the plaintext status port
pub fn status_router() -> Router {
    Router::new()
        .route("/widget-cli/info", get(info))
        .route("/ping.png", get(ping))
        .layer(cors())
}

async fn widget_config(State(state): State<AppState>) -> Json<WidgetInfo> {
    Json(state.widget)
}

async fn live_reload(
    State(state): State<AppState>,
) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    tracing::debug!("live reload client connected");
    let stream = BroadcastStream::new(state.events.subscribe()).filter_map(|event| match event {
        Ok(BuildEvent::Succeeded) => Some(Ok(Event::default()
            .event("liveReload")
            .data(r#"{"type":"liveReload"}"#))),
        // failed builds keep the page as is; lagged clients just wait for the next build
        _ => None,
    });

    Sse::new(stream).keep_alive(KeepAlive::default())
}

async fn info() -> impl IntoResponse {
    Json(json!({ "version": env!("CARGO_PKG_VERSION") }))
}

async fn ping() -> impl IntoResponse {
    (
        [
            (header::CONTENT_TYPE, "image/png"),
            (header::CACHE_CONTROL, "no-store"),
        ],
        PING_PNG,
    )
}

/// Serve both ports until one of them fails
pub async fn serve(options: DevServerOptions, events: BuildEvents) -> Result<()> {
    let status_port = options
        .port
        .checked_add(1)
        .context("Port is too large, the status port needs the next one")?;
    let main_addr = SocketAddr::from(([0, 0, 0, 0], options.port));
    let status_addr = SocketAddr::from(([0, 0, 0, 0], status_port));

    let app = widget_router(&options.root, options.widget.clone(), events);

    let status_listener = tokio::net::TcpListener::bind(status_addr)
        .await
        .with_context(|| format!("Failed to bind status port {}", status_port))?;
    let status = async move {
        axum::serve(status_listener, status_router())
            .await
            .context("Status server failed")
    };

    let main = async move {
        match (options.protocol, options.tls) {
            (Protocol::Https, Some(tls)) => {
                let config = axum_server::tls_rustls::RustlsConfig::from_pem_file(&tls.cert, &tls.key)
                    .await
                    .with_context(|| {
                        format!(
                            "Failed to load TLS certificate {} and key {}",
                            tls.cert.display(),
                            tls.key.display()
                        )
                    })?;
                tracing::info!(addr = %main_addr, "serving widget over https");
                axum_server::bind_rustls(main_addr, config)
                    .serve(app.into_make_service())
                    .await
                    .context("Dev server failed")
            }
            (Protocol::Https, None) => {
                anyhow::bail!("HTTPS needs a certificate: pass --cert and --key")
            }
            (Protocol::Http, _) => {
                let listener = tokio::net::TcpListener::bind(main_addr)
                    .await
                    .with_context(|| format!("Failed to bind port {}", options.port))?;
                tracing::info!(addr = %main_addr, "serving widget over http");
                axum::serve(listener, app).await.context("Dev server failed")
            }
        }
    };

    tokio::try_join!(main, status)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bundler::build_channel;
    use std::time::Duration;
    use tempfile::TempDir;

    async fn spawn(router: Router) -> String {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            let _ = axum::serve(listener, router).await;
        });
        format!("http://{}", addr)
    }

    fn widget() -> WidgetInfo {
        WidgetInfo {
            sandbox: Some(true),
            package_id: "wpkDeveloper".into(),
        }
    }

    #[tokio::test]
    async fn test_serves_bundle_and_widget_config() {
        let dir = TempDir::new().unwrap();
        std::fs::create_dir_all(dir.path().join("dist/release")).unwrap();
        std::fs::write(dir.path().join("dist/release/widget_bundle.js"), "bundle()").unwrap();
        let base = spawn(widget_router(dir.path(), widget(), build_channel())).await;

        let bundle = reqwest::get(format!("{}/widget_bundle.js", base)).await.unwrap();
        assert!(bundle.status().is_success());
        assert_eq!(bundle.text().await.unwrap(), "bundle()");

        let config: serde_json::Value = reqwest::get(format!("{}/widgetConfig", base))
            .await
            .unwrap()
            .json()
            .await
            .unwrap();
        assert_eq!(config, json!({ "sandbox": true, "packageId": "wpkDeveloper" }));

        let missing = reqwest::get(format!("{}/nope.js", base)).await.unwrap();
        assert_eq!(missing.status(), reqwest::StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_status_port_routes() {
        let base = spawn(status_router()).await;

        let info: serde_json::Value = reqwest::get(format!("{}/widget-cli/info", base))
            .await
            .unwrap()
            .json()
            .await
            .unwrap();
        assert_eq!(info["version"], env!("CARGO_PKG_VERSION"));

        let ping = reqwest::get(format!("{}/ping.png", base)).await.unwrap();
        assert_eq!(ping.headers()["content-type"], "image/png");
        assert_eq!(ping.bytes().await.unwrap().as_ref(), PING_PNG);
    }

    #[tokio::test]
    async fn test_successful_build_pushes_live_reload() {
        let dir = TempDir::new().unwrap();
        let events = build_channel();
        let base = spawn(widget_router(dir.path(), widget(), events.clone())).await;

        let mut stream = reqwest::get(format!("{}{}", base, LIVE_RELOAD_PATH))
            .await
            .unwrap();
        assert_eq!(stream.headers()["content-type"], "text/event-stream");

        events
            .send(BuildEvent::Failed {
                errors: vec!["ERROR".into()],
            })
            .unwrap();
        events.send(BuildEvent::Succeeded).unwrap();

        let chunk = tokio::time::timeout(Duration::from_secs(5), stream.chunk())
            .await
            .unwrap()
            .unwrap()
            .unwrap();
        let text = String::from_utf8_lossy(&chunk);
        assert!(text.contains("event: liveReload"));
        assert!(text.contains(r#"{"type":"liveReload"}"#));
    }

    #[test]
    fn test_bundle_url() {
        let options = DevServerOptions {
            root: PathBuf::from("/widget"),
            port: 9000,
            protocol: Protocol::Https,
            tls: None,
            widget: widget(),
        };
        assert_eq!(
            options.bundle_url("widget_bundle.js"),
            "https://localhost:9000/widget_bundle.js"
        );
    }
}
