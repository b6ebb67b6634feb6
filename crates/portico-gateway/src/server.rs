//! Gateway assembly: state, router, plain and TLS listeners.

use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use axum::Router;
use axum::extract::State;
use axum::response::Json;
use axum::routing::get;
use hyper_util::rt::TokioIo;
use hyper_util::service::TowerToHyperService;
use metrics_exporter_prometheus::PrometheusHandle;
use portico_settings::{PorticoSettings, TlsSettings};
use serde_json::json;
use tokio::net::TcpListener;
use tokio_rustls::TlsAcceptor;
use tokio_rustls::rustls;
use tower_http::trace::TraceLayer;
use tracing::{debug, info};

use crate::auth::AuthGate;
use crate::identity::{HttpIdentityVerifier, IdentityVerifier};
use crate::proxy::dispatch;
use crate::routes::RouteTable;

/// Shared state handed to the dispatcher.
#[derive(Clone)]
pub struct AppState {
    /// The static route table.
    pub routes: Arc<RouteTable>,
    /// Auth gate for private routes.
    pub auth: Arc<AuthGate>,
    /// HTTP client used to forward requests upstream.
    pub http: reqwest::Client,
    /// Renders the `/metrics` endpoint.
    pub metrics: PrometheusHandle,
}

impl AppState {
    /// Assemble state from prebuilt parts (used directly by tests).
    pub fn new(
        routes: RouteTable,
        verifier: Arc<dyn IdentityVerifier>,
        http: reqwest::Client,
        metrics: PrometheusHandle,
    ) -> Self {
        Self {
            routes: Arc::new(routes),
            auth: Arc::new(AuthGate::new(verifier)),
            http,
            metrics,
        }
    }

    /// Wire the production state from settings.
    pub fn from_settings(
        settings: &PorticoSettings,
        metrics: PrometheusHandle,
    ) -> anyhow::Result<Self> {
        let verifier =
            HttpIdentityVerifier::new(&settings.auth).context("identity verifier setup failed")?;
        let http = reqwest::Client::builder()
            .connect_timeout(Duration::from_secs(10))
            .build()
            .context("forwarding client setup failed")?;
        Ok(Self::new(
            RouteTable::from_settings(&settings.routes),
            Arc::new(verifier),
            http,
            metrics,
        ))
    }
}

/// Build the gateway router.
///
/// `/healthz` and `/metrics` are the gateway's own endpoints and shadow
/// the catch-all route for those two paths; everything else falls through
/// to the dispatcher.
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/healthz", get(healthz))
        .route("/metrics", get(render_metrics))
        .fallback(dispatch)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Serve the gateway until shutdown, with TLS when configured.
pub async fn serve(settings: &PorticoSettings, metrics: PrometheusHandle) -> anyhow::Result<()> {
    let state = AppState::from_settings(settings, metrics)?;
    let app = router(state);

    let addr = format!("{}:{}", settings.gateway.host, settings.gateway.port);
    let listener = TcpListener::bind(&addr)
        .await
        .with_context(|| format!("failed to bind {addr}"))?;

    match &settings.gateway.tls {
        None => {
            info!(%addr, "gateway listening (http)");
            axum::serve(listener, app)
                .with_graceful_shutdown(shutdown_signal())
                .await?;
        }
        Some(tls) => {
            let acceptor = build_tls_acceptor(tls)?;
            info!(%addr, "gateway listening (https)");
            serve_tls(listener, acceptor, app).await?;
        }
    }
    Ok(())
}

async fn shutdown_signal() {
    let _ = tokio::signal::ctrl_c().await;
    info!("shutdown signal received");
}

/// TLS accept loop: handshake, then serve HTTP/1.1 with upgrade support
/// on the decrypted stream.
async fn serve_tls(
    listener: TcpListener,
    acceptor: TlsAcceptor,
    app: Router,
) -> anyhow::Result<()> {
    let shutdown = shutdown_signal();
    tokio::pin!(shutdown);

    loop {
        tokio::select! {
            accepted = listener.accept() => {
                let (stream, peer) = accepted.context("accept failed")?;
                let acceptor = acceptor.clone();
                let service = TowerToHyperService::new(app.clone());
                let _ = tokio::spawn(async move {
                    let tls_stream = match acceptor.accept(stream).await {
                        Ok(tls_stream) => tls_stream,
                        Err(error) => {
                            debug!(%peer, %error, "tls handshake failed");
                            return;
                        }
                    };
                    if let Err(error) = hyper::server::conn::http1::Builder::new()
                        .serve_connection(TokioIo::new(tls_stream), service)
                        .with_upgrades()
                        .await
                    {
                        debug!(%peer, %error, "connection closed with error");
                    }
                });
            }
            () = &mut shutdown => return Ok(()),
        }
    }
}

/// Load PEM material and build the rustls acceptor.
fn build_tls_acceptor(tls: &TlsSettings) -> anyhow::Result<TlsAcceptor> {
    let cert_pem = std::fs::read(&tls.cert_path)
        .with_context(|| format!("failed to read TLS cert: {}", tls.cert_path))?;
    let key_pem = std::fs::read(&tls.key_path)
        .with_context(|| format!("failed to read TLS key: {}", tls.key_path))?;

    let certs: Vec<_> = rustls_pemfile::certs(&mut &cert_pem[..])
        .collect::<Result<Vec<_>, _>>()
        .context("failed to parse TLS certificates")?;
    let key = rustls_pemfile::private_key(&mut &key_pem[..])
        .context("failed to parse TLS private key")?
        .context("no private key found in PEM file")?;

    let config = rustls::ServerConfig::builder()
        .with_no_client_auth()
        .with_single_cert(certs, key)
        .context("invalid TLS configuration")?;
    Ok(TlsAcceptor::from(Arc::new(config)))
}

async fn healthz() -> Json<serde_json::Value> {
    Json(json!({"status": "ok"}))
}

async fn render_metrics(State(state): State<AppState>) -> String {
    crate::metrics::render(&state.metrics)
}
