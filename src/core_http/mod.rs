pub mod gateway;
pub mod mime;

use anyhow::Result;
use axum::extract::State;
use axum::http::{Method, StatusCode, Uri};
use axum::response::{IntoResponse, Response};
use axum::Router;
use log::info;
use std::sync::Arc;
use tokio::net::TcpListener;

use crate::config::Config;
use crate::core_http::gateway::ProxyGateway;
use crate::core_policy::PathPolicy;

#[derive(Clone)]
pub struct AppState {
    gateway: Arc<ProxyGateway>,
}

pub fn router(gateway: Arc<ProxyGateway>) -> Router {
    // A single dynamic handler covers every path; routing decisions belong
    // to the path policy, not the HTTP framework.
    Router::new()
        .fallback(bridge)
        .with_state(AppState { gateway })
}

/// Boundary between the HTTP framework and the gateway: extracts what the
/// gateway needs from the request and hands back its response untouched.
async fn bridge(State(state): State<AppState>, method: Method, uri: Uri) -> Response {
    if method != Method::GET {
        return (StatusCode::METHOD_NOT_ALLOWED, "Only GET is supported.\n").into_response();
    }
    state.gateway.handle(uri.path()).await
}

pub async fn serve(config: Arc<Config>) -> Result<()> {
    let policy = PathPolicy::new(&config.proxy.remote_paths, config.match_mode()?);
    let gateway = Arc::new(ProxyGateway::new(Arc::clone(&config), policy));
    let app = router(gateway);

    let listener = TcpListener::bind(("0.0.0.0", config.listen_port())).await?;
    info!(
        "HTTP gateway listening on port {}, bridging to ftp://{}:{}",
        config.listen_port(),
        config.ftp.host,
        config.ftp_port()
    );
    axum::serve(listener, app).await?;
    Ok(())
}
