//! HTTP surface: routes, shared state and the serve loop.
//!
//! ```text
//! POST /pdf, /pdf/ ──▶ require_auth ──▶ handle_pdf ──▶ ConversionService
//! GET  /health     ──▶ handle_health (no auth)
//! ```

use crate::auth::{require_auth, Authenticator, Identity};
use crate::convert::ConversionService;
use crate::request::{RenderPayload, RenderRequest};
use axum::{
    body::Bytes,
    extract::State,
    middleware,
    response::{IntoResponse, Response},
    routing::{get, post},
    Extension, Json, Router,
};
use serde::Serialize;
use std::sync::Arc;
use tokio::net::TcpListener;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing::{info, warn};

/// Shared application state.
#[derive(Clone)]
pub struct AppState {
    pub service: ConversionService,
    pub authenticator: Arc<dyn Authenticator>,
}

impl AppState {
    pub fn new(service: ConversionService, authenticator: Arc<dyn Authenticator>) -> Self {
        Self {
            service,
            authenticator,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub service: &'static str,
    pub version: &'static str,
}

/// Build the application router. `cors` adds a permissive CORS layer for
/// browser callers on other origins.
pub fn router(state: AppState, cors: bool) -> Router {
    let protected = Router::new()
        .route("/pdf", post(handle_pdf))
        .route("/pdf/", post(handle_pdf))
        .route_layer(middleware::from_fn_with_state(
            state.authenticator.clone(),
            require_auth,
        ));

    let app = Router::new()
        .route("/health", get(handle_health))
        .merge(protected)
        .layer(TraceLayer::new_for_http())
        .with_state(state);

    if cors {
        app.layer(CorsLayer::very_permissive())
    } else {
        app
    }
}

/// Serve `app` on `listener` until Ctrl-C.
pub async fn serve(listener: TcpListener, app: Router) -> std::io::Result<()> {
    if let Ok(addr) = listener.local_addr() {
        info!("Listening on http://{}", addr);
    }
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!("Could not listen for shutdown signal: {}", e);
        std::future::pending::<()>().await;
    }
    info!("Shutting down");
}

async fn handle_health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy",
        service: env!("CARGO_PKG_NAME"),
        version: env!("CARGO_PKG_VERSION"),
    })
}

async fn handle_pdf(
    State(state): State<AppState>,
    identity: Option<Extension<Identity>>,
    body: Bytes,
) -> Response {
    let user = identity.map(|Extension(i)| i.user).unwrap_or_default();
    let request = match RenderPayload::from_slice(&body).and_then(RenderRequest::try_from) {
        Ok(request) => request,
        Err(e) => {
            warn!("Rejected request from '{}': {}", user, e);
            return e.into_response();
        }
    };
    info!("PDF of '{}' requested by '{}'", request.describe(), user);
    state.service.handle(request).await
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn health_reports_service_name() {
        let Json(health) = handle_health().await;
        assert_eq!(health.status, "healthy");
        assert_eq!(health.service, "pdf-print-service");
    }
}
