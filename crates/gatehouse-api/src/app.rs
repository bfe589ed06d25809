// Request pipeline
// Decision: Layers, outermost first: trace, CORS, readiness gate, session, routes.
// CORS answers preflight before any session or auth work; token verification is
// opt-in per handler via the `AuthClaims` extractor.
// Decision: /health sits outside the readiness gate so it can report startup progress

use std::sync::Arc;

use axum::{
    extract::{FromRef, State},
    http::StatusCode,
    middleware,
    routing::get,
    Json, Router,
};
use serde::Serialize;
use tower_http::trace::TraceLayer;

use crate::auth::{oauth, AuthClaims, Claims, OAuthHandshake, TokenVerifier};
use crate::config::CorsConfig;
use crate::cors::cors_layer;
use crate::session::{session_layer, SessionStore};
use crate::startup::{require_ready, Lifecycle, StartupState};

/// App state shared across routes
#[derive(Clone)]
pub struct AppState {
    pub verifier: Arc<dyn TokenVerifier>,
    pub lifecycle: Lifecycle,
    /// Present when the OAuth handshake is configured
    pub oauth: Option<Arc<OAuthHandshake>>,
}

impl FromRef<AppState> for Arc<dyn TokenVerifier> {
    fn from_ref(state: &AppState) -> Self {
        state.verifier.clone()
    }
}

impl FromRef<AppState> for Lifecycle {
    fn from_ref(state: &AppState) -> Self {
        state.lifecycle.clone()
    }
}

#[derive(Debug, Serialize)]
pub struct HomeResponse {
    pub message: &'static str,
    pub user: Claims,
}

/// GET / - protected greeting echoing the caller's claims
async fn home(AuthClaims(claims): AuthClaims) -> Json<HomeResponse> {
    Json(HomeResponse {
        message: "Gatehouse is connected!",
        user: claims,
    })
}

#[derive(Debug, Serialize)]
struct HealthResponse {
    status: &'static str,
    version: &'static str,
    startup: StartupState,
}

/// GET /health - 200 once ready, 503 while starting or after a failed startup
async fn health(State(lifecycle): State<Lifecycle>) -> (StatusCode, Json<HealthResponse>) {
    let (code, status) = if lifecycle.is_ready() {
        (StatusCode::OK, "ok")
    } else {
        (StatusCode::SERVICE_UNAVAILABLE, "unavailable")
    };

    (
        code,
        Json(HealthResponse {
            status,
            version: env!("CARGO_PKG_VERSION"),
            startup: lifecycle.state(),
        }),
    )
}

/// Compose the full pipeline around the application routes
pub fn router(state: AppState, sessions: SessionStore, cors: &CorsConfig) -> Router {
    let mut routes = Router::new().route("/", get(home));

    if let Some(handshake) = &state.oauth {
        routes = routes.merge(oauth::routes(handshake.clone()));
    }

    let gated = routes
        .layer(middleware::from_fn_with_state(sessions, session_layer))
        .layer(middleware::from_fn_with_state(
            state.lifecycle.clone(),
            require_ready,
        ));

    Router::new()
        .route("/health", get(health))
        .merge(gated)
        .layer(cors_layer(cors))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
