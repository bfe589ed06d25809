// OAuth authorization-code handshake
// Decision: The CSRF state travels in the signed session cookie between the redirect
// and the callback, and is consumed on first use
// Decision: The code exchange sits behind `CodeExchange`; the gateway does not interpret tokens

use std::sync::Arc;

use anyhow::{Context, Result};
use async_trait::async_trait;
use axum::{
    extract::{Query, State},
    http::StatusCode,
    response::{IntoResponse, Redirect, Response},
    routing::get,
    Json, Router,
};
use rand::Rng;
use serde::Deserialize;
use serde_json::Value;
use thiserror::Error;
use url::Url;

use crate::common::ErrorResponse;
use crate::config::OAuthConfig;
use crate::session::Session;

/// Session key holding the pending handshake state
pub const OAUTH_STATE_KEY: &str = "oauth_state";

/// Generate a random state string for OAuth (32 hex characters)
fn generate_oauth_state() -> String {
    let mut rng = rand::thread_rng();
    let bytes: [u8; 16] = rng.gen();
    hex::encode(bytes)
}

/// Trades an authorization code for the provider's token response
#[async_trait]
pub trait CodeExchange: Send + Sync {
    async fn exchange_code(&self, code: &str) -> Result<Value>;
}

/// Standard authorization-code grant against the provider's token endpoint
pub struct TokenEndpointExchange {
    client: reqwest::Client,
    config: OAuthConfig,
}

impl TokenEndpointExchange {
    pub fn new(config: OAuthConfig) -> Self {
        Self {
            client: reqwest::Client::new(),
            config,
        }
    }
}

#[async_trait]
impl CodeExchange for TokenEndpointExchange {
    async fn exchange_code(&self, code: &str) -> Result<Value> {
        self.client
            .post(&self.config.token_url)
            .form(&[
                ("grant_type", "authorization_code"),
                ("code", code),
                ("redirect_uri", self.config.redirect_uri.as_str()),
                ("client_id", self.config.client_id.as_str()),
                ("client_secret", self.config.client_secret.as_str()),
            ])
            .send()
            .await
            .context("Failed to reach token endpoint")?
            .error_for_status()
            .context("Token endpoint rejected the code")?
            .json()
            .await
            .context("Failed to parse token response")
    }
}

/// Handshake settings plus the exchange collaborator
pub struct OAuthHandshake {
    config: OAuthConfig,
    exchange: Arc<dyn CodeExchange>,
}

impl OAuthHandshake {
    pub fn new(config: OAuthConfig, exchange: Arc<dyn CodeExchange>) -> Self {
        Self { config, exchange }
    }

    /// Provider URL the browser is sent to
    pub fn authorization_url(&self, state: &str) -> Result<Url, url::ParseError> {
        let mut params = vec![
            ("response_type", "code"),
            ("client_id", self.config.client_id.as_str()),
            ("redirect_uri", self.config.redirect_uri.as_str()),
            ("state", state),
        ];
        if let Some(scope) = &self.config.scope {
            params.push(("scope", scope.as_str()));
        }
        Url::parse_with_params(&self.config.authorize_url, &params)
    }
}

#[derive(Debug, Error)]
pub enum OAuthError {
    #[error("Invalid OAuth state")]
    InvalidState,

    #[error("Authorization code missing")]
    MissingCode,

    #[error("OAuth provider returned an error: {0}")]
    ProviderError(String),

    #[error("OAuth exchange failed")]
    ExchangeFailed,

    #[error("OAuth is misconfigured")]
    Misconfigured,
}

impl OAuthError {
    pub fn status(&self) -> StatusCode {
        match self {
            OAuthError::InvalidState | OAuthError::MissingCode | OAuthError::ProviderError(_) => {
                StatusCode::BAD_REQUEST
            }
            OAuthError::ExchangeFailed => StatusCode::BAD_GATEWAY,
            OAuthError::Misconfigured => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for OAuthError {
    fn into_response(self) -> Response {
        ErrorResponse::new(self.to_string()).with_status(self.status())
    }
}

/// OAuth callback query parameters
#[derive(Debug, Deserialize)]
pub struct CallbackQuery {
    pub code: Option<String>,
    pub state: Option<String>,
    pub error: Option<String>,
}

/// Create OAuth routes
pub fn routes<S>(handshake: Arc<OAuthHandshake>) -> Router<S>
where
    S: Clone + Send + Sync + 'static,
{
    Router::new()
        .route("/auth/login", get(login))
        .route("/auth/callback", get(callback))
        .with_state(handshake)
}

/// GET /auth/login - Start the handshake
pub async fn login(
    State(handshake): State<Arc<OAuthHandshake>>,
    session: Session,
) -> Result<Redirect, OAuthError> {
    let state = generate_oauth_state();

    let url = handshake.authorization_url(&state).map_err(|e| {
        tracing::error!(error = %e, "Invalid OAUTH_AUTHORIZE_URL");
        OAuthError::Misconfigured
    })?;

    session.insert(OAUTH_STATE_KEY, &state).map_err(|e| {
        tracing::error!(error = %e, "Failed to store OAuth state");
        OAuthError::Misconfigured
    })?;

    Ok(Redirect::to(url.as_str()))
}

/// GET /auth/callback - Validate the returned state and exchange the code
pub async fn callback(
    State(handshake): State<Arc<OAuthHandshake>>,
    session: Session,
    Query(query): Query<CallbackQuery>,
) -> Result<Json<Value>, OAuthError> {
    // Single use: the pending state is gone whatever the outcome
    let expected: Option<String> = session.remove(OAUTH_STATE_KEY);

    match (expected.as_deref(), query.state.as_deref()) {
        (Some(expected), Some(returned)) if expected == returned => {}
        _ => {
            tracing::debug!(
                session_id = ?session.id(),
                has_pending_state = expected.is_some(),
                "OAuth state mismatch"
            );
            return Err(OAuthError::InvalidState);
        }
    }

    if let Some(error) = query.error {
        return Err(OAuthError::ProviderError(error));
    }

    let code = query.code.ok_or(OAuthError::MissingCode)?;

    let tokens = handshake.exchange.exchange_code(&code).await.map_err(|e| {
        tracing::error!(error = %e, "OAuth exchange failed");
        OAuthError::ExchangeFailed
    })?;

    Ok(Json(tokens))
}
