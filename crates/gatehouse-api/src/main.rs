// Gatehouse API server
// Decision: Bind the listener only after the startup sequencer reports ready;
// a failed database check exits the process before any socket is opened

use std::sync::Arc;

use anyhow::{Context, Result};
use gatehouse_api::auth::{JwtVerifier, OAuthHandshake, TokenEndpointExchange, TokenVerifier};
use gatehouse_api::telemetry::{init_telemetry, TelemetryConfig};
use gatehouse_api::{router, AppState, GatewayConfig, SessionStore, StartupSequencer};
use gatehouse_storage::{Database, DatabaseOptions};
use tokio::signal;

#[tokio::main]
async fn main() -> Result<()> {
    if let Ok(path) = dotenvy::dotenv() {
        eprintln!("Loaded environment from {}", path.display());
    }

    let telemetry_config = TelemetryConfig::from_env();
    init_telemetry(&telemetry_config);

    tracing::info!(service = %telemetry_config.service_name, "gatehouse-api starting...");

    let config = GatewayConfig::from_env().context("Invalid configuration")?;

    let verifier: Arc<dyn TokenVerifier> = Arc::new(
        JwtVerifier::new(config.jwt_secret.as_bytes()).context("Invalid JWT configuration")?,
    );

    if config.session.uses_default_secret() {
        tracing::warn!("SESSION_SECRET not set, using insecure default");
    }
    let sessions = SessionStore::new(&config.session);
    tracing::info!(
        max_age_secs = config.session.max_age.as_secs(),
        https_only = config.session.https_only,
        "Session cookies configured"
    );

    tracing::info!(
        origins = ?config.cors.allowed_origins,
        methods = ?config.cors.allowed_methods,
        headers = ?config.cors.allowed_headers,
        "CORS configured"
    );

    let oauth = config.oauth.clone().map(|oauth_config| {
        tracing::info!(authorize_url = %oauth_config.authorize_url, "OAuth handshake enabled");
        let exchange = Arc::new(TokenEndpointExchange::new(oauth_config.clone()));
        Arc::new(OAuthHandshake::new(oauth_config, exchange))
    });

    // Initialize database
    let db = Database::connect_lazy(
        &config.database.url,
        &DatabaseOptions {
            acquire_timeout: config.database.connect_timeout,
            ..Default::default()
        },
    )
    .context("Failed to configure database")?;

    let (sequencer, lifecycle) = StartupSequencer::new(config.database.connect_timeout);
    sequencer
        .run(&db)
        .await
        .context("Failed to connect to database")?;

    let state = AppState {
        verifier,
        lifecycle,
        oauth,
    };
    let app = router(state, sessions, &config.cors);

    let listener = tokio::net::TcpListener::bind(&config.bind_addr)
        .await
        .with_context(|| format!("Failed to bind to {}", config.bind_addr))?;
    tracing::info!("HTTP server listening on {}", config.bind_addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("Server error")?;

    tracing::info!("Server stopped");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!("Failed to install Ctrl+C handler: {e}");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                tracing::error!("Failed to install SIGTERM handler: {e}");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => tracing::info!("Received Ctrl+C, shutting down"),
        () = terminate => tracing::info!("Received SIGTERM, shutting down"),
    }
}
