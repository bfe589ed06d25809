// Gateway configuration loaded from environment variables
// Decision: JWT_SECRET and DATABASE_URL are required; startup fails without them
// Decision: CORS defaults to the two local development origins;
// production sets CORS_ALLOWED_ORIGINS

use std::time::Duration;

use axum::http::{HeaderName, HeaderValue, Method};
use thiserror::Error;

/// Placeholder used when SESSION_SECRET is not set. Never acceptable in production.
pub const DEFAULT_SESSION_SECRET: &str = "insecure-dev-session-secret-change-me";

pub const DEFAULT_SESSION_MAX_AGE: Duration = Duration::from_secs(3600);

pub const DEFAULT_CORS_ORIGINS: [&str; 2] = ["http://localhost:3000", "http://127.0.0.1:3000"];

pub const DEFAULT_BIND_ADDR: &str = "0.0.0.0:8000";

pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

const WILDCARD: &str = "*";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("{0} environment variable required")]
    Missing(&'static str),

    #[error("{0} must not be empty")]
    EmptySecret(&'static str),

    #[error("invalid value for {name}: {value:?}")]
    Invalid { name: &'static str, value: String },
}

/// Session cookie settings
#[derive(Debug, Clone)]
pub struct SessionConfig {
    pub secret: String,
    pub max_age: Duration,
    /// Sets the `Secure` cookie attribute; must be on behind TLS
    pub https_only: bool,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            secret: DEFAULT_SESSION_SECRET.to_string(),
            max_age: DEFAULT_SESSION_MAX_AGE,
            https_only: false,
        }
    }
}

impl SessionConfig {
    pub fn uses_default_secret(&self) -> bool {
        self.secret == DEFAULT_SESSION_SECRET
    }
}

/// Cross-origin policy. `None` for methods or headers means "all".
#[derive(Debug, Clone)]
pub struct CorsConfig {
    pub allowed_origins: Vec<HeaderValue>,
    pub allowed_methods: Option<Vec<Method>>,
    pub allowed_headers: Option<Vec<HeaderName>>,
    pub allow_credentials: bool,
}

impl Default for CorsConfig {
    fn default() -> Self {
        Self {
            allowed_origins: DEFAULT_CORS_ORIGINS
                .into_iter()
                .map(HeaderValue::from_static)
                .collect(),
            allowed_methods: None,
            allowed_headers: None,
            allow_credentials: true,
        }
    }
}

/// Persistence connection settings
#[derive(Debug, Clone)]
pub struct DatabaseConfig {
    pub url: String,
    /// Bound on the one-time connectivity check at startup
    pub connect_timeout: Duration,
}

/// OAuth authorization-code handshake settings
#[derive(Debug, Clone)]
pub struct OAuthConfig {
    pub client_id: String,
    pub client_secret: String,
    pub authorize_url: String,
    pub token_url: String,
    pub redirect_uri: String,
    pub scope: Option<String>,
}

/// Complete gateway configuration
#[derive(Debug, Clone)]
pub struct GatewayConfig {
    pub bind_addr: String,
    pub jwt_secret: String,
    pub session: SessionConfig,
    pub cors: CorsConfig,
    pub database: DatabaseConfig,
    pub oauth: Option<OAuthConfig>,
}

impl GatewayConfig {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Load configuration through `lookup`; empty values count as unset.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |name: &str| lookup(name).filter(|value| !value.trim().is_empty());

        let jwt_secret = get("JWT_SECRET").ok_or(ConfigError::Missing("JWT_SECRET"))?;

        let session = SessionConfig {
            secret: get("SESSION_SECRET").unwrap_or_else(|| DEFAULT_SESSION_SECRET.to_string()),
            max_age: match get("SESSION_MAX_AGE") {
                Some(value) => parse_max_age("SESSION_MAX_AGE", &value)?,
                None => DEFAULT_SESSION_MAX_AGE,
            },
            https_only: match get("SESSION_HTTPS_ONLY") {
                Some(value) => parse_bool("SESSION_HTTPS_ONLY", &value)?,
                None => false,
            },
        };

        // Credentials are always allowed, so a wildcard origin can never be honoured.
        // A wildcard method or header list means "all", which is the mirroring default.
        let mut cors = CorsConfig::default();
        if let Some(value) = get("CORS_ALLOWED_ORIGINS") {
            cors.allowed_origins = parse_list("CORS_ALLOWED_ORIGINS", &value, |s| {
                (s != WILDCARD).then(|| HeaderValue::from_str(s).ok()).flatten()
            })?;
        }
        if let Some(value) = get("CORS_ALLOWED_METHODS").filter(|v| !has_wildcard(v)) {
            cors.allowed_methods = Some(parse_list("CORS_ALLOWED_METHODS", &value, |s| {
                Method::from_bytes(s.to_ascii_uppercase().as_bytes()).ok()
            })?);
        }
        if let Some(value) = get("CORS_ALLOWED_HEADERS").filter(|v| !has_wildcard(v)) {
            cors.allowed_headers = Some(parse_list("CORS_ALLOWED_HEADERS", &value, |s| {
                HeaderName::from_bytes(s.as_bytes()).ok()
            })?);
        }

        let database = DatabaseConfig {
            url: get("DATABASE_URL").ok_or(ConfigError::Missing("DATABASE_URL"))?,
            connect_timeout: match get("DATABASE_CONNECT_TIMEOUT") {
                Some(value) => {
                    Duration::from_secs(parse_number("DATABASE_CONNECT_TIMEOUT", &value)?)
                }
                None => DEFAULT_CONNECT_TIMEOUT,
            },
        };

        let oauth = match (
            get("OAUTH_CLIENT_ID"),
            get("OAUTH_CLIENT_SECRET"),
            get("OAUTH_AUTHORIZE_URL"),
            get("OAUTH_TOKEN_URL"),
            get("OAUTH_REDIRECT_URI"),
        ) {
            (
                Some(client_id),
                Some(client_secret),
                Some(authorize_url),
                Some(token_url),
                Some(redirect_uri),
            ) => Some(OAuthConfig {
                client_id,
                client_secret,
                authorize_url,
                token_url,
                redirect_uri,
                scope: get("OAUTH_SCOPE"),
            }),
            _ => None,
        };

        Ok(Self {
            bind_addr: get("BIND_ADDR").unwrap_or_else(|| DEFAULT_BIND_ADDR.to_string()),
            jwt_secret,
            session,
            cors,
            database,
            oauth,
        })
    }
}

fn parse_number(name: &'static str, value: &str) -> Result<u64, ConfigError> {
    value.trim().parse().map_err(|_| ConfigError::Invalid {
        name,
        value: value.to_string(),
    })
}

/// Seconds, bounded so the cookie `Max-Age` and session age arithmetic stay in `i64`
fn parse_max_age(name: &'static str, value: &str) -> Result<Duration, ConfigError> {
    let secs = parse_number(name, value)?;
    i64::try_from(secs)
        .map(|_| Duration::from_secs(secs))
        .map_err(|_| ConfigError::Invalid {
            name,
            value: value.to_string(),
        })
}

fn has_wildcard(value: &str) -> bool {
    value.split(',').any(|item| item.trim() == WILDCARD)
}

fn parse_bool(name: &'static str, value: &str) -> Result<bool, ConfigError> {
    match value.trim().to_lowercase().as_str() {
        "true" | "1" | "yes" => Ok(true),
        "false" | "0" | "no" => Ok(false),
        _ => Err(ConfigError::Invalid {
            name,
            value: value.to_string(),
        }),
    }
}

fn parse_list<T>(
    name: &'static str,
    value: &str,
    parse: impl Fn(&str) -> Option<T>,
) -> Result<Vec<T>, ConfigError> {
    value
        .split(',')
        .map(str::trim)
        .filter(|item| !item.is_empty())
        .map(|item| {
            parse(item).ok_or_else(|| ConfigError::Invalid {
                name,
                value: item.to_string(),
            })
        })
        .collect()
}
